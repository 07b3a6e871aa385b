use log::{error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use crate::config::Config;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BootReport {
    pub warnings: u32,
    pub errors: u32,
}

fn writable(dir: &Path) -> Result<(), std::io::Error> {
    let test_file = dir.join(".write_test");
    fs::write(&test_file, "test")?;
    let _ = fs::remove_file(&test_file);
    Ok(())
}

/// Directories the server needs before Rocket mounts its file servers.
fn required_dirs(config: &Config) -> Vec<PathBuf> {
    let mut dirs = vec![config.uploads_dir.clone(), config.web_dist.clone()];
    if config.database_url.is_none() {
        if let Some(parent) = config.sqlite_path.parent() {
            if !parent.as_os_str().is_empty() {
                dirs.push(parent.to_path_buf());
            }
        }
    }
    dirs
}

/// Create missing directories and report what is wrong with the layout.
pub fn check(config: &Config) -> BootReport {
    let mut report = BootReport::default();

    // ── 1. Directories ─────────────────────────────────
    for dir in required_dirs(config) {
        if !dir.exists() {
            match fs::create_dir_all(&dir) {
                Ok(_) => info!("  Created directory: {}", dir.display()),
                Err(e) => {
                    error!("  FAILED to create directory {}: {}", dir.display(), e);
                    report.errors += 1;
                }
            }
        }
    }

    // ── 2. Frontend build ───────────────────────────────
    let index = config.web_dist.join("index.html");
    if !index.exists() {
        warn!(
            "  Missing {} (build the admin UI; API routes still work)",
            index.display()
        );
        report.warnings += 1;
    }

    // ── 3. Database directory writable ──────────────────
    if config.database_url.is_none() {
        let db_dir = config
            .sqlite_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        if db_dir.exists() {
            if let Err(e) = writable(db_dir) {
                error!("  Database directory not writable: {}", e);
                report.errors += 1;
            }
        }
    }

    // ── 4. Uploads directory writable ───────────────────
    if config.uploads_dir.exists() {
        if let Err(e) = writable(&config.uploads_dir) {
            warn!("  Uploads directory not writable: {} (file uploads will fail)", e);
            report.warnings += 1;
        }
    }

    // ── 5. Production hardening ─────────────────────────
    if config.production {
        if config.admin_password.is_none() {
            warn!("  ADMIN_PASSWORD is not set in production");
            report.warnings += 1;
        }
        if config.cors_origin == "*" {
            warn!("  CORS_ORIGIN allows any origin in production");
            report.warnings += 1;
        }
    }

    report
}

/// Run all boot checks. Call this before Rocket launches.
/// Aborts the process when a fatal problem is found.
pub fn run(config: &Config) {
    info!("navdeck boot check starting...");

    let report = check(config);

    if report.errors > 0 {
        error!(
            "Boot check FAILED: {} error(s), {} warning(s). Aborting.",
            report.errors, report.warnings
        );
        process::exit(1);
    }

    if report.warnings > 0 {
        warn!(
            "Boot check passed with {} warning(s). Some features may not work correctly.",
            report.warnings
        );
    } else {
        info!("Boot check passed. All systems go.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> Config {
        Config {
            sqlite_path: dir.join("database/nav.db"),
            uploads_dir: dir.join("uploads"),
            web_dist: dir.join("web/dist"),
            ..Config::default()
        }
    }

    #[test]
    fn creates_missing_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        let report = check(&config);
        assert_eq!(report.errors, 0);
        assert!(tmp.path().join("database").is_dir());
        assert!(tmp.path().join("uploads").is_dir());
        assert!(tmp.path().join("web/dist").is_dir());
        // index.html is missing
        assert_eq!(report.warnings, 1);
    }

    #[test]
    fn production_without_password_warns() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("web/dist")).unwrap();
        fs::write(tmp.path().join("web/dist/index.html"), "<html></html>").unwrap();
        let config = Config {
            production: true,
            ..config_in(tmp.path())
        };
        let report = check(&config);
        assert_eq!(report, BootReport { warnings: 2, errors: 0 });
    }

    #[test]
    fn postgres_mode_skips_sqlite_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            database_url: Some("postgres://localhost/nav".into()),
            ..config_in(tmp.path())
        };
        check(&config);
        assert!(!tmp.path().join("database").exists());
    }
}
