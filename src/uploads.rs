use std::path::Path;

use rand::RngCore;
use rocket::fs::TempFile;

pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "image/x-icon",
];

const ALLOWED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".ico"];

pub const REJECTED_TYPE: &str = "only image files are allowed (jpg, jpeg, png, gif, webp, svg, ico)";

/// Lowercased extension with its dot, taken from the client's filename.
pub fn extension_of(filename: &str) -> Option<String> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let dot = name.rfind('.').filter(|i| *i > 0)?;
    Some(name[dot..].to_ascii_lowercase())
}

/// Both the declared MIME type and the filename extension must be on the
/// image allow-list. Returns the extension to store the file under.
pub fn check_image(mime: Option<&str>, filename: &str) -> Result<String, String> {
    let mime_ok = mime
        .map(|m| m.split(';').next().unwrap_or(m).trim().to_ascii_lowercase())
        .map(|m| ALLOWED_MIME_TYPES.contains(&m.as_str()))
        .unwrap_or(false);
    match extension_of(filename) {
        Some(ext) if mime_ok && ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(ext),
        _ => Err(REJECTED_TYPE.to_string()),
    }
}

/// `<unix-ms>-<8 hex>.<ext>`
pub fn stored_name(ext: &str) -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "{}-{}{}",
        chrono::Utc::now().timestamp_millis(),
        hex::encode(bytes),
        ext
    )
}

/// The client's original filename. Rocket only exposes it unsanitized,
/// and it is used for the extension check alone.
pub fn raw_filename(file: &TempFile<'_>) -> String {
    file.raw_name()
        .map(|rn| rn.dangerous_unsafe_unsanitized_raw().as_str().to_string())
        .unwrap_or_default()
}

pub fn mime_of(file: &TempFile<'_>) -> Option<String> {
    file.content_type()
        .map(|ct| format!("{}/{}", ct.top(), ct.sub()))
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("{0}")]
    Rejected(String),
    #[error("could not store upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Validate and move an uploaded logo into `dir`. Returns the stored name.
pub async fn save_logo(file: &mut TempFile<'_>, dir: &Path) -> Result<String, UploadError> {
    if file.len() > MAX_UPLOAD_BYTES {
        return Err(UploadError::Rejected("file must be at most 5MB".to_string()));
    }
    let ext = check_image(mime_of(file).as_deref(), &raw_filename(file)).map_err(UploadError::Rejected)?;

    rocket::tokio::fs::create_dir_all(dir).await?;
    let filename = stored_name(&ext);
    file.move_copy_to(dir.join(&filename)).await?;
    log::info!("Stored upload {}", filename);
    Ok(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_and_extension_must_both_match() {
        assert_eq!(check_image(Some("image/png"), "Logo.PNG").unwrap(), ".png");
        assert_eq!(check_image(Some("image/svg+xml"), "a.svg").unwrap(), ".svg");
        assert!(check_image(Some("text/html"), "a.png").is_err());
        assert!(check_image(Some("image/png"), "a.html").is_err());
        assert!(check_image(None, "a.png").is_err());
        assert!(check_image(Some("image/png"), "png").is_err());
    }

    #[test]
    fn extension_parsing() {
        assert_eq!(extension_of("C:\\pics\\x.JPeG").as_deref(), Some(".jpeg"));
        assert_eq!(extension_of(".hidden"), None);
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some(".gz"));
    }

    #[test]
    fn stored_names_keep_extension() {
        let name = stored_name(".ico");
        assert!(name.ends_with(".ico"));
        let (ms, rest) = name.split_once('-').unwrap();
        assert!(ms.parse::<i64>().is_ok());
        assert_eq!(rest.len(), 8 + 4);
    }
}
