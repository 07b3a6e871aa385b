//! Dead-link probing for cards.

use std::sync::Arc;
use std::time::Duration;

use rocket::tokio::sync::Semaphore;
use rocket::tokio::task::JoinSet;
use serde::Serialize;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(8);
pub const MAX_CONCURRENT: usize = 8;
/// Cards per check-links request.
pub const MAX_LINKS: usize = 200;

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    pub id: i64,
    pub url: String,
    pub ok: bool,
    pub status: Option<u16>,
    pub error: Option<String>,
}

pub fn client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(5))
        .user_agent(concat!("navdeck-link-check/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// HEAD first; servers that refuse HEAD get a GET.
async fn probe(client: &reqwest::Client, id: i64, url: String) -> LinkStatus {
    let head = client.head(&url).send().await;
    let response = match head {
        Ok(r) if r.status().as_u16() < 400 => Ok(r),
        _ => client.get(&url).send().await,
    };
    match response {
        Ok(r) => {
            let status = r.status().as_u16();
            LinkStatus {
                id,
                url,
                ok: status < 400,
                status: Some(status),
                error: None,
            }
        }
        Err(e) => LinkStatus {
            id,
            url,
            ok: false,
            status: None,
            error: Some(if e.is_timeout() {
                "timed out".to_string()
            } else {
                e.to_string()
            }),
        },
    }
}

/// Probe every `(id, url)` with bounded concurrency. Results keep the
/// input order.
pub async fn check_all(client: reqwest::Client, targets: Vec<(i64, String)>) -> Vec<LinkStatus> {
    let permits = Arc::new(Semaphore::new(MAX_CONCURRENT));
    let mut set = JoinSet::new();
    for (idx, (id, url)) in targets.into_iter().enumerate() {
        let client = client.clone();
        let permits = Arc::clone(&permits);
        set.spawn(async move {
            let _permit = permits.acquire_owned().await;
            (idx, probe(&client, id, url).await)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(r) => results.push(r),
            Err(e) => log::error!("Link probe task failed: {}", e),
        }
    }
    results.sort_by_key(|(idx, _)| *idx);
    let results: Vec<LinkStatus> = results.into_iter().map(|(_, r)| r).collect();
    log::info!(
        "Checked {} links, {} broken",
        results.len(),
        results.iter().filter(|r| !r.ok).count()
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rocket::async_test]
    async fn unreachable_links_are_reported() {
        let client = client(Duration::from_secs(2)).unwrap();
        let results = check_all(
            client,
            vec![
                (1, "http://127.0.0.1:1/".to_string()),
                (2, "not a url".to_string()),
            ],
        )
        .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, 1);
        assert_eq!(results[1].id, 2);
        assert!(results.iter().all(|r| !r.ok && r.status.is_none() && r.error.is_some()));
    }
}
