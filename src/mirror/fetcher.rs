//! Concurrent image downloader
//!
//! Fetches every [`AssetTask`] over HTTP with a bounded number of requests
//! in flight and stores each body at the task's local path. Every task ends
//! in exactly one [`AssetOutcome`]; a failed image never stops the run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::MirrorSettings;

use super::outcome::{AssetOutcome, Downloaded, PersistenceError, TransferError};
use super::AssetTask;

/// Image mirror over a shared HTTP client
#[derive(Clone)]
pub struct AssetMirror {
    http_client: reqwest::Client,
    /// Maximum concurrent downloads
    concurrency: usize,
    cancel: CancellationToken,
}

impl AssetMirror {
    /// Build the HTTP client from mirror settings
    ///
    /// Certificate validation stays on unless `insecure` is set.
    pub fn new(settings: &MirrorSettings) -> Result<Self, reqwest::Error> {
        if settings.insecure {
            warn!("TLS certificate validation is DISABLED for image downloads");
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .redirect(reqwest::redirect::Policy::limited(settings.max_redirects))
            .user_agent(settings.user_agent.as_str())
            .danger_accept_invalid_certs(settings.insecure)
            .build()?;

        Ok(Self {
            http_client,
            concurrency: settings.concurrency.clamp(1, 64),
            cancel: CancellationToken::new(),
        })
    }

    /// Stop starting new downloads once `token` fires
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Mirror all tasks; outcomes come back in task order
    #[instrument(skip_all, fields(task_count = tasks.len(), concurrency = self.concurrency))]
    pub async fn mirror(&self, tasks: Vec<AssetTask>) -> Vec<AssetOutcome> {
        let total = tasks.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let (tx, mut rx) = mpsc::channel::<(usize, AssetOutcome)>(self.concurrency * 2);

        let mut workers = Vec::with_capacity(total);
        let mut outcomes = Vec::with_capacity(total);
        let mut claimed: HashMap<PathBuf, AssetTask> = HashMap::with_capacity(total);

        for (index, task) in tasks.into_iter().enumerate() {
            // first task in order owns a path; later ones never touch the file
            if let Some(owner) = claimed.get(&task.local_path) {
                warn!(
                    "Skipping {}: {} is already used by {}",
                    task.url,
                    task.local_path.display(),
                    owner.url
                );
                outcomes.push((index, AssetOutcome::duplicate(&task, owner)));
                continue;
            }
            claimed.insert(task.local_path.clone(), task.clone());

            let mirror = self.clone();
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            let cancel = self.cancel.clone();
            let pending = task.clone();

            let handle = tokio::spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };

                let outcome = match permit {
                    Some(_permit) if !cancel.is_cancelled() => mirror.fetch(&task).await,
                    _ => AssetOutcome::cancelled(&task),
                };

                // receiver outlives every sender
                let _ = tx.send((index, outcome)).await;
            });

            workers.push((index, pending, handle));
        }
        drop(tx);

        while let Some((index, outcome)) = rx.recv().await {
            let done = outcomes.len() + 1;
            match &outcome {
                AssetOutcome::Downloaded(d) => {
                    info!(
                        "[{}/{}] Downloaded {} -> {} ({} bytes)",
                        done, total, d.original_url, d.local_path.display(), d.size_bytes
                    );
                }
                AssetOutcome::Failed(f) => {
                    warn!("[{}/{}] Failed {}: {}", done, total, f.url, f.reason);
                }
            }
            outcomes.push((index, outcome));
        }

        for (index, task, handle) in workers {
            if let Err(e) = handle.await {
                error!("Download worker for {} aborted: {}", task.url, e);
                outcomes.push((index, AssetOutcome::aborted(&task, &e.to_string())));
            }
        }

        outcomes.sort_by_key(|(index, _)| *index);
        let outcomes: Vec<AssetOutcome> = outcomes.into_iter().map(|(_, o)| o).collect();

        let downloaded = outcomes.iter().filter(|o| o.is_downloaded()).count();
        info!(
            "Mirror completed: {} downloaded, {} failed of {}",
            downloaded,
            total - downloaded,
            total
        );

        outcomes
    }

    /// Download one image and store it
    #[instrument(skip(self, task), fields(url = %task.url))]
    pub async fn fetch(&self, task: &AssetTask) -> AssetOutcome {
        let (body, content_type) = match self.download(&task.url).await {
            Ok(response) => response,
            Err(e) => return AssetOutcome::transfer_failed(task, &e),
        };

        if let Err(e) = persist(&task.local_path, &body).await {
            return AssetOutcome::persist_failed(task, &e);
        }

        AssetOutcome::Downloaded(Downloaded {
            image_id: task.image_id.clone(),
            original_url: task.url.clone(),
            local_path: task.local_path.clone(),
            product_sku: task.product_sku.clone(),
            variant_sku: task.variant_sku.clone(),
            alt_text: task.alt_text.clone(),
            size_bytes: body.len() as u64,
            content_type,
            sha256: hex::encode(Sha256::digest(&body)),
        })
    }

    async fn download(&self, url: &str) -> Result<(Vec<u8>, Option<String>), TransferError> {
        debug!("Downloading image from: {}", url);
        let response = self.http_client.get(url).send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(TransferError::Status { status: status.as_u16() });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().await?.to_vec();
        if body.is_empty() {
            return Err(TransferError::EmptyBody);
        }

        Ok((body, content_type))
    }
}

/// Write to a sibling temp file, then rename over the destination
///
/// Readers of `path` see either the previous file or the complete new one.
async fn persist(path: &Path, body: &[u8]) -> Result<(), PersistenceError> {
    let wrap = |source| PersistenceError { path: path.to_path_buf(), source };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(wrap)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{}.{}.part", file_name, Uuid::new_v4().simple()));

    if let Err(e) = tokio::fs::write(&temp, body).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(wrap(e));
    }
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(wrap(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::FailureKind;
    use serde_json::json;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const JPEG: &[u8] = b"\xFF\xD8\xFF\xE0fake-jpeg-bytes";

    fn settings() -> MirrorSettings {
        MirrorSettings {
            concurrency: 4,
            timeout_secs: 5,
            max_redirects: 3,
            insecure: false,
            user_agent: "catalog-migrate-test".to_string(),
        }
    }

    fn task(root: &Path, id: i64, url: String, variant: Option<&str>) -> AssetTask {
        AssetTask::new(root, json!(id), url, "ABC", variant.map(str::to_string), None)
    }

    async fn server_with_images() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(JPEG.to_vec())
                    .insert_header("content-type", "image/jpeg"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/empty.jpg"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_downloads_to_variant_path() {
        let server = server_with_images().await;
        let dir = tempfile::tempdir().unwrap();
        let mirror = AssetMirror::new(&settings()).unwrap();

        let outcomes = mirror
            .mirror(vec![task(dir.path(), 1, format!("{}/img.jpg", server.uri()), Some("V2"))])
            .await;

        let downloaded = match &outcomes[0] {
            AssetOutcome::Downloaded(d) => d,
            other => panic!("unexpected {:?}", other),
        };
        let expected = dir.path().join("ABC").join("img_V2.jpg");
        assert_eq!(downloaded.local_path, expected);
        assert_eq!(std::fs::read(&expected).unwrap(), JPEG);
        assert_eq!(downloaded.size_bytes, JPEG.len() as u64);
        assert_eq!(downloaded.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(downloaded.sha256, hex::encode(Sha256::digest(JPEG)));
    }

    #[tokio::test]
    async fn test_not_found_leaves_no_file() {
        let server = server_with_images().await;
        let dir = tempfile::tempdir().unwrap();
        let mirror = AssetMirror::new(&settings()).unwrap();

        let missing = task(dir.path(), 2, format!("{}/missing.jpg", server.uri()), None);
        let local_path = missing.local_path.clone();
        let outcomes = mirror.mirror(vec![missing]).await;

        match &outcomes[0] {
            AssetOutcome::Failed(f) => {
                assert_eq!(f.reason, "HTTP 404");
                assert_eq!(f.http_status, Some(404));
                assert_eq!(f.kind, FailureKind::Remote);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!local_path.exists());
    }

    #[tokio::test]
    async fn test_empty_body_is_failure() {
        let server = server_with_images().await;
        let dir = tempfile::tempdir().unwrap();
        let mirror = AssetMirror::new(&settings()).unwrap();

        let outcomes = mirror
            .mirror(vec![task(dir.path(), 3, format!("{}/empty.jpg", server.uri()), None)])
            .await;
        match &outcomes[0] {
            AssetOutcome::Failed(f) => assert_eq!(f.reason, "HTTP 200 (empty body)"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mixed_batch_keeps_task_order() {
        let server = server_with_images().await;
        let dir = tempfile::tempdir().unwrap();
        let mirror = AssetMirror::new(&settings()).unwrap();

        let tasks: Vec<_> = (0..12)
            .map(|i| {
                let file = if i % 3 == 0 { "missing.jpg" } else { "img.jpg" };
                task(dir.path(), i, format!("{}/{}", server.uri(), file), Some(&format!("V{}", i)))
            })
            .collect();
        let expected_urls: Vec<_> = tasks.iter().map(|t| t.url.clone()).collect();

        let outcomes = mirror.mirror(tasks).await;
        assert_eq!(outcomes.len(), 12);
        let urls: Vec<_> = outcomes.iter().map(|o| o.url().to_string()).collect();
        assert_eq!(urls, expected_urls);
        assert_eq!(outcomes.iter().filter(|o| o.is_downloaded()).count(), 8);
    }

    #[tokio::test]
    async fn test_rerun_overwrites_identically() {
        let server = server_with_images().await;
        let dir = tempfile::tempdir().unwrap();
        let mirror = AssetMirror::new(&settings()).unwrap();
        let url = format!("{}/img.jpg", server.uri());

        mirror.mirror(vec![task(dir.path(), 1, url.clone(), None)]).await;
        let first = std::fs::read(dir.path().join("ABC/img.jpg")).unwrap();
        mirror.mirror(vec![task(dir.path(), 1, url, None)]).await;
        let second = std::fs::read(dir.path().join("ABC/img.jpg")).unwrap();

        assert_eq!(first, second);
        let leftovers: Vec<PathBuf> = std::fs::read_dir(dir.path().join("ABC"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {:?}", leftovers);
    }

    #[tokio::test]
    async fn test_unwritable_destination_is_persistence_failure() {
        let server = server_with_images().await;
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let mirror = AssetMirror::new(&settings()).unwrap();

        let outcomes = mirror
            .mirror(vec![task(&blocker, 1, format!("{}/img.jpg", server.uri()), None)])
            .await;
        match &outcomes[0] {
            AssetOutcome::Failed(f) => {
                assert_eq!(f.kind, FailureKind::Persistence);
                assert!(f.reason.starts_with("write failed:"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_redirect_loop_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop.jpg"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", format!("{}/loop.jpg", server.uri())),
            )
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let mirror = AssetMirror::new(&settings()).unwrap();

        let outcomes = mirror
            .mirror(vec![task(dir.path(), 1, format!("{}/loop.jpg", server.uri()), None)])
            .await;
        match &outcomes[0] {
            AssetOutcome::Failed(f) => {
                assert_eq!(f.kind, FailureKind::Transport);
                assert_eq!(f.http_status, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = AssetMirror::new(&settings()).unwrap();

        // port 9 (discard) on loopback: nothing listens there
        let outcomes = mirror
            .mirror(vec![task(dir.path(), 1, "http://127.0.0.1:9/img.jpg".to_string(), None)])
            .await;
        match &outcomes[0] {
            AssetOutcome::Failed(f) => assert_eq!(f.kind, FailureKind::Transport),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_run_starts_nothing() {
        let server = server_with_images().await;
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let mirror = AssetMirror::new(&settings()).unwrap().with_cancellation(token);

        let tasks: Vec<_> = (0..5)
            .map(|i| task(dir.path(), i, format!("{}/img.jpg", server.uri()), Some(&format!("V{}", i))))
            .collect();
        let outcomes = mirror.mirror(tasks).await;

        assert_eq!(outcomes.len(), 5);
        for outcome in &outcomes {
            match outcome {
                AssetOutcome::Failed(f) => assert_eq!(f.kind, FailureKind::Cancelled),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(server.received_requests().await.unwrap().is_empty());
        assert!(!dir.path().join("ABC").exists());
    }

    async fn mount_body(server: &MockServer, at: &str, body: &str, delay: Duration) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(body.as_bytes().to_vec())
                    .set_delay(delay),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_same_local_path_keeps_first_task_regardless_of_timing() {
        for (slow_a, slow_b) in [(300, 0), (0, 300)] {
            let server = MockServer::start().await;
            mount_body(&server, "/a/img.jpg", "AAAA", Duration::from_millis(slow_a)).await;
            mount_body(&server, "/b/img.jpg", "BBBB", Duration::from_millis(slow_b)).await;
            let dir = tempfile::tempdir().unwrap();
            let mirror = AssetMirror::new(&settings()).unwrap();

            let outcomes = mirror
                .mirror(vec![
                    task(dir.path(), 1, format!("{}/a/img.jpg", server.uri()), None),
                    task(dir.path(), 2, format!("{}/b/img.jpg", server.uri()), None),
                ])
                .await;

            assert_eq!(std::fs::read(dir.path().join("ABC/img.jpg")).unwrap(), b"AAAA");
            match &outcomes[0] {
                AssetOutcome::Downloaded(d) => {
                    assert_eq!(d.sha256, hex::encode(Sha256::digest(b"AAAA")));
                }
                other => panic!("unexpected {:?}", other),
            }
            match &outcomes[1] {
                AssetOutcome::Failed(f) => {
                    assert_eq!(f.kind, FailureKind::Duplicate);
                    assert!(f.reason.starts_with("duplicate local path"));
                }
                other => panic!("unexpected {:?}", other),
            }
            let requests = server.received_requests().await.unwrap();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].url.path(), "/a/img.jpg");
        }
    }

    #[tokio::test]
    async fn test_cancel_lets_in_flight_download_finish() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/slow/.+\.jpg$"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(JPEG.to_vec())
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        let mut s = settings();
        s.concurrency = 1;
        let mirror = AssetMirror::new(&s).unwrap().with_cancellation(token.clone());

        let tasks: Vec<_> = (0..4)
            .map(|i| task(dir.path(), i, format!("{}/slow/{}.jpg", server.uri(), i), None))
            .collect();

        let cancel_after_first_request = async {
            loop {
                if !server.received_requests().await.unwrap().is_empty() {
                    token.cancel();
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        let (outcomes, _) = tokio::join!(mirror.mirror(tasks), cancel_after_first_request);

        assert_eq!(outcomes.len(), 4);
        let downloaded: Vec<_> = outcomes
            .iter()
            .filter_map(|o| match o {
                AssetOutcome::Downloaded(d) => Some(d),
                _ => None,
            })
            .collect();
        assert_eq!(downloaded.len(), 1);
        assert_eq!(std::fs::read(&downloaded[0].local_path).unwrap(), JPEG);

        for outcome in outcomes.iter().filter(|o| !o.is_downloaded()) {
            match outcome {
                AssetOutcome::Failed(f) => assert_eq!(f.kind, FailureKind::Cancelled),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[test]
    fn test_concurrency_is_clamped() {
        let mut s = settings();
        s.concurrency = 0;
        assert_eq!(AssetMirror::new(&s).unwrap().concurrency(), 1);
        s.concurrency = 500;
        assert_eq!(AssetMirror::new(&s).unwrap().concurrency(), 64);
    }
}
