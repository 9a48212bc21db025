use crate::auth::{AccessToken, Authenticate, Session};
use crate::error::SentinelError;
use crate::retry::{with_retry, RetryPolicy};
use crate::types::ProductDescriptor;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH};
use std::path::{Component, Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Largest slice written to disk in one call.
pub const CHUNK_SIZE: usize = 8192;

pub struct DownloadClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl DownloadClient {
    pub fn new(client: reqwest::Client, base_url: &str, retry: RetryPolicy) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        }
    }

    /// Downloads one product into `<output_dir>/<name>.zip`. Any failure left after the retry
    /// policy is exhausted is reported as `false`; a partially written file stays on disk.
    #[cfg_attr(not(test), allow(dead_code))]
    pub async fn download_product<A: Authenticate>(
        &self,
        session: &mut Session<A>,
        product: &ProductDescriptor,
        output_dir: &Path,
    ) -> bool {
        self.try_download(session, product, output_dir).await.is_ok()
    }

    /// Returns the number of bytes written, or the last error once retries are exhausted.
    pub async fn try_download<A: Authenticate>(
        &self,
        session: &mut Session<A>,
        product: &ProductDescriptor,
        output_dir: &Path,
    ) -> Result<u64, SentinelError> {
        let output_path = match output_path(output_dir, product) {
            Ok(path) => path,
            Err(e) => {
                error!("Not downloading {}: {}", product.id, e);
                return Err(e);
            }
        };
        let output_path = &output_path;
        let label = format!("Download of {}", product.name);

        with_retry(&self.retry, session, &label, move |token| {
            self.fetch(product, output_path, token)
        })
        .await
    }

    async fn fetch(
        &self,
        product: &ProductDescriptor,
        output_path: &Path,
        token: AccessToken,
    ) -> Result<u64, SentinelError> {
        let url = format!("{}/Products({})/$value", self.base_url, product.id);
        info!("Starting download: {}", url);

        let resp = self
            .client
            .get(&url)
            .header(AUTHORIZATION, token.bearer())
            .send()
            .await?
            .error_for_status()?;

        let total_size = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        let pb = create_progress_bar(&product.name, total_size);
        let mut downloaded: u64 = 0;

        let result = async {
            let mut file = File::create(output_path).await?;
            let mut stream = resp.bytes_stream();

            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| SentinelError::Download(e.to_string()))?;
                for piece in chunk.chunks(CHUNK_SIZE) {
                    file.write_all(piece).await?;
                    downloaded += piece.len() as u64;
                    pb.set_position(downloaded);
                }
            }

            file.flush().await?;
            Ok::<(), SentinelError>(())
        }
        .await;

        match result {
            Ok(()) => {
                pb.finish();
                info!("Downloaded {} ({} bytes)", output_path.display(), downloaded);
                Ok(downloaded)
            }
            Err(e) => {
                error!("Download failed for {}: {}", url, e);
                pb.abandon_with_message("Download failed");
                Err(e)
            }
        }
    }
}

/// `<output_dir>/<name>.zip`. The catalogue name must be a single plain file name so the
/// archive lands inside `output_dir`.
pub fn output_path(
    output_dir: &Path,
    product: &ProductDescriptor,
) -> Result<PathBuf, SentinelError> {
    let name = product.name.as_str();
    let mut components = Path::new(name).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(|c: char| c == '/' || c == '\\');

    if !plain {
        return Err(SentinelError::Download(format!(
            "product name {:?} is not a plain file name",
            name
        )));
    }
    Ok(output_dir.join(format!("{}.zip", name)))
}

fn create_progress_bar(name: &str, total_size: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_size);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})",
    )
    .map(|s| s.progress_chars("#>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(name.to_string());
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::CountingAuthenticator;
    use httpmock::prelude::*;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn product(id: &str, name: &str) -> ProductDescriptor {
        ProductDescriptor {
            id: id.to_string(),
            name: name.to_string(),
            cloud_cover: 5.0,
            attributes: Value::Null,
        }
    }

    fn client_for(server: &MockServer) -> DownloadClient {
        DownloadClient::new(
            reqwest::Client::new(),
            &server.base_url(),
            RetryPolicy::new(3, Duration::ZERO),
        )
    }

    fn payload(size: usize) -> Vec<u8> {
        (0..size).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_download_writes_zip_named_after_product() {
        let temp_dir = TempDir::new().unwrap();
        let data = payload(3 * CHUNK_SIZE + 17);
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path_contains("Products(p1)")
                    .header("Authorization", "Bearer token-1");
                then.status(200).body(&data);
            })
            .await;
        let mut session = Session::open(CountingAuthenticator::default()).await.unwrap();
        let product = product("p1", "S2A_MSIL2A_TEST");

        let ok = client_for(&server)
            .download_product(&mut session, &product, temp_dir.path())
            .await;

        assert!(ok);
        mock.assert_async().await;
        let written = std::fs::read(temp_dir.path().join("S2A_MSIL2A_TEST.zip")).unwrap();
        assert_eq!(written, data);
    }

    #[tokio::test]
    async fn test_download_retries_with_fresh_token() {
        let temp_dir = TempDir::new().unwrap();
        let server = MockServer::start_async().await;
        let rejected = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path_contains("Products(p2)")
                    .header("Authorization", "Bearer token-1");
                then.status(401);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path_contains("Products(p2)")
                    .header("Authorization", "Bearer token-2");
                then.status(200).body("zipdata");
            })
            .await;
        let mut session = Session::open(CountingAuthenticator::default()).await.unwrap();

        let bytes = client_for(&server)
            .try_download(&mut session, &product("p2", "second"), temp_dir.path())
            .await
            .unwrap();

        assert_eq!(bytes, 7);
        assert_eq!(rejected.hits_async().await, 1);
        assert_eq!(session.authenticator().refreshes(), 1);
    }

    #[tokio::test]
    async fn test_download_gives_up_after_three_attempts() {
        let temp_dir = TempDir::new().unwrap();
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path_contains("Products(p3)");
                then.status(503).body("busy");
            })
            .await;
        let mut session = Session::open(CountingAuthenticator::default()).await.unwrap();

        let ok = client_for(&server)
            .download_product(&mut session, &product("p3", "third"), temp_dir.path())
            .await;

        assert!(!ok);
        assert_eq!(mock.hits_async().await, 3);
        assert_eq!(session.authenticator().refreshes(), 2);
    }

    /// Serves every connection a 200 that promises `declared` bytes but sends only `sent` before
    /// closing. Returns the base URL and the number of connections accepted.
    async fn truncating_server(declared: usize, sent: usize) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = connections.clone();

        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                counter.fetch_add(1, Ordering::SeqCst);

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let head = format!(
                    "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                    declared
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&payload(sent)).await;
                let _ = socket.flush().await;
            }
        });

        (format!("http://{}", addr), connections)
    }

    #[tokio::test]
    async fn test_broken_stream_leaves_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let (base_url, connections) = truncating_server(100_000, 1_000).await;
        let client = DownloadClient::new(
            reqwest::Client::new(),
            &base_url,
            RetryPolicy::new(3, Duration::ZERO),
        );
        let mut session = Session::open(CountingAuthenticator::default()).await.unwrap();

        let ok = client
            .download_product(&mut session, &product("p5", "S2A_PARTIAL"), temp_dir.path())
            .await;

        assert!(!ok);
        assert_eq!(connections.load(Ordering::SeqCst), 3);
        assert_eq!(session.authenticator().refreshes(), 2);
        let partial = temp_dir.path().join("S2A_PARTIAL.zip");
        assert!(partial.exists());
        assert!(std::fs::metadata(&partial).unwrap().len() < 100_000);
    }

    #[test]
    fn test_output_path() {
        let path = output_path(Path::new("/data/north"), &product("x", "S2B_NAME")).unwrap();
        assert_eq!(path, PathBuf::from("/data/north/S2B_NAME.zip"));
    }

    #[test]
    fn test_output_path_rejects_names_leaving_the_directory() {
        let dir = Path::new("/data/north");
        for name in ["../escaped", "/etc/passwd", "a/b", "a\\b", "..", ".", ""] {
            assert!(
                output_path(dir, &product("x", name)).is_err(),
                "{:?} should be rejected",
                name
            );
        }
    }

    #[tokio::test]
    async fn test_traversing_name_is_a_failed_download() {
        let temp_dir = TempDir::new().unwrap();
        let region_dir = temp_dir.path().join("north");
        std::fs::create_dir_all(&region_dir).unwrap();
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path_contains("Products(p4)");
                then.status(200).body("zipdata");
            })
            .await;
        let mut session = Session::open(CountingAuthenticator::default()).await.unwrap();

        let ok = client_for(&server)
            .download_product(&mut session, &product("p4", "../escaped"), &region_dir)
            .await;

        assert!(!ok);
        assert_eq!(mock.hits_async().await, 0);
        assert!(!temp_dir.path().join("escaped.zip").exists());
        assert_eq!(session.authenticator().refreshes(), 0);
    }
}
