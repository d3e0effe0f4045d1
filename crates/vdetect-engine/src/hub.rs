//! Model repository HTTP client.
//!
//! Talks to a Hugging Face compatible endpoint:
//! - `GET {endpoint}/api/models/{repo}` lists repository files
//! - `GET {endpoint}/{repo}/resolve/{revision}/{file}` downloads one file
//!
//! Downloads stream into a sibling `.part` file and are renamed into place,
//! so a cache entry is either complete or absent.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info_span, Instrument};

use crate::config::ModelSettings;
use crate::error::{EngineError, EngineResult};

static PART_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Deserialize)]
struct RepoInfo {
    #[serde(default)]
    siblings: Vec<RepoSibling>,
}

#[derive(Debug, Deserialize)]
struct RepoSibling {
    rfilename: String,
}

/// Client for one model repository endpoint.
#[derive(Clone)]
pub struct HubClient {
    http: Client,
    endpoint: String,
    token: Option<String>,
}

impl HubClient {
    pub fn new(settings: &ModelSettings) -> EngineResult<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(settings.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("vdetect-engine/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EngineError::load(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            token: settings.usable_token().map(str::to_string),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// List the files stored in a repository.
    pub async fn list_files(&self, repo_id: &str) -> EngineResult<Vec<String>> {
        let url = format!("{}/api/models/{}", self.endpoint, repo_id);
        let context = format!("list files of {repo_id}");

        async {
            let response = self
                .authorized(self.http.get(&url))
                .send()
                .await
                .map_err(|e| EngineError::from_transport(&e, &context))?;

            let status = response.status();
            if !status.is_success() {
                return Err(EngineError::from_http_status(status.as_u16(), &context));
            }

            let info: RepoInfo = response
                .json()
                .await
                .map_err(|e| EngineError::from_transport(&e, &context))?;

            let files: Vec<String> = info.siblings.into_iter().map(|s| s.rfilename).collect();
            debug!(count = files.len(), "Repository listing received");
            Ok(files)
        }
        .instrument(info_span!("hub_list_files", repo = %repo_id))
        .await
    }

    /// Download one file to `dest`, returning the number of bytes written.
    pub async fn download(
        &self,
        repo_id: &str,
        revision: &str,
        filename: &str,
        dest: &Path,
    ) -> EngineResult<u64> {
        let url = format!(
            "{}/{}/resolve/{}/{}",
            self.endpoint, repo_id, revision, filename
        );
        let context = format!("download {filename}");

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                EngineError::load(format!("Cannot create cache dir {}: {e}", parent.display()))
            })?;
        }

        let part = part_path(dest);
        let result = self
            .stream_to(&url, &context, &part)
            .instrument(info_span!("hub_download", file = %filename))
            .await;

        match result {
            Ok(written) => {
                tokio::fs::rename(&part, dest).await.map_err(|e| {
                    EngineError::load(format!("Cannot move {filename} into cache: {e}"))
                })?;
                Ok(written)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }

    async fn stream_to(&self, url: &str, context: &str, part: &Path) -> EngineResult<u64> {
        let response = self
            .authorized(self.http.get(url))
            .send()
            .await
            .map_err(|e| EngineError::from_transport(&e, context))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::from_http_status(status.as_u16(), context));
        }

        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| EngineError::load(format!("{context}: cannot write cache: {e}")))?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| EngineError::from_transport(&e, context))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| EngineError::load(format!("{context}: cannot write cache: {e}")))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| EngineError::load(format!("{context}: cannot write cache: {e}")))?;

        debug!(bytes = written, "Download complete");
        Ok(written)
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let n = PART_COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = dest
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.{}-{n}.part", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_for(server: &MockServer, token: Option<&str>) -> ModelSettings {
        ModelSettings {
            endpoint: server.uri(),
            token: token.map(str::to_string),
            ..ModelSettings::default()
        }
    }

    #[tokio::test]
    async fn test_list_files_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/models/acme/detector"))
            .and(header("authorization", "Bearer hf_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "acme/detector",
                "siblings": [{"rfilename": "config.json"}, {"rfilename": "model.onnx"}]
            })))
            .mount(&server)
            .await;

        let client = HubClient::new(&settings_for(&server, Some("hf_test"))).unwrap();
        let files = client.list_files("acme/detector").await.unwrap();
        assert_eq!(files, vec!["config.json", "model.onnx"]);
    }

    #[tokio::test]
    async fn test_list_files_unauthorized_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/models/acme/detector"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = HubClient::new(&settings_for(&server, Some("hf_bad"))).unwrap();
        let err = client.list_files("acme/detector").await.unwrap_err();
        assert!(matches!(err, EngineError::Auth(_)));
    }

    #[tokio::test]
    async fn test_list_files_malformed_body_is_load_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/models/acme/detector"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = HubClient::new(&settings_for(&server, None)).unwrap();
        let err = client.list_files("acme/detector").await.unwrap_err();
        assert!(matches!(err, EngineError::Load(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let settings = ModelSettings {
            endpoint: "http://127.0.0.1:1".to_string(),
            connect_timeout: Duration::from_millis(500),
            ..ModelSettings::default()
        };
        let client = HubClient::new(&settings).unwrap();
        let err = client.list_files("acme/detector").await.unwrap_err();
        assert!(matches!(err, EngineError::Network(_)));
    }

    #[tokio::test]
    async fn test_download_writes_file_atomically() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/acme/detector/resolve/main/model.onnx"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.onnx");
        let client = HubClient::new(&settings_for(&server, None)).unwrap();
        let written = client
            .download("acme/detector", "main", "model.onnx", &dest)
            .await
            .unwrap();

        assert_eq!(written, 4096);
        assert_eq!(std::fs::read(&dest).unwrap(), vec![7u8; 4096]);
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/acme/detector/resolve/main/model.onnx"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.onnx");
        let client = HubClient::new(&settings_for(&server, None)).unwrap();
        let err = client
            .download("acme/detector", "main", "model.onnx", &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Network(_)));
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
