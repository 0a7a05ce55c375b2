//! Google Drive REST client
//!
//! `DriveClient` is the authorized client handle: one HTTP client, one access
//! token, and the endpoints from `DriveConfig`. It exposes the four calls the
//! operations layer needs (list, media download, export, create) and maps
//! HTTP failures to `DriveError`. It never refreshes the token.

use futures_util::{future, stream, StreamExt};
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Body, Method, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use url::Url;

use super::http_retry::{send_with_retry, HttpRetryConfig};
use super::types::{DriveError, ListingPage, RemoteFile, UploadResult};
use crate::drive_config::{parse_base_url, DriveConfig};

/// Drive file metadata as returned by the API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    #[serde(default)]
    file_extension: Option<String>,
    /// Int64 encoded as a decimal string
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    created_time: Option<String>,
    #[serde(default)]
    modified_time: Option<String>,
}

impl From<DriveFile> for RemoteFile {
    fn from(file: DriveFile) -> Self {
        let parse_time = |s: Option<String>| {
            s.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
                .map(|t| t.with_timezone(&chrono::Utc))
        };

        RemoteFile {
            size_bytes: file.size.and_then(|s| s.parse().ok()),
            created_time: parse_time(file.created_time),
            modified_time: parse_time(file.modified_time),
            id: file.id,
            name: file.name,
            mime_type: file.mime_type,
            file_extension: file.file_extension.filter(|ext| !ext.is_empty()),
        }
    }
}

/// Drive file list response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Metadata part of a create request
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewFileMetadata {
    pub name: String,
    pub mime_type: String,
    pub parents: Vec<String>,
}

/// Authorized client handle for one access token
pub struct DriveClient {
    http: reqwest::Client,
    token: SecretString,
    api_base: Url,
    upload_base: Url,
    page_size: Option<u32>,
    retry: HttpRetryConfig,
}

impl std::fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveClient")
            .field("api_base", &self.api_base.as_str())
            .field("upload_base", &self.upload_base.as_str())
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl DriveClient {
    /// Build a client handle from an externally obtained access token
    pub fn new(access_token: impl Into<String>, config: &DriveConfig) -> Result<Self, DriveError> {
        let token = access_token.into();
        if token.trim().is_empty() {
            return Err(DriveError::Authorization("Access token is empty".to_string()));
        }
        config.validate()?;

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| DriveError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            token: SecretString::from(token),
            api_base: parse_base_url("api_base", &config.api_base)?,
            upload_base: parse_base_url("upload_base", &config.upload_base)?,
            page_size: config.page_size,
            retry: config.retry.clone(),
        })
    }

    fn auth_header(&self) -> Result<HeaderValue, DriveError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.token.expose_secret()))
            .map_err(|_| DriveError::Authorization("Access token is not a valid header value".to_string()))?;
        value.set_sensitive(true);
        Ok(value)
    }

    /// Append path segments to a base URL (segments are percent-encoded)
    fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, DriveError> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| DriveError::InvalidConfig(format!("Not a base URL: {}", base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send an idempotent GET through the retry wrapper and check its status
    async fn get(&self, url: Url) -> Result<Response, DriveError> {
        let request = self
            .http
            .request(Method::GET, url)
            .header(AUTHORIZATION, self.auth_header()?)
            .build()?;

        let response = send_with_retry(&self.http, request, &self.retry).await?;
        check_status(response).await
    }

    /// Fetch one listing page.
    ///
    /// `page_token` is forwarded verbatim; the returned cursor is `None` when
    /// the service reports no further pages.
    pub(crate) async fn list_page(
        &self,
        query: &str,
        fields: &str,
        page_token: Option<&str>,
    ) -> Result<ListingPage, DriveError> {
        let mut url = Self::endpoint(&self.api_base, &["files"])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", query)
                .append_pair("fields", fields)
                .append_pair("spaces", "drive");
            if let Some(size) = self.page_size {
                pairs.append_pair("pageSize", &size.to_string());
            }
            if let Some(token) = page_token {
                pairs.append_pair("pageToken", token);
            }
        }

        let response = self.get(url).await?;
        let list: DriveFileList = response
            .json()
            .await
            .map_err(|e| DriveError::Transport(format!("Malformed file list: {}", e)))?;

        debug!(
            "Listed {} files (more: {})",
            list.files.len(),
            list.next_page_token.is_some()
        );
        Ok(ListingPage {
            files: list.files.into_iter().map(RemoteFile::from).collect(),
            next_page_token: list.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    /// Start streaming a file's raw content
    pub(crate) async fn download_media(&self, file_id: &str) -> Result<Response, DriveError> {
        let mut url = Self::endpoint(&self.api_base, &["files", file_id])?;
        url.query_pairs_mut().append_pair("alt", "media");
        self.get(url).await
    }

    /// Start streaming a provider-native document converted to `target_mime`
    pub(crate) async fn export(&self, file_id: &str, target_mime: &str) -> Result<Response, DriveError> {
        let mut url = Self::endpoint(&self.api_base, &["files", file_id, "export"])?;
        url.query_pairs_mut().append_pair("mimeType", target_mime);
        self.get(url).await
    }

    /// Create a file from metadata plus the bytes of `local_path`.
    ///
    /// Sent as a single multipart/related request with the file part streamed
    /// from disk. Never retried.
    pub(crate) async fn create(
        &self,
        metadata: &NewFileMetadata,
        local_path: &Path,
    ) -> Result<UploadResult, DriveError> {
        let file = tokio::fs::File::open(local_path)
            .await
            .map_err(|e| DriveError::local_io(local_path, e))?;

        let boundary = format!("drive_ops_{}", uuid::Uuid::new_v4().simple());
        let metadata_json = serde_json::to_string(metadata)
            .map_err(|e| DriveError::Transport(format!("Failed to encode metadata: {}", e)))?;

        let head = format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n--{b}\r\nContent-Type: {mime}\r\n\r\n",
            b = boundary,
            meta = metadata_json,
            mime = metadata.mime_type,
        );
        let tail = format!("\r\n--{}--\r\n", boundary);

        let parts = stream::once(future::ready(Ok::<_, std::io::Error>(head.into_bytes())))
            .chain(ReaderStream::new(file).map(|chunk| chunk.map(|bytes| bytes.to_vec())))
            .chain(stream::once(future::ready(Ok(tail.into_bytes()))));

        let mut url = Self::endpoint(&self.upload_base, &["files"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "multipart")
            .append_pair("fields", "id,name");

        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, self.auth_header()?)
            .header(CONTENT_TYPE, format!("multipart/related; boundary={}", boundary))
            .body(Body::wrap_stream(parts))
            .send()
            .await?;
        let response = check_status(response).await?;

        let created: UploadResult = response
            .json()
            .await
            .map_err(|e| DriveError::Transport(format!("Malformed create response: {}", e)))?;

        info!("Created {} ({})", created.name, created.id);
        Ok(created)
    }
}

/// Turn a non-success response into a typed error
async fn check_status(response: Response) -> Result<Response, DriveError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(DriveError::from_status(status, &text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> DriveClient {
        let mut config = DriveConfig::with_base_url(&server.uri());
        config.retry = HttpRetryConfig::disabled();
        DriveClient::new("test-token", &config).unwrap()
    }

    #[test]
    fn test_empty_token_rejected() {
        let err = DriveClient::new("  ", &DriveConfig::default()).unwrap_err();
        assert!(matches!(err, DriveError::Authorization(_)));
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let client = DriveClient::new("super-secret", &DriveConfig::default()).unwrap();
        assert!(!format!("{:?}", client).contains("super-secret"));
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let base = Url::parse("https://www.googleapis.com/drive/v3").unwrap();
        let url = DriveClient::endpoint(&base, &["files", "a/b c", "export"]).unwrap();
        assert_eq!(url.as_str(), "https://www.googleapis.com/drive/v3/files/a%2Fb%20c/export");

        let root = Url::parse("http://127.0.0.1:9000/").unwrap();
        let url = DriveClient::endpoint(&root, &["files"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/files");
    }

    #[test]
    fn test_drive_file_conversion() {
        let json = r#"{
            "id": "f1", "name": "photo.jpg", "mimeType": "image/jpeg",
            "fileExtension": "jpg", "size": "2048",
            "createdTime": "2024-03-01T10:00:00.000Z",
            "modifiedTime": "2024-03-02T11:30:00Z"
        }"#;
        let file: RemoteFile = serde_json::from_str::<DriveFile>(json).unwrap().into();
        assert_eq!(file.size_bytes, Some(2048));
        assert_eq!(file.file_extension.as_deref(), Some("jpg"));
        assert_eq!(
            file.modified_time.unwrap().to_rfc3339(),
            "2024-03-02T11:30:00+00:00"
        );

        let native = r#"{"id": "d1", "name": "Notes", "mimeType": "application/vnd.google-apps.document"}"#;
        let file: RemoteFile = serde_json::from_str::<DriveFile>(native).unwrap().into();
        assert!(file.file_extension.is_none());
        assert!(file.size_bytes.is_none());
    }

    #[tokio::test]
    async fn test_list_page_sends_query_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .and(header("authorization", "Bearer test-token"))
            .and(query_param("q", "'me' in owners"))
            .and(query_param("fields", "files(id)"))
            .and(query_param("spaces", "drive"))
            .and(query_param("pageToken", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{"id": "1", "name": "a.txt", "mimeType": "text/plain"}],
                "nextPageToken": ""
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client_for(&server)
            .list_page("'me' in owners", "files(id)", Some("abc"))
            .await
            .unwrap();
        assert_eq!(page.files.len(), 1);
        assert!(page.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_status_codes_map_to_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/expired"))
            .respond_with(ResponseTemplate::new(401).set_body_string(
                r#"{"error":{"code":401,"message":"Invalid Credentials"}}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.download_media("expired").await.unwrap_err();
        assert!(matches!(err, DriveError::Authorization(ref m) if m.contains("Invalid Credentials")));

        let err = client.download_media("missing").await.unwrap_err();
        assert!(matches!(err, DriveError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_malformed_listing_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).list_page("q", "f", None).await.unwrap_err();
        assert!(matches!(err, DriveError::Transport(_)));
    }
}
