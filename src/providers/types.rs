//! Shared types for the Drive operations layer
//!
//! Contains the remote file snapshot, upload result, download planning types
//! and the error type used by every operation.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Google Docs document (word processor) mime type
pub const GOOGLE_DOCUMENT_MIME: &str = "application/vnd.google-apps.document";
/// Google Sheets spreadsheet mime type
pub const GOOGLE_SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";
/// Google Drive folder mime type
pub const GOOGLE_FOLDER_MIME: &str = "application/vnd.google-apps.folder";
/// Prefix shared by every provider-native mime type
const GOOGLE_APPS_PREFIX: &str = "application/vnd.google-apps.";

/// Read-only snapshot of a file as reported by the storage service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Provider-assigned identifier, stable across renames
    pub id: String,
    /// Display name (not unique)
    pub name: String,
    /// Content type
    pub mime_type: String,
    /// Absent for provider-native documents
    pub file_extension: Option<String>,
    pub size_bytes: Option<u64>,
    pub created_time: Option<DateTime<Utc>>,
    pub modified_time: Option<DateTime<Utc>>,
}

impl RemoteFile {
    /// Whether this entry is a folder
    pub fn is_folder(&self) -> bool {
        self.mime_type == GOOGLE_FOLDER_MIME
    }

    /// Whether the content lives in a proprietary editable format
    /// (Docs, Sheets, Slides, ...). Only some of these can be exported.
    pub fn is_provider_native(&self) -> bool {
        self.mime_type.starts_with(GOOGLE_APPS_PREFIX)
    }
}

/// Identity assigned by the service to a newly created file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub id: String,
    pub name: String,
}

/// One batch of a cursor-paginated listing. Never handed to callers.
#[derive(Debug, Clone, Default)]
pub(crate) struct ListingPage {
    pub files: Vec<RemoteFile>,
    pub next_page_token: Option<String>,
}

/// Office format a provider-native document is converted to on export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Docx,
    Xlsx,
}

impl ExportFormat {
    /// Target mime type passed to the export endpoint
    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ExportFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }

    /// File extension of the exported file (without the dot)
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Docx => "docx",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// How a remote file's content is fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadPlan {
    /// Stream the raw media content
    Direct,
    /// Convert through the export endpoint first
    ExportAs(ExportFormat),
}

/// Result of a finished download
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadOutcome {
    /// Local file that was written
    pub path: PathBuf,
    pub bytes_written: u64,
    pub plan: DownloadPlan,
}

/// Error type for every Drive operation
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Remote file not found: {0}")]
    NotFound(String),

    #[error("Local I/O error on {}: {source}", .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation timed out")]
    Timeout,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DriveError {
    pub fn local_io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        DriveError::LocalIo {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Map a non-success HTTP response to an error.
    ///
    /// `body` is the raw response text; the API's `error.message` is used when present.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = format!("{} {}", status.as_u16(), api_error_message(body));
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DriveError::Authorization(detail),
            StatusCode::NOT_FOUND => DriveError::NotFound(detail),
            _ => DriveError::Transport(detail),
        }
    }

    /// Network or service level failure (a missing remote object counts too)
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            DriveError::Transport(_) | DriveError::NotFound(_) | DriveError::Timeout
        )
    }

    /// Whether the caller may reasonably retry the whole operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, DriveError::Transport(_) | DriveError::Timeout)
    }
}

impl From<reqwest::Error> for DriveError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DriveError::Timeout
        } else {
            DriveError::Transport(e.to_string())
        }
    }
}

/// Extract `error.message` from a Drive API error body, falling back to a
/// truncated copy of the raw text.
fn api_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ApiErrorBody {
        error: ApiError,
    }
    #[derive(Deserialize)]
    struct ApiError {
        message: String,
    }

    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.trim().chars().take(200).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(mime: &str) -> RemoteFile {
        RemoteFile {
            id: "1".to_string(),
            name: "x".to_string(),
            mime_type: mime.to_string(),
            file_extension: None,
            size_bytes: None,
            created_time: None,
            modified_time: None,
        }
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            DriveError::from_status(StatusCode::UNAUTHORIZED, ""),
            DriveError::Authorization(_)
        ));
        assert!(matches!(
            DriveError::from_status(StatusCode::FORBIDDEN, ""),
            DriveError::Authorization(_)
        ));
        assert!(matches!(
            DriveError::from_status(StatusCode::NOT_FOUND, ""),
            DriveError::NotFound(_)
        ));
        assert!(matches!(
            DriveError::from_status(StatusCode::INTERNAL_SERVER_ERROR, ""),
            DriveError::Transport(_)
        ));
    }

    #[test]
    fn test_api_error_message_extracted() {
        let body = r#"{"error":{"code":404,"message":"File not found: abc.","errors":[]}}"#;
        let err = DriveError::from_status(StatusCode::NOT_FOUND, body);
        assert_eq!(err.to_string(), "Remote file not found: 404 File not found: abc.");
    }

    #[test]
    fn test_not_found_is_transport_class() {
        assert!(DriveError::NotFound("x".into()).is_transport());
        assert!(DriveError::Timeout.is_transport());
        assert!(!DriveError::Authorization("x".into()).is_transport());
        assert!(!DriveError::Cancelled.is_transport());
        assert!(!DriveError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn test_local_io_display_includes_path() {
        let err = DriveError::local_io(
            "/tmp/missing.bin",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.to_string(), "Local I/O error on /tmp/missing.bin: gone");
    }

    #[test]
    fn test_remote_file_predicates() {
        assert!(remote(GOOGLE_FOLDER_MIME).is_folder());
        assert!(remote(GOOGLE_DOCUMENT_MIME).is_provider_native());
        assert!(!remote("image/png").is_provider_native());
        assert!(!remote("image/png").is_folder());
    }

    #[test]
    fn test_export_format_targets() {
        assert_eq!(ExportFormat::Docx.extension(), "docx");
        assert_eq!(ExportFormat::Xlsx.extension(), "xlsx");
        assert!(ExportFormat::Xlsx.mime_type().ends_with("spreadsheetml.sheet"));
    }
}
