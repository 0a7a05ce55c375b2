//! Remote file operations
//!
//! `RemoteFileOperations` is the caller-facing surface over one authorized
//! `DriveClient`: list every visible file, upload a local file, download a
//! remote file. Provider-native documents are exported to office formats on
//! download; `classify` decides which path a mime type takes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::providers::google_drive::NewFileMetadata;
use crate::providers::{
    DownloadOutcome, DownloadPlan, DriveClient, DriveError, ExportFormat, RemoteFile,
    UploadResult, GOOGLE_DOCUMENT_MIME, GOOGLE_SPREADSHEET_MIME,
};
use crate::transfer::{copy_response_to_file, TransferControl};

/// Files owned by or shared with the authenticated principal
const LIST_QUERY: &str = "'me' in owners or sharedWithMe";
/// Listing fields kept to what callers need
const LIST_FIELDS: &str = "nextPageToken, files(id, name, fileExtension, mimeType)";
/// Parent used when no folder id is given
const ROOT_FOLDER: &str = "root";

/// Decide how a file with `mime_type` is downloaded
pub fn classify(mime_type: &str) -> DownloadPlan {
    match mime_type {
        GOOGLE_DOCUMENT_MIME => DownloadPlan::ExportAs(ExportFormat::Docx),
        GOOGLE_SPREADSHEET_MIME => DownloadPlan::ExportAs(ExportFormat::Xlsx),
        _ => DownloadPlan::Direct,
    }
}

/// Local path a download with `plan` writes to: the caller's path, with the
/// extension replaced by the export format's for exported documents.
pub fn resolve_destination(destination: &Path, plan: DownloadPlan) -> PathBuf {
    match plan {
        DownloadPlan::Direct => destination.to_path_buf(),
        DownloadPlan::ExportAs(format) => destination.with_extension(format.extension()),
    }
}

/// Upload mime type inferred from the file extension
pub fn guess_mime_type(path: &Path) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}

/// Local file name for a remote file
pub fn suggested_local_name(file: &RemoteFile) -> String {
    let name = sanitize_file_name(&file.name);
    let extension = match classify(&file.mime_type) {
        DownloadPlan::ExportAs(format) => Some(format.extension()),
        DownloadPlan::Direct => file.file_extension.as_deref(),
    };

    match extension {
        Some(ext) if !has_extension(&name, ext) => format!("{}.{}", name, ext),
        _ => name,
    }
}

fn has_extension(name: &str, ext: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Remote names may contain path separators; keep them out of local paths
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "untitled".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// Façade over an authorized client handle
#[derive(Debug, Clone)]
pub struct RemoteFileOperations {
    client: Arc<DriveClient>,
}

impl RemoteFileOperations {
    pub fn new(client: Arc<DriveClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &DriveClient {
        &self.client
    }

    /// Every file visible to the principal, in the order the service returns them
    pub async fn list_all_files(&self) -> Result<Vec<RemoteFile>, DriveError> {
        self.list_all_files_with(&TransferControl::default()).await
    }

    /// Page through the listing until the service stops returning a cursor.
    ///
    /// Any failed page aborts the whole listing; nothing partial is returned.
    pub async fn list_all_files_with(
        &self,
        control: &TransferControl,
    ) -> Result<Vec<RemoteFile>, DriveError> {
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            control.ensure_active()?;

            let page = tokio::select! {
                biased;
                _ = control.cancel.cancelled() => return Err(DriveError::Cancelled),
                page = self.client.list_page(LIST_QUERY, LIST_FIELDS, page_token.as_deref()) => page?,
            };
            pages += 1;
            all_files.extend(page.files);
            debug!("Listing page {} done, {} files so far", pages, all_files.len());

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!("Listed {} files in {} pages", all_files.len(), pages);
        Ok(all_files)
    }

    /// Upload `local_path` as a new file under `parent_folder_id` (or the root)
    pub async fn upload_file(
        &self,
        local_path: &Path,
        mime_type: &str,
        parent_folder_id: Option<&str>,
    ) -> Result<UploadResult, DriveError> {
        self.upload_file_with(local_path, mime_type, parent_folder_id, &TransferControl::default())
            .await
    }

    pub async fn upload_file_with(
        &self,
        local_path: &Path,
        mime_type: &str,
        parent_folder_id: Option<&str>,
        control: &TransferControl,
    ) -> Result<UploadResult, DriveError> {
        control.ensure_active()?;

        let metadata = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| DriveError::local_io(local_path, e))?;
        if !metadata.is_file() {
            return Err(DriveError::local_io(
                local_path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                DriveError::local_io(
                    local_path,
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
                )
            })?;

        let new_file = NewFileMetadata {
            name,
            mime_type: mime_type.to_string(),
            parents: vec![parent_folder_id.unwrap_or(ROOT_FOLDER).to_string()],
        };
        info!(
            "Uploading {:?} ({} bytes, {}) to {}",
            local_path,
            metadata.len(),
            mime_type,
            new_file.parents[0]
        );

        tokio::select! {
            biased;
            _ = control.cancel.cancelled() => Err(DriveError::Cancelled),
            created = self.client.create(&new_file, local_path) => created,
        }
    }

    /// Download `remote_id` to `destination`.
    ///
    /// Documents and spreadsheets are exported (docx/xlsx) and land at
    /// `destination` with the matching extension; everything else is written
    /// to `destination` byte for byte.
    pub async fn download_file(
        &self,
        remote_id: &str,
        mime_type: &str,
        destination: &Path,
    ) -> Result<DownloadOutcome, DriveError> {
        self.download_file_with(remote_id, mime_type, destination, &TransferControl::default())
            .await
    }

    pub async fn download_file_with(
        &self,
        remote_id: &str,
        mime_type: &str,
        destination: &Path,
        control: &TransferControl,
    ) -> Result<DownloadOutcome, DriveError> {
        control.ensure_active()?;

        let plan = classify(mime_type);
        let path = resolve_destination(destination, plan);

        let bytes_written = match plan {
            DownloadPlan::Direct => {
                let response = tokio::select! {
                    biased;
                    _ = control.cancel.cancelled() => return Err(DriveError::Cancelled),
                    response = self.client.download_media(remote_id) => response?,
                };
                copy_response_to_file(response, &path, control).await?
            }
            DownloadPlan::ExportAs(format) => {
                self.export_file(remote_id, format, &path, control).await?
            }
        };

        info!("Downloaded {} to {:?} ({} bytes)", remote_id, path, bytes_written);
        Ok(DownloadOutcome {
            path,
            bytes_written,
            plan,
        })
    }

    /// Export a provider-native document and stream the converted bytes to `target`
    async fn export_file(
        &self,
        remote_id: &str,
        format: ExportFormat,
        target: &Path,
        control: &TransferControl,
    ) -> Result<u64, DriveError> {
        debug!("Exporting {} as {}", remote_id, format);
        let response = tokio::select! {
            biased;
            _ = control.cancel.cancelled() => return Err(DriveError::Cancelled),
            response = self.client.export(remote_id, format.mime_type()) => response?,
        };
        copy_response_to_file(response, target, control).await
    }
}
