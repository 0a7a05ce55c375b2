// Drive Ops - Google Drive file operations over a delegated access token
// List, upload and download (with Docs/Sheets export) behind one session queue

pub mod drive_config;
pub mod operations;
pub mod providers;
pub mod session_manager;
pub mod transfer;

pub use drive_config::DriveConfig;
pub use operations::{classify, RemoteFileOperations};
pub use providers::{
    DownloadOutcome, DownloadPlan, DriveClient, DriveError, ExportFormat, RemoteFile, UploadResult,
};
pub use session_manager::{DriveSession, SessionInfo};
pub use transfer::{ProgressCallback, TransferControl};
