//! Storage provider layer
//!
//! Everything that talks to the Drive REST API lives here: the authorized
//! client handle, the retry wrapper for reads, and the shared types.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │        RemoteFileOperations          │
//! │   list_all_files, upload, download   │
//! └──────────────────────────────────────┘
//!                    │
//!          ┌─────────▼─────────┐
//!          │    DriveClient    │  bearer token, endpoints
//!          └─────────┬─────────┘
//!                    │ send_with_retry (GET only)
//!          ┌─────────▼─────────┐
//!          │  Drive REST API   │
//!          └───────────────────┘
//! ```

pub mod google_drive;
pub mod http_retry;
pub mod types;

pub use google_drive::DriveClient;
pub use http_retry::HttpRetryConfig;
pub use types::*;
