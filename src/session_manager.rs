//! Session Manager - one serialized operation queue per access token
//!
//! A `DriveSession` owns the authorized client handle for its token and a
//! single background worker. Operations submitted to the session run one at a
//! time in submission order; exports run inside the same unit of work as the
//! download that triggered them. Closing the session cancels in-flight work
//! and stops the worker.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::drive_config::DriveConfig;
use crate::operations::RemoteFileOperations;
use crate::providers::{DownloadOutcome, DriveClient, DriveError, RemoteFile, UploadResult};
use crate::transfer::{ProgressCallback, TransferControl};

/// Jobs waiting behind the one currently running
const JOB_QUEUE_DEPTH: usize = 32;

type Reply<T> = oneshot::Sender<Result<T, DriveError>>;

/// Session metadata
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub opened_at: DateTime<Utc>,
}

enum Job {
    ListAll {
        reply: Reply<Vec<RemoteFile>>,
    },
    Upload {
        local_path: PathBuf,
        mime_type: String,
        parent_folder_id: Option<String>,
        reply: Reply<UploadResult>,
    },
    Download {
        remote_id: String,
        mime_type: String,
        destination: PathBuf,
        on_progress: Option<ProgressCallback>,
        reply: Reply<DownloadOutcome>,
    },
}

impl Job {
    fn name(&self) -> &'static str {
        match self {
            Job::ListAll { .. } => "list",
            Job::Upload { .. } => "upload",
            Job::Download { .. } => "download",
        }
    }
}

/// Serialized operation queue bound to one authorized client handle.
///
/// Must be opened inside a tokio runtime.
pub struct DriveSession {
    info: SessionInfo,
    ops: RemoteFileOperations,
    jobs: mpsc::Sender<Job>,
    shutdown: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl DriveSession {
    /// Build the client handle for `access_token` and start the worker
    pub fn open(access_token: impl Into<String>, config: &DriveConfig) -> Result<Self, DriveError> {
        let client = DriveClient::new(access_token, config)?;
        Ok(Self::with_client(Arc::new(client), config.operation_timeout()))
    }

    /// Start a session over an existing client handle
    pub fn with_client(client: Arc<DriveClient>, operation_timeout: Option<Duration>) -> Self {
        let ops = RemoteFileOperations::new(client);
        let (jobs, queue) = mpsc::channel(JOB_QUEUE_DEPTH);
        let shutdown = CancellationToken::new();
        let info = SessionInfo {
            session_id: Uuid::new_v4(),
            opened_at: Utc::now(),
        };

        let worker = tokio::spawn(run_worker(
            ops.clone(),
            queue,
            shutdown.clone(),
            operation_timeout,
        ));

        info!("Drive session {} opened", info.session_id);
        Self {
            info,
            ops,
            jobs,
            shutdown,
            worker: Some(worker),
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Direct access to the operations, bypassing the queue
    pub fn operations(&self) -> &RemoteFileOperations {
        &self.ops
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub async fn list_all_files(&self) -> Result<Vec<RemoteFile>, DriveError> {
        self.submit(|reply| Job::ListAll { reply }).await
    }

    pub async fn upload_file(
        &self,
        local_path: impl Into<PathBuf>,
        mime_type: &str,
        parent_folder_id: Option<&str>,
    ) -> Result<UploadResult, DriveError> {
        let local_path = local_path.into();
        self.submit(|reply| Job::Upload {
            local_path,
            mime_type: mime_type.to_string(),
            parent_folder_id: parent_folder_id.map(str::to_string),
            reply,
        })
        .await
    }

    pub async fn download_file(
        &self,
        remote_id: &str,
        mime_type: &str,
        destination: impl Into<PathBuf>,
        on_progress: Option<ProgressCallback>,
    ) -> Result<DownloadOutcome, DriveError> {
        let destination = destination.into();
        self.submit(|reply| Job::Download {
            remote_id: remote_id.to_string(),
            mime_type: mime_type.to_string(),
            destination,
            on_progress,
            reply,
        })
        .await
    }

    async fn submit<T>(&self, make_job: impl FnOnce(Reply<T>) -> Job) -> Result<T, DriveError> {
        if self.is_closed() {
            return Err(DriveError::Cancelled);
        }

        let (reply, response) = oneshot::channel();
        self.jobs
            .send(make_job(reply))
            .await
            .map_err(|_| DriveError::Cancelled)?;
        // A dropped reply means the worker stopped before finishing the job
        response.await.map_err(|_| DriveError::Cancelled)?
    }

    /// Cancel running work and stop accepting new jobs
    pub fn close(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Drive session {} closing", self.info.session_id);
            self.shutdown.cancel();
        }
    }

    /// Close the session and wait for the worker to exit
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!("Drive session worker ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for DriveSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_worker(
    ops: RemoteFileOperations,
    mut queue: mpsc::Receiver<Job>,
    shutdown: CancellationToken,
    operation_timeout: Option<Duration>,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = queue.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        debug!("Running {} job", job.name());
        let control = TransferControl::with_cancel(shutdown.child_token());

        match job {
            Job::ListAll { reply } => {
                let result = bounded(operation_timeout, ops.list_all_files_with(&control)).await;
                let _ = reply.send(result);
            }
            Job::Upload {
                local_path,
                mime_type,
                parent_folder_id,
                reply,
            } => {
                let result = bounded(
                    operation_timeout,
                    ops.upload_file_with(&local_path, &mime_type, parent_folder_id.as_deref(), &control),
                )
                .await;
                let _ = reply.send(result);
            }
            Job::Download {
                remote_id,
                mime_type,
                destination,
                on_progress,
                reply,
            } => {
                let control = TransferControl {
                    on_progress,
                    ..control
                };
                let result = bounded(
                    operation_timeout,
                    ops.download_file_with(&remote_id, &mime_type, &destination, &control),
                )
                .await;
                let _ = reply.send(result);
            }
        }
    }

    queue.close();
    debug!("Drive session worker stopped");
}

/// Apply the session's per-operation deadline
async fn bounded<T>(
    limit: Option<Duration>,
    operation: impl std::future::Future<Output = Result<T, DriveError>>,
) -> Result<T, DriveError> {
    match limit {
        Some(limit) => match tokio::time::timeout(limit, operation).await {
            Ok(result) => result,
            Err(_) => Err(DriveError::Timeout),
        },
        None => operation.await,
    }
}
