// Stream-to-file copy used by every download path
// Writes chunk by chunk, reports progress and stops on cancellation

use futures_util::{Stream, StreamExt};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::providers::DriveError;

/// Progress callback: (bytes transferred, total bytes or 0 when unknown)
pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send + Sync>;

/// Per-call cancellation and progress reporting
#[derive(Default)]
pub struct TransferControl {
    pub cancel: CancellationToken,
    pub on_progress: Option<ProgressCallback>,
}

impl TransferControl {
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            on_progress: None,
        }
    }

    pub(crate) fn ensure_active(&self) -> Result<(), DriveError> {
        if self.cancel.is_cancelled() {
            return Err(DriveError::Cancelled);
        }
        Ok(())
    }

    fn report(&self, transferred: u64, total: u64) {
        if let Some(ref cb) = self.on_progress {
            cb(transferred, total);
        }
    }
}

/// Copy an HTTP response body into `destination`.
///
/// The file is created (or truncated) before the first chunk arrives; on
/// failure whatever was written stays on disk.
pub(crate) async fn copy_response_to_file(
    response: reqwest::Response,
    destination: &Path,
    control: &TransferControl,
) -> Result<u64, DriveError> {
    let total = response.content_length().unwrap_or(0);
    copy_stream_to_file(response.bytes_stream(), total, destination, control).await
}

pub(crate) async fn copy_stream_to_file<S, B, E>(
    stream: S,
    total: u64,
    destination: &Path,
    control: &TransferControl,
) -> Result<u64, DriveError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<DriveError>,
{
    let mut file = tokio::fs::File::create(destination)
        .await
        .map_err(|e| DriveError::local_io(destination, e))?;

    let mut stream = std::pin::pin!(stream);
    let mut written: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = control.cancel.cancelled() => return Err(DriveError::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(Into::<DriveError>::into)?;
        let bytes = chunk.as_ref();

        file.write_all(bytes)
            .await
            .map_err(|e| DriveError::local_io(destination, e))?;
        written += bytes.len() as u64;
        control.report(written, total);
    }

    file.flush()
        .await
        .map_err(|e| DriveError::local_io(destination, e))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<Vec<u8>, DriveError>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok::<_, DriveError>(p.to_vec()))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_copies_all_chunks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");

        let n = copy_stream_to_file(
            chunks(&[b"hello ", b"drive", b"!"]),
            12,
            &dest,
            &TransferControl::default(),
        )
        .await
        .unwrap();

        assert_eq!(n, 12);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello drive!");
    }

    #[tokio::test]
    async fn test_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let last = Arc::new(AtomicU64::new(0));
        let seen = last.clone();
        let control = TransferControl {
            on_progress: Some(Box::new(move |done, total| {
                assert_eq!(total, 6);
                seen.store(done, Ordering::SeqCst);
            })),
            ..Default::default()
        };

        copy_stream_to_file(chunks(&[b"abc", b"def"]), 6, &dest, &control)
            .await
            .unwrap();
        assert_eq!(last.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_stream_error_leaves_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("partial.bin");
        let parts = stream::iter(vec![
            Ok(b"first".to_vec()),
            Err(DriveError::Transport("connection reset".to_string())),
        ]);

        let err = copy_stream_to_file(parts, 0, &dest, &TransferControl::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::Transport(_)));
        assert_eq!(std::fs::read(&dest).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_cancelled_before_first_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("never.bin");
        let control = TransferControl::default();
        control.cancel.cancel();

        let err = copy_stream_to_file(chunks(&[b"data"]), 4, &dest, &control)
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::Cancelled));
    }

    #[tokio::test]
    async fn test_unwritable_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("no-such-dir").join("out.bin");

        let err = copy_stream_to_file(chunks(&[b"x"]), 1, &dest, &TransferControl::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::LocalIo { .. }));
    }
}
