//! Progress stream controller.
//!
//! Drives one event stream: clears the stale archive, starts the worker,
//! forwards its events as frames, and ends with a redirect or an error.

use crate::error::{Error, Result};
use crate::streaming::channel::{ProgressEvent, ProgressReceiver};
use crate::streaming::protocol::{keep_alive_frame, url_path_join, StreamMessage};
use crate::streaming::sink::ProgressSink;
use crate::streaming::target::ArchiveTarget;
use crate::streaming::worker::ArchiveWorker;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Query parameter carrying the client's base URL
pub const BASE_URL_PARAM: &str = "baseUrl";

/// Path segment the client is sent to once the archive is ready
pub const REDIRECT_SEGMENT: &str = "tree";

/// Lifecycle of one stream. `Finished` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Init,
    ClearingOutput,
    Zipping,
    Finished,
    Failed,
}

impl ControllerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ControllerState::Finished | ControllerState::Failed)
    }
}

/// Controller for a single archive stream
#[derive(Debug, Clone)]
pub struct ProgressStream {
    target: ArchiveTarget,
    keep_alive: Option<Duration>,
}

impl ProgressStream {
    pub fn new(target: ArchiveTarget) -> Self {
        Self {
            target,
            keep_alive: None,
        }
    }

    /// Flush a comment frame whenever the worker is quiet for `period`.
    pub fn with_keep_alive(mut self, period: Option<Duration>) -> Self {
        self.keep_alive = period;
        self
    }

    /// Run the stream to a terminal state. Never fails: errors become an
    /// `error` message on the sink, or a log line if the sink itself broke.
    pub async fn run<S>(&self, base_url: Option<&str>, sink: &mut S) -> ControllerState
    where
        S: ProgressSink + ?Sized,
    {
        let mut state = ControllerState::Init;
        let result = self.drive(base_url, sink, &mut state).await;

        match result {
            Ok(terminal) => terminal,
            Err(e) if e.is_transport() => {
                warn!(?state, error = %e, "Client went away, ending stream");
                ControllerState::Failed
            }
            Err(e) => {
                warn!(?state, error = %e, "Archive stream failed");
                let err = anyhow::Error::new(e);
                let msg = StreamMessage::error(format!("{:#}", err), format!("{:?}", err));
                if let Err(e) = emit(sink, &msg).await {
                    warn!(error = %e, "Failed to report stream error");
                }
                ControllerState::Failed
            }
        }
    }

    async fn drive<S>(
        &self,
        base_url: Option<&str>,
        sink: &mut S,
        state: &mut ControllerState,
    ) -> Result<ControllerState>
    where
        S: ProgressSink + ?Sized,
    {
        let base_url = base_url.ok_or(Error::MissingParameter(BASE_URL_PARAM))?;

        transition(state, ControllerState::ClearingOutput);
        self.clear_output(sink).await?;

        transition(state, ControllerState::Zipping);
        emit(sink, &StreamMessage::zipping("Zipping files:\n")).await?;

        let (handle, mut rx) = ArchiveWorker::new(self.target.clone()).spawn();

        loop {
            match self.next_event(&mut rx, sink).await? {
                Some(ProgressEvent::Output { text }) => {
                    emit(sink, &StreamMessage::zipping(format!("{}\n", text))).await?;
                }
                Some(ProgressEvent::Error {
                    message,
                    diagnostic,
                }) => {
                    emit(sink, &StreamMessage::error(message, diagnostic)).await?;
                    transition(state, ControllerState::Failed);
                    return Ok(*state);
                }
                Some(ProgressEvent::Done) => break,
                None => return Err(worker_lost(handle).await),
            }
        }

        let redirect = url_path_join(&[base_url, REDIRECT_SEGMENT]);
        emit(sink, &StreamMessage::finished(redirect)).await?;
        transition(state, ControllerState::Finished);
        Ok(*state)
    }

    /// Remove the archive left by a previous run, if any.
    async fn clear_output<S>(&self, sink: &mut S) -> Result<()>
    where
        S: ProgressSink + ?Sized,
    {
        let name = self.target.display_name();
        let path = self.target.archive_path();

        emit(sink, &StreamMessage::zipping(format!("Removing old {}...\n", name))).await?;

        let is_file = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);

        if is_file {
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| Error::filesystem(path, e))?;
            emit(sink, &StreamMessage::zipping(format!("Removed old {}!\n", name))).await
        } else {
            emit(
                sink,
                &StreamMessage::zipping(format!("{} does not exist!\n", name)),
            )
            .await
        }
    }

    async fn next_event<S>(
        &self,
        rx: &mut ProgressReceiver,
        sink: &mut S,
    ) -> Result<Option<ProgressEvent>>
    where
        S: ProgressSink + ?Sized,
    {
        let Some(period) = self.keep_alive else {
            return Ok(rx.recv().await);
        };

        loop {
            match tokio::time::timeout(period, rx.recv()).await {
                Ok(event) => return Ok(event),
                Err(_) => sink.send_frame(keep_alive_frame()).await?,
            }
        }
    }
}

fn transition(state: &mut ControllerState, next: ControllerState) {
    debug!(from = ?*state, to = ?next, "Stream state");
    *state = next;
}

/// Encode, log and send one message.
async fn emit<S>(sink: &mut S, msg: &StreamMessage) -> Result<()>
where
    S: ProgressSink + ?Sized,
{
    let frame = msg.encode()?;
    match msg.output() {
        Some(output) => info!("{}", output.trim_end()),
        None => info!("{}", msg.to_json()?),
    }
    sink.send_frame(frame).await
}

/// The worker dropped its sender without a terminal event.
async fn worker_lost(handle: JoinHandle<()>) -> Error {
    match handle.await {
        Err(e) if e.is_panic() => {
            let panic = e.into_panic();
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked".to_string());
            Error::WorkerLost(detail)
        }
        Err(e) => Error::WorkerLost(e.to_string()),
        Ok(()) => Error::WorkerLost("event channel closed".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::protocol::decode_stream;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct VecSink {
        body: String,
        fail_after: Option<usize>,
        sent: usize,
    }

    #[async_trait]
    impl ProgressSink for VecSink {
        async fn send_frame(&mut self, frame: Bytes) -> Result<()> {
            if self.fail_after.is_some_and(|n| self.sent >= n) {
                return Err(Error::Transport("broken pipe".to_string()));
            }
            self.sent += 1;
            self.body.push_str(std::str::from_utf8(&frame).unwrap());
            Ok(())
        }
    }

    fn outputs(messages: &[StreamMessage]) -> Vec<&str> {
        messages.iter().filter_map(|m| m.output()).collect()
    }

    #[test]
    fn test_state_terminality() {
        assert!(ControllerState::Finished.is_terminal());
        assert!(ControllerState::Failed.is_terminal());
        assert!(!ControllerState::Zipping.is_terminal());
    }

    #[tokio::test]
    async fn test_stream_success_sequence() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "alpha").unwrap();

        let controller = ProgressStream::new(ArchiveTarget::new(tmp.path(), "notebook.zip"));
        let mut sink = VecSink::default();
        let state = controller.run(Some("/user/alice/"), &mut sink).await;

        assert_eq!(state, ControllerState::Finished);
        let messages = decode_stream(&sink.body).unwrap();
        assert_eq!(
            messages,
            vec![
                StreamMessage::zipping("Removing old notebook.zip...\n"),
                StreamMessage::zipping("notebook.zip does not exist!\n"),
                StreamMessage::zipping("Zipping files:\n"),
                StreamMessage::zipping("a.txt\n"),
                StreamMessage::finished("/user/alice/tree"),
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_missing_base_url() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("notebook.zip"), "stale").unwrap();

        let controller = ProgressStream::new(ArchiveTarget::new(tmp.path(), "notebook.zip"));
        let mut sink = VecSink::default();
        let state = controller.run(None, &mut sink).await;

        assert_eq!(state, ControllerState::Failed);
        let messages = decode_stream(&sink.body).unwrap();
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            StreamMessage::Error { message, .. } => {
                assert_eq!(message, "Missing argument baseUrl");
            }
            other => panic!("Expected Error, got {:?}", other),
        }
        assert_eq!(
            fs::read_to_string(tmp.path().join("notebook.zip")).unwrap(),
            "stale"
        );
    }

    #[tokio::test]
    async fn test_stream_removes_stale_archive() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("notebook.zip"), "stale").unwrap();
        fs::write(tmp.path().join("a.txt"), "alpha").unwrap();

        let controller = ProgressStream::new(ArchiveTarget::new(tmp.path(), "notebook.zip"));
        let mut sink = VecSink::default();
        controller.run(Some("/"), &mut sink).await;

        let messages = decode_stream(&sink.body).unwrap();
        assert_eq!(messages[1], StreamMessage::zipping("Removed old notebook.zip!\n"));
        assert!(!outputs(&messages).contains(&"notebook.zip\n"));

        let archive =
            zip::ZipArchive::new(fs::File::open(tmp.path().join("notebook.zip")).unwrap())
                .unwrap();
        assert_eq!(archive.len(), 1);
    }

    #[tokio::test]
    async fn test_stream_worker_error_is_terminal() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "alpha").unwrap();
        let target = ArchiveTarget::with_archive_path(
            tmp.path(),
            tmp.path().join("no-such-dir").join("notebook.zip"),
        );

        let mut sink = VecSink::default();
        let state = ProgressStream::new(target)
            .run(Some("/"), &mut sink)
            .await;

        assert_eq!(state, ControllerState::Failed);
        let messages = decode_stream(&sink.body).unwrap();
        let last = messages.last().unwrap();
        assert!(matches!(last, StreamMessage::Error { .. }));
        assert_eq!(messages.iter().filter(|m| m.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_stream_transport_failure_stops_quietly() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "alpha").unwrap();

        let controller = ProgressStream::new(ArchiveTarget::new(tmp.path(), "notebook.zip"));
        let mut sink = VecSink {
            fail_after: Some(2),
            ..Default::default()
        };
        let state = controller.run(Some("/"), &mut sink).await;

        assert_eq!(state, ControllerState::Failed);
        assert_eq!(decode_stream(&sink.body).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stream_with_keep_alive() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "alpha").unwrap();

        let controller = ProgressStream::new(ArchiveTarget::new(tmp.path(), "notebook.zip"))
            .with_keep_alive(Some(Duration::from_millis(1)));
        let mut sink = VecSink::default();
        let state = controller.run(Some("base"), &mut sink).await;

        assert_eq!(state, ControllerState::Finished);
        let messages = decode_stream(&sink.body).unwrap();
        assert_eq!(messages.last(), Some(&StreamMessage::finished("base/tree")));
    }
}
