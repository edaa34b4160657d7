//! Archive progress streaming.
//!
//! Two-task pipeline: Worker -> Controller -> client
//!
//! # Architecture
//!
//! ```text
//! +----------------+  ProgressEvent  +----------------+  frames  +----------+
//! | ArchiveWorker  | --------------> | ProgressStream | -------> |   Sink   |
//! | (walk + zip)   |   (unbounded)   |  (controller)  | (bounded)| (HTTP)   |
//! +----------------+                 +----------------+          +----------+
//! ```
//!
//! The worker runs on the blocking pool and knows nothing about HTTP. The
//! controller turns its events into `data: <json>` frames and decides how
//! the stream ends. Dropping the sink's receiver (client disconnect) ends the
//! controller, which drops the event receiver, which stops the worker.

pub mod channel;
pub mod controller;
pub mod protocol;
pub mod sink;
pub mod target;
pub mod worker;

pub use channel::{progress_channel, ProgressEvent, ProgressReceiver, ProgressSender};
pub use controller::{ControllerState, ProgressStream, BASE_URL_PARAM};
pub use protocol::{decode_frame, decode_stream, url_path_join, StreamMessage};
pub use sink::{ChannelSink, ProgressSink};
pub use target::{ArchiveTarget, DEFAULT_ARCHIVE_NAME};
pub use worker::ArchiveWorker;
