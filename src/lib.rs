//! nbzip - zip a working directory on the server and stream progress to the
//! browser over server-sent events.

pub mod cli;
pub mod config;
pub mod error;
pub mod server;
pub mod streaming;

pub use error::{Error, Result};
