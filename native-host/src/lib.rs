//! Metarelay Host - Native side of the page-metadata relay
//!
//! The browser launches this process and exchanges length-prefixed JSON
//! frames with it over stdin/stdout. Local applications ask for the active
//! tab's metadata through a Unix socket; the host turns each ask into a
//! correlated request to the extension.

pub mod codec;
pub mod config;
pub mod error;
pub mod host;
pub mod pipe_server;

// Re-export commonly used types
pub use codec::{read_frame, write_frame, MAX_FRAME_LEN};
pub use config::HostConfig;
pub use error::{ConfigError, FrameError, HostError, ServerError};
pub use host::NativeMessagingHost;
pub use pipe_server::{PipeReply, PipeServer};
