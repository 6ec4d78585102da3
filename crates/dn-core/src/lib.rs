//! Core types shared by every stage of the denoise pipeline
//!
//! - [`SignalBuffer`]: f32 samples with explicit channel layout and sample rate
//! - [`ProgressFn`]: engine progress reporting with cooperative cancellation
//! - [`CancelToken`]: shared cancellation flag checked at stage boundaries

mod error;
mod progress;
mod signal;

pub use error::{SignalError, SignalResult};
pub use progress::{report, CancelToken, Cancelled, ProgressFn};
pub use signal::{ChannelLayout, SignalBuffer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
