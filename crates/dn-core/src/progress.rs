//! Progress reporting and cooperative cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Returned by a progress callback to stop the running operation
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Processing cancelled")]
pub struct Cancelled;

/// Engine progress callback: `(fraction in [0, 1], message)`
///
/// Returning `Err(Cancelled)` asks the engine to abandon the work; engines
/// propagate it with `?`.
pub type ProgressFn<'a> = dyn FnMut(f64, &str) -> Result<(), Cancelled> + 'a;

/// Invoke an optional progress callback
pub fn report(
    progress: &mut Option<&mut ProgressFn<'_>>,
    fraction: f64,
    message: &str,
) -> Result<(), Cancelled> {
    match progress {
        Some(callback) => callback(fraction.clamp(0.0, 1.0), message),
        None => Ok(()),
    }
}

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Clear a previous request
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() { Err(Cancelled) } else { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_clamps_and_forwards() {
        let mut seen = Vec::new();
        let mut callback = |fraction: f64, message: &str| -> Result<(), Cancelled> {
            seen.push((fraction, message.to_string()));
            Ok(())
        };
        let mut progress: Option<&mut ProgressFn<'_>> = Some(&mut callback);

        report(&mut progress, 1.5, "done").unwrap();
        report(&mut progress, -1.0, "start").unwrap();
        drop(progress);

        assert_eq!(seen[0].0, 1.0);
        assert_eq!(seen[1].0, 0.0);
        assert_eq!(seen[0].1, "done");
    }

    #[test]
    fn test_report_without_callback() {
        let mut progress: Option<&mut ProgressFn<'_>> = None;
        assert!(report(&mut progress, 0.5, "noop").is_ok());
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());

        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(Cancelled));

        token.reset();
        assert!(!clone.is_cancelled());
    }
}
