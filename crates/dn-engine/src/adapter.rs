//! Uniform engine interface

use dn_core::{ProgressFn, SignalBuffer};

use crate::error::EngineResult;
use crate::kind::EngineKind;

/// Common trait for all noise reduction engines
///
/// `process` returns a buffer with the same layout and frame count as the
/// input. Progress fractions are reported in `[0, 1]` and never decrease;
/// returning `Err(Cancelled)` from the callback abandons the work.
pub trait EngineAdapter: Send + Sync {
    /// Which engine this is
    fn kind(&self) -> EngineKind;

    /// Capability probe; engines without external dependencies are always available
    fn is_available(&self) -> bool {
        true
    }

    /// Reduce noise in `signal`
    fn process(
        &self,
        signal: &SignalBuffer,
        progress: Option<&mut ProgressFn<'_>>,
    ) -> EngineResult<SignalBuffer>;

    /// Rough wall-clock estimate (seconds) for `duration_seconds` of audio
    fn estimate_processing_time(&self, duration_seconds: f64) -> f64;
}

/// Force `buffer` into `reference`'s layout and frame count
///
/// External tools may add or drop a few frames or change the channel
/// count. A channel mismatch is resolved by downmixing and duplicating.
pub(crate) fn conform_to(
    buffer: SignalBuffer,
    reference: &SignalBuffer,
) -> EngineResult<SignalBuffer> {
    if buffer.channels() != reference.channels() {
        log::debug!(
            "Engine output has {} channels, expected {}; downmixing",
            buffer.channels(),
            reference.channels()
        );
        let mut mono = buffer.to_mono();
        mono.resize(reference.frames(), 0.0);
        return Ok(reference.expand_like(&mono)?);
    }
    let mut buffer = buffer.relabel(reference.layout())?;
    buffer.resize_frames(reference.frames());
    Ok(buffer)
}
