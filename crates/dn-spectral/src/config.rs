//! Spectral gate configuration

/// Clamp into `[lo, hi]`; NaN maps to `lo`
pub fn bounded(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() { lo } else { value.clamp(lo, hi) }
}

/// Spectral gate settings
///
/// Every numeric field is clamped into its valid range when set, so a
/// config value is always usable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralGateConfig {
    reduction_db: f64,
    time_smoothing: f64,
    frequency_smoothing: f64,
    stationary: bool,
    prop_decrease: f64,
    use_noise_profile: bool,
    noise_start_time: Option<f64>,
    noise_end_time: Option<f64>,
}

impl Default for SpectralGateConfig {
    fn default() -> Self {
        Self {
            reduction_db: 20.0,
            time_smoothing: 0.1,
            frequency_smoothing: 0.1,
            stationary: true,
            prop_decrease: 1.0,
            use_noise_profile: true,
            noise_start_time: None,
            noise_end_time: None,
        }
    }
}

impl SpectralGateConfig {
    /// Above this reduction the subtraction path is used regardless of mode
    pub const AGGRESSIVE_REDUCTION_DB: f64 = 30.0;

    /// Preset for speech with steady background hiss
    pub fn gentle() -> Self {
        Self::default()
            .with_reduction_db(12.0)
            .with_prop_decrease(0.8)
    }

    /// Preset for heavy, changing background noise
    pub fn aggressive() -> Self {
        Self::default()
            .with_reduction_db(40.0)
            .with_stationary(false)
    }

    /// Noise reduction amount (dB), [0, 60]
    pub fn with_reduction_db(mut self, db: f64) -> Self {
        self.reduction_db = bounded(db, 0.0, 60.0);
        self
    }

    /// Gain smoothing across time, [0, 1]
    pub fn with_time_smoothing(mut self, amount: f64) -> Self {
        self.time_smoothing = bounded(amount, 0.0, 1.0);
        self
    }

    /// Gain smoothing across frequency, [0, 1]
    pub fn with_frequency_smoothing(mut self, amount: f64) -> Self {
        self.frequency_smoothing = bounded(amount, 0.0, 1.0);
        self
    }

    pub fn with_stationary(mut self, stationary: bool) -> Self {
        self.stationary = stationary;
        self
    }

    /// Proportion of detected noise removed, [0, 1]
    pub fn with_prop_decrease(mut self, amount: f64) -> Self {
        self.prop_decrease = bounded(amount, 0.0, 1.0);
        self
    }

    pub fn with_use_noise_profile(mut self, enabled: bool) -> Self {
        self.use_noise_profile = enabled;
        self
    }

    /// Manual noise range in seconds; used only when both ends are set
    pub fn with_noise_range(mut self, start: Option<f64>, end: Option<f64>) -> Self {
        self.noise_start_time = start;
        self.noise_end_time = end;
        self
    }

    pub fn reduction_db(&self) -> f64 {
        self.reduction_db
    }

    pub fn time_smoothing(&self) -> f64 {
        self.time_smoothing
    }

    pub fn frequency_smoothing(&self) -> f64 {
        self.frequency_smoothing
    }

    pub fn stationary(&self) -> bool {
        self.stationary
    }

    pub fn prop_decrease(&self) -> f64 {
        self.prop_decrease
    }

    pub fn use_noise_profile(&self) -> bool {
        self.use_noise_profile
    }

    pub fn noise_start_time(&self) -> Option<f64> {
        self.noise_start_time
    }

    pub fn noise_end_time(&self) -> Option<f64> {
        self.noise_end_time
    }

    /// Both ends of the manual noise range, if configured
    pub fn noise_range(&self) -> Option<(f64, f64)> {
        self.noise_start_time.zip(self.noise_end_time)
    }

    /// True when processing takes the STFT subtraction path
    pub fn uses_subtraction(&self) -> bool {
        self.reduction_db > Self::AGGRESSIVE_REDUCTION_DB || !self.stationary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters_clamp() {
        let config = SpectralGateConfig::default()
            .with_reduction_db(90.0)
            .with_time_smoothing(-1.0)
            .with_frequency_smoothing(f64::NAN)
            .with_prop_decrease(2.0);

        assert_eq!(config.reduction_db(), 60.0);
        assert_eq!(config.time_smoothing(), 0.0);
        assert_eq!(config.frequency_smoothing(), 0.0);
        assert_eq!(config.prop_decrease(), 1.0);
    }

    #[test]
    fn test_routing() {
        assert!(!SpectralGateConfig::default().uses_subtraction());
        assert!(SpectralGateConfig::default().with_reduction_db(31.0).uses_subtraction());
        assert!(!SpectralGateConfig::default().with_reduction_db(30.0).uses_subtraction());
        assert!(SpectralGateConfig::default().with_stationary(false).uses_subtraction());
        assert!(SpectralGateConfig::aggressive().uses_subtraction());
    }

    #[test]
    fn test_noise_range_needs_both_ends() {
        let config = SpectralGateConfig::default().with_noise_range(Some(1.0), None);
        assert_eq!(config.noise_range(), None);
        let config = config.with_noise_range(Some(1.0), Some(2.0));
        assert_eq!(config.noise_range(), Some((1.0, 2.0)));
    }
}
