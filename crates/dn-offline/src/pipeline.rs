//! Job processing pipeline
//!
//! Runs one [`ProcessingJob`] through a fixed stage sequence:
//! 1. Validate input, engine and output path
//! 2. Read media information
//! 3. Load or extract the audio track
//! 4. Noise reduction (progress mapped into 0.3..0.8)
//! 5. Post-processing: optional loudness normalization, then a peak limiter
//! 6. Save, convert or remux into the original video
//!
//! Every stage boundary notifies the observer and then checks for
//! cancellation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dn_core::{CancelToken, Cancelled, SignalBuffer};
use dn_engine::{create_engine, EngineKind, EngineToolchain, NoiseProfile};
use dn_media::paths::sibling_with_suffix;
use dn_media::{
    generate_output_path, get_unique_path, LoadOptions, MediaBackend, MediaError, MediaInfo,
};
use dn_spectral::estimate_snr;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::job::{ProcessingJob, ProcessingStage};
use crate::loudness::{LoudnessNormalizer, LufsNormalizer, ABSOLUTE_GATE_LUFS};

/// Peaks above this trigger the limiter
pub const LIMITER_THRESHOLD: f32 = 0.99;
/// Peak level after limiting
pub const LIMITER_CEILING: f32 = 0.95;

const REDUCTION_START: f64 = 0.3;
const REDUCTION_SPAN: f64 = 0.5;

/// Receives the job after every state change
pub type JobObserver<'a> = dyn FnMut(&ProcessingJob) + 'a;

// ═══════════════════════════════════════════════════════════════════════════════
// EXECUTION CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// The job being run and whoever is watching it
///
/// Audio buffers are passed between stages as values, never stored on the job.
struct ExecutionContext<'a, 'o> {
    job: &'a mut ProcessingJob,
    observer: Option<&'a mut JobObserver<'o>>,
}

impl ExecutionContext<'_, '_> {
    fn notify(&mut self) {
        if let Some(observer) = self.observer.as_mut() {
            observer(&*self.job);
        }
    }

    fn input(&self) -> PathBuf {
        self.job.input_path.clone()
    }
}

/// Removes a scratch file when dropped
struct ScratchFile(PathBuf);

impl ScratchFile {
    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = std::fs::remove_file(&self.0) {
                log::warn!("Could not remove temporary file {}: {}", self.0.display(), e);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Runs jobs one at a time
///
/// Engine availability is fixed at construction. Cancellation is requested
/// through [`cancel_current_job`](Self::cancel_current_job) or a clone of
/// [`cancel_token`](Self::cancel_token) held by another thread; the request
/// stays in effect until [`reset_cancel`](Self::reset_cancel).
pub struct ProcessingPipeline {
    config: PipelineConfig,
    toolchain: EngineToolchain,
    media: Arc<dyn MediaBackend>,
    normalizer: Option<Arc<dyn LoudnessNormalizer>>,
    engines: Vec<EngineKind>,
    profile: Option<NoiseProfile>,
    cancel: CancelToken,
}

impl ProcessingPipeline {
    /// Pipeline with the production media backend and probed engines
    pub fn new(config: PipelineConfig) -> Self {
        let engines = dn_engine::probe_engines(&config.toolchain());
        Self::with_available_engines(config, engines)
    }

    /// Pipeline that trusts `engines` instead of probing
    pub fn with_available_engines(config: PipelineConfig, engines: Vec<EngineKind>) -> Self {
        let toolchain = config.toolchain();
        let media: Arc<dyn MediaBackend> = Arc::new(config.media_backend());
        Self {
            config,
            toolchain,
            media,
            normalizer: Some(Arc::new(LufsNormalizer::new())),
            engines,
            profile: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_media_backend(mut self, media: Arc<dyn MediaBackend>) -> Self {
        self.media = media;
        self
    }

    /// `None` disables loudness normalization; jobs that ask for it log a warning
    pub fn with_normalizer(mut self, normalizer: Option<Arc<dyn LoudnessNormalizer>>) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Noise profile handed to the spectral gate
    pub fn with_noise_profile(mut self, profile: Option<NoiseProfile>) -> Self {
        self.profile = profile;
        self
    }

    /// Share a cancellation flag, e.g. across a batch
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Engines that passed the availability probe
    pub fn available_engines(&self) -> &[EngineKind] {
        &self.engines
    }

    pub fn is_engine_available(&self, kind: EngineKind) -> bool {
        self.engines.contains(&kind)
    }

    /// Ask the running job to stop at its next checkpoint
    pub fn cancel_current_job(&self) {
        log::info!("Cancellation requested");
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn reset_cancel(&self) {
        self.cancel.reset();
    }

    /// Output path a job without an explicit one would get
    pub fn default_output_path(&self, job: &ProcessingJob) -> PathBuf {
        // Remuxed videos keep their container
        let format = if job.is_video() && job.preserve_video {
            None
        } else {
            Some(job.output_format.as_str())
        };
        generate_output_path(
            &job.input_path,
            &self.config.output_pattern,
            format,
            self.config.output_dir.as_deref(),
        )
    }

    /// Run `job` to a terminal stage
    ///
    /// Returns true on success. On failure the job holds the error message,
    /// on cancellation it ends in [`ProcessingStage::Cancelled`]. Either way
    /// `end_time` is set and the observer sees the final state.
    pub fn process_job(
        &mut self,
        job: &mut ProcessingJob,
        observer: Option<&mut JobObserver<'_>>,
    ) -> bool {
        if job.is_complete() {
            log::warn!("Job {} already ended as {}, not reprocessing", job.id, job.stage());
            return false;
        }

        job.begin();
        let mut ctx = ExecutionContext { job, observer };
        ctx.notify();
        log::info!("Processing {} with {}", ctx.job.input_path.display(), ctx.job.engine);

        match self.run_stages(&mut ctx) {
            Ok(()) => {
                ctx.job.complete();
                ctx.notify();
                log::info!(
                    "Job completed successfully: {} -> {}",
                    ctx.job.input_path.display(),
                    ctx.job.output_path.as_deref().unwrap_or(Path::new("")).display()
                );
                true
            }
            Err(PipelineError::Cancelled) => {
                ctx.job.cancel();
                ctx.notify();
                log::info!("Job cancelled: {}", ctx.job.input_path.display());
                false
            }
            Err(e) => {
                ctx.job.fail(e.to_string());
                ctx.notify();
                log::error!("Job failed: {}: {}", ctx.job.input_path.display(), e);
                false
            }
        }
    }

    fn run_stages(&self, ctx: &mut ExecutionContext<'_, '_>) -> PipelineResult<()> {
        self.validate(ctx)?;
        self.load_media_info(ctx)?;
        let audio = self.extract_audio(ctx)?;
        let processed = self.reduce_noise(ctx, &audio)?;
        drop(audio);
        let processed = self.post_process(ctx, processed)?;
        self.save_output(ctx, &processed)
    }

    /// Enter a stage, tell the observer, then honour a pending cancel
    fn checkpoint(
        &self,
        ctx: &mut ExecutionContext<'_, '_>,
        stage: ProcessingStage,
        progress: f64,
        message: impl Into<String>,
    ) -> PipelineResult<()> {
        ctx.job.enter(stage, progress, message);
        log::debug!("Job {}: {} ({:.0}%)", ctx.job.id, stage, ctx.job.progress() * 100.0);
        ctx.notify();
        self.cancel.check()?;
        Ok(())
    }

    // ─── stages ───

    fn validate(&self, ctx: &mut ExecutionContext<'_, '_>) -> PipelineResult<()> {
        self.checkpoint(ctx, ProcessingStage::Validating, 0.05, "Validating input file...")?;

        let input = ctx.input();
        if !input.exists() {
            return Err(PipelineError::InputNotFound(input));
        }
        if !input.is_file() {
            return Err(PipelineError::NotAFile(input));
        }
        if !self.is_engine_available(ctx.job.engine) {
            return Err(PipelineError::EngineUnavailable(ctx.job.engine));
        }

        if ctx.job.output_path.is_none() {
            let output = self.default_output_path(ctx.job);
            log::debug!("Output path resolved to {}", output.display());
            ctx.job.set_output_path(&output);
        }
        Ok(())
    }

    fn load_media_info(&self, ctx: &mut ExecutionContext<'_, '_>) -> PipelineResult<MediaInfo> {
        self.checkpoint(ctx, ProcessingStage::Loading, 0.1, "Loading media information...")?;

        let input = ctx.input();
        let info = self
            .media
            .get_media_info(&input)
            .map_err(|source| PipelineError::MediaInfo { path: input.clone(), source })?;
        ctx.job.original_duration = info.duration;

        if !info.has_audio {
            return Err(PipelineError::NoAudioTrack(input));
        }
        Ok(info)
    }

    fn extract_audio(&self, ctx: &mut ExecutionContext<'_, '_>) -> PipelineResult<SignalBuffer> {
        let message = if ctx.job.is_video() {
            "Extracting audio from video..."
        } else {
            "Loading audio file..."
        };
        self.checkpoint(ctx, ProcessingStage::ExtractingAudio, 0.2, message)?;

        let input = ctx.input();
        let options = LoadOptions {
            sample_rate: ctx.job.sample_rate,
            mono: false,
            ..Default::default()
        };
        let audio = self
            .media
            .load_audio(&input, &options)
            .map_err(|source| PipelineError::Load { path: input.clone(), source })?;
        if audio.is_empty() {
            return Err(PipelineError::Load {
                path: input,
                source: MediaError::Decode("no samples decoded".to_string()),
            });
        }

        log::debug!(
            "Loaded {} frames, {} channel(s) at {} Hz",
            audio.frames(),
            audio.channels(),
            audio.sample_rate()
        );
        if ctx.job.original_duration.is_none() {
            ctx.job.original_duration = Some(audio.duration());
        }
        ctx.job.estimated_snr_before = Some(estimate_snr(&audio, None));
        Ok(audio)
    }

    fn reduce_noise(
        &self,
        ctx: &mut ExecutionContext<'_, '_>,
        audio: &SignalBuffer,
    ) -> PipelineResult<SignalBuffer> {
        let engine_kind = ctx.job.engine;
        self.checkpoint(
            ctx,
            ProcessingStage::NoiseReduction,
            REDUCTION_START,
            format!("Applying noise reduction ({})...", engine_kind),
        )?;

        let engine = create_engine(
            engine_kind,
            &ctx.job.engine_config,
            &self.toolchain,
            self.profile.clone(),
        )?;

        let cancel = self.cancel.clone();
        let mut relay = |fraction: f64, message: &str| -> Result<(), Cancelled> {
            cancel.check()?;
            ctx.job.update(
                REDUCTION_START + REDUCTION_SPAN * fraction.clamp(0.0, 1.0),
                format!("Noise reduction: {}", message),
            );
            ctx.notify();
            Ok(())
        };
        let processed = engine.process(audio, Some(&mut relay))?;

        log::debug!("Noise reduction with {} finished", engine_kind);
        Ok(processed)
    }

    fn post_process(
        &self,
        ctx: &mut ExecutionContext<'_, '_>,
        processed: SignalBuffer,
    ) -> PipelineResult<SignalBuffer> {
        self.checkpoint(ctx, ProcessingStage::PostProcessing, 0.8, "Applying post-processing...")?;

        let mut processed = if ctx.job.normalize_loudness {
            self.normalize_loudness(ctx, processed)
        } else {
            processed
        };

        let peak = processed.peak();
        if peak > LIMITER_THRESHOLD {
            processed.apply_gain(LIMITER_CEILING / peak);
            log::debug!("Limited peak {:.3} to {:.2}", peak, LIMITER_CEILING);
        }

        ctx.job.processed_duration = Some(processed.duration());
        ctx.job.estimated_snr_after = Some(estimate_snr(&processed, None));
        Ok(processed)
    }

    /// Soft step: any failure leaves the buffer unchanged
    fn normalize_loudness(
        &self,
        ctx: &mut ExecutionContext<'_, '_>,
        buffer: SignalBuffer,
    ) -> SignalBuffer {
        let Some(normalizer) = &self.normalizer else {
            log::warn!("Loudness normalizer not available, skipping loudness normalization");
            return buffer;
        };

        ctx.job.set_message("Normalizing loudness...");
        ctx.notify();

        let target = ctx.job.target_lufs;
        match normalizer.integrated_loudness(&buffer) {
            Ok(measured) if measured >= ABSOLUTE_GATE_LUFS => {
                match normalizer.normalize(&buffer, measured, target) {
                    Ok(normalized) => {
                        log::debug!("Loudness {:.1} LUFS -> {:.1} LUFS", measured, target);
                        normalized
                    }
                    Err(e) => {
                        log::warn!("Loudness normalization failed: {}", e);
                        buffer
                    }
                }
            }
            Ok(measured) => {
                log::debug!("Skipping loudness normalization: {:.1} LUFS is below the absolute gate", measured);
                buffer
            }
            Err(e) => {
                log::warn!("Loudness normalization failed: {}", e);
                buffer
            }
        }
    }

    fn save_output(&self, ctx: &mut ExecutionContext<'_, '_>, audio: &SignalBuffer) -> PipelineResult<()> {
        self.checkpoint(ctx, ProcessingStage::Saving, 0.9, "Preparing output...")?;

        let nominal = match &ctx.job.output_path {
            Some(path) => path.clone(),
            None => self.default_output_path(ctx.job),
        };
        // Resolved here so jobs racing for the same name each get their own file
        let output = get_unique_path(&nominal);
        if output != nominal {
            log::info!("{} exists, writing {}", nominal.display(), output.display());
        }
        ctx.job.set_output_path(&output);

        let bit_depth = self.config.save_bit_depth;
        let normalize = self.config.normalize_on_save;

        if ctx.job.is_video() && ctx.job.preserve_video {
            ctx.job.enter(ProcessingStage::Remuxing, 0.9, "Remuxing video with processed audio...");
            ctx.notify();

            let scratch = ScratchFile(sibling_with_suffix(&output, ".temp", "wav"));
            self.media
                .save_audio(audio, scratch.path(), bit_depth, normalize)
                .map_err(|source| PipelineError::Save { path: scratch.path().to_path_buf(), source })?;
            self.media
                .remux_audio_video(&ctx.job.input_path, scratch.path(), &output, true)
                .map_err(PipelineError::Remux)?;
        } else {
            ctx.job.set_message("Saving processed audio...");
            ctx.notify();

            let format = ctx.job.output_format.trim_start_matches('.').to_ascii_lowercase();
            if format == "wav" {
                self.media
                    .save_audio(audio, &output, bit_depth, normalize)
                    .map_err(|source| PipelineError::Save { path: output.clone(), source })?;
            } else {
                let scratch = ScratchFile(sibling_with_suffix(&output, ".temp", "wav"));
                self.media
                    .save_audio(audio, scratch.path(), bit_depth, normalize)
                    .map_err(|source| PipelineError::Save { path: scratch.path().to_path_buf(), source })?;
                self.media
                    .convert_audio_format(scratch.path(), &output, &format, ctx.job.sample_rate, None, None)
                    .map_err(|source| PipelineError::Conversion { format: format.clone(), source })?;
            }
        }

        log::info!("Output saved: {}", output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(config: PipelineConfig) -> ProcessingPipeline {
        ProcessingPipeline::with_available_engines(config, vec![EngineKind::SpectralGate])
    }

    #[test]
    fn test_default_output_path_follows_format() {
        let pipeline = pipeline(PipelineConfig::default());
        let job = ProcessingJob::builder("/media/talk.wav").format("mp3").build();
        assert_eq!(pipeline.default_output_path(&job), PathBuf::from("/media/clean/talk_clean.mp3"));
    }

    #[test]
    fn test_default_output_path_keeps_video_container() {
        let pipeline = pipeline(PipelineConfig::default().with_output_dir(Some(PathBuf::from("/out"))));
        let job = ProcessingJob::new("/media/clip.mkv");
        assert_eq!(pipeline.default_output_path(&job), PathBuf::from("/out/clip_clean.mkv"));

        let audio_only = ProcessingJob::builder("/media/clip.mkv").preserve_video(false).build();
        assert_eq!(pipeline.default_output_path(&audio_only), PathBuf::from("/out/clip_clean.wav"));
    }

    #[test]
    fn test_engine_availability() {
        let pipeline = pipeline(PipelineConfig::default());
        assert!(pipeline.is_engine_available(EngineKind::SpectralGate));
        assert!(!pipeline.is_engine_available(EngineKind::Demucs));
        assert_eq!(pipeline.available_engines(), &[EngineKind::SpectralGate]);
    }

    #[test]
    fn test_finished_job_is_not_rerun() {
        let mut pipeline = pipeline(PipelineConfig::default());
        let mut job = ProcessingJob::new("/nonexistent/in.wav");
        assert!(!pipeline.process_job(&mut job, None));
        assert_eq!(job.stage(), ProcessingStage::Error);
        let ended = job.end_time();

        assert!(!pipeline.process_job(&mut job, None));
        assert_eq!(job.end_time(), ended);
    }

    #[test]
    fn test_scratch_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.temp.wav");
        std::fs::write(&path, b"data").unwrap();
        drop(ScratchFile(path.clone()));
        assert!(!path.exists());
    }
}
