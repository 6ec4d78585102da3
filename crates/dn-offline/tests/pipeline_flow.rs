//! End-to-end job runs against the real WAV backend and a scripted one

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use dn_core::SignalBuffer;
use dn_engine::EngineKind;
use dn_media::{is_video_file, write_wav, LoadOptions, MediaBackend, MediaError, MediaInfo, MediaResult};
use dn_offline::{
    LoudnessNormalizer, LufsNormalizer, PipelineConfig, PipelineError, PipelineResult, ProcessingJob,
    ProcessingPipeline, ProcessingStage, ABSOLUTE_GATE_LUFS,
};

fn tone_with_noise(seconds: f32, channels: usize, sample_rate: u32, amplitude: f32) -> SignalBuffer {
    let frames = (seconds * sample_rate as f32) as usize;
    let mut state = 987_654_321u32;
    let mut samples = Vec::with_capacity(frames * channels);
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let tone = amplitude * (2.0 * std::f32::consts::PI * 440.0 * t).sin();
        for _ in 0..channels {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let noise = (state >> 8) as f32 / (1u32 << 24) as f32 - 0.5;
            samples.push(tone + 0.05 * noise);
        }
    }
    SignalBuffer::interleaved(samples, channels, sample_rate).unwrap()
}

fn quiet_tone(seconds: f32, sample_rate: u32, amplitude: f32) -> SignalBuffer {
    let frames = (seconds * sample_rate as f32) as usize;
    let samples = (0..frames)
        .map(|i| amplitude * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin())
        .collect();
    SignalBuffer::mono(samples, sample_rate).unwrap()
}

fn write_fixture(path: &Path, buffer: &SignalBuffer) {
    let spec = hound::WavSpec {
        channels: buffer.channels() as u16,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &s in buffer.samples() {
        writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// Records calls and hands back a fixed signal
struct ScriptedBackend {
    signal: SignalBuffer,
    has_audio: bool,
    fail_remux: bool,
    calls: Mutex<Vec<String>>,
    saved_peak: Mutex<Option<f32>>,
}

impl ScriptedBackend {
    fn new(signal: SignalBuffer) -> Self {
        Self {
            signal,
            has_audio: true,
            fail_remux: false,
            calls: Mutex::new(Vec::new()),
            saved_peak: Mutex::new(None),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }
}

impl MediaBackend for ScriptedBackend {
    fn get_media_info(&self, path: &Path) -> MediaResult<MediaInfo> {
        self.record("info");
        Ok(MediaInfo {
            path: path.to_path_buf(),
            duration: Some(self.signal.duration()),
            sample_rate: Some(self.signal.sample_rate()),
            channels: Some(self.signal.channels() as u16),
            has_audio: self.has_audio,
            has_video: is_video_file(path),
            ..Default::default()
        })
    }

    fn load_audio(&self, _path: &Path, _options: &LoadOptions) -> MediaResult<SignalBuffer> {
        self.record("load");
        Ok(self.signal.clone())
    }

    fn save_audio(&self, buffer: &SignalBuffer, path: &Path, bit_depth: u16, normalize: bool) -> MediaResult<()> {
        self.record("save");
        *self.saved_peak.lock() = Some(buffer.peak());
        write_wav(buffer, path, bit_depth, normalize)
    }

    fn remux_audio_video(&self, _video: &Path, audio: &Path, output: &Path, _preserve_metadata: bool) -> MediaResult<()> {
        self.record("remux");
        if self.fail_remux {
            return Err(MediaError::ToolFailed {
                tool: "ffmpeg".into(),
                status: "exit status: 1".into(),
                stderr: "codec not supported".into(),
            });
        }
        std::fs::copy(audio, output)?;
        Ok(())
    }

    fn convert_audio_format(
        &self,
        input: &Path,
        output: &Path,
        format: &str,
        _sample_rate: Option<u32>,
        _channels: Option<u16>,
        _bitrate: Option<&str>,
    ) -> MediaResult<()> {
        self.record(format!("convert:{}", format));
        std::fs::copy(input, output)?;
        Ok(())
    }
}

/// Boosts everything by a fixed gain
struct FixedGain(f32);

impl LoudnessNormalizer for FixedGain {
    fn integrated_loudness(&self, _buffer: &SignalBuffer) -> PipelineResult<f64> {
        Ok(-30.0)
    }

    fn normalize(&self, buffer: &SignalBuffer, _measured: f64, _target: f64) -> PipelineResult<SignalBuffer> {
        let mut out = buffer.clone();
        out.apply_gain(self.0);
        Ok(out)
    }
}

/// Reports a fixed loudness and doubles the signal when asked to normalize
struct MeterAt {
    lufs: f64,
    normalized: Mutex<bool>,
}

impl LoudnessNormalizer for MeterAt {
    fn integrated_loudness(&self, _buffer: &SignalBuffer) -> PipelineResult<f64> {
        Ok(self.lufs)
    }

    fn normalize(&self, buffer: &SignalBuffer, _measured: f64, _target: f64) -> PipelineResult<SignalBuffer> {
        *self.normalized.lock() = true;
        let mut out = buffer.clone();
        out.apply_gain(2.0);
        Ok(out)
    }
}

struct BrokenMeter;

impl LoudnessNormalizer for BrokenMeter {
    fn integrated_loudness(&self, _buffer: &SignalBuffer) -> PipelineResult<f64> {
        Err(PipelineError::Loudness("meter exploded".into()))
    }

    fn normalize(&self, buffer: &SignalBuffer, _measured: f64, _target: f64) -> PipelineResult<SignalBuffer> {
        Ok(buffer.clone())
    }
}

fn scripted_pipeline(dir: &Path, backend: Arc<ScriptedBackend>) -> ProcessingPipeline {
    let config = PipelineConfig::default().with_output_dir(Some(dir.join("out")));
    ProcessingPipeline::with_available_engines(config, vec![EngineKind::SpectralGate]).with_media_backend(backend)
}

fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"placeholder").unwrap();
    path
}

fn no_temp_files(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .all(|e| !e.file_name().to_string_lossy().contains(".temp."))
        })
        .unwrap_or(true)
}

// ═══════════════════════════════════════════════════════════════════════════════
// REAL BACKEND
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn wav_job_completes() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("tone.wav");
    write_fixture(&input, &tone_with_noise(1.0, 1, 16000, 0.5));

    let config = PipelineConfig::default().with_output_dir(Some(dir.path().join("out")));
    let mut pipeline = ProcessingPipeline::with_available_engines(config, vec![EngineKind::SpectralGate]);
    let mut job = ProcessingJob::new(&input);

    let mut seen: Vec<(ProcessingStage, f64)> = Vec::new();
    let ok = pipeline.process_job(&mut job, Some(&mut |job: &ProcessingJob| {
        seen.push((job.stage(), job.progress()));
    }));

    assert!(ok, "job failed: {:?}", job.error_message());
    assert_eq!(job.stage(), ProcessingStage::Complete);
    assert_eq!(job.progress(), 1.0);
    assert_eq!(job.message(), "Processing complete");
    let output = job.output_path.clone().unwrap();
    assert!(output.is_file());
    assert_eq!(output, dir.path().join("out/tone_clean.wav"));

    assert!(seen.windows(2).all(|w| w[0].1 <= w[1].1));
    assert_eq!(seen.last().map(|s| s.1), Some(1.0));
    let stages: Vec<ProcessingStage> = seen.iter().map(|s| s.0).collect();
    for stage in [
        ProcessingStage::Validating,
        ProcessingStage::Loading,
        ProcessingStage::ExtractingAudio,
        ProcessingStage::NoiseReduction,
        ProcessingStage::PostProcessing,
        ProcessingStage::Saving,
    ] {
        assert!(stages.contains(&stage), "missing {stage}");
    }

    let duration = job.original_duration.unwrap();
    assert!((duration - 1.0).abs() < 0.01);
    assert!(job.processed_duration.is_some());
    assert!(job.estimated_snr_before.is_some());
    assert!(job.estimated_snr_after.is_some());
    assert!(job.processing_time().unwrap() >= 0.0);
}

#[test]
fn existing_output_is_never_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("take.wav");
    write_fixture(&input, &tone_with_noise(0.5, 2, 16000, 0.4));
    let taken = dir.path().join("take_clean.wav");
    std::fs::write(&taken, b"keep me").unwrap();

    let mut pipeline = ProcessingPipeline::with_available_engines(PipelineConfig::default(), vec![EngineKind::SpectralGate]);
    let mut job = ProcessingJob::builder(&input).output(&taken).build();
    assert!(pipeline.process_job(&mut job, None));

    assert_eq!(job.output_path.as_deref(), Some(dir.path().join("take_clean_1.wav").as_path()));
    assert_eq!(std::fs::read(&taken).unwrap(), b"keep me");
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCRIPTED BACKEND
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn cancel_at_stage_boundary_stops_before_the_stage_runs() {
    let dir = tempfile::tempdir().unwrap();
    let input = touch(dir.path(), "clip.wav");
    let backend = Arc::new(ScriptedBackend::new(tone_with_noise(1.0, 1, 16000, 0.5)));
    let mut pipeline = scripted_pipeline(dir.path(), backend.clone());
    let token = pipeline.cancel_token();

    let mut job = ProcessingJob::new(&input);
    let mut last_stage = ProcessingStage::Idle;
    let ok = pipeline.process_job(&mut job, Some(&mut |job: &ProcessingJob| {
        if job.stage() == ProcessingStage::Loading {
            token.cancel();
        }
        last_stage = job.stage();
    }));

    assert!(!ok);
    assert_eq!(job.stage(), ProcessingStage::Cancelled);
    assert_eq!(last_stage, ProcessingStage::Cancelled);
    assert!(job.end_time().is_some());
    assert!(job.error_message().is_none());
    assert!(backend.calls().is_empty());
}

#[test]
fn cancel_inside_engine_progress() {
    let dir = tempfile::tempdir().unwrap();
    let input = touch(dir.path(), "clip.wav");
    let backend = Arc::new(ScriptedBackend::new(tone_with_noise(1.0, 1, 16000, 0.5)));
    let mut pipeline = scripted_pipeline(dir.path(), backend.clone());
    let token = pipeline.cancel_token();

    let mut job = ProcessingJob::new(&input);
    let ok = pipeline.process_job(&mut job, Some(&mut |job: &ProcessingJob| {
        if job.stage() == ProcessingStage::NoiseReduction && job.progress() > 0.3 {
            token.cancel();
        }
    }));

    assert!(!ok);
    assert_eq!(job.stage(), ProcessingStage::Cancelled);
    assert!(job.progress() < 0.8);
    assert!(!backend.calls().contains(&"save".to_string()));
}

#[test]
fn video_is_remuxed_and_temp_removed() {
    let dir = tempfile::tempdir().unwrap();
    let input = touch(dir.path(), "lecture.mp4");
    let backend = Arc::new(ScriptedBackend::new(tone_with_noise(1.0, 2, 16000, 0.5)));
    let mut pipeline = scripted_pipeline(dir.path(), backend.clone());

    let mut job = ProcessingJob::new(&input);
    let mut messages = Vec::new();
    let ok = pipeline.process_job(&mut job, Some(&mut |job: &ProcessingJob| {
        messages.push((job.stage(), job.message().to_string()));
    }));

    assert!(ok, "job failed: {:?}", job.error_message());
    assert_eq!(backend.calls(), ["info", "load", "save", "remux"]);
    assert_eq!(job.output_path.clone().unwrap(), dir.path().join("out/lecture_clean.mp4"));
    assert!(messages.contains(&(ProcessingStage::ExtractingAudio, "Extracting audio from video...".to_string())));
    assert!(messages.iter().any(|(stage, _)| *stage == ProcessingStage::Remuxing));
    assert!(no_temp_files(&dir.path().join("out")));
}

#[test]
fn remux_failure_is_an_error_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let input = touch(dir.path(), "lecture.mov");
    let mut backend = ScriptedBackend::new(tone_with_noise(1.0, 1, 16000, 0.5));
    backend.fail_remux = true;
    let mut pipeline = scripted_pipeline(dir.path(), Arc::new(backend));

    let mut job = ProcessingJob::new(&input);
    assert!(!pipeline.process_job(&mut job, None));
    assert_eq!(job.stage(), ProcessingStage::Error);
    let message = job.error_message().unwrap();
    assert!(message.starts_with("Video remuxing failed"), "{message}");
    assert!(job.message().starts_with("Error: "));
    assert!(no_temp_files(&dir.path().join("out")));
}

#[test]
fn non_wav_output_goes_through_conversion() {
    let dir = tempfile::tempdir().unwrap();
    let input = touch(dir.path(), "voice.wav");
    let backend = Arc::new(ScriptedBackend::new(tone_with_noise(1.0, 1, 16000, 0.5)));
    let mut pipeline = scripted_pipeline(dir.path(), backend.clone());

    let mut job = ProcessingJob::builder(&input).format("MP3").build();
    assert!(pipeline.process_job(&mut job, None), "{:?}", job.error_message());

    assert_eq!(backend.calls(), ["info", "load", "save", "convert:mp3"]);
    let output = job.output_path.clone().unwrap();
    assert_eq!(output.extension().unwrap(), "mp3");
    assert!(output.is_file());
    assert!(no_temp_files(&dir.path().join("out")));
}

#[test]
fn video_without_preserve_saves_audio_only() {
    let dir = tempfile::tempdir().unwrap();
    let input = touch(dir.path(), "clip.mkv");
    let backend = Arc::new(ScriptedBackend::new(tone_with_noise(1.0, 1, 16000, 0.5)));
    let mut pipeline = scripted_pipeline(dir.path(), backend.clone());

    let mut job = ProcessingJob::builder(&input).preserve_video(false).build();
    assert!(pipeline.process_job(&mut job, None));
    assert_eq!(backend.calls(), ["info", "load", "save"]);
    assert_eq!(job.output_path.clone().unwrap(), dir.path().join("out/clip_clean.wav"));
}

#[test]
fn limiter_caps_boosted_peaks() {
    let dir = tempfile::tempdir().unwrap();
    let input = touch(dir.path(), "loud.wav");
    let backend = Arc::new(ScriptedBackend::new(tone_with_noise(1.0, 1, 16000, 0.5)));
    let mut pipeline = scripted_pipeline(dir.path(), backend.clone())
        .with_normalizer(Some(Arc::new(FixedGain(20.0))));

    let mut job = ProcessingJob::builder(&input).normalize_loudness(-14.0).build();
    assert!(pipeline.process_job(&mut job, None));

    let peak = (*backend.saved_peak.lock()).unwrap();
    assert!((peak - 0.95).abs() < 1e-3, "peak {peak}");
}

#[test]
fn loudness_step_soft_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = touch(dir.path(), "quiet.wav");

    for normalizer in [None, Some(Arc::new(BrokenMeter) as Arc<dyn LoudnessNormalizer>)] {
        let backend = Arc::new(ScriptedBackend::new(tone_with_noise(1.0, 1, 16000, 0.2)));
        let mut pipeline = scripted_pipeline(dir.path(), backend).with_normalizer(normalizer);
        let mut job = ProcessingJob::builder(&input).normalize_loudness(-23.0).build();
        assert!(pipeline.process_job(&mut job, None), "{:?}", job.error_message());
        assert_eq!(job.stage(), ProcessingStage::Complete);
    }
}

#[test]
fn near_silent_input_is_not_normalized() {
    let dir = tempfile::tempdir().unwrap();
    let input = touch(dir.path(), "hush.wav");

    let saved_peak = |normalize: bool| {
        let backend = Arc::new(ScriptedBackend::new(quiet_tone(1.0, 16000, 1e-5)));
        let mut pipeline = scripted_pipeline(dir.path(), backend.clone())
            .with_normalizer(Some(Arc::new(LufsNormalizer::new())));
        let mut builder = ProcessingJob::builder(&input);
        if normalize {
            builder = builder.normalize_loudness(-23.0);
        }
        let mut job = builder.build();
        assert!(pipeline.process_job(&mut job, None), "{:?}", job.error_message());
        assert_eq!(job.stage(), ProcessingStage::Complete);
        (*backend.saved_peak.lock()).unwrap()
    };

    let plain = saved_peak(false);
    let normalized = saved_peak(true);
    assert!(normalized < 1e-3, "peak {normalized}");
    assert_eq!(normalized, plain);
}

#[test]
fn loudness_at_the_absolute_gate_is_normalized() {
    let dir = tempfile::tempdir().unwrap();
    let input = touch(dir.path(), "edge.wav");

    for (lufs, expect_normalized) in [(ABSOLUTE_GATE_LUFS, true), (ABSOLUTE_GATE_LUFS - 0.1, false)] {
        let meter = Arc::new(MeterAt { lufs, normalized: Mutex::new(false) });
        let backend = Arc::new(ScriptedBackend::new(tone_with_noise(1.0, 1, 16000, 0.2)));
        let mut pipeline = scripted_pipeline(dir.path(), backend).with_normalizer(Some(meter.clone()));
        let mut job = ProcessingJob::builder(&input).normalize_loudness(-23.0).build();
        assert!(pipeline.process_job(&mut job, None), "{:?}", job.error_message());
        assert_eq!(*meter.normalized.lock(), expect_normalized, "measured {lufs}");
    }
}

#[test]
fn unavailable_engine_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = touch(dir.path(), "clip.wav");
    let backend = Arc::new(ScriptedBackend::new(tone_with_noise(1.0, 1, 16000, 0.5)));
    let mut pipeline = scripted_pipeline(dir.path(), backend.clone());

    let mut job = ProcessingJob::builder(&input).engine(EngineKind::Demucs).build();
    let mut notifications = 0;
    assert!(!pipeline.process_job(&mut job, Some(&mut |_: &ProcessingJob| notifications += 1)));

    assert_eq!(job.stage(), ProcessingStage::Error);
    assert_eq!(job.error_message(), Some("Engine not available: demucs"));
    assert!(job.end_time().is_some());
    // start, validating, terminal
    assert_eq!(notifications, 3);
    assert!(backend.calls().is_empty());
}

#[test]
fn missing_input_and_missing_audio_track() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new(tone_with_noise(1.0, 1, 16000, 0.5)));
    let mut pipeline = scripted_pipeline(dir.path(), backend);

    let missing = dir.path().join("gone.wav");
    let mut job = ProcessingJob::new(&missing);
    assert!(!pipeline.process_job(&mut job, None));
    assert_eq!(job.error_message().unwrap(), format!("Input file not found: {}", missing.display()));

    let mut silent = ScriptedBackend::new(tone_with_noise(1.0, 1, 16000, 0.5));
    silent.has_audio = false;
    let mut pipeline = scripted_pipeline(dir.path(), Arc::new(silent));
    let input = touch(dir.path(), "slides.mp4");
    let mut job = ProcessingJob::new(&input);
    assert!(!pipeline.process_job(&mut job, None));
    assert!(job.error_message().unwrap().starts_with("No audio track found in"));
}

#[test]
fn bad_engine_config_fails_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let input = touch(dir.path(), "clip.wav");
    let backend = Arc::new(ScriptedBackend::new(tone_with_noise(1.0, 1, 16000, 0.5)));
    let mut pipeline = scripted_pipeline(dir.path(), backend);

    let config = dn_engine::parse_config_json(r#"{"reduction_db": "very"}"#).unwrap();
    let mut job = ProcessingJob::builder(&input).engine_config(config).build();
    assert!(!pipeline.process_job(&mut job, None));
    assert_eq!(job.stage(), ProcessingStage::Error);
}
