//! Denoise command line
//!
//! Usage:
//!   denoise process <inputs...>     - Clean audio or video files
//!   denoise profile <input> -o FILE - Extract a noise profile
//!   denoise engines                 - List available engines and models

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use dn_engine::{available_models, parse_config_json, ConfigMap, EngineKind, NoiseProfile};
use dn_media::{DefaultMediaBackend, LoadOptions, MediaBackend};
use dn_offline::{BatchProcessor, BatchSummary, PipelineConfig, ProcessingJob, ProcessingStage};
use dn_spectral::{SpectralGateConfig, SpectralGateEngine};

#[derive(Parser)]
#[command(name = "denoise", version, about = "Remove background noise from audio and video")]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Pipeline config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean one or more media files
    Process(ProcessArgs),
    /// Extract a noise profile for later use with --profile
    Profile {
        input: PathBuf,
        /// Start of the noise-only range (seconds)
        #[arg(long, requires = "end")]
        start: Option<f64>,
        /// End of the noise-only range (seconds)
        #[arg(long, requires = "start")]
        end: Option<f64>,
        /// Profile file to write
        #[arg(short, long)]
        output: PathBuf,
    },
    /// List engines that can run on this machine
    Engines,
}

#[derive(Args)]
struct ProcessArgs {
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// spectral_gate, rnnoise or demucs
    #[arg(short, long, default_value = "spectral_gate")]
    engine: EngineKind,

    /// Engine settings as JSON, inline or a file path
    #[arg(long)]
    engine_config: Option<String>,

    /// Output format: wav, mp3, flac, aac
    #[arg(short, long, default_value = "wav")]
    format: String,

    /// Working sample rate (default: keep the input's)
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Write cleaned audio instead of remuxing video inputs
    #[arg(long)]
    no_preserve_video: bool,

    /// Normalize loudness to --target-lufs
    #[arg(long)]
    normalize: bool,

    #[arg(long, default_value_t = dn_offline::DEFAULT_TARGET_LUFS, allow_negative_numbers = true)]
    target_lufs: f64,

    /// Output file (single input only)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for outputs
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Noise profile for the spectral gate
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Jobs to run at once
    #[arg(short, long)]
    jobs: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Process(args) => process(config, args),
        Commands::Profile { input, start, end, output } => profile(&config, &input, start, end, &output),
        Commands::Engines => engines(&config),
    }
}

fn engine_config(arg: Option<&str>) -> Result<ConfigMap> {
    let Some(arg) = arg else {
        return Ok(ConfigMap::new());
    };
    let json = if arg.trim_start().starts_with('{') {
        arg.to_string()
    } else {
        std::fs::read_to_string(arg).with_context(|| format!("Failed to read engine config {}", arg))?
    };
    parse_config_json(&json).context("Invalid engine config")
}

fn process(config: PipelineConfig, args: ProcessArgs) -> Result<()> {
    if args.output.is_some() && args.inputs.len() > 1 {
        bail!("--output needs exactly one input; use --output-dir for several");
    }

    let output_dir = args.output_dir.or_else(|| config.output_dir.clone());
    let mut config = config.with_output_dir(output_dir);
    if let Some(jobs) = args.jobs {
        config = config.with_max_parallel_jobs(jobs);
    }

    let engine_config = engine_config(args.engine_config.as_deref())?;
    let profile = match &args.profile {
        Some(path) => Some(
            NoiseProfile::load(path).with_context(|| format!("Failed to load profile {}", path.display()))?,
        ),
        None => None,
    };

    let mut jobs: Vec<ProcessingJob> = args
        .inputs
        .iter()
        .map(|input| {
            let mut builder = ProcessingJob::builder(input)
                .engine(args.engine)
                .engine_config(engine_config.clone())
                .format(&args.format)
                .sample_rate(args.sample_rate)
                .preserve_video(!args.no_preserve_video);
            if args.normalize {
                builder = builder.normalize_loudness(args.target_lufs);
            }
            if let Some(output) = &args.output {
                builder = builder.output(output);
            }
            builder.build()
        })
        .collect();

    log::info!("Queued {} job(s) for {}", jobs.len(), args.engine);
    let batch = BatchProcessor::new(config).with_noise_profile(profile);
    if !batch.available_engines().contains(&args.engine) {
        bail!("Engine not available: {}", args.engine);
    }

    let report = |job: &ProcessingJob| {
        if job.stage() != ProcessingStage::Idle {
            println!("[{}] {:>3.0}% {}", job.file_name(), job.progress() * 100.0, job.message());
        }
    };
    batch.process_all(&mut jobs, Some(&report));

    for job in &jobs {
        match job.stage() {
            ProcessingStage::Complete => {
                let output = job.output_path.as_deref().unwrap_or(Path::new("?"));
                print!("OK    {} -> {}", job.input_path.display(), output.display());
                if let Some(seconds) = job.processing_time() {
                    print!(" ({:.1}s", seconds);
                    if let (Some(before), Some(after)) = (job.estimated_snr_before, job.estimated_snr_after) {
                        print!(", SNR {:.1} -> {:.1} dB", before, after);
                    }
                    print!(")");
                }
                println!();
            }
            ProcessingStage::Cancelled => println!("CANCEL {}", job.input_path.display()),
            _ => println!(
                "FAIL  {}: {}",
                job.input_path.display(),
                job.error_message().unwrap_or("unknown error")
            ),
        }
    }

    let summary = BatchSummary::from_jobs(&jobs);
    if !summary.all_succeeded() {
        bail!(
            "{} of {} jobs did not complete ({} failed, {} cancelled)",
            summary.total - summary.completed,
            summary.total,
            summary.failed,
            summary.cancelled
        );
    }
    Ok(())
}

fn profile(config: &PipelineConfig, input: &Path, start: Option<f64>, end: Option<f64>, output: &Path) -> Result<()> {
    let backend: DefaultMediaBackend = config.media_backend();
    let signal = backend
        .load_audio(input, &LoadOptions::default())
        .with_context(|| format!("Failed to load audio from {}", input.display()))?;

    let engine = SpectralGateEngine::new(SpectralGateConfig::default());
    let Some(profile) = engine.create_noise_profile(&signal, start, end)? else {
        match (start, end) {
            (Some(s), Some(e)) => bail!("Invalid noise range {:.2}s..{:.2}s for a {:.2}s file", s, e, signal.duration()),
            _ => bail!("No silent region of at least 0.5s found; pass --start and --end"),
        }
    };

    profile
        .save(output)
        .with_context(|| format!("Failed to save profile {}", output.display()))?;
    println!(
        "Saved {} profile ({} bins, {:.2}s, confidence {:.2}) to {}",
        profile.source_type().as_str(),
        profile.power_spectrum().len(),
        profile.duration(),
        profile.confidence(),
        output.display()
    );
    Ok(())
}

fn engines(config: &PipelineConfig) -> Result<()> {
    let available = dn_engine::probe_engines(&config.toolchain());
    for kind in EngineKind::ALL {
        let mark = if available.contains(&kind) { "yes" } else { "no " };
        println!("{}  {:<14} {}", mark, kind.as_str(), kind.display_name());
    }

    if available.contains(&EngineKind::RNNoise) {
        let models = available_models(&config.rnnoise_models_dir);
        println!("\nRNNoise models in {}:", config.rnnoise_models_dir.display());
        if models.is_empty() {
            println!("  (none)");
        }
        for model in models {
            println!("  {:<20} {} ({})", model.filename, model.name, model.best_for);
        }
    }

    Ok(())
}
