//! Offline noise reduction jobs
//!
//! - [`ProcessingJob`]: what to clean and how, plus the job's live state
//! - [`ProcessingPipeline`]: validate, load, reduce, post-process, save
//! - [`BatchProcessor`]: many jobs on a bounded rayon pool
//!
//! ```no_run
//! use dn_offline::{PipelineConfig, ProcessingJob, ProcessingPipeline};
//!
//! let mut pipeline = ProcessingPipeline::new(PipelineConfig::default());
//! let mut job = ProcessingJob::builder("interview.wav").format("flac").build();
//! let ok = pipeline.process_job(&mut job, Some(&mut |job: &ProcessingJob| {
//!     println!("{:>3.0}% {}", job.progress() * 100.0, job.message());
//! }));
//! assert_eq!(ok, job.error_message().is_none());
//! ```

mod batch;
mod config;
mod error;
mod job;
mod loudness;
mod pipeline;

pub use batch::{BatchProcessor, BatchStatus, BatchSummary};
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use job::{JobBuilder, JobId, ProcessingJob, ProcessingStage, DEFAULT_TARGET_LUFS};
pub use loudness::{integrated_loudness, LoudnessNormalizer, LufsNormalizer, ABSOLUTE_GATE_LUFS};
pub use pipeline::{JobObserver, ProcessingPipeline, LIMITER_CEILING, LIMITER_THRESHOLD};
