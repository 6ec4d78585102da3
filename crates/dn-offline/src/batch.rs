//! Batch runner: many jobs on a bounded worker pool

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use dn_core::CancelToken;
use dn_engine::{EngineKind, NoiseProfile};
use dn_media::MediaBackend;

use crate::config::PipelineConfig;
use crate::job::{JobId, ProcessingJob, ProcessingStage};
use crate::loudness::{LoudnessNormalizer, LufsNormalizer};
use crate::pipeline::ProcessingPipeline;

// ═══════════════════════════════════════════════════════════════════════════════
// STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Live view of a running batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStatus {
    /// Last reported (stage, progress) per job
    pub jobs: BTreeMap<JobId, (ProcessingStage, f64)>,
}

impl BatchStatus {
    /// Mean progress over all jobs
    pub fn overall_progress(&self) -> f64 {
        if self.jobs.is_empty() {
            return 0.0;
        }
        self.jobs.values().map(|(_, p)| p).sum::<f64>() / self.jobs.len() as f64
    }

    pub fn finished(&self) -> usize {
        self.jobs.values().filter(|(stage, _)| stage.is_terminal()).count()
    }
}

/// Outcome counts for a finished batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    pub fn from_jobs(jobs: &[ProcessingJob]) -> Self {
        let mut summary = Self {
            total: jobs.len(),
            ..Default::default()
        };
        for job in jobs {
            match job.stage() {
                ProcessingStage::Complete => summary.completed += 1,
                ProcessingStage::Cancelled => summary.cancelled += 1,
                _ => summary.failed += 1,
            }
        }
        summary
    }

    pub fn all_succeeded(&self) -> bool {
        self.completed == self.total
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BATCH PROCESSOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Runs jobs in parallel, one pipeline per job
///
/// A failing job never affects the others; results come back in input order.
pub struct BatchProcessor {
    config: PipelineConfig,
    engines: Vec<EngineKind>,
    media: Arc<dyn MediaBackend>,
    normalizer: Option<Arc<dyn LoudnessNormalizer>>,
    profile: Option<NoiseProfile>,
    cancel: CancelToken,
    status: Arc<RwLock<BatchStatus>>,
    max_parallel: usize,
}

impl BatchProcessor {
    /// Probes engines once for the whole batch
    pub fn new(config: PipelineConfig) -> Self {
        let engines = dn_engine::probe_engines(&config.toolchain());
        Self::with_available_engines(config, engines)
    }

    pub fn with_available_engines(config: PipelineConfig, engines: Vec<EngineKind>) -> Self {
        let media: Arc<dyn MediaBackend> = Arc::new(config.media_backend());
        let max_parallel = config.max_parallel_jobs.max(1);
        Self {
            config,
            engines,
            media,
            normalizer: Some(Arc::new(LufsNormalizer::new())),
            profile: None,
            cancel: CancelToken::new(),
            status: Arc::new(RwLock::new(BatchStatus::default())),
            max_parallel,
        }
    }

    pub fn with_media_backend(mut self, media: Arc<dyn MediaBackend>) -> Self {
        self.media = media;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Option<Arc<dyn LoudnessNormalizer>>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_noise_profile(mut self, profile: Option<NoiseProfile>) -> Self {
        self.profile = profile;
        self
    }

    /// Set max parallel jobs (minimum 1)
    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.max_parallel = max.max(1);
        self
    }

    pub fn available_engines(&self) -> &[EngineKind] {
        &self.engines
    }

    /// Stop every running and pending job at its next checkpoint
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Snapshot of per-job progress
    pub fn status(&self) -> BatchStatus {
        self.status.read().clone()
    }

    fn pipeline(&self) -> ProcessingPipeline {
        ProcessingPipeline::with_available_engines(self.config.clone(), self.engines.clone())
            .with_media_backend(Arc::clone(&self.media))
            .with_normalizer(self.normalizer.clone())
            .with_noise_profile(self.profile.clone())
            .with_cancel_token(self.cancel.clone())
    }

    /// Process all jobs; `results[i]` is the outcome of `jobs[i]`
    pub fn process_all(
        &self,
        jobs: &mut [ProcessingJob],
        observer: Option<&(dyn Fn(&ProcessingJob) + Sync)>,
    ) -> Vec<bool> {
        {
            let mut status = self.status.write();
            status.jobs = jobs.iter().map(|job| (job.id, (job.stage(), job.progress()))).collect();
        }

        let run = |job: &mut ProcessingJob| -> bool {
            let mut relay = |job: &ProcessingJob| {
                self.status.write().jobs.insert(job.id, (job.stage(), job.progress()));
                if let Some(observer) = observer {
                    observer(job);
                }
            };
            self.pipeline().process_job(job, Some(&mut relay))
        };

        if self.max_parallel == 1 || jobs.len() <= 1 {
            return jobs.iter_mut().map(run).collect();
        }

        match rayon::ThreadPoolBuilder::new().num_threads(self.max_parallel).build() {
            Ok(pool) => {
                log::info!("Processing {} jobs on {} workers", jobs.len(), self.max_parallel);
                pool.install(|| jobs.par_iter_mut().map(&run).collect())
            }
            Err(e) => {
                log::warn!("Could not start worker pool ({}), processing sequentially", e);
                jobs.iter_mut().map(run).collect()
            }
        }
    }
}
