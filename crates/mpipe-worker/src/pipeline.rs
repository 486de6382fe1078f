//! Job orchestration: fetch, normalize, transcode, verify, publish, clean up.
//!
//! A job walks the `PipelineState` machine. Every stage future is bounded by
//! its configured timeout and raced against the cancellation signal; dropping
//! a stage future kills any tool process it spawned. Whatever the outcome,
//! the files registered in the job's `JobWorkspace` are removed before the
//! result is reported.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{info, Instrument};

use mpipe_media::fs_utils::{file_size, remove_file_logged};
use mpipe_media::{
    combine_videos, convert_audio, normalize_faststart, normalized_path_for, probe_media, CombinePlan,
    FfmpegRunner, Fetcher, NormalizeResult, ToolRunner,
};
use mpipe_models::{
    AudioEncoding, CodecSummary, JobFailure, JobMode, JobRequest, JobResult, JobStatus, PipelineState,
    SourceDescriptor, SourceReport, Stage, VideoEncoding,
};
use mpipe_storage::ArtifactPublisher;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::workspace::JobWorkspace;

/// Successful pipeline outcome.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Local artifact, unless it was removed after publishing
    pub output_path: Option<PathBuf>,
    pub published_url: Option<String>,
    /// How sources were combined (combine mode only)
    pub plan: Option<CombinePlan>,
    pub sources: Vec<SourceReport>,
    pub diagnostics: Vec<String>,
}

/// Mutable per-job bookkeeping, kept even when the job fails.
#[derive(Debug)]
struct JobContext {
    job_id: String,
    state: PipelineState,
    sources: Vec<SourceReport>,
    diagnostics: Vec<String>,
    retained_output: Option<PathBuf>,
    published_url: Option<String>,
    plan: Option<CombinePlan>,
}

impl JobContext {
    fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            state: PipelineState::Pending,
            sources: Vec::new(),
            diagnostics: Vec::new(),
            retained_output: None,
            published_url: None,
            plan: None,
        }
    }

    fn transition(&mut self, next: PipelineState) -> PipelineResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(PipelineError::internal(
                stage_of(self.state),
                format!("illegal state transition {} -> {}", self.state.as_str(), next.as_str()),
            ));
        }

        info!(
            job_id = %self.job_id,
            from = self.state.as_str(),
            to = next.as_str(),
            "State transition"
        );
        self.state = next;
        Ok(())
    }

    fn fail(&mut self) {
        if !self.state.is_terminal() {
            info!(
                job_id = %self.job_id,
                from = self.state.as_str(),
                to = PipelineState::Failed.as_str(),
                "State transition"
            );
            self.state = PipelineState::Failed;
        }
    }
}

/// Stage a state's work is attributed to.
fn stage_of(state: PipelineState) -> Stage {
    match state {
        PipelineState::Pending => Stage::Validate,
        PipelineState::Fetching => Stage::Fetch,
        PipelineState::Normalizing => Stage::Normalize,
        PipelineState::Transcoding => Stage::Transcode,
        PipelineState::Verifying => Stage::Verify,
        PipelineState::Publishing | PipelineState::Done | PipelineState::Failed => Stage::Publish,
    }
}

/// A downloaded, non-empty source.
struct FetchedSource {
    index: usize,
    path: PathBuf,
}

/// An encoded output and the inputs it was built from.
struct Transcoded {
    output: PathBuf,
    inputs: Vec<PathBuf>,
}

/// A source ready for the transcoder.
struct PreparedSource {
    index: usize,
    path: PathBuf,
    normalized: bool,
    probe: Option<CodecSummary>,
    diagnostics: Vec<String>,
}

/// Resolves once `cancel` flips to `true`; never if the sender goes away.
async fn cancelled(mut cancel: watch::Receiver<bool>) {
    if cancel.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Run `fut` under `limit`, aborting early on cancellation.
async fn guard<F>(
    stage: Stage,
    limit: Duration,
    cancel: &watch::Receiver<bool>,
    fut: F,
) -> PipelineResult<F::Output>
where
    F: Future,
{
    if *cancel.borrow() {
        return Err(PipelineError::Cancelled);
    }

    let started = Instant::now();
    let outcome = tokio::select! {
        res = tokio::time::timeout(limit, fut) => res,
        _ = cancelled(cancel.clone()) => return Err(PipelineError::Cancelled),
    };
    metrics::record_stage_duration(stage, started.elapsed().as_secs_f64());

    outcome.map_err(|_| PipelineError::Timeout {
        stage,
        secs: limit.as_secs(),
    })
}

/// The media pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Arc<dyn Fetcher>,
    ffmpeg: FfmpegRunner,
    publisher: Option<Arc<dyn ArtifactPublisher>>,
    video: VideoEncoding,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, fetcher: Arc<dyn Fetcher>, tools: Arc<dyn ToolRunner>) -> Self {
        Self {
            config,
            fetcher,
            ffmpeg: FfmpegRunner::new(tools),
            publisher: None,
            video: VideoEncoding::default(),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn ArtifactPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run a job and describe the outcome. Never fails.
    pub async fn run(&self, job: &JobRequest, cancel: watch::Receiver<bool>) -> JobResult {
        let started_at = Utc::now();
        let (result, ctx) = self.drive(job, cancel).await;

        let (status, output_path, published_url, error) = match result {
            Ok(output) => (JobStatus::Done, output.output_path, output.published_url, None),
            Err(e) => (
                JobStatus::Failed,
                ctx.retained_output,
                ctx.published_url,
                Some(JobFailure {
                    stage: e.stage(),
                    message: e.to_string(),
                    diagnostic: e.diagnostic().map(str::to_string),
                }),
            ),
        };

        JobResult {
            job_id: job.job_id.clone(),
            status,
            output_path,
            published_url,
            error,
            diagnostics: ctx.diagnostics,
            sources: ctx.sources,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Run a job, returning typed errors.
    pub async fn execute(
        &self,
        job: &JobRequest,
        cancel: watch::Receiver<bool>,
    ) -> PipelineResult<PipelineOutput> {
        self.drive(job, cancel).await.0
    }

    async fn drive(
        &self,
        job: &JobRequest,
        cancel: watch::Receiver<bool>,
    ) -> (PipelineResult<PipelineOutput>, JobContext) {
        let logger = JobLogger::new(&job.job_id, job.mode);
        let span = logger.create_span();

        async move {
            let mut ctx = JobContext::new(job.job_id.as_str());
            logger.log_start(&format!("{} source(s)", job.sources.len()));

            let result = self.process(job, &cancel, &logger, &mut ctx).await;

            match &result {
                Ok(output) => {
                    metrics::record_job_completed(job.mode.as_str());
                    let location = output
                        .published_url
                        .clone()
                        .or_else(|| output.output_path.as_ref().map(|p| p.display().to_string()))
                        .unwrap_or_default();
                    logger.log_completion(&location);
                }
                Err(e) => {
                    ctx.fail();
                    metrics::record_job_failed(job.mode.as_str(), e.stage());
                    match e.diagnostic() {
                        Some(diag) => logger.log_error(&format!("[{}] {}: {}", e.stage(), e, diag)),
                        None => logger.log_error(&format!("[{}] {}", e.stage(), e)),
                    }
                }
            }

            (result, ctx)
        }
        .instrument(span)
        .await
    }

    async fn process(
        &self,
        job: &JobRequest,
        cancel: &watch::Receiver<bool>,
        logger: &JobLogger,
        ctx: &mut JobContext,
    ) -> PipelineResult<PipelineOutput> {
        job.validate_with_file_urls(self.config.allow_file_urls)?;

        let ws = JobWorkspace::new(&self.config.work_dir, &job.job_id);
        ws.prepare()
            .await
            .map_err(|e| PipelineError::internal(Stage::Fetch, format!("work dir: {}", e)))?;

        let outcome = self.run_stages(job, &ws, cancel, logger, ctx).await;

        let warnings = ws.cleanup().await;
        for warning in &warnings {
            logger.log_warning(warning);
        }
        ctx.diagnostics.extend(warnings);

        let output_path = outcome?;
        Ok(PipelineOutput {
            output_path,
            published_url: ctx.published_url.clone(),
            plan: ctx.plan,
            sources: ctx.sources.clone(),
            diagnostics: ctx.diagnostics.clone(),
        })
    }

    /// Returns the retained local artifact, if any.
    async fn run_stages(
        &self,
        job: &JobRequest,
        ws: &JobWorkspace,
        cancel: &watch::Receiver<bool>,
        logger: &JobLogger,
        ctx: &mut JobContext,
    ) -> PipelineResult<Option<PathBuf>> {
        ctx.transition(PipelineState::Fetching)?;

        let transcoded = match job.mode {
            JobMode::Convert => self.convert(job, ws, cancel, logger, ctx).await?,
            JobMode::Combine => self.combine(job, ws, cancel, logger, ctx).await?,
        };

        ctx.transition(PipelineState::Verifying)?;
        self.verify(&transcoded.output).await?;

        // Inputs stay on disk until the output is known to be good.
        for input in &transcoded.inputs {
            if remove_file_logged(input).await {
                ws.release(input);
            }
        }

        self.publish(transcoded.output, ws, cancel, logger, ctx).await
    }

    async fn convert(
        &self,
        job: &JobRequest,
        ws: &JobWorkspace,
        cancel: &watch::Receiver<bool>,
        logger: &JobLogger,
        ctx: &mut JobContext,
    ) -> PipelineResult<Transcoded> {
        let source = job
            .sources
            .first()
            .ok_or_else(|| PipelineError::internal(Stage::Fetch, "convert job without a source"))?;

        let input = ws.input_path(None);
        let fetched = self.fetch_source(ws, 0, source, input, cancel).await?;
        let probe = self.probe(fetched.index, &fetched.path, cancel, &mut ctx.diagnostics).await?;
        ctx.sources.push(SourceReport {
            index: 0,
            order: source.order,
            url: source.url.clone(),
            size_bytes: file_size(&fetched.path).await.unwrap_or(0),
            normalized: false,
            probe,
        });

        ctx.transition(PipelineState::Transcoding)?;
        let encoding = AudioEncoding::with_bitrate(job.effective_bitrate());
        let output = ws.output_path(&encoding.extension);
        ws.track(&output);

        logger.log_progress(&format!("converting to {} @ {}", encoding.codec, encoding.bitrate));
        guard(
            Stage::Transcode,
            self.config.encode_timeout,
            cancel,
            convert_audio(&self.ffmpeg, &fetched.path, &output, &encoding),
        )
        .await?
        .map_err(PipelineError::transcode)?;

        Ok(Transcoded {
            output,
            inputs: vec![fetched.path],
        })
    }

    async fn combine(
        &self,
        job: &JobRequest,
        ws: &JobWorkspace,
        cancel: &watch::Receiver<bool>,
        logger: &JobLogger,
        ctx: &mut JobContext,
    ) -> PipelineResult<Transcoded> {
        let sources = job.ordered_sources();
        let limit = self.config.max_fetch_parallel.max(1);

        logger.log_progress(&format!(
            "fetching {} source(s), up to {} at a time",
            sources.len(),
            limit
        ));

        let mut fetched = Vec::with_capacity(sources.len());
        {
            let mut downloads = stream::iter(sources.iter().enumerate())
                .map(|(index, source)| self.fetch_source(ws, index, source, ws.input_path(Some(index)), cancel))
                .buffered(limit);

            while let Some(result) = downloads.next().await {
                let source = result?;
                let descriptor = &sources[source.index];
                ctx.sources.push(SourceReport {
                    index: source.index,
                    order: descriptor.order,
                    url: descriptor.url.clone(),
                    size_bytes: file_size(&source.path).await.unwrap_or(0),
                    normalized: false,
                    probe: None,
                });
                fetched.push(source);
            }
        }

        ctx.transition(PipelineState::Normalizing)?;

        let mut inputs = Vec::with_capacity(fetched.len());
        {
            let mut prepared = stream::iter(fetched)
                .map(|source| self.prepare_source(ws, source, cancel))
                .buffered(limit);

            while let Some(result) = prepared.next().await {
                let source = result?;
                if let Some(report) = ctx.sources.get_mut(source.index) {
                    report.normalized = source.normalized;
                    report.probe = source.probe;
                }
                ctx.diagnostics.extend(source.diagnostics);
                inputs.push(source.path);
            }
        }

        ctx.transition(PipelineState::Transcoding)?;
        let output = ws.output_path(&self.video.extension);
        ws.track(&output);

        let plan = guard(
            Stage::Transcode,
            self.config.encode_timeout,
            cancel,
            combine_videos(&self.ffmpeg, &inputs, &output, &self.video),
        )
        .await?
        .map_err(PipelineError::transcode)?;

        logger.log_progress(&format!("combined {} input(s) ({:?})", inputs.len(), plan));
        ctx.plan = Some(plan);

        Ok(Transcoded { output, inputs })
    }

    async fn fetch_source(
        &self,
        ws: &JobWorkspace,
        index: usize,
        source: &SourceDescriptor,
        dest: PathBuf,
        cancel: &watch::Receiver<bool>,
    ) -> PipelineResult<FetchedSource> {
        ws.track(&dest);

        let path = guard(
            Stage::Fetch,
            self.config.fetch_timeout,
            cancel,
            self.fetcher.fetch(&source.url, &dest),
        )
        .await?
        .map_err(|e| PipelineError::fetch(index, &e))?;

        if path != dest {
            ws.track(&path);
        }

        match file_size(&path).await {
            Ok(0) => Err(PipelineError::EmptyDownload {
                index,
                url: source.url.clone(),
            }),
            Ok(size) => {
                info!(index, url = %source.url, size, "Source fetched");
                Ok(FetchedSource { index, path })
            }
            Err(e) => Err(PipelineError::fetch(index, &e)),
        }
    }

    async fn prepare_source(
        &self,
        ws: &JobWorkspace,
        source: FetchedSource,
        cancel: &watch::Receiver<bool>,
    ) -> PipelineResult<PreparedSource> {
        let mut diagnostics = Vec::new();
        let fixed = normalized_path_for(&source.path);
        ws.track(&fixed);

        let normalized = match guard(
            Stage::Normalize,
            self.config.normalize_timeout,
            cancel,
            normalize_faststart(&self.ffmpeg, &source.path),
        )
        .await
        {
            Ok(result) => result,
            Err(PipelineError::Timeout { secs, .. }) => {
                remove_file_logged(&fixed).await;
                NormalizeResult::Fallback {
                    path: source.path.clone(),
                    reason: format!("remux timed out after {}s", secs),
                }
            }
            Err(e) => return Err(e),
        };

        if let NormalizeResult::Fallback { reason, .. } = &normalized {
            metrics::record_normalize_fallback();
            diagnostics.push(format!(
                "normalize: source {} used as-is: {}",
                source.index, reason
            ));
        }

        let is_normalized = !normalized.is_fallback();
        let path = normalized.into_path();
        let probe = self.probe(source.index, &path, cancel, &mut diagnostics).await?;

        Ok(PreparedSource {
            index: source.index,
            path,
            normalized: is_normalized,
            probe,
            diagnostics,
        })
    }

    /// Best-effort probe; failures become diagnostics.
    async fn probe(
        &self,
        index: usize,
        path: &std::path::Path,
        cancel: &watch::Receiver<bool>,
        diagnostics: &mut Vec<String>,
    ) -> PipelineResult<Option<CodecSummary>> {
        let tools = self.ffmpeg.tools().as_ref();

        match guard(Stage::Probe, self.config.probe_timeout, cancel, probe_media(tools, path)).await {
            Ok(Ok(summary)) => {
                info!(
                    index,
                    format = summary.format_name.as_deref().unwrap_or("unknown"),
                    video = summary.video_codec.as_deref().unwrap_or("none"),
                    audio = summary.audio_codec.as_deref().unwrap_or("none"),
                    "Probed source"
                );
                Ok(Some(summary))
            }
            Ok(Err(e)) => {
                diagnostics.push(format!("probe: source {}: {}", index, e));
                Ok(None)
            }
            Err(e @ PipelineError::Timeout { .. }) => {
                diagnostics.push(format!("probe: source {}: {}", index, e));
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn verify(&self, output: &std::path::Path) -> PipelineResult<()> {
        match file_size(output).await {
            Ok(0) => Err(PipelineError::verification(format!(
                "{} is empty",
                output.display()
            ))),
            Ok(size) => {
                info!(path = %output.display(), size, "Output verified");
                Ok(())
            }
            Err(_) => Err(PipelineError::verification(format!(
                "{} was not produced",
                output.display()
            ))),
        }
    }

    async fn publish(
        &self,
        output: PathBuf,
        ws: &JobWorkspace,
        cancel: &watch::Receiver<bool>,
        logger: &JobLogger,
        ctx: &mut JobContext,
    ) -> PipelineResult<Option<PathBuf>> {
        let Some(publisher) = &self.publisher else {
            ws.release(&output);
            ctx.transition(PipelineState::Done)?;
            return Ok(Some(output));
        };

        ctx.transition(PipelineState::Publishing)?;

        let uploaded = match guard(
            Stage::Publish,
            self.config.publish_timeout,
            cancel,
            publisher.upload(&output),
        )
        .await
        {
            Ok(Ok(url)) => url,
            Ok(Err(e)) => {
                ws.release(&output);
                ctx.retained_output = Some(output);
                return Err(PipelineError::publish(e.to_string()));
            }
            Err(e @ PipelineError::Timeout { .. }) => {
                ws.release(&output);
                ctx.retained_output = Some(output);
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        logger.log_progress(&format!("published to {}", uploaded));
        ctx.published_url = Some(uploaded);

        let retained = if self.config.keep_published_artifacts {
            ws.release(&output);
            Some(output)
        } else {
            None
        };

        ctx.transition(PipelineState::Done)?;
        Ok(retained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mpipe_media::{MediaResult, ToolOutput};
    use std::path::Path;
    use tempfile::TempDir;

    /// Exits 0 for every call without writing anything.
    struct SilentTools;

    #[async_trait]
    impl ToolRunner for SilentTools {
        async fn run_tool(&self, _program: &str, _args: &[String]) -> MediaResult<ToolOutput> {
            Ok(ToolOutput {
                exit_code: Some(0),
                ..Default::default()
            })
        }
    }

    struct StaticFetcher;

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, _url: &str, dest: &Path) -> MediaResult<PathBuf> {
            tokio::fs::write(dest, b"media").await?;
            Ok(dest.to_path_buf())
        }
    }

    #[test]
    fn test_illegal_transition_is_internal_error() {
        let mut ctx = JobContext::new("job1");
        let err = ctx.transition(PipelineState::Transcoding).unwrap_err();
        assert!(matches!(err, PipelineError::Internal { stage: Stage::Validate, .. }));
        assert_eq!(ctx.state, PipelineState::Pending);

        ctx.transition(PipelineState::Fetching).unwrap();
        ctx.fail();
        assert_eq!(ctx.state, PipelineState::Failed);
        assert!(ctx.transition(PipelineState::Done).is_err());
    }

    #[tokio::test]
    async fn test_guard_times_out() {
        let (_tx, rx) = watch::channel(false);
        let err = guard(Stage::Fetch, Duration::from_millis(10), &rx, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Timeout { stage: Stage::Fetch, .. }));
    }

    #[tokio::test]
    async fn test_guard_observes_cancellation() {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            guard(Stage::Transcode, Duration::from_secs(60), &rx, async {
                tokio::time::sleep(Duration::from_secs(60)).await;
            })
            .await
        });
        tx.send(true).unwrap();
        assert!(matches!(handle.await.unwrap(), Err(PipelineError::Cancelled)));
    }

    #[tokio::test]
    async fn test_guard_ignores_dropped_sender() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let value = guard(Stage::Probe, Duration::from_secs(1), &rx, async { 7 })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_inputs_survive_failed_verification() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::default().with_work_dir(dir.path());
        let pipeline = Pipeline::new(config, Arc::new(StaticFetcher), Arc::new(SilentTools));
        let (_tx, rx) = watch::channel(false);

        let convert = JobRequest::convert("conv", "https://media.test/a.mp4", None);
        let combine = JobRequest::combine(
            "comb",
            vec![
                SourceDescriptor::new("https://media.test/a.mp4", 0),
                SourceDescriptor::new("https://media.test/b.mp4", 1),
            ],
        );

        for (job, inputs) in [
            (&convert, vec![None]),
            (&combine, vec![Some(0), Some(1)]),
        ] {
            let ws = JobWorkspace::new(dir.path(), &job.job_id);
            let logger = JobLogger::new(&job.job_id, job.mode);
            let mut ctx = JobContext::new(job.job_id.as_str());

            let err = pipeline
                .run_stages(job, &ws, &rx, &logger, &mut ctx)
                .await
                .unwrap_err();
            assert!(matches!(err, PipelineError::Verification(_)), "{}", err);
            assert_eq!(ctx.state, PipelineState::Verifying);

            for index in inputs {
                let input = ws.input_path(index);
                assert!(input.exists(), "{} removed before verification", input.display());
                assert!(ws.tracked().contains(&input));
            }

            assert!(ws.cleanup().await.is_empty());
        }

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
