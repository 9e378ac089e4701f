use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;

use super::encoder::{SubmissionEncoder, SubmitOutcome};
use super::poller::{spawn_poller, PollHandle, PollPlan, TickOutcome};
use super::presentation::{build_panes, translated_filename, Pane};
use crate::domain::backend::{BackendError, PollSignal, TranslationBackend};
use crate::domain::error::AppError;
use crate::domain::job::{
    Generation, Job, JobManager, JobSnapshot, JobStatus, SourceDocument, StateTransition,
    TranslatedArtifact,
};
use crate::domain::preview::{PreviewContent, PreviewRegistry, PreviewStats};
use crate::domain::settings::ControllerSettings;
use crate::domain::types::{
    content_type_for, LocalFile, TargetLanguage, TransportMode, MAX_FILE_BYTES,
};
use crate::infra::backend::HttpBackend;
use crate::infra::metrics::{Metrics, MetricsSummary};

pub const MISSING_ENDPOINT_MESSAGE: &str = "Translation API endpoint is not configured";
pub const NO_FILE_MESSAGE: &str = "No file selected";
pub const FILE_TOO_LARGE_MESSAGE: &str = "File too large (max 5MB)";

/// コントローラーから発行されるイベント
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    StateChanged(StateTransition),
    Progress { generation: Generation, percent: u8 },
}

struct ControllerState {
    settings: ControllerSettings,
    jobs: JobManager,
    poller: Option<PollHandle>,
    started_at: Option<Instant>,
    events: Option<mpsc::UnboundedSender<JobEvent>>,
}

fn send_event(events: &Option<mpsc::UnboundedSender<JobEvent>>, event: JobEvent) {
    if let Some(tx) = events {
        if tx.send(event).is_err() {
            log::debug!("event receiver dropped");
        }
    }
}

fn send_transition(events: &Option<mpsc::UnboundedSender<JobEvent>>, t: StateTransition) {
    log::debug!(
        "job {}: {} -> {} ({}%)",
        t.generation,
        t.prev_state.as_str(),
        t.new_state.as_str(),
        t.progress
    );
    send_event(events, JobEvent::StateChanged(t));
}

fn record_total(metrics: &Metrics, started_at: &mut Option<Instant>) {
    if let Some(start) = started_at.take() {
        metrics.record_latency("total", start.elapsed().as_millis() as u64);
    }
}

impl ControllerState {
    fn stop_poller(&mut self) {
        if let Some(handle) = self.poller.take() {
            log::debug!("stopping poller for generation {}", handle.generation());
            handle.stop();
        }
    }
}

fn lock(state: &Mutex<ControllerState>) -> MutexGuard<'_, ControllerState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

struct PreparedSubmission {
    generation: Generation,
    endpoint: String,
    file: LocalFile,
    target: TargetLanguage,
    transport: TransportMode,
}

enum Preparation {
    Ready(PreparedSubmission),
    Rejected(JobSnapshot),
}

enum ArtifactSource {
    Bytes(Arc<[u8]>),
    Url(String),
}

/// 翻訳ジョブコントローラー
///
/// アクティブなジョブは常に1つ。新しいファイル選択やリセットでジョブ世代が進み、
/// 古い世代宛ての応答はすべて破棄される。
pub struct TranslationController {
    state: Arc<Mutex<ControllerState>>,
    backend: Arc<dyn TranslationBackend>,
    previews: PreviewRegistry,
    metrics: Arc<Metrics>,
}

impl TranslationController {
    pub fn new(settings: ControllerSettings, backend: Arc<dyn TranslationBackend>) -> Self {
        let jobs = JobManager::new(settings.default_target_language);
        Self {
            state: Arc::new(Mutex::new(ControllerState {
                settings,
                jobs,
                poller: None,
                started_at: None,
                events: None,
            })),
            backend,
            previews: PreviewRegistry::new(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// reqwest バックエンドで構築する
    pub fn with_http_backend(settings: ControllerSettings) -> Result<Self, AppError> {
        let backend = HttpBackend::new(settings.request_timeout())
            .map_err(|e| AppError::internal(e.to_string()))?;
        Ok(Self::new(settings, Arc::new(backend)))
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        lock(&self.state)
    }

    /// イベント受信チャネルを返す（以前の購読者は置き換えられる）
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<JobEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().events = Some(tx);
        rx
    }

    // ==================== File intake ====================

    /// ファイルを選択して新しいジョブを開始する。前のジョブのポーリングとプレビューは破棄される
    pub fn select_file(&self, file: LocalFile) -> JobSnapshot {
        let mut st = self.lock();
        st.stop_poller();
        log::info!("file selected: {} ({} bytes)", file.name, file.size());
        let target = st.jobs.active().target_language();
        let preview = self
            .previews
            .allocate(Arc::clone(&file.bytes), file.content_type());
        let previous = st.jobs.select(SourceDocument { file, preview }, target);
        Self::retire(&mut st, previous)
    }

    /// 全状態をクリアする
    pub fn reset(&self) -> JobSnapshot {
        let mut st = self.lock();
        st.stop_poller();
        let previous = st.jobs.reset();
        log::info!("job {} reset", previous.generation());
        Self::retire(&mut st, previous)
    }

    fn retire(st: &mut ControllerState, previous: Job) -> JobSnapshot {
        let prev_state = previous.status();
        if prev_state.is_in_flight() {
            log::info!(
                "discarding in-flight job {} ({})",
                previous.generation(),
                prev_state.as_str()
            );
        }
        // プレビュー参照はここで解放される
        drop(previous);
        st.started_at = None;

        let job = st.jobs.active();
        send_transition(
            &st.events,
            StateTransition {
                generation: job.generation(),
                prev_state,
                new_state: JobStatus::Idle,
                progress: job.progress().percent(),
            },
        );
        job.snapshot()
    }

    pub fn set_target_language(&self, target: TargetLanguage) -> Result<(), AppError> {
        self.lock().jobs.active_mut().set_target_language(target)
    }

    // ==================== Submission ====================

    /// 翻訳を開始する
    ///
    /// ガード違反や通信失敗はジョブを `failed` にして `Ok` で返す。
    /// 送信中・ポーリング中に呼ぶと `E_INVALID_STATE`。
    pub async fn translate(&self) -> Result<JobSnapshot, AppError> {
        let prepared = match self.prepare_submission()? {
            Preparation::Ready(prepared) => prepared,
            Preparation::Rejected(snapshot) => return Ok(snapshot),
        };

        let encoder = SubmissionEncoder::new(
            Arc::clone(&self.backend),
            prepared.transport,
            Arc::clone(&self.metrics),
        );
        let state = Arc::downgrade(&self.state);
        let generation = prepared.generation;
        let outcome = encoder
            .submit(&prepared.endpoint, &prepared.file, prepared.target, move || {
                let Some(state) = state.upgrade() else {
                    return;
                };
                let mut guard = lock(&state);
                let st = &mut *guard;
                if let Some(job) = st.jobs.active_for(generation) {
                    if let Ok(percent) = job.mark_uploaded() {
                        send_event(&st.events, JobEvent::Progress { generation, percent });
                    }
                }
            })
            .await;

        self.apply_submission(prepared, outcome)
    }

    fn prepare_submission(&self) -> Result<Preparation, AppError> {
        let mut guard = self.lock();
        let st = &mut *guard;

        let status = st.jobs.active().status();
        if status.is_in_flight() {
            return Err(AppError::invalid_state(format!(
                "translation is already {}",
                status.as_str()
            )));
        }
        if status.is_terminal() {
            // 終了済みジョブは再開しない。同じファイルで新しいジョブを作る
            let target = st.jobs.active().target_language();
            let previous = match st.jobs.active().file().cloned() {
                Some(file) => {
                    let preview = self
                        .previews
                        .allocate(Arc::clone(&file.bytes), file.content_type());
                    st.jobs.select(SourceDocument { file, preview }, target)
                }
                None => st.jobs.reset(),
            };
            Self::retire(st, previous);
        }

        let endpoint = st.settings.endpoint().map(str::to_string);
        let transport = st.settings.transport;
        let job = st.jobs.active_mut();

        let checked = match (job.file().cloned(), endpoint) {
            (None, _) => Err(AppError::validation(NO_FILE_MESSAGE)),
            (Some(_), None) => Err(AppError::config(MISSING_ENDPOINT_MESSAGE)),
            (Some(file), Some(_)) if file.size() > MAX_FILE_BYTES => {
                Err(AppError::validation(FILE_TOO_LARGE_MESSAGE))
            }
            (Some(file), Some(endpoint)) => Ok((file, endpoint)),
        };

        match checked {
            Err(error) => {
                log::warn!("translate rejected: {error}");
                let t = job.fail(error)?;
                self.metrics.inc_jobs_failed();
                send_transition(&st.events, t);
                Ok(Preparation::Rejected(st.jobs.active().snapshot()))
            }
            Ok((file, endpoint)) => {
                let t = job.begin_submission()?;
                let generation = job.generation();
                let target = job.target_language();
                send_transition(&st.events, t);
                st.started_at = Some(Instant::now());
                self.metrics.inc_jobs_started();
                log::info!("job {generation}: translating {} to {target}", file.name);
                Ok(Preparation::Ready(PreparedSubmission {
                    generation,
                    endpoint,
                    file,
                    target,
                    transport,
                }))
            }
        }
    }

    fn apply_submission(
        &self,
        prepared: PreparedSubmission,
        outcome: Result<SubmitOutcome, BackendError>,
    ) -> Result<JobSnapshot, AppError> {
        let mut guard = self.lock();
        let st = &mut *guard;
        let generation = prepared.generation;

        if !st.jobs.is_current(generation) {
            self.metrics.inc_stale_responses();
            log::debug!("discarding submission result for stale job {generation}");
            return Ok(st.jobs.active().snapshot());
        }

        match outcome {
            Ok(SubmitOutcome::Delivered { bytes, filename }) => {
                let preview = self
                    .previews
                    .allocate(Arc::<[u8]>::from(bytes), content_type_for(&filename));
                let job = st.jobs.active_mut();
                let delivered = job.deliver_inline(preview, filename)?;
                let completed = job.finish_inline()?;
                send_transition(&st.events, delivered);
                send_transition(&st.events, completed);
                self.metrics.inc_inline_deliveries();
                self.metrics.inc_jobs_completed();
                record_total(&self.metrics, &mut st.started_at);
                log::info!("job {generation}: translation delivered inline");
            }
            Ok(SubmitOutcome::Deferred { request_id }) => {
                let t = st.jobs.active_mut().await_result(request_id.clone())?;
                send_transition(&st.events, t);
                log::info!("job {generation}: accepted as {request_id}, polling for result");

                let plan = PollPlan {
                    generation,
                    endpoint: prepared.endpoint,
                    request_id,
                    interval: st.settings.poll_interval(),
                };
                let on_tick = self.tick_handler(generation, st.settings.max_poll_ticks);
                st.poller = Some(spawn_poller(Arc::clone(&self.backend), plan, on_tick));
            }
            Err(e) => {
                log::warn!("job {generation}: submission failed: {e}");
                let t = st
                    .jobs
                    .active_mut()
                    .fail(AppError::transport(e.user_message()))?;
                send_transition(&st.events, t);
                self.metrics.inc_jobs_failed();
                st.started_at = None;
            }
        }

        Ok(st.jobs.active().snapshot())
    }

    // ==================== Polling ====================

    fn tick_handler(
        &self,
        generation: Generation,
        max_ticks: Option<u32>,
    ) -> impl FnMut(Result<PollSignal, BackendError>) -> TickOutcome + Send + 'static {
        let state: Weak<Mutex<ControllerState>> = Arc::downgrade(&self.state);
        let metrics = Arc::clone(&self.metrics);
        let mut ticks: u32 = 0;

        move |result| {
            let Some(state) = state.upgrade() else {
                return TickOutcome::Stop;
            };
            let mut guard = lock(&state);
            let st = &mut *guard;
            let Some(job) = st.jobs.active_for(generation) else {
                metrics.inc_stale_responses();
                log::debug!("discarding status response for stale job {generation}");
                return TickOutcome::Stop;
            };
            ticks += 1;
            metrics.inc_poll_ticks();

            let mut outcome = match result {
                Err(e) => {
                    // 一時的な失敗は次のティックで再試行する
                    metrics.inc_transient_poll_errors();
                    log::warn!("job {generation}: status check failed, retrying: {e}");
                    TickOutcome::Continue
                }
                Ok(PollSignal::InProgress) => match job.poll_in_progress() {
                    Ok(_) => {
                        let percent = job.progress().percent();
                        send_event(&st.events, JobEvent::Progress { generation, percent });
                        TickOutcome::Continue
                    }
                    Err(e) => {
                        log::error!("job {generation}: {e}");
                        TickOutcome::Stop
                    }
                },
                Ok(PollSignal::Complete { download_url }) => {
                    match job.poll_complete(download_url) {
                        Ok(t) => {
                            log::info!("job {generation}: translation complete");
                            metrics.inc_jobs_completed();
                            send_transition(&st.events, t);
                        }
                        Err(e) => log::error!("job {generation}: {e}"),
                    }
                    TickOutcome::Stop
                }
                Ok(PollSignal::Failed { message }) => {
                    log::warn!("job {generation}: backend reported failure: {message}");
                    if let Ok(t) = job.fail(AppError::job_failed(message)) {
                        metrics.inc_jobs_failed();
                        send_transition(&st.events, t);
                    }
                    TickOutcome::Stop
                }
            };

            if outcome == TickOutcome::Continue {
                if let Some(limit) = max_ticks.filter(|limit| ticks >= *limit) {
                    log::warn!("job {generation}: no result after {limit} status checks");
                    let error = AppError::timeout(format!(
                        "Translation timed out after {limit} status checks"
                    ));
                    if let Ok(t) = job.fail(error) {
                        metrics.inc_jobs_failed();
                        send_transition(&st.events, t);
                    }
                    outcome = TickOutcome::Stop;
                }
            }

            if outcome == TickOutcome::Stop {
                record_total(&metrics, &mut st.started_at);
                // 自タスクのハンドル。ループはこの直後に抜ける
                st.poller.take();
            }
            outcome
        }
    }

    // ==================== Presentation ====================

    pub fn snapshot(&self) -> JobSnapshot {
        self.lock().jobs.active().snapshot()
    }

    pub fn status(&self) -> JobStatus {
        self.lock().jobs.active().status()
    }

    pub fn panes(&self) -> Vec<Pane> {
        let st = self.lock();
        build_panes(st.jobs.active(), st.settings.layout)
    }

    /// ローカルプレビュー参照を解決する
    pub fn resolve_preview(&self, reference: &str) -> Option<PreviewContent> {
        self.previews.resolve(reference)
    }

    /// 訳文を `dest_dir` に保存し、書き込んだパスを返す
    pub async fn download_translated(&self, dest_dir: &Path) -> Result<PathBuf, AppError> {
        let (source, filename) = {
            let st = self.lock();
            let job = st.jobs.active();
            let artifact = job
                .artifact()
                .ok_or_else(|| AppError::invalid_state("no translated document is available yet"))?;
            let filename = translated_filename(job)
                .ok_or_else(|| AppError::internal("translated filename unavailable"))?;
            let source = match artifact {
                TranslatedArtifact::Local { preview, .. } => ArtifactSource::Bytes(
                    preview
                        .bytes()
                        .ok_or_else(|| AppError::internal("preview already released"))?,
                ),
                TranslatedArtifact::Remote { download_url } => {
                    ArtifactSource::Url(download_url.clone())
                }
            };
            (source, filename)
        };

        let bytes = match source {
            ArtifactSource::Bytes(bytes) => bytes.to_vec(),
            ArtifactSource::Url(url) => self.backend.fetch_artifact(&url).await.map_err(|e| {
                log::warn!("download failed: {e}");
                AppError::transport(e.user_message())
            })?,
        };

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| AppError::storage(format!("failed to create output directory: {e}")))?;
        let path = dest_dir.join(filename);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| AppError::storage(format!("failed to save translated document: {e}")))?;
        log::info!("translated document saved: {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    // ==================== Metrics ====================

    pub fn metrics(&self) -> MetricsSummary {
        self.metrics.summary()
    }

    pub fn preview_stats(&self) -> PreviewStats {
        self.previews.stats()
    }
}

impl Drop for TranslationController {
    fn drop(&mut self) {
        lock(&self.state).stop_poller();
    }
}
