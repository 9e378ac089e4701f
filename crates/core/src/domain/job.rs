use serde::Serialize;

use super::error::AppError;
use super::preview::PreviewRef;
use super::progress::{ProgressEstimate, PROGRESS_ACCEPTED, PROGRESS_SUBMITTING, PROGRESS_UPLOADED};
use super::types::{LocalFile, TargetLanguage, SOURCE_LANGUAGE_AUTO};

/// ジョブ世代。新しいジョブ毎に単調増加する
pub type Generation = u64;

/// ジョブ状態（ペイロードなしの種別）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Submitting,
    DeliveredInline,
    AwaitingResult,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::DeliveredInline => "delivered_inline",
            Self::AwaitingResult => "awaiting_result",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// バックエンドとのやり取りが進行中か
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Submitting | Self::AwaitingResult)
    }
}

/// 翻訳結果への参照
#[derive(Debug)]
pub enum TranslatedArtifact {
    /// レスポンスに含まれていた内容をローカルでデコードしたもの
    Local { preview: PreviewRef, filename: String },
    /// バックエンドが発行したダウンロードURL
    Remote { download_url: String },
}

impl TranslatedArtifact {
    pub fn reference(&self) -> &str {
        match self {
            Self::Local { preview, .. } => preview.url(),
            Self::Remote { download_url } => download_url,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local { .. })
    }
}

/// ジョブ状態（状態毎のペイロード付き）
#[derive(Debug)]
pub enum JobState {
    Idle,
    Submitting,
    DeliveredInline { artifact: TranslatedArtifact },
    AwaitingResult { request_id: String, ticks: u32 },
    Complete { artifact: TranslatedArtifact },
    Failed { error: AppError },
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Idle => JobStatus::Idle,
            Self::Submitting => JobStatus::Submitting,
            Self::DeliveredInline { .. } => JobStatus::DeliveredInline,
            Self::AwaitingResult { .. } => JobStatus::AwaitingResult,
            Self::Complete { .. } => JobStatus::Complete,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// 選択されたファイルとそのプレビュー参照
#[derive(Debug)]
pub struct SourceDocument {
    pub file: LocalFile,
    pub preview: PreviewRef,
}

/// 翻訳ジョブ
///
/// `request_id` は一度だけ設定でき、以後は変更できない。
/// 進捗は単調増加で、100 になるのは `DeliveredInline` / `Complete` のときだけ。
#[derive(Debug)]
pub struct Job {
    generation: Generation,
    source: Option<SourceDocument>,
    target_language: TargetLanguage,
    request_id: Option<String>,
    progress: ProgressEstimate,
    state: JobState,
}

impl Job {
    pub fn new(
        generation: Generation,
        source: Option<SourceDocument>,
        target_language: TargetLanguage,
    ) -> Self {
        Self {
            generation,
            source,
            target_language,
            request_id: None,
            progress: ProgressEstimate::new(),
            state: JobState::Idle,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn source(&self) -> Option<&SourceDocument> {
        self.source.as_ref()
    }

    pub fn file(&self) -> Option<&LocalFile> {
        self.source.as_ref().map(|s| &s.file)
    }

    pub fn target_language(&self) -> TargetLanguage {
        self.target_language
    }

    pub fn source_language(&self) -> &'static str {
        SOURCE_LANGUAGE_AUTO
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn progress(&self) -> ProgressEstimate {
        self.progress
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn error(&self) -> Option<&AppError> {
        match &self.state {
            JobState::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn artifact(&self) -> Option<&TranslatedArtifact> {
        match &self.state {
            JobState::DeliveredInline { artifact } | JobState::Complete { artifact } => {
                Some(artifact)
            }
            _ => None,
        }
    }

    /// 翻訳先変更（送信前のみ）
    pub fn set_target_language(&mut self, target: TargetLanguage) -> Result<(), AppError> {
        match self.state {
            JobState::Idle => {
                self.target_language = target;
                Ok(())
            }
            _ => Err(AppError::invalid_state(format!(
                "cannot change target language while {}",
                self.status().as_str()
            ))),
        }
    }

    fn transition(&mut self, next: JobState) -> StateTransition {
        let prev_state = self.state.status();
        self.state = next;
        StateTransition {
            generation: self.generation,
            prev_state,
            new_state: self.state.status(),
            progress: self.progress.percent(),
        }
    }

    fn invalid(&self, op: &str) -> AppError {
        AppError::invalid_state(format!(
            "{op} is not allowed in {} state",
            self.status().as_str()
        ))
    }

    fn assign_request_id(&mut self, request_id: String) -> Result<(), AppError> {
        if let Some(existing) = &self.request_id {
            return Err(AppError::invalid_state(format!(
                "request id already assigned ({existing})"
            )));
        }
        self.request_id = Some(request_id);
        Ok(())
    }

    /// Idle→Submitting
    pub fn begin_submission(&mut self) -> Result<StateTransition, AppError> {
        match self.state {
            JobState::Idle => {
                self.progress.advance_to(PROGRESS_SUBMITTING);
                Ok(self.transition(JobState::Submitting))
            }
            _ => Err(self.invalid("begin_submission")),
        }
    }

    /// アップロードスロットへの転送完了（状態は Submitting のまま）
    pub fn mark_uploaded(&mut self) -> Result<u8, AppError> {
        match self.state {
            JobState::Submitting => Ok(self.progress.advance_to(PROGRESS_UPLOADED)),
            _ => Err(self.invalid("mark_uploaded")),
        }
    }

    /// Submitting→DeliveredInline（同期パス）
    pub fn deliver_inline(
        &mut self,
        preview: PreviewRef,
        filename: String,
    ) -> Result<StateTransition, AppError> {
        match self.state {
            JobState::Submitting => {
                self.progress.complete();
                Ok(self.transition(JobState::DeliveredInline {
                    artifact: TranslatedArtifact::Local { preview, filename },
                }))
            }
            _ => Err(self.invalid("deliver_inline")),
        }
    }

    /// DeliveredInline→Complete
    pub fn finish_inline(&mut self) -> Result<StateTransition, AppError> {
        match std::mem::replace(&mut self.state, JobState::Idle) {
            JobState::DeliveredInline { artifact } => {
                // 一時的に Idle を置いたので prev_state を明示的に作る
                self.state = JobState::Complete { artifact };
                Ok(StateTransition {
                    generation: self.generation,
                    prev_state: JobStatus::DeliveredInline,
                    new_state: JobStatus::Complete,
                    progress: self.progress.percent(),
                })
            }
            other => {
                self.state = other;
                Err(self.invalid("finish_inline"))
            }
        }
    }

    /// Submitting→AwaitingResult（非同期パス）
    pub fn await_result(&mut self, request_id: String) -> Result<StateTransition, AppError> {
        match self.state {
            JobState::Submitting => {
                self.assign_request_id(request_id.clone())?;
                self.progress.advance_to(PROGRESS_ACCEPTED);
                Ok(self.transition(JobState::AwaitingResult {
                    request_id,
                    ticks: 0,
                }))
            }
            _ => Err(self.invalid("await_result")),
        }
    }

    /// in-progress ティック。進捗を1段進め、ティック数を返す
    pub fn poll_in_progress(&mut self) -> Result<u32, AppError> {
        match &mut self.state {
            JobState::AwaitingResult { ticks, .. } => {
                *ticks += 1;
                let ticks = *ticks;
                self.progress.tick();
                Ok(ticks)
            }
            _ => Err(self.invalid("poll_in_progress")),
        }
    }

    /// AwaitingResult→Complete
    pub fn poll_complete(&mut self, download_url: String) -> Result<StateTransition, AppError> {
        match self.state {
            JobState::AwaitingResult { .. } => {
                self.progress.complete();
                Ok(self.transition(JobState::Complete {
                    artifact: TranslatedArtifact::Remote { download_url },
                }))
            }
            _ => Err(self.invalid("poll_complete")),
        }
    }

    /// Failed へ遷移（Idle のガード失敗、Submitting、AwaitingResult から）
    pub fn fail(&mut self, error: AppError) -> Result<StateTransition, AppError> {
        match self.state {
            JobState::Idle | JobState::Submitting | JobState::AwaitingResult { .. } => {
                Ok(self.transition(JobState::Failed { error }))
            }
            _ => Err(self.invalid("fail")),
        }
    }
}

/// UI向けのジョブ状態スナップショット
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub generation: Generation,
    pub filename: Option<String>,
    pub size: Option<u64>,
    pub source_preview: Option<String>,
    pub target_language: TargetLanguage,
    pub source_language: String,
    pub request_id: Option<String>,
    pub status: JobStatus,
    pub progress: u8,
    pub error: Option<AppError>,
    pub result_reference: Option<String>,
}

impl Job {
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            generation: self.generation,
            filename: self.file().map(|f| f.name.clone()),
            size: self.file().map(|f| f.size()),
            source_preview: self.source().map(|s| s.preview.url().to_string()),
            target_language: self.target_language,
            source_language: SOURCE_LANGUAGE_AUTO.to_string(),
            request_id: self.request_id.clone(),
            status: self.status(),
            progress: self.progress.percent(),
            error: self.error().cloned(),
            result_reference: self.artifact().map(|a| a.reference().to_string()),
        }
    }
}

/// ジョブマネージャー（単一アクティブジョブ）
pub struct JobManager {
    active: Job,
    last_generation: Generation,
}

impl JobManager {
    pub fn new(target_language: TargetLanguage) -> Self {
        Self {
            active: Job::new(1, None, target_language),
            last_generation: 1,
        }
    }

    pub fn active(&self) -> &Job {
        &self.active
    }

    pub fn active_mut(&mut self) -> &mut Job {
        &mut self.active
    }

    /// 世代が一致する場合のみ可変参照を返す（古い応答の破棄用）
    pub fn active_for(&mut self, generation: Generation) -> Option<&mut Job> {
        if self.active.generation == generation {
            Some(&mut self.active)
        } else {
            None
        }
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.active.generation == generation
    }

    fn replace(&mut self, source: Option<SourceDocument>, target: TargetLanguage) -> Job {
        self.last_generation += 1;
        let next = Job::new(self.last_generation, source, target);
        std::mem::replace(&mut self.active, next)
    }

    /// 新しいファイルでジョブを開始する。置き換えられたジョブを返す
    pub fn select(&mut self, source: SourceDocument, target: TargetLanguage) -> Job {
        self.replace(Some(source), target)
    }

    /// 全フィールドをクリアする。置き換えられたジョブを返す
    pub fn reset(&mut self) -> Job {
        let target = self.active.target_language;
        self.replace(None, target)
    }
}

/// 状態遷移イベントペイロード
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTransition {
    pub generation: Generation,
    pub prev_state: JobStatus,
    pub new_state: JobStatus,
    pub progress: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorCode;
    use crate::domain::preview::PreviewRegistry;
    use std::sync::Arc;

    fn source(registry: &PreviewRegistry) -> SourceDocument {
        let file = LocalFile::new("doc.txt", b"hello".to_vec());
        let preview = registry.allocate(Arc::clone(&file.bytes), file.content_type());
        SourceDocument { file, preview }
    }

    fn setup_manager(registry: &PreviewRegistry) -> JobManager {
        let mut mgr = JobManager::new(TargetLanguage::Es);
        mgr.select(source(registry), TargetLanguage::Fr);
        mgr
    }

    #[test]
    fn test_idle_to_submitting() {
        let registry = PreviewRegistry::new();
        let mut mgr = setup_manager(&registry);
        let t = mgr.active_mut().begin_submission().unwrap();
        assert_eq!(t.prev_state, JobStatus::Idle);
        assert_eq!(t.new_state, JobStatus::Submitting);
        assert_eq!(t.progress, PROGRESS_SUBMITTING);
    }

    #[test]
    fn test_inline_path_completes_at_100() {
        let registry = PreviewRegistry::new();
        let mut mgr = setup_manager(&registry);
        let job = mgr.active_mut();
        job.begin_submission().unwrap();
        let preview = registry.allocate(Arc::from(&b"Hola"[..]), "text/plain");
        let t = job.deliver_inline(preview, "doc.txt".to_string()).unwrap();
        assert_eq!(t.new_state, JobStatus::DeliveredInline);
        assert_eq!(t.progress, 100);

        let t = job.finish_inline().unwrap();
        assert_eq!(t.prev_state, JobStatus::DeliveredInline);
        assert_eq!(t.new_state, JobStatus::Complete);
        assert!(job.artifact().unwrap().is_local());
    }

    #[test]
    fn test_deferred_path_and_ticks() {
        let registry = PreviewRegistry::new();
        let mut mgr = setup_manager(&registry);
        let job = mgr.active_mut();
        job.begin_submission().unwrap();
        job.mark_uploaded().unwrap();
        let t = job.await_result("r1".to_string()).unwrap();
        assert_eq!(t.new_state, JobStatus::AwaitingResult);
        assert_eq!(t.progress, PROGRESS_ACCEPTED);
        assert_eq!(job.request_id(), Some("r1"));

        let mut last = job.progress().percent();
        for expected_ticks in 1..=3 {
            assert_eq!(job.poll_in_progress().unwrap(), expected_ticks);
            assert!(job.progress().percent() > last);
            last = job.progress().percent();
        }
        assert!(last < 100);

        let t = job.poll_complete("https://out/r1".to_string()).unwrap();
        assert_eq!(t.new_state, JobStatus::Complete);
        assert_eq!(t.progress, 100);
        assert_eq!(job.artifact().unwrap().reference(), "https://out/r1");
    }

    #[test]
    fn test_fail_from_idle_guard() {
        let mut mgr = JobManager::new(TargetLanguage::Es);
        let t = mgr
            .active_mut()
            .fail(AppError::validation("no file selected"))
            .unwrap();
        assert_eq!(t.new_state, JobStatus::Failed);
        assert_eq!(
            mgr.active().error().map(|e| e.code),
            Some(ErrorCode::Validation)
        );
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let registry = PreviewRegistry::new();
        let mut mgr = setup_manager(&registry);
        let job = mgr.active_mut();
        job.begin_submission().unwrap();
        job.fail(AppError::transport("boom")).unwrap();

        assert!(job.begin_submission().is_err());
        assert!(job.fail(AppError::transport("again")).is_err());
        assert!(job.poll_in_progress().is_err());
        assert!(job.finish_inline().is_err());
        assert_eq!(job.status(), JobStatus::Failed);
    }

    #[test]
    fn test_failure_keeps_progress() {
        let registry = PreviewRegistry::new();
        let mut mgr = setup_manager(&registry);
        let job = mgr.active_mut();
        job.begin_submission().unwrap();
        job.await_result("r1".to_string()).unwrap();
        job.poll_in_progress().unwrap();
        let before = job.progress();
        job.fail(AppError::job_failed("bad document")).unwrap();
        assert_eq!(job.progress(), before);
        assert!(!job.progress().is_done());
    }

    #[test]
    fn test_target_language_locked_after_submit() {
        let registry = PreviewRegistry::new();
        let mut mgr = setup_manager(&registry);
        let job = mgr.active_mut();
        job.set_target_language(TargetLanguage::De).unwrap();
        job.begin_submission().unwrap();
        assert!(job.set_target_language(TargetLanguage::Ja).is_err());
        assert_eq!(job.target_language(), TargetLanguage::De);
    }

    #[test]
    fn test_snapshot_reflects_job() {
        let registry = PreviewRegistry::new();
        let mut mgr = setup_manager(&registry);
        let job = mgr.active_mut();
        job.begin_submission().unwrap();
        job.await_result("r1".to_string()).unwrap();

        let snap = job.snapshot();
        assert_eq!(snap.filename.as_deref(), Some("doc.txt"));
        assert_eq!(snap.size, Some(5));
        assert_eq!(snap.target_language, TargetLanguage::Fr);
        assert_eq!(snap.source_language, "auto");
        assert_eq!(snap.request_id.as_deref(), Some("r1"));
        assert_eq!(snap.status, JobStatus::AwaitingResult);
        assert_eq!(snap.progress, PROGRESS_ACCEPTED);
        assert!(snap.source_preview.unwrap().starts_with("preview://"));
        assert!(snap.result_reference.is_none());
    }

    #[test]
    fn test_generation_check() {
        let registry = PreviewRegistry::new();
        let mut mgr = setup_manager(&registry);
        let old = mgr.active().generation();
        mgr.select(source(&registry), TargetLanguage::Es);

        assert!(mgr.active_for(old).is_none());
        assert!(!mgr.is_current(old));
        let current = mgr.active().generation();
        assert!(current > old);
        assert!(mgr.active_for(current).is_some());
    }

    #[test]
    fn test_replacement_releases_previews() {
        let registry = PreviewRegistry::new();
        let mut mgr = setup_manager(&registry);
        mgr.select(source(&registry), TargetLanguage::Es);
        mgr.reset();

        let stats = registry.stats();
        assert_eq!(stats.allocated, 2);
        assert_eq!(stats.released, 2);
        assert_eq!(stats.live, 0);
        assert_eq!(mgr.active().status(), JobStatus::Idle);
        assert!(mgr.active().file().is_none());
    }
}
