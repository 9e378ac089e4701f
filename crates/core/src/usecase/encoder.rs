use std::sync::Arc;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::domain::backend::{
    BackendError, InlineReply, InlineUploadRequest, TranslationBackend, UploadSlotRequest,
};
use crate::domain::types::{LocalFile, TargetLanguage, TransportMode, SOURCE_LANGUAGE_AUTO};
use crate::infra::metrics::Metrics;

/// 送信結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// 同期パス。デコード済みの翻訳結果
    Delivered { bytes: Vec<u8>, filename: String },
    /// 非同期パス。ポーリング用のID
    Deferred { request_id: String },
}

/// ファイルを転送可能な形にしてバックエンドへ送る
pub struct SubmissionEncoder {
    backend: Arc<dyn TranslationBackend>,
    mode: TransportMode,
    metrics: Arc<Metrics>,
}

impl SubmissionEncoder {
    pub fn new(
        backend: Arc<dyn TranslationBackend>,
        mode: TransportMode,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            backend,
            mode,
            metrics,
        }
    }

    /// `on_uploaded` はアップロードスロットへの転送が成功した時点で一度だけ呼ばれる
    pub async fn submit<F>(
        &self,
        endpoint: &str,
        file: &LocalFile,
        target: TargetLanguage,
        on_uploaded: F,
    ) -> Result<SubmitOutcome, BackendError>
    where
        F: FnOnce() + Send,
    {
        log::info!(
            "submitting {} ({} bytes) via {:?} to {} [{}]",
            file.name,
            file.size(),
            self.mode,
            target,
            self.backend.name()
        );
        match self.mode {
            TransportMode::Inline => self.submit_inline(endpoint, file, target).await,
            TransportMode::UploadSlot => {
                self.submit_upload_slot(endpoint, file, target, on_uploaded)
                    .await
            }
        }
    }

    async fn submit_inline(
        &self,
        endpoint: &str,
        file: &LocalFile,
        target: TargetLanguage,
    ) -> Result<SubmitOutcome, BackendError> {
        let start = Instant::now();
        let request = InlineUploadRequest {
            file: STANDARD.encode(&file.bytes),
            filename: file.name.clone(),
            target_language: target.code().to_string(),
            source_language: SOURCE_LANGUAGE_AUTO.to_string(),
        };

        let response = self.backend.submit_inline(endpoint, &request).await?;
        self.metrics
            .record_latency("submit", start.elapsed().as_millis() as u64);

        match response.into_reply()? {
            InlineReply::Delivered {
                translated_base64,
                filename,
            } => {
                let bytes = STANDARD.decode(translated_base64.trim()).map_err(|e| {
                    BackendError::Malformed(format!("translated_base64 is not valid base64: {e}"))
                })?;
                Ok(SubmitOutcome::Delivered {
                    bytes,
                    filename: filename
                        .filter(|f| !f.is_empty())
                        .unwrap_or_else(|| file.name.clone()),
                })
            }
            InlineReply::Deferred { request_id } => Ok(SubmitOutcome::Deferred { request_id }),
        }
    }

    async fn submit_upload_slot<F>(
        &self,
        endpoint: &str,
        file: &LocalFile,
        target: TargetLanguage,
        on_uploaded: F,
    ) -> Result<SubmitOutcome, BackendError>
    where
        F: FnOnce() + Send,
    {
        let start = Instant::now();
        let request = UploadSlotRequest {
            filename: file.name.clone(),
            target_language: target.code().to_string(),
            source_language: SOURCE_LANGUAGE_AUTO.to_string(),
        };
        let slot = self.backend.request_upload_slot(endpoint, &request).await?;
        self.metrics
            .record_latency("submit", start.elapsed().as_millis() as u64);
        if slot.request_id.is_empty() {
            return Err(BackendError::Malformed(
                "upload slot has an empty request_id".to_string(),
            ));
        }
        log::debug!("upload slot acquired: key={} request_id={}", slot.key, slot.request_id);

        let start = Instant::now();
        self.backend
            .put_upload(&slot.upload_url, file.content_type(), &file.bytes)
            .await?;
        self.metrics
            .record_latency("upload", start.elapsed().as_millis() as u64);
        on_uploaded();

        Ok(SubmitOutcome::Deferred {
            request_id: slot.request_id,
        })
    }
}
