//! テスト用のスクリプト式バックエンド。呼び出しを記録し、キューに積まれた応答を順に返す。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::domain::backend::{
    BackendError, InlineUploadRequest, InlineUploadResponse, StatusResponse, TranslationBackend,
    UploadSlot, UploadSlotRequest,
};

#[derive(Debug, Clone)]
pub enum BackendCall {
    RequestUploadSlot {
        endpoint: String,
        request: UploadSlotRequest,
    },
    PutUpload {
        upload_url: String,
        content_type: String,
        bytes: Vec<u8>,
    },
    SubmitInline {
        endpoint: String,
        request: InlineUploadRequest,
    },
    PollStatus {
        endpoint: String,
        request_id: String,
    },
    FetchArtifact {
        url: String,
    },
}

#[derive(Default)]
struct Script {
    slots: VecDeque<Result<UploadSlot, BackendError>>,
    puts: VecDeque<Result<(), BackendError>>,
    inline: VecDeque<Result<InlineUploadResponse, BackendError>>,
    polls: VecDeque<Result<StatusResponse, BackendError>>,
    artifacts: VecDeque<Result<Vec<u8>, BackendError>>,
    calls: Vec<BackendCall>,
}

#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
    submit_gate: Mutex<Option<Arc<Notify>>>,
    poll_gate: Mutex<Option<Arc<Notify>>>,
}

pub fn status(value: &str) -> StatusResponse {
    StatusResponse {
        status: value.to_string(),
        download_url: None,
        error: None,
        request_id: None,
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_slot(&self, r: Result<UploadSlot, BackendError>) {
        self.script.lock().unwrap().slots.push_back(r);
    }

    pub fn push_put(&self, r: Result<(), BackendError>) {
        self.script.lock().unwrap().puts.push_back(r);
    }

    pub fn push_inline(&self, r: Result<InlineUploadResponse, BackendError>) {
        self.script.lock().unwrap().inline.push_back(r);
    }

    pub fn push_poll(&self, r: Result<StatusResponse, BackendError>) {
        self.script.lock().unwrap().polls.push_back(r);
    }

    pub fn push_artifact(&self, r: Result<Vec<u8>, BackendError>) {
        self.script.lock().unwrap().artifacts.push_back(r);
    }

    /// 以後の submit/slot 要求は `notify_one()` されるまで応答しない
    pub fn gate_submissions(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.submit_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// 以後の poll 要求は `notify_one()` されるまで応答しない
    pub fn gate_polls(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.poll_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.script.lock().unwrap().calls.len()
    }

    pub fn poll_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, BackendCall::PollStatus { .. }))
            .count()
    }

    fn record(&self, call: BackendCall) {
        self.script.lock().unwrap().calls.push(call);
    }

    async fn wait(gate: &Mutex<Option<Arc<Notify>>>) {
        let gate = gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

fn exhausted<T>(what: &str) -> Result<T, BackendError> {
    Err(BackendError::Network(format!("script exhausted: {what}")))
}

#[async_trait]
impl TranslationBackend for ScriptedBackend {
    async fn request_upload_slot(
        &self,
        endpoint: &str,
        request: &UploadSlotRequest,
    ) -> Result<UploadSlot, BackendError> {
        self.record(BackendCall::RequestUploadSlot {
            endpoint: endpoint.to_string(),
            request: request.clone(),
        });
        Self::wait(&self.submit_gate).await;
        let next = self.script.lock().unwrap().slots.pop_front();
        next.unwrap_or_else(|| exhausted("upload slot"))
    }

    async fn put_upload(
        &self,
        upload_url: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<(), BackendError> {
        self.record(BackendCall::PutUpload {
            upload_url: upload_url.to_string(),
            content_type: content_type.to_string(),
            bytes: bytes.to_vec(),
        });
        let next = self.script.lock().unwrap().puts.pop_front();
        next.unwrap_or_else(|| exhausted("put"))
    }

    async fn submit_inline(
        &self,
        endpoint: &str,
        request: &InlineUploadRequest,
    ) -> Result<InlineUploadResponse, BackendError> {
        self.record(BackendCall::SubmitInline {
            endpoint: endpoint.to_string(),
            request: request.clone(),
        });
        Self::wait(&self.submit_gate).await;
        let next = self.script.lock().unwrap().inline.pop_front();
        next.unwrap_or_else(|| exhausted("inline"))
    }

    async fn poll_status(
        &self,
        endpoint: &str,
        request_id: &str,
    ) -> Result<StatusResponse, BackendError> {
        self.record(BackendCall::PollStatus {
            endpoint: endpoint.to_string(),
            request_id: request_id.to_string(),
        });
        Self::wait(&self.poll_gate).await;
        // スクリプトが尽きたら進行中を返し続ける
        let next = self.script.lock().unwrap().polls.pop_front();
        next.unwrap_or_else(|| Ok(status("in_progress")))
    }

    async fn fetch_artifact(&self, url: &str) -> Result<Vec<u8>, BackendError> {
        self.record(BackendCall::FetchArtifact {
            url: url.to_string(),
        });
        let next = self.script.lock().unwrap().artifacts.pop_front();
        next.unwrap_or_else(|| exhausted("artifact"))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
