use serde::{Deserialize, Serialize};

/// エラー本文を取り出せなかったときの汎用メッセージ
pub const GENERIC_NETWORK_ERROR: &str = "Network error. Please try again.";

/// `failed` に `error` が付いていなかったときのメッセージ
pub const GENERIC_JOB_FAILURE: &str = "Translation failed";

// ─── Wire types ──────────────────────────────────────────────────

/// `POST {endpoint}/presigned-url` リクエスト
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSlotRequest {
    pub filename: String,
    pub target_language: String,
    pub source_language: String,
}

/// アップロードスロット（署名付きPUT先）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSlot {
    pub upload_url: String,
    pub key: String,
    pub request_id: String,
}

/// `POST {endpoint}/upload` リクエスト（base64 埋め込み）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineUploadRequest {
    pub file: String,
    pub filename: String,
    pub target_language: String,
    pub source_language: String,
}

/// `POST {endpoint}/upload` レスポンス。同期完了かジョブIDのどちらか
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineUploadResponse {
    #[serde(default)]
    pub sync: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// `InlineUploadResponse` の解釈結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineReply {
    /// 翻訳済みの内容がそのまま返ってきた
    Delivered {
        translated_base64: String,
        filename: Option<String>,
    },
    /// ジョブIDのみ。ポーリングが必要
    Deferred { request_id: String },
}

impl InlineUploadResponse {
    pub fn into_reply(self) -> Result<InlineReply, BackendError> {
        match (self.sync, self.translated_base64, self.request_id) {
            (true, Some(translated_base64), _) => Ok(InlineReply::Delivered {
                translated_base64,
                filename: self.filename,
            }),
            (_, _, Some(request_id)) if !request_id.is_empty() => {
                Ok(InlineReply::Deferred { request_id })
            }
            _ => Err(BackendError::Malformed(
                "response has neither translated content nor request_id".to_string(),
            )),
        }
    }
}

/// `GET {endpoint}/status` レスポンス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// ポーリング1回分の判定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollSignal {
    InProgress,
    Complete { download_url: String },
    Failed { message: String },
}

impl StatusResponse {
    /// `pending` / `in_progress` / `processing` と未知の値は進行中として扱う。
    /// `complete` でも `download_url` がまだ無ければ進行中。
    pub fn signal(&self) -> PollSignal {
        match self.status.as_str() {
            "complete" => match &self.download_url {
                Some(url) if !url.is_empty() => PollSignal::Complete {
                    download_url: url.clone(),
                },
                _ => PollSignal::InProgress,
            },
            "failed" => PollSignal::Failed {
                message: self
                    .error
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| GENERIC_JOB_FAILURE.to_string()),
            },
            _ => PollSignal::InProgress,
        }
    }
}

/// 非2xx応答の本文
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    /// 本文から `error` を取り出す。JSONでなければ None
    pub fn extract(body: &str) -> Option<String> {
        serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.error)
            .filter(|m| !m.trim().is_empty())
    }
}

// ─── BackendError ────────────────────────────────────────────────

/// バックエンド通信エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timeout")]
    Timeout,
    #[error("HTTP error with status {status}: {}", .message.as_deref().unwrap_or("<no message>"))]
    Http { status: u16, message: Option<String> },
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl BackendError {
    /// ユーザー向けメッセージ。構造化された `error` があればそれ、無ければ汎用文言
    pub fn user_message(&self) -> String {
        match self {
            Self::Http {
                message: Some(message),
                ..
            } => message.clone(),
            _ => GENERIC_NETWORK_ERROR.to_string(),
        }
    }
}

// ─── TranslationBackend trait ────────────────────────────────────

/// 翻訳サービスのHTTP契約
///
/// `endpoint` は末尾スラッシュ無しのベースURL。
#[async_trait::async_trait]
pub trait TranslationBackend: Send + Sync {
    /// 署名付きアップロード先を要求する
    async fn request_upload_slot(
        &self,
        endpoint: &str,
        request: &UploadSlotRequest,
    ) -> Result<UploadSlot, BackendError>;

    /// アップロード先へ生バイトを PUT する
    async fn put_upload(
        &self,
        upload_url: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<(), BackendError>;

    /// base64 埋め込みで送信する
    async fn submit_inline(
        &self,
        endpoint: &str,
        request: &InlineUploadRequest,
    ) -> Result<InlineUploadResponse, BackendError>;

    /// ジョブ状態を1回問い合わせる
    async fn poll_status(
        &self,
        endpoint: &str,
        request_id: &str,
    ) -> Result<StatusResponse, BackendError>;

    /// 完了後の成果物を取得する
    async fn fetch_artifact(&self, url: &str) -> Result<Vec<u8>, BackendError>;

    fn name(&self) -> &str;
}

// ─── Tests ───────────────────────────────────────────────────────
