use serde::Serialize;

/// アプリケーション共通エラーコード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    /// エンドポイント未設定
    #[serde(rename = "E_CONFIG")]
    Config,
    /// ファイル未選択 / サイズ超過
    #[serde(rename = "E_VALIDATION")]
    Validation,
    /// 通信失敗・非2xx・不正なレスポンス
    #[serde(rename = "E_TRANSPORT")]
    Transport,
    /// バックエンドが報告したジョブ失敗
    #[serde(rename = "E_JOB_FAILED")]
    JobFailed,
    #[serde(rename = "E_TIMEOUT")]
    Timeout,
    #[serde(rename = "E_INVALID_STATE")]
    InvalidState,
    #[serde(rename = "E_INTERNAL")]
    Internal,
    #[serde(rename = "E_STORAGE")]
    Storage,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "E_CONFIG",
            Self::Validation => "E_VALIDATION",
            Self::Transport => "E_TRANSPORT",
            Self::JobFailed => "E_JOB_FAILED",
            Self::Timeout => "E_TIMEOUT",
            Self::InvalidState => "E_INVALID_STATE",
            Self::Internal => "E_INTERNAL",
            Self::Storage => "E_STORAGE",
        }
    }
}

/// アプリケーションエラー（イベントペイロード兼用）
///
/// どのエラーも現在のジョブに閉じており、新しいジョブを開始すれば回復できる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub recoverable: bool,
}

impl AppError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Config,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Validation,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Transport,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::JobFailed,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Timeout,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidState,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Internal,
            message: msg.into(),
            recoverable: false,
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Storage,
            message: msg.into(),
            recoverable: false,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {}
