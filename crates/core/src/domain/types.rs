use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// ソース言語は常に自動判定
pub const SOURCE_LANGUAGE_AUTO: &str = "auto";

/// 送信可能なファイルサイズ上限（5 MiB）
pub const MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;

/// バックエンドが受け付ける拡張子
pub const SUPPORTED_EXTENSIONS: &[&str] = &["html", "htm", "txt", "pdf"];

/// 翻訳先言語
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetLanguage {
    #[default]
    Es,
    Fr,
    De,
    It,
    Pt,
    Ja,
    Ko,
    Zh,
    Ar,
    Hi,
    Ru,
    Nl,
}

impl TargetLanguage {
    pub const ALL: [TargetLanguage; 12] = [
        Self::Es,
        Self::Fr,
        Self::De,
        Self::It,
        Self::Pt,
        Self::Ja,
        Self::Ko,
        Self::Zh,
        Self::Ar,
        Self::Hi,
        Self::Ru,
        Self::Nl,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Es => "es",
            Self::Fr => "fr",
            Self::De => "de",
            Self::It => "it",
            Self::Pt => "pt",
            Self::Ja => "ja",
            Self::Ko => "ko",
            Self::Zh => "zh",
            Self::Ar => "ar",
            Self::Hi => "hi",
            Self::Ru => "ru",
            Self::Nl => "nl",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Es => "Spanish",
            Self::Fr => "French",
            Self::De => "German",
            Self::It => "Italian",
            Self::Pt => "Portuguese",
            Self::Ja => "Japanese",
            Self::Ko => "Korean",
            Self::Zh => "Chinese (Simplified)",
            Self::Ar => "Arabic",
            Self::Hi => "Hindi",
            Self::Ru => "Russian",
            Self::Nl => "Dutch",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|l| l.code() == code)
    }
}

impl std::fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// 送信方式（設定で決まり、ジョブ毎には選ばない）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// base64 で本文に埋め込んで `/upload` に送る
    #[default]
    Inline,
    /// `/presigned-url` でスロットを取得し、生バイトを PUT する
    UploadSlot,
}

/// 結果表示レイアウト
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PresentationLayout {
    /// 原文と訳文の2ペイン
    #[default]
    SideBySide,
    /// 1ペイン。完了時に訳文へ切り替える
    SwapOnComplete,
}

/// ユーザーが選択したファイル
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub name: String,
    pub bytes: Arc<[u8]>,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// ディスクから読み込む。ファイル名はパスの末尾を使う
    pub fn read_from(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        Ok(Self::new(name, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// 小文字化した拡張子（ドットなし）
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.name)
    }

    pub fn content_type(&self) -> &'static str {
        content_type_for(&self.name)
    }

    pub fn is_supported(&self) -> bool {
        self.extension()
            .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

/// 拡張子から Content-Type を推定する
pub fn content_type_for(filename: &str) -> &'static str {
    match extension_of(filename).as_deref() {
        Some("html") | Some("htm") => "text/html",
        Some("txt") => "text/plain",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}
