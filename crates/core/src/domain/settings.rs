use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::{PresentationLayout, TargetLanguage, TransportMode};

/// コントローラー設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// 翻訳APIのベースURL。未設定はユーザーに見える失敗であってクラッシュではない
    pub endpoint: Option<String>,
    /// 送信方式
    pub transport: TransportMode,
    /// デフォルト翻訳先
    pub default_target_language: TargetLanguage,
    /// ポーリング間隔（ミリ秒）
    pub poll_interval_ms: u64,
    /// ポーリング上限回数（None=無制限）
    pub max_poll_ticks: Option<u32>,
    /// HTTPリクエストのタイムアウト（秒）
    pub request_timeout_secs: u64,
    /// 結果表示レイアウト
    pub layout: PresentationLayout,
}

impl ControllerSettings {
    /// 末尾スラッシュを除いたエンドポイント。空文字は未設定扱い
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint
            .as_deref()
            .map(|e| e.trim().trim_end_matches('/'))
            .filter(|e| !e.is_empty())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            transport: TransportMode::Inline,
            default_target_language: TargetLanguage::Es,
            poll_interval_ms: 3000,
            max_poll_ticks: None,
            request_timeout_secs: 30,
            layout: PresentationLayout::SideBySide,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_normalization() {
        let mut settings = ControllerSettings::default();
        assert_eq!(settings.endpoint(), None);

        settings.endpoint = Some("   ".to_string());
        assert_eq!(settings.endpoint(), None);

        settings.endpoint = Some("https://api.example.com/prod/".to_string());
        assert_eq!(settings.endpoint(), Some("https://api.example.com/prod"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: ControllerSettings =
            serde_json::from_str(r#"{"endpoint":"https://x","transport":"upload_slot"}"#).unwrap();
        assert_eq!(settings.transport, TransportMode::UploadSlot);
        assert_eq!(settings.poll_interval_ms, 3000);
        assert_eq!(settings.max_poll_ticks, None);
    }
}
