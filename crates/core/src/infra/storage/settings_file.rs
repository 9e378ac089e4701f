use std::path::{Path, PathBuf};

use crate::domain::error::AppError;
use crate::domain::settings::ControllerSettings;

/// エンドポイントを上書きする環境変数
pub const ENDPOINT_ENV: &str = "DT_API_ENDPOINT";
/// 設定ファイルのパスを上書きする環境変数
pub const SETTINGS_PATH_ENV: &str = "DT_SETTINGS_PATH";

/// JSON設定ファイル
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `DT_SETTINGS_PATH`、無ければ `<config dir>/docTranslate/settings.json`
    pub fn open_default() -> Self {
        let path = std::env::var(SETTINGS_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("docTranslate")
                    .join("settings.json")
            });
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// ファイルが無ければデフォルト設定を返す
    pub fn load(&self) -> Result<ControllerSettings, AppError> {
        if !self.path.exists() {
            log::debug!("settings file not found, using defaults: {}", self.path.display());
            return Ok(ControllerSettings::default());
        }

        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            AppError::storage(format!("failed to read settings {}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            AppError::storage(format!("invalid settings file {}: {e}", self.path.display()))
        })
    }

    pub fn save(&self, settings: &ControllerSettings) -> Result<(), AppError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| {
                AppError::storage(format!("failed to create settings directory: {e}"))
            })?;
        }
        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| AppError::internal(format!("settings serialize: {e}")))?;
        std::fs::write(&self.path, json).map_err(|e| {
            AppError::storage(format!("failed to save settings {}: {e}", self.path.display()))
        })?;
        log::info!("settings saved: {}", self.path.display());
        Ok(())
    }
}

/// 空でない値があればエンドポイントを上書きする
pub fn apply_endpoint_override(settings: &mut ControllerSettings, value: Option<String>) {
    if let Some(endpoint) = value.filter(|v| !v.trim().is_empty()) {
        settings.endpoint = Some(endpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::TransportMode;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join("none.json"));
        assert_eq!(store.load().unwrap(), ControllerSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join("nested").join("settings.json"));

        let settings = ControllerSettings {
            endpoint: Some("https://api.example.com/prod".to_string()),
            transport: TransportMode::UploadSlot,
            max_poll_ticks: Some(200),
            ..Default::default()
        };
        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap(), settings);
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = SettingsStore::open(path).load().unwrap_err();
        assert_eq!(err.code, crate::domain::error::ErrorCode::Storage);
        assert!(err.message.starts_with("invalid settings file"), "{}", err.message);
    }

    #[test]
    fn test_unwritable_directory_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let store = SettingsStore::open(blocker.join("settings.json"));
        let err = store.save(&ControllerSettings::default()).unwrap_err();
        assert_eq!(err.code, crate::domain::error::ErrorCode::Storage);
        assert!(
            err.message.starts_with("failed to create settings directory"),
            "{}",
            err.message
        );
    }

    #[test]
    fn test_endpoint_override() {
        let mut settings = ControllerSettings::default();
        apply_endpoint_override(&mut settings, Some("  ".to_string()));
        assert_eq!(settings.endpoint, None);
        apply_endpoint_override(&mut settings, Some("https://x".to_string()));
        assert_eq!(settings.endpoint(), Some("https://x"));
        apply_endpoint_override(&mut settings, None);
        assert_eq!(settings.endpoint(), Some("https://x"));
    }
}
