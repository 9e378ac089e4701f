mod settings_file;

pub use settings_file::{apply_endpoint_override, SettingsStore, ENDPOINT_ENV, SETTINGS_PATH_ENV};
