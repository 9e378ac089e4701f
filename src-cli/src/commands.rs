use std::future::Future;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use tokio::sync::mpsc::UnboundedReceiver;

use dt_core::domain::error::AppError;
use dt_core::domain::job::{JobSnapshot, JobStatus};
use dt_core::domain::settings::ControllerSettings;
use dt_core::domain::types::{LocalFile, TargetLanguage, TransportMode, SUPPORTED_EXTENSIONS};
use dt_core::infra::storage::{apply_endpoint_override, SettingsStore, ENDPOINT_ENV};
use dt_core::usecase::controller::{JobEvent, TranslationController};

use crate::events::{self, OutputFormat};

/// コマンドエラー型
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    App(#[from] AppError),
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cancelled")]
    Cancelled,
}

pub type CmdResult<T> = Result<T, CommandError>;

/// `--transport` の値
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    Inline,
    UploadSlot,
}

impl From<TransportArg> for TransportMode {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Inline => TransportMode::Inline,
            TransportArg::UploadSlot => TransportMode::UploadSlot,
        }
    }
}

/// clap の value_parser 用
pub fn parse_language(code: &str) -> Result<TargetLanguage, String> {
    TargetLanguage::from_code(code).ok_or_else(|| {
        let codes: Vec<&str> = TargetLanguage::ALL.iter().map(|l| l.code()).collect();
        format!("unsupported language '{code}' (expected one of: {})", codes.join(", "))
    })
}

#[derive(Debug, Clone)]
pub struct TranslateArgs {
    pub file: PathBuf,
    pub to: Option<TargetLanguage>,
    pub endpoint: Option<String>,
    pub transport: Option<TransportArg>,
    pub download: Option<PathBuf>,
    pub format: OutputFormat,
}

/// 保存済み設定に環境変数とコマンドライン引数を重ねる
fn effective_settings(store: &SettingsStore, args: &TranslateArgs) -> CmdResult<ControllerSettings> {
    let mut settings = store.load()?;
    apply_endpoint_override(&mut settings, std::env::var(ENDPOINT_ENV).ok());
    apply_endpoint_override(&mut settings, args.endpoint.clone());
    if let Some(transport) = args.transport {
        settings.transport = transport.into();
    }
    if let Some(target) = args.to {
        settings.default_target_language = target;
    }
    Ok(settings)
}

// --- Commands ---

pub async fn translate(store: &SettingsStore, args: TranslateArgs) -> CmdResult<()> {
    let settings = effective_settings(store, &args)?;
    let file = LocalFile::read_from(&args.file).map_err(|source| CommandError::Read {
        path: args.file.clone(),
        source,
    })?;
    if !file.is_supported() {
        log::warn!(
            "{} is not one of {:?}; submitting anyway",
            file.name,
            SUPPORTED_EXTENSIONS
        );
    }

    let controller = TranslationController::with_http_backend(settings)?;
    let mut rx = controller.subscribe();
    controller.select_file(file);

    run_job(&controller, &mut rx, args.format, ctrl_c()).await?;

    let snapshot = controller.snapshot();
    print_result(&snapshot, args.format);
    match snapshot.status {
        JobStatus::Complete => {
            if let Some(dir) = &args.download {
                let path = controller.download_translated(dir).await?;
                println!("saved: {}", path.display());
            }
            Ok(())
        }
        _ => Err(snapshot
            .error
            .unwrap_or_else(|| AppError::internal("translation did not finish"))
            .into()),
    }
}

/// 送信から終了状態までジョブを進める。`interrupt` が先に完了したらジョブを破棄する
async fn run_job(
    controller: &TranslationController,
    rx: &mut UnboundedReceiver<JobEvent>,
    format: OutputFormat,
    interrupt: impl Future<Output = ()>,
) -> CmdResult<()> {
    tokio::pin!(interrupt);
    until_interrupted(
        controller,
        async { controller.translate().await.map_err(CommandError::from) },
        interrupt.as_mut(),
    )
    .await?;
    until_interrupted(
        controller,
        follow_if_in_flight(controller, rx, format),
        interrupt.as_mut(),
    )
    .await
}

async fn until_interrupted<T>(
    controller: &TranslationController,
    work: impl Future<Output = CmdResult<T>>,
    interrupt: impl Future<Output = ()>,
) -> CmdResult<T> {
    tokio::select! {
        result = work => result,
        () = interrupt => {
            log::info!("interrupted, discarding job");
            controller.reset();
            Err(CommandError::Cancelled)
        }
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Ctrl-C ハンドラ登録失敗: {e}");
        std::future::pending::<()>().await;
    }
}

/// 受信済みイベントを出力し、まだ実行中なら終了状態まで追いかける。
/// 判定は drain 後の現在状態で行う（終了イベントを drain で読み切っている場合がある）
async fn follow_if_in_flight(
    controller: &TranslationController,
    rx: &mut UnboundedReceiver<JobEvent>,
    format: OutputFormat,
) -> CmdResult<()> {
    events::drain(rx, format);
    if !controller.status().is_in_flight() {
        events::drain(rx, format);
        return Ok(());
    }
    while let Some(event) = rx.recv().await {
        events::print_event(&event, format);
        if let JobEvent::StateChanged(t) = &event {
            if t.new_state.is_terminal() {
                break;
            }
        }
    }
    Ok(())
}

fn print_result(snapshot: &JobSnapshot, format: OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_string(snapshot) {
            Ok(json) => println!("{json}"),
            Err(e) => log::error!("結果出力失敗: {e}"),
        },
        OutputFormat::Text => {
            if let Some(reference) = &snapshot.result_reference {
                println!("translated ({}): {reference}", snapshot.target_language);
            }
        }
    }
}

pub fn languages(store: &SettingsStore) -> CmdResult<()> {
    let default = store.load()?.default_target_language;
    for lang in TargetLanguage::ALL {
        let marker = if lang == default { " (default)" } else { "" };
        println!("{:<4}{}{marker}", lang.code(), lang.display_name());
    }
    Ok(())
}

pub fn config_show(store: &SettingsStore) -> CmdResult<()> {
    let settings = store.load()?;
    let json = serde_json::to_string_pretty(&settings)
        .map_err(|e| AppError::internal(format!("failed to serialize settings: {e}")))?;
    println!("# {}", store.path().display());
    println!("{json}");
    Ok(())
}

pub fn config_set_endpoint(store: &SettingsStore, url: Option<String>) -> CmdResult<()> {
    let mut settings = store.load()?;
    settings.endpoint = url.filter(|u| !u.trim().is_empty());
    store.save(&settings)?;
    match settings.endpoint() {
        Some(endpoint) => println!("endpoint: {endpoint}"),
        None => println!("endpoint cleared"),
    }
    Ok(())
}

pub fn config_set_transport(store: &SettingsStore, transport: TransportArg) -> CmdResult<()> {
    let mut settings = store.load()?;
    settings.transport = transport.into();
    store.save(&settings)?;
    println!("transport: {:?}", settings.transport);
    Ok(())
}

pub fn open_store(path: Option<&Path>) -> SettingsStore {
    match path {
        Some(path) => SettingsStore::open(path),
        None => SettingsStore::open_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use dt_core::domain::error::ErrorCode;

    fn controller_for(endpoint: Option<String>) -> TranslationController {
        TranslationController::with_http_backend(ControllerSettings {
            endpoint,
            request_timeout_secs: 5,
            ..Default::default()
        })
        .unwrap()
    }

    fn args(file: PathBuf) -> TranslateArgs {
        TranslateArgs {
            file,
            to: None,
            endpoint: None,
            transport: None,
            download: None,
            format: OutputFormat::Text,
        }
    }

    #[test]
    fn test_parse_language() {
        assert_eq!(parse_language("ja"), Ok(TargetLanguage::Ja));
        let err = parse_language("xx").unwrap_err();
        assert!(err.contains("es, fr, de"));
    }

    #[test]
    fn test_flags_override_saved_settings() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join("settings.json"));
        store
            .save(&ControllerSettings {
                endpoint: Some("https://saved.example.com".into()),
                ..Default::default()
            })
            .unwrap();

        let mut a = args(dir.path().join("doc.txt"));
        a.endpoint = Some("https://flag.example.com".into());
        a.transport = Some(TransportArg::UploadSlot);
        a.to = Some(TargetLanguage::De);
        let settings = effective_settings(&store, &a).unwrap();

        assert_eq!(settings.endpoint(), Some("https://flag.example.com"));
        assert_eq!(settings.transport, TransportMode::UploadSlot);
        assert_eq!(settings.default_target_language, TargetLanguage::De);
    }

    #[test]
    fn test_set_endpoint_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join("nested/settings.json"));

        config_set_endpoint(&store, Some("https://api.example.com/".into())).unwrap();
        assert_eq!(
            store.load().unwrap().endpoint(),
            Some("https://api.example.com")
        );

        config_set_endpoint(&store, Some("  ".into())).unwrap();
        assert!(store.load().unwrap().endpoint.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join("settings.json"));
        let err = translate(&store, args(dir.path().join("missing.txt")))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Read { .. }));
    }

    #[tokio::test]
    async fn test_unconfigured_endpoint_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join("settings.json"));
        let file = dir.path().join("doc.txt");
        std::fs::write(&file, "hello").unwrap();

        if std::env::var(ENDPOINT_ENV).is_ok() {
            return;
        }
        let err = translate(&store, args(file)).await.unwrap_err();
        match err {
            CommandError::App(e) => assert_eq!(e.code, ErrorCode::Config),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_finished_job_is_not_followed() {
        let controller = controller_for(None);
        let mut rx = controller.subscribe();
        controller.select_file(LocalFile::new("doc.txt", b"hello".to_vec()));
        controller.translate().await.unwrap();
        // 終了イベントは読み切られている
        while rx.try_recv().is_ok() {}

        tokio::time::timeout(
            Duration::from_secs(1),
            follow_if_in_flight(&controller, &mut rx, OutputFormat::Text),
        )
        .await
        .expect("finished job must not be followed")
        .unwrap();
        assert_eq!(controller.status(), JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_interrupt_during_submission_discards_job() {
        // 接続は受け付けるが応答しない
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let controller = controller_for(Some(format!("http://{}", listener.local_addr().unwrap())));
        let mut rx = controller.subscribe();
        controller.select_file(LocalFile::new("doc.txt", b"hello".to_vec()));

        let err = run_job(
            &controller,
            &mut rx,
            OutputFormat::Text,
            tokio::time::sleep(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CommandError::Cancelled));
        assert_eq!(controller.status(), JobStatus::Idle);
        drop(listener);
    }

    #[tokio::test]
    async fn test_uninterrupted_job_reaches_terminal_state() {
        let controller = controller_for(None);
        let mut rx = controller.subscribe();
        controller.select_file(LocalFile::new("doc.txt", b"hello".to_vec()));

        run_job(
            &controller,
            &mut rx,
            OutputFormat::Text,
            std::future::pending::<()>(),
        )
        .await
        .unwrap();
        assert_eq!(controller.status(), JobStatus::Failed);
    }
}
