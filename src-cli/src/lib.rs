mod commands;
mod events;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};

use dt_core::domain::types::TargetLanguage;

use crate::commands::{parse_language, CommandError, TransportArg, TranslateArgs};
use crate::events::OutputFormat;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
/// Translate documents through the remote translation service
struct Args {
    /// Command to execute
    #[command(subcommand)]
    command: Command,

    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    settings: Option<PathBuf>,

    /// Print events as JSON lines
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    json: bool,

    /// Debug logging for this tool
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a document and follow the job until it finishes
    Translate {
        /// Document to translate (.html, .htm, .txt, .pdf)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Target language code
        #[arg(long, value_name = "LANG", value_parser = parse_language)]
        to: Option<TargetLanguage>,

        /// Translation API endpoint for this run
        #[arg(long, value_name = "URL")]
        endpoint: Option<String>,

        /// How the document is sent
        #[arg(long, value_enum)]
        transport: Option<TransportArg>,

        /// Save the translated document into this directory
        #[arg(long, value_name = "DIR")]
        download: Option<PathBuf>,
    },
    /// List supported target languages
    Languages,
    /// Show or change saved settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the saved settings
    Show,
    /// Set the translation API endpoint (omit URL to clear)
    SetEndpoint {
        #[arg(value_name = "URL")]
        url: Option<String>,
    },
    /// Set how documents are sent
    SetTransport {
        #[arg(value_enum)]
        transport: TransportArg,
    },
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder
            .filter_module("dt_core", log::LevelFilter::Debug)
            .filter_module("doc_translate", log::LevelFilter::Debug);
    }
    builder.init();
}

async fn dispatch(args: Args) -> Result<(), CommandError> {
    let store = commands::open_store(args.settings.as_deref());
    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match args.command {
        Command::Translate {
            file,
            to,
            endpoint,
            transport,
            download,
        } => {
            commands::translate(
                &store,
                TranslateArgs {
                    file,
                    to,
                    endpoint,
                    transport,
                    download,
                    format,
                },
            )
            .await
        }
        Command::Languages => commands::languages(&store),
        Command::Config { action } => match action {
            ConfigAction::Show => commands::config_show(&store),
            ConfigAction::SetEndpoint { url } => commands::config_set_endpoint(&store, url),
            ConfigAction::SetTransport { transport } => {
                commands::config_set_transport(&store, transport)
            }
        },
    }
}

pub fn run() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(dispatch(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::debug!("command failed: {e:?}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
