use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;

use dt_core::usecase::controller::JobEvent;

/// 標準出力の形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// JSON 出力1行分
#[derive(Debug, Clone, Serialize)]
pub struct EventLine<'a> {
    pub timestamp: String,
    #[serde(flatten)]
    pub event: &'a JobEvent,
}

pub fn render_text(event: &JobEvent) -> String {
    match event {
        JobEvent::StateChanged(t) => format!(
            "job {}: {} -> {} ({}%)",
            t.generation,
            t.prev_state.as_str(),
            t.new_state.as_str(),
            t.progress
        ),
        JobEvent::Progress {
            generation,
            percent,
        } => format!("job {generation}: {percent}%"),
    }
}

/// 統一イベント出力関数
pub fn print_event(event: &JobEvent, format: OutputFormat) {
    match format {
        OutputFormat::Text => {
            println!(
                "[{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                render_text(event)
            );
        }
        OutputFormat::Json => {
            let line = EventLine {
                timestamp: chrono::Utc::now().to_rfc3339(),
                event,
            };
            match serde_json::to_string(&line) {
                Ok(json) => println!("{json}"),
                Err(e) => log::error!("イベント出力失敗: {e}"),
            }
        }
    }
}

/// 受信済みのイベントをすべて出力する
pub fn drain(rx: &mut UnboundedReceiver<JobEvent>, format: OutputFormat) {
    while let Ok(event) = rx.try_recv() {
        print_event(&event, format);
    }
}
