use std::path::Path;

use serde::Serialize;

use crate::domain::job::{Job, JobStatus, TranslatedArtifact};
use crate::domain::types::PresentationLayout;

/// 表示ペインの内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pane {
    /// ファイル未選択
    Empty,
    Original {
        reference: String,
        filename: String,
        content_type: String,
    },
    Translated {
        reference: String,
        filename: String,
        local: bool,
    },
    /// 訳文待ち（進捗表示用）
    Pending { status: JobStatus, progress: u8 },
}

/// 訳文のファイル名。同期パスはバックエンドの名前、それ以外は `<lang>.<原文名>`
pub fn translated_filename(job: &Job) -> Option<String> {
    let artifact = job.artifact()?;
    let name = match artifact {
        TranslatedArtifact::Local { filename, .. } => filename.clone(),
        TranslatedArtifact::Remote { .. } => {
            let original = job.file().map(|f| f.name.as_str()).unwrap_or("document");
            format!("{}.{}", job.target_language().code(), original)
        }
    };
    // バックエンド由来の名前にパス成分が含まれていても末尾だけ使う
    let safe = Path::new(&name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "translated".to_string());
    Some(safe)
}

fn original_pane(job: &Job) -> Pane {
    match job.source() {
        Some(source) => Pane::Original {
            reference: source.preview.url().to_string(),
            filename: source.file.name.clone(),
            content_type: source.file.content_type().to_string(),
        },
        None => Pane::Empty,
    }
}

fn translated_pane(job: &Job) -> Option<Pane> {
    let artifact = job.artifact()?;
    Some(Pane::Translated {
        reference: artifact.reference().to_string(),
        filename: translated_filename(job)?,
        local: artifact.is_local(),
    })
}

/// レイアウトに従ってペインを組み立てる
pub fn build_panes(job: &Job, layout: PresentationLayout) -> Vec<Pane> {
    match layout {
        PresentationLayout::SideBySide => {
            let right = translated_pane(job).unwrap_or(Pane::Pending {
                status: job.status(),
                progress: job.progress().percent(),
            });
            vec![original_pane(job), right]
        }
        PresentationLayout::SwapOnComplete => {
            vec![translated_pane(job).unwrap_or_else(|| original_pane(job))]
        }
    }
}
