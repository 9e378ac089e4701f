use serde::Serialize;

/// 送信開始時
pub const PROGRESS_SUBMITTING: u8 = 10;
/// アップロードスロットへの転送完了時
pub const PROGRESS_UPLOADED: u8 = 30;
/// ジョブ受付（ポーリング開始）時
pub const PROGRESS_ACCEPTED: u8 = 50;
/// in-progress ティック毎の増分
pub const PROGRESS_STEP: u8 = 5;
/// 完了前の上限
pub const PROGRESS_CEILING: u8 = 95;
pub const PROGRESS_DONE: u8 = 100;

/// 進捗の推定値（0–100）
///
/// バックエンドは粗いステータスしか返さないので、クライアント側で単調増加の値を作る。
/// 減少はせず、`complete()` 以外で 100 に達することはない。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProgressEstimate(u8);

impl ProgressEstimate {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn percent(&self) -> u8 {
        self.0
    }

    pub fn is_done(&self) -> bool {
        self.0 == PROGRESS_DONE
    }

    /// 指定値まで引き上げる（上限でクランプ、下がることはない）
    pub fn advance_to(&mut self, value: u8) -> u8 {
        let target = value.min(PROGRESS_CEILING);
        if target > self.0 {
            self.0 = target;
        }
        self.0
    }

    /// 1ティック分進める
    pub fn tick(&mut self) -> u8 {
        let next = self.0.saturating_add(PROGRESS_STEP);
        self.advance_to(next)
    }

    pub fn complete(&mut self) -> u8 {
        self.0 = PROGRESS_DONE;
        self.0
    }
}
