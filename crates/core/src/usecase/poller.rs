use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::domain::backend::{BackendError, PollSignal, TranslationBackend};
use crate::domain::job::Generation;

/// ティック処理の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Stop,
}

/// ポーリングタスクのハンドル
///
/// `stop()` か drop で即座にキャンセルされる。
pub struct PollHandle {
    generation: Generation,
    cancel_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl PollHandle {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn stop(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        // キャンセルシグナルを送信
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
        // タスクをabort
        self.handle.abort();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// ポーリング設定
#[derive(Debug, Clone)]
pub struct PollPlan {
    pub generation: Generation,
    pub endpoint: String,
    pub request_id: String,
    pub interval: Duration,
}

/// 一定間隔でステータスを問い合わせるタスクを起動する
///
/// 問い合わせは常に1件ずつで、前の応答を `on_tick` が処理し終えるまで次は送らない。
/// `on_tick` が `Stop` を返すとループを抜ける。
pub fn spawn_poller<F>(
    backend: Arc<dyn TranslationBackend>,
    plan: PollPlan,
    mut on_tick: F,
) -> PollHandle
where
    F: FnMut(Result<PollSignal, BackendError>) -> TickOutcome + Send + 'static,
{
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
    let generation = plan.generation;

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + plan.interval, plan.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::debug!(
            "poller started: generation={} request_id={} interval={:?}",
            plan.generation,
            plan.request_id,
            plan.interval
        );

        loop {
            tokio::select! {
                _ = &mut cancel_rx => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                _ = &mut cancel_rx => break,
                r = backend.poll_status(&plan.endpoint, &plan.request_id) => r,
            };

            if on_tick(result.map(|s| s.signal())) == TickOutcome::Stop {
                break;
            }
        }

        log::debug!("poller finished: generation={}", plan.generation);
    });

    PollHandle {
        generation,
        cancel_tx: Some(cancel_tx),
        handle,
    }
}
