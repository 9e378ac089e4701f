use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

const PREVIEW_SCHEME: &str = "preview://";

/// ローカルプレビュー参照のレジストリ
///
/// 参照はプロセス内でのみ解決できる。確保した `PreviewRef` を drop すると
/// エントリが解放されるので、確保と解放は常に1対1になる。
#[derive(Clone, Default)]
pub struct PreviewRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<String, PreviewEntry>,
    allocated: u64,
    released: u64,
}

struct PreviewEntry {
    bytes: Arc<[u8]>,
    content_type: String,
}

/// 確保/解放カウンタ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PreviewStats {
    pub allocated: u64,
    pub released: u64,
    pub live: usize,
}

/// 解決済みプレビュー
#[derive(Debug, Clone)]
pub struct PreviewContent {
    pub bytes: Arc<[u8]>,
    pub content_type: String,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        lock_inner(&self.inner)
    }

    /// バイト列を登録し、所有権付きの参照を返す
    pub fn allocate(&self, bytes: Arc<[u8]>, content_type: impl Into<String>) -> PreviewRef {
        let url = format!("{PREVIEW_SCHEME}{}", uuid::Uuid::new_v4());
        let mut inner = self.lock();
        inner.entries.insert(
            url.clone(),
            PreviewEntry {
                bytes,
                content_type: content_type.into(),
            },
        );
        inner.allocated += 1;
        log::debug!("preview allocated: {url}");
        PreviewRef {
            url,
            registry: Arc::clone(&self.inner),
        }
    }

    /// 生存中の参照を解決する。解放済みなら None
    pub fn resolve(&self, url: &str) -> Option<PreviewContent> {
        self.lock().entries.get(url).map(|e| PreviewContent {
            bytes: Arc::clone(&e.bytes),
            content_type: e.content_type.clone(),
        })
    }

    pub fn stats(&self) -> PreviewStats {
        let inner = self.lock();
        PreviewStats {
            allocated: inner.allocated,
            released: inner.released,
            live: inner.entries.len(),
        }
    }
}

fn lock_inner(inner: &Mutex<RegistryInner>) -> MutexGuard<'_, RegistryInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 所有権付きプレビュー参照。drop 時に必ず解放される
pub struct PreviewRef {
    url: String,
    registry: Arc<Mutex<RegistryInner>>,
}

impl PreviewRef {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// 参照先のバイト列
    pub fn bytes(&self) -> Option<Arc<[u8]>> {
        lock_inner(&self.registry)
            .entries
            .get(&self.url)
            .map(|e| Arc::clone(&e.bytes))
    }

    /// 明示的に解放する（drop と同じ）
    pub fn release(self) {}
}

impl std::fmt::Debug for PreviewRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PreviewRef").field(&self.url).finish()
    }
}

impl Drop for PreviewRef {
    fn drop(&mut self) {
        let mut inner = lock_inner(&self.registry);
        if inner.entries.remove(&self.url).is_some() {
            inner.released += 1;
            log::debug!("preview released: {}", self.url);
        }
    }
}
