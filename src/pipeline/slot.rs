use parking_lot::Mutex;
use std::sync::Arc;

struct SlotInner<T> {
    value: Option<T>,
    published: u64,
    overwritten: u64,
}

/// 最新値だけを保持する1要素の共有バッファ
///
/// 書き込みは前の値を置き換える（キューしない）。読み手は常に
/// 完全な値のどれか1つを見る。ロックは値の差し替え中だけ保持する。
pub struct LatestSlot<T> {
    inner: Arc<Mutex<SlotInner<T>>>,
}

impl<T> Clone for LatestSlot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SlotInner {
                value: None,
                published: 0,
                overwritten: 0,
            })),
        }
    }

    /// 値を置き換える。未消費の値を捨てた場合は true。
    pub fn publish(&self, value: T) -> bool {
        let previous = {
            let mut inner = self.inner.lock();
            inner.published += 1;
            let previous = inner.value.replace(value);
            if previous.is_some() {
                inner.overwritten += 1;
            }
            previous
        };
        // 古い値の解放はロックの外で
        let dropped = previous.is_some();
        drop(previous);
        dropped
    }

    /// 値を取り出して空にする
    pub fn take(&self) -> Option<T> {
        self.inner.lock().value.take()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().value.is_none()
    }

    /// これまでに書き込まれた回数
    pub fn published(&self) -> u64 {
        self.inner.lock().published
    }

    /// 読まれる前に上書きされた回数
    pub fn overwritten(&self) -> u64 {
        self.inner.lock().overwritten
    }
}

impl<T: Clone> LatestSlot<T> {
    /// 値を残したままコピーを取得。値は何度でも取得できる。
    pub fn snapshot(&self) -> Option<T> {
        self.inner.lock().value.clone()
    }
}
