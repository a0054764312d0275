use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// パイプラインが止まった理由（最初に止めた側が記録される）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// フレーム取得に失敗した（カメラ切断・記録の終端）
    CaptureEnded,
    /// 表示側が終了を要求した
    RenderRequested,
    /// 外部から stop() された
    External,
    /// 推論スレッドが終了した（致命的エラーまたはパニック）
    InferenceEnded,
}

struct StopInner {
    flag: AtomicBool,
    reason: Mutex<Option<StopReason>>,
}

/// 両ステージが毎ループ確認する共有の停止フラグ
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StopInner {
                flag: AtomicBool::new(false),
                reason: Mutex::new(None),
            }),
        }
    }

    /// 外部からの停止要求
    pub fn stop(&self) {
        self.stop_with(StopReason::External);
    }

    pub(crate) fn stop_with(&self, reason: StopReason) {
        {
            let mut current = self.inner.reason.lock();
            if current.is_none() {
                *current = Some(reason);
            }
        }
        self.inner.flag.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<StopReason> {
        *self.inner.reason.lock()
    }
}

/// ステージの状態。前にしか進まない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum StageState {
    Running = 0,
    Stopping = 1,
    Stopped = 2,
}

impl StageState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// スレッド間で共有するステージ状態
#[derive(Clone)]
pub struct StageCell(Arc<AtomicU8>);

impl Default for StageCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StageCell {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(StageState::Running as u8)))
    }

    pub fn get(&self) -> StageState {
        StageState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// `to` まで進める（後戻りはしない）
    pub fn advance(&self, to: StageState) {
        self.0.fetch_max(to as u8, Ordering::AcqRel);
    }
}
