use std::collections::{HashMap, HashSet};

use crate::config::{GestureConfig, StepConfig};
use crate::pose::{PersonObservation, Pose, TrackId};

use super::alert::{Alert, AlertSet};
use super::hysteresis::HysteresisCounter;
use super::rules::{self, GestureSignals};

/// トラックIDごとの時間的状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackState {
    pub aiming: HysteresisCounter,
    pub surrender: HysteresisCounter,
    pub hidden: HysteresisCounter,
}

impl TrackState {
    pub fn aiming_frames(&self) -> u32 {
        self.aiming.frames()
    }

    pub fn surrender_frames(&self) -> u32 {
        self.surrender.frames()
    }

    pub fn hidden_frames(&self) -> u32 {
        self.hidden.frames()
    }
}

/// 設定から解決した閾値（フレーム数）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub aiming: u32,
    pub surrender: u32,
    pub hidden: u32,
}

impl Thresholds {
    pub fn from_config(config: &GestureConfig) -> Self {
        Self {
            aiming: config.aiming_threshold(),
            surrender: config.surrender_threshold(),
            hidden: config.hidden_threshold(),
        }
    }
}

/// レンダラーに渡す1人分の結果
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TrackResult {
    pub track_id: TrackId,
    pub bbox: crate::pose::BBox,
    pub alerts: AlertSet,
}

/// ノイズの多いフレームごとの判定を、トラックごとのカウンタでアラートに変換する
pub struct GestureAnalyzer {
    confidence_gate: f32,
    thresholds: Thresholds,
    aiming_step: StepConfig,
    surrender_step: StepConfig,
    hidden_step: StepConfig,
    tracks: HashMap<TrackId, TrackState>,
}

impl GestureAnalyzer {
    pub fn new(config: &GestureConfig) -> Self {
        Self {
            confidence_gate: config.confidence_gate,
            thresholds: Thresholds::from_config(config),
            aiming_step: config.aiming_step,
            surrender_step: config.surrender_step,
            hidden_step: config.hidden_step,
            tracks: HashMap::new(),
        }
    }

    pub fn with_fps(fps: u32) -> Self {
        Self::new(&GestureConfig::with_fps(fps))
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn track_state(&self, track_id: TrackId) -> Option<&TrackState> {
        self.tracks.get(&track_id)
    }

    /// 状態が無ければ作る
    pub fn get_or_create(&mut self, track_id: TrackId) -> &mut TrackState {
        self.tracks.entry(track_id).or_insert_with(|| {
            tracing::debug!(track_id, "new track");
            TrackState::default()
        })
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// 1フレーム分の姿勢でカウンタを更新し、閾値を超えたアラートを返す
    ///
    /// 同じトラックでは1フレームに1回だけ呼ぶこと。アラートは閾値を超えている間、毎フレーム返る。
    pub fn analyze(&mut self, track_id: TrackId, pose: &Pose) -> AlertSet {
        let signals = rules::evaluate(pose, self.confidence_gate);
        self.apply(track_id, signals)
    }

    fn apply(&mut self, track_id: TrackId, signals: GestureSignals) -> AlertSet {
        let thresholds = self.thresholds;
        let (aiming_step, surrender_step, hidden_step) =
            (self.aiming_step, self.surrender_step, self.hidden_step);
        let state = self.get_or_create(track_id);

        state.aiming.update(signals.aiming, aiming_step);
        state.surrender.update(signals.surrender, surrender_step);
        state.hidden.update(signals.hidden, hidden_step);

        let mut alerts = AlertSet::new();
        if state.aiming.is_active(thresholds.aiming) {
            alerts.insert(Alert::Aiming);
        }
        if state.surrender.is_active(thresholds.surrender) {
            alerts.insert(Alert::Surrender);
        }
        if state.hidden.is_active(thresholds.hidden) {
            alerts.insert(Alert::HiddenHand);
        }
        alerts
    }

    /// `live` に含まれないトラックの状態を即座に削除する。削除数を返す。
    pub fn evict<I>(&mut self, live: I) -> usize
    where
        I: IntoIterator<Item = TrackId>,
    {
        let live: HashSet<TrackId> = live.into_iter().collect();
        let before = self.tracks.len();
        self.tracks.retain(|track_id, _| {
            let keep = live.contains(track_id);
            if !keep {
                tracing::debug!(track_id, "track evicted");
            }
            keep
        });
        before - self.tracks.len()
    }

    /// 1フレーム分の全観測を処理し、映っていないトラックを削除する
    pub fn analyze_frame(&mut self, observations: &[PersonObservation]) -> Vec<TrackResult> {
        let results = observations
            .iter()
            .map(|obs| TrackResult {
                track_id: obs.track_id,
                bbox: obs.bbox,
                alerts: self.analyze(obs.track_id, &obs.keypoints),
            })
            .collect();
        self.evict(observations.iter().map(|obs| obs.track_id));
        results
    }
}
