//! 記録済みの姿勢データを使ったフレーム源と検出器
//!
//! 記録ファイルは JSON Lines。1行が1フレームで、検出された人物の配列を持つ:
//!
//! ```text
//! {"persons":[{"track_id":1,"bbox":[10,20,200,480],"keypoints":[[x,y,c], ... 17個]}]}
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::DetectError;
use crate::gesture::{Alert, AlertSet};
use crate::pipeline::{FrameResults, FrameSource, RenderControl, ResultSink};
use crate::pose::{PersonObservation, PoseSource, TrackId};

/// 記録の1フレーム
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordedFrame {
    #[serde(default)]
    pub persons: Vec<PersonObservation>,
}

/// 記録ファイルを1行ずつ読むフレーム源
///
/// `interval` があればその間隔でフレームを出す（カメラのフレームレートの模擬）。
/// 終端または壊れた行でエラーになり、パイプラインは停止する。
pub struct RecordingSource<R> {
    lines: Lines<R>,
    line_no: usize,
    frames: u64,
    interval: Option<Duration>,
    last_frame: Option<Instant>,
}

impl RecordingSource<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P, fps: u32, pace: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open recording {}", path.display()))?;
        let interval = (pace && fps > 0).then(|| Duration::from_secs_f64(1.0 / fps as f64));
        Ok(Self::from_reader(BufReader::new(file), interval))
    }
}

impl<R: BufRead> RecordingSource<R> {
    pub fn from_reader(reader: R, interval: Option<Duration>) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            frames: 0,
            interval,
            last_frame: None,
        }
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last)) = (self.interval, self.last_frame) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());
    }
}

impl<R: BufRead> FrameSource for RecordingSource<R> {
    type Frame = RecordedFrame;

    fn read_frame(&mut self) -> Result<RecordedFrame> {
        loop {
            let Some(line) = self.lines.next() else {
                anyhow::bail!("end of recording after {} frames", self.frames);
            };
            self.line_no += 1;
            let line = line.with_context(|| format!("Failed to read line {}", self.line_no))?;
            if line.trim().is_empty() {
                continue;
            }
            let frame: RecordedFrame = serde_json::from_str(&line)
                .with_context(|| format!("Invalid frame at line {}", self.line_no))?;
            self.pace();
            self.frames += 1;
            return Ok(frame);
        }
    }
}

/// 記録済みの観測をそのまま返す検出器
///
/// `delay` で推論の処理時間を模擬する。
pub struct RecordedPoses {
    delay: Duration,
}

impl RecordedPoses {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl PoseSource for RecordedPoses {
    type Frame = RecordedFrame;

    fn detect(&mut self, frame: &RecordedFrame) -> Result<Vec<PersonObservation>, DetectError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        Ok(frame.persons.clone())
    }
}

/// アラートの変化をログに出す表示側
///
/// 同じ推論結果を何度受け取っても、集計は推論パスごとに1回。
#[derive(Default)]
pub struct AlertLogSink {
    last_frame_id: Option<u64>,
    active: HashMap<TrackId, AlertSet>,
    alert_passes: HashMap<Alert, u64>,
    renders: u64,
}

impl AlertLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// アラートが出ていた推論パスの数
    pub fn alert_passes(&self, alert: Alert) -> u64 {
        self.alert_passes.get(&alert).copied().unwrap_or(0)
    }

    pub fn renders(&self) -> u64 {
        self.renders
    }

    fn observe(&mut self, results: &FrameResults) {
        if self.last_frame_id == Some(results.frame_id) {
            return;
        }
        self.last_frame_id = Some(results.frame_id);

        let mut next = HashMap::with_capacity(results.tracks.len());
        for track in &results.tracks {
            for alert in track.alerts.iter() {
                *self.alert_passes.entry(alert).or_insert(0) += 1;
            }
            let changed = match self.active.get(&track.track_id) {
                Some(previous) => !previous.same_alerts(&track.alerts),
                None => !track.alerts.is_empty(),
            };
            if changed {
                tracing::info!(
                    frame_id = results.frame_id,
                    track_id = track.track_id,
                    alerts = ?track.alerts.labels(),
                    "alerts changed"
                );
            }
            next.insert(track.track_id, track.alerts.clone());
        }
        for track_id in self.active.keys() {
            if !next.contains_key(track_id) {
                tracing::debug!(track_id, "track left the scene");
            }
        }
        self.active = next;
    }
}

impl<F> ResultSink<F> for AlertLogSink {
    fn render(&mut self, _frame: &F, results: Option<&FrameResults>) -> Result<RenderControl> {
        self.renders += 1;
        if let Some(results) = results {
            self.observe(results);
        }
        Ok(RenderControl::Continue)
    }
}
