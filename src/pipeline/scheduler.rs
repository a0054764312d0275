use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::gesture::{GestureAnalyzer, TrackResult};
use crate::pose::PoseSource;

use super::slot::LatestSlot;
use super::stage::{StageCell, StageState, StopReason, StopSignal};

/// 映像の取得元（カメラ、記録ファイルなど）
///
/// エラーを返すとパイプラインは停止する。
pub trait FrameSource {
    type Frame;

    fn read_frame(&mut self) -> anyhow::Result<Self::Frame>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderControl {
    Continue,
    Stop,
}

/// 表示側。最新の推論結果を待たずに毎フレーム呼ばれる。
pub trait ResultSink<F> {
    /// `results` は推論が一度も完了していなければ None
    fn render(&mut self, frame: &F, results: Option<&FrameResults>) -> anyhow::Result<RenderControl>;
}

impl<F, T: ResultSink<F> + ?Sized> ResultSink<F> for &mut T {
    fn render(&mut self, frame: &F, results: Option<&FrameResults>) -> anyhow::Result<RenderControl> {
        (**self).render(frame, results)
    }
}

/// キャプチャ側が付番したフレーム
pub struct StampedFrame<F> {
    pub frame_id: u64,
    pub captured_at: Instant,
    pub frame: Arc<F>,
}

/// 1回の推論パスの結果一式。丸ごと差し替えられる。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameResults {
    /// 推論に使ったフレームの番号
    pub frame_id: u64,
    pub tracks: Vec<TrackResult>,
    #[serde(skip)]
    pub inference_time: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub frames_captured: u64,
    /// 推論が追いつかず捨てたフレーム
    pub frames_dropped: u64,
    pub inference_passes: u64,
    /// 一時的なエラーで結果を公開しなかったパス
    pub skipped_passes: u64,
    pub stop_reason: StopReason,
}

#[derive(Debug, Default)]
struct InferenceStats {
    passes: u64,
    skipped: u64,
}

/// スレッド終了時（パニック含む）に停止フラグを立てる
struct StopOnExit {
    stop: StopSignal,
    state: StageCell,
}

impl Drop for StopOnExit {
    fn drop(&mut self) {
        if thread::panicking() {
            tracing::error!("inference thread panicked");
        }
        self.stop.stop_with(StopReason::InferenceEnded);
        self.state.advance(StageState::Stopped);
    }
}

/// キャプチャ側の終了時（パニック含む）に推論スレッドを止めて待つ
struct JoinOnExit {
    stop: StopSignal,
    capture_state: StageCell,
    handle: Option<JoinHandle<InferenceStats>>,
}

impl JoinOnExit {
    fn join(&mut self) -> thread::Result<InferenceStats> {
        self.stop.stop_with(StopReason::CaptureEnded);
        self.capture_state.advance(StageState::Stopping);
        match self.handle.take() {
            Some(handle) => handle.join(),
            None => Ok(InferenceStats::default()),
        }
    }
}

impl Drop for JoinOnExit {
    fn drop(&mut self) {
        if self.handle.is_none() {
            return;
        }
        if thread::panicking() {
            tracing::error!("capture loop panicked; stopping inference");
        }
        let _ = self.join();
        self.capture_state.advance(StageState::Stopped);
    }
}

/// キャプチャ/表示ループと推論ループを分離した2ステージのパイプライン
///
/// - キャプチャ: 呼び出し元スレッド。フレームを取得して LatestFrame に置き、
///   手元にある最新の結果ですぐに描画する。
/// - 推論: 専用スレッド。LatestFrame から最新フレームを取り出し、
///   検出と解析の後に結果一式を LatestResults に置く。
///
/// 推論が遅い場合、間のフレームは捨てられる。
pub struct Pipeline {
    idle: Duration,
    stop: StopSignal,
    capture_state: StageCell,
    inference_state: StageCell,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            idle: Duration::from_millis(config.idle_ms.max(1)),
            stop: StopSignal::new(),
            capture_state: StageCell::new(),
            inference_state: StageCell::new(),
        }
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn capture_state(&self) -> StageCell {
        self.capture_state.clone()
    }

    pub fn inference_state(&self) -> StageCell {
        self.inference_state.clone()
    }

    /// 停止するまで実行する
    ///
    /// 推論スレッドの終了を待ってから `source` を解放する。
    pub fn run<S, P, R>(
        self,
        mut source: S,
        detector: P,
        analyzer: GestureAnalyzer,
        mut sink: R,
    ) -> Result<PipelineReport, PipelineError>
    where
        S: FrameSource,
        S::Frame: Send + Sync + 'static,
        P: PoseSource<Frame = S::Frame> + 'static,
        R: ResultSink<S::Frame>,
    {
        let frames: LatestSlot<StampedFrame<S::Frame>> = LatestSlot::new();
        let results: LatestSlot<Arc<FrameResults>> = LatestSlot::new();

        let handle = {
            let frames = frames.clone();
            let results = results.clone();
            let stop = self.stop.clone();
            let state = self.inference_state.clone();
            let idle = self.idle;
            thread::Builder::new()
                .name("inference".to_string())
                .spawn(move || inference_loop(detector, analyzer, frames, results, stop, state, idle))
                .map_err(PipelineError::Spawn)?
        };
        // 引数の source より先に drop される
        let mut inference = JoinOnExit {
            stop: self.stop.clone(),
            capture_state: self.capture_state.clone(),
            handle: Some(handle),
        };

        let mut frame_id = 0u64;
        while !self.stop.is_stopped() {
            let frame = match source.read_frame() {
                Ok(frame) => Arc::new(frame),
                Err(e) => {
                    tracing::warn!("capture failed: {:#}", e);
                    self.stop.stop_with(StopReason::CaptureEnded);
                    break;
                }
            };
            frame_id += 1;
            frames.publish(StampedFrame {
                frame_id,
                captured_at: Instant::now(),
                frame: Arc::clone(&frame),
            });

            let latest = results.snapshot();
            match sink.render(&frame, latest.as_deref()) {
                Ok(RenderControl::Continue) => {}
                Ok(RenderControl::Stop) => {
                    self.stop.stop_with(StopReason::RenderRequested);
                    break;
                }
                Err(e) => tracing::warn!(frame_id, "render failed: {:#}", e),
            }
        }

        let joined = inference.join();
        drop(source);
        self.capture_state.advance(StageState::Stopped);

        let stats = joined.map_err(|_| PipelineError::InferencePanicked)?;
        let stop_reason = self.stop.reason().unwrap_or(StopReason::External);
        tracing::info!(?stop_reason, frames = frame_id, passes = stats.passes, "pipeline stopped");

        Ok(PipelineReport {
            frames_captured: frame_id,
            frames_dropped: frames.overwritten(),
            inference_passes: stats.passes,
            skipped_passes: stats.skipped,
            stop_reason,
        })
    }
}

fn inference_loop<P: PoseSource>(
    mut detector: P,
    mut analyzer: GestureAnalyzer,
    frames: LatestSlot<StampedFrame<P::Frame>>,
    results: LatestSlot<Arc<FrameResults>>,
    stop: StopSignal,
    state: StageCell,
    idle: Duration,
) -> InferenceStats {
    let _guard = StopOnExit {
        stop: stop.clone(),
        state: state.clone(),
    };
    let mut stats = InferenceStats::default();

    while !stop.is_stopped() {
        let Some(stamped) = frames.take() else {
            thread::sleep(idle);
            continue;
        };

        let started = Instant::now();
        match detector.detect(&stamped.frame) {
            Ok(observations) => {
                let tracks = analyzer.analyze_frame(&observations);
                results.publish(Arc::new(FrameResults {
                    frame_id: stamped.frame_id,
                    tracks,
                    inference_time: started.elapsed(),
                }));
                stats.passes += 1;
                tracing::trace!(
                    frame_id = stamped.frame_id,
                    latency_ms = stamped.captured_at.elapsed().as_millis() as u64,
                    "results published"
                );
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(frame_id = stamped.frame_id, "{}", e);
                break;
            }
            Err(e) => {
                stats.skipped += 1;
                tracing::warn!(frame_id = stamped.frame_id, "{}; keeping previous results", e);
            }
        }
    }

    state.advance(StageState::Stopping);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DetectError;
    use crate::gesture::rules::fixtures::standing;
    use crate::pose::{BBox, PersonObservation};
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// 連番のフレームを返す。`limit` を超えるとエラー。
    struct CountingSource {
        next: u64,
        limit: Option<u64>,
        delay: Duration,
        on_drop: Option<(StageCell, Arc<Mutex<Option<StageState>>>)>,
    }

    impl CountingSource {
        fn endless(delay: Duration) -> Self {
            Self {
                next: 0,
                limit: None,
                delay,
                on_drop: None,
            }
        }

        fn finite(limit: u64) -> Self {
            Self {
                next: 0,
                limit: Some(limit),
                delay: Duration::ZERO,
                on_drop: None,
            }
        }
    }

    impl FrameSource for CountingSource {
        type Frame = u64;

        fn read_frame(&mut self) -> anyhow::Result<u64> {
            if let Some(limit) = self.limit {
                if self.next >= limit {
                    anyhow::bail!("end of stream");
                }
            }
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            self.next += 1;
            Ok(self.next)
        }
    }

    impl Drop for CountingSource {
        fn drop(&mut self) {
            if let Some((cell, seen)) = &self.on_drop {
                *seen.lock() = Some(cell.get());
            }
        }
    }

    /// パスごとに `persons` 人を返す。トラックIDはパス番号 * 100 + i。
    struct PassDetector {
        persons: i64,
        delay: Duration,
        pass: i64,
    }

    impl PoseSource for PassDetector {
        type Frame = u64;

        fn detect(&mut self, _frame: &u64) -> Result<Vec<PersonObservation>, DetectError> {
            thread::sleep(self.delay);
            self.pass += 1;
            Ok((0..self.persons)
                .map(|i| {
                    PersonObservation::new(self.pass * 100 + i, BBox::default(), standing())
                })
                .collect())
        }
    }

    struct FnDetector<F>(F);

    impl<F> PoseSource for FnDetector<F>
    where
        F: FnMut(u64) -> Result<Vec<PersonObservation>, DetectError> + Send,
    {
        type Frame = u64;

        fn detect(&mut self, frame: &u64) -> Result<Vec<PersonObservation>, DetectError> {
            (self.0)(*frame)
        }
    }

    struct FnSink<F>(F);

    fn detector<F>(f: F) -> FnDetector<F>
    where
        F: FnMut(u64) -> Result<Vec<PersonObservation>, DetectError> + Send,
    {
        FnDetector(f)
    }

    fn sink<F>(f: F) -> FnSink<F>
    where
        F: FnMut(u64, Option<&FrameResults>) -> RenderControl,
    {
        FnSink(f)
    }

    impl<F> ResultSink<u64> for FnSink<F>
    where
        F: FnMut(u64, Option<&FrameResults>) -> RenderControl,
    {
        fn render(&mut self, frame: &u64, results: Option<&FrameResults>) -> anyhow::Result<RenderControl> {
            Ok((self.0)(*frame, results))
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(&PipelineConfig { idle_ms: 1 })
    }

    fn analyzer() -> GestureAnalyzer {
        GestureAnalyzer::with_fps(30)
    }

    #[test]
    fn test_capture_failure_stops_pipeline() {
        let pipeline = pipeline();
        let capture = pipeline.capture_state();
        let inference = pipeline.inference_state();
        let detector = PassDetector {
            persons: 1,
            delay: Duration::ZERO,
            pass: 0,
        };
        let sink = sink(|_, _| RenderControl::Continue);

        let report = pipeline
            .run(CountingSource::finite(10), detector, analyzer(), sink)
            .unwrap();

        assert_eq!(report.stop_reason, StopReason::CaptureEnded);
        assert_eq!(report.frames_captured, 10);
        assert_eq!(capture.get(), StageState::Stopped);
        assert_eq!(inference.get(), StageState::Stopped);
    }

    #[test]
    fn test_render_sees_only_complete_result_sets() {
        let detector = PassDetector {
            persons: 5,
            delay: Duration::from_millis(1),
            pass: 0,
        };
        let mut seen_passes = HashSet::new();
        let mut last_frame_id = 0;
        let sink = sink(|frame, results: Option<&FrameResults>| {
            if let Some(results) = results {
                assert_eq!(results.tracks.len(), 5);
                let pass = results.tracks[0].track_id / 100;
                assert!(results.tracks.iter().all(|t| t.track_id / 100 == pass));
                assert!(results.frame_id <= frame);
                assert!(results.frame_id >= last_frame_id);
                last_frame_id = results.frame_id;
                seen_passes.insert(pass);
            }
            if seen_passes.len() >= 5 {
                RenderControl::Stop
            } else {
                RenderControl::Continue
            }
        });

        let source = CountingSource::endless(Duration::from_micros(100));
        let report = pipeline().run(source, detector, analyzer(), sink).unwrap();

        assert_eq!(report.stop_reason, StopReason::RenderRequested);
        assert!(report.inference_passes >= 5);
        // 取得したフレームは、推論されたか、上書きされたか、最後にスロットに残ったか
        let accounted = report.inference_passes + report.skipped_passes + report.frames_dropped;
        assert!(report.frames_captured - accounted <= 1);
    }

    #[test]
    fn test_transient_error_keeps_previous_results() {
        let failures = Arc::new(AtomicU64::new(0));
        let detector = {
            let failures = Arc::clone(&failures);
            let mut calls = 0u64;
            detector(move |_frame| {
                calls += 1;
                if calls == 1 {
                    Ok(vec![PersonObservation::new(1, BBox::default(), standing())])
                } else {
                    failures.fetch_add(1, Ordering::SeqCst);
                    Err(DetectError::Transient(anyhow::anyhow!("dropped packet")))
                }
            })
        };
        let observed = Arc::new(Mutex::new(HashSet::new()));
        let sink = {
            let failures = Arc::clone(&failures);
            let observed = Arc::clone(&observed);
            sink(move |_, results: Option<&FrameResults>| {
                if let Some(results) = results {
                    observed.lock().insert(results.frame_id);
                }
                if failures.load(Ordering::SeqCst) >= 3 {
                    RenderControl::Stop
                } else {
                    RenderControl::Continue
                }
            })
        };

        let source = CountingSource::endless(Duration::from_micros(200));
        let report = pipeline().run(source, detector, analyzer(), sink).unwrap();

        assert_eq!(report.inference_passes, 1);
        assert!(report.skipped_passes >= 3);
        assert!(observed.lock().len() <= 1);
    }

    #[test]
    fn test_fatal_detector_error_stops_pipeline() {
        let detector = detector(|_frame| Err(DetectError::Fatal(anyhow::anyhow!("model unloaded"))));
        let sink = sink(|_, _| RenderControl::Continue);
        let source = CountingSource::endless(Duration::from_micros(100));

        let report = pipeline().run(source, detector, analyzer(), sink).unwrap();
        assert_eq!(report.stop_reason, StopReason::InferenceEnded);
        assert_eq!(report.inference_passes, 0);
    }

    #[test]
    fn test_inference_panic_is_reported_after_orderly_shutdown() {
        let pipeline = pipeline();
        let capture = pipeline.capture_state();
        let detector = detector(|frame| {
            if frame >= 1 {
                panic!("detector crashed");
            }
            Ok(Vec::new())
        });
        let sink = sink(|_, _| RenderControl::Continue);
        let source = CountingSource::endless(Duration::from_micros(100));

        let result = pipeline.run(source, detector, analyzer(), sink);
        assert!(matches!(result, Err(PipelineError::InferencePanicked)));
        assert_eq!(capture.get(), StageState::Stopped);
    }

    #[test]
    fn test_render_panic_stops_inference() {
        let pipeline = pipeline();
        let stop = pipeline.stop_signal();
        let capture = pipeline.capture_state();
        let inference = pipeline.inference_state();
        let detector = PassDetector {
            persons: 1,
            delay: Duration::from_millis(1),
            pass: 0,
        };
        let sink = sink(|frame, _| {
            if frame >= 3 {
                panic!("display crashed");
            }
            RenderControl::Continue
        });
        let source = CountingSource::endless(Duration::from_micros(200));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pipeline.run(source, detector, analyzer(), sink)
        }));

        assert!(result.is_err());
        assert!(stop.is_stopped());
        assert_eq!(stop.reason(), Some(StopReason::CaptureEnded));
        assert_eq!(inference.get(), StageState::Stopped);
        assert_eq!(capture.get(), StageState::Stopped);
    }

    #[test]
    fn test_external_stop() {
        let pipeline = pipeline();
        let stop = pipeline.stop_signal();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            stop.stop();
        });
        let detector = PassDetector {
            persons: 2,
            delay: Duration::from_millis(2),
            pass: 0,
        };
        let sink = sink(|_, _| RenderControl::Continue);
        let source = CountingSource::endless(Duration::from_micros(500));

        let report = pipeline.run(source, detector, analyzer(), sink).unwrap();
        stopper.join().unwrap();
        assert_eq!(report.stop_reason, StopReason::External);
    }

    #[test]
    fn test_source_released_after_inference_stopped() {
        let pipeline = pipeline();
        let seen = Arc::new(Mutex::new(None));
        let mut source = CountingSource::finite(50);
        source.on_drop = Some((pipeline.inference_state(), Arc::clone(&seen)));
        let detector = PassDetector {
            persons: 1,
            delay: Duration::from_millis(3),
            pass: 0,
        };
        let sink = sink(|_, _| RenderControl::Continue);

        pipeline.run(source, detector, analyzer(), sink).unwrap();
        assert_eq!(*seen.lock(), Some(StageState::Stopped));
    }

    #[test]
    fn test_idle_inference_stops_promptly() {
        // フレームが来ないまま停止しても推論スレッドが残らない
        let pipeline = pipeline();
        let inference = pipeline.inference_state();
        let detector = PassDetector {
            persons: 1,
            delay: Duration::ZERO,
            pass: 0,
        };
        let sink = sink(|_, _| RenderControl::Stop);

        let report = pipeline
            .run(CountingSource::finite(1), detector, analyzer(), sink)
            .unwrap();
        assert_eq!(report.stop_reason, StopReason::RenderRequested);
        assert_eq!(inference.get(), StageState::Stopped);
    }
}
