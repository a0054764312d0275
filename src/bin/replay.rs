use anyhow::Result;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use gesture_guard::config::Config;
use gesture_guard::gesture::{Alert, GestureAnalyzer};
use gesture_guard::pipeline::Pipeline;
use gesture_guard::replay::{AlertLogSink, RecordedPoses, RecordingSource};

const CONFIG_PATH: &str = "config.toml";

fn main() -> Result<()> {
    // 設定を読む前の警告も出せるよう、フィルタは後から差し替える
    let from_env = EnvFilter::try_from_default_env().ok();
    let use_config_level = from_env.is_none();
    let (filter, filter_handle) =
        reload::Layer::new(from_env.unwrap_or_else(|| EnvFilter::new("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = Config::load_or_default(CONFIG_PATH);
    if use_config_level {
        if let Err(e) = filter_handle.reload(EnvFilter::new(&config.log.level)) {
            tracing::warn!("log level not applied: {}", e);
        }
    }

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.replay.path.clone());

    println!("Gesture Replay ({})", env!("GIT_VERSION"));
    println!("Recording: {}", path);
    println!("FPS: {} (pace: {})", config.gesture.fps, if config.replay.pace { "ON" } else { "OFF" });
    let analyzer = GestureAnalyzer::new(&config.gesture);
    let thresholds = analyzer.thresholds();
    println!(
        "Thresholds: aiming={} surrender={} hidden={} frames",
        thresholds.aiming, thresholds.surrender, thresholds.hidden
    );
    println!("Inference delay: {}ms", config.replay.inference_delay_ms);
    println!();

    let source = RecordingSource::open(&path, config.gesture.fps, config.replay.pace)?;
    let detector = RecordedPoses::new(Duration::from_millis(config.replay.inference_delay_ms));
    let mut sink = AlertLogSink::new();

    let report = Pipeline::new(&config.pipeline).run(source, detector, analyzer, &mut sink)?;

    println!();
    println!("Stopped: {:?}", report.stop_reason);
    println!(
        "Frames: {} captured, {} dropped before inference",
        report.frames_captured, report.frames_dropped
    );
    println!(
        "Inference: {} passes, {} skipped",
        report.inference_passes, report.skipped_passes
    );
    for alert in Alert::ALL {
        println!("  {}: {} passes", alert.label(), sink.alert_passes(alert));
    }

    Ok(())
}
