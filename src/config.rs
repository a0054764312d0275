use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gesture: GestureConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// カウンタの増減幅（フレーム単位）
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct StepConfig {
    pub increment: u32,
    pub decay: u32,
}

impl StepConfig {
    pub const fn new(increment: u32, decay: u32) -> Self {
        Self { increment, decay }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GestureConfig {
    /// 閾値計算に使うフレームレート
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// これ以下の信頼度のキーポイントは欠損扱い
    #[serde(default = "default_confidence_gate")]
    pub confidence_gate: f32,
    #[serde(default = "default_aiming_seconds")]
    pub aiming_seconds: f32,
    #[serde(default = "default_surrender_seconds")]
    pub surrender_seconds: f32,
    #[serde(default = "default_hidden_seconds")]
    pub hidden_seconds: f32,
    /// 秒数からの算出値を上書きする閾値（フレーム数）
    #[serde(default)]
    pub aiming_threshold: Option<u32>,
    #[serde(default)]
    pub surrender_threshold: Option<u32>,
    #[serde(default)]
    pub hidden_threshold: Option<u32>,
    #[serde(default = "default_aiming_step")]
    pub aiming_step: StepConfig,
    #[serde(default = "default_surrender_step")]
    pub surrender_step: StepConfig,
    #[serde(default = "default_hidden_step")]
    pub hidden_step: StepConfig,
}

fn default_fps() -> u32 { 30 }
fn default_confidence_gate() -> f32 { 0.5 }
fn default_aiming_seconds() -> f32 { 1.5 }
fn default_surrender_seconds() -> f32 { 1.0 }
fn default_hidden_seconds() -> f32 { 2.5 }
fn default_aiming_step() -> StepConfig { StepConfig::new(1, 2) }
fn default_surrender_step() -> StepConfig { StepConfig::new(1, 2) }
fn default_hidden_step() -> StepConfig { StepConfig::new(1, 1) }

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            confidence_gate: default_confidence_gate(),
            aiming_seconds: default_aiming_seconds(),
            surrender_seconds: default_surrender_seconds(),
            hidden_seconds: default_hidden_seconds(),
            aiming_threshold: None,
            surrender_threshold: None,
            hidden_threshold: None,
            aiming_step: default_aiming_step(),
            surrender_step: default_surrender_step(),
            hidden_step: default_hidden_step(),
        }
    }
}

/// `floor(fps × seconds)` を閾値フレーム数にする
fn frames_for(fps: u32, seconds: f32) -> u32 {
    (fps as f64 * seconds as f64).floor() as u32
}

impl GestureConfig {
    /// fps を指定し、それ以外はデフォルト
    pub fn with_fps(fps: u32) -> Self {
        Self {
            fps,
            ..Self::default()
        }
    }

    pub fn aiming_threshold(&self) -> u32 {
        self.aiming_threshold
            .unwrap_or_else(|| frames_for(self.fps, self.aiming_seconds))
    }

    pub fn surrender_threshold(&self) -> u32 {
        self.surrender_threshold
            .unwrap_or_else(|| frames_for(self.fps, self.surrender_seconds))
    }

    pub fn hidden_threshold(&self) -> u32 {
        self.hidden_threshold
            .unwrap_or_else(|| frames_for(self.fps, self.hidden_seconds))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fps == 0 {
            return Err(ConfigError::Invalid("gesture.fps must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence_gate) {
            return Err(ConfigError::Invalid(format!(
                "gesture.confidence_gate must be within [0, 1], got {}",
                self.confidence_gate
            )));
        }
        for (name, seconds) in [
            ("aiming_seconds", self.aiming_seconds),
            ("surrender_seconds", self.surrender_seconds),
            ("hidden_seconds", self.hidden_seconds),
        ] {
            if !(seconds > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "gesture.{name} must be positive, got {seconds}"
                )));
            }
        }
        for (name, step) in [
            ("aiming_step", self.aiming_step),
            ("surrender_step", self.surrender_step),
            ("hidden_step", self.hidden_step),
        ] {
            if step.increment == 0 {
                return Err(ConfigError::Invalid(format!(
                    "gesture.{name}.increment must be positive"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// 新しいフレームが無いときの推論スレッドの待機時間
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,
}

fn default_idle_ms() -> u64 { 5 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            idle_ms: default_idle_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReplayConfig {
    /// JSON Lines 形式の記録ファイル
    #[serde(default = "default_replay_path")]
    pub path: String,
    /// true なら 1/fps ごとにフレームを出す
    #[serde(default = "default_pace")]
    pub pace: bool,
    /// 検出器の処理時間の模擬
    #[serde(default)]
    pub inference_delay_ms: u64,
}

fn default_replay_path() -> String { "recording.jsonl".to_string() }
fn default_pace() -> bool { true }

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            path: default_replay_path(),
            pace: default_pace(),
            inference_delay_ms: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    /// RUST_LOG が無いときのフィルタ
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("in {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.gesture.validate()?;
        Ok(config)
    }

    /// 読み込めなければデフォルト設定を使う
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("using default config ({:#})", e);
                Self::default()
            }
        }
    }
}
