use std::path::PathBuf;

use thiserror::Error;

/// 設定ファイルの読み込み・検証エラー
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// 姿勢検出器が返すエラー
///
/// `Transient` はその推論パスだけを捨てて続行する。
/// `Fatal` はパイプライン全体を停止させる。
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("inference pass failed: {0:#}")]
    Transient(anyhow::Error),
    #[error("pose source failed: {0:#}")]
    Fatal(anyhow::Error),
}

impl DetectError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to spawn inference thread")]
    Spawn(#[source] std::io::Error),
    #[error("inference thread panicked")]
    InferencePanicked,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_error_fatality() {
        assert!(DetectError::Fatal(anyhow::anyhow!("gone")).is_fatal());
        assert!(!DetectError::Transient(anyhow::anyhow!("blip")).is_fatal());
    }

    #[test]
    fn test_detect_error_message_includes_cause_chain() {
        let err = anyhow::anyhow!("device lost").context("run model");
        let msg = DetectError::Transient(err).to_string();
        assert_eq!(msg, "inference pass failed: run model: device lost");
    }
}
