use crate::error::DetectError;

use super::observation::PersonObservation;

/// 外部の姿勢検出器＋トラッカー
///
/// 1フレームにつき0人以上の観測を返す。空の結果も正常。
/// 推論スレッドに移動されるため `Send` が必要。
pub trait PoseSource: Send {
    type Frame;

    fn detect(&mut self, frame: &Self::Frame) -> Result<Vec<PersonObservation>, DetectError>;
}
