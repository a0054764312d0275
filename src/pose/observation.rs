use serde::{Deserialize, Serialize};

use super::keypoint::Pose;

/// 外部トラッカーが割り当てる人物ID
pub type TrackId = i64;

/// BBox（ピクセル座標, 左上 x1,y1 / 右下 x2,y2）
///
/// 記録ファイルでは `[x1, y1, x2, y2]` の配列として表現する。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<[f32; 4]> for BBox {
    fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
        Self::new(x1, y1, x2, y2)
    }
}

impl From<BBox> for [f32; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// 1フレーム内で検出された1人分の観測
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonObservation {
    pub track_id: TrackId,
    pub bbox: BBox,
    pub keypoints: Pose,
}

impl PersonObservation {
    pub fn new(track_id: TrackId, bbox: BBox, keypoints: Pose) -> Self {
        Self {
            track_id,
            bbox,
            keypoints,
        }
    }
}
