use serde::{Deserialize, Serialize};

/// COCO の 17 キーポイントインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl KeypointIndex {
    pub const COUNT: usize = 17;

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Nose),
            1 => Some(Self::LeftEye),
            2 => Some(Self::RightEye),
            3 => Some(Self::LeftEar),
            4 => Some(Self::RightEar),
            5 => Some(Self::LeftShoulder),
            6 => Some(Self::RightShoulder),
            7 => Some(Self::LeftElbow),
            8 => Some(Self::RightElbow),
            9 => Some(Self::LeftWrist),
            10 => Some(Self::RightWrist),
            11 => Some(Self::LeftHip),
            12 => Some(Self::RightHip),
            13 => Some(Self::LeftKnee),
            14 => Some(Self::RightKnee),
            15 => Some(Self::LeftAnkle),
            16 => Some(Self::RightAnkle),
            _ => None,
        }
    }

    /// 左右反転したときの対応インデックス（鼻はそのまま）
    pub fn mirrored(self) -> Self {
        use KeypointIndex::*;
        match self {
            Nose => Nose,
            LeftEye => RightEye,
            RightEye => LeftEye,
            LeftEar => RightEar,
            RightEar => LeftEar,
            LeftShoulder => RightShoulder,
            RightShoulder => LeftShoulder,
            LeftElbow => RightElbow,
            RightElbow => LeftElbow,
            LeftWrist => RightWrist,
            RightWrist => LeftWrist,
            LeftHip => RightHip,
            RightHip => LeftHip,
            LeftKnee => RightKnee,
            RightKnee => LeftKnee,
            LeftAnkle => RightAnkle,
            RightAnkle => LeftAnkle,
        }
    }
}

/// 単一キーポイント（ピクセル座標）
///
/// 記録ファイルでは `[x, y, confidence]` の配列として表現する。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// 信頼度スコア (0.0〜1.0)
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    /// 信頼度がゲートを超えているか（ゲートちょうどは欠損扱い）
    pub fn is_confident(&self, gate: f32) -> bool {
        self.confidence > gate
    }
}

impl Default for Keypoint {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            confidence: 0.0,
        }
    }
}

impl From<[f32; 3]> for Keypoint {
    fn from([x, y, confidence]: [f32; 3]) -> Self {
        Self::new(x, y, confidence)
    }
}

impl From<Keypoint> for [f32; 3] {
    fn from(kp: Keypoint) -> Self {
        [kp.x, kp.y, kp.confidence]
    }
}

/// 17キーポイントからなる姿勢
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pose {
    pub keypoints: [Keypoint; KeypointIndex::COUNT],
}

impl Pose {
    pub fn new(keypoints: [Keypoint; KeypointIndex::COUNT]) -> Self {
        Self { keypoints }
    }

    /// インデックスでキーポイントを取得
    pub fn get(&self, index: KeypointIndex) -> &Keypoint {
        &self.keypoints[index as usize]
    }

    pub fn set(&mut self, index: KeypointIndex, keypoint: Keypoint) {
        self.keypoints[index as usize] = keypoint;
    }

    /// x = axis_x の鉛直軸で反転し、左右のキーポイントを入れ替えた姿勢
    pub fn mirrored(&self, axis_x: f32) -> Self {
        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        for (i, kp) in self.keypoints.iter().enumerate() {
            let Some(index) = KeypointIndex::from_index(i) else {
                continue;
            };
            keypoints[index.mirrored() as usize] =
                Keypoint::new(2.0 * axis_x - kp.x, kp.y, kp.confidence);
        }
        Self { keypoints }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            keypoints: [Keypoint::default(); KeypointIndex::COUNT],
        }
    }
}
