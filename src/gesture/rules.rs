//! 1フレーム分のキーポイントから各ジェスチャーの条件を判定する幾何ルール
//!
//! 座標は画像のピクセル座標（y は下向き）。閾値はすべて肩幅または腕の長さに対する比率。

use crate::pose::{Keypoint, KeypointIndex, Pose};

use super::scale::shoulder_width;

/// これより短い腕（x 方向）は構えの判定に使わない
const MIN_ARM_LENGTH: f32 = 10.0;
const AIM_LEVEL_RATIO: f32 = 0.5;
const AIM_REACH_RATIO: f32 = 0.7;
const SURRENDER_MARGIN_RATIO: f32 = 0.4;
/// 胴体ボックスがこれより細いときは肩幅で広げる
const MIN_TORSO_WIDTH: f32 = 10.0;
const TORSO_MARGIN_RATIO: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    fn shoulder(self) -> KeypointIndex {
        match self {
            Side::Left => KeypointIndex::LeftShoulder,
            Side::Right => KeypointIndex::RightShoulder,
        }
    }

    fn elbow(self) -> KeypointIndex {
        match self {
            Side::Left => KeypointIndex::LeftElbow,
            Side::Right => KeypointIndex::RightElbow,
        }
    }

    fn wrist(self) -> KeypointIndex {
        match self {
            Side::Left => KeypointIndex::LeftWrist,
            Side::Right => KeypointIndex::RightWrist,
        }
    }

    fn hip(self) -> KeypointIndex {
        match self {
            Side::Left => KeypointIndex::LeftHip,
            Side::Right => KeypointIndex::RightHip,
        }
    }

    /// 頭の後ろで手を組むとき、肘が肩からずれる x 方向の符号
    fn behind_head_direction(self) -> f32 {
        match self {
            Side::Left => -1.0,
            Side::Right => 1.0,
        }
    }
}

/// 片腕分のキーポイント
struct Arm<'a> {
    shoulder: &'a Keypoint,
    elbow: &'a Keypoint,
    wrist: &'a Keypoint,
    hip: &'a Keypoint,
}

impl<'a> Arm<'a> {
    fn of(pose: &'a Pose, side: Side) -> Self {
        Self {
            shoulder: pose.get(side.shoulder()),
            elbow: pose.get(side.elbow()),
            wrist: pose.get(side.wrist()),
            hip: pose.get(side.hip()),
        }
    }

    fn fully_visible(&self, gate: f32) -> bool {
        self.shoulder.is_confident(gate)
            && self.elbow.is_confident(gate)
            && self.wrist.is_confident(gate)
    }
}

/// このフレームで成立した条件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GestureSignals {
    pub aiming: bool,
    pub surrender: bool,
    pub hidden: bool,
}

/// 3つのルールを評価する。構えが成立したフレームでは降伏を評価しない。
pub fn evaluate(pose: &Pose, gate: f32) -> GestureSignals {
    let width = shoulder_width(pose, gate);
    let aiming = is_aiming(pose, gate);
    let surrender = !aiming && is_surrendering(pose, gate, width);
    let hidden = is_hiding(pose, gate, width);
    GestureSignals {
        aiming,
        surrender,
        hidden,
    }
}

/// 腕が肩の高さで横に伸びているか
pub fn arm_extended(pose: &Pose, side: Side, gate: f32) -> bool {
    let arm = Arm::of(pose, side);
    if !arm.fully_visible(gate) {
        return false;
    }
    let (s, e, w) = (arm.shoulder, arm.elbow, arm.wrist);
    let arm_length = (s.x - e.x).abs() + (e.x - w.x).abs();
    arm_length > MIN_ARM_LENGTH
        && (w.y - s.y).abs() < arm_length * AIM_LEVEL_RATIO
        && (w.x - s.x).abs() > arm_length * AIM_REACH_RATIO
}

pub fn is_aiming(pose: &Pose, gate: f32) -> bool {
    Side::BOTH.iter().any(|&side| arm_extended(pose, side, gate))
}

fn hand_up(arm: &Arm, gate: f32, margin: f32) -> bool {
    arm.shoulder.is_confident(gate)
        && arm.wrist.is_confident(gate)
        && arm.wrist.y < arm.shoulder.y - margin
}

fn hand_behind_head(arm: &Arm, side: Side, gate: f32, margin: f32) -> bool {
    if !arm.fully_visible(gate) {
        return false;
    }
    let dir = side.behind_head_direction();
    (arm.elbow.x - arm.shoulder.x) * dir > margin
        && arm.wrist.y < arm.shoulder.y + margin
        && (arm.wrist.x - arm.elbow.x) * dir < 0.0
}

/// 片腕でも上げている、または頭の後ろに回していれば成立
pub fn is_surrendering(pose: &Pose, gate: f32, shoulder_width: f32) -> bool {
    let margin = shoulder_width * SURRENDER_MARGIN_RATIO;
    Side::BOTH.iter().any(|&side| {
        let arm = Arm::of(pose, side);
        hand_up(&arm, gate, margin) || hand_behind_head(&arm, side, gate, margin)
    })
}

/// 肩と腰から作る胴体の領域
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TorsoRegion {
    pub min_x: f32,
    pub max_x: f32,
    /// 肩のライン（最も高い肩）
    pub min_y: f32,
    /// 腰のライン（最も低い腰）
    pub waist_y: f32,
    /// 左右に足す余白
    pub margin: f32,
    /// 見えている肩の平均の高さ
    pub shoulder_y: f32,
}

impl TorsoRegion {
    /// 同じ側の肩と腰が少なくとも1組見えていなければNone
    pub fn from_pose(pose: &Pose, gate: f32, shoulder_width: f32) -> Option<Self> {
        let side_visible = |side: Side| {
            pose.get(side.shoulder()).is_confident(gate) && pose.get(side.hip()).is_confident(gate)
        };
        if !Side::BOTH.iter().any(|&side| side_visible(side)) {
            return None;
        }

        let shoulders: Vec<&Keypoint> = Side::BOTH
            .iter()
            .map(|s| pose.get(s.shoulder()))
            .filter(|kp| kp.is_confident(gate))
            .collect();
        let hips: Vec<&Keypoint> = Side::BOTH
            .iter()
            .map(|s| pose.get(s.hip()))
            .filter(|kp| kp.is_confident(gate))
            .collect();

        let xs = shoulders.iter().chain(hips.iter()).map(|kp| kp.x);
        let mut min_x = xs.clone().fold(f32::INFINITY, f32::min);
        let mut max_x = xs.fold(f32::NEG_INFINITY, f32::max);
        let min_y = shoulders.iter().map(|kp| kp.y).fold(f32::INFINITY, f32::min);
        let waist_y = hips.iter().map(|kp| kp.y).fold(f32::NEG_INFINITY, f32::max);
        let shoulder_y = shoulders.iter().map(|kp| kp.y).sum::<f32>() / shoulders.len() as f32;

        // 片側しか見えないとボックスが潰れる
        if max_x - min_x < MIN_TORSO_WIDTH {
            min_x -= shoulder_width / 2.0;
            max_x += shoulder_width / 2.0;
        }
        let margin = (max_x - min_x) * TORSO_MARGIN_RATIO;

        Some(Self {
            min_x,
            max_x,
            min_y,
            waist_y,
            margin,
            shoulder_y,
        })
    }

    fn contains_x(&self, x: f32) -> bool {
        self.min_x - self.margin < x && x < self.max_x + self.margin
    }
}

/// 手首（見えなければ肘）が胴体の前、腰より上にあるか
fn arm_hidden(pose: &Pose, side: Side, gate: f32, torso: &TorsoRegion) -> bool {
    let arm = Arm::of(pose, side);
    if !(arm.shoulder.is_confident(gate) && arm.hip.is_confident(gate)) {
        return false;
    }
    if arm.wrist.is_confident(gate) {
        let w = arm.wrist;
        torso.contains_x(w.x) && torso.min_y < w.y && w.y < torso.waist_y
    } else if arm.elbow.is_confident(gate) {
        let e = arm.elbow;
        torso.contains_x(e.x) && e.y < torso.waist_y
    } else {
        false
    }
}

/// 両手首が近く、肩から肩幅以上下にある：腕を組んで休んでいるだけ
fn relaxed_crossed_arms(pose: &Pose, gate: f32, shoulder_width: f32, torso: &TorsoRegion) -> bool {
    let lw = pose.get(KeypointIndex::LeftWrist);
    let rw = pose.get(KeypointIndex::RightWrist);
    if !(lw.is_confident(gate) && rw.is_confident(gate)) {
        return false;
    }
    let distance = (lw.x - rw.x).abs() + (lw.y - rw.y).abs();
    let wrists_y = (lw.y + rw.y) / 2.0;
    distance < shoulder_width && wrists_y > torso.shoulder_y + shoulder_width
}

pub fn is_hiding(pose: &Pose, gate: f32, shoulder_width: f32) -> bool {
    let Some(torso) = TorsoRegion::from_pose(pose, gate, shoulder_width) else {
        return false;
    };
    let left = arm_hidden(pose, Side::Left, gate, &torso);
    let right = arm_hidden(pose, Side::Right, gate, &torso);

    if left && right && relaxed_crossed_arms(pose, gate, shoulder_width, &torso) {
        return false;
    }
    left || right
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::pose::{Keypoint, KeypointIndex, Pose};

    pub const GATE: f32 = 0.5;

    /// 正面を向いて腕を下ろした人物（肩幅 100）
    pub fn standing() -> Pose {
        let mut pose = Pose::default();
        pose.set(KeypointIndex::Nose, Keypoint::new(250.0, 130.0, 0.9));
        pose.set(KeypointIndex::LeftShoulder, Keypoint::new(300.0, 200.0, 0.9));
        pose.set(KeypointIndex::RightShoulder, Keypoint::new(200.0, 200.0, 0.9));
        pose.set(KeypointIndex::LeftElbow, Keypoint::new(315.0, 320.0, 0.9));
        pose.set(KeypointIndex::RightElbow, Keypoint::new(185.0, 320.0, 0.9));
        pose.set(KeypointIndex::LeftWrist, Keypoint::new(320.0, 450.0, 0.9));
        pose.set(KeypointIndex::RightWrist, Keypoint::new(180.0, 450.0, 0.9));
        pose.set(KeypointIndex::LeftHip, Keypoint::new(290.0, 400.0, 0.9));
        pose.set(KeypointIndex::RightHip, Keypoint::new(210.0, 400.0, 0.9));
        pose
    }

    /// 右腕を肩の高さで横に伸ばす
    pub fn aiming() -> Pose {
        let mut pose = standing();
        pose.set(KeypointIndex::RightElbow, Keypoint::new(130.0, 205.0, 0.9));
        pose.set(KeypointIndex::RightWrist, Keypoint::new(60.0, 200.0, 0.9));
        pose
    }

    /// 両手を頭上に上げる
    pub fn hands_up() -> Pose {
        let mut pose = standing();
        pose.set(KeypointIndex::LeftElbow, Keypoint::new(320.0, 130.0, 0.9));
        pose.set(KeypointIndex::RightElbow, Keypoint::new(180.0, 130.0, 0.9));
        pose.set(KeypointIndex::LeftWrist, Keypoint::new(310.0, 60.0, 0.9));
        pose.set(KeypointIndex::RightWrist, Keypoint::new(190.0, 60.0, 0.9));
        pose
    }

    /// 左手を頭の後ろに回す
    pub fn hand_behind_head_pose() -> Pose {
        let mut pose = standing();
        pose.set(KeypointIndex::LeftElbow, Keypoint::new(250.0, 180.0, 0.9));
        pose.set(KeypointIndex::LeftWrist, Keypoint::new(270.0, 190.0, 0.9));
        pose
    }

    /// 右手を腹の前に入れる
    pub fn hidden_hand() -> Pose {
        let mut pose = standing();
        pose.set(KeypointIndex::RightElbow, Keypoint::new(190.0, 300.0, 0.9));
        pose.set(KeypointIndex::RightWrist, Keypoint::new(240.0, 330.0, 0.9));
        pose
    }

    /// 腰の少し上で腕を組む
    pub fn relaxed_crossed() -> Pose {
        let mut pose = standing();
        pose.set(KeypointIndex::LeftElbow, Keypoint::new(310.0, 330.0, 0.9));
        pose.set(KeypointIndex::RightElbow, Keypoint::new(190.0, 330.0, 0.9));
        pose.set(KeypointIndex::LeftWrist, Keypoint::new(255.0, 380.0, 0.9));
        pose.set(KeypointIndex::RightWrist, Keypoint::new(245.0, 385.0, 0.9));
        pose
    }
}
