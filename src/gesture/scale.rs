use crate::pose::{KeypointIndex, Pose};

/// 肩幅が取れないときの既定値。計算結果の下限も兼ねる。
pub const SHOULDER_WIDTH_FLOOR: f32 = 40.0;
/// これより狭い肩幅は横向きとみなす
pub const PROFILE_SPAN: f32 = 20.0;
/// 肩〜腰の縦の長さから肩幅を推定する係数
pub const TORSO_TO_SHOULDER_RATIO: f32 = 0.4;

/// 距離に依存しないスケール基準としての肩幅（ピクセル）
///
/// 両肩が見えていれば水平距離を使う。横向きで 20 未満に潰れた場合は、
/// 肩と腰が同じ側で見えている側の縦の長さ ×0.4 で代用する（両側見えていれば平均）。
/// それ以外は 40 を下限にする。
pub fn shoulder_width(pose: &Pose, gate: f32) -> f32 {
    let ls = pose.get(KeypointIndex::LeftShoulder);
    let rs = pose.get(KeypointIndex::RightShoulder);

    let mut span = SHOULDER_WIDTH_FLOOR;
    if ls.is_confident(gate) && rs.is_confident(gate) {
        span = (ls.x - rs.x).abs() + 0.1;
    }

    if span < PROFILE_SPAN {
        if let Some(torso) = torso_height(pose, gate) {
            return torso * TORSO_TO_SHOULDER_RATIO;
        }
    }
    span.max(SHOULDER_WIDTH_FLOOR)
}

/// 同じ側の肩と腰の縦距離。両側取れれば平均。
fn torso_height(pose: &Pose, gate: f32) -> Option<f32> {
    let sides = [
        (KeypointIndex::LeftShoulder, KeypointIndex::LeftHip),
        (KeypointIndex::RightShoulder, KeypointIndex::RightHip),
    ];
    let spans: Vec<f32> = sides
        .iter()
        .filter_map(|&(shoulder, hip)| {
            let s = pose.get(shoulder);
            let h = pose.get(hip);
            (s.is_confident(gate) && h.is_confident(gate)).then(|| (s.y - h.y).abs())
        })
        .collect();

    if spans.is_empty() {
        None
    } else {
        Some(spans.iter().sum::<f32>() / spans.len() as f32)
    }
}
