use crate::config::StepConfig;

/// ジェスチャー1種類分のヒステリシスカウンタ
///
/// 条件成立フレームで `increment` だけ増え、不成立フレームで `decay` だけ減る（0で止まる）。
/// 閾値を「超えた」ときだけアクティブ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HysteresisCounter {
    frames: u32,
}

impl HysteresisCounter {
    pub fn new() -> Self {
        Self { frames: 0 }
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// 1フレーム分更新する
    pub fn update(&mut self, condition: bool, step: StepConfig) {
        self.frames = if condition {
            self.frames.saturating_add(step.increment)
        } else {
            self.frames.saturating_sub(step.decay)
        };
    }

    pub fn is_active(&self, threshold: u32) -> bool {
        self.frames > threshold
    }
}
