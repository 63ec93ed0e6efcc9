//! 追跡開始前の基準値捕捉。
//!
//! 垂直跳び: 両手を合わせる（クラップ）ジェスチャーを規定フレーム
//! 維持した時点の手首高さを立位リーチとして確定する。
//! スクワット: 平滑化済み角度が安定したら、その平均を立位基準角とする。

/// クラップジェスチャーによる基準リーチ捕捉
#[derive(Debug, Clone)]
pub struct ClapGate {
    distance_px: f64,
    required_frames: u32,
    streak: u32,
}

impl ClapGate {
    pub fn new(distance_px: f64, required_frames: u32) -> Self {
        Self {
            distance_px,
            required_frames,
            streak: 0,
        }
    }

    /// 1フレーム分の観測。確定したら立位リーチ（手首Y px）を返す。
    pub fn observe(&mut self, wrist_gap_px: f64, wrist_y_px: f64) -> Option<f64> {
        if wrist_gap_px < self.distance_px {
            self.streak += 1;
            if self.streak >= self.required_frames {
                return Some(wrist_y_px);
            }
        } else {
            self.streak = 0;
        }
        None
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn reset(&mut self) {
        self.streak = 0;
    }
}

/// 立位基準角の自動捕捉
///
/// 直近 `required` 個の読みが許容幅に収まった時点で平均を基準とする。
/// 体格やカメラ角度で立位角が変わるため、固定角ではなく実測から取る。
#[derive(Debug, Clone)]
pub struct StandingReference {
    required: usize,
    tolerance: f64,
    window: Vec<f64>,
}

impl StandingReference {
    pub fn new(required: usize, tolerance: f64) -> Self {
        Self {
            required: required.max(1),
            tolerance,
            window: Vec::new(),
        }
    }

    /// 1読み分の観測。安定が確認できたら基準角を返す。
    pub fn observe(&mut self, angle_deg: f64) -> Option<f64> {
        self.window.push(angle_deg);
        if self.window.len() > self.required {
            self.window.remove(0);
        }
        if self.window.len() < self.required {
            return None;
        }

        let min = self.window.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = self.window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if max - min > self.tolerance {
            return None;
        }
        Some(self.window.iter().sum::<f64>() / self.window.len() as f64)
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}
