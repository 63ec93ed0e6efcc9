//! 長座体前屈のホールド判定。
//!
//! 4つの姿勢制約がすべて成立するフレームだけがホールドに数えられ、
//! 規定フレーム数連続した時点でその時のリーチが計測候補になる。

use crate::config::ReachConfig;
use crate::pose::{geometry, LandmarkId, Pose};

/// 1フレーム分の姿勢制約の成否
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityCheck {
    /// 両膝がロック角以上に伸びている
    pub legs_straight: bool,
    /// 足首の間隔が許容内（足が滑っていない）
    pub feet_stable: bool,
    /// 腰が足首の高さ近くにある（腰が浮いていない）
    pub hips_down: bool,
    /// 両手首が縦に揃っている
    pub hands_aligned: bool,
}

impl StabilityCheck {
    pub fn all(&self) -> bool {
        self.legs_straight && self.feet_stable && self.hips_down && self.hands_aligned
    }
}

/// 制約評価。必要なランドマークが欠けているフレームは None
pub fn evaluate(pose: &Pose, config: &ReachConfig, min_visibility: f32) -> Option<StabilityCheck> {
    let ids = [
        LandmarkId::LeftHip,
        LandmarkId::RightHip,
        LandmarkId::LeftKnee,
        LandmarkId::RightKnee,
        LandmarkId::LeftAnkle,
        LandmarkId::RightAnkle,
        LandmarkId::LeftWrist,
        LandmarkId::RightWrist,
    ];
    if ids.iter().any(|&id| !pose.get(id).is_valid(min_visibility)) {
        return None;
    }

    let lh = pose.get(LandmarkId::LeftHip);
    let rh = pose.get(LandmarkId::RightHip);
    let lk = pose.get(LandmarkId::LeftKnee);
    let rk = pose.get(LandmarkId::RightKnee);
    let la = pose.get(LandmarkId::LeftAnkle);
    let ra = pose.get(LandmarkId::RightAnkle);
    let lw = pose.get(LandmarkId::LeftWrist);
    let rw = pose.get(LandmarkId::RightWrist);

    let left_leg = geometry::angle_deg(lh, lk, la);
    let right_leg = geometry::angle_deg(rh, rk, ra);
    let legs_straight = left_leg > config.knee_lock_deg && right_leg > config.knee_lock_deg;

    let feet_stable = (la.x - ra.x).abs() < config.ankle_tolerance as f32;

    let hip_y = (lh.y + rh.y) / 2.0;
    let ankle_y = (la.y + ra.y) / 2.0;
    let hips_down = (hip_y - ankle_y).abs() < config.hip_tolerance as f32;

    let hands_aligned = (lw.y - rw.y).abs() < config.wrist_tolerance as f32;

    Some(StabilityCheck {
        legs_straight,
        feet_stable,
        hips_down,
        hands_aligned,
    })
}

/// 連続ホールドカウンタ
///
/// 制約が崩れたフレームで即ゼロに戻る。リーチ値自体も
/// 許容ドリフト内で静止している必要がある。
#[derive(Debug, Clone)]
pub struct HoldMonitor {
    required_frames: u32,
    drift_tolerance_px: f64,
    held: u32,
    last_reach_px: Option<f64>,
}

impl HoldMonitor {
    pub fn new(required_frames: u32, drift_tolerance_px: f64) -> Self {
        Self {
            required_frames,
            drift_tolerance_px,
            held: 0,
            last_reach_px: None,
        }
    }

    pub fn from_config(config: &ReachConfig) -> Self {
        Self::new(config.hold_frames, config.drift_tolerance_px)
    }

    /// 1フレーム分の観測。ホールドが成立したらその時のリーチを返す。
    /// 成立後はカウンタがゼロに戻り、次の計測には新しいホールドが要る。
    pub fn observe(&mut self, stable: bool, reach_px: f64) -> Option<f64> {
        if !stable {
            self.held = 0;
            self.last_reach_px = None;
            return None;
        }

        match self.last_reach_px {
            Some(prev) if (reach_px - prev).abs() < self.drift_tolerance_px => {
                self.held += 1;
            }
            _ => {
                self.held = 1;
                self.last_reach_px = Some(reach_px);
            }
        }

        if self.held >= self.required_frames {
            self.held = 0;
            return Some(reach_px);
        }
        None
    }

    pub fn held_frames(&self) -> u32 {
        self.held
    }

    pub fn reset(&mut self) {
        self.held = 0;
        self.last_reach_px = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Keypoint;

    fn kp(x: f32, y: f32) -> Keypoint {
        Keypoint::new(x, y, 0.9)
    }

    /// 長座姿勢: 脚は水平に伸び、腰と足首が同じ高さ、手首が揃っている
    fn seated_pose() -> Pose {
        let mut pose = Pose::default();
        pose.set(LandmarkId::LeftHip, kp(0.30, 0.80));
        pose.set(LandmarkId::RightHip, kp(0.30, 0.81));
        pose.set(LandmarkId::LeftKnee, kp(0.50, 0.80));
        pose.set(LandmarkId::RightKnee, kp(0.50, 0.81));
        pose.set(LandmarkId::LeftAnkle, kp(0.70, 0.80));
        pose.set(LandmarkId::RightAnkle, kp(0.71, 0.81));
        pose.set(LandmarkId::LeftWrist, kp(0.72, 0.70));
        pose.set(LandmarkId::RightWrist, kp(0.73, 0.71));
        pose
    }

    #[test]
    fn test_seated_pose_satisfies_all() {
        let check = evaluate(&seated_pose(), &ReachConfig::default(), 0.5).unwrap();
        assert!(check.legs_straight, "{check:?}");
        assert!(check.feet_stable, "{check:?}");
        assert!(check.hips_down, "{check:?}");
        assert!(check.hands_aligned, "{check:?}");
        assert!(check.all());
    }

    #[test]
    fn test_bent_knee_fails() {
        let mut pose = seated_pose();
        // 左膝を大きく曲げる
        pose.set(LandmarkId::LeftKnee, kp(0.50, 0.65));
        let check = evaluate(&pose, &ReachConfig::default(), 0.5).unwrap();
        assert!(!check.legs_straight);
        assert!(!check.all());
    }

    #[test]
    fn test_spread_feet_fail() {
        let mut pose = seated_pose();
        pose.set(LandmarkId::RightAnkle, kp(0.85, 0.81));
        let check = evaluate(&pose, &ReachConfig::default(), 0.5).unwrap();
        assert!(!check.feet_stable);
    }

    #[test]
    fn test_lifted_hip_fails() {
        let mut pose = seated_pose();
        pose.set(LandmarkId::LeftHip, kp(0.30, 0.70));
        pose.set(LandmarkId::RightHip, kp(0.30, 0.70));
        let check = evaluate(&pose, &ReachConfig::default(), 0.5).unwrap();
        assert!(!check.hips_down);
    }

    #[test]
    fn test_misaligned_hands_fail() {
        let mut pose = seated_pose();
        pose.set(LandmarkId::RightWrist, kp(0.73, 0.60));
        let check = evaluate(&pose, &ReachConfig::default(), 0.5).unwrap();
        assert!(!check.hands_aligned);
    }

    #[test]
    fn test_missing_landmark_is_none() {
        let mut pose = seated_pose();
        pose.set(LandmarkId::LeftAnkle, Keypoint::new(0.7, 0.8, 0.1));
        assert!(evaluate(&pose, &ReachConfig::default(), 0.5).is_none());
    }

    #[test]
    fn test_hold_accepts_after_required_frames() {
        let mut hold = HoldMonitor::new(5, 10.0);
        for i in 0..4 {
            assert!(hold.observe(true, 120.0).is_none(), "frame {i}");
        }
        assert_eq!(hold.observe(true, 121.0), Some(121.0));
        // 成立後はカウンタが戻っている
        assert_eq!(hold.held_frames(), 0);
    }

    #[test]
    fn test_hold_resets_on_broken_constraint() {
        let mut hold = HoldMonitor::new(5, 10.0);
        for _ in 0..4 {
            hold.observe(true, 120.0);
        }
        // 1フレームでも崩れたらゼロから
        hold.observe(false, 120.0);
        assert_eq!(hold.held_frames(), 0);
        for i in 0..4 {
            assert!(hold.observe(true, 120.0).is_none(), "frame {i}");
        }
        assert!(hold.observe(true, 120.0).is_some());
    }

    #[test]
    fn test_hold_resets_on_drift() {
        let mut hold = HoldMonitor::new(5, 10.0);
        for _ in 0..4 {
            hold.observe(true, 120.0);
        }
        // 大きく動いたらカウンタは1から（新しい基準値で）
        assert!(hold.observe(true, 160.0).is_none());
        assert_eq!(hold.held_frames(), 1);
    }
}
