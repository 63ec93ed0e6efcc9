//! フレームのランドマークから種目別スカラーを取り出す。
//!
//! 必要なランドマークが欠けている・可視度不足のフレームは None を返し、
//! 呼び出し側はそのフレームを遷移評価なしで読み飛ばす。

use crate::pose::{geometry, Frame, Keypoint, LandmarkId, Pose};

/// 右手首の縦位置（px）。垂直跳びのメトリクス
pub fn wrist_height_px(frame: &Frame, min_visibility: f32) -> Option<f64> {
    let wrist = frame.pose.get(LandmarkId::RightWrist);
    if !wrist.is_valid(min_visibility) {
        return None;
    }
    let (_, y) = wrist.to_pixel(frame.width, frame.height);
    Some(y)
}

/// 両手首間のピクセル距離。クラップジェスチャー判定用
pub fn wrist_gap_px(frame: &Frame, min_visibility: f32) -> Option<f64> {
    let lw = frame.pose.get(LandmarkId::LeftWrist);
    let rw = frame.pose.get(LandmarkId::RightWrist);
    if !lw.is_valid(min_visibility) || !rw.is_valid(min_visibility) {
        return None;
    }
    Some(geometry::pixel_distance(lw, rw, frame.width, frame.height))
}

/// 腰-膝-足首の角度（度）。スクワットのメトリクス
///
/// 左膝が見えていれば左脚、そうでなければ右脚を使う。
pub fn leg_angle_deg(pose: &Pose, min_visibility: f32) -> Option<f64> {
    let (hip, knee, ankle) = if pose.get(LandmarkId::LeftKnee).is_valid(min_visibility) {
        (LandmarkId::LeftHip, LandmarkId::LeftKnee, LandmarkId::LeftAnkle)
    } else {
        (
            LandmarkId::RightHip,
            LandmarkId::RightKnee,
            LandmarkId::RightAnkle,
        )
    };
    side_angle(pose, hip, knee, ankle, min_visibility)
}

/// 肩-腰-膝の角度（度）。シットアップのメトリクス
pub fn torso_angle_deg(pose: &Pose, min_visibility: f32) -> Option<f64> {
    side_angle(
        pose,
        LandmarkId::LeftShoulder,
        LandmarkId::LeftHip,
        LandmarkId::LeftKnee,
        min_visibility,
    )
}

fn side_angle(
    pose: &Pose,
    a: LandmarkId,
    b: LandmarkId,
    c: LandmarkId,
    min_visibility: f32,
) -> Option<f64> {
    let ka = pose.get(a);
    let kb = pose.get(b);
    let kc = pose.get(c);
    if !ka.is_valid(min_visibility) || !kb.is_valid(min_visibility) || !kc.is_valid(min_visibility)
    {
        return None;
    }
    Some(geometry::angle_deg(ka, kb, kc))
}

/// 左肩の正規化Y。シットアップの接地/起き上がりゲート
pub fn shoulder_height_norm(pose: &Pose, min_visibility: f32) -> Option<f64> {
    let shoulder = pose.get(LandmarkId::LeftShoulder);
    if !shoulder.is_valid(min_visibility) {
        return None;
    }
    Some(shoulder.y as f64)
}

/// 両手首が鼻より上（画像座標で小さいY）にあるか
pub fn hands_behind_head(pose: &Pose, min_visibility: f32) -> Option<bool> {
    let lw = pose.get(LandmarkId::LeftWrist);
    let rw = pose.get(LandmarkId::RightWrist);
    let nose = pose.get(LandmarkId::Nose);
    if !lw.is_valid(min_visibility) || !rw.is_valid(min_visibility) || !nose.is_valid(min_visibility)
    {
        return None;
    }
    Some(lw.y < nose.y && rw.y < nose.y)
}

/// つま先基準点: 足先 → かかと → 足首 の順で最初に見えているもの
pub fn toe_reference(pose: &Pose, min_visibility: f32) -> Option<Keypoint> {
    const CANDIDATES: [LandmarkId; 6] = [
        LandmarkId::LeftFootIndex,
        LandmarkId::RightFootIndex,
        LandmarkId::LeftHeel,
        LandmarkId::RightHeel,
        LandmarkId::LeftAnkle,
        LandmarkId::RightAnkle,
    ];
    CANDIDATES
        .iter()
        .map(|&id| *pose.get(id))
        .find(|kp| kp.is_valid(min_visibility))
}

/// 前屈リーチ（px）
///
/// 手首からつま先基準点までの水平オフセットの大きい方。被験者が
/// どちらを向いていても「前方」の符号が一致するよう、腰中心に対する
/// つま先の側で方向を補正する。正 = 指先がつま先を越えている。
pub fn reach_px(frame: &Frame, min_visibility: f32) -> Option<f64> {
    let pose = &frame.pose;
    let toe = toe_reference(pose, min_visibility)?;
    let lh = pose.get(LandmarkId::LeftHip);
    let rh = pose.get(LandmarkId::RightHip);
    if !lh.is_valid(min_visibility) || !rh.is_valid(min_visibility) {
        return None;
    }
    let lw = pose.get(LandmarkId::LeftWrist);
    let rw = pose.get(LandmarkId::RightWrist);
    if !lw.is_valid(min_visibility) && !rw.is_valid(min_visibility) {
        return None;
    }

    let hip_center_x = (lh.x + rh.x) / 2.0;
    let forward_sign = if toe.x > hip_center_x { 1.0 } else { -1.0 };

    let w = frame.width as f64;
    let reach_of = |wrist: &Keypoint| (wrist.x - toe.x) as f64 * forward_sign * w;

    let mut best = f64::NEG_INFINITY;
    if lw.is_valid(min_visibility) {
        best = best.max(reach_of(lw));
    }
    if rw.is_valid(min_visibility) {
        best = best.max(reach_of(rw));
    }
    Some(best)
}
