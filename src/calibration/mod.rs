//! ピクセル距離を実寸（cm）へ変換するスケールの取得。
//!
//! 3つの方式はすべて同じ `CalibrationResult` に還元され、
//! 以降のパイプラインは取得方式を区別しない。
//! 結果をいつ確定（ラッチ）するかは呼び出し側が決める。

pub mod fiducial;

use opencv::core::Mat;

use crate::config::{CalibrationConfig, ManualConfig, MarkerConfig};
use crate::error::CalibrationError;
use crate::pose::{geometry, Frame, LandmarkId};

pub use fiducial::{detect_marker, rank_candidates, Quad};

/// キャリブレーション結果。確定後はセッション終了まで不変。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationResult {
    /// 1cmあたりのピクセル数。常に正
    pub pixels_per_cm: f64,
    /// 地面基準のY座標（px）。anthropometricのみ
    pub reference_y: Option<f64>,
}

impl CalibrationResult {
    /// ピクセル長をcmへ変換
    pub fn to_cm(&self, pixels: f64) -> f64 {
        pixels / self.pixels_per_cm
    }
}

/// スケール取得方式
#[derive(Debug, Clone)]
pub enum Strategy {
    /// 身長と頭-足首ピクセルスパンから算出
    Anthropometric { subject_height_cm: f64 },
    /// 既知寸法の平面マーカーをフレームから探す
    Fiducial(MarkerConfig),
    /// ユーザー指定の2点と実距離
    ManualTwoPoint {
        point_a: (f64, f64),
        point_b: (f64, f64),
        distance_cm: f64,
    },
}

impl Strategy {
    /// 設定文字列から構築。"none" は `None` を返す（スケール不要な種目）。
    pub fn from_config(config: &CalibrationConfig) -> anyhow::Result<Option<Self>> {
        match config.strategy.as_str() {
            "anthropometric" => Ok(Some(Self::Anthropometric {
                subject_height_cm: config.subject_height_cm,
            })),
            "fiducial" => Ok(Some(Self::Fiducial(config.marker.clone()))),
            "manual" => Ok(Some(Self::from_manual(&config.manual))),
            "none" => Ok(None),
            other => anyhow::bail!("unknown calibration strategy: {}", other),
        }
    }

    fn from_manual(manual: &ManualConfig) -> Self {
        Self::ManualTwoPoint {
            point_a: (manual.point_a[0], manual.point_a[1]),
            point_b: (manual.point_b[0], manual.point_b[1]),
            distance_cm: manual.distance_cm,
        }
    }
}

/// 方式ディスパッチ。fiducialのみ画像を必要とする。
pub fn calibrate(
    frame: &Frame,
    image: Option<&Mat>,
    strategy: &Strategy,
    min_visibility: f32,
) -> Result<CalibrationResult, CalibrationError> {
    match strategy {
        Strategy::Anthropometric { subject_height_cm } => {
            anthropometric(frame, *subject_height_cm, min_visibility)
        }
        Strategy::Fiducial(marker) => match image {
            Some(image) => detect_marker(image, marker),
            None => Err(CalibrationError::MarkerNotFound),
        },
        Strategy::ManualTwoPoint {
            point_a,
            point_b,
            distance_cm,
        } => manual_two_point(*point_a, *point_b, *distance_cm),
    }
}

/// 身長ベースのスケール算出
///
/// 頭(鼻)と低い方の足首の縦ピクセルスパンを身長cmで割る。
/// 全身がフレーム内にあることの確認は手首も含める（元の運用と同じ:
/// 腕が切れたままセットアップされると基準リーチが取れない）。
pub fn anthropometric(
    frame: &Frame,
    subject_height_cm: f64,
    min_visibility: f32,
) -> Result<CalibrationResult, CalibrationError> {
    if subject_height_cm <= 0.0 {
        return Err(CalibrationError::InvalidDistance(subject_height_cm));
    }

    let required = [
        LandmarkId::Nose,
        LandmarkId::LeftAnkle,
        LandmarkId::RightAnkle,
        LandmarkId::LeftWrist,
        LandmarkId::RightWrist,
    ];
    for id in required {
        let kp = frame.pose.get(id);
        if !kp.is_valid(min_visibility) || !kp.in_bounds(frame.width, frame.height) {
            return Err(CalibrationError::InsufficientLandmarks(id));
        }
    }

    let (_, head_y) = frame.pose.get(LandmarkId::Nose).to_pixel(frame.width, frame.height);
    let (_, la_y) = frame
        .pose
        .get(LandmarkId::LeftAnkle)
        .to_pixel(frame.width, frame.height);
    let (_, ra_y) = frame
        .pose
        .get(LandmarkId::RightAnkle)
        .to_pixel(frame.width, frame.height);
    let ankle_y = la_y.max(ra_y);

    let span_px = (ankle_y - head_y).abs();
    if span_px <= 1.0 {
        // 頭と足首が同じ高さに映っている: 姿勢が取れていない
        return Err(CalibrationError::InsufficientLandmarks(LandmarkId::Nose));
    }

    Ok(CalibrationResult {
        pixels_per_cm: span_px / subject_height_cm,
        reference_y: Some(ankle_y),
    })
}

/// 2点間のピクセル距離と実距離からスケールを算出
pub fn manual_two_point(
    point_a: (f64, f64),
    point_b: (f64, f64),
    distance_cm: f64,
) -> Result<CalibrationResult, CalibrationError> {
    if distance_cm <= 0.0 {
        return Err(CalibrationError::InvalidDistance(distance_cm));
    }
    let px = geometry::point_distance(point_a, point_b);
    if px <= 0.0 {
        return Err(CalibrationError::InvalidDistance(0.0));
    }
    Ok(CalibrationResult {
        pixels_per_cm: px / distance_cm,
        reference_y: None,
    })
}
