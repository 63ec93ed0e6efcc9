use std::time::Duration;

/// 測定で使用する 15 ランドマークのインデックス
///
/// 外部の姿勢推定器(MediaPipe系)が返す点のうち、種目計測が
/// 実際に参照するものだけを閉じた集合として持つ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum LandmarkId {
    Nose = 0,
    LeftShoulder = 1,
    RightShoulder = 2,
    LeftWrist = 3,
    RightWrist = 4,
    LeftHip = 5,
    RightHip = 6,
    LeftKnee = 7,
    RightKnee = 8,
    LeftAnkle = 9,
    RightAnkle = 10,
    LeftFootIndex = 11,
    RightFootIndex = 12,
    LeftHeel = 13,
    RightHeel = 14,
}

impl LandmarkId {
    pub const COUNT: usize = 15;

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Nose),
            1 => Some(Self::LeftShoulder),
            2 => Some(Self::RightShoulder),
            3 => Some(Self::LeftWrist),
            4 => Some(Self::RightWrist),
            5 => Some(Self::LeftHip),
            6 => Some(Self::RightHip),
            7 => Some(Self::LeftKnee),
            8 => Some(Self::RightKnee),
            9 => Some(Self::LeftAnkle),
            10 => Some(Self::RightAnkle),
            11 => Some(Self::LeftFootIndex),
            12 => Some(Self::RightFootIndex),
            13 => Some(Self::LeftHeel),
            14 => Some(Self::RightHeel),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
            Self::LeftFootIndex => "left_foot_index",
            Self::RightFootIndex => "right_foot_index",
            Self::LeftHeel => "left_heel",
            Self::RightHeel => "right_heel",
        }
    }
}

/// 単一キーポイント
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0)
    pub y: f32,
    /// 可視度スコア (0.0〜1.0)
    pub visibility: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, visibility: f32) -> Self {
        Self { x, y, visibility }
    }

    /// 可視度が閾値以上か
    pub fn is_valid(&self, threshold: f32) -> bool {
        self.visibility >= threshold
    }

    /// ピクセル座標に変換
    pub fn to_pixel(&self, width: u32, height: u32) -> (f64, f64) {
        (
            self.x as f64 * width as f64,
            self.y as f64 * height as f64,
        )
    }

    /// 投影先がフレーム内に収まるか
    pub fn in_bounds(&self, width: u32, height: u32) -> bool {
        let (px, py) = self.to_pixel(width, height);
        px >= 0.0 && px <= width as f64 && py >= 0.0 && py <= height as f64
    }
}

impl Default for Keypoint {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            visibility: 0.0,
        }
    }
}

/// 1フレーム分のランドマーク集合
#[derive(Debug, Clone)]
pub struct Pose {
    pub keypoints: [Keypoint; LandmarkId::COUNT],
}

impl Pose {
    pub fn new(keypoints: [Keypoint; LandmarkId::COUNT]) -> Self {
        Self { keypoints }
    }

    pub fn get(&self, id: LandmarkId) -> &Keypoint {
        &self.keypoints[id as usize]
    }

    pub fn set(&mut self, id: LandmarkId, kp: Keypoint) {
        self.keypoints[id as usize] = kp;
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            keypoints: [Keypoint::default(); LandmarkId::COUNT],
        }
    }
}

/// 1フレームの入力。コアは処理ステップを超えて保持しない。
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// ストリーム先頭からの相対時刻
    pub timestamp: Duration,
    pub pose: Pose,
}

impl Frame {
    pub fn new(width: u32, height: u32, timestamp: Duration, pose: Pose) -> Self {
        Self {
            width,
            height,
            timestamp,
            pose,
        }
    }
}
