use thiserror::Error;

use crate::pose::LandmarkId;

/// キャリブレーション失敗の分類
///
/// `InsufficientLandmarks` と `MarkerNotFound` は回復可能:
/// 呼び出し側は次フレームで再試行する。
/// `InvalidDistance` は入力自体が不正なので再試行しても無駄。
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("required landmark {0:?} is missing, low-visibility, or out of frame")]
    InsufficientLandmarks(LandmarkId),

    #[error("no fiducial marker found in frame")]
    MarkerNotFound,

    #[error("calibration distance must be positive (got {0})")]
    InvalidDistance(f64),
}

impl CalibrationError {
    /// 次フレームで再試行できるエラーか
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidDistance(_))
    }
}

/// 制御サーフェス (start/stop/reset/status) の誤用
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    #[error("a session is already running")]
    AlreadyRunning,

    #[error("no session is running")]
    NotRunning,
}

/// フレームソースのエラー。セッションループにとっては致命的。
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("frame source unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("failed to decode frame input: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(CalibrationError::MarkerNotFound.is_recoverable());
        assert!(CalibrationError::InsufficientLandmarks(LandmarkId::Nose).is_recoverable());
        assert!(!CalibrationError::InvalidDistance(0.0).is_recoverable());
    }

    #[test]
    fn test_display_messages() {
        let e = CalibrationError::InvalidDistance(-1.5);
        assert!(e.to_string().contains("-1.5"));
        assert_eq!(
            ControlError::AlreadyRunning.to_string(),
            "a session is already running"
        );
    }
}
