use crate::config::IntegrityConfig;

/// 生値とフィルタ予測の乖離チェック
///
/// カメラの揺れや手だけを素早く振り上げる等の不自然な信号を、
/// 等速度予測からの逸脱として検出する。閾値はカメラ解像度と
/// フレームレートに依存するため設定値。
#[derive(Debug, Clone, Copy)]
pub struct IntegrityMonitor {
    enabled: bool,
    threshold_px: f64,
}

impl IntegrityMonitor {
    pub fn new(enabled: bool, threshold_px: f64) -> Self {
        Self {
            enabled,
            threshold_px,
        }
    }

    pub fn from_config(config: &IntegrityConfig) -> Self {
        Self::new(config.enabled, config.threshold_px)
    }

    pub fn disabled() -> Self {
        Self::new(false, f64::MAX)
    }

    /// true = 疑わしい
    pub fn check(&self, raw: f64, predicted: f64) -> bool {
        self.enabled && (raw - predicted).abs() > self.threshold_px
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_threshold() {
        let m = IntegrityMonitor::new(true, 40.0);
        assert!(!m.check(400.0, 380.0));
        assert!(!m.check(400.0, 440.0));
    }

    #[test]
    fn test_beyond_threshold() {
        let m = IntegrityMonitor::new(true, 40.0);
        assert!(m.check(400.0, 340.0));
        assert!(m.check(340.0, 400.0));
    }

    #[test]
    fn test_disabled_never_flags() {
        let m = IntegrityMonitor::new(false, 40.0);
        assert!(!m.check(0.0, 10000.0));
        assert!(!IntegrityMonitor::disabled().check(0.0, 1e9));
    }
}
