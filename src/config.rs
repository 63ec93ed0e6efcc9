use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub integrity: IntegrityConfig,
    #[serde(default)]
    pub jump: JumpConfig,
    #[serde(default)]
    pub squat: SquatConfig,
    #[serde(default)]
    pub situp: SitUpConfig,
    #[serde(default)]
    pub reach: ReachConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CalibrationConfig {
    /// スケール取得方法 ("anthropometric" | "fiducial" | "manual" | "none")
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// 被験者の身長（cm）。anthropometric用
    #[serde(default = "default_subject_height")]
    pub subject_height_cm: f64,
    /// ランドマーク可視度の下限
    #[serde(default = "default_min_visibility")]
    pub min_visibility: f32,
    #[serde(default)]
    pub marker: MarkerConfig,
    #[serde(default)]
    pub manual: ManualConfig,
}

fn default_strategy() -> String { "anthropometric".to_string() }
fn default_subject_height() -> f64 { 170.0 }
fn default_min_visibility() -> f32 { 0.5 }

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            subject_height_cm: default_subject_height(),
            min_visibility: default_min_visibility(),
            marker: MarkerConfig::default(),
            manual: ManualConfig::default(),
        }
    }
}

/// 平面マーカー（A4用紙など）の実寸と検出フィルタ
#[derive(Debug, Deserialize, Clone)]
pub struct MarkerConfig {
    #[serde(default = "default_long_edge")]
    pub long_edge_cm: f64,
    #[serde(default = "default_short_edge")]
    pub short_edge_cm: f64,
    /// 候補矩形の最小面積（px^2）
    #[serde(default = "default_min_area")]
    pub min_area_px: f64,
    /// アスペクト比の許容帯（A4の真値は約1.41）
    #[serde(default = "default_aspect_min")]
    pub aspect_min: f64,
    #[serde(default = "default_aspect_max")]
    pub aspect_max: f64,
}

fn default_long_edge() -> f64 { 29.7 }
fn default_short_edge() -> f64 { 21.0 }
fn default_min_area() -> f64 { 10000.0 }
fn default_aspect_min() -> f64 { 1.2 }
fn default_aspect_max() -> f64 { 1.8 }

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            long_edge_cm: default_long_edge(),
            short_edge_cm: default_short_edge(),
            min_area_px: default_min_area(),
            aspect_min: default_aspect_min(),
            aspect_max: default_aspect_max(),
        }
    }
}

/// 手動2点キャリブレーションの入力（ピクセル座標と実距離）
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ManualConfig {
    #[serde(default)]
    pub point_a: [f64; 2],
    #[serde(default)]
    pub point_b: [f64; 2],
    #[serde(default)]
    pub distance_cm: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    #[serde(default = "default_process_noise")]
    pub process_noise: f64,
    #[serde(default = "default_measurement_noise")]
    pub measurement_noise: f64,
}

fn default_process_noise() -> f64 { 1e-4 }
fn default_measurement_noise() -> f64 { 1e-2 }

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            process_noise: default_process_noise(),
            measurement_noise: default_measurement_noise(),
        }
    }
}

/// 生値とフィルタ予測の乖離によるチート検出
#[derive(Debug, Deserialize, Clone)]
pub struct IntegrityConfig {
    #[serde(default = "default_integrity_enabled")]
    pub enabled: bool,
    #[serde(default = "default_integrity_threshold")]
    pub threshold_px: f64,
}

fn default_integrity_enabled() -> bool { true }
fn default_integrity_threshold() -> f64 { 40.0 }

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            enabled: default_integrity_enabled(),
            threshold_px: default_integrity_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct JumpConfig {
    /// 基準リーチからこのピクセル数上がったら空中とみなす
    #[serde(default = "default_trigger_offset")]
    pub trigger_offset_px: f64,
    #[serde(default = "default_jump_cooldown")]
    pub cooldown_s: f64,
    /// クラップ判定の手首間距離（px）
    #[serde(default = "default_clap_distance")]
    pub clap_distance_px: f64,
    /// クラップ維持フレーム数
    #[serde(default = "default_clap_frames")]
    pub clap_frames: u32,
}

fn default_trigger_offset() -> f64 { 30.0 }
fn default_jump_cooldown() -> f64 { 1.0 }
fn default_clap_distance() -> f64 { 60.0 }
fn default_clap_frames() -> u32 { 5 }

impl Default for JumpConfig {
    fn default() -> Self {
        Self {
            trigger_offset_px: default_trigger_offset(),
            cooldown_s: default_jump_cooldown(),
            clap_distance_px: default_clap_distance(),
            clap_frames: default_clap_frames(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SquatConfig {
    /// 立位基準角に対するしゃがみ込み閾値の割合
    #[serde(default = "default_depth_fraction")]
    pub depth_fraction: f64,
    /// 立位復帰閾値の割合
    #[serde(default = "default_lockout_fraction")]
    pub lockout_fraction: f64,
    #[serde(default = "default_squat_cooldown")]
    pub cooldown_s: f64,
    /// 角度平滑化のEMA係数
    #[serde(default = "default_squat_alpha")]
    pub smooth_alpha: f64,
    /// 立位基準の安定判定に使う読み数
    #[serde(default = "default_stable_readings")]
    pub stable_readings: usize,
    /// 安定判定の角度ばらつき許容（度）
    #[serde(default = "default_stable_tolerance")]
    pub stable_tolerance_deg: f64,
}

fn default_depth_fraction() -> f64 { 0.75 }
fn default_lockout_fraction() -> f64 { 0.95 }
fn default_squat_cooldown() -> f64 { 0.5 }
fn default_squat_alpha() -> f64 { 0.4 }
fn default_stable_readings() -> usize { 5 }
fn default_stable_tolerance() -> f64 { 5.0 }

impl Default for SquatConfig {
    fn default() -> Self {
        Self {
            depth_fraction: default_depth_fraction(),
            lockout_fraction: default_lockout_fraction(),
            cooldown_s: default_squat_cooldown(),
            smooth_alpha: default_squat_alpha(),
            stable_readings: default_stable_readings(),
            stable_tolerance_deg: default_stable_tolerance(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SitUpConfig {
    /// 上体角がこの角度を下回ったら起き上がり
    #[serde(default = "default_up_angle")]
    pub up_angle_deg: f64,
    /// この角度を上回ったら寝た状態に戻った
    #[serde(default = "default_down_angle")]
    pub down_angle_deg: f64,
    /// 肩Y（正規化）: 起き上がり判定の上限
    #[serde(default = "default_shoulder_up_y")]
    pub shoulder_up_y: f64,
    /// 肩Y（正規化）: 接地判定の下限
    #[serde(default = "default_shoulder_ground_y")]
    pub shoulder_ground_y: f64,
    #[serde(default = "default_situp_cooldown")]
    pub cooldown_s: f64,
}

fn default_up_angle() -> f64 { 100.0 }
fn default_down_angle() -> f64 { 160.0 }
fn default_shoulder_up_y() -> f64 { 0.6 }
fn default_shoulder_ground_y() -> f64 { 0.85 }
fn default_situp_cooldown() -> f64 { 0.5 }

impl Default for SitUpConfig {
    fn default() -> Self {
        Self {
            up_angle_deg: default_up_angle(),
            down_angle_deg: default_down_angle(),
            shoulder_up_y: default_shoulder_up_y(),
            shoulder_ground_y: default_shoulder_ground_y(),
            cooldown_s: default_situp_cooldown(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReachConfig {
    /// 膝が伸びているとみなす角度の下限（度）
    #[serde(default = "default_knee_lock")]
    pub knee_lock_deg: f64,
    /// 足首間隔の許容（正規化X差）
    #[serde(default = "default_ankle_tolerance")]
    pub ankle_tolerance: f64,
    /// 腰-足首の縦差の許容（正規化Y差）
    #[serde(default = "default_hip_tolerance")]
    pub hip_tolerance: f64,
    /// 両手首の縦ずれ許容（正規化Y差）
    #[serde(default = "default_wrist_tolerance")]
    pub wrist_tolerance: f64,
    /// 計測成立に必要な連続ホールドフレーム数
    #[serde(default = "default_hold_frames")]
    pub hold_frames: u32,
    /// ホールド中のリーチ変動許容（px）
    #[serde(default = "default_drift_tolerance")]
    pub drift_tolerance_px: f64,
    /// 表示用リーチのEMA係数
    #[serde(default = "default_reach_alpha")]
    pub smooth_alpha: f64,
}

fn default_knee_lock() -> f64 { 165.0 }
fn default_ankle_tolerance() -> f64 { 0.05 }
fn default_hip_tolerance() -> f64 { 0.05 }
fn default_wrist_tolerance() -> f64 { 0.05 }
fn default_hold_frames() -> u32 { 30 }
fn default_drift_tolerance() -> f64 { 10.0 }
fn default_reach_alpha() -> f64 { 0.6 }

impl Default for ReachConfig {
    fn default() -> Self {
        Self {
            knee_lock_deg: default_knee_lock(),
            ankle_tolerance: default_ankle_tolerance(),
            hip_tolerance: default_hip_tolerance(),
            wrist_tolerance: default_wrist_tolerance(),
            hold_frames: default_hold_frames(),
            drift_tolerance_px: default_drift_tolerance(),
            smooth_alpha: default_reach_alpha(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// 結果CSVの出力先。セッション開始時に切り詰める
    #[serde(default = "default_csv_path")]
    pub csv_path: String,
    #[serde(default = "default_csv_enabled")]
    pub csv_enabled: bool,
}

fn default_csv_path() -> String { "rep_results.csv".to_string() }
fn default_csv_enabled() -> bool { true }

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: default_csv_path(),
            csv_enabled: default_csv_enabled(),
        }
    }
}

/// イベントごとのOSC通知（fire-and-forget）
#[derive(Debug, Deserialize, Clone)]
pub struct NotifyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_notify_addr")]
    pub addr: String,
}

fn default_notify_addr() -> String { "127.0.0.1:39600".to_string() }

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_notify_addr(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String { "0.0.0.0:9100".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// ファイルがなければデフォルト設定で続行する
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(_) => Config::default(),
        }
    }
}
