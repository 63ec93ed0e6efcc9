//! 1計測セッションの状態と1フレーム処理。
//!
//! フィルタ・位相・カウンタはすべて `Session` が排他所有し、
//! 駆動ループから `step` に1フレームずつ渡される。
//! グローバル変数は持たない。

use std::time::Duration;

use anyhow::Result;
use log::{info, warn};
use opencv::core::Mat;
use serde::{Deserialize, Serialize};

use crate::calibration::{self, CalibrationResult, Strategy};
use crate::config::{Config, JumpConfig, ReachConfig, SitUpConfig, SquatConfig};
use crate::detect::{
    hold, metrics, ClapGate, CycleDetector, Direction, HoldMonitor, IntegrityMonitor, RepEvent,
    StandingReference,
};
use crate::filter::{Ema, Kalman1d};
use crate::pose::Frame;
use crate::sink::EventSink;

/// 対応種目
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
    VerticalJump,
    Squat,
    SitUp,
    SitAndReach,
}

impl ExerciseKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::VerticalJump => "vertical_jump",
            Self::Squat => "squat",
            Self::SitUp => "sit_up",
            Self::SitAndReach => "sit_and_reach",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "vertical_jump" => Some(Self::VerticalJump),
            "squat" => Some(Self::Squat),
            "sit_up" => Some(Self::SitUp),
            "sit_and_reach" => Some(Self::SitAndReach),
            _ => None,
        }
    }

    /// cm換算のスケールが必須の種目か
    fn needs_scale(&self) -> bool {
        matches!(self, Self::VerticalJump | Self::SitAndReach)
    }
}

/// セッション累計。明示的なreset以外では消えない
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionCounters {
    pub rep_count: u64,
    pub last_magnitude: f64,
    pub max_magnitude: f64,
}

/// ポーリング向けの状態スナップショット
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub exercise: ExerciseKind,
    pub counters: SessionCounters,
    pub message: String,
}

/// セッション開始時のパラメータ（制御サーフェス経由）
#[derive(Debug, Clone, Copy, Default)]
pub struct StartParams {
    /// 被験者の身長（cm）。設定値を上書きする
    pub subject_height_cm: Option<f64>,
}

/// 1検出セッション
pub struct Session {
    exercise: ExerciseKind,
    min_visibility: f32,
    strategy: Option<Strategy>,
    calibration: Option<CalibrationResult>,
    counters: SessionCounters,
    message: String,
    sinks: Vec<Box<dyn EventSink>>,
    state: ExerciseState,
}

enum ExerciseState {
    Jump(JumpState),
    Squat(SquatState),
    SitUp(SitUpState),
    Reach(ReachState),
}

struct JumpState {
    cfg: JumpConfig,
    clap: ClapGate,
    filter: Kalman1d,
    integrity: IntegrityMonitor,
    reference: Option<f64>,
    cycle: Option<CycleDetector>,
}

struct SquatState {
    cfg: SquatConfig,
    ema: Ema,
    standing: StandingReference,
    reference: Option<f64>,
    cycle: Option<CycleDetector>,
}

struct SitUpState {
    cfg: SitUpConfig,
    cycle: CycleDetector,
}

struct ReachState {
    cfg: ReachConfig,
    ema: Ema,
    hold: HoldMonitor,
}

impl Session {
    pub fn new(exercise: ExerciseKind, config: &Config, params: StartParams) -> Result<Self> {
        let mut cal_cfg = config.calibration.clone();
        if let Some(height) = params.subject_height_cm {
            cal_cfg.subject_height_cm = height;
        }

        // スケール不要な種目は設定に関わらずキャリブレーションを行わない
        let strategy = if exercise.needs_scale() {
            let strategy = Strategy::from_config(&cal_cfg)?;
            if strategy.is_none() {
                anyhow::bail!(
                    "exercise {} requires a calibration strategy",
                    exercise.name()
                );
            }
            strategy
        } else {
            None
        };

        // 手動2点は即時確定。不正な距離はここで拒否され、セッションは始まらない
        let mut latched = None;
        if let Some(Strategy::ManualTwoPoint {
            point_a,
            point_b,
            distance_cm,
        }) = &strategy
        {
            latched = Some(calibration::manual_two_point(
                *point_a,
                *point_b,
                *distance_cm,
            )?);
        }
        if let Some(Strategy::Anthropometric { subject_height_cm }) = &strategy {
            if *subject_height_cm <= 0.0 {
                anyhow::bail!("subject height must be positive (got {})", subject_height_cm);
            }
        }

        let state = match exercise {
            ExerciseKind::VerticalJump => ExerciseState::Jump(JumpState {
                cfg: config.jump.clone(),
                clap: ClapGate::new(config.jump.clap_distance_px, config.jump.clap_frames),
                filter: Kalman1d::from_config(&config.filter),
                integrity: IntegrityMonitor::from_config(&config.integrity),
                reference: None,
                cycle: None,
            }),
            ExerciseKind::Squat => ExerciseState::Squat(SquatState {
                cfg: config.squat.clone(),
                ema: Ema::new(config.squat.smooth_alpha),
                standing: StandingReference::new(
                    config.squat.stable_readings,
                    config.squat.stable_tolerance_deg,
                ),
                reference: None,
                cycle: None,
            }),
            ExerciseKind::SitUp => ExerciseState::SitUp(SitUpState {
                cycle: CycleDetector::new(
                    config.situp.up_angle_deg,
                    config.situp.down_angle_deg,
                    Direction::Falling,
                    Duration::from_secs_f64(config.situp.cooldown_s),
                ),
                cfg: config.situp.clone(),
            }),
            ExerciseKind::SitAndReach => ExerciseState::Reach(ReachState {
                cfg: config.reach.clone(),
                ema: Ema::new(config.reach.smooth_alpha),
                hold: HoldMonitor::from_config(&config.reach),
            }),
        };

        Ok(Self {
            exercise,
            min_visibility: cal_cfg.min_visibility,
            strategy,
            calibration: latched,
            counters: SessionCounters::default(),
            message: initial_message(exercise).to_string(),
            sinks: Vec::new(),
            state,
        })
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn exercise(&self) -> ExerciseKind {
        self.exercise
    }

    pub fn counters(&self) -> SessionCounters {
        self.counters
    }

    pub fn is_calibrated(&self) -> bool {
        self.strategy.is_none() || self.calibration.is_some()
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    pub fn snapshot(&self, running: bool) -> StatusSnapshot {
        StatusSnapshot {
            running,
            exercise: self.exercise,
            counters: self.counters,
            message: self.message.clone(),
        }
    }

    /// 1フレーム処理。イベントは1ステップにつき高々1つ。
    ///
    /// `image` はfiducialキャリブレーション用で、確定後は参照されない。
    pub fn step(&mut self, frame: &Frame, image: Option<&Mat>) -> Option<RepEvent> {
        if self.calibration.is_none() {
            if let Some(strategy) = self.strategy.clone() {
                match calibration::calibrate(frame, image, &strategy, self.min_visibility) {
                    Ok(result) => {
                        info!(
                            "calibration latched: {:.3} px/cm ({})",
                            result.pixels_per_cm,
                            self.exercise.name()
                        );
                        self.calibration = Some(result);
                        self.message = post_calibration_message(self.exercise).to_string();
                    }
                    Err(e) => {
                        if !e.is_recoverable() {
                            warn!("calibration cannot proceed: {e}");
                        }
                        self.message = calibration_hint(&strategy).to_string();
                        return None;
                    }
                }
                // キャリブレーションが確定したフレームは計測に使わない
                return None;
            }
        }

        let outcome = match &mut self.state {
            ExerciseState::Jump(s) => Self::step_jump(
                s,
                frame,
                self.calibration.as_ref(),
                self.min_visibility,
                &mut self.message,
            ),
            ExerciseState::Squat(s) => {
                Self::step_squat(s, frame, self.min_visibility, &mut self.message)
            }
            ExerciseState::SitUp(s) => {
                Self::step_situp(s, frame, self.min_visibility, &mut self.message)
            }
            ExerciseState::Reach(s) => Self::step_reach(
                s,
                frame,
                self.calibration.as_ref(),
                &self.counters,
                self.min_visibility,
                &mut self.message,
            ),
        };

        if let Some(event) = outcome {
            self.record(&event);
            return Some(event);
        }
        None
    }

    /// カウンタのみを初期化する。位相・基準値・キャリブレーションは保つ
    pub fn reset(&mut self) {
        self.counters = SessionCounters::default();
        self.message = "Reset complete".to_string();
    }

    /// セッション終了時。シンクをフラッシュする
    pub fn finalize(&mut self) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.finish() {
                warn!("event sink flush failed: {e:#}");
            }
        }
    }

    fn record(&mut self, event: &RepEvent) {
        self.counters.rep_count += 1;
        self.counters.last_magnitude = event.magnitude;
        if event.magnitude > self.counters.max_magnitude {
            self.counters.max_magnitude = event.magnitude;
        }
        info!(
            "{} rep #{}: {:.2}{}",
            self.exercise.name(),
            self.counters.rep_count,
            event.magnitude,
            if event.suspect { " [suspect]" } else { "" }
        );
        for sink in &mut self.sinks {
            if let Err(e) = sink.emit(event) {
                warn!("event sink failed: {e:#}");
            }
        }
    }

    fn step_jump(
        s: &mut JumpState,
        frame: &Frame,
        cal: Option<&CalibrationResult>,
        min_visibility: f32,
        message: &mut String,
    ) -> Option<RepEvent> {
        let cal = cal?;
        match s.reference {
            None => {
                let (Some(gap), Some(wrist_y)) = (
                    metrics::wrist_gap_px(frame, min_visibility),
                    metrics::wrist_height_px(frame, min_visibility),
                ) else {
                    return None;
                };
                if let Some(reference) = s.clap.observe(gap, wrist_y) {
                    let trigger = reference - s.cfg.trigger_offset_px;
                    s.filter.seed(reference);
                    s.cycle = Some(CycleDetector::new(
                        trigger,
                        trigger,
                        Direction::Falling,
                        Duration::from_secs_f64(s.cfg.cooldown_s),
                    ));
                    s.reference = Some(reference);
                    info!("standing reach set at y={reference:.1} px");
                    *message = "Setup complete! Start jumping.".to_string();
                } else if s.clap.streak() == 0 {
                    *message = "Join (clap) your hands to start.".to_string();
                }
                None
            }
            Some(reference) => {
                let Some(raw) = metrics::wrist_height_px(frame, min_visibility) else {
                    // 計測欠損: 状態だけ進めて不確かさを広げる
                    s.filter.coast();
                    return None;
                };
                let predicted = s.filter.predict();
                s.filter.correct(raw);
                let suspect = s.integrity.check(raw, predicted);

                let cycle = s.cycle.as_mut()?.advance(raw, frame.timestamp, suspect)?;
                let magnitude = cal.to_cm(reference - cycle.extreme);
                *message = format!("Jump detected! Height: {magnitude:.2} cm");
                Some(RepEvent {
                    timestamp: cycle.completed_at,
                    magnitude,
                    suspect: cycle.suspect,
                })
            }
        }
    }

    fn step_squat(
        s: &mut SquatState,
        frame: &Frame,
        min_visibility: f32,
        message: &mut String,
    ) -> Option<RepEvent> {
        let angle = metrics::leg_angle_deg(&frame.pose, min_visibility)?;
        let smoothed = s.ema.apply(angle);
        match s.reference {
            None => {
                if let Some(reference) = s.standing.observe(smoothed) {
                    s.cycle = Some(CycleDetector::new(
                        reference * s.cfg.depth_fraction,
                        reference * s.cfg.lockout_fraction,
                        Direction::Falling,
                        Duration::from_secs_f64(s.cfg.cooldown_s),
                    ));
                    s.reference = Some(reference);
                    info!("standing reference angle {reference:.1} deg");
                    *message = "Calibration complete. Start squatting!".to_string();
                } else {
                    *message = "Calibrating... Please stand straight".to_string();
                }
                None
            }
            Some(reference) => {
                let cycle = s
                    .cycle
                    .as_mut()?
                    .advance(smoothed, frame.timestamp, false)?;
                let magnitude = reference - cycle.extreme;
                *message = format!("Squat completed! Depth {magnitude:.1} deg");
                Some(RepEvent {
                    timestamp: cycle.completed_at,
                    magnitude,
                    suspect: cycle.suspect,
                })
            }
        }
    }

    fn step_situp(
        s: &mut SitUpState,
        frame: &Frame,
        min_visibility: f32,
        message: &mut String,
    ) -> Option<RepEvent> {
        let pose = &frame.pose;
        // 手が頭の後ろにない間は評価しない
        if !metrics::hands_behind_head(pose, min_visibility)? {
            return None;
        }
        let angle = metrics::torso_angle_deg(pose, min_visibility)?;
        let shoulder_y = metrics::shoulder_height_norm(pose, min_visibility)?;

        let enter_ok = shoulder_y < s.cfg.shoulder_up_y;
        let exit_ok = shoulder_y > s.cfg.shoulder_ground_y;
        let cycle = s
            .cycle
            .advance_gated(angle, frame.timestamp, false, enter_ok, exit_ok)?;
        let magnitude = s.cfg.down_angle_deg - cycle.extreme;
        *message = format!("Rep completed! Crunch {magnitude:.1} deg");
        Some(RepEvent {
            timestamp: cycle.completed_at,
            magnitude,
            suspect: cycle.suspect,
        })
    }

    fn step_reach(
        s: &mut ReachState,
        frame: &Frame,
        cal: Option<&CalibrationResult>,
        counters: &SessionCounters,
        min_visibility: f32,
        message: &mut String,
    ) -> Option<RepEvent> {
        let cal = cal?;
        // ランドマーク欠損フレームはホールドを保ったまま読み飛ばす
        let check = hold::evaluate(&frame.pose, &s.cfg, min_visibility)?;
        let raw_reach = metrics::reach_px(frame, min_visibility)?;

        let smoothed = s.ema.apply(raw_reach);
        *message = format!("Current reach: {:.1} cm", cal.to_cm(smoothed));

        let candidate = s.hold.observe(check.all(), raw_reach)?;
        let reach_cm = cal.to_cm(candidate);
        if reach_cm > counters.max_magnitude {
            *message = format!("New max reach: {reach_cm:.1} cm");
            Some(RepEvent {
                timestamp: frame.timestamp,
                magnitude: reach_cm,
                suspect: false,
            })
        } else {
            None
        }
    }
}

fn initial_message(exercise: ExerciseKind) -> &'static str {
    match exercise {
        ExerciseKind::VerticalJump => "Step 1: Adjust camera so full body is visible.",
        ExerciseKind::Squat => "Calibrating... Please stand straight",
        ExerciseKind::SitUp => "Sit-up detection started",
        ExerciseKind::SitAndReach => "Waiting for calibration",
    }
}

fn post_calibration_message(exercise: ExerciseKind) -> &'static str {
    match exercise {
        ExerciseKind::VerticalJump => "Join (clap) your hands to start.",
        ExerciseKind::SitAndReach => "Calibration complete. Sit and reach forward.",
        _ => "Calibration complete.",
    }
}

fn calibration_hint(strategy: &Strategy) -> &'static str {
    match strategy {
        Strategy::Anthropometric { .. } => "Ensure full body & ground is visible.",
        Strategy::Fiducial(_) => "Show the calibration marker to the camera",
        Strategy::ManualTwoPoint { .. } => "Waiting for manual calibration",
    }
}
