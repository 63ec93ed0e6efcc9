//! セッション駆動ループと制御サーフェス。
//!
//! 1セッション = 1ワーカースレッド上の逐次ループ。停止は協調的で、
//! 次のイテレーション先頭でフラグを観測してから抜けるため、
//! 処理中のフレームは必ず完了する。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use log::{info, warn};
use opencv::core::Mat;

use crate::error::{ControlError, SourceError};
use crate::pose::Frame;
use crate::session::{Session, StatusSnapshot};

/// 1フレーム分の入力。画像はfiducialキャリブレーション時のみ使われる
pub struct FrameInput {
    pub frame: Frame,
    pub image: Option<Mat>,
}

impl FrameInput {
    pub fn keypoints_only(frame: Frame) -> Self {
        Self { frame, image: None }
    }
}

/// フレーム供給元（キャプチャ/姿勢推定コラボレータ側の抽象）
///
/// `Ok(None)` はストリーム終端。エラーはセッションにとって致命的。
pub trait FrameSource: Send {
    fn next_input(&mut self) -> Result<Option<FrameInput>, SourceError>;
}

struct Shared {
    stop: AtomicBool,
    reset_requested: AtomicBool,
    running: AtomicBool,
    status: Mutex<Option<StatusSnapshot>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// start / stop / reset / status の制御サーフェス
///
/// 同一Controllerに対する二重startは `AlreadyRunning` で拒否される
/// （状態は変わらない）。FilterState・PhaseState・カウンタは
/// ループスレッドが排他所有し、resetもループ経由で適用される。
pub struct Controller {
    shared: Arc<Shared>,
}

impl Controller {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                stop: AtomicBool::new(false),
                reset_requested: AtomicBool::new(false),
                running: AtomicBool::new(false),
                status: Mutex::new(None),
                handle: Mutex::new(None),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// セッションループを開始する
    pub fn start<S: FrameSource + 'static>(
        &self,
        mut session: Session,
        mut source: S,
    ) -> Result<(), ControlError> {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return Err(ControlError::AlreadyRunning);
        }
        self.shared.stop.store(false, Ordering::Release);
        self.shared.reset_requested.store(false, Ordering::Release);

        let shared = self.shared.clone();
        info!("session started: {}", session.exercise().name());
        let handle = std::thread::spawn(move || {
            loop {
                // 停止フラグはイテレーション先頭で観測する
                if shared.stop.load(Ordering::Acquire) {
                    session.set_message("Detection stopped.");
                    break;
                }
                if shared.reset_requested.swap(false, Ordering::AcqRel) {
                    session.reset();
                }
                match source.next_input() {
                    Ok(Some(input)) => {
                        session.step(&input.frame, input.image.as_ref());
                    }
                    Ok(None) => {
                        session.set_message("End of stream.");
                        break;
                    }
                    Err(e) => {
                        warn!("frame source failed: {e}");
                        session.set_message(format!("ERROR: {e}"));
                        break;
                    }
                }
                *shared.status.lock().unwrap() = Some(session.snapshot(true));
            }
            session.finalize();
            *shared.status.lock().unwrap() = Some(session.snapshot(false));
            shared.running.store(false, Ordering::Release);
        });
        *self.shared.handle.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// 停止を要求し、ループの終了を待つ
    pub fn stop(&self) -> Result<(), ControlError> {
        if !self.is_running() {
            return Err(ControlError::NotRunning);
        }
        self.shared.stop.store(true, Ordering::Release);
        self.join();
        Ok(())
    }

    /// カウンタをゼロに戻す。何度呼んでも同じ結果になる
    pub fn reset(&self) {
        if self.is_running() {
            self.shared.reset_requested.store(true, Ordering::Release);
        } else if let Some(status) = self.shared.status.lock().unwrap().as_mut() {
            status.counters = Default::default();
            status.message = "Reset complete".to_string();
        }
    }

    /// 最新のスナップショット。ループが一度も回っていなければNone
    pub fn status(&self) -> Option<StatusSnapshot> {
        self.shared.status.lock().unwrap().clone()
    }

    /// ループ終了まで待つ（ストリーム終端まで流し切る用途）
    pub fn join(&self) {
        let handle = self.shared.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pose::{Keypoint, LandmarkId, Pose};
    use crate::session::{ExerciseKind, StartParams};
    use std::time::Duration;

    /// スクワット1往復分の合成フレーム列を流すソース
    struct TraceSource {
        frames: Vec<Frame>,
        index: usize,
        /// Noneを返さずブロックし続ける代わりに停止を待つ用途
        hold_at_end: bool,
    }

    impl FrameSource for TraceSource {
        fn next_input(&mut self) -> Result<Option<FrameInput>, SourceError> {
            if self.index >= self.frames.len() {
                if self.hold_at_end {
                    std::thread::sleep(Duration::from_millis(5));
                    let last = self.frames.last().cloned();
                    return Ok(last.map(FrameInput::keypoints_only));
                }
                return Ok(None);
            }
            let frame = self.frames[self.index].clone();
            self.index += 1;
            Ok(Some(FrameInput::keypoints_only(frame)))
        }
    }

    struct FailingSource;

    impl FrameSource for FailingSource {
        fn next_input(&mut self) -> Result<Option<FrameInput>, SourceError> {
            Err(SourceError::ResourceUnavailable("camera 0".to_string()))
        }
    }

    fn squat_frame(angle_deg: f64, t_ms: u64) -> Frame {
        let mut pose = Pose::default();
        let knee = (0.5f32, 0.5f32);
        let rad = angle_deg.to_radians();
        pose.set(LandmarkId::LeftHip, Keypoint::new(0.5, 0.3, 0.9));
        pose.set(LandmarkId::LeftKnee, Keypoint::new(knee.0, knee.1, 0.9));
        pose.set(
            LandmarkId::LeftAnkle,
            Keypoint::new(
                knee.0 + 0.2 * rad.sin() as f32,
                knee.1 - 0.2 * rad.cos() as f32,
                0.9,
            ),
        );
        Frame::new(1280, 720, Duration::from_millis(t_ms), pose)
    }

    fn squat_trace() -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut t = 0;
        for _ in 0..8 {
            frames.push(squat_frame(170.0, t));
            t += 33;
        }
        for _ in 0..30 {
            frames.push(squat_frame(120.0, t));
            t += 33;
        }
        for _ in 0..60 {
            frames.push(squat_frame(162.0, t));
            t += 33;
        }
        frames
    }

    fn squat_session() -> Session {
        Session::new(ExerciseKind::Squat, &Config::default(), StartParams::default()).unwrap()
    }

    #[test]
    fn test_run_to_end_of_stream() {
        let controller = Controller::new();
        let source = TraceSource {
            frames: squat_trace(),
            index: 0,
            hold_at_end: false,
        };
        controller.start(squat_session(), source).unwrap();
        controller.join();

        let status = controller.status().unwrap();
        assert!(!status.running);
        assert_eq!(status.counters.rep_count, 1);
        assert_eq!(status.message, "End of stream.");
    }

    #[test]
    fn test_double_start_rejected() {
        let controller = Controller::new();
        let source = TraceSource {
            frames: squat_trace(),
            index: 0,
            hold_at_end: true,
        };
        controller.start(squat_session(), source).unwrap();

        let second = TraceSource {
            frames: Vec::new(),
            index: 0,
            hold_at_end: false,
        };
        assert_eq!(
            controller.start(squat_session(), second).unwrap_err(),
            ControlError::AlreadyRunning
        );

        controller.stop().unwrap();
        assert!(!controller.is_running());
    }

    #[test]
    fn test_stop_without_start() {
        let controller = Controller::new();
        assert_eq!(controller.stop().unwrap_err(), ControlError::NotRunning);
    }

    #[test]
    fn test_source_failure_is_fatal_but_reported() {
        let controller = Controller::new();
        controller.start(squat_session(), FailingSource).unwrap();
        controller.join();

        let status = controller.status().unwrap();
        assert!(!status.running);
        assert!(status.message.starts_with("ERROR:"), "{}", status.message);
    }

    #[test]
    fn test_reset_when_idle_is_idempotent() {
        let controller = Controller::new();
        let source = TraceSource {
            frames: squat_trace(),
            index: 0,
            hold_at_end: false,
        };
        controller.start(squat_session(), source).unwrap();
        controller.join();
        assert_eq!(controller.status().unwrap().counters.rep_count, 1);

        controller.reset();
        assert_eq!(controller.status().unwrap().counters.rep_count, 0);
        controller.reset();
        assert_eq!(controller.status().unwrap().counters.rep_count, 0);
    }
}
