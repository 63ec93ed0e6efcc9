use std::time::Duration;

/// レップ検出の位相
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Resting,
    Active,
}

/// メトリクスが「力発揮」でどちらへ動くか
///
/// Falling: 値が下がる方向が力発揮（手首Y・膝角度・上体角度はすべてこれ）。
/// Rising はその鏡像。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Falling,
    Rising,
}

/// 閾値・ヒステリシス・クールダウン付きの汎用レップ状態機械
///
/// Resting→Active: メトリクスが enter 閾値を超え、前回サイクル完了から
/// クールダウンが経過し、そのフレームが suspect でないこと。
/// Active→Resting: exit 閾値を逆方向に超えた時点でサイクルを1つ返す。
/// enter と exit を分けることで境界付近のチャタリングを防ぐ。
#[derive(Debug, Clone)]
pub struct CycleDetector {
    enter: f64,
    exit: f64,
    direction: Direction,
    cooldown: Duration,
    phase: Phase,
    extreme: f64,
    entered_at: Duration,
    suspect_seen: bool,
    last_completed: Option<Duration>,
}

/// 完了した1サイクルの要約
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletedCycle {
    /// Active中に到達した極値（Fallingなら最小値）
    pub extreme: f64,
    pub entered_at: Duration,
    pub completed_at: Duration,
    /// Active中にインテグリティ警告があったか
    pub suspect: bool,
}

impl CycleDetector {
    pub fn new(enter: f64, exit: f64, direction: Direction, cooldown: Duration) -> Self {
        Self {
            enter,
            exit,
            direction,
            cooldown,
            phase: Phase::Resting,
            extreme: 0.0,
            entered_at: Duration::ZERO,
            suspect_seen: false,
            last_completed: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// 閾値ゲートなしの通常版
    pub fn advance(&mut self, metric: f64, now: Duration, suspect: bool) -> Option<CompletedCycle> {
        self.advance_gated(metric, now, suspect, true, true)
    }

    /// 補助ゲート付き。enter_ok / exit_ok が偽の間は該当遷移を抑止する。
    pub fn advance_gated(
        &mut self,
        metric: f64,
        now: Duration,
        suspect: bool,
        enter_ok: bool,
        exit_ok: bool,
    ) -> Option<CompletedCycle> {
        match self.phase {
            Phase::Resting => {
                if self.crossed_enter(metric)
                    && enter_ok
                    && self.cooldown_elapsed(now)
                    && !suspect
                {
                    self.phase = Phase::Active;
                    self.extreme = metric;
                    self.entered_at = now;
                    self.suspect_seen = false;
                }
                None
            }
            Phase::Active => {
                self.extreme = match self.direction {
                    Direction::Falling => self.extreme.min(metric),
                    Direction::Rising => self.extreme.max(metric),
                };
                if suspect {
                    self.suspect_seen = true;
                }
                if self.crossed_exit(metric) && exit_ok {
                    self.phase = Phase::Resting;
                    self.last_completed = Some(now);
                    return Some(CompletedCycle {
                        extreme: self.extreme,
                        entered_at: self.entered_at,
                        completed_at: now,
                        suspect: self.suspect_seen,
                    });
                }
                None
            }
        }
    }

    pub fn reset(&mut self) {
        self.phase = Phase::Resting;
        self.extreme = 0.0;
        self.suspect_seen = false;
        self.last_completed = None;
    }

    fn crossed_enter(&self, metric: f64) -> bool {
        match self.direction {
            Direction::Falling => metric < self.enter,
            Direction::Rising => metric > self.enter,
        }
    }

    fn crossed_exit(&self, metric: f64) -> bool {
        match self.direction {
            Direction::Falling => metric >= self.exit,
            Direction::Rising => metric <= self.exit,
        }
    }

    fn cooldown_elapsed(&self, now: Duration) -> bool {
        match self.last_completed {
            Some(t) => now.saturating_sub(t) >= self.cooldown,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sec(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn ms(m: u64) -> Duration {
        Duration::from_millis(m)
    }

    fn jump_detector() -> CycleDetector {
        // 基準400px、閾値370px、クールダウン1秒
        CycleDetector::new(370.0, 370.0, Direction::Falling, sec(1))
    }

    #[test]
    fn test_full_cycle_emits_once() {
        let mut d = jump_detector();
        assert!(d.advance(400.0, ms(0), false).is_none());
        assert!(d.advance(250.0, ms(33), false).is_none());
        assert_eq!(d.phase(), Phase::Active);
        assert!(d.advance(240.0, ms(66), false).is_none());
        assert!(d.advance(260.0, ms(100), false).is_none());
        let cycle = d.advance(405.0, ms(133), false).unwrap();
        assert_eq!(cycle.extreme, 240.0);
        assert!(!cycle.suspect);
        assert_eq!(d.phase(), Phase::Resting);
    }

    #[test]
    fn test_no_double_emission_per_episode() {
        let mut d = jump_detector();
        d.advance(250.0, ms(0), false);
        // Active中に閾値の上下を行き来しても完了は一度だけ
        assert!(d.advance(300.0, ms(33), false).is_none());
        assert!(d.advance(405.0, ms(66), false).is_some());
        // Resting復帰後、同じ値ではもう発火しない
        assert!(d.advance(405.0, ms(100), false).is_none());
    }

    #[test]
    fn test_cooldown_blocks_reentry() {
        let mut d = jump_detector();
        d.advance(250.0, ms(0), false);
        assert!(d.advance(405.0, ms(100), false).is_some());
        // 完了から1秒経っていないので再突入できない
        d.advance(250.0, ms(500), false);
        assert_eq!(d.phase(), Phase::Resting);
        assert!(d.advance(405.0, ms(600), false).is_none());
        // 1秒経過後は再突入できる
        d.advance(250.0, ms(1200), false);
        assert_eq!(d.phase(), Phase::Active);
        assert!(d.advance(405.0, ms(1300), false).is_some());
    }

    #[test]
    fn test_suspect_edge_suppresses_entry() {
        let mut d = jump_detector();
        d.advance(250.0, ms(0), true);
        assert_eq!(d.phase(), Phase::Resting);
        // クリーンなエッジが来れば入れる
        d.advance(250.0, ms(33), false);
        assert_eq!(d.phase(), Phase::Active);
    }

    #[test]
    fn test_suspect_mid_cycle_marks_event() {
        let mut d = jump_detector();
        d.advance(250.0, ms(0), false);
        d.advance(240.0, ms(33), true); // 空中でフラグ
        let cycle = d.advance(405.0, ms(66), false).unwrap();
        assert!(cycle.suspect);

        // 次のサイクルはクリーンに戻る
        d.advance(250.0, ms(1100), false);
        let cycle = d.advance(405.0, ms(1200), false).unwrap();
        assert!(!cycle.suspect);
    }

    #[test]
    fn test_hysteresis_no_chatter() {
        // enter 127.5 / exit 161.5 のスクワット型
        let mut d = CycleDetector::new(127.5, 161.5, Direction::Falling, Duration::ZERO);
        d.advance(120.0, ms(0), false);
        assert_eq!(d.phase(), Phase::Active);
        // 127.5と161.5の間をうろついても遷移しない
        assert!(d.advance(140.0, ms(33), false).is_none());
        assert!(d.advance(130.0, ms(66), false).is_none());
        assert_eq!(d.phase(), Phase::Active);
        assert!(d.advance(162.0, ms(100), false).is_some());
    }

    #[test]
    fn test_rising_direction_mirrors() {
        let mut d = CycleDetector::new(100.0, 50.0, Direction::Rising, Duration::ZERO);
        assert!(d.advance(120.0, ms(0), false).is_none());
        assert_eq!(d.phase(), Phase::Active);
        d.advance(150.0, ms(33), false);
        let cycle = d.advance(40.0, ms(66), false).unwrap();
        assert_eq!(cycle.extreme, 150.0);
    }

    #[test]
    fn test_enter_gate_blocks() {
        let mut d = CycleDetector::new(100.0, 160.0, Direction::Falling, Duration::ZERO);
        d.advance_gated(90.0, ms(0), false, false, true);
        assert_eq!(d.phase(), Phase::Resting);
        d.advance_gated(90.0, ms(33), false, true, true);
        assert_eq!(d.phase(), Phase::Active);
    }

    #[test]
    fn test_exit_gate_blocks() {
        let mut d = CycleDetector::new(100.0, 160.0, Direction::Falling, Duration::ZERO);
        d.advance(90.0, ms(0), false);
        assert!(d.advance_gated(165.0, ms(33), false, true, false).is_none());
        assert_eq!(d.phase(), Phase::Active);
        assert!(d.advance_gated(165.0, ms(66), false, true, true).is_some());
    }

    #[test]
    fn test_reset_clears_cooldown_and_phase() {
        let mut d = jump_detector();
        d.advance(250.0, ms(0), false);
        d.advance(405.0, ms(100), false);
        d.reset();
        // リセット後はクールダウンも消える
        d.advance(250.0, ms(150), false);
        assert_eq!(d.phase(), Phase::Active);
    }
}
