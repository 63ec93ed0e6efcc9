use nalgebra::{Matrix2, RowVector2, Vector2};

use crate::config::FilterConfig;

/// 等速度モデルの1次元カルマンフィルタ
///
/// 状態ベクトル [位置, 速度]、遷移行列 [[1,1],[0,1]] (1フレーム=1ステップ)。
/// 毎フレーム `predict` → `correct` の順に1回ずつ呼ぶ。
/// 計測が欠けたフレームは `coast` で状態だけ進め、不確かさを広げる。
pub struct Kalman1d {
    x: Vector2<f64>,
    p: Matrix2<f64>,
    f: Matrix2<f64>,
    q: Matrix2<f64>,
    r: f64,
}

impl Kalman1d {
    pub fn new(process_noise: f64, measurement_noise: f64) -> Self {
        Self {
            x: Vector2::zeros(),
            p: Matrix2::identity(),
            f: Matrix2::new(1.0, 1.0, 0.0, 1.0),
            q: Matrix2::identity() * process_noise,
            r: measurement_noise,
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.process_noise, config.measurement_noise)
    }

    /// 基準位置で状態を初期化する。速度は0、誤差共分散は単位行列に戻す。
    pub fn seed(&mut self, position: f64) {
        self.x = Vector2::new(position, 0.0);
        self.p = Matrix2::identity();
    }

    /// 状態を1ステップ進め、予測位置を返す
    pub fn predict(&mut self) -> f64 {
        self.x = self.f * self.x;
        self.p = self.f * self.p * self.f.transpose() + self.q;
        self.x[0]
    }

    /// 計測値を取り込み、補正後の位置を返す
    pub fn correct(&mut self, measurement: f64) -> f64 {
        let h = RowVector2::new(1.0, 0.0);
        let innovation = measurement - self.x[0];
        let s = self.p[(0, 0)] + self.r;
        let k = Vector2::new(self.p[(0, 0)] / s, self.p[(1, 0)] / s);
        self.x += k * innovation;
        self.p = (Matrix2::identity() - k * h) * self.p;
        self.x[0]
    }

    /// 計測欠損フレーム用: predictのみ実行して不確かさを広げる
    pub fn coast(&mut self) {
        let _ = self.predict();
    }

    pub fn position(&self) -> f64 {
        self.x[0]
    }

    pub fn velocity(&self) -> f64 {
        self.x[1]
    }

    /// 位置成分の誤差分散
    pub fn position_variance(&self) -> f64 {
        self.p[(0, 0)]
    }
}

/// スカラー値の指数移動平均
pub struct Ema {
    alpha: f64,
    state: Option<f64>,
}

impl Ema {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, state: None }
    }

    pub fn apply(&mut self, value: f64) -> f64 {
        let result = match self.state {
            Some(prev) => self.alpha * value + (1.0 - self.alpha) * prev,
            None => value,
        };
        self.state = Some(result);
        result
    }

    pub fn value(&self) -> Option<f64> {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}
