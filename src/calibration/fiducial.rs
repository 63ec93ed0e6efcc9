//! 既知寸法の平面マーカー（A4用紙など）の検出によるスケール取得。
//!
//! 輪郭探索はOpenCV、候補の選別は純粋関数に分離してある。

use opencv::{
    core::{Mat, Point, Size, Vector},
    imgproc,
    prelude::*,
};

use crate::config::MarkerConfig;
use crate::error::CalibrationError;

use super::CalibrationResult;

/// 検出された四角形候補
#[derive(Debug, Clone)]
pub struct Quad {
    /// 輪郭順の4頂点（px）
    pub corners: [(f64, f64); 4],
    pub area: f64,
    /// 面積 / 凸包面積。1に近いほど歪みのない矩形
    pub solidity: f64,
}

impl Quad {
    /// 輪郭順の4辺長
    fn edge_lengths(&self) -> [f64; 4] {
        let mut lengths = [0.0; 4];
        for i in 0..4 {
            let a = self.corners[i];
            let b = self.corners[(i + 1) % 4];
            lengths[i] = ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();
        }
        lengths
    }

    /// 対辺同士を平均した長辺（px）
    pub fn long_edge_px(&self) -> f64 {
        let e = self.edge_lengths();
        let pair_a = (e[0] + e[2]) / 2.0;
        let pair_b = (e[1] + e[3]) / 2.0;
        pair_a.max(pair_b)
    }

    /// 対辺同士を平均した短辺（px）
    pub fn short_edge_px(&self) -> f64 {
        let e = self.edge_lengths();
        let pair_a = (e[0] + e[2]) / 2.0;
        let pair_b = (e[1] + e[3]) / 2.0;
        pair_a.min(pair_b)
    }

    pub fn aspect_ratio(&self) -> f64 {
        let short = self.short_edge_px();
        if short <= 0.0 {
            return 0.0;
        }
        self.long_edge_px() / short
    }
}

/// 面積・アスペクト比で候補を絞り、area × solidity 最大のものを選ぶ
pub fn rank_candidates<'a>(quads: &'a [Quad], marker: &MarkerConfig) -> Option<&'a Quad> {
    quads
        .iter()
        .filter(|q| q.area >= marker.min_area_px)
        .filter(|q| {
            let ratio = q.aspect_ratio();
            ratio >= marker.aspect_min && ratio <= marker.aspect_max
        })
        .max_by(|a, b| {
            let sa = a.area * a.solidity;
            let sb = b.area * b.solidity;
            sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
        })
}

/// フレーム画像からマーカーを検出しスケールを算出する
///
/// グレースケール → ぼかし → Canny → 外側輪郭 → 4点近似。
/// アスペクト帯で長短の対応は確定しているので、スケールは
/// 長辺px / 既知長辺cm で取る。
pub fn detect_marker(
    image: &Mat,
    marker: &MarkerConfig,
) -> Result<CalibrationResult, CalibrationError> {
    let quads = find_quads(image, marker).map_err(|_| CalibrationError::MarkerNotFound)?;
    let best = rank_candidates(&quads, marker).ok_or(CalibrationError::MarkerNotFound)?;

    let pixels_per_cm = best.long_edge_px() / marker.long_edge_cm;
    if pixels_per_cm <= 0.0 {
        return Err(CalibrationError::MarkerNotFound);
    }

    Ok(CalibrationResult {
        pixels_per_cm,
        reference_y: None,
    })
}

/// 画像中の4頂点輪郭をすべて列挙する
fn find_quads(image: &Mat, marker: &MarkerConfig) -> opencv::Result<Vec<Quad>> {
    let mut gray = Mat::default();
    imgproc::cvt_color_def(image, &mut gray, imgproc::COLOR_BGR2GRAY)?;

    let mut blurred = Mat::default();
    imgproc::gaussian_blur_def(&gray, &mut blurred, Size::new(5, 5), 0.0)?;

    let mut edges = Mat::default();
    imgproc::canny_def(&blurred, &mut edges, 50.0, 150.0)?;

    let mut contours = Vector::<Vector<Point>>::new();
    imgproc::find_contours_def(
        &edges,
        &mut contours,
        imgproc::RETR_EXTERNAL,
        imgproc::CHAIN_APPROX_SIMPLE,
    )?;

    let mut quads = Vec::new();
    for contour in contours.iter() {
        let peri = imgproc::arc_length(&contour, true)?;
        let mut approx = Vector::<Point>::new();
        imgproc::approx_poly_dp(&contour, &mut approx, 0.02 * peri, true)?;
        if approx.len() != 4 {
            continue;
        }

        let area = imgproc::contour_area_def(&approx)?;
        if area < marker.min_area_px {
            continue;
        }

        let mut hull = Vector::<Point>::new();
        imgproc::convex_hull_def(&approx, &mut hull)?;
        let hull_area = imgproc::contour_area_def(&hull)?;
        let solidity = if hull_area > 0.0 { area / hull_area } else { 0.0 };

        let mut corners = [(0.0, 0.0); 4];
        for (i, p) in approx.iter().enumerate() {
            corners[i] = (p.x as f64, p.y as f64);
        }
        quads.push(Quad {
            corners,
            area,
            solidity,
        });
    }
    Ok(quads)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 軸平行の矩形からQuadを作る
    fn rect_quad(x: f64, y: f64, w: f64, h: f64, solidity: f64) -> Quad {
        Quad {
            corners: [(x, y), (x + w, y), (x + w, y + h), (x, y + h)],
            area: w * h,
            solidity,
        }
    }

    #[test]
    fn test_edge_lengths() {
        let q = rect_quad(100.0, 100.0, 210.0, 297.0, 1.0);
        assert!((q.long_edge_px() - 297.0).abs() < 1e-9);
        assert!((q.short_edge_px() - 210.0).abs() < 1e-9);
        assert!((q.aspect_ratio() - 297.0 / 210.0).abs() < 1e-9);
    }

    #[test]
    fn test_rank_rejects_small_area() {
        let marker = MarkerConfig::default();
        // 面積 50*70=3500 < 10000
        let quads = vec![rect_quad(0.0, 0.0, 50.0, 70.0, 1.0)];
        assert!(rank_candidates(&quads, &marker).is_none());
    }

    #[test]
    fn test_rank_rejects_wrong_aspect() {
        let marker = MarkerConfig::default();
        // 正方形: アスペクト比1.0は帯域外
        let quads = vec![rect_quad(0.0, 0.0, 200.0, 200.0, 1.0)];
        assert!(rank_candidates(&quads, &marker).is_none());
        // 細長すぎ: 4.0も帯域外
        let quads = vec![rect_quad(0.0, 0.0, 100.0, 400.0, 1.0)];
        assert!(rank_candidates(&quads, &marker).is_none());
    }

    #[test]
    fn test_rank_prefers_area_times_solidity() {
        let marker = MarkerConfig::default();
        let small_clean = rect_quad(0.0, 0.0, 150.0, 212.0, 1.0); // 31800
        let big_ragged = rect_quad(0.0, 0.0, 300.0, 424.0, 0.2); // 127200 * 0.2 = 25440
        let quads = vec![small_clean.clone(), big_ragged];
        let best = rank_candidates(&quads, &marker).unwrap();
        assert!((best.area - small_clean.area).abs() < 1e-9);
    }

    #[test]
    fn test_scale_from_long_edge() {
        let marker = MarkerConfig::default();
        // A4が縦297pxで映っている → 297 / 29.7 = 10 px/cm
        let quad = rect_quad(100.0, 50.0, 210.0, 297.0, 1.0);
        let best = rank_candidates(&[quad], &marker).unwrap();
        let scale = best.long_edge_px() / marker.long_edge_cm;
        assert!((scale - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_skewed_quad_edges_averaged() {
        // 台形気味でも対辺平均で妥当な辺長が出る
        let q = Quad {
            corners: [(0.0, 0.0), (200.0, 10.0), (210.0, 300.0), (-10.0, 290.0)],
            area: 58000.0,
            solidity: 0.97,
        };
        assert!(q.long_edge_px() > q.short_edge_px());
        assert!(q.aspect_ratio() > 1.0);
    }
}
