use crate::pose::Keypoint;

/// 3点 a-b-c の b における角度（度）
///
/// ベクトル ba, bc のなす角。縮退した入力 (同一点) では 0 を返す。
pub fn angle_deg(a: &Keypoint, b: &Keypoint, c: &Keypoint) -> f64 {
    let bax = (a.x - b.x) as f64;
    let bay = (a.y - b.y) as f64;
    let bcx = (c.x - b.x) as f64;
    let bcy = (c.y - b.y) as f64;

    let na = (bax * bax + bay * bay).sqrt();
    let nc = (bcx * bcx + bcy * bcy).sqrt();
    if na == 0.0 || nc == 0.0 {
        return 0.0;
    }

    let cos = ((bax * bcx + bay * bcy) / (na * nc)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// 2点間のピクセル距離
pub fn pixel_distance(a: &Keypoint, b: &Keypoint, width: u32, height: u32) -> f64 {
    let (ax, ay) = a.to_pixel(width, height);
    let (bx, by) = b.to_pixel(width, height);
    ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
}

/// 2つのピクセル座標のユークリッド距離
pub fn point_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}
