use super::*;

fn apply(a: Affine, x: f64, y: f64) -> (f64, f64) {
    let p = a * Point::new(x, y);
    (p.x, p.y)
}

#[test]
fn cover_fills_and_centers_wide_source() {
    // 1920x1080 into 720x1280: height drives the scale.
    let a = cover_transform(1920, 1080, 720, 1280);
    let scale = 1280.0 / 1080.0;
    let (x0, y0) = apply(a, 0.0, 0.0);
    let (x1, y1) = apply(a, 1920.0, 1080.0);
    assert!((y0 - 0.0).abs() < 1e-9);
    assert!((y1 - 1280.0).abs() < 1e-9);
    assert!(x0 < 0.0 && x1 > 720.0);
    assert!(((x0 + x1) / 2.0 - 360.0).abs() < 1e-9);
    assert!(((x1 - x0) - 1920.0 * scale).abs() < 1e-9);
}

#[test]
fn cover_is_identity_for_same_size() {
    let a = cover_transform(720, 1280, 720, 1280);
    assert_eq!(apply(a, 10.0, 20.0), (10.0, 20.0));
}

#[test]
fn cover_of_degenerate_image_is_identity() {
    assert_eq!(cover_transform(0, 10, 100, 100), Affine::IDENTITY);
}
