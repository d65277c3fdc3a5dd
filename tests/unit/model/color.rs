use super::*;
use serde_json::json;

#[test]
fn parses_hex_forms() {
    let c: Rgba8 = serde_json::from_value(json!("#ff0000")).unwrap();
    assert_eq!(c, Rgba8::new(255, 0, 0, 255));

    let c: Rgba8 = serde_json::from_value(json!("#0000ff80")).unwrap();
    assert_eq!(c, Rgba8::new(0, 0, 255, 128));

    let c: Rgba8 = serde_json::from_value(json!("#fff")).unwrap();
    assert_eq!(c, Rgba8::WHITE);
}

#[test]
fn parses_css_rgba_and_names() {
    assert_eq!(
        parse_color("rgba(0, 0, 0, 0.6)").unwrap(),
        Rgba8::new(0, 0, 0, 153)
    );
    assert_eq!(
        parse_color("rgb(10,20,30)").unwrap(),
        Rgba8::new(10, 20, 30, 255)
    );
    assert_eq!(parse_color("White").unwrap(), Rgba8::WHITE);
    assert!(parse_color("rgba(1,2)").is_err());
    assert!(parse_color("chartreuse-ish").is_err());
}

#[test]
fn parses_object_and_array() {
    let c: Rgba8 = serde_json::from_value(json!({"r": 1, "g": 2, "b": 3})).unwrap();
    assert_eq!(c, Rgba8::new(1, 2, 3, 255));

    let c: Rgba8 = serde_json::from_value(json!([1, 2, 3, 4])).unwrap();
    assert_eq!(c, Rgba8::new(1, 2, 3, 4));

    assert!(serde_json::from_value::<Rgba8>(json!([1, 2])).is_err());
}

#[test]
fn serializes_as_hex() {
    let v = serde_json::to_value(Rgba8::new(0, 128, 255, 16)).unwrap();
    assert_eq!(v, json!("#0080ff10"));
}
