use super::*;

#[test]
fn flatten_premul_alpha_0_returns_bg() {
    let src = vec![0u8, 0, 0, 0];
    let mut dst = vec![0u8; 4];
    flatten_premul_over_bg_to_opaque_rgba8(&mut dst, &src, Rgba8::new(10, 20, 30, 255)).unwrap();
    assert_eq!(dst, vec![10, 20, 30, 255]);
}

#[test]
fn flatten_premul_half_alpha_blends_with_bg() {
    let src = vec![100u8, 0, 0, 128];
    let mut dst = vec![0u8; 4];
    flatten_premul_over_bg_to_opaque_rgba8(&mut dst, &src, Rgba8::new(0, 0, 254, 255)).unwrap();
    assert_eq!(dst[0], 100);
    assert_eq!(dst[1], 0);
    assert!((126..=127).contains(&dst[2]));
    assert_eq!(dst[3], 255);
}

#[test]
fn flatten_rejects_mismatched_buffers() {
    let mut dst = vec![0u8; 8];
    assert!(flatten_premul_over_bg_to_opaque_rgba8(&mut dst, &[0u8; 4], Rgba8::BLACK).is_err());
}

#[test]
fn encoder_listing_maps_to_formats() {
    let listing = "\
Encoders:
 V..... = Video
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC
 V....D libvpx-vp9           libvpx VP9
 V....D rawvideo             raw video
 A....D aac                  AAC (Advanced Audio Coding)
";
    assert_eq!(
        formats_from_encoder_list(listing),
        vec![CaptureFormat::Mp4H264Aac, CaptureFormat::RawRgba]
    );
    assert!(formats_from_encoder_list("").is_empty());
}

#[test]
fn sink_without_formats_refuses_to_begin() {
    let mut sink = FfmpegSink::with_formats(FfmpegSinkOpts::default(), Vec::new());
    let err = sink
        .begin(SinkConfig {
            format: CaptureFormat::Mp4H264Aac,
            width: 2,
            height: 2,
            fps: crate::foundation::core::Fps { num: 30, den: 1 },
            sample_rate: 48_000,
            channels: 2,
        })
        .unwrap_err();
    assert!(matches!(err, ComposeError::CaptureUnsupported(_)));
    sink.abort();
}

#[test]
fn ensure_parent_dir_creates_nested_directories() {
    let root = std::env::temp_dir().join(format!("clipweave-parent-{}", std::process::id()));
    let file = root.join("a").join("b").join("out.webm");
    ensure_parent_dir(&file).unwrap();
    assert!(root.join("a").join("b").is_dir());
    let _ = std::fs::remove_dir_all(root);
}
