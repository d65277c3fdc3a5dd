use super::*;

fn cfg(format: CaptureFormat) -> SinkConfig {
    SinkConfig {
        format,
        width: 2,
        height: 1,
        fps: Fps { num: 30, den: 1 },
        sample_rate: 48_000,
        channels: 2,
    }
}

fn frame(w: u32, h: u32, v: u8) -> FrameRGBA {
    FrameRGBA {
        width: w,
        height: h,
        data: vec![v; (w * h * 4) as usize],
        premultiplied: true,
    }
}

#[test]
fn negotiation_follows_preference_order() {
    let preferred = [
        CaptureFormat::WebmVp9Opus,
        CaptureFormat::Mp4H264Aac,
        CaptureFormat::RawRgba,
    ];
    assert_eq!(
        negotiate_format(&preferred, &[CaptureFormat::RawRgba, CaptureFormat::Mp4H264Aac]),
        Some(CaptureFormat::Mp4H264Aac)
    );
    assert_eq!(negotiate_format(&preferred, &[]), None);
    assert_eq!(
        negotiate_format(&[CaptureFormat::WebmVp9Opus], &[CaptureFormat::RawRgba]),
        None
    );
}

#[test]
fn format_serializes_snake_case() {
    let s = serde_json::to_string(&CaptureFormat::WebmVp9Opus).unwrap();
    assert_eq!(s, "\"webm_vp9_opus\"");
    assert!(CaptureFormat::Mp4H264Aac.mime_type().starts_with("video/mp4"));
}

#[test]
fn in_memory_sink_concatenates_frames() {
    let mut sink = InMemorySink::new();
    let probe = sink.probe();
    sink.begin(cfg(CaptureFormat::RawRgba)).unwrap();
    sink.push_frame(Duration::ZERO, &frame(2, 1, 1)).unwrap();
    let mut chunks = sink.take_chunks();
    sink.push_frame(Duration::from_millis(33), &frame(2, 1, 2))
        .unwrap();
    sink.push_audio(&[0.0; 6]).unwrap();
    chunks.extend(sink.finish().unwrap());
    let data = sink.finalize(chunks).unwrap();

    assert_eq!(data.len(), 16);
    assert_eq!(&data[..8], &[1u8; 8]);
    assert_eq!(&data[8..], &[2u8; 8]);
    let log = probe.log();
    assert_eq!(log.frames, 2);
    assert_eq!(log.audio_samples, 6);
    assert!(log.finished);
    assert!(!log.aborted);
}

#[test]
fn injected_failure_and_size_mismatch_are_capture_io() {
    let mut sink = InMemorySink::new().fail_after_frames(1);
    sink.begin(cfg(CaptureFormat::RawRgba)).unwrap();
    assert!(matches!(
        sink.push_frame(Duration::ZERO, &frame(4, 4, 0)),
        Err(ComposeError::CaptureIo(_))
    ));
    sink.push_frame(Duration::ZERO, &frame(2, 1, 0)).unwrap();
    assert!(matches!(
        sink.push_frame(Duration::ZERO, &frame(2, 1, 0)),
        Err(ComposeError::CaptureIo(_))
    ));
}

#[test]
fn unsupported_sink_refuses_to_begin() {
    let mut sink = InMemorySink::unsupported();
    assert!(sink.supported_formats().is_empty());
    let probe = sink.probe();
    assert!(sink.begin(cfg(CaptureFormat::RawRgba)).is_err());
    assert!(!probe.begun());
}

#[test]
fn closures_act_as_sink_factories() {
    let factory = || -> ComposeResult<Box<dyn EncodeSink>> { Ok(Box::new(InMemorySink::new())) };
    let sink = SinkFactory::create(&factory).unwrap();
    assert_eq!(sink.supported_formats(), vec![CaptureFormat::RawRgba]);
}
