use super::*;

fn wav_bytes(spec: hound::WavSpec, write: impl FnOnce(&mut hound::WavWriter<&mut std::io::Cursor<Vec<u8>>>)) -> Vec<u8> {
    let mut cur = std::io::Cursor::new(Vec::new());
    {
        let mut w = hound::WavWriter::new(&mut cur, spec).unwrap();
        write(&mut w);
        w.finalize().unwrap();
    }
    cur.into_inner()
}

#[test]
fn decode_wav_scales_int_samples() {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let bytes = wav_bytes(spec, |w| {
        w.write_sample(16_384i16).unwrap();
        w.write_sample(-32_768i16).unwrap();
    });
    let pcm = decode_wav(&bytes).unwrap();
    assert_eq!(pcm.sample_rate, 16_000);
    assert_eq!(pcm.channels, 1);
    assert_eq!(pcm.interleaved_f32, vec![0.5, -1.0]);
    assert!((pcm.duration_secs() - 2.0 / 16_000.0).abs() < 1e-12);
}

#[test]
fn decode_wav_reads_float_stereo() {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 48_000,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let bytes = wav_bytes(spec, |w| {
        for s in [0.25f32, -0.25, 0.5, -0.5] {
            w.write_sample(s).unwrap();
        }
    });
    let pcm = decode_wav(&bytes).unwrap();
    assert_eq!(pcm.frames(), 2);
    assert_eq!(pcm.interleaved_f32, vec![0.25, -0.25, 0.5, -0.5]);
}

#[test]
fn decode_wav_rejects_garbage() {
    assert!(decode_wav(b"RIFF....nope").is_err());
}
