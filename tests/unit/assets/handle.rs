use super::*;
use crate::model::request::TrimWindow;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

struct CountingDecoder {
    left: u64,
    next: u8,
    fault_after: Option<u64>,
    closed: Arc<AtomicUsize>,
}

impl VideoDecoder for CountingDecoder {
    fn fps(&self) -> Fps {
        Fps::new(10, 1).unwrap()
    }

    fn poll_frame(&mut self) -> FramePoll {
        if self.fault_after == Some(u64::from(self.next)) {
            return FramePoll::Failed("boom".to_owned());
        }
        if self.left == 0 {
            return FramePoll::Ended;
        }
        self.left -= 1;
        let px = self.next;
        self.next += 1;
        FramePoll::Frame(PreparedImage::solid(1, 1, [px, 0, 0, 255]))
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

fn clip(kind: MediaKind, trim: Option<TrimWindow>) -> ClipDescriptor {
    ClipDescriptor {
        id: "c".to_owned(),
        kind,
        source: "c.src".to_owned(),
        duration_sec: 5.0,
        trim,
        caption: None,
    }
}

fn video(left: u64, fault_after: Option<u64>) -> (MediaSource, Arc<AtomicUsize>) {
    let closed = Arc::new(AtomicUsize::new(0));
    let d = CountingDecoder {
        left,
        next: 0,
        fault_after,
        closed: closed.clone(),
    };
    (MediaSource::Video(Box::new(d)), closed)
}

fn red(h: &mut MediaHandle, t: f64) -> Option<u8> {
    h.frame_at(t).map(|f| f.rgba8_premul[0])
}

#[test]
fn video_advances_by_elapsed_only_while_playing() {
    let ledger = HandleLedger::new();
    let (src, _) = video(100, None);
    let mut h = MediaHandle::new(&clip(MediaKind::Video, None), src, &ledger);

    assert_eq!(red(&mut h, 0.0), None);
    h.play();
    assert_eq!(red(&mut h, 0.0), Some(0));
    assert_eq!(red(&mut h, 0.55), Some(5));
    h.pause();
    assert_eq!(red(&mut h, 2.0), Some(5));
    h.play();
    assert_eq!(red(&mut h, 2.0), Some(20));
    h.release();
}

#[test]
fn video_holds_last_frame_and_fires_ended_once() {
    let ledger = HandleLedger::new();
    let (src, _) = video(3, None);
    let mut h = MediaHandle::new(&clip(MediaKind::Video, None), src, &ledger);
    let ended = Arc::new(AtomicUsize::new(0));
    let e = ended.clone();
    h.on_ended(move || {
        e.fetch_add(1, Ordering::SeqCst);
    });
    h.play();
    assert_eq!(red(&mut h, 1.0), Some(2));
    assert_eq!(red(&mut h, 4.0), Some(2));
    assert!(h.is_ended());
    assert_eq!(ended.load(Ordering::SeqCst), 1);
    h.release();
}

#[test]
fn trim_window_end_stops_pulling() {
    let ledger = HandleLedger::new();
    let (src, _) = video(100, None);
    let trim = TrimWindow {
        start_offset: 1.0,
        end_offset: 1.5,
    };
    let mut h = MediaHandle::new(&clip(MediaKind::Video, Some(trim)), src, &ledger);
    h.play();
    assert_eq!(red(&mut h, 3.0), Some(5));
    assert!(h.is_ended());
    assert_eq!(red(&mut h, 4.0), Some(5));
    h.release();
}

#[test]
fn decode_fault_fires_error_callback_and_holds() {
    let ledger = HandleLedger::new();
    let (src, _) = video(100, Some(2));
    let mut h = MediaHandle::new(&clip(MediaKind::Video, None), src, &ledger);
    let errors = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
    let sink = errors.clone();
    h.on_error(move |m| sink.lock().unwrap().push(m.to_owned()));
    h.play();
    assert_eq!(red(&mut h, 1.0), Some(1));
    assert_eq!(red(&mut h, 2.0), Some(1));
    assert_eq!(errors.lock().unwrap().as_slice(), &["boom".to_owned()]);
    h.release();
}

#[test]
fn image_is_drawable_immediately() {
    let ledger = HandleLedger::new();
    let img = PreparedImage::solid(2, 2, [9, 9, 9, 255]);
    let mut h = MediaHandle::new(&clip(MediaKind::Image, None), MediaSource::Image(img), &ledger);
    assert_eq!(red(&mut h, 0.0), Some(9));
    assert_eq!(red(&mut h, 100.0), Some(9));
    h.release();
}

#[test]
fn release_is_idempotent_and_closes_decoder() {
    let ledger = HandleLedger::new();
    let (src, closed) = video(1, None);
    let mut h = MediaHandle::new(&clip(MediaKind::Video, None), src, &ledger);
    assert_eq!(ledger.live_of(HandleKind::Media), 1);
    h.release();
    h.release();
    assert!(h.is_released());
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert_eq!(ledger.live(), 0);
    drop(h);
    assert_eq!(ledger.stats().dropped_unreleased, 0);
}

#[test]
fn drop_without_release_is_counted() {
    let ledger = HandleLedger::new();
    let (src, closed) = video(1, None);
    let h = MediaHandle::new(&clip(MediaKind::Video, None), src, &ledger);
    drop(h);
    assert_eq!(ledger.live(), 0);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert_eq!(ledger.stats().dropped_unreleased, 1);
}
