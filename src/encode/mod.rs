/// Capture controller binding a surface and mix to a sink.
pub(crate) mod capture;
/// `ffmpeg`-based sink producing WebM/MP4 via the system `ffmpeg`.
pub(crate) mod ffmpeg;
/// Sink trait, capture formats and the in-memory sink.
pub(crate) mod sink;
