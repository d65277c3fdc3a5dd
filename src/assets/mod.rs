pub(crate) mod decode;
pub(crate) mod ffmpeg;
pub(crate) mod handle;
pub(crate) mod loader;
pub(crate) mod media;
pub(crate) mod memory;
