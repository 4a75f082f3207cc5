//! Audio input and output
//!
//! Capture feeds fixed-size frames into a bounded channel from the device
//! callback; playback renders decoded replies through a cancellable sink.

pub mod capture;
pub mod playback;

pub use capture::{AudioCaptureStream, samples_to_wav};
pub use playback::{AudioSink, CpalSink, PlaybackController, PlaybackHandle, decode_audio};
