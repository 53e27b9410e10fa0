//! Host audio boundary for emulated sound devices.
//!
//! Device models describe what they need (a card, and voices with fixed sample settings) through
//! [`AudioBackend`]; the backend owns buffering, resampling and the actual host device. A
//! [`NullBackend`] that discards playback and produces silence is provided for headless machines
//! and tests.

pub mod backend;
pub mod null;

pub use backend::{
    AudioBackend, AudioSettings, BackendError, CardHandle, Endianness, HostFormat, VoiceDirection,
    VoiceHandle,
};
pub use null::{NullBackend, NullVoice};

/// Upper bound on host-visible channel counts.
pub const MAX_CHANNELS: u8 = 16;
