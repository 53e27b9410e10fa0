//! Virtio sound device model.
//!
//! The pieces live in separate crates so the wire format can be used without pulling in the
//! device or a host audio backend:
//!
//! - [`proto`]: virtio-snd request/response layouts and constants.
//! - [`audio`]: the host audio backend seam plus an in-memory [`audio::NullBackend`].
//! - [`device`]: the device itself, its control queue and the stream state machine.

pub use aero_audio as audio;
pub use aero_virtio_snd as device;
pub use virtio_snd_proto as proto;
