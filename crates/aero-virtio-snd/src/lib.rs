//! virtio-snd device model.
//!
//! The control queue is the interesting part: requests are decoded by `virtio-snd-proto`, checked
//! against [`DeviceCapabilities`], executed against a per-stream state machine and answered with
//! a status code. PCM transfer queues are forwarded to an [`aero_audio::AudioBackend`]. Jack and
//! channel-map requests are answered `VIRTIO_SND_S_NOT_SUPP`.

pub mod cmdq;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod params;
pub mod stream;
pub mod transport;

pub use config::{ConfigError, DeviceCapabilities, SndConfig};
pub use device::{VirtioDevice, VirtioSnd};
pub use error::SndError;
pub use params::{StreamParams, ValidationError};
pub use stream::StreamState;
pub use transport::{Completion, ControlTransport, LoopbackBuffer, LoopbackTransport, RequestBuffer};
