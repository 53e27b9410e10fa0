//! Wire-level definitions for the virtio-snd device (virtio 1.2, section 5.14).
//!
//! This crate only knows about byte layouts; stream state, validation against device
//! capabilities and host audio live in `aero-virtio-snd`.

pub mod pcm;
pub mod protocol;

pub use pcm::{Direction, PcmFormat, PcmFormats, PcmRate, PcmRates};
pub use protocol::{
    PcmInfo, PcmSetParams, PcmStatus, PcmXfer, ProtocolError, QueryInfo, Request, VirtioSndConfig,
};
