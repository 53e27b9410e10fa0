use aero_audio::BackendError;
use thiserror::Error;
use virtio_snd_proto::protocol::{
    ProtocolError, VIRTIO_SND_S_BAD_MSG, VIRTIO_SND_S_IO_ERR, VIRTIO_SND_S_NOT_SUPP,
};

use crate::params::ValidationError;
use crate::stream::StreamState;

pub type Result<T> = std::result::Result<T, SndError>;

/// Why a single control or transfer request was rejected.
///
/// None of these are fatal to the device; each one becomes a status code in the response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SndError {
    #[error("malformed request: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("invalid stream id {stream_id} (device has {streams} streams)")]
    InvalidStreamId { stream_id: u32, streams: u32 },

    #[error("stream {stream_id}: {op} is not allowed in state {state:?}")]
    IllegalStateTransition {
        stream_id: u32,
        op: &'static str,
        state: StreamState,
    },

    #[error("unsupported stream parameters: {0}")]
    Unsupported(#[from] ValidationError),

    #[error("{0} requests are not implemented")]
    NotImplemented(&'static str),

    #[error("stream {stream_id} does not carry {queue} traffic")]
    DirectionMismatch { stream_id: u32, queue: &'static str },

    #[error("stream {stream_id} has no open voice")]
    NoVoice { stream_id: u32 },

    #[error("audio backend: {0}")]
    Backend(#[from] BackendError),
}

impl SndError {
    /// Wire status reported to the driver for this rejection.
    pub fn status(&self) -> u32 {
        match self {
            Self::Unsupported(_) | Self::NotImplemented(_) => VIRTIO_SND_S_NOT_SUPP,
            Self::Backend(_) | Self::NoVoice { .. } => VIRTIO_SND_S_IO_ERR,
            Self::Protocol(_)
            | Self::InvalidStreamId { .. }
            | Self::IllegalStateTransition { .. }
            | Self::DirectionMismatch { .. } => VIRTIO_SND_S_BAD_MSG,
        }
    }
}
