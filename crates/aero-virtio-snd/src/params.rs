//! Negotiated stream parameters and their validation against device capabilities.

use aero_audio::{AudioSettings, Endianness, HostFormat, MAX_CHANNELS};
use thiserror::Error;
use virtio_snd_proto::pcm::{PcmFormat, PcmRate};
use virtio_snd_proto::protocol::PcmSetParams;

use crate::config::DeviceCapabilities;

pub const DEFAULT_CHANNELS: u8 = 2;
pub const DEFAULT_FORMAT: PcmFormat = PcmFormat::S16;
pub const DEFAULT_RATE: PcmRate = PcmRate::Hz44100;
pub const DEFAULT_BUFFER_BYTES: u32 = 8192;
pub const DEFAULT_PERIOD_BYTES: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("channel count {0} outside 1..={}", MAX_CHANNELS)]
    Channels(u8),

    #[error("sample format {0} is not supported")]
    Format(u8),

    #[error("frame rate {0} is not supported")]
    Rate(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub features: u32,
    pub buffer_bytes: u32,
    pub period_bytes: u32,
    pub channels: u8,
    pub format: PcmFormat,
    pub rate: PcmRate,
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            features: 0,
            buffer_bytes: DEFAULT_BUFFER_BYTES,
            period_bytes: DEFAULT_PERIOD_BYTES,
            channels: DEFAULT_CHANNELS,
            format: DEFAULT_FORMAT,
            rate: DEFAULT_RATE,
        }
    }
}

impl StreamParams {
    /// Settings handed to the host audio layer when the stream is prepared.
    ///
    /// Returns `None` for formats without a host equivalent.
    pub fn host_settings(&self) -> Option<AudioSettings> {
        Some(AudioSettings {
            channels: self.channels.min(MAX_CHANNELS),
            format: host_format(self.format)?,
            freq: self.rate.hz(),
            endianness: Endianness::host(),
        })
    }

    pub fn to_request(&self, stream_id: u32) -> PcmSetParams {
        PcmSetParams {
            stream_id,
            buffer_bytes: self.buffer_bytes,
            period_bytes: self.period_bytes,
            features: self.features,
            channels: self.channels,
            format: self.format.to_wire(),
            rate: self.rate.to_wire(),
        }
    }
}

pub fn host_format(format: PcmFormat) -> Option<HostFormat> {
    Some(match format {
        PcmFormat::S8 => HostFormat::S8,
        PcmFormat::U8 => HostFormat::U8,
        PcmFormat::S16 => HostFormat::S16,
        PcmFormat::U16 => HostFormat::U16,
        PcmFormat::S32 => HostFormat::S32,
        PcmFormat::U32 => HostFormat::U32,
        PcmFormat::Float => HostFormat::F32,
        _ => return None,
    })
}

/// Checks a set-params request against `caps`. Channels, then format, then rate; the first
/// failure is reported.
pub fn validate(
    caps: &DeviceCapabilities,
    req: &PcmSetParams,
) -> Result<StreamParams, ValidationError> {
    if req.channels < 1 || req.channels > MAX_CHANNELS {
        return Err(ValidationError::Channels(req.channels));
    }
    let format = PcmFormat::from_wire(req.format)
        .filter(|f| caps.formats().contains(f.bit()))
        .ok_or(ValidationError::Format(req.format))?;
    let rate = PcmRate::from_wire(req.rate)
        .filter(|r| caps.rates().contains(r.bit()))
        .ok_or(ValidationError::Rate(req.rate))?;

    Ok(StreamParams {
        features: req.features,
        buffer_bytes: req.buffer_bytes,
        period_bytes: req.period_bytes,
        channels: req.channels,
        format,
        rate,
    })
}
