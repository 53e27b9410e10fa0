//! virtio-snd control and I/O message layouts (virtio 1.2, section 5.14).
//!
//! All multi-byte fields are little-endian. Structures are decoded from the exact number of bytes
//! the layout requires; trailing bytes are ignored.

use thiserror::Error;

use crate::pcm::{Direction, PcmFormats, PcmRates};

pub const VIRTIO_DEVICE_TYPE_SND: u16 = 25;

pub const VIRTIO_SND_QUEUE_CONTROL: u16 = 0;
pub const VIRTIO_SND_QUEUE_EVENT: u16 = 1;
pub const VIRTIO_SND_QUEUE_TX: u16 = 2;
pub const VIRTIO_SND_QUEUE_RX: u16 = 3;
pub const VIRTIO_SND_NUM_QUEUES: u16 = 4;

pub const VIRTIO_SND_R_JACK_INFO: u32 = 1;
pub const VIRTIO_SND_R_JACK_REMAP: u32 = 2;
pub const VIRTIO_SND_R_PCM_INFO: u32 = 0x0100;
pub const VIRTIO_SND_R_PCM_SET_PARAMS: u32 = 0x0101;
pub const VIRTIO_SND_R_PCM_PREPARE: u32 = 0x0102;
pub const VIRTIO_SND_R_PCM_RELEASE: u32 = 0x0103;
pub const VIRTIO_SND_R_PCM_START: u32 = 0x0104;
pub const VIRTIO_SND_R_PCM_STOP: u32 = 0x0105;
pub const VIRTIO_SND_R_CHMAP_INFO: u32 = 0x0200;

pub const VIRTIO_SND_S_OK: u32 = 0x8000;
pub const VIRTIO_SND_S_BAD_MSG: u32 = 0x8001;
pub const VIRTIO_SND_S_NOT_SUPP: u32 = 0x8002;
pub const VIRTIO_SND_S_IO_ERR: u32 = 0x8003;

pub const VIRTIO_SND_CHMAP_MAX_SIZE: u32 = 18;

/// `struct virtio_snd_hdr`: `code` (le32).
pub const VIRTIO_SND_HDR_SIZE: usize = 4;
/// `struct virtio_snd_query_info`: hdr + start_id + count + size.
pub const VIRTIO_SND_QUERY_INFO_SIZE: usize = VIRTIO_SND_HDR_SIZE + 12;
/// `struct virtio_snd_pcm_hdr`: hdr + stream_id.
pub const VIRTIO_SND_PCM_HDR_SIZE: usize = VIRTIO_SND_HDR_SIZE + 4;
/// `struct virtio_snd_pcm_set_params`:
/// pcm_hdr + buffer_bytes + period_bytes + features + channels + format + rate + padding.
pub const VIRTIO_SND_PCM_SET_PARAMS_SIZE: usize = VIRTIO_SND_PCM_HDR_SIZE + 16;
/// `struct virtio_snd_pcm_info`:
/// hda_fn_nid + features + formats (le64) + rates (le64) + direction + channels_min +
/// channels_max + padding[5].
pub const VIRTIO_SND_PCM_INFO_SIZE: usize = 32;
/// `struct virtio_snd_pcm_xfer`: stream_id.
pub const VIRTIO_SND_PCM_XFER_SIZE: usize = 4;
/// `struct virtio_snd_pcm_status`: status + latency_bytes.
pub const VIRTIO_SND_PCM_STATUS_SIZE: usize = 8;
/// `struct virtio_snd_config`: jacks + streams + chmaps.
pub const VIRTIO_SND_CONFIG_SIZE: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("request truncated: need {want} bytes, got {got}")]
    Truncated { want: usize, got: usize },

    #[error("response buffer too small: need {want} bytes, have {got}")]
    BufferTooSmall { want: usize, got: usize },

    #[error("unrecognized request code {0:#06x}")]
    UnknownRequest(u32),

    #[error("info item size {0} is smaller than the record layout")]
    BadInfoSize(u32),

    #[error("invalid field: {0}")]
    InvalidField(&'static str),
}

pub fn read_u32_le(bytes: &[u8], off: usize) -> Result<u32, ProtocolError> {
    let end = off.checked_add(4).ok_or(ProtocolError::Truncated {
        want: usize::MAX,
        got: bytes.len(),
    })?;
    let b = bytes.get(off..end).ok_or(ProtocolError::Truncated {
        want: end,
        got: bytes.len(),
    })?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub fn read_u64_le(bytes: &[u8], off: usize) -> Result<u64, ProtocolError> {
    let lo = read_u32_le(bytes, off)?;
    let hi = read_u32_le(bytes, off + 4)?;
    Ok(u64::from(lo) | (u64::from(hi) << 32))
}

fn require(bytes: &[u8], want: usize) -> Result<(), ProtocolError> {
    if bytes.len() < want {
        return Err(ProtocolError::Truncated {
            want,
            got: bytes.len(),
        });
    }
    Ok(())
}

pub fn request_code_name(code: u32) -> &'static str {
    match code {
        VIRTIO_SND_R_JACK_INFO => "VIRTIO_SND_R_JACK_INFO",
        VIRTIO_SND_R_JACK_REMAP => "VIRTIO_SND_R_JACK_REMAP",
        VIRTIO_SND_R_PCM_INFO => "VIRTIO_SND_R_PCM_INFO",
        VIRTIO_SND_R_PCM_SET_PARAMS => "VIRTIO_SND_R_PCM_SET_PARAMS",
        VIRTIO_SND_R_PCM_PREPARE => "VIRTIO_SND_R_PCM_PREPARE",
        VIRTIO_SND_R_PCM_RELEASE => "VIRTIO_SND_R_PCM_RELEASE",
        VIRTIO_SND_R_PCM_START => "VIRTIO_SND_R_PCM_START",
        VIRTIO_SND_R_PCM_STOP => "VIRTIO_SND_R_PCM_STOP",
        VIRTIO_SND_R_CHMAP_INFO => "VIRTIO_SND_R_CHMAP_INFO",
        _ => "invalid code",
    }
}

pub fn status_name(code: u32) -> &'static str {
    match code {
        VIRTIO_SND_S_OK => "VIRTIO_SND_S_OK",
        VIRTIO_SND_S_BAD_MSG => "VIRTIO_SND_S_BAD_MSG",
        VIRTIO_SND_S_NOT_SUPP => "VIRTIO_SND_S_NOT_SUPP",
        VIRTIO_SND_S_IO_ERR => "VIRTIO_SND_S_IO_ERR",
        _ => "invalid status",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryInfo {
    pub start_id: u32,
    pub count: u32,
    /// Size of one item record as the driver laid out its response buffer.
    pub size: u32,
}

impl QueryInfo {
    /// Response bytes needed for the header plus `count` records of `size` bytes each.
    pub fn response_len(&self) -> Option<usize> {
        let items = usize::try_from(self.count)
            .ok()?
            .checked_mul(usize::try_from(self.size).ok()?)?;
        items.checked_add(VIRTIO_SND_HDR_SIZE)
    }
}

/// `virtio_snd_pcm_set_params`, with `format` and `rate` kept as raw enumerators so unknown values
/// reach the validator instead of failing decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmSetParams {
    pub stream_id: u32,
    pub buffer_bytes: u32,
    pub period_bytes: u32,
    pub features: u32,
    pub channels: u8,
    pub format: u8,
    pub rate: u8,
}

/// A decoded control queue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    JackInfo,
    JackRemap,
    PcmInfo(QueryInfo),
    PcmSetParams(PcmSetParams),
    PcmPrepare { stream_id: u32 },
    PcmRelease { stream_id: u32 },
    PcmStart { stream_id: u32 },
    PcmStop { stream_id: u32 },
    ChmapInfo,
}

impl Request {
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let code = read_u32_le(bytes, 0)?;
        match code {
            VIRTIO_SND_R_JACK_INFO => Ok(Self::JackInfo),
            VIRTIO_SND_R_JACK_REMAP => Ok(Self::JackRemap),
            VIRTIO_SND_R_CHMAP_INFO => Ok(Self::ChmapInfo),
            VIRTIO_SND_R_PCM_INFO => {
                require(bytes, VIRTIO_SND_QUERY_INFO_SIZE)?;
                Ok(Self::PcmInfo(QueryInfo {
                    start_id: read_u32_le(bytes, 4)?,
                    count: read_u32_le(bytes, 8)?,
                    size: read_u32_le(bytes, 12)?,
                }))
            }
            VIRTIO_SND_R_PCM_SET_PARAMS => {
                require(bytes, VIRTIO_SND_PCM_SET_PARAMS_SIZE)?;
                Ok(Self::PcmSetParams(PcmSetParams {
                    stream_id: read_u32_le(bytes, 4)?,
                    buffer_bytes: read_u32_le(bytes, 8)?,
                    period_bytes: read_u32_le(bytes, 12)?,
                    features: read_u32_le(bytes, 16)?,
                    channels: bytes[20],
                    format: bytes[21],
                    rate: bytes[22],
                }))
            }
            VIRTIO_SND_R_PCM_PREPARE
            | VIRTIO_SND_R_PCM_RELEASE
            | VIRTIO_SND_R_PCM_START
            | VIRTIO_SND_R_PCM_STOP => {
                require(bytes, VIRTIO_SND_PCM_HDR_SIZE)?;
                let stream_id = read_u32_le(bytes, 4)?;
                Ok(match code {
                    VIRTIO_SND_R_PCM_PREPARE => Self::PcmPrepare { stream_id },
                    VIRTIO_SND_R_PCM_RELEASE => Self::PcmRelease { stream_id },
                    VIRTIO_SND_R_PCM_START => Self::PcmStart { stream_id },
                    _ => Self::PcmStop { stream_id },
                })
            }
            other => Err(ProtocolError::UnknownRequest(other)),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::JackInfo => VIRTIO_SND_R_JACK_INFO,
            Self::JackRemap => VIRTIO_SND_R_JACK_REMAP,
            Self::PcmInfo(_) => VIRTIO_SND_R_PCM_INFO,
            Self::PcmSetParams(_) => VIRTIO_SND_R_PCM_SET_PARAMS,
            Self::PcmPrepare { .. } => VIRTIO_SND_R_PCM_PREPARE,
            Self::PcmRelease { .. } => VIRTIO_SND_R_PCM_RELEASE,
            Self::PcmStart { .. } => VIRTIO_SND_R_PCM_START,
            Self::PcmStop { .. } => VIRTIO_SND_R_PCM_STOP,
            Self::ChmapInfo => VIRTIO_SND_R_CHMAP_INFO,
        }
    }

    /// Driver-side encoding. Jack and channel-map requests carry only their header since the
    /// device never interprets their bodies.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.code().to_le_bytes().to_vec();
        match *self {
            Self::JackInfo | Self::JackRemap | Self::ChmapInfo => {}
            Self::PcmInfo(q) => {
                out.extend_from_slice(&q.start_id.to_le_bytes());
                out.extend_from_slice(&q.count.to_le_bytes());
                out.extend_from_slice(&q.size.to_le_bytes());
            }
            Self::PcmSetParams(p) => {
                out.extend_from_slice(&p.stream_id.to_le_bytes());
                out.extend_from_slice(&p.buffer_bytes.to_le_bytes());
                out.extend_from_slice(&p.period_bytes.to_le_bytes());
                out.extend_from_slice(&p.features.to_le_bytes());
                out.extend_from_slice(&[p.channels, p.format, p.rate, 0]);
            }
            Self::PcmPrepare { stream_id }
            | Self::PcmRelease { stream_id }
            | Self::PcmStart { stream_id }
            | Self::PcmStop { stream_id } => {
                out.extend_from_slice(&stream_id.to_le_bytes());
            }
        }
        out
    }
}

/// Writes `virtio_snd_hdr { code: status }` followed by `payload` into `out`.
///
/// Returns the number of bytes written.
pub fn write_response(out: &mut [u8], status: u32, payload: &[u8]) -> Result<usize, ProtocolError> {
    let want = VIRTIO_SND_HDR_SIZE + payload.len();
    if out.len() < want {
        return Err(ProtocolError::BufferTooSmall {
            want,
            got: out.len(),
        });
    }
    out[..VIRTIO_SND_HDR_SIZE].copy_from_slice(&status.to_le_bytes());
    out[VIRTIO_SND_HDR_SIZE..want].copy_from_slice(payload);
    Ok(want)
}

/// Per-stream capability record returned by `VIRTIO_SND_R_PCM_INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmInfo {
    pub hda_fn_nid: u32,
    pub features: u32,
    pub formats: PcmFormats,
    pub rates: PcmRates,
    pub direction: Direction,
    pub channels_min: u8,
    pub channels_max: u8,
}

impl PcmInfo {
    pub fn to_le_bytes(&self) -> [u8; VIRTIO_SND_PCM_INFO_SIZE] {
        let mut out = [0u8; VIRTIO_SND_PCM_INFO_SIZE];
        out[0..4].copy_from_slice(&self.hda_fn_nid.to_le_bytes());
        out[4..8].copy_from_slice(&self.features.to_le_bytes());
        out[8..16].copy_from_slice(&self.formats.bits().to_le_bytes());
        out[16..24].copy_from_slice(&self.rates.bits().to_le_bytes());
        out[24] = self.direction.to_wire();
        out[25] = self.channels_min;
        out[26] = self.channels_max;
        // padding[5] stays zero.
        out
    }

    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        require(bytes, VIRTIO_SND_PCM_INFO_SIZE)?;
        Ok(Self {
            hda_fn_nid: read_u32_le(bytes, 0)?,
            features: read_u32_le(bytes, 4)?,
            formats: PcmFormats::from_bits_retain(read_u64_le(bytes, 8)?),
            rates: PcmRates::from_bits_retain(read_u64_le(bytes, 16)?),
            direction: Direction::from_wire(bytes[24])
                .ok_or(ProtocolError::InvalidField("direction"))?,
            channels_min: bytes[25],
            channels_max: bytes[26],
        })
    }
}

/// Lays out `records` at a stride of `item_size` bytes (zero-filled past the record layout).
pub fn encode_pcm_info_items(records: &[PcmInfo], item_size: usize) -> Result<Vec<u8>, ProtocolError> {
    if item_size < VIRTIO_SND_PCM_INFO_SIZE {
        return Err(ProtocolError::BadInfoSize(
            u32::try_from(item_size).unwrap_or(u32::MAX),
        ));
    }
    let mut out = vec![0u8; records.len() * item_size];
    for (record, chunk) in records.iter().zip(out.chunks_exact_mut(item_size)) {
        chunk[..VIRTIO_SND_PCM_INFO_SIZE].copy_from_slice(&record.to_le_bytes());
    }
    Ok(out)
}

/// Driver-side decoding of a `VIRTIO_SND_R_PCM_INFO` response.
///
/// Returns the status code and, for `VIRTIO_SND_S_OK`, the `count` records that follow it.
pub fn decode_pcm_info_response(
    bytes: &[u8],
    count: usize,
    item_size: usize,
) -> Result<(u32, Vec<PcmInfo>), ProtocolError> {
    let status = read_u32_le(bytes, 0)?;
    if status != VIRTIO_SND_S_OK {
        return Ok((status, Vec::new()));
    }
    if item_size < VIRTIO_SND_PCM_INFO_SIZE {
        return Err(ProtocolError::BadInfoSize(
            u32::try_from(item_size).unwrap_or(u32::MAX),
        ));
    }
    let body = &bytes[VIRTIO_SND_HDR_SIZE..];
    require(body, count.saturating_mul(item_size))?;
    let records = body
        .chunks_exact(item_size)
        .take(count)
        .map(PcmInfo::from_le_bytes)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((status, records))
}

/// `struct virtio_snd_config`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VirtioSndConfig {
    pub jacks: u32,
    pub streams: u32,
    pub chmaps: u32,
}

impl VirtioSndConfig {
    pub fn to_le_bytes(&self) -> [u8; VIRTIO_SND_CONFIG_SIZE] {
        let mut out = [0u8; VIRTIO_SND_CONFIG_SIZE];
        out[0..4].copy_from_slice(&self.jacks.to_le_bytes());
        out[4..8].copy_from_slice(&self.streams.to_le_bytes());
        out[8..12].copy_from_slice(&self.chmaps.to_le_bytes());
        out
    }

    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        require(bytes, VIRTIO_SND_CONFIG_SIZE)?;
        Ok(Self {
            jacks: read_u32_le(bytes, 0)?,
            streams: read_u32_le(bytes, 4)?,
            chmaps: read_u32_le(bytes, 8)?,
        })
    }
}

/// `struct virtio_snd_pcm_xfer`, the header of every tx/rx queue buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmXfer {
    pub stream_id: u32,
}

impl PcmXfer {
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        require(bytes, VIRTIO_SND_PCM_XFER_SIZE)?;
        Ok(Self {
            stream_id: read_u32_le(bytes, 0)?,
        })
    }
}

/// `struct virtio_snd_pcm_status`, written by the device at the end of every tx/rx buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmStatus {
    pub status: u32,
    pub latency_bytes: u32,
}

impl PcmStatus {
    pub fn to_le_bytes(&self) -> [u8; VIRTIO_SND_PCM_STATUS_SIZE] {
        let mut out = [0u8; VIRTIO_SND_PCM_STATUS_SIZE];
        out[0..4].copy_from_slice(&self.status.to_le_bytes());
        out[4..8].copy_from_slice(&self.latency_bytes.to_le_bytes());
        out
    }
}
