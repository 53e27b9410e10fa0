//! PCM stream vocabulary: sample formats, frame rates, data-flow direction.
//!
//! Formats and rates travel as single-byte enumerators in `virtio_snd_pcm_set_params` and as
//! `le64` bitsets (`1 << enumerator`) in `virtio_snd_pcm_info`.

use bitflags::bitflags;

pub const VIRTIO_SND_D_OUTPUT: u8 = 0;
pub const VIRTIO_SND_D_INPUT: u8 = 1;

pub const VIRTIO_SND_PCM_FMT_IMA_ADPCM: u8 = 0;
pub const VIRTIO_SND_PCM_FMT_MU_LAW: u8 = 1;
pub const VIRTIO_SND_PCM_FMT_A_LAW: u8 = 2;
pub const VIRTIO_SND_PCM_FMT_S8: u8 = 3;
pub const VIRTIO_SND_PCM_FMT_U8: u8 = 4;
pub const VIRTIO_SND_PCM_FMT_S16: u8 = 5;
pub const VIRTIO_SND_PCM_FMT_U16: u8 = 6;
pub const VIRTIO_SND_PCM_FMT_S18_3: u8 = 7;
pub const VIRTIO_SND_PCM_FMT_U18_3: u8 = 8;
pub const VIRTIO_SND_PCM_FMT_S20_3: u8 = 9;
pub const VIRTIO_SND_PCM_FMT_U20_3: u8 = 10;
pub const VIRTIO_SND_PCM_FMT_S24_3: u8 = 11;
pub const VIRTIO_SND_PCM_FMT_U24_3: u8 = 12;
pub const VIRTIO_SND_PCM_FMT_S20: u8 = 13;
pub const VIRTIO_SND_PCM_FMT_U20: u8 = 14;
pub const VIRTIO_SND_PCM_FMT_S24: u8 = 15;
pub const VIRTIO_SND_PCM_FMT_U24: u8 = 16;
pub const VIRTIO_SND_PCM_FMT_S32: u8 = 17;
pub const VIRTIO_SND_PCM_FMT_U32: u8 = 18;
pub const VIRTIO_SND_PCM_FMT_FLOAT: u8 = 19;
pub const VIRTIO_SND_PCM_FMT_FLOAT64: u8 = 20;
pub const VIRTIO_SND_PCM_FMT_DSD_U8: u8 = 21;
pub const VIRTIO_SND_PCM_FMT_DSD_U16: u8 = 22;
pub const VIRTIO_SND_PCM_FMT_DSD_U32: u8 = 23;
pub const VIRTIO_SND_PCM_FMT_IEC958_SUBFRAME: u8 = 24;

pub const VIRTIO_SND_PCM_RATE_5512: u8 = 0;
pub const VIRTIO_SND_PCM_RATE_8000: u8 = 1;
pub const VIRTIO_SND_PCM_RATE_11025: u8 = 2;
pub const VIRTIO_SND_PCM_RATE_16000: u8 = 3;
pub const VIRTIO_SND_PCM_RATE_22050: u8 = 4;
pub const VIRTIO_SND_PCM_RATE_32000: u8 = 5;
pub const VIRTIO_SND_PCM_RATE_44100: u8 = 6;
pub const VIRTIO_SND_PCM_RATE_48000: u8 = 7;
pub const VIRTIO_SND_PCM_RATE_64000: u8 = 8;
pub const VIRTIO_SND_PCM_RATE_88200: u8 = 9;
pub const VIRTIO_SND_PCM_RATE_96000: u8 = 10;
pub const VIRTIO_SND_PCM_RATE_176400: u8 = 11;
pub const VIRTIO_SND_PCM_RATE_192000: u8 = 12;
pub const VIRTIO_SND_PCM_RATE_384000: u8 = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Output,
    Input,
}

impl Direction {
    /// Direction of stream `stream_id` on a device with `streams` PCM streams.
    ///
    /// The first `ceil(streams / 2)` streams are playback, the rest capture.
    pub fn for_stream(stream_id: u32, streams: u32) -> Self {
        if stream_id < streams.div_ceil(2) {
            Self::Output
        } else {
            Self::Input
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            Self::Output => VIRTIO_SND_D_OUTPUT,
            Self::Input => VIRTIO_SND_D_INPUT,
        }
    }

    pub fn from_wire(raw: u8) -> Option<Self> {
        match raw {
            VIRTIO_SND_D_OUTPUT => Some(Self::Output),
            VIRTIO_SND_D_INPUT => Some(Self::Input),
            _ => None,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PcmFormat {
    ImaAdpcm = VIRTIO_SND_PCM_FMT_IMA_ADPCM,
    MuLaw = VIRTIO_SND_PCM_FMT_MU_LAW,
    ALaw = VIRTIO_SND_PCM_FMT_A_LAW,
    S8 = VIRTIO_SND_PCM_FMT_S8,
    U8 = VIRTIO_SND_PCM_FMT_U8,
    S16 = VIRTIO_SND_PCM_FMT_S16,
    U16 = VIRTIO_SND_PCM_FMT_U16,
    S18_3 = VIRTIO_SND_PCM_FMT_S18_3,
    U18_3 = VIRTIO_SND_PCM_FMT_U18_3,
    S20_3 = VIRTIO_SND_PCM_FMT_S20_3,
    U20_3 = VIRTIO_SND_PCM_FMT_U20_3,
    S24_3 = VIRTIO_SND_PCM_FMT_S24_3,
    U24_3 = VIRTIO_SND_PCM_FMT_U24_3,
    S20 = VIRTIO_SND_PCM_FMT_S20,
    U20 = VIRTIO_SND_PCM_FMT_U20,
    S24 = VIRTIO_SND_PCM_FMT_S24,
    U24 = VIRTIO_SND_PCM_FMT_U24,
    S32 = VIRTIO_SND_PCM_FMT_S32,
    U32 = VIRTIO_SND_PCM_FMT_U32,
    Float = VIRTIO_SND_PCM_FMT_FLOAT,
    Float64 = VIRTIO_SND_PCM_FMT_FLOAT64,
    DsdU8 = VIRTIO_SND_PCM_FMT_DSD_U8,
    DsdU16 = VIRTIO_SND_PCM_FMT_DSD_U16,
    DsdU32 = VIRTIO_SND_PCM_FMT_DSD_U32,
    Iec958Subframe = VIRTIO_SND_PCM_FMT_IEC958_SUBFRAME,
}

impl PcmFormat {
    pub fn from_wire(raw: u8) -> Option<Self> {
        Some(match raw {
            VIRTIO_SND_PCM_FMT_IMA_ADPCM => Self::ImaAdpcm,
            VIRTIO_SND_PCM_FMT_MU_LAW => Self::MuLaw,
            VIRTIO_SND_PCM_FMT_A_LAW => Self::ALaw,
            VIRTIO_SND_PCM_FMT_S8 => Self::S8,
            VIRTIO_SND_PCM_FMT_U8 => Self::U8,
            VIRTIO_SND_PCM_FMT_S16 => Self::S16,
            VIRTIO_SND_PCM_FMT_U16 => Self::U16,
            VIRTIO_SND_PCM_FMT_S18_3 => Self::S18_3,
            VIRTIO_SND_PCM_FMT_U18_3 => Self::U18_3,
            VIRTIO_SND_PCM_FMT_S20_3 => Self::S20_3,
            VIRTIO_SND_PCM_FMT_U20_3 => Self::U20_3,
            VIRTIO_SND_PCM_FMT_S24_3 => Self::S24_3,
            VIRTIO_SND_PCM_FMT_U24_3 => Self::U24_3,
            VIRTIO_SND_PCM_FMT_S20 => Self::S20,
            VIRTIO_SND_PCM_FMT_U20 => Self::U20,
            VIRTIO_SND_PCM_FMT_S24 => Self::S24,
            VIRTIO_SND_PCM_FMT_U24 => Self::U24,
            VIRTIO_SND_PCM_FMT_S32 => Self::S32,
            VIRTIO_SND_PCM_FMT_U32 => Self::U32,
            VIRTIO_SND_PCM_FMT_FLOAT => Self::Float,
            VIRTIO_SND_PCM_FMT_FLOAT64 => Self::Float64,
            VIRTIO_SND_PCM_FMT_DSD_U8 => Self::DsdU8,
            VIRTIO_SND_PCM_FMT_DSD_U16 => Self::DsdU16,
            VIRTIO_SND_PCM_FMT_DSD_U32 => Self::DsdU32,
            VIRTIO_SND_PCM_FMT_IEC958_SUBFRAME => Self::Iec958Subframe,
            _ => return None,
        })
    }

    pub fn to_wire(self) -> u8 {
        self as u8
    }

    pub fn bit(self) -> PcmFormats {
        PcmFormats::from_bits_retain(1u64 << (self as u8))
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PcmRate {
    Hz5512 = VIRTIO_SND_PCM_RATE_5512,
    Hz8000 = VIRTIO_SND_PCM_RATE_8000,
    Hz11025 = VIRTIO_SND_PCM_RATE_11025,
    Hz16000 = VIRTIO_SND_PCM_RATE_16000,
    Hz22050 = VIRTIO_SND_PCM_RATE_22050,
    Hz32000 = VIRTIO_SND_PCM_RATE_32000,
    Hz44100 = VIRTIO_SND_PCM_RATE_44100,
    Hz48000 = VIRTIO_SND_PCM_RATE_48000,
    Hz64000 = VIRTIO_SND_PCM_RATE_64000,
    Hz88200 = VIRTIO_SND_PCM_RATE_88200,
    Hz96000 = VIRTIO_SND_PCM_RATE_96000,
    Hz176400 = VIRTIO_SND_PCM_RATE_176400,
    Hz192000 = VIRTIO_SND_PCM_RATE_192000,
    Hz384000 = VIRTIO_SND_PCM_RATE_384000,
}

impl PcmRate {
    pub fn from_wire(raw: u8) -> Option<Self> {
        Some(match raw {
            VIRTIO_SND_PCM_RATE_5512 => Self::Hz5512,
            VIRTIO_SND_PCM_RATE_8000 => Self::Hz8000,
            VIRTIO_SND_PCM_RATE_11025 => Self::Hz11025,
            VIRTIO_SND_PCM_RATE_16000 => Self::Hz16000,
            VIRTIO_SND_PCM_RATE_22050 => Self::Hz22050,
            VIRTIO_SND_PCM_RATE_32000 => Self::Hz32000,
            VIRTIO_SND_PCM_RATE_44100 => Self::Hz44100,
            VIRTIO_SND_PCM_RATE_48000 => Self::Hz48000,
            VIRTIO_SND_PCM_RATE_64000 => Self::Hz64000,
            VIRTIO_SND_PCM_RATE_88200 => Self::Hz88200,
            VIRTIO_SND_PCM_RATE_96000 => Self::Hz96000,
            VIRTIO_SND_PCM_RATE_176400 => Self::Hz176400,
            VIRTIO_SND_PCM_RATE_192000 => Self::Hz192000,
            VIRTIO_SND_PCM_RATE_384000 => Self::Hz384000,
            _ => return None,
        })
    }

    pub fn to_wire(self) -> u8 {
        self as u8
    }

    pub fn bit(self) -> PcmRates {
        PcmRates::from_bits_retain(1u64 << (self as u8))
    }

    pub fn hz(self) -> u32 {
        match self {
            Self::Hz5512 => 5512,
            Self::Hz8000 => 8000,
            Self::Hz11025 => 11025,
            Self::Hz16000 => 16000,
            Self::Hz22050 => 22050,
            Self::Hz32000 => 32000,
            Self::Hz44100 => 44100,
            Self::Hz48000 => 48000,
            Self::Hz64000 => 64000,
            Self::Hz88200 => 88200,
            Self::Hz96000 => 96000,
            Self::Hz176400 => 176400,
            Self::Hz192000 => 192000,
            Self::Hz384000 => 384000,
        }
    }
}

bitflags! {
    /// `virtio_snd_pcm_info::formats`.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct PcmFormats: u64 {
        const IMA_ADPCM = 1 << VIRTIO_SND_PCM_FMT_IMA_ADPCM;
        const MU_LAW = 1 << VIRTIO_SND_PCM_FMT_MU_LAW;
        const A_LAW = 1 << VIRTIO_SND_PCM_FMT_A_LAW;
        const S8 = 1 << VIRTIO_SND_PCM_FMT_S8;
        const U8 = 1 << VIRTIO_SND_PCM_FMT_U8;
        const S16 = 1 << VIRTIO_SND_PCM_FMT_S16;
        const U16 = 1 << VIRTIO_SND_PCM_FMT_U16;
        const S18_3 = 1 << VIRTIO_SND_PCM_FMT_S18_3;
        const U18_3 = 1 << VIRTIO_SND_PCM_FMT_U18_3;
        const S20_3 = 1 << VIRTIO_SND_PCM_FMT_S20_3;
        const U20_3 = 1 << VIRTIO_SND_PCM_FMT_U20_3;
        const S24_3 = 1 << VIRTIO_SND_PCM_FMT_S24_3;
        const U24_3 = 1 << VIRTIO_SND_PCM_FMT_U24_3;
        const S20 = 1 << VIRTIO_SND_PCM_FMT_S20;
        const U20 = 1 << VIRTIO_SND_PCM_FMT_U20;
        const S24 = 1 << VIRTIO_SND_PCM_FMT_S24;
        const U24 = 1 << VIRTIO_SND_PCM_FMT_U24;
        const S32 = 1 << VIRTIO_SND_PCM_FMT_S32;
        const U32 = 1 << VIRTIO_SND_PCM_FMT_U32;
        const FLOAT = 1 << VIRTIO_SND_PCM_FMT_FLOAT;
        const FLOAT64 = 1 << VIRTIO_SND_PCM_FMT_FLOAT64;
        const DSD_U8 = 1 << VIRTIO_SND_PCM_FMT_DSD_U8;
        const DSD_U16 = 1 << VIRTIO_SND_PCM_FMT_DSD_U16;
        const DSD_U32 = 1 << VIRTIO_SND_PCM_FMT_DSD_U32;
        const IEC958_SUBFRAME = 1 << VIRTIO_SND_PCM_FMT_IEC958_SUBFRAME;
    }
}

bitflags! {
    /// `virtio_snd_pcm_info::rates`.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct PcmRates: u64 {
        const RATE_5512 = 1 << VIRTIO_SND_PCM_RATE_5512;
        const RATE_8000 = 1 << VIRTIO_SND_PCM_RATE_8000;
        const RATE_11025 = 1 << VIRTIO_SND_PCM_RATE_11025;
        const RATE_16000 = 1 << VIRTIO_SND_PCM_RATE_16000;
        const RATE_22050 = 1 << VIRTIO_SND_PCM_RATE_22050;
        const RATE_32000 = 1 << VIRTIO_SND_PCM_RATE_32000;
        const RATE_44100 = 1 << VIRTIO_SND_PCM_RATE_44100;
        const RATE_48000 = 1 << VIRTIO_SND_PCM_RATE_48000;
        const RATE_64000 = 1 << VIRTIO_SND_PCM_RATE_64000;
        const RATE_88200 = 1 << VIRTIO_SND_PCM_RATE_88200;
        const RATE_96000 = 1 << VIRTIO_SND_PCM_RATE_96000;
        const RATE_176400 = 1 << VIRTIO_SND_PCM_RATE_176400;
        const RATE_192000 = 1 << VIRTIO_SND_PCM_RATE_192000;
        const RATE_384000 = 1 << VIRTIO_SND_PCM_RATE_384000;
    }
}

impl PcmFormats {
    /// Formats the device can hand to the host audio layer without conversion.
    pub const HOST_NATIVE: Self = Self::S8
        .union(Self::U8)
        .union(Self::S16)
        .union(Self::U16)
        .union(Self::S32)
        .union(Self::U32)
        .union(Self::FLOAT);

    /// Membership test for a raw wire enumerator. Unknown enumerators are never members.
    pub fn contains_raw(self, raw: u8) -> bool {
        raw < 64 && self.bits() & (1u64 << raw) != 0
    }
}

impl PcmRates {
    pub const HOST_NATIVE: Self = Self::all();

    pub fn contains_raw(self, raw: u8) -> bool {
        raw < 64 && self.bits() & (1u64 << raw) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_splits_streams_rounding_up() {
        let dirs: Vec<_> = (0..5).map(|id| Direction::for_stream(id, 5)).collect();
        assert_eq!(
            dirs,
            [
                Direction::Output,
                Direction::Output,
                Direction::Output,
                Direction::Input,
                Direction::Input
            ]
        );
        assert_eq!(Direction::for_stream(0, 1), Direction::Output);
        assert_eq!(Direction::for_stream(1, 2), Direction::Input);
    }

    #[test]
    fn format_bits_match_enumerators() {
        assert_eq!(PcmFormat::S16.bit(), PcmFormats::S16);
        assert_eq!(PcmFormat::Float.bit().bits(), 1 << 19);
        assert!(PcmFormats::HOST_NATIVE.contains_raw(VIRTIO_SND_PCM_FMT_FLOAT));
        assert!(!PcmFormats::HOST_NATIVE.contains_raw(VIRTIO_SND_PCM_FMT_S24));
        assert!(!PcmFormats::all().contains_raw(200));
        assert_eq!(PcmFormat::from_wire(25), None);
    }

    #[test]
    fn rates_map_to_hz() {
        assert_eq!(PcmRate::from_wire(VIRTIO_SND_PCM_RATE_44100).map(PcmRate::hz), Some(44100));
        assert_eq!(PcmRate::Hz384000.bit(), PcmRates::RATE_384000);
        assert_eq!(PcmRates::HOST_NATIVE.bits().count_ones(), 14);
        assert_eq!(PcmRate::from_wire(14), None);
    }
}
