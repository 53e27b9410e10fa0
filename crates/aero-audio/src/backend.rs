use thiserror::Error;

/// Opaque handle to a registered sound card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CardHandle(pub u64);

/// Opaque handle to an open playback or capture voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceDirection {
    /// Guest to host.
    Playback,
    /// Host to guest.
    Capture,
}

/// Sample formats the host audio layer accepts without conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostFormat {
    U8,
    S8,
    U16,
    S16,
    U32,
    S32,
    F32,
}

impl HostFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 | Self::S8 => 1,
            Self::U16 | Self::S16 => 2,
            Self::U32 | Self::S32 | Self::F32 => 4,
        }
    }

    /// Byte pattern of one silent sample.
    pub fn silence(self, endianness: Endianness) -> Vec<u8> {
        let mut sample = vec![0u8; self.bytes_per_sample()];
        let midpoint = match self {
            Self::U8 | Self::U16 | Self::U32 => 0x80,
            _ => return sample,
        };
        let msb = match endianness {
            Endianness::Little => sample.len() - 1,
            Endianness::Big => 0,
        };
        sample[msb] = midpoint;
        sample
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub const fn host() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }
}

/// Settings a voice is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSettings {
    pub channels: u8,
    pub format: HostFormat,
    pub freq: u32,
    pub endianness: Endianness,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("sound card {0:?} is not available")]
    CardUnavailable(String),

    #[error("failed to open voice {name}: {reason}")]
    VoiceUnavailable { name: String, reason: String },

    #[error("unknown voice {0:?}")]
    UnknownVoice(VoiceHandle),
}

/// Host audio collaborator used by emulated sound devices.
///
/// Handles are only meaningful to the backend that issued them. Closing or unregistering a handle
/// the backend does not know is a no-op.
pub trait AudioBackend: Send {
    fn register_card(&mut self, name: &str) -> Result<CardHandle, BackendError>;

    fn unregister_card(&mut self, card: CardHandle);

    fn open_voice(
        &mut self,
        card: CardHandle,
        direction: VoiceDirection,
        name: &str,
        settings: &AudioSettings,
    ) -> Result<VoiceHandle, BackendError>;

    fn close_voice(&mut self, voice: VoiceHandle);

    /// Starts or pauses sample flow on `voice`.
    fn set_active(&mut self, voice: VoiceHandle, active: bool) -> Result<(), BackendError>;

    /// Queues interleaved playback samples. Returns how many bytes were accepted.
    fn write(&mut self, voice: VoiceHandle, samples: &[u8]) -> Result<usize, BackendError>;

    /// Fills `out` with captured samples. Returns how many bytes were produced.
    fn read(&mut self, voice: VoiceHandle, out: &mut [u8]) -> Result<usize, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_silence_sits_at_midpoint() {
        assert_eq!(HostFormat::U8.silence(Endianness::Little), vec![0x80]);
        assert_eq!(HostFormat::U16.silence(Endianness::Little), vec![0x00, 0x80]);
        assert_eq!(HostFormat::U16.silence(Endianness::Big), vec![0x80, 0x00]);
        assert_eq!(HostFormat::S32.silence(Endianness::Little), vec![0; 4]);
        assert_eq!(HostFormat::F32.silence(Endianness::Big), vec![0; 4]);
    }
}
