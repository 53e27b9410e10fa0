//! Device-wide configuration and the capabilities derived from it.

use aero_audio::{BackendError, MAX_CHANNELS};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use virtio_snd_proto::pcm::{Direction, PcmFormats, PcmRates};
use virtio_snd_proto::protocol::{PcmInfo, VirtioSndConfig, VIRTIO_SND_CHMAP_MAX_SIZE};

pub const MAX_JACKS: u32 = 8;
pub const MAX_STREAMS: u32 = 10;
pub const MAX_CHMAPS: u32 = VIRTIO_SND_CHMAP_MAX_SIZE;

/// Fatal problems found while bringing the device up.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid number of jacks: {0} (at most {})", MAX_JACKS)]
    TooManyJacks(u32),

    #[error("invalid number of streams: {0} (expected 1..={})", MAX_STREAMS)]
    InvalidStreamCount(u32),

    #[error("invalid number of channel maps: {0} (at most {})", MAX_CHMAPS)]
    TooManyChmaps(u32),

    #[error("failed to register sound card")]
    CardRegistration(#[source] BackendError),
}

/// User-facing device properties, as carried in a machine description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SndConfig {
    pub jacks: u32,
    pub streams: u32,
    pub chmaps: u32,
}

impl Default for SndConfig {
    fn default() -> Self {
        Self {
            jacks: 0,
            streams: 1,
            chmaps: 0,
        }
    }
}

impl SndConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jacks > MAX_JACKS {
            return Err(ConfigError::TooManyJacks(self.jacks));
        }
        if self.streams < 1 || self.streams > MAX_STREAMS {
            return Err(ConfigError::InvalidStreamCount(self.streams));
        }
        if self.chmaps > MAX_CHMAPS {
            return Err(ConfigError::TooManyChmaps(self.chmaps));
        }
        Ok(())
    }
}

/// Immutable description of what the device offers the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapabilities {
    config: SndConfig,
    formats: PcmFormats,
    rates: PcmRates,
}

impl DeviceCapabilities {
    pub fn new(config: SndConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            formats: PcmFormats::HOST_NATIVE,
            rates: PcmRates::HOST_NATIVE,
        })
    }

    /// Restricts the advertised sample formats. Formats the host layer cannot take are dropped.
    pub fn with_formats(mut self, formats: PcmFormats) -> Self {
        self.formats = formats & PcmFormats::HOST_NATIVE;
        self
    }

    pub fn with_rates(mut self, rates: PcmRates) -> Self {
        self.rates = rates & PcmRates::HOST_NATIVE;
        self
    }

    pub fn config(&self) -> SndConfig {
        self.config
    }

    pub fn jacks(&self) -> u32 {
        self.config.jacks
    }

    pub fn streams(&self) -> u32 {
        self.config.streams
    }

    pub fn chmaps(&self) -> u32 {
        self.config.chmaps
    }

    pub fn formats(&self) -> PcmFormats {
        self.formats
    }

    pub fn rates(&self) -> PcmRates {
        self.rates
    }

    pub fn direction(&self, stream_id: u32) -> Direction {
        Direction::for_stream(stream_id, self.config.streams)
    }

    /// The `virtio_snd_pcm_info` record for `stream_id`. Independent of stream state.
    pub fn stream_info(&self, stream_id: u32) -> PcmInfo {
        let direction = self.direction(stream_id);
        PcmInfo {
            hda_fn_nid: u32::from(direction.to_wire()),
            features: 0,
            formats: self.formats,
            rates: self.rates,
            direction,
            channels_min: 1,
            channels_max: MAX_CHANNELS,
        }
    }

    pub fn config_space(&self) -> VirtioSndConfig {
        VirtioSndConfig {
            jacks: self.config.jacks,
            streams: self.config.streams,
            chmaps: self.config.chmaps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_device_properties() {
        let cfg = SndConfig::default();
        assert_eq!((cfg.jacks, cfg.streams, cfg.chmaps), (0, 1, 0));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn range_checks() {
        let bad_jacks = SndConfig {
            jacks: 9,
            ..SndConfig::default()
        };
        assert!(matches!(
            bad_jacks.validate(),
            Err(ConfigError::TooManyJacks(9))
        ));

        for streams in [0, 11] {
            let cfg = SndConfig {
                streams,
                ..SndConfig::default()
            };
            assert!(matches!(
                DeviceCapabilities::new(cfg),
                Err(ConfigError::InvalidStreamCount(s)) if s == streams
            ));
        }

        let bad_chmaps = SndConfig {
            chmaps: 19,
            ..SndConfig::default()
        };
        assert!(matches!(
            bad_chmaps.validate(),
            Err(ConfigError::TooManyChmaps(19))
        ));

        let edge = SndConfig {
            jacks: 8,
            streams: 10,
            chmaps: 18,
        };
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn narrowed_formats_stay_within_host_set() {
        let caps = DeviceCapabilities::new(SndConfig::default())
            .unwrap()
            .with_formats(PcmFormats::S16 | PcmFormats::S24);
        assert_eq!(caps.formats(), PcmFormats::S16);
    }

    #[test]
    fn info_records_follow_direction() {
        let caps = DeviceCapabilities::new(SndConfig {
            streams: 3,
            ..SndConfig::default()
        })
        .unwrap();
        let out = caps.stream_info(1);
        assert_eq!(out.direction, Direction::Output);
        assert_eq!(out.hda_fn_nid, 0);
        let input = caps.stream_info(2);
        assert_eq!(input.direction, Direction::Input);
        assert_eq!(input.hda_fn_nid, 1);
        assert_eq!((input.channels_min, input.channels_max), (1, 16));
    }

    #[test]
    fn config_parses_from_json_with_defaults() {
        let cfg: SndConfig = serde_json::from_str(r#"{"streams": 4}"#).unwrap();
        assert_eq!(
            cfg,
            SndConfig {
                jacks: 0,
                streams: 4,
                chmaps: 0
            }
        );
        assert!(serde_json::from_str::<SndConfig>(r#"{"voices": 2}"#).is_err());
    }
}
