//! Per-stream state machine.
//!
//! ```text
//! Uninitialized --set_params--> Configured --prepare--> Prepared --start--> Running
//!                                    ^          (re-prepare)  ^                |
//!                                    |                        +------stop------+
//!             set_params from any state lands in Configured
//!             release from any initialized state lands in Uninitialized
//! ```

use aero_audio::{AudioBackend, CardHandle, VoiceDirection, VoiceHandle};
use virtio_snd_proto::pcm::Direction;
use virtio_snd_proto::protocol::{PcmInfo, PcmSetParams};

use crate::config::DeviceCapabilities;
use crate::error::{Result, SndError};
use crate::params::{validate, StreamParams, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    Uninitialized,
    Configured,
    Prepared,
    Running,
}

#[derive(Debug)]
struct Stream {
    direction: Direction,
    state: StreamState,
    params: Option<StreamParams>,
    voice: Option<VoiceHandle>,
}

impl Stream {
    fn configured(direction: Direction) -> Self {
        Self {
            direction,
            state: StreamState::Configured,
            params: Some(StreamParams::default()),
            voice: None,
        }
    }
}

/// All streams of one device plus the backend their voices live on.
pub struct StreamTable<B: AudioBackend> {
    backend: B,
    card: CardHandle,
    streams: Vec<Stream>,
}

impl<B: AudioBackend> StreamTable<B> {
    /// Every stream starts Configured with the default parameters.
    pub fn new(backend: B, card: CardHandle, caps: &DeviceCapabilities) -> Self {
        let streams = (0..caps.streams())
            .map(|id| Stream::configured(caps.direction(id)))
            .collect();
        Self {
            backend,
            card,
            streams,
        }
    }

    pub fn len(&self) -> u32 {
        self.streams.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    fn index(&self, stream_id: u32) -> Result<usize> {
        let streams = self.len();
        if stream_id >= streams {
            return Err(SndError::InvalidStreamId { stream_id, streams });
        }
        Ok(stream_id as usize)
    }

    pub fn state(&self, stream_id: u32) -> Result<StreamState> {
        Ok(self.streams[self.index(stream_id)?].state)
    }

    pub fn params(&self, stream_id: u32) -> Result<Option<StreamParams>> {
        Ok(self.streams[self.index(stream_id)?].params)
    }

    pub fn direction(&self, stream_id: u32) -> Result<Direction> {
        Ok(self.streams[self.index(stream_id)?].direction)
    }

    pub fn voice(&self, stream_id: u32) -> Result<Option<VoiceHandle>> {
        Ok(self.streams[self.index(stream_id)?].voice)
    }

    /// Info records for `count` streams starting at `start_id`.
    pub fn info(
        &self,
        caps: &DeviceCapabilities,
        start_id: u32,
        count: u32,
    ) -> Result<Vec<PcmInfo>> {
        let streams = self.len();
        match start_id.checked_add(count) {
            Some(end) if end <= streams => Ok((start_id..end).map(|id| caps.stream_info(id)).collect()),
            _ => Err(SndError::InvalidStreamId {
                stream_id: start_id.saturating_add(count).saturating_sub(1),
                streams,
            }),
        }
    }

    /// Validates and stores new parameters. A rejected request leaves the stream untouched.
    pub fn set_params(&mut self, caps: &DeviceCapabilities, req: &PcmSetParams) -> Result<()> {
        let idx = self.index(req.stream_id)?;
        let params = validate(caps, req)?;

        let stream = &mut self.streams[idx];
        if stream.state == StreamState::Running {
            // The driver must prepare again before restarting; keep the voice but silence it.
            if let Some(voice) = stream.voice {
                if let Err(err) = self.backend.set_active(voice, false) {
                    tracing::warn!(stream_id = req.stream_id, %err, "failed to pause voice");
                }
            }
        }
        stream.params = Some(params);
        stream.state = StreamState::Configured;
        tracing::debug!(stream_id = req.stream_id, ?params, "stream configured");
        Ok(())
    }

    pub fn prepare(&mut self, stream_id: u32) -> Result<()> {
        let idx = self.index(stream_id)?;
        let stream = &self.streams[idx];
        let params = match (stream.state, stream.params) {
            (StreamState::Configured | StreamState::Prepared, Some(params)) => params,
            (state, _) => return Err(illegal(stream_id, "prepare", state)),
        };
        let settings = params
            .host_settings()
            .ok_or(ValidationError::Format(params.format.to_wire()))?;

        if let Some(old) = self.streams[idx].voice.take() {
            self.backend.close_voice(old);
        }

        let (direction, name) = match self.streams[idx].direction {
            Direction::Output => (VoiceDirection::Playback, format!("virtio-sound.out.{stream_id}")),
            Direction::Input => (VoiceDirection::Capture, format!("virtio-sound.in.{stream_id}")),
        };
        match self.backend.open_voice(self.card, direction, &name, &settings) {
            Ok(voice) => {
                let stream = &mut self.streams[idx];
                stream.voice = Some(voice);
                stream.state = StreamState::Prepared;
                tracing::debug!(stream_id, ?settings, "stream prepared");
                Ok(())
            }
            Err(err) => {
                self.streams[idx].state = StreamState::Configured;
                Err(err.into())
            }
        }
    }

    pub fn start(&mut self, stream_id: u32) -> Result<()> {
        self.toggle(stream_id, "start", StreamState::Prepared, StreamState::Running, true)
    }

    pub fn stop(&mut self, stream_id: u32) -> Result<()> {
        self.toggle(stream_id, "stop", StreamState::Running, StreamState::Prepared, false)
    }

    fn toggle(
        &mut self,
        stream_id: u32,
        op: &'static str,
        from: StreamState,
        to: StreamState,
        active: bool,
    ) -> Result<()> {
        let idx = self.index(stream_id)?;
        let stream = &self.streams[idx];
        let voice = match (stream.state, stream.voice) {
            (state, Some(voice)) if state == from => voice,
            (state, _) => return Err(illegal(stream_id, op, state)),
        };
        self.backend.set_active(voice, active)?;
        self.streams[idx].state = to;
        tracing::debug!(stream_id, state = ?to, "stream {op}");
        Ok(())
    }

    pub fn release(&mut self, stream_id: u32) -> Result<()> {
        let idx = self.index(stream_id)?;
        let stream = &mut self.streams[idx];
        if stream.state == StreamState::Uninitialized {
            return Err(illegal(stream_id, "release", stream.state));
        }
        if let Some(voice) = stream.voice.take() {
            self.backend.close_voice(voice);
        }
        stream.params = None;
        stream.state = StreamState::Uninitialized;
        tracing::debug!(stream_id, "stream released");
        Ok(())
    }

    /// Voice of `stream_id` if it is prepared or running and carries traffic in `direction`.
    fn io_voice(&self, stream_id: u32, direction: Direction, queue: &'static str) -> Result<VoiceHandle> {
        let stream = &self.streams[self.index(stream_id)?];
        if stream.direction != direction {
            return Err(SndError::DirectionMismatch { stream_id, queue });
        }
        match (stream.state, stream.voice) {
            (StreamState::Prepared | StreamState::Running, Some(voice)) => Ok(voice),
            // A stream reconfigured while running keeps its paused voice until the next prepare.
            _ => Err(SndError::NoVoice { stream_id }),
        }
    }

    /// Hands playback samples for an output stream to its voice.
    pub fn write(&mut self, stream_id: u32, samples: &[u8]) -> Result<usize> {
        let voice = self.io_voice(stream_id, Direction::Output, "tx")?;
        Ok(self.backend.write(voice, samples)?)
    }

    /// Fills `out` with captured samples for an input stream.
    pub fn read(&mut self, stream_id: u32, out: &mut [u8]) -> Result<usize> {
        let voice = self.io_voice(stream_id, Direction::Input, "rx")?;
        Ok(self.backend.read(voice, out)?)
    }

    /// Closes every open voice. Stream states are left as they are.
    pub fn close_all(&mut self) {
        for stream in &mut self.streams {
            if let Some(voice) = stream.voice.take() {
                self.backend.close_voice(voice);
            }
        }
    }

    /// Closes every voice and puts every stream back to its power-on configuration.
    pub fn reset(&mut self) {
        self.close_all();
        for stream in &mut self.streams {
            *stream = Stream::configured(stream.direction);
        }
    }

    /// Closes every voice and gives the card back to the backend.
    pub fn shutdown(&mut self) {
        self.close_all();
        self.backend.unregister_card(self.card);
    }
}

fn illegal(stream_id: u32, op: &'static str, state: StreamState) -> SndError {
    SndError::IllegalStateTransition {
        stream_id,
        op,
        state,
    }
}
