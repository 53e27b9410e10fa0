use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::backend::{
    AudioBackend, AudioSettings, BackendError, CardHandle, VoiceDirection, VoiceHandle,
};

/// Bookkeeping for one voice opened on a [`NullBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullVoice {
    pub card: CardHandle,
    pub direction: VoiceDirection,
    pub name: String,
    pub settings: AudioSettings,
    pub active: bool,
    pub bytes_written: u64,
    pub bytes_read: u64,
}

#[derive(Debug, Default)]
struct NullState {
    next_handle: u64,
    cards: BTreeMap<u64, String>,
    voices: BTreeMap<u64, NullVoice>,
    refuse_cards: bool,
    refuse_voices: bool,
}

impl NullState {
    fn alloc(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// Backend that accepts every playback sample and captures silence.
///
/// Clones share state, so a caller can keep a clone to observe what a device did with the one it
/// handed over.
#[derive(Debug, Clone, Default)]
pub struct NullBackend {
    state: Arc<Mutex<NullState>>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, NullState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes subsequent `register_card` calls fail.
    pub fn refuse_cards(&self, refuse: bool) {
        self.state().refuse_cards = refuse;
    }

    /// Makes subsequent `open_voice` calls fail.
    pub fn refuse_voices(&self, refuse: bool) {
        self.state().refuse_voices = refuse;
    }

    pub fn card_names(&self) -> Vec<String> {
        self.state().cards.values().cloned().collect()
    }

    pub fn voice(&self, voice: VoiceHandle) -> Option<NullVoice> {
        self.state().voices.get(&voice.0).cloned()
    }

    /// Open voices in the order they were opened.
    pub fn open_voices(&self) -> Vec<(VoiceHandle, NullVoice)> {
        self.state()
            .voices
            .iter()
            .map(|(&id, v)| (VoiceHandle(id), v.clone()))
            .collect()
    }
}

impl AudioBackend for NullBackend {
    fn register_card(&mut self, name: &str) -> Result<CardHandle, BackendError> {
        let mut state = self.state();
        if state.refuse_cards {
            return Err(BackendError::CardUnavailable(name.to_string()));
        }
        let id = state.alloc();
        state.cards.insert(id, name.to_string());
        tracing::debug!(card = id, name, "null audio: card registered");
        Ok(CardHandle(id))
    }

    fn unregister_card(&mut self, card: CardHandle) {
        self.state().cards.remove(&card.0);
    }

    fn open_voice(
        &mut self,
        card: CardHandle,
        direction: VoiceDirection,
        name: &str,
        settings: &AudioSettings,
    ) -> Result<VoiceHandle, BackendError> {
        let mut state = self.state();
        if state.refuse_voices {
            return Err(BackendError::VoiceUnavailable {
                name: name.to_string(),
                reason: "voice creation disabled".to_string(),
            });
        }
        if !state.cards.contains_key(&card.0) {
            return Err(BackendError::VoiceUnavailable {
                name: name.to_string(),
                reason: format!("card {} is not registered", card.0),
            });
        }
        let id = state.alloc();
        state.voices.insert(
            id,
            NullVoice {
                card,
                direction,
                name: name.to_string(),
                settings: *settings,
                active: false,
                bytes_written: 0,
                bytes_read: 0,
            },
        );
        tracing::debug!(voice = id, name, ?settings, "null audio: voice opened");
        Ok(VoiceHandle(id))
    }

    fn close_voice(&mut self, voice: VoiceHandle) {
        self.state().voices.remove(&voice.0);
    }

    fn set_active(&mut self, voice: VoiceHandle, active: bool) -> Result<(), BackendError> {
        let mut state = self.state();
        let v = state
            .voices
            .get_mut(&voice.0)
            .ok_or(BackendError::UnknownVoice(voice))?;
        v.active = active;
        Ok(())
    }

    fn write(&mut self, voice: VoiceHandle, samples: &[u8]) -> Result<usize, BackendError> {
        let mut state = self.state();
        let v = state
            .voices
            .get_mut(&voice.0)
            .ok_or(BackendError::UnknownVoice(voice))?;
        v.bytes_written += samples.len() as u64;
        Ok(samples.len())
    }

    fn read(&mut self, voice: VoiceHandle, out: &mut [u8]) -> Result<usize, BackendError> {
        let mut state = self.state();
        let v = state
            .voices
            .get_mut(&voice.0)
            .ok_or(BackendError::UnknownVoice(voice))?;
        fill_silence(&v.settings, out);
        v.bytes_read += out.len() as u64;
        Ok(out.len())
    }
}

fn fill_silence(settings: &AudioSettings, out: &mut [u8]) {
    let pattern = settings.format.silence(settings.endianness);
    for (i, b) in out.iter_mut().enumerate() {
        *b = pattern[i % pattern.len()];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Endianness, HostFormat};

    fn settings(format: HostFormat) -> AudioSettings {
        AudioSettings {
            channels: 2,
            format,
            freq: 48_000,
            endianness: Endianness::Little,
        }
    }

    #[test]
    fn voices_require_a_registered_card() {
        let mut backend = NullBackend::new();
        let err = backend
            .open_voice(
                CardHandle(42),
                VoiceDirection::Playback,
                "out",
                &settings(HostFormat::S16),
            )
            .unwrap_err();
        assert!(matches!(err, BackendError::VoiceUnavailable { .. }));

        let card = backend.register_card("card").unwrap();
        let voice = backend
            .open_voice(card, VoiceDirection::Playback, "out", &settings(HostFormat::S16))
            .unwrap();
        assert_eq!(backend.open_voices().len(), 1);
        backend.close_voice(voice);
        assert!(backend.open_voices().is_empty());
    }

    #[test]
    fn clones_observe_the_same_state() {
        let observer = NullBackend::new();
        let mut backend = observer.clone();
        let card = backend.register_card("virtio-sound").unwrap();
        let voice = backend
            .open_voice(card, VoiceDirection::Playback, "out", &settings(HostFormat::S16))
            .unwrap();
        backend.set_active(voice, true).unwrap();
        assert_eq!(backend.write(voice, &[0; 64]).unwrap(), 64);

        let seen = observer.voice(voice).unwrap();
        assert!(seen.active);
        assert_eq!(seen.bytes_written, 64);
        assert_eq!(observer.card_names(), vec!["virtio-sound".to_string()]);
    }

    #[test]
    fn capture_produces_format_silence() {
        let mut backend = NullBackend::new();
        let card = backend.register_card("card").unwrap();
        let voice = backend
            .open_voice(card, VoiceDirection::Capture, "in", &settings(HostFormat::U8))
            .unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(backend.read(voice, &mut buf).unwrap(), 8);
        assert_eq!(buf, [0x80; 8]);
    }

    #[test]
    fn unknown_voices_are_reported() {
        let mut backend = NullBackend::new();
        assert_eq!(
            backend.set_active(VoiceHandle(7), true),
            Err(BackendError::UnknownVoice(VoiceHandle(7)))
        );
        assert_eq!(
            backend.write(VoiceHandle(7), &[1]),
            Err(BackendError::UnknownVoice(VoiceHandle(7)))
        );
    }

    #[test]
    fn refusal_switches() {
        let mut backend = NullBackend::new();
        backend.refuse_cards(true);
        assert!(matches!(
            backend.register_card("card"),
            Err(BackendError::CardUnavailable(_))
        ));
        backend.refuse_cards(false);
        let card = backend.register_card("card").unwrap();
        backend.refuse_voices(true);
        assert!(backend
            .open_voice(card, VoiceDirection::Capture, "in", &settings(HostFormat::S8))
            .is_err());
    }
}
