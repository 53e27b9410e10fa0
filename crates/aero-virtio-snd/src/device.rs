use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use aero_audio::AudioBackend;
use virtio_snd_proto::pcm::Direction;
use virtio_snd_proto::protocol::{
    status_name, PcmStatus, PcmXfer, VIRTIO_DEVICE_TYPE_SND, VIRTIO_SND_NUM_QUEUES,
    VIRTIO_SND_PCM_STATUS_SIZE, VIRTIO_SND_PCM_XFER_SIZE, VIRTIO_SND_QUEUE_CONTROL,
    VIRTIO_SND_QUEUE_EVENT, VIRTIO_SND_QUEUE_RX, VIRTIO_SND_QUEUE_TX, VIRTIO_SND_S_OK,
};

use crate::cmdq::CommandQueue;
use crate::config::{ConfigError, DeviceCapabilities, SndConfig};
use crate::dispatch::dispatch;
use crate::error::SndError;
use crate::params::StreamParams;
use crate::stream::{StreamState, StreamTable};
use crate::transport::{ControlTransport, RequestBuffer};

pub const VIRTIO_F_VERSION_1: u64 = 1 << 32;
pub const VIRTIO_F_IN_ORDER: u64 = 1 << 35;

pub const VIRTIO_SND_QUEUE_MAX_SIZE: u16 = 64;
pub const VIRTIO_SND_CARD_NAME: &str = "virtio-sound";

/// Control requests are at most a few dozen bytes; anything past this is ignored.
const MAX_CTRL_REQUEST_LEN: usize = 64;

/// Surface a virtio transport uses to drive a device model.
pub trait VirtioDevice {
    fn device_type(&self) -> u16;
    fn device_features(&self) -> u64;
    fn set_features(&self, features: u64);
    fn num_queues(&self) -> u16;
    fn queue_max_size(&self, queue: u16) -> u16;

    /// Full device configuration space.
    fn get_config(&self) -> Vec<u8>;
    fn set_config(&self, config: &[u8]);

    /// Services every available buffer on the control queue (`VIRTIO_SND_QUEUE_CONTROL`).
    fn handle_control_request(&self);

    fn reset(&self);

    fn read_config(&self, offset: u64, data: &mut [u8]) {
        let cfg = self.get_config();
        data.fill(0);
        let Ok(start) = usize::try_from(offset) else {
            return;
        };
        if start >= cfg.len() {
            return;
        }
        let n = (cfg.len() - start).min(data.len());
        data[..n].copy_from_slice(&cfg[start..start + n]);
    }

    fn write_config(&self, offset: u64, data: &[u8]) {
        let mut cfg = self.get_config();
        let Ok(start) = usize::try_from(offset) else {
            return;
        };
        if start >= cfg.len() {
            return;
        }
        let n = (cfg.len() - start).min(data.len());
        cfg[start..start + n].copy_from_slice(&data[..n]);
        self.set_config(&cfg);
    }
}

struct Command<Buf> {
    request: Vec<u8>,
    buffer: Buf,
}

/// virtio-snd device model.
///
/// Control requests from any number of threads are queued and executed one at a time in arrival
/// order. Stream state is only touched with the stream table locked, which the command drain holds
/// for a whole pass.
pub struct VirtioSnd<B: AudioBackend, T: ControlTransport> {
    caps: DeviceCapabilities,
    streams: Mutex<StreamTable<B>>,
    cmdq: CommandQueue<Command<T::Buffer>>,
    ctrl: T,
    negotiated_features: AtomicU64,
}

impl<B: AudioBackend, T: ControlTransport> VirtioSnd<B, T> {
    pub fn new(config: SndConfig, backend: B, ctrl: T) -> Result<Self, ConfigError> {
        Self::with_capabilities(DeviceCapabilities::new(config)?, backend, ctrl)
    }

    pub fn with_capabilities(
        caps: DeviceCapabilities,
        mut backend: B,
        ctrl: T,
    ) -> Result<Self, ConfigError> {
        let card = backend
            .register_card(VIRTIO_SND_CARD_NAME)
            .map_err(ConfigError::CardRegistration)?;
        let streams = StreamTable::new(backend, card, &caps);
        tracing::info!(
            jacks = caps.jacks(),
            streams = caps.streams(),
            chmaps = caps.chmaps(),
            "virtio-snd realized"
        );
        Ok(Self {
            caps,
            streams: Mutex::new(streams),
            cmdq: CommandQueue::new(),
            ctrl,
            negotiated_features: AtomicU64::new(0),
        })
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.caps
    }

    pub fn negotiated_features(&self) -> u64 {
        self.negotiated_features.load(Ordering::Acquire)
    }

    fn lock_streams(&self) -> MutexGuard<'_, StreamTable<B>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stream_state(&self, stream_id: u32) -> Option<StreamState> {
        self.lock_streams().state(stream_id).ok()
    }

    pub fn stream_params(&self, stream_id: u32) -> Option<StreamParams> {
        self.lock_streams().params(stream_id).ok().flatten()
    }

    /// Number of commands waiting for a drain.
    pub fn pending_commands(&self) -> usize {
        self.cmdq.len()
    }

    /// Queues one control buffer without processing it. Returns its arrival sequence number.
    pub fn enqueue(&self, buffer: T::Buffer) -> u64 {
        self.cmdq.push(Self::command(buffer))
    }

    fn command(buffer: T::Buffer) -> Command<T::Buffer> {
        let len = buffer.readable_len().min(MAX_CTRL_REQUEST_LEN);
        let mut request = vec![0u8; len];
        let n = buffer.read(0, &mut request);
        request.truncate(n);
        Command { request, buffer }
    }

    /// Moves every available control buffer into the command queue.
    ///
    /// Each buffer is taken from the transport and queued as one step, so concurrent notifications
    /// cannot reorder buffers and a reset never races a buffer that was taken but not yet queued.
    fn intake(&self) -> usize {
        let mut taken = 0;
        while self
            .cmdq
            .push_with(|| self.ctrl.receive_next_request().map(Self::command))
            .is_some()
        {
            taken += 1;
        }
        taken
    }

    /// Runs queued commands to completion unless another thread is already doing so.
    ///
    /// Returns how many commands this call processed.
    pub fn process_cmdq(&self) -> usize {
        self.cmdq.drain_with(&self.streams, |streams, queued| {
            let Command {
                request,
                mut buffer,
            } = queued.item;
            let response = dispatch(streams, &self.caps, &request, buffer.writable_len());

            let mut out = vec![0u8; response.encoded_len().min(buffer.writable_len())];
            let used = response.encode_into(&mut out);
            let used = buffer.write(0, &out[..used]);
            tracing::debug!(
                seq = queued.seq,
                status = status_name(response.status),
                used,
                "control request completed"
            );
            self.ctrl.complete(buffer, used);
        })
    }

    /// Services every available buffer on a PCM transfer queue (`VIRTIO_SND_QUEUE_TX` or
    /// `VIRTIO_SND_QUEUE_RX`). Returns how many buffers were completed.
    pub fn handle_xfer<X: ControlTransport>(&self, queue_index: u16, queue: &X) -> usize {
        let mut completed = 0;
        while let Some(mut buffer) = queue.receive_next_request() {
            let used = {
                let mut streams = self.lock_streams();
                self.process_xfer(&mut streams, queue_index, &mut buffer)
            };
            queue.complete(buffer, used);
            completed += 1;
        }
        completed
    }

    fn process_xfer<Buf: RequestBuffer>(
        &self,
        streams: &mut StreamTable<B>,
        queue_index: u16,
        buffer: &mut Buf,
    ) -> usize {
        let writable = buffer.writable_len();
        if writable < VIRTIO_SND_PCM_STATUS_SIZE {
            tracing::warn!(queue_index, writable, "pcm buffer has no room for a status");
            return 0;
        }
        let status_at = writable - VIRTIO_SND_PCM_STATUS_SIZE;

        let mut hdr = [0u8; VIRTIO_SND_PCM_XFER_SIZE];
        let n = buffer.read(0, &mut hdr);
        let result = PcmXfer::decode(&hdr[..n])
            .map_err(SndError::from)
            .and_then(|xfer| match queue_index {
                VIRTIO_SND_QUEUE_TX => {
                    let len = buffer.readable_len().saturating_sub(VIRTIO_SND_PCM_XFER_SIZE);
                    let mut payload = vec![0u8; len];
                    let n = buffer.read(VIRTIO_SND_PCM_XFER_SIZE, &mut payload);
                    streams.write(xfer.stream_id, &payload[..n]).map(drop)
                }
                VIRTIO_SND_QUEUE_RX => {
                    let mut payload = vec![0u8; status_at];
                    let n = streams.read(xfer.stream_id, &mut payload)?;
                    buffer.write(0, &payload[..n.min(status_at)]);
                    Ok(())
                }
                VIRTIO_SND_QUEUE_CONTROL => Err(SndError::DirectionMismatch {
                    stream_id: xfer.stream_id,
                    queue: "control",
                }),
                VIRTIO_SND_QUEUE_EVENT => Err(SndError::DirectionMismatch {
                    stream_id: xfer.stream_id,
                    queue: "event",
                }),
                _ => Err(SndError::DirectionMismatch {
                    stream_id: xfer.stream_id,
                    queue: "unknown",
                }),
            });

        let status = match result {
            Ok(()) => VIRTIO_SND_S_OK,
            Err(err) => {
                tracing::warn!(queue_index, %err, "pcm transfer rejected");
                err.status()
            }
        };
        // The status trailer always occupies the last bytes of the writable area.
        let pcm_status = PcmStatus {
            status,
            latency_bytes: 0,
        };
        buffer.write(status_at, &pcm_status.to_le_bytes());
        writable
    }

    pub fn direction(&self, stream_id: u32) -> Option<Direction> {
        (stream_id < self.caps.streams()).then(|| self.caps.direction(stream_id))
    }
}

impl<B: AudioBackend, T: ControlTransport> VirtioDevice for VirtioSnd<B, T> {
    fn device_type(&self) -> u16 {
        VIRTIO_DEVICE_TYPE_SND
    }

    fn device_features(&self) -> u64 {
        VIRTIO_F_VERSION_1 | VIRTIO_F_IN_ORDER
    }

    fn set_features(&self, features: u64) {
        self.negotiated_features
            .store(features & self.device_features(), Ordering::Release);
    }

    fn num_queues(&self) -> u16 {
        VIRTIO_SND_NUM_QUEUES
    }

    fn queue_max_size(&self, queue: u16) -> u16 {
        if queue < VIRTIO_SND_NUM_QUEUES {
            VIRTIO_SND_QUEUE_MAX_SIZE
        } else {
            0
        }
    }

    fn get_config(&self) -> Vec<u8> {
        self.caps.config_space().to_le_bytes().to_vec()
    }

    fn set_config(&self, config: &[u8]) {
        if config != self.get_config().as_slice() {
            tracing::warn!("virtio-snd configuration space is read-only; ignoring write");
        }
    }

    fn handle_control_request(&self) {
        let taken = self.intake();
        tracing::trace!(taken, "control queue notified");
        self.process_cmdq();
    }

    fn reset(&self) {
        let dropped = self.cmdq.clear();
        self.lock_streams().reset();
        self.negotiated_features.store(0, Ordering::Release);
        tracing::info!(dropped, "virtio-snd reset");
    }
}

impl<B: AudioBackend, T: ControlTransport> Drop for VirtioSnd<B, T> {
    fn drop(&mut self) {
        self.cmdq.clear();
        self.streams
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .shutdown();
        tracing::info!("virtio-snd unrealized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackTransport;
    use aero_audio::NullBackend;
    use std::sync::Arc;

    fn device(streams: u32) -> (VirtioSnd<NullBackend, Arc<LoopbackTransport>>, NullBackend, Arc<LoopbackTransport>) {
        let observer = NullBackend::new();
        let ctrl = Arc::new(LoopbackTransport::new());
        let dev = VirtioSnd::new(
            SndConfig {
                streams,
                ..SndConfig::default()
            },
            observer.clone(),
            Arc::clone(&ctrl),
        )
        .unwrap();
        (dev, observer, ctrl)
    }

    #[test]
    fn device_identity() {
        let (dev, _, _) = device(2);
        assert_eq!(dev.device_type(), 25);
        assert_eq!(dev.num_queues(), 4);
        assert_eq!(dev.queue_max_size(VIRTIO_SND_QUEUE_CONTROL), 64);
        assert_eq!(dev.queue_max_size(VIRTIO_SND_QUEUE_RX), 64);
        assert_eq!(dev.queue_max_size(VIRTIO_SND_NUM_QUEUES), 0);
        assert_eq!(dev.device_features(), (1 << 32) | (1 << 35));
        dev.set_features(u64::MAX);
        assert_eq!(dev.negotiated_features(), dev.device_features());
    }

    #[test]
    fn config_window_reads_zero_fill() {
        let (dev, _, _) = device(4);
        let mut data = [0xffu8; 8];
        dev.read_config(4, &mut data);
        assert_eq!(data, [4, 0, 0, 0, 0, 0, 0, 0]);
        dev.read_config(64, &mut data);
        assert_eq!(data, [0; 8]);
    }

    #[test]
    fn config_writes_are_ignored() {
        let (dev, _, _) = device(4);
        dev.write_config(4, &[9, 0, 0, 0]);
        let mut data = [0u8; 4];
        dev.read_config(4, &mut data);
        assert_eq!(u32::from_le_bytes(data), 4);
    }

    #[test]
    fn card_lives_as_long_as_the_device() {
        let (dev, observer, _) = device(1);
        assert_eq!(observer.card_names(), vec![VIRTIO_SND_CARD_NAME.to_string()]);
        drop(dev);
        assert!(observer.card_names().is_empty());
    }

    #[test]
    fn card_registration_failure_is_fatal() {
        let backend = NullBackend::new();
        backend.refuse_cards(true);
        let err = VirtioSnd::new(SndConfig::default(), backend, LoopbackTransport::new())
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::CardRegistration(_)));
    }

    #[test]
    fn direction_lookup() {
        let (dev, _, _) = device(5);
        assert_eq!(dev.direction(2), Some(Direction::Output));
        assert_eq!(dev.direction(3), Some(Direction::Input));
        assert_eq!(dev.direction(5), None);
    }
}
