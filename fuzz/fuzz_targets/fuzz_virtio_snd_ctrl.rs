#![no_main]

use std::sync::Arc;

use arbitrary::Unstructured;
use libfuzzer_sys::fuzz_target;

use aero_audio::NullBackend;
use aero_virtio_snd::{LoopbackTransport, SndConfig, StreamState, VirtioDevice, VirtioSnd};
use virtio_snd_proto::protocol::{
    VIRTIO_SND_QUEUE_RX, VIRTIO_SND_QUEUE_TX, VIRTIO_SND_S_BAD_MSG, VIRTIO_SND_S_IO_ERR,
    VIRTIO_SND_S_NOT_SUPP, VIRTIO_SND_S_OK,
};

const MAX_INPUT_LEN: usize = 4096;
const MAX_REQUESTS: usize = 32;
const MAX_REQUEST_LEN: usize = 64;
const MAX_RESPONSE_LEN: usize = 1024;

fuzz_target!(|data: &[u8]| {
    let data = &data[..data.len().min(MAX_INPUT_LEN)];
    let mut u = Unstructured::new(data);

    let streams = 1 + u32::from(u.arbitrary::<u8>().unwrap_or(0) % 10);
    let audio = NullBackend::new();
    let ctrl = Arc::new(LoopbackTransport::new());
    let Ok(dev) = VirtioSnd::new(
        SndConfig {
            streams,
            ..SndConfig::default()
        },
        audio.clone(),
        Arc::clone(&ctrl),
    ) else {
        return;
    };

    let mut submitted = 0usize;
    for _ in 0..MAX_REQUESTS {
        if u.is_empty() {
            break;
        }
        match u.arbitrary::<u8>().unwrap_or(0) % 8 {
            // Reset with whatever is still queued.
            0 => {
                let req_len = usize::from(u.arbitrary::<u8>().unwrap_or(0)) % MAX_REQUEST_LEN;
                let req = u.bytes(req_len).unwrap_or(&[]).to_vec();
                dev.enqueue(ctrl.buffer(req, 4));
                dev.reset();
                assert_eq!(dev.pending_commands(), 0);
            }
            // PCM transfer on a random stream.
            1 => {
                let queue = if u.arbitrary::<bool>().unwrap_or(false) {
                    VIRTIO_SND_QUEUE_TX
                } else {
                    VIRTIO_SND_QUEUE_RX
                };
                let req_len = usize::from(u.arbitrary::<u8>().unwrap_or(0)) % MAX_REQUEST_LEN;
                let req = u.bytes(req_len).unwrap_or(&[]).to_vec();
                let resp_len = usize::from(u.arbitrary::<u8>().unwrap_or(0));
                let xfer = LoopbackTransport::new();
                xfer.submit(req, resp_len);
                assert_eq!(dev.handle_xfer(queue, &xfer), 1);
                for done in xfer.take_completions() {
                    assert!(done.used_len <= resp_len);
                }
            }
            _ => {
                let req_len = usize::from(u.arbitrary::<u8>().unwrap_or(0)) % MAX_REQUEST_LEN;
                let req = u.bytes(req_len).unwrap_or(&[]).to_vec();
                let resp_len = usize::from(u.arbitrary::<u16>().unwrap_or(0)) % MAX_RESPONSE_LEN;
                ctrl.submit(req, resp_len);
                submitted += 1;
                dev.handle_control_request();
            }
        }
    }

    // Every submitted control request gets exactly one well-formed answer.
    let done = ctrl.take_completions();
    assert_eq!(done.len(), submitted);
    for c in &done {
        assert!(c.used_len == 0 || c.used_len >= 4);
        if c.used_len >= 4 {
            let status = u32::from_le_bytes([c.data[0], c.data[1], c.data[2], c.data[3]]);
            assert!(matches!(
                status,
                VIRTIO_SND_S_OK | VIRTIO_SND_S_BAD_MSG | VIRTIO_SND_S_NOT_SUPP | VIRTIO_SND_S_IO_ERR
            ));
        }
    }

    // Released streams never hold a voice.
    let live = (0..streams)
        .filter(|&id| {
            !matches!(
                dev.stream_state(id),
                None | Some(StreamState::Uninitialized)
            )
        })
        .count();
    assert!(audio.open_voices().len() <= live);
});
