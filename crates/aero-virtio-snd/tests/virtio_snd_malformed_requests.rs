mod common;

use common::{set_params, status_of, Harness};

use aero_virtio_snd::{StreamParams, StreamState};
use virtio_snd_proto::pcm::{VIRTIO_SND_PCM_FMT_U8, VIRTIO_SND_PCM_RATE_8000};
use virtio_snd_proto::protocol::{
    Request, VIRTIO_SND_R_CHMAP_INFO, VIRTIO_SND_R_JACK_INFO, VIRTIO_SND_R_JACK_REMAP,
    VIRTIO_SND_S_BAD_MSG, VIRTIO_SND_S_NOT_SUPP, VIRTIO_SND_S_OK,
};

#[test]
fn truncated_requests_get_bad_msg() {
    let h = Harness::new(1);
    let full = set_params(0, 1, VIRTIO_SND_PCM_FMT_U8, VIRTIO_SND_PCM_RATE_8000).encode();
    for len in [0, 3, 4, 8, 23] {
        let done = h.raw(full[..len].to_vec(), 4);
        assert_eq!(status_of(&done), VIRTIO_SND_S_BAD_MSG, "len {len}");
    }
    assert_eq!(h.dev.stream_params(0), Some(StreamParams::default()));

    let start = Request::PcmStart { stream_id: 0 }.encode();
    assert_eq!(status_of(&h.raw(start[..7].to_vec(), 4)), VIRTIO_SND_S_BAD_MSG);
}

#[test]
fn trailing_bytes_are_tolerated() {
    let h = Harness::new(1);
    let mut req = Request::PcmPrepare { stream_id: 0 }.encode();
    req.extend_from_slice(&[0xee; 40]);
    assert_eq!(status_of(&h.raw(req, 4)), VIRTIO_SND_S_OK);
    assert_eq!(h.dev.stream_state(0), Some(StreamState::Prepared));
}

#[test]
fn unknown_codes_get_bad_msg() {
    let h = Harness::new(1);
    for code in [0u32, 3, 0x0106, 0x0201, 0x1000, 0x8000, u32::MAX] {
        let done = h.raw(code.to_le_bytes().to_vec(), 4);
        assert_eq!(status_of(&done), VIRTIO_SND_S_BAD_MSG, "code {code:#x}");
    }
}

#[test]
fn jack_and_chmap_requests_are_not_supported() {
    let h = Harness::new(1);
    for code in [
        VIRTIO_SND_R_JACK_INFO,
        VIRTIO_SND_R_JACK_REMAP,
        VIRTIO_SND_R_CHMAP_INFO,
    ] {
        let mut req = code.to_le_bytes().to_vec();
        req.extend_from_slice(&[0; 12]);
        assert_eq!(status_of(&h.raw(req, 64)), VIRTIO_SND_S_NOT_SUPP);
    }
}

#[test]
fn response_area_smaller_than_a_header_still_completes() {
    let h = Harness::new(1);
    let done = h.raw(Request::PcmPrepare { stream_id: 0 }.encode(), 2);
    assert_eq!(done.used_len, 0);
    // The command itself still ran.
    assert_eq!(h.dev.stream_state(0), Some(StreamState::Prepared));

    let done = h.raw(Request::PcmStart { stream_id: 0 }.encode(), 0);
    assert_eq!(done.used_len, 0);
    assert_eq!(h.dev.stream_state(0), Some(StreamState::Running));
}

#[test]
fn a_failed_command_does_not_stall_the_queue() {
    let h = Harness::new(1);
    h.ctrl.submit(vec![0xff; 2], 4);
    h.ctrl.submit(Request::PcmStart { stream_id: 5 }.encode(), 4);
    h.ctrl.submit(Request::PcmPrepare { stream_id: 0 }.encode(), 4);
    aero_virtio_snd::VirtioDevice::handle_control_request(&h.dev);

    let statuses: Vec<_> = h.ctrl.take_completions().iter().map(status_of).collect();
    assert_eq!(
        statuses,
        [VIRTIO_SND_S_BAD_MSG, VIRTIO_SND_S_BAD_MSG, VIRTIO_SND_S_OK]
    );
}
