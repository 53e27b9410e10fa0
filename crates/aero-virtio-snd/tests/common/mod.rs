#![allow(dead_code)]

use std::sync::Arc;

use aero_audio::NullBackend;
use aero_virtio_snd::{
    Completion, DeviceCapabilities, LoopbackTransport, SndConfig, VirtioDevice, VirtioSnd,
};
use virtio_snd_proto::protocol::{PcmSetParams, Request};

pub type TestDevice = VirtioSnd<NullBackend, Arc<LoopbackTransport>>;

pub struct Harness {
    pub dev: TestDevice,
    pub audio: NullBackend,
    pub ctrl: Arc<LoopbackTransport>,
}

impl Harness {
    pub fn new(streams: u32) -> Self {
        Self::with_capabilities(
            DeviceCapabilities::new(SndConfig {
                streams,
                ..SndConfig::default()
            })
            .unwrap(),
        )
    }

    pub fn with_capabilities(caps: DeviceCapabilities) -> Self {
        let audio = NullBackend::new();
        let ctrl = Arc::new(LoopbackTransport::new());
        let dev = VirtioSnd::with_capabilities(caps, audio.clone(), Arc::clone(&ctrl)).unwrap();
        Self { dev, audio, ctrl }
    }

    /// Submits one raw control request and returns its completion.
    pub fn raw(&self, request: Vec<u8>, response_len: usize) -> Completion {
        self.ctrl.submit(request, response_len);
        self.dev.handle_control_request();
        let mut done = self.ctrl.take_completions();
        assert_eq!(done.len(), 1, "expected exactly one completion");
        done.remove(0)
    }

    /// Submits `req` with a header-sized response area and returns the status code.
    pub fn status(&self, req: Request) -> u32 {
        status_of(&self.raw(req.encode(), 4))
    }
}

pub fn status_of(done: &Completion) -> u32 {
    assert!(done.data.len() >= 4, "completion carries no header");
    u32::from_le_bytes(done.data[..4].try_into().unwrap())
}

pub fn set_params(stream_id: u32, channels: u8, format: u8, rate: u8) -> Request {
    Request::PcmSetParams(PcmSetParams {
        stream_id,
        buffer_bytes: 8192,
        period_bytes: 4096,
        features: 0,
        channels,
        format,
        rate,
    })
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
