//! Control request dispatch: raw request bytes in, status plus payload out.

use aero_audio::AudioBackend;
use virtio_snd_proto::protocol::{
    encode_pcm_info_items, request_code_name, status_name, write_response, ProtocolError,
    QueryInfo, Request, VIRTIO_SND_HDR_SIZE, VIRTIO_SND_PCM_INFO_SIZE, VIRTIO_SND_S_BAD_MSG,
    VIRTIO_SND_S_OK,
};

use crate::config::DeviceCapabilities;
use crate::error::{Result, SndError};
use crate::stream::StreamTable;

/// Status and payload for one control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u32,
    pub payload: Vec<u8>,
}

impl Response {
    pub fn ok(payload: Vec<u8>) -> Self {
        Self {
            status: VIRTIO_SND_S_OK,
            payload,
        }
    }

    pub fn error(status: u32) -> Self {
        Self {
            status,
            payload: Vec::new(),
        }
    }

    pub fn encoded_len(&self) -> usize {
        VIRTIO_SND_HDR_SIZE + self.payload.len()
    }

    /// Encodes into `out`, falling back to a bare `BAD_MSG` header when the payload does not fit.
    ///
    /// Returns the number of bytes written, or 0 when not even a header fits.
    pub fn encode_into(&self, out: &mut [u8]) -> usize {
        match write_response(out, self.status, &self.payload) {
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(%err, "control response does not fit, answering BAD_MSG");
                match write_response(out, VIRTIO_SND_S_BAD_MSG, &[]) {
                    Ok(n) => n,
                    Err(err) => {
                        tracing::warn!(%err, "no room for a control response header");
                        0
                    }
                }
            }
        }
    }
}

/// Decodes and executes one control request.
///
/// `response_capacity` is the size of the driver's response area; list-returning requests are
/// checked against it before any state is touched. Every outcome, including a decode failure,
/// produces a response.
pub fn dispatch<B: AudioBackend>(
    streams: &mut StreamTable<B>,
    caps: &DeviceCapabilities,
    request: &[u8],
    response_capacity: usize,
) -> Response {
    let result = Request::decode(request)
        .map_err(SndError::from)
        .and_then(|req| {
            tracing::debug!(code = request_code_name(req.code()), ?req, "control request");
            execute(streams, caps, &req, response_capacity)
        });

    match result {
        Ok(payload) => Response::ok(payload),
        Err(err) => {
            let status = err.status();
            tracing::warn!(%err, status = status_name(status), "control request rejected");
            Response::error(status)
        }
    }
}

fn execute<B: AudioBackend>(
    streams: &mut StreamTable<B>,
    caps: &DeviceCapabilities,
    req: &Request,
    response_capacity: usize,
) -> Result<Vec<u8>> {
    match *req {
        Request::PcmInfo(query) => pcm_info(streams, caps, query, response_capacity),
        Request::PcmSetParams(params) => streams.set_params(caps, &params).map(|()| Vec::new()),
        Request::PcmPrepare { stream_id } => streams.prepare(stream_id).map(|()| Vec::new()),
        Request::PcmStart { stream_id } => streams.start(stream_id).map(|()| Vec::new()),
        Request::PcmStop { stream_id } => streams.stop(stream_id).map(|()| Vec::new()),
        Request::PcmRelease { stream_id } => streams.release(stream_id).map(|()| Vec::new()),
        Request::JackInfo | Request::JackRemap => Err(SndError::NotImplemented("jack")),
        Request::ChmapInfo => Err(SndError::NotImplemented("channel map")),
    }
}

fn pcm_info<B: AudioBackend>(
    streams: &StreamTable<B>,
    caps: &DeviceCapabilities,
    query: QueryInfo,
    response_capacity: usize,
) -> Result<Vec<u8>> {
    let item_size = usize::try_from(query.size).map_err(|_| ProtocolError::BadInfoSize(query.size))?;
    if item_size < VIRTIO_SND_PCM_INFO_SIZE {
        return Err(ProtocolError::BadInfoSize(query.size).into());
    }
    let want = query.response_len().unwrap_or(usize::MAX);
    if want > response_capacity {
        return Err(ProtocolError::BufferTooSmall {
            want,
            got: response_capacity,
        }
        .into());
    }

    let records = streams.info(caps, query.start_id, query.count)?;
    Ok(encode_pcm_info_items(&records, item_size)?)
}
