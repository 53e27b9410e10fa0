//! Queue transport boundary.
//!
//! The device never sees descriptor rings. It receives opaque buffers with a driver-readable
//! part (the request) and a device-writable part (the response), and hands each one back with
//! the number of bytes it wrote.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One request/response buffer chain.
pub trait RequestBuffer {
    /// Bytes the driver supplied.
    fn readable_len(&self) -> usize;

    /// Bytes the device may write.
    fn writable_len(&self) -> usize;

    /// Copies readable bytes starting at `offset` into `out`. Returns how many were copied.
    fn read(&self, offset: usize, out: &mut [u8]) -> usize;

    /// Copies `data` into the writable area at `offset`. Returns how many bytes fit.
    fn write(&mut self, offset: usize, data: &[u8]) -> usize;
}

/// A virtqueue as seen by the device.
pub trait ControlTransport: Send + Sync {
    type Buffer: RequestBuffer + Send;

    /// Next available buffer, if any. Never blocks.
    fn receive_next_request(&self) -> Option<Self::Buffer>;

    /// Returns `buffer` to the driver with `used_len` bytes written and signals completion.
    fn complete(&self, buffer: Self::Buffer, used_len: usize);
}

impl<T: ControlTransport + ?Sized> ControlTransport for Arc<T> {
    type Buffer = T::Buffer;

    fn receive_next_request(&self) -> Option<Self::Buffer> {
        (**self).receive_next_request()
    }

    fn complete(&self, buffer: Self::Buffer, used_len: usize) {
        (**self).complete(buffer, used_len)
    }
}

/// Heap-backed buffer used by [`LoopbackTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopbackBuffer {
    pub id: u64,
    readable: Vec<u8>,
    writable: Vec<u8>,
}

impl LoopbackBuffer {
    pub fn new(id: u64, readable: Vec<u8>, writable_len: usize) -> Self {
        Self {
            id,
            readable,
            writable: vec![0; writable_len],
        }
    }

    pub fn written(&self) -> &[u8] {
        &self.writable
    }
}

impl RequestBuffer for LoopbackBuffer {
    fn readable_len(&self) -> usize {
        self.readable.len()
    }

    fn writable_len(&self) -> usize {
        self.writable.len()
    }

    fn read(&self, offset: usize, out: &mut [u8]) -> usize {
        let src = self.readable.get(offset..).unwrap_or(&[]);
        let n = src.len().min(out.len());
        out[..n].copy_from_slice(&src[..n]);
        n
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> usize {
        let dst = self.writable.get_mut(offset..).unwrap_or(&mut []);
        let n = dst.len().min(data.len());
        dst[..n].copy_from_slice(&data[..n]);
        n
    }
}

/// A buffer the device handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub id: u64,
    pub used_len: usize,
    /// The writable area, truncated to `used_len`.
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
struct LoopbackState {
    next_id: u64,
    available: VecDeque<LoopbackBuffer>,
    used: Vec<Completion>,
}

/// In-memory queue: the test (or fuzzer) plays the driver.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    state: Mutex<LoopbackState>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a buffer without making it available, for callers that enqueue directly.
    pub fn buffer(&self, readable: Vec<u8>, writable_len: usize) -> LoopbackBuffer {
        let mut state = self.state();
        state.next_id += 1;
        LoopbackBuffer::new(state.next_id, readable, writable_len)
    }

    /// Makes a buffer available to the device. Returns its id.
    pub fn submit(&self, readable: Vec<u8>, writable_len: usize) -> u64 {
        let buffer = self.buffer(readable, writable_len);
        let id = buffer.id;
        self.state().available.push_back(buffer);
        id
    }

    pub fn available_len(&self) -> usize {
        self.state().available.len()
    }

    /// Completed buffers in completion order, draining them.
    pub fn take_completions(&self) -> Vec<Completion> {
        std::mem::take(&mut self.state().used)
    }
}

impl ControlTransport for LoopbackTransport {
    type Buffer = LoopbackBuffer;

    fn receive_next_request(&self) -> Option<LoopbackBuffer> {
        self.state().available.pop_front()
    }

    fn complete(&self, buffer: LoopbackBuffer, used_len: usize) {
        let used_len = used_len.min(buffer.writable.len());
        let mut data = buffer.writable;
        data.truncate(used_len);
        self.state().used.push(Completion {
            id: buffer.id,
            used_len,
            data,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_reads_and_writes_clamp() {
        let mut buf = LoopbackBuffer::new(1, vec![1, 2, 3], 4);
        let mut out = [0u8; 8];
        assert_eq!(buf.read(1, &mut out), 2);
        assert_eq!(&out[..2], &[2, 3]);
        assert_eq!(buf.read(10, &mut out), 0);

        assert_eq!(buf.write(2, &[9, 9, 9]), 2);
        assert_eq!(buf.written(), &[0, 0, 9, 9]);
        assert_eq!(buf.write(7, &[1]), 0);
    }

    #[test]
    fn completions_keep_order_and_truncate() {
        let t = LoopbackTransport::new();
        let a = t.submit(vec![0; 4], 8);
        let b = t.submit(vec![0; 4], 8);
        let first = t.receive_next_request().unwrap();
        let second = t.receive_next_request().unwrap();
        assert!(t.receive_next_request().is_none());

        t.complete(first, 4);
        t.complete(second, 100);
        let done = t.take_completions();
        assert_eq!(done.len(), 2);
        assert_eq!((done[0].id, done[0].used_len, done[0].data.len()), (a, 4, 4));
        assert_eq!((done[1].id, done[1].used_len), (b, 8));
        assert!(t.take_completions().is_empty());
    }
}
