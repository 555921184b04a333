//! A lock-protected ring buffer for streaming 16kHz mono `f32` audio.
//!
//! Exactly one producer (the capture thread) and one consumer (the
//! pipeline driver) are assumed; the mutex only ever guards the ring
//! cursors, never a model call.

use std::collections::VecDeque;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::warn;

/// A single write exceeded the buffer's total capacity.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("audio write of {written} samples exceeds ring buffer capacity of {capacity}")]
pub struct Overflow {
    pub written: usize,
    pub capacity: usize,
}

/// Single-producer/single-consumer ring buffer over `f32` PCM samples.
pub struct RingBuffer {
    capacity: usize,
    inner: Mutex<VecDeque<f32>>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `samples`. If appending would exceed capacity, the oldest
    /// samples are discarded first so the newest samples are always
    /// preserved. Fails only when a single write is larger than the whole
    /// buffer.
    pub fn append(&self, samples: &[f32]) -> Result<(), Overflow> {
        if samples.len() > self.capacity {
            return Err(Overflow {
                written: samples.len(),
                capacity: self.capacity,
            });
        }

        let mut buf = self.inner.lock();
        let overflow = (buf.len() + samples.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            warn!(overflow, "ring buffer full, discarding oldest samples");
            for _ in 0..overflow {
                buf.pop_front();
            }
        }
        buf.extend(samples.iter().copied());
        Ok(())
    }

    /// Return exactly `n` samples and advance the read cursor, or `None` if
    /// fewer than `n` samples are currently available.
    pub fn take_chunk(&self, n: usize) -> Option<Vec<f32>> {
        let mut buf = self.inner.lock();
        if buf.len() < n {
            return None;
        }
        Some(buf.drain(..n).collect())
    }

    /// Like [`take_chunk`](Self::take_chunk), but returns fewer samples (down
    /// to 1) when fewer than `n` are available, or `None` only when the
    /// buffer is empty.
    pub fn take_partial(&self, n: usize) -> Option<Vec<f32>> {
        let mut buf = self.inner.lock();
        if buf.is_empty() {
            return None;
        }
        let take = n.min(buf.len());
        Some(buf.drain(..take).collect())
    }

    /// Copy the buffer's contents without consuming them.
    pub fn peek_all(&self) -> Vec<f32> {
        self.inner.lock().iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_take_chunk_round_trips() {
        let ring = RingBuffer::new(16);
        let data = vec![1.0, 2.0, 3.0, 4.0];
        ring.append(&data).unwrap();
        assert_eq!(ring.take_chunk(4).unwrap(), data);
    }

    #[test]
    fn take_chunk_returns_none_when_insufficient() {
        let ring = RingBuffer::new(16);
        ring.append(&[1.0, 2.0]).unwrap();
        assert!(ring.take_chunk(4).is_none());
        // samples remain available for a smaller request
        assert_eq!(ring.take_chunk(2).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn append_discards_oldest_on_overflow() {
        let ring = RingBuffer::new(4);
        ring.append(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        ring.append(&[5.0, 6.0]).unwrap();
        // oldest two (1.0, 2.0) are discarded; newest four remain
        assert_eq!(ring.take_chunk(4).unwrap(), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn single_write_larger_than_capacity_errors() {
        let ring = RingBuffer::new(2);
        let err = ring.append(&[1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(err.capacity, 2);
        assert_eq!(err.written, 3);
    }

    #[test]
    fn take_partial_drains_whatever_is_available() {
        let ring = RingBuffer::new(8);
        ring.append(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(ring.take_partial(10).unwrap(), vec![1.0, 2.0, 3.0]);
        assert!(ring.take_partial(1).is_none());
    }

    #[test]
    fn peek_all_does_not_consume() {
        let ring = RingBuffer::new(8);
        ring.append(&[1.0, 2.0]).unwrap();
        assert_eq!(ring.peek_all(), vec![1.0, 2.0]);
        assert_eq!(ring.peek_all(), vec![1.0, 2.0]);
    }
}
