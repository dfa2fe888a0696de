//! Consumer half of the shared PCM buffer.

use ringbuf::traits::{Consumer, Observer, Split};
use ringbuf::HeapRb;

use crate::config::RELAY_CHANNELS;

/// Producer half of the shared PCM buffer. Only the capture callback holds one.
pub(crate) type PcmProducer = ringbuf::HeapProd<i16>;

/// Frame-oriented view over the consumer half of the shared ring buffer.
///
/// The ring is a lock-free single-producer/single-consumer queue: the engine's
/// mixing thread appends through the producer, the scheduler reads and trims
/// through this type. Nothing here blocks the producer.
pub struct PcmBuffer {
    consumer: ringbuf::HeapCons<i16>,
}

impl PcmBuffer {
    /// Wraps a ring buffer consumer.
    pub fn new(consumer: ringbuf::HeapCons<i16>) -> Self {
        Self { consumer }
    }

    /// Returns the number of samples currently buffered.
    pub fn occupancy(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Copies `len` samples from the head without removing them.
    ///
    /// Returns `None` if fewer than `len` samples are buffered. The copy is
    /// only committed with [`consume()`](Self::consume) once the transport has
    /// accepted it.
    pub fn peek_frame(&self, len: usize) -> Option<Vec<i16>> {
        if self.occupancy() < len {
            return None;
        }
        Some(self.consumer.iter().take(len).copied().collect())
    }

    /// Removes up to `len` samples from the head. Returns how many were removed.
    pub fn consume(&mut self, len: usize) -> usize {
        self.consumer.skip(len)
    }

    /// Drops the oldest samples until at most `limit` remain.
    ///
    /// Whole L,R pairs are dropped, so the head stays on a left sample even
    /// if `limit` or the occupancy is odd. Returns the number of samples
    /// dropped.
    pub fn trim_to(&mut self, limit: usize) -> usize {
        let excess = self.occupancy().saturating_sub(limit);
        if excess == 0 {
            return 0;
        }
        let channels = usize::from(RELAY_CHANNELS);
        self.consumer.skip(excess.div_ceil(channels) * channels)
    }

    /// Discards everything currently buffered. Returns the number of samples
    /// discarded.
    pub fn discard_all(&mut self) -> usize {
        self.consumer.clear()
    }

    /// Removes up to `len` samples and pads the result with silence to exactly
    /// `len`. Returns `None` if the buffer is empty.
    ///
    /// Only used for the final frame at stream end.
    pub fn take_padded(&mut self, len: usize) -> Option<(Vec<i16>, usize)> {
        if self.occupancy() == 0 {
            return None;
        }
        let mut samples = Vec::with_capacity(len);
        while samples.len() < len {
            match self.consumer.try_pop() {
                Some(sample) => samples.push(sample),
                None => break,
            }
        }
        let padded = len - samples.len();
        samples.resize(len, 0);
        Some((samples, padded))
    }
}

/// Creates a ring buffer pair for the relay.
///
/// Returns a producer (for the capture callback) and a `PcmBuffer` (for the
/// scheduler).
pub(crate) fn create_pcm_buffer(capacity: usize) -> (PcmProducer, PcmBuffer) {
    let ring_buffer = HeapRb::<i16>::new(capacity);
    let (producer, consumer) = ring_buffer.split();
    (producer, PcmBuffer::new(consumer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::Producer;

    fn filled(capacity: usize, samples: impl IntoIterator<Item = i16>) -> PcmBuffer {
        let (mut producer, buffer) = create_pcm_buffer(capacity);
        for sample in samples {
            producer.try_push(sample).unwrap();
        }
        buffer
    }

    #[test]
    fn test_peek_does_not_consume() {
        let buffer = filled(64, 0..10);
        let frame = buffer.peek_frame(4).unwrap();
        assert_eq!(frame, vec![0, 1, 2, 3]);
        assert_eq!(buffer.occupancy(), 10);
    }

    #[test]
    fn test_peek_not_enough_samples() {
        let buffer = filled(64, 0..3);
        assert!(buffer.peek_frame(4).is_none());
    }

    #[test]
    fn test_consume_advances_head() {
        let mut buffer = filled(64, 0..10);
        assert_eq!(buffer.consume(4), 4);
        assert_eq!(buffer.peek_frame(2).unwrap(), vec![4, 5]);
        assert_eq!(buffer.occupancy(), 6);
    }

    #[test]
    fn test_trim_to_drops_oldest() {
        let mut buffer = filled(64, 0..20);
        assert_eq!(buffer.trim_to(8), 12);
        assert_eq!(buffer.occupancy(), 8);
        assert_eq!(buffer.peek_frame(2).unwrap(), vec![12, 13]);
    }

    #[test]
    fn test_trim_to_keeps_pairs_aligned() {
        // 21 L,R pairs plus the left half of a 22nd
        let mut buffer = filled(64, 0..43);
        assert_eq!(buffer.trim_to(40), 4);
        assert_eq!(buffer.occupancy(), 39);
        // Even values are left samples
        assert_eq!(buffer.peek_frame(2).unwrap(), vec![4, 5]);
    }

    #[test]
    fn test_trim_to_odd_limit() {
        let mut buffer = filled(64, 0..20);
        assert_eq!(buffer.trim_to(9), 12);
        assert_eq!(buffer.peek_frame(1).unwrap(), vec![12]);
    }

    #[test]
    fn test_trim_to_below_limit_is_noop() {
        let mut buffer = filled(64, 0..4);
        assert_eq!(buffer.trim_to(8), 0);
        assert_eq!(buffer.occupancy(), 4);
    }

    #[test]
    fn test_discard_all() {
        let mut buffer = filled(64, 0..40);
        assert_eq!(buffer.discard_all(), 40);
        assert_eq!(buffer.occupancy(), 0);
    }

    #[test]
    fn test_take_padded() {
        let mut buffer = filled(64, [7, 8, 9]);
        let (samples, padded) = buffer.take_padded(6).unwrap();
        assert_eq!(samples, vec![7, 8, 9, 0, 0, 0]);
        assert_eq!(padded, 3);
        assert!(buffer.take_padded(6).is_none());
    }
}
