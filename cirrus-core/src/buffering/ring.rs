//! Fixed-capacity SPSC ring buffer for audio samples.
//!
//! The producer half lives inside the real-time capture callback; the
//! consumer half lives on the pipeline thread. Each half owns its own cursor
//! exclusively, so neither `write` nor `read` takes a lock. Sample storage is
//! `AtomicU32` cells holding f32 bit patterns, which keeps the crate free of
//! `unsafe` while still giving wait-free, allocation-free slice copies.
//!
//! Neither side bounds-checks against the opposite cursor. The contract is:
//! the consumer may only read sample counts that were published through
//! [`AvailabilityCounter`](super::notify::AvailabilityCounter), and capacity
//! is sized (`sample_rate × max_utterance_secs × 3`) so the producer cannot
//! lap an unconsumed region under expected utterance lengths. The counter's
//! Release fetch-add / Acquire load pair is what makes the relaxed sample
//! stores visible to the consumer.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

struct RingShared {
    samples: Box<[AtomicU32]>,
}

/// Write half — owned by the capture callback.
pub struct RingProducer {
    shared: Arc<RingShared>,
    /// Producer-owned position, advances monotonically modulo capacity.
    write_cursor: usize,
}

/// Read half — owned by the pipeline (consumer) thread.
pub struct RingConsumer {
    shared: Arc<RingShared>,
    /// Consumer-owned position, advances monotonically modulo capacity.
    read_cursor: usize,
}

/// Create a matched producer/consumer pair over `capacity` f32 slots.
///
/// # Panics
/// Panics if `capacity` is zero.
pub fn create_ring(capacity: usize) -> (RingProducer, RingConsumer) {
    assert!(capacity > 0, "ring capacity must be non-zero");
    let samples: Box<[AtomicU32]> = (0..capacity).map(|_| AtomicU32::new(0)).collect();
    let shared = Arc::new(RingShared { samples });
    (
        RingProducer {
            shared: Arc::clone(&shared),
            write_cursor: 0,
        },
        RingConsumer {
            shared,
            read_cursor: 0,
        },
    )
}

impl RingProducer {
    /// Copy `samples` into the ring at the write cursor, wrapping if the
    /// write crosses the end of storage, then advance the cursor.
    ///
    /// Wait-free and allocation-free; safe to call from the audio callback.
    pub fn write(&mut self, samples: &[f32]) {
        let cap = self.shared.samples.len();
        debug_assert!(samples.len() <= cap, "write larger than ring capacity");

        let tail_room = cap - self.write_cursor;
        let (first, second) = if samples.len() <= tail_room {
            (samples, &[][..])
        } else {
            samples.split_at(tail_room)
        };

        for (i, &s) in first.iter().enumerate() {
            self.shared.samples[self.write_cursor + i].store(s.to_bits(), Ordering::Relaxed);
        }
        for (i, &s) in second.iter().enumerate() {
            self.shared.samples[i].store(s.to_bits(), Ordering::Relaxed);
        }

        self.write_cursor = (self.write_cursor + samples.len()) % cap;
    }

    pub fn capacity(&self) -> usize {
        self.shared.samples.len()
    }
}

impl RingConsumer {
    /// Copy `dest.len()` samples out of the ring at the read cursor, wrapping
    /// at the end of storage, then advance the cursor.
    ///
    /// Precondition: the caller has observed at least `dest.len()` published
    /// samples on the availability counter. Violating that reads stale data.
    pub fn read(&mut self, dest: &mut [f32]) {
        let cap = self.shared.samples.len();
        debug_assert!(dest.len() <= cap, "read larger than ring capacity");

        let tail_room = cap - self.read_cursor;
        let split = dest.len().min(tail_room);
        let (first, second) = dest.split_at_mut(split);

        for (i, d) in first.iter_mut().enumerate() {
            *d = f32::from_bits(self.shared.samples[self.read_cursor + i].load(Ordering::Relaxed));
        }
        for (i, d) in second.iter_mut().enumerate() {
            *d = f32::from_bits(self.shared.samples[i].load(Ordering::Relaxed));
        }

        self.read_cursor = (self.read_cursor + first.len() + second.len()) % cap;
    }

    /// Copy `count` samples into a freshly owned buffer.
    ///
    /// Allocates — consumer thread only, never the capture callback.
    pub fn read_vec(&mut self, count: usize) -> Vec<f32> {
        let mut out = vec![0f32; count];
        self.read(&mut out);
        out
    }

    pub fn capacity(&self) -> usize {
        self.shared.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_without_wrap() {
        let (mut prod, mut cons) = create_ring(64);
        let input: Vec<f32> = (0..32).map(|i| i as f32 * 0.25).collect();
        prod.write(&input);

        let out = cons.read_vec(32);
        assert_eq!(out, input);
    }

    #[test]
    fn round_trip_across_wraparound() {
        let (mut prod, mut cons) = create_ring(64);

        // Park both cursors near the end of storage so the next write wraps.
        let pad = vec![0f32; 50];
        prod.write(&pad);
        let _ = cons.read_vec(50);

        let input: Vec<f32> = (0..28).map(|i| (i as f32).sin()).collect();
        prod.write(&input);
        let out = cons.read_vec(28);
        assert_eq!(out, input);
    }

    #[test]
    fn sequential_writes_preserve_order() {
        let (mut prod, mut cons) = create_ring(16);
        prod.write(&[1.0, 2.0]);
        prod.write(&[3.0]);
        prod.write(&[4.0, 5.0, 6.0]);

        assert_eq!(cons.read_vec(6), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn cursor_wraps_many_times() {
        let (mut prod, mut cons) = create_ring(7);
        for round in 0..10 {
            let block: Vec<f32> = (0..5).map(|i| (round * 5 + i) as f32).collect();
            prod.write(&block);
            assert_eq!(cons.read_vec(5), block, "round {round}");
        }
    }

    #[test]
    fn empty_write_and_read_are_noops() {
        let (mut prod, mut cons) = create_ring(8);
        prod.write(&[]);
        let mut dest: [f32; 0] = [];
        cons.read(&mut dest);
        prod.write(&[9.0]);
        assert_eq!(cons.read_vec(1), vec![9.0]);
    }
}
