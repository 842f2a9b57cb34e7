use std::mem;

/// An accumulated run of samples sealed at a chunk boundary, ready to flush.
///
/// Owns its samples: once sealed, the buffer belongs to the flush path and
/// the accumulator continues in a fresh allocation.
#[derive(Debug)]
pub struct SealedBuffer {
    /// Interleaved i16 PCM samples
    pub samples: Vec<i16>,
    /// Position of the first sample, counted from the start of the session
    pub start_sample: u64,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

impl SealedBuffer {
    /// Duration of this buffer in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        let frames = self.samples.len() as u64 / self.channels as u64;
        frames * 1000 / self.sample_rate as u64
    }
}

/// Double-buffered sample accumulator with fixed-duration chunk boundaries.
///
/// Incoming samples are appended to the active buffer, tagged with a
/// monotonically increasing position counter. When the configured chunk
/// duration is reached the buffer is swapped out and returned sealed, while
/// accumulation continues in a fresh buffer. An incoming slice that straddles
/// a boundary is split, so sealed chunks are exactly the configured duration.
pub struct ChunkBuffer {
    active: Vec<i16>,
    /// Samples per full chunk (duration * rate * channels)
    chunk_capacity: usize,
    sample_rate: u32,
    channels: u16,
    /// Total samples accepted since the session started
    total_samples: u64,
    /// Position of the first sample in the active buffer
    start_sample: u64,
}

impl ChunkBuffer {
    pub fn new(chunk_duration_ms: u64, sample_rate: u32, channels: u16) -> Self {
        let chunk_capacity =
            (chunk_duration_ms as usize * sample_rate as usize / 1000) * channels as usize;

        Self {
            active: Vec::with_capacity(chunk_capacity),
            chunk_capacity,
            sample_rate,
            channels,
            total_samples: 0,
            start_sample: 0,
        }
    }

    /// Append samples, sealing a buffer for each chunk boundary crossed.
    ///
    /// Returns zero or more sealed buffers in order. Never drops samples:
    /// whatever does not fit in the sealed chunk starts the next one.
    pub fn append(&mut self, samples: &[i16]) -> Vec<SealedBuffer> {
        let mut sealed = Vec::new();
        let mut rest = samples;

        while !rest.is_empty() {
            let room = self.chunk_capacity - self.active.len();
            let take = room.min(rest.len());

            self.active.extend_from_slice(&rest[..take]);
            self.total_samples += take as u64;
            rest = &rest[take..];

            if self.active.len() == self.chunk_capacity {
                sealed.push(self.seal());
            }
        }

        sealed
    }

    /// Seal whatever has accumulated, even if shorter than a full chunk.
    ///
    /// Used for the final flush on stop/cancel. Returns `None` when the
    /// active buffer is empty.
    pub fn seal_partial(&mut self) -> Option<SealedBuffer> {
        if self.active.is_empty() {
            None
        } else {
            Some(self.seal())
        }
    }

    fn seal(&mut self) -> SealedBuffer {
        let samples = mem::replace(&mut self.active, Vec::with_capacity(self.chunk_capacity));
        let start_sample = self.start_sample;
        self.start_sample = self.total_samples;

        SealedBuffer {
            samples,
            start_sample,
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Total captured duration in milliseconds.
    pub fn total_captured_ms(&self) -> u64 {
        let frames = self.total_samples / self.channels as u64;
        frames * 1000 / self.sample_rate as u64
    }

    /// Total samples accepted since the session started.
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1kHz mono keeps the numbers readable: 1 sample = 1ms.
    fn buffer_1khz(chunk_ms: u64) -> ChunkBuffer {
        ChunkBuffer::new(chunk_ms, 1000, 1)
    }

    #[test]
    fn seals_exactly_at_boundary() {
        let mut buf = buffer_1khz(100);

        let sealed = buf.append(&vec![1i16; 100]);
        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].samples.len(), 100);
        assert_eq!(sealed[0].start_sample, 0);
        assert_eq!(sealed[0].duration_ms(), 100);
    }

    #[test]
    fn splits_straddling_slice_across_chunks() {
        let mut buf = buffer_1khz(100);

        // 250 samples in one push: two full chunks, 50 left over
        let sealed = buf.append(&vec![7i16; 250]);
        assert_eq!(sealed.len(), 2);
        assert_eq!(sealed[0].start_sample, 0);
        assert_eq!(sealed[1].start_sample, 100);

        let tail = buf.seal_partial().expect("partial tail");
        assert_eq!(tail.samples.len(), 50);
        assert_eq!(tail.start_sample, 200);
        assert_eq!(tail.duration_ms(), 50);
    }

    #[test]
    fn partial_seal_on_empty_buffer_is_none() {
        let mut buf = buffer_1khz(100);
        assert!(buf.seal_partial().is_none());

        buf.append(&[1, 2, 3]);
        assert!(buf.seal_partial().is_some());
        // Sealed once; nothing left
        assert!(buf.seal_partial().is_none());
    }

    #[test]
    fn position_counter_is_monotonic_and_gapless() {
        let mut buf = buffer_1khz(50);
        let mut sealed = Vec::new();

        for _ in 0..7 {
            sealed.extend(buf.append(&vec![0i16; 30]));
        }
        sealed.extend(buf.seal_partial());

        // 210 samples, 50 per chunk: 4 full + 1 partial of 10
        assert_eq!(sealed.len(), 5);
        let mut expected_start = 0u64;
        for s in &sealed {
            assert_eq!(s.start_sample, expected_start);
            expected_start += s.samples.len() as u64;
        }
        assert_eq!(buf.total_samples(), 210);
    }

    #[test]
    fn duration_sum_matches_total_captured() {
        let mut buf = ChunkBuffer::new(32_000, 16_000, 1);
        let mut sealed = Vec::new();

        // 70 seconds of audio in 100ms frames
        for _ in 0..700 {
            sealed.extend(buf.append(&vec![0i16; 1600]));
        }
        sealed.extend(buf.seal_partial());

        assert_eq!(sealed.len(), 3);
        let durations: Vec<u64> = sealed.iter().map(|s| s.duration_ms()).collect();
        assert_eq!(durations, vec![32_000, 32_000, 6_000]);
        assert_eq!(durations.iter().sum::<u64>(), buf.total_captured_ms());
    }
}
