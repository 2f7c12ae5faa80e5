// src/audio_buffer.rs

//! A fixed-capacity block of interleaved samples that circulates between the capture
//! callback and the disk writer.

/// Interleaved `f32` samples plus the number of frames currently filled.
///
/// Storage is allocated once, when the owning pool is built, and never resized. Moving an
/// `AudioBuffer` moves the handle to the storage, never the samples themselves.
#[derive(Debug)]
pub struct AudioBuffer {
    id: usize,
    samples: Box<[f32]>,
    channels: usize,
    frames: usize,
}

impl AudioBuffer {
    /// Creates a zeroed buffer able to hold `capacity_frames` frames of `channels` channels.
    pub fn new(id: usize, capacity_frames: usize, channels: usize) -> Self {
        Self {
            id,
            samples: vec![0.0; capacity_frames * channels].into_boxed_slice(),
            channels,
            frames: 0,
        }
    }

    /// Stable identity assigned by the pool that owns this buffer.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames currently filled.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn capacity_frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    /// The filled part of the buffer, interleaved.
    pub fn samples(&self) -> &[f32] {
        &self.samples[..self.frames * self.channels]
    }

    /// The whole storage, regardless of fill.
    pub fn storage_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// Sets the fill level, capped at the capacity.
    pub fn set_frames(&mut self, frames: usize) {
        self.frames = frames.min(self.capacity_frames());
    }

    /// Copies as many whole frames from `input` as fit and returns how many were copied.
    #[inline]
    pub fn fill_from_interleaved(&mut self, input: &[f32]) -> usize {
        if self.channels == 0 {
            return 0;
        }
        let frames = (input.len() / self.channels).min(self.capacity_frames());
        let len = frames * self.channels;
        self.samples[..len].copy_from_slice(&input[..len]);
        self.frames = frames;
        frames
    }

    pub fn clear(&mut self) {
        self.frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_copies_whole_frames_only() {
        let mut buffer = AudioBuffer::new(0, 4, 2);
        let copied = buffer.fill_from_interleaved(&[0.1, 0.2, 0.3, 0.4, 0.5]);
        assert_eq!(copied, 2);
        assert_eq!(buffer.samples(), &[0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn fill_is_capped_at_capacity() {
        let mut buffer = AudioBuffer::new(7, 2, 1);
        let copied = buffer.fill_from_interleaved(&[1.0, 2.0, 3.0]);
        assert_eq!(copied, 2);
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.id(), 7);
    }

    #[test]
    fn set_frames_is_clamped() {
        let mut buffer = AudioBuffer::new(0, 8, 2);
        buffer.set_frames(100);
        assert_eq!(buffer.frames(), 8);
        buffer.clear();
        assert!(buffer.samples().is_empty());
    }
}
