// src/editing.rs

//! Planar cut and insert on loaded files.
//!
//! Both operations touch every channel together and leave `metadata.length` equal to
//! `frames * channels` afterwards. Preconditions are checked before anything is mutated.

use crate::audio_file::{AudioFile, PlanarAudio};
use crate::error::{EngineError, EngineResult, ErrorKind, ErrorSink};
use crate::fx::SampleRange;
use std::mem;

/// Removes an inclusive range of frames from every channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cut {
    range: Option<SampleRange>,
}

impl Cut {
    pub fn new(range: SampleRange) -> Self {
        Self { range: Some(range) }
    }

    pub fn set_range(&mut self, range: SampleRange) {
        self.range = Some(range);
    }

    pub fn range(&self) -> Option<SampleRange> {
        self.range
    }

    pub fn process(&self, file: &mut AudioFile) -> EngineResult<()> {
        let range = self.range.ok_or_else(|| {
            EngineError::new(ErrorKind::StateError, "cut has no range set")
        })?;
        let frames = file.frames();
        range.validate(frames)?;

        if range.start() == 0 && range.end() + 1 == frames {
            file.audio_mut().clear();
        } else {
            let removed = range.len();
            for channel in file.audio_mut().channels_mut() {
                channel.copy_within(range.end() + 1.., range.start());
                channel.truncate(frames - removed);
            }
        }
        file.sync_length();
        log::debug!(
            "Cut frames [{}, {}], {} frames remain",
            range.start(),
            range.end(),
            file.frames()
        );
        Ok(())
    }
}

/// Splices a second buffer into every channel at `insert_at`.
///
/// The source audio is moved into the file; after a successful insert it is empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Insert {
    insert_at: Option<usize>,
    source: PlanarAudio,
}

impl Insert {
    pub fn new(insert_at: usize, source: PlanarAudio) -> Self {
        Self {
            insert_at: Some(insert_at),
            source,
        }
    }

    pub fn set_insert_at(&mut self, insert_at: usize) {
        self.insert_at = Some(insert_at);
    }

    pub fn set_source(&mut self, source: PlanarAudio) {
        self.source = source;
    }

    pub fn insert_at(&self) -> Option<usize> {
        self.insert_at
    }

    pub fn source(&self) -> &PlanarAudio {
        &self.source
    }

    fn check(&self, file: &AudioFile) -> EngineResult<usize> {
        if self.source.channel_count() == 0 || self.source.is_empty() {
            return Err(EngineError::new(
                ErrorKind::EmptyAudioBuffer,
                "nothing to insert",
            ));
        }
        if self.source.channel_count() != file.channel_count() {
            return Err(EngineError::new(
                ErrorKind::InvalidChannelCount,
                format!(
                    "cannot insert {}-channel audio into a {}-channel file",
                    self.source.channel_count(),
                    file.channel_count()
                ),
            ));
        }
        let at = self.insert_at.ok_or_else(|| {
            EngineError::new(ErrorKind::StateError, "insert position was never set")
        })?;
        if at > file.frames() {
            return Err(EngineError::new(
                ErrorKind::InvalidProcessingRange,
                format!(
                    "insert position {} is past the end of {} frames",
                    at,
                    file.frames()
                ),
            ));
        }
        Ok(at)
    }

    pub fn process(&mut self, file: &mut AudioFile) -> EngineResult<()> {
        let at = self.check(file)?;
        let frames = file.frames();
        let inserted = mem::take(&mut self.source).into_channels();
        let added = inserted.first().map_or(0, Vec::len);

        for (channel, mut incoming) in file.audio_mut().channels_mut().iter_mut().zip(inserted) {
            if at == 0 {
                incoming.append(channel);
                *channel = incoming;
            } else if at == frames {
                channel.append(&mut incoming);
            } else {
                let tail = channel.split_off(at);
                channel.append(&mut incoming);
                channel.extend(tail);
            }
        }
        file.sync_length();
        log::debug!("Inserted {} frames at {}, {} frames total", added, at, file.frames());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditOp {
    Cut(Cut),
    Insert(Insert),
}

/// Runs one edit on `file`. Errors are reported to `sink` and leave the file untouched.
pub fn apply_edit(file: &mut AudioFile, op: &mut EditOp, sink: &dyn ErrorSink) -> bool {
    let result = match op {
        EditOp::Cut(cut) => cut.process(file),
        EditOp::Insert(insert) => insert.process(file),
    };
    match result {
        Ok(()) => true,
        Err(err) => {
            err.report(sink);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_file::AudioFormat;
    use crate::error::CollectingErrorSink;

    fn file(channels: Vec<Vec<f32>>) -> AudioFile {
        AudioFile::from_planar(
            PlanarAudio::from_channels(channels).unwrap(),
            44_100,
            AudioFormat::Wav,
        )
        .unwrap()
    }

    #[test]
    fn cut_whole_file_clears_every_channel() {
        let mut f = file(vec![vec![0.1; 8], vec![0.2; 8]]);
        Cut::new(SampleRange::new(0, 7).unwrap()).process(&mut f).unwrap();
        assert_eq!(f.frames(), 0);
        assert_eq!(f.channel_count(), 2);
        assert_eq!(f.metadata().length, 0);
    }

    #[test]
    fn cut_tail_and_head() {
        let ramp: Vec<f32> = (0..6).map(|i| i as f32).collect();
        let mut f = file(vec![ramp.clone()]);
        Cut::new(SampleRange::new(4, 5).unwrap()).process(&mut f).unwrap();
        assert_eq!(f.channel(0), &[0.0, 1.0, 2.0, 3.0]);
        Cut::new(SampleRange::new(0, 0).unwrap()).process(&mut f).unwrap();
        assert_eq!(f.channel(0), &[1.0, 2.0, 3.0]);
        assert_eq!(f.metadata().length, 3);
    }

    #[test]
    fn cut_past_the_end_is_rejected_untouched() {
        let sink = CollectingErrorSink::new();
        let mut f = file(vec![vec![0.5; 4], vec![0.5; 4]]);
        let mut op = EditOp::Cut(Cut::new(SampleRange::new(2, 4).unwrap()));
        assert!(!apply_edit(&mut f, &mut op, &sink));
        assert!(sink.contains(ErrorKind::InvalidProcessingRange));
        assert_eq!(f.frames(), 4);

        let mut unset = EditOp::Cut(Cut::default());
        assert!(!apply_edit(&mut f, &mut unset, &sink));
        assert!(sink.contains(ErrorKind::StateError));
    }

    #[test]
    fn insert_append_and_interior() {
        let mut f = file(vec![vec![1.0, 2.0, 3.0]]);
        let mut append = Insert::new(3, PlanarAudio::from_channels(vec![vec![4.0]]).unwrap());
        append.process(&mut f).unwrap();
        assert_eq!(f.channel(0), &[1.0, 2.0, 3.0, 4.0]);
        assert!(append.source().is_empty());

        let mut middle =
            Insert::new(1, PlanarAudio::from_channels(vec![vec![8.0, 9.0]]).unwrap());
        middle.process(&mut f).unwrap();
        assert_eq!(f.channel(0), &[1.0, 8.0, 9.0, 2.0, 3.0, 4.0]);
        assert_eq!(f.metadata().length, 6);
    }

    #[test]
    fn insert_failures_leave_both_sides_untouched() {
        let sink = CollectingErrorSink::new();
        let mut f = file(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let before = f.clone();

        let mono = PlanarAudio::from_channels(vec![vec![9.0]]).unwrap();
        let mut op = EditOp::Insert(Insert::new(0, mono.clone()));
        assert!(!apply_edit(&mut f, &mut op, &sink));
        assert!(sink.contains(ErrorKind::InvalidChannelCount));
        if let EditOp::Insert(insert) = &op {
            assert_eq!(insert.source(), &mono);
        }

        let stereo = PlanarAudio::from_channels(vec![vec![9.0], vec![9.0]]).unwrap();
        let mut past_end = EditOp::Insert(Insert::new(3, stereo.clone()));
        assert!(!apply_edit(&mut f, &mut past_end, &sink));
        assert!(sink.contains(ErrorKind::InvalidProcessingRange));

        let mut unset = Insert::default();
        unset.set_source(stereo);
        assert_eq!(unset.process(&mut f).unwrap_err().kind, ErrorKind::StateError);

        let mut empty = EditOp::Insert(Insert::new(0, PlanarAudio::silent(2, 0)));
        assert!(!apply_edit(&mut f, &mut empty, &sink));
        assert!(sink.contains(ErrorKind::EmptyAudioBuffer));

        assert_eq!(f, before);
    }
}
