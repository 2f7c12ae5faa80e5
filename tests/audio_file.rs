use cypher_engine::audio_file::{SampleFormat, WriteInfo};
use cypher_engine::error::{CollectingErrorSink, ErrorKind};
use cypher_engine::{load_audio, save_audio, AudioFile, AudioFormat, PlanarAudio};

fn tone(frames: usize, channels: usize) -> PlanarAudio {
    let data = (0..channels)
        .map(|c| {
            (0..frames)
                .map(|i| ((i as f32) * 0.05 + c as f32).sin() * 0.7)
                .collect()
        })
        .collect();
    PlanarAudio::from_channels(data).unwrap()
}

#[test]
fn wav_save_then_load_keeps_the_layout() {
    let sink = CollectingErrorSink::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");

    let mut file = AudioFile::from_planar(tone(2_000, 2), 48_000, AudioFormat::Wav).unwrap();
    file.set_write_info(WriteInfo::new(&path, 48_000, SampleFormat::Pcm16))
        .unwrap();
    assert!(save_audio(&file, &sink));

    let loaded = load_audio(&path, "wav", &sink).unwrap();
    assert!(sink.is_empty());
    assert_eq!(loaded.format(), AudioFormat::Wav);
    assert_eq!(loaded.channel_count(), 2);
    assert_eq!(loaded.frames(), 2_000);
    assert_eq!(loaded.metadata().sample_rate, 48_000);
    assert_eq!(loaded.metadata().bit_depth, 16);
    assert_eq!(loaded.metadata().length, 4_000);
    for c in 0..2 {
        for (a, b) in loaded.channel(c).iter().zip(file.channel(c)) {
            assert!((a - b).abs() < 1.0 / 16_000.0, "{} vs {}", a, b);
        }
    }
}

#[test]
fn float_wav_is_lossless() {
    let sink = CollectingErrorSink::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("float.wav");

    let mut file = AudioFile::from_planar(tone(500, 1), 44_100, AudioFormat::Wav).unwrap();
    file.set_write_info(WriteInfo::new(&path, 44_100, SampleFormat::Float32))
        .unwrap();
    assert!(save_audio(&file, &sink));

    let loaded = load_audio(&path, "WAV", &sink).unwrap();
    assert_eq!(loaded.channel(0), file.channel(0));
}

#[test]
fn load_failures_are_reported() {
    let sink = CollectingErrorSink::new();
    let dir = tempfile::tempdir().unwrap();

    assert!(load_audio(&dir.path().join("missing.wav"), "wav", &sink).is_none());
    assert!(load_audio(dir.path(), "wav", &sink).is_none());
    assert!(load_audio(&dir.path().join("song.ogg"), "ogg", &sink).is_none());

    let garbage = dir.path().join("garbage.wav");
    std::fs::write(&garbage, b"definitely not a riff header").unwrap();
    assert!(load_audio(&garbage, "wav", &sink).is_none());

    assert_eq!(
        sink.kinds(),
        vec![
            ErrorKind::FileNotFound,
            ErrorKind::InvalidFilePath,
            ErrorKind::UnsupportedFileFormat,
            ErrorKind::CorruptedAudioData,
        ]
    );
}

#[test]
fn save_requires_a_valid_write_configuration() {
    let sink = CollectingErrorSink::new();
    let dir = tempfile::tempdir().unwrap();
    let mut file = AudioFile::from_planar(tone(10, 1), 44_100, AudioFormat::Wav).unwrap();

    assert!(!save_audio(&file, &sink));
    assert_eq!(sink.kinds(), vec![ErrorKind::InvalidConfiguration]);

    let bad_rate = file
        .set_write_info(WriteInfo::new(dir.path().join("x.wav"), 44_000, SampleFormat::Pcm16))
        .unwrap_err();
    assert_eq!(bad_rate.kind, ErrorKind::InvalidSampleRate);

    let bad_depth = file
        .set_write_info(WriteInfo::new(dir.path().join("x.wav"), 44_100, SampleFormat::Float64))
        .unwrap_err();
    assert_eq!(bad_depth.kind, ErrorKind::InvalidBitDepth);
    assert!(file.write_info().is_none());
}
