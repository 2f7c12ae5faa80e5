use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use cypher_engine::audio_file::{AudioFormat, SampleFormat};
use cypher_engine::capture::{
    self, CapturePipeline, ConsoleEventHandler, CpalInput, EventHandler, InputBackend,
    TimedEventHandler, ToneInput,
};
use cypher_engine::fx_components::{
    DistortionMode, DistortionParams, EchoParams, FadeMode, FadeParams, GainParams,
    NormalizationMode, NormalizationParams, ReverbParams, ReverseParams,
};
use cypher_engine::settings::{self, EngineSettings};
use cypher_engine::{
    apply_edit, apply_effect_all_channels, load_audio, save_audio, AudioFile, ConsoleErrorSink,
    Cut, EditOp, EffectKind, EffectParams, EngineResources, ErrorSink, Insert, SampleRange,
    WriteInfo,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Cypher audio engine: record, edit and process audio files")]
struct Cli {
    /// Settings file to use instead of the per-user one
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record from the input device into <session-dir>/records
    Record {
        /// Session directory (defaults to the configured or per-user one)
        #[arg(long)]
        session_dir: Option<PathBuf>,
        /// Stop after this many seconds instead of waiting for Enter
        #[arg(long)]
        seconds: Option<f64>,
        /// Record a generated sine tone instead of the input device
        #[arg(long, default_value_t = false)]
        tone: bool,
        /// Tone frequency in Hz
        #[arg(long, default_value_t = 440.0)]
        frequency: f32,
    },
    /// Apply one effect to every channel of a file
    Effect {
        input: PathBuf,
        output: PathBuf,
        effect: String,
        /// First sample of the range (per channel)
        #[arg(long, default_value_t = 0)]
        start: usize,
        /// Last sample of the range, inclusive (defaults to the end of the file)
        #[arg(long)]
        end: Option<usize>,
        /// Gain factor (gain) or drive (distortion)
        #[arg(long, default_value_t = 1.0)]
        gain: f32,
        /// Echo delay in samples
        #[arg(long, default_value_t = 4410)]
        delay: usize,
        /// Echo decay
        #[arg(long, default_value_t = 0.5)]
        decay: f32,
        /// Fade gains
        #[arg(long, default_value_t = 0.0)]
        low: f32,
        #[arg(long, default_value_t = 1.0)]
        high: f32,
        /// fade: in|out, normalization: peak|rms, distortion: soft|hard
        #[arg(long)]
        mode: Option<String>,
        /// Normalization target level
        #[arg(long, default_value_t = 1.0)]
        target: f32,
        /// Reverb base delay in milliseconds
        #[arg(long, default_value_t = 50.0)]
        delay_ms: f32,
        #[arg(long, default_value_t = 0.5)]
        wet: f32,
        #[arg(long, default_value_t = 1.0)]
        dry: f32,
        /// Reverb comb feedback
        #[arg(long, default_value_t = 0.7)]
        feedback: f32,
        #[arg(long, value_enum, default_value_t = OutputFormat::Float32)]
        format: OutputFormat,
    },
    /// Remove frames [start, end] from every channel
    Cut {
        input: PathBuf,
        output: PathBuf,
        start: usize,
        end: usize,
        #[arg(long, value_enum, default_value_t = OutputFormat::Float32)]
        format: OutputFormat,
    },
    /// Insert another file at a frame position
    Insert {
        input: PathBuf,
        source: PathBuf,
        output: PathBuf,
        /// Frame position; defaults to appending
        #[arg(long)]
        at: Option<usize>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Float32)]
        format: OutputFormat,
    },
    /// Print file metadata
    Info { input: PathBuf },
    /// List input devices
    Devices {
        #[arg(long)]
        host: Option<String>,
    },
    /// List recordings in a session directory
    Recordings {
        #[arg(long)]
        session_dir: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Pcm8,
    Pcm16,
    Pcm24,
    Pcm32,
    Float32,
}

impl From<OutputFormat> for SampleFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Pcm8 => SampleFormat::Pcm8,
            OutputFormat::Pcm16 => SampleFormat::Pcm16,
            OutputFormat::Pcm24 => SampleFormat::Pcm24,
            OutputFormat::Pcm32 => SampleFormat::Pcm32,
            OutputFormat::Float32 => SampleFormat::Float32,
        }
    }
}

fn extension_of(path: &Path) -> Result<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no file extension", path.display()))
}

fn open(path: &Path, sink: &dyn ErrorSink) -> Result<AudioFile> {
    let ext = extension_of(path)?;
    match load_audio(path, &ext, sink) {
        Some(file) => Ok(file),
        None => bail!("could not load {}", path.display()),
    }
}

fn save_as(
    file: &mut AudioFile,
    output: &Path,
    format: OutputFormat,
    sink: &dyn ErrorSink,
) -> Result<()> {
    let output_format = AudioFormat::from_path(output)?;
    let sample_format = match output_format {
        AudioFormat::Mp3 => SampleFormat::Pcm16,
        AudioFormat::Wav => format.into(),
    };
    let rate = file.metadata().sample_rate;
    let mut target = if output_format == file.format() {
        file.clone()
    } else {
        AudioFile::from_planar(file.audio().clone(), rate, output_format)?
    };
    target.set_write_info(WriteInfo::new(output, rate, sample_format))?;
    if !save_audio(&target, sink) {
        bail!("could not save {}", output.display());
    }
    *file = target;
    Ok(())
}

fn session_dir(explicit: Option<PathBuf>, settings: &EngineSettings) -> Result<PathBuf> {
    explicit
        .or_else(|| settings.session_dir.clone())
        .or_else(settings::default_session_dir)
        .context("could not determine a session directory")
}

#[allow(clippy::too_many_arguments)]
fn effect_params(
    kind: EffectKind,
    range: SampleRange,
    gain: f32,
    delay: usize,
    decay: f32,
    (low, high): (f32, f32),
    mode: Option<&str>,
    target: f32,
    (delay_ms, wet, dry, feedback): (f32, f32, f32, f32),
    sample_rate: u32,
) -> Result<EffectParams> {
    let mode = mode.map(str::to_ascii_lowercase);
    let params: EffectParams = match kind {
        EffectKind::Gain => GainParams::try_new(range, gain)?.into(),
        EffectKind::Echo => EchoParams::try_new(range, delay, decay)?.into(),
        EffectKind::Fade => {
            let mode = match mode.as_deref() {
                None | Some("in") => FadeMode::In,
                Some("out") => FadeMode::Out,
                Some(other) => bail!("unknown fade mode '{}'", other),
            };
            FadeParams::try_new(range, low, high, mode)?.into()
        }
        EffectKind::Normalization => {
            let mode = match mode.as_deref() {
                None | Some("peak") => NormalizationMode::Peak,
                Some("rms") => NormalizationMode::Rms,
                Some(other) => bail!("unknown normalization mode '{}'", other),
            };
            NormalizationParams::try_new(range, target, mode)?.into()
        }
        EffectKind::Distortion => {
            let mode = match mode.as_deref() {
                None | Some("soft") => DistortionMode::SoftClipping,
                Some("hard") => DistortionMode::HardClipping,
                Some(other) => bail!("unknown distortion mode '{}'", other),
            };
            DistortionParams::try_new(range, gain, mode)?.into()
        }
        EffectKind::Reverse => EffectParams::Reverse(
            ReverseParams::new(range, &ConsoleErrorSink).context("invalid reverse range")?,
        ),
        EffectKind::Reverb => {
            ReverbParams::try_new(range, delay_ms, wet, dry, feedback, sample_rate)?.into()
        }
    };
    Ok(params)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = match &cli.settings {
        Some(path) => settings::load_settings_from(path),
        None => settings::load_settings(),
    };
    let sink: Arc<dyn ErrorSink> = Arc::new(ConsoleErrorSink);

    match cli.command {
        Command::Record {
            session_dir: dir,
            seconds,
            tone,
            frequency,
        } => {
            let dir = session_dir(dir, &settings)?;
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create session directory {}", dir.display()))?;
            let resources = Arc::new(EngineResources::with_settings(&settings, sink.clone())?);
            let handler: Box<dyn EventHandler> = match seconds {
                Some(secs) => Box::new(TimedEventHandler::new(Duration::from_secs_f64(
                    secs.max(0.0),
                ))),
                None => Box::new(ConsoleEventHandler),
            };
            let backend: Box<dyn InputBackend> = if tone {
                Box::new(ToneInput::new(frequency, 0.5))
            } else {
                Box::new(CpalInput::new(
                    settings.input_host.clone(),
                    settings.input_device.clone(),
                ))
            };
            let mut pipeline =
                CapturePipeline::new(resources, dir, sink.clone(), handler, backend, &settings);
            if !pipeline.is_valid() {
                bail!("capture pipeline could not be initialised");
            }
            let ok = pipeline.record();
            if let Some(stats) = pipeline.last_stats() {
                println!(
                    "Wrote {} frames to {}",
                    stats.frames_written,
                    stats.path.display()
                );
            }
            if !ok {
                bail!("recording failed");
            }
        }
        Command::Effect {
            input,
            output,
            effect,
            start,
            end,
            gain,
            delay,
            decay,
            low,
            high,
            mode,
            target,
            delay_ms,
            wet,
            dry,
            feedback,
            format,
        } => {
            let kind: EffectKind = effect.parse()?;
            let mut file = open(&input, sink.as_ref())?;
            let range = match end {
                Some(end) => SampleRange::new(start, end)?,
                None => SampleRange::new(start, file.frames().saturating_sub(1))?,
            };
            let params = effect_params(
                kind,
                range,
                gain,
                delay,
                decay,
                (low, high),
                mode.as_deref(),
                target,
                (delay_ms, wet, dry, feedback),
                file.metadata().sample_rate,
            )?;
            if !apply_effect_all_channels(file.audio_mut(), kind, &params, sink.as_ref()) {
                bail!("{} failed", kind);
            }
            save_as(&mut file, &output, format, sink.as_ref())?;
        }
        Command::Cut {
            input,
            output,
            start,
            end,
            format,
        } => {
            let mut file = open(&input, sink.as_ref())?;
            let mut op = EditOp::Cut(Cut::new(SampleRange::new(start, end)?));
            if !apply_edit(&mut file, &mut op, sink.as_ref()) {
                bail!("cut failed");
            }
            save_as(&mut file, &output, format, sink.as_ref())?;
        }
        Command::Insert {
            input,
            source,
            output,
            at,
            format,
        } => {
            let mut file = open(&input, sink.as_ref())?;
            let inserted = open(&source, sink.as_ref())?;
            if inserted.metadata().sample_rate != file.metadata().sample_rate {
                log::warn!(
                    "Inserting {} Hz audio into a {} Hz file without resampling",
                    inserted.metadata().sample_rate,
                    file.metadata().sample_rate
                );
            }
            let at = at.unwrap_or_else(|| file.frames());
            let mut op = EditOp::Insert(Insert::new(at, inserted.audio().clone()));
            if !apply_edit(&mut file, &mut op, sink.as_ref()) {
                bail!("insert failed");
            }
            save_as(&mut file, &output, format, sink.as_ref())?;
        }
        Command::Info { input } => {
            let file = open(&input, sink.as_ref())?;
            let meta = file.metadata();
            println!("{}", input.display());
            println!("  format:      {}", meta.format);
            println!("  sample rate: {} Hz", meta.sample_rate);
            println!("  channels:    {}", meta.channels);
            println!("  bit depth:   {}", meta.bit_depth);
            println!("  frames:      {}", file.frames());
            println!(
                "  duration:    {:.3} s",
                file.frames() as f64 / meta.sample_rate.max(1) as f64
            );
        }
        Command::Devices { host } => {
            let host = host.or(settings.input_host.clone());
            for name in capture::list_input_devices(host.as_deref())? {
                println!("{}", name);
            }
        }
        Command::Recordings { session_dir: dir } => {
            let dir = session_dir(dir, &settings)?;
            for path in capture::list_recordings(&dir)? {
                println!("{}", path.display());
            }
        }
    }

    Ok(())
}
