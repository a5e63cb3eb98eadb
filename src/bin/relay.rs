//! Media Relay Application
//!
//! Captures (or synthesizes) audio, pushes encoded units through the bounded
//! queue and renders them on the other side until the source ends, Ctrl+C is
//! pressed or `q` is typed on stdin.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use media_relay::{
    audio::{AudioFrame, MeterRenderer, NullRenderer, SyntheticSource},
    codec::{CodecSettings, PcmDecoder, PcmEncoder},
    config::{AppConfig, CodecKind, RenderKind, SourceKind},
    events::ChannelEvents,
    media::{CaptureSource, Decoder, Encoder, Renderer},
    pipeline::{ConsumerStage, EncodedUnit, Pipeline, ProducerStage},
};

type BoxedSource = Box<dyn CaptureSource<Frame = AudioFrame>>;
type BoxedEncoder = Box<dyn Encoder<Input = AudioFrame, Unit = EncodedUnit>>;
type BoxedDecoder = Box<dyn Decoder<Unit = EncodedUnit, Frame = AudioFrame>>;
type BoxedRenderer = Box<dyn Renderer<Frame = AudioFrame>>;

struct Args {
    config: Option<PathBuf>,
    list_devices: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        list_devices: false,
    };
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter.next().context("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            }
            "--list-devices" => args.list_devices = true,
            "--help" | "-h" => {
                println!("Usage: relay [--config PATH] [--list-devices]");
                std::process::exit(0);
            }
            other => bail!("Unknown argument: {}", other),
        }
    }

    Ok(args)
}

fn main() -> Result<()> {
    let args = parse_args()?;
    let config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if args.list_devices {
        return print_devices();
    }

    tracing::info!("Starting media relay");

    let settings = CodecSettings::from_config(&config);
    tracing::info!(
        "Codec: {:?}, {} Hz, {} channels, {} ms frames",
        config.codec.kind,
        settings.sample_rate,
        settings.channels,
        settings.frame_duration_ms()
    );

    let source = build_source(&config)?;
    let (encoder, decoder) = build_codec(&config, &settings)?;
    let renderer = build_renderer(&config)?;

    let events = ChannelEvents::new();
    events.install_ctrlc()?;
    events.watch_stdin()?;
    println!("Relay running. Type 'q' + Enter or press Ctrl+C to stop.");

    let pipeline = Pipeline::new(config.pipeline.clone());
    let report = pipeline.run(
        ProducerStage::new(source, encoder),
        ConsumerStage::new(decoder, renderer).with_events(events),
    )?;

    if config.logging.json_report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    report.into_result()?;
    tracing::info!("Relay stopped");
    Ok(())
}

fn build_source(config: &AppConfig) -> Result<BoxedSource> {
    match config.capture.source {
        SourceKind::Synthetic => Ok(Box::new(SyntheticSource::from_config(&config.capture))),
        SourceKind::Device => device_source(config),
    }
}

#[cfg(feature = "device-audio")]
fn device_source(config: &AppConfig) -> Result<BoxedSource> {
    let capture =
        media_relay::audio::CpalCapture::open(&config.capture, config.pipeline.event_poll())?;
    Ok(Box::new(capture))
}

#[cfg(not(feature = "device-audio"))]
fn device_source(_config: &AppConfig) -> Result<BoxedSource> {
    bail!("capture.source = \"device\" requires the `device-audio` feature")
}

fn build_codec(
    config: &AppConfig,
    settings: &CodecSettings,
) -> Result<(BoxedEncoder, BoxedDecoder)> {
    match config.codec.kind {
        CodecKind::Pcm => Ok((
            Box::new(PcmEncoder::new(settings.clone())),
            Box::new(PcmDecoder::new(settings)),
        )),
        CodecKind::Opus => opus_codec(settings),
    }
}

#[cfg(feature = "opus-codec")]
fn opus_codec(settings: &CodecSettings) -> Result<(BoxedEncoder, BoxedDecoder)> {
    use media_relay::codec::{OpusDecoder, OpusEncoder};

    Ok((
        Box::new(OpusEncoder::new(settings.clone())?),
        Box::new(OpusDecoder::new(settings)?),
    ))
}

#[cfg(not(feature = "opus-codec"))]
fn opus_codec(_settings: &CodecSettings) -> Result<(BoxedEncoder, BoxedDecoder)> {
    bail!("codec.kind = \"opus\" requires the `opus-codec` feature")
}

fn build_renderer(config: &AppConfig) -> Result<BoxedRenderer> {
    match config.render.kind {
        RenderKind::Meter => Ok(Box::new(MeterRenderer::new(config.render.report_every))),
        RenderKind::Null => Ok(Box::new(NullRenderer::new())),
        RenderKind::Device => device_renderer(config),
    }
}

#[cfg(feature = "device-audio")]
fn device_renderer(config: &AppConfig) -> Result<BoxedRenderer> {
    let playback = media_relay::audio::CpalPlayback::open(
        config.render.device_id.as_deref(),
        config.capture.sample_rate,
        config.capture.channels,
    )?;
    Ok(Box::new(playback))
}

#[cfg(not(feature = "device-audio"))]
fn device_renderer(_config: &AppConfig) -> Result<BoxedRenderer> {
    bail!("render.kind = \"device\" requires the `device-audio` feature")
}

#[cfg(feature = "device-audio")]
fn print_devices() -> Result<()> {
    println!("\n=== Available Audio Devices ===");
    for device in media_relay::audio::list_devices() {
        let device_type = match (device.is_input, device.is_output) {
            (true, true) => "Input/Output",
            (true, false) => "Input",
            (false, true) => "Output",
            _ => "Unknown",
        };
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {} ({}){}:", device.name, device_type, default_marker);
        println!("    ID: {}", device.id);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();
    Ok(())
}

#[cfg(not(feature = "device-audio"))]
fn print_devices() -> Result<()> {
    bail!("--list-devices requires the `device-audio` feature")
}
