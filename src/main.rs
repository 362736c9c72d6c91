//! CLI Entry Point for frame-daq
//!
//! Provides command-line access to:
//! - Byte-level link debugging (`raw`, `hexdump`)
//! - Per-byte packet annotation without buffering (`packets`)
//! - Threaded acquisition into live sliding windows with optional CSV export (`stream`)
//!
//! Every command reads either a serial port or a recorded capture file.
//!
//! # Usage
//!
//! Watch a live link:
//! ```bash
//! frame-daq --format ae_bc_nibble stream --port /dev/ttyUSB0 --baud 3000000
//! ```
//!
//! Record ten seconds of samples to CSV:
//! ```bash
//! frame-daq stream --port /dev/ttyUSB0 --duration 10 --csv samples.csv
//! ```
//!
//! Decode a capture:
//! ```bash
//! frame-daq packets --input capture.bin --count 10
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use frame_daq::acquisition::{self, SessionOptions, StreamEnd};
use frame_daq::config::AppConfig;
use frame_daq::data::{ChannelWindows, CsvExporter};
use frame_daq::frame::{FrameFormat, FrameFormatConfig, ReadProgress, Step, StreamDecoder};
use frame_daq::inspect::{describe_step, raw_byte_line, HexDumper, MarkerScanner};
use frame_daq::source::{ByteSource, ReaderSource, SerialSource, SourceRead};
use frame_daq::tracing_init::{self, OutputFormat, TracingConfig};

#[derive(Parser)]
#[command(name = "frame-daq")]
#[command(about = "Frame decoder and live monitor for FPGA ADC serial links", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = frame_daq::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Frame format preset, overriding the configuration
    #[arg(long, global = true)]
    format: Option<String>,

    /// Log level, overriding the configuration
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormat> for OutputFormat {
    fn from(value: LogFormat) -> Self {
        match value {
            LogFormat::Pretty => OutputFormat::Pretty,
            LogFormat::Compact => OutputFormat::Compact,
            LogFormat::Json => OutputFormat::Json,
        }
    }
}

#[derive(Args, Clone)]
struct SourceArgs {
    /// Serial device, overriding the configuration
    #[arg(long, conflicts_with = "input")]
    port: Option<String>,

    /// Baud rate, overriding the configuration
    #[arg(long)]
    baud: Option<u32>,

    /// Read a recorded capture file instead of the serial port
    #[arg(long)]
    input: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every byte with its index and count sync markers
    Raw {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Hex dump of the raw stream
    Hexdump {
        #[command(flatten)]
        source: SourceArgs,

        /// Bytes per line
        #[arg(long, default_value_t = frame_daq::inspect::DEFAULT_HEX_WIDTH)]
        width: usize,
    },

    /// Annotate every byte with its role in the packet structure
    Packets {
        #[command(flatten)]
        source: SourceArgs,

        /// Stop after this many complete packets
        #[arg(long)]
        count: Option<u64>,
    },

    /// Acquire on a producer thread and monitor the live windows
    Stream {
        #[command(flatten)]
        source: SourceArgs,

        /// Stop after this many records
        #[arg(long)]
        count: Option<u64>,

        /// Stop after this many seconds of acquisition
        #[arg(long, value_parser = parse_seconds)]
        duration: Option<Duration>,

        /// Export every record to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(preset) = &cli.format {
        config.format = FrameFormatConfig::preset(preset);
    }
    if let Some(level) = &cli.log_level {
        config.application.log_level = level.clone();
    }
    config.validate()?;

    tracing_init::init(
        TracingConfig::from_app_config(&config)?.with_format(cli.log_format.into()),
    )?;

    let format = config.frame_format()?;
    info!(
        format = format.name(),
        sync = ?format.sync_bytes(),
        payload_length = format.payload_length(),
        channels = format.channel_count(),
        "Frame format loaded"
    );

    match cli.command {
        Commands::Raw { source } => {
            let source = open_source(&config, &source)?;
            let chunk = config.serial.read_chunk;
            run_blocking(move |stop| raw_debug(source, &format, chunk, &stop)).await
        }
        Commands::Hexdump { source, width } => {
            let source = open_source(&config, &source)?;
            let chunk = config.serial.read_chunk;
            run_blocking(move |stop| hex_dump(source, &format, width, chunk, &stop)).await
        }
        Commands::Packets { source, count } => {
            let source = open_source(&config, &source)?;
            let chunk = config.serial.read_chunk;
            run_blocking(move |stop| packet_debug(source, format, count, chunk, &stop)).await
        }
        Commands::Stream {
            source,
            count,
            duration,
            csv,
        } => {
            let source = open_source(&config, &source)?;
            let csv = csv.or_else(|| config.export.csv_path.clone());
            let options = SessionOptions::from_config(&config)
                .with_max_records(count)
                .with_max_duration(duration);
            stream(source, format, &config, options, csv.as_deref()).await
        }
    }
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value.parse().map_err(|e| format!("{e}"))?;
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("{e}"))
}

fn open_source(config: &AppConfig, args: &SourceArgs) -> Result<Box<dyn ByteSource>> {
    if let Some(path) = &args.input {
        let source = ReaderSource::open(path)
            .with_context(|| format!("opening capture {}", path.display()))?;
        return Ok(Box::new(source));
    }
    let mut serial = config.serial.clone();
    if let Some(port) = &args.port {
        serial.port = port.clone();
    }
    if let Some(baud) = args.baud {
        serial.baud_rate = baud;
    }
    Ok(Box::new(SerialSource::open(&serial)?))
}

/// Run a synchronous debug loop off the async runtime, with Ctrl-C setting `stop`.
async fn run_blocking<F>(job: F) -> Result<()>
where
    F: FnOnce(Arc<AtomicBool>) -> Result<()> + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let signal_stop = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_stop.store(true, Ordering::SeqCst);
        }
    });
    tokio::task::spawn_blocking(move || job(stop)).await?
}

/// Read raw chunks until the source closes or `stop` is set.
fn pump(
    source: &mut dyn ByteSource,
    chunk: usize,
    stop: &AtomicBool,
    mut on_bytes: impl FnMut(&[u8]),
) -> Result<()> {
    let mut buf = vec![0u8; chunk.max(1)];
    while !stop.load(Ordering::SeqCst) {
        match source.read_bytes(&mut buf) {
            Ok(SourceRead::Data(n)) => on_bytes(&buf[..n]),
            Ok(SourceRead::Idle) => std::thread::sleep(Duration::from_millis(1)),
            Ok(SourceRead::Closed) => break,
            Err(e) => {
                source.close();
                bail!("{} failed: {}", source.describe(), e);
            }
        }
    }
    source.close();
    Ok(())
}

fn raw_debug(
    mut source: Box<dyn ByteSource>,
    format: &FrameFormat,
    chunk: usize,
    stop: &AtomicBool,
) -> Result<()> {
    println!("Raw Serial Data Debug:");
    println!("Format: [ByteCount] HEX (DEC) 'ASCII'");
    println!("{}", "-".repeat(50));

    let mut scanner = MarkerScanner::new(format);
    let result = pump(source.as_mut(), chunk, stop, |bytes| {
        for &byte in bytes {
            println!("{}", raw_byte_line(scanner.bytes_scanned(), byte));
            if let Some(start) = scanner.push(byte) {
                println!("*** SYNC HEADER DETECTED at byte {} ***", start);
                println!("{}", "-".repeat(30));
            }
        }
    });
    println!(
        "\nStopped. Received {} bytes, detected {} sync headers",
        scanner.bytes_scanned(),
        scanner.count()
    );
    result
}

fn hex_dump(
    mut source: Box<dyn ByteSource>,
    format: &FrameFormat,
    width: usize,
    chunk: usize,
    stop: &AtomicBool,
) -> Result<()> {
    println!("Hex Dump Debug:");
    println!("{}", "-".repeat(60));

    let mut dumper = HexDumper::new(width);
    let mut scanner = MarkerScanner::new(format);
    let result = pump(source.as_mut(), chunk, stop, |bytes| {
        bytes.iter().for_each(|&b| {
            scanner.push(b);
        });
        dumper.push(bytes, |line| println!("{line}"));
    });
    if let Some(line) = dumper.finish() {
        println!("{line}");
    }
    println!("\nStopped. Received {} bytes total", dumper.total_bytes());
    let offsets: Vec<String> = scanner.offsets().iter().take(32).map(|o| format!("{o:#X}")).collect();
    println!(
        "{} sync markers{}{}",
        scanner.count(),
        if offsets.is_empty() { "" } else { " at " },
        offsets.join(", ")
    );
    result
}

fn packet_debug(
    source: Box<dyn ByteSource>,
    format: FrameFormat,
    count: Option<u64>,
    chunk: usize,
    stop: &AtomicBool,
) -> Result<()> {
    println!("Packet Structure Debug:");
    println!(
        "Looking for: {} + {} payload bytes ({} channels)",
        format
            .sync_bytes()
            .iter()
            .map(|b| format!("[0x{b:02X}]"))
            .collect::<String>(),
        format.payload_length(),
        format.channel_count()
    );
    println!("{}", "-".repeat(60));

    let limit = count.unwrap_or(u64::MAX);
    let mut stream = StreamDecoder::new(source, format.clone()).with_chunk_size(chunk);
    let mut index = 0u64;
    let mut packets = 0u64;

    while !stop.load(Ordering::SeqCst) && packets < limit {
        let progress = stream.read_steps(|byte, step| {
            if packets >= limit {
                return;
            }
            println!("{}", describe_step(index, byte, &step, &format));
            if matches!(step, Step::Record(_)) {
                packets += 1;
                println!();
            }
            index += 1;
        })?;
        match progress {
            ReadProgress::Closed => break,
            ReadProgress::Idle => std::thread::sleep(Duration::from_millis(1)),
            ReadProgress::Bytes(_) => {}
        }
    }
    stream.close();
    println!("\nStopped. Processed {index} bytes, {packets} complete packets");
    Ok(())
}

async fn stream(
    source: Box<dyn ByteSource>,
    format: FrameFormat,
    config: &AppConfig,
    options: SessionOptions,
    csv: Option<&Path>,
) -> Result<()> {
    let channels = format.channel_count();
    let mut windows = ChannelWindows::from_config(&config.window, channels)?;
    let mut exporter = match csv {
        Some(path) => Some(CsvExporter::create(path, channels)?),
        None => None,
    };

    let (handle, receiver) = acquisition::start(source, format, options)?;

    let mut ticker = tokio::time::interval(Duration::from_millis(config.acquisition.tick_ms));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stopping = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let drained = receiver.drain();
                windows.extend(&drained.records);
                if let Some(exporter) = exporter.as_mut() {
                    exporter.write_batch(&drained.records)?;
                }
                if !drained.records.is_empty() {
                    log_windows(&windows, handle.stats().records_dropped);
                }
                if drained.is_final() {
                    break;
                }
            }
            _ = &mut ctrl_c, if !stopping => {
                info!("Ctrl-C received, stopping acquisition");
                stopping = true;
                handle.stop();
            }
        }
    }

    if let Some(exporter) = exporter {
        exporter.finish()?;
    }
    let summary = tokio::task::spawn_blocking(move || handle.join()).await??;
    info!(
        bytes = summary.stats.bytes_read,
        records = summary.stats.records_decoded,
        dropped = summary.stats.records_dropped,
        resyncs = summary.stats.resyncs,
        idle_reads = summary.stats.idle_reads,
        "Session summary"
    );
    match summary.end {
        StreamEnd::Clean => Ok(()),
        StreamEnd::Failed(message) => {
            warn!(%message, "Acquisition ended on a source failure");
            bail!("acquisition failed: {message}")
        }
    }
}

fn log_windows(windows: &ChannelWindows, dropped: u64) {
    for channel in 0..windows.channel_count() {
        if let Some(summary) = windows.channel(channel).and_then(|w| w.summary()) {
            info!(
                channel,
                sequence = ?windows.last_sequence(),
                len = summary.len,
                min = summary.min,
                max = summary.max,
                last = summary.latest,
                dropped,
                "Window"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_daq::source::ScriptedSource;

    #[test]
    fn pump_reads_in_configured_chunks() {
        let mut source = ScriptedSource::from_bytes((0u8..10).collect::<Vec<_>>());
        let stop = AtomicBool::new(false);
        let mut sizes = Vec::new();
        pump(&mut source, 4, &stop, |bytes| sizes.push(bytes.len())).unwrap();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn duration_argument_accepts_fractional_seconds() {
        assert_eq!(parse_seconds("2.5").unwrap(), Duration::from_millis(2500));
        assert!(parse_seconds("-1").is_err());
        assert!(parse_seconds("soon").is_err());
    }

    #[test]
    fn stream_command_parses_duration() {
        let cli = Cli::try_parse_from(["frame-daq", "stream", "--input", "capture.bin", "--duration", "10"])
            .unwrap();
        match cli.command {
            Commands::Stream { duration, count, .. } => {
                assert_eq!(duration, Some(Duration::from_secs(10)));
                assert_eq!(count, None);
            }
            _ => panic!("expected the stream command"),
        }
    }
}
