use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use pesaudio::formats::Format;
use pesaudio::process::config::SubStreamFilter;

#[derive(Debug, ClapParser)]
#[command(
    name         = env!("CARGO_PKG_NAME"),
    version      = env!("CARGO_PKG_VERSION"),
    long_version = LONG_VERSION,
    author       = env!("CARGO_PKG_AUTHORS"),
    about        = "Tools for collating audio frames out of PES packetized elementary streams",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// YAML collator configuration. Flags given on the command line take precedence.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_DESCRIBE"),
    ")\nbuilt ",
    env!("BUILD_TIMESTAMP"),
    "\npesaudio ",
    env!("PESAUDIO_VERSION"),
);

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Collate the specified PES stream into an elementary stream and frame index.
    Collate(CollateArgs),

    /// Print stream information
    Info(InfoArgs),
}

/// Options shared by every command that runs the collator.
#[derive(Debug, Args)]
pub struct StreamArgs {
    /// Input PES stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Elementary stream format carried in the packets.
    #[arg(long, value_enum)]
    pub format: AudioFormat,

    /// Strip in-band control markers from the stream.
    #[arg(long)]
    pub control_data: bool,

    /// Forward the PES private data area ahead of each packet payload.
    #[arg(long)]
    pub pass_private_data: bool,

    /// Only accept packets whose first private byte matches, as MASK:CODE.
    #[arg(long, value_name = "MASK:CODE", value_parser = parse_sub_stream_filter)]
    pub stream_id_filter: Option<SubStreamFilter>,
}

#[derive(Debug, Args)]
pub struct CollateArgs {
    #[command(flatten)]
    pub stream: StreamArgs,

    /// Output path for the elementary stream and frame index.
    #[arg(long, value_name = "PATH")]
    pub output_path: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    #[command(flatten)]
    pub stream: StreamArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum AudioFormat {
    /// MPEG-1/2/2.5 audio, Layers I to III.
    Mpeg,
    /// AC-3 and E-AC-3.
    Ac3,
    /// AAC in ADTS framing.
    Adts,
}

impl From<AudioFormat> for Format {
    fn from(format: AudioFormat) -> Self {
        match format {
            AudioFormat::Mpeg => Format::MpegAudio,
            AudioFormat::Ac3 => Format::Ac3,
            AudioFormat::Adts => Format::Adts,
        }
    }
}

fn parse_byte(value: &str) -> Result<u8, String> {
    let value = value.trim();
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid byte {value:?}: {e}"))
}

pub fn parse_sub_stream_filter(value: &str) -> Result<SubStreamFilter, String> {
    let Some((mask, code)) = value.split_once(':') else {
        return Err(format!("expected MASK:CODE, got {value:?}"));
    };

    let mask = parse_byte(mask)?;
    let code = parse_byte(code)?;
    if code & !mask != 0 {
        return Err(format!(
            "code {code:#04X} has bits outside mask {mask:#04X} and can never match"
        ));
    }

    Ok(SubStreamFilter { mask, code })
}

#[test]
fn sub_stream_filter_argument() {
    assert_eq!(
        parse_sub_stream_filter("0xF8:0x80"),
        Ok(SubStreamFilter {
            mask: 0xF8,
            code: 0x80
        })
    );
    assert_eq!(
        parse_sub_stream_filter("255:129"),
        Ok(SubStreamFilter {
            mask: 0xFF,
            code: 0x81
        })
    );
    assert!(parse_sub_stream_filter("0xF8").is_err());
    assert!(parse_sub_stream_filter("0xF0:0x81").is_err());
    assert!(parse_sub_stream_filter("0x1FF:0").is_err());
}

#[test]
fn command_line() {
    let cli = Cli::try_parse_from([
        "pesaudiod",
        "--strict",
        "collate",
        "in.pes",
        "--format",
        "adts",
        "--stream-id-filter",
        "0xF8:0x80",
        "--output-path",
        "out",
    ])
    .expect("valid command line");

    assert!(cli.strict);
    let Commands::Collate(args) = cli.command else {
        panic!("expected collate");
    };
    assert_eq!(args.stream.format, AudioFormat::Adts);
    assert_eq!(Format::from(args.stream.format), Format::Adts);
    assert_eq!(args.output_path, Some(PathBuf::from("out")));
    assert!(args.stream.stream_id_filter.is_some());

    assert!(Cli::try_parse_from(["pesaudiod", "info", "in.pes"]).is_err());
}

#[test]
fn long_version_names_builds() {
    assert!(LONG_VERSION.starts_with(env!("CARGO_PKG_VERSION")));
    assert!(LONG_VERSION.contains(env!("PESAUDIO_VERSION")));

    let err = Cli::try_parse_from(["pesaudiod", "--version"]).expect_err("version exits");
    assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
}
