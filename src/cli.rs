use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "micspec", about = "Live microphone spectrum analyzer")]
pub struct Cli {
    /// Input device index (see --list-devices). Out of range falls back to 0.
    #[arg(short, long, default_value_t = 0)]
    pub device: i64,

    /// Number of frequency bands
    #[arg(short = 'n', long, default_value_t = 64)]
    pub bins: i64,

    /// Milliseconds between polls
    #[arg(long, default_value_t = 100)]
    pub interval_ms: u64,

    /// Stop after this many polls (runs until killed otherwise)
    #[arg(long)]
    pub polls: Option<u64>,

    /// Print one JSON object per spectrum instead of a bar graph
    #[arg(long)]
    pub json: bool,

    /// Replay an audio file (WAV, MP3, FLAC, OGG) instead of a microphone
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// List input devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Config file (default: ./micspec.toml or ~/.config/micspec/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Requested capture sample rate in Hz
    #[arg(long, default_value_t = 44100)]
    pub sample_rate: u32,

    /// Capture chunk length in milliseconds
    #[arg(long, default_value_t = 50)]
    pub buffer_ms: u32,

    /// Give up opening a device after this many milliseconds
    #[arg(long, default_value_t = 2000)]
    pub open_timeout_ms: u64,
}
