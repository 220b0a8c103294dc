mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use std::time::{Duration, Instant};

use cli::Cli;
use config::OutputFormat;
use micspec::audio::device::describe_devices;
use micspec::audio::input::{CpalBackend, InputSettings};
use micspec::audio::replay::FileBackend;
use micspec::{
    DiagnosticLevel, InputBackend, PollOutcome, PollRequest, SessionController, SpectrumResult,
};

const BAR_LEVELS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();
    let mut format = if cli.json { OutputFormat::Json } else { OutputFormat::Bars };

    let config_path = cli.config.clone().or_else(config::find_config);
    if let Some(ref path) = config_path {
        if let Some(cfg) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            // Merge: config values apply only when CLI is at its default
            if cli.device == 0 { cli.device = cfg.capture.device; }
            if cli.sample_rate == 44100 { cli.sample_rate = cfg.capture.sample_rate; }
            if cli.buffer_ms == 50 { cli.buffer_ms = cfg.capture.buffer_ms; }
            if cli.open_timeout_ms == 2000 { cli.open_timeout_ms = cfg.capture.open_timeout_ms; }
            if cli.bins == 64 { cli.bins = cfg.spectrum.bins; }
            if cli.interval_ms == 100 { cli.interval_ms = cfg.output.interval_ms; }
            if !cli.json { format = cfg.output.format; }
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    if let Some(ref input) = cli.input {
        if !input.exists() {
            anyhow::bail!("Input file not found: {}", input.display());
        }
        let backend = FileBackend::open_file(input, cli.buffer_ms)
            .with_context(|| format!("Failed to load {}", input.display()))?;
        return run(SessionController::new(backend), &cli, format);
    }

    let backend = CpalBackend::new(InputSettings {
        sample_rate: cli.sample_rate,
        buffer_ms: cli.buffer_ms,
        open_timeout: Duration::from_millis(cli.open_timeout_ms),
    });
    run(SessionController::new(backend), &cli, format)
}

fn run<B: InputBackend>(
    controller: SessionController<B>,
    cli: &Cli,
    format: OutputFormat,
) -> Result<()> {
    if cli.list_devices {
        println!("{}", describe_devices(&controller.list_devices()));
        return Ok(());
    }

    log::info!("micspec - live spectrum");
    log::info!("Device: {}, bands: {}, interval: {}ms", cli.device, cli.bins, cli.interval_ms);

    let interval = Duration::from_millis(cli.interval_ms.max(1));
    let request = PollRequest::enabled(cli.bins, cli.device);
    let mut polls = 0u64;

    while cli.polls.map_or(true, |limit| polls < limit) {
        let started = Instant::now();
        let report = controller.poll(request);
        polls += 1;

        for diagnostic in &report.diagnostics {
            match diagnostic.level {
                DiagnosticLevel::Remark => log::debug!("{}", diagnostic.message),
                DiagnosticLevel::Warning => log::warn!("{}", diagnostic.message),
                DiagnosticLevel::Error => log::error!("{}", diagnostic.message),
            }
        }

        match report.outcome {
            PollOutcome::Ready(ref result) => match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string(result).context("Failed to serialize spectrum")?
                ),
                OutputFormat::Bars => println!("{}", render_bars(result)),
            },
            PollOutcome::Pending | PollOutcome::Disabled => {}
            PollOutcome::Error(ref err) if !err.is_device_failure() => {
                // Bad request; polling again with the same arguments cannot help
                controller.dispose();
                anyhow::bail!("{}", err);
            }
            PollOutcome::Error(_) => {}
        }

        if let Some(remaining) = interval.checked_sub(started.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    controller.dispose();
    log::info!("Done after {} polls", polls);
    Ok(())
}

/// One character per band, scaled to the loudest band, followed by the peak.
fn render_bars(result: &SpectrumResult) -> String {
    let max = result.magnitudes.iter().copied().fold(0.0f64, f64::max);
    let mut line: String = result
        .magnitudes
        .iter()
        .map(|&m| {
            if max <= 0.0 {
                BAR_LEVELS[0]
            } else {
                let level = (m / max * (BAR_LEVELS.len() - 1) as f64).round() as usize;
                BAR_LEVELS[level.min(BAR_LEVELS.len() - 1)]
            }
        })
        .collect();

    if let Some((freq, mag)) = result.peak() {
        line.push_str(&format!(" | peak {:.0} Hz ({:.3})", freq, mag));
    }
    line
}
