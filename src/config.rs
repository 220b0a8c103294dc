use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub spectrum: SpectrumConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_buffer_ms")]
    pub buffer_ms: u32,
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
    #[serde(default)]
    pub device: i64,
}

#[derive(Debug, Deserialize)]
pub struct SpectrumConfig {
    #[serde(default = "default_bins")]
    pub bins: i64,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Bars,
    Json,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            buffer_ms: default_buffer_ms(),
            open_timeout_ms: default_open_timeout_ms(),
            device: 0,
        }
    }
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            bins: default_bins(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            format: OutputFormat::default(),
        }
    }
}

fn default_sample_rate() -> u32 { 44100 }
fn default_buffer_ms() -> u32 { 50 }
fn default_open_timeout_ms() -> u64 { 2000 }
fn default_bins() -> i64 { 64 }
fn default_interval_ms() -> u64 { 100 }

/// `./micspec.toml`, then the per-user config locations.
pub fn find_config() -> Option<PathBuf> {
    let local = PathBuf::from("micspec.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("micspec").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("micspec").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    parse_config(&content)
}

fn parse_config(content: &str) -> Option<Config> {
    match toml::from_str(content) {
        Ok(config) => Some(config),
        Err(err) => {
            log::warn!("Invalid config: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.capture.sample_rate, 44100);
        assert_eq!(config.capture.buffer_ms, 50);
        assert_eq!(config.spectrum.bins, 64);
        assert_eq!(config.output.format, OutputFormat::Bars);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = parse_config(
            r#"
            [capture]
            device = 2

            [output]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.capture.device, 2);
        assert_eq!(config.capture.open_timeout_ms, 2000);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.output.interval_ms, 100);
    }

    #[test]
    fn malformed_config_is_ignored() {
        assert!(parse_config("[spectrum]\nbins = \"many\"").is_none());
    }
}
