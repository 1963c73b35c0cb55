//! Output devices and configuration commands.

use std::path::Path;

use crate::config::{self, Config, ConfigError};
use crate::error::Result;
use crate::player::{default_output_device, list_output_devices};

/// List audio output devices, marking the default and the configured one
pub fn cmd_devices(config: &Config) {
    let default = default_output_device();
    let devices = list_output_devices();
    if devices.is_empty() {
        println!("No audio output devices found.");
        return;
    }

    let wanted = config.audio.output_device.trim().to_lowercase();
    println!("Audio output devices:");
    for name in devices {
        let mut marks = Vec::new();
        if name == default {
            marks.push("default");
        }
        if !wanted.is_empty() && name.to_lowercase().contains(&wanted) {
            marks.push("configured");
        }
        if marks.is_empty() {
            println!("  {}", name);
        } else {
            println!("  {} ({})", name, marks.join(", "));
        }
    }
}

/// Print the config file, writing defaults first if it is missing (or `reset`)
pub fn cmd_config(explicit: Option<&Path>, reset: bool) -> Result<()> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => config::config_path().ok_or(ConfigError::NoConfigDir)?,
    };

    if reset || !path.exists() {
        config::save_to(&Config::default(), &path)?;
        println!("Wrote default configuration.");
    }

    let current = config::load_from(&path)?;
    println!("Config file: {}", path.display());
    println!();
    let rendered = toml::to_string_pretty(&current).map_err(ConfigError::Serialize)?;
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tapedeck").join("config.toml");

        cmd_config(Some(&path), false).unwrap();

        let written = config::load_from(&path).unwrap();
        assert_eq!(written.audio.sample_rate, 44_100);
    }

    #[test]
    fn test_config_reset_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[playback]\nseek_step_secs = 9.0\n").unwrap();

        cmd_config(Some(&path), false).unwrap();
        assert_eq!(config::load_from(&path).unwrap().playback.seek_step_secs, 9.0);

        cmd_config(Some(&path), true).unwrap();
        assert_eq!(config::load_from(&path).unwrap().playback.seek_step_secs, 2.0);
    }
}
