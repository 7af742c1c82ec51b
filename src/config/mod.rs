mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = ["./config.toml", "./airwave.toml", "/etc/airwave/config.toml"];

    for path_str in default_paths {
        let path = Path::new(path_str);
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    let playout = &config.playout;

    if playout.nominal_chunk_secs <= 0.0 {
        anyhow::bail!("playout.nominal_chunk_secs must be positive");
    }
    if playout.max_chunk_secs < playout.nominal_chunk_secs {
        anyhow::bail!("playout.max_chunk_secs cannot be below nominal_chunk_secs");
    }
    if playout.buffer_high_water_secs <= 0.0 {
        anyhow::bail!("playout.buffer_high_water_secs must be positive");
    }
    if config.backfill.concurrency == 0 {
        anyhow::bail!("backfill.concurrency must be at least 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.playout.nominal_chunk_secs, 30.0);
        assert_eq!(config.playout.ads_per_break, 3);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [playout]
            nominal_chunk_secs = 20.0

            [storage]
            db_path = "/data/airwave.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.playout.nominal_chunk_secs, 20.0);
        assert_eq!(config.playout.max_chunk_secs, 60.0);
        assert_eq!(
            config.storage.db_path,
            std::path::PathBuf::from("/data/airwave.db")
        );
    }

    #[test]
    fn bad_chunk_bounds_rejected() {
        let config: Config = toml::from_str(
            r#"
            [playout]
            nominal_chunk_secs = 90.0
            "#,
        )
        .unwrap();
        assert!(validate_config(&config).is_err());
    }
}
