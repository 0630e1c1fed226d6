use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::{Validate, ValidationError};

use crate::domain::Span;
use crate::simulation::{ChargingPolicy, PolicyBook};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const CONFIG_PATH_ENV: &str = "EVPROF_CONFIG";
pub const ENV_PREFIX: &str = "EVPROF__";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub run: RunConfig,
    #[validate(nested)]
    pub data: DataConfig,
    pub temperature: TemperatureConfig,
    #[validate(nested)]
    pub charging: ChargingPolicy,
    pub output: OutputConfig,
    /// TOML policy book replacing the built-in one
    pub policies_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RunConfig {
    #[validate(range(min = 1))]
    pub total_profiles: usize,
    /// Master seed; drawn from entropy when absent
    pub seed: Option<u64>,
    #[validate(range(min = 1, max = 1024))]
    pub workers: usize,
    /// Candidate schedules per day before it is skipped
    #[validate(range(min = 1))]
    pub max_attempts: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            total_profiles: 100,
            seed: None,
            workers: 4,
            max_attempts: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DataConfig {
    pub segments: PathBuf,
    pub charging: PathBuf,
    pub temperature: PathBuf,
    #[validate(custom(function = "ascii_delimiter"))]
    pub delimiter: char,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            segments: PathBuf::from("data/segments.csv"),
            charging: PathBuf::from("data/charging.csv"),
            temperature: PathBuf::from("data/temperature.csv"),
            delimiter: ',',
        }
    }
}

impl DataConfig {
    pub fn delimiter_byte(&self) -> u8 {
        // ascii checked during validation
        self.delimiter as u8
    }
}

fn ascii_delimiter(delimiter: &char) -> Result<(), ValidationError> {
    if delimiter.is_ascii() && !delimiter.is_ascii_alphanumeric() {
        Ok(())
    } else {
        Err(ValidationError::new("delimiter_not_ascii_punctuation"))
    }
}

/// Optional narrowing of the ambient temperature range
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemperatureConfig {
    pub min_c: Option<f64>,
    pub max_c: Option<f64>,
}

impl TemperatureConfig {
    /// Sampling range within the derating table's `table` bounds
    pub fn resolve(&self, table: Span) -> Result<Span> {
        let bounds = Span::new(
            self.min_c.unwrap_or(table.min),
            self.max_c.unwrap_or(table.max),
        );
        if !bounds.is_valid() {
            bail!(
                "temperature min {} °C is above max {} °C",
                bounds.min,
                bounds.max
            );
        }
        if bounds.min < table.min || bounds.max > table.max {
            bail!(
                "temperature range [{}, {}] °C exceeds the derating table [{}, {}] °C",
                bounds.min,
                bounds.max,
                table.min,
                table.max
            );
        }
        Ok(bounds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub format: OutputFormat,
    /// Echo profiles to stdout
    pub console: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("profiles.txt"),
            format: OutputFormat::Text,
            console: true,
        }
    }
}

impl Config {
    /// Load from `$EVPROF_CONFIG` or `config/default.toml`, then `EVPROF__*` env
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from(path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment
            .extract()
            .with_context(|| format!("invalid configuration ({})", path.as_ref().display()))?;
        config.validate().context("configuration failed validation")?;
        config
            .charging
            .validate_tables()
            .context("charging tables failed validation")?;
        Ok(config)
    }

    pub fn policy_book(&self) -> Result<PolicyBook> {
        match &self.policies_path {
            Some(path) => PolicyBook::from_toml_file(path),
            None => Ok(PolicyBook::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn load(path: &str) -> std::result::Result<Config, figment::Error> {
        Config::load_from(path).map_err(|e| figment::Error::from(format!("{e:#}")))
    }

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = load("missing.toml")?;
            assert_eq!(config.run.total_profiles, 100);
            assert_eq!(config.run.max_attempts, 100_000);
            assert_eq!(config.data.delimiter_byte(), b',');
            assert_eq!(config.charging.safety_buffer_km, 20.0);
            assert_eq!(config.output.format, OutputFormat::Text);
            assert!(config.policies_path.is_none());
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "run.toml",
                r#"
                [run]
                total_profiles = 12
                seed = 7

                [data]
                delimiter = ";"

                [output]
                format = "json"
                console = false

                [charging]
                dc_loss_percent = [6.5, 7.5]
                "#,
            )?;
            jail.set_env("EVPROF__RUN__WORKERS", "2");
            jail.set_env("EVPROF__CHARGING__SAFETY_BUFFER_KM", "30");

            let config = load("run.toml")?;
            assert_eq!(config.run.total_profiles, 12);
            assert_eq!(config.run.seed, Some(7));
            assert_eq!(config.run.workers, 2);
            assert_eq!(config.data.delimiter_byte(), b';');
            assert_eq!(config.output.format, OutputFormat::Json);
            assert!(!config.output.console);
            assert_eq!(config.charging.dc_loss_percent, Span::new(6.5, 7.5));
            assert_eq!(config.charging.safety_buffer_km, 30.0);
            assert_eq!(config.charging.ac_target_soc_percent, 100.0);
            Ok(())
        });
    }

    #[test]
    fn test_validation_rejects_zero_profiles() {
        Jail::expect_with(|jail| {
            jail.set_env("EVPROF__RUN__TOTAL_PROFILES", "0");
            assert!(load("missing.toml").is_err());
            Ok(())
        });
    }

    #[test]
    fn test_temperature_resolution() {
        let table = Span::new(-10.0, 35.0);
        let default = TemperatureConfig::default();
        assert_eq!(default.resolve(table).unwrap(), table);

        let narrowed = TemperatureConfig {
            min_c: Some(0.0),
            max_c: None,
        };
        assert_eq!(narrowed.resolve(table).unwrap(), Span::new(0.0, 35.0));

        let outside = TemperatureConfig {
            min_c: Some(-20.0),
            max_c: None,
        };
        assert!(outside.resolve(table).is_err());

        let inverted = TemperatureConfig {
            min_c: Some(20.0),
            max_c: Some(10.0),
        };
        assert!(inverted.resolve(table).is_err());
    }
}
