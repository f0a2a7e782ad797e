use config::{Config, Environment, File, FileFormat};
use ng_da_error::{DaError, DaResult};
use ng_da_sdk::{ItemConfig, Variant};
use serde::{self, Deserialize};
use std::{ops::Deref, str::FromStr, sync::Arc};
use tracing::Level;

#[derive(Debug, Clone)]
pub struct Settings(Arc<Inner>);

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Settings {
    /// Load from an optional file, overridden by `NGDA__*` environment variables.
    ///
    /// `NGDA__GENERAL__LOG_LEVEL=debug` sets `general.log_level`.
    pub fn new(config_path: &str) -> DaResult<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(config_path).required(false))
            .add_source(
                Environment::with_prefix("NGDA")
                    .separator("__")
                    .try_parsing(true),
            );
        let inner: Inner = builder.build()?.try_deserialize()?;
        Ok(Self(Arc::new(inner)))
    }

    /// Parse TOML content without consulting the environment.
    pub fn from_toml(content: &str) -> DaResult<Self> {
        let inner: Inner = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(Self(Arc::new(inner)))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Inner {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub simulation: Simulation,
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    #[serde(default = "General::log_level_default")]
    pub log_level: String,
    #[serde(default = "General::log_dir_default")]
    pub log_dir: String,
    #[serde(default = "General::log_file_default")]
    pub log_file: String,
}

impl Default for General {
    fn default() -> Self {
        General {
            log_level: General::log_level_default(),
            log_dir: General::log_dir_default(),
            log_file: General::log_file_default(),
        }
    }
}

impl General {
    fn log_level_default() -> String {
        "info".into()
    }

    fn log_dir_default() -> String {
        "logs".into()
    }

    fn log_file_default() -> String {
        "ng-da.log".into()
    }

    pub fn level(&self) -> DaResult<Level> {
        Level::from_str(self.log_level.trim()).map_err(|_| {
            DaError::ConfigurationError(format!("unknown log level '{}'", self.log_level))
        })
    }
}

/// Simulated field source driving a set of items.
#[derive(Debug, Clone, Deserialize)]
pub struct Simulation {
    /// Base id all simulated items are created under.
    #[serde(default = "Simulation::base_id_default")]
    pub base_id: String,
    /// Interval between two field updates (in milliseconds)
    #[serde(default = "Simulation::tick_interval_ms_default")]
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub items: Vec<SimulatedItem>,
}

impl Default for Simulation {
    fn default() -> Self {
        Simulation {
            base_id: Simulation::base_id_default(),
            tick_interval_ms: Simulation::tick_interval_ms_default(),
            items: Vec::new(),
        }
    }
}

impl Simulation {
    fn base_id_default() -> String {
        "sim".into()
    }

    fn tick_interval_ms_default() -> u64 {
        1000
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulatedItem {
    #[serde(flatten)]
    pub item: ItemConfig,
    #[serde(default)]
    pub signal: SignalConfig,
}

/// Waveform fed into a simulated item on every tick.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalConfig {
    Sine { amplitude: f64, period_ms: u64 },
    Ramp { step: f64, max: f64 },
    Toggle,
    Constant { value: Variant },
}

impl Default for SignalConfig {
    fn default() -> Self {
        SignalConfig::Ramp {
            step: 1.0,
            max: 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ng_da_sdk::{ItemKind, ProcessorConfig};

    #[test]
    fn test_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.general.log_level, "info");
        assert_eq!(settings.general.level().unwrap(), Level::INFO);
        assert_eq!(settings.simulation.base_id, "sim");
        assert_eq!(settings.simulation.tick_interval_ms, 1000);
        assert!(settings.simulation.items.is_empty());
    }

    #[test]
    fn test_simulated_items() {
        let settings = Settings::from_toml(
            r#"
            [general]
            log_level = "debug"

            [simulation]
            base_id = "plant"
            tick_interval_ms = 250

            [[simulation.items]]
            name = "tank.level"
            kind = "read_only"
            signal = { type = "sine", amplitude = 50.0, period_ms = 10000 }
            chain = [
                { type = "scale", factor = 0.1 },
                { type = "level_alarm", high = 4.0 },
            ]

            [[simulation.items]]
            name = "pump.running"
            kind = "read_only"
            signal = { type = "toggle" }
            "#,
        )
        .unwrap();
        assert_eq!(settings.general.level().unwrap(), Level::DEBUG);
        let items = &settings.simulation.items;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].item.kind, ItemKind::ReadOnly);
        assert_eq!(
            items[0].signal,
            SignalConfig::Sine {
                amplitude: 50.0,
                period_ms: 10000
            }
        );
        assert_eq!(
            items[0].item.chain[1].processor,
            ProcessorConfig::LevelAlarm {
                high: Some(4.0),
                low: None
            }
        );
        assert_eq!(items[1].signal, SignalConfig::Toggle);
    }

    #[test]
    fn test_bad_level() {
        let settings = Settings::from_toml("[general]\nlog_level = \"loud\"").unwrap();
        assert!(matches!(
            settings.general.level(),
            Err(DaError::ConfigurationError(_))
        ));
    }
}
