//! Declarative item and chain descriptions, deserialized from settings.

use crate::{IODirections, ItemKind, Variant, VariantType};
use serde::{Deserialize, Serialize};

/// One processing chain entry: which directions it applies to and what it does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEntryConfig {
    #[serde(default = "ChainEntryConfig::default_scope")]
    pub scope: IODirections,
    #[serde(flatten)]
    pub processor: ProcessorConfig,
}

impl ChainEntryConfig {
    fn default_scope() -> IODirections {
        IODirections::INPUT
    }

    pub fn input(processor: ProcessorConfig) -> Self {
        Self {
            scope: IODirections::INPUT,
            processor,
        }
    }
}

/// Built-in chain processors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessorConfig {
    /// `value * factor + offset`
    Scale {
        factor: f64,
        #[serde(default)]
        offset: f64,
    },
    /// Invert booleans, negate numbers.
    Negate,
    /// High/low level alarms.
    LevelAlarm {
        #[serde(default)]
        high: Option<f64>,
        #[serde(default)]
        low: Option<f64>,
    },
    /// Operator-forced value.
    ManualOverride {
        #[serde(default)]
        value: Option<Variant>,
    },
    /// Aggregate `*.alarm` / `*.error` attributes.
    SumAlarm,
}

/// Declarative description of one data item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemConfig {
    /// Item name, relative to the factory's base id.
    pub name: String,
    pub kind: ItemKind,
    /// Type written values are coerced into.
    #[serde(default)]
    pub declared_type: Option<VariantType>,
    /// Whether `set_value(Null)` is accepted. Defaults to true for commands.
    #[serde(default)]
    pub accept_null: Option<bool>,
    #[serde(default)]
    pub chain: Vec<ChainEntryConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_config_from_json() {
        let json = r#"{
            "name": "temperature",
            "kind": "chained",
            "declared_type": 4,
            "chain": [
                { "type": "scale", "factor": 0.1 },
                { "type": "level_alarm", "high": 80.0, "scope": { "input": true, "output": false } },
                { "type": "negate", "scope": { "output": true } }
            ]
        }"#;
        let cfg: ItemConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.kind, ItemKind::Chained);
        assert_eq!(cfg.declared_type, Some(VariantType::Double));
        assert_eq!(cfg.chain.len(), 3);
        assert_eq!(
            cfg.chain[0].processor,
            ProcessorConfig::Scale {
                factor: 0.1,
                offset: 0.0
            }
        );
        assert_eq!(cfg.chain[0].scope, IODirections::INPUT);
        assert_eq!(cfg.chain[2].scope, IODirections::OUTPUT);
    }
}
