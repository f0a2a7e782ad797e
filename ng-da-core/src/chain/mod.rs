//! Ordered, direction-scoped processing chains.

pub mod processors;

use ng_da_sdk::{
    AttributeSnapshot, ChainEntryConfig, ChainProcessor, IODirection, IODirections,
    ProcessorConfig, Variant,
};
use processors::{LevelAlarm, ManualOverride, Negate, Scale, SumAlarm};
use serde::Serialize;
use std::{fmt, sync::Arc};
use tracing::trace;

/// Identifier of an entry within one item's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ChainEntryId(pub(crate) u64);

impl fmt::Display for ChainEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One processing step together with the directions it applies to.
#[derive(Clone)]
pub struct ChainEntry {
    pub(crate) id: ChainEntryId,
    pub(crate) scope: IODirections,
    pub(crate) processor: Arc<dyn ChainProcessor>,
}

impl ChainEntry {
    #[inline]
    pub fn id(&self) -> ChainEntryId {
        self.id
    }

    #[inline]
    pub fn scope(&self) -> IODirections {
        self.scope
    }

    #[inline]
    pub fn processor(&self) -> &Arc<dyn ChainProcessor> {
        &self.processor
    }
}

impl fmt::Debug for ChainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainEntry")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("processor", &self.processor.name())
            .finish()
    }
}

/// Run every entry whose scope contains `direction`, in order.
///
/// Each entry receives the output of the previous one. Identical inputs over
/// an unchanged chain always produce identical outputs.
pub fn run_chain(
    entries: &[ChainEntry],
    direction: IODirection,
    value: Variant,
    attributes: AttributeSnapshot,
) -> (Variant, AttributeSnapshot) {
    entries
        .iter()
        .filter(|entry| entry.scope.contains(direction))
        .fold((value, attributes), |(value, attributes), entry| {
            trace!(
                entry = %entry.id,
                processor = entry.processor.name(),
                ?direction,
                "Applying chain entry"
            );
            entry.processor.process(value, attributes)
        })
}

/// Instantiate a built-in processor from its configuration.
pub fn build_processor(config: &ProcessorConfig) -> Arc<dyn ChainProcessor> {
    match config {
        ProcessorConfig::Scale { factor, offset } => Arc::new(Scale::new(*factor, *offset)),
        ProcessorConfig::Negate => Arc::new(Negate),
        ProcessorConfig::LevelAlarm { high, low } => Arc::new(LevelAlarm::new(*high, *low)),
        ProcessorConfig::ManualOverride { value } => {
            Arc::new(ManualOverride::new(value.clone()))
        }
        ProcessorConfig::SumAlarm => Arc::new(SumAlarm),
    }
}

/// Resolve a chain configuration into `(scope, processor)` pairs.
pub fn build_chain(configs: &[ChainEntryConfig]) -> Vec<(IODirections, Arc<dyn ChainProcessor>)> {
    configs
        .iter()
        .map(|cfg| (cfg.scope, build_processor(&cfg.processor)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use processors::FnProcessor;

    fn entry(id: u64, scope: IODirections, p: impl ChainProcessor + 'static) -> ChainEntry {
        ChainEntry {
            id: ChainEntryId(id),
            scope,
            processor: Arc::new(p),
        }
    }

    #[test]
    fn test_sequential_composition() {
        let add_one = FnProcessor::new("add-one", |v: Variant, a| {
            (Variant::Int64(v.as_i64().unwrap_or(0) + 1), a)
        });
        let double = FnProcessor::new("double", |v: Variant, a| {
            (Variant::Int64(v.as_i64().unwrap_or(0) * 2), a)
        });
        let chain = vec![
            entry(1, IODirections::INPUT, add_one),
            entry(2, IODirections::INPUT, double),
        ];
        let (v, _) = run_chain(
            &chain,
            IODirection::Input,
            Variant::Int64(3),
            AttributeSnapshot::empty(),
        );
        // (3 + 1) * 2, not 3 * 2 + 1
        assert_eq!(v, Variant::Int64(8));
    }

    #[test]
    fn test_scope_filtering() {
        let chain = vec![
            entry(1, IODirections::OUTPUT, Negate),
            entry(2, IODirections::INPUT, Scale::new(10.0, 0.0)),
        ];
        let (v, attrs) = run_chain(
            &chain,
            IODirection::Input,
            Variant::Int32(2),
            AttributeSnapshot::empty(),
        );
        assert_eq!(v, Variant::Double(20.0));
        assert!(!attrs.contains_key(processors::NEGATE_ACTIVE));

        let (v, _) = run_chain(
            &chain,
            IODirection::Output,
            Variant::Int32(2),
            AttributeSnapshot::empty(),
        );
        assert_eq!(v, Variant::Int32(-2));
    }

    #[test]
    fn test_build_from_config() {
        let chain = build_chain(&[
            ChainEntryConfig::input(ProcessorConfig::Scale {
                factor: 2.0,
                offset: 1.0,
            }),
            ChainEntryConfig::input(ProcessorConfig::SumAlarm),
        ]);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].1.name(), "scale");
        assert_eq!(chain[1].1.name(), "sum-alarm");
    }
}
