//! Built-in chain processors.
//!
//! Processors that expose writable attributes keep their parameters in an
//! `ArcSwap`, so a subscriber write never blocks a running pass and a pass
//! always sees one consistent parameter set.

use arc_swap::{ArcSwap, ArcSwapOption};
use ng_da_error::{DaError, DaResult};
use ng_da_sdk::{AttributeSnapshot, ChainProcessor, Variant};
use std::sync::Arc;

pub const SCALE_FACTOR: &str = "scale.factor";
pub const SCALE_OFFSET: &str = "scale.offset";
pub const SCALE_ORIGINAL: &str = "scale.value.original";
pub const SCALE_ERROR: &str = "scale.error";

pub const NEGATE_ACTIVE: &str = "negate.active";

pub const LEVEL_HIGH_PRESET: &str = "level.high.preset";
pub const LEVEL_LOW_PRESET: &str = "level.low.preset";
pub const LEVEL_HIGH_ALARM: &str = "level.high.alarm";
pub const LEVEL_LOW_ALARM: &str = "level.low.alarm";

pub const MANUAL_VALUE: &str = "manual.value";
pub const MANUAL_ACTIVE: &str = "manual.active";
pub const MANUAL_ORIGINAL: &str = "manual.value.original";

pub const SUM_ALARM: &str = "alarm";
pub const SUM_ERROR: &str = "error";

#[derive(Debug, Clone, Copy, PartialEq)]
struct ScaleParams {
    factor: f64,
    offset: f64,
}

/// Linear scaling: `value * factor + offset`, published as a double.
pub struct Scale {
    params: ArcSwap<ScaleParams>,
}

impl Scale {
    pub fn new(factor: f64, offset: f64) -> Self {
        Self {
            params: ArcSwap::from_pointee(ScaleParams { factor, offset }),
        }
    }
}

impl ChainProcessor for Scale {
    fn name(&self) -> &str {
        "scale"
    }

    fn process(&self, value: Variant, attributes: AttributeSnapshot) -> (Variant, AttributeSnapshot) {
        let params = **self.params.load();
        let attributes = attributes
            .with(SCALE_FACTOR, params.factor)
            .with(SCALE_OFFSET, params.offset);
        if value.is_null() {
            return (value, attributes.without(SCALE_ERROR));
        }
        match value.as_f64() {
            Ok(n) => {
                let scaled = Variant::Double(n * params.factor + params.offset);
                let attributes = attributes.with(SCALE_ORIGINAL, value).without(SCALE_ERROR);
                (scaled, attributes)
            }
            Err(e) => (value, attributes.with(SCALE_ERROR, e.to_string())),
        }
    }

    fn handles_attribute(&self, key: &str) -> bool {
        key == SCALE_FACTOR || key == SCALE_OFFSET
    }

    fn write_attribute(&self, key: &str, value: &Variant) -> DaResult<()> {
        let n = value.as_f64()?;
        match key {
            SCALE_FACTOR => self.params.rcu(|p| ScaleParams { factor: n, ..**p }),
            SCALE_OFFSET => self.params.rcu(|p| ScaleParams { offset: n, ..**p }),
            _ => {
                return Err(DaError::invalid_operation(format!(
                    "attribute '{key}' is not handled by scale"
                )))
            }
        };
        Ok(())
    }
}

/// Inverts booleans and negates numbers.
pub struct Negate;

impl ChainProcessor for Negate {
    fn name(&self) -> &str {
        "negate"
    }

    fn process(&self, value: Variant, attributes: AttributeSnapshot) -> (Variant, AttributeSnapshot) {
        let negated = match value {
            Variant::Boolean(b) => Variant::Boolean(!b),
            Variant::Int32(n) => n.checked_neg().map_or(Variant::Int32(n), Variant::Int32),
            Variant::Int64(n) => n.checked_neg().map_or(Variant::Int64(n), Variant::Int64),
            Variant::Double(n) => Variant::Double(-n),
            other => other,
        };
        (negated, attributes.with(NEGATE_ACTIVE, true))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct LevelPresets {
    high: Option<f64>,
    low: Option<f64>,
}

/// Raises `level.high.alarm` / `level.low.alarm` against configurable presets.
pub struct LevelAlarm {
    presets: ArcSwap<LevelPresets>,
}

impl LevelAlarm {
    pub fn new(high: Option<f64>, low: Option<f64>) -> Self {
        Self {
            presets: ArcSwap::from_pointee(LevelPresets { high, low }),
        }
    }
}

impl ChainProcessor for LevelAlarm {
    fn name(&self) -> &str {
        "level-alarm"
    }

    fn process(&self, value: Variant, attributes: AttributeSnapshot) -> (Variant, AttributeSnapshot) {
        let presets = **self.presets.load();
        let level = value.as_f64().ok();
        let attributes = level_attributes(
            attributes,
            presets.high,
            (LEVEL_HIGH_PRESET, LEVEL_HIGH_ALARM),
            |p| level.is_some_and(|v| v >= p),
        );
        let attributes = level_attributes(
            attributes,
            presets.low,
            (LEVEL_LOW_PRESET, LEVEL_LOW_ALARM),
            |p| level.is_some_and(|v| v <= p),
        );
        (value, attributes)
    }

    fn handles_attribute(&self, key: &str) -> bool {
        key == LEVEL_HIGH_PRESET || key == LEVEL_LOW_PRESET
    }

    fn write_attribute(&self, key: &str, value: &Variant) -> DaResult<()> {
        // null clears the preset
        let preset = if value.is_null() {
            None
        } else {
            Some(value.as_f64()?)
        };
        match key {
            LEVEL_HIGH_PRESET => self.presets.rcu(|p| LevelPresets { high: preset, ..**p }),
            LEVEL_LOW_PRESET => self.presets.rcu(|p| LevelPresets { low: preset, ..**p }),
            _ => {
                return Err(DaError::invalid_operation(format!(
                    "attribute '{key}' is not handled by level-alarm"
                )))
            }
        };
        Ok(())
    }
}

fn level_attributes(
    attributes: AttributeSnapshot,
    preset: Option<f64>,
    (preset_key, alarm_key): (&str, &str),
    breached: impl Fn(f64) -> bool,
) -> AttributeSnapshot {
    match preset {
        Some(p) => attributes.with(preset_key, p).with(alarm_key, breached(p)),
        None => attributes.without(preset_key).without(alarm_key),
    }
}

/// Replaces the field value with an operator-supplied one while active.
pub struct ManualOverride {
    manual: ArcSwapOption<Variant>,
}

impl ManualOverride {
    pub fn new(value: Option<Variant>) -> Self {
        Self {
            manual: ArcSwapOption::new(value.filter(|v| !v.is_null()).map(Arc::new)),
        }
    }
}

impl ChainProcessor for ManualOverride {
    fn name(&self) -> &str {
        "manual-override"
    }

    fn process(&self, value: Variant, attributes: AttributeSnapshot) -> (Variant, AttributeSnapshot) {
        match self.manual.load_full() {
            Some(manual) => {
                let attributes = attributes
                    .with(MANUAL_ACTIVE, true)
                    .with(MANUAL_VALUE, manual.as_ref().clone())
                    .with(MANUAL_ORIGINAL, value);
                (manual.as_ref().clone(), attributes)
            }
            None => (
                value,
                attributes
                    .with(MANUAL_ACTIVE, false)
                    .without(MANUAL_VALUE)
                    .without(MANUAL_ORIGINAL),
            ),
        }
    }

    fn handles_attribute(&self, key: &str) -> bool {
        key == MANUAL_VALUE
    }

    fn write_attribute(&self, key: &str, value: &Variant) -> DaResult<()> {
        if key != MANUAL_VALUE {
            return Err(DaError::invalid_operation(format!(
                "attribute '{key}' is not handled by manual-override"
            )));
        }
        if value.is_null() {
            self.manual.store(None);
        } else {
            self.manual.store(Some(Arc::new(value.clone())));
        }
        Ok(())
    }
}

/// Aggregates every `*.alarm` / `*.error` attribute into `alarm` / `error`.
pub struct SumAlarm;

impl SumAlarm {
    fn any_true(attributes: &AttributeSnapshot, suffix: &str) -> bool {
        attributes
            .iter()
            .any(|(k, v)| k.ends_with(suffix) && v.as_bool().unwrap_or(false))
    }
}

impl ChainProcessor for SumAlarm {
    fn name(&self) -> &str {
        "sum-alarm"
    }

    fn process(&self, value: Variant, attributes: AttributeSnapshot) -> (Variant, AttributeSnapshot) {
        let alarm = Self::any_true(&attributes, ".alarm");
        let error = Self::any_true(&attributes, ".error");
        (
            value,
            attributes.with(SUM_ALARM, alarm).with(SUM_ERROR, error),
        )
    }
}

/// Closure-backed processor.
pub struct FnProcessor<F> {
    name: String,
    f: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(Variant, AttributeSnapshot) -> (Variant, AttributeSnapshot) + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> ChainProcessor for FnProcessor<F>
where
    F: Fn(Variant, AttributeSnapshot) -> (Variant, AttributeSnapshot) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn process(&self, value: Variant, attributes: AttributeSnapshot) -> (Variant, AttributeSnapshot) {
        (self.f)(value, attributes)
    }
}
