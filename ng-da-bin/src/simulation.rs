use ng_da_common::settings::{SignalConfig, SimulatedItem};
use ng_da_core::{DataItem, NGItemFactory};
use ng_da_error::DaResult;
use ng_da_sdk::{FnCommandListener, Variant};
use std::{f64::consts::TAU, sync::Arc, time::Instant};
use tracing::{info, warn};

struct Channel {
    item: Arc<DataItem>,
    signal: SignalConfig,
}

/// Feeds configured waveforms into the items of a factory.
pub struct Simulator {
    ids: Vec<String>,
    channels: Vec<Channel>,
    tick: u64,
    started: Instant,
}

impl Simulator {
    /// Create one item per configuration entry.
    ///
    /// Readable items are driven by their signal; writable items log the
    /// values written to them.
    pub fn build(factory: &NGItemFactory, items: &[SimulatedItem]) -> DaResult<Self> {
        let mut ids = Vec::with_capacity(items.len());
        let mut channels = Vec::new();
        for sim in items {
            let item = factory.create_from_config(&sim.item)?;
            ids.push(item.id().to_string());
            if item.kind().is_writable() {
                let id = item.id().to_string();
                item.add_command_listener(Arc::new(FnCommandListener::new(
                    "write-log",
                    move |value: &Variant| {
                        info!(item = %id, %value, "Write received");
                        Ok(())
                    },
                )))?;
            }
            if item.kind().is_readable() {
                channels.push(Channel {
                    item,
                    signal: sim.signal.clone(),
                });
            }
        }
        info!(items = items.len(), driven = channels.len(), "Simulation built");
        Ok(Self {
            ids,
            channels,
            tick: 0,
            started: Instant::now(),
        })
    }

    /// Ids of every item this simulator created.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Number of items fed on each tick.
    pub fn driven(&self) -> usize {
        self.channels.len()
    }

    /// Push the next sample of every signal.
    pub fn tick(&mut self) {
        self.tick += 1;
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        for channel in &self.channels {
            let value = sample(&channel.signal, self.tick, elapsed_ms);
            if let Err(e) = channel.item.update_value(value) {
                warn!(item = channel.item.id(), error = %e, "Simulated update rejected");
            }
        }
    }
}

fn sample(signal: &SignalConfig, tick: u64, elapsed_ms: u64) -> Variant {
    match signal {
        SignalConfig::Sine {
            amplitude,
            period_ms,
        } => {
            let period = (*period_ms).max(1) as f64;
            let phase = (elapsed_ms as f64 % period) / period;
            Variant::Double(amplitude * (TAU * phase).sin())
        }
        SignalConfig::Ramp { step, max } => {
            let value = tick as f64 * step;
            if *max > 0.0 {
                Variant::Double(value % max)
            } else {
                Variant::Double(value)
            }
        }
        SignalConfig::Toggle => Variant::Boolean(tick % 2 == 1),
        SignalConfig::Constant { value } => value.clone(),
    }
}
