mod session;
mod simulation;

use clap::Parser;
use ng_da_common::{Logger, Settings};
use ng_da_core::{DataItem, NGItemFactory, NGSubscriptionManager};
use ng_da_error::{DaError, DaResult};
use ng_da_sdk::{AttributeMap, AttributeMode, FnCommandListener, SubscriptionBinding, Variant};
use session::LoggingSubscriber;
use simulation::Simulator;
use std::{env::current_dir, path::PathBuf, sync::Arc, time::Duration};
use tokio::{sync::mpsc, time::interval};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_CONFIG_FILE_NAME: &str = "ng-da.toml";

/// NG DA - data-access value propagation core
///
/// Runs a simulated field source through the item/subscription core and logs
/// every notification a subscriber receives.
#[derive(Parser)]
#[command(name = "ng-da")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "NG DA", long_about = None)]
struct Cli {
    /// Sets a custom config file with full path
    ///
    /// If not specified, 'ng-da.toml' in the current working directory is used.
    #[arg(short, long, env = "NGDA_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> DaResult<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(p) => p,
        None => {
            let dir = current_dir()
                .map_err(|e| DaError::from(format!("Failed to get current directory: {e}")))?;
            dir.join(DEFAULT_CONFIG_FILE_NAME)
        }
    };
    let config_path = config_path.to_string_lossy().to_string();

    let settings = Settings::new(&config_path)?;
    let mut logger = Logger::new(Some(settings.general.level()?));
    logger.initialize(&settings.general.log_dir, &settings.general.log_file)?;
    info!(config = %config_path, "Settings loaded");

    let manager = Arc::new(NGSubscriptionManager::new());
    let factory = NGItemFactory::new(settings.simulation.base_id.clone(), Some(Arc::clone(&manager)));
    let console = LoggingSubscriber::new("console");

    // subscribe before the items exist; the bindings stay pending until then
    subscribe_all(&manager, &factory, &console, &settings);

    let control = factory.sub_factory("control");
    let state = control.create_input("state")?;
    manager.subscribe(SubscriptionBinding::new(state.id(), console.clone()))?;
    let reload = control.create_command("reload")?;
    let (reload_tx, mut reload_rx) = mpsc::channel::<()>(1);
    reload.add_command_listener(Arc::new(FnCommandListener::new(
        "reload-trigger",
        move |_: &Variant| {
            // a reload already queued covers this one
            let _ = reload_tx.try_send(());
            Ok(())
        },
    )))?;

    let mut simulator = Simulator::build(&factory, &settings.simulation.items)?;
    report_state(&state, None);

    let token = CancellationToken::new();
    let signals = tokio::spawn(listen_for_signals(token.clone(), Arc::clone(&reload)));

    let mut ticker = interval(Duration::from_millis(
        settings.simulation.tick_interval_ms.max(1),
    ));
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => simulator.tick(),
            Some(()) = reload_rx.recv() => {
                info!("Reloading configuration");
                match Settings::new(&config_path) {
                    Ok(next) => {
                        match reconfigure(&factory, &simulator, &next) {
                            Ok(rebuilt) => {
                                simulator = rebuilt;
                                if let Ok(level) = next.general.level() {
                                    logger.set_level(level);
                                }
                                subscribe_all(&manager, &factory, &console, &next);
                                ticker = interval(Duration::from_millis(
                                    next.simulation.tick_interval_ms.max(1),
                                ));
                                report_state(&state, None);
                            }
                            Err(e) => report_state(&state, Some(&e)),
                        }
                    }
                    Err(e) => report_state(&state, Some(&e)),
                }
            }
        }
    }

    token.cancel();
    if let Ok(Err(e)) = signals.await {
        warn!(error = %e, "Signal listener failed");
    }

    for id in factory.ids() {
        if let Some(item) = factory.item(&id) {
            let metrics = serde_json::to_string(&item.metrics().snapshot())?;
            info!(item = %id, %metrics, "Item metrics");
        }
    }
    info!(notifications = console.received(), "Console subscriber totals");
    factory.dispose();
    info!("Shutdown completed");
    Ok(())
}

/// Subscribe the console session to every configured simulated item.
fn subscribe_all(
    manager: &NGSubscriptionManager,
    factory: &NGItemFactory,
    console: &Arc<LoggingSubscriber>,
    settings: &Settings,
) {
    for sim in &settings.simulation.items {
        let binding = SubscriptionBinding::new(factory.item_id(&sim.item.name), console.clone());
        if let Err(e) = manager.subscribe(binding) {
            warn!(item = %sim.item.name, error = %e, "Subscription rejected");
        }
    }
}

/// Drop the simulated items and build them again from `settings`.
fn reconfigure(
    factory: &NGItemFactory,
    current: &Simulator,
    settings: &Settings,
) -> DaResult<Simulator> {
    let base = factory.base_id();
    if settings.simulation.base_id != base {
        return Err(DaError::ConfigurationError(format!(
            "base id cannot change at runtime ('{}' -> '{}')",
            base, settings.simulation.base_id
        )));
    }
    for id in current.ids() {
        factory.remove_item(id);
    }
    Simulator::build(factory, &settings.simulation.items)
}

/// Publish the source state with `error` / `error.message` attributes.
fn report_state(state: &DataItem, error: Option<&DaError>) {
    let mut attributes = AttributeMap::new();
    let value = match error {
        Some(e) => {
            warn!(error = %e, "Configuration reload failed");
            attributes.insert("error".into(), Variant::Boolean(true));
            attributes.insert("error.message".into(), Variant::from(e.to_string()));
            Variant::from("error")
        }
        None => {
            attributes.insert("error".into(), Variant::Boolean(false));
            attributes.insert("error.message".into(), Variant::Null);
            Variant::from("running")
        }
    };
    if let Err(e) = state.update_data(Some(value), &attributes, AttributeMode::Update) {
        warn!(error = %e, "Failed to publish source state");
    }
}

#[cfg(unix)]
async fn listen_for_signals(token: CancellationToken, reload: Arc<DataItem>) -> DaResult<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;
    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
                break;
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP signal");
                // goes through the command item like any client write
                if let Err(e) = reload.set_value(Variant::Null) {
                    warn!(error = %e, "Reload request rejected");
                }
            }
            _ = token.cancelled() => return Ok(()),
        }
    }
    token.cancel();
    Ok(())
}

#[cfg(windows)]
async fn listen_for_signals(token: CancellationToken, _reload: Arc<DataItem>) -> DaResult<()> {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received ctrl-c signal");
        }
        _ = token.cancelled() => return Ok(()),
    }
    token.cancel();
    Ok(())
}
