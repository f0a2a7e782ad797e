use ng_da_error::{DaError, DaResult};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{subscriber::set_global_default, Level, Metadata};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    filter::{filter_fn, FilterFn},
    fmt::{self},
    layer::SubscriberExt,
    Layer, Registry,
};

/// Console + daily rolling file logger with a runtime-adjustable level.
pub struct Logger {
    level: Arc<Mutex<Level>>,
    _file_guard: Option<WorkerGuard>,
}

impl Logger {
    pub fn new(level: Option<Level>) -> Self {
        Logger {
            level: Arc::new(Mutex::new(level.unwrap_or(Level::INFO))),
            _file_guard: None,
        }
    }

    /// Sets the new logging level. Takes effect for the next event.
    #[inline]
    pub fn set_level(&self, new_level: Level) {
        let mut level = self.level.lock().unwrap_or_else(PoisonError::into_inner);
        *level = new_level;
    }

    #[inline]
    pub fn get_level(&self) -> Level {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn filter(&self) -> FilterFn<impl Fn(&Metadata<'_>) -> bool + Send + Sync + 'static> {
        let level = Arc::clone(&self.level);
        filter_fn(move |metadata| {
            metadata.level() <= &*level.lock().unwrap_or_else(PoisonError::into_inner)
        })
    }

    /// Install the global subscriber.
    ///
    /// Logs go to stdout and to `<log_dir>/<log_file>.<date>`.
    pub fn initialize(&mut self, log_dir: &str, log_file: &str) -> DaResult<()> {
        let file_appender = rolling::daily(log_dir, log_file);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        self._file_guard = Some(guard);

        let console_layer = {
            #[cfg(debug_assertions)]
            let layer = fmt::layer()
                .with_writer(std::io::stdout)
                .with_file(true)
                .with_line_number(true);

            #[cfg(not(debug_assertions))]
            let layer = fmt::layer().with_writer(std::io::stdout);

            layer.with_filter(self.filter())
        };

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_filter(self.filter());

        let subscriber = Registry::default().with(console_layer).with(file_layer);
        set_global_default(subscriber)
            .map_err(|e| DaError::InitializationError(format!("failed to set logger: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_is_adjustable() {
        let logger = Logger::new(None);
        assert_eq!(logger.get_level(), Level::INFO);
        logger.set_level(Level::TRACE);
        assert_eq!(logger.get_level(), Level::TRACE);
    }
}
