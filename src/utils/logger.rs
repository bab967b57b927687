use log::{Level, LevelFilter, Metadata, Record};

/// Logger implementation writing to stderr.
struct StderrLogger;

impl log::Log for StderrLogger {
    /// Checks if the given log level is enabled.
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    /// Logs the record by printing it to stderr.
    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    /// Flushes the logger (no-op in this case).
    fn flush(&self) {}
}

/// The logger instance used for logging.
static LOGGER: StderrLogger = StderrLogger;

/// Initializes the logger.
///
/// Installing a logger twice is not an error here: repeated runtime
/// initialization (tests, embedders re-initializing) keeps the first
/// installation.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}
