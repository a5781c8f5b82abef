use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

pub trait LoggerType: Send + Sync {
    fn log(&self, level: LogLevel, context: &str, msg: &str);
    fn clone_box(&self) -> Box<dyn LoggerType>;
    fn debug_box(&self) -> String;
}

pub struct Logger(pub Box<dyn LoggerType>);

impl Logger {
    pub fn into_inner(self) -> Box<dyn LoggerType> {
        self.0
    }

    pub fn log(&self, level: LogLevel, context: &str, msg: &str) {
        self.0.log(level, context, msg);
    }
}

impl Clone for Logger {
    fn clone(&self) -> Self {
        Logger(self.0.clone_box())
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.debug_box())
    }
}

impl Default for Logger {
    fn default() -> Self {
        Logger(Box::new(TracingLogger))
    }
}

/// The default logger: forwards everything to the `tracing` macros.
#[derive(Clone, Debug)]
pub struct TracingLogger;

impl LoggerType for TracingLogger {
    fn log(&self, level: LogLevel, context: &str, msg: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(%context, "{msg}"),
            LogLevel::Debug => tracing::debug!(%context, "{msg}"),
            LogLevel::Info => tracing::info!(%context, "{msg}"),
            LogLevel::Warn => tracing::warn!(%context, "{msg}"),
            LogLevel::Error => tracing::error!(%context, "{msg}"),
        }
    }

    fn clone_box(&self) -> Box<dyn LoggerType> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        "TracingLogger".to_string()
    }
}

/// Install a global fmt subscriber. `filter` takes the usual env-filter
/// syntax, e.g. `"rulekit=debug,info"`.
pub fn init_tracing(filter: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(filter)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("could not install tracing subscriber: {e}"))?;
    Ok(())
}
