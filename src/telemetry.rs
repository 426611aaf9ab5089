use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{BlogError, Result};

/// Install the global tracing subscriber. `RUST_LOG` wins over `level`.
pub fn init(level: &str) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .map_err(|err| BlogError::Config(format!("invalid log level {level:?}: {err}")))?,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().compact().with_target(true))
        .try_init()
        .map_err(|err| BlogError::Config(format!("failed to install tracing subscriber: {err}")))
}
