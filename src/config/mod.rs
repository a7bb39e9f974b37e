mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{LoggingSettings, RelaySettings, ServerSettings, Settings};

/// Prefix of environment overrides, e.g. `FILECAST_RELAY__CHANNELS=4`.
pub const ENV_PREFIX: &str = "FILECAST";

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values and validates the result
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    let settings = merge(partial, Settings::default());
    validate(&settings)?;
    Ok(settings)
}

fn merge(partial: PartialSettings, default: Settings) -> Settings {
    let server = partial.server;
    let relay = partial.relay;
    let logging = partial.logging;

    Settings {
        server: ServerSettings {
            host: server
                .as_ref()
                .and_then(|s| s.host.clone())
                .unwrap_or(default.server.host),
            port: server
                .as_ref()
                .and_then(|s| s.port)
                .unwrap_or(default.server.port),
        },
        relay: RelaySettings {
            channels: relay
                .as_ref()
                .and_then(|r| r.channels)
                .unwrap_or(default.relay.channels),
            filename_max_length: relay
                .as_ref()
                .and_then(|r| r.filename_max_length)
                .unwrap_or(default.relay.filename_max_length),
            buffer_size: relay
                .as_ref()
                .and_then(|r| r.buffer_size)
                .unwrap_or(default.relay.buffer_size),
            send_files_concurrently: relay
                .as_ref()
                .and_then(|r| r.send_files_concurrently)
                .unwrap_or(default.relay.send_files_concurrently),
            unsubscribe_enabled: relay
                .as_ref()
                .and_then(|r| r.unsubscribe_enabled)
                .unwrap_or(default.relay.unsubscribe_enabled),
            delivery_timeout_secs: relay
                .as_ref()
                .and_then(|r| r.delivery_timeout_secs)
                .unwrap_or(default.relay.delivery_timeout_secs),
        },
        logging: LoggingSettings {
            level: logging
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.logging.level),
        },
    }
}

/// Reject settings the relay cannot run with.
pub fn validate(settings: &Settings) -> Result<(), ConfigError> {
    if settings.relay.channels == 0 {
        return Err(ConfigError::Message(
            "relay.channels must be at least 1".into(),
        ));
    }
    if settings.relay.filename_max_length == 0 {
        return Err(ConfigError::Message(
            "relay.filename_max_length must be at least 1".into(),
        ));
    }
    if settings.relay.buffer_size == 0 {
        return Err(ConfigError::Message(
            "relay.buffer_size must be at least 1".into(),
        ));
    }
    Ok(())
}
