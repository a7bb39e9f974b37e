use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for the listener, the relay itself and logging.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub relay: RelaySettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the server.
///
/// Defines the host and port the listener binds to.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration settings for the relay.
///
/// Controls the channel count, the filename field width, the read chunk size
/// and how received files are fanned out.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RelaySettings {
    pub channels: u8,
    pub filename_max_length: usize,
    pub buffer_size: usize,
    pub send_files_concurrently: bool,
    pub unsubscribe_enabled: bool,
    /// Upper bound for one delivery attempt; `0` disables the bound.
    pub delivery_timeout_secs: u64,
}

impl RelaySettings {
    pub fn delivery_timeout(&self) -> Option<Duration> {
        (self.delivery_timeout_secs > 0).then(|| Duration::from_secs(self.delivery_timeout_secs))
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub relay: Option<PartialRelaySettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialRelaySettings {
    pub channels: Option<u8>,
    pub filename_max_length: Option<usize>,
    pub buffer_size: Option<usize>,
    pub send_files_concurrently: Option<bool>,
    pub unsubscribe_enabled: Option<bool>,
    pub delivery_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 7101,
            },
            relay: RelaySettings {
                channels: 8,
                filename_max_length: 40,
                buffer_size: 1024,
                send_files_concurrently: false,
                unsubscribe_enabled: true,
                delivery_timeout_secs: 0,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}
