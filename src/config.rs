//! CLI + config file (§6 of the configuration options table), following
//! the same `Cli`/`Config::load` split as a `clap` + `serde` binary.

use std::fs::read_to_string;

use clap::Parser;
use serde::Deserialize;

/// Core-context sizing and identity.
#[derive(Deserialize, Debug)]
pub struct Core {
    /// Locid assigned to the core context (`CORE_LOCID`).
    #[serde(default = "Core::locid")]
    pub locid: u8,
}

impl Core {
    fn locid() -> u8 {
        0
    }
}

impl Default for Core {
    fn default() -> Self {
        Self { locid: Self::locid() }
    }
}

/// Com-context sizing: how many local objects, remote peers, and wire
/// buffers a routing context is built with.
#[derive(Deserialize, Debug)]
pub struct Com {
    /// address the demo TCP port binds to.
    #[serde(default = "Com::listen")]
    pub listen: std::net::SocketAddr,
    /// `LOCAL_COUNT`: objects this node hosts directly.
    #[serde(default = "Com::local_count")]
    pub local_count: usize,
    /// `REMOTE_COUNT`: distinct remote peers tracked per com context.
    #[serde(default = "Com::remote_count")]
    pub remote_count: usize,
    /// `REMOTE_OBJECT_COUNT`: proxy slots reserved per remote peer. Accepted
    /// for forward compatibility with a remote-object arena this engine
    /// does not yet implement (see DESIGN.md).
    #[serde(default = "Com::remote_object_count")]
    pub remote_object_count: usize,
    /// `PORT_COUNT`, capped at 5 the way a com context's port table is.
    #[serde(default = "Com::port_count")]
    pub port_count: usize,
    /// `BUF_COUNT`.
    #[serde(default = "Com::buf_count")]
    pub buf_count: usize,
    /// `BUF_DATA_SIZE`.
    #[serde(default = "Com::buf_data_size")]
    pub buf_data_size: usize,
}

impl Com {
    fn listen() -> std::net::SocketAddr {
        "127.0.0.1:9001".parse().expect("valid default listen address")
    }

    fn local_count() -> usize {
        64
    }

    fn remote_count() -> usize {
        8
    }

    fn remote_object_count() -> usize {
        16
    }

    fn port_count() -> usize {
        2
    }

    fn buf_count() -> usize {
        8
    }

    fn buf_data_size() -> usize {
        512
    }
}

impl Default for Com {
    fn default() -> Self {
        Self {
            listen: Self::listen(),
            local_count: Self::local_count(),
            remote_count: Self::remote_count(),
            remote_object_count: Self::remote_object_count(),
            port_count: Self::port_count(),
            buf_count: Self::buf_count(),
            buf_data_size: Self::buf_data_size(),
        }
    }
}

/// Optional-type toggles (`DECFRAC_TYPE_SUPPORT`, `64BIT_TYPES_SUPPORT`,
/// `BYTE_STRING_TYPE_SUPPORT`) plus `VERBOSE_STATUS_MESSAGES`.
#[derive(Deserialize, Debug)]
pub struct Features {
    #[serde(default = "Features::verbose_status_messages")]
    pub verbose_status_messages: bool,
    #[serde(default = "Features::decfrac_type_support")]
    pub decfrac_type_support: bool,
    #[serde(default = "Features::types_64bit_support")]
    pub types_64bit_support: bool,
    #[serde(default = "Features::byte_string_type_support")]
    pub byte_string_type_support: bool,
}

impl Features {
    fn verbose_status_messages() -> bool {
        true
    }

    fn decfrac_type_support() -> bool {
        true
    }

    fn types_64bit_support() -> bool {
        true
    }

    fn byte_string_type_support() -> bool {
        true
    }
}

impl Default for Features {
    fn default() -> Self {
        Self {
            verbose_status_messages: Self::verbose_status_messages(),
            decfrac_type_support: Self::decfrac_type_support(),
            types_64bit_support: Self::types_64bit_support(),
            byte_string_type_support: Self::byte_string_type_support(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default)]
    pub core: Core,
    #[serde(default)]
    pub com: Com,
    #[serde(default)]
    pub features: Features,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: Core::default(),
            com: Com::default(),
            features: Features::default(),
            log: Log::default(),
        }
    }
}

#[derive(Parser)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS")
)]
struct Cli {
    /// path to a JSON5 config file; omit to run with defaults.
    #[arg(long)]
    config: Option<String>,
}

impl Config {
    /// Parse the command line and, if `--config` names a readable file,
    /// deserialize it as JSON5; otherwise fall back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let text = Cli::parse().config.and_then(|path| read_to_string(path).ok());
        Ok(match text {
            Some(text) => serde_json5::from_str(&text)?,
            None => Self::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_json5() {
        let cfg: Config = serde_json5::from_str("{}").unwrap();
        assert_eq!(cfg.core.locid, 0);
        assert_eq!(cfg.com.port_count, 2);
        assert!(cfg.features.verbose_status_messages);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let cfg: Config = serde_json5::from_str(r#"{ com: { port_count: 4 } }"#).unwrap();
        assert_eq!(cfg.com.port_count, 4);
        assert_eq!(cfg.com.buf_count, 8);
    }
}
