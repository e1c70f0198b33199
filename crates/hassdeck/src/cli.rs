#![forbid(unsafe_code)]

//! Command line interface.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Protocol {
    Ws,
    Wss,
}

impl Protocol {
    #[must_use]
    pub fn scheme(self) -> &'static str {
        match self {
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }
}

/// Home Assistant bridge for Stream Deck style control surfaces.
#[derive(Debug, Parser)]
#[command(name = "hassdeck", version, about)]
pub struct Cli {
    /// Home Assistant host, e.g. `homeassistant.local:8123`.
    #[arg(long, env = "HASS_HOST")]
    pub host: String,

    /// Long-lived access token.
    #[arg(long, env = "HASS_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Websocket protocol to reach the server with.
    #[arg(long, env = "WEBSOCKET_PROTOCOL", value_enum, default_value = "wss")]
    pub protocol: Protocol,

    /// Path to the YAML configuration document.
    #[arg(long, env = "STREAMDECK_CONFIG", default_value = "configuration.yaml")]
    pub config: PathBuf,

    /// TTF/OTF font used for tile text; text is skipped without one.
    #[arg(long, env = "STREAMDECK_FONT")]
    pub font: Option<PathBuf>,

    /// Directory for downloaded icons. Defaults to a `.hassdeck-icons`
    /// directory next to the configuration file.
    #[arg(long)]
    pub icon_cache: Option<PathBuf>,

    /// Directory the simulated deck writes its tile images into.
    #[arg(long)]
    pub sim_output: Option<PathBuf>,

    /// Key count of the simulated deck.
    #[arg(long, default_value_t = 8)]
    pub sim_keys: u8,

    /// Dial count of the simulated deck.
    #[arg(long, default_value_t = 4)]
    pub sim_dials: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_invocation() {
        let cli = Cli::try_parse_from([
            "hassdeck",
            "--host",
            "ha.local:8123",
            "--token",
            "secret",
        ])
        .unwrap();
        assert_eq!(cli.protocol, Protocol::Wss);
        assert_eq!(cli.config, PathBuf::from("configuration.yaml"));
        assert_eq!(cli.sim_keys, 8);
    }

    #[test]
    fn protocol_flag_overrides_default() {
        let cli = Cli::try_parse_from([
            "hassdeck",
            "--host",
            "h",
            "--token",
            "t",
            "--protocol",
            "ws",
        ])
        .unwrap();
        assert_eq!(cli.protocol.scheme(), "ws");
    }
}
