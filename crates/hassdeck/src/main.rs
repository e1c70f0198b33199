#![forbid(unsafe_code)]

//! Binary entry point: wire the websocket client, icon pipeline, simulated
//! deck, and feeds into the dispatcher and run until shutdown.

mod cli;
mod config_io;
mod hass;
mod icons;
mod jinja;
mod simdeck;
mod watch;

use anyhow::Context;
use clap::Parser;
use hassdeck_render::{CachedIconProvider, RenderEngine};
use hassdeck_runtime::{Dispatcher, DispatcherOptions, FeedSet};
use std::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = cli::Cli::parse();
    let config = config_io::load(&cli.config)?;
    info!(path = %cli.config.display(), pages = config.pages.len(), "configuration loaded");

    let render = match load_font(cli.font.as_deref()) {
        Some(font) => RenderEngine::with_font(font),
        None => RenderEngine::new(),
    };

    let icon_cache = cli.icon_cache.clone().unwrap_or_else(|| {
        cli.config
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."))
            .join(".hassdeck-icons")
    });
    let icons = CachedIconProvider::new(icons::HttpIconProvider::new(icon_cache));

    let scheme = cli.protocol.scheme();
    let mut remote = hass::HassClient::connect(scheme, &cli.host, &cli.token)
        .with_context(|| format!("connecting to {}", cli.host))?;
    let states = remote.get_states().context("fetching initial states")?;
    info!(entities = states.len(), "initial state snapshot");

    let (tx, rx) = mpsc::channel();
    let mut feeds = FeedSet::new(tx);
    feeds.spawn(Box::new(hass::HassEventFeed {
        scheme: scheme.to_owned(),
        host: cli.host.clone(),
        token: cli.token.clone(),
    }));
    if config.auto_reload {
        feeds.spawn(Box::new(watch::ConfigWatchFeed {
            path: cli.config.clone(),
        }));
    }
    feeds.spawn(Box::new(simdeck::StdinFeed));

    let auto_reload = config.auto_reload;
    let config_path = cli.config.clone();
    let mut dispatcher = Dispatcher::new(DispatcherOptions {
        config,
        template: Box::new(jinja::JinjaEngine),
        render,
        icons: Box::new(icons),
        deck: Box::new(simdeck::SimDeck::new(
            cli.sim_keys,
            cli.sim_dials,
            cli.sim_output.clone(),
        )),
        remote: Box::new(remote),
        loader: Some(Box::new(move || {
            config_io::load(&config_path).map_err(Into::into)
        })),
    });
    dispatcher.seed_states(states);

    info!(auto_reload, "running");
    dispatcher.run(&rx);

    feeds.stop_all();
    info!("bye");
    Ok(())
}

/// Missing or unreadable fonts degrade to text-free tiles.
fn load_font(path: Option<&std::path::Path>) -> Option<ab_glyph::FontArc> {
    let path = path?;
    match std::fs::read(path) {
        Ok(bytes) => match ab_glyph::FontArc::try_from_vec(bytes) {
            Ok(font) => Some(font),
            Err(err) => {
                warn!(%err, path = %path.display(), "font failed to parse, text disabled");
                None
            }
        },
        Err(err) => {
            warn!(%err, path = %path.display(), "font not readable, text disabled");
            None
        }
    }
}
