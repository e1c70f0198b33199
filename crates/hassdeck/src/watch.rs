#![forbid(unsafe_code)]

//! Configuration file watching.

use hassdeck_core::event::RuntimeEvent;
use hassdeck_runtime::{Feed, StopSignal};
use notify::{RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, warn};

/// Emits [`RuntimeEvent::ConfigTouched`] when the configuration document
/// changes on disk. Editors fire bursts of events per save; those collapse
/// into one notification per debounce window.
pub struct ConfigWatchFeed {
    pub path: PathBuf,
}

const DEBOUNCE: Duration = Duration::from_millis(500);

impl Feed for ConfigWatchFeed {
    fn name(&self) -> &'static str {
        "config-watch"
    }

    fn run(self: Box<Self>, sender: mpsc::Sender<RuntimeEvent>, stop: StopSignal) {
        let (fs_tx, fs_rx) = mpsc::channel::<notify::Result<notify::Event>>();
        let mut watcher = match notify::recommended_watcher(fs_tx) {
            Ok(watcher) => watcher,
            Err(err) => {
                warn!(%err, "could not create file watcher, auto reload disabled");
                return;
            }
        };
        // Watch the parent directory: editors replace files on save, which
        // would otherwise drop the watch on the old inode.
        let target = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(std::path::Path::new("."));
        if let Err(err) = watcher.watch(target, RecursiveMode::NonRecursive) {
            warn!(%err, path = %target.display(), "could not watch configuration");
            return;
        }

        let file_name = self.path.file_name().map(std::ffi::OsStr::to_owned);
        let mut touched = false;
        loop {
            match fs_rx.recv_timeout(DEBOUNCE) {
                Ok(Ok(event)) => {
                    let relevant = event.paths.iter().any(|p| p.file_name() == file_name.as_deref());
                    if relevant && (event.kind.is_modify() || event.kind.is_create()) {
                        touched = true;
                    }
                }
                Ok(Err(err)) => warn!(%err, "watch error"),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if touched {
                        touched = false;
                        debug!("configuration changed on disk");
                        if sender.send(RuntimeEvent::ConfigTouched).is_err() {
                            return;
                        }
                    }
                    if stop.is_stopped() {
                        return;
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => return,
            }
        }
    }
}
