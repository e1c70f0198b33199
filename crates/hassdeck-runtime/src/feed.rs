#![forbid(unsafe_code)]

//! Event feeds: background threads that push runtime events.
//!
//! A feed loops on its source (device reports, websocket frames, file
//! notifications) and sends normalized events until the channel closes or
//! its stop signal fires. [`FeedSet`] owns the threads and stops them all
//! on drop.

use hassdeck_core::event::RuntimeEvent;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// A continuous event source.
pub trait Feed: Send + 'static {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Run until the channel disconnects or `stop` fires.
    fn run(self: Box<Self>, sender: mpsc::Sender<RuntimeEvent>, stop: StopSignal);
}

/// Signal for stopping a feed.
///
/// Feeds check it between blocking reads, or block on [`wait_timeout`]
/// where the source is polled.
///
/// [`wait_timeout`]: StopSignal::wait_timeout
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    fn new() -> (Self, StopTrigger) {
        let inner = Arc::new((Mutex::new(false), Condvar::new()));
        let signal = Self {
            inner: inner.clone(),
        };
        (signal, StopTrigger { inner })
    }

    /// Whether the stop has been triggered.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        let (lock, _) = &*self.inner;
        lock.lock().map(|s| *s).unwrap_or(true)
    }

    /// Wait for the stop signal or a timeout.
    ///
    /// Returns true if stopped, false on timeout. Loops on the condvar to
    /// absorb spurious wakeups.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let Ok(mut stopped) = lock.lock() else {
            return true;
        };
        if *stopped {
            return true;
        }

        let start = std::time::Instant::now();
        let mut remaining = duration;
        loop {
            let Ok((guard, result)) = cvar.wait_timeout(stopped, remaining) else {
                return true;
            };
            stopped = guard;
            if *stopped {
                return true;
            }
            let elapsed = start.elapsed();
            if result.timed_out() || elapsed >= duration {
                return false;
            }
            remaining = duration - elapsed;
        }
    }
}

struct StopTrigger {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopTrigger {
    fn stop(&self) {
        let (lock, cvar) = &*self.inner;
        if let Ok(mut stopped) = lock.lock() {
            *stopped = true;
        }
        cvar.notify_all();
    }
}

struct RunningFeed {
    name: &'static str,
    trigger: StopTrigger,
    thread: Option<thread::JoinHandle<()>>,
}

/// Owns all running feed threads.
pub struct FeedSet {
    sender: mpsc::Sender<RuntimeEvent>,
    running: Vec<RunningFeed>,
}

impl FeedSet {
    #[must_use]
    pub fn new(sender: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            sender,
            running: Vec::new(),
        }
    }

    /// Spawn a feed on its own thread.
    pub fn spawn(&mut self, feed: Box<dyn Feed>) {
        let name = feed.name();
        let (signal, trigger) = StopSignal::new();
        let sender = self.sender.clone();
        let thread = thread::Builder::new()
            .name(format!("feed-{name}"))
            .spawn(move || feed.run(sender, signal))
            .ok();
        self.running.push(RunningFeed {
            name,
            trigger,
            thread,
        });
    }

    /// Stop every feed and join its thread.
    pub fn stop_all(&mut self) {
        for feed in &self.running {
            feed.trigger.stop();
        }
        for feed in &mut self.running {
            if let Some(handle) = feed.thread.take() {
                debug!(feed = feed.name, "joining feed thread");
                let _ = handle.join();
            }
        }
        self.running.clear();
    }
}

impl Drop for FeedSet {
    fn drop(&mut self) {
        for feed in &self.running {
            feed.trigger.stop();
        }
        // Threads are not joined in drop; the channel disconnecting
        // unblocks senders.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_timeout_times_out_without_stop() {
        let (signal, _trigger) = StopSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
        assert!(!signal.is_stopped());
    }

    #[test]
    fn stop_unblocks_waiters() {
        let (signal, trigger) = StopSignal::new();
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || signal.wait_timeout(Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(20));
        trigger.stop();
        assert!(waiter.join().unwrap());
        assert!(signal.is_stopped());
    }

    struct Ticker;
    impl Feed for Ticker {
        fn name(&self) -> &'static str {
            "ticker"
        }
        fn run(self: Box<Self>, sender: mpsc::Sender<RuntimeEvent>, stop: StopSignal) {
            while !stop.wait_timeout(Duration::from_millis(5)) {
                if sender.send(RuntimeEvent::ConfigTouched).is_err() {
                    return;
                }
            }
        }
    }

    #[test]
    fn feed_set_stops_and_joins() {
        let (tx, rx) = mpsc::channel();
        let mut feeds = FeedSet::new(tx);
        feeds.spawn(Box::new(Ticker));
        assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
        feeds.stop_all();
        // After joining, no further events ever arrive.
        while rx.try_recv().is_ok() {}
        thread::sleep(Duration::from_millis(20));
        assert!(rx.try_recv().is_err());
    }
}
