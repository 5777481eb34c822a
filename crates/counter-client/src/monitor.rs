//! Connectivity monitor.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::info;

/// Whether the server is believed reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

/// Tracks online/offline state from probes and from mutation outcomes.
///
/// State reads are synchronous. Transitions are reported to whoever calls
/// the setter (it returns `true` only on a real change) and to
/// [`subscribe`](Self::subscribe) watchers.
pub struct ConnectivityMonitor {
    state: watch::Sender<Connectivity>,
    replaying: AtomicBool,
}

impl ConnectivityMonitor {
    pub fn new(initial: Connectivity) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state,
            replaying: AtomicBool::new(false),
        }
    }

    pub fn status(&self) -> Connectivity {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.status() == Connectivity::Online
    }

    /// Watch for transitions.
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.state.subscribe()
    }

    /// Mark online. Returns `true` if this was a transition.
    pub fn set_online(&self) -> bool {
        self.set(Connectivity::Online)
    }

    /// Mark offline. Returns `true` if this was a transition.
    pub fn set_offline(&self) -> bool {
        self.set(Connectivity::Offline)
    }

    /// A request reached the server.
    pub fn report_success(&self) -> bool {
        self.set_online()
    }

    /// A request failed in a way that suggests the server is unreachable.
    pub fn report_failure(&self) -> bool {
        self.set_offline()
    }

    fn set(&self, next: Connectivity) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            info!(state = ?next, "Connectivity changed");
        }
        changed
    }

    /// Claim the single replay slot. `None` while another replay holds it.
    pub fn begin_replay(&self) -> Option<ReplayGuard<'_>> {
        self.replaying
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| ReplayGuard { monitor: self })
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying.load(Ordering::SeqCst)
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(Connectivity::Online)
    }
}

/// Releases the replay slot on drop.
pub struct ReplayGuard<'a> {
    monitor: &'a ConnectivityMonitor,
}

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        self.monitor.replaying.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_reported_once() {
        let monitor = ConnectivityMonitor::new(Connectivity::Offline);
        assert!(!monitor.is_online());

        assert!(monitor.set_online());
        assert!(!monitor.set_online());
        assert!(monitor.is_online());

        assert!(monitor.report_failure());
        assert!(!monitor.report_failure());
        assert!(monitor.report_success());
    }

    #[test]
    fn test_replay_slot_is_exclusive() {
        let monitor = ConnectivityMonitor::default();

        let guard = monitor.begin_replay();
        assert!(guard.is_some());
        assert!(monitor.is_replaying());
        assert!(monitor.begin_replay().is_none());

        drop(guard);
        assert!(!monitor.is_replaying());
        assert!(monitor.begin_replay().is_some());
    }

    #[tokio::test]
    async fn test_watchers_see_transitions() {
        let monitor = ConnectivityMonitor::new(Connectivity::Online);
        let mut rx = monitor.subscribe();

        monitor.set_offline();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Connectivity::Offline);

        // No change, no notification
        monitor.set_offline();
        assert!(!rx.has_changed().unwrap());
    }
}
