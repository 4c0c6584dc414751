use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Watches whether a device is still attached.
///
/// A sync suspends the monitor for its whole duration so the sync's own I/O
/// does not trigger disconnect warnings.
pub trait ConnectionMonitor: Send + Sync {
    fn suspend(&self);
    fn resume(&self);
    fn is_suspended(&self) -> bool;
    fn is_connected(&self) -> bool;

    /// A disconnect worth telling the user about
    fn disconnected(&self) -> bool {
        !self.is_suspended() && !self.is_connected()
    }
}

/// Suspends a monitor until dropped
pub struct MonitorPause {
    monitor: Arc<dyn ConnectionMonitor>,
}

impl MonitorPause {
    pub fn new(monitor: Arc<dyn ConnectionMonitor>) -> Self {
        monitor.suspend();
        Self { monitor }
    }
}

impl Drop for MonitorPause {
    fn drop(&mut self) {
        self.monitor.resume();
    }
}

/// For targets that cannot be unplugged, like export folders
#[derive(Debug, Default)]
pub struct NoopMonitor;

impl ConnectionMonitor for NoopMonitor {
    fn suspend(&self) {}

    fn resume(&self) {}

    fn is_suspended(&self) -> bool {
        false
    }

    fn is_connected(&self) -> bool {
        true
    }
}

/// Treats a device as connected while its mount folder exists
pub struct MountMonitor {
    mount: PathBuf,
    suspended: AtomicUsize,
}

impl MountMonitor {
    pub fn new(mount: impl Into<PathBuf>) -> Self {
        Self {
            mount: mount.into(),
            suspended: AtomicUsize::new(0),
        }
    }
}

impl ConnectionMonitor for MountMonitor {
    fn suspend(&self) {
        self.suspended.fetch_add(1, Ordering::SeqCst);
    }

    fn resume(&self) {
        // saturating: a stray resume must not wrap around
        let _ = self
            .suspended
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst) > 0
    }

    fn is_connected(&self) -> bool {
        self.mount.is_dir()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn pause_suspends_until_dropped() {
        let dir = tempdir().unwrap();
        let monitor = Arc::new(MountMonitor::new(dir.path()));

        {
            let _outer = MonitorPause::new(monitor.clone());
            let inner = MonitorPause::new(monitor.clone());
            drop(inner);
            // still held by the outer pause
            assert!(monitor.is_suspended());
        }
        assert!(!monitor.is_suspended());
        monitor.resume();
        assert!(!monitor.is_suspended());
    }

    #[test]
    fn disconnect_is_hidden_while_suspended() {
        let dir = tempdir().unwrap();
        let mount = dir.path().join("WALKMAN");
        std::fs::create_dir(&mount).unwrap();
        let monitor = Arc::new(MountMonitor::new(&mount));
        assert!(!monitor.disconnected());

        std::fs::remove_dir(&mount).unwrap();
        let pause = MonitorPause::new(monitor.clone());
        assert!(!monitor.disconnected());
        drop(pause);
        assert!(monitor.disconnected());
    }
}
