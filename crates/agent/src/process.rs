//! Registry of OS subprocesses spawned while executing tasks.
//!
//! Spawners call [`ProcessRegistry::track`] right after spawning and hold
//! the returned [`ProcessGuard`] until the child exits. On shutdown the
//! worker loop calls [`ProcessRegistry::terminate_all`] to signal whatever
//! is still running.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared, cheaply cloneable set of live child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<HashMap<u32, String>>>,
}

/// Deregisters its pid when dropped.
#[derive(Debug)]
pub struct ProcessGuard {
    registry: ProcessRegistry,
    pid: u32,
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.pid);
    }
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, pid: u32, label: impl Into<String>) -> ProcessGuard {
        self.lock().insert(pid, label.into());
        ProcessGuard {
            registry: self.clone(),
            pid,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of `(pid, label)` pairs, sorted by pid.
    pub fn tracked(&self) -> Vec<(u32, String)> {
        let mut entries: Vec<_> = self
            .lock()
            .iter()
            .map(|(pid, label)| (*pid, label.clone()))
            .collect();
        entries.sort_by_key(|(pid, _)| *pid);
        entries
    }

    /// Best-effort termination of every tracked process.
    ///
    /// Returns how many processes were successfully signalled.
    pub fn terminate_all(&self) -> usize {
        let mut signalled = 0;
        for (pid, label) in self.tracked() {
            if terminate(pid, &label) {
                signalled += 1;
            }
        }
        signalled
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, String>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(unix)]
fn terminate(pid: u32, label: &str) -> bool {
    let Ok(raw_pid) = libc::pid_t::try_from(pid) else {
        tracing::warn!(pid, label, "Process id out of range, cannot signal");
        return false;
    };

    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(raw_pid, libc::SIGTERM) };
    if rc == 0 {
        tracing::info!(pid, label, "Sent SIGTERM to child process");
        true
    } else {
        let err = std::io::Error::last_os_error();
        tracing::warn!(pid, label, error = %err, "Failed to signal child process");
        false
    }
}

#[cfg(not(unix))]
fn terminate(pid: u32, label: &str) -> bool {
    tracing::warn!(
        pid,
        label,
        "Child process termination is not supported on this platform",
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_drop_deregisters() {
        let registry = ProcessRegistry::new();
        let guard = registry.track(4242, "git clone");
        assert_eq!(registry.tracked(), vec![(4242, "git clone".to_string())]);

        drop(guard);
        assert!(registry.is_empty());
    }

    #[test]
    fn clones_share_state() {
        let registry = ProcessRegistry::new();
        let other = registry.clone();
        let _a = registry.track(1, "a");
        let _b = other.track(2, "b");
        assert_eq!(registry.len(), 2);
        assert_eq!(other.len(), 2);
    }

    #[test]
    fn terminate_all_on_empty_registry_signals_nothing() {
        assert_eq!(ProcessRegistry::new().terminate_all(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_all_signals_live_child() {
        use std::os::unix::process::ExitStatusExt;

        let registry = ProcessRegistry::new();
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .expect("sleep should spawn");
        let pid = child.id().expect("running child has a pid");
        let _guard = registry.track(pid, "sleep");

        assert_eq!(registry.terminate_all(), 1);

        let status = child.wait().await.expect("child should be reaped");
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }
}
