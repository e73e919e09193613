//! Process restart for hosted devices.
//!
//! A host process cannot reboot the machine. Restarting means leaving the
//! tick loop and exiting with [`RESTART_EXIT_CODE`] so a supervisor (systemd,
//! a container runtime) starts a fresh process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use iotkit_core::Restarter;

/// Exit code asking the supervisor to start the process again (EX_TEMPFAIL).
pub const RESTART_EXIT_CODE: i32 = 75;

/// [`Restarter`] that raises a shared flag read by the tick driver.
#[derive(Debug, Clone, Default)]
pub struct ProcessRestarter {
    requested: Arc<AtomicBool>,
}

impl ProcessRestarter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle observing the same flag.
    pub fn flag(&self) -> Arc<AtomicBool> {
        self.requested.clone()
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

impl Restarter for ProcessRestarter {
    fn restart(&mut self) {
        warn!(exit_code = RESTART_EXIT_CODE, "restart requested");
        self.requested.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_sets_shared_flag() {
        let mut restarter = ProcessRestarter::new();
        let flag = restarter.flag();
        assert!(!restarter.is_requested());

        restarter.restart();

        assert!(restarter.is_requested());
        assert!(flag.load(Ordering::SeqCst));
    }
}
