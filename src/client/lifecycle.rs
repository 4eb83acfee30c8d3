//! Run-once transport setup and teardown.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{info, warn};

use crate::errors::ObsError;
use crate::protocol::ObsStatus;
use crate::transport::Transport;

/// Guards process-wide transport initialization.
///
/// The first [`InitGate::initialize`] runs the transport setup, caches its
/// status and keeps the transport that ran it; every later call returns the
/// cached outcome. Teardown runs at most once, only after a successful
/// setup, and always against that first transport. Once torn down the gate
/// refuses further clients.
pub struct InitGate {
    owner: OnceLock<(ObsStatus, Arc<dyn Transport>)>,
    torn_down: AtomicBool,
}

impl fmt::Debug for InitGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitGate")
            .field("status", &self.owner.get().map(|(status, _)| *status))
            .field("torn_down", &self.torn_down.load(Ordering::SeqCst))
            .finish()
    }
}

impl Default for InitGate {
    fn default() -> Self {
        Self::new()
    }
}

impl InitGate {
    pub const fn new() -> Self {
        Self {
            owner: OnceLock::new(),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Run setup on first use; report the cached status afterwards.
    pub fn initialize(&self, transport: &Arc<dyn Transport>) -> Result<(), ObsError> {
        if self.is_torn_down() {
            return Err(ObsError::ShutDown);
        }
        let (status, _) = self.owner.get_or_init(|| {
            let status = transport.initialize();
            if status.is_ok() {
                info!("transport initialized");
            } else {
                warn!(%status, "transport initialization failed");
            }
            (status, Arc::clone(transport))
        });
        if status.is_ok() {
            Ok(())
        } else {
            Err(ObsError::Init(*status))
        }
    }

    /// Whether setup ran and succeeded.
    pub fn is_initialized(&self) -> bool {
        matches!(self.owner.get(), Some((status, _)) if status.is_ok())
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Tear down the transport that ran setup. Returns whether this call
    /// performed it.
    pub fn teardown(&self) -> bool {
        let Some((status, transport)) = self.owner.get() else {
            return false;
        };
        if !status.is_ok() || self.torn_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        transport.deinitialize();
        info!("transport deinitialized");
        true
    }
}

/// Gate shared by every client in the process.
pub(crate) static GLOBAL_GATE: InitGate = InitGate::new();
