//! Startup reconciliation: reconnect every stored registration.

use relay_store::RegistrationStore;
use tracing::{info, warn};

use crate::errors::RuntimeError;
use crate::manager::{ConnectOutcome, ConnectionManager};

/// Outcome counts of a reconciliation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Stored registrations seen.
    pub total: usize,
    /// New stream clients started.
    pub started: usize,
    /// Registrations that already had a connection.
    pub already_connected: usize,
    /// Registrations that could not be connected.
    pub failed: usize,
}

/// Ask `manager` to connect every registration in `store`.
///
/// One registration failing never stops the rest; only a failure to list
/// the store is returned as an error.
pub fn reconcile(
    store: &dyn RegistrationStore,
    manager: &ConnectionManager,
) -> Result<ReconcileReport, RuntimeError> {
    let registrations = store.list_all()?;
    let mut report = ReconcileReport {
        total: registrations.len(),
        ..ReconcileReport::default()
    };

    for registration in registrations {
        let key = registration.identity();
        match manager.ensure_connected(registration) {
            Ok(ConnectOutcome::Started) => report.started += 1,
            Ok(ConnectOutcome::AlreadyConnected) => report.already_connected += 1,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to restore connection");
                report.failed += 1;
            }
        }
    }

    info!(
        total = report.total,
        started = report.started,
        failed = report.failed,
        "registrations reconciled"
    );
    Ok(report)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
