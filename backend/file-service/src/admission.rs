//! Per-operation admission control
//!
//! Each operation class has its own counting semaphore. A call waits (without
//! spinning) for a ticket and holds it until the work is done; dropping the
//! ticket releases the slot on every path, including errors and cancellation.

use crate::config::TransferSettings;
use crate::error::{FileServiceError, Result};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    Upload,
    Download,
    List,
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationClass::Upload => write!(f, "upload"),
            OperationClass::Download => write!(f, "download"),
            OperationClass::List => write!(f, "list"),
        }
    }
}

#[derive(Debug)]
struct Gate {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl Gate {
    fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }
}

/// Shared admission gates; clones share the same semaphores
#[derive(Debug, Clone)]
pub struct AdmissionControl {
    gates: Arc<[Gate; 3]>,
}

impl AdmissionControl {
    pub fn new(upload_limit: usize, download_limit: usize, list_limit: usize) -> Self {
        Self {
            gates: Arc::new([
                Gate::new(upload_limit),
                Gate::new(download_limit),
                Gate::new(list_limit),
            ]),
        }
    }

    pub fn from_settings(settings: &TransferSettings) -> Self {
        Self::new(
            settings.upload_concurrency,
            settings.download_concurrency,
            settings.list_concurrency,
        )
    }

    fn gate(&self, class: OperationClass) -> &Gate {
        match class {
            OperationClass::Upload => &self.gates[0],
            OperationClass::Download => &self.gates[1],
            OperationClass::List => &self.gates[2],
        }
    }

    /// Wait for a free slot in `class`
    pub async fn admit(&self, class: OperationClass) -> Result<AdmissionTicket> {
        let gate = self.gate(class);

        if gate.semaphore.available_permits() == 0 {
            info!(
                operation = %class,
                limit = gate.limit,
                "Concurrency limit reached, waiting for a slot"
            );
        }

        let permit = Arc::clone(&gate.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| FileServiceError::Internal("admission gate closed".to_string()))?;

        Ok(AdmissionTicket {
            class,
            _permit: permit,
        })
    }

    pub fn limit(&self, class: OperationClass) -> usize {
        self.gate(class).limit
    }

    /// Number of tickets currently held for `class`
    pub fn in_flight(&self, class: OperationClass) -> usize {
        let gate = self.gate(class);
        gate.limit - gate.semaphore.available_permits()
    }
}

impl Default for AdmissionControl {
    fn default() -> Self {
        Self::from_settings(&TransferSettings::default())
    }
}

/// Held for the lifetime of one admitted operation
#[derive(Debug)]
pub struct AdmissionTicket {
    class: OperationClass,
    _permit: OwnedSemaphorePermit,
}

impl AdmissionTicket {
    pub fn class(&self) -> OperationClass {
        self.class
    }
}
