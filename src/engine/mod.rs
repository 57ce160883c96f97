pub mod availability;
pub mod conflict;
mod error;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;
pub(crate) mod validation;

pub use availability::{free_tables, total_price};
pub use conflict::overlaps;
pub use error::{BusinessRule, EngineError, Entity, ErrorKind, ValidationError};

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::registry::{CustomerDirectory, TableRegistry};
use crate::store::ReservationStore;

/// Reservation lifecycle and availability over pluggable collaborators.
///
/// The engine holds no booking state of its own. Every read goes to the
/// store, and the store re-checks conflicts on write, so any number of
/// callers may share one `Engine` behind an `Arc`.
pub struct Engine {
    pub(super) tables: Arc<dyn TableRegistry>,
    pub(super) customers: Arc<dyn CustomerDirectory>,
    pub(super) store: Arc<dyn ReservationStore>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) config: EngineConfig,
}

impl Engine {
    pub fn new(
        tables: Arc<dyn TableRegistry>,
        customers: Arc<dyn CustomerDirectory>,
        store: Arc<dyn ReservationStore>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            tables,
            customers,
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
