//! Completion of grid transactions driven by a coordinator transaction

use crate::transaction::{GridTxId, GridTxManager};
use lrco_common::{ContextId, Status, Synchronization};
use std::sync::Arc;

/// Registered on a coordinator transaction when the grid joins it on its
/// own. Validates in `before_completion` and applies the outcome in
/// `after_completion`.
pub(crate) struct GridSynchronization {
    tx_manager: Arc<GridTxManager>,
    context: ContextId,
    id: GridTxId,
}

impl GridSynchronization {
    pub(crate) fn new(tx_manager: Arc<GridTxManager>, context: ContextId, id: GridTxId) -> Self {
        Self {
            tx_manager,
            context,
            id,
        }
    }
}

impl Synchronization for GridSynchronization {
    fn before_completion(&self) -> Result<(), String> {
        self.tx_manager
            .validate(self.context, self.id)
            .map_err(|e| e.to_string())
    }

    fn after_completion(&self, status: Status) {
        let result = if status == Status::Committed {
            self.tx_manager.commit(self.context, self.id)
        } else {
            self.tx_manager.rollback(self.context, self.id)
        };

        if let Err(e) = result {
            tracing::error!(
                context = %self.context,
                tx = %self.id,
                ?status,
                error = %e,
                "Failed to complete grid transaction"
            );
        }
    }

    fn describe(&self) -> String {
        format!("GridSynchronization({}, {})", self.context, self.id)
    }
}
