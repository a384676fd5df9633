//! Enlisting a store as the last resource of a coordinator transaction

use crate::error::EnlistError;
use crate::resource::EnlistmentAdapter;
use crate::store::StoreLocator;
use lrco_common::ContextId;
use lrco_coordinator::TransactionManager;
use std::sync::Arc;

/// Enlist a fresh [`EnlistmentAdapter`] in the transaction of `context`.
///
/// Call once per transaction, before the first store operation. A store
/// written to earlier has already joined through its own synchronization
/// and would take part twice.
pub fn enlist<L: StoreLocator>(
    tm: &TransactionManager,
    context: ContextId,
    locator: Arc<L>,
) -> Result<(), EnlistError> {
    let tx = tm
        .transaction(context)
        .ok_or(EnlistError::NoTransaction(context))?;

    let adapter = Arc::new(EnlistmentAdapter::new(locator, context));
    match tx.enlist_resource(adapter) {
        Ok(true) => {
            tracing::debug!(xid = %tx.xid(), %context, "Enlisted last resource");
            Ok(())
        }
        Ok(false) => Err(EnlistError::Rejected(tx.xid().clone())),
        Err(e) => Err(EnlistError::Coordinator(e)),
    }
}
