//! Example: creating accounts in a transaction spanning a message queue and
//! the data grid
//!
//! The queue is a two-phase participant; the grid is enlisted as the last
//! resource. A username of "error" makes the work fail, so neither the
//! notification nor the account survive.
//!
//! Run with: RUST_LOG=debug cargo run --example account_service

use lrco_adapter::{LrcoConfig, TransactionalInterceptor};
use lrco_common::{ContextId, Flags, Vote, XaResource, XaResult, Xid};
use lrco_coordinator::{CoordinatorConfig, TransactionManager};
use lrco_grid::{CacheRegistry, GridConfig, Region, Value};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// In-memory queue whose sends become visible on commit
#[derive(Default)]
struct MessageQueue {
    pending: Mutex<HashMap<Vec<u8>, Vec<String>>>,
    delivered: Mutex<Vec<String>>,
}

impl MessageQueue {
    fn send(&self, xid: &Xid, message: &str) {
        self.pending
            .lock()
            .entry(xid.global_transaction_id().to_vec())
            .or_default()
            .push(message.to_string());
    }

    fn delivered(&self) -> Vec<String> {
        self.delivered.lock().clone()
    }
}

impl XaResource for MessageQueue {
    fn start(&self, _xid: &Xid, _flags: Flags) -> XaResult<()> {
        Ok(())
    }

    fn end(&self, _xid: &Xid, _flags: Flags) -> XaResult<()> {
        Ok(())
    }

    fn prepare(&self, _xid: &Xid) -> XaResult<Vote> {
        Ok(Vote::Commit)
    }

    fn commit(&self, xid: &Xid, _one_phase: bool) -> XaResult<()> {
        if let Some(messages) = self.pending.lock().remove(xid.global_transaction_id()) {
            self.delivered.lock().extend(messages);
        }
        Ok(())
    }

    fn rollback(&self, xid: &Xid) -> XaResult<()> {
        self.pending.lock().remove(xid.global_transaction_id());
        Ok(())
    }

    fn forget(&self, _xid: &Xid) -> XaResult<()> {
        Ok(())
    }

    fn recover(&self, _flags: Flags) -> XaResult<Vec<Xid>> {
        Ok(Vec::new())
    }

    fn is_same_rm(&self, other: &dyn XaResource) -> XaResult<bool> {
        Ok(other.as_any().is::<Self>())
    }

    fn transaction_timeout(&self) -> XaResult<u32> {
        Ok(0)
    }

    fn set_transaction_timeout(&self, _seconds: u32) -> XaResult<bool> {
        Ok(false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct AccountService {
    interceptor: TransactionalInterceptor<CacheRegistry>,
    queue: Arc<MessageQueue>,
    accounts: Region,
}

impl AccountService {
    fn create_account_and_notify(&self, username: &str) -> Result<(), Box<dyn std::error::Error>> {
        let ctx = ContextId::next();
        self.interceptor.run(ctx, |tx| -> Result<(), String> {
            tx.enlist_resource(self.queue.clone())
                .map_err(|e| e.to_string())?;
            self.queue.send(tx.xid(), username);

            let mut account = BTreeMap::new();
            account.insert("name".to_string(), Value::from(username));
            self.accounts
                .put(ctx, username, account)
                .map_err(|e| e.to_string())?;

            if username == "error" {
                return Err("Simulated error".to_string());
            }
            Ok(())
        })?;
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== Last Resource Commit Example ===\n");

    // The coordinator must be bound before any cache is created
    let tm = Arc::new(TransactionManager::new(CoordinatorConfig::default()));
    let caches = Arc::new(CacheRegistry::with_transaction_registry(tm.clone()));
    let cache = caches.create(GridConfig::new("accounts"));
    println!("✓ Created coordinator and cache");

    let config = LrcoConfig::from_json(r#"{"one_phase_commit": true}"#)?;
    let service = AccountService {
        interceptor: TransactionalInterceptor::new(tm, caches, config),
        queue: Arc::new(MessageQueue::default()),
        accounts: cache.region("accounts")?,
    };

    for username in ["john", "error", "jane"] {
        match service.create_account_and_notify(username) {
            Ok(()) => println!("✓ Created account {}", username),
            Err(e) => println!("✗ Account {} rolled back: {}", username, e),
        }
    }

    println!("\nAccounts:      {:?}", service.accounts.keys());
    println!("Notifications: {:?}", service.queue.delivered());
    Ok(())
}
