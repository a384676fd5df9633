use lrco_adapter::{
    AdapterWarning, EnlistError, EnlistmentAdapter, ResourceState, StoreLocator, enlist,
};
use lrco_common::{ContextId, Flags, Vote, XaError, XaErrorCode, XaResource, XaResult, Xid};
use lrco_coordinator::{CoordinatorConfig, CoordinatorError, TransactionManager};
use lrco_grid::{Cache, CacheRegistry, GridConfig, Region, Value};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;

struct Fixture {
    tm: Arc<TransactionManager>,
    caches: Arc<CacheRegistry>,
    cache: Cache,
    region: Region,
}

fn fixture_with(config: CoordinatorConfig) -> Fixture {
    let tm = Arc::new(TransactionManager::new(config));
    let caches = Arc::new(CacheRegistry::with_transaction_registry(tm.clone()));
    let cache = caches.create(GridConfig::new("accounts"));
    let region = cache.region("testRegion").unwrap();
    Fixture {
        tm,
        caches,
        cache,
        region,
    }
}

fn fixture() -> Fixture {
    fixture_with(CoordinatorConfig::default())
}

/// Two-phase participant standing in for a message broker or database
#[derive(Default)]
struct Journal {
    log: Mutex<Vec<String>>,
    fail_prepare: bool,
}

impl Journal {
    fn entries(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl XaResource for Journal {
    fn start(&self, _xid: &Xid, _flags: Flags) -> XaResult<()> {
        self.log.lock().push("start".into());
        Ok(())
    }

    fn end(&self, _xid: &Xid, _flags: Flags) -> XaResult<()> {
        self.log.lock().push("end".into());
        Ok(())
    }

    fn prepare(&self, _xid: &Xid) -> XaResult<Vote> {
        self.log.lock().push("prepare".into());
        if self.fail_prepare {
            return Err(XaError::new(XaErrorCode::RbRollback, "prepare refused"));
        }
        Ok(Vote::Commit)
    }

    fn commit(&self, _xid: &Xid, one_phase: bool) -> XaResult<()> {
        self.log.lock().push(format!("commit({})", one_phase));
        Ok(())
    }

    fn rollback(&self, _xid: &Xid) -> XaResult<()> {
        self.log.lock().push("rollback".into());
        Ok(())
    }

    fn forget(&self, _xid: &Xid) -> XaResult<()> {
        Ok(())
    }

    fn recover(&self, _flags: Flags) -> XaResult<Vec<Xid>> {
        Ok(Vec::new())
    }

    fn is_same_rm(&self, other: &dyn XaResource) -> XaResult<bool> {
        Ok(std::ptr::addr_eq(other as *const dyn XaResource, self as *const Self))
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

#[test]
fn test_last_resource_commit_optimisation() {
    let f = fixture();
    let ctx = ContextId::next();
    let tx = f.tm.begin(ctx).unwrap();
    assert_eq!(tx.resource_count(), 0);
    assert_eq!(f.cache.tx_manager().current(ctx), None);

    enlist(&f.tm, ctx, f.caches.clone()).unwrap();
    assert_eq!(tx.resource_count(), 1);
    assert_eq!(tx.last_resource_count(), 1);
    assert!(f.cache.tx_manager().current(ctx).is_some());
    assert!(f.cache.tx_manager().is_externally_coordinated(ctx));

    f.region.put(ctx, "666", 666).unwrap();

    // The adapter already covers the store: no synchronization of its own
    assert!(tx.synchronizations().is_empty());
    assert!(!f.cache.tx_manager().is_synchronized(ctx));

    f.tm.commit(ctx).unwrap();
    assert_eq!(
        f.region.get(ContextId::next(), "666").unwrap(),
        Some(Value::Integer(666))
    );
    assert_eq!(f.cache.tx_manager().active_count(), 0);
}

#[test]
fn test_without_enlistment_store_registers_synchronization() {
    let f = fixture();
    let ctx = ContextId::next();
    let tx = f.tm.begin(ctx).unwrap();
    assert!(tx.synchronizations().is_empty());
    assert_eq!(f.cache.tx_manager().current(ctx), None);

    f.region.put(ctx, "666", 666).unwrap();

    let synchronizations = tx.synchronizations();
    assert_eq!(synchronizations.len(), 1);
    assert!(synchronizations[0].contains("GridSynchronization"));
    assert_eq!(tx.resource_count(), 0);
    assert!(!f.cache.tx_manager().is_externally_coordinated(ctx));

    f.tm.commit(ctx).unwrap();
    assert_eq!(f.region.len(), 1);
}

#[test]
fn test_rollback_discards_store_writes() {
    let f = fixture();
    let ctx = ContextId::next();
    f.tm.begin(ctx).unwrap();
    enlist(&f.tm, ctx, f.caches.clone()).unwrap();

    f.region.put(ctx, "alice", 10).unwrap();
    f.tm.rollback(ctx).unwrap();

    assert!(f.region.is_empty());
    assert_eq!(f.cache.tx_manager().current(ctx), None);
}

#[test]
fn test_last_resource_commits_after_two_phase_participants_prepare() {
    let f = fixture();
    let ctx = ContextId::next();
    let tx = f.tm.begin(ctx).unwrap();

    let journal = Arc::new(Journal::default());
    tx.enlist_resource(journal.clone()).unwrap();
    enlist(&f.tm, ctx, f.caches.clone()).unwrap();
    f.region.put(ctx, "alice", 10).unwrap();

    f.tm.commit(ctx).unwrap();

    assert_eq!(
        journal.entries(),
        vec!["start", "end", "prepare", "commit(false)"]
    );
    assert_eq!(f.region.get(ctx, "alice").unwrap(), Some(Value::Integer(10)));
}

#[test]
fn test_prepare_failure_rolls_back_store() {
    let f = fixture();
    let ctx = ContextId::next();
    let tx = f.tm.begin(ctx).unwrap();

    let journal = Arc::new(Journal {
        fail_prepare: true,
        ..Default::default()
    });
    tx.enlist_resource(journal.clone()).unwrap();
    enlist(&f.tm, ctx, f.caches.clone()).unwrap();
    f.region.put(ctx, "alice", 10).unwrap();

    assert!(matches!(
        f.tm.commit(ctx),
        Err(CoordinatorError::RolledBack(_))
    ));
    assert!(f.region.is_empty());
    assert_eq!(f.cache.tx_manager().current(ctx), None);
}

#[test]
fn test_store_conflict_rolls_back_prepared_participants() {
    let f = fixture();
    let ctx = ContextId::next();
    let tx = f.tm.begin(ctx).unwrap();

    let journal = Arc::new(Journal::default());
    tx.enlist_resource(journal.clone()).unwrap();
    enlist(&f.tm, ctx, f.caches.clone()).unwrap();
    f.region.put(ctx, "alice", 10).unwrap();

    // Concurrent non-transactional write to the same key
    f.region.put(ContextId::next(), "alice", 99).unwrap();

    assert!(matches!(
        f.tm.commit(ctx),
        Err(CoordinatorError::RolledBack(_))
    ));
    assert_eq!(
        journal.entries(),
        vec!["start", "end", "prepare", "rollback"]
    );
    assert_eq!(f.region.get(ctx, "alice").unwrap(), Some(Value::Integer(99)));
}

#[test]
fn test_enlist_without_transaction_fails() {
    let f = fixture();
    let ctx = ContextId::next();

    assert!(matches!(
        enlist(&f.tm, ctx, f.caches.clone()),
        Err(EnlistError::NoTransaction(c)) if c == ctx
    ));
}

#[test]
fn test_second_last_resource_is_rejected() {
    let f = fixture();
    let ctx = ContextId::next();
    let tx = f.tm.begin(ctx).unwrap();

    enlist(&f.tm, ctx, f.caches.clone()).unwrap();
    assert!(matches!(
        enlist(&f.tm, ctx, f.caches.clone()),
        Err(EnlistError::Rejected(xid)) if &xid == tx.xid()
    ));
    assert_eq!(tx.resource_count(), 1);
}

#[test]
fn test_enlist_after_store_operation_fails() {
    let f = fixture();
    let ctx = ContextId::next();
    let tx = f.tm.begin(ctx).unwrap();

    // The store already joined through its synchronization
    f.region.put(ctx, "alice", 10).unwrap();

    match enlist(&f.tm, ctx, f.caches.clone()) {
        Err(EnlistError::Coordinator(CoordinatorError::Resource(e))) => {
            assert_eq!(e.code(), XaErrorCode::Protocol);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(tx.resource_count(), 0);
    assert_eq!(tx.synchronizations().len(), 1);
}

#[test]
fn test_two_phase_commit_request_is_forced_to_one_phase() {
    let f = fixture();
    let ctx = ContextId::next();
    let tx = f.tm.begin(ctx).unwrap();

    let adapter = Arc::new(EnlistmentAdapter::new(f.caches.clone(), ctx));
    assert!(tx.enlist_resource(adapter.clone()).unwrap());
    assert_eq!(adapter.state(), ResourceState::Active);
    f.region.put(ctx, "alice", 10).unwrap();

    adapter.commit(tx.xid(), false).unwrap();

    assert_eq!(adapter.state(), ResourceState::Unbound);
    assert_eq!(
        adapter.warnings(),
        vec![AdapterWarning::TwoPhaseCommitRequested(tx.xid().clone())]
    );
    assert_eq!(f.region.get(ctx, "alice").unwrap(), Some(Value::Integer(10)));
}

#[test]
fn test_start_fails_when_store_already_has_transaction() {
    let f = fixture();
    let ctx = ContextId::next();
    f.tm.begin(ctx).unwrap();
    let existing = f.cache.tx_manager().begin(ctx).unwrap();

    let adapter = EnlistmentAdapter::new(f.caches.clone(), ctx);
    let err = adapter.start(&Xid::generate(1), Flags::TMNOFLAGS).unwrap_err();

    assert_eq!(err.code(), XaErrorCode::Protocol);
    assert_eq!(adapter.state(), ResourceState::Unbound);
    assert_eq!(f.cache.tx_manager().current(ctx), Some(existing));
}

#[test]
fn test_start_twice_fails() {
    let f = fixture();
    let ctx = ContextId::next();
    f.tm.begin(ctx).unwrap();
    let xid = Xid::generate(1);

    let adapter = EnlistmentAdapter::new(f.caches.clone(), ctx);
    adapter.start(&xid, Flags::TMNOFLAGS).unwrap();
    let bound = adapter.bound_transaction();

    assert_eq!(
        adapter.start(&xid, Flags::TMNOFLAGS).unwrap_err().code(),
        XaErrorCode::Protocol
    );
    assert_eq!(adapter.bound_transaction(), bound);
    assert_eq!(f.cache.tx_manager().active_count(), 1);
}

#[test]
fn test_commit_refuses_foreign_store_transaction() {
    let f = fixture();
    let ctx = ContextId::next();
    f.tm.begin(ctx).unwrap();
    let xid = Xid::generate(1);

    let adapter = EnlistmentAdapter::new(f.caches.clone(), ctx);
    adapter.start(&xid, Flags::TMNOFLAGS).unwrap();
    let ours = adapter.bound_transaction().unwrap();

    // Someone else finishes ours and starts another
    f.cache.tx_manager().rollback(ctx, ours).unwrap();
    let foreign = f.cache.tx_manager().begin(ctx).unwrap();

    assert_eq!(
        adapter.commit(&xid, true).unwrap_err().code(),
        XaErrorCode::Protocol
    );
    assert_eq!(adapter.state(), ResourceState::Unbound);
    assert_eq!(f.cache.tx_manager().current(ctx), Some(foreign));
}

#[test]
fn test_rollback_tolerates_store_transaction_already_gone() {
    let f = fixture();
    let ctx = ContextId::next();
    f.tm.begin(ctx).unwrap();
    let xid = Xid::generate(1);

    let adapter = EnlistmentAdapter::new(f.caches.clone(), ctx);
    adapter.start(&xid, Flags::TMNOFLAGS).unwrap();
    let ours = adapter.bound_transaction().unwrap();
    f.cache.tx_manager().rollback(ctx, ours).unwrap();

    adapter.rollback(&xid).unwrap();
    assert_eq!(adapter.state(), ResourceState::Unbound);
}

#[test]
fn test_start_without_coordinator_transaction_is_noop() {
    let f = fixture();
    let ctx = ContextId::next();

    let adapter = EnlistmentAdapter::new(f.caches.clone(), ctx);
    adapter.start(&Xid::generate(1), Flags::TMNOFLAGS).unwrap();

    assert_eq!(adapter.state(), ResourceState::Unbound);
    assert_eq!(f.cache.tx_manager().current(ctx), None);
}

#[test]
fn test_start_without_cache_is_rm_fail() {
    let tm = Arc::new(TransactionManager::default());
    let caches = Arc::new(CacheRegistry::with_transaction_registry(tm.clone()));
    let ctx = ContextId::next();
    tm.begin(ctx).unwrap();

    assert!(caches.locate().is_err());
    let adapter = EnlistmentAdapter::new(caches, ctx);
    assert_eq!(
        adapter.start(&Xid::generate(1), Flags::TMNOFLAGS).unwrap_err().code(),
        XaErrorCode::RmFail
    );
}

#[test]
fn test_adapter_follows_recreated_cache() {
    let f = fixture();
    let ctx = ContextId::next();
    let adapter = EnlistmentAdapter::new(f.caches.clone(), ctx);

    f.tm.begin(ctx).unwrap();
    adapter.start(&Xid::generate(1), Flags::TMNOFLAGS).unwrap();
    adapter.rollback(&Xid::generate(1)).unwrap();
    f.tm.rollback(ctx).unwrap();

    f.cache.close();
    let replacement = f.caches.create(GridConfig::new("accounts"));

    f.tm.begin(ctx).unwrap();
    adapter.start(&Xid::generate(1), Flags::TMNOFLAGS).unwrap();
    assert_eq!(replacement.tx_manager().current(ctx), adapter.bound_transaction());
}

#[test]
fn test_multiple_last_resources_when_allowed() {
    let f = fixture_with(CoordinatorConfig::default().with_multiple_last_resources(true));
    let other = f.caches.create(GridConfig::new("audit"));
    let ctx = ContextId::next();
    let tx = f.tm.begin(ctx).unwrap();

    enlist(&f.tm, ctx, Arc::new(f.cache.clone())).unwrap();
    enlist(&f.tm, ctx, Arc::new(other.clone())).unwrap();
    assert_eq!(tx.last_resource_count(), 2);

    f.region.put(ctx, "alice", 1).unwrap();
    other.region("events").unwrap().put(ctx, "created", "alice").unwrap();

    f.tm.commit(ctx).unwrap();
    assert_eq!(f.region.len(), 1);
    assert_eq!(other.region("events").unwrap().len(), 1);
}
