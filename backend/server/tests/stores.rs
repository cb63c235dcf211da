use std::sync::Arc;

use server::{
    ledger::{Ledger, LedgerOptions},
    models::{CastOutcome, Choice},
    store::{CounterStore, MemoryStore, RedisStore, SqliteStore},
};
use tempfile::tempdir;

/// Same story against every backend: vote, switch, reset, purge.
async fn exercise(store: Arc<dyn CounterStore>) {
    let ledger = Ledger::new(store, LedgerOptions::default());
    ledger.reset_all().await.expect("clean slate");
    let start = ledger.get_counts().await.expect("counts");

    ledger.cast(None, Choice::Yes).await.expect("anonymous vote");
    ledger.register("ada").await.expect("register");
    ledger.cast(Some("ada"), Choice::Yes).await.expect("vote");
    let outcome = ledger.cast(Some("ada"), Choice::No).await.expect("switch");
    assert_eq!(outcome, CastOutcome::Switched { from: Choice::Yes });

    let tally = ledger.get_counts().await.expect("counts");
    assert_eq!((tally.yes, tally.no), (1, 1));

    ledger.reset_counts().await.expect("reset counts");
    let tally = ledger.get_counts().await.expect("counts");
    assert_eq!((tally.yes, tally.no), (0, 0));
    assert_eq!(tally.epoch, start.epoch + 1);
    let voters = ledger.voters().await.expect("voters");
    assert_eq!(voters.len(), 1);
    assert_eq!(voters[0].choice, Choice::None);

    ledger.reset_all().await.expect("reset all");
    let tally = ledger.get_counts().await.expect("counts");
    assert_eq!(tally.purge, start.purge + 1);
    assert!(ledger.voters().await.expect("voters").is_empty());
}

#[tokio::test]
async fn memory_backend() {
    exercise(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn sqlite_backend() {
    let dir = tempdir().expect("tempdir");
    let store = SqliteStore::open(dir.path().join("votes.db")).expect("open sqlite");

    exercise(Arc::new(store)).await;
}

// Only runs when a Redis is around, e.g. VOTER_TEST_REDIS_URL=redis://127.0.0.1:6379
#[tokio::test]
async fn redis_backend_when_available() {
    let Ok(url) = std::env::var("VOTER_TEST_REDIS_URL") else {
        return;
    };
    let store = RedisStore::connect(&url).await.expect("connect redis");

    exercise(Arc::new(store)).await;
}
