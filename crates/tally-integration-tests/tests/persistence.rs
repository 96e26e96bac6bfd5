//! Integration test: ledger state survives a restart.
//!
//! 1. Run a service on a database file, stake and accrue in two pools
//! 2. Drop it and reopen the same file
//! 3. Restored state is identical and accrual continues from it
//! 4. A tampered database is refused on load
//! 5. A withdrawal whose save is refused still completes and reaches disk
//!    on the next flush

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tally_db::queries::{balances, pools};
use tally_db::DbError;
use tally_ledger::{AssetId, InMemoryCustody, ManualClock, UserId, REWARD_ASSET};
use tally_service::config::ServiceConfig;
use tally_service::{LedgerService, ServiceError};

const ADMIN: UserId = [0xAD; 32];
const ALICE: UserId = [0xA1; 32];
const BOB: UserId = [0xB0; 32];
const STAKE: AssetId = [0x51; 32];

/// Fresh data directory under the system temp dir.
fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tally-it-{:016x}", rand::random::<u64>()));
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

fn file_config(dir: &Path) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.storage.data_dir = dir.to_string_lossy().into_owned();
    config.access.admins.push(hex::encode(ADMIN));
    config
}

fn custody() -> InMemoryCustody {
    let mut custody = InMemoryCustody::new();
    custody.mint(STAKE, ALICE, 1_000);
    custody.mint(STAKE, BOB, 1_000);
    custody.fund(REWARD_ASSET, 1_000_000);
    custody
}

#[tokio::test]
async fn state_survives_reopen() {
    let dir = scratch_dir();
    let config = file_config(&dir);
    let clock = Arc::new(ManualClock::new(0));

    let saved = {
        let svc = LedgerService::open(&config, custody(), clock.clone()).expect("open");
        let a = svc.register_pool(&ADMIN, STAKE, 10).await.expect("pool a");
        let b = svc.register_pool(&ADMIN, STAKE, 4).await.expect("pool b");
        svc.deposit(a, &ALICE, 100).await.expect("alice a");
        clock.set(10);
        svc.deposit(a, &BOB, 300).await.expect("bob a");
        svc.deposit(b, &ALICE, 50).await.expect("alice b");
        clock.set(15);
        svc.withdraw(a, &BOB, 100).await.expect("bob withdraw");
        svc.snapshot().await
    };

    let svc = LedgerService::open(&config, custody(), clock.clone()).expect("reopen");
    let restored = svc.snapshot().await;
    assert_eq!(*restored, *saved);
    assert!(restored.is_conserved());

    // Pool a: A holds 100 throughout, B 300 from t=10 then 200 from t=15.
    // Pool b: A alone with 50 from t=10, the [0,10] emission is forfeited.
    clock.set(20);
    assert_eq!(svc.claimable(&ALICE).await.expect("alice"), 129 + 40);
    assert_eq!(svc.claim_all(&BOB).await.expect("bob claim"), 37 + 33);

    drop(svc);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn journal_records_every_operation() {
    let dir = scratch_dir();
    let config = file_config(&dir);
    let clock = Arc::new(ManualClock::new(0));

    {
        let svc = LedgerService::open(&config, custody(), clock.clone()).expect("open");
        let pool = svc.register_pool(&ADMIN, STAKE, 10).await.expect("pool");
        svc.deposit(pool, &ALICE, 100).await.expect("deposit");
        clock.advance(3);
        svc.claim_all(&ALICE).await.expect("claim");
        // Rejected: no journal entry.
        let _ = svc.deposit(pool, &ALICE, 0).await;
    }

    let conn = tally_db::open(&config.database_path()).expect("open db");
    let rows = tally_db::queries::journal::recent(&conn, 10).expect("journal");
    let types: Vec<&str> = rows.iter().map(|row| row.event_type.as_str()).collect();
    assert_eq!(types.len(), 3);
    assert!(types.contains(&"PoolRegistered"));
    assert!(types.contains(&"Deposited"));
    assert!(types.contains(&"RewardClaimed"));
    assert_eq!(
        tally_db::queries::journal::count_for_user(&conn, &ALICE).expect("count"),
        2
    );

    drop(conn);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn tampered_totals_refused() {
    let dir = scratch_dir();
    let config = file_config(&dir);
    let clock = Arc::new(ManualClock::new(0));

    {
        let svc = LedgerService::open(&config, custody(), clock.clone()).expect("open");
        let pool = svc.register_pool(&ADMIN, STAKE, 10).await.expect("pool");
        svc.deposit(pool, &ALICE, 100).await.expect("deposit");
    }

    {
        let conn = rusqlite::Connection::open(config.database_path()).expect("raw open");
        conn.execute("UPDATE pools SET total_staked = 99 WHERE pool_id = 0", [])
            .expect("tamper");
    }

    let result = LedgerService::open(&config, custody(), clock);
    assert!(matches!(
        result,
        Err(ServiceError::Db(DbError::Constraint(_)))
    ));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn refused_save_is_flushed_later() {
    let dir = scratch_dir();
    let config = file_config(&dir);
    let clock = Arc::new(ManualClock::new(0));

    let svc = LedgerService::open(&config, custody(), clock.clone()).expect("open");
    let pool = svc.register_pool(&ADMIN, STAKE, 10).await.expect("pool");
    svc.deposit(pool, &ALICE, 100).await.expect("deposit");

    let raw = rusqlite::Connection::open(config.database_path()).expect("raw open");
    raw.execute_batch(
        "CREATE TRIGGER refuse_journal BEFORE INSERT ON event_log
         BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
    )
    .expect("install trigger");

    clock.set(5);
    svc.withdraw(pool, &ALICE, 40).await.expect("withdraw");
    assert_eq!(svc.with_custody(|c| c.wallet(&STAKE, &ALICE)).await, 940);
    assert_eq!(svc.snapshot().await.reward_balance(&ALICE), 50);
    assert_eq!(svc.unsaved_events().await, 1);

    // Disk still holds the state from before the withdrawal.
    assert_eq!(pools::get(&raw, pool).expect("pool").total_staked, 100);
    assert_eq!(balances::get(&raw, &ALICE).expect("balance"), 0);

    raw.execute_batch("DROP TRIGGER refuse_journal;")
        .expect("drop trigger");
    svc.flush().await.expect("flush");

    let stored = pools::get(&raw, pool).expect("pool");
    assert_eq!(stored.total_staked, 60);
    assert_eq!(stored.last_update_time, 5);
    assert_eq!(balances::get(&raw, &ALICE).expect("balance"), 50);

    let live = svc.snapshot().await;
    drop(svc);
    let reopened = LedgerService::open(&config, custody(), clock).expect("reopen");
    assert_eq!(*reopened.snapshot().await, *live);

    drop(raw);
    drop(reopened);
    let _ = std::fs::remove_dir_all(&dir);
}
