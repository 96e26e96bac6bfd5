//! # tally-service
//!
//! Shared, persistent front end for the reward ledger.
//!
//! [`LedgerService`] serialises every mutation behind one lock, persists
//! the resulting state to SQLite, then publishes an immutable snapshot for
//! readers and broadcasts the operation's events. Reads never take the
//! engine lock.
//!
//! ## Embedding
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tally_ledger::{InMemoryCustody, SystemClock};
//! use tally_service::config::ServiceConfig;
//! use tally_service::{telemetry, LedgerService};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ServiceConfig::load()?;
//! telemetry::init(&config.logging)?;
//!
//! let clock = Arc::new(SystemClock::new());
//! let service = LedgerService::open(&config, InMemoryCustody::new(), clock)?;
//!
//! let admin = [0xAD; 32];
//! let _pool = service.register_pool(&admin, [0x51; 32], 10).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`] - TOML configuration
//! - [`events`] - broadcast event bus
//! - [`telemetry`] - tracing bootstrap

pub mod config;
pub mod events;
pub mod telemetry;

use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};

use tally_db::DbError;
use tally_ledger::{
    AccessControl, AdminList, AdminToken, Amount, AssetId, AssetTransfer, Clock, LedgerEngine,
    LedgerError, LedgerEvent, LedgerState, PoolId, PoolStats, RecordingSink, Timestamp, UserId,
};

use crate::config::ServiceConfig;
use crate::events::{Event, EventBus, EventFilter, EventSubscription};

/// Service error types.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The ledger rejected the operation. Nothing changed.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Opening or loading the database failed.
    #[error("database error: {0}")]
    Db(#[from] DbError),

    /// An explicit [`LedgerService::flush`] could not write the backlog.
    #[error("ledger state not persisted: {0}")]
    Persistence(DbError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Engine plus the events it produced that are not on disk yet.
struct Ledger<T> {
    engine: LedgerEngine<T, RecordingSink>,
    unsaved: Vec<(Timestamp, LedgerEvent)>,
}

/// Persistent, shareable reward ledger.
///
/// A mutation that returns `Ok` has taken effect, custody transfer
/// included. A mutation that returns `Err` changed nothing. If the database
/// refuses a save, the change stays applied in memory and its events are
/// queued; the next mutation or [`LedgerService::flush`] writes them.
pub struct LedgerService<T> {
    ledger: Mutex<Ledger<T>>,
    db: Mutex<Connection>,
    snapshot: RwLock<Arc<LedgerState>>,
    access: Box<dyn AccessControl + Send + Sync>,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl<T: AssetTransfer + Send> LedgerService<T> {
    /// Open the configured database, restore the ledger from it and wrap
    /// `custody`.
    pub fn open(config: &ServiceConfig, custody: T, clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = if config.storage.in_memory {
            tally_db::open_memory()?
        } else {
            std::fs::create_dir_all(config.data_dir())?;
            tally_db::open(&config.database_path())?
        };

        let state = tally_db::store::load(&conn)?;
        let admins = AdminList::new(config.admin_ids()?);

        info!(
            pools = state.pools.len(),
            positions = state.positions.len(),
            admins = admins.len(),
            in_memory = config.storage.in_memory,
            "ledger service opened"
        );

        let engine = LedgerEngine::from_state(state.clone(), custody, RecordingSink::default())
            .with_reward_asset(config.reward_asset()?);

        Ok(Self {
            ledger: Mutex::new(Ledger {
                engine,
                unsaved: Vec::new(),
            }),
            db: Mutex::new(conn),
            snapshot: RwLock::new(Arc::new(state)),
            access: Box::new(admins),
            clock,
            events: EventBus::new(config.events.capacity),
        })
    }

    /// Replace the configured admin list.
    pub fn with_access(mut self, access: impl AccessControl + Send + Sync + 'static) -> Self {
        self.access = Box::new(access);
        self
    }

    /// Register a pool. `caller` must be an administrator.
    pub async fn register_pool(
        &self,
        caller: &UserId,
        asset: AssetId,
        reward_rate: Amount,
    ) -> Result<PoolId> {
        let token = AdminToken::authorize(caller, self.access.as_ref())?;
        let mut ledger = self.ledger.lock().await;
        let pool_id = ledger
            .engine
            .register_pool(&token, asset, reward_rate, self.clock.now())?;
        self.commit(&mut ledger).await;
        Ok(pool_id)
    }

    /// Stake `amount` in `pool_id`.
    pub async fn deposit(&self, pool_id: PoolId, user: &UserId, amount: Amount) -> Result<()> {
        let mut ledger = self.ledger.lock().await;
        ledger
            .engine
            .deposit(pool_id, user, amount, self.clock.now())?;
        self.commit(&mut ledger).await;
        Ok(())
    }

    /// Unstake `amount` from `pool_id`.
    pub async fn withdraw(&self, pool_id: PoolId, user: &UserId, amount: Amount) -> Result<()> {
        let mut ledger = self.ledger.lock().await;
        ledger
            .engine
            .withdraw(pool_id, user, amount, self.clock.now())?;
        self.commit(&mut ledger).await;
        Ok(())
    }

    /// Sweep all of `user`'s pools and pay out their whole reward balance.
    pub async fn claim_all(&self, user: &UserId) -> Result<Amount> {
        let mut ledger = self.ledger.lock().await;
        let amount = ledger.engine.claim_all(user, self.clock.now())?;
        self.commit(&mut ledger).await;
        Ok(amount)
    }

    /// Write any state a failed save left behind.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Persistence`] if the database still refuses it;
    ///   the backlog is kept
    pub async fn flush(&self) -> Result<()> {
        let mut ledger = self.ledger.lock().await;
        if ledger.unsaved.is_empty() {
            return Ok(());
        }
        let state = ledger.engine.snapshot();
        self.save(&state, &ledger.unsaved)
            .await
            .map_err(ServiceError::Persistence)?;
        ledger.unsaved.clear();
        Ok(())
    }

    /// Number of applied events not yet written to the database.
    pub async fn unsaved_events(&self) -> usize {
        self.ledger.lock().await.unsaved.len()
    }

    /// Current ledger state.
    pub async fn snapshot(&self) -> Arc<LedgerState> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// Pool statistics projected to the current time.
    pub async fn pool_stats(&self, pool_id: PoolId) -> Result<PoolStats> {
        let snapshot = self.snapshot().await;
        Ok(snapshot.pool_stats(pool_id, self.clock.now())?)
    }

    /// What `user` would receive from a claim right now.
    pub async fn claimable(&self, user: &UserId) -> Result<Amount> {
        let snapshot = self.snapshot().await;
        Ok(snapshot.claimable(user, self.clock.now())?)
    }

    /// Reward `user` has accrued in `pool_id` but not yet settled.
    pub async fn pending_reward(&self, pool_id: PoolId, user: &UserId) -> Result<Amount> {
        let snapshot = self.snapshot().await;
        Ok(snapshot.pending_reward(pool_id, user, self.clock.now())?)
    }

    /// Subscribe to every ledger event.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Subscribe to the ledger events that pass `filter`.
    pub fn subscribe_filtered(&self, filter: EventFilter) -> EventSubscription {
        self.events.subscribe_filtered(filter)
    }

    /// Run `f` against the custody collaborator while holding the engine
    /// lock.
    pub async fn with_custody<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut ledger = self.ledger.lock().await;
        f(ledger.engine.transfer_mut())
    }

    /// Publish an applied change: save it with any backlog, swap the
    /// snapshot, broadcast its events.
    ///
    /// The change already happened, custody included, so a failed save is
    /// logged and queued rather than reported to the caller.
    async fn commit(&self, ledger: &mut Ledger<T>) {
        let fresh = ledger.engine.sink_mut().take();
        ledger.unsaved.extend(fresh.iter().cloned());
        let state = ledger.engine.snapshot();

        match self.save(&state, &ledger.unsaved).await {
            Ok(()) => ledger.unsaved.clear(),
            Err(e) => warn!(
                unsaved = ledger.unsaved.len(),
                "ledger state not persisted, retrying on next change: {e}"
            ),
        }

        *self.snapshot.write().await = Arc::new(state);
        for (at, event) in &fresh {
            self.events.publish(*at, event);
        }
    }

    async fn save(
        &self,
        state: &LedgerState,
        events: &[(Timestamp, LedgerEvent)],
    ) -> std::result::Result<(), DbError> {
        let mut db = self.db.lock().await;
        tally_db::store::save(&mut db, state, events)
    }
}
