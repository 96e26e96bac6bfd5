//! SQL schema definitions.

/// Complete schema for the v1 ledger database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Ledger state
-- ============================================================

CREATE TABLE IF NOT EXISTS pools (
    pool_id INTEGER PRIMARY KEY,
    asset BLOB NOT NULL,
    reward_rate INTEGER NOT NULL,
    total_staked INTEGER NOT NULL DEFAULT 0,
    accumulator BLOB NOT NULL,
    last_update_time INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS positions (
    pool_id INTEGER NOT NULL REFERENCES pools(pool_id),
    user_id BLOB NOT NULL,
    staked_amount INTEGER NOT NULL,
    checkpoint BLOB NOT NULL,
    PRIMARY KEY (pool_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_positions_user ON positions(user_id);

CREATE TABLE IF NOT EXISTS reward_balances (
    user_id BLOB PRIMARY KEY,
    balance INTEGER NOT NULL
);

-- ============================================================
-- Journal & metadata
-- ============================================================

CREATE TABLE IF NOT EXISTS event_log (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type TEXT NOT NULL,
    user_id BLOB,
    payload TEXT NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_event_log_user ON event_log(user_id);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
