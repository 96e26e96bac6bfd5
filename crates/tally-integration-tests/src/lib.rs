//! Integration test crate for the tally reward ledger.
//!
//! This crate has no library code. It only contains integration tests
//! that drive the ledger across the accrual, engine, storage and service
//! crates together.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p tally-integration-tests
//! ```
