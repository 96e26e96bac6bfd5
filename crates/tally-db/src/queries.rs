//! Database query functions organized by table.

pub mod balances;
pub mod journal;
pub mod pools;
pub mod positions;
