//! Command implementations, one module per command group.

pub mod backfill;
pub mod book;
pub mod providers;
pub mod quota;
