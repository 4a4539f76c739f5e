//! Domain model for tables, period sums and correlation records.
//!
//! # Responsibility
//! - Define the canonical table shape produced by every table source.
//! - Define the correlation record persisted by every store.
//!
//! # Invariants
//! - Canonical rows always carry an amount; only the date may be absent.
//! - Correlation records are immutable once constructed and never reuse ids.

pub mod record;
pub mod table;
