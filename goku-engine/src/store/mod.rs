//! SQL access layer, one module per table.
//!
//! Query functions are generic over the executor so the same statement runs
//! against the pool or inside an open transaction.

pub(crate) mod data;
pub(crate) mod events;
pub(crate) mod lease;
