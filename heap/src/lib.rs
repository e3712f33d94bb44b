//! Managed-heap stand-in backed by a handle table.
//!
//! Callers hand arrays and objects to the dispatch engine as generational
//! handles rather than addresses, because the heap is allowed to relocate
//! cells between dispatches. An address is only stable while a [`PinGuard`]
//! for the cell is alive; object addresses are re-read fresh each time via
//! [`ManagedHeap::resolve`] and carry no stability guarantee at all.

pub mod error;
pub mod table;

#[cfg(test)]
mod test;

pub use error::{Error, Result};
pub use table::{ArrayRef, ManagedHeap, ObjectRef, PinGuard};
