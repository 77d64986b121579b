//! Public facade over [`rye_core`]. Downstream crates that only need the
//! trust-and-resolution engine's types and functions, not its internal
//! module layout, depend on `rye` instead of `rye-core` directly.
//!
//! Every public item and module of `rye_core` is re-exported unchanged; this
//! crate adds no behavior of its own.

pub use rye_core::*;
