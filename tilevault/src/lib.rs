//! Operations over tile stores: synchronization, transformation and
//! maintenance.
//!
//! The heavy lifting lives in [`ops`]; the binary in `main.rs` is a thin
//! clap wrapper around it. All operations validate their preconditions
//! before touching a store, commit in bounded batches, and are safe to
//! re-run after an interruption, since content addressing absorbs the repeats.

pub mod ops;
