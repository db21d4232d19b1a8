//! Library target for the `clipforge` package.
//!
//! The deliverable is the `clipforge` binary (`src/main.rs`); this target only
//! re-exports the engine so `cargo test -p clipforge --doc` has something to
//! build.

#[doc(hidden)]
pub use clipforge;
