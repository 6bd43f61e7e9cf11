//! Concrete `Connection` backends.
//!
//! The engine itself is backend-agnostic: it only consumes the traits in
//! `crate::conn`. The CLI binary wires in the shell-backed MySQL driver
//! here; tests supply an in-memory fake instead.

pub mod mysql;
