//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the transactional document contract used by hooks and services.
//! - Isolate SQLite query details from lifecycle orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`Conflict`, `InvalidData`) in
//!   addition to DB transport errors.

pub mod document_repo;
