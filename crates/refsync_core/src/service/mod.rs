//! Host lifecycle services.
//!
//! # Responsibility
//! - Wrap item writes in one store transaction together with the reference
//!   and search hooks.
//! - Keep callers decoupled from hook ordering and cache reconciliation.

pub mod item_service;
