//! Object model host: model descriptors, items and the local item cache.
//!
//! # Responsibility
//! - Describe models and their property shapes.
//! - Carry per-item identity, state and dirty tracking.
//!
//! # Invariants
//! - Item paths are `<collection>/<id>` and ids never contain `/`.

pub mod cache;
pub mod descriptor;
pub mod item;
pub mod meta;
pub mod schema;
