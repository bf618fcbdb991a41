//! Shared context handed to lifecycle hooks.

use crate::config::EngineConfig;
use crate::model::cache::LocalItemCache;
use crate::model::schema::Schema;
use crate::search::tokenizer::Tokenizer;

/// Collaborators the reference and search hooks consult inside a transaction.
#[derive(Clone, Copy)]
pub struct HookContext<'a> {
    pub schema: &'a Schema,
    pub cache: &'a LocalItemCache,
    pub config: &'a EngineConfig,
    pub tokenizer: &'a dyn Tokenizer,
}
