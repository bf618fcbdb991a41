//! Denormalized token index maintained alongside items.
//!
//! # Responsibility
//! - Accumulate indexed properties and indexer stages per model.
//! - Upsert or delete one index entry per item inside the item's
//!   transaction.
//! - Answer whole-word queries against stored entries.
//!
//! # Invariants
//! - Entry tokens only grow through array-union; deleting the entry is the
//!   only way to shrink them.
//! - An update that leaves out an indexed property reuses its persisted
//!   value.

use crate::config::EngineConfig;
use crate::hooks::HookContext;
use crate::model::item::Item;
use crate::model::schema::{SchemaBuilder, SchemaResult};
use crate::repo::document_repo::{DocPath, DocTxn, Document, FieldWrite, Patch};
use crate::search::tokenizer::Tokenizer;
use crate::search::{SearchError, SearchResult};
use log::debug;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// One stage of the token pipeline.
///
/// Each stage receives the tokens produced by earlier stages and returns the
/// accumulated set.
pub trait Indexer: Send + Sync {
    fn name(&self) -> &str;

    fn index(
        &self,
        state: &Document,
        properties: &[String],
        tokenizer: &dyn Tokenizer,
        previous: BTreeSet<String>,
    ) -> BTreeSet<String>;
}

/// Tokenizes the text of each listed property.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyIndexer;

impl Indexer for PropertyIndexer {
    fn name(&self) -> &str {
        "property"
    }

    fn index(
        &self,
        state: &Document,
        properties: &[String],
        tokenizer: &dyn Tokenizer,
        mut previous: BTreeSet<String>,
    ) -> BTreeSet<String> {
        for property in properties {
            let mut text = String::new();
            if let Some(value) = state.get(property) {
                collect_text(value, &mut text);
            }
            previous.extend(tokenizer.tokenize(&text).into_iter().flatten());
        }
        previous
    }
}

fn collect_text(value: &Value, out: &mut String) {
    match value {
        Value::Null => {}
        Value::String(text) => {
            out.push(' ');
            out.push_str(text);
        }
        Value::Bool(flag) => {
            out.push(' ');
            out.push_str(if *flag { "true" } else { "false" });
        }
        Value::Number(number) => {
            out.push(' ');
            out.push_str(&number.to_string());
        }
        Value::Array(values) => values.iter().for_each(|value| collect_text(value, out)),
        Value::Object(fields) => fields.values().for_each(|value| collect_text(value, out)),
    }
}

#[derive(Clone)]
struct IndexStage {
    properties: Vec<String>,
    indexer: Arc<dyn Indexer>,
}

/// Search declarations accumulated for one model.
#[derive(Clone, Default)]
pub struct SearchConfig {
    properties: Vec<String>,
    stages: Vec<IndexStage>,
}

impl SearchConfig {
    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    pub fn is_indexed(&self, property: &str) -> bool {
        self.properties.iter().any(|indexed| indexed == property)
    }

    /// Runs every stage in declaration order, folding each stage's output
    /// into the next.
    pub fn tokens_for(&self, state: &Document, tokenizer: &dyn Tokenizer) -> BTreeSet<String> {
        self.stages.iter().fold(BTreeSet::new(), |tokens, stage| {
            stage
                .indexer
                .index(state, &stage.properties, tokenizer, tokens)
        })
    }

    fn declare(&mut self, properties: &[&str], indexer: Arc<dyn Indexer>) {
        for property in properties {
            if !self.is_indexed(property) {
                self.properties.push((*property).to_string());
            }
        }
        self.stages.push(IndexStage {
            properties: properties.iter().map(|p| (*p).to_string()).collect(),
            indexer,
        });
    }
}

impl Debug for SearchConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("properties", &self.properties)
            .field(
                "indexers",
                &self
                    .stages
                    .iter()
                    .map(|stage| stage.indexer.name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl SchemaBuilder {
    /// Indexes `properties` of `model` for search.
    ///
    /// Repeated calls accumulate properties and chain indexers; `None` uses
    /// [`PropertyIndexer`].
    pub fn index_for_search(
        &mut self,
        model: &str,
        properties: &[&str],
        indexer: Option<Arc<dyn Indexer>>,
    ) -> SchemaResult<()> {
        self.ensure_properties(model, properties)?;
        let indexer = indexer.unwrap_or_else(|| Arc::new(PropertyIndexer));
        let indexer_name = indexer.name().to_string();
        self.model_mut(model)?
            .search
            .get_or_insert_with(SearchConfig::default)
            .declare(properties, indexer);
        debug!(
            "event=index_for_search module=search status=ok model={} properties={} indexer={}",
            model,
            properties.join(","),
            indexer_name
        );
        self.mark_triggers_update_txn(model, properties, true)
    }
}

/// Replaces path separators so an item path can serve as a document id.
pub fn normalize_identity(path: &DocPath, separator: &str) -> String {
    path.to_string().replace('/', separator)
}

/// Location of the index entry for `item`.
pub fn search_entry_path(config: &EngineConfig, item: &Item) -> DocPath {
    DocPath::new(
        config.search_collection.as_str(),
        normalize_identity(&item.path(), &config.identity_separator),
    )
}

/// Indexes a new item. Returns `false` when its model is not indexed.
pub fn on_search_add_item(
    ctx: &HookContext<'_>,
    item: &Item,
    txn: &dyn DocTxn,
    new_state: &Document,
) -> SearchResult<bool> {
    let Some(search) = item.model().search() else {
        return Ok(false);
    };
    write_entry(ctx, item, txn, &search.tokens_for(new_state, ctx.tokenizer), "add")?;
    Ok(true)
}

/// Re-indexes an item when one of its indexed properties is dirty.
///
/// Indexed properties missing from `new_state` are read from the persisted
/// record so the entry keeps their tokens.
pub fn on_search_update_item(
    ctx: &HookContext<'_>,
    item: &Item,
    txn: &dyn DocTxn,
    new_state: &Document,
) -> SearchResult<bool> {
    let Some(search) = item.model().search() else {
        return Ok(false);
    };
    if !search
        .properties()
        .iter()
        .any(|property| item.did_update(property))
    {
        return Ok(false);
    }

    let mut merged = Document::new();
    let mut persisted: Option<Document> = None;
    for property in search.properties() {
        let value = match new_state.get(property) {
            Some(value) => Some(value.clone()),
            None => {
                if persisted.is_none() {
                    persisted = Some(item.read(txn)?);
                }
                persisted
                    .as_ref()
                    .and_then(|state| state.get(property))
                    .cloned()
            }
        };
        if let Some(value) = value {
            merged.insert(property.clone(), value);
        }
    }

    write_entry(ctx, item, txn, &search.tokens_for(&merged, ctx.tokenizer), "update")?;
    Ok(true)
}

/// Removes the index entry of a deleted item.
pub fn on_search_delete_item(
    ctx: &HookContext<'_>,
    item: &Item,
    txn: &dyn DocTxn,
) -> SearchResult<bool> {
    if item.model().search().is_none() {
        return Ok(false);
    }
    txn.delete(&search_entry_path(ctx.config, item))?;
    debug!(
        "event=search_index module=search status=ok hook=delete model={} item_id={}",
        item.model().name(),
        item.id()
    );
    Ok(true)
}

fn write_entry(
    ctx: &HookContext<'_>,
    item: &Item,
    txn: &dyn DocTxn,
    tokens: &BTreeSet<String>,
    hook: &str,
) -> SearchResult<()> {
    let patch = Patch::new()
        .with("model", FieldWrite::Set(Value::from(item.model().name())))
        .with("item_id", FieldWrite::Set(Value::from(item.id())))
        .with(
            "tokens",
            FieldWrite::ArrayUnion(tokens.iter().cloned().map(Value::String).collect()),
        );
    txn.set(&search_entry_path(ctx.config, item), &patch)?;
    debug!(
        "event=search_index module=search status=ok hook={} model={} item_id={} tokens={}",
        hook,
        item.model().name(),
        item.id(),
        tokens.len()
    );
    Ok(())
}

/// Whole-word query over index entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    /// Restricts hits to one model.
    pub model: Option<String>,
    /// Falls back to `EngineConfig::search_limit`.
    pub limit: Option<u32>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub model: String,
    pub item_id: String,
}

/// Returns entries whose tokens contain every term of the query text.
///
/// Entries are visited in id order. Empty queries return no hits.
pub fn search_items(
    txn: &dyn DocTxn,
    config: &EngineConfig,
    tokenizer: &dyn Tokenizer,
    query: &SearchQuery,
) -> SearchResult<Vec<SearchHit>> {
    let terms = tokenizer.terms(&query.text);
    let limit = query.limit.unwrap_or(config.search_limit) as usize;
    if terms.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let mut hits = Vec::new();
    for (path, entry) in txn.list(&config.search_collection)? {
        let hit = parse_entry(&path, &entry)?;
        if query.model.as_ref().is_some_and(|model| *model != hit.model) {
            continue;
        }
        let tokens = entry_tokens(&path, &entry)?;
        if terms.iter().all(|term| tokens.contains(term.as_str())) {
            hits.push(hit);
            if hits.len() >= limit {
                break;
            }
        }
    }

    debug!(
        "event=search_query module=search status=ok terms={} hits={} limit={}",
        terms.len(),
        hits.len(),
        limit
    );
    Ok(hits)
}

fn parse_entry(path: &DocPath, entry: &Document) -> SearchResult<SearchHit> {
    let field = |name: &str| {
        entry
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SearchError::InvalidData(format!("entry `{path}` has no `{name}`")))
    };
    Ok(SearchHit {
        model: field("model")?,
        item_id: field("item_id")?,
    })
}

fn entry_tokens<'e>(path: &DocPath, entry: &'e Document) -> SearchResult<BTreeSet<&'e str>> {
    match entry.get("tokens") {
        None => Ok(BTreeSet::new()),
        Some(Value::Array(values)) => values
            .iter()
            .map(|value| {
                value.as_str().ok_or_else(|| {
                    SearchError::InvalidData(format!("entry `{path}` has a non-string token"))
                })
            })
            .collect(),
        Some(_) => Err(SearchError::InvalidData(format!(
            "entry `{path}` tokens are not an array"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        normalize_identity, on_search_add_item, on_search_delete_item, on_search_update_item,
        search_entry_path, search_items, Indexer, SearchQuery,
    };
    use crate::config::EngineConfig;
    use crate::db::open_db_in_memory;
    use crate::hooks::HookContext;
    use crate::model::cache::LocalItemCache;
    use crate::model::meta::PropertyMeta;
    use crate::model::schema::{Schema, SchemaBuilder, SchemaError};
    use crate::repo::document_repo::{DocPath, DocTxn, Document, DocumentStore, SqliteDocumentStore};
    use crate::search::tokenizer::{PrefixTokenizer, Tokenizer};
    use crate::search::SearchError;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    struct Shout;

    impl Indexer for Shout {
        fn name(&self) -> &str {
            "shout"
        }

        fn index(
            &self,
            state: &Document,
            properties: &[String],
            _tokenizer: &dyn Tokenizer,
            mut previous: BTreeSet<String>,
        ) -> BTreeSet<String> {
            for property in properties {
                if let Some(text) = state.get(property).and_then(|v| v.as_str()) {
                    previous.insert(text.to_uppercase());
                }
            }
            previous
        }
    }

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn schema() -> Schema {
        let mut builder = SchemaBuilder::new();
        builder
            .define_model(
                "post",
                "posts",
                vec![
                    ("title", PropertyMeta::scalar()),
                    ("body", PropertyMeta::scalar()),
                    ("slug", PropertyMeta::scalar()),
                    ("views", PropertyMeta::scalar()),
                ],
            )
            .unwrap();
        builder
            .index_for_search("post", &["title", "body"], None)
            .unwrap();
        builder
            .index_for_search("post", &["slug"], Some(Arc::new(Shout)))
            .unwrap();
        builder.build().unwrap()
    }

    fn run<T>(
        body: impl FnMut(&dyn DocTxn) -> Result<T, SearchError>,
    ) -> Result<T, SearchError> {
        let mut conn = open_db_in_memory().unwrap();
        let mut store = SqliteDocumentStore::try_new(&mut conn, &EngineConfig::default()).unwrap();
        store.run_transaction(body)
    }

    fn tokens(entry: &Document) -> Vec<String> {
        entry["tokens"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t.as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn declarations_accumulate_and_force_full_update() {
        let schema = schema();
        let model = schema.model("post").unwrap();
        let search = model.search().unwrap();
        assert_eq!(search.properties(), ["title", "body", "slug"]);
        assert!(!search.is_indexed("views"));
        assert!(model.update_trigger("slug").unwrap().forces_full_update);
        assert!(model.update_trigger("views").is_none());
    }

    #[test]
    fn rejects_unknown_properties() {
        let mut builder = SchemaBuilder::new();
        builder.define_model("post", "posts", vec![]).unwrap();
        assert!(matches!(
            builder.index_for_search("post", &["title"], None),
            Err(SchemaError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn chained_indexers_contribute_to_one_entry() {
        let schema = schema();
        let config = EngineConfig::default();
        let tokenizer = PrefixTokenizer::new(config.min_token_len);
        let cache = LocalItemCache::new();
        let ctx = HookContext {
            schema: &schema,
            cache: &cache,
            config: &config,
            tokenizer: &tokenizer,
        };

        let state = doc(json!({ "title": "Foo", "slug": "intro" }));
        let item = schema.create_item_with_id("post", "p1", state.clone()).unwrap();
        let entry = run(|txn| {
            assert!(on_search_add_item(&ctx, &item, txn, &state)?);
            Ok(txn.read(&search_entry_path(&config, &item))?)
        })
        .unwrap()
        .unwrap();

        assert_eq!(entry["model"], json!("post"));
        assert_eq!(entry["item_id"], json!("p1"));
        let tokens = tokens(&entry);
        assert!(tokens.contains(&"foo".to_string()));
        assert!(tokens.contains(&"INTRO".to_string()));
    }

    #[test]
    fn update_merges_persisted_values_for_missing_properties() {
        let schema = schema();
        let config = EngineConfig::default();
        let tokenizer = PrefixTokenizer::new(config.min_token_len);
        let cache = LocalItemCache::new();
        let ctx = HookContext {
            schema: &schema,
            cache: &cache,
            config: &config,
            tokenizer: &tokenizer,
        };

        let persisted = doc(json!({ "title": "Foo Bar" }));
        let mut item = schema.item("post", "p1", persisted).unwrap();
        let changes = doc(json!({ "body": "Baz" }));
        item.stage_changes(&changes);

        let entry = run(|txn| {
            item.save(txn)?;
            assert!(on_search_update_item(&ctx, &item, txn, &changes)?);
            Ok(txn.read(&search_entry_path(&config, &item))?)
        })
        .unwrap()
        .unwrap();

        let tokens = tokens(&entry);
        for expected in ["foo", "bar", "baz"] {
            assert!(tokens.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn update_without_indexed_changes_is_skipped() {
        let schema = schema();
        let config = EngineConfig::default();
        let tokenizer = PrefixTokenizer::new(config.min_token_len);
        let cache = LocalItemCache::new();
        let ctx = HookContext {
            schema: &schema,
            cache: &cache,
            config: &config,
            tokenizer: &tokenizer,
        };

        let mut item = schema.item("post", "p1", Document::new()).unwrap();
        let changes = doc(json!({ "views": 3 }));
        item.stage_changes(&changes);
        let (indexed, entry) = run(|txn| {
            let indexed = on_search_update_item(&ctx, &item, txn, &changes)?;
            Ok((indexed, txn.read(&search_entry_path(&config, &item))?))
        })
        .unwrap();
        assert!(!indexed);
        assert!(entry.is_none());
    }

    #[test]
    fn delete_removes_entry_and_queries_match_whole_words() {
        let schema = schema();
        let config = EngineConfig::default();
        let tokenizer = PrefixTokenizer::new(config.min_token_len);
        let cache = LocalItemCache::new();
        let ctx = HookContext {
            schema: &schema,
            cache: &cache,
            config: &config,
            tokenizer: &tokenizer,
        };

        let first = doc(json!({ "title": "Rust ownership" }));
        let second = doc(json!({ "title": "Rusty tools" }));
        let p1 = schema.create_item_with_id("post", "p1", first.clone()).unwrap();
        let p2 = schema.create_item_with_id("post", "p2", second.clone()).unwrap();

        let (before, after) = run(|txn| {
            on_search_add_item(&ctx, &p1, txn, &first)?;
            on_search_add_item(&ctx, &p2, txn, &second)?;
            let before = search_items(txn, &config, &tokenizer, &SearchQuery::new("rust"))?;
            on_search_delete_item(&ctx, &p1, txn)?;
            let after = search_items(txn, &config, &tokenizer, &SearchQuery::new("RUST"))?;
            Ok((before, after))
        })
        .unwrap();

        let ids: Vec<_> = before.iter().map(|hit| hit.item_id.as_str()).collect();
        assert_eq!(ids, ["p1", "p2"]);
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].item_id, "p2");
    }

    #[test]
    fn query_filters_by_model_and_limit() {
        let schema = schema();
        let config = EngineConfig::default();
        let tokenizer = PrefixTokenizer::new(config.min_token_len);
        let cache = LocalItemCache::new();
        let ctx = HookContext {
            schema: &schema,
            cache: &cache,
            config: &config,
            tokenizer: &tokenizer,
        };

        let state = doc(json!({ "title": "shared words" }));
        let hits = run(|txn| {
            for id in ["p1", "p2", "p3"] {
                let item = schema.create_item_with_id("post", id, state.clone()).unwrap();
                on_search_add_item(&ctx, &item, txn, &state)?;
            }
            let limited = search_items(
                txn,
                &config,
                &tokenizer,
                &SearchQuery {
                    limit: Some(2),
                    ..SearchQuery::new("shared words")
                },
            )?;
            assert_eq!(limited.len(), 2);
            search_items(
                txn,
                &config,
                &tokenizer,
                &SearchQuery {
                    model: Some("user".to_string()),
                    ..SearchQuery::new("shared")
                },
            )
        })
        .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn identity_replaces_path_separator() {
        let path = DocPath::new("posts", "p1");
        assert_eq!(normalize_identity(&path, ":"), "posts:p1");
        assert_eq!(normalize_identity(&path, "__"), "posts__p1");
    }
}
