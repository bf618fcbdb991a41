use refsync_core::{
    open_db_in_memory, DocPath, Document, DocumentStore, EngineConfig, ItemService,
    LocalItemCache, PrefixTokenizer, PropertyMeta, Schema, SchemaBuilder, SearchQuery,
    SqliteDocumentStore,
};
use rusqlite::Connection;
use serde_json::{json, Value};

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

fn entry_tokens(conn: &mut Connection, config: &EngineConfig, entry_id: &str) -> Vec<String> {
    let mut store = SqliteDocumentStore::try_new(conn, config).unwrap();
    let entry = store
        .run_transaction(|txn| txn.read(&DocPath::new(config.search_collection.as_str(), entry_id)))
        .unwrap()
        .unwrap();
    entry["tokens"]
        .as_array()
        .unwrap()
        .iter()
        .map(|token| token.as_str().unwrap().to_string())
        .collect()
}

fn post_schema(builder: impl FnOnce(&mut SchemaBuilder)) -> Schema {
    let mut schema = SchemaBuilder::new();
    schema
        .define_model(
            "post",
            "posts",
            vec![
                ("title", PropertyMeta::scalar()),
                ("body", PropertyMeta::scalar()),
                ("tags", PropertyMeta::array()),
            ],
        )
        .unwrap();
    builder(&mut schema);
    schema.build().unwrap()
}

#[test]
fn updating_one_indexed_property_keeps_tokens_of_the_other() {
    let schema = post_schema(|builder| {
        builder
            .index_for_search("post", &["title", "body"], None)
            .unwrap();
    });
    let cache = LocalItemCache::new();
    let config = EngineConfig::default();
    let tokenizer = PrefixTokenizer::new(config.min_token_len);
    let mut conn = open_db_in_memory().unwrap();

    {
        let store = SqliteDocumentStore::try_new(&mut conn, &config).unwrap();
        let mut service = ItemService::new(store, &schema, &cache, &config, &tokenizer);
        let mut post = schema
            .create_item_with_id("post", "p1", doc(json!({ "title": "Foo Bar" })))
            .unwrap();
        service.add_item(&mut post).unwrap();

        let report = service
            .update_item(&mut post, doc(json!({ "body": "Quux" })))
            .unwrap();
        assert!(report.search_indexed);
        assert!(report.full_update);

        let hits = service.search(&SearchQuery::new("foo quux")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].model, "post");
        assert_eq!(hits[0].item_id, "p1");
    }

    let tokens = entry_tokens(&mut conn, &config, "posts:p1");
    for expected in ["foo", "bar", "quux"] {
        assert!(tokens.iter().any(|t| t == expected), "missing {expected}");
    }
}

#[test]
fn sequential_declarations_accumulate_properties_and_tokens() {
    let schema = post_schema(|builder| {
        builder.index_for_search("post", &["title"], None).unwrap();
        builder.index_for_search("post", &["tags"], None).unwrap();
    });
    assert_eq!(
        schema.model("post").unwrap().search().unwrap().properties(),
        ["title", "tags"]
    );

    let cache = LocalItemCache::new();
    let config = EngineConfig::default();
    let tokenizer = PrefixTokenizer::new(config.min_token_len);
    let mut conn = open_db_in_memory().unwrap();

    {
        let store = SqliteDocumentStore::try_new(&mut conn, &config).unwrap();
        let mut service = ItemService::new(store, &schema, &cache, &config, &tokenizer);
        let mut post = schema
            .create_item_with_id(
                "post",
                "p1",
                doc(json!({ "title": "Weekly digest", "tags": ["rust", "sqlite"] })),
            )
            .unwrap();
        service.add_item(&mut post).unwrap();
    }

    let tokens = entry_tokens(&mut conn, &config, "posts:p1");
    for expected in ["weekly", "digest", "rust", "sqlite"] {
        assert!(tokens.iter().any(|t| t == expected), "missing {expected}");
    }
}

#[test]
fn tokens_accumulate_until_the_entry_is_deleted() {
    let schema = post_schema(|builder| {
        builder.index_for_search("post", &["title"], None).unwrap();
    });
    let cache = LocalItemCache::new();
    let config = EngineConfig {
        identity_separator: "__".to_string(),
        ..EngineConfig::default()
    };
    let tokenizer = PrefixTokenizer::new(config.min_token_len);
    let mut conn = open_db_in_memory().unwrap();

    {
        let store = SqliteDocumentStore::try_new(&mut conn, &config).unwrap();
        let mut service = ItemService::new(store, &schema, &cache, &config, &tokenizer);
        let mut post = schema
            .create_item_with_id("post", "p1", doc(json!({ "title": "alpha" })))
            .unwrap();
        service.add_item(&mut post).unwrap();
        service
            .update_item(&mut post, doc(json!({ "title": "beta" })))
            .unwrap();

        assert_eq!(service.search(&SearchQuery::new("alpha")).unwrap().len(), 1);
        assert_eq!(service.search(&SearchQuery::new("beta")).unwrap().len(), 1);

        service.delete_item(&post).unwrap();
        assert!(service.search(&SearchQuery::new("beta")).unwrap().is_empty());
        assert!(service.get_item("post", "p1").unwrap().is_none());
    }

    let mut store = SqliteDocumentStore::try_new(&mut conn, &config).unwrap();
    let entries = store
        .run_transaction(|txn| txn.list(&config.search_collection))
        .unwrap();
    assert!(entries.is_empty());
}

#[test]
fn unindexed_updates_leave_the_entry_alone() {
    let schema = post_schema(|builder| {
        builder.index_for_search("post", &["title"], None).unwrap();
    });
    let cache = LocalItemCache::new();
    let config = EngineConfig::default();
    let tokenizer = PrefixTokenizer::new(config.min_token_len);
    let mut conn = open_db_in_memory().unwrap();

    {
        let store = SqliteDocumentStore::try_new(&mut conn, &config).unwrap();
        let mut service = ItemService::new(store, &schema, &cache, &config, &tokenizer);
        let mut post = schema
            .create_item_with_id("post", "p1", doc(json!({ "title": "stable" })))
            .unwrap();
        service.add_item(&mut post).unwrap();
        let report = service
            .update_item(&mut post, doc(json!({ "body": "ignored words" })))
            .unwrap();
        assert!(!report.hooks_ran);
        assert!(!report.search_indexed);
        assert!(service.search(&SearchQuery::new("ignored")).unwrap().is_empty());
    }

    let tokens = entry_tokens(&mut conn, &config, "posts:p1");
    assert!(tokens.iter().any(|t| t == "stable"));
}
