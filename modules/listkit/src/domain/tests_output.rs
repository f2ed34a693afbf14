#![allow(clippy::unwrap_used, clippy::expect_used)]

use listkit_db::{CallKind, FindManyArgs, Include};
use listkit_security::Filter;
use serde_json::{Value, json};

use crate::config::{ListkitConfig, OutputConfig};
use crate::domain::access::AccessRule;
use crate::domain::output::filter_item;
use crate::schema::{Field, FieldAccess, List, ListAccess, Schema};
use crate::test_support::{Blog, Fixture, obj};

#[tokio::test]
async fn unreadable_field_is_removed() {
    let fx = Fixture::new(Blog::default().schema());
    fx.db.seed("Post", obj(json!({"id": "1", "title": "x", "secret": "y"})));

    let found = fx
        .anonymous()
        .list("Post")
        .unwrap()
        .find_unique(Filter::id("1"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found["title"], json!("x"));
    assert!(!found.contains_key("secret"));
}

#[tokio::test]
async fn sudo_reads_everything() {
    let fx = Fixture::new(Blog::default().schema());
    fx.db.seed("Post", obj(json!({"id": "1", "title": "x", "secret": "y"})));

    let found = fx
        .anonymous()
        .sudo()
        .list("Post")
        .unwrap()
        .find_unique(Filter::id("1"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found["secret"], json!("y"));
}

#[tokio::test]
async fn filtering_twice_changes_nothing() {
    let fx = Fixture::new(
        Blog {
            user: ListAccess::new().query(AccessRule::when(|args| args.session().is_some())),
            ..Blog::default()
        }
        .schema(),
    );
    let ctx = fx.signed_in("u1");
    let post = fx.stack.schema().list("Post").unwrap();
    let raw = obj(json!({
        "id": "p1",
        "title": "x",
        "secret": "y",
        "status": "draft",
        "authorId": "u1",
        "author": {"id": "u1", "name": "Ada", "posts": []},
        "tags": [{"id": "t1", "name": "rust"}],
        "leftover": 1
    }));
    fx.db.seed("User", obj(json!({"id": "u1", "name": "Ada"})));

    let once = filter_item(&ctx, post, raw, 0).await.unwrap();
    let twice = filter_item(&ctx, post, once.clone(), 0).await.unwrap();

    assert_eq!(once, twice);
    assert!(!once.contains_key("secret"));
    assert!(!once.contains_key("leftover"));
    assert_eq!(once["author"]["name"], json!("Ada"));
}

#[tokio::test]
async fn resolve_output_replaces_drops_and_computes() {
    let schema = Schema::builder()
        .list(
            List::builder("Note")
                .field(
                    "body",
                    Field::text().resolve_output(|args| async move {
                        Ok(args
                            .value
                            .and_then(|v| v.as_str().map(|s| json!(s.trim()))))
                    }),
                )
                .field("draft", Field::text().resolve_output(|_| async { Ok(None) }))
                .field(
                    "length",
                    Field::r#virtual().resolve_output(|args| async move {
                        let len = args.item["body"].as_str().map_or(0, |s| s.trim().len());
                        Ok(Some(json!(len)))
                    }),
                ),
        )
        .build()
        .unwrap();
    let fx = Fixture::new(schema);
    fx.db.seed("Note", obj(json!({"id": "n1", "body": "  hello ", "draft": "wip"})));

    let found = fx
        .anonymous()
        .list("Note")
        .unwrap()
        .find_unique(Filter::id("n1"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found["body"], json!("hello"));
    assert!(!found.contains_key("draft"));
    assert_eq!(found["length"], json!(5));
}

#[tokio::test]
async fn foreign_key_column_follows_its_relationship_access() {
    let schema = Schema::builder()
        .list(List::builder("User").field("name", Field::text()))
        .list(
            List::builder("Post")
                .field("title", Field::text())
                .field(
                    "author",
                    Field::relationship("User").access(FieldAccess::new().read(false)),
                ),
        )
        .build()
        .unwrap();
    let fx = Fixture::new(schema);
    fx.db.seed("User", obj(json!({"id": "u1", "name": "Ada"})));
    fx.db.seed("Post", obj(json!({"id": "p1", "title": "x", "authorId": "u1"})));

    let found = fx
        .anonymous()
        .list("Post")
        .unwrap()
        .find_unique_with(Filter::id("p1"), Some(Include::new().relation("author")))
        .await
        .unwrap()
        .unwrap();

    assert!(!found.contains_key("authorId"));
    assert!(!found.contains_key("author"));
    assert_eq!(found["title"], json!("x"));
}

#[tokio::test]
async fn field_read_rules_see_the_item() {
    let schema = Schema::builder()
        .list(
            List::builder("Post")
                .field("title", Field::text())
                .field("owner", Field::text())
                .field(
                    "notes",
                    Field::text().access(FieldAccess::new().read(AccessRule::when(|args| {
                        let owner = args.item.as_ref().and_then(|i| i["owner"].as_str());
                        owner.is_some() && owner == args.session().map(|s| s.subject_id())
                    }))),
                ),
        )
        .build()
        .unwrap();
    let fx = Fixture::new(schema);
    fx.db.seed("Post", obj(json!({"title": "a", "owner": "u1", "notes": "mine"})));
    fx.db.seed("Post", obj(json!({"title": "b", "owner": "u2", "notes": "theirs"})));

    let items = fx
        .signed_in("u1")
        .list("Post")
        .unwrap()
        .find_many(FindManyArgs::default())
        .await
        .unwrap();

    let notes: Vec<&Value> = items.iter().filter_map(|i| i.get("notes")).collect();
    assert_eq!(notes, vec![&json!("mine")]);
}

#[tokio::test]
async fn included_relations_use_the_target_descriptors() {
    let schema = Schema::builder()
        .list(
            List::builder("User")
                .field("name", Field::text())
                .field("email", Field::text().access(FieldAccess::new().read(false)))
                .field("posts", Field::relationship("Post.author").many()),
        )
        .list(
            List::builder("Post")
                .field("title", Field::text())
                .field("author", Field::relationship("User.posts")),
        )
        .build()
        .unwrap();
    let fx = Fixture::new(schema);
    fx.db.seed("User", obj(json!({"id": "u1", "name": "Ada", "email": "ada@example.com"})));
    fx.db.seed("Post", obj(json!({"id": "p1", "title": "x", "authorId": "u1"})));

    let found = fx
        .anonymous()
        .list("Post")
        .unwrap()
        .find_unique_with(Filter::id("p1"), Some(Include::new().relation("author")))
        .await
        .unwrap()
        .unwrap();

    let author = found["author"].as_object().unwrap();
    assert_eq!(author["name"], json!("Ada"));
    assert!(!author.contains_key("email"));
}

#[tokio::test]
async fn included_relations_respect_target_query_access() {
    let fx = Fixture::new(
        Blog {
            user: ListAccess::new().query(false),
            tag: ListAccess::new().query(AccessRule::filter_with(|_| {
                Some(Filter::eq("name", "rust"))
            })),
            ..Blog::default()
        }
        .schema(),
    );
    fx.db.seed("User", obj(json!({"id": "u1", "name": "Ada"})));
    fx.db.seed("Tag", obj(json!({"id": "t1", "name": "rust"})));
    fx.db.seed("Tag", obj(json!({"id": "t2", "name": "internal"})));
    let posts = fx.anonymous().sudo().list("Post").unwrap();
    let created = posts
        .create(obj(json!({
            "title": "x",
            "author": {"connect": {"id": "u1"}},
            "tags": {"connect": [{"id": "t1"}, {"id": "t2"}]}
        })))
        .await
        .unwrap()
        .unwrap();
    fx.db.clear_calls();

    let found = fx
        .anonymous()
        .list("Post")
        .unwrap()
        .find_unique_with(
            Filter::id(created["id"].clone()),
            Some(Include::new().relation("author").relation("tags")),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found["author"], Value::Null);
    let tags = found["tags"].as_array().unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0]["name"], json!("rust"));
    assert_eq!(fx.db.calls_of("Tag", CallKind::FindMany).len(), 1);
    assert!(fx.db.calls_of("User", CallKind::FindMany).is_empty());
}

#[tokio::test]
async fn relations_past_the_output_depth_are_dropped() {
    let config = ListkitConfig {
        output: OutputConfig { max_depth: 1 },
        ..ListkitConfig::default()
    };
    let fx = Fixture::with_config(Blog::default().schema(), config);
    fx.db.seed("User", obj(json!({"id": "u1", "name": "Ada"})));
    fx.db.seed("Post", obj(json!({"id": "p1", "title": "x", "authorId": "u1"})));

    let found = fx
        .anonymous()
        .list("Post")
        .unwrap()
        .find_unique_with(
            Filter::id("p1"),
            Some(Include::new().nested("author", Include::new().relation("posts"))),
        )
        .await
        .unwrap()
        .unwrap();

    let author = found["author"].as_object().unwrap();
    assert_eq!(author["name"], json!("Ada"));
    assert!(!author.contains_key("posts"));
}

#[tokio::test]
async fn write_results_are_output_filtered() {
    let fx = Fixture::new(Blog::default().schema());

    let created = fx
        .anonymous()
        .list("Post")
        .unwrap()
        .create(obj(json!({"title": "x", "secret": "written"})))
        .await
        .unwrap()
        .unwrap();

    assert!(!created.contains_key("secret"));
    assert_eq!(fx.db.rows("Post")[0]["secret"], json!("written"));
}
