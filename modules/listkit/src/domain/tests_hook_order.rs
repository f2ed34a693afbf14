#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::anyhow;
use listkit_db::{CallKind, FindManyArgs};
use listkit_security::Filter;
use serde_json::json;

use crate::error::ListkitError;
use crate::schema::{Field, List, Schema};
use crate::test_support::{Blog, Fixture, HookJournal, obj};

fn journaled() -> (Fixture, HookJournal) {
    let journal = HookJournal::default();
    let schema = Blog {
        journal: Some(journal.clone()),
        ..Blog::default()
    }
    .schema();
    (Fixture::new(schema), journal)
}

#[tokio::test]
async fn create_runs_every_stage_in_order() {
    let (fx, journal) = journaled();
    let ctx = fx.anonymous();

    let created = ctx
        .list("Post")
        .unwrap()
        .create(obj(json!({"title": "Hello"})))
        .await
        .unwrap();

    assert!(created.is_some());
    assert_eq!(
        journal.entries(),
        vec![
            "Post.resolveInput",
            "Post.title.resolveInput",
            "Post.validateInput",
            "Post.title.beforeOperation",
            "Post.beforeOperation",
            "Post.afterOperation persisted=true",
            "Post.title.afterOperation",
            "Post.title.resolveOutput",
        ]
    );
}

#[tokio::test]
async fn update_runs_field_after_hooks_for_untouched_fields() {
    let (fx, journal) = journaled();
    fx.db.seed("Post", obj(json!({"id": "p1", "title": "Old", "status": "draft"})));
    let ctx = fx.anonymous();

    ctx.list("Post")
        .unwrap()
        .update(Filter::id("p1"), obj(json!({"status": "published"})))
        .await
        .unwrap()
        .unwrap();

    // title was not in the payload: no input or before stages, but it is on
    // the persisted item so its after stage runs.
    assert_eq!(
        journal.entries(),
        vec![
            "Post.resolveInput",
            "Post.validateInput",
            "Post.beforeOperation",
            "Post.afterOperation persisted=true",
            "Post.title.afterOperation",
            "Post.title.resolveOutput",
        ]
    );
}

#[tokio::test]
async fn delete_skips_input_stages() {
    let (fx, journal) = journaled();
    fx.db.seed("Post", obj(json!({"id": "p1", "title": "Bye"})));
    let ctx = fx.anonymous();

    let deleted = ctx.list("Post").unwrap().delete(Filter::id("p1")).await.unwrap();

    assert_eq!(deleted.unwrap()["title"], json!("Bye"));
    assert_eq!(
        journal.entries(),
        vec![
            "Post.title.beforeOperation",
            "Post.beforeOperation",
            "Post.afterOperation persisted=true",
            "Post.title.afterOperation",
            "Post.title.resolveOutput",
        ]
    );
    assert!(fx.db.rows("Post").is_empty());
}

#[tokio::test]
async fn delete_field_hooks_see_an_empty_payload() {
    let seen = HookJournal::default();
    let probe = seen.clone();
    let schema = Schema::builder()
        .list(List::builder("Note").field(
            "body",
            Field::text().before_operation(move |args| {
                probe.record(format!("empty={}", args.resolved_data.is_empty()));
                async { Ok(()) }
            }),
        ))
        .build()
        .unwrap();
    let fx = Fixture::new(schema);
    fx.db.seed("Note", obj(json!({"id": "n1", "body": "x"})));

    fx.anonymous()
        .list("Note")
        .unwrap()
        .delete(Filter::id("n1"))
        .await
        .unwrap();

    assert_eq!(seen.entries(), vec!["empty=true"]);
}

#[tokio::test]
async fn query_runs_only_observational_stages() {
    let (fx, journal) = journaled();
    fx.db.seed("Post", obj(json!({"title": "One"})));

    let items = fx
        .anonymous()
        .list("Post")
        .unwrap()
        .find_many(FindManyArgs::default())
        .await
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(
        journal.entries(),
        vec!["Post.title.afterOperation", "Post.title.resolveOutput"]
    );
}

#[tokio::test]
async fn nested_create_completes_before_parent_before_stages() {
    let (fx, journal) = journaled();

    fx.anonymous()
        .list("User")
        .unwrap()
        .create(obj(json!({
            "name": "Ada",
            "posts": {"create": [{"title": "First"}]}
        })))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        journal.entries(),
        vec![
            "User.resolveInput",
            "User.name.resolveInput",
            "User.validateInput",
            "Post.resolveInput",
            "Post.title.resolveInput",
            "Post.validateInput",
            "Post.title.beforeOperation",
            "Post.beforeOperation",
            "Post.afterOperation persisted=true",
            "Post.title.afterOperation",
            "User.name.beforeOperation",
            "User.beforeOperation",
            "User.afterOperation persisted=true",
            "User.name.afterOperation",
            "User.name.resolveOutput",
        ]
    );
}

#[tokio::test]
async fn list_resolve_input_stages_are_threaded() {
    let schema = Schema::builder()
        .list(
            List::builder("Note")
                .field("body", Field::text())
                .resolve_input(|args| async move {
                    let mut data = args.resolved_data;
                    data.insert("body".into(), json!("first"));
                    Ok(data)
                })
                .resolve_input(|args| async move {
                    let mut data = args.resolved_data;
                    let body = data["body"].as_str().unwrap_or_default().to_owned();
                    data.insert("body".into(), json!(format!("{body}+second")));
                    Ok(data)
                }),
        )
        .build()
        .unwrap();
    let fx = Fixture::new(schema);

    let created = fx
        .anonymous()
        .list("Note")
        .unwrap()
        .create(obj(json!({"body": "raw"})))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(created["body"], json!("first+second"));
}

#[tokio::test]
async fn field_resolve_input_none_removes_the_key() {
    let schema = Schema::builder()
        .list(
            List::builder("Note")
                .field("body", Field::text())
                .field("draft", Field::text().resolve_input(|_| async { Ok(None) })),
        )
        .build()
        .unwrap();
    let fx = Fixture::new(schema);

    fx.anonymous()
        .list("Note")
        .unwrap()
        .create(obj(json!({"body": "b", "draft": "scratch"})))
        .await
        .unwrap()
        .unwrap();

    let call = &fx.db.calls_of("Note", CallKind::Create)[0];
    let data = call.data.as_ref().unwrap();
    assert!(data.scalars.contains_key("body"));
    assert!(!data.scalars.contains_key("draft"));
}

#[tokio::test]
async fn failing_before_stage_aborts_before_persistence() {
    let schema = Schema::builder()
        .list(
            List::builder("Note")
                .field("body", Field::text())
                .before_operation(|_| async { Err(anyhow!("quota exceeded")) }),
        )
        .build()
        .unwrap();
    let fx = Fixture::new(schema);

    let err = fx
        .anonymous()
        .list("Note")
        .unwrap()
        .create(obj(json!({"body": "b"})))
        .await
        .unwrap_err();

    match err {
        ListkitError::Hook {
            list, field, hook, ..
        } => {
            assert_eq!(list, "Note");
            assert_eq!(field, None);
            assert_eq!(hook, "beforeOperation");
        }
        other => panic!("expected a hook error, got {other:?}"),
    }
    assert!(fx.db.calls_of("Note", CallKind::Create).is_empty());
}

#[tokio::test]
async fn failing_field_after_stage_surfaces_after_the_write() {
    let schema = Schema::builder()
        .list(List::builder("Note").field(
            "body",
            Field::text().after_operation(|_| async { Err(anyhow!("webhook down")) }),
        ))
        .build()
        .unwrap();
    let fx = Fixture::new(schema);

    let err = fx
        .anonymous()
        .list("Note")
        .unwrap()
        .create(obj(json!({"body": "b"})))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ListkitError::Hook { ref field, hook: "afterOperation", .. } if field.as_deref() == Some("body")
    ));
    // No rollback: the row was written before the after stage ran.
    assert_eq!(fx.db.rows("Note").len(), 1);
}
