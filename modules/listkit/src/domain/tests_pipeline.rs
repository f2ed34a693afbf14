#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use listkit_db::{CallKind, CountArgs, FindManyArgs, PersistenceError};
use listkit_security::Filter;
use serde_json::json;
use tracing_test::traced_test;

use crate::config::{ListkitConfig, QueryConfig};
use crate::domain::access::{AccessOutcome, AccessRule};
use crate::error::ListkitError;
use crate::password::verify_password;
use crate::schema::{Field, FieldAccess, List, ListAccess, Schema};
use crate::test_support::{Blog, Fixture, HookJournal, obj, own_posts};

fn notes(list: List) -> Fixture {
    Fixture::new(Schema::builder().list(list).build().unwrap())
}

#[tokio::test]
async fn denied_operations_never_reach_persistence_or_hooks() {
    let journal = HookJournal::default();
    let fx = Fixture::new(
        Blog {
            post: ListAccess::all(false),
            journal: Some(journal.clone()),
            ..Blog::default()
        }
        .schema(),
    );
    fx.db.seed("Post", obj(json!({"id": "p1", "title": "Hidden"})));
    let posts = fx.anonymous().list("Post").unwrap();

    assert_eq!(posts.create(obj(json!({"title": "New"}))).await.unwrap(), None);
    assert_eq!(
        posts
            .update(Filter::id("p1"), obj(json!({"title": "Changed"})))
            .await
            .unwrap(),
        None
    );
    assert_eq!(posts.delete(Filter::id("p1")).await.unwrap(), None);
    assert_eq!(posts.find_unique(Filter::id("p1")).await.unwrap(), None);
    assert!(posts.find_many(FindManyArgs::default()).await.unwrap().is_empty());
    assert_eq!(posts.count(CountArgs::default()).await.unwrap(), 0);

    assert!(fx.db.calls().is_empty());
    assert!(journal.entries().is_empty());
    assert_eq!(fx.db.rows("Post")[0]["title"], json!("Hidden"));
}

#[tokio::test]
async fn sudo_bypasses_access_but_still_runs_hooks() {
    let journal = HookJournal::default();
    let fx = Fixture::new(
        Blog {
            post: ListAccess::all(false),
            journal: Some(journal.clone()),
            ..Blog::default()
        }
        .schema(),
    );
    let ctx = fx.anonymous().sudo();

    let created = ctx
        .list("Post")
        .unwrap()
        .create(obj(json!({"title": "Admin post", "secret": "s"})))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(created["title"], json!("Admin post"));
    // Field read access is bypassed too.
    assert_eq!(created["secret"], json!("s"));
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
async fn sudo_create_still_validates() {
    let fx = Fixture::new(
        Blog {
            post: ListAccess::all(false),
            ..Blog::default()
        }
        .schema(),
    );

    let err = fx
        .anonymous()
        .sudo()
        .list("Post")
        .unwrap()
        .create(obj(json!({})))
        .await
        .unwrap_err();

    let ListkitError::Validation(validation) = err else {
        panic!("expected a validation error, got {err:?}");
    };
    assert_eq!(validation.errors, vec!["Title is required"]);
    assert!(fx.db.calls_of("Post", CallKind::Create).is_empty());
}

#[tokio::test]
async fn create_denied_field_never_reaches_persistence() {
    let fx = notes(
        List::builder("Note")
            .field("body", Field::text())
            .field(
                "pinned",
                Field::checkbox().access(FieldAccess::new().create(false)),
            )
            // Reintroduces the field after the caller's value was replaced.
            .resolve_input(|args| async move {
                let mut data = args.resolved_data;
                data.insert("pinned".into(), json!(true));
                Ok(data)
            }),
    );

    fx.anonymous()
        .list("Note")
        .unwrap()
        .create(obj(json!({"body": "b", "pinned": true})))
        .await
        .unwrap()
        .unwrap();

    let calls = fx.db.calls_of("Note", CallKind::Create);
    let scalars = &calls[0].data.as_ref().unwrap().scalars;
    assert_eq!(scalars.get("body"), Some(&json!("b")));
    assert!(!scalars.contains_key("pinned"));
}

#[tokio::test]
async fn update_denied_field_is_dropped_but_others_are_written() {
    let fx = notes(
        List::builder("Note")
            .field("body", Field::text())
            .field(
                "owner",
                Field::text().access(FieldAccess::new().update(false)),
            ),
    );
    fx.db.seed("Note", obj(json!({"id": "n1", "body": "a", "owner": "u1"})));

    let updated = fx
        .anonymous()
        .list("Note")
        .unwrap()
        .update(Filter::id("n1"), obj(json!({"body": "b", "owner": "u2"})))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated["body"], json!("b"));
    assert_eq!(updated["owner"], json!("u1"));
}

#[tokio::test]
async fn validation_collects_every_violation_into_one_error() {
    let fx = notes(
        List::builder("Note")
            .field("title", Field::text().required())
            .field("count", Field::integer().min(1.0))
            .validate_input(|args| async move {
                if args.resolved_data.get("count") == Some(&json!(0)) {
                    args.add_validation_error("Zero is not allowed here");
                }
                Ok(())
            }),
    );

    let err = fx
        .anonymous()
        .list("Note")
        .unwrap()
        .create(obj(json!({"count": 0})))
        .await
        .unwrap_err();

    let ListkitError::Validation(validation) = err else {
        panic!("expected a validation error, got {err:?}");
    };
    assert_eq!(
        validation.errors,
        vec![
            "Zero is not allowed here",
            "Title is required",
            "Count must be at least 1",
        ]
    );
    assert_eq!(validation.field_errors["title"], "Title is required");
    assert_eq!(validation.field_errors["count"], "Count must be at least 1");
    assert!(fx.db.calls().is_empty());
}

#[tokio::test]
async fn missing_required_title_is_reported() {
    let fx = notes(
        List::builder("Post")
            .access(ListAccess::new().create(AccessRule::when(|_| true)))
            .field("title", Field::text().required()),
    );

    let err = fx
        .anonymous()
        .list("Post")
        .unwrap()
        .create(obj(json!({})))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Title is required"));
}

#[tokio::test]
async fn query_denied_returns_empty_without_a_find_many_call() {
    let fx = Fixture::new(
        Blog {
            post: ListAccess::new().query(AccessRule::when(|_| false)),
            ..Blog::default()
        }
        .schema(),
    );
    fx.db.seed("Post", obj(json!({"title": "x"})));

    let items = fx
        .anonymous()
        .list("Post")
        .unwrap()
        .find_many(FindManyArgs::default())
        .await
        .unwrap();

    assert!(items.is_empty());
    assert!(fx.db.calls_of("Post", CallKind::FindMany).is_empty());
}

#[tokio::test]
async fn filter_access_is_merged_into_the_callers_where() {
    let fx = Fixture::new(
        Blog {
            post: ListAccess::new().query(own_posts()),
            ..Blog::default()
        }
        .schema(),
    );
    fx.db.seed("Post", obj(json!({"title": "mine", "status": "draft", "authorId": "u1"})));
    fx.db.seed("Post", obj(json!({"title": "mine too", "status": "published", "authorId": "u1"})));
    fx.db.seed("Post", obj(json!({"title": "theirs", "status": "draft", "authorId": "u2"})));
    let posts = fx.signed_in("u1").list("Post").unwrap();

    let drafts = posts
        .find_many(FindManyArgs::filtered(Filter::eq("status", "draft")))
        .await
        .unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0]["title"], json!("mine"));

    let count = posts.count(CountArgs::default()).await.unwrap();
    assert_eq!(count, 2);

    let anonymous = fx.anonymous().list("Post").unwrap();
    assert!(anonymous.find_many(FindManyArgs::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn find_unique_outside_the_filter_looks_like_not_found() {
    let fx = Fixture::new(
        Blog {
            post: ListAccess::new().query(own_posts()),
            ..Blog::default()
        }
        .schema(),
    );
    fx.db.seed("Post", obj(json!({"id": "p1", "title": "theirs", "authorId": "u2"})));

    let found = fx
        .signed_in("u1")
        .list("Post")
        .unwrap()
        .find_unique(Filter::id("p1"))
        .await
        .unwrap();

    assert_eq!(found, None);
    assert!(fx.db.calls_of("Post", CallKind::FindUnique).is_empty());
    assert_eq!(fx.db.calls_of("Post", CallKind::FindFirst).len(), 1);
}

#[tokio::test]
async fn update_outside_the_filter_is_silently_ignored() {
    let fx = Fixture::new(
        Blog {
            post: ListAccess::new().update(own_posts()).delete(own_posts()),
            ..Blog::default()
        }
        .schema(),
    );
    fx.db.seed("Post", obj(json!({"id": "p1", "title": "theirs", "authorId": "u2"})));
    let posts = fx.signed_in("u1").list("Post").unwrap();

    let updated = posts
        .update(Filter::id("p1"), obj(json!({"title": "hijacked"})))
        .await
        .unwrap();
    let deleted = posts.delete(Filter::id("p1")).await.unwrap();

    assert_eq!(updated, None);
    assert_eq!(deleted, None);
    assert!(fx.db.calls_of("Post", CallKind::Update).is_empty());
    assert!(fx.db.calls_of("Post", CallKind::Delete).is_empty());
    assert_eq!(fx.db.rows("Post")[0]["title"], json!("theirs"));
}

#[tokio::test]
async fn update_and_delete_rules_see_the_target_item() {
    let fx = Fixture::new(
        Blog {
            post: ListAccess::new()
                .update(AccessRule::when(|args| {
                    args.item.as_ref().is_some_and(|i| i["title"] == json!("Mine"))
                }))
                .delete(AccessRule::when(|args| {
                    let author = args.item.as_ref().and_then(|i| i["authorId"].as_str());
                    author.is_some() && author == args.session().map(|s| s.subject_id())
                })),
            ..Blog::default()
        }
        .schema(),
    );
    fx.db.seed("Post", obj(json!({"id": "p1", "title": "Mine", "authorId": "u1"})));
    fx.db.seed("Post", obj(json!({"id": "p2", "title": "Theirs", "authorId": "u2"})));
    let posts = fx.signed_in("u1").list("Post").unwrap();

    let updated = posts
        .update(Filter::id("p1"), obj(json!({"status": "published"})))
        .await
        .unwrap()
        .unwrap();
    let refused = posts
        .update(Filter::id("p2"), obj(json!({"status": "published"})))
        .await
        .unwrap();
    assert_eq!(updated["status"], json!("published"));
    assert_eq!(refused, None);

    assert_eq!(posts.delete(Filter::id("p2")).await.unwrap(), None);
    let deleted = posts.delete(Filter::id("p1")).await.unwrap().unwrap();
    assert_eq!(deleted["id"], json!("p1"));

    assert_eq!(fx.db.calls_of("Post", CallKind::Update).len(), 1);
    assert_eq!(fx.db.calls_of("Post", CallKind::Delete).len(), 1);
    let rows = fx.db.rows("Post");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], json!("p2"));
}

#[tokio::test]
async fn update_of_a_missing_item_never_asks_the_rule() {
    let asked = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&asked);
    let fx = Fixture::new(
        Blog {
            post: ListAccess::new().update(AccessRule::when(move |_| {
                seen.store(true, Ordering::SeqCst);
                true
            })),
            ..Blog::default()
        }
        .schema(),
    );

    let updated = fx
        .anonymous()
        .list("Post")
        .unwrap()
        .update(Filter::id("nope"), obj(json!({"title": "x"})))
        .await
        .unwrap();

    assert_eq!(updated, None);
    assert!(!asked.load(Ordering::SeqCst));
    assert!(fx.db.calls_of("Post", CallKind::Update).is_empty());
}

#[tokio::test]
async fn update_inside_the_filter_is_applied() {
    let fx = Fixture::new(
        Blog {
            post: ListAccess::new().update(own_posts()),
            ..Blog::default()
        }
        .schema(),
    );
    fx.db.seed("Post", obj(json!({"id": "p1", "title": "draft", "authorId": "u1"})));

    let updated = fx
        .signed_in("u1")
        .list("Post")
        .unwrap()
        .update(Filter::id("p1"), obj(json!({"title": "final"})))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated["title"], json!("final"));
    assert_eq!(updated["authorId"], json!("u1"));
}

#[tokio::test]
#[traced_test]
async fn filter_valued_create_access_fails_closed() {
    let fx = Fixture::new(
        Blog {
            post: ListAccess::new().create(own_posts()),
            ..Blog::default()
        }
        .schema(),
    );

    let created = fx
        .signed_in("u1")
        .list("Post")
        .unwrap()
        .create(obj(json!({"title": "x"})))
        .await
        .unwrap();

    assert_eq!(created, None);
    assert!(fx.db.calls().is_empty());
    assert!(logs_contain("filter-valued create access treated as deny"));
}

#[tokio::test]
async fn access_predicates_see_the_session_and_payload() {
    let fx = notes(
        List::builder("Note")
            .access(ListAccess::new().create(AccessRule::from_fn(|args| async move {
                let admin = args.session().is_some_and(|s| s.has_claim("role", "admin"));
                let public = args
                    .input_data
                    .as_ref()
                    .is_some_and(|d| d.get("public") == Some(&json!(true)));
                Ok(AccessOutcome::from(admin || !public))
            })))
            .field("body", Field::text())
            .field("public", Field::checkbox()),
    );
    let admin = listkit_security::Session::builder("a1")
        .claim("role", "admin")
        .build();

    let user = fx.signed_in("u1").list("Note").unwrap();
    assert!(user.create(obj(json!({"body": "a"}))).await.unwrap().is_some());
    assert!(
        user.create(obj(json!({"body": "b", "public": true})))
            .await
            .unwrap()
            .is_none()
    );
    let admin = fx.stack.context(Some(admin)).list("Note").unwrap();
    assert!(
        admin
            .create(obj(json!({"body": "c", "public": true})))
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn failing_access_predicate_is_an_error_not_a_denial() {
    let fx = notes(
        List::builder("Note")
            .access(ListAccess::new().query(AccessRule::from_fn(|_| async {
                Err(anyhow!("directory unavailable"))
            })))
            .field("body", Field::text()),
    );

    let err = fx
        .anonymous()
        .list("Note")
        .unwrap()
        .find_many(FindManyArgs::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ListkitError::AccessRule { ref list, field: None, .. } if list == "Note"));
}

#[tokio::test]
async fn unknown_payload_keys_are_rejected() {
    let fx = Fixture::new(Blog::default().schema());

    let err = fx
        .anonymous()
        .list("Post")
        .unwrap()
        .create(obj(json!({"title": "x", "subtitle": "y"})))
        .await
        .unwrap_err();

    assert!(
        matches!(err, ListkitError::UnknownField { ref list, ref field } if list == "Post" && field == "subtitle")
    );
    assert!(fx.db.calls().is_empty());
}

#[tokio::test]
async fn unknown_list_is_rejected() {
    let fx = Fixture::new(Blog::default().schema());

    let err = fx.anonymous().list("Comment").unwrap_err();

    assert!(matches!(err, ListkitError::UnknownList(ref key) if key == "Comment"));
}

#[tokio::test]
async fn system_fields_in_the_payload_are_stripped_and_defaults_applied() {
    let fx = Fixture::new(Blog::default().schema());

    let created = fx
        .anonymous()
        .list("Post")
        .unwrap()
        .create(obj(json!({"id": "forced", "title": "x"})))
        .await
        .unwrap()
        .unwrap();

    assert_ne!(created["id"], json!("forced"));
    assert_eq!(created["status"], json!("draft"));
    let calls = fx.db.calls_of("Post", CallKind::Create);
    assert!(!calls[0].data.as_ref().unwrap().scalars.contains_key("id"));
}

#[tokio::test]
async fn unique_violation_surfaces_as_persistence_error() {
    let fx = Fixture::new(Blog::default().schema());
    fx.db.seed("User", obj(json!({"name": "Ada", "email": "ada@example.com"})));

    let err = fx
        .anonymous()
        .list("User")
        .unwrap()
        .create(obj(json!({"name": "Imposter", "email": "ada@example.com"})))
        .await
        .unwrap_err();

    let ListkitError::Persistence(err) = err else {
        panic!("expected a persistence error, got {err:?}");
    };
    assert_eq!(
        err,
        PersistenceError::UniqueConstraint {
            fields: vec!["email".into()]
        }
    );
    assert_eq!(err.friendly_message(), "A record with this email already exists");
}

#[tokio::test]
async fn passwords_are_hashed_before_persistence() {
    let fx = notes(
        List::builder("Account")
            .field("login", Field::text().required())
            .field("password", Field::password().length(Some(8), None)),
    );
    let accounts = fx.anonymous().list("Account").unwrap();

    let short = accounts
        .create(obj(json!({"login": "a", "password": "short"})))
        .await
        .unwrap_err();
    assert!(short.to_string().contains("Password must be at least 8 characters"));

    accounts
        .create(obj(json!({"login": "a", "password": "correct horse"})))
        .await
        .unwrap()
        .unwrap();

    let stored = fx.db.rows("Account")[0]["password"]
        .as_str()
        .unwrap()
        .to_owned();
    assert_ne!(stored, "correct horse");
    assert!(verify_password(&stored, "correct horse"));
    assert!(!verify_password(&stored, "wrong horse"));
}

#[tokio::test]
async fn find_many_take_is_clamped_by_config() {
    let config = ListkitConfig {
        query: QueryConfig {
            default_take: Some(2),
            max_take: Some(3),
        },
        ..ListkitConfig::default()
    };
    let fx = Fixture::with_config(Blog::default().schema(), config);
    for i in 0..5 {
        fx.db.seed("Post", obj(json!({"title": format!("p{i}")})));
    }
    let posts = fx.anonymous().list("Post").unwrap();

    assert_eq!(posts.find_many(FindManyArgs::default()).await.unwrap().len(), 2);
    assert_eq!(
        posts
            .find_many(FindManyArgs::default().take(10))
            .await
            .unwrap()
            .len(),
        3
    );
}
