#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Shared fixtures for the pipeline tests.

use std::sync::Arc;

use listkit_db::{Item, MemoryDatabase};
use listkit_security::Session;
use parking_lot::Mutex;
use serde_json::Value;

use crate::config::ListkitConfig;
use crate::context::{Context, Stack};
use crate::domain::access::AccessRule;
use crate::schema::{Field, FieldAccess, List, ListAccess, Schema};
use crate::storage::MemoryStorage;

/// `json!({...})` -> `Item`.
pub fn obj(value: Value) -> Item {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Records hook invocations in order.
#[derive(Clone, Default)]
pub struct HookJournal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl HookJournal {
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Every list-level stage, each recording `"<List>.<hook>"`.
    pub fn list_hooks(&self, list: List) -> List {
        let key = list.key.clone();
        let (j1, k1) = (self.clone(), key.clone());
        let (j2, k2) = (self.clone(), key.clone());
        let (j3, k3) = (self.clone(), key.clone());
        let (j4, k4) = (self.clone(), key);
        list.resolve_input(move |args| {
            j1.record(format!("{k1}.resolveInput"));
            async move { Ok(args.resolved_data) }
        })
        .validate_input(move |_| {
            j2.record(format!("{k2}.validateInput"));
            async { Ok(()) }
        })
        .before_operation(move |_| {
            j3.record(format!("{k3}.beforeOperation"));
            async { Ok(()) }
        })
        .after_operation(move |args| {
            let persisted = args
                .item
                .as_ref()
                .is_some_and(|item| item.contains_key("id"));
            j4.record(format!("{k4}.afterOperation persisted={persisted}"));
            async { Ok(()) }
        })
    }

    /// Every field-level stage, each recording `"<list>.<field>.<hook>"`.
    pub fn field_hooks(&self, list: &str, name: &str, field: Field) -> Field {
        let tag = format!("{list}.{name}");
        let (j1, t1) = (self.clone(), tag.clone());
        let (j2, t2) = (self.clone(), tag.clone());
        let (j3, t3) = (self.clone(), tag.clone());
        let (j4, t4) = (self.clone(), tag);
        field
            .resolve_input(move |args| {
                j1.record(format!("{t1}.resolveInput"));
                async move { Ok(args.value) }
            })
            .before_operation(move |_| {
                j2.record(format!("{t2}.beforeOperation"));
                async { Ok(()) }
            })
            .after_operation(move |_| {
                j3.record(format!("{t3}.afterOperation"));
                async { Ok(()) }
            })
            .resolve_output(move |args| {
                j4.record(format!("{t4}.resolveOutput"));
                async move { Ok(args.value) }
            })
    }
}

/// Schema, database and stack for one test.
pub struct Fixture {
    pub stack: Stack,
    pub db: MemoryDatabase,
    pub storage: MemoryStorage,
}

impl Fixture {
    pub fn new(schema: Schema) -> Self {
        Self::with_config(schema, ListkitConfig::default())
    }

    pub fn with_config(schema: Schema, config: ListkitConfig) -> Self {
        let db = MemoryDatabase::new(schema.topology());
        let storage = MemoryStorage::new();
        let stack = Stack::builder()
            .schema(schema)
            .database(Arc::new(db.clone()))
            .storage(Arc::new(storage.clone()))
            .config(config)
            .build()
            .unwrap();
        Self { stack, db, storage }
    }

    /// Anonymous context.
    pub fn anonymous(&self) -> Context {
        self.stack.context(None)
    }

    /// Context signed in as `subject`.
    pub fn signed_in(&self, subject: &str) -> Context {
        self.stack.context(Some(Session::for_subject(subject)))
    }
}

/// Allow only when the session's subject equals the item's `authorId`.
pub fn own_posts() -> AccessRule {
    AccessRule::filter_with(|args| {
        args.session()
            .map(|s| listkit_security::Filter::eq("authorId", s.subject_id()))
    })
}

/// `User` ↔ `Post` (one-to-many) and `Post` ↔ `Tag` (many-to-many).
pub struct Blog {
    pub user: ListAccess,
    pub post: ListAccess,
    pub tag: ListAccess,
    pub journal: Option<HookJournal>,
}

impl Default for Blog {
    fn default() -> Self {
        Self {
            user: ListAccess::default(),
            post: ListAccess::default(),
            tag: ListAccess::default(),
            journal: None,
        }
    }
}

impl Blog {
    pub fn schema(self) -> Schema {
        let journal = self.journal.clone();
        let field = |list: &str, name: &str, field: Field| match &journal {
            Some(j) => j.field_hooks(list, name, field),
            None => field,
        };
        let hooks = |list: List| match &journal {
            Some(j) => j.list_hooks(list),
            None => list,
        };

        let user = List::builder("User")
            .access(self.user)
            .field("name", field("User", "name", Field::text().required()))
            .field("email", Field::text().unique())
            .field("posts", Field::relationship("Post.author").many());
        let post = List::builder("Post")
            .access(self.post)
            .field("title", field("Post", "title", Field::text().required()))
            .field(
                "secret",
                Field::text().access(FieldAccess::new().read(false)),
            )
            .field(
                "status",
                Field::select(["draft", "published"]).default_value("draft"),
            )
            .field("author", Field::relationship("User.posts"))
            .field("tags", Field::relationship("Tag.posts").many());
        let tag = List::builder("Tag")
            .access(self.tag)
            .field("name", field("Tag", "name", Field::text().required()))
            .field("posts", Field::relationship("Post.tags").many());

        Schema::builder()
            .list(hooks(user))
            .list(hooks(post))
            .list(hooks(tag))
            .build()
            .unwrap()
    }
}
