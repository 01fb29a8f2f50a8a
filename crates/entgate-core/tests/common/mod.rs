#![allow(dead_code)]

//! Shared fixtures: an instrumented store and a small blog-style schema.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use entgate_core::ir::{ReadQuery, Row, WriteStatement};
use entgate_core::store::StoreResult;
use entgate_core::{
    Entity, EntityId, Error, MemoryStore, Persistence, Police, Result, Viewer, ViewerContext,
};

/// Wraps [`MemoryStore`] and counts physical reads and writes, so tests can
/// assert how many queries actually reached the store.
pub struct CountingStore {
    inner: MemoryStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Persistence for CountingStore {
    async fn execute_read(&self, query: &ReadQuery) -> StoreResult<Vec<Row>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.execute_read(query).await
    }

    async fn execute_write(&self, statement: &WriteStatement) -> StoreResult<Vec<Row>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.execute_write(statement).await
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn vc_for(viewer: Viewer, store: &Arc<CountingStore>) -> ViewerContext {
    ViewerContext::new(viewer, store.clone() as Arc<dyn Persistence>)
}

pub async fn insert(store: &dyn Persistence, entity: &str, row: Row) -> Row {
    store
        .execute_write(&WriteStatement::insert(entity, row))
        .await
        .expect("seed insert")
        .remove(0)
}

fn invalid(entity: &'static str, message: &str) -> Error {
    Error::InvalidRecord {
        entity,
        message: message.to_string(),
    }
}

/// Readable by everyone when published; writable by its author only.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub id: EntityId,
    pub author: String,
    pub title: String,
    pub published: bool,
}

impl Entity for Article {
    const TYPE_NAME: &'static str = "article";

    fn id(&self) -> EntityId {
        self.id
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.id().ok_or_else(|| invalid(Self::TYPE_NAME, "missing id"))?,
            author: row
                .get("author")
                .and_then(|v| v.as_str())
                .ok_or_else(|| invalid(Self::TYPE_NAME, "missing author"))?
                .to_string(),
            title: row
                .get("title")
                .and_then(|v| v.as_str())
                .ok_or_else(|| invalid(Self::TYPE_NAME, "missing title"))?
                .to_string(),
            published: row
                .get("published")
                .and_then(|v| v.as_bool())
                .ok_or_else(|| invalid(Self::TYPE_NAME, "missing published"))?,
        })
    }

    fn access_control_rules(police: Police<Self>) -> Police<Self> {
        police
            .on_read(|p| p.allow_with_restricted_view(|_vc, q| q.where_eq("published", true)))
            .on_create_update_delete(|p| {
                p.deny_if_unauthenticated()
                    .allow_with_restricted_view(|vc, q| {
                        let author = vc.viewer().subject().unwrap_or_default().to_string();
                        q.where_eq("author", author)
                    })
            })
    }
}

/// Wide open: everyone may read and write comments.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: EntityId,
    pub article_id: EntityId,
    pub body: String,
}

impl Entity for Comment {
    const TYPE_NAME: &'static str = "comment";

    fn id(&self) -> EntityId {
        self.id
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.id().ok_or_else(|| invalid(Self::TYPE_NAME, "missing id"))?,
            article_id: row
                .get("article_id")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| invalid(Self::TYPE_NAME, "missing article_id"))?,
            body: row
                .get("body")
                .and_then(|v| v.as_str())
                .ok_or_else(|| invalid(Self::TYPE_NAME, "missing body"))?
                .to_string(),
        })
    }

    fn access_control_rules(police: Police<Self>) -> Police<Self> {
        police.allow_all()
    }
}

/// Denied to everyone except omnipotent viewers.
#[derive(Debug, Clone, PartialEq)]
pub struct Vault {
    pub id: EntityId,
}

impl Entity for Vault {
    const TYPE_NAME: &'static str = "vault";

    fn id(&self) -> EntityId {
        self.id
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.id().ok_or_else(|| invalid(Self::TYPE_NAME, "missing id"))?,
        })
    }

    fn access_control_rules(police: Police<Self>) -> Police<Self> {
        police.deny_all("The vault is sealed.")
    }
}

/// A misconfigured entity whose rules never reach a decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub id: EntityId,
}

impl Entity for Draft {
    const TYPE_NAME: &'static str = "draft";

    fn id(&self) -> EntityId {
        self.id
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.id().ok_or_else(|| invalid(Self::TYPE_NAME, "missing id"))?,
        })
    }

    fn access_control_rules(police: Police<Self>) -> Police<Self> {
        // Deliberately incomplete: no step ever decides.
        police.allow_if(false)
    }
}

fn article_row(author: &str, title: &str, published: bool) -> Row {
    Row::new()
        .with_field("author", author)
        .with_field("title", title)
        .with_field("published", published)
}

/// Seeds five articles. Ids 1 and 3 are published; 2, 4, and 5 are not.
pub async fn seed_articles(store: &dyn Persistence) {
    insert(store, "article", article_row("alice", "Intro", true)).await;
    insert(store, "article", article_row("alice", "Draft notes", false)).await;
    insert(store, "article", article_row("bob", "Bob's post", true)).await;
    insert(store, "article", article_row("bob", "Bob's secret", false)).await;
    insert(store, "article", article_row("alice", "Hidden five", false)).await;
}

/// Seeds four comments: three on article 1, one on article 3.
pub async fn seed_comments(store: &dyn Persistence) {
    for (article_id, body) in [(1i64, "first"), (1, "second"), (1, "third"), (3, "lone")] {
        insert(
            store,
            "comment",
            Row::new()
                .with_field("article_id", article_id)
                .with_field("body", body),
        )
        .await;
    }
}
