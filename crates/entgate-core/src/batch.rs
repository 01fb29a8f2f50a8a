//! The batch coalescer: many same-field lookups, one physical query.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::mem;

use entgate_ir::Value;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::query::EntityQuery;
use crate::viewer::WeakViewerContext;

/// Keys a [`KeyBatcher`] can batch on: hashable, cheap to clone, and
/// expressible as a store filter value.
pub trait BatchKey: Clone + Eq + Hash + Into<Value> + Send + Sync + 'static {}

impl<T> BatchKey for T where T: Clone + Eq + Hash + Into<Value> + Send + Sync + 'static {}

type GroupResult<E> = Result<Vec<E>>;

struct BatchState<K, E> {
    /// Keys enqueued since the last flush, one slot per occurrence. A key
    /// appearing twice holds two independent slots.
    pending: Vec<(K, oneshot::Sender<GroupResult<E>>)>,
    /// Last resolved result per key, kept for the life of the viewer
    /// context. Failures are memoized too: the same context would reach the
    /// same decision again.
    memo: HashMap<K, GroupResult<E>>,
}

/// Coalesces concurrent "entities where `field` = key" lookups into one
/// query per scheduling window, then fans grouped results back out.
///
/// Every load enqueues its key and suspends. The first key enqueued into an
/// empty pending batch makes that caller the flush leader: it yields to the
/// scheduler once so every other load issued in the same turn can enqueue,
/// then runs a single [`EntityQuery`] filtered by `field IN (pending keys)`
/// and resolves all slots. Callers never invoke batching explicitly; issuing
/// loads in the same turn is what coalesces them.
///
/// Access control is enforced by the [`EntityQuery`] each flush constructs,
/// so batched results are exactly what the viewer is allowed to see.
///
/// Obtain instances through
/// [`ViewerContext::batcher`](crate::ViewerContext::batcher); the registry
/// scopes them to one viewer context so results never leak across viewers.
pub struct KeyBatcher<E: Entity, K: BatchKey> {
    vc: WeakViewerContext,
    field: &'static str,
    key_of: Box<dyn Fn(&E) -> K + Send + Sync>,
    state: Mutex<BatchState<K, E>>,
}

impl<E: Entity, K: BatchKey> KeyBatcher<E, K> {
    pub(crate) fn new(
        vc: WeakViewerContext,
        field: &'static str,
        key_of: impl Fn(&E) -> K + Send + Sync + 'static,
    ) -> Self {
        Self {
            vc,
            field,
            key_of: Box::new(key_of),
            state: Mutex::new(BatchState {
                pending: Vec::new(),
                memo: HashMap::new(),
            }),
        }
    }

    /// The field this batcher filters on.
    pub fn field(&self) -> &'static str {
        self.field
    }

    /// Load the first entity whose field is `key`. One key, at most one
    /// entity: the shape used for id lookups.
    pub async fn load_one(&self, key: K) -> Result<Option<E>> {
        let group = self.load_group(key).await?;
        Ok(group.into_iter().next())
    }

    /// Load one entity for each key, preserving input order. Failures are
    /// isolated per key; one bad key never fails its siblings, though a
    /// failure of the flush query itself is shared by every key in it.
    pub async fn load_many(&self, keys: Vec<K>) -> Vec<Result<Option<E>>> {
        join_all(keys.into_iter().map(|key| self.load_one(key))).await
    }

    /// Load all entities whose field is `key`. One key, any number of
    /// entities: the shape used for one-to-many fan-out.
    pub async fn load_group(&self, key: K) -> Result<Vec<E>> {
        let (receiver, leads) = {
            let mut state = self.state.lock();
            if let Some(cached) = state.memo.get(&key) {
                return cached.clone();
            }
            let leads = state.pending.is_empty();
            let (sender, receiver) = oneshot::channel();
            state.pending.push((key.clone(), sender));
            (receiver, leads)
        };

        if leads {
            // One deferred flush per batch: yield so everything issued in
            // this scheduler turn lands in the same pending set.
            tokio::task::yield_now().await;
            self.flush().await;
        }

        receiver.await.unwrap_or(Err(Error::FlushAborted))
    }

    /// Load the group for each key, preserving input order.
    pub async fn load_groups(&self, keys: Vec<K>) -> Vec<Result<Vec<E>>> {
        join_all(keys.into_iter().map(|key| self.load_group(key))).await
    }

    async fn flush(&self) {
        let pending = mem::take(&mut self.state.lock().pending);
        if pending.is_empty() {
            return;
        }

        let mut keys: Vec<K> = Vec::new();
        let mut seen = HashSet::new();
        for (key, _) in &pending {
            if seen.insert(key.clone()) {
                keys.push(key.clone());
            }
        }
        tracing::debug!(
            entity = E::TYPE_NAME,
            field = self.field,
            distinct_keys = keys.len(),
            slots = pending.len(),
            "flushing batched load"
        );

        let outcome = self.run_query(&keys).await;
        let mut state = self.state.lock();
        match outcome {
            Ok(mut groups) => {
                for key in &keys {
                    let group = groups.remove(key).unwrap_or_default();
                    state.memo.insert(key.clone(), Ok(group));
                }
                for (key, sender) in pending {
                    let result = state
                        .memo
                        .get(&key)
                        .cloned()
                        .unwrap_or_else(|| Ok(Vec::new()));
                    let _ = sender.send(result);
                }
            }
            Err(err) => {
                for key in &keys {
                    state.memo.insert(key.clone(), Err(err.clone()));
                }
                for (_, sender) in pending {
                    let _ = sender.send(Err(err.clone()));
                }
            }
        }
    }

    async fn run_query(&self, keys: &[K]) -> Result<HashMap<K, Vec<E>>> {
        let vc = self.vc.upgrade().ok_or(Error::FlushAborted)?;
        let values: Vec<Value> = keys.iter().cloned().map(Into::into).collect();
        let entities = EntityQuery::<E>::new(&vc)?
            .where_in(self.field, values)
            .get_all()
            .await?;

        let mut groups: HashMap<K, Vec<E>> = HashMap::new();
        for entity in entities {
            groups.entry((self.key_of)(&entity)).or_default().push(entity);
        }
        Ok(groups)
    }
}
