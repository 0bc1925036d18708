//! In-memory document store and its transactional adapter.
//!
//! Documents are JSON values grouped in named collections and keyed by id.
//! Sessions started by [`MemoryAdapter`] buffer their writes and apply them
//! atomically on commit. The store has no save points, so nested scopes reuse
//! the parent session.

use crate::error::{TransactionalError, TransactionalResult};
use crate::transactional::{TransactionOptions, TransactionalAdapter, generate_transaction_id};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

type Collection = BTreeMap<String, Value>;
type DocumentKey = (String, String);

/// Shared in-memory document store.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed documents in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        let collections = self.collections.read().await;
        collections.get(collection).map_or(0, BTreeMap::len)
    }

    /// Committed document, bypassing any session.
    pub async fn committed(&self, collection: &str, id: &str) -> Option<Value> {
        let collections = self.collections.read().await;
        collections.get(collection)?.get(id).cloned()
    }

    async fn apply(&self, writes: HashMap<DocumentKey, Option<Value>>) {
        let mut collections = self.collections.write().await;
        for ((collection, id), value) in writes {
            match value {
                Some(doc) => {
                    collections.entry(collection).or_default().insert(id, doc);
                }
                None => {
                    if let Some(docs) = collections.get_mut(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }
    }
}

#[derive(Default)]
struct SessionState {
    /// `None` marks a deletion.
    writes: HashMap<DocumentKey, Option<Value>>,
    finished: bool,
}

struct SessionTransaction {
    transaction_id: String,
    read_only: bool,
    state: Mutex<SessionState>,
}

/// Handle to the store, optionally bound to a transaction.
#[derive(Clone)]
pub struct DocumentSession {
    store: DocumentStore,
    transaction: Option<Arc<SessionTransaction>>,
}

impl DocumentSession {
    pub fn is_transactional(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction.as_deref().map(|tx| tx.transaction_id.as_str())
    }

    /// Insert or replace a document.
    pub async fn put(&self, collection: &str, id: &str, doc: Value) -> TransactionalResult<()> {
        self.write(collection, id, Some(doc)).await
    }

    /// Delete a document. Returns whether it existed.
    pub async fn delete(&self, collection: &str, id: &str) -> TransactionalResult<bool> {
        let existed = self.get(collection, id).await?.is_some();
        self.write(collection, id, None).await?;
        Ok(existed)
    }

    /// Read a document, seeing this session's uncommitted writes.
    pub async fn get(&self, collection: &str, id: &str) -> TransactionalResult<Option<Value>> {
        if let Some(tx) = &self.transaction {
            let state = tx.state.lock().await;
            if state.finished {
                return Err(TransactionalError::finished(&tx.transaction_id));
            }
            if let Some(pending) = state.writes.get(&(collection.to_string(), id.to_string())) {
                return Ok(pending.clone());
            }
        }
        Ok(self.store.committed(collection, id).await)
    }

    /// All documents of a collection ordered by id.
    pub async fn list(&self, collection: &str) -> TransactionalResult<Vec<(String, Value)>> {
        let mut docs: Collection = {
            let collections = self.store.collections.read().await;
            collections.get(collection).cloned().unwrap_or_default()
        };
        if let Some(tx) = &self.transaction {
            let state = tx.state.lock().await;
            if state.finished {
                return Err(TransactionalError::finished(&tx.transaction_id));
            }
            for ((coll, id), value) in &state.writes {
                if coll != collection {
                    continue;
                }
                match value {
                    Some(doc) => {
                        docs.insert(id.clone(), doc.clone());
                    }
                    None => {
                        docs.remove(id);
                    }
                }
            }
        }
        Ok(docs.into_iter().collect())
    }

    async fn write(
        &self,
        collection: &str,
        id: &str,
        value: Option<Value>,
    ) -> TransactionalResult<()> {
        let Some(tx) = &self.transaction else {
            let mut writes = HashMap::with_capacity(1);
            writes.insert((collection.to_string(), id.to_string()), value);
            self.store.apply(writes).await;
            return Ok(());
        };
        if tx.read_only {
            return Err(TransactionalError::read_only(format!(
                "write to {}/{}",
                collection, id
            )));
        }
        let mut state = tx.state.lock().await;
        if state.finished {
            return Err(TransactionalError::finished(&tx.transaction_id));
        }
        state
            .writes
            .insert((collection.to_string(), id.to_string()), value);
        Ok(())
    }
}

impl fmt::Debug for DocumentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSession")
            .field("transaction_id", &self.transaction_id())
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryTransactionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
}

impl MemoryTransactionOptions {
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }
}

impl TransactionOptions for MemoryTransactionOptions {
    fn merge(&self, overrides: &Self) -> Self {
        Self {
            read_only: overrides.read_only.or(self.read_only),
        }
    }
}

/// Transactional adapter over a [`DocumentStore`].
#[derive(Debug, Clone)]
pub struct MemoryAdapter {
    store: DocumentStore,
    defaults: MemoryTransactionOptions,
}

impl MemoryAdapter {
    pub fn new(store: DocumentStore) -> Self {
        Self {
            store,
            defaults: MemoryTransactionOptions::default(),
        }
    }

    pub fn with_default_options(mut self, defaults: MemoryTransactionOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }
}

impl TransactionalAdapter for MemoryAdapter {
    type Client = DocumentSession;
    type Options = MemoryTransactionOptions;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn default_options(&self) -> &Self::Options {
        &self.defaults
    }

    fn fallback_instance(&self) -> Self::Client {
        DocumentSession {
            store: self.store.clone(),
            transaction: None,
        }
    }

    fn wrap_with_transaction<T, E, F, Fut>(
        &self,
        options: Self::Options,
        work: F,
    ) -> impl Future<Output = Result<T, E>> + Send
    where
        F: FnOnce(Self::Client) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<TransactionalError> + fmt::Display + Send,
    {
        async move {
            let tx = Arc::new(SessionTransaction {
                transaction_id: generate_transaction_id(),
                read_only: options.read_only.unwrap_or(false),
                state: Mutex::new(SessionState::default()),
            });
            info!(
                transaction_id = %tx.transaction_id,
                backend = "memory",
                read_only = tx.read_only,
                "Transaction started"
            );

            let session = DocumentSession {
                store: self.store.clone(),
                transaction: Some(Arc::clone(&tx)),
            };
            let result = work(session).await;

            let mut state = tx.state.lock().await;
            state.finished = true;
            let writes = std::mem::take(&mut state.writes);
            drop(state);

            match result {
                Ok(value) => {
                    let count = writes.len();
                    self.store.apply(writes).await;
                    info!(
                        transaction_id = %tx.transaction_id,
                        writes = count,
                        "Transaction committed"
                    );
                    Ok(value)
                }
                Err(err) => {
                    debug!(
                        transaction_id = %tx.transaction_id,
                        discarded = writes.len(),
                        "Discarding buffered writes"
                    );
                    info!(
                        transaction_id = %tx.transaction_id,
                        error = %err,
                        "Transaction rolled back"
                    );
                    Err(err)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fallback_writes_immediately() {
        let adapter = MemoryAdapter::new(DocumentStore::new());
        let session = adapter.fallback_instance();
        assert!(!session.is_transactional());
        session.put("users", "1", json!({"name": "John"})).await.unwrap();
        assert_eq!(adapter.store().count("users").await, 1);
    }

    #[tokio::test]
    async fn test_commit_applies_buffered_writes() {
        let adapter = MemoryAdapter::new(DocumentStore::new());
        let store = adapter.store().clone();
        let result: TransactionalResult<()> = adapter
            .wrap_with_transaction(MemoryTransactionOptions::default(), |session| {
                let store = store.clone();
                async move {
                    session.put("users", "1", json!({"name": "John"})).await?;
                    assert_eq!(store.count("users").await, 0);
                    assert!(session.get("users", "1").await?.is_some());
                    Ok(())
                }
            })
            .await;
        result.unwrap();
        assert_eq!(store.committed("users", "1").await, Some(json!({"name": "John"})));
    }

    #[tokio::test]
    async fn test_error_discards_writes() {
        let adapter = MemoryAdapter::new(DocumentStore::new());
        let result: TransactionalResult<()> = adapter
            .wrap_with_transaction(MemoryTransactionOptions::default(), |session| async move {
                session.put("users", "2", json!({"name": "Nobody"})).await?;
                Err(TransactionalError::aborted("Rollback"))
            })
            .await;
        assert!(matches!(result, Err(TransactionalError::Aborted { .. })));
        assert_eq!(adapter.store().count("users").await, 0);
    }

    #[tokio::test]
    async fn test_read_only_rejects_writes() {
        let adapter = MemoryAdapter::new(DocumentStore::new());
        let options = MemoryTransactionOptions::default().read_only(true);
        let result: TransactionalResult<()> = adapter
            .wrap_with_transaction(options, |session| async move {
                session.put("users", "1", json!({})).await
            })
            .await;
        assert!(matches!(result, Err(TransactionalError::ReadOnly { .. })));
    }

    #[tokio::test]
    async fn test_delete_and_list_see_pending_writes() {
        let adapter = MemoryAdapter::new(DocumentStore::new());
        let fallback = adapter.fallback_instance();
        fallback.put("users", "a", json!(1)).await.unwrap();
        fallback.put("users", "b", json!(2)).await.unwrap();

        let listed: TransactionalResult<Vec<String>> = adapter
            .wrap_with_transaction(MemoryTransactionOptions::default(), |session| async move {
                assert!(session.delete("users", "a").await?);
                session.put("users", "c", json!(3)).await?;
                let ids = session.list("users").await?.into_iter().map(|(id, _)| id).collect();
                Ok(ids)
            })
            .await;
        assert_eq!(listed.unwrap(), vec!["b", "c"]);
        assert!(adapter.store().committed("users", "a").await.is_none());
    }

    #[tokio::test]
    async fn test_session_unusable_after_commit() {
        let adapter = MemoryAdapter::new(DocumentStore::new());
        let leaked: TransactionalResult<DocumentSession> = adapter
            .wrap_with_transaction(MemoryTransactionOptions::default(), |session| async move {
                Ok(session)
            })
            .await;
        let err = leaked.unwrap().get("users", "1").await.unwrap_err();
        assert!(matches!(err, TransactionalError::TransactionFinished { .. }));
    }

    #[test]
    fn test_options_merge() {
        let defaults = MemoryTransactionOptions::default().read_only(true);
        assert_eq!(defaults.merge(&MemoryTransactionOptions::default()).read_only, Some(true));
        assert_eq!(
            defaults.merge(&MemoryTransactionOptions::default().read_only(false)).read_only,
            Some(false)
        );
    }
}
