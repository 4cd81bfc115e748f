use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::connection::Credentials;
use super::entity::{
    DocumentCreateEntity, DocumentCreateOptions, DocumentDeleteEntity, DocumentDeleteOptions,
    DocumentReplaceOptions, DocumentUpdateEntity, DocumentUpdateOptions,
};
use super::error::Result;

/// Named parameters of a query; `@@name` entries bind collections
pub type BindVars = Map<String, Value>;

/// Batched query results handed out by a driver
#[async_trait]
pub trait Cursor: Send {
    /// Next batch of rows, `None` once the cursor is exhausted
    async fn next_batch(&mut self) -> Result<Option<Vec<Value>>>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Core trait for a database session.
///
/// Implementations may report failures wrapped in
/// [`DatabaseError::Completion`](super::error::DatabaseError::Completion);
/// the executor unwraps one level before anything reaches a caller.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn insert_document(
        &self,
        collection: &str,
        document: Value,
        options: &DocumentCreateOptions,
    ) -> Result<DocumentCreateEntity>;

    /// `None` when no document is stored under `key`
    async fn get_document(&self, collection: &str, key: &str) -> Result<Option<Value>>;

    async fn update_document(
        &self,
        collection: &str,
        key: &str,
        patch: Value,
        options: &DocumentUpdateOptions,
    ) -> Result<DocumentUpdateEntity>;

    async fn replace_document(
        &self,
        collection: &str,
        key: &str,
        document: Value,
        options: &DocumentReplaceOptions,
    ) -> Result<DocumentUpdateEntity>;

    async fn delete_document(
        &self,
        collection: &str,
        key: &str,
        options: &DocumentDeleteOptions,
    ) -> Result<DocumentDeleteEntity>;

    async fn document_exists(&self, collection: &str, key: &str) -> Result<bool>;

    async fn query(&self, query: &str, bind_vars: &BindVars) -> Result<Box<dyn Cursor>>;

    async fn shutdown(&self) -> Result<()>;
}

/// Opens driver sessions for validated credentials
pub trait Connector: Send + Sync {
    fn open(&self, credentials: &Credentials) -> Result<Arc<dyn Driver>>;
}

/// Drain every remaining batch, then close the cursor.
///
/// The cursor is closed even when draining fails; the drain error wins.
pub async fn collect_remaining(mut cursor: Box<dyn Cursor>) -> Result<Vec<Value>> {
    let mut rows = Vec::new();
    let drained = loop {
        match cursor.next_batch().await {
            Ok(Some(batch)) => rows.extend(batch),
            Ok(None) => break Ok(()),
            Err(err) => break Err(err),
        }
    };
    let closed = cursor.close().await;
    drained.and(closed).map(|()| rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::error::DatabaseError;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ScriptedCursor {
        batches: VecDeque<Result<Option<Vec<Value>>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Cursor for ScriptedCursor {
        async fn next_batch(&mut self) -> Result<Option<Vec<Value>>> {
            self.batches.pop_front().unwrap_or(Ok(None))
        }

        async fn close(self: Box<Self>) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn cursor(batches: Vec<Result<Option<Vec<Value>>>>) -> (Box<dyn Cursor>, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        let cursor = ScriptedCursor {
            batches: batches.into(),
            closed: Arc::clone(&closed),
        };
        (Box::new(cursor), closed)
    }

    #[tokio::test]
    async fn test_collect_remaining_concatenates_batches() {
        let (cursor, closed) = cursor(vec![
            Ok(Some(vec![json!(1), json!(2)])),
            Ok(Some(vec![json!(3)])),
        ]);
        let rows = collect_remaining(cursor).await.unwrap();
        assert_eq!(rows, vec![json!(1), json!(2), json!(3)]);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_collect_remaining_closes_on_error() {
        let (cursor, closed) = cursor(vec![
            Ok(Some(vec![json!(1)])),
            Err(DatabaseError::Query("cursor expired".into())),
        ]);
        let err = collect_remaining(cursor).await.unwrap_err();
        assert_eq!(err, DatabaseError::Query("cursor expired".into()));
        assert!(closed.load(Ordering::SeqCst));
    }
}
