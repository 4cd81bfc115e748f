//! In-process driver implementation
//!
//! Keeps documents as JSON objects in memory. Failures are reported wrapped
//! in `DatabaseError::Completion`, the way asynchronous network drivers
//! surface them.

mod query;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::db::connection::Credentials;
use crate::db::driver::{BindVars, Connector, Cursor, Driver};
use crate::db::entity::{
    DocumentCreateEntity, DocumentCreateOptions, DocumentDeleteEntity, DocumentDeleteOptions,
    DocumentMeta, DocumentReplaceOptions, DocumentUpdateEntity, DocumentUpdateOptions,
    OverwriteMode,
};
use crate::db::error::{DatabaseError, Result};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

const KEY: &str = "_key";
const ID: &str = "_id";
const REV: &str = "_rev";

fn is_system_attribute(name: &str) -> bool {
    matches!(name, KEY | ID | REV)
}

/// Opens [`MemoryDriver`] sessions; sessions for the same database name
/// share their documents.
#[derive(Clone)]
pub struct MemoryConnector {
    databases: Arc<Mutex<HashMap<String, Arc<MemoryStore>>>>,
    batch_size: usize,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self {
            databases: Arc::new(Mutex::new(HashMap::new())),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Rows per cursor batch; values below one are raised to one
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for MemoryConnector {
    fn open(&self, credentials: &Credentials) -> Result<Arc<dyn Driver>> {
        let store = Arc::clone(
            self.databases
                .lock()
                .entry(credentials.database_name().to_string())
                .or_default(),
        );
        debug!(database = credentials.database_name(), "opened in-memory session");
        Ok(Arc::new(MemoryDriver {
            store,
            batch_size: self.batch_size,
            closed: AtomicBool::new(false),
        }))
    }
}

#[derive(Default)]
struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
    revision: AtomicU64,
}

impl MemoryStore {
    fn next_rev(&self) -> String {
        (self.revision.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    fn insert(
        &self,
        collection: &str,
        document: Value,
        options: &DocumentCreateOptions,
    ) -> Result<DocumentCreateEntity> {
        let mut body = into_object(document)?;
        let key = match body.get(KEY) {
            Some(Value::String(key)) if !key.trim().is_empty() => key.clone(),
            Some(_) => return Err(DatabaseError::Failed("illegal document key".into())),
            None => uuid::Uuid::new_v4().simple().to_string(),
        };
        let id = format!("{collection}/{key}");

        let mut collections = self.collections.write();
        let documents = collections.entry(collection.to_string()).or_default();

        let old = match (documents.get(&key), options.overwrite_mode) {
            (None, _) => None,
            (Some(_), None | Some(OverwriteMode::Conflict)) => {
                return Err(DatabaseError::Conflict(id));
            }
            (Some(existing), Some(OverwriteMode::Ignore)) => {
                return Ok(DocumentCreateEntity {
                    meta: meta_of(existing)?,
                    new: options.return_new.then(|| existing.clone()),
                    old: None,
                });
            }
            (Some(existing), Some(OverwriteMode::Replace)) => Some(existing.clone()),
            (Some(existing), Some(OverwriteMode::Update)) => {
                let mut merged = into_object(existing.clone())?;
                merge(&mut merged, body, true, true);
                body = merged;
                Some(existing.clone())
            }
        };

        let meta = DocumentMeta {
            id,
            key,
            rev: self.next_rev(),
        };
        let stored = stamp(body, &meta);
        documents.insert(meta.key.clone(), stored.clone());

        Ok(DocumentCreateEntity {
            meta,
            new: options.return_new.then_some(stored),
            old: old.filter(|_| options.return_old),
        })
    }

    fn get(&self, collection: &str, key: &str) -> Option<Value> {
        self.collections
            .read()
            .get(collection)
            .and_then(|documents| documents.get(key))
            .cloned()
    }

    fn exists(&self, collection: &str, key: &str) -> bool {
        self.collections
            .read()
            .get(collection)
            .is_some_and(|documents| documents.contains_key(key))
    }

    /// Shared path of update and replace: check the revision, build the new
    /// body from the stored one, store it under a fresh revision.
    fn rewrite<B>(
        &self,
        collection: &str,
        key: &str,
        if_match: Option<&str>,
        (return_new, return_old): (bool, bool),
        build: B,
    ) -> Result<DocumentUpdateEntity>
    where
        B: FnOnce(Map<String, Value>) -> Result<Map<String, Value>>,
    {
        let id = format!("{collection}/{key}");
        let mut collections = self.collections.write();
        let existing = collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(key))
            .ok_or_else(|| DatabaseError::NotFound(id.clone()))?;

        let old_rev = rev_of(existing)?;
        check_revision(&id, &old_rev, if_match)?;

        let body = build(into_object(existing.clone())?)?;
        let meta = DocumentMeta {
            id,
            key: key.to_string(),
            rev: self.next_rev(),
        };
        let stored = stamp(body, &meta);
        let old = std::mem::replace(existing, stored.clone());

        Ok(DocumentUpdateEntity {
            meta,
            old_rev,
            new: return_new.then_some(stored),
            old: return_old.then_some(old),
        })
    }

    fn delete(
        &self,
        collection: &str,
        key: &str,
        options: &DocumentDeleteOptions,
    ) -> Result<DocumentDeleteEntity> {
        let id = format!("{collection}/{key}");
        let mut collections = self.collections.write();
        let documents = collections
            .get_mut(collection)
            .ok_or_else(|| DatabaseError::NotFound(id.clone()))?;
        let existing = documents
            .get(key)
            .ok_or_else(|| DatabaseError::NotFound(id.clone()))?;
        check_revision(&id, &rev_of(existing)?, options.if_match.as_deref())?;

        let old = documents
            .remove(key)
            .ok_or_else(|| DatabaseError::NotFound(id.clone()))?;
        Ok(DocumentDeleteEntity {
            meta: meta_of(&old)?,
            old: options.return_old.then_some(old),
        })
    }

    fn scan(&self, plan: &query::QueryPlan) -> Vec<Value> {
        let collections = self.collections.read();
        let Some(documents) = collections.get(&plan.collection) else {
            return Vec::new();
        };
        documents
            .values()
            .filter(|doc| plan.filter.as_ref().map_or(true, |f| f.matches(doc)))
            .take(plan.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

fn into_object(document: Value) -> Result<Map<String, Value>> {
    match document {
        Value::Object(body) => Ok(body),
        _ => Err(DatabaseError::Failed("document must be a JSON object".into())),
    }
}

fn stamp(mut body: Map<String, Value>, meta: &DocumentMeta) -> Value {
    body.insert(KEY.into(), Value::String(meta.key.clone()));
    body.insert(ID.into(), Value::String(meta.id.clone()));
    body.insert(REV.into(), Value::String(meta.rev.clone()));
    Value::Object(body)
}

fn rev_of(document: &Value) -> Result<String> {
    document
        .get(REV)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DatabaseError::Failed("stored document has no revision".into()))
}

fn meta_of(document: &Value) -> Result<DocumentMeta> {
    serde_json::from_value(document.clone()).map_err(DatabaseError::from)
}

fn check_revision(id: &str, current: &str, if_match: Option<&str>) -> Result<()> {
    match if_match {
        Some(expected) if expected != current => Err(DatabaseError::PreconditionFailed(format!(
            "{id} is at revision {current}, expected {expected}"
        ))),
        _ => Ok(()),
    }
}

/// Apply `patch` onto `target`, skipping system attributes.
fn merge(
    target: &mut Map<String, Value>,
    patch: Map<String, Value>,
    keep_null: bool,
    merge_objects: bool,
) {
    for (name, value) in patch {
        if is_system_attribute(&name) {
            continue;
        }
        if value.is_null() && !keep_null {
            target.remove(&name);
            continue;
        }
        let value = match (target.get_mut(&name), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) if merge_objects => {
                merge(existing, nested, keep_null, merge_objects);
                continue;
            }
            (_, value) => value,
        };
        target.insert(name, value);
    }
}

/// A session against one in-memory database
pub struct MemoryDriver {
    store: Arc<MemoryStore>,
    batch_size: usize,
    closed: AtomicBool,
}

impl MemoryDriver {
    fn run<T>(&self, operation: impl FnOnce(&MemoryStore) -> Result<T>) -> Result<T> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DatabaseError::completion(DatabaseError::Failed(
                "driver is shut down".into(),
            )));
        }
        operation(&self.store).map_err(DatabaseError::completion)
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn insert_document(
        &self,
        collection: &str,
        document: Value,
        options: &DocumentCreateOptions,
    ) -> Result<DocumentCreateEntity> {
        self.run(|store| store.insert(collection, document, options))
    }

    async fn get_document(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        self.run(|store| Ok(store.get(collection, key)))
    }

    async fn update_document(
        &self,
        collection: &str,
        key: &str,
        patch: Value,
        options: &DocumentUpdateOptions,
    ) -> Result<DocumentUpdateEntity> {
        self.run(|store| {
            let patch = into_object(patch)?;
            store.rewrite(
                collection,
                key,
                options.if_match.as_deref(),
                (options.return_new, options.return_old),
                |mut body| {
                    merge(&mut body, patch, options.keep_null, options.merge_objects);
                    Ok(body)
                },
            )
        })
    }

    async fn replace_document(
        &self,
        collection: &str,
        key: &str,
        document: Value,
        options: &DocumentReplaceOptions,
    ) -> Result<DocumentUpdateEntity> {
        self.run(|store| {
            let mut replacement = into_object(document)?;
            replacement.retain(|name, _| !is_system_attribute(name));
            store.rewrite(
                collection,
                key,
                options.if_match.as_deref(),
                (options.return_new, options.return_old),
                |_| Ok(replacement),
            )
        })
    }

    async fn delete_document(
        &self,
        collection: &str,
        key: &str,
        options: &DocumentDeleteOptions,
    ) -> Result<DocumentDeleteEntity> {
        self.run(|store| store.delete(collection, key, options))
    }

    async fn document_exists(&self, collection: &str, key: &str) -> Result<bool> {
        self.run(|store| Ok(store.exists(collection, key)))
    }

    async fn query(&self, query: &str, bind_vars: &BindVars) -> Result<Box<dyn Cursor>> {
        let rows = self.run(|store| {
            let plan = query::parse(query, bind_vars)?;
            Ok(store.scan(&plan))
        })?;
        let batches = rows
            .chunks(self.batch_size)
            .map(<[Value]>::to_vec)
            .collect();
        Ok(Box::new(MemoryCursor { batches }))
    }

    async fn shutdown(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

struct MemoryCursor {
    batches: VecDeque<Vec<Value>>,
}

#[async_trait]
impl Cursor for MemoryCursor {
    async fn next_batch(&mut self) -> Result<Option<Vec<Value>>> {
        Ok(self.batches.pop_front())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::driver::collect_remaining;
    use serde_json::json;

    fn driver() -> Arc<dyn Driver> {
        let credentials = Credentials::new("localhost", 8529, "root", "", "test").unwrap();
        MemoryConnector::new().with_batch_size(2).open(&credentials).unwrap()
    }

    fn cause(err: DatabaseError) -> DatabaseError {
        err.take_completion_cause().expect("failures are completion-wrapped")
    }

    #[tokio::test]
    async fn test_insert_generates_key_and_stamps_meta() {
        let driver = driver();
        let options = DocumentCreateOptions {
            return_new: true,
            ..Default::default()
        };
        let created = driver
            .insert_document("users", json!({"name": "ada"}), &options)
            .await
            .unwrap();
        assert_eq!(created.meta.id, format!("users/{}", created.meta.key));
        let new = created.new.unwrap();
        assert_eq!(new["name"], "ada");
        assert_eq!(new[REV], Value::String(created.meta.rev.clone()));
        assert!(created.old.is_none());
    }

    #[tokio::test]
    async fn test_insert_conflict_and_overwrite_modes() {
        let driver = driver();
        let doc = json!({"_key": "k", "n": 1, "nested": {"a": 1}});
        driver.insert_document("c", doc.clone(), &Default::default()).await.unwrap();

        let err = driver.insert_document("c", doc.clone(), &Default::default()).await.unwrap_err();
        assert_eq!(cause(err), DatabaseError::Conflict("c/k".into()));

        let ignore = DocumentCreateOptions {
            overwrite_mode: Some(OverwriteMode::Ignore),
            ..Default::default()
        };
        driver.insert_document("c", json!({"_key": "k", "n": 2}), &ignore).await.unwrap();
        assert_eq!(driver.get_document("c", "k").await.unwrap().unwrap()["n"], 1);

        let update = DocumentCreateOptions {
            overwrite_mode: Some(OverwriteMode::Update),
            return_old: true,
            ..Default::default()
        };
        let updated = driver
            .insert_document("c", json!({"_key": "k", "nested": {"b": 2}}), &update)
            .await
            .unwrap();
        assert_eq!(updated.old.unwrap()["n"], 1);
        let stored = driver.get_document("c", "k").await.unwrap().unwrap();
        assert_eq!(stored["nested"], json!({"a": 1, "b": 2}));
        assert_eq!(stored["n"], 1);

        let replace = DocumentCreateOptions {
            overwrite_mode: Some(OverwriteMode::Replace),
            ..Default::default()
        };
        driver.insert_document("c", json!({"_key": "k", "z": true}), &replace).await.unwrap();
        let stored = driver.get_document("c", "k").await.unwrap().unwrap();
        assert!(stored.get("n").is_none());
        assert_eq!(stored["z"], true);
    }

    #[tokio::test]
    async fn test_insert_rejects_non_objects() {
        let err = driver()
            .insert_document("c", json!([1, 2]), &Default::default())
            .await
            .unwrap_err();
        assert!(matches!(cause(err), DatabaseError::Failed(_)));
    }

    #[tokio::test]
    async fn test_update_merges_and_honours_keep_null() {
        let driver = driver();
        driver
            .insert_document(
                "c",
                json!({"_key": "k", "a": 1, "b": 2, "o": {"x": 1}}),
                &Default::default(),
            )
            .await
            .unwrap();

        let options = DocumentUpdateOptions {
            keep_null: false,
            return_new: true,
            ..Default::default()
        };
        let updated = driver
            .update_document("c", "k", json!({"b": null, "o": {"y": 2}, "_key": "other"}), &options)
            .await
            .unwrap();
        let new = updated.new.unwrap();
        assert_eq!(new["a"], 1);
        assert!(new.get("b").is_none());
        assert_eq!(new["o"], json!({"x": 1, "y": 2}));
        assert_eq!(new[KEY], "k");
        assert_ne!(updated.old_rev, updated.meta.rev);
    }

    #[tokio::test]
    async fn test_revision_preconditions() {
        let driver = driver();
        let created = driver
            .insert_document("c", json!({"_key": "k"}), &Default::default())
            .await
            .unwrap();

        let stale = DocumentReplaceOptions {
            if_match: Some("stale".into()),
            ..Default::default()
        };
        let err = driver.replace_document("c", "k", json!({"v": 1}), &stale).await.unwrap_err();
        assert!(matches!(cause(err), DatabaseError::PreconditionFailed(_)));

        let current = DocumentReplaceOptions {
            if_match: Some(created.meta.rev.clone()),
            return_old: true,
            ..Default::default()
        };
        let replaced = driver.replace_document("c", "k", json!({"v": 1}), &current).await.unwrap();
        assert_eq!(replaced.old_rev, created.meta.rev);

        let delete = DocumentDeleteOptions {
            if_match: Some(created.meta.rev),
            ..Default::default()
        };
        let err = driver.delete_document("c", "k", &delete).await.unwrap_err();
        assert!(matches!(cause(err), DatabaseError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn test_missing_documents() {
        let driver = driver();
        assert_eq!(driver.get_document("c", "nope").await.unwrap(), None);
        assert!(!driver.document_exists("c", "nope").await.unwrap());
        let err = driver
            .update_document("c", "nope", json!({}), &Default::default())
            .await
            .unwrap_err();
        assert_eq!(cause(err), DatabaseError::NotFound("c/nope".into()));
        let err = driver.delete_document("c", "nope", &Default::default()).await.unwrap_err();
        assert_eq!(cause(err), DatabaseError::NotFound("c/nope".into()));
    }

    #[tokio::test]
    async fn test_delete_returns_old_when_asked() {
        let driver = driver();
        driver
            .insert_document("c", json!({"_key": "k", "v": 3}), &Default::default())
            .await
            .unwrap();
        let options = DocumentDeleteOptions {
            return_old: true,
            ..Default::default()
        };
        let deleted = driver.delete_document("c", "k", &options).await.unwrap();
        assert_eq!(deleted.meta.key, "k");
        assert_eq!(deleted.old.unwrap()["v"], 3);
        assert!(!driver.document_exists("c", "k").await.unwrap());
    }

    #[tokio::test]
    async fn test_query_batches_and_filters() {
        let driver = driver();
        for (key, city) in [("a", "Oslo"), ("b", "Rome"), ("c", "Oslo"), ("d", "Oslo")] {
            driver
                .insert_document("users", json!({"_key": key, "city": city}), &Default::default())
                .await
                .unwrap();
        }
        let mut vars = BindVars::new();
        vars.insert("city".into(), json!("Oslo"));
        let cursor = driver
            .query("FOR u IN users FILTER u.city == @city RETURN u", &vars)
            .await
            .unwrap();
        let rows = collect_remaining(cursor).await.unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r[KEY].as_str().unwrap()).collect();
        assert_eq!(keys, vec!["a", "c", "d"]);

        let mut cursor = driver
            .query("FOR u IN users LIMIT 3 RETURN u", &BindVars::new())
            .await
            .unwrap();
        assert_eq!(cursor.next_batch().await.unwrap().unwrap().len(), 2);
        assert_eq!(cursor.next_batch().await.unwrap().unwrap().len(), 1);
        assert_eq!(cursor.next_batch().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sessions_share_database_and_close_independently() {
        let connector = MemoryConnector::new();
        let credentials = Credentials::new("localhost", 8529, "root", "", "shared").unwrap();
        let first = connector.open(&credentials).unwrap();
        let second = connector.open(&credentials).unwrap();

        first.insert_document("c", json!({"_key": "k"}), &Default::default()).await.unwrap();
        assert!(second.document_exists("c", "k").await.unwrap());

        first.shutdown().await.unwrap();
        let err = first.document_exists("c", "k").await.unwrap_err();
        assert_eq!(cause(err), DatabaseError::Failed("driver is shut down".into()));
        assert!(second.document_exists("c", "k").await.unwrap());
    }
}
