use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use super::document::Document;
use super::driver::Driver;
use super::entity::{DocumentCreateEntity, DocumentCreateOptions};
use super::error::{DatabaseError, Result};
use super::executor::Executor;
use super::outcome::Try;
use super::validation::{require_document, require_non_blank};

/// Serialize `document` and reject anything that encodes to `null`.
pub(crate) fn encode_document<T: Serialize + ?Sized>(document: &T, message: &str) -> Result<Value> {
    Try::capture(|| serde_json::to_value(document))
        .flat_map(|value| require_document(&value, message).void().map(|()| value))
        .into_result()
}

/// Documents of one collection, decoded as `T`
pub struct Collection<T> {
    name: Arc<str>,
    driver: Arc<dyn Driver>,
    executor: Arc<Executor>,
    _document: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            driver: Arc::clone(&self.driver),
            executor: Arc::clone(&self.executor),
            _document: PhantomData,
        }
    }
}

impl<T> Collection<T> {
    pub(crate) fn new(name: String, driver: Arc<dyn Driver>, executor: Arc<Executor>) -> Self {
        Self {
            name: name.into(),
            driver,
            executor,
            _document: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle to the document stored under `key`.
    pub fn document(&self, key: &str) -> Result<Document<T>> {
        require_non_blank(key, "Document key cannot be blank")
            .map(|key| {
                Document::new(
                    Arc::clone(&self.name),
                    key.into(),
                    Arc::clone(&self.driver),
                    Arc::clone(&self.executor),
                )
            })
            .into_result()
    }
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Insert `document` with default options.
    pub fn save<S, F>(&self, document: &T, on_success: S, on_failure: F) -> Result<()>
    where
        S: FnOnce(DocumentCreateEntity<T>) + Send + 'static,
        F: FnOnce(DatabaseError) + Send + 'static,
    {
        self.save_with(document, DocumentCreateOptions::default(), on_success, on_failure)
    }

    pub fn save_with<S, F>(
        &self,
        document: &T,
        options: DocumentCreateOptions,
        on_success: S,
        on_failure: F,
    ) -> Result<()>
    where
        S: FnOnce(DocumentCreateEntity<T>) + Send + 'static,
        F: FnOnce(DatabaseError) + Send + 'static,
    {
        let document = encode_document(document, "Document cannot be null")?;
        let driver = Arc::clone(&self.driver);
        let name = Arc::clone(&self.name);
        self.executor.dispatch(
            move || {
                Ok(async move {
                    driver
                        .insert_document(&name, document, &options)
                        .await?
                        .decode::<T>()
                })
            },
            on_success,
            on_failure,
        );
        Ok(())
    }
}
