use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

use super::collection::encode_document;
use super::driver::Driver;
use super::entity::{
    DocumentDeleteEntity, DocumentDeleteOptions, DocumentReplaceOptions, DocumentUpdateEntity,
    DocumentUpdateOptions,
};
use super::error::{DatabaseError, Result};
use super::executor::Executor;

/// A single document addressed by collection and key
pub struct Document<T> {
    collection: Arc<str>,
    key: Arc<str>,
    driver: Arc<dyn Driver>,
    executor: Arc<Executor>,
    _document: PhantomData<fn() -> T>,
}

impl<T> Clone for Document<T> {
    fn clone(&self) -> Self {
        Self {
            collection: Arc::clone(&self.collection),
            key: Arc::clone(&self.key),
            driver: Arc::clone(&self.driver),
            executor: Arc::clone(&self.executor),
            _document: PhantomData,
        }
    }
}

impl<T> Document<T> {
    pub(crate) fn new(
        collection: Arc<str>,
        key: Arc<str>,
        driver: Arc<dyn Driver>,
        executor: Arc<Executor>,
    ) -> Self {
        Self {
            collection,
            key,
            driver,
            executor,
            _document: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// `collection/key`
    pub fn id(&self) -> String {
        format!("{}/{}", self.collection, self.key)
    }
}

impl<T> Document<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Fetch the document; `None` reaches `on_success` when it does not exist.
    pub fn fetch<S, F>(&self, on_success: S, on_failure: F)
    where
        S: FnOnce(Option<T>) + Send + 'static,
        F: FnOnce(DatabaseError) + Send + 'static,
    {
        let (driver, collection, key) = self.parts();
        self.executor.dispatch(
            move || {
                Ok(async move {
                    driver
                        .get_document(&collection, &key)
                        .await?
                        .map(serde_json::from_value::<T>)
                        .transpose()
                        .map_err(DatabaseError::from)
                })
            },
            on_success,
            on_failure,
        );
    }

    /// Merge `patch` into the stored document with default options.
    pub fn update<P, S, F>(&self, patch: &P, on_success: S, on_failure: F) -> Result<()>
    where
        P: Serialize + ?Sized,
        S: FnOnce(DocumentUpdateEntity<T>) + Send + 'static,
        F: FnOnce(DatabaseError) + Send + 'static,
    {
        self.update_with(patch, DocumentUpdateOptions::default(), on_success, on_failure)
    }

    pub fn update_with<P, S, F>(
        &self,
        patch: &P,
        options: DocumentUpdateOptions,
        on_success: S,
        on_failure: F,
    ) -> Result<()>
    where
        P: Serialize + ?Sized,
        S: FnOnce(DocumentUpdateEntity<T>) + Send + 'static,
        F: FnOnce(DatabaseError) + Send + 'static,
    {
        let patch = encode_document(patch, "Document for update cannot be null")?;
        let (driver, collection, key) = self.parts();
        self.executor.dispatch(
            move || {
                Ok(async move {
                    driver
                        .update_document(&collection, &key, patch, &options)
                        .await?
                        .decode::<T>()
                })
            },
            on_success,
            on_failure,
        );
        Ok(())
    }

    /// Swap the stored body for `document` with default options.
    pub fn replace<S, F>(&self, document: &T, on_success: S, on_failure: F) -> Result<()>
    where
        S: FnOnce(DocumentUpdateEntity<T>) + Send + 'static,
        F: FnOnce(DatabaseError) + Send + 'static,
    {
        self.replace_with(document, DocumentReplaceOptions::default(), on_success, on_failure)
    }

    pub fn replace_with<S, F>(
        &self,
        document: &T,
        options: DocumentReplaceOptions,
        on_success: S,
        on_failure: F,
    ) -> Result<()>
    where
        S: FnOnce(DocumentUpdateEntity<T>) + Send + 'static,
        F: FnOnce(DatabaseError) + Send + 'static,
    {
        let document = encode_document(document, "Document for replace cannot be null")?;
        let (driver, collection, key) = self.parts();
        self.executor.dispatch(
            move || {
                Ok(async move {
                    driver
                        .replace_document(&collection, &key, document, &options)
                        .await?
                        .decode::<T>()
                })
            },
            on_success,
            on_failure,
        );
        Ok(())
    }

    pub fn delete<S, F>(&self, on_success: S, on_failure: F)
    where
        S: FnOnce(DocumentDeleteEntity<T>) + Send + 'static,
        F: FnOnce(DatabaseError) + Send + 'static,
    {
        self.delete_with(DocumentDeleteOptions::default(), on_success, on_failure)
    }

    pub fn delete_with<S, F>(&self, options: DocumentDeleteOptions, on_success: S, on_failure: F)
    where
        S: FnOnce(DocumentDeleteEntity<T>) + Send + 'static,
        F: FnOnce(DatabaseError) + Send + 'static,
    {
        let (driver, collection, key) = self.parts();
        self.executor.dispatch(
            move || {
                Ok(async move {
                    driver
                        .delete_document(&collection, &key, &options)
                        .await?
                        .decode::<T>()
                })
            },
            on_success,
            on_failure,
        );
    }

    pub fn exists<S, F>(&self, on_success: S, on_failure: F)
    where
        S: FnOnce(bool) + Send + 'static,
        F: FnOnce(DatabaseError) + Send + 'static,
    {
        let (driver, collection, key) = self.parts();
        self.executor.dispatch(
            move || Ok(async move { driver.document_exists(&collection, &key).await }),
            on_success,
            on_failure,
        );
    }

    fn parts(&self) -> (Arc<dyn Driver>, Arc<str>, Arc<str>) {
        (
            Arc::clone(&self.driver),
            Arc::clone(&self.collection),
            Arc::clone(&self.key),
        )
    }
}
