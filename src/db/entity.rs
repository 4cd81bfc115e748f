//! Option records passed to the driver and the entities it hands back.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::Result;

/// What an insert does when the key already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwriteMode {
    Ignore,
    Replace,
    Update,
    Conflict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentCreateOptions {
    pub return_new: bool,
    pub return_old: bool,
    pub overwrite_mode: Option<OverwriteMode>,
    pub wait_for_sync: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpdateOptions {
    pub keep_null: bool,
    pub merge_objects: bool,
    pub return_new: bool,
    pub return_old: bool,
    /// Only apply when the stored revision matches
    pub if_match: Option<String>,
    pub wait_for_sync: bool,
}

impl Default for DocumentUpdateOptions {
    fn default() -> Self {
        Self {
            keep_null: true,
            merge_objects: true,
            return_new: false,
            return_old: false,
            if_match: None,
            wait_for_sync: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReplaceOptions {
    pub return_new: bool,
    pub return_old: bool,
    pub if_match: Option<String>,
    pub wait_for_sync: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDeleteOptions {
    pub return_old: bool,
    pub if_match: Option<String>,
    pub wait_for_sync: bool,
}

/// Identity of a stored document revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(rename = "_rev")]
    pub rev: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentCreateEntity<T = Value> {
    pub meta: DocumentMeta,
    pub new: Option<T>,
    pub old: Option<T>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUpdateEntity<T = Value> {
    pub meta: DocumentMeta,
    pub old_rev: String,
    pub new: Option<T>,
    pub old: Option<T>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentDeleteEntity<T = Value> {
    pub meta: DocumentMeta,
    pub old: Option<T>,
}

fn decode_opt<T: DeserializeOwned>(value: Option<Value>) -> Result<Option<T>> {
    value
        .map(serde_json::from_value)
        .transpose()
        .map_err(Into::into)
}

impl DocumentCreateEntity<Value> {
    pub fn decode<T: DeserializeOwned>(self) -> Result<DocumentCreateEntity<T>> {
        Ok(DocumentCreateEntity {
            meta: self.meta,
            new: decode_opt(self.new)?,
            old: decode_opt(self.old)?,
        })
    }
}

impl DocumentUpdateEntity<Value> {
    pub fn decode<T: DeserializeOwned>(self) -> Result<DocumentUpdateEntity<T>> {
        Ok(DocumentUpdateEntity {
            meta: self.meta,
            old_rev: self.old_rev,
            new: decode_opt(self.new)?,
            old: decode_opt(self.old)?,
        })
    }
}

impl DocumentDeleteEntity<Value> {
    pub fn decode<T: DeserializeOwned>(self) -> Result<DocumentDeleteEntity<T>> {
        Ok(DocumentDeleteEntity {
            meta: self.meta,
            old: decode_opt(self.old)?,
        })
    }
}
