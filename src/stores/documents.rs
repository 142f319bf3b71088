use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::{self, Persisted, StorageError, Store};
use crate::types::{
    Document, DocumentMetadata, DocumentPatch, DocumentStats, DocumentStatus, MetadataPatch,
    NewDocument,
};

use super::{new_id, required};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentState {
    pub documents: Vec<Document>,
}

impl Persisted for DocumentState {
    const KEY: &'static str = "document-storage";
    const VERSION: u32 = 2;

    fn seed() -> Self {
        Self::default()
    }

    /// Version 1 stored only name, content, upload time and status.
    fn migrate(mut state: Value, from: u32) -> Result<Value, StorageError> {
        match from {
            2 => Ok(state),
            0 | 1 => {
                if let Some(docs) = state.get_mut("documents").and_then(Value::as_array_mut) {
                    for doc in docs.iter_mut().filter_map(Value::as_object_mut) {
                        let uploaded = doc.get("uploadedAt").cloned().unwrap_or(Value::Null);
                        let name = doc.get("name").and_then(Value::as_str).unwrap_or_default();
                        let file_type = file_type_of(name);
                        let size = doc
                            .get("content")
                            .and_then(Value::as_str)
                            .map(|c| c.len())
                            .unwrap_or(0);
                        doc.entry("lastModified").or_insert(uploaded.clone());
                        doc.entry("fileSize").or_insert(Value::from(size));
                        doc.entry("fileType").or_insert(Value::from(file_type));
                        doc.entry("status").or_insert(Value::from("completed"));
                        doc.entry("metadata").or_insert(serde_json::json!({
                            "createdAt": uploaded,
                            "modifiedAt": uploaded,
                            "tags": [],
                        }));
                    }
                }
                Ok(state)
            }
            _ => Err(StorageError::Migration {
                key: Self::KEY,
                from,
            }),
        }
    }
}

/// Extension after the last dot, or `unknown`.
pub fn file_type_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_lowercase(),
        _ => "unknown".to_string(),
    }
}

fn merge_metadata(metadata: &mut DocumentMetadata, patch: MetadataPatch, now: DateTime<Utc>) {
    if let Some(author) = patch.author {
        metadata.author = Some(author);
    }
    if let Some(tags) = patch.tags {
        metadata.tags = tags;
    }
    if let Some(description) = patch.description {
        metadata.description = Some(description);
    }
    metadata.modified_at = Some(now);
}

impl Store<DocumentState> {
    pub fn list_documents(&self) -> &[Document] {
        &self.state().documents
    }

    pub fn get_document(&self, id: &str) -> Option<Document> {
        storage::find(&self.state().documents, id).cloned()
    }

    pub fn add_document(&mut self, input: NewDocument) -> Result<Document, String> {
        let name = required(&input.name, "name")?;
        if input.content.trim().is_empty() {
            return Err(format!("Document '{name}' has no content"));
        }
        let now = Utc::now();
        let mut metadata = DocumentMetadata {
            created_at: Some(now),
            modified_at: Some(now),
            ..Default::default()
        };
        if let Some(patch) = input.metadata {
            merge_metadata(&mut metadata, patch, now);
        }
        let document = Document {
            id: new_id(),
            file_type: input.file_type.unwrap_or_else(|| file_type_of(&name)),
            name,
            file_size: input.content.len() as u64,
            content: input.content,
            uploaded_at: now,
            last_modified: now,
            status: DocumentStatus::Processing,
            chunks: None,
            metadata,
            processing_error: None,
        };
        self.state_mut().documents.push(document.clone());
        Ok(document)
    }

    pub fn update_document(&mut self, id: &str, patch: DocumentPatch) -> Result<Document, StorageError> {
        storage::modify(&mut self.state_mut().documents, id, "Document", |doc| {
            let now = Utc::now();
            if let Some(name) = patch.name {
                doc.name = name;
            }
            if let Some(content) = patch.content {
                doc.file_size = content.len() as u64;
                doc.content = content;
            }
            if let Some(status) = patch.status {
                doc.status = status;
            }
            if patch.chunks.is_some() {
                doc.chunks = patch.chunks;
            }
            if patch.processing_error.is_some() {
                doc.processing_error = patch.processing_error;
            }
            merge_metadata(&mut doc.metadata, patch.metadata.unwrap_or_default(), now);
            doc.last_modified = now;
        })
    }

    /// Record the outcome of indexing a document.
    pub fn mark_processed(
        &mut self,
        id: &str,
        outcome: Result<usize, String>,
    ) -> Result<Document, StorageError> {
        let patch = match outcome {
            Ok(chunks) => DocumentPatch {
                status: Some(DocumentStatus::Completed),
                chunks: Some(chunks),
                ..Default::default()
            },
            Err(reason) => DocumentPatch {
                status: Some(DocumentStatus::Error),
                processing_error: Some(reason),
                ..Default::default()
            },
        };
        self.update_document(id, patch)
    }

    pub fn delete_document(&mut self, id: &str) -> Result<Document, StorageError> {
        storage::remove(&mut self.state_mut().documents, id, "Document")
    }

    pub fn search_documents(&self, query: &str) -> Vec<Document> {
        let needle = query.to_lowercase();
        self.state()
            .documents
            .iter()
            .filter(|d| {
                d.name.to_lowercase().contains(&needle)
                    || d.content.to_lowercase().contains(&needle)
                    || d.metadata.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }

    pub fn clear_documents(&mut self) -> Vec<Document> {
        std::mem::take(&mut self.state_mut().documents)
    }

    pub fn export_documents(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string_pretty(&self.state().documents)?)
    }

    /// Replace every document with the exported JSON array in `data`.
    pub fn import_documents(&mut self, data: &str) -> Result<usize, String> {
        let value: Value = serde_json::from_str(data).map_err(|e| format!("Invalid JSON: {e}"))?;
        if !value.is_array() {
            return Err("Expected an array of documents".to_string());
        }
        let documents: Vec<Document> =
            serde_json::from_value(value).map_err(|e| format!("Invalid document: {e}"))?;
        let count = documents.len();
        self.state_mut().documents = documents;
        Ok(count)
    }

    pub fn add_tag(&mut self, id: &str, tag: &str) -> Result<Document, StorageError> {
        storage::modify(&mut self.state_mut().documents, id, "Document", |doc| {
            if !doc.metadata.tags.iter().any(|t| t == tag) {
                doc.metadata.tags.push(tag.to_string());
            }
        })
    }

    pub fn remove_tag(&mut self, id: &str, tag: &str) -> Result<Document, StorageError> {
        storage::modify(&mut self.state_mut().documents, id, "Document", |doc| {
            doc.metadata.tags.retain(|t| t != tag);
        })
    }

    pub fn update_metadata(&mut self, id: &str, patch: MetadataPatch) -> Result<Document, StorageError> {
        storage::modify(&mut self.state_mut().documents, id, "Document", |doc| {
            merge_metadata(&mut doc.metadata, patch, Utc::now());
        })
    }

    pub fn documents_by_tag(&self, tag: &str) -> Vec<Document> {
        self.filtered(|d| d.metadata.tags.iter().any(|t| t == tag))
    }

    pub fn documents_by_status(&self, status: DocumentStatus) -> Vec<Document> {
        self.filtered(|d| d.status == status)
    }

    /// Uploaded within `[start, end]`, both inclusive.
    pub fn documents_uploaded_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Document> {
        self.filtered(|d| d.uploaded_at >= start && d.uploaded_at <= end)
    }

    pub fn document_stats(&self) -> DocumentStats {
        let docs = &self.state().documents;
        let mut stats = DocumentStats {
            total: docs.len(),
            ..Default::default()
        };
        for doc in docs {
            match doc.status {
                DocumentStatus::Completed => stats.completed += 1,
                DocumentStatus::Processing => stats.processing += 1,
                DocumentStatus::Error => stats.error += 1,
            }
            stats.total_size += doc.file_size;
            *stats.by_file_type.entry(doc.file_type.clone()).or_insert(0) += 1;
        }
        if stats.total > 0 {
            stats.average_size = stats.total_size as f64 / stats.total as f64;
        }
        stats
    }

    fn filtered(&self, keep: impl Fn(&Document) -> bool) -> Vec<Document> {
        self.state()
            .documents
            .iter()
            .filter(|d| keep(d))
            .cloned()
            .collect()
    }
}
