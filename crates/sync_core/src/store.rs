use crate::error::SyncError;
use crate::record::Record;

/// Largest group of writes the document store commits atomically.
pub const MAX_BATCH_WRITES: usize = 500;

/// A full overwrite of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct SetWrite {
    pub document_id: String,
    pub payload: Record,
}

/// Ordered writes for one collection, committed as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBatch {
    collection: String,
    writes: Vec<SetWrite>,
}

impl WriteBatch {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            writes: Vec::new(),
        }
    }

    pub fn set(&mut self, document_id: impl Into<String>, payload: Record) {
        self.writes.push(SetWrite {
            document_id: document_id.into(),
            payload,
        });
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn writes(&self) -> &[SetWrite] {
        &self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Destination document database.
pub trait DocumentStore {
    fn commit(&self, batch: &WriteBatch) -> Result<(), SyncError>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for &T {
    fn commit(&self, batch: &WriteBatch) -> Result<(), SyncError> {
        (**self).commit(batch)
    }
}
