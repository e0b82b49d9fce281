use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;

/// Editor-side view of the document text
pub trait TextProvider {
    fn get_value(&self) -> String;

    /// Replace the whole text; every call is a new revision
    fn set_value(&self, text: String);

    /// Revision counter, notified on every `set_value`
    fn subscribe(&self) -> watch::Receiver<u64>;
}

#[derive(Debug)]
struct Document {
    text: String,
    revision: u64,
}

/// Text and revision read together at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub uri: String,
    pub text: String,
    pub revision: u64,
}

/// The edited document, shared between the editor and the pipeline
#[derive(Debug, Clone)]
pub struct SharedDocument {
    uri: Arc<str>,
    inner: Arc<RwLock<Document>>,
    changes: Arc<watch::Sender<u64>>,
}

impl SharedDocument {
    pub fn new(uri: impl Into<String>, text: impl Into<String>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            uri: Arc::from(uri.into()),
            inner: Arc::new(RwLock::new(Document {
                text: text.into(),
                revision: 0,
            })),
            changes: Arc::new(changes),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn revision(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .revision
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        let doc = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        DocumentSnapshot {
            uri: self.uri.to_string(),
            text: doc.text.clone(),
            revision: doc.revision,
        }
    }
}

impl TextProvider for SharedDocument {
    fn get_value(&self) -> String {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .text
            .clone()
    }

    fn set_value(&self, text: String) {
        let revision = {
            let mut doc = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            doc.text = text;
            doc.revision += 1;
            doc.revision
        };
        self.changes.send_replace(revision);
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_value_bumps_revision() {
        let doc = SharedDocument::new("inmemory://model/main.flow", "a");
        assert_eq!(doc.revision(), 0);

        doc.set_value("b".into());
        doc.set_value("b".into());

        let snapshot = doc.snapshot();
        assert_eq!(snapshot.text, "b");
        assert_eq!(snapshot.revision, 2);
        assert_eq!(snapshot.uri, "inmemory://model/main.flow");
    }

    #[tokio::test]
    async fn test_subscribers_see_latest_revision() {
        let doc = SharedDocument::new("inmemory://model/main.flow", "");
        let mut changes = doc.subscribe();

        doc.set_value("one".into());
        doc.set_value("two".into());

        changes.changed().await.unwrap();
        assert_eq!(*changes.borrow_and_update(), 2);
        assert_eq!(doc.get_value(), "two");
    }
}
