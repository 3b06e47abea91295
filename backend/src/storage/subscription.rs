//! Live query handles.
//!
//! A [`Subscription`] is the consumer side of a listener that may fire many
//! times. It owns a single teardown action that runs exactly once: when the
//! consumer closes or drops the handle, or when the stream terminates (the
//! producer ends or reports an error).

use futures_util::stream::{self, Stream};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::warn;

use super::document_store::{Document, Snapshot, StoreError};

/// Buffer size of the channel between a listener task and its consumer
pub const SUBSCRIPTION_BUFFER: usize = 16;

type Teardown = Box<dyn FnOnce() + Send + 'static>;

pub struct Subscription<T> {
    receiver: mpsc::Receiver<Result<T, StoreError>>,
    teardown: Option<Teardown>,
    finished: bool,
}

impl<T> Subscription<T> {
    pub fn new<F>(receiver: mpsc::Receiver<Result<T, StoreError>>, teardown: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            receiver,
            teardown: Some(Box::new(teardown)),
            finished: false,
        }
    }

    /// Create a connected sender/subscription pair
    pub fn channel<F>(teardown: F) -> (mpsc::Sender<Result<T, StoreError>>, Self)
    where
        F: FnOnce() + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        (tx, Self::new(rx, teardown))
    }

    /// Wait for the next emission. Returns `None` once the stream has ended;
    /// an `Err` item is terminal.
    pub async fn next(&mut self) -> Option<Result<T, StoreError>> {
        if self.finished {
            return None;
        }
        match self.receiver.recv().await {
            Some(Ok(value)) => Some(Ok(value)),
            Some(Err(e)) => {
                self.finish();
                Some(Err(e))
            }
            None => {
                self.finish();
                None
            }
        }
    }

    /// Stop listening and release the underlying listener
    pub fn close(mut self) {
        self.finish();
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self) {
        self.finished = true;
        self.receiver.close();
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.finish();
    }
}

impl<T: Send + 'static> Subscription<T> {
    /// Adapt into a `Stream` for consumers such as SSE responses
    pub fn into_stream(self) -> impl Stream<Item = Result<T, StoreError>> + Send {
        stream::unfold(self, |mut sub| async move {
            let item = sub.next().await?;
            Some((item, sub))
        })
    }
}

/// Decodes one document into a typed record
pub type Decoder<T> = fn(&Document) -> Result<T, serde_json::Error>;

/// Decode a document body directly
pub fn decode_body<T: DeserializeOwned>(document: &Document) -> Result<T, serde_json::Error> {
    serde_json::from_value(document.data.clone())
}

/// Decode a document body after injecting the document id as `id`
pub fn decode_with_id<T: DeserializeOwned>(document: &Document) -> Result<T, serde_json::Error> {
    let mut data = document.data.clone();
    if let Some(object) = data.as_object_mut() {
        object.insert("id".to_string(), serde_json::Value::String(document.id.clone()));
    }
    serde_json::from_value(data)
}

/// Map a snapshot into typed records, skipping documents that fail to decode
pub fn decode_snapshot<T>(snapshot: &Snapshot, decoder: Decoder<T>, label: &str) -> Vec<T> {
    decode_documents(&snapshot.documents, decoder, label)
}

pub fn decode_documents<T>(documents: &[Document], decoder: Decoder<T>, label: &str) -> Vec<T> {
    documents
        .iter()
        .filter_map(|document| match decoder(document) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping malformed {} document {}: {}", label, document.id, e);
                None
            }
        })
        .collect()
}

/// A snapshot subscription republished as lists of typed records
pub struct TypedSubscription<T> {
    inner: Subscription<Snapshot>,
    decoder: Decoder<T>,
    label: &'static str,
}

impl<T> TypedSubscription<T> {
    pub fn new(inner: Subscription<Snapshot>, decoder: Decoder<T>, label: &'static str) -> Self {
        Self { inner, decoder, label }
    }

    pub async fn next(&mut self) -> Option<Result<Vec<T>, StoreError>> {
        let item = self.inner.next().await?;
        Some(item.map(|snapshot| decode_snapshot(&snapshot, self.decoder, self.label)))
    }

    pub fn close(self) {
        self.inner.close();
    }
}

impl<T: Send + 'static> TypedSubscription<T> {
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<T>, StoreError>> + Send {
        stream::unfold(self, |mut sub| async move {
            let item = sub.next().await?;
            Some((item, sub))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_teardown() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_teardown_runs_once_on_close() {
        let (count, teardown) = counting_teardown();
        let (tx, mut sub) = Subscription::<u32>::channel(teardown);

        tx.send(Ok(1)).await.unwrap();
        assert_eq!(sub.next().await.unwrap().unwrap(), 1);
        sub.close();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_teardown_runs_once_on_drop() {
        let (count, teardown) = counting_teardown();
        let (_tx, sub) = Subscription::<u32>::channel(teardown);
        drop(sub);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_terminates_stream_and_tears_down() {
        let (count, teardown) = counting_teardown();
        let (tx, mut sub) = Subscription::<u32>::channel(teardown);

        tx.send(Ok(7)).await.unwrap();
        tx.send(Err(StoreError::Listener("boom".to_string()))).await.unwrap();

        assert!(sub.next().await.unwrap().is_ok());
        assert!(sub.next().await.unwrap().is_err());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Terminal: nothing further is observed
        assert!(sub.next().await.is_none());
        drop(sub);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_producer_end_tears_down() {
        let (count, teardown) = counting_teardown();
        let (tx, mut sub) = Subscription::<u32>::channel(teardown);
        drop(tx);
        assert!(sub.next().await.is_none());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        bpm: u32,
    }

    #[tokio::test]
    async fn test_typed_subscription_skips_malformed_documents() {
        let (tx, sub) = Subscription::<Snapshot>::channel(|| {});
        let mut typed = TypedSubscription::new(sub, decode_body::<Sample>, "sample");

        tx.send(Ok(Snapshot::new(vec![
            Document { id: "a".into(), data: json!({"bpm": 80}) },
            Document { id: "b".into(), data: json!({"unexpected": true}) },
            Document { id: "c".into(), data: json!({"bpm": 95}) },
        ])))
        .await
        .unwrap();
        tx.send(Ok(Snapshot::new(vec![Document { id: "d".into(), data: json!({"bpm": 70}) }])))
            .await
            .unwrap();

        let first = typed.next().await.unwrap().unwrap();
        assert_eq!(first, vec![Sample { bpm: 80 }, Sample { bpm: 95 }]);

        // Stream keeps going after the malformed entry
        let second = typed.next().await.unwrap().unwrap();
        assert_eq!(second, vec![Sample { bpm: 70 }]);
    }
}
