//! Event notifier module
//!
//! Keeps the registered listener set and fans every event out in
//! registration order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::trace;

use crate::error::ErrorCode;
use crate::notify::TransferListener;
use crate::queue::TransferRequest;

/// Handle identifying a registered listener for later removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registered listener set with ordered, synchronous fan-out
#[derive(Default)]
pub struct EventNotifier {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn TransferListener>)>>,
    next_id: AtomicU64,
}

impl EventNotifier {
    /// Create a notifier with no listeners
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a listener; events are delivered in registration order
    pub fn register(&self, listener: Arc<dyn TransferListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().unwrap().push((id, listener));
        id
    }

    /// Remove a listener by handle. Idempotent.
    pub fn unregister(&self, id: ListenerId) {
        self.listeners.write().unwrap().retain(|(lid, _)| *lid != id);
    }

    /// Remove every listener
    pub fn clear(&self) {
        self.listeners.write().unwrap().clear();
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.read().unwrap().len()
    }

    /// Check whether no listeners are registered
    pub fn is_empty(&self) -> bool {
        self.listeners.read().unwrap().is_empty()
    }

    /// Snapshot the listener set so register/unregister stay safe during an
    /// in-flight emit
    fn snapshot(&self) -> Vec<Arc<dyn TransferListener>> {
        self.listeners
            .read()
            .unwrap()
            .iter()
            .map(|(_, l)| l.clone())
            .collect()
    }

    /// Emit `on_queued`
    pub fn emit_queued(&self, request: &TransferRequest) {
        trace!("Emitting queued for {:016x}", request.id);
        for listener in self.snapshot() {
            listener.on_queued(request);
        }
    }

    /// Emit `on_progress`
    pub fn emit_progress(&self, request: &TransferRequest, eta_millis: i64, bytes_per_second: u64) {
        trace!(
            "Emitting progress for {:016x}: {}/{} bytes",
            request.id,
            request.downloaded_bytes,
            request.total_bytes
        );
        for listener in self.snapshot() {
            listener.on_progress(request, eta_millis, bytes_per_second);
        }
    }

    /// Emit `on_completed`
    pub fn emit_completed(&self, request: &TransferRequest) {
        trace!("Emitting completed for {:016x}", request.id);
        for listener in self.snapshot() {
            listener.on_completed(request);
        }
    }

    /// Emit `on_failed`
    pub fn emit_failed(&self, request: &TransferRequest, code: ErrorCode) {
        trace!("Emitting failed for {:016x} ({})", request.id, code);
        for listener in self.snapshot() {
            listener.on_failed(request, code);
        }
    }

    /// Emit `on_paused`
    pub fn emit_paused(&self, request: &TransferRequest) {
        trace!("Emitting paused for {:016x}", request.id);
        for listener in self.snapshot() {
            listener.on_paused(request);
        }
    }

    /// Emit `on_removed`
    pub fn emit_removed(&self, request: &TransferRequest) {
        trace!("Emitting removed for {:016x}", request.id);
        for listener in self.snapshot() {
            listener.on_removed(request);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct RecordingListener {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl TransferListener for RecordingListener {
        fn on_queued(&self, _request: &TransferRequest) {
            self.log.lock().unwrap().push(format!("{}:queued", self.label));
        }

        fn on_completed(&self, _request: &TransferRequest) {
            self.log.lock().unwrap().push(format!("{}:completed", self.label));
        }

        fn on_failed(&self, _request: &TransferRequest, code: ErrorCode) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:failed:{}", self.label, code));
        }
    }

    fn request() -> TransferRequest {
        TransferRequest::new("http://example.com/a", "/tmp/out", BTreeMap::new())
    }

    #[test]
    fn test_emit_in_registration_order() {
        let notifier = EventNotifier::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        notifier.register(Arc::new(RecordingListener { label: "first", log: log.clone() }));
        notifier.register(Arc::new(RecordingListener { label: "second", log: log.clone() }));

        notifier.emit_queued(&request());
        assert_eq!(*log.lock().unwrap(), vec!["first:queued", "second:queued"]);
    }

    #[test]
    fn test_unregister_stops_delivery() {
        let notifier = EventNotifier::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = notifier.register(Arc::new(RecordingListener { label: "a", log: log.clone() }));

        notifier.emit_queued(&request());
        notifier.unregister(id);
        notifier.emit_completed(&request());

        assert_eq!(*log.lock().unwrap(), vec!["a:queued"]);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let notifier = EventNotifier::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = notifier.register(Arc::new(RecordingListener { label: "a", log }));

        notifier.unregister(id);
        notifier.unregister(id);
        assert!(notifier.is_empty());
    }

    #[test]
    fn test_clear_detaches_everything() {
        let notifier = EventNotifier::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        notifier.register(Arc::new(RecordingListener { label: "a", log: log.clone() }));
        notifier.register(Arc::new(RecordingListener { label: "b", log: log.clone() }));
        assert_eq!(notifier.len(), 2);

        notifier.clear();
        notifier.emit_failed(&request(), ErrorCode::NetworkError);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_default_listener_methods_are_noops() {
        struct Silent;
        impl TransferListener for Silent {}

        let notifier = EventNotifier::new();
        notifier.register(Arc::new(Silent));
        // Every emit path must be callable against default impls
        let request = request();
        notifier.emit_queued(&request);
        notifier.emit_progress(&request, -1, 0);
        notifier.emit_completed(&request);
        notifier.emit_failed(&request, ErrorCode::IoError);
        notifier.emit_paused(&request);
        notifier.emit_removed(&request);
    }
}
