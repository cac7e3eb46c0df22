//! In-memory buffer of received messages

use parking_lot::RwLock;

/// Ordered, unbounded sequence of received payloads.
///
/// Shared between the consumer's delivery handler (the only writer) and the
/// HTTP handlers (readers). Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    messages: RwLock<Vec<String>>,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, preserving delivery order
    pub fn append(&self, message: String) {
        self.messages.write().push(message);
    }

    /// Copy of the current contents in insertion order
    pub fn snapshot(&self) -> Vec<String> {
        self.messages.read().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let buffer = MessageBuffer::new();
        assert!(buffer.is_empty());

        buffer.append("a".into());
        buffer.append("b".into());
        buffer.append("a".into());

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.snapshot(), vec!["a", "b", "a"]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let buffer = MessageBuffer::new();
        buffer.append("a".into());
        let snapshot = buffer.snapshot();
        buffer.append("b".into());
        assert_eq!(snapshot, vec!["a"]);
    }
}
