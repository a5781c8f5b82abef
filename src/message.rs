use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message travelling through a rule chain.
///
/// Messages are value types: every fan-out branch receives its own clone,
/// so metadata mutations made on one branch are never visible to a sibling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: String,
    msg_type: String,
    data: String,
    metadata: HashMap<String, String>,
}

impl Message {
    /// Create a message with a generated id and empty metadata.
    pub fn new(msg_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            msg_type: msg_type.into(),
            data: data.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(
        msg_type: impl Into<String>,
        data: impl Into<String>,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            msg_type: msg_type.into(),
            data: data.into(),
            metadata,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn msg_type(&self) -> &str {
        &self.msg_type
    }

    pub fn set_msg_type(&mut self, msg_type: impl Into<String>) {
        self.msg_type = msg_type.into();
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn set_data(&mut self, data: impl Into<String>) {
        self.data = data.into();
    }

    pub fn get(&self, name: &str) -> Option<&String> {
        self.metadata.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) {
        self.metadata.remove(name);
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::new("telemetry", r#"{"temp": 21}"#);
        assert_eq!(msg.msg_type(), "telemetry");
        assert_eq!(msg.data(), r#"{"temp": 21}"#);
        assert!(msg.metadata().is_empty());
        assert!(!msg.id().is_empty());
    }

    #[test]
    fn test_set_and_get_metadata() {
        let mut msg = Message::new("t", "");
        msg.set("foo", "bar");

        assert_eq!(msg.get("foo"), Some(&"bar".to_string()));
        assert_eq!(msg.get("missing"), None);
    }

    #[test]
    fn test_remove_metadata() {
        let mut msg = Message::new("t", "");
        msg.set("to_remove", "bye");

        assert!(msg.get("to_remove").is_some());
        msg.remove("to_remove");
        assert!(msg.get("to_remove").is_none());
    }

    #[test]
    fn test_metadata_overwrite() {
        let mut msg = Message::new("t", "");
        msg.set("key", "first");
        msg.set("key", "second");

        assert_eq!(msg.get("key"), Some(&"second".to_string()));
    }

    #[test]
    fn test_clones_are_independent() {
        let mut a = Message::new("t", "");
        let mut b = a.clone();
        a.set("branch", "a");
        b.set("branch", "b");

        assert_eq!(a.get("branch"), Some(&"a".to_string()));
        assert_eq!(b.get("branch"), Some(&"b".to_string()));
    }
}
