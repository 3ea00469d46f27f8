//! Schema-less records produced by the untyped decode path.

use std::any::Any;

use blocklog_core::{EntityId, Record};
use serde_json::Value;

/// A record decoded without knowing its concrete type.
///
/// Holds the self-describing payload as a JSON value. Field access is by
/// name; the original struct layout is not recoverable.
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicRecord {
    value: Value,
}

impl DynamicRecord {
    /// Type tag reported by every dynamic record.
    pub const TYPE_NAME: &'static str = "blocklog::dynamic";

    /// Wrap a decoded value.
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// The decoded value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Look up a top-level field of an object payload.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.value.get(name)
    }

    /// Consume the record and return the decoded value.
    pub fn into_value(self) -> Value {
        self.value
    }
}

impl Record for DynamicRecord {
    fn record_id(&self) -> EntityId {
        EntityId::nil()
    }

    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
