//! Message instances: a type plus its field values.

use std::collections::BTreeMap;
use std::fmt;

use super::codec::{self, CodecError, Encoded};
use super::field::{Field, FieldValue};
use super::schema::MessageType;

/// A message type paired with field values.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    kind: MessageType,
    fields: BTreeMap<Field, FieldValue>,
}

impl Message {
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
        }
    }

    pub fn from_fields(kind: MessageType, fields: BTreeMap<Field, FieldValue>) -> Self {
        Self { kind, fields }
    }

    /// Builder-style setter.
    pub fn with(mut self, field: Field, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: Field, value: impl Into<FieldValue>) {
        self.fields.insert(field, value.into());
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn fields(&self) -> &BTreeMap<Field, FieldValue> {
        &self.fields
    }

    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    /// Integer value of `field`, if present and numeric.
    pub fn int(&self, field: Field) -> Option<u64> {
        self.get(field).and_then(FieldValue::as_int)
    }

    pub fn encode(&self) -> Result<Encoded, CodecError> {
        codec::encode(self.kind, &self.fields)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.kind.name());
        for (field, value) in &self.fields {
            s.field(field.name(), value);
        }
        s.finish()
    }
}
