use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use serde::{ser::SerializeMap, Serialize, Serializer};
use serde_json::Value;

use crate::context::Context;
use crate::error::{ParseResult, SchemaParseError};
use crate::schema::{hash_attributes, FieldsJson, Schema, SchemaJson, UnionSchema};

/// Keys with a meaning of their own inside a message object.
pub const MESSAGE_RESERVED: [&str; 5] = ["doc", "response", "request", "errors", "one-way"];

static NULL_RESPONSE: Schema = Schema::Null;
static NO_ERRORS: Schema = Schema::Union(UnionSchema {
    schemas: Vec::new(),
});

/// What a message sends back.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Fire and forget: no response, no errors.
    OneWay,
    /// `errors` is a union whose first member is always the system error.
    TwoWay { response: Schema, errors: Schema },
}

/// One RPC signature of a protocol.
///
/// `request` is an unnamed record holding the parameters. Equality and
/// hashing ignore `doc`.
#[derive(Clone, Debug)]
pub struct Message {
    name: String,
    doc: Option<String>,
    properties: IndexMap<String, Value>,
    request: Schema,
    kind: MessageKind,
}

impl Message {
    pub fn one_way(
        name: impl Into<String>,
        doc: Option<String>,
        properties: IndexMap<String, Value>,
        request: Schema,
    ) -> Self {
        Message {
            name: name.into(),
            doc,
            properties,
            request,
            kind: MessageKind::OneWay,
        }
    }

    pub fn two_way(
        name: impl Into<String>,
        doc: Option<String>,
        properties: IndexMap<String, Value>,
        request: Schema,
        response: Schema,
        errors: Schema,
    ) -> Self {
        Message {
            name: name.into(),
            doc,
            properties,
            request,
            kind: MessageKind::TwoWay { response, errors },
        }
    }

    /// A one-way message with this message's name, doc and properties.
    pub fn with_request(&self, request: Schema) -> Self {
        Message::one_way(
            self.name.clone(),
            self.doc.clone(),
            self.properties.clone(),
            request,
        )
    }

    /// A two-way message with this message's name, doc and properties.
    pub fn with_types(&self, request: Schema, response: Schema, errors: Schema) -> Self {
        Message::two_way(
            self.name.clone(),
            self.doc.clone(),
            self.properties.clone(),
            request,
            response,
            errors,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn request(&self) -> &Schema {
        &self.request
    }

    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    pub fn is_one_way(&self) -> bool {
        matches!(self.kind, MessageKind::OneWay)
    }

    /// The null type for one-way messages.
    pub fn response(&self) -> &Schema {
        match self.kind {
            MessageKind::OneWay => &NULL_RESPONSE,
            MessageKind::TwoWay { ref response, .. } => response,
        }
    }

    /// An empty union for one-way messages.
    pub fn errors(&self) -> &Schema {
        match self.kind {
            MessageKind::OneWay => &NO_ERRORS,
            MessageKind::TwoWay { ref errors, .. } => errors,
        }
    }

    pub fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Adds a custom property. Reserved keys are refused, as is replacing an
    /// existing property with a different value.
    pub fn add_property(&mut self, key: impl Into<String>, value: Value) -> ParseResult<()> {
        add_property(&mut self.properties, &MESSAGE_RESERVED, key.into(), value)
    }

    /// JSON view of this message for a canonical rendering that shares
    /// `known` with the rest of the protocol.
    pub(crate) fn json<'a>(
        &'a self,
        context: Option<&'a Context>,
        known: &'a RefCell<HashSet<String>>,
        namespace: Option<&'a str>,
    ) -> MessageJson<'a> {
        MessageJson {
            message: self,
            context,
            known,
            namespace,
        }
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.request == other.request
            && self.kind == other.kind
            && self.properties == other.properties
    }
}

impl Eq for Message {}

impl Hash for Message {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.request.hash(state);
        self.kind.hash(state);
        hash_attributes(&self.properties, state);
    }
}

impl Serialize for Message {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let known = RefCell::new(HashSet::new());
        self.json(None, &known, None).serialize(serializer)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

pub(crate) struct MessageJson<'a> {
    message: &'a Message,
    context: Option<&'a Context>,
    known: &'a RefCell<HashSet<String>>,
    namespace: Option<&'a str>,
}

impl<'a> MessageJson<'a> {
    fn schema<'b>(&'b self, schema: &'b Schema) -> SchemaJson<'b> {
        SchemaJson::new(schema, self.context, self.known, self.namespace)
    }
}

impl<'a> Serialize for MessageJson<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let message = self.message;
        let mut map = serializer.serialize_map(None)?;
        if let Some(ref doc) = message.doc {
            map.serialize_entry("doc", doc)?;
        }
        for (key, value) in &message.properties {
            map.serialize_entry(key, value)?;
        }
        // The parameter record is written as its bare field list.
        let fields = FieldsJson {
            fields: message.request.fields().unwrap_or_default(),
            context: self.context,
            known: self.known,
            namespace: self.namespace,
        };
        map.serialize_entry("request", &fields)?;
        match message.kind {
            MessageKind::OneWay => {
                map.serialize_entry("response", "null")?;
                map.serialize_entry("one-way", &true)?;
            }
            MessageKind::TwoWay {
                ref response,
                ref errors,
            } => {
                map.serialize_entry("response", &self.schema(response))?;
                // The system error is implicit.
                let declared = errors.variants().unwrap_or_default();
                if declared.len() > 1 {
                    let declared = Schema::Union(UnionSchema {
                        schemas: declared[1..].to_vec(),
                    });
                    map.serialize_entry("errors", &self.schema(&declared))?;
                }
            }
        }
        map.end()
    }
}

pub(crate) fn add_property(
    properties: &mut IndexMap<String, Value>,
    reserved: &[&str],
    key: String,
    value: Value,
) -> ParseResult<()> {
    if reserved.contains(&key.as_str()) {
        return Err(SchemaParseError::PropertyConflict(key));
    }
    match properties.get(&key) {
        Some(existing) if *existing != value => Err(SchemaParseError::PropertyConflict(key)),
        Some(_) => Ok(()),
        None => {
            properties.insert(key, value);
            Ok(())
        }
    }
}
