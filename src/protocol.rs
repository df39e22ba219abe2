use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use indexmap::IndexMap;
use serde::{ser::SerializeMap, ser::SerializeSeq, Serialize, Serializer};
use serde_json::Value;

use crate::context::Context;
use crate::error::ParseResult;
use crate::fingerprint::Fingerprint;
use crate::message::{self, Message};
use crate::names;
use crate::parser;
use crate::schema::{hash_attributes, Schema, SchemaJson};

/// Version of the protocol description format.
pub const VERSION: i64 = 1;

/// Top-level keys with a meaning of their own in a protocol document.
pub const PROTOCOL_RESERVED: [&str; 5] = ["namespace", "protocol", "doc", "messages", "types"];

/// A named set of types and the messages that exchange them.
///
/// Built by [`Protocol::parse`] (or one of its text/file variants), which
/// resolves every type reference before returning. Rendering with
/// [`Display`](fmt::Display) produces the canonical JSON form, from which
/// [`Protocol::fingerprint`] is computed.
#[derive(Clone, Debug)]
pub struct Protocol {
    name: String,
    namespace: Option<String>,
    pub(crate) doc: Option<String>,
    properties: IndexMap<String, Value>,
    pub(crate) context: Context,
    pub(crate) messages: IndexMap<String, Message>,
    fingerprint: OnceLock<Fingerprint>,
}

impl Protocol {
    /// A protocol without types or messages.
    ///
    /// A dotted `name` carries its own namespace and overrides `namespace`;
    /// an empty namespace means none.
    pub fn new(name: &str, doc: Option<String>, namespace: Option<&str>) -> Self {
        let (name, namespace) = names::split_protocol_name(name, namespace);
        Protocol {
            name,
            namespace,
            doc,
            properties: IndexMap::new(),
            context: Context::new(),
            messages: IndexMap::new(),
            fingerprint: OnceLock::new(),
        }
    }

    /// A protocol with the name, namespace, doc and properties of `other`,
    /// but no types and no messages.
    pub fn with_header_of(other: &Protocol) -> Self {
        Protocol {
            properties: other.properties.clone(),
            ..Protocol::new(&other.name, other.doc.clone(), other.namespace.as_deref())
        }
    }

    pub fn parse(json: &Value) -> ParseResult<Protocol> {
        parser::parse(json)
    }

    pub fn parse_str(input: &str) -> ParseResult<Protocol> {
        let json: Value = serde_json::from_str(input)?;
        parser::parse(&json)
    }

    /// Parses a document split over several strings.
    pub fn parse_parts(parts: &[&str]) -> ParseResult<Protocol> {
        Self::parse_str(&parts.concat())
    }

    pub fn parse_reader<R: Read>(reader: R) -> ParseResult<Protocol> {
        let json: Value = serde_json::from_reader(reader)?;
        parser::parse(&json)
    }

    pub fn parse_file(path: impl AsRef<Path>) -> ParseResult<Protocol> {
        let input = fs::read_to_string(path)?;
        Self::parse_str(&input)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The named types, in definition order.
    pub fn types(&self) -> Vec<&Schema> {
        self.context.types().collect()
    }

    /// Looks a type up, trying `<namespace>.<name>` before `name` itself.
    pub fn get_type(&self, name: &str) -> Option<&Schema> {
        self.context.find(name, self.namespace())
    }

    /// Replaces every named type of the protocol.
    ///
    /// The types are registered and committed at once. Messages are kept as
    /// they are and are not checked against the new types; neither is a
    /// fingerprint already computed recomputed. On error the protocol is
    /// left unchanged.
    pub fn set_types<I>(&mut self, types: I) -> ParseResult<()>
    where
        I: IntoIterator<Item = Schema>,
    {
        let mut context = Context::new();
        for schema in types {
            context.register(schema)?;
        }
        context.commit()?;
        tracing::debug!(protocol = %self.name, types = context.len(), "types replaced");
        self.context = context;
        Ok(())
    }

    /// The messages, in declaration order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    pub fn message(&self, name: &str) -> Option<&Message> {
        self.messages.get(name)
    }

    /// Adds `message`, replacing (in place) any message with the same name.
    /// Returns the replaced message.
    pub fn add_message(&mut self, message: Message) -> Option<Message> {
        self.messages.insert(message.name().to_string(), message)
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
        message::add_property(&mut self.properties, &PROTOCOL_RESERVED, key.into(), value)
    }

    /// Renders `schema` on its own, expanding every named type it refers to
    /// the first time it is met.
    pub fn expand(&self, schema: &Schema) -> ParseResult<Value> {
        let known = RefCell::new(HashSet::new());
        let json = SchemaJson::new(schema, Some(&self.context), &known, None);
        Ok(serde_json::to_value(&json)?)
    }

    /// MD5 of the compact canonical JSON text. Computed once, then cached.
    pub fn fingerprint(&self) -> ParseResult<Fingerprint> {
        if let Some(fingerprint) = self.fingerprint.get() {
            return Ok(*fingerprint);
        }
        let canonical = serde_json::to_vec(self)?;
        let fingerprint = Fingerprint::of(&canonical);
        tracing::debug!(protocol = %self.name, %fingerprint, "fingerprint computed");
        Ok(*self.fingerprint.get_or_init(|| fingerprint))
    }

    pub fn to_json_string(&self, pretty: bool) -> ParseResult<String> {
        let text = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(text)
    }
}

impl PartialEq for Protocol {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.namespace == other.namespace
            && self.context.len() == other.context.len()
            && self.context.types().all(|schema| {
                schema
                    .fullname()
                    .and_then(|fullname| other.context.get(&fullname))
                    == Some(schema)
            })
            && self.messages == other.messages
            && self.properties == other.properties
    }
}

impl Eq for Protocol {}

impl Hash for Protocol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.namespace.hash(state);
        // Types and messages compare by name, not by position.
        let mut types: Vec<(String, &Schema)> = self
            .context
            .types()
            .map(|schema| (schema.fullname().unwrap_or_default(), schema))
            .collect();
        types.sort_by(|a, b| a.0.cmp(&b.0));
        types.hash(state);
        let mut messages: Vec<&Message> = self.messages.values().collect();
        messages.sort_by(|a, b| a.name().cmp(b.name()));
        messages.hash(state);
        hash_attributes(&self.properties, state);
    }
}

impl Serialize for Protocol {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // One set for the whole document: types first, then messages.
        let known = RefCell::new(HashSet::new());
        let namespace = self.namespace();
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("protocol", &self.name)?;
        if let Some(ns) = namespace {
            map.serialize_entry("namespace", ns)?;
        }
        if let Some(ref doc) = self.doc {
            map.serialize_entry("doc", doc)?;
        }
        for (key, value) in &self.properties {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(
            "types",
            &TypesJson {
                context: &self.context,
                known: &known,
                namespace,
            },
        )?;
        map.serialize_entry(
            "messages",
            &MessagesJson {
                protocol: self,
                known: &known,
            },
        )?;
        map.end()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

struct TypesJson<'a> {
    context: &'a Context,
    known: &'a RefCell<HashSet<String>>,
    namespace: Option<&'a str>,
}

impl<'a> Serialize for TypesJson<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(None)?;
        for schema in self.context.types() {
            // Already written inline inside an earlier type.
            let emitted = match schema.fullname() {
                Some(fullname) => self.known.borrow().contains(&fullname),
                None => false,
            };
            if !emitted {
                seq.serialize_element(&SchemaJson::new(
                    schema,
                    Some(self.context),
                    self.known,
                    self.namespace,
                ))?;
            }
        }
        seq.end()
    }
}

struct MessagesJson<'a> {
    protocol: &'a Protocol,
    known: &'a RefCell<HashSet<String>>,
}

impl<'a> Serialize for MessagesJson<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let protocol = self.protocol;
        let mut map = serializer.serialize_map(Some(protocol.messages.len()))?;
        for (name, message) in &protocol.messages {
            map.serialize_entry(
                name,
                &message.json(Some(&protocol.context), self.known, protocol.namespace()),
            )?;
        }
        map.end()
    }
}
