use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use apache_avro::schema::Name;
use indexmap::IndexMap;
use serde::{
    ser::{self, SerializeMap, SerializeSeq},
    Serialize, Serializer,
};
use serde_json::Value;
use strum_macros::{EnumDiscriminants, EnumString, IntoStaticStr};

use crate::context::Context;
use crate::error::{ParseResult, SchemaParseError};
use crate::names;

type DecimalMetadata = usize;

/// Sort order of a record field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum FieldOrder {
    #[default]
    Ascending,
    Descending,
    Ignore,
}

/// Represents a `field` in a `record` Avro schema.
///
/// Equality and hashing ignore `doc` and `position`.
#[derive(Clone, Debug)]
pub struct RecordField {
    /// Name of the field.
    pub name: String,
    /// Documentation of the field.
    pub doc: Option<String>,
    /// Default value of the field, kept as raw JSON.
    pub default: Option<Value>,
    /// Schema of the field.
    pub schema: Schema,
    /// Order of the field.
    pub order: FieldOrder,
    /// Alternate names of the field, as written in the source.
    pub aliases: Vec<String>,
    /// Position of the field in the list of `field` of its parent `Schema`
    pub position: usize,
    /// A collection of all unknown fields in the record field.
    pub custom_attributes: IndexMap<String, Value>,
}

impl RecordField {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        RecordField {
            name: name.into(),
            doc: None,
            default: None,
            schema,
            order: FieldOrder::Ascending,
            aliases: Vec::new(),
            position: 0,
            custom_attributes: IndexMap::new(),
        }
    }
}

impl PartialEq for RecordField {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.schema == other.schema
            && self.default == other.default
            && self.order == other.order
            && self.aliases == other.aliases
            && self.custom_attributes == other.custom_attributes
    }
}

impl Eq for RecordField {}

impl Hash for RecordField {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.schema.hash(state);
        self.default.is_some().hash(state);
        if let Some(ref default) = self.default {
            hash_json(default, state);
        }
        self.order.hash(state);
        self.aliases.hash(state);
        hash_attributes(&self.custom_attributes, state);
    }
}

/// A `record` or `error` schema.
///
/// `name` is `None` only for the synthetic parameter record of a message.
#[derive(Clone, Debug)]
pub struct RecordSchema {
    pub name: Option<Name>,
    pub aliases: Vec<String>,
    pub doc: Option<String>,
    pub fields: Vec<RecordField>,
    pub is_error: bool,
    pub attributes: IndexMap<String, Value>,
}

impl PartialEq for RecordSchema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.is_error == other.is_error
            && self.aliases == other.aliases
            && self.fields == other.fields
            && self.attributes == other.attributes
    }
}

impl Eq for RecordSchema {}

impl Hash for RecordSchema {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.is_error.hash(state);
        self.aliases.hash(state);
        self.fields.hash(state);
        hash_attributes(&self.attributes, state);
    }
}

#[derive(Clone, Debug)]
pub struct EnumSchema {
    pub name: Name,
    pub aliases: Vec<String>,
    pub doc: Option<String>,
    pub symbols: Vec<String>,
    pub default: Option<String>,
    pub attributes: IndexMap<String, Value>,
}

impl PartialEq for EnumSchema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.aliases == other.aliases
            && self.symbols == other.symbols
            && self.default == other.default
            && self.attributes == other.attributes
    }
}

impl Eq for EnumSchema {}

impl Hash for EnumSchema {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.aliases.hash(state);
        self.symbols.hash(state);
        self.default.hash(state);
        hash_attributes(&self.attributes, state);
    }
}

#[derive(Clone, Debug)]
pub struct FixedSchema {
    pub name: Name,
    pub aliases: Vec<String>,
    pub doc: Option<String>,
    pub size: usize,
    pub attributes: IndexMap<String, Value>,
}

impl PartialEq for FixedSchema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.aliases == other.aliases
            && self.size == other.size
            && self.attributes == other.attributes
    }
}

impl Eq for FixedSchema {}

impl Hash for FixedSchema {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.aliases.hash(state);
        self.size.hash(state);
        hash_attributes(&self.attributes, state);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, EnumDiscriminants)]
#[strum_discriminants(name(SchemaKind), derive(Hash, Ord, PartialOrd))]
pub enum Schema {
    /// A `null` Avro schema.
    Null,
    /// A `boolean` Avro schema.
    Boolean,
    /// An `int` Avro schema.
    Int,
    /// A `long` Avro schema.
    Long,
    /// A `float` Avro schema.
    Float,
    /// A `double` Avro schema.
    Double,
    /// A `bytes` Avro schema.
    /// `Bytes` represents a sequence of 8-bit unsigned bytes.
    Bytes,
    /// A `string` Avro schema.
    /// `String` represents a unicode character sequence.
    String,
    /// A `array` Avro schema. Avro arrays are required to have the same type for each element.
    /// This variant holds the `Schema` for the array element type.
    Array(Box<Schema>),
    /// A `map` Avro schema.
    /// `Map` holds a pointer to the `Schema` of its values, which must all be the same schema.
    /// `Map` keys are assumed to be `string`.
    Map(Box<Schema>),
    /// A `union` Avro schema.
    Union(UnionSchema),
    /// A `record` or `error` Avro schema.
    Record(RecordSchema),
    /// An `enum` Avro schema.
    Enum(EnumSchema),
    /// A `fixed` Avro schema.
    Fixed(FixedSchema),
    /// Logical type which represents `Decimal` values, serialized as `Schema::Bytes`.
    Decimal {
        precision: DecimalMetadata,
        scale: DecimalMetadata,
    },
    /// A universally unique identifier, annotating a string.
    Uuid,
    /// Logical type which represents the number of days since the unix epoch.
    /// Serialization format is `Schema::Int`.
    Date,
    /// The time of day in number of milliseconds after midnight.
    TimeMillis,
    /// The time of day in number of microseconds after midnight.
    TimeMicros,
    /// An instant in time represented as the number of milliseconds after the UNIX epoch.
    TimestampMillis,
    /// An instant in time represented as the number of microseconds after the UNIX epoch.
    TimestampMicros,
    /// A reference to a named schema registered in a [`Context`].
    Ref { name: Name },
    /// An unnamed type carrying custom attributes.
    Annotated(AnnotatedSchema),
}

/// A primitive, logical, array or map schema with extra attributes, as in
/// `{"type": "string", "avro.java.string": "String"}`.
///
/// An unknown logical type is kept as a `logicalType` attribute of its base
/// type. Attributes keep document order; equality ignores that order.
#[derive(Clone, Debug)]
pub struct AnnotatedSchema {
    pub schema: Box<Schema>,
    pub attributes: IndexMap<String, Value>,
}

impl PartialEq for AnnotatedSchema {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.attributes == other.attributes
    }
}

impl Eq for AnnotatedSchema {}

impl Hash for AnnotatedSchema {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.schema.hash(state);
        hash_attributes(&self.attributes, state);
    }
}

/// The error type every two-way message may raise.
pub const SYSTEM_ERROR: Schema = Schema::String;

/// Union holding only [`SYSTEM_ERROR`].
pub fn system_errors() -> Schema {
    Schema::Union(UnionSchema {
        schemas: vec![SYSTEM_ERROR],
    })
}

impl Schema {
    /// Looks up a primitive type by its Avro name.
    pub fn primitive(name: &str) -> Option<Schema> {
        let schema = match name {
            "null" => Schema::Null,
            "boolean" => Schema::Boolean,
            "int" => Schema::Int,
            "long" => Schema::Long,
            "float" => Schema::Float,
            "double" => Schema::Double,
            "bytes" => Schema::Bytes,
            "string" => Schema::String,
            _ => return None,
        };
        Some(schema)
    }

    /// A parameter record: unnamed, fields numbered in declaration order.
    pub fn record(fields: Vec<RecordField>) -> Schema {
        let fields = fields
            .into_iter()
            .enumerate()
            .map(|(position, field)| RecordField { position, ..field })
            .collect();
        Schema::Record(RecordSchema {
            name: None,
            aliases: Vec::new(),
            doc: None,
            fields,
            is_error: false,
            attributes: IndexMap::new(),
        })
    }

    pub fn union(schemas: Vec<Schema>) -> ParseResult<Schema> {
        Ok(Schema::Union(UnionSchema::new(schemas)?))
    }

    pub fn kind(&self) -> SchemaKind {
        SchemaKind::from(self)
    }

    /// Name of a named type, or of the type a reference points at.
    pub fn name(&self) -> Option<&Name> {
        match self {
            Schema::Record(record) => record.name.as_ref(),
            Schema::Enum(schema) => Some(&schema.name),
            Schema::Fixed(schema) => Some(&schema.name),
            Schema::Ref { name } => Some(name),
            _ => None,
        }
    }

    pub fn fullname(&self) -> Option<String> {
        self.name().map(|name| name.fullname(None))
    }

    /// Whether this is a named definition (not a reference).
    pub fn is_named(&self) -> bool {
        !matches!(self, Schema::Ref { .. }) && self.name().is_some()
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Schema::Record(RecordSchema { is_error: true, .. }))
    }

    pub fn doc(&self) -> Option<&str> {
        match self {
            Schema::Record(record) => record.doc.as_deref(),
            Schema::Enum(schema) => schema.doc.as_deref(),
            Schema::Fixed(schema) => schema.doc.as_deref(),
            _ => None,
        }
    }

    pub fn fields(&self) -> Option<&[RecordField]> {
        match self {
            Schema::Record(record) => Some(&record.fields),
            _ => None,
        }
    }

    pub fn variants(&self) -> Option<&[Schema]> {
        match self {
            Schema::Union(union) => Some(union.variants()),
            _ => None,
        }
    }

    /// Attaches `attributes` to `schema`. Without attributes the schema is
    /// returned as is.
    pub fn annotated(schema: Schema, attributes: IndexMap<String, Value>) -> Schema {
        if attributes.is_empty() {
            return schema;
        }
        Schema::Annotated(AnnotatedSchema {
            schema: Box::new(schema),
            attributes,
        })
    }

    /// This schema without its custom attributes.
    pub fn unannotated(&self) -> &Schema {
        match self {
            Schema::Annotated(annotated) => &annotated.schema,
            other => other,
        }
    }

    /// The `type` an unnamed, non-union schema is written with. Logical types
    /// answer the type they annotate.
    pub fn base_type(&self) -> Option<&'static str> {
        let base = match self.unannotated() {
            Schema::Null => "null",
            Schema::Boolean => "boolean",
            Schema::Int | Schema::Date | Schema::TimeMillis => "int",
            Schema::Long
            | Schema::TimeMicros
            | Schema::TimestampMillis
            | Schema::TimestampMicros => "long",
            Schema::Float => "float",
            Schema::Double => "double",
            Schema::Bytes | Schema::Decimal { .. } => "bytes",
            Schema::String | Schema::Uuid => "string",
            Schema::Array(_) => "array",
            Schema::Map(_) => "map",
            _ => return None,
        };
        Some(base)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnionSchema {
    pub(crate) schemas: Vec<Schema>,
}

impl UnionSchema {
    /// Creates a new UnionSchema from a vector of schemas.
    ///
    /// Unions may not nest, and may hold at most one member per full name
    /// and per unnamed type. A logical type counts as the type it annotates.
    pub fn new(schemas: Vec<Schema>) -> ParseResult<Self> {
        let mut seen = HashSet::new();
        for schema in schemas.iter() {
            let key = match schema {
                Schema::Union(_) => {
                    return Err(SchemaParseError::malformed(
                        "Nested union",
                        &Value::String(schema.to_string()),
                    ))
                }
                _ => match (schema.fullname(), schema.base_type()) {
                    (Some(fullname), _) => fullname,
                    (None, Some(base)) => base.to_string(),
                    (None, None) => format!("{:?}", schema.kind()),
                },
            };
            if !seen.insert(key.clone()) {
                return Err(SchemaParseError::malformed(
                    "Duplicate in union",
                    &Value::String(key),
                ));
            }
        }
        Ok(UnionSchema { schemas })
    }

    /// Returns a slice to all variants of this schema.
    pub fn variants(&self) -> &[Schema] {
        &self.schemas
    }
}

/// Renders a schema standalone: named types are expanded once, references
/// that cannot be followed are written as names.
impl Serialize for Schema {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let known = RefCell::new(HashSet::new());
        SchemaJson::new(self, None, &known, None).serialize(serializer)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

/// Canonical JSON view of a schema.
///
/// `known` is shared by every view produced during one rendering: a named
/// type is written in full the first time it is met and as a bare reference
/// afterwards. `context` lets references be expanded on first use.
pub(crate) struct SchemaJson<'a> {
    schema: &'a Schema,
    context: Option<&'a Context>,
    known: &'a RefCell<HashSet<String>>,
    namespace: Option<&'a str>,
}

impl<'a> SchemaJson<'a> {
    pub(crate) fn new(
        schema: &'a Schema,
        context: Option<&'a Context>,
        known: &'a RefCell<HashSet<String>>,
        namespace: Option<&'a str>,
    ) -> Self {
        SchemaJson {
            schema,
            context,
            known,
            namespace,
        }
    }

    fn child(&self, schema: &'a Schema) -> SchemaJson<'a> {
        SchemaJson::new(schema, self.context, self.known, self.namespace)
    }

    /// Writes the keys of an unnamed, non-union schema into `map`.
    fn unnamed_entries<M>(&self, map: &mut M, schema: &'a Schema) -> Result<(), M::Error>
    where
        M: SerializeMap,
    {
        let base = schema.base_type().ok_or_else(|| {
            <M::Error as ser::Error>::custom(format!("{:?} takes no attributes", schema.kind()))
        })?;
        map.serialize_entry("type", base)?;
        let logical = match *schema {
            Schema::Array(ref inner) => return map.serialize_entry("items", &self.child(inner)),
            Schema::Map(ref inner) => return map.serialize_entry("values", &self.child(inner)),
            Schema::Decimal {
                ref precision,
                ref scale,
            } => {
                map.serialize_entry("logicalType", "decimal")?;
                map.serialize_entry("precision", precision)?;
                return map.serialize_entry("scale", scale);
            }
            Schema::Uuid => "uuid",
            Schema::Date => "date",
            Schema::TimeMillis => "time-millis",
            Schema::TimeMicros => "time-micros",
            Schema::TimestampMillis => "timestamp-millis",
            Schema::TimestampMicros => "timestamp-micros",
            _ => return Ok(()),
        };
        map.serialize_entry("logicalType", logical)
    }

    /// Marks `name` as emitted; false when it already was.
    fn first_sight(&self, name: &Name) -> bool {
        self.known.borrow_mut().insert(name.fullname(None))
    }

    fn named_header<M>(
        &self,
        map: &mut M,
        kind: &str,
        name: &Name,
        doc: &Option<String>,
    ) -> Result<(), M::Error>
    where
        M: SerializeMap,
    {
        map.serialize_entry("type", kind)?;
        map.serialize_entry("name", &name.name)?;
        match name.namespace.as_deref() {
            Some(ns) if Some(ns) != self.namespace => map.serialize_entry("namespace", ns)?,
            None if self.namespace.is_some() => map.serialize_entry("namespace", "")?,
            _ => {}
        }
        if let Some(ref docstr) = doc {
            map.serialize_entry("doc", docstr)?;
        }
        Ok(())
    }

    fn named_trailer<M>(
        map: &mut M,
        attributes: &IndexMap<String, Value>,
        aliases: &[String],
    ) -> Result<(), M::Error>
    where
        M: SerializeMap,
    {
        for (key, value) in attributes {
            map.serialize_entry(key, value)?;
        }
        if !aliases.is_empty() {
            map.serialize_entry("aliases", aliases)?;
        }
        Ok(())
    }

    fn record<S>(&self, record: &'a RecordSchema, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let kind = if record.is_error { "error" } else { "record" };
        let mut map = serializer.serialize_map(None)?;
        let namespace = match record.name {
            Some(ref name) => {
                self.named_header(&mut map, kind, name, &record.doc)?;
                name.namespace.as_deref()
            }
            None => {
                map.serialize_entry("type", kind)?;
                self.namespace
            }
        };
        let fields = FieldsJson {
            fields: &record.fields,
            context: self.context,
            known: self.known,
            namespace,
        };
        map.serialize_entry("fields", &fields)?;
        Self::named_trailer(&mut map, &record.attributes, &record.aliases)?;
        map.end()
    }
}

impl<'a> Serialize for SchemaJson<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match *self.schema {
            Schema::Null => serializer.serialize_str("null"),
            Schema::Boolean => serializer.serialize_str("boolean"),
            Schema::Int => serializer.serialize_str("int"),
            Schema::Long => serializer.serialize_str("long"),
            Schema::Float => serializer.serialize_str("float"),
            Schema::Double => serializer.serialize_str("double"),
            Schema::Bytes => serializer.serialize_str("bytes"),
            Schema::String => serializer.serialize_str("string"),
            Schema::Array(_)
            | Schema::Map(_)
            | Schema::Decimal { .. }
            | Schema::Uuid
            | Schema::Date
            | Schema::TimeMillis
            | Schema::TimeMicros
            | Schema::TimestampMillis
            | Schema::TimestampMicros => {
                let mut map = serializer.serialize_map(None)?;
                self.unnamed_entries(&mut map, self.schema)?;
                map.end()
            }
            Schema::Annotated(ref annotated) => {
                let mut map = serializer.serialize_map(None)?;
                self.unnamed_entries(&mut map, &annotated.schema)?;
                for (key, value) in &annotated.attributes {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Schema::Union(ref inner) => {
                let variants = inner.variants();
                let mut seq = serializer.serialize_seq(Some(variants.len()))?;
                for v in variants {
                    seq.serialize_element(&self.child(v))?;
                }
                seq.end()
            }
            Schema::Ref { ref name } => {
                let fullname = name.fullname(None);
                let emitted = self.known.borrow().contains(&fullname);
                match self.context.and_then(|context| context.get(&fullname)) {
                    Some(definition) if !emitted => self.child(definition).serialize(serializer),
                    _ => serializer.serialize_str(&names::qualified(name, self.namespace)),
                }
            }
            Schema::Record(ref record) => {
                if let Some(ref name) = record.name {
                    if !self.first_sight(name) {
                        return serializer.serialize_str(&names::qualified(name, self.namespace));
                    }
                }
                self.record(record, serializer)
            }
            Schema::Enum(ref schema) => {
                if !self.first_sight(&schema.name) {
                    return serializer
                        .serialize_str(&names::qualified(&schema.name, self.namespace));
                }
                let mut map = serializer.serialize_map(None)?;
                self.named_header(&mut map, "enum", &schema.name, &schema.doc)?;
                map.serialize_entry("symbols", &schema.symbols)?;
                if let Some(ref default) = schema.default {
                    map.serialize_entry("default", default)?;
                }
                Self::named_trailer(&mut map, &schema.attributes, &schema.aliases)?;
                map.end()
            }
            Schema::Fixed(ref schema) => {
                if !self.first_sight(&schema.name) {
                    return serializer
                        .serialize_str(&names::qualified(&schema.name, self.namespace));
                }
                let mut map = serializer.serialize_map(None)?;
                self.named_header(&mut map, "fixed", &schema.name, &schema.doc)?;
                map.serialize_entry("size", &schema.size)?;
                Self::named_trailer(&mut map, &schema.attributes, &schema.aliases)?;
                map.end()
            }
        }
    }
}

/// A record's field list, as written under `fields` or a message's `request`.
pub(crate) struct FieldsJson<'a> {
    pub(crate) fields: &'a [RecordField],
    pub(crate) context: Option<&'a Context>,
    pub(crate) known: &'a RefCell<HashSet<String>>,
    pub(crate) namespace: Option<&'a str>,
}

impl<'a> Serialize for FieldsJson<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.fields.len()))?;
        for field in self.fields {
            seq.serialize_element(&FieldJson {
                field,
                schema: SchemaJson::new(&field.schema, self.context, self.known, self.namespace),
            })?;
        }
        seq.end()
    }
}

struct FieldJson<'a> {
    field: &'a RecordField,
    schema: SchemaJson<'a>,
}

impl<'a> Serialize for FieldJson<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let field = self.field;
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("name", &field.name)?;
        map.serialize_entry("type", &self.schema)?;
        if let Some(ref doc) = field.doc {
            map.serialize_entry("doc", doc)?;
        }
        if let Some(ref default) = field.default {
            map.serialize_entry("default", default)?;
        }
        if field.order != FieldOrder::Ascending {
            let order: &'static str = field.order.into();
            map.serialize_entry("order", order)?;
        }
        for (key, value) in &field.custom_attributes {
            map.serialize_entry(key, value)?;
        }
        if !field.aliases.is_empty() {
            map.serialize_entry("aliases", &field.aliases)?;
        }
        map.end()
    }
}

/// Hashes a JSON value consistently with its equality: object keys are
/// visited in sorted order.
pub(crate) fn hash_json<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => 0u8.hash(state),
        Value::Bool(b) => {
            1u8.hash(state);
            b.hash(state);
        }
        Value::Number(n) => {
            2u8.hash(state);
            n.to_string().hash(state);
        }
        Value::String(s) => {
            3u8.hash(state);
            s.hash(state);
        }
        Value::Array(items) => {
            4u8.hash(state);
            items.len().hash(state);
            for item in items {
                hash_json(item, state);
            }
        }
        Value::Object(map) => {
            5u8.hash(state);
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            entries.len().hash(state);
            for (key, value) in entries {
                key.hash(state);
                hash_json(value, state);
            }
        }
    }
}

/// Hashes a property map independently of insertion order, matching its
/// equality.
pub(crate) fn hash_attributes<H: Hasher>(attributes: &IndexMap<String, Value>, state: &mut H) {
    let mut entries: Vec<_> = attributes.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries.len().hash(state);
    for (key, value) in entries {
        key.hash(state);
        hash_json(value, state);
    }
}
