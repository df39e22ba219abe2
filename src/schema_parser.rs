use std::collections::HashSet;
use std::str::FromStr;

use apache_avro::schema::Name;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::{ParseResult, SchemaParseError};
use crate::names;
use crate::schema::{EnumSchema, FieldOrder, FixedSchema, RecordField, RecordSchema, Schema};

const RECORD_RESERVED: [&str; 6] = ["type", "name", "namespace", "doc", "aliases", "fields"];
const ENUM_RESERVED: [&str; 7] = [
    "type",
    "name",
    "namespace",
    "doc",
    "aliases",
    "symbols",
    "default",
];
const FIXED_RESERVED: [&str; 6] = ["type", "name", "namespace", "doc", "aliases", "size"];
const RECORD_FIELD_RESERVED: [&str; 6] = ["name", "type", "doc", "default", "aliases", "order"];

/// Keys of a message parameter that are not copied as custom properties.
pub const FIELD_RESERVED: [&str; 5] = ["name", "type", "doc", "default", "aliases"];

/// Parses a type definition or reference, registering every named type it
/// declares into `context`.
///
/// Unqualified names are resolved in `namespace`. A reference to a name
/// that is not declared yet is kept as a forward reference; the context
/// commit reports it if it never gets defined.
pub fn parse_schema(
    json: &Value,
    context: &mut Context,
    namespace: Option<&str>,
) -> ParseResult<Schema> {
    match json {
        Value::String(name) => parse_reference(name, context, namespace),
        Value::Array(variants) => {
            let schemas = variants
                .iter()
                .map(|variant| parse_schema(variant, context, namespace))
                .collect::<ParseResult<_>>()?;
            Schema::union(schemas)
        }
        Value::Object(map) => parse_complex(json, map, context, namespace),
        _ => Err(SchemaParseError::malformed("Schema not valid", json)),
    }
}

fn parse_reference(
    name: &str,
    context: &Context,
    namespace: Option<&str>,
) -> ParseResult<Schema> {
    if let Some(schema) = Schema::primitive(name) {
        return Ok(schema);
    }
    let name = match context.find_declared(name, namespace) {
        Some(fullname) => {
            Name::new(&fullname).map_err(|_| SchemaParseError::InvalidName(fullname))?
        }
        None => names::parse_type_name(name, None, namespace)?,
    };
    Ok(Schema::Ref { name })
}

fn parse_complex(
    json: &Value,
    map: &Map<String, Value>,
    context: &mut Context,
    namespace: Option<&str>,
) -> ParseResult<Schema> {
    let kind = map
        .get("type")
        .ok_or_else(|| SchemaParseError::missing("type", json))?;
    let kind = match kind {
        Value::String(kind) => kind.as_str(),
        Value::Object(_) | Value::Array(_) => return parse_schema(kind, context, namespace),
        _ => return Err(SchemaParseError::malformed("Type not valid", json)),
    };
    match kind {
        "record" | "error" => parse_record(json, map, kind == "error", context, namespace),
        "enum" => parse_enum(json, map, context, namespace),
        "fixed" => parse_fixed(json, map, context, namespace),
        "array" => {
            let items = map
                .get("items")
                .ok_or_else(|| SchemaParseError::missing("array items", json))?;
            let items = parse_schema(items, context, namespace)?;
            Ok(Schema::annotated(
                Schema::Array(Box::new(items)),
                attributes(map, &["type", "items"]),
            ))
        }
        "map" => {
            let values = map
                .get("values")
                .ok_or_else(|| SchemaParseError::missing("map values", json))?;
            let values = parse_schema(values, context, namespace)?;
            Ok(Schema::annotated(
                Schema::Map(Box::new(values)),
                attributes(map, &["type", "values"]),
            ))
        }
        other => match Schema::primitive(other) {
            Some(primitive) => Ok(parse_logical(map, primitive)),
            None => parse_reference(other, context, namespace),
        },
    }
}

// Sample:
// ```
// {"type": "long", "logicalType": "timestamp-millis", "x-zone": "UTC"}
// ```
// Unknown or mismatched logical types fall back to the underlying type and
// stay as attributes.
fn parse_logical(map: &Map<String, Value>, primitive: Schema) -> Schema {
    const LOGICAL_RESERVED: [&str; 2] = ["type", "logicalType"];
    const DECIMAL_RESERVED: [&str; 4] = ["type", "logicalType", "precision", "scale"];

    let logical = map.get("logicalType").and_then(Value::as_str);
    let (schema, reserved): (Schema, &[&str]) = match (logical, &primitive) {
        (Some("decimal"), Schema::Bytes) => {
            let precision = map.get("precision").and_then(Value::as_u64);
            let scale = map.get("scale").and_then(Value::as_u64).unwrap_or(0);
            match precision {
                Some(precision) if precision > 0 && scale <= precision => (
                    Schema::Decimal {
                        precision: precision as usize,
                        scale: scale as usize,
                    },
                    &DECIMAL_RESERVED[..],
                ),
                _ => (primitive, &["type"][..]),
            }
        }
        (Some("uuid"), Schema::String) => (Schema::Uuid, &LOGICAL_RESERVED[..]),
        (Some("date"), Schema::Int) => (Schema::Date, &LOGICAL_RESERVED[..]),
        (Some("time-millis"), Schema::Int) => (Schema::TimeMillis, &LOGICAL_RESERVED[..]),
        (Some("time-micros"), Schema::Long) => (Schema::TimeMicros, &LOGICAL_RESERVED[..]),
        (Some("timestamp-millis"), Schema::Long) => (Schema::TimestampMillis, &LOGICAL_RESERVED[..]),
        (Some("timestamp-micros"), Schema::Long) => (Schema::TimestampMicros, &LOGICAL_RESERVED[..]),
        _ => (primitive, &["type"][..]),
    };
    Schema::annotated(schema, attributes(map, reserved))
}

fn parse_type_name(
    json: &Value,
    map: &Map<String, Value>,
    namespace: Option<&str>,
) -> ParseResult<Name> {
    let name = match map.get("name") {
        Some(Value::String(name)) => name,
        Some(_) => return Err(SchemaParseError::malformed("Name not a string", json)),
        None => return Err(SchemaParseError::missing("name", json)),
    };
    let explicit = match map.get("namespace") {
        Some(Value::String(ns)) => Some(ns.as_str()),
        Some(Value::Null) | None => None,
        Some(_) => return Err(SchemaParseError::malformed("Namespace not a string", json)),
    };
    names::parse_type_name(name, explicit, namespace)
}

fn parse_doc(map: &Map<String, Value>) -> Option<String> {
    map.get("doc").and_then(Value::as_str).map(String::from)
}

pub(crate) fn parse_aliases(json: &Value, map: &Map<String, Value>) -> ParseResult<Vec<String>> {
    match map.get("aliases") {
        None => Ok(Vec::new()),
        Some(Value::Array(aliases)) => aliases
            .iter()
            .map(|alias| {
                alias
                    .as_str()
                    .map(String::from)
                    .ok_or_else(|| SchemaParseError::malformed("alias not a string", json))
            })
            .collect(),
        Some(_) => Err(SchemaParseError::malformed("aliases not an array", json)),
    }
}

/// Every key of `map` not in `reserved`, as custom attributes.
fn attributes(map: &Map<String, Value>, reserved: &[&str]) -> IndexMap<String, Value> {
    map.iter()
        .filter(|(key, _)| !reserved.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

// Sample:
// ```
// {"type": "record", "name": "Employee", "fields": [{"name": "name", "type": "string"}]}
// ```
fn parse_record(
    json: &Value,
    map: &Map<String, Value>,
    is_error: bool,
    context: &mut Context,
    namespace: Option<&str>,
) -> ParseResult<Schema> {
    let name = parse_type_name(json, map, namespace)?;
    let aliases = parse_aliases(json, map)?;
    // Declared before the fields so that they may refer back to it.
    context.declare(&name)?;

    let fields = match map.get("fields") {
        Some(Value::Array(fields)) => fields,
        Some(_) => return Err(SchemaParseError::malformed("Fields not an array", json)),
        None => return Err(SchemaParseError::missing("fields", json)),
    };
    let mut seen = HashSet::new();
    let mut parsed = Vec::with_capacity(fields.len());
    for (position, field) in fields.iter().enumerate() {
        let field = parse_field(field, context, name.namespace.as_deref(), position, true)?;
        if !seen.insert(field.name.clone()) {
            return Err(SchemaParseError::malformed("Duplicate field name", json));
        }
        parsed.push(field);
    }

    let record = Schema::Record(RecordSchema {
        doc: parse_doc(map),
        aliases,
        fields: parsed,
        is_error,
        attributes: attributes(map, &RECORD_RESERVED),
        name: Some(name),
    });
    Ok(context.define(record))
}

/// Parses one record field or message parameter.
///
/// Message parameters keep no sort order of their own: an `order` key on
/// them is an ordinary custom property.
pub(crate) fn parse_field(
    json: &Value,
    context: &mut Context,
    namespace: Option<&str>,
    position: usize,
    record_field: bool,
) -> ParseResult<RecordField> {
    let map = json
        .as_object()
        .ok_or_else(|| SchemaParseError::malformed("Field not an object", json))?;
    let name = match map.get("name") {
        Some(Value::String(name)) => name,
        Some(_) => return Err(SchemaParseError::malformed("Field name not a string", json)),
        None => return Err(SchemaParseError::missing("field name", json)),
    };
    names::validate_identifier(name)?;
    let schema = map
        .get("type")
        .ok_or_else(|| SchemaParseError::missing("field type", json))?;
    let schema = parse_schema(schema, context, namespace)?;

    let (order, reserved) = if record_field {
        let order = match map.get("order") {
            None => FieldOrder::Ascending,
            Some(order) => order
                .as_str()
                .and_then(|order| FieldOrder::from_str(order).ok())
                .ok_or_else(|| SchemaParseError::malformed("Invalid field order", json))?,
        };
        (order, &RECORD_FIELD_RESERVED[..])
    } else {
        (FieldOrder::Ascending, &FIELD_RESERVED[..])
    };

    Ok(RecordField {
        name: name.clone(),
        doc: parse_doc(map),
        default: map.get("default").cloned(),
        schema,
        order,
        aliases: parse_aliases(json, map)?,
        position,
        custom_attributes: attributes(map, reserved),
    })
}

// Sample:
// ```
// {"type": "enum", "name": "Shapes", "symbols": ["SQUARE", "TRIANGLE"], "default": "SQUARE"}
// ```
fn parse_enum(
    json: &Value,
    map: &Map<String, Value>,
    context: &mut Context,
    namespace: Option<&str>,
) -> ParseResult<Schema> {
    let name = parse_type_name(json, map, namespace)?;
    let symbols = match map.get("symbols") {
        Some(Value::Array(symbols)) => symbols,
        Some(_) => return Err(SchemaParseError::malformed("Enum symbols not an array", json)),
        None => return Err(SchemaParseError::missing("enum symbols", json)),
    };
    let mut seen = HashSet::new();
    let mut parsed = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let symbol = symbol
            .as_str()
            .ok_or_else(|| SchemaParseError::malformed("Enum symbol not a string", json))?;
        names::validate_identifier(symbol)?;
        if !seen.insert(symbol) {
            return Err(SchemaParseError::malformed("Duplicate enum symbol", json));
        }
        parsed.push(symbol.to_string());
    }
    let default = match map.get("default") {
        None => None,
        Some(Value::String(default)) if seen.contains(default.as_str()) => Some(default.clone()),
        Some(_) => return Err(SchemaParseError::malformed("Enum default not a symbol", json)),
    };
    let aliases = parse_aliases(json, map)?;

    context.declare(&name)?;
    Ok(context.define(Schema::Enum(EnumSchema {
        name,
        aliases,
        doc: parse_doc(map),
        symbols: parsed,
        default,
        attributes: attributes(map, &ENUM_RESERVED),
    })))
}

// Sample:
// ```
// {"type": "fixed", "name": "MD5", "size": 16}
// ```
fn parse_fixed(
    json: &Value,
    map: &Map<String, Value>,
    context: &mut Context,
    namespace: Option<&str>,
) -> ParseResult<Schema> {
    let name = parse_type_name(json, map, namespace)?;
    let size = match map.get("size") {
        Some(size) => size
            .as_u64()
            .ok_or_else(|| SchemaParseError::malformed("Invalid fixed size", json))?,
        None => return Err(SchemaParseError::missing("fixed size", json)),
    };
    let aliases = parse_aliases(json, map)?;

    context.declare(&name)?;
    Ok(context.define(Schema::Fixed(FixedSchema {
        name,
        aliases,
        doc: parse_doc(map),
        size: size as usize,
        attributes: attributes(map, &FIXED_RESERVED),
    })))
}
