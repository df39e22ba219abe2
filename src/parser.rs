use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::{ParseResult, SchemaParseError};
use crate::message::{self, Message, MESSAGE_RESERVED};
use crate::protocol::{Protocol, PROTOCOL_RESERVED};
use crate::schema::{Schema, SYSTEM_ERROR};
use crate::schema_parser::{parse_field, parse_schema};

/// A message as read from the document, before the type context commits.
///
/// Its types may still hold forward references; it only becomes a
/// [`Message`] once they have been bound to the committed context.
#[derive(Debug)]
struct RawMessage {
    name: String,
    doc: Option<String>,
    properties: IndexMap<String, Value>,
    request: Schema,
    reply: RawReply,
}

#[derive(Debug)]
enum RawReply {
    OneWay,
    TwoWay { response: Schema, errors: Vec<Schema> },
}

impl RawMessage {
    fn resolve(self, context: &Context) -> ParseResult<Message> {
        let request = context.resolve(&self.request)?;
        let message = match self.reply {
            RawReply::OneWay => Message::one_way(self.name, self.doc, self.properties, request),
            RawReply::TwoWay { response, errors } => {
                let response = context.resolve(&response)?;
                let mut union = Vec::with_capacity(errors.len() + 1);
                union.push(SYSTEM_ERROR);
                for error in errors.iter() {
                    union.push(context.resolve(error)?);
                }
                Message::two_way(
                    self.name,
                    self.doc,
                    self.properties,
                    request,
                    response,
                    Schema::union(union)?,
                )
            }
        };
        Ok(message)
    }
}

/// Reads a protocol document.
///
/// Types and messages may refer to types defined later in the document;
/// every reference is checked once all of them have been read. Nothing
/// outside the returned value is touched, so a failed parse leaves no trace.
pub fn parse(json: &Value) -> ParseResult<Protocol> {
    let document = json
        .as_object()
        .ok_or_else(|| SchemaParseError::malformed("Protocol not an object", json))?;

    let name = document
        .get("protocol")
        .and_then(Value::as_str)
        .ok_or_else(|| SchemaParseError::missing("protocol name", json))?;
    let namespace = document.get("namespace").and_then(Value::as_str);
    let mut protocol = Protocol::new(name, None, namespace);
    tracing::debug!(protocol = %protocol.name(), namespace = ?protocol.namespace(), "parsing protocol");

    let mut context = Context::new();
    let namespace = protocol.namespace().map(String::from);
    let namespace = namespace.as_deref();

    if let Some(types) = document.get("types") {
        parse_types(types, &mut context, namespace)?;
    }

    let mut raw_messages = Vec::new();
    if let Some(messages) = document.get("messages") {
        let messages = messages
            .as_object()
            .ok_or_else(|| SchemaParseError::malformed("Messages not an object", messages))?;
        for (name, message) in messages {
            raw_messages.push(parse_message(name, message, &mut context, namespace)?);
        }
    }

    protocol.doc = document.get("doc").and_then(Value::as_str).map(String::from);

    for (key, value) in document {
        if !PROTOCOL_RESERVED.contains(&key.as_str()) {
            protocol.add_property(key.clone(), value.clone())?;
        }
    }

    context.commit()?;
    let resolved = context.resolve_all()?.len();
    tracing::debug!(types = resolved, messages = raw_messages.len(), "resolving messages");

    for raw in raw_messages {
        let message = raw.resolve(&context)?;
        tracing::trace!(message = %message.name(), one_way = message.is_one_way(), "message rebuilt");
        protocol.messages.insert(message.name().to_string(), message);
    }
    protocol.context = context;
    Ok(protocol)
}

fn parse_types(types: &Value, context: &mut Context, namespace: Option<&str>) -> ParseResult<()> {
    let types = types
        .as_array()
        .ok_or_else(|| SchemaParseError::malformed("Types not an array", types))?;
    for definition in types {
        if !definition.is_object() {
            return Err(SchemaParseError::malformed("Type not an object", definition));
        }
        let schema = parse_schema(definition, context, namespace)?;
        tracing::trace!(kind = ?schema.kind(), name = ?schema.fullname(), "type parsed");
    }
    Ok(())
}

// Sample:
// ```
// {"request": [{"name": "greeting", "type": "Greeting"}], "response": "Greeting", "errors": ["Curse"]}
// ```
fn parse_message(
    name: &str,
    json: &Value,
    context: &mut Context,
    namespace: Option<&str>,
) -> ParseResult<RawMessage> {
    let descriptor = json
        .as_object()
        .ok_or_else(|| SchemaParseError::malformed("Message not an object", json))?;
    let doc = descriptor.get("doc").and_then(Value::as_str).map(String::from);

    let mut properties = IndexMap::new();
    for (key, value) in descriptor {
        if !MESSAGE_RESERVED.contains(&key.as_str()) {
            message::add_property(&mut properties, &MESSAGE_RESERVED, key.clone(), value.clone())?;
        }
    }

    let request = parse_request(json, descriptor, context, namespace)?;

    let one_way = match descriptor.get("one-way") {
        None => false,
        Some(Value::Bool(one_way)) => *one_way,
        Some(_) => return Err(SchemaParseError::malformed("one-way must be boolean", json)),
    };

    let reply = if one_way {
        if descriptor.contains_key("errors") {
            return Err(SchemaParseError::OneWayWithErrors(json.clone()));
        }
        if let Some(response) = descriptor.get("response") {
            let response = parse_schema(response, context, namespace)?;
            if *response.unannotated() != Schema::Null {
                return Err(SchemaParseError::OneWayResponseNotNull(json.clone()));
            }
        }
        RawReply::OneWay
    } else {
        let response = descriptor
            .get("response")
            .ok_or_else(|| SchemaParseError::missing("response", json))?;
        let response = parse_schema(response, context, namespace)?;
        let errors = match descriptor.get("errors") {
            Some(errors) => parse_errors(errors, context, namespace)?,
            None => Vec::new(),
        };
        RawReply::TwoWay { response, errors }
    };

    Ok(RawMessage {
        name: name.to_string(),
        doc,
        properties,
        request,
        reply,
    })
}

fn parse_request(
    json: &Value,
    descriptor: &Map<String, Value>,
    context: &mut Context,
    namespace: Option<&str>,
) -> ParseResult<Schema> {
    let params = match descriptor.get("request") {
        Some(Value::Array(params)) => params,
        Some(_) => return Err(SchemaParseError::malformed("Request not an array", json)),
        None => return Err(SchemaParseError::missing("request", json)),
    };
    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(params.len());
    for (position, param) in params.iter().enumerate() {
        let field = parse_field(param, context, namespace, position, false)?;
        if !seen.insert(field.name.clone()) {
            return Err(SchemaParseError::malformed("Duplicate field name", json));
        }
        fields.push(field);
    }
    Ok(Schema::record(fields))
}

/// Declared errors must already be defined, and must be error records.
fn parse_errors(
    errors: &Value,
    context: &Context,
    namespace: Option<&str>,
) -> ParseResult<Vec<Schema>> {
    let names = errors
        .as_array()
        .ok_or_else(|| SchemaParseError::malformed("Errors not an array", errors))?;
    names
        .iter()
        .map(|name| {
            let name = name
                .as_str()
                .ok_or_else(|| SchemaParseError::malformed("Error name not a string", errors))?;
            let schema = context
                .find(name, namespace)
                .ok_or_else(|| SchemaParseError::UndefinedError(name.to_string()))?;
            if !schema.is_error() {
                return Err(SchemaParseError::NotAnError(name.to_string()));
            }
            context.resolve(schema)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::MessageKind;
    use apache_avro::schema::Name;
    use rstest::rstest;
    use serde_json::json;

    fn with_messages(types: Value, messages: Value) -> Value {
        json!({
            "protocol": "Greeter",
            "namespace": "org.example",
            "types": types,
            "messages": messages
        })
    }

    fn busy() -> Value {
        json!({"type": "error", "name": "Busy", "fields": []})
    }

    #[test]
    fn test_parse_minimal() {
        let protocol = parse(&json!({"protocol": "Empty"})).unwrap();
        assert_eq!(protocol.name(), "Empty");
        assert_eq!(protocol.namespace(), None);
        assert!(protocol.types().is_empty());
        assert!(protocol.messages().next().is_none());
    }

    #[rstest]
    #[case(json!({"namespace": "a"}))]
    #[case(json!({"protocol": 7}))]
    #[case(json!(["protocol"]))]
    #[case(json!({"protocol": "P", "types": {}}))]
    #[case(json!({"protocol": "P", "types": ["string"]}))]
    #[case(json!({"protocol": "P", "messages": []}))]
    #[case(json!({"protocol": "P", "messages": {"m": {"response": "null"}}}))]
    #[case(json!({"protocol": "P", "messages": {"m": {"request": {}, "response": "null"}}}))]
    #[case(json!({"protocol": "P", "messages": {"m": {"request": []}}}))]
    #[case(json!({"protocol": "P", "messages": {"m": {"request": [{"type": "int"}], "response": "null"}}}))]
    #[case(json!({"protocol": "P", "messages": {"m": {"request": [{"name": "a"}], "response": "null"}}}))]
    #[case(json!({"protocol": "P", "messages": {"m": {"request": [], "response": "null", "one-way": "yes"}}}))]
    #[case(json!({"protocol": "P", "messages": {"m": {"request": [], "response": "null", "errors": "Busy"}}}))]
    #[case(json!({"protocol": "P", "messages": {"m": {"request": [], "response": "Nowhere"}}}))]
    #[case(json!({"protocol": "P", "messages": {"m": {"request": [{"name": "a", "type": "int"}, {"name": "a", "type": "string"}], "response": "null"}}}))]
    fn test_parse_fail(#[case] input: Value) {
        assert!(parse(&input).is_err());
    }

    #[test]
    fn test_one_way_with_errors() {
        let input = with_messages(
            json!([busy()]),
            json!({"ping": {"request": [], "one-way": true, "errors": ["Busy"]}}),
        );
        assert!(matches!(parse(&input), Err(SchemaParseError::OneWayWithErrors(_))));
    }

    #[rstest]
    #[case(json!("string"))]
    #[case(json!(["null"]))]
    fn test_one_way_response_not_null(#[case] response: Value) {
        let input = with_messages(
            json!([]),
            json!({"ping": {"request": [], "one-way": true, "response": response}}),
        );
        assert!(matches!(parse(&input), Err(SchemaParseError::OneWayResponseNotNull(_))));
    }

    #[rstest]
    #[case(json!("null"))]
    #[case(json!({"type": "null", "x-note": "nothing"}))]
    fn test_one_way_accepts_null_response(#[case] response: Value) {
        let input = with_messages(
            json!([]),
            json!({"ping": {"request": [], "one-way": true, "response": response}}),
        );
        let protocol = parse(&input).unwrap();
        assert!(protocol.message("ping").unwrap().is_one_way());
    }

    #[test]
    fn test_duplicate_parameter_name() {
        let input = with_messages(
            json!([]),
            json!({"m": {"request": [{"name": "a", "type": "int"}, {"name": "a", "type": "string"}], "response": "null"}}),
        );
        assert!(matches!(
            parse(&input),
            Err(SchemaParseError::Malformed { what: "Duplicate field name", .. })
        ));
    }

    #[test]
    fn test_undefined_error() {
        let input = with_messages(
            json!([]),
            json!({"hello": {"request": [], "response": "string", "errors": ["Busy"]}}),
        );
        assert!(matches!(parse(&input), Err(SchemaParseError::UndefinedError(n)) if n == "Busy"));
    }

    #[test]
    fn test_not_an_error() {
        let input = with_messages(
            json!([{"type": "record", "name": "Busy", "fields": []}]),
            json!({"hello": {"request": [], "response": "string", "errors": ["Busy"]}}),
        );
        assert!(matches!(parse(&input), Err(SchemaParseError::NotAnError(n)) if n == "Busy"));
    }

    #[test]
    fn test_errors_resolved_behind_system_error() {
        let input = with_messages(
            json!([busy()]),
            json!({"hello": {"request": [], "response": "string", "errors": ["Busy"]}}),
        );
        let protocol = parse(&input).unwrap();
        let message = protocol.message("hello").unwrap();
        match message.kind() {
            MessageKind::TwoWay { response, errors } => {
                assert_eq!(response, &Schema::String);
                assert_eq!(
                    errors.variants().unwrap(),
                    &[
                        SYSTEM_ERROR,
                        Schema::Ref { name: Name::new("org.example.Busy").unwrap() }
                    ][..]
                );
            }
            MessageKind::OneWay => panic!("expected a two-way message"),
        }
    }

    #[test]
    fn test_reserved_and_custom_properties() {
        let input = json!({
            "protocol": "P",
            "doc": "documented",
            "x-version": 2,
            "messages": {
                "m": {
                    "doc": "does m",
                    "request": [{"name": "a", "type": "int", "x-field": "f"}],
                    "response": "null",
                    "x-message": [1]
                }
            },
            "x-owner": "team"
        });
        let protocol = parse(&input).unwrap();
        assert_eq!(protocol.doc(), Some("documented"));
        let keys: Vec<&String> = protocol.properties().keys().collect();
        assert_eq!(keys, vec!["x-version", "x-owner"]);

        let message = protocol.message("m").unwrap();
        assert_eq!(message.doc(), Some("does m"));
        assert_eq!(message.properties().len(), 1);
        assert_eq!(message.property("x-message"), Some(&json!([1])));
        let field = &message.request().fields().unwrap()[0];
        assert_eq!(field.custom_attributes.get("x-field"), Some(&json!("f")));
    }

    #[test]
    fn test_message_order_follows_document() {
        let input = with_messages(
            json!([]),
            json!({
                "zeta": {"request": [], "response": "null"},
                "alpha": {"request": [], "response": "null"},
                "mid": {"request": [], "response": "null", "one-way": true}
            }),
        );
        let protocol = parse(&input).unwrap();
        let names: Vec<&str> = protocol.messages().map(Message::name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_inline_type_in_request_is_registered() {
        let input = with_messages(
            json!([]),
            json!({
                "send": {
                    "request": [{"name": "h", "type": {"type": "fixed", "name": "Hash", "size": 2}}],
                    "response": "Hash"
                }
            }),
        );
        let protocol = parse(&input).unwrap();
        assert!(protocol.get_type("Hash").is_some());
        let message = protocol.message("send").unwrap();
        let hash = Schema::Ref { name: Name::new("org.example.Hash").unwrap() };
        assert_eq!(message.response(), &hash);
        assert_eq!(message.request().fields().unwrap()[0].schema, hash);
    }
}
