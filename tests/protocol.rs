use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use avpr_rs::{Protocol, Schema, SchemaParseError, SYSTEM_ERROR};
use rstest::{fixture, rstest};
use serde_json::{json, Value};

const SIMPLE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/simple.avpr");

#[fixture]
fn simple() -> Protocol {
    Protocol::parse_file(SIMPLE).unwrap()
}

fn hash_of(protocol: &Protocol) -> u64 {
    let mut hasher = DefaultHasher::new();
    protocol.hash(&mut hasher);
    hasher.finish()
}

#[rstest]
fn test_simple_shape(simple: Protocol) {
    assert_eq!(simple.name(), "Simple");
    assert_eq!(simple.namespace(), Some("org.example.simple"));
    assert_eq!(simple.doc(), Some("Protocol used for testing."));
    assert_eq!(simple.property("version"), Some(&json!("1.6.2")));

    let types: Vec<String> = simple.types().iter().filter_map(|t| t.fullname()).collect();
    assert_eq!(
        types,
        vec![
            "org.example.simple.Kind",
            "org.example.simple.MD5",
            "org.example.simple.TestRecord",
            "org.example.simple.TestError",
            "org.example.other.Owner",
            "Nick",
        ]
    );
    assert!(simple.get_type("TestError").map(Schema::is_error).unwrap_or(false));
    assert!(simple.get_type("org.example.other.Owner").is_some());

    let messages: Vec<&str> = simple.messages().map(|m| m.name()).collect();
    assert_eq!(
        messages,
        vec!["hello", "echo", "add", "echoBytes", "error", "ack", "lookup"]
    );
    assert_eq!(simple.message("add").unwrap().property("specialProp"), Some(&json!("test")));
}

#[rstest]
fn test_round_trip(simple: Protocol) {
    let rendered = simple.to_string();
    let reparsed = Protocol::parse_str(&rendered).unwrap();
    assert_eq!(reparsed, simple);
    assert_eq!(hash_of(&reparsed), hash_of(&simple));
    assert_eq!(reparsed.to_string(), rendered);
}

#[rstest]
fn test_fingerprint_stable(simple: Protocol) {
    let first = simple.fingerprint().unwrap();
    assert_eq!(simple.fingerprint().unwrap(), first);
    let reparsed = Protocol::parse_str(&simple.to_string()).unwrap();
    assert_eq!(reparsed.fingerprint().unwrap(), first);

    let pretty = Protocol::parse_str(&simple.to_json_string(true).unwrap()).unwrap();
    assert_eq!(pretty.fingerprint().unwrap(), first);
}

#[rstest]
fn test_canonical_references(simple: Protocol) {
    let rendered: Value = serde_json::from_str(&simple.to_string()).unwrap();
    let types = rendered["types"].as_array().unwrap();
    // Owner and Nick are written inline inside TestRecord.
    assert_eq!(types.len(), 4);
    let owner = &types[2]["fields"][4]["type"][1];
    assert_eq!(owner["namespace"], json!("org.example.other"));
    assert_eq!(owner["fields"][0]["type"], json!("org.example.simple.MD5"));
    assert_eq!(owner["fields"][1]["type"]["namespace"], json!(""));
    assert_eq!(types[2]["fields"][3]["type"], json!(["null", "TestRecord"]));

    let lookup = &rendered["messages"]["lookup"];
    assert_eq!(lookup["request"][0]["type"], json!("org.example.other.Owner"));
    assert_eq!(lookup["response"], json!(["null", "Kind"]));
}

#[rstest]
#[case(json!({"protocol": "a.b.C"}), "C", Some("a.b"))]
#[case(json!({"protocol": "a.b.C", "namespace": "x.y"}), "C", Some("a.b"))]
#[case(json!({"protocol": "C", "namespace": ""}), "C", None)]
#[case(json!({"protocol": "C", "namespace": "x.y"}), "C", Some("x.y"))]
fn test_name_splitting(#[case] input: Value, #[case] name: &str, #[case] namespace: Option<&str>) {
    let protocol = Protocol::parse(&input).unwrap();
    assert_eq!(protocol.name(), name);
    assert_eq!(protocol.namespace(), namespace);
}

#[test]
fn test_one_way_validation() {
    let with = |message: Value| json!({"protocol": "P", "messages": {"m": message}});

    let errors = with(json!({"request": [], "one-way": true, "errors": []}));
    assert!(matches!(
        Protocol::parse(&errors),
        Err(SchemaParseError::OneWayWithErrors(_))
    ));

    let response = with(json!({"request": [], "one-way": true, "response": "string"}));
    assert!(matches!(
        Protocol::parse(&response),
        Err(SchemaParseError::OneWayResponseNotNull(_))
    ));

    let protocol = Protocol::parse(&with(json!({"request": [], "one-way": true}))).unwrap();
    let message = protocol.message("m").unwrap();
    assert!(message.is_one_way());
    assert_eq!(message.response(), &Schema::Null);
    assert_eq!(message.errors().variants().map(<[Schema]>::len), Some(0));
}

#[test]
fn test_system_error_injection() {
    let protocol = Protocol::parse(&json!({
        "protocol": "P",
        "types": [{"type": "error", "name": "Busy", "fields": []}],
        "messages": {
            "plain": {"request": [], "response": "int"},
            "guarded": {"request": [], "response": "int", "errors": ["Busy"]}
        }
    }))
    .unwrap();

    let plain = protocol.message("plain").unwrap();
    assert_eq!(plain.errors().variants(), Some(&[SYSTEM_ERROR][..]));

    let guarded = protocol.message("guarded").unwrap();
    let variants = guarded.errors().variants().unwrap();
    assert_eq!(variants.len(), 2);
    assert_eq!(variants[0], SYSTEM_ERROR);
    assert_eq!(variants[1].fullname().as_deref(), Some("Busy"));

    let rendered: Value = serde_json::from_str(&protocol.to_string()).unwrap();
    assert!(rendered["messages"]["plain"].get("errors").is_none());
    assert_eq!(rendered["messages"]["guarded"]["errors"], json!(["Busy"]));
}

#[test]
fn test_forward_reference() {
    let protocol = Protocol::parse(&json!({
        "protocol": "P",
        "namespace": "ns",
        "types": [
            {"type": "record", "name": "A", "fields": [{"name": "b", "type": "B"}]},
            {"type": "record", "name": "B", "fields": [{"name": "a", "type": ["null", "A"]}]}
        ],
        "messages": {"m": {"request": [{"name": "b", "type": "B"}], "response": "A"}}
    }))
    .unwrap();
    assert_eq!(protocol.types().len(), 2);
    assert_eq!(
        protocol.message("m").unwrap().response().fullname().as_deref(),
        Some("ns.A")
    );

    let undefined = Protocol::parse(&json!({
        "protocol": "P",
        "namespace": "ns",
        "messages": {"m": {"request": [{"name": "x", "type": "Nowhere"}], "response": "null"}}
    }));
    assert!(matches!(undefined, Err(SchemaParseError::UndefinedName(n)) if n == "ns.Nowhere"));

    let dangling_type = Protocol::parse(&json!({
        "protocol": "P",
        "types": [{"type": "record", "name": "A", "fields": [{"name": "b", "type": "Nowhere"}]}]
    }));
    assert!(matches!(dangling_type, Err(SchemaParseError::UndefinedName(_))));
}

#[test]
fn test_dedup_emission() {
    let protocol = Protocol::parse(&json!({
        "protocol": "Dedup",
        "namespace": "ns",
        "messages": {
            "first": {
                "request": [{
                    "name": "a",
                    "type": {"type": "record", "name": "Foo", "fields": [{"name": "x", "type": "int"}]}
                }],
                "response": "null"
            },
            "second": {"request": [{"name": "b", "type": "ns.Foo"}], "response": "Foo"}
        }
    }))
    .unwrap();

    let text = protocol.to_string();
    assert_eq!(text.matches(r#""name":"Foo""#).count(), 1);

    let rendered: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(rendered["types"][0]["name"], json!("Foo"));
    assert_eq!(rendered["messages"]["first"]["request"][0]["type"], json!("Foo"));
    assert_eq!(rendered["messages"]["second"]["request"][0]["type"], json!("Foo"));
    assert_eq!(rendered["messages"]["second"]["response"], json!("Foo"));
}

#[test]
fn test_parse_reader_matches_file() {
    let file = std::fs::File::open(SIMPLE).unwrap();
    let from_reader = Protocol::parse_reader(file).unwrap();
    assert_eq!(from_reader, Protocol::parse_file(SIMPLE).unwrap());
    assert!(matches!(
        Protocol::parse_file("does/not/exist.avpr"),
        Err(SchemaParseError::Io(_))
    ));
}

#[test]
fn test_annotated_types_round_trip() {
    let input = json!({
        "protocol": "Clock",
        "namespace": "org.example",
        "messages": {
            "stamp": {
                "request": [
                    {"name": "zone", "type": {"type": "string", "avro.java.string": "String"}},
                    {"name": "at", "type": {"type": "long", "logicalType": "local-timestamp-millis"}},
                    {"name": "tags", "type": {"type": "array", "items": "string", "x-max": 8}}
                ],
                "response": {"type": "long", "logicalType": "timestamp-millis", "x-zone": "UTC"}
            }
        }
    });
    let protocol = Protocol::parse(&input).unwrap();
    let rendered: Value = serde_json::from_str(&protocol.to_string()).unwrap();
    let stamp = &rendered["messages"]["stamp"];
    assert_eq!(stamp["request"], input["messages"]["stamp"]["request"]);
    assert_eq!(stamp["response"], input["messages"]["stamp"]["response"]);

    let reparsed = Protocol::parse_str(&protocol.to_string()).unwrap();
    assert_eq!(reparsed, protocol);
    assert_eq!(hash_of(&reparsed), hash_of(&protocol));
    assert_eq!(reparsed.fingerprint().unwrap(), protocol.fingerprint().unwrap());

    let plain = Protocol::parse(&json!({
        "protocol": "Clock",
        "namespace": "org.example",
        "messages": {
            "stamp": {
                "request": [
                    {"name": "zone", "type": "string"},
                    {"name": "at", "type": "long"},
                    {"name": "tags", "type": {"type": "array", "items": "string"}}
                ],
                "response": {"type": "long", "logicalType": "timestamp-millis"}
            }
        }
    }))
    .unwrap();
    assert_ne!(plain, protocol);
    assert_ne!(plain.fingerprint().unwrap(), protocol.fingerprint().unwrap());
}

#[test]
fn test_duplicate_parameter_rejected() {
    let input = json!({
        "protocol": "P",
        "messages": {"m": {"request": [{"name": "a", "type": "int"}, {"name": "a", "type": "long"}], "response": "null"}}
    });
    assert!(matches!(
        Protocol::parse(&input),
        Err(SchemaParseError::Malformed { what: "Duplicate field name", .. })
    ));
}
