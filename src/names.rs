use apache_avro::schema::Name;
use nom::{
    bytes::complete::take_while,
    character::complete::char,
    combinator::{all_consuming, recognize, verify},
    multi::separated_list1,
    IResult,
};

use crate::error::{ParseResult, SchemaParseError};
use crate::schema::Schema;

// The name portion of the fullname of named types, record field names, and enum symbols must:
//
// - start with [A-Za-z_]
// - subsequently contain only [A-Za-z0-9_]
// https://avro.apache.org/docs/1.11.1/specification/#names
fn parse_var_name(input: &str) -> IResult<&str, &str> {
    verify(
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        |s: &str| s.chars().take(1).any(|c| c.is_ascii_alphabetic() || c == '_'),
    )(input)
}

// Sample:
// ```
// org.apache.avro.test
// ```
fn parse_namespace_value(input: &str) -> IResult<&str, &str> {
    recognize(separated_list1(char('.'), parse_var_name))(input)
}

/// Checks a field name or enum symbol.
pub(crate) fn validate_identifier(name: &str) -> ParseResult<()> {
    all_consuming(parse_var_name)(name)
        .map(|_| ())
        .map_err(|_| SchemaParseError::InvalidName(name.to_string()))
}

fn validate_namespace(namespace: &str) -> ParseResult<()> {
    all_consuming(parse_namespace_value)(namespace)
        .map(|_| ())
        .map_err(|_| SchemaParseError::InvalidName(namespace.to_string()))
}

/// Splits a protocol name at its last dot. An empty namespace is normalized
/// to none, whichever way it was given.
pub(crate) fn split_protocol_name(
    name: &str,
    namespace: Option<&str>,
) -> (String, Option<String>) {
    let (name, namespace) = match name.rfind('.') {
        Some(dot) => (&name[dot + 1..], Some(&name[..dot])),
        None => (name, namespace),
    };
    (
        name.to_string(),
        namespace.filter(|ns| !ns.is_empty()).map(String::from),
    )
}

/// Builds the name of a named type declaration.
///
/// A dotted `raw` name carries its own namespace. Otherwise the explicit
/// `namespace` attribute wins over the enclosing one, with `""` selecting the
/// null namespace.
pub(crate) fn parse_type_name(
    raw: &str,
    namespace: Option<&str>,
    enclosing: Option<&str>,
) -> ParseResult<Name> {
    let mut name = Name::new(raw).map_err(|_| SchemaParseError::InvalidName(raw.to_string()))?;
    validate_identifier(&name.name)?;
    if let Some(ref ns) = name.namespace {
        validate_namespace(ns)?;
    }
    if name.namespace.is_none() && !raw.contains('.') {
        let namespace = match namespace {
            Some(ns) => Some(ns),
            None => enclosing,
        };
        name.namespace = match namespace.filter(|ns| !ns.is_empty()) {
            Some(ns) => {
                validate_namespace(ns)?;
                Some(ns.to_string())
            }
            None => None,
        };
    }
    Ok(name)
}

/// Qualifies an unqualified reference with the given namespace.
pub(crate) fn fullname(name: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() && !name.contains('.') => format!("{ns}.{name}"),
        _ => name.to_string(),
    }
}

/// How a reference to `name` is written from inside `namespace`.
pub(crate) fn qualified(name: &Name, namespace: Option<&str>) -> String {
    let same_space = match name.namespace.as_deref() {
        None => true,
        Some(ns) => Some(ns) == namespace,
    };
    if same_space && Schema::primitive(&name.name).is_none() {
        name.name.clone()
    } else {
        name.fullname(None)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("my_name", "my_name", "")]
    #[case("numbers3", "numbers3", "")]
    #[case("_n20umbers3_", "_n20umbers3_", "")]
    #[case("name.rest", "name", ".rest")]
    fn test_varname(#[case] input: &str, #[case] expected: &str, #[case] tail: &str) {
        assert_eq!(parse_var_name(input), Ok((tail, expected)))
    }

    #[rstest]
    #[case("1var_name")]
    #[case("-1var_name")]
    #[case("$0_1var_name")]
    #[case("")]
    fn test_parse_var_name_fail(#[case] input: &str) {
        assert!(parse_var_name(input).is_err());
    }

    #[rstest]
    #[case("org.apache.avro.test", true)]
    #[case("ns", true)]
    #[case("org..avro", false)]
    #[case("org.1avro", false)]
    #[case("org.", false)]
    fn test_validate_namespace(#[case] input: &str, #[case] ok: bool) {
        assert_eq!(validate_namespace(input).is_ok(), ok);
    }

    #[rstest]
    #[case("a.b.C", None, "C", Some("a.b"))]
    #[case("a.b.C", Some("x.y"), "C", Some("a.b"))]
    #[case("C", Some("x.y"), "C", Some("x.y"))]
    #[case("C", Some(""), "C", None)]
    #[case("C", None, "C", None)]
    #[case(".C", None, "C", None)]
    fn test_split_protocol_name(
        #[case] input: &str,
        #[case] namespace: Option<&str>,
        #[case] name: &str,
        #[case] expected_ns: Option<&str>,
    ) {
        assert_eq!(
            split_protocol_name(input, namespace),
            (name.to_string(), expected_ns.map(String::from))
        );
    }

    #[rstest]
    #[case("Foo", None, Some("outer"), "outer.Foo")]
    #[case("Foo", Some("inner"), Some("outer"), "inner.Foo")]
    #[case("Foo", Some(""), Some("outer"), "Foo")]
    #[case("a.b.Foo", Some("inner"), Some("outer"), "a.b.Foo")]
    #[case("Foo", None, None, "Foo")]
    fn test_parse_type_name(
        #[case] raw: &str,
        #[case] namespace: Option<&str>,
        #[case] enclosing: Option<&str>,
        #[case] expected: &str,
    ) {
        let name = parse_type_name(raw, namespace, enclosing).unwrap();
        assert_eq!(name.fullname(None), expected);
    }

    #[rstest]
    #[case("1Foo", None)]
    #[case("Foo", Some("bad..ns"))]
    #[case("Fo-o", None)]
    fn test_parse_type_name_fail(#[case] raw: &str, #[case] namespace: Option<&str>) {
        assert!(matches!(
            parse_type_name(raw, namespace, None),
            Err(SchemaParseError::InvalidName(_))
        ));
    }

    #[rstest]
    #[case("Foo", Some("ns"), "ns.Foo")]
    #[case("other.Foo", Some("ns"), "other.Foo")]
    #[case("Foo", Some(""), "Foo")]
    #[case("Foo", None, "Foo")]
    fn test_fullname(#[case] name: &str, #[case] namespace: Option<&str>, #[case] expected: &str) {
        assert_eq!(fullname(name, namespace), expected);
    }

    #[rstest]
    #[case("ns.Foo", Some("ns"), "Foo")]
    #[case("ns.Foo", Some("other"), "ns.Foo")]
    #[case("ns.Foo", None, "ns.Foo")]
    #[case("Foo", Some("ns"), "Foo")]
    #[case("ns.int", Some("ns"), "ns.int")]
    fn test_qualified(#[case] full: &str, #[case] namespace: Option<&str>, #[case] expected: &str) {
        let name = Name::new(full).unwrap();
        assert_eq!(qualified(&name, namespace), expected);
    }
}
