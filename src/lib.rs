//! Avro protocol descriptors: parsing from JSON, canonical rendering and
//! fingerprinting.
//!
//! ```
//! use avpr_rs::Protocol;
//!
//! let protocol = Protocol::parse_str(r#"{
//!     "protocol": "org.example.Greeter",
//!     "messages": {
//!         "hello": {"request": [{"name": "who", "type": "string"}], "response": "string"}
//!     }
//! }"#).unwrap();
//! assert_eq!(protocol.namespace(), Some("org.example"));
//! assert!(!protocol.message("hello").unwrap().is_one_way());
//! ```

pub mod context;
pub mod error;
pub mod fingerprint;
pub mod message;
mod names;
pub mod parser;
pub mod protocol;
pub mod schema;
pub mod schema_parser;

pub use context::Context;
pub use error::{ParseResult, SchemaParseError};
pub use fingerprint::Fingerprint;
pub use message::{Message, MessageKind};
pub use parser::parse;
pub use protocol::{Protocol, VERSION};
pub use schema::{system_errors, RecordField, Schema, SchemaKind, SYSTEM_ERROR};
