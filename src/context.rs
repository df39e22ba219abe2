use apache_avro::schema::Name;
use indexmap::IndexMap;

use crate::error::{ParseResult, SchemaParseError};
use crate::names;
use crate::schema::{AnnotatedSchema, RecordField, Schema, UnionSchema};

/// Registry of the named types of one protocol.
///
/// Names are declared before their definition is complete, so a type may
/// refer to itself or to types declared later in the same document. Stored
/// definitions never embed other named definitions: those are replaced by
/// [`Schema::Ref`] on registration. [`Context::commit`] checks that every
/// reference points at a defined type.
#[derive(Debug, Clone, Default)]
pub struct Context {
    named: IndexMap<String, Option<Schema>>,
    committed: bool,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `name`, fixing its position in definition order.
    ///
    /// Primitive type names cannot be redefined outside a namespace.
    pub(crate) fn declare(&mut self, name: &Name) -> ParseResult<()> {
        let fullname = name.fullname(None);
        if Schema::primitive(&fullname).is_some() {
            return Err(SchemaParseError::InvalidName(fullname));
        }
        if self.named.contains_key(&fullname) {
            return Err(SchemaParseError::DuplicateName(fullname));
        }
        self.named.insert(fullname, None);
        self.committed = false;
        Ok(())
    }

    /// Completes a declared name. `definition` must already be flattened.
    pub(crate) fn define(&mut self, definition: Schema) -> Schema {
        let name = match definition.name() {
            Some(name) => name.clone(),
            None => return definition,
        };
        self.named.insert(name.fullname(None), Some(definition));
        Schema::Ref { name }
    }

    /// Registers every named definition inside `schema`, outer types first,
    /// and returns `schema` with those definitions replaced by references.
    pub fn register(&mut self, schema: Schema) -> ParseResult<Schema> {
        match schema {
            Schema::Record(mut record) => {
                if let Some(ref name) = record.name {
                    self.declare(name)?;
                }
                record.fields = record
                    .fields
                    .into_iter()
                    .map(|field| {
                        Ok(RecordField {
                            schema: self.register(field.schema)?,
                            ..field
                        })
                    })
                    .collect::<ParseResult<_>>()?;
                Ok(self.define(Schema::Record(record)))
            }
            Schema::Enum(ref inner) => {
                self.declare(&inner.name)?;
                Ok(self.define(schema))
            }
            Schema::Fixed(ref inner) => {
                self.declare(&inner.name)?;
                Ok(self.define(schema))
            }
            Schema::Array(items) => Ok(Schema::Array(Box::new(self.register(*items)?))),
            Schema::Map(values) => Ok(Schema::Map(Box::new(self.register(*values)?))),
            Schema::Annotated(annotated) => Ok(Schema::Annotated(AnnotatedSchema {
                schema: Box::new(self.register(*annotated.schema)?),
                attributes: annotated.attributes,
            })),
            Schema::Union(union) => {
                let schemas = union
                    .schemas
                    .into_iter()
                    .map(|variant| self.register(variant))
                    .collect::<ParseResult<_>>()?;
                Ok(Schema::Union(UnionSchema { schemas }))
            }
            other => Ok(other),
        }
    }

    /// Finalizes the registry: every declaration must be defined and every
    /// reference must name a defined type.
    pub fn commit(&mut self) -> ParseResult<()> {
        for (fullname, definition) in self.named.iter() {
            match definition {
                Some(definition) => self.check_refs(definition)?,
                None => return Err(SchemaParseError::UndefinedName(fullname.clone())),
            }
        }
        self.committed = true;
        tracing::debug!(types = self.named.len(), "type context committed");
        Ok(())
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    fn check_refs(&self, schema: &Schema) -> ParseResult<()> {
        match schema {
            Schema::Ref { name } => {
                let fullname = name.fullname(None);
                match self.get(&fullname) {
                    Some(_) => Ok(()),
                    None => Err(SchemaParseError::UndefinedName(fullname)),
                }
            }
            Schema::Record(record) => record
                .fields
                .iter()
                .try_for_each(|field| self.check_refs(&field.schema)),
            Schema::Array(inner) | Schema::Map(inner) => self.check_refs(inner),
            Schema::Annotated(annotated) => self.check_refs(&annotated.schema),
            Schema::Union(union) => union
                .variants()
                .iter()
                .try_for_each(|variant| self.check_refs(variant)),
            _ => Ok(()),
        }
    }

    /// Returns `schema` bound to this registry: named types become references
    /// and every reference is checked.
    pub fn resolve(&self, schema: &Schema) -> ParseResult<Schema> {
        match schema {
            Schema::Ref { .. } => {
                self.check_refs(schema)?;
                Ok(schema.clone())
            }
            Schema::Enum(_) | Schema::Fixed(_) | Schema::Record(_) if schema.is_named() => {
                let fullname = schema.fullname().unwrap_or_default();
                match self.get(&fullname).and_then(Schema::name) {
                    Some(name) => Ok(Schema::Ref { name: name.clone() }),
                    None => Err(SchemaParseError::UndefinedName(fullname)),
                }
            }
            Schema::Record(record) => {
                let mut record = record.clone();
                for field in record.fields.iter_mut() {
                    field.schema = self.resolve(&field.schema)?;
                }
                Ok(Schema::Record(record))
            }
            Schema::Array(items) => Ok(Schema::Array(Box::new(self.resolve(items)?))),
            Schema::Map(values) => Ok(Schema::Map(Box::new(self.resolve(values)?))),
            Schema::Annotated(annotated) => Ok(Schema::Annotated(AnnotatedSchema {
                schema: Box::new(self.resolve(&annotated.schema)?),
                attributes: annotated.attributes.clone(),
            })),
            Schema::Union(union) => {
                let schemas = union
                    .variants()
                    .iter()
                    .map(|variant| self.resolve(variant))
                    .collect::<ParseResult<_>>()?;
                Ok(Schema::Union(UnionSchema { schemas }))
            }
            other => Ok(other.clone()),
        }
    }

    /// Every definition, in first-declared order.
    pub fn resolve_all(&self) -> ParseResult<Vec<&Schema>> {
        self.named
            .iter()
            .map(|(fullname, definition)| {
                definition
                    .as_ref()
                    .ok_or_else(|| SchemaParseError::UndefinedName(fullname.clone()))
            })
            .collect()
    }

    /// The defined types, in first-declared order.
    pub fn types(&self) -> impl Iterator<Item = &Schema> {
        self.named.values().flatten()
    }

    /// Looks a type up by its full name.
    pub fn get(&self, fullname: &str) -> Option<&Schema> {
        self.named.get(fullname).and_then(Option::as_ref)
    }

    /// Looks a type up the way references are resolved: qualified with
    /// `namespace` first, then as written.
    pub fn find(&self, name: &str, namespace: Option<&str>) -> Option<&Schema> {
        self.get(&names::fullname(name, namespace))
            .or_else(|| self.get(name))
    }

    /// Like [`Context::find`], but also sees names whose definition is still
    /// being parsed. Returns the full name.
    pub(crate) fn find_declared(&self, name: &str, namespace: Option<&str>) -> Option<String> {
        let qualified = names::fullname(name, namespace);
        if self.named.contains_key(&qualified) {
            Some(qualified)
        } else if self.named.contains_key(name) {
            Some(name.to_string())
        } else {
            None
        }
    }

    /// Follows a reference to its definition.
    pub fn deref<'s>(&'s self, schema: &'s Schema) -> &'s Schema {
        match schema {
            Schema::Ref { name } => self.get(&name.fullname(None)).unwrap_or(schema),
            _ => schema,
        }
    }

    pub fn is_error(&self, schema: &Schema) -> bool {
        self.deref(schema).is_error()
    }

    pub fn len(&self) -> usize {
        self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty()
    }
}
