//! Entity descriptors: the static metadata a data model registers with.
//!
//! A descriptor is built once at startup, wrapped in an `Arc`, and never
//! mutated afterwards. Everything else in the crate (serialization, route
//! compilation, the store backends) consumes it read-only.

use std::fmt;

/// Type tag for a declared field. Drives body type checks and the
/// PostgreSQL column type when a table is bootstrapped from the descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Float,
    Text,
    Boolean,
    /// RFC 3339 string on the wire, TIMESTAMPTZ in PostgreSQL.
    Timestamp,
    Json,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Text => "text",
            FieldType::Boolean => "boolean",
            FieldType::Timestamp => "timestamp",
            FieldType::Json => "json",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    pub name: String,
    pub type_tag: FieldType,
    /// Uniqueness is enforced by the store; violations surface as `Conflict`.
    pub unique: bool,
}

/// Static metadata for one data model: name, primary-key field, declared
/// fields in declaration order.
#[derive(Clone, Debug)]
pub struct EntityDescriptor {
    pub name: String,
    pub primary_key_field: String,
    pub fields: Vec<FieldDescriptor>,
}

impl EntityDescriptor {
    /// Every model gets a store-assigned integer key under this name unless
    /// overridden with [`with_primary_key`](Self::with_primary_key).
    pub const DEFAULT_PRIMARY_KEY: &'static str = "pk";

    pub fn new(name: impl Into<String>) -> Self {
        EntityDescriptor {
            name: name.into(),
            primary_key_field: Self::DEFAULT_PRIMARY_KEY.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key_field = field.into();
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, type_tag: FieldType) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            type_tag,
            unique: false,
        });
        self
    }

    pub fn with_unique_field(mut self, name: impl Into<String>, type_tag: FieldType) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            type_tag,
            unique: true,
        });
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// True for the primary key and every declared field.
    pub fn declares(&self, name: &str) -> bool {
        self.primary_key_field == name || self.field(name).is_some()
    }
}
