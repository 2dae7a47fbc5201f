//! Field definitions for the canonical household schema
//!
//! A field definition carries the column name, its semantic type and the value
//! used when a source extract omits the column entirely.

use std::fmt;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int32Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field};

/// Semantic type of a canonical field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Opaque identifier
    Identifier,
    /// Free or categorical text
    Text,
    /// Small integer (ages, ordinal codes, counts)
    Integer,
    /// Wide integer code (IBGE municipality codes)
    Code,
    /// Decimal value (monetary amounts, scores)
    Decimal,
    /// Boolean flag
    Boolean,
}

impl FieldType {
    /// Arrow type used to store this field
    #[must_use]
    pub const fn to_arrow_type(self) -> DataType {
        match self {
            Self::Identifier | Self::Text => DataType::Utf8,
            Self::Integer => DataType::Int32,
            Self::Code => DataType::Int64,
            Self::Decimal => DataType::Float64,
            Self::Boolean => DataType::Boolean,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier => write!(f, "Identifier"),
            Self::Text => write!(f, "Text"),
            Self::Integer => write!(f, "Integer"),
            Self::Code => write!(f, "Code"),
            Self::Decimal => write!(f, "Decimal"),
            Self::Boolean => write!(f, "Boolean"),
        }
    }
}

/// Value substituted for a canonical column missing from a source extract
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// Integer default
    Int(i64),
    /// Decimal default
    Float(f64),
    /// Boolean default
    Bool(bool),
    /// Text default
    Text(&'static str),
    /// `row-<n>` where n is the row ordinal within the file
    RowOrdinal,
}

/// A canonical field definition
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    /// Column name in the canonical table
    pub name: &'static str,
    /// Description of the field
    pub description: &'static str,
    /// Semantic type
    pub field_type: FieldType,
    /// Default used when the source omits the column
    pub default: Option<DefaultValue>,
}

impl FieldDefinition {
    /// Create a new field definition without a default
    #[must_use]
    pub const fn new(name: &'static str, description: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            description,
            field_type,
            default: None,
        }
    }

    /// Attach the default used for absent source columns
    #[must_use]
    pub const fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Convert to an Arrow field. Canonical fields are always nullable so that
    /// cell-level gaps survive until the missing-value policy runs.
    #[must_use]
    pub fn to_arrow_field(&self) -> Field {
        Field::new(self.name, self.field_type.to_arrow_type(), true)
    }

    /// Build a column of `len` default values, starting row ordinals at `row_offset`
    ///
    /// Returns a null column when the field has no default.
    #[must_use]
    pub fn default_array(&self, len: usize, row_offset: usize) -> ArrayRef {
        match (&self.default, self.field_type) {
            (Some(DefaultValue::RowOrdinal), _) => Arc::new(StringArray::from_iter_values(
                (row_offset..row_offset + len).map(|row| format!("row-{row}")),
            )),
            (Some(DefaultValue::Text(text)), _) => {
                Arc::new(StringArray::from_iter_values(std::iter::repeat_n(*text, len)))
            }
            (Some(DefaultValue::Bool(value)), _) => {
                Arc::new(BooleanArray::from(vec![*value; len]))
            }
            (Some(DefaultValue::Float(value)), _) => {
                Arc::new(Float64Array::from(vec![*value; len]))
            }
            (Some(DefaultValue::Int(value)), FieldType::Code) => {
                Arc::new(Int64Array::from(vec![*value; len]))
            }
            (Some(DefaultValue::Int(value)), FieldType::Decimal) => {
                Arc::new(Float64Array::from(vec![*value as f64; len]))
            }
            (Some(DefaultValue::Int(value)), _) => {
                Arc::new(Int32Array::from(vec![*value as i32; len]))
            }
            (None, field_type) => arrow::array::new_null_array(&field_type.to_arrow_type(), len),
        }
    }
}
