//! Value model and schema inference.
//!
//! Every source value is marshaled into one [`Value`] variant. The column
//! type is decided once, when the schema is resolved, and every partition is
//! then held to it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, Result};

/// The closed set of column types a loaded table can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Int64,
    Float64,
    Boolean,
    Utf8,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int64 => "int64",
            DataType::Float64 => "float64",
            DataType::Boolean => "boolean",
            DataType::Utf8 => "utf8",
        };
        f.write_str(name)
    }
}

/// A single cell as produced by a connector.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int64(i64),
    Float64(f64),
    Bool(bool),
    Str(String),
    Null,
}

impl Value {
    /// The type this value would imply during inference, `None` for NULL.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float64(_) => Some(DataType::Float64),
            Value::Bool(_) => Some(DataType::Boolean),
            Value::Str(_) => Some(DataType::Utf8),
            Value::Null => None,
        }
    }

    /// Name used in type mismatch messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int64(_) => "int64",
            Value::Float64(_) => "float64",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "utf8",
            Value::Null => "null",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A named, typed column slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl Field {
    /// A nullable field. Loaded columns are nullable unless declared otherwise.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn non_null(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: false,
        }
    }
}

/// Ordered fields with unique names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Field>", into = "Vec<Field>")]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(LoadError::InvalidConfig(format!(
                    "duplicate column name '{}'",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

impl TryFrom<Vec<Field>> for Schema {
    type Error = LoadError;

    fn try_from(fields: Vec<Field>) -> Result<Self> {
        Schema::new(fields)
    }
}

impl From<Schema> for Vec<Field> {
    fn from(schema: Schema) -> Self {
        schema.fields
    }
}

/// Infer a schema from the first rows of a result set.
///
/// The first non-null value of a column fixes its type. An integer column
/// that later shows a float widens to float64; any other disagreement is a
/// [`LoadError::TypeMismatch`] (reported against partition 0, the sampled rows).
/// Columns that are NULL in every sampled row default to utf8. All inferred
/// fields are nullable.
pub fn infer_schema<S: AsRef<str>>(names: &[S], first_rows: &[Vec<Value>]) -> Result<Schema> {
    let mut types: Vec<Option<DataType>> = vec![None; names.len()];

    for row in first_rows {
        if row.len() != names.len() {
            return Err(LoadError::InvalidConfig(format!(
                "sample row has {} values but {} columns were named",
                row.len(),
                names.len()
            )));
        }
        for (i, value) in row.iter().enumerate() {
            let Some(seen) = value.data_type() else {
                continue;
            };
            types[i] = match (types[i], seen) {
                (None, t) => Some(t),
                (Some(a), b) if a == b => Some(a),
                (Some(DataType::Int64), DataType::Float64)
                | (Some(DataType::Float64), DataType::Int64) => Some(DataType::Float64),
                (Some(expected), _) => {
                    return Err(LoadError::TypeMismatch {
                        partition: 0,
                        column: names[i].as_ref().to_string(),
                        expected: expected.to_string(),
                        found: value.type_name().to_string(),
                    });
                }
            };
        }
    }

    let fields = names
        .iter()
        .zip(types)
        .map(|(name, t)| Field::new(name.as_ref(), t.unwrap_or(DataType::Utf8)))
        .collect();
    Schema::new(fields)
}
