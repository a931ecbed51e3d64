// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Value` data model.
//!
//! One serializable currency for module options, persisted appdata
//! (status variables), module attributes and remote-call arguments.
//! The variant set mirrors what laboratory modules actually persist:
//! scalars (including complex numbers), byte strings, ordered sequences,
//! sets, maps with string keys, dense numeric arrays and enumeration
//! members referenced by fully qualified name.
//!
//! Serialization is adjacently tagged (`t`/`v`) so that every variant
//! round-trips losslessly through JSON and YAML; in particular the
//! Int/Float and List/Set distinctions survive.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use indexmap::IndexMap;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from value conversion and array decoding.
#[derive(Debug, Error)]
pub enum ValueError {
    #[error("expected {expected}, got {got}")]
    Type { expected: &'static str, got: &'static str },

    #[error("array payload length {len} does not match dtype {dtype} x shape {shape:?}")]
    ArrayShape { len: usize, dtype: ArrayDtype, shape: Vec<usize> },

    #[error("invalid base64 array payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("array data is external (file {0}) and has not been resolved")]
    Unresolved(String),
}

/// Element type of a dense array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayDtype {
    F64,
    I64,
    C128,
    Bool,
}

impl ArrayDtype {
    /// Bytes per element in the packed little-endian layout.
    pub fn item_size(&self) -> usize {
        match self {
            ArrayDtype::F64 | ArrayDtype::I64 => 8,
            ArrayDtype::C128 => 16,
            ArrayDtype::Bool => 1,
        }
    }
}

impl fmt::Display for ArrayDtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayDtype::F64 => f.write_str("f64"),
            ArrayDtype::I64 => f.write_str("i64"),
            ArrayDtype::C128 => f.write_str("c128"),
            ArrayDtype::Bool => f.write_str("bool"),
        }
    }
}

/// Array payload: inline base64 in the record, or spilled to a sidecar
/// file by the appdata store. The `File` variant only appears in persisted
/// form; in-memory values are always `Inline` once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ArrayData {
    Inline { b64: String },
    File { name: String },
}

/// A dense numeric array: dtype + shape + packed little-endian payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    pub dtype: ArrayDtype,
    pub shape: Vec<usize>,
    pub data: ArrayData,
}

impl ArrayValue {
    /// Build an inline array from raw little-endian bytes, checking the
    /// payload length against dtype and shape.
    pub fn from_bytes(
        dtype: ArrayDtype,
        shape: Vec<usize>,
        bytes: &[u8],
    ) -> Result<Self, ValueError> {
        let expected: usize = shape.iter().product::<usize>() * dtype.item_size();
        if bytes.len() != expected {
            return Err(ValueError::ArrayShape { len: bytes.len(), dtype, shape });
        }
        Ok(Self { dtype, shape, data: ArrayData::Inline { b64: BASE64.encode(bytes) } })
    }

    /// Build an inline f64 array from a slice.
    pub fn from_f64(shape: Vec<usize>, values: &[f64]) -> Result<Self, ValueError> {
        let mut bytes = Vec::with_capacity(values.len() * 8);
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        Self::from_bytes(ArrayDtype::F64, shape, &bytes)
    }

    /// Build an inline i64 array from a slice.
    pub fn from_i64(shape: Vec<usize>, values: &[i64]) -> Result<Self, ValueError> {
        let mut bytes = Vec::with_capacity(values.len() * 8);
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        Self::from_bytes(ArrayDtype::I64, shape, &bytes)
    }

    /// Decode the inline payload. Fails if the data still points at an
    /// unresolved sidecar file.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ValueError> {
        match &self.data {
            ArrayData::Inline { b64 } => Ok(BASE64.decode(b64)?),
            ArrayData::File { name } => Err(ValueError::Unresolved(name.clone())),
        }
    }

    /// Decode as f64 elements.
    pub fn to_f64(&self) -> Result<Vec<f64>, ValueError> {
        if self.dtype != ArrayDtype::F64 {
            return Err(ValueError::Type { expected: "f64 array", got: "other dtype" });
        }
        let bytes = self.to_bytes()?;
        Ok(bytes.chunks_exact(8).map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])).collect())
    }

    /// Payload size in bytes without decoding.
    pub fn byte_len(&self) -> usize {
        self.shape.iter().product::<usize>() * self.dtype.item_size()
    }
}

/// A dynamically typed, serializable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex { re: f64, im: f64 },
    Str(String),
    Bytes { b64: String },
    List(Vec<Value>),
    Set(Vec<Value>),
    FrozenSet(Vec<Value>),
    Map(IndexMap<String, Value>),
    Array(ArrayValue),
    Enum { qualname: String, member: String },
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Complex { .. } => "complex",
            Value::Str(_) => "str",
            Value::Bytes { .. } => "bytes",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::FrozenSet(_) => "frozenset",
            Value::Map(_) => "map",
            Value::Array(_) => "array",
            Value::Enum { .. } => "enum",
        }
    }

    /// True for maps, sequences, sets and arrays; scalar variants are false.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Value::List(_)
                | Value::Set(_)
                | Value::FrozenSet(_)
                | Value::Map(_)
                | Value::Array(_)
        )
    }

    pub fn bytes(data: &[u8]) -> Value {
        Value::Bytes { b64: BASE64.encode(data) }
    }

    pub fn complex(c: Complex64) -> Value {
        Value::Complex { re: c.re, im: c.im }
    }

    pub fn as_bool(&self) -> Result<bool, ValueError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(ValueError::Type { expected: "bool", got: other.type_name() }),
        }
    }

    pub fn as_int(&self) -> Result<i64, ValueError> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(ValueError::Type { expected: "int", got: other.type_name() }),
        }
    }

    pub fn as_float(&self) -> Result<f64, ValueError> {
        match self {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            other => Err(ValueError::Type { expected: "float", got: other.type_name() }),
        }
    }

    pub fn as_complex(&self) -> Result<Complex64, ValueError> {
        match self {
            Value::Complex { re, im } => Ok(Complex64::new(*re, *im)),
            Value::Float(f) => Ok(Complex64::new(*f, 0.0)),
            Value::Int(i) => Ok(Complex64::new(*i as f64, 0.0)),
            other => Err(ValueError::Type { expected: "complex", got: other.type_name() }),
        }
    }

    pub fn as_str(&self) -> Result<&str, ValueError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(ValueError::Type { expected: "str", got: other.type_name() }),
        }
    }

    pub fn as_bytes(&self) -> Result<Vec<u8>, ValueError> {
        match self {
            Value::Bytes { b64 } => Ok(BASE64.decode(b64)?),
            other => Err(ValueError::Type { expected: "bytes", got: other.type_name() }),
        }
    }

    pub fn as_list(&self) -> Result<&[Value], ValueError> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(ValueError::Type { expected: "list", got: other.type_name() }),
        }
    }

    pub fn as_map(&self) -> Result<&IndexMap<String, Value>, ValueError> {
        match self {
            Value::Map(map) => Ok(map),
            other => Err(ValueError::Type { expected: "map", got: other.type_name() }),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Complex64> for Value {
    fn from(c: Complex64) -> Self {
        Value::complex(c)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Complex { re, im } => write!(f, "{}{:+}i", re, im),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Bytes { .. } => f.write_str("<bytes>"),
            Value::List(items) => write!(f, "<list[{}]>", items.len()),
            Value::Set(items) => write!(f, "<set[{}]>", items.len()),
            Value::FrozenSet(items) => write!(f, "<frozenset[{}]>", items.len()),
            Value::Map(map) => write!(f, "<map[{}]>", map.len()),
            Value::Array(arr) => write!(f, "<array {} {:?}>", arr.dtype, arr.shape),
            Value::Enum { qualname, member } => write!(f, "{}.{}", qualname, member),
        }
    }
}

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;
