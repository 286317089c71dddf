pub mod de;
pub mod decode;
mod pptr;
mod ser;

use std::sync::{Arc, Weak};

use indexmap::IndexMap;

pub use de::from_value;
pub use pptr::{PPtr, PPtrRef};

use crate::asset::Asset;
use crate::error::{Error, Result};

/// A decoded object, shaped by the type tree it was read with.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// A null pointer
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    String(String),
    /// Byte arrays, and strings that are not valid UTF-8
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Pair(Box<(Value, Value)>),
    Record(Object),
    Pointer(PPtr),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(value) => Some(value),
            Value::Int(value) => Some(value != 0),
            Value::UInt(value) => Some(value != 0),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(value) => Some(value),
            Value::UInt(value) => i64::try_from(value).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::UInt(value) => Some(value),
            Value::Int(value) => u64::try_from(value).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(value) => Some(value as f64),
            Value::Double(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(value) => Some(value),
            Value::String(value) => Some(value.as_bytes()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Object> {
        match self {
            Value::Record(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<&PPtr> {
        match self {
            Value::Pointer(pptr) => Some(pptr),
            _ => None,
        }
    }

    /// Field of a record.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.as_record()?.get(field)
    }

    /// Calls `f` for every pointer in this value, in field order.
    pub fn visit_pointers<'a>(&'a self, f: &mut impl FnMut(&'a PPtr)) {
        match self {
            Value::Pointer(pptr) => f(pptr),
            Value::List(values) => values.iter().for_each(|value| value.visit_pointers(f)),
            Value::Pair(pair) => {
                pair.0.visit_pointers(f);
                pair.1.visit_pointers(f);
            }
            Value::Record(object) => object
                .fields
                .values()
                .for_each(|value| value.visit_pointers(f)),
            _ => {}
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// A record with named fields in declaration order.
#[derive(Clone, Default)]
pub struct Object {
    pub type_name: String,
    pub fields: IndexMap<String, Value>,
    pub(crate) owner: Weak<Asset>,
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.fields == other.fields
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.type_name)?;
        f.debug_map().entries(&self.fields).finish()
    }
}

impl Object {
    pub fn new(type_name: impl Into<String>, fields: IndexMap<String, Value>) -> Self {
        Object {
            type_name: type_name.into(),
            fields,
            owner: Weak::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// The asset this object was decoded from.
    pub fn owner(&self) -> Option<Arc<Asset>> {
        self.owner.upgrade()
    }

    /// Data stored outside of the object, when this is a `StreamingInfo` or `StreamedResource`
    /// record or directly contains one.
    pub fn streamed_data(&self) -> Option<StreamData> {
        self.own_stream_data().or_else(|| {
            self.fields
                .values()
                .filter_map(Value::as_record)
                .find_map(Object::own_stream_data)
        })
    }

    fn own_stream_data(&self) -> Option<StreamData> {
        let (offset, size, path) = match self.type_name.as_str() {
            "StreamingInfo" => ("offset", "size", "path"),
            "StreamedResource" => ("m_Offset", "m_Size", "m_Source"),
            _ => return None,
        };
        Some(StreamData {
            offset: self.get(offset)?.as_u64()?,
            size: self.get(size)?.as_u64()?,
            path: self.get(path)?.as_str()?.to_owned(),
            owner: self.owner.clone(),
        })
    }
}

/// A byte range in a resource file next to the asset.
#[derive(Debug, Clone)]
pub struct StreamData {
    pub offset: u64,
    pub size: u64,
    pub path: String,
    owner: Weak<Asset>,
}

impl StreamData {
    /// Objects without external data have an empty path.
    pub fn is_empty(&self) -> bool {
        self.path.is_empty() || self.size == 0
    }

    pub fn resolve(&self) -> Result<Arc<Asset>> {
        let owner = self.owner.upgrade().ok_or(Error::Closed)?;
        owner.resolve_asset(&self.path)
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        self.resolve()?.read_raw(self.offset, self.size)
    }
}
