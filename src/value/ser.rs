use serde::ser::{Serialize, SerializeStruct, SerializeTuple, Serializer};

use crate::value::{Object, PPtr, Value};

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(value) => serializer.serialize_bool(*value),
            Value::Int(value) => serializer.serialize_i64(*value),
            Value::UInt(value) => serializer.serialize_u64(*value),
            Value::Float(value) => serializer.serialize_f32(*value),
            Value::Double(value) => serializer.serialize_f64(*value),
            Value::String(value) => serializer.serialize_str(value),
            Value::Bytes(value) => serializer.serialize_bytes(value),
            Value::List(values) => serializer.collect_seq(values),
            Value::Pair(pair) => {
                let mut tuple = serializer.serialize_tuple(2)?;
                tuple.serialize_element(&pair.0)?;
                tuple.serialize_element(&pair.1)?;
                tuple.end()
            }
            Value::Record(object) => object.serialize(serializer),
            Value::Pointer(pptr) => pptr.serialize(serializer),
        }
    }
}

impl Serialize for Object {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(&self.fields)
    }
}

impl Serialize for PPtr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut pptr = serializer.serialize_struct("PPtr", 2)?;
        pptr.serialize_field("m_FileID", &self.file_id)?;
        pptr.serialize_field("m_PathID", &self.path_id)?;
        pptr.end()
    }
}
