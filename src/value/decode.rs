use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use indexmap::IndexMap;

use crate::asset::Asset;
use crate::blocks::BlockReader;
use crate::error::{Error, Result};
use crate::typetree::TypeNode;
use crate::value::{Object, PPtr, Value};

/// Fixed-width leaf types of a type tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Bool,
    SInt8,
    UInt8,
    SInt16,
    UInt16,
    SInt32,
    UInt32,
    SInt64,
    UInt64,
    Float,
    Double,
}

impl Primitive {
    pub fn from_type_name(name: &str) -> Option<Primitive> {
        Some(match name {
            "bool" => Primitive::Bool,
            "SInt8" => Primitive::SInt8,
            "UInt8" | "char" => Primitive::UInt8,
            "SInt16" | "short" => Primitive::SInt16,
            "UInt16" | "unsigned short" => Primitive::UInt16,
            "SInt32" | "int" | "Type*" => Primitive::SInt32,
            "UInt32" | "unsigned int" => Primitive::UInt32,
            "SInt64" | "long long" => Primitive::SInt64,
            "UInt64" | "unsigned long long" | "FileSize" => Primitive::UInt64,
            "float" => Primitive::Float,
            "double" => Primitive::Double,
            _ => return None,
        })
    }

    pub fn width(self) -> usize {
        match self {
            Primitive::Bool | Primitive::SInt8 | Primitive::UInt8 => 1,
            Primitive::SInt16 | Primitive::UInt16 => 2,
            Primitive::SInt32 | Primitive::UInt32 | Primitive::Float => 4,
            Primitive::SInt64 | Primitive::UInt64 | Primitive::Double => 8,
        }
    }

    fn is_floating(self) -> bool {
        matches!(self, Primitive::Float | Primitive::Double)
    }

    fn read(self, reader: &mut BlockReader<'_>) -> Result<Value> {
        if self.is_floating() {
            reader.align()?;
        }
        Ok(match self {
            Primitive::Bool => Value::Bool(reader.read_bool()?),
            Primitive::SInt8 => Value::Int(reader.read_i8()? as i64),
            Primitive::UInt8 => Value::UInt(reader.read_u8()? as u64),
            Primitive::SInt16 => Value::Int(reader.read_i16()? as i64),
            Primitive::UInt16 => Value::UInt(reader.read_u16()? as u64),
            Primitive::SInt32 => Value::Int(reader.read_i32()? as i64),
            Primitive::UInt32 => Value::UInt(reader.read_u32()? as u64),
            Primitive::SInt64 => Value::Int(reader.read_i64()?),
            Primitive::UInt64 => Value::UInt(reader.read_u64()?),
            Primitive::Float => Value::Float(reader.read_f32()?),
            Primitive::Double => Value::Double(reader.read_f64()?),
        })
    }

    fn parse<B: ByteOrder>(self, bytes: &[u8]) -> Value {
        match self {
            Primitive::Bool => Value::Bool(bytes[0] != 0),
            Primitive::SInt8 => Value::Int(bytes[0] as i8 as i64),
            Primitive::UInt8 => Value::UInt(bytes[0] as u64),
            Primitive::SInt16 => Value::Int(B::read_i16(bytes) as i64),
            Primitive::UInt16 => Value::UInt(B::read_u16(bytes) as u64),
            Primitive::SInt32 => Value::Int(B::read_i32(bytes) as i64),
            Primitive::UInt32 => Value::UInt(B::read_u32(bytes) as u64),
            Primitive::SInt64 => Value::Int(B::read_i64(bytes)),
            Primitive::UInt64 => Value::UInt(B::read_u64(bytes)),
            Primitive::Float => Value::Float(B::read_f32(bytes)),
            Primitive::Double => Value::Double(B::read_f64(bytes)),
        }
    }
}

/// Reads objects from an asset, driven by their type tree.
pub struct ObjectDecoder<'r, 'a> {
    reader: &'r mut BlockReader<'a>,
    asset: &'r Arc<Asset>,
    format_version: u32,
}

impl<'r, 'a> ObjectDecoder<'r, 'a> {
    pub fn new(reader: &'r mut BlockReader<'a>, asset: &'r Arc<Asset>, format_version: u32) -> Self {
        ObjectDecoder {
            reader,
            asset,
            format_version,
        }
    }

    /// Decodes one value starting at the current reader position.
    pub fn decode(&mut self, node: &TypeNode) -> Result<Value> {
        let start = self.reader.tell()?;
        let (value, align) = self.read_value(node)?;

        // padding doesn't count towards the declared size
        let consumed = self.reader.tell()? - start;
        if node.byte_size > 0 && consumed < node.byte_size as u64 {
            return Err(Error::UndersizedRead {
                type_name: node.type_name.clone(),
                expected: node.byte_size as u64,
                actual: consumed,
            });
        }

        if align || node.aligned_after() {
            self.reader.align()?;
        }
        Ok(value)
    }

    /// Returns the value and whether the node requests alignment through one of its children.
    fn read_value(&mut self, node: &TypeNode) -> Result<(Value, bool)> {
        if node.children.is_empty()
            && let Some(primitive) = Primitive::from_type_name(&node.type_name)
        {
            return Ok((primitive.read(self.reader)?, false));
        }

        if node.type_name == "string" {
            return self.read_string(node);
        }
        if node.type_name.starts_with("PPtr<") {
            return Ok((self.read_pointer(node)?, false));
        }

        if node.is_array() {
            return Ok((self.read_array(node)?, false));
        }
        if let Some(first) = node.children.first()
            && first.is_array()
        {
            return Ok((self.read_array(first)?, first.aligned_after()));
        }

        if node.type_name == "pair" {
            let [first, second] = node.children.as_slice() else {
                return Err(Error::format(format!(
                    "pair '{}' has {} fields",
                    node.name,
                    node.children.len()
                )));
            };
            let pair = (self.decode(first)?, self.decode(second)?);
            return Ok((Value::Pair(Box::new(pair)), false));
        }

        Ok((self.read_record(node)?, false))
    }

    fn read_string(&mut self, node: &TypeNode) -> Result<(Value, bool)> {
        let len = match node.byte_size {
            size if size >= 0 => size as usize,
            _ => self.reader.read_len()?,
        };
        self.check_remaining(len as u64, node)?;
        let bytes = self.reader.read_bytes(len)?;
        let value = match String::from_utf8(bytes) {
            Ok(string) => Value::String(string),
            Err(e) => Value::Bytes(e.into_bytes()),
        };
        let align = node.children.first().is_some_and(TypeNode::aligned_after);
        Ok((value, align))
    }

    fn read_pointer(&mut self, node: &TypeNode) -> Result<Value> {
        let file_id = self.reader.read_i32()?;
        let path_id = match self.format_version >= 14 {
            true => self.reader.read_i64()?,
            false => self.reader.read_i32()? as i64,
        };
        if file_id == 0 && path_id == 0 {
            return Ok(Value::Null);
        }
        Ok(Value::Pointer(PPtr {
            class_name: node.type_name.clone(),
            file_id,
            path_id,
            owner: Arc::downgrade(self.asset),
        }))
    }

    fn read_array(&mut self, array: &TypeNode) -> Result<Value> {
        let element = array.children.get(1).ok_or_else(|| {
            Error::format(format!("array '{}' has no element type", array.name))
        })?;
        let count = self.reader.read_len()?;

        let primitive = match element.children.is_empty() {
            true => Primitive::from_type_name(&element.type_name),
            false => None,
        };
        match primitive {
            Some(Primitive::UInt8) if !element.aligned_after() => {
                self.check_remaining(count as u64, array)?;
                Ok(Value::Bytes(self.reader.read_bytes(count)?))
            }
            Some(primitive) if !element.aligned_after() => {
                if primitive.is_floating() {
                    self.reader.align()?;
                }
                let width = primitive.width();
                let len = count.checked_mul(width).ok_or_else(|| {
                    Error::format(format!("array '{}' of {count} elements", array.name))
                })?;
                self.check_remaining(len as u64, array)?;
                let bytes = self.reader.read_bytes(len)?;
                let chunks = bytes.chunks_exact(width);
                let values = match self.reader.big_endian() {
                    true => chunks.map(|chunk| primitive.parse::<BigEndian>(chunk)).collect(),
                    false => chunks
                        .map(|chunk| primitive.parse::<LittleEndian>(chunk))
                        .collect(),
                };
                Ok(Value::List(values))
            }
            _ => {
                let mut values = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    values.push(self.decode(element)?);
                }
                Ok(Value::List(values))
            }
        }
    }

    fn read_record(&mut self, node: &TypeNode) -> Result<Value> {
        let exposed = node.type_name.starts_with("Exposed");
        let mut fields = IndexMap::with_capacity(node.children.len());
        for child in &node.children {
            let value = match exposed && child.name == "exposedName" {
                true => {
                    self.reader.read_i32()?;
                    Value::String(String::new())
                }
                false => self.decode(child)?,
            };
            fields.insert(child.name.clone(), value);
        }

        Ok(Value::Record(Object {
            type_name: node.type_name.clone(),
            fields,
            owner: Arc::downgrade(self.asset),
        }))
    }

    fn check_remaining(&self, len: u64, node: &TypeNode) -> Result<()> {
        let remaining = self.reader.get_ref().remaining();
        if len > remaining {
            return Err(Error::format(format!(
                "'{}' of type {} needs {len} bytes, but only {remaining} remain",
                node.name, node.type_name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_names() {
        assert_eq!(Primitive::from_type_name("char"), Some(Primitive::UInt8));
        assert_eq!(Primitive::from_type_name("unsigned int"), Some(Primitive::UInt32));
        assert_eq!(Primitive::from_type_name("FileSize"), Some(Primitive::UInt64));
        assert_eq!(Primitive::from_type_name("Vector3f"), None);
        assert_eq!(Primitive::Double.width(), 8);
    }

    #[test]
    fn parse_respects_byte_order() {
        let bytes = [0x00, 0x00, 0x01, 0x02];
        assert_eq!(
            Primitive::UInt32.parse::<BigEndian>(&bytes),
            Value::UInt(0x0102)
        );
        assert_eq!(
            Primitive::SInt32.parse::<LittleEndian>(&bytes),
            Value::Int(0x0201_0000)
        );
        assert_eq!(
            Primitive::Float.parse::<LittleEndian>(&1.5f32.to_le_bytes()),
            Value::Float(1.5)
        );
    }
}
