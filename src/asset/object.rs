use std::io::{Read, Seek};
use std::sync::OnceLock;

use crate::asset::types::{MONO_BEHAVIOUR, TypeMetadata};
use crate::asset::PathId;
use crate::error::{Error, Result};
use crate::reader::EndianReader;
use crate::value::Value;

/// Entry of an asset's object directory.
#[derive(Debug)]
pub struct ObjectInfo {
    pub path_id: PathId,
    /// Relative to the start of the asset
    pub offset: u64,
    pub size: u32,
    pub type_id: i32,
    pub class_id: i32,
    pub destroyed: bool,
    pub(crate) value: OnceLock<Value>,
}

pub(crate) fn read_path_id<R: Read>(
    reader: &mut EndianReader<R>,
    format_version: u32,
    long_object_ids: bool,
) -> Result<PathId> {
    Ok(match format_version >= 14 || long_object_ids {
        true => reader.read_i64()?,
        false => reader.read_i32()? as PathId,
    })
}

impl ObjectInfo {
    pub(crate) fn read<R: Read + Seek>(
        reader: &mut EndianReader<R>,
        format_version: u32,
        long_object_ids: bool,
        content_offset: u64,
        types: &TypeMetadata,
    ) -> Result<Self> {
        let path_id = read_path_id(reader, format_version, long_object_ids)?;
        let offset = match format_version >= 22 {
            true => reader.read_u64()?,
            false => reader.read_u32()? as u64,
        };
        let size = reader.read_u32()?;
        let mut type_id = reader.read_i32()?;

        let class_id = match format_version < 17 {
            true => reader.read_i16()? as i32,
            false => {
                let class_id = types.class_id_at(type_id).ok_or_else(|| {
                    Error::format(format!(
                        "Object {path_id} references type {type_id}, but only {} are declared",
                        types.types.len()
                    ))
                })?;
                type_id = class_id;
                class_id
            }
        };

        let destroyed = match format_version <= 10 {
            true => reader.read_i16()? != 0,
            false => false,
        };
        if (11..=16).contains(&format_version) {
            // script type index
            reader.read_i16()?;
        }
        if (15..=16).contains(&format_version) {
            // stripped
            reader.read_u8()?;
        }

        Ok(ObjectInfo {
            path_id,
            offset: content_offset + offset,
            size,
            type_id,
            class_id,
            destroyed,
            value: OnceLock::new(),
        })
    }

    /// The engine class of this object. Script instances are reported as `MonoBehaviour`.
    pub fn engine_class_id(&self) -> i32 {
        match self.class_id < 0 {
            true => MONO_BEHAVIOUR,
            false => self.class_id,
        }
    }

    pub fn is_decoded(&self) -> bool {
        self.value.get().is_some()
    }
}
