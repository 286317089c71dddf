use std::io::{Read, Seek};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::reader::EndianReader;
use crate::typetree::TypeNode;

pub const MONO_BEHAVIOUR: i32 = 114;

/// Entry of a serialized file's class table.
#[derive(Debug, Clone)]
pub struct SerializedType {
    /// Scripts get distinct negative ids: `-2 - script_index`, or `-1` without a script.
    pub class_id: i32,
    pub script_index: i16,
    pub hash: Vec<u8>,
    pub tree: Option<Arc<TypeNode>>,
    pub dependencies: Vec<i32>,
    pub ref_type: Option<RefTypeName>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefTypeName {
    pub class_name: String,
    pub namespace: String,
    pub assembly_name: String,
}

impl SerializedType {
    fn read<R: Read + Seek>(
        reader: &mut EndianReader<R>,
        format_version: u32,
        has_type_trees: bool,
        is_ref_type: bool,
    ) -> Result<Self> {
        let mut class_id = reader.read_i32()?;
        let mut script_index = -1;
        if format_version >= 17 {
            // is stripped
            reader.read_u8()?;
            script_index = reader.read_i16()?;
            if class_id == MONO_BEHAVIOUR {
                class_id = match script_index {
                    0.. => -2 - script_index as i32,
                    _ => -1,
                };
            }
        }
        let hash = reader.read_bytes(if class_id < 0 { 32 } else { 16 })?;
        let tree = match has_type_trees {
            true => Some(Arc::new(TypeNode::read(reader, format_version)?)),
            false => None,
        };

        let mut dependencies = Vec::new();
        let mut ref_type = None;
        if format_version >= 21 {
            if is_ref_type {
                ref_type = Some(RefTypeName {
                    class_name: reader.read_cstr()?,
                    namespace: reader.read_cstr()?,
                    assembly_name: reader.read_cstr()?,
                });
            } else {
                let count = reader.read_len()?;
                dependencies.reserve(count.min(1024));
                for _ in 0..count {
                    dependencies.push(reader.read_i32()?);
                }
            }
        }

        Ok(SerializedType {
            class_id,
            script_index,
            hash,
            tree,
            dependencies,
            ref_type,
        })
    }

    fn read_legacy<R: Read + Seek>(
        reader: &mut EndianReader<R>,
        format_version: u32,
    ) -> Result<Self> {
        let class_id = reader.read_i32()?;
        let tree = TypeNode::read(reader, format_version)?;
        Ok(SerializedType {
            class_id,
            script_index: -1,
            hash: Vec::new(),
            tree: Some(Arc::new(tree)),
            dependencies: Vec::new(),
            ref_type: None,
        })
    }
}

/// The type section of a serialized file.
#[derive(Debug, Default)]
pub struct TypeMetadata {
    pub engine_version: String,
    pub target_platform: i32,
    pub has_type_trees: bool,
    pub types: Vec<SerializedType>,
    trees: FxHashMap<i32, Arc<TypeNode>>,
}

impl TypeMetadata {
    pub fn read<R: Read + Seek>(
        reader: &mut EndianReader<R>,
        format_version: u32,
    ) -> Result<Self> {
        let engine_version = match format_version >= 7 {
            true => reader.read_cstr()?,
            false => String::new(),
        };
        let target_platform = match format_version >= 8 {
            true => reader.read_i32()?,
            false => 0,
        };
        let has_type_trees = format_version < 13 || reader.read_bool()?;

        let count = reader.read_len()?;
        let mut types = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            types.push(match format_version >= 13 {
                true => SerializedType::read(reader, format_version, has_type_trees, false)?,
                false => SerializedType::read_legacy(reader, format_version)?,
            });
        }

        let trees = types
            .iter()
            .filter_map(|ty| Some((ty.class_id, Arc::clone(ty.tree.as_ref()?))))
            .collect();

        Ok(TypeMetadata {
            engine_version,
            target_platform,
            has_type_trees,
            types,
            trees,
        })
    }

    /// Reads the table of types used by `[SerializeReference]` fields.
    pub(crate) fn read_ref_types<R: Read + Seek>(
        &self,
        reader: &mut EndianReader<R>,
        format_version: u32,
    ) -> Result<Vec<SerializedType>> {
        let count = reader.read_len()?;
        let mut ref_types = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            ref_types.push(SerializedType::read(
                reader,
                format_version,
                self.has_type_trees,
                true,
            )?);
        }
        Ok(ref_types)
    }

    /// Embedded type tree by (possibly negative) class id.
    pub fn tree(&self, class_id: i32) -> Option<&Arc<TypeNode>> {
        self.trees.get(&class_id)
    }

    /// Class id of the n-th entry of the class table.
    pub fn class_id_at(&self, type_index: i32) -> Option<i32> {
        let index = usize::try_from(type_index).ok()?;
        self.types.get(index).map(|ty| ty.class_id)
    }
}
