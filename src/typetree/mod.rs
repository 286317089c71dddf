mod catalog;
pub mod common_strings;

use std::io::{Read, Seek};

pub use catalog::TypeTreeCatalog;

use crate::error::{Error, Result};
use crate::reader::EndianReader;

/// One field of a serialized class layout.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeNode {
    pub type_name: String,
    pub name: String,
    /// `-1` for variably sized fields
    pub byte_size: i32,
    pub index: i32,
    pub is_array: bool,
    pub version: i32,
    pub meta_flags: i32,
    pub level: u8,
    pub children: Vec<TypeNode>,
}

impl TypeNode {
    pub const ALIGN_BYTES: i32 = 0x4000;

    pub fn is_array(&self) -> bool {
        self.is_array
    }

    pub fn children(&self) -> &[TypeNode] {
        &self.children
    }

    /// Whether the reader has to be aligned to 4 bytes after this field.
    pub fn aligned_after(&self) -> bool {
        self.meta_flags & Self::ALIGN_BYTES != 0
    }

    pub fn child(&self, name: &str) -> Option<&TypeNode> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Type name without generic arguments, `PPtr<Transform>` becomes `PPtr`.
    pub fn base_type_name(&self) -> &str {
        match self.type_name.split_once('<') {
            Some((base, _)) => base,
            None => &self.type_name,
        }
    }

    /// Iterates the node and all of its descendants in pre-order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    /// Reads a type tree in the encoding used by the given serialized file format.
    pub fn read<R: Read + Seek>(reader: &mut EndianReader<R>, format_version: u32) -> Result<Self> {
        if format_version >= 12 || format_version == 10 {
            TypeNode::read_blob(reader, format_version)
        } else {
            TypeNode::read_legacy(reader, format_version, 0)
        }
    }

    pub fn read_blob<R: Read + Seek>(
        reader: &mut EndianReader<R>,
        format_version: u32,
    ) -> Result<Self> {
        let node_count = reader.read_len()?;
        let strings_len = reader.read_len()?;

        let mut records = Vec::with_capacity(node_count.min(1 << 12));
        for _ in 0..node_count {
            let version = reader.read_i16()?;
            let level = reader.read_u8()?;
            let is_array = reader.read_bool()?;
            let type_offset = reader.read_i32()?;
            let name_offset = reader.read_i32()?;
            let byte_size = reader.read_i32()?;
            let index = reader.read_i32()?;
            let meta_flags = reader.read_i32()?;
            if format_version >= 19 {
                // ref type hash
                reader.skip(8)?;
            }
            records.push((
                type_offset,
                name_offset,
                TypeNode {
                    byte_size,
                    index,
                    is_array,
                    version: version as i32,
                    meta_flags,
                    level,
                    ..Default::default()
                },
            ));
        }
        let strings = reader.read_bytes(strings_len)?;

        let nodes = records
            .into_iter()
            .map(|(type_offset, name_offset, mut node)| {
                node.type_name = resolve_string(&strings, type_offset)?;
                node.name = resolve_string(&strings, name_offset)?;
                Ok(node)
            })
            .collect::<Result<Vec<_>>>()?;

        TypeNode::from_flat(nodes)
    }

    /// Rebuilds the tree from nodes in depth-first pre-order.
    /// A node's parent is the closest preceding node one level above it.
    pub fn from_flat(nodes: impl IntoIterator<Item = TypeNode>) -> Result<Self> {
        fn collapse(stack: &mut Vec<TypeNode>, depth: usize) {
            while stack.len() > depth.max(1) {
                if let Some(node) = stack.pop()
                    && let Some(parent) = stack.last_mut()
                {
                    parent.children.push(node);
                }
            }
        }

        let mut stack: Vec<TypeNode> = Vec::new();
        for node in nodes {
            let depth = node.level as usize;
            if (depth == 0 && !stack.is_empty()) || depth > stack.len() {
                return Err(Error::format(format!(
                    "Type tree node '{}' has invalid depth {depth}",
                    node.name
                )));
            }
            collapse(&mut stack, depth);
            stack.push(node);
        }
        collapse(&mut stack, 1);
        stack
            .pop()
            .ok_or_else(|| Error::format("Empty type tree"))
    }

    fn read_legacy<R: Read + Seek>(
        reader: &mut EndianReader<R>,
        format_version: u32,
        level: u8,
    ) -> Result<Self> {
        if level > 64 {
            return Err(Error::format("Type tree is nested too deeply"));
        }

        let type_name = reader.read_cstr()?;
        let name = reader.read_cstr()?;
        let byte_size = reader.read_i32()?;
        if format_version == 2 {
            // variable count
            reader.read_i32()?;
        }
        let index = match format_version != 3 {
            true => reader.read_i32()?,
            false => 0,
        };
        let is_array = reader.read_i32()? != 0;
        let version = reader.read_i32()?;
        let meta_flags = match format_version != 3 {
            true => reader.read_i32()?,
            false => 0,
        };

        let child_count = reader.read_len()?;
        let mut children = Vec::with_capacity(child_count.min(256));
        for _ in 0..child_count {
            children.push(TypeNode::read_legacy(reader, format_version, level + 1)?);
        }

        Ok(TypeNode {
            type_name,
            name,
            byte_size,
            index,
            is_array,
            version,
            meta_flags,
            level,
            children,
        })
    }
}

fn resolve_string(local: &[u8], offset: i32) -> Result<String> {
    if offset < 0 {
        let offset = (offset & 0x7fff_ffff) as usize;
        return common_strings::get(offset)
            .map(str::to_owned)
            .ok_or_else(|| Error::format(format!("Invalid common string offset {offset}")));
    }

    let tail = local
        .get(offset as usize..)
        .ok_or_else(|| Error::format(format!("Invalid type tree string offset {offset}")))?;
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}
