//! Builders for synthetic bundles and serialized files.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use unityfs_env::{Data, EnvResolver};

pub const ALIGN: i32 = 0x4000;

/// A type tree node to be written into a serialized file.
#[derive(Debug, Clone)]
pub struct Field {
    pub type_name: String,
    pub name: String,
    pub byte_size: i32,
    pub flags: i32,
    pub is_array: bool,
    pub children: Vec<Field>,
}

fn primitive_size(type_name: &str) -> Option<i32> {
    Some(match type_name {
        "bool" | "UInt8" | "SInt8" | "char" => 1,
        "SInt16" | "UInt16" => 2,
        "int" | "unsigned int" | "float" => 4,
        "SInt64" | "UInt64" | "double" => 8,
        _ => return None,
    })
}

pub fn prim(type_name: &str, name: &str) -> Field {
    Field {
        type_name: type_name.into(),
        name: name.into(),
        byte_size: primitive_size(type_name).unwrap_or(-1),
        flags: 0,
        is_array: false,
        children: Vec::new(),
    }
}

pub fn record(type_name: &str, name: &str, children: Vec<Field>) -> Field {
    let byte_size = match children.iter().any(|c| c.byte_size < 0 || c.is_array) {
        true => -1,
        false => children.iter().map(|c| c.byte_size).sum(),
    };
    Field {
        type_name: type_name.into(),
        name: name.into(),
        byte_size,
        flags: 0,
        is_array: false,
        children,
    }
}

pub fn aligned(mut field: Field) -> Field {
    field.flags |= ALIGN;
    field
}

pub fn array(element: Field) -> Field {
    Field {
        type_name: "Array".into(),
        name: "Array".into(),
        byte_size: -1,
        flags: 0,
        is_array: true,
        children: vec![prim("int", "size"), element],
    }
}

pub fn vector(name: &str, element: Field) -> Field {
    record("vector", name, vec![array(element)])
}

pub fn byte_vector(name: &str) -> Field {
    record("vector", name, vec![aligned(array(prim("UInt8", "data")))])
}

pub fn string(name: &str) -> Field {
    record("string", name, vec![aligned(array(prim("char", "data")))])
}

pub fn pptr(target: &str, name: &str) -> Field {
    record(
        &format!("PPtr<{target}>"),
        name,
        vec![prim("int", "m_FileID"), prim("SInt64", "m_PathID")],
    )
}

impl Field {
    fn flatten<'a>(&'a self, level: u8, out: &mut Vec<(&'a Field, u8)>) {
        out.push((self, level));
        for child in &self.children {
            child.flatten(level + 1, out);
        }
    }
}

/// Byte writer with a fixed byte order.
#[derive(Debug, Default)]
pub struct Writer {
    pub buf: Vec<u8>,
    pub big_endian: bool,
}

macro_rules! write_fns {
    ($($name:ident: $ty:ty => $method:ident),* $(,)?) => {
        $(
            pub fn $name(&mut self, value: $ty) -> &mut Self {
                match self.big_endian {
                    true => self.buf.$method::<BigEndian>(value).unwrap(),
                    false => self.buf.$method::<LittleEndian>(value).unwrap(),
                }
                self
            }
        )*
    };
}

impl Writer {
    pub fn new(big_endian: bool) -> Self {
        Writer {
            buf: Vec::new(),
            big_endian,
        }
    }

    write_fns! {
        i16: i16 => write_i16,
        u16: u16 => write_u16,
        i32: i32 => write_i32,
        u32: u32 => write_u32,
        i64: i64 => write_i64,
        u64: u64 => write_u64,
        f32: f32 => write_f32,
        f64: f64 => write_f64,
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn cstr(&mut self, value: &str) -> &mut Self {
        self.bytes(value.as_bytes()).u8(0)
    }

    pub fn align(&mut self, alignment: usize) -> &mut Self {
        while self.buf.len() % alignment != 0 {
            self.buf.push(0);
        }
        self
    }

    /// A length-prefixed, aligned string.
    pub fn string(&mut self, value: &str) -> &mut Self {
        self.i32(value.len() as i32).bytes(value.as_bytes()).align(4)
    }

    pub fn pptr(&mut self, file_id: i32, path_id: i64) -> &mut Self {
        self.i32(file_id).i64(path_id)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

/// Writes a type tree in the blob encoding.
pub fn write_type_tree(w: &mut Writer, root: &Field, format: u32) {
    let mut flat = Vec::new();
    root.flatten(0, &mut flat);

    let mut strings = Vec::<u8>::new();
    let mut offsets = std::collections::HashMap::new();
    let mut offset_of = |s: &str| -> u32 {
        *offsets.entry(s.to_owned()).or_insert_with(|| {
            let offset = strings.len() as u32;
            strings.extend_from_slice(s.as_bytes());
            strings.push(0);
            offset
        })
    };
    let records: Vec<_> = flat
        .iter()
        .map(|(field, level)| {
            (
                *field,
                *level,
                offset_of(&field.type_name),
                offset_of(&field.name),
            )
        })
        .collect();

    w.i32(records.len() as i32).i32(strings.len() as i32);
    for (index, (field, level, type_offset, name_offset)) in records.iter().enumerate() {
        w.i16(1)
            .u8(*level)
            .u8(field.is_array as u8)
            .u32(*type_offset)
            .u32(*name_offset)
            .i32(field.byte_size)
            .i32(index as i32)
            .i32(field.flags);
        if format >= 19 {
            w.u64(0);
        }
    }
    w.bytes(&strings);
}

/// Writes a type tree in the recursive encoding of old formats.
pub fn write_legacy_type_tree(w: &mut Writer, field: &Field, format: u32) {
    w.cstr(&field.type_name).cstr(&field.name).i32(field.byte_size);
    if format == 2 {
        w.i32(0);
    }
    if format != 3 {
        w.i32(0);
    }
    w.i32(field.is_array as i32).i32(1);
    if format != 3 {
        w.i32(field.flags);
    }
    w.i32(field.children.len() as i32);
    for child in &field.children {
        write_legacy_type_tree(w, child, format);
    }
}

#[derive(Debug, Clone)]
pub struct TypeEntry {
    pub class_id: i32,
    pub script_index: i16,
    pub tree: Option<Field>,
}

#[derive(Debug, Clone)]
pub struct ObjectEntry {
    pub path_id: i64,
    /// Index into the type table, or the class id for formats before 17
    pub type_id: i32,
    pub class_id: i16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct SerializedFileBuilder {
    pub format: u32,
    pub big_endian: bool,
    pub engine_version: String,
    pub type_trees: bool,
    pub types: Vec<TypeEntry>,
    pub objects: Vec<ObjectEntry>,
    pub externals: Vec<String>,
    pub trailer: String,
}

impl SerializedFileBuilder {
    pub fn new(format: u32) -> Self {
        SerializedFileBuilder {
            format,
            big_endian: false,
            engine_version: "2020.3.48f1".into(),
            type_trees: true,
            types: Vec::new(),
            objects: Vec::new(),
            externals: Vec::new(),
            trailer: String::new(),
        }
    }

    pub fn big_endian(mut self, big_endian: bool) -> Self {
        self.big_endian = big_endian;
        self
    }

    pub fn without_type_trees(mut self) -> Self {
        self.type_trees = false;
        self
    }

    /// Adds a class and returns its type index.
    pub fn class(&mut self, class_id: i32, tree: Option<Field>) -> i32 {
        self.types.push(TypeEntry {
            class_id,
            script_index: -1,
            tree,
        });
        self.types.len() as i32 - 1
    }

    pub fn script_class(&mut self, script_index: i16, tree: Option<Field>) -> i32 {
        self.types.push(TypeEntry {
            class_id: 114,
            script_index,
            tree,
        });
        self.types.len() as i32 - 1
    }

    pub fn object(&mut self, path_id: i64, type_id: i32, data: Vec<u8>) -> &mut Self {
        let class_id = match self.format >= 17 {
            true => self.types[type_id as usize].class_id as i16,
            false => type_id as i16,
        };
        self.objects.push(ObjectEntry {
            path_id,
            type_id,
            class_id,
            data,
        });
        self
    }

    pub fn external(&mut self, file_path: &str) -> &mut Self {
        self.externals.push(file_path.into());
        self
    }

    /// A writer for object data in this file's byte order.
    pub fn writer(&self) -> Writer {
        Writer::new(self.big_endian || self.format <= 9)
    }

    fn header_size(&self) -> usize {
        match self.format {
            22.. => 48,
            10.. => 20,
            _ => 16,
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let format = self.format;
        let header_size = self.header_size();
        // old formats have no byte order flag and are always big endian
        let big_endian = self.big_endian || format <= 9;

        // the metadata is written at its final position so that alignment matches
        let mut m = Writer::new(big_endian);
        m.bytes(&vec![0; header_size]);
        if format >= 7 {
            m.cstr(&self.engine_version);
        }
        if format >= 8 {
            m.i32(19);
        }
        // a file either embeds the trees of all its classes or of none
        let type_trees = self.type_trees && self.types.iter().all(|ty| ty.tree.is_some());
        if format >= 13 {
            m.u8(type_trees as u8);
        }
        m.i32(self.types.len() as i32);
        for ty in &self.types {
            if format >= 13 {
                m.i32(ty.class_id);
                let mut class_id = ty.class_id;
                if format >= 17 {
                    m.u8(0).i16(ty.script_index);
                    if ty.class_id == 114 {
                        class_id = match ty.script_index {
                            0.. => -2 - ty.script_index as i32,
                            _ => -1,
                        };
                    }
                }
                m.bytes(&vec![0xAB; if class_id < 0 { 32 } else { 16 }]);
                if type_trees
                    && let Some(tree) = &ty.tree
                {
                    write_type_tree(&mut m, tree, format);
                }
                if format >= 21 {
                    m.i32(0);
                }
            } else {
                m.i32(ty.class_id);
                let tree = ty.tree.as_ref().expect("old formats always embed trees");
                match format >= 12 || format == 10 {
                    true => write_type_tree(&mut m, tree, format),
                    false => write_legacy_type_tree(&mut m, tree, format),
                }
            }
        }
        if (7..=13).contains(&format) {
            m.i32(0);
        }

        let mut data = Writer::new(big_endian);
        let mut offsets = Vec::new();
        for object in &self.objects {
            data.align(8);
            offsets.push(data.len());
            data.bytes(&object.data);
        }

        m.i32(self.objects.len() as i32);
        for (object, &offset) in self.objects.iter().zip(&offsets) {
            if format >= 14 {
                m.align(4);
                m.i64(object.path_id);
            } else {
                m.i32(object.path_id as i32);
            }
            match format >= 22 {
                true => m.u64(offset as u64),
                false => m.u32(offset as u32),
            };
            m.u32(object.data.len() as u32).i32(object.type_id);
            if format < 17 {
                m.i16(object.class_id);
            }
            if format <= 10 {
                m.i16(0);
            }
            if (11..=16).contains(&format) {
                m.i16(-1);
            }
            if (15..=16).contains(&format) {
                m.u8(0);
            }
        }

        if format >= 11 {
            m.i32(0);
        }
        if format >= 6 {
            m.i32(self.externals.len() as i32);
            for external in &self.externals {
                m.cstr("").bytes(&[0; 16]).i32(0).cstr(external);
            }
        }
        if format >= 20 {
            m.i32(0);
        }
        m.cstr(&self.trailer);

        let metadata_end = m.len();
        let content_offset = metadata_end.next_multiple_of(16);
        let file_size = content_offset + data.len();
        let metadata_size = metadata_end - header_size;

        let mut out = m.finish();
        out.resize(content_offset, 0);
        out.extend_from_slice(&data.buf);

        let mut header = Writer::new(true);
        match format >= 22 {
            true => {
                header.u32(0).u32(0).u32(format).u32(0);
                header.u8(self.big_endian as u8).bytes(&[0; 3]);
                header
                    .u32(metadata_size as u32)
                    .u64(file_size as u64)
                    .u64(content_offset as u64)
                    .u64(0);
            }
            false => {
                header
                    .u32(metadata_size as u32)
                    .u32(file_size as u32)
                    .u32(format)
                    .u32(content_offset as u32);
                if format >= 10 {
                    header.u8(big_endian as u8).bytes(&[0; 3]);
                }
            }
        }
        out[..header_size].copy_from_slice(&header.buf);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    None,
    Lz4,
}

impl Codec {
    fn flag(self) -> u32 {
        match self {
            Codec::None => 0,
            Codec::Lz4 => 2,
        }
    }

    fn compress(self, data: &[u8]) -> Vec<u8> {
        match self {
            Codec::None => data.to_vec(),
            Codec::Lz4 => lz4_flex::block::compress(data),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BundleBuilder {
    pub format: u32,
    pub blocks: Codec,
    pub metadata: Codec,
    pub block_size: usize,
    pub metadata_at_end: bool,
    pub files: Vec<(String, Vec<u8>)>,
}

impl BundleBuilder {
    pub fn new() -> Self {
        BundleBuilder {
            format: 6,
            blocks: Codec::None,
            metadata: Codec::None,
            block_size: 0x20000,
            metadata_at_end: false,
            files: Vec::new(),
        }
    }

    pub fn format(mut self, format: u32) -> Self {
        self.format = format;
        self
    }

    pub fn compressed(mut self, block_size: usize) -> Self {
        self.blocks = Codec::Lz4;
        self.metadata = Codec::Lz4;
        self.block_size = block_size;
        self
    }

    pub fn metadata_at_end(mut self) -> Self {
        self.metadata_at_end = true;
        self
    }

    pub fn file(mut self, name: &str, data: Vec<u8>) -> Self {
        self.files.push((name.into(), data));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        let mut nodes = Vec::new();
        for (name, data) in &self.files {
            payload.resize(payload.len().next_multiple_of(16), 0);
            nodes.push((payload.len() as i64, data.len() as i64, name.as_str()));
            payload.extend_from_slice(data);
        }

        let mut blocks = Vec::new();
        let mut block_data = Vec::new();
        for chunk in payload.chunks(self.block_size.max(1)) {
            let compressed = self.blocks.compress(chunk);
            blocks.push((chunk.len() as u32, compressed.len() as u32, self.blocks.flag() as u16));
            block_data.extend_from_slice(&compressed);
        }

        let mut metadata = Writer::new(true);
        metadata.bytes(&[0x11; 16]).i32(blocks.len() as i32);
        for (raw, compressed, flags) in &blocks {
            metadata.u32(*raw).u32(*compressed).u16(*flags);
        }
        metadata.i32(nodes.len() as i32);
        for (offset, size, name) in &nodes {
            metadata.i64(*offset).i64(*size).i32(4).cstr(name);
        }
        let raw_metadata = metadata.finish();
        let compressed_metadata = self.metadata.compress(&raw_metadata);

        let mut flags = self.metadata.flag();
        if self.metadata_at_end {
            flags |= 0x80;
        }

        let mut out = Writer::new(true);
        out.bytes(b"UnityFS\0")
            .u32(self.format)
            .cstr("5.x.x")
            .cstr("2020.3.48f1")
            .u64(0)
            .u32(compressed_metadata.len() as u32)
            .u32(raw_metadata.len() as u32)
            .u32(flags);
        if self.format >= 7 {
            out.align(16);
        }
        match self.metadata_at_end {
            true => {
                out.bytes(&block_data).bytes(&compressed_metadata);
            }
            false => {
                out.bytes(&compressed_metadata).bytes(&block_data);
            }
        }

        let total = out.len() as u64;
        let mut bytes = out.finish();
        let size_offset = 8 + 4 + "5.x.x\0".len() + "2020.3.48f1\0".len();
        bytes[size_offset..size_offset + 8].copy_from_slice(&total.to_be_bytes());
        bytes
    }
}

impl Default for BundleBuilder {
    fn default() -> Self {
        BundleBuilder::new()
    }
}

/// Type tree of the `Thing` test class.
pub fn thing_tree() -> Field {
    record(
        "Thing",
        "Base",
        vec![
            string("m_Name"),
            aligned(prim("bool", "m_Flag")),
            prim("float", "m_Value"),
            byte_vector("m_Bytes"),
            vector("m_Numbers", prim("int", "data")),
            pptr("Thing", "m_Other"),
            vector(
                "m_Pairs",
                record("pair", "data", vec![string("first"), prim("int", "second")]),
            ),
        ],
    )
}

/// Serialized `Thing` matching [`thing_tree`].
pub fn thing_data(
    w: &mut Writer,
    name: &str,
    value: f32,
    bytes: &[u8],
    numbers: &[i32],
    other: (i32, i64),
) -> Vec<u8> {
    w.string(name).u8(1).align(4).f32(value);
    w.i32(bytes.len() as i32).bytes(bytes).align(4);
    w.i32(numbers.len() as i32);
    for &n in numbers {
        w.i32(n);
    }
    w.pptr(other.0, other.1);
    w.i32(1).string("key").i32(9);
    w.finish()
}

/// Serialized `GameObject` in the layout of the bundled catalog.
pub fn game_object_data(w: &mut Writer, name: &str, components: &[(i32, i64)]) -> Vec<u8> {
    w.i32(components.len() as i32);
    for &(file_id, path_id) in components {
        w.pptr(file_id, path_id);
    }
    w.u32(0).string(name).u16(5).u8(1).align(4);
    w.finish()
}

/// Serialized `Transform` in the layout of the bundled catalog.
pub fn transform_data(
    w: &mut Writer,
    game_object: (i32, i64),
    children: &[(i32, i64)],
    father: (i32, i64),
) -> Vec<u8> {
    w.pptr(game_object.0, game_object.1);
    for value in [0.0, 0.0, 0.0, 1.0, 1.0, 2.0, 3.0, 1.0, 1.0, 1.0] {
        w.f32(value);
    }
    w.i32(children.len() as i32);
    for &(file_id, path_id) in children {
        w.pptr(file_id, path_id);
    }
    w.pptr(father.0, father.1);
    w.finish()
}

/// Serialized `TextAsset` in the layout of the bundled catalog.
pub fn text_asset_data(w: &mut Writer, name: &str, script: &[u8]) -> Vec<u8> {
    w.string(name).i32(script.len() as i32).bytes(script).align(4);
    w.finish()
}

/// Serialized `Texture2D` in the layout of the bundled catalog.
pub fn texture_data(
    w: &mut Writer,
    name: &str,
    image: &[u8],
    stream: (u64, u32, &str),
) -> Vec<u8> {
    w.string(name).i32(0).u8(0).u8(0).align(4);
    // width, height, complete image size, mips stripped, format, mip count
    w.i32(4).i32(2).i32(32).i32(0).i32(4).i32(1);
    w.u8(0).u8(0).u8(0).u8(0).align(4);
    // streaming priority, image count, dimension
    w.i32(0).i32(1).i32(2);
    w.i32(1).i32(1).f32(0.0).i32(0).i32(0).i32(0);
    // lightmap format, color space
    w.i32(0).i32(1);
    w.i32(0).align(4);
    w.i32(image.len() as i32).bytes(image).align(4);
    w.u64(stream.0).u32(stream.1).string(stream.2);
    w.finish()
}

/// Files held in memory, keyed by relative path.
#[derive(Debug, Default)]
pub struct MemoryFiles {
    pub files: BTreeMap<PathBuf, Vec<u8>>,
}

impl MemoryFiles {
    pub fn with(mut self, path: &str, data: Vec<u8>) -> Self {
        self.files.insert(path.into(), data);
        self
    }
}

impl EnvResolver for MemoryFiles {
    fn base_dir(&self) -> &Path {
        Path::new("")
    }

    fn read_path(&self, path: &Path) -> Result<Data, std::io::Error> {
        self.files
            .get(path)
            .map(|data| Data::from(data.clone()))
            .ok_or_else(|| ErrorKind::NotFound.into())
    }

    fn all_files(&self) -> Result<Vec<PathBuf>, std::io::Error> {
        Ok(self.files.keys().cloned().collect())
    }
}

/// A bundle holding one serialized file called `name`.
pub fn single_file_bundle(name: &str, file: &SerializedFileBuilder) -> Vec<u8> {
    BundleBuilder::new().format(7).file(name, file.build()).build()
}
