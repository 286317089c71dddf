use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use crate::Data;
use crate::asset::Asset;
use crate::blocks::{BlockInfo, BlockStore};
use crate::compression::{self, Compression};
use crate::env::AssetContext;
use crate::error::{Error, Result};
use crate::reader::EndianReader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleHeader {
    pub format_version: u32,
    pub player_version: String,
    pub engine_version: String,
    pub size: u64,
    pub compressed_metadata_size: u32,
    pub uncompressed_metadata_size: u32,
    pub flags: u32,
}

impl BundleHeader {
    pub const SIGNATURE: &[u8; 8] = b"UnityFS\0";
    const METADATA_AT_END: u32 = 0x80;

    pub fn read(reader: &mut EndianReader<impl Read>) -> Result<Self> {
        let signature = reader.read_array::<8>()?;
        if &signature != Self::SIGNATURE {
            let signature = String::from_utf8_lossy(&signature);
            return Err(Error::InvalidSignature(
                signature.trim_end_matches('\0').to_owned(),
            ));
        }

        Ok(BundleHeader {
            format_version: reader.read_u32()?,
            player_version: reader.read_cstr()?,
            engine_version: reader.read_cstr()?,
            size: reader.read_u64()?,
            compressed_metadata_size: reader.read_u32()?,
            uncompressed_metadata_size: reader.read_u32()?,
            flags: reader.read_u32()?,
        })
    }

    pub fn compression(&self) -> Result<Compression> {
        Compression::from_flag(self.flags)
    }

    pub fn metadata_at_end(&self) -> bool {
        self.flags & Self::METADATA_AT_END != 0
    }
}

/// A file entry of the bundle's directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Relative to the start of the decompressed payload
    pub offset: u64,
    pub size: u64,
    pub flags: i32,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct BundleMetadata {
    pub uuid: [u8; 16],
    pub blocks: Vec<BlockInfo>,
    pub nodes: Vec<Node>,
}

impl BundleMetadata {
    fn read(data: &[u8]) -> Result<Self> {
        let mut reader = EndianReader::new(Cursor::new(data), true);
        let uuid = reader.read_array()?;

        let block_count = reader.read_len()?;
        let mut blocks = Vec::with_capacity(block_count.min(data.len() / 10));
        for _ in 0..block_count {
            blocks.push(BlockInfo {
                uncompressed_size: reader.read_u32()?,
                compressed_size: reader.read_u32()?,
                flags: reader.read_u16()?,
            });
        }

        let node_count = reader.read_len()?;
        let mut nodes = Vec::with_capacity(node_count.min(data.len() / 21));
        for _ in 0..node_count {
            let offset = reader.read_i64()?;
            let size = reader.read_i64()?;
            let flags = reader.read_i32()?;
            let name = reader.read_cstr()?;
            let (Ok(offset), Ok(size)) = (u64::try_from(offset), u64::try_from(size)) else {
                return Err(Error::format(format!(
                    "Node '{name}' has negative range {offset}+{size}"
                )));
            };
            nodes.push(Node {
                offset,
                size,
                flags,
                name,
            });
        }

        Ok(BundleMetadata {
            uuid,
            blocks,
            nodes,
        })
    }
}

/// An opened UnityFS bundle and the assets embedded in it.
pub struct BundleFile {
    name: String,
    path: Option<PathBuf>,
    header: BundleHeader,
    metadata: BundleMetadata,
    store: Arc<BlockStore>,
    assets: Vec<Arc<Asset>>,
}

impl std::fmt::Debug for BundleFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleFile")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("nodes", &self.metadata.nodes)
            .finish()
    }
}

impl BundleFile {
    /// Memory-maps and parses the bundle at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Arc<BundleFile>> {
        let path = path.as_ref();
        let data = unsafe { memmap2::Mmap::map(&File::open(path)?)? };
        BundleFile::load(Arc::new(Data::Mmap(data)), Some(path.to_owned()), None)
    }

    pub fn from_data(data: impl Into<Data>) -> Result<Arc<BundleFile>> {
        BundleFile::load(Arc::new(data.into()), None, None)
    }

    pub(crate) fn load(
        data: Arc<Data>,
        path: Option<PathBuf>,
        context: Option<Weak<dyn AssetContext>>,
    ) -> Result<Arc<BundleFile>> {
        let bytes: &[u8] = (*data).as_ref();
        let mut reader = EndianReader::new(Cursor::new(bytes), true);
        let header = BundleHeader::read(&mut reader)?;
        if header.format_version >= 7 {
            reader.align_to(16)?;
        }

        let compression = header.compression()?;
        let compressed_size = header.compressed_metadata_size as u64;
        let uncompressed_size = header.uncompressed_metadata_size as usize;
        let metadata = match header.metadata_at_end() {
            true => {
                let saved = reader.tell()?;
                let start = (bytes.len() as u64)
                    .checked_sub(compressed_size)
                    .ok_or_else(|| Error::format("Metadata is larger than the file"))?;
                reader.seek_to(start)?;
                let metadata = compression::decompress(
                    &mut (&mut reader).take(compressed_size),
                    compression,
                    uncompressed_size,
                )?;
                reader.seek_to(saved)?;
                metadata
            }
            false => compression::decompress(
                &mut (&mut reader).take(compressed_size),
                compression,
                uncompressed_size,
            )?,
        };
        let metadata = BundleMetadata::read(&metadata)?;

        let base_offset = reader.tell()?;
        let store = Arc::new(BlockStore::new(
            Arc::clone(&data),
            base_offset,
            metadata.blocks.clone(),
        ));

        let Some(first) = metadata.nodes.first() else {
            return Err(Error::format("Bundle contains no files"));
        };
        for node in &metadata.nodes {
            if node
                .offset
                .checked_add(node.size)
                .is_none_or(|end| end > store.size())
            {
                return Err(Error::format(format!(
                    "Node '{}' at {}+{} exceeds the payload of {} bytes",
                    node.name,
                    node.offset,
                    node.size,
                    store.size()
                )));
            }
        }
        let name = first.name.clone();

        tracing::debug!(
            "Opened bundle '{name}' ({} blocks, {} files, {compression:?})",
            metadata.blocks.len(),
            metadata.nodes.len(),
        );

        Ok(Arc::new_cyclic(|this: &Weak<BundleFile>| {
            let assets = metadata
                .nodes
                .iter()
                .map(|node| {
                    Arc::new(Asset::new(
                        node.name.clone(),
                        node.offset,
                        node.size,
                        node.flags,
                        Arc::clone(&store),
                        this.clone(),
                        context.clone(),
                    ))
                })
                .collect();
            BundleFile {
                name,
                path,
                header,
                metadata,
                store,
                assets,
            }
        }))
    }

    /// Name of the first file, which identifies the bundle.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn header(&self) -> &BundleHeader {
        &self.header
    }

    pub fn metadata(&self) -> &BundleMetadata {
        &self.metadata
    }

    pub fn store(&self) -> &Arc<BlockStore> {
        &self.store
    }

    pub fn assets(&self) -> &[Arc<Asset>] {
        &self.assets
    }

    /// Embedded file by case-insensitive name.
    pub fn asset(&self, name: &str) -> Option<&Arc<Asset>> {
        self.assets
            .iter()
            .find(|asset| asset.name().eq_ignore_ascii_case(name))
    }

    /// Releases the decompressed blocks. Every later read through this bundle's assets
    /// fails with [`Error::Closed`].
    pub fn close(&self) {
        self.store.close();
    }

    pub fn is_closed(&self) -> bool {
        self.store.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_signature() {
        let error = BundleFile::from_data(b"UnityWeb\0\0\0\0\0\0\0\0".to_vec()).unwrap_err();
        assert!(matches!(error, Error::InvalidSignature(ref s) if s == "UnityWeb"));
        assert!(error.is_format());
    }

    #[test]
    fn rejects_unknown_compression() {
        let mut data = Vec::new();
        data.extend_from_slice(BundleHeader::SIGNATURE);
        data.extend_from_slice(&6u32.to_be_bytes());
        data.extend_from_slice(b"5.x.x\0");
        data.extend_from_slice(b"2020.3.48f1\0");
        data.extend_from_slice(&0u64.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&0x3Eu32.to_be_bytes());

        let error = BundleFile::from_data(data).unwrap_err();
        assert!(matches!(error, Error::UnknownCompression(0x3E)));
    }
}
