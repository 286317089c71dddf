use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::Data;
use crate::compression::{self, Compression};
use crate::error::{Error, Result};
use crate::reader::EndianReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub flags: u16,
}

impl BlockInfo {
    pub fn compression(&self) -> Result<Compression> {
        Compression::from_flag(self.flags as u32)
    }
}

/// Virtual stream over the decompressed concatenation of a bundle's blocks.
///
/// Blocks are decompressed on first access and kept for the lifetime of the store.
pub struct BlockStore {
    data: Arc<Data>,
    blocks: Vec<BlockInfo>,
    /// `(compressed start in data, logical start)` per block
    starts: Vec<(u64, u64)>,
    size: u64,
    cache: Vec<OnceLock<Box<[u8]>>>,
    closed: AtomicBool,
}

pub type BlockReader<'a> = EndianReader<BlockCursor<'a>>;

impl std::fmt::Debug for BlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockStore")
            .field("blocks", &self.blocks.len())
            .field("size", &self.size)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl BlockStore {
    /// `base_offset` is the position of the first block's compressed bytes in `data`.
    pub fn new(data: Arc<Data>, base_offset: u64, blocks: Vec<BlockInfo>) -> Self {
        let mut starts = Vec::with_capacity(blocks.len());
        let (mut raw, mut logical) = (base_offset, 0);
        for block in &blocks {
            starts.push((raw, logical));
            raw += block.compressed_size as u64;
            logical += block.uncompressed_size as u64;
        }
        let cache = blocks.iter().map(|_| OnceLock::new()).collect();

        BlockStore {
            data,
            blocks,
            starts,
            size: logical,
            cache,
            closed: AtomicBool::new(false),
        }
    }

    /// A store exposing `data` as is, for serialized files outside of a bundle.
    pub fn uncompressed(data: Arc<Data>) -> Self {
        let mut remaining = (*data).as_ref().len() as u64;
        let mut blocks = Vec::new();
        while remaining > 0 {
            let size = remaining.min(u32::MAX as u64) as u32;
            blocks.push(BlockInfo {
                uncompressed_size: size,
                compressed_size: size,
                flags: 0,
            });
            remaining -= size as u64;
        }
        BlockStore::new(data, 0, blocks)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn blocks(&self) -> &[BlockInfo] {
        &self.blocks
    }

    pub fn reader(&self) -> BlockReader<'_> {
        EndianReader::new(
            BlockCursor {
                store: self,
                pos: 0,
                current: None,
            },
            true,
        )
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn ensure_open(&self) -> Result<()> {
        match self.is_closed() {
            true => Err(Error::Closed),
            false => Ok(()),
        }
    }

    /// Index of the block containing the logical offset, or `None` past the end.
    fn locate(&self, offset: u64) -> Option<usize> {
        if offset >= self.size {
            return None;
        }
        let index = self.starts.partition_point(|&(_, start)| start <= offset);
        Some(index - 1)
    }

    /// Returns the decompressed contents of a block.
    pub fn block(&self, index: usize) -> Result<&[u8]> {
        self.ensure_open()?;
        let info = self.blocks[index];
        let (raw_start, _) = self.starts[index];

        let data = (*self.data).as_ref();
        let compressed = usize::try_from(raw_start)
            .ok()
            .and_then(|start| data.get(start..start + info.compressed_size as usize))
            .ok_or_else(|| {
                Error::format(format!(
                    "Block {index} extends past the end of the file ({} bytes)",
                    data.len()
                ))
            })?;

        let compression = info.compression()?;
        if compression == Compression::None {
            return compressed
                .get(..info.uncompressed_size as usize)
                .ok_or(Error::DecompressionShortfall {
                    expected: info.uncompressed_size as u64,
                    actual: compressed.len() as u64,
                });
        }

        if let Some(block) = self.cache[index].get() {
            return Ok(block);
        }
        tracing::trace!(
            "Decompressing block {index} ({compression:?}, {} -> {} bytes)",
            info.compressed_size,
            info.uncompressed_size
        );
        let decompressed = compression::decompress(
            &mut &compressed[..],
            compression,
            info.uncompressed_size as usize,
        )?;
        Ok(self.cache[index].get_or_init(|| decompressed.into_boxed_slice()))
    }

    pub fn is_cached(&self, index: usize) -> bool {
        self.cache.get(index).is_some_and(|block| block.get().is_some())
    }
}

/// Cursor over a [`BlockStore`]. Each cursor has its own position, stores are shared.
pub struct BlockCursor<'a> {
    store: &'a BlockStore,
    pos: u64,
    /// `(logical start, contents)` of the last visited block
    current: Option<(u64, &'a [u8])>,
}

impl<'a> BlockCursor<'a> {
    pub fn store(&self) -> &'a BlockStore {
        self.store
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn remaining(&self) -> u64 {
        self.store.size.saturating_sub(self.pos)
    }

    fn current_block(&mut self) -> Result<Option<(u64, &'a [u8])>> {
        if let Some((start, block)) = self.current
            && (start..start + block.len() as u64).contains(&self.pos)
        {
            return Ok(Some((start, block)));
        }

        let Some(index) = self.store.locate(self.pos) else {
            self.current = None;
            return Ok(None);
        };
        let block = self.store.block(index)?;
        let start = self.store.starts[index].1;
        self.current = Some((start, block));
        Ok(self.current)
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.store.ensure_open()?;

        let mut filled = 0;
        while filled < buf.len() {
            let Some((start, block)) = self.current_block()? else {
                break;
            };
            let available = &block[(self.pos - start) as usize..];
            if available.is_empty() {
                break;
            }
            let n = available.len().min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&available[..n]);
            filled += n;
            self.pos += n as u64;
        }
        Ok(filled)
    }
}

impl Read for BlockCursor<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.fill(buf).map_err(std::io::Error::other)
    }
}

impl Seek for BlockCursor<'_> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        if self.store.is_closed() {
            return Err(std::io::Error::other(Error::Closed));
        }
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(offset) => self.store.size.checked_add_signed(offset),
            SeekFrom::Current(offset) => self.pos.checked_add_signed(offset),
        };
        self.pos = target.ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;
        Ok(self.pos)
    }

    fn stream_position(&mut self) -> std::io::Result<u64> {
        Ok(self.pos)
    }
}
