mod object;
mod reference;
mod types;

use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::thread::ThreadId;

use indexmap::IndexMap;
use indexmap::map::Entry;
use rustc_hash::FxHashMap;

pub use object::ObjectInfo;
pub use reference::AssetReference;
pub use types::{MONO_BEHAVIOUR, RefTypeName, SerializedType, TypeMetadata};

use crate::Data;
use crate::archive_path::ArchivePath;
use crate::blocks::{BlockReader, BlockStore};
use crate::bundle::BundleFile;
use crate::env::AssetContext;
use crate::error::{Error, Result};
use crate::handle::ObjectHandle;
use crate::typetree::{TypeNode, TypeTreeCatalog};
use crate::value::Value;
use crate::value::decode::ObjectDecoder;

pub type PathId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetState {
    Unloaded,
    HeaderRead,
    SchemaResolved,
    ObjectsRegistered,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetHeader {
    pub metadata_size: u64,
    pub file_size: u64,
    pub format_version: u32,
    pub content_offset: u64,
    pub big_endian: bool,
}

impl AssetHeader {
    fn read(reader: &mut BlockReader<'_>) -> Result<Self> {
        let mut metadata_size = reader.read_u32()? as u64;
        let mut file_size = reader.read_u32()? as u64;
        let format_version = reader.read_u32()?;
        let mut content_offset = reader.read_u32()? as u64;
        let big_endian = format_version <= 9 || reader.read_i32()? != 0;

        if format_version >= 22 {
            metadata_size = reader.read_u32()? as u64;
            file_size = reader.read_u64()?;
            content_offset = reader.read_u64()?;
            // reserved
            reader.read_u64()?;
        }

        Ok(AssetHeader {
            metadata_size,
            file_size,
            format_version,
            content_offset,
            big_endian,
        })
    }
}

/// Everything read from an asset's metadata section.
#[derive(Debug, Default)]
pub struct AssetContents {
    pub header: AssetHeader,
    pub types: TypeMetadata,
    pub long_object_ids: bool,
    pub objects: IndexMap<PathId, ObjectInfo>,
    pub script_types: Vec<(PathId, i32)>,
    pub references: Vec<AssetReference>,
    pub ref_types: Vec<SerializedType>,
    object_types: FxHashMap<i32, Arc<TypeNode>>,
}

struct LoadGuard {
    state: AssetState,
    loader: Option<ThreadId>,
}

/// A serialized file, usually embedded in a bundle.
///
/// The metadata is read on first access. Objects are decoded on demand and memoized.
pub struct Asset {
    name: String,
    offset: u64,
    size: u64,
    flags: i32,
    store: Arc<BlockStore>,
    bundle: Weak<BundleFile>,
    context: Option<Weak<dyn AssetContext>>,
    guard: Mutex<LoadGuard>,
    loaded: Condvar,
    contents: OnceLock<AssetContents>,
}

impl std::fmt::Debug for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Asset")
            .field("name", &self.name)
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("state", &self.state())
            .finish()
    }
}

impl Asset {
    pub(crate) fn new(
        name: String,
        offset: u64,
        size: u64,
        flags: i32,
        store: Arc<BlockStore>,
        bundle: Weak<BundleFile>,
        context: Option<Weak<dyn AssetContext>>,
    ) -> Self {
        Asset {
            name,
            offset,
            size,
            flags,
            store,
            bundle,
            context,
            guard: Mutex::new(LoadGuard {
                state: AssetState::Unloaded,
                loader: None,
            }),
            loaded: Condvar::new(),
            contents: OnceLock::new(),
        }
    }

    /// Opens a serialized file that is not part of a bundle.
    pub fn standalone(data: Data, name: impl Into<String>) -> Arc<Asset> {
        Asset::standalone_in(data, name.into(), None)
    }

    pub(crate) fn standalone_in(
        data: Data,
        name: String,
        context: Option<Weak<dyn AssetContext>>,
    ) -> Arc<Asset> {
        let store = Arc::new(BlockStore::uncompressed(Arc::new(data)));
        let size = store.size();
        Arc::new(Asset::new(name, 0, size, 0, store, Weak::new(), context))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Offset of the asset in the bundle's decompressed payload.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn flags(&self) -> i32 {
        self.flags
    }

    pub fn store(&self) -> &Arc<BlockStore> {
        &self.store
    }

    pub fn bundle(&self) -> Option<Arc<BundleFile>> {
        self.bundle.upgrade()
    }

    /// Resource files only hold raw data that is referenced by other assets.
    pub fn is_resource(&self) -> bool {
        let name = self.name.to_ascii_lowercase();
        name.ends_with(".resource") || name.ends_with(".ress")
    }

    pub fn is_closed(&self) -> bool {
        self.store.is_closed()
    }

    pub fn state(&self) -> AssetState {
        self.lock_guard().state
    }

    fn lock_guard(&self) -> MutexGuard<'_, LoadGuard> {
        self.guard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance(&self, state: AssetState) {
        self.lock_guard().state = state;
    }

    /// Loads the asset's metadata if that hasn't happened yet.
    ///
    /// Concurrent callers wait for the first one to finish. A call from the loading thread
    /// itself fails with [`Error::NotLoaded`].
    pub fn contents(&self) -> Result<&AssetContents> {
        self.store.ensure_open()?;
        if let Some(contents) = self.contents.get() {
            return Ok(contents);
        }

        let current = std::thread::current().id();
        let mut guard = self.lock_guard();
        loop {
            match guard.state {
                AssetState::Loaded => return self.loaded_contents(),
                AssetState::Failed => return Err(Error::LoadFailed(self.name.clone())),
                _ => {}
            }
            match guard.loader {
                None => break,
                Some(loader) if loader == current => {
                    return Err(Error::NotLoaded(self.name.clone()));
                }
                Some(_) => {
                    guard = self
                        .loaded
                        .wait(guard)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
        guard.loader = Some(current);
        drop(guard);

        let result = self.load();

        let mut guard = self.lock_guard();
        guard.loader = None;
        let result = match result {
            Ok(contents) => {
                let contents = self.contents.get_or_init(|| contents);
                guard.state = AssetState::Loaded;
                Ok(contents)
            }
            Err(error) => {
                tracing::warn!("Failed to load asset '{}': {error}", self.name);
                guard.state = AssetState::Failed;
                Err(error)
            }
        };
        drop(guard);
        self.loaded.notify_all();
        result
    }

    fn loaded_contents(&self) -> Result<&AssetContents> {
        self.contents
            .get()
            .ok_or_else(|| Error::NotLoaded(self.name.clone()))
    }

    fn load(&self) -> Result<AssetContents> {
        if self.is_resource() {
            return Ok(AssetContents::default());
        }

        let mut reader = self.store.reader();
        reader.seek_to(self.offset)?;
        let header = AssetHeader::read(&mut reader)?;
        reader.set_big_endian(header.big_endian);
        self.advance(AssetState::HeaderRead);
        let format = header.format_version;

        let types = TypeMetadata::read(&mut reader, format)?;
        self.advance(AssetState::SchemaResolved);

        let long_object_ids = (7..=13).contains(&format) && reader.read_i32()? != 0;

        let object_count = reader.read_len()?;
        let mut objects = IndexMap::with_capacity(object_count.min(1 << 16));
        let mut object_types = FxHashMap::default();
        for _ in 0..object_count {
            if format >= 14 {
                reader.align()?;
            }
            let info = ObjectInfo::read(
                &mut reader,
                format,
                long_object_ids,
                header.content_offset,
                &types,
            )?;

            if let std::collections::hash_map::Entry::Vacant(entry) =
                object_types.entry(info.type_id)
                && let Some(tree) = types
                    .tree(info.type_id)
                    .or_else(|| TypeTreeCatalog::global().get(info.engine_class_id()))
            {
                entry.insert(Arc::clone(tree));
            }

            match objects.entry(info.path_id) {
                Entry::Occupied(_) => {
                    return Err(Error::DuplicateObject {
                        asset: self.name.clone(),
                        path_id: info.path_id,
                    });
                }
                Entry::Vacant(entry) => {
                    entry.insert(info);
                }
            }
        }
        self.advance(AssetState::ObjectsRegistered);

        let mut script_types = Vec::new();
        if format >= 11 {
            let count = reader.read_len()?;
            script_types.reserve(count.min(1 << 12));
            for _ in 0..count {
                if format >= 14 {
                    reader.align()?;
                }
                let path_id = object::read_path_id(&mut reader, format, false)?;
                script_types.push((path_id, reader.read_i32()?));
            }
        }

        let mut references = Vec::new();
        if format >= 6 {
            let count = reader.read_len()?;
            references.reserve(count.min(1 << 12));
            for _ in 0..count {
                references.push(AssetReference::read(&mut reader)?);
            }
        }

        let ref_types = match format >= 20 {
            true => types.read_ref_types(&mut reader, format)?,
            false => Vec::new(),
        };

        let trailer = reader.read_cstr()?;
        if !trailer.is_empty() {
            return Err(Error::format(format!(
                "Unexpected trailing data {trailer:?} in '{}'",
                self.name
            )));
        }

        tracing::debug!(
            "Loaded '{}' (format {format}, {} objects, {} references)",
            self.name,
            objects.len(),
            references.len()
        );

        Ok(AssetContents {
            header,
            types,
            long_object_ids,
            objects,
            script_types,
            references,
            ref_types,
            object_types,
        })
    }

    pub fn header(&self) -> Result<&AssetHeader> {
        Ok(&self.contents()?.header)
    }

    pub fn format_version(&self) -> Result<u32> {
        Ok(self.contents()?.header.format_version)
    }

    pub fn objects(&self) -> Result<impl ExactSizeIterator<Item = &ObjectInfo>> {
        Ok(self.contents()?.objects.values())
    }

    pub fn object(&self, path_id: PathId) -> Result<&ObjectInfo> {
        self.contents()?
            .objects
            .get(&path_id)
            .ok_or_else(|| Error::UnresolvedObject {
                asset: self.name.clone(),
                path_id,
            })
    }

    pub fn references(&self) -> Result<&[AssetReference]> {
        Ok(&self.contents()?.references)
    }

    /// Looks up the type tree an object is decoded with.
    pub fn find_schema(&self, info: &ObjectInfo) -> Result<Arc<TypeNode>> {
        let contents = self.contents()?;
        let tree = match info.type_id < 0 {
            true => contents
                .types
                .tree(info.type_id)
                .or_else(|| contents.types.tree(info.class_id))
                .or_else(|| TypeTreeCatalog::global().get(info.engine_class_id())),
            false => contents.object_types.get(&info.type_id),
        };
        tree.cloned().ok_or_else(|| Error::MissingSchema {
            asset: self.name.clone(),
            type_id: info.type_id,
            class_id: info.class_id,
        })
    }

    /// A reader over the bundle payload using this asset's byte order.
    pub fn reader(&self) -> Result<BlockReader<'_>> {
        let big_endian = self.header()?.big_endian;
        let mut reader = self.store.reader();
        reader.set_big_endian(big_endian);
        Ok(reader)
    }

    /// Decodes an object, or returns the value decoded by an earlier call.
    pub fn read_object(self: &Arc<Self>, path_id: PathId) -> Result<&Value> {
        let info = self.object(path_id)?;
        if let Some(value) = info.value.get() {
            return Ok(value);
        }

        let schema = self.find_schema(info)?;
        let format_version = self.format_version()?;
        let mut reader = self.reader()?;
        reader.seek_to(self.offset + info.offset)?;
        let value = ObjectDecoder::new(&mut reader, self, format_version).decode(&schema)?;

        Ok(info.value.get_or_init(|| value))
    }

    pub fn handle<T>(self: &Arc<Self>, path_id: PathId) -> Result<ObjectHandle<T>> {
        self.object(path_id)?;
        Ok(ObjectHandle::new(Arc::clone(self), path_id))
    }

    pub fn handles(self: &Arc<Self>) -> Result<impl Iterator<Item = ObjectHandle> + '_> {
        Ok(self
            .objects()?
            .map(|info| ObjectHandle::new(Arc::clone(self), info.path_id)))
    }

    pub fn objects_of_class(
        &self,
        class_id: i32,
    ) -> Result<impl Iterator<Item = &ObjectInfo> + '_> {
        Ok(self
            .objects()?
            .filter(move |info| info.engine_class_id() == class_id))
    }

    /// Reads bytes relative to the start of this asset.
    pub fn read_raw(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        if offset.checked_add(size).is_none_or(|end| end > self.size) {
            return Err(Error::format(format!(
                "Range {offset}+{size} is outside of '{}' ({} bytes)",
                self.name, self.size
            )));
        }
        let mut reader = self.store.reader();
        reader.seek_to(self.offset + offset)?;
        reader.read_bytes(size as usize)
    }

    /// The serialized bytes of an object.
    pub fn object_data(&self, info: &ObjectInfo) -> Result<Vec<u8>> {
        self.read_raw(info.offset, info.size as u64)
    }

    /// Resolves a file id of a pointer stored in this asset. `0` is the asset itself.
    pub fn resolve_file(self: &Arc<Self>, file_id: i32) -> Result<Arc<Asset>> {
        if file_id == 0 {
            return Ok(Arc::clone(self));
        }

        let references = self.references()?;
        let reference = usize::try_from(file_id)
            .ok()
            .and_then(|index| references.get(index - 1))
            .ok_or_else(|| {
                Error::UnresolvedAsset(format!("file id {file_id} of '{}'", self.name))
            })?;

        if let Some(asset) = reference.cached() {
            return Ok(asset);
        }
        let asset = self.resolve_asset(&reference.file_path)?;
        reference.cache(&asset);
        Ok(asset)
    }

    /// Resolves a path like `archive:/CAB-x/CAB-x.resS` or a plain file name.
    ///
    /// Paths into this asset's own bundle are resolved directly, everything else
    /// goes through the environment the bundle was opened in.
    pub fn resolve_asset(&self, path: &str) -> Result<Arc<Asset>> {
        let bundle = self.bundle.upgrade();
        let archive_path = ArchivePath::try_parse(path)?;

        if let Some(archive_path) = archive_path
            && let Some(bundle) = &bundle
            && bundle.name().eq_ignore_ascii_case(archive_path.bundle)
            && let Some(asset) = bundle.asset(archive_path.file)
        {
            return Ok(Arc::clone(asset));
        }

        if let Some(context) = &self.context {
            let context = context.upgrade().ok_or(Error::Closed)?;
            return match archive_path {
                Some(_) => context.asset_by_uri(path),
                None => context.asset_by_name(path),
            };
        }

        if archive_path.is_none()
            && let Some(bundle) = &bundle
            && let Some(asset) = bundle.asset(path)
        {
            return Ok(Arc::clone(asset));
        }
        Err(Error::UnresolvedAsset(path.to_owned()))
    }
}
