use std::io::{Read, Seek};
use std::sync::{Arc, OnceLock, Weak};

use crate::asset::Asset;
use crate::error::Result;
use crate::reader::EndianReader;

/// An external file referenced by an asset. File id `n` refers to the `n-1`th reference.
#[derive(Debug)]
pub struct AssetReference {
    pub asset_path: String,
    pub guid: [u8; 16],
    pub kind: i32,
    pub file_path: String,
    resolved: OnceLock<Weak<Asset>>,
}

impl AssetReference {
    pub(crate) fn read<R: Read + Seek>(reader: &mut EndianReader<R>) -> Result<Self> {
        Ok(AssetReference {
            asset_path: reader.read_cstr()?,
            guid: reader.read_array()?,
            kind: reader.read_i32()?,
            file_path: reader.read_cstr()?,
            resolved: OnceLock::new(),
        })
    }

    pub(crate) fn cached(&self) -> Option<Arc<Asset>> {
        self.resolved.get()?.upgrade()
    }

    pub(crate) fn cache(&self, asset: &Arc<Asset>) {
        let _ = self.resolved.set(Arc::downgrade(asset));
    }

    pub fn is_resolved(&self) -> bool {
        self.cached().is_some()
    }
}
