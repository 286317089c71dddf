use std::sync::{Arc, Weak};

use serde::Deserializer;
use serde_derive::{Deserialize, Serialize};

use crate::asset::{Asset, PathId};
use crate::error::{Error, Result};
use crate::handle::ObjectHandle;

/// A decoded pointer to another object, possibly in a different file.
#[derive(Clone)]
pub struct PPtr {
    /// Schema type name, e.g. `PPtr<GameObject>`
    pub class_name: String,
    pub file_id: i32,
    pub path_id: PathId,
    pub(crate) owner: Weak<Asset>,
}

impl PartialEq for PPtr {
    fn eq(&self, other: &Self) -> bool {
        self.class_name == other.class_name
            && self.file_id == other.file_id
            && self.path_id == other.path_id
    }
}

impl std::fmt::Debug for PPtr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({}, {})", self.class_name, self.file_id, self.path_id)
    }
}

impl PPtr {
    pub fn is_null(&self) -> bool {
        self.file_id == 0 && self.path_id == 0
    }

    pub fn is_local(&self) -> bool {
        self.file_id == 0
    }

    /// `GameObject` for `PPtr<GameObject>`
    pub fn target_class(&self) -> &str {
        self.class_name
            .strip_prefix("PPtr<")
            .and_then(|name| name.strip_suffix('>'))
            .map(|name| name.trim_start_matches('$'))
            .unwrap_or(&self.class_name)
    }

    pub fn to_ref(&self) -> PPtrRef {
        PPtrRef {
            m_FileID: self.file_id,
            m_PathID: self.path_id,
        }
    }

    /// The asset the pointer targets.
    pub fn resolve_asset(&self) -> Result<Arc<Asset>> {
        let owner = self.owner.upgrade().ok_or(Error::Closed)?;
        owner.resolve_file(self.file_id)
    }

    /// Looks up the target object and decodes it, unless that already happened.
    pub fn resolve(&self) -> Result<ObjectHandle> {
        let handle = self.resolve_asset()?.handle(self.path_id)?;
        handle.value()?;
        Ok(handle)
    }
}

/// Pointer field of a typed view. Null pointers deserialize to the default value.
#[allow(non_snake_case)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PPtrRef {
    pub m_FileID: i32,
    pub m_PathID: PathId,
}

impl PPtrRef {
    pub fn new(file_id: i32, path_id: PathId) -> Self {
        PPtrRef {
            m_FileID: file_id,
            m_PathID: path_id,
        }
    }

    pub fn local(path_id: PathId) -> Self {
        PPtrRef::new(0, path_id)
    }

    pub fn is_null(&self) -> bool {
        self.m_FileID == 0 && self.m_PathID == 0
    }

    pub fn is_local(&self) -> bool {
        self.m_FileID == 0
    }

    pub fn optional(self) -> Option<Self> {
        (!self.is_null()).then_some(self)
    }
}

impl<'de> serde::Deserialize<'de> for PPtrRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[allow(non_snake_case)]
        #[derive(Deserialize)]
        struct Raw {
            m_FileID: i32,
            m_PathID: PathId,
        }

        Ok(<Option<Raw> as serde::Deserialize>::deserialize(deserializer)?
            .map(|raw| PPtrRef::new(raw.m_FileID, raw.m_PathID))
            .unwrap_or_default())
    }
}
