use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Deserialize;

use crate::asset::{Asset, ObjectInfo, PathId};
use crate::error::{Error, Result};
use crate::typetree::TypeNode;
use crate::unity::KnownObject;
use crate::unity::types::{ClassIdType, GameObject, Transform};
use crate::value::{PPtrRef, Value, from_value};

/// An object of an asset. `T` is the view it is read as.
pub struct ObjectHandle<T = Value> {
    asset: Arc<Asset>,
    path_id: PathId,
    marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ObjectHandle<T> {
    fn clone(&self) -> Self {
        ObjectHandle::new(Arc::clone(&self.asset), self.path_id)
    }
}

impl<T> std::fmt::Debug for ObjectHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("asset", &self.asset.name())
            .field("path_id", &self.path_id)
            .finish()
    }
}

impl<T> ObjectHandle<T> {
    pub(crate) fn new(asset: Arc<Asset>, path_id: PathId) -> Self {
        ObjectHandle {
            asset,
            path_id,
            marker: PhantomData,
        }
    }

    pub fn asset(&self) -> &Arc<Asset> {
        &self.asset
    }

    pub fn path_id(&self) -> PathId {
        self.path_id
    }

    pub fn info(&self) -> Result<&ObjectInfo> {
        self.asset.object(self.path_id)
    }

    pub fn class_id(&self) -> Result<i32> {
        Ok(self.info()?.engine_class_id())
    }

    pub fn schema(&self) -> Result<Arc<TypeNode>> {
        self.asset.find_schema(self.info()?)
    }

    /// The decoded object. Decoding happens once per object.
    pub fn value(&self) -> Result<&Value> {
        self.asset.read_object(self.path_id)
    }

    /// Serialized bytes of the object.
    pub fn data(&self) -> Result<Vec<u8>> {
        self.asset.object_data(self.info()?)
    }

    pub fn read(&self) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        from_value(self.value()?)
    }

    /// Reads the object through the view registered for its type name.
    pub fn known(&self) -> Result<Option<KnownObject>> {
        crate::unity::view(self.value()?).transpose()
    }

    pub fn cast<U>(self) -> ObjectHandle<U> {
        ObjectHandle::new(self.asset, self.path_id)
    }

    /// Follows a pointer read from this object. Null pointers give `None`.
    pub fn deref<U>(&self, pptr: PPtrRef) -> Result<Option<ObjectHandle<U>>> {
        let Some(pptr) = pptr.optional() else {
            return Ok(None);
        };
        let asset = self.asset.resolve_file(pptr.m_FileID)?;
        asset.handle(pptr.m_PathID).map(Some)
    }

    pub fn deref_read<U: for<'de> Deserialize<'de>>(&self, pptr: PPtrRef) -> Result<Option<U>> {
        self.deref::<U>(pptr)?
            .map(|handle| handle.read())
            .transpose()
    }

    /// See [`crate::reachable::reachable`].
    pub fn reachable(&self) -> Result<(BTreeSet<PathId>, BTreeSet<PPtrRef>)> {
        crate::reachable::reachable(self)
    }
}

impl ObjectHandle<GameObject> {
    const MAX_DEPTH: usize = 1024;

    /// The names of the object and all its parents, separated by `/`.
    pub fn path(&self) -> Result<String> {
        let mut transform = self.transform()?;
        let mut segments = vec![self.read()?.m_Name];

        while let Some(parent) = transform.deref::<Transform>(transform.read()?.m_Father)? {
            let game_object = parent
                .deref_read::<GameObject>(parent.read()?.m_GameObject)?
                .ok_or_else(|| {
                    Error::format(format!("Transform {} has no game object", parent.path_id()))
                })?;
            segments.push(game_object.m_Name);
            if segments.len() > Self::MAX_DEPTH {
                return Err(Error::format(format!(
                    "Transform hierarchy of {} is cyclic",
                    self.path_id
                )));
            }
            transform = parent;
        }

        segments.reverse();
        Ok(segments.join("/"))
    }

    /// The `Transform` component of the game object.
    pub fn transform(&self) -> Result<ObjectHandle<Transform>> {
        for component in self.read()?.m_Component {
            if let Some(handle) = self.deref::<Transform>(component.component)?
                && handle.class_id()? == Transform::CLASS_ID
            {
                return Ok(handle);
            }
        }
        Err(Error::format(format!(
            "GameObject {} has no Transform",
            self.path_id
        )))
    }
}
