use std::io::Cursor;
use std::sync::{Arc, OnceLock};

use rustc_hash::FxHashMap;

use crate::asset::TypeMetadata;
use crate::error::Result;
use crate::reader::EndianReader;
use crate::typetree::TypeNode;

static STRUCTS: &[u8] = include_bytes!("../../resources/structs.dat");
static GLOBAL: OnceLock<TypeTreeCatalog> = OnceLock::new();

/// Class layouts by class id, for serialized files that don't embed their type trees.
#[derive(Debug, Default)]
pub struct TypeTreeCatalog {
    pub engine_version: String,
    types: FxHashMap<i32, Arc<TypeNode>>,
}

impl TypeTreeCatalog {
    /// Catalogs are stored as the type section of a big endian format 15 serialized file.
    pub const FORMAT_VERSION: u32 = 15;

    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = EndianReader::new(Cursor::new(data), true);
        let metadata = TypeMetadata::read(&mut reader, Self::FORMAT_VERSION)?;

        let types = metadata
            .types
            .into_iter()
            .filter_map(|ty| Some((ty.class_id, ty.tree?)))
            .collect();
        Ok(TypeTreeCatalog {
            engine_version: metadata.engine_version,
            types,
        })
    }

    /// The catalog bundled with this crate. Parsed on first use.
    ///
    /// It only covers `GameObject` (1), `Transform` (4), `Texture2D` (28), `TextAsset` (49),
    /// `MonoBehaviour` (114) and `MonoScript` (115), with Unity 2020.3 layouts. Objects of other
    /// classes in files without embedded type trees fail with [`Error::MissingSchema`].
    ///
    /// [`Error::MissingSchema`]: crate::error::Error::MissingSchema
    pub fn global() -> &'static TypeTreeCatalog {
        GLOBAL.get_or_init(|| {
            let catalog = TypeTreeCatalog::parse(STRUCTS).expect("bundled structs.dat is invalid");
            tracing::debug!(
                "Loaded default type tree catalog for {} ({} classes)",
                catalog.engine_version,
                catalog.types.len()
            );
            catalog
        })
    }

    pub fn get(&self, class_id: i32) -> Option<&Arc<TypeNode>> {
        self.types.get(&class_id)
    }

    pub fn class_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.types.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_catalog() {
        let catalog = TypeTreeCatalog::global();
        let game_object = catalog.get(1).unwrap();
        assert_eq!(game_object.type_name, "GameObject");
        assert_eq!(game_object.name, "Base");
        let names: Vec<_> = game_object.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            ["m_Component", "m_Layer", "m_Name", "m_Tag", "m_IsActive"]
        );

        for class_id in [4, 28, 49, 114, 115] {
            assert!(catalog.get(class_id).is_some(), "missing class {class_id}");
        }
        assert!(catalog.get(-1).is_none());
        assert!(std::ptr::eq(catalog, TypeTreeCatalog::global()));
    }
}
