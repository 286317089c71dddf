//! Reader for Unity `UnityFS` asset bundles.
//!
//! An [`Environment`] opens bundles through an [`EnvResolver`] and keeps a registry of the
//! bundles and the assets inside them, so that pointers between files can be followed.
//! Objects are decoded on demand into dynamically typed [`Value`]s using the type trees
//! embedded in the files, or the bundled [`TypeTreeCatalog`] for files without them.

pub mod archive_path;
pub mod asset;
pub mod blocks;
pub mod bundle;
pub mod compression;
pub mod directory;
pub mod env;
pub mod error;
pub mod handle;
pub mod reachable;
pub mod reader;
pub mod resolver;
pub mod typetree;
pub mod unity;
pub mod utils;
pub mod value;

pub use archive_path::ArchivePath;
pub use asset::{Asset, AssetState, PathId};
pub use blocks::BlockStore;
pub use bundle::BundleFile;
pub use directory::Directory;
pub use env::Environment;
pub use error::{Error, Result};
pub use handle::ObjectHandle;
pub use resolver::EnvResolver;
pub use typetree::{TypeNode, TypeTreeCatalog};
pub use value::{PPtr, PPtrRef, Value};

pub enum Data {
    InMemory(Vec<u8>),
    Mmap(memmap2::Mmap),
}
impl AsRef<[u8]> for Data {
    fn as_ref(&self) -> &[u8] {
        match self {
            Data::InMemory(data) => data.as_slice(),
            Data::Mmap(mmap) => mmap.as_ref(),
        }
    }
}
impl From<Vec<u8>> for Data {
    fn from(data: Vec<u8>) -> Self {
        Data::InMemory(data)
    }
}
impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Data::InMemory(data) => write!(f, "InMemory({} bytes)", data.len()),
            Data::Mmap(mmap) => write!(f, "Mmap({} bytes)", mmap.len()),
        }
    }
}
