use std::path::{Path, PathBuf};

use crate::Data;
use crate::bundle::BundleHeader;

/// A trait abstracting where bundle files are read from.
pub trait EnvResolver: Send + Sync {
    fn base_dir(&self) -> &Path;

    fn read_path(&self, path: &Path) -> Result<Data, std::io::Error>;
    fn all_files(&self) -> Result<Vec<PathBuf>, std::io::Error>;

    /// Files starting with the `UnityFS` signature.
    fn bundle_files(&self) -> Result<Vec<PathBuf>, std::io::Error> {
        let mut bundles = Vec::new();
        for path in self.all_files()? {
            let data = self.read_path(&path)?;
            if data.as_ref().starts_with(BundleHeader::SIGNATURE) {
                bundles.push(path);
            }
        }
        Ok(bundles)
    }
}

impl<T: EnvResolver> EnvResolver for &T {
    fn base_dir(&self) -> &Path {
        (**self).base_dir()
    }

    fn read_path(&self, path: &Path) -> Result<Data, std::io::Error> {
        (**self).read_path(path)
    }

    fn all_files(&self) -> Result<Vec<PathBuf>, std::io::Error> {
        (**self).all_files()
    }

    fn bundle_files(&self) -> Result<Vec<PathBuf>, std::io::Error> {
        (**self).bundle_files()
    }
}
