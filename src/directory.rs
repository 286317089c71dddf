use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use walkdir::WalkDir;

use crate::Data;
use crate::resolver::EnvResolver;

/// Bundles stored in a directory tree on disk.
#[derive(Debug, Clone)]
pub struct Directory {
    pub root: PathBuf,
    pub max_depth: usize,
}

impl Directory {
    pub const DEFAULT_MAX_DEPTH: usize = 8;

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Directory {
            root: root.into(),
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl EnvResolver for Directory {
    fn base_dir(&self) -> &Path {
        &self.root
    }

    fn read_path(&self, path: &Path) -> Result<Data, std::io::Error> {
        let file = File::open(self.root.join(path))?;
        if file.metadata()?.len() == 0 {
            return Ok(Data::InMemory(Vec::new()));
        }
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Data::Mmap(mmap))
    }

    /// Paths relative to the root.
    fn all_files(&self) -> Result<Vec<PathBuf>, std::io::Error> {
        let mut all = Vec::new();
        for entry in WalkDir::new(&self.root)
            .max_depth(self.max_depth)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                let kind = e.io_error().map_or(ErrorKind::Other, std::io::Error::kind);
                std::io::Error::new(kind, e)
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                all.push(relative.to_owned());
            }
        }
        Ok(all)
    }
}
