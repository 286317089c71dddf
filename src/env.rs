use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use elsa::sync::FrozenMap;

use crate::Data;
use crate::archive_path::ArchivePath;
use crate::asset::Asset;
use crate::blocks::BlockStore;
use crate::bundle::BundleFile;
use crate::directory::Directory;
use crate::error::{Error, Result};
use crate::resolver::EnvResolver;
use crate::utils::par_fold_reduce;

/// Lookup of other files, used by assets to resolve their references.
pub(crate) trait AssetContext: Send + Sync {
    fn asset_by_uri(&self, uri: &str) -> Result<Arc<Asset>>;
    fn asset_by_name(&self, name: &str) -> Result<Arc<Asset>>;
}

/// Registry of opened bundles and the assets inside them.
///
/// Each path, bundle name and asset name is registered at most once. When two threads open the
/// same file concurrently, both get the instance that was published first.
pub struct Environment<R = Directory> {
    pub resolver: R,
    bundles_by_path: FrozenMap<PathBuf, Box<Arc<BundleFile>>>,
    bundles_by_name: FrozenMap<String, Box<Arc<BundleFile>>>,
    files_by_path: FrozenMap<PathBuf, Box<Arc<Asset>>>,
    assets: FrozenMap<String, Box<Arc<Asset>>>,
    stores: Mutex<Vec<Arc<BlockStore>>>,
    publish: Mutex<()>,
    closed: AtomicBool,
    this: Weak<Self>,
}

impl<R> std::fmt::Debug for Environment<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Environment<Directory> {
    pub fn new_in(path: impl Into<PathBuf>) -> Arc<Self> {
        Environment::new(Directory::new(path))
    }
}

impl<R> Environment<R> {
    pub fn new(resolver: R) -> Arc<Self> {
        Arc::new_cyclic(|this| Environment {
            resolver,
            bundles_by_path: Default::default(),
            bundles_by_name: Default::default(),
            files_by_path: Default::default(),
            assets: Default::default(),
            stores: Mutex::new(Vec::new()),
            publish: Mutex::new(()),
            closed: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        match self.is_closed() {
            true => Err(Error::Closed),
            false => Ok(()),
        }
    }

    /// Closes every opened bundle and file. Later lookups, and reads through assets
    /// that were handed out earlier, fail with [`Error::Closed`].
    pub fn close(&self) {
        let _publish = self.publish.lock().unwrap_or_else(PoisonError::into_inner);
        self.closed.store(true, Ordering::Release);
        let stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        for store in stores.iter() {
            store.close();
        }
    }

    /// Previously opened bundle, by its path relative to the resolver.
    pub fn bundle(&self, path: impl AsRef<Path>) -> Option<Arc<BundleFile>> {
        self.bundles_by_path.get(path.as_ref()).cloned()
    }

    /// Previously opened asset, by case-insensitive name.
    pub fn loaded_asset(&self, name: &str) -> Option<Arc<Asset>> {
        self.assets.get(&name.to_ascii_lowercase()).cloned()
    }

    /// Registers `candidate` unless another thread published the same path first,
    /// in which case the candidate is closed and the existing bundle returned.
    fn publish_bundle(&self, path: &Path, candidate: Arc<BundleFile>) -> Result<Arc<BundleFile>> {
        let _publish = self.publish.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            candidate.close();
            return Err(Error::Closed);
        }
        if let Some(existing) = self.bundles_by_path.get(path) {
            tracing::warn!(
                "'{}' was opened concurrently, discarding duplicate",
                path.display()
            );
            candidate.close();
            return Ok(Arc::clone(existing));
        }

        let bundle = self
            .bundles_by_path
            .insert(path.to_owned(), Box::new(candidate));
        let name = bundle.name().to_ascii_lowercase();
        if self.bundles_by_name.get(&name).is_none() {
            self.bundles_by_name.insert(name, Box::new(Arc::clone(bundle)));
        }
        for asset in bundle.assets() {
            self.register_asset(asset);
        }
        self.push_store(bundle.store());

        Ok(Arc::clone(bundle))
    }

    fn publish_file(&self, path: &Path, candidate: Arc<Asset>) -> Result<Arc<Asset>> {
        let _publish = self.publish.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            candidate.store().close();
            return Err(Error::Closed);
        }
        if let Some(existing) = self.files_by_path.get(path) {
            tracing::warn!(
                "'{}' was opened concurrently, discarding duplicate",
                path.display()
            );
            candidate.store().close();
            return Ok(Arc::clone(existing));
        }

        let asset = self
            .files_by_path
            .insert(path.to_owned(), Box::new(candidate));
        self.register_asset(asset);
        self.push_store(asset.store());
        Ok(Arc::clone(asset))
    }

    fn register_asset(&self, asset: &Arc<Asset>) {
        let name = asset.name().to_ascii_lowercase();
        if self.assets.get(&name).is_none() {
            self.assets.insert(name, Box::new(Arc::clone(asset)));
        }
    }

    fn push_store(&self, store: &Arc<BlockStore>) {
        self.stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(store));
    }
}

impl<R: EnvResolver + 'static> Environment<R> {
    fn context(&self) -> Weak<dyn AssetContext> {
        self.this.clone()
    }

    /// Opens the bundle at `path`, relative to the resolver.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Arc<BundleFile>> {
        let path = path.as_ref();
        self.ensure_open()?;
        if let Some(bundle) = self.bundles_by_path.get(path) {
            return Ok(Arc::clone(bundle));
        }

        let data = self.resolver.read_path(path)?;
        self.load_bundle(path, data)
    }

    /// Registers a bundle from memory under `path`.
    pub fn load_bundle(
        &self,
        path: impl AsRef<Path>,
        data: impl Into<Data>,
    ) -> Result<Arc<BundleFile>> {
        let path = path.as_ref();
        self.ensure_open()?;
        let candidate = BundleFile::load(
            Arc::new(data.into()),
            Some(path.to_owned()),
            Some(self.context()),
        )?;
        self.publish_bundle(path, candidate)
    }

    /// Opens a serialized file that is not packed into a bundle.
    pub fn open_serialized(&self, path: impl AsRef<Path>) -> Result<Arc<Asset>> {
        let path = path.as_ref();
        self.ensure_open()?;
        if let Some(asset) = self.files_by_path.get(path) {
            return Ok(Arc::clone(asset));
        }

        let data = self.resolver.read_path(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let candidate = Asset::standalone_in(data, name, Some(self.context()));
        self.publish_file(path, candidate)
    }

    /// Opens every bundle the resolver knows about. Malformed files are skipped.
    pub fn open_all(&self) -> Result<Vec<Arc<BundleFile>>> {
        self.ensure_open()?;
        let files = self.resolver.bundle_files()?;
        let (bundles, skipped) = par_fold_reduce(
            files,
            |(bundles, skipped): &mut (Vec<_>, usize), path| {
                match self.open(&path) {
                    Ok(bundle) => bundles.push(bundle),
                    Err(e) if e.is_format() => {
                        tracing::warn!("Skipping '{}': {e}", path.display());
                        *skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
                Ok(())
            },
        )?;
        tracing::debug!("Opened {} bundles, skipped {skipped}", bundles.len());
        Ok(bundles)
    }

    /// Looks up a bundle by its case-insensitive name, opening it from the resolver if needed.
    pub fn bundle_by_name(&self, name: &str) -> Result<Arc<BundleFile>> {
        self.ensure_open()?;
        let name = name.to_ascii_lowercase();
        if let Some(bundle) = self.bundles_by_name.get(&name) {
            return Ok(Arc::clone(bundle));
        }

        let path = self
            .discover(&name)?
            .ok_or_else(|| Error::UnresolvedAsset(name.clone()))?;
        let bundle = self.open(&path)?;
        match bundle.name().eq_ignore_ascii_case(&name) {
            true => Ok(bundle),
            false => self
                .bundles_by_name
                .get(&name)
                .cloned()
                .ok_or(Error::UnresolvedAsset(name)),
        }
    }

    /// Searches the resolver's files for a bundle called `name` or `cab-<file name>`.
    pub fn discover(&self, name: &str) -> Result<Option<PathBuf>> {
        let name = name.to_ascii_lowercase();
        let path = self.resolver.all_files()?.into_iter().find(|path| {
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                return false;
            };
            let file_name = file_name.to_ascii_lowercase();
            file_name == name || format!("cab-{file_name}") == name
        });
        if let Some(path) = &path {
            tracing::warn!("'{name}' is not loaded, found '{}'", path.display());
        }
        Ok(path)
    }

    /// Resolves `archive:/<bundle>/<file>`.
    pub fn asset_by_uri(&self, uri: &str) -> Result<Arc<Asset>> {
        let Some(archive_path) = ArchivePath::try_parse(uri)? else {
            return self.asset_by_name(uri);
        };
        let bundle = self.bundle_by_name(archive_path.bundle)?;
        bundle
            .asset(archive_path.file)
            .cloned()
            .ok_or_else(|| Error::UnresolvedAsset(uri.to_owned()))
    }

    /// Resolves an asset by name: registered assets first, then bundles found by
    /// [`Environment::discover`], then serialized files in the resolver's directory.
    pub fn asset_by_name(&self, name: &str) -> Result<Arc<Asset>> {
        self.ensure_open()?;
        if let Some(asset) = self.loaded_asset(name) {
            return Ok(asset);
        }

        if let Some(path) = self.discover(name)? {
            match self.open(&path) {
                Ok(_) => {
                    if let Some(asset) = self.loaded_asset(name) {
                        return Ok(asset);
                    }
                }
                Err(Error::InvalidSignature(_)) => return self.open_serialized(&path),
                Err(e) => return Err(e),
            }
        }

        match self.open_serialized(name) {
            Ok(asset) => Ok(asset),
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                Err(Error::UnresolvedAsset(name.to_owned()))
            }
            Err(e) => Err(e),
        }
    }
}

impl<R: EnvResolver + 'static> AssetContext for Environment<R> {
    fn asset_by_uri(&self, uri: &str) -> Result<Arc<Asset>> {
        Environment::asset_by_uri(self, uri)
    }

    fn asset_by_name(&self, name: &str) -> Result<Arc<Asset>> {
        Environment::asset_by_name(self, name)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    struct NoFiles;

    impl EnvResolver for NoFiles {
        fn base_dir(&self) -> &Path {
            Path::new("")
        }

        fn read_path(&self, _: &Path) -> Result<Data, std::io::Error> {
            Err(ErrorKind::NotFound.into())
        }

        fn all_files(&self) -> Result<Vec<PathBuf>, std::io::Error> {
            Ok(Vec::new())
        }
    }

    /// Uncompressed format 6 bundle with a single file.
    fn raw_bundle(name: &str, payload: &[u8]) -> Vec<u8> {
        let mut metadata = vec![0; 16];
        metadata.extend(1i32.to_be_bytes());
        metadata.extend((payload.len() as u32).to_be_bytes());
        metadata.extend((payload.len() as u32).to_be_bytes());
        metadata.extend(0u16.to_be_bytes());
        metadata.extend(1i32.to_be_bytes());
        metadata.extend(0i64.to_be_bytes());
        metadata.extend((payload.len() as i64).to_be_bytes());
        metadata.extend(4i32.to_be_bytes());
        metadata.extend(name.as_bytes());
        metadata.push(0);

        let mut data = b"UnityFS\0".to_vec();
        data.extend(6u32.to_be_bytes());
        data.extend(b"5.x.x\0");
        data.extend(b"2020.3.48f1\0");
        let total = data.len() + 20 + metadata.len() + payload.len();
        data.extend((total as u64).to_be_bytes());
        data.extend((metadata.len() as u32).to_be_bytes());
        data.extend((metadata.len() as u32).to_be_bytes());
        data.extend(0u32.to_be_bytes());
        data.extend(metadata);
        data.extend(payload);
        data
    }

    #[test]
    fn losing_bundle_candidate_is_closed() {
        let env = Environment::new(NoFiles);
        let path = Path::new("race.bundle");
        let candidate = || {
            let data = Arc::new(Data::from(raw_bundle("CAB-race", b"payload")));
            BundleFile::load(data, Some(path.to_owned()), Some(env.context())).unwrap()
        };
        let first = candidate();
        let second = candidate();

        let published = env.publish_bundle(path, Arc::clone(&first)).unwrap();
        assert!(Arc::ptr_eq(&published, &first));
        let published = env.publish_bundle(path, Arc::clone(&second)).unwrap();
        assert!(Arc::ptr_eq(&published, &first));

        assert!(second.is_closed());
        assert!(!first.is_closed());
        assert!(Arc::ptr_eq(&env.bundle(path).unwrap(), &first));
        assert!(Arc::ptr_eq(
            &env.loaded_asset("cab-race").unwrap(),
            &first.assets()[0]
        ));
    }

    #[test]
    fn losing_file_candidate_is_closed() {
        let env = Environment::new(NoFiles);
        let path = Path::new("level0");
        let candidate = || {
            let data = Data::from(b"not parsed yet".to_vec());
            Asset::standalone_in(data, "level0".to_owned(), Some(env.context()))
        };
        let first = candidate();
        let second = candidate();

        let published = env.publish_file(path, Arc::clone(&first)).unwrap();
        assert!(Arc::ptr_eq(&published, &first));
        let published = env.publish_file(path, Arc::clone(&second)).unwrap();
        assert!(Arc::ptr_eq(&published, &first));

        assert!(second.is_closed());
        assert!(!first.is_closed());
        assert!(Arc::ptr_eq(&env.loaded_asset("level0").unwrap(), &first));
    }

    #[test]
    fn unknown_names_are_unresolved() {
        let env = Environment::new(NoFiles);
        assert!(matches!(
            env.asset_by_name("sharedassets0.assets"),
            Err(Error::UnresolvedAsset(_))
        ));
        assert!(matches!(
            env.asset_by_uri("archive:/CAB-missing/CAB-missing"),
            Err(Error::UnresolvedAsset(_))
        ));
        assert!(matches!(
            env.asset_by_uri("archive:/CAB-missing"),
            Err(Error::InvalidArchivePath(_))
        ));
    }

    #[test]
    fn closed_environment_rejects_lookups() {
        let env = Environment::new(NoFiles);
        env.close();
        assert!(env.is_closed());
        assert!(matches!(env.open("a.bundle"), Err(Error::Closed)));
        assert!(matches!(env.asset_by_name("a"), Err(Error::Closed)));
    }
}
