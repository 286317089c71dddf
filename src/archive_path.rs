use crate::error::{Error, Result};

// archive:/CAB-asdf/CAB-asdf
// archive:/CAB-asdf/CAB-asdf.resS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchivePath<'a> {
    pub bundle: &'a str,
    pub file: &'a str,
}

impl std::fmt::Display for ArchivePath<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "archive:/{}/{}", self.bundle, self.file)
    }
}

impl<'a> ArchivePath<'a> {
    pub fn new(bundle: &'a str, file: &'a str) -> Self {
        ArchivePath { bundle, file }
    }

    /// The path of a bundle's main file, which shares the bundle's name.
    pub fn same(path: &'a str) -> Self {
        ArchivePath {
            bundle: path,
            file: path,
        }
    }

    /// Attempts to parse a path as `archive:/bundle/file`, with a case-insensitive scheme.
    /// Returns `None` if it doesn't match the format.
    pub fn try_parse(path: &'a str) -> Result<Option<ArchivePath<'a>>> {
        let Some((scheme, inner)) = path.split_once(':') else {
            return Ok(None);
        };
        if !scheme.eq_ignore_ascii_case("archive") {
            return Ok(None);
        }

        let mut parts = inner.trim_start_matches('/').splitn(2, '/');
        match (parts.next(), parts.next()) {
            (Some(bundle), Some(file)) if !bundle.is_empty() && !file.is_empty() => {
                Ok(Some(ArchivePath::new(bundle, file)))
            }
            _ => Err(Error::InvalidArchivePath(path.to_owned())),
        }
    }
}
