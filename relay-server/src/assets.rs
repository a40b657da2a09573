//! Static asset resolution with path containment.
//!
//! Two independent checks guard every request: a lexical veto on the decoded
//! path (parent segments, backslashes, NUL) and a containment check of the
//! canonical filesystem path against the canonical root. Both must pass.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::{AssetError, ForbiddenReason, Result};

/// Served extensions and their content types.
const ALLOWED_EXTENSIONS: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("js", "text/javascript"),
    ("css", "text/css"),
    ("json", "application/json"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
];

/// Content type for an allowed extension (case-insensitive).
pub fn content_type_for(extension: &str) -> Option<&'static str> {
    let extension = extension.to_ascii_lowercase();
    ALLOWED_EXTENSIONS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, content_type)| *content_type)
}

/// A request path mapped onto a file under the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub path: PathBuf,
    pub content_type: &'static str,
}

/// File contents ready to be served.
#[derive(Debug, Clone)]
pub struct Asset {
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

/// Maps URL paths to files under a fixed root.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    root: PathBuf,
    default_document: String,
}

impl AssetResolver {
    pub fn new(root: impl Into<PathBuf>, default_document: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            default_document: default_document.into(),
        }
    }

    /// Resolve a raw request path (query string allowed) to a file.
    ///
    /// Does not read the file. A file that does not exist still resolves;
    /// [`AssetResolver::load`] reports it as `NotFound`.
    pub async fn resolve(&self, raw_path: &str) -> Result<ResolvedAsset> {
        let path = raw_path.split(['?', '#']).next().unwrap_or_default();
        let decoded = urlencoding::decode(path)
            .map_err(|_| AssetError::Forbidden(ForbiddenReason::InvalidCharacters))?;

        if decoded.contains('\\')
            || decoded.contains('\0')
            || decoded.split('/').any(|segment| segment == "..")
        {
            return Err(AssetError::Forbidden(ForbiddenReason::InvalidCharacters));
        }

        let segments: Vec<&str> = decoded
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect();

        let (relative, content_type) = match segments.last() {
            None => (PathBuf::from(&self.default_document), "text/html"),
            Some(file_name) => {
                let content_type = Path::new(file_name)
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .and_then(content_type_for)
                    .ok_or(AssetError::Forbidden(ForbiddenReason::DisallowedType))?;
                (segments.iter().collect::<PathBuf>(), content_type)
            }
        };

        let path = self.contain(&relative).await?;
        Ok(ResolvedAsset { path, content_type })
    }

    /// Resolve and read an asset. Every call hits the filesystem.
    pub async fn load(&self, raw_path: &str) -> Result<Asset> {
        let resolved = self.resolve(raw_path).await?;
        let body = tokio::fs::read(&resolved.path).await?;
        Ok(Asset {
            content_type: resolved.content_type,
            body,
        })
    }

    /// Join `relative` to the root and require the absolute result to stay
    /// inside the absolute root.
    async fn contain(&self, relative: &Path) -> Result<PathBuf> {
        let root = tokio::fs::canonicalize(&self.root).await?;
        let candidate = root.join(relative);

        let absolute = match tokio::fs::canonicalize(&candidate).await {
            Ok(path) => path,
            Err(e) if e.kind() == io::ErrorKind::NotFound => candidate,
            Err(e) => return Err(e.into()),
        };

        if !absolute.starts_with(&root) {
            tracing::warn!(
                "Refusing {} outside asset root {}",
                absolute.display(),
                root.display()
            );
            return Err(AssetError::Forbidden(ForbiddenReason::Traversal));
        }

        Ok(absolute)
    }
}
