use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use url::Url;

use super::ArtifactFetchError;

/// Artifact roots that only the registry itself can read from.
const REGISTRY_SCHEMES: &[&str] = &[
    "s3",
    "gs",
    "wasbs",
    "abfss",
    "hdfs",
    "dbfs",
    "runs",
    "mlflow-artifacts",
];

/// Where a single artifact is fetched from, given the run's artifact root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    /// Delegated to [`ModelRegistry::download_artifact`](crate::ModelRegistry::download_artifact).
    Registry { uri: String },
    /// Fetched directly over HTTP(S).
    Http(String),
    /// Copied from a path on the local filesystem.
    Local(PathBuf),
}

impl ArtifactLocation {
    pub fn resolve(base_uri: &str, rel_path: &str) -> Result<Self, ArtifactFetchError> {
        let base = base_uri.trim_end_matches('/');
        let rel_path = rel_path.trim_start_matches('/');

        let Some(scheme) = uri_scheme(base) else {
            return Ok(Self::Local(PathBuf::from(base).join(rel_path)));
        };

        match scheme.as_str() {
            "http" | "https" => Ok(Self::Http(format!("{base}/{rel_path}"))),
            "file" => {
                let path = Url::parse(base)
                    .ok()
                    .and_then(|url| url.to_file_path().ok())
                    .ok_or_else(|| ArtifactFetchError::UnsupportedScheme(base_uri.to_string()))?;
                Ok(Self::Local(path.join(rel_path)))
            }
            s if REGISTRY_SCHEMES.contains(&s) => Ok(Self::Registry {
                uri: format!("{base}/{rel_path}"),
            }),
            _ => Err(ArtifactFetchError::UnsupportedScheme(base_uri.to_string())),
        }
    }
}

impl Display for ArtifactLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactLocation::Registry { uri } => write!(f, "{uri}"),
            ArtifactLocation::Http(url) => write!(f, "{url}"),
            ArtifactLocation::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Lowercased URI scheme, if `uri` has one. Single letters are treated as
/// Windows drive prefixes rather than schemes.
fn uri_scheme(uri: &str) -> Option<String> {
    let (scheme, _) = uri.split_once(':')?;
    let valid = scheme.len() > 1
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then(|| scheme.to_ascii_lowercase())
}
