mod client;
mod error;
mod schemas;

use std::io::Write;

pub use client::MlflowClient;
pub use error::{ApiErrorBody, ApiErrorCode, RegistryError};
pub use schemas::RunInfoSchema;

/// The read side of a model registry: where a run's artifacts live, and how to
/// fetch them.
pub trait ModelRegistry {
    /// Resolve a run identifier to the base URI of its artifact store.
    fn artifact_uri(&self, run_id: &str) -> Result<String, RegistryError>;

    /// Download an artifact of `run_id` through the registry's own download
    /// primitive. Used for object-storage artifact roots the service cannot
    /// reach directly.
    fn download_artifact(
        &self,
        run_id: &str,
        rel_path: &str,
        dst: &mut dyn Write,
    ) -> Result<u64, RegistryError>;

    /// Fetch an artifact exposed over plain HTTP(S).
    fn download_url(&self, url: &str, dst: &mut dyn Write) -> Result<u64, RegistryError>;
}

impl<R: ModelRegistry + ?Sized> ModelRegistry for &R {
    fn artifact_uri(&self, run_id: &str) -> Result<String, RegistryError> {
        (**self).artifact_uri(run_id)
    }

    fn download_artifact(
        &self,
        run_id: &str,
        rel_path: &str,
        dst: &mut dyn Write,
    ) -> Result<u64, RegistryError> {
        (**self).download_artifact(run_id, rel_path, dst)
    }

    fn download_url(&self, url: &str, dst: &mut dyn Write) -> Result<u64, RegistryError> {
        (**self).download_url(url, dst)
    }
}
