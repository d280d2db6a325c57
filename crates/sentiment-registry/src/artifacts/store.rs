use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::Path;

use derive_new::new;

use super::{
    ArtifactFetchError, ArtifactLocation, ArtifactSpec, MANIFEST_FILE, Manifest,
    REQUIRED_ARTIFACTS,
};
use crate::api::{ModelRegistry, RegistryError};

/// Outcome of a successful [`ArtifactStore::try_ensure_artifacts`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    AlreadyPresent,
    Downloaded,
}

/// Makes the artifacts of a training run available in a local directory.
///
/// Files are fetched into a scratch directory next to their destination and
/// only moved into place once the whole set has been downloaded, so a failed
/// fetch never leaves a partial artifact set behind.
#[derive(new)]
pub struct ArtifactStore<R> {
    registry: R,
    #[new(value = "REQUIRED_ARTIFACTS.to_vec()")]
    artifacts: Vec<ArtifactSpec>,
}

impl<R: ModelRegistry> ArtifactStore<R> {
    pub fn with_artifacts(registry: R, artifacts: Vec<ArtifactSpec>) -> Self {
        Self {
            registry,
            artifacts,
        }
    }

    pub fn artifacts(&self) -> &[ArtifactSpec] {
        &self.artifacts
    }

    /// Ensure every artifact of `run_id` exists in `local_dir`.
    ///
    /// Returns `true` when the directory holds the complete set on return,
    /// whether it was already there or has just been downloaded.
    pub fn ensure_artifacts(&self, run_id: &str, local_dir: &Path) -> bool {
        match self.try_ensure_artifacts(run_id, local_dir) {
            Ok(_) => true,
            Err(e) => {
                log::error!("Failed to provision artifacts of run {run_id}: {e}");
                false
            }
        }
    }

    pub fn try_ensure_artifacts(
        &self,
        run_id: &str,
        local_dir: &Path,
    ) -> Result<Provisioned, ArtifactFetchError> {
        if artifacts_present(local_dir, &self.artifacts) {
            log::info!(
                "All artifacts already present in {}, skipping download.",
                local_dir.display()
            );
            return Ok(Provisioned::AlreadyPresent);
        }

        log::info!(
            "Downloading artifacts of run {run_id} into {}",
            local_dir.display()
        );
        fs::create_dir_all(local_dir).map_err(io_error(local_dir))?;

        let base_uri =
            self.registry
                .artifact_uri(run_id)
                .map_err(|source| ArtifactFetchError::Resolve {
                    run_id: run_id.to_string(),
                    source,
                })?;

        let scratch = tempfile::Builder::new()
            .prefix(".download-")
            .tempdir_in(local_dir)
            .map_err(io_error(local_dir))?;

        let mut manifest = Manifest::new(run_id);
        for spec in &self.artifacts {
            let staged = scratch.path().join(spec.file_name());
            let size = self.fetch(run_id, &base_uri, spec, &staged)?;
            manifest
                .record(spec.file_name(), &staged)
                .map_err(io_error(&staged))?;
            log::info!("Artifact {} downloaded ({size} bytes).", spec.logical_name);
        }

        // The new manifest goes first: a file left over from an interrupted
        // swap then fails its digest check instead of passing as current.
        manifest
            .write(local_dir)
            .map_err(io_error(&local_dir.join(MANIFEST_FILE)))?;
        for spec in &self.artifacts {
            let dest = local_dir.join(spec.file_name());
            fs::rename(scratch.path().join(spec.file_name()), &dest).map_err(io_error(&dest))?;
        }

        log::info!("All artifacts of run {run_id} are in place.");
        Ok(Provisioned::Downloaded)
    }

    fn fetch(
        &self,
        run_id: &str,
        base_uri: &str,
        spec: &ArtifactSpec,
        staged: &Path,
    ) -> Result<u64, ArtifactFetchError> {
        let location = ArtifactLocation::resolve(base_uri, spec.remote_relative_path)?;
        log::debug!("Fetching {} from {location}", spec.logical_name);

        let mut file = File::create(staged).map_err(io_error(staged))?;
        let written = match &location {
            ArtifactLocation::Registry { .. } => {
                self.registry
                    .download_artifact(run_id, spec.remote_relative_path, &mut file)
            }
            ArtifactLocation::Http(url) => self.registry.download_url(url, &mut file),
            ArtifactLocation::Local(path) => copy_local(path, &mut file),
        }
        .map_err(|source| ArtifactFetchError::Fetch {
            name: spec.logical_name.to_string(),
            location: location.to_string(),
            source,
        })?;
        file.sync_all().map_err(io_error(staged))?;

        Ok(written)
    }
}

/// Whether `local_dir` holds every artifact in `artifacts`.
///
/// When a manifest is present, each file must also match its recorded digest.
pub fn artifacts_present(local_dir: &Path, artifacts: &[ArtifactSpec]) -> bool {
    let all_exist = artifacts
        .iter()
        .all(|spec| local_dir.join(spec.file_name()).is_file());
    if !all_exist {
        return false;
    }

    match Manifest::read(local_dir) {
        Ok(None) => true,
        Ok(Some(manifest)) => {
            let valid = manifest.matches(local_dir, artifacts.iter().map(|a| a.file_name()));
            if !valid {
                log::warn!(
                    "Artifacts in {} do not match their manifest.",
                    local_dir.display()
                );
            }
            valid
        }
        Err(e) => {
            log::warn!("Unreadable manifest in {}: {e}", local_dir.display());
            false
        }
    }
}

fn copy_local(path: &Path, dst: &mut dyn Write) -> Result<u64, RegistryError> {
    let mut src = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => RegistryError::NotFound,
        _ => RegistryError::Io(e),
    })?;
    Ok(io::copy(&mut src, dst)?)
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ArtifactFetchError + '_ {
    move |source| ArtifactFetchError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::path::PathBuf;

    struct StubRegistry {
        base_uri: Option<String>,
        resolve_calls: Cell<usize>,
        registry_downloads: RefCell<Vec<String>>,
    }

    impl StubRegistry {
        fn new(base_uri: Option<String>) -> Self {
            Self {
                base_uri,
                resolve_calls: Cell::new(0),
                registry_downloads: RefCell::new(Vec::new()),
            }
        }
    }

    impl ModelRegistry for StubRegistry {
        fn artifact_uri(&self, _run_id: &str) -> Result<String, RegistryError> {
            self.resolve_calls.set(self.resolve_calls.get() + 1);
            self.base_uri
                .clone()
                .ok_or_else(|| RegistryError::Unreachable("connection refused".into()))
        }

        fn download_artifact(
            &self,
            _run_id: &str,
            rel_path: &str,
            dst: &mut dyn Write,
        ) -> Result<u64, RegistryError> {
            self.registry_downloads
                .borrow_mut()
                .push(rel_path.to_string());
            let body = format!("registry:{rel_path}");
            dst.write_all(body.as_bytes())?;
            Ok(body.len() as u64)
        }

        fn download_url(&self, _url: &str, _dst: &mut dyn Write) -> Result<u64, RegistryError> {
            Err(RegistryError::NotFound)
        }
    }

    fn populate_remote(root: &Path, skip: Option<&str>) {
        let dir = root.join("local_artifacts");
        fs::create_dir_all(&dir).unwrap();
        for spec in &REQUIRED_ARTIFACTS {
            if Some(spec.file_name()) == skip {
                continue;
            }
            fs::write(dir.join(spec.file_name()), spec.logical_name).unwrap();
        }
    }

    fn file_uri(path: &Path) -> String {
        format!("file://{}", path.display())
    }

    fn leftover_scratch_dirs(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(".download-"))
            })
            .collect()
    }

    #[test]
    fn present_artifacts_are_not_downloaded_again() {
        let local = tempfile::tempdir().unwrap();
        for spec in &REQUIRED_ARTIFACTS {
            fs::write(local.path().join(spec.file_name()), b"cached").unwrap();
        }
        let registry = StubRegistry::new(Some("s3://bucket/artifacts".into()));
        let store = ArtifactStore::new(&registry);

        assert!(store.ensure_artifacts("run-1", local.path()));
        assert!(store.ensure_artifacts("run-1", local.path()));
        assert_eq!(registry.resolve_calls.get(), 0);
        assert!(registry.registry_downloads.borrow().is_empty());
    }

    #[test]
    fn local_artifact_root_is_copied() {
        let remote = tempfile::tempdir().unwrap();
        populate_remote(remote.path(), None);
        let local = tempfile::tempdir().unwrap();
        let model_dir = local.path().join("model");

        let registry = StubRegistry::new(Some(file_uri(remote.path())));
        let store = ArtifactStore::new(&registry);

        let outcome = store.try_ensure_artifacts("run-1", &model_dir).unwrap();
        assert_eq!(outcome, Provisioned::Downloaded);
        for spec in &REQUIRED_ARTIFACTS {
            let content = fs::read_to_string(model_dir.join(spec.file_name())).unwrap();
            assert_eq!(content, spec.logical_name);
        }
        assert!(model_dir.join(MANIFEST_FILE).is_file());
        assert!(leftover_scratch_dirs(&model_dir).is_empty());

        let outcome = store.try_ensure_artifacts("run-1", &model_dir).unwrap();
        assert_eq!(outcome, Provisioned::AlreadyPresent);
        assert_eq!(registry.resolve_calls.get(), 1);
    }

    #[test]
    fn object_storage_root_uses_registry_download() {
        let local = tempfile::tempdir().unwrap();
        let registry = StubRegistry::new(Some("s3://bucket/1/abc/artifacts".into()));
        let store = ArtifactStore::new(&registry);

        assert!(store.ensure_artifacts("abc", local.path()));

        let downloads = registry.registry_downloads.borrow();
        let expected: Vec<_> = REQUIRED_ARTIFACTS
            .iter()
            .map(|a| a.remote_relative_path.to_string())
            .collect();
        assert_eq!(*downloads, expected);
        let tokenizer = fs::read_to_string(local.path().join("tokenizer.json")).unwrap();
        assert_eq!(tokenizer, "registry:local_artifacts/tokenizer.json");
    }

    #[test]
    fn missing_remote_artifact_leaves_no_partial_set() {
        let remote = tempfile::tempdir().unwrap();
        populate_remote(remote.path(), Some("tokenizer.json"));
        let local = tempfile::tempdir().unwrap();

        let registry = StubRegistry::new(Some(file_uri(remote.path())));
        let store = ArtifactStore::new(&registry);

        let err = store.try_ensure_artifacts("run-1", local.path()).unwrap_err();
        match err {
            ArtifactFetchError::Fetch { name, source, .. } => {
                assert_eq!(name, "tokenizer");
                assert!(source.is_not_found());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        for spec in &REQUIRED_ARTIFACTS {
            assert!(!local.path().join(spec.file_name()).exists());
        }
        assert!(leftover_scratch_dirs(local.path()).is_empty());
        assert!(!store.ensure_artifacts("run-1", local.path()));
    }

    #[test]
    fn unreachable_registry_reports_failure() {
        let local = tempfile::tempdir().unwrap();
        let registry = StubRegistry::new(None);
        let store = ArtifactStore::new(&registry);

        assert!(!store.ensure_artifacts("run-1", local.path()));
        let err = store.try_ensure_artifacts("run-1", local.path()).unwrap_err();
        assert!(matches!(err, ArtifactFetchError::Resolve { .. }));
    }

    #[test]
    fn tampered_artifact_is_fetched_again() {
        let remote = tempfile::tempdir().unwrap();
        populate_remote(remote.path(), None);
        let local = tempfile::tempdir().unwrap();

        let registry = StubRegistry::new(Some(file_uri(remote.path())));
        let store = ArtifactStore::new(&registry);
        assert!(store.ensure_artifacts("run-1", local.path()));

        let weights = local.path().join("classifier.mpk");
        fs::write(&weights, b"truncated").unwrap();
        assert!(!artifacts_present(local.path(), &REQUIRED_ARTIFACTS));

        let outcome = store.try_ensure_artifacts("run-1", local.path()).unwrap();
        assert_eq!(outcome, Provisioned::Downloaded);
        assert_eq!(fs::read_to_string(&weights).unwrap(), "classifier");
        assert_eq!(registry.resolve_calls.get(), 2);
    }

    #[test]
    fn interrupted_swap_is_not_taken_for_a_complete_set() {
        let remote = tempfile::tempdir().unwrap();
        populate_remote(remote.path(), None);
        let local = tempfile::tempdir().unwrap();

        let registry = StubRegistry::new(Some(file_uri(remote.path())));
        let store = ArtifactStore::new(&registry);
        assert!(store.ensure_artifacts("run-1", local.path()));

        for spec in &REQUIRED_ARTIFACTS {
            let path = remote.path().join("local_artifacts").join(spec.file_name());
            fs::write(path, format!("v2:{}", spec.logical_name)).unwrap();
        }

        // A directory in the way makes the last rename fail.
        let weights = local.path().join("classifier.mpk");
        fs::remove_file(&weights).unwrap();
        fs::create_dir(&weights).unwrap();
        fs::write(weights.join("blocker"), b"x").unwrap();
        let err = store.try_ensure_artifacts("run-2", local.path()).unwrap_err();
        assert!(matches!(err, ArtifactFetchError::Io { .. }));

        // Leave the previous weights behind next to the already swapped files.
        fs::remove_dir_all(&weights).unwrap();
        fs::write(&weights, b"classifier").unwrap();
        let parameters = local.path().join("parameters.json");
        assert_eq!(fs::read_to_string(&parameters).unwrap(), "v2:parameters");
        assert!(!artifacts_present(local.path(), &REQUIRED_ARTIFACTS));

        let outcome = store.try_ensure_artifacts("run-2", local.path()).unwrap();
        assert_eq!(outcome, Provisioned::Downloaded);
        assert_eq!(fs::read_to_string(&weights).unwrap(), "v2:classifier");
        assert!(artifacts_present(local.path(), &REQUIRED_ARTIFACTS));
    }

    #[test]
    fn incomplete_local_set_triggers_download() {
        let local = tempfile::tempdir().unwrap();
        for spec in REQUIRED_ARTIFACTS.iter().take(3) {
            fs::write(local.path().join(spec.file_name()), b"cached").unwrap();
        }
        assert!(!artifacts_present(local.path(), &REQUIRED_ARTIFACTS));

        let registry = StubRegistry::new(Some("gs://bucket/artifacts".into()));
        let store = ArtifactStore::new(&registry);
        assert!(store.ensure_artifacts("run-1", local.path()));
        assert_eq!(registry.registry_downloads.borrow().len(), 4);
    }

    #[test]
    fn unsupported_artifact_root() {
        let local = tempfile::tempdir().unwrap();
        let registry = StubRegistry::new(Some("ftp://files/artifacts".into()));
        let store = ArtifactStore::new(&registry);

        let err = store.try_ensure_artifacts("run-1", local.path()).unwrap_err();
        assert!(matches!(err, ArtifactFetchError::UnsupportedScheme(_)));
        assert!(leftover_scratch_dirs(local.path()).is_empty());
    }
}
