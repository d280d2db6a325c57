use std::path::{Path, PathBuf};

use sentiment_registry::{
    ArtifactFetchError, ArtifactStore, MlflowClient, Provisioned, REQUIRED_ARTIFACTS, RegistryError,
    artifacts_present,
};
use sentiment_runtime::{
    BundleLoader, InferenceBackend, Lifecycle, LoadError, ModelBundle, MorphyLemmatizer,
    Preprocessor, ReadinessState,
};
use thiserror::Error;

use crate::cli::{RegistryArgs, ServerArgs};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Artifacts are missing from {} and no tracking URI is configured (MLFLOW_TRACKING_URI)", .0.display())]
    MissingTrackingUri(PathBuf),
    #[error("Artifacts are missing from {} and no run is configured (RUN_ID)", .0.display())]
    MissingRunId(PathBuf),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Fetch(#[from] ArtifactFetchError),
}

/// Make sure `model_dir` holds the artifacts of the configured run.
///
/// The registry is only contacted when something is missing.
pub fn provision(registry: &RegistryArgs, model_dir: &Path) -> Result<Provisioned, ProvisionError> {
    if artifacts_present(model_dir, &REQUIRED_ARTIFACTS) {
        log::info!(
            "All artifacts already present in {}, no download needed.",
            model_dir.display()
        );
        return Ok(Provisioned::AlreadyPresent);
    }

    let tracking_uri = registry
        .tracking_uri
        .as_deref()
        .ok_or_else(|| ProvisionError::MissingTrackingUri(model_dir.to_path_buf()))?;
    let run_id = registry
        .run_id
        .as_deref()
        .ok_or_else(|| ProvisionError::MissingRunId(model_dir.to_path_buf()))?;

    log::info!("Using MLflow tracking server at {tracking_uri}");
    let mut client = MlflowClient::new(tracking_uri)?;
    if let Some(credentials) = &registry.tracking_token {
        client = client.with_credentials(credentials.clone());
    }

    let provisioned = ArtifactStore::new(client).try_ensure_artifacts(run_id, model_dir)?;
    Ok(provisioned)
}

pub fn load(model_dir: &Path, lemma_lexicon: Option<&Path>) -> Result<ModelBundle, LoadError> {
    let preprocessor = match lemma_lexicon {
        Some(path) => {
            let lemmatizer = MorphyLemmatizer::from_lexicon_file(path).map_err(|e| {
                LoadError::Deserialization {
                    artifact: path.display().to_string(),
                    reason: e.to_string(),
                }
            })?;
            log::info!("Lemmatizing against the lexicon at {}", path.display());
            Preprocessor::english_with(lemmatizer)
        }
        None => {
            log::warn!(
                "No lemma lexicon configured (LEMMA_LEXICON), lemmatization is rule based and \
                 may differ from WordNet for uncommon plurals."
            );
            Preprocessor::english()
        }
    };

    BundleLoader::<InferenceBackend>::new(Default::default())
        .with_preprocessor(preprocessor)
        .load(model_dir, &REQUIRED_ARTIFACTS)
}

/// Provision then load, leaving `lifecycle` either ready or failed.
pub fn start(lifecycle: &Lifecycle, args: &ServerArgs) -> ReadinessState {
    let state = lifecycle.startup(
        || provision(&args.registry, &args.model_dir).map(|_| ()),
        || load(&args.model_dir, args.lemma_lexicon.as_deref()),
    );
    match state {
        ReadinessState::Ready => log::info!("Model loaded and ready for predictions."),
        _ => log::error!("The model could not be loaded, predictions are unavailable."),
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(model_dir: &Path, flags: &[&str]) -> ServerArgs {
        let mut argv = vec!["sentiment-server", "--model-dir", model_dir.to_str().unwrap()];
        argv.extend_from_slice(flags);
        ServerArgs::try_parse_from(argv).unwrap()
    }

    fn registry(tracking_uri: Option<&str>, run_id: Option<&str>) -> RegistryArgs {
        RegistryArgs {
            tracking_uri: tracking_uri.map(str::to_string),
            run_id: run_id.map(str::to_string),
            tracking_token: None,
        }
    }

    #[test]
    fn present_artifacts_need_no_registry() {
        let dir = tempfile::tempdir().unwrap();
        for spec in &REQUIRED_ARTIFACTS {
            std::fs::write(dir.path().join(spec.file_name()), b"x").unwrap();
        }

        let provisioned = provision(&registry(None, None), dir.path()).unwrap();
        assert_eq!(provisioned, Provisioned::AlreadyPresent);
    }

    #[test]
    fn missing_artifacts_need_configuration() {
        let dir = tempfile::tempdir().unwrap();

        let err = provision(&registry(None, Some("run")), dir.path()).unwrap_err();
        assert!(matches!(err, ProvisionError::MissingTrackingUri(_)));

        let without_run = registry(Some("http://127.0.0.1:5000"), None);
        let err = provision(&without_run, dir.path()).unwrap_err();
        assert!(matches!(err, ProvisionError::MissingRunId(_)));
    }

    #[test]
    fn failed_provisioning_leaves_the_model_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = Lifecycle::new();

        let state = start(&lifecycle, &args(dir.path(), &[]));
        assert_eq!(state, ReadinessState::Failed);
        assert!(lifecycle.bundle().is_err());
    }

    #[test]
    fn unreadable_lexicon_fails_loading() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(dir.path(), Some(&dir.path().join("index.noun"))).unwrap_err();
        assert!(matches!(err, LoadError::Deserialization { .. }));
    }
}
