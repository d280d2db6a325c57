use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::bundle::ModelBundle;
use crate::error::{LoadError, NotReadyError, StartupError};

/// What request handlers may observe about the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReadinessState {
    Uninitialized,
    Failed,
    Ready,
}

enum Readiness {
    Uninitialized,
    Failed(String),
    Ready(Arc<ModelBundle>),
}

impl Readiness {
    fn state(&self) -> ReadinessState {
        match self {
            Readiness::Uninitialized => ReadinessState::Uninitialized,
            Readiness::Failed(_) => ReadinessState::Failed,
            Readiness::Ready(_) => ReadinessState::Ready,
        }
    }
}

/// Owns the model bundle for the lifetime of the process.
///
/// Startup runs once. Request handlers only ever see the bundle through
/// [`Lifecycle::bundle`], which fails unless the model is ready.
pub struct Lifecycle {
    readiness: RwLock<Readiness>,
    started: AtomicBool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            readiness: RwLock::new(Readiness::Uninitialized),
            started: AtomicBool::new(false),
        }
    }

    /// A lifecycle that is already serving `bundle`.
    pub fn with_bundle(bundle: ModelBundle) -> Self {
        Self {
            readiness: RwLock::new(Readiness::Ready(Arc::new(bundle))),
            started: AtomicBool::new(true),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Readiness> {
        self.readiness.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Readiness> {
        self.readiness.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Provision the artifacts, then load the bundle.
    ///
    /// A failure at either step leaves the lifecycle in `Failed` for good;
    /// `load` is not attempted when provisioning fails. Later calls are
    /// ignored.
    pub fn startup<P, E, L>(&self, provision: P, load: L) -> ReadinessState
    where
        P: FnOnce() -> Result<(), E>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
        L: FnOnce() -> Result<ModelBundle, LoadError>,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            log::warn!("Startup already ran, ignoring.");
            return self.state();
        }

        log::info!("Provisioning model artifacts...");
        let outcome = provision()
            .map_err(|e| StartupError::Provisioning(e.into()))
            .and_then(|()| {
                log::info!("Loading model bundle...");
                load().map_err(StartupError::from)
            });

        let mut readiness = self.write();
        *readiness = match outcome {
            Ok(bundle) => {
                log::info!("Model ready: {bundle:?}");
                Readiness::Ready(Arc::new(bundle))
            }
            Err(e) => {
                log::error!("Model startup failed: {e}");
                Readiness::Failed(e.to_string())
            }
        };
        readiness.state()
    }

    pub fn state(&self) -> ReadinessState {
        self.read().state()
    }

    /// Why startup failed, if it did.
    pub fn failure(&self) -> Option<String> {
        match &*self.read() {
            Readiness::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    pub fn bundle(&self) -> Result<Arc<ModelBundle>, NotReadyError> {
        match &*self.read() {
            Readiness::Ready(bundle) => Ok(bundle.clone()),
            other => Err(NotReadyError {
                state: other.state(),
            }),
        }
    }

    /// Drop the bundle and return to `Uninitialized`.
    ///
    /// The classifier is released right away unless a request still holds the
    /// bundle, in which case it goes when that request finishes.
    pub fn shutdown(&self) {
        let previous = std::mem::replace(&mut *self.write(), Readiness::Uninitialized);
        let Readiness::Ready(bundle) = previous else {
            return;
        };
        match Arc::try_unwrap(bundle) {
            Ok(bundle) => {
                log::info!("Releasing model resources...");
                bundle.release();
            }
            Err(_) => log::info!("Model still in use, it will be released by its last user."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::predict_one;
    use crate::testing::{StubClassifier, stub_bundle};
    use std::cell::Cell;
    use std::sync::mpsc;

    #[test]
    fn not_ready_before_startup() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), ReadinessState::Uninitialized);
        let err = lifecycle.bundle().unwrap_err();
        assert_eq!(err.state, ReadinessState::Uninitialized);
        assert!(err.to_string().contains("pas encore chargé"));
    }

    #[test]
    fn failed_provisioning_skips_loading() {
        let lifecycle = Lifecycle::new();
        let loaded = Cell::new(false);

        let state = lifecycle.startup(
            || Err("registry unreachable"),
            || {
                loaded.set(true);
                Ok(stub_bundle(StubClassifier::constant(0.9)))
            },
        );
        assert_eq!(state, ReadinessState::Failed);
        assert!(!loaded.get());
        assert!(lifecycle.failure().unwrap().contains("registry unreachable"));
        assert_eq!(lifecycle.bundle().unwrap_err().state, ReadinessState::Failed);
    }

    #[test]
    fn failed_load_is_terminal() {
        let lifecycle = Lifecycle::new();
        let state = lifecycle.startup(
            || Ok::<_, std::io::Error>(()),
            || {
                Err(LoadError::ArtifactMissing {
                    name: "tokenizer".into(),
                    path: "model/tokenizer.json".into(),
                })
            },
        );
        assert_eq!(state, ReadinessState::Failed);

        // A second attempt is ignored.
        let state = lifecycle.startup(
            || Ok::<_, std::io::Error>(()),
            || Ok(stub_bundle(StubClassifier::constant(0.9))),
        );
        assert_eq!(state, ReadinessState::Failed);
    }

    #[test]
    fn state_stays_readable_while_provisioning_blocks() {
        let lifecycle = Lifecycle::new();
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        std::thread::scope(|scope| {
            let lifecycle = &lifecycle;
            let loading = scope.spawn(move || {
                lifecycle.startup(
                    move || {
                        entered_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        Ok::<_, std::io::Error>(())
                    },
                    || Ok(stub_bundle(StubClassifier::constant(0.9))),
                )
            });

            entered_rx.recv().unwrap();
            assert_eq!(lifecycle.state(), ReadinessState::Uninitialized);
            assert!(lifecycle.failure().is_none());
            let err = lifecycle.bundle().unwrap_err();
            assert_eq!(err.state, ReadinessState::Uninitialized);

            release_tx.send(()).unwrap();
            assert_eq!(loading.join().unwrap(), ReadinessState::Ready);
        });
        assert!(lifecycle.bundle().is_ok());
    }

    #[test]
    fn ready_then_released_at_shutdown() {
        let classifier = StubClassifier::constant(0.9);
        let released = classifier.released.clone();
        let lifecycle = Lifecycle::new();

        let state = lifecycle.startup(
            || Ok::<_, std::io::Error>(()),
            || Ok(stub_bundle(classifier)),
        );
        assert_eq!(state, ReadinessState::Ready);
        assert!(lifecycle.failure().is_none());
        {
            let bundle = lifecycle.bundle().unwrap();
            let result = predict_one("great flight", &bundle).unwrap();
            assert_eq!(result.raw_score, 0.9);
        }

        lifecycle.shutdown();
        assert_eq!(lifecycle.state(), ReadinessState::Uninitialized);
        assert!(released.load(Ordering::SeqCst));
        assert!(lifecycle.bundle().is_err());
    }

    #[test]
    fn shutdown_leaves_in_flight_requests_working() {
        let classifier = StubClassifier::constant(0.3);
        let released = classifier.released.clone();
        let lifecycle = Lifecycle::with_bundle(stub_bundle(classifier));

        let in_flight = lifecycle.bundle().unwrap();
        lifecycle.shutdown();

        assert_eq!(lifecycle.state(), ReadinessState::Uninitialized);
        assert!(predict_one("late request", &in_flight).is_ok());
        assert!(!released.load(Ordering::SeqCst));
    }
}
