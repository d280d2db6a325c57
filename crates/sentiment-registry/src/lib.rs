//! Model registry access for the sentiment server.
//!
//! [`MlflowClient`] talks to the tracking server; [`ArtifactStore`] uses any
//! [`ModelRegistry`] to make the artifacts of a training run available in a
//! local directory, fetching them only when they are not already there.

pub mod api;
pub mod artifacts;
pub mod credentials;

pub use api::{MlflowClient, ModelRegistry, RegistryError};
pub use artifacts::{
    ArtifactFetchError, ArtifactKind, ArtifactSpec, ArtifactStore, Provisioned,
    REQUIRED_ARTIFACTS, artifacts_present,
};
pub use credentials::TrackingCredentials;
