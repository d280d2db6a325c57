use std::io::Write;

use reqwest::Url;
use reqwest::header::AUTHORIZATION;

use super::ModelRegistry;
use super::error::{ApiErrorBody, ApiErrorCode, RegistryError};
use super::schemas::{GetRunResponseSchema, RunInfoSchema};
use crate::credentials::TrackingCredentials;

trait ResponseExt {
    fn map_to_registry_err(self) -> Result<reqwest::blocking::Response, RegistryError>;
}

impl ResponseExt for reqwest::blocking::Response {
    fn map_to_registry_err(self) -> Result<reqwest::blocking::Response, RegistryError> {
        if self.status().is_success() {
            Ok(self)
        } else {
            match self.status() {
                reqwest::StatusCode::NOT_FOUND => Err(RegistryError::NotFound),
                reqwest::StatusCode::UNAUTHORIZED => Err(RegistryError::Unauthorized),
                reqwest::StatusCode::FORBIDDEN => Err(RegistryError::Forbidden),
                reqwest::StatusCode::INTERNAL_SERVER_ERROR => {
                    Err(RegistryError::InternalServerError)
                }
                status => Err(RegistryError::ApiError {
                    status,
                    body: self
                        .text()
                        .map_err(|e| RegistryError::UnknownError(e.to_string()))?
                        .parse::<serde_json::Value>()
                        .and_then(serde_json::from_value::<ApiErrorBody>)
                        .unwrap_or_else(|e| ApiErrorBody {
                            code: ApiErrorCode::Unknown,
                            message: e.to_string(),
                        }),
                }),
            }
        }
    }
}

/// A blocking client for an MLflow-compatible tracking server.
///
/// Only the read side of the REST API is covered: resolving a run to its
/// artifact root and streaming artifacts through the server's proxy.
#[derive(Debug, Clone)]
pub struct MlflowClient {
    http_client: reqwest::blocking::Client,
    base_url: Url,
    credentials: Option<TrackingCredentials>,
}

impl MlflowClient {
    /// Create a client for the tracking server at `tracking_uri`.
    pub fn new(tracking_uri: &str) -> Result<Self, RegistryError> {
        let mut base_url = Url::parse(tracking_uri).map_err(|e| RegistryError::InvalidUri {
            uri: tracking_uri.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(RegistryError::InvalidUri {
                uri: tracking_uri.to_string(),
                reason: format!("unsupported scheme '{}'", base_url.scheme()),
            });
        }
        // Url::join drops the last segment unless the path ends with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            http_client: reqwest::blocking::Client::new(),
            base_url,
            credentials: None,
        })
    }

    pub fn with_credentials(mut self, credentials: TrackingCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn get_json<R>(&self, path: &str, query: &[(&str, &str)]) -> Result<R, RegistryError>
    where
        R: for<'de> serde::Deserialize<'de>,
    {
        let response = self.req(reqwest::Method::GET, path, query)?;
        let json = response.json::<R>()?;
        Ok(json)
    }

    fn req(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::blocking::Response, RegistryError> {
        let url = self.join(path)?;
        let mut request_builder = self.http_client.request(method, url).query(query);

        if let Some(credentials) = self.credentials.as_ref() {
            request_builder =
                request_builder.header(AUTHORIZATION, format!("Bearer {}", credentials.bearer()));
        }

        let response = request_builder.send()?.map_to_registry_err()?;

        Ok(response)
    }

    /// Join the given path to the base URL.
    fn join(&self, path: &str) -> Result<Url, RegistryError> {
        self.base_url
            .join(path)
            .map_err(|e| RegistryError::InvalidUri {
                uri: format!("{}{}", self.base_url, path),
                reason: e.to_string(),
            })
    }

    /// Fetch the run metadata for the given run id.
    pub fn get_run(&self, run_id: &str) -> Result<RunInfoSchema, RegistryError> {
        self.get_json::<GetRunResponseSchema>("api/2.0/mlflow/runs/get", &[("run_id", run_id)])
            .map(|res| res.run.info)
    }

    /// Stream a run artifact through the tracking server's artifact proxy.
    pub fn download_run_artifact(
        &self,
        run_id: &str,
        rel_path: &str,
        dst: &mut dyn Write,
    ) -> Result<u64, RegistryError> {
        let mut response = self.req(
            reqwest::Method::GET,
            "get-artifact",
            &[("path", rel_path), ("run_uuid", run_id)],
        )?;
        Ok(response.copy_to(dst)?)
    }

    /// Generic method to stream the bytes behind an arbitrary URL.
    pub fn download_from_url(&self, url: &str, dst: &mut dyn Write) -> Result<u64, RegistryError> {
        let mut response = self
            .http_client
            .get(url)
            .send()?
            .map_to_registry_err()?;
        Ok(response.copy_to(dst)?)
    }
}

impl ModelRegistry for MlflowClient {
    fn artifact_uri(&self, run_id: &str) -> Result<String, RegistryError> {
        let info = self.get_run(run_id)?;
        log::debug!(
            "Run {} resolved to artifact root {} (status: {})",
            info.run_id,
            info.artifact_uri,
            info.status.as_deref().unwrap_or("unknown")
        );
        Ok(info.artifact_uri)
    }

    fn download_artifact(
        &self,
        run_id: &str,
        rel_path: &str,
        dst: &mut dyn Write,
    ) -> Result<u64, RegistryError> {
        self.download_run_artifact(run_id, rel_path, dst)
    }

    fn download_url(&self, url: &str, dst: &mut dyn Write) -> Result<u64, RegistryError> {
        self.download_from_url(url, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_trailing_slash() {
        let client = MlflowClient::new("http://mlflow.internal:5000/tracking").unwrap();
        assert_eq!(
            client.base_url().as_str(),
            "http://mlflow.internal:5000/tracking/"
        );
        let url = client.join("api/2.0/mlflow/runs/get").unwrap();
        assert_eq!(
            url.as_str(),
            "http://mlflow.internal:5000/tracking/api/2.0/mlflow/runs/get"
        );
    }

    #[test]
    fn rejects_non_http_tracking_uri() {
        let err = MlflowClient::new("file:///tmp/mlruns").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidUri { .. }));

        let err = MlflowClient::new("not a uri").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidUri { .. }));
    }

    #[test]
    fn credentials_are_not_printed() {
        let client = MlflowClient::new("https://mlflow.example.com")
            .unwrap()
            .with_credentials(TrackingCredentials::new("secret-token"));
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn unreachable_server_is_reported() {
        // Port 9 (discard) is not expected to accept HTTP connections locally.
        let client = MlflowClient::new("http://127.0.0.1:9").unwrap();
        let err = client.artifact_uri("some-run").unwrap_err();
        assert!(
            matches!(
                err,
                RegistryError::Unreachable(_) | RegistryError::UnknownError(_)
            ),
            "unexpected error: {err:?}"
        );
    }
}
