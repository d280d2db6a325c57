use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{Args, Parser};
use log::LevelFilter;
use reqwest::Url;
use sentiment_registry::TrackingCredentials;

use crate::telemetry::DEFAULT_TRACK_ENDPOINT;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct ServerArgs {
    #[command(flatten)]
    pub registry: RegistryArgs,

    #[command(flatten)]
    pub telemetry: TelemetryArgs,

    /// Directory holding the model artifacts.
    #[arg(long, env = "MODEL_DIR", default_value = "model")]
    pub model_dir: PathBuf,

    /// WordNet noun index (or one lemma per line) used to filter lemma candidates.
    #[arg(long, env = "LEMMA_LEXICON")]
    pub lemma_lexicon: Option<PathBuf>,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Origins allowed to call the API from a browser.
    #[arg(
        long = "cors-origin",
        env = "CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000"
    )]
    pub cors_origins: Vec<String>,
}

impl ServerArgs {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[derive(Args, Debug, Clone)]
pub struct RegistryArgs {
    /// MLflow tracking server. Only contacted when artifacts are missing locally.
    #[arg(long, env = "MLFLOW_TRACKING_URI")]
    pub tracking_uri: Option<String>,

    /// Training run whose artifacts are served.
    #[arg(long, env = "RUN_ID")]
    pub run_id: Option<String>,

    #[arg(long, env = "MLFLOW_TRACKING_TOKEN", hide_env_values = true)]
    pub tracking_token: Option<TrackingCredentials>,
}

#[derive(Args, Debug, Clone)]
pub struct TelemetryArgs {
    /// Application Insights instrumentation key. Telemetry is disabled without it.
    #[arg(long = "appinsights-key", env = "APPINSIGHTS_INSTRUMENTATION_KEY")]
    pub instrumentation_key: Option<String>,

    #[arg(
        long = "appinsights-endpoint",
        env = "APPINSIGHTS_ENDPOINT",
        default_value = DEFAULT_TRACK_ENDPOINT
    )]
    pub endpoint: Url,

    /// Upper bound on each request to the ingestion endpoint.
    #[arg(
        long = "appinsights-timeout",
        env = "APPINSIGHTS_TIMEOUT_SECS",
        default_value_t = 5
    )]
    pub timeout_secs: u64,

    /// Most verbose log level forwarded as traces; `off` keeps logs local.
    #[arg(
        long = "appinsights-log-level",
        env = "APPINSIGHTS_LOG_LEVEL",
        default_value = "info"
    )]
    pub log_level: LevelFilter,
}
