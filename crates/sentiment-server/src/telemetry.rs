//! Application Insights sink.
//!
//! Custom events are posted as `EventData` envelopes, log records as
//! `MessageData` traces. Telemetry is best effort: callers log failures and
//! carry on, and every request is bounded by the client timeout.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::cli::TelemetryArgs;

pub const DEFAULT_TRACK_ENDPOINT: &str = "https://dc.services.visualstudio.com/v2/track";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const ROLE_NAME: &str = "sentiment-server";

pub type Properties = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to build the telemetry client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("Failed to reach the telemetry endpoint: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Telemetry endpoint rejected the event ({status}): {body}")]
    Rejected { status: StatusCode, body: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub name: String,
    pub time: String,
    pub i_key: String,
    pub tags: BTreeMap<&'static str, String>,
    pub data: EnvelopeData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeData {
    pub base_type: &'static str,
    pub base_data: BaseData,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BaseData {
    Event(EventData),
    Message(MessageData),
}

#[derive(Debug, Serialize)]
pub struct EventData {
    pub ver: u8,
    pub name: String,
    pub properties: Properties,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    pub ver: u8,
    pub message: String,
    pub severity_level: u8,
    pub properties: Properties,
}

/// Application Insights severity: Verbose, Information, Warning, Error.
fn severity_level(level: log::Level) -> u8 {
    match level {
        log::Level::Error => 3,
        log::Level::Warn => 2,
        log::Level::Info => 1,
        log::Level::Debug | log::Level::Trace => 0,
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryClient {
    http: reqwest::Client,
    endpoint: Url,
    instrumentation_key: String,
}

impl TelemetryClient {
    pub fn new(
        instrumentation_key: impl Into<String>,
        endpoint: Url,
    ) -> Result<Self, TelemetryError> {
        Self::with_timeout(instrumentation_key, endpoint, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        instrumentation_key: impl Into<String>,
        endpoint: Url,
        timeout: Duration,
    ) -> Result<Self, TelemetryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TelemetryError::Client)?;
        Ok(Self {
            http,
            endpoint,
            instrumentation_key: instrumentation_key.into(),
        })
    }

    /// `None` when no instrumentation key is configured.
    pub fn from_args(args: &TelemetryArgs) -> Result<Option<Self>, TelemetryError> {
        match args.instrumentation_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => {
                let timeout = Duration::from_secs(args.timeout_secs);
                Self::with_timeout(key, args.endpoint.clone(), timeout).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn wrap(&self, kind: &str, base_type: &'static str, base_data: BaseData) -> Envelope {
        Envelope {
            name: format!(
                "Microsoft.ApplicationInsights.{}.{kind}",
                self.instrumentation_key.replace('-', "")
            ),
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            i_key: self.instrumentation_key.clone(),
            tags: BTreeMap::from([("ai.cloud.role", ROLE_NAME.to_string())]),
            data: EnvelopeData {
                base_type,
                base_data,
            },
        }
    }

    pub fn envelope(&self, name: &str, properties: Properties) -> Envelope {
        let event = EventData {
            ver: 2,
            name: name.to_string(),
            properties,
        };
        self.wrap("Event", "EventData", BaseData::Event(event))
    }

    pub fn trace_envelope(&self, record: &Record<'_>) -> Envelope {
        let mut properties =
            Properties::from([("target".to_string(), record.target().to_string())]);
        if let (Some(file), Some(line)) = (record.file(), record.line()) {
            properties.insert("file".to_string(), file.to_string());
            properties.insert("line".to_string(), line.to_string());
        }
        let message = MessageData {
            ver: 2,
            message: record.args().to_string(),
            severity_level: severity_level(record.level()),
            properties,
        };
        self.wrap("Message", "MessageData", BaseData::Message(message))
    }

    /// Send one event and wait for the endpoint to acknowledge it.
    pub async fn track_event(
        &self,
        name: &str,
        properties: Properties,
    ) -> Result<(), TelemetryError> {
        self.send(&[self.envelope(name, properties)]).await?;
        log::debug!("Telemetry event {name} accepted.");
        Ok(())
    }

    pub async fn send(&self, envelopes: &[Envelope]) -> Result<(), TelemetryError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(envelopes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelemetryError::Rejected { status, body });
        }
        Ok(())
    }
}

/// Logger writing to the console through `env_logger` and forwarding the
/// service's own records to Application Insights as traces.
///
/// Records of this module are never forwarded, so a failing endpoint cannot
/// feed its own delivery errors back into the queue.
pub struct TraceForwarder {
    console: env_logger::Logger,
    client: TelemetryClient,
    level: LevelFilter,
    traces: UnboundedSender<Envelope>,
}

impl TraceForwarder {
    pub fn new(
        console: env_logger::Logger,
        client: TelemetryClient,
        level: LevelFilter,
    ) -> (Self, UnboundedReceiver<Envelope>) {
        let (traces, pending) = mpsc::unbounded_channel();
        let forwarder = Self {
            console,
            client,
            level,
            traces,
        };
        (forwarder, pending)
    }

    /// Install as the global logger. Traces are delivered by a task spawned
    /// on the current runtime.
    pub fn install(
        console: env_logger::Logger,
        client: TelemetryClient,
        level: LevelFilter,
    ) -> Result<(), SetLoggerError> {
        let max_level = console.filter().max(level);
        let (forwarder, pending) = Self::new(console, client.clone(), level);
        log::set_boxed_logger(Box::new(forwarder))?;
        log::set_max_level(max_level);
        tokio::spawn(deliver(client, pending));
        Ok(())
    }

    fn forwards(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
            && metadata.target().starts_with("sentiment")
            && !metadata.target().starts_with(module_path!())
    }
}

impl Log for TraceForwarder {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.console.enabled(metadata) || self.forwards(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        self.console.log(record);
        if self.forwards(record.metadata()) {
            // Fails only once the delivery task is gone with its runtime.
            let _ = self.traces.send(self.client.trace_envelope(record));
        }
    }

    fn flush(&self) {
        self.console.flush();
    }
}

/// Post queued traces, batching whatever piled up during the previous send.
pub async fn deliver(client: TelemetryClient, mut pending: UnboundedReceiver<Envelope>) {
    while let Some(first) = pending.recv().await {
        let mut batch = vec![first];
        while let Ok(next) = pending.try_recv() {
            batch.push(next);
        }
        if let Err(e) = client.send(&batch).await {
            log::warn!(
                "Failed to forward {} log records to Application Insights: {e}",
                batch.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(endpoint: &str) -> TelemetryClient {
        TelemetryClient::new("1234-abcd", endpoint.parse().unwrap()).unwrap()
    }

    fn telemetry_args(key: Option<&str>) -> TelemetryArgs {
        TelemetryArgs {
            instrumentation_key: key.map(str::to_string),
            endpoint: DEFAULT_TRACK_ENDPOINT.parse().unwrap(),
            timeout_secs: 5,
            log_level: LevelFilter::Info,
        }
    }

    fn quiet_console() -> env_logger::Logger {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Info)
            .target(env_logger::Target::Pipe(Box::new(std::io::sink())))
            .build()
    }

    #[test]
    fn envelope_shape() {
        let properties = Properties::from([("tweet".to_string(), "great flight".to_string())]);
        let envelope = client(DEFAULT_TRACK_ENDPOINT).envelope("model_feedback", properties);
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["name"], "Microsoft.ApplicationInsights.1234abcd.Event");
        assert_eq!(json["iKey"], "1234-abcd");
        assert_eq!(json["tags"]["ai.cloud.role"], "sentiment-server");
        assert_eq!(json["data"]["baseType"], "EventData");
        assert_eq!(json["data"]["baseData"]["ver"], 2);
        assert_eq!(json["data"]["baseData"]["name"], "model_feedback");
        assert_eq!(json["data"]["baseData"]["properties"]["tweet"], "great flight");
        assert!(json["time"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn blank_key_disables_telemetry() {
        let args = telemetry_args(Some("  "));
        assert!(TelemetryClient::from_args(&args).unwrap().is_none());
        assert!(TelemetryClient::from_args(&telemetry_args(None)).unwrap().is_none());
        assert!(TelemetryClient::from_args(&telemetry_args(Some("k"))).unwrap().is_some());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}/v2/track"))
            .track_event("appinsights_connection_test", Properties::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TelemetryError::Transport(_)));
    }

    #[tokio::test]
    async fn stalled_endpoint_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let endpoint = format!("http://{addr}/v2/track").parse().unwrap();
        let client =
            TelemetryClient::with_timeout("1234-abcd", endpoint, Duration::from_millis(200))
                .unwrap();
        let err = client
            .track_event("model_feedback", Properties::new())
            .await
            .unwrap_err();
        match err {
            TelemetryError::Transport(e) => assert!(e.is_timeout()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn service_records_are_forwarded_as_traces() {
        let (forwarder, mut pending) = TraceForwarder::new(
            quiet_console(),
            client(DEFAULT_TRACK_ENDPOINT),
            LevelFilter::Info,
        );

        forwarder.log(
            &Record::builder()
                .level(log::Level::Warn)
                .target("sentiment_runtime::lifecycle")
                .file(Some("lifecycle.rs"))
                .line(Some(12))
                .args(format_args!("Startup already ran, ignoring."))
                .build(),
        );
        let envelope = pending.try_recv().unwrap();
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["name"], "Microsoft.ApplicationInsights.1234abcd.Message");
        assert_eq!(json["data"]["baseType"], "MessageData");
        let trace = &json["data"]["baseData"];
        assert_eq!(trace["message"], "Startup already ran, ignoring.");
        assert_eq!(trace["severityLevel"], 2);
        assert_eq!(trace["properties"]["target"], "sentiment_runtime::lifecycle");
        assert_eq!(trace["properties"]["line"], "12");
    }

    #[test]
    fn foreign_quiet_and_own_records_stay_local() {
        let (forwarder, mut pending) = TraceForwarder::new(
            quiet_console(),
            client(DEFAULT_TRACK_ENDPOINT),
            LevelFilter::Info,
        );

        for (level, target) in [
            (log::Level::Info, "hyper_util::client"),
            (log::Level::Debug, "sentiment_server::routes"),
            (log::Level::Warn, module_path!()),
            (log::Level::Warn, "sentiment_server::telemetry"),
        ] {
            forwarder.log(
                &Record::builder()
                    .level(level)
                    .target(target)
                    .args(format_args!("ignored"))
                    .build(),
            );
        }
        assert!(pending.try_recv().is_err());
    }
}
