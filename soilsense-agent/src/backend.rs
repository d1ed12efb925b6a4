//! HTTP client for the hardware backend
//!
//! The backend (a real board bridge or a simulator) exposes:
//! - `POST /connect` - liveness probe, any 2xx means reachable
//! - `GET /sensor_value?port={channel}` - returns `{"value": <integer>}`
//! - `POST /actuator_value?port={channel}` - accepts `{"value": <bool>}`
//!
//! This client is a plain pass-through: every failure is returned to the
//! caller. The fail-soft behavior lives in the sensor and actuator wrappers.

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::error::Error as _;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::BackendConfig;
use crate::connection::Probe;

/// Errors returned by backend requests
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport-level failure: refused or dropped connection, DNS, timeout
    #[error("backend {target} unreachable: {reason}")]
    Unreachable { target: String, reason: String },
    #[error("backend returned status {0}")]
    Status(StatusCode),
    #[error("invalid backend response: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("backend request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("connection to {host}:{port} is not established")]
    NotEstablished { host: String, port: u16 },
    #[error("no channel given and no default channel bound")]
    MissingChannel,
}

impl BackendError {
    /// True when the request never reached the backend.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, BackendError::Unreachable { .. })
    }
}

#[derive(Debug, Deserialize)]
struct SensorValue {
    value: i64,
}

#[derive(Debug, Serialize)]
struct ActuatorValue {
    value: bool,
}

/// Backend transport client
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(host: &str, port: u16, request_timeout: Duration) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(BackendError::Client)?;

        Ok(Self {
            http,
            base_url: format!("http://{}:{}", host, port),
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        Self::new(&config.host, config.port, config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Liveness probe
    pub async fn connect(&self) -> Result<(), BackendError> {
        let url = format!("{}/connect", self.base_url);
        debug!("Probing backend at {}", url);

        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        check_status(response)?;
        Ok(())
    }

    /// Read the integer value of a sensor channel
    pub async fn sensor_value(&self, channel: u16) -> Result<i64, BackendError> {
        let url = format!("{}/sensor_value", self.base_url);

        let response = self
            .http
            .get(&url)
            .query(&[("port", channel)])
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let body: SensorValue = check_status(response)?
            .json()
            .await
            .map_err(|e| self.classify(e))?;

        debug!("Sensor channel {} = {}", channel, body.value);
        Ok(body.value)
    }

    /// Drive a boolean actuator channel
    pub async fn set_actuator_value(&self, channel: u16, value: bool) -> Result<(), BackendError> {
        let url = format!("{}/actuator_value", self.base_url);

        let response = self
            .http
            .post(&url)
            .query(&[("port", channel)])
            .json(&ActuatorValue { value })
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        check_status(response)?;
        debug!("Actuator channel {} set to {}", channel, value);
        Ok(())
    }

    fn classify(&self, err: reqwest::Error) -> BackendError {
        if is_transport_failure(&err) {
            BackendError::Unreachable {
                target: self.base_url.clone(),
                reason: err.to_string(),
            }
        } else if err.is_decode() {
            BackendError::Decode(err)
        } else {
            BackendError::Request(err)
        }
    }
}

impl Probe for BackendClient {
    async fn probe(&self) -> Result<(), BackendError> {
        self.connect().await
    }
}

/// True when the exchange broke at the connection level: refused, timed out,
/// or closed/reset by the peer before a complete response arrived.
fn is_transport_failure(err: &reqwest::Error) -> bool {
    if err.is_connect() || err.is_timeout() {
        return true;
    }
    if err.status().is_some() {
        return false;
    }
    // send or response head failed (e.g. hyper IncompleteMessage)
    if err.is_request() {
        return true;
    }

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<io::Error>() {
            if matches!(
                io.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(BackendError::Status(status))
    }
}
