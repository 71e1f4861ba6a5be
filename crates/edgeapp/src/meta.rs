//! Client for the edge hub's metadata service.
//!
//! The only query is the list of child devices (endpoints) attached to the
//! edge device. The service answers with a JSON object whose values are
//! themselves JSON-encoded device records:
//!
//! ```json
//! {"/iotd-1": "{\"deviceId\":\"iotd-1\",\"deviceName\":\"sensor\",\"thingId\":\"iott-sub\",\"token\":\"…\"}"}
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::EdgeError;

/// Port the metadata service listens on.
pub const META_PORT: u16 = 9611;

const CHILD_DEVICE_PATH: &str = "/internal/data/childDevice";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A child device known to the edge hub.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointInfo {
    pub device_id: String,
    pub device_name: String,
    #[serde(alias = "modelId")]
    pub thing_id: String,
    /// Device credential.
    pub token: String,
}

/// HTTP client for the metadata service.
#[derive(Debug, Clone)]
pub struct MetaClient {
    http: reqwest::Client,
    url: String,
}

impl MetaClient {
    /// Targets the metadata service on `hub_addr`.
    pub fn new(hub_addr: &str) -> Result<Self, EdgeError> {
        Self::with_base_url(&format!("http://{hub_addr}:{META_PORT}"))
    }

    /// Targets a metadata service at `base_url` (scheme, host and port).
    pub fn with_base_url(base_url: &str) -> Result<Self, EdgeError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            url: format!(
                "{}{CHILD_DEVICE_PATH}",
                base_url.trim_end_matches('/')
            ),
        })
    }

    /// The child-device endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetches the child devices of this edge device.
    ///
    /// # Errors
    /// [`EdgeError::Meta`] if the request fails, times out, returns a
    /// non-success status, or the body is not a JSON object. Individual
    /// malformed records are skipped.
    pub async fn list_child_devices(&self) -> Result<Vec<EndpointInfo>, EdgeError> {
        let records: Map<String, Value> = self
            .http
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let devices = parse_child_devices(records);
        tracing::debug!(count = devices.len(), "child devices listed");
        Ok(devices)
    }
}

/// Extracts device records from the metadata response object.
///
/// Values that are not strings, or strings that are not a device record,
/// are skipped.
pub fn parse_child_devices(records: Map<String, Value>) -> Vec<EndpointInfo> {
    records
        .into_iter()
        .filter_map(|(key, value)| {
            let Value::String(record) = value else {
                tracing::debug!(%key, "skipping non-string device record");
                return None;
            };
            match serde_json::from_str(&record) {
                Ok(info) => Some(info),
                Err(e) => {
                    tracing::debug!(%key, error = %e, "skipping device record");
                    None
                }
            }
        })
        .collect()
}
