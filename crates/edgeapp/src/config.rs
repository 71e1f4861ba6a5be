//! Edge application configuration.
//!
//! Loaded once at startup from one of two sources, chosen by
//! [`RuntimeKind`]:
//!
//! - **Container**: environment variables `EDGE_HUB_PROTO`, `EDGE_HUB_HOST`,
//!   `EDGE_HUB_PORT`, `EDGE_APP_ID`, `EDGE_DEVICE_ID`, `EDGE_THING_ID` and
//!   `EDGE_MSG_MODE`.
//! - **Standalone**: a JSON file with the keys `protocol`, `hubAddr`,
//!   `hubPort`, `appId`, `deviceId`, `thingId` and optionally `msgMode`.
//!
//! Both sources go through the same partial form, so defaults and
//! validation are identical.

use std::path::PathBuf;

use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use config::builder::DefaultState;
use edgeapp_protocol::{AddressingMode, Identity};
use serde::Deserialize;

use crate::EdgeError;

pub const DEFAULT_PROTOCOL: &str = "tcp";
pub const DEFAULT_HUB_PORT: u16 = 1883;

const ENV_PREFIX: &str = "EDGE";

/// Where the application's configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeKind {
    /// Packaged as a container; configuration is in the environment.
    Container,
    /// Run as a plain executable with a JSON configuration file.
    Standalone(PathBuf),
}

/// Validated configuration of one edge application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeConfig {
    pub protocol: String,
    pub hub_addr: String,
    pub hub_port: u16,
    pub app_id: String,
    pub device_id: String,
    /// Thing-model id of the edge device.
    pub thing_id: String,
    pub mode: AddressingMode,
}

/// Every key optional: defaults and validation are applied afterwards.
///
/// Aliases cover the environment spelling (`hub_host`), the file spelling
/// (`hubAddr`), and the lowercased form some sources produce.
#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    #[serde(alias = "hub_proto")]
    protocol: Option<String>,
    #[serde(alias = "hubAddr", alias = "hubaddr", alias = "hub_host")]
    hub_addr: Option<String>,
    #[serde(alias = "hubPort", alias = "hubport")]
    hub_port: Option<String>,
    #[serde(alias = "appId", alias = "appid")]
    app_id: Option<String>,
    #[serde(alias = "deviceId", alias = "deviceid")]
    device_id: Option<String>,
    #[serde(alias = "thingId", alias = "thingid")]
    thing_id: Option<String>,
    #[serde(alias = "msgMode", alias = "msgmode")]
    msg_mode: Option<String>,
}

impl EdgeConfig {
    /// Loads and validates the configuration for `runtime`.
    ///
    /// # Errors
    /// [`EdgeError::Config`] if the source can't be read, the addressing
    /// mode is unknown, or `hubAddr`, `appId` or `deviceId` is empty.
    pub fn load(runtime: &RuntimeKind) -> Result<Self, EdgeError> {
        let builder = Config::builder();
        let builder = match runtime {
            RuntimeKind::Container => {
                builder.add_source(Environment::with_prefix(ENV_PREFIX))
            }
            RuntimeKind::Standalone(path) => builder.add_source(
                File::from(path.as_path()).format(FileFormat::Json),
            ),
        };
        Self::from_builder(builder)
    }

    /// Like [`load`](Self::load) for [`RuntimeKind::Container`], reading
    /// variables from `vars` instead of the process environment.
    pub fn from_env_vars(
        vars: config::Map<String, String>,
    ) -> Result<Self, EdgeError> {
        let env = Environment::with_prefix(ENV_PREFIX).source(Some(vars));
        Self::from_builder(Config::builder().add_source(env))
    }

    fn from_builder(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<Self, EdgeError> {
        let partial: PartialConfig = builder.build()?.try_deserialize()?;
        Self::from_partial(partial)
    }

    fn from_partial(partial: PartialConfig) -> Result<Self, EdgeError> {
        let mode = partial
            .msg_mode
            .as_deref()
            .unwrap_or_default()
            .parse::<AddressingMode>()
            .map_err(|e| EdgeError::Config(e.to_string()))?;

        let config = Self {
            protocol: non_empty(partial.protocol)
                .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string()),
            hub_addr: partial.hub_addr.unwrap_or_default(),
            hub_port: parse_port(partial.hub_port),
            app_id: partial.app_id.unwrap_or_default(),
            device_id: partial.device_id.unwrap_or_default(),
            thing_id: partial.thing_id.unwrap_or_default(),
            mode,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), EdgeError> {
        for (name, value) in [
            ("hubAddr", &self.hub_addr),
            ("appId", &self.app_id),
            ("deviceId", &self.device_id),
        ] {
            if value.trim().is_empty() {
                return Err(EdgeError::Config(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    /// MQTT client id: `{deviceId}/{appId}`.
    pub fn client_id(&self) -> String {
        format!("{}/{}", self.device_id, self.app_id)
    }

    /// Broker URL: `{protocol}://{hubAddr}:{hubPort}`.
    pub fn broker_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.hub_addr, self.hub_port)
    }

    /// The codec identity of this application.
    pub fn identity(&self) -> Identity {
        Identity {
            application_id: self.app_id.clone(),
            device_id: self.device_id.clone(),
            model_id: self.thing_id.clone(),
            mode: self.mode,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Missing or unparsable ports fall back to the default.
fn parse_port(value: Option<String>) -> u16 {
    let Some(text) = non_empty(value) else {
        return DEFAULT_HUB_PORT;
    };
    text.trim().parse().unwrap_or_else(|_| {
        tracing::warn!(
            port = %text,
            default = DEFAULT_HUB_PORT,
            "invalid hub port, using default"
        );
        DEFAULT_HUB_PORT
    })
}
