//! Participant configuration.
//!
//! Configuration is accepted as YAML or JSON (YAML is a superset, one parser
//! handles both), with camel-case field names. Everything is optional except
//! the participant name, which must be non-empty by the time a participant is
//! created.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use silbus_core::errors::{Result, SilbusError};

/// Default registry URI used when neither configuration nor argument name
/// one.
pub const DEFAULT_REGISTRY_URI: &str = "silbus://localhost:8500";

/// URI of the registry a participant connects to, `silbus://host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryUri {
    host: String,
    port: u16,
}

impl RegistryUri {
    /// Parse a `silbus://host:port` URI.
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri.strip_prefix("silbus://").ok_or_else(|| {
            SilbusError::configuration(format!(
                "registry URI '{uri}' must use the silbus:// scheme"
            ))
        })?;
        let (host, port) = rest.rsplit_once(':').ok_or_else(|| {
            SilbusError::configuration(format!("registry URI '{uri}' is missing a port"))
        })?;
        if host.is_empty() {
            return Err(SilbusError::configuration(format!(
                "registry URI '{uri}' is missing a host"
            )));
        }
        let port: u16 = port.parse().map_err(|_| {
            SilbusError::configuration(format!("registry URI '{uri}' has an invalid port"))
        })?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// The registry host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The registry port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for RegistryUri {
    fn default() -> Self {
        // The default URI is well-formed by construction.
        Self {
            host: "localhost".to_string(),
            port: 8500,
        }
    }
}

impl fmt::Display for RegistryUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "silbus://{}:{}", self.host, self.port)
    }
}

/// Middleware connectivity settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MiddlewareConfig {
    /// Registry URI; defaults to [`DEFAULT_REGISTRY_URI`] when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_uri: Option<String>,
}

/// Configuration of one bus controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ControllerConfig {
    /// Controller name, unique within the participant.
    pub name: String,
    /// Network name; defaults to the controller name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

impl ControllerConfig {
    /// The effective network name.
    pub fn network_name(&self) -> &str {
        self.network.as_deref().unwrap_or(&self.name)
    }
}

/// Kind of a logging sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogSinkKind {
    /// Log to standard output.
    Stdout,
    /// Log to a file.
    File,
}

/// One logging sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LogSinkConfig {
    /// Sink kind.
    #[serde(rename = "type")]
    pub kind: LogSinkKind,
    /// Maximum level, e.g. `info`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output path for file sinks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_name: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoggingConfig {
    /// Configured sinks; empty means the embedding application decides.
    #[serde(default)]
    pub sinks: Vec<LogSinkConfig>,
}

/// Health check thresholds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HealthCheckConfig {
    /// Warn when a callback runs longer than this many milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soft_response_timeout_ms: Option<u64>,
    /// Treat the participant as unhealthy after this many milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_response_timeout_ms: Option<u64>,
}

/// The complete participant configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ParticipantConfiguration {
    /// Name of the participant; must be non-empty.
    #[serde(default)]
    pub participant_name: String,
    /// Middleware settings.
    #[serde(default)]
    pub middleware: MiddlewareConfig,
    /// CAN controllers to create.
    #[serde(default)]
    pub can_controllers: Vec<ControllerConfig>,
    /// Ethernet controllers to create.
    #[serde(default)]
    pub ethernet_controllers: Vec<ControllerConfig>,
    /// FlexRay controllers to create.
    #[serde(default)]
    pub flexray_controllers: Vec<ControllerConfig>,
    /// LIN controllers to create.
    #[serde(default)]
    pub lin_controllers: Vec<ControllerConfig>,
    /// Logging sinks.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Health check thresholds.
    #[serde(default)]
    pub health_check: HealthCheckConfig,
}

impl ParticipantConfiguration {
    /// Create a configuration with just a participant name.
    pub fn named(participant_name: impl Into<String>) -> Self {
        Self {
            participant_name: participant_name.into(),
            ..Self::default()
        }
    }

    /// Parse a configuration from YAML or JSON text.
    pub fn from_text(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|error| SilbusError::configuration(format!("invalid configuration: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|error| {
            SilbusError::configuration(format!(
                "cannot read configuration file '{}': {error}",
                path.as_ref().display()
            ))
        })?;
        Self::from_text(&text)
    }

    /// Check the configuration's invariants.
    pub fn validate(&self) -> Result<()> {
        if self.participant_name.is_empty() {
            return Err(SilbusError::configuration(
                "participantName must not be empty",
            ));
        }
        self.registry_uri()?;
        let mut names: Vec<&str> = self
            .can_controllers
            .iter()
            .chain(&self.ethernet_controllers)
            .chain(&self.flexray_controllers)
            .chain(&self.lin_controllers)
            .map(|controller| controller.name.as_str())
            .collect();
        names.sort_unstable();
        if names.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(SilbusError::configuration(
                "controller names must be unique within a participant",
            ));
        }
        Ok(())
    }

    /// The effective registry URI.
    pub fn registry_uri(&self) -> Result<RegistryUri> {
        match self.middleware.registry_uri.as_deref() {
            None => Ok(RegistryUri::default()),
            Some(uri) => RegistryUri::parse(uri),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_and_json_parse_alike() {
        let yaml = r#"
participantName: EcuFront
middleware:
  registryUri: silbus://registry.local:9600
canControllers:
  - name: CanCtrl1
    network: CAN1
  - name: CanCtrl2
loggingDisabled: no
"#;
        // deny_unknown_fields: the stray key is rejected.
        assert!(ParticipantConfiguration::from_text(yaml).is_err());

        let yaml = r#"
participantName: EcuFront
middleware:
  registryUri: silbus://registry.local:9600
canControllers:
  - name: CanCtrl1
    network: CAN1
  - name: CanCtrl2
"#;
        let from_yaml = ParticipantConfiguration::from_text(yaml).unwrap();

        let json = r#"{
            "participantName": "EcuFront",
            "middleware": { "registryUri": "silbus://registry.local:9600" },
            "canControllers": [
                { "name": "CanCtrl1", "network": "CAN1" },
                { "name": "CanCtrl2" }
            ]
        }"#;
        let from_json = ParticipantConfiguration::from_text(json).unwrap();

        assert_eq!(from_yaml, from_json);
        assert_eq!(from_yaml.can_controllers[0].network_name(), "CAN1");
        assert_eq!(from_yaml.can_controllers[1].network_name(), "CanCtrl2");
        assert_eq!(
            from_yaml.registry_uri().unwrap().to_string(),
            "silbus://registry.local:9600"
        );
    }

    #[test]
    fn empty_participant_name_is_a_configuration_error() {
        assert!(matches!(
            ParticipantConfiguration::from_text("{}"),
            Err(SilbusError::Configuration { .. })
        ));
    }

    #[test]
    fn registry_uri_defaults_and_validates() {
        let config = ParticipantConfiguration::named("P1");
        assert_eq!(
            config.registry_uri().unwrap().to_string(),
            DEFAULT_REGISTRY_URI
        );

        assert!(RegistryUri::parse("tcp://localhost:8500").is_err());
        assert!(RegistryUri::parse("silbus://localhost").is_err());
        assert!(RegistryUri::parse("silbus://:8500").is_err());
        assert!(RegistryUri::parse("silbus://localhost:notaport").is_err());

        let uri = RegistryUri::parse("silbus://registry:1234").unwrap();
        assert_eq!(uri.host(), "registry");
        assert_eq!(uri.port(), 1234);
    }

    #[test]
    fn duplicate_controller_names_are_rejected() {
        let mut config = ParticipantConfiguration::named("P1");
        config.can_controllers.push(ControllerConfig {
            name: "Ctrl".to_string(),
            network: None,
        });
        config.lin_controllers.push(ControllerConfig {
            name: "Ctrl".to_string(),
            network: None,
        });
        assert!(matches!(
            config.validate(),
            Err(SilbusError::Configuration { .. })
        ));
    }
}
