use std::env;
use std::fs;
use std::str::FromStr;
use std::time::Duration;
use log::LevelFilter;
use serde::Deserialize;
use crate::errors::ConfigError;

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct General {
    pub log_path: Option<String>,
    pub log_level: LevelFilter,
    pub log_to_stdout: bool,
}

impl Default for General {
    fn default() -> Self {
        Self { log_path: None, log_level: LevelFilter::Info, log_to_stdout: true }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Server {
    pub bind_address: String,
    pub bind_port: u16,
    pub max_workers: usize,
    pub model_dir: String,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            bind_address: "[::]".to_string(),
            bind_port: 50051,
            max_workers: 10,
            model_dir: "model/".to_string(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Bridge {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub client_id: String,
    pub telemetry_topic: String,
    pub rpc_endpoint: String,
    pub connect_timeout_secs: u64,
    pub max_retries: u32,
    pub wait_seconds: u64,
    pub call_timeout_secs: u64,
    pub keep_alive_secs: u64,
}

impl Default for Bridge {
    fn default() -> Self {
        Self {
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            client_id: "pvcast-bridge".to_string(),
            telemetry_topic: "sensor/+/data".to_string(),
            rpc_endpoint: "http://grpc-server:50051".to_string(),
            connect_timeout_secs: 5,
            max_retries: 5,
            wait_seconds: 3,
            call_timeout_secs: 10,
            keep_alive_secs: 60,
        }
    }
}

impl Bridge {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_seconds)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct Config {
    pub general: General,
    pub server: Server,
    pub bridge: Bridge,
}

/// Loads the configuration file and returns a struct with all configuration items.
/// Items not present in the file keep their defaults, and without a file all defaults are used.
///
/// Environment overrides are applied last.
///
/// # Arguments
///
/// * 'config_path' - path to the configuration file, if any
pub fn load_config(config_path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config: Config = match config_path {
        Some(path) => {
            let toml = fs::read_to_string(path)
                .map_err(|e| ConfigError(format!("unable to read {}: {}", path, e)))?;
            toml::from_str(&toml)?
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| env::var(key).ok())?;

    Ok(config)
}

/// Applies overrides read from the process environment, these are read once at startup
///
/// # Arguments
///
/// * 'config' - configuration to update
/// * 'lookup' - function returning the value of an environment variable, if set
fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("MQTT_BROKER") {
        config.bridge.mqtt_host = host;
    }
    if let Some(port) = lookup("MQTT_PORT") {
        config.bridge.mqtt_port = port.parse()
            .map_err(|e| ConfigError(format!("MQTT_PORT: {}", e)))?;
    }
    if let Some(endpoint) = lookup("GRPC_SERVER") {
        config.bridge.rpc_endpoint = normalize_endpoint(&endpoint);
    }
    if let Some(dir) = lookup("MODEL_DIR") {
        config.server.model_dir = dir;
    }
    if let Some(level) = lookup("LOG_LEVEL") {
        config.general.log_level = LevelFilter::from_str(&level)
            .map_err(|e| ConfigError(format!("LOG_LEVEL: {}", e)))?;
    }

    Ok(())
}

/// Prefixes a bare `host:port` address with a scheme so it can be used as a channel endpoint
///
/// # Arguments
///
/// * 'endpoint' - endpoint as given in the environment
fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = Config::default();
        assert_eq!(config.server.bind_port, 50051);
        assert_eq!(config.server.max_workers, 10);
        assert_eq!(config.bridge.max_retries, 5);
        assert_eq!(config.bridge.wait(), Duration::from_secs(3));
        assert_eq!(config.bridge.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.bridge.telemetry_topic, "sensor/+/data");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let toml = r#"
            [general]
            log_level = "debug"
            log_to_stdout = false

            [bridge]
            mqtt_host = "broker"
            call_timeout_secs = 2
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.general.log_level, LevelFilter::Debug);
        assert!(!config.general.log_to_stdout);
        assert_eq!(config.bridge.mqtt_host, "broker");
        assert_eq!(config.bridge.mqtt_port, 1883);
        assert_eq!(config.bridge.call_timeout(), Duration::from_secs(2));
        assert_eq!(config.server.model_dir, "model/");
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("MQTT_BROKER", "mosquitto"),
            ("MQTT_PORT", "1884"),
            ("GRPC_SERVER", "grpc-server:50051"),
            ("MODEL_DIR", "/opt/model/"),
            ("LOG_LEVEL", "warn"),
        ]);
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.bridge.mqtt_host, "mosquitto");
        assert_eq!(config.bridge.mqtt_port, 1884);
        assert_eq!(config.bridge.rpc_endpoint, "http://grpc-server:50051");
        assert_eq!(config.server.model_dir, "/opt/model/");
        assert_eq!(config.general.log_level, LevelFilter::Warn);
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut config = Config::default();
        let result = apply_env_overrides(&mut config, |k| {
            (k == "MQTT_PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config(Some("/nonexistent/pvcast.toml")).is_err());
    }
}
