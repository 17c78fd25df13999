//! # Configuration Module
//!
//! Configuration structures and loading for the gateway.
//!
//! ## Key Features
//! - YAML/JSON configuration parsing with serde
//! - Environment variable override support (`GATEWAY_<SECTION>_<FIELD>`)
//! - Validation that reports every problem at once
//!
//! The path policy has no implicit fallback: `auth.default_policy` must be written
//! by the operator, so whether an unlisted path is protected is always a visible
//! decision in the config file.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::auth::policy::{PathPattern, PathPolicy};
use crate::core::error::{GatewayError, GatewayResult};

/// Main gateway configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listener and upstream client settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Credential validation and path policy
    pub auth: AuthConfig,

    /// Cross-origin resource sharing
    #[serde(default)]
    pub cors: CorsSettings,

    /// Static forwarding table, first match wins
    #[serde(default)]
    pub routes: Vec<RouteDefinition>,

    /// Error response shaping
    #[serde(default)]
    pub errors: ErrorResponseConfig,

    /// Logging and metrics
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: GatewayConfig = serde_yaml::from_str(&content)
            .map_err(|e| GatewayError::config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON
    pub async fn load_from_json<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: GatewayConfig = serde_json::from_str(&content)
            .map_err(|e| GatewayError::config(format!("Failed to parse JSON config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Secrets are expected to arrive this way (`GATEWAY_JWT_SECRET`) rather than
    /// being committed to the config file.
    pub fn apply_env_overrides(&mut self) -> GatewayResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `GATEWAY_*` overrides looked up through `lookup`
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> GatewayResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("GATEWAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }

        if let Some(port) = lookup("GATEWAY_SERVER_HTTP_PORT") {
            self.server.http_port = port.parse().map_err(|e| {
                GatewayError::config(format!("Invalid GATEWAY_SERVER_HTTP_PORT: {}", e))
            })?;
        }

        if let Some(timeout) = lookup("GATEWAY_SERVER_UPSTREAM_TIMEOUT") {
            self.server.upstream_timeout = humantime::parse_duration(&timeout).map_err(|e| {
                GatewayError::config(format!("Invalid GATEWAY_SERVER_UPSTREAM_TIMEOUT: {}", e))
            })?;
        }

        if let Some(secret) = lookup("GATEWAY_JWT_SECRET") {
            self.auth.jwt.secret = secret;
        }

        if let Some(level) = lookup("GATEWAY_LOG_LEVEL") {
            self.observability.logging.level = level;
        }

        if let Some(format) = lookup("GATEWAY_LOG_FORMAT") {
            self.observability.logging.format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(GatewayError::config(format!(
                        "Invalid GATEWAY_LOG_FORMAT: {}",
                        other
                    )))
                }
            };
        }

        if let Some(enabled) = lookup("GATEWAY_METRICS_ENABLED") {
            self.observability.metrics.enabled = enabled.parse().map_err(|e| {
                GatewayError::config(format!("Invalid GATEWAY_METRICS_ENABLED: {}", e))
            })?;
        }

        Ok(())
    }

    /// Configuration validation with detailed error messages
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        if self.server.bind_address.is_empty() {
            errors.push("bind_address cannot be empty".to_string());
        }

        if let Err(e) = self.server.socket_addr() {
            errors.push(e.to_string());
        }

        if self.server.max_request_size == 0 {
            errors.push("max_request_size must be greater than 0".to_string());
        }

        if self.server.upstream_timeout.is_zero() {
            errors.push("upstream_timeout must be greater than 0".to_string());
        }

        if self.auth.jwt.secret.is_empty() {
            errors.push("auth.jwt.secret cannot be empty".to_string());
        }

        for (index, rule) in self.auth.policies.iter().enumerate() {
            if let Err(e) = PathPattern::parse(&rule.pattern) {
                errors.push(format!("auth.policies[{}]: {}", index, e));
            }
        }

        for (index, route) in self.routes.iter().enumerate() {
            if let Err(e) = PathPattern::parse(&route.pattern) {
                errors.push(format!("routes[{}]: {}", index, e));
            }
            match Url::parse(&route.upstream) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
                Ok(url) => errors.push(format!(
                    "routes[{}]: unsupported upstream scheme '{}'",
                    index,
                    url.scheme()
                )),
                Err(e) => errors.push(format!(
                    "routes[{}]: invalid upstream URL '{}': {}",
                    index, route.upstream, e
                )),
            }
        }

        if self.cors.enabled {
            for method in &self.cors.allowed_methods {
                if method.parse::<axum::http::Method>().is_err() {
                    errors.push(format!("cors: invalid method '{}'", method));
                }
            }
        }

        if self.observability.metrics.enabled
            && self
                .observability
                .metrics
                .listen_address
                .parse::<SocketAddr>()
                .is_err()
        {
            errors.push(format!(
                "observability.metrics.listen_address is not a socket address: {}",
                self.observability.metrics.listen_address
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::config(errors.join("; ")))
        }
    }
}

/// Listener and upstream client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub http_port: u16,
    /// Largest request body the gateway buffers before forwarding
    pub max_request_size: usize,
    #[serde(with = "humantime_serde")]
    pub upstream_timeout: Duration,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> GatewayResult<SocketAddr> {
        format!("{}:{}", self.bind_address, self.http_port)
            .parse()
            .map_err(|e| GatewayError::config(format!("Invalid bind address: {}", e)))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 8080,
            max_request_size: 10 * 1024 * 1024,
            upstream_timeout: Duration::from_secs(30),
        }
    }
}

/// Credential validation and path policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt: JwtConfig,

    /// Policy for paths that match none of `policies`
    pub default_policy: PathPolicy,

    /// Ordered `(pattern, policy)` rules, first match wins
    #[serde(default)]
    pub policies: Vec<PolicyRule>,
}

/// One path policy rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub pattern: String,
    pub policy: PathPolicy,
}

/// JWT verification settings
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Shared HMAC secret
    #[serde(default)]
    pub secret: String,

    #[serde(default)]
    pub algorithm: JwtAlgorithm,

    /// Clock skew tolerated when checking `exp`/`nbf`
    #[serde(default)]
    pub leeway_seconds: u64,

    #[serde(default)]
    pub issuer: Option<String>,

    #[serde(default)]
    pub audience: Option<String>,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[REDACTED]")
            .field("algorithm", &self.algorithm)
            .field("leeway_seconds", &self.leeway_seconds)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

/// Supported signing algorithms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JwtAlgorithm {
    #[default]
    HS256,
    HS384,
    HS512,
}

impl From<JwtAlgorithm> for jsonwebtoken::Algorithm {
    fn from(algorithm: JwtAlgorithm) -> Self {
        match algorithm {
            JwtAlgorithm::HS256 => jsonwebtoken::Algorithm::HS256,
            JwtAlgorithm::HS384 => jsonwebtoken::Algorithm::HS384,
            JwtAlgorithm::HS512 => jsonwebtoken::Algorithm::HS512,
        }
    }
}

/// CORS settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsSettings {
    pub enabled: bool,
    /// `"*"` mirrors any request origin
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    /// `"*"` mirrors the requested headers
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_seconds: u64,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: vec!["*".to_string()],
            allow_credentials: true,
            max_age_seconds: 3600,
        }
    }
}

/// A forwarding rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDefinition {
    pub pattern: String,
    /// Base URL of the upstream service
    pub upstream: String,
}

/// Error response shaping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorResponseConfig {
    /// Forward the detail text of invalid-argument and runtime failures to clients
    pub expose_details: bool,
}

impl Default for ErrorResponseConfig {
    fn default() -> Self {
        Self {
            expose_details: true,
        }
    }
}

/// Logging and metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "edge_gateway=info,tower_http=info".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
server:
  bind_address: "127.0.0.1"
  http_port: 9000
  upstream_timeout: 5s
auth:
  jwt:
    secret: "test-secret"
    algorithm: HS512
    leeway_seconds: 5
  default_policy: protected
  policies:
    - pattern: "/auth/**"
      policy: public
    - pattern: "/api/products/**"
      policy: public
routes:
  - pattern: "/api/checkout/**"
    upstream: "http://checkout-service:8080"
errors:
  expose_details: false
"#;

    fn sample() -> GatewayConfig {
        serde_yaml::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_parse_sample_config() {
        let config = sample();
        assert_eq!(config.server.http_port, 9000);
        assert_eq!(config.server.upstream_timeout, Duration::from_secs(5));
        assert_eq!(config.auth.jwt.algorithm, JwtAlgorithm::HS512);
        assert_eq!(config.auth.default_policy, PathPolicy::Protected);
        assert_eq!(config.auth.policies.len(), 2);
        assert_eq!(config.auth.policies[0].policy, PathPolicy::Public);
        assert!(!config.errors.expose_details);
        assert!(config.cors.enabled);
        assert_eq!(config.cors.max_age_seconds, 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_policy_is_required() {
        let yaml = r#"
auth:
  jwt:
    secret: "s"
"#;
        let parsed: Result<GatewayConfig, _> = serde_yaml::from_str(yaml);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validation_collects_errors() {
        let mut config = sample();
        config.auth.jwt.secret.clear();
        config.auth.policies.push(PolicyRule {
            pattern: "/a/**/b".to_string(),
            policy: PathPolicy::Public,
        });
        config.routes.push(RouteDefinition {
            pattern: "/x/**".to_string(),
            upstream: "ftp://files".to_string(),
        });

        let message = match config.validate() {
            Err(GatewayError::Configuration { message }) => message,
            other => panic!("expected configuration error, got {:?}", other),
        };
        assert!(message.contains("auth.jwt.secret"));
        assert!(message.contains("auth.policies[2]"));
        assert!(message.contains("unsupported upstream scheme"));
    }

    #[test]
    fn test_jwt_secret_is_redacted_in_debug() {
        let config = sample();
        let debug = format!("{:?}", config.auth.jwt);
        assert!(!debug.contains("test-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[tokio::test]
    async fn test_load_config_from_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = GatewayConfig::load_from_file(file.path()).await.unwrap();
        assert_eq!(config.routes[0].upstream, "http://checkout-service:8080");
    }

    #[tokio::test]
    async fn test_load_config_from_json_file() {
        let json = serde_json::to_string(&sample()).unwrap();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = GatewayConfig::load_from_json(file.path()).await.unwrap();
        assert_eq!(config.server.http_port, 9000);
    }

    #[tokio::test]
    async fn test_missing_file_is_configuration_error() {
        let result = GatewayConfig::load_from_file("/nonexistent/gateway.yaml").await;
        assert!(matches!(result, Err(GatewayError::Configuration { .. })));
    }

    #[test]
    fn test_environment_variable_overrides() {
        let vars: HashMap<&str, &str> = [
            ("GATEWAY_JWT_SECRET", "from-env"),
            ("GATEWAY_SERVER_UPSTREAM_TIMEOUT", "250ms"),
            ("GATEWAY_LOG_FORMAT", "Pretty"),
        ]
        .into_iter()
        .collect();

        let mut config = sample();
        config
            .apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.auth.jwt.secret, "from-env");
        assert_eq!(config.server.upstream_timeout, Duration::from_millis(250));
        assert_eq!(config.observability.logging.format, LogFormat::Pretty);
        assert_eq!(config.server.http_port, 9000);
    }

    #[test]
    fn test_invalid_override_is_configuration_error() {
        let mut config = sample();
        let result = config.apply_overrides_from(|key| {
            (key == "GATEWAY_SERVER_HTTP_PORT").then(|| "not-a-port".to_string())
        });
        assert!(matches!(result, Err(GatewayError::Configuration { .. })));
        assert_eq!(config.server.http_port, 9000);
    }
}
