//! Configuration module for the probe client.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values, and the built-in
//! defaults reproduce the classic smoke test against a local proxy.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Upper bound on the bytes requested from the socket per read
pub const MAX_READ_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Command-line arguments for the probe client
#[derive(Parser, Debug)]
#[command(name = "rserver-probe")]
#[command(author = "rserver authors")]
#[command(version = "0.1.0")]
#[command(about = "Send one HTTP request to a local server and print the reply", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Server address to connect to (e.g., 127.0.0.1:8081)
    #[arg(short, long)]
    pub address: Option<String>,

    /// Raw request text; \r, \n, \t and \\ escapes are expanded
    #[arg(short, long)]
    pub request: Option<String>,

    /// Maximum bytes read from the socket per call
    #[arg(short = 'b', long)]
    pub read_chunk_size: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    /// Address of the server under test
    #[serde(default = "default_address")]
    pub address: String,
    /// Request bytes sent verbatim
    #[serde(default = "default_request")]
    pub request: String,
    /// Bytes per read call
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            request: default_request(),
            read_chunk_size: default_read_chunk_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:8081".to_string()
}

fn default_request() -> String {
    "GET / HTTP/1.1\r\nHost:google.com\r\n\r\n".to_string()
}

fn default_read_chunk_size() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub address: String,
    pub request: String,
    pub read_chunk_size: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(
            CliArgs {
                config: None,
                address: None,
                request: None,
                read_chunk_size: None,
                log_level: None,
            },
            TomlConfig::default(),
        )
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CliArgs::parse())
    }

    /// Resolve already-parsed CLI args, reading the TOML file they name.
    fn load_from(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let config = Self::merge(cli, toml_config);
        config.validate()?;
        Ok(config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        Config {
            address: cli.address.unwrap_or(toml_config.client.address),
            request: cli
                .request
                .map(|raw| unescape(&raw))
                .unwrap_or(toml_config.client.request),
            read_chunk_size: cli
                .read_chunk_size
                .unwrap_or(toml_config.client.read_chunk_size),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }

    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "read_chunk_size must be greater than zero",
            ));
        }
        if self.read_chunk_size > MAX_READ_CHUNK_SIZE {
            return Err(ConfigError::Invalid(
                "read_chunk_size must not exceed 16 MiB",
            ));
        }
        if self.request.is_empty() {
            return Err(ConfigError::Invalid("request must not be empty"));
        }
        Ok(())
    }
}

/// Expand `\r`, `\n`, `\t` and `\\` in a request given on the command line.
///
/// Unknown escapes are kept as written.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(reason) => write!(f, "Invalid configuration: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliArgs {
        let mut argv = vec!["rserver-probe"];
        argv.extend_from_slice(args);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.address, "127.0.0.1:8081");
        assert_eq!(config.request, "GET / HTTP/1.1\r\nHost:google.com\r\n\r\n");
        assert_eq!(config.read_chunk_size, 1024);
        assert_eq!(config.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [client]
            address = "localhost:9000"
            request = "GET /sleep HTTP/1.1\r\nHost: localhost\r\n\r\n"
            read_chunk_size = 4096

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.client.address, "localhost:9000");
        assert_eq!(
            config.client.request,
            "GET /sleep HTTP/1.1\r\nHost: localhost\r\n\r\n"
        );
        assert_eq!(config.client.read_chunk_size, 4096);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: TomlConfig = toml::from_str("[client]\naddress = \"10.0.0.1:80\"\n").unwrap();
        assert_eq!(config.client.address, "10.0.0.1:80");
        assert_eq!(config.client.read_chunk_size, 1024);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [client]
            address = "127.0.0.1:1"
            read_chunk_size = 16

            [logging]
            level = "warn"
        "#,
        )
        .unwrap();

        let config = Config::merge(
            cli(&["--address", "127.0.0.1:2", "--log-level", "trace"]),
            toml_config,
        );
        assert_eq!(config.address, "127.0.0.1:2");
        assert_eq!(config.read_chunk_size, 16);
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_cli_request_is_unescaped() {
        let config = Config::merge(
            cli(&["-r", r"HEAD / HTTP/1.0\r\nHost: x\r\n\r\n"]),
            TomlConfig::default(),
        );
        assert_eq!(config.request, "HEAD / HTTP/1.0\r\nHost: x\r\n\r\n");
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\tb\\c"), "a\tb\\c");
        assert_eq!(unescape(r"keep \x as is"), r"keep \x as is");
        assert_eq!(unescape("trailing\\"), "trailing\\");
        assert_eq!(unescape("plain"), "plain");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.read_chunk_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.request.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = Config::merge(cli(&["-b", "18446744073709551615"]), TomlConfig::default());
        assert_eq!(config.read_chunk_size, usize::MAX);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.read_chunk_size = MAX_READ_CHUNK_SIZE;
        assert!(config.validate().is_ok());
        config.read_chunk_size = MAX_READ_CHUNK_SIZE + 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    fn temp_config_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rserver-probe-{}-{}.toml", std::process::id(), name))
    }

    #[test]
    fn test_load_from_file() {
        let path = temp_config_path("valid");
        std::fs::write(
            &path,
            "[client]\naddress = \"127.0.0.1:9999\"\nread_chunk_size = 64\n",
        )
        .unwrap();

        let config = Config::load_from(cli(&["-c", path.to_str().unwrap()]));
        std::fs::remove_file(&path).unwrap();

        let config = config.unwrap();
        assert_eq!(config.address, "127.0.0.1:9999");
        assert_eq!(config.read_chunk_size, 64);
        assert_eq!(config.request, "GET / HTTP/1.1\r\nHost:google.com\r\n\r\n");
    }

    #[test]
    fn test_load_from_missing_file() {
        let path = temp_config_path("missing");
        let err = Config::load_from(cli(&["-c", path.to_str().unwrap()])).unwrap_err();
        match err {
            ConfigError::FileRead(p, e) => {
                assert_eq!(p, path);
                assert_eq!(e.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_load_from_malformed_file() {
        let path = temp_config_path("malformed");
        std::fs::write(&path, "[client\naddress = ").unwrap();

        let err = Config::load_from(cli(&["-c", path.to_str().unwrap()]));
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(err, Err(ConfigError::TomlParse(..))));
    }

    #[test]
    fn test_load_from_rejects_oversized_chunk_in_file() {
        let path = temp_config_path("oversized");
        std::fs::write(&path, "[client]\nread_chunk_size = 1073741824\n").unwrap();

        let err = Config::load_from(cli(&["-c", path.to_str().unwrap()]));
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(err, Err(ConfigError::Invalid(_))));
    }
}
