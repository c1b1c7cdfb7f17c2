use secrecy::SecretString;
use std::path::PathBuf;
use tracing::Level;

const DEFAULT_INSTRUCTIONS: &str = "You are a concise voice coach for a workout logging app. \
Use the provided tools to navigate the app, log and undo sets, recommend weights, and \
summarize training history. Confirm every logged set back to the user in one short sentence.";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
    #[error("Failed to read instructions file {0}: {1}")]
    UnreadableInstructions(PathBuf, #[source] std::io::Error),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Absent is allowed here; connecting without it fails with a typed
    /// error instead.
    pub openai_api_key: Option<SecretString>,
    pub realtime_model: String,
    pub chat_model: String,
    pub chat_base_url: String,
    pub voice: String,
    pub log_level: Level,
    pub instructions: String,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let openai_api_key = std::env::var("OPENAI_API_KEY").ok().map(SecretString::from);

        let realtime_model = std::env::var("REALTIME_MODEL")
            .unwrap_or_else(|_| "gpt-4o-realtime-preview-2024-12-17".to_string());
        let chat_model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let chat_base_url = std::env::var("CHAT_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let voice = std::env::var("AGENT_VOICE").unwrap_or_else(|_| "alloy".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let instructions = match std::env::var("INSTRUCTIONS_PATH") {
            Ok(path) => {
                let path = PathBuf::from(path);
                std::fs::read_to_string(&path)
                    .map_err(|e| ConfigError::UnreadableInstructions(path, e))?
            }
            Err(_) => DEFAULT_INSTRUCTIONS.to_string(),
        };

        Ok(Self {
            openai_api_key,
            realtime_model,
            chat_model,
            chat_base_url,
            voice,
            log_level,
            instructions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("OPENAI_API_KEY");
            env::remove_var("REALTIME_MODEL");
            env::remove_var("CHAT_MODEL");
            env::remove_var("CHAT_BASE_URL");
            env::remove_var("AGENT_VOICE");
            env::remove_var("RUST_LOG");
            env::remove_var("INSTRUCTIONS_PATH");
        }
    }

    #[test]
    fn test_config_error_display() {
        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load successfully");

        assert!(config.openai_api_key.is_none());
        assert_eq!(config.realtime_model, "gpt-4o-realtime-preview-2024-12-17");
        assert_eq!(config.chat_model, "gpt-4o");
        assert_eq!(config.chat_base_url, "https://api.openai.com/v1");
        assert_eq!(config.voice, "alloy");
        assert_eq!(config.log_level, Level::INFO);
        assert!(config.instructions.contains("workout"));
    }

    #[test]
    #[serial]
    fn test_config_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-openai-key");
            env::set_var("REALTIME_MODEL", "gpt-4o-realtime-mini");
            env::set_var("CHAT_MODEL", "gpt-4o-mini");
            env::set_var("CHAT_BASE_URL", "http://localhost:11434/v1");
            env::set_var("AGENT_VOICE", "verse");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(
            config.openai_api_key.as_ref().map(|k| k.expose_secret().to_string()),
            Some("test-openai-key".to_string())
        );
        assert_eq!(config.realtime_model, "gpt-4o-realtime-mini");
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(config.chat_base_url, "http://localhost:11434/v1");
        assert_eq!(config.voice, "verse");
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_instructions_file() {
        clear_env_vars();
        unsafe {
            env::set_var("INSTRUCTIONS_PATH", "/nonexistent/instructions.md");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::UnreadableInstructions(path, _) => {
                assert_eq!(path, PathBuf::from("/nonexistent/instructions.md"));
            }
            _ => panic!("Expected UnreadableInstructions"),
        }
    }

    #[test]
    #[serial]
    fn test_config_instructions_from_file() {
        clear_env_vars();
        let path = std::env::temp_dir().join("repcoach_test_instructions.md");
        std::fs::write(&path, "Count in kilograms.").unwrap();
        unsafe {
            env::set_var("INSTRUCTIONS_PATH", &path);
        }

        let config = Config::from_env().expect("Config should load successfully");
        assert_eq!(config.instructions, "Count in kilograms.");

        let _ = std::fs::remove_file(path);
    }
}
