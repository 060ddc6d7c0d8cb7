//! Configuration types.
//!
//! Everything is read from the process environment (a `.env` file is loaded
//! first when present). Only the Telegram token is mandatory; the store and
//! completion settings degrade to warnings when absent.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL, LlmConfig};

/// How strictly dialog answers are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationPolicy {
    /// Accept any text, including off-list answers and unparsable weights.
    #[default]
    Lenient,
    /// Reject off-list answers and non-numeric weights, re-asking the question.
    Strict,
}

impl FromStr for ValidationPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(ConfigError::InvalidValue {
                key: "FITCOACH_VALIDATION".into(),
                message: format!("expected 'lenient' or 'strict', got '{other}'"),
            }),
        }
    }
}

/// What happens when a command arrives while a dialog is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MidDialogCommandPolicy {
    /// Run the command and leave the dialog alone (unless the command replaces it).
    #[default]
    Dispatch,
    /// Cancel the active dialog, tell the user, then run the command.
    AbortDialog,
}

impl FromStr for MidDialogCommandPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dispatch" => Ok(Self::Dispatch),
            "abort" | "abort_dialog" => Ok(Self::AbortDialog),
            other => Err(ConfigError::InvalidValue {
                key: "FITCOACH_MID_DIALOG_COMMANDS".into(),
                message: format!("expected 'dispatch' or 'abort', got '{other}'"),
            }),
        }
    }
}

/// Dialog behaviour knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DialogPolicy {
    pub validation: ValidationPolicy,
    pub mid_dialog_commands: MidDialogCommandPolicy,
}

/// Where profiles, plans and progress logs are persisted.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    /// Remote libSQL endpoint with an auth token.
    Remote { url: String, token: SecretString },
    /// Local database file.
    Local { path: PathBuf },
    /// No store settings; every store operation fails.
    Unconfigured,
}

/// Telegram transport settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub allowed_users: Vec<String>,
}

/// Complete bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram: TelegramConfig,
    pub llm: LlmConfig,
    pub store: StoreConfig,
    pub dialog: DialogPolicy,
    /// Per-user workers retire after this much silence.
    pub worker_idle_timeout: Duration,
    /// Also read messages from stdin.
    pub enable_cli: bool,
    /// Directory for the daily rolling log file.
    pub log_dir: Option<PathBuf>,
}

impl BotConfig {
    /// Load configuration from the environment, reading `.env` first.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bot_token = var("TELEGRAM_BOT_TOKEN")
            .ok_or_else(|| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()))?;

        let allowed_users: Vec<String> = var("TELEGRAM_ALLOWED_USERS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let api_key = var("GROQ_API_KEY").map(SecretString::from);
        if api_key.is_none() {
            tracing::warn!("GROQ_API_KEY is not set; AI replies will fail");
        }

        let max_tokens = match var("FITCOACH_MAX_TOKENS") {
            Some(raw) => Some(raw.trim().parse::<u32>().map_err(|e| {
                ConfigError::InvalidValue {
                    key: "FITCOACH_MAX_TOKENS".into(),
                    message: e.to_string(),
                }
            })?),
            None => None,
        };

        let llm = LlmConfig {
            api_key,
            base_url: var("FITCOACH_LLM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: var("FITCOACH_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens,
        };

        let store = match (var("FITCOACH_DB_URL"), var("FITCOACH_DB_TOKEN")) {
            (Some(url), Some(token)) => StoreConfig::Remote {
                url,
                token: SecretString::from(token),
            },
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!(
                    "FITCOACH_DB_URL and FITCOACH_DB_TOKEN must both be set for a remote store"
                );
                local_or_unconfigured(var("FITCOACH_DB_PATH"))
            }
            (None, None) => local_or_unconfigured(var("FITCOACH_DB_PATH")),
        };

        let dialog = DialogPolicy {
            validation: var("FITCOACH_VALIDATION")
                .map(|v| v.parse::<ValidationPolicy>())
                .transpose()?
                .unwrap_or_default(),
            mid_dialog_commands: var("FITCOACH_MID_DIALOG_COMMANDS")
                .map(|v| v.parse::<MidDialogCommandPolicy>())
                .transpose()?
                .unwrap_or_default(),
        };

        let worker_idle_secs = match var("FITCOACH_WORKER_IDLE_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                key: "FITCOACH_WORKER_IDLE_SECS".into(),
                message: e.to_string(),
            })?,
            None => 300,
        };

        let enable_cli = var("FITCOACH_CLI")
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            telegram: TelegramConfig {
                bot_token,
                allowed_users,
            },
            llm,
            store,
            dialog,
            worker_idle_timeout: Duration::from_secs(worker_idle_secs),
            enable_cli,
            log_dir: var("FITCOACH_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn local_or_unconfigured(path: Option<String>) -> StoreConfig {
    match path {
        Some(path) => StoreConfig::Local {
            path: PathBuf::from(path),
        },
        None => StoreConfig::Unconfigured,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn missing_telegram_token_is_fatal() {
        let err = BotConfig::from_lookup(lookup(&[("GROQ_API_KEY", "k")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref v) if v == "TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn blank_telegram_token_counts_as_missing() {
        let err = BotConfig::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn defaults_with_only_token() {
        let config = BotConfig::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "123:ABC")])).unwrap();
        assert_eq!(config.telegram.bot_token, "123:ABC");
        assert_eq!(config.telegram.allowed_users, vec!["*"]);
        assert!(config.llm.api_key.is_none());
        assert_eq!(config.llm.model, DEFAULT_MODEL);
        assert_eq!(config.llm.base_url, DEFAULT_BASE_URL);
        assert!(config.llm.max_tokens.is_none());
        assert!(matches!(config.store, StoreConfig::Unconfigured));
        assert_eq!(config.dialog.validation, ValidationPolicy::Lenient);
        assert_eq!(
            config.dialog.mid_dialog_commands,
            MidDialogCommandPolicy::Dispatch
        );
        assert_eq!(config.worker_idle_timeout, Duration::from_secs(300));
        assert!(!config.enable_cli);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn remote_store_needs_url_and_token() {
        let config = BotConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("FITCOACH_DB_URL", "libsql://coach.example.io"),
            ("FITCOACH_DB_TOKEN", "secret"),
        ]))
        .unwrap();
        match config.store {
            StoreConfig::Remote { url, token } => {
                assert_eq!(url, "libsql://coach.example.io");
                assert_eq!(token.expose_secret(), "secret");
            }
            other => panic!("expected remote store, got {other:?}"),
        }
    }

    #[test]
    fn half_remote_settings_fall_back_to_local_path() {
        let config = BotConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("FITCOACH_DB_URL", "libsql://coach.example.io"),
            ("FITCOACH_DB_PATH", "./data/coach.db"),
        ]))
        .unwrap();
        assert!(
            matches!(config.store, StoreConfig::Local { ref path } if path == &PathBuf::from("./data/coach.db"))
        );
    }

    #[test]
    fn allowed_users_are_trimmed() {
        let config = BotConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("TELEGRAM_ALLOWED_USERS", " alice, 12345 ,,"),
        ]))
        .unwrap();
        assert_eq!(config.telegram.allowed_users, vec!["alice", "12345"]);
    }

    #[test]
    fn policies_parse_from_env() {
        let config = BotConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("FITCOACH_VALIDATION", "Strict"),
            ("FITCOACH_MID_DIALOG_COMMANDS", "abort"),
        ]))
        .unwrap();
        assert_eq!(config.dialog.validation, ValidationPolicy::Strict);
        assert_eq!(
            config.dialog.mid_dialog_commands,
            MidDialogCommandPolicy::AbortDialog
        );
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let err = BotConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("FITCOACH_VALIDATION", "picky"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "FITCOACH_VALIDATION"));
    }

    #[test]
    fn invalid_max_tokens_is_rejected() {
        let err = BotConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("FITCOACH_MAX_TOKENS", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn worker_idle_secs_must_be_a_number() {
        let err = BotConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("FITCOACH_WORKER_IDLE_SECS", "5m"),
        ]))
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "FITCOACH_WORKER_IDLE_SECS")
        );

        let config = BotConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("FITCOACH_WORKER_IDLE_SECS", " 60 "),
        ]))
        .unwrap();
        assert_eq!(config.worker_idle_timeout, Duration::from_secs(60));
    }

    #[test]
    fn llm_overrides() {
        let config = BotConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("GROQ_API_KEY", "gsk-test"),
            ("FITCOACH_MODEL", "llama-3.1-8b-instant"),
            ("FITCOACH_LLM_BASE_URL", "http://127.0.0.1:9999/v1"),
            ("FITCOACH_MAX_TOKENS", "800"),
            ("FITCOACH_CLI", "1"),
        ]))
        .unwrap();
        assert_eq!(
            config.llm.api_key.as_ref().map(|k| k.expose_secret().to_string()),
            Some("gsk-test".to_string())
        );
        assert_eq!(config.llm.model, "llama-3.1-8b-instant");
        assert_eq!(config.llm.base_url, "http://127.0.0.1:9999/v1");
        assert_eq!(config.llm.max_tokens, Some(800));
        assert!(config.enable_cli);
    }
}
