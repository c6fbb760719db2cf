use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;
use wingdesk_core::config::{AppConfig, LoadOptions};

pub fn run(config_path: Option<PathBuf>) -> String {
    let config = match AppConfig::load(LoadOptions {
        config_path: config_path.clone(),
        ..LoadOptions::default()
    }) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = config_path.filter(|path| path.exists()).or_else(detect_config_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let llm_api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_secret(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    let fields = vec![
        field("erp.url", config.erp.url.clone(), &["WINGDESK_ERP_URL", "ODOO_URL"]),
        field("erp.database", config.erp.database.clone(), &["WINGDESK_ERP_DATABASE", "ODOO_DB"]),
        field("erp.login", config.erp.login.clone(), &["WINGDESK_ERP_LOGIN", "ODOO_USER"]),
        field(
            "erp.api_key",
            redact_secret(config.erp.api_key.expose_secret()),
            &["WINGDESK_ERP_API_KEY", "ODOO_APIKEY"],
        ),
        field("llm.api_key", llm_api_key, &["WINGDESK_LLM_API_KEY", "OPENAI_API_KEY"]),
        field("llm.base_url", config.llm.base_url.clone(), &["WINGDESK_LLM_BASE_URL"]),
        field("llm.model", config.llm.model.clone(), &["WINGDESK_LLM_MODEL"]),
        field("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["WINGDESK_LLM_TIMEOUT_SECS"]),
        field(
            "llm.max_tool_rounds",
            config.llm.max_tool_rounds.to_string(),
            &["WINGDESK_LLM_MAX_TOOL_ROUNDS"],
        ),
        field("server.bind_address", config.server.bind_address.clone(), &["WINGDESK_SERVER_BIND_ADDRESS"]),
        field("server.port", config.server.port.to_string(), &["WINGDESK_SERVER_PORT", "PORT"]),
        field(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["WINGDESK_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        field("agents.router", format!("{:?}", config.agents.router), &["WINGDESK_AGENTS_ROUTER"]),
        field("agents.contact_url", config.agents.contact_url.clone(), &["WINGDESK_AGENTS_CONTACT_URL"]),
        field(
            "agents.max_message_chars",
            config.agents.max_message_chars.to_string(),
            &["WINGDESK_AGENTS_MAX_MESSAGE_CHARS"],
        ),
        field(
            "agents.blocked_phrases",
            format!("{} phrases", config.agents.blocked_phrases.len()),
            &["WINGDESK_AGENTS_BLOCKED_PHRASES"],
        ),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["WINGDESK_LOGGING_LEVEL", "WINGDESK_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["WINGDESK_LOGGING_FORMAT", "WINGDESK_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        fields
            .into_iter()
            .map(|(key, value, env_keys)| render_line(key, &value, source(key, env_keys))),
    );
    lines.join("\n")
}

fn field(
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
) -> (&'static str, String, &'static [&'static str]) {
    (key, value, env_keys)
}

fn detect_config_path() -> Option<PathBuf> {
    ["wingdesk.toml", "config/wingdesk.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a short prefix such as `sk-` so operators can tell keys apart.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        if prefix.len() <= 4 {
            return format!("{prefix}-***");
        }
    }

    "<redacted>".to_string()
}
