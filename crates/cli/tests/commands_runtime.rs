use std::env;
use std::io::Write;
use std::sync::{Mutex, OnceLock};

use serde_json::{json, Value};
use wingdesk_cli::commands::{ask, config, doctor};
use wingdesk_core::errors::FALLBACK_REPLY;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

const VALID_ENV: &[(&str, &str)] = &[
    ("WINGDESK_ERP_URL", "https://erp.example.com/jsonrpc"),
    ("WINGDESK_ERP_DATABASE", "shop"),
    ("WINGDESK_ERP_LOGIN", "bot@example.com"),
    ("WINGDESK_ERP_API_KEY", "erp-secret-value"),
    ("WINGDESK_LLM_API_KEY", "sk-secret-value"),
];

#[test]
fn config_redacts_secrets_and_attributes_sources() {
    let mut file = tempfile::NamedTempFile::new().expect("temp config");
    writeln!(file, "[server]\nport = 9100").expect("write config");

    with_env(VALID_ENV, || {
        let output = config::run(Some(file.path().to_path_buf()));

        assert!(output.contains("- erp.api_key = erp-*** (source: env (WINGDESK_ERP_API_KEY))"));
        assert!(output.contains("- llm.api_key = sk-*** (source: env (WINGDESK_LLM_API_KEY))"));
        assert!(output.contains("- server.port = 9100 (source: file ("));
        assert!(output.contains("- llm.model = gpt-4o (source: default)"));
        assert!(!output.contains("secret-value"), "secrets leaked: {output}");
    });
}

#[test]
fn config_reports_legacy_alias_as_source() {
    let env: Vec<(&str, &str)> = VALID_ENV
        .iter()
        .copied()
        .filter(|(key, _)| *key != "WINGDESK_ERP_DATABASE")
        .chain([("ODOO_DB", "legacy")])
        .collect();

    with_env(&env, || {
        let output = config::run(None);
        assert!(output.contains("- erp.database = legacy (source: env (ODOO_DB))"), "{output}");
    });
}

#[test]
fn doctor_fails_and_skips_erp_check_without_config() {
    with_env(&[], || {
        let result = doctor::run(None, true);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["name"], "config_validation");
        assert_eq!(payload["checks"][0]["status"], "fail");
        assert_eq!(payload["checks"][1]["name"], "erp_login");
        assert_eq!(payload["checks"][1]["status"], "skipped");
    });
}

#[test]
fn doctor_passes_when_erp_accepts_credentials() {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let server = runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": 2})),
            )
            .mount(&server)
            .await;
        server
    });
    let erp_url = format!("{}/jsonrpc", server.uri());

    let mut env = VALID_ENV.to_vec();
    env.retain(|(key, _)| *key != "WINGDESK_ERP_URL");
    env.push(("WINGDESK_ERP_URL", erp_url.as_str()));

    with_env(&env, || {
        let result = doctor::run(None, false);
        assert_eq!(result.exit_code, 0, "{}", result.output);
        assert!(result.output.contains("- [ok] erp_login: logged in"));
    });
}

#[test]
fn doctor_fails_when_erp_rejects_credentials() {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let server = runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": false})),
            )
            .mount(&server)
            .await;
        server
    });
    let erp_url = server.uri();

    let mut env = VALID_ENV.to_vec();
    env.retain(|(key, _)| *key != "WINGDESK_ERP_URL");
    env.push(("WINGDESK_ERP_URL", erp_url.as_str()));

    with_env(&env, || {
        let result = doctor::run(None, true);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["checks"][1]["status"], "fail");
    });
}

#[test]
fn ask_fails_fast_without_config() {
    with_env(&[], || {
        let result = ask::run(None, "quiero comprar un ala", None);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn ask_degrades_to_apology_when_the_model_is_down() {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let server = runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        server
    });
    let llm_url = server.uri();

    let mut env = VALID_ENV.to_vec();
    env.push(("WINGDESK_LLM_BASE_URL", llm_url.as_str()));

    with_env(&env, || {
        let result = ask::run(None, "quiero comprar un ala", None);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], FALLBACK_REPLY);
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "WINGDESK_ERP_URL",
        "WINGDESK_ERP_DATABASE",
        "WINGDESK_ERP_LOGIN",
        "WINGDESK_ERP_API_KEY",
        "WINGDESK_LLM_API_KEY",
        "WINGDESK_LLM_BASE_URL",
        "WINGDESK_LLM_MODEL",
        "WINGDESK_LLM_TIMEOUT_SECS",
        "WINGDESK_LLM_MAX_TOOL_ROUNDS",
        "WINGDESK_SERVER_BIND_ADDRESS",
        "WINGDESK_SERVER_PORT",
        "WINGDESK_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "WINGDESK_AGENTS_ROUTER",
        "WINGDESK_AGENTS_CONTACT_URL",
        "WINGDESK_AGENTS_MAX_MESSAGE_CHARS",
        "WINGDESK_AGENTS_BLOCKED_PHRASES",
        "WINGDESK_LOGGING_LEVEL",
        "WINGDESK_LOGGING_FORMAT",
        "WINGDESK_LOG_LEVEL",
        "WINGDESK_LOG_FORMAT",
        "ODOO_URL",
        "ODOO_DB",
        "ODOO_USER",
        "ODOO_APIKEY",
        "OPENAI_API_KEY",
        "PORT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
