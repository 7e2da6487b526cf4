use std::env;
use std::sync::{Mutex, OnceLock};

use procura_cli::commands::{migrate, seed, sweep};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("PROCURA_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_with_invalid_env() {
    with_env(&[("PROCURA_SWEEP_INTERVAL_SECS", "0")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_returns_lifecycle_stage_summary() {
    with_env(&[("PROCURA_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected deterministic seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        let open_line =
            "  - REQ-demo-open [submitted]: Freshly submitted hardware request, awaiting review";
        let approved_line = "  - REQ-demo-approved [approved]: Approved software request with one live and one withdrawn proposal";
        let rejected_line =
            "  - REQ-demo-rejected [rejected]: Rejected service request, eligible for resubmission";
        let expired_line = "  - REQ-demo-expired [expired]: Expired request with full coverage, ready for the close sweep";
        assert!(message.contains(open_line));
        assert!(message.contains(approved_line));
        assert!(message.contains(rejected_line));
        assert!(message.contains(expired_line));
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    with_env(&[("PROCURA_DATABASE_URL", "sqlite::memory:")], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["command"], "seed");
        assert_eq!(first_payload["status"], "ok");

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);
        assert_eq!(second_payload["command"], "seed");
        assert_eq!(second_payload["status"], "ok");

        assert_eq!(first_payload["message"], second_payload["message"]);
    });
}

#[test]
fn sweep_reports_counts_on_an_empty_database() {
    with_env(&[("PROCURA_DATABASE_URL", "sqlite::memory:")], || {
        let result = sweep::run();
        assert_eq!(result.exit_code, 0, "expected sweep over empty database to succeed");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "sweep");
        assert_eq!(payload["status"], "ok");
        assert_eq!(
            payload["message"],
            "sweep pass complete: 0 expired, 0 closed fulfilled, 0 closed unfulfilled"
        );
    });
}

#[test]
fn sweep_returns_config_failure_with_invalid_env() {
    with_env(&[("PROCURA_SERVER_PORT", "not-a-port")], || {
        let result = sweep::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "sweep");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "PROCURA_CONFIG",
        "PROCURA_DATABASE_URL",
        "PROCURA_LOG_LEVEL",
        "PROCURA_LOG_FORMAT",
        "PROCURA_SERVER_PORT",
        "PROCURA_SCHEDULER_ENABLED",
        "PROCURA_SWEEP_INTERVAL_SECS",
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
