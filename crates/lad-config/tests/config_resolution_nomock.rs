//! No-mock configuration resolution + loading tests.
//!
//! Covers:
//! - Resolution order (CLI > LAD_CONFIG > LAD_CONFIG_DIR)
//! - JSON vs TOML selection by extension
//! - Validation failures surfacing from `LadConfig::load`

use lad_config::resolve::{resolve_config, ConfigSource, ENV_CONFIG_DIR, ENV_CONFIG_PATH};
use lad_config::{DeltaStart, LadConfig, ValidationError};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

struct EnvGuard {
    keys: Vec<String>,
    saved: Vec<Option<String>>,
}

impl EnvGuard {
    fn new(keys: &[&str]) -> Self {
        let saved = keys.iter().map(|key| env::var(key).ok()).collect();
        for key in keys {
            env::remove_var(key);
        }
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            saved,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (idx, key) in self.keys.iter().enumerate() {
            match self.saved.get(idx).and_then(|v| v.as_ref()) {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }
}

fn with_env_lock<T>(f: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    f()
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, content).expect("write config");
}

#[test]
fn test_cli_path_wins_over_env() {
    with_env_lock(|| {
        let _env = EnvGuard::new(&[ENV_CONFIG_PATH, ENV_CONFIG_DIR]);
        let tmp = TempDir::new().unwrap();
        let cli = tmp.path().join("cli.json");
        let from_env = tmp.path().join("env.json");
        write(&cli, "{}");
        write(&from_env, "{}");
        env::set_var(ENV_CONFIG_PATH, &from_env);

        let resolved = resolve_config(Some(&cli));
        assert_eq!(resolved.source, ConfigSource::CliArgument);
        assert_eq!(resolved.path.as_deref(), Some(cli.as_path()));
    });
}

#[test]
fn test_missing_cli_path_falls_through_to_env() {
    with_env_lock(|| {
        let _env = EnvGuard::new(&[ENV_CONFIG_PATH, ENV_CONFIG_DIR]);
        let tmp = TempDir::new().unwrap();
        let from_env = tmp.path().join("env.toml");
        write(&from_env, "");
        env::set_var(ENV_CONFIG_PATH, &from_env);

        let resolved = resolve_config(Some(&tmp.path().join("absent.json")));
        assert_eq!(resolved.source, ConfigSource::Environment);
        assert_eq!(resolved.path.as_deref(), Some(from_env.as_path()));
    });
}

#[test]
fn test_config_dir_probe() {
    with_env_lock(|| {
        let _env = EnvGuard::new(&[ENV_CONFIG_PATH, ENV_CONFIG_DIR]);
        let tmp = TempDir::new().unwrap();
        write(
            &tmp.path().join("lad.toml"),
            "[store]\nleaf_max_count = 7\ndelta_start = \"empty\"\n",
        );
        env::set_var(ENV_CONFIG_DIR, tmp.path());

        let (config, resolved) = LadConfig::load(None).expect("load from config dir");
        assert_eq!(resolved.source, ConfigSource::Environment);
        assert_eq!(config.store.leaf_max_count, 7);
        assert_eq!(config.store.delta_start, DeltaStart::Empty);
    });
}

#[test]
fn test_load_rejects_invalid_file() {
    with_env_lock(|| {
        let _env = EnvGuard::new(&[ENV_CONFIG_PATH, ENV_CONFIG_DIR]);
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.json");
        write(&path, r#"{"reaper": {"memory_threshold_percent": 0}}"#);

        let err = LadConfig::load(Some(&path)).expect_err("threshold 0 must fail");
        assert!(matches!(err, ValidationError::InvalidValue { ref field, .. } if field == "reaper.memory_threshold_percent"));
    });
}

#[test]
fn test_load_reports_parse_errors() {
    with_env_lock(|| {
        let _env = EnvGuard::new(&[ENV_CONFIG_PATH, ENV_CONFIG_DIR]);
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lad.toml");
        write(&path, "[store\nleaf_max_count = ");

        let err = LadConfig::load(Some(&path)).expect_err("broken TOML must fail");
        assert_eq!(err.code(), 52);
    });
}
