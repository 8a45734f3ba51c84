use std::path::{Path, PathBuf};

use {
    serde_json::Value,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::VoteGateConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "votegate.toml",
    "votegate.yaml",
    "votegate.yml",
    "votegate.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<VoteGateConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./votegate.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/votegate/votegate.{toml,yaml,yml,json}` (user-global)
///
/// Returns `VoteGateConfig::default()` if no config file is found or it fails
/// to parse.
pub fn discover_and_load() -> VoteGateConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    VoteGateConfig::default()
}

/// Load an explicit config file, or discover one, then apply environment
/// overrides. An explicit path that cannot be read is an error.
pub fn load(path: Option<&Path>) -> Result<VoteGateConfig> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => discover_and_load(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Apply `BOT_TOKEN`, `OWNER_ID`, `DATABASE_URL`, `SUPPORT_GROUP_URL` and
/// `SUPPORT_CHAT_URL` from the process environment.
pub fn apply_env_overrides(config: &mut VoteGateConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut VoteGateConfig, lookup: impl Fn(&str) -> Option<String>) {
    let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(url) = lookup("DATABASE_URL") {
        config.database.url = url;
    }
    if let Some(token) = lookup("BOT_TOKEN") {
        config.set_telegram_field("token", Value::String(token));
    }
    if let Some(raw) = lookup("OWNER_ID") {
        match raw.trim().parse::<i64>() {
            Ok(id) => config.set_telegram_field("owner_id", Value::from(id)),
            Err(e) => warn!(value = %raw, error = %e, "ignoring invalid OWNER_ID"),
        }
    }
    for (var, key) in [
        ("SUPPORT_GROUP_URL", "support_group_url"),
        ("SUPPORT_CHAT_URL", "support_chat_url"),
    ] {
        if let Some(url) = lookup(var) {
            config.set_telegram_field(key, Value::String(url));
        }
    }
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    // Project-local
    if let Some(path) = find_in(Path::new(".")) {
        return Some(path);
    }

    // User-global: ~/.config/votegate/
    config_dir().and_then(|dir| find_in(&dir))
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/votegate/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "votegate").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> Result<VoteGateConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::UnsupportedFormat {
            extension: ext.to_string(),
        }),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json, std::collections::HashMap};

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_each_format() {
        let dir = tempfile::tempdir().unwrap();
        let toml = write(
            dir.path(),
            "votegate.toml",
            "[database]\nurl = \"sqlite::memory:\"\n",
        );
        let yaml = write(
            dir.path(),
            "votegate.yaml",
            "campaigns:\n  membership_timeout_secs: 9\n",
        );
        let json = write(
            dir.path(),
            "votegate.json",
            r#"{"telegram": {"token": "123:ABC", "owner_id": 5}}"#,
        );

        assert_eq!(load_config(&toml).unwrap().database.url, "sqlite::memory:");
        assert_eq!(
            load_config(&yaml).unwrap().campaigns.membership_timeout_secs,
            9
        );
        let cfg = load_config(&json).unwrap();
        assert_eq!(cfg.telegram["owner_id"], json!(5));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "votegate.ini", "x=1");
        assert!(matches!(
            load_config(&path),
            Err(Error::UnsupportedFormat { extension }) if extension == "ini"
        ));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }

    #[test]
    fn toml_is_preferred_over_json() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "votegate.json", "{}");
        write(dir.path(), "votegate.toml", "");
        assert_eq!(
            find_in(dir.path()).unwrap().file_name().unwrap(),
            "votegate.toml"
        );
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut cfg: VoteGateConfig = toml::from_str(
            r#"
            [database]
            url = "sqlite://file.db"

            [telegram]
            token = "from-file"
            link_host = "t.me"
            "#,
        )
        .unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("BOT_TOKEN", "from-env"),
            ("OWNER_ID", "42"),
            ("DATABASE_URL", "sqlite://env.db"),
            ("SUPPORT_CHAT_URL", "https://t.me/chat"),
            ("SUPPORT_GROUP_URL", "  "),
        ]);

        apply_env_overrides_with(&mut cfg, |name| env.get(name).map(|v| v.to_string()));

        assert_eq!(cfg.database.url, "sqlite://env.db");
        assert_eq!(cfg.telegram["token"], json!("from-env"));
        assert_eq!(cfg.telegram["owner_id"], json!(42));
        assert_eq!(cfg.telegram["link_host"], json!("t.me"));
        assert_eq!(cfg.telegram["support_chat_url"], json!("https://t.me/chat"));
        assert!(cfg.telegram.get("support_group_url").is_none());
    }

    #[test]
    fn invalid_owner_id_is_ignored() {
        let mut cfg = VoteGateConfig::default();
        apply_env_overrides_with(&mut cfg, |name| {
            (name == "OWNER_ID").then(|| "not-a-number".to_string())
        });
        assert!(cfg.telegram.get("owner_id").is_none());
    }
}
