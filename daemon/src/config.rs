use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PROCESS_NAME: &str = "Sinmai.exe";
/// Two-level subpath searched for above the target executable.
pub const DEFAULT_RELATIVE_SUFFIX: &str = "AMDaemon/DEVICE";
pub const DEFAULT_IDENTIFIER_FILE: &str = "aime.txt";
pub const DEFAULT_KEY: &str = "enter";
pub const DEFAULT_HOLD_MS: u64 = 500;
pub const MIN_HOLD_MS: u64 = 10;
pub const MAX_HOLD_MS: u64 = 5000;

/// Root configuration structure. Deserialized from %APPDATA%\OhMyAime\config.toml.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub input: InputConfig,
}

/// Where the device folder is and what goes into it.
#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    /// Executable file name of the game (e.g. "Sinmai.exe"), matched exactly.
    #[serde(default = "default_process_name")]
    pub process_name: String,
    /// Folder searched for above the executable. `/` and `\` both separate components.
    #[serde(default = "default_relative_suffix")]
    pub relative_suffix: String,
    /// File written inside the device folder.
    #[serde(default = "default_identifier_file")]
    pub identifier_file: String,
    /// Exit when the folder cannot be found at startup. When false the daemon
    /// keeps running against a best-effort path and reports the problem in status.
    #[serde(default = "default_strict")]
    pub strict: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            process_name: DEFAULT_PROCESS_NAME.to_string(),
            relative_suffix: DEFAULT_RELATIVE_SUFFIX.to_string(),
            identifier_file: DEFAULT_IDENTIFIER_FILE.to_string(),
            strict: true,
        }
    }
}

/// The key pressed after each identifier write.
#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// Key name understood by [`crate::input::virtual_key_for`].
    #[serde(default = "default_key")]
    pub key: String,
    /// Time between key down and key up. Clamped to [10, 5000] ms.
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_KEY.to_string(),
            hold_ms: DEFAULT_HOLD_MS,
        }
    }
}

impl InputConfig {
    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms.clamp(MIN_HOLD_MS, MAX_HOLD_MS))
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn default_process_name() -> String {
    DEFAULT_PROCESS_NAME.to_string()
}

fn default_relative_suffix() -> String {
    DEFAULT_RELATIVE_SUFFIX.to_string()
}

fn default_identifier_file() -> String {
    DEFAULT_IDENTIFIER_FILE.to_string()
}

fn default_strict() -> bool {
    true
}

fn default_key() -> String {
    DEFAULT_KEY.to_string()
}

fn default_hold_ms() -> u64 {
    DEFAULT_HOLD_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn target_config_default_values() {
        let t = TargetConfig::default();
        assert_eq!(t.process_name, DEFAULT_PROCESS_NAME);
        assert_eq!(t.relative_suffix, DEFAULT_RELATIVE_SUFFIX);
        assert_eq!(t.identifier_file, DEFAULT_IDENTIFIER_FILE);
        assert!(t.strict);
    }

    #[test]
    fn input_config_default_values() {
        let i = InputConfig::default();
        assert_eq!(i.key, DEFAULT_KEY);
        assert_eq!(i.hold(), Duration::from_millis(DEFAULT_HOLD_MS));
    }

    // ── hold ──────────────────────────────────────────────────────────────────

    #[test]
    fn hold_clamps_below_min() {
        let i = InputConfig { key: DEFAULT_KEY.to_string(), hold_ms: 0 };
        assert_eq!(i.hold(), Duration::from_millis(MIN_HOLD_MS));
    }

    #[test]
    fn hold_clamps_above_max() {
        let i = InputConfig { key: DEFAULT_KEY.to_string(), hold_ms: 60_000 };
        assert_eq!(i.hold(), Duration::from_millis(MAX_HOLD_MS));
    }

    // ── load_or_default ───────────────────────────────────────────────────────

    #[test]
    fn load_or_default_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.toml");
        let config = load_or_default(&path).unwrap();
        assert_eq!(config.target.process_name, DEFAULT_PROCESS_NAME);
        assert_eq!(config.input.hold_ms, DEFAULT_HOLD_MS);
    }

    #[test]
    fn load_or_default_parses_valid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[target]
process_name = "Game.exe"
relative_suffix = 'Daemon\DEV'
identifier_file = "card.txt"
strict = false

[input]
key = "F5"
hold_ms = 250
"#,
        )
        .unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.target.process_name, "Game.exe");
        assert_eq!(config.target.relative_suffix, r"Daemon\DEV");
        assert_eq!(config.target.identifier_file, "card.txt");
        assert!(!config.target.strict);
        assert_eq!(config.input.key, "F5");
        assert_eq!(config.input.hold(), Duration::from_millis(250));
    }

    #[test]
    fn load_or_default_partial_toml_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[input]\nhold_ms = 100\n").unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.input.hold_ms, 100);
        assert_eq!(config.input.key, DEFAULT_KEY);
        assert_eq!(config.target.process_name, DEFAULT_PROCESS_NAME);
        assert!(config.target.strict);
    }

    #[test]
    fn load_or_default_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not valid toml ][[[").unwrap();
        assert!(load_or_default(&path).is_err());
    }
}
