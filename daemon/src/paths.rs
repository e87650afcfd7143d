/// Canonical file paths for daemon data files.
///
/// Both files live under %APPDATA%\OhMyAime\ (the working directory when
/// APPDATA is unset, e.g. on non-Windows development machines):
///   - config.toml  Optional user configuration, read at startup.
///   - status.toml  Written by the daemon whenever its status changes.
use std::path::PathBuf;

const APP_DIR_NAME: &str = "OhMyAime";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";

/// Returns the application data directory: %APPDATA%\OhMyAime\
pub fn app_data_dir() -> PathBuf {
    let base = std::env::var_os("APPDATA")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(APP_DIR_NAME)
}

/// Returns the full path to the config file: %APPDATA%\OhMyAime\config.toml
pub fn config_file_path() -> PathBuf {
    app_data_dir().join(CONFIG_FILE_NAME)
}

/// Returns the full path to the status file: %APPDATA%\OhMyAime\status.toml
pub fn status_file_path() -> PathBuf {
    app_data_dir().join(STATUS_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_ends_with_app_name() {
        let dir = app_data_dir();
        assert_eq!(dir.file_name().unwrap(), APP_DIR_NAME);
    }

    #[cfg(windows)]
    #[test]
    fn app_data_dir_is_inside_appdata() {
        let appdata = std::env::var("APPDATA").unwrap();
        assert!(app_data_dir().starts_with(&appdata));
    }

    #[test]
    fn config_file_path_has_correct_name() {
        assert_eq!(config_file_path().file_name().unwrap(), CONFIG_FILE_NAME);
    }

    #[test]
    fn config_and_status_share_same_parent_dir() {
        assert_eq!(config_file_path().parent(), status_file_path().parent());
    }
}
