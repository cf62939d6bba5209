//! Module for searching for fusionlink config files

use std::path::PathBuf;

use crate::constants::APP_NAME;

/// Base system fallback path to use if one cannot be found with XDG
const FALLBACK_CONFIG_PATH: &str = "/etc/fusionlink";

/// Name of the configuration file in each search path
pub const CONFIG_FILE: &str = "config.yaml";

/// Returns a list of paths in load order to find the configuration file.
/// E.g. ["./config.yaml", "~/.config/fusionlink/config.yaml", "/etc/fusionlink/config.yaml"]
pub fn get_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(format!("./{CONFIG_FILE}"))];

    match xdg::BaseDirectories::with_prefix(APP_NAME) {
        Ok(base_dirs) => {
            paths.push(base_dirs.get_config_file(CONFIG_FILE));
            for dir in base_dirs.get_config_dirs() {
                paths.push(dir.join(APP_NAME).join(CONFIG_FILE));
            }
        }
        Err(e) => {
            log::warn!("Unable to determine config base path: {e:?}. Using fallback path.");
        }
    }

    paths.push(PathBuf::from(FALLBACK_CONFIG_PATH).join(CONFIG_FILE));
    paths
}

/// Returns the first configuration file that exists
pub fn find_config_file() -> Option<PathBuf> {
    get_config_paths()
        .into_iter()
        .find(|path| path.exists() && path.is_file())
}
