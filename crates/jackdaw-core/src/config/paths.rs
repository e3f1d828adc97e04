//! Default locations of project files

use std::path::PathBuf;

/// File name of the project settings
pub const PROJECT_CONFIG_FILE: &str = "jackdaw-project.yaml";

/// `~/.config/jackdaw`, or `./jackdaw` when no config directory is known
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jackdaw")
}

/// `<config dir>/jackdaw-project.yaml`
pub fn default_config_path() -> PathBuf {
    default_config_dir().join(PROJECT_CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_layout() {
        let path = default_config_path();
        assert!(path.ends_with(PROJECT_CONFIG_FILE));
        assert!(path.parent().unwrap().ends_with("jackdaw"));
    }
}
