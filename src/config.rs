use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::attribution::AutomationRule;
use crate::error::{Error, Result};

pub const DEFAULT_SITE_DOMAIN: &str = "devtoolbox.dedyn.io";
pub const DEFAULT_LOG_FILE: &str = "/var/log/nginx/web-ceo.access.log";
pub const DEFAULT_CAMPAIGN: &str = "crosspromo-top-organic";

/// Analyzer settings. Every field has a built-in default; a TOML file may
/// override any subset of them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub site_domain: String,
    pub log_files: Vec<PathBuf>,
    /// How many rotated generations (`.1`, `.2.gz`, ...) to read per log file.
    pub rotated_generations: usize,
    pub campaign: String,
    pub redirect_prefix: String,
    pub lookback_minutes: i64,
    pub history_cap: usize,
    pub workers: usize,
    pub automation: AutomationRule,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            site_domain: DEFAULT_SITE_DOMAIN.to_string(),
            log_files: vec![PathBuf::from(DEFAULT_LOG_FILE)],
            rotated_generations: 2,
            campaign: DEFAULT_CAMPAIGN.to_string(),
            redirect_prefix: "/go".to_string(),
            lookback_minutes: 30,
            history_cap: 200,
            workers: 4,
            automation: AutomationRule::default(),
        }
    }
}

impl Settings {
    pub fn from_toml(path: &Path, contents: &str) -> Result<Settings> {
        toml::from_str(contents).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Settings> {
        let contents = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Settings::from_toml(path, &contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let settings = Settings::from_toml(Path::new("empty.toml"), "").unwrap();
        assert_eq!(Settings::default(), settings);
    }

    #[test]
    fn partial_override() {
        let contents = r#"
site_domain = "example.org"
log_files = ["/tmp/a.log", "/tmp/b.log"]

[automation]
datacenter_prefixes = ["10.9."]
"#;
        let settings = Settings::from_toml(Path::new("x.toml"), contents).unwrap();
        assert_eq!("example.org", settings.site_domain);
        assert_eq!(2, settings.log_files.len());
        assert_eq!(DEFAULT_CAMPAIGN, settings.campaign);
        assert_eq!(vec!["10.9.".to_string()], settings.automation.datacenter_prefixes);
        assert!(!settings.automation.spoofed_user_agents.is_empty());
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        match Settings::from_toml(Path::new("bad.toml"), "site_domain = [") {
            Err(Error::Config { path, .. }) => assert_eq!(Path::new("bad.toml"), path),
            other => panic!("unexpected {:?}", other),
        }
    }
}
