use log::{debug, info, warn};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{Error, Result};

pub const DEFAULT_API_PATH: &str = "/rest/api/latest/issue/";
pub const DEFAULT_AUTH_PATH: &str = "/rest/auth/latest/session";
const CONFIG_FILE_NAME: &str = ".jiramailrc";

/// Settings read from `~/.jiramailrc` (or the file given with `-c`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Prefix of the issue endpoint; the ticket key and `/comment` are appended.
    pub api_path: String,
    /// Path of the session login endpoint.
    pub auth_path: String,
    /// Base URL of the Jira server, always with a scheme.
    pub host: Option<String>,
    /// The Jira inbound address whose presence in To/Cc/Bcc triggers an update.
    pub tracked_address: Option<String>,
    pub password: Option<String>,
    /// User to comment as. Derived from the message's From header when unset.
    pub sender: Option<String>,
    pub dry_run: bool,
    pub swallow: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_path: DEFAULT_API_PATH.to_string(),
            auth_path: DEFAULT_AUTH_PATH.to_string(),
            host: None,
            tracked_address: None,
            password: None,
            sender: None,
            dry_run: false,
            swallow: false,
        }
    }
}

static COMMENT: OnceLock<Regex> = OnceLock::new();
static FIELD: OnceLock<Regex> = OnceLock::new();
static SCHEME: OnceLock<Regex> = OnceLock::new();

fn comment_re() -> &'static Regex {
    COMMENT.get_or_init(|| Regex::new(r"#.*").expect("Invalid regex"))
}

fn field_re() -> &'static Regex {
    FIELD.get_or_init(|| Regex::new(r"^\s*([^\s=]+)\s*=\s*(.*)$").expect("Invalid regex"))
}

fn scheme_re() -> &'static Regex {
    SCHEME.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").expect("Invalid regex"))
}

pub fn default_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_FILE_NAME)
}

impl Config {
    /// Load the config file at `path`, refusing files readable by anyone but the owner.
    pub fn load(path: &Path) -> Result<Self> {
        info!("[config] reading configuration from {}", path.display());

        let meta = fs::metadata(path).map_err(|source| Error::ConfigStat {
            path: path.to_path_buf(),
            source,
        })?;
        check_permissions(path, &meta)?;

        let content = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&content))
    }

    /// Parse `KEY = value` lines. Anything after `#` is ignored.
    pub fn parse(content: &str) -> Self {
        let mut config = Self::default();
        for line in content.lines() {
            let line = comment_re().replace(line, "");
            let Some(caps) = field_re().captures(&line) else {
                continue;
            };
            let key = &caps[1];
            let value = caps[2].trim_end();
            config.set(key, value);
        }
        config
    }

    fn set(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            debug!("[config] {} has no value, keeping default", key);
            return;
        }
        match key.to_ascii_uppercase().as_str() {
            "API" => self.api_path = value.to_string(),
            "AUTH" => self.auth_path = value.to_string(),
            "HOST" => self.host = Some(normalize_host(value)),
            "JIRA" => self.tracked_address = Some(value.to_string()),
            "JIRA_PASS" => self.password = Some(value.to_string()),
            "FROM" => self.sender = Some(value.to_string()),
            "DONT" => self.dry_run = parse_bool(value),
            "SWALLOW" => self.swallow = parse_bool(value),
            _ => {
                warn!("[config] ignoring unknown setting {}", key);
                return;
            }
        }
        // never log the password itself
        if key.eq_ignore_ascii_case("JIRA_PASS") {
            debug!("[config] JIRA_PASS=<set>");
        } else {
            debug!("[config] {}={}", key, value);
        }
    }
}

#[cfg(unix)]
fn check_permissions(path: &Path, meta: &fs::Metadata) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = meta.permissions().mode() & 0o7777;
    if mode & !0o600 != 0 {
        return Err(Error::UnsafePermissions {
            path: path.to_path_buf(),
            mode,
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_permissions(path: &Path, _meta: &fs::Metadata) -> Result<()> {
    debug!("[config] skipping permission check for {}", path.display());
    Ok(())
}

fn normalize_host(value: &str) -> String {
    if scheme_re().is_match(value) {
        value.to_string()
    } else {
        format!("https://{}", value)
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "yes" | "true" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config_file(content: &[u8], mode: u32) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(file.path(), fs::Permissions::from_mode(mode)).unwrap();
        }
        file
    }

    #[test]
    fn defaults_point_at_latest_rest_api() {
        let config = Config::default();
        assert_eq!(config.api_path, "/rest/api/latest/issue/");
        assert_eq!(config.auth_path, "/rest/auth/latest/session");
        assert!(config.host.is_none());
        assert!(!config.dry_run);
        assert!(!config.swallow);
    }

    #[test]
    fn host_without_scheme_gets_https() {
        let config = Config::parse("HOST=example.com\n");
        assert_eq!(config.host.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn host_with_scheme_is_kept() {
        let config = Config::parse("HOST = http://jira.local:8080\n");
        assert_eq!(config.host.as_deref(), Some("http://jira.local:8080"));
    }

    #[test]
    fn comments_and_trailing_whitespace_are_stripped() {
        let content = "# jiramail settings\n\
                       JIRA = jira@example.com   # inbound address\n\
                       FROM = alice  \t\n\
                       \n\
                       not a setting\n";
        let config = Config::parse(content);
        assert_eq!(config.tracked_address.as_deref(), Some("jira@example.com"));
        assert_eq!(config.sender.as_deref(), Some("alice"));
    }

    #[test]
    fn all_known_keys_are_recognized() {
        let content = "API=/rest/api/2/issue/\n\
                       AUTH=/login\n\
                       JIRA_PASS=hunter2\n\
                       DONT=yes\n\
                       SWALLOW=1\n";
        let config = Config::parse(content);
        assert_eq!(config.api_path, "/rest/api/2/issue/");
        assert_eq!(config.auth_path, "/login");
        assert_eq!(config.password.as_deref(), Some("hunter2"));
        assert!(config.dry_run);
        assert!(config.swallow);
    }

    #[test]
    fn unknown_keys_and_empty_values_leave_defaults() {
        let config = Config::parse("COLOR=blue\nAPI=\nDONT=no\n");
        assert_eq!(config, Config::default());
    }

    #[cfg(unix)]
    #[test]
    fn load_rejects_group_readable_file() {
        let file = config_file(b"HOST=example.com\n", 0o644);
        match Config::load(file.path()) {
            Err(Error::UnsafePermissions { mode, .. }) => assert_eq!(mode, 0o644),
            other => panic!("expected UnsafePermissions, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn load_rejects_unsafe_file_before_reading_it() {
        // not valid UTF-8, so reading it would fail with ConfigRead instead
        let file = config_file(&[0xff, 0xfe, 0x00, 0x80], 0o640);
        assert!(matches!(
            Config::load(file.path()),
            Err(Error::UnsafePermissions { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn load_accepts_owner_only_file() {
        let file = config_file(b"HOST=example.com\n", 0o600);
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.host.as_deref(), Some("https://example.com"));
    }

    #[cfg(unix)]
    #[test]
    fn load_accepts_read_only_file() {
        let file = config_file(b"JIRA=jira@example.com\n", 0o400);
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.tracked_address.as_deref(), Some("jira@example.com"));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, Error::ConfigStat { .. }));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn default_path_ends_with_rc_file() {
        assert!(default_path().ends_with(".jiramailrc"));
    }
}
