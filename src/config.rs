use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use logcheck_logs::RulesError;
use logcheck_report::{DEFAULT_MAX_REPORT_SIZE, MailEnvelope, SmtpSettings};

/// Name of the rules directory looked up next to the executable
pub const RULES_DIR_NAME: &str = "rules";

pub const DEFAULT_REGION: &str = "eu-west-3";
pub const DEFAULT_INGESTION_DELAY_SECS: u64 = 120;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("log_group is mandatory")]
    MissingLogGroup,
}

/// Application configuration, read once at startup
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory of rule files, `<exe dir>/rules` when unset
    pub rules_dir: Option<PathBuf>,
    pub images_to_ignore: Vec<String>,
    pub container_names_to_ignore: Vec<String>,

    pub log_group: String,
    pub aws_region: Option<String>,

    /// `debug`, `info`, `warn` or `error`
    pub debug_level: Option<String>,

    pub smtp: SmtpConfig,
    pub mailgun: MailgunConfig,
    pub mail: MailConfig,

    /// Seconds to wait after the hour so late events are ingested
    pub ingestion_delay_secs: Option<u64>,

    /// Lines buffered between the aggregation and the report writer
    pub channel_capacity: Option<usize>,
}

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub login: String,
    pub password: String,
    pub tls: bool,

    /// Bytes per report mail
    pub max_report_size: Option<usize>,
}

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct MailgunConfig {
    pub domain: String,
    pub api_key: String,
    pub base_url: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub from_email: String,
    pub from_display: String,
    pub send_to: String,
    pub subject: String,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if config.log_group.is_empty() {
            return Err(ConfigError::MissingLogGroup);
        }
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn is_smtp_configured(&self) -> bool {
        let smtp = &self.smtp;
        !smtp.server.is_empty() && smtp.port != 0 && !smtp.login.is_empty() && !smtp.password.is_empty()
    }

    pub fn is_mailgun_configured(&self) -> bool {
        !self.mailgun.domain.is_empty() && !self.mailgun.api_key.is_empty()
    }

    pub fn region(&self) -> String {
        self.aws_region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    pub fn ingestion_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ingestion_delay_secs.unwrap_or(DEFAULT_INGESTION_DELAY_SECS))
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn max_report_size(&self) -> usize {
        self.smtp.max_report_size.unwrap_or(DEFAULT_MAX_REPORT_SIZE)
    }

    /// Configured rules directory, or `rules` next to the executable
    pub fn rules_dir(&self) -> Result<PathBuf, RulesError> {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        resolve_rules_dir(self.rules_dir.as_deref(), exe_dir.as_deref())
    }

    pub fn smtp_settings(&self) -> SmtpSettings {
        SmtpSettings {
            server: self.smtp.server.clone(),
            port: self.smtp.port,
            login: self.smtp.login.clone(),
            password: self.smtp.password.clone(),
            tls: self.smtp.tls,
        }
    }

    pub fn envelope(&self) -> MailEnvelope {
        let subject = if self.mail.subject.is_empty() {
            format!("Logs of {}", self.log_group)
        } else {
            self.mail.subject.clone()
        };
        MailEnvelope {
            from: self.mail.from_email.clone(),
            from_display: self.mail.from_display.clone(),
            subject,
            to: self.mail.send_to.clone(),
        }
    }
}

/// An explicit directory wins, even when it does not exist yet: loading
/// reports it then. The fallback must exist.
pub fn resolve_rules_dir(configured: Option<&Path>, exe_dir: Option<&Path>) -> Result<PathBuf, RulesError> {
    if let Some(dir) = configured {
        if dir.as_os_str().is_empty() {
            return Err(RulesError::NoRulesDir);
        }
        return Ok(dir.to_path_buf());
    }

    let exe_dir = exe_dir.ok_or(RulesError::NoRulesDir)?;
    let candidate = exe_dir.join(RULES_DIR_NAME);
    if candidate.is_dir() {
        Ok(candidate)
    } else {
        Err(RulesError::RulesDirNotFound(candidate))
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("login", &self.login)
            .field("tls", &self.tls)
            .field("max_report_size", &self.max_report_size)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for MailgunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailgunConfig")
            .field("domain", &self.domain)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        rules_dir = "/etc/awslogcheck/rules"
        images_to_ignore = ["^envoyproxy/"]
        container_names_to_ignore = ["^istio-proxy$", "sidecar"]
        log_group = "/aws/containerinsights/prod/application"
        aws_region = "eu-west-1"
        debug_level = "debug"
        ingestion_delay_secs = 60

        [smtp]
        server = "smtp.example.com"
        port = 587
        login = "user"
        password = "secret"
        tls = true
        max_report_size = 1048576

        [mailgun]
        domain = "mg.example.com"
        api_key = "key-123"

        [mail]
        from_email = "alerts@example.com"
        send_to = "ops@example.com"
        subject = "Hourly log report"
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = AppConfig::parse(FULL).unwrap();
        assert_eq!(config.rules_dir, Some(PathBuf::from("/etc/awslogcheck/rules")));
        assert_eq!(config.images_to_ignore, vec!["^envoyproxy/"]);
        assert_eq!(config.container_names_to_ignore.len(), 2);
        assert_eq!(config.region(), "eu-west-1");
        assert_eq!(config.ingestion_delay().as_secs(), 60);
        assert_eq!(config.channel_capacity(), DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.max_report_size(), 1_048_576);
        assert!(config.is_smtp_configured());
        assert!(config.is_mailgun_configured());
        assert_eq!(config.envelope().subject, "Hourly log report");
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::parse(r#"log_group = "/eks/prod""#).unwrap();
        assert_eq!(config.region(), DEFAULT_REGION);
        assert_eq!(config.ingestion_delay().as_secs(), DEFAULT_INGESTION_DELAY_SECS);
        assert_eq!(config.max_report_size(), DEFAULT_MAX_REPORT_SIZE);
        assert!(!config.is_smtp_configured());
        assert!(!config.is_mailgun_configured());
        assert_eq!(config.envelope().subject, "Logs of /eks/prod");
    }

    #[test]
    fn test_smtp_needs_every_field() {
        let mut config = AppConfig::parse(FULL).unwrap();
        config.smtp.password.clear();
        assert!(!config.is_smtp_configured());
    }

    #[test]
    fn test_load_requires_log_group() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "images_to_ignore = []\n").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::MissingLogGroup)));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "log_group = [").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            AppConfig::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_secrets_are_not_debug_printed() {
        let config = AppConfig::parse(FULL).unwrap();
        let printed = format!("{config:?}");
        assert!(!printed.contains("secret"));
        assert!(!printed.contains("key-123"));
    }

    #[test]
    fn test_resolve_rules_dir() {
        let exe_dir = tempfile::tempdir().unwrap();

        let explicit = resolve_rules_dir(Some(Path::new("/srv/rules")), Some(exe_dir.path())).unwrap();
        assert_eq!(explicit, PathBuf::from("/srv/rules"));

        assert!(matches!(
            resolve_rules_dir(Some(Path::new("")), Some(exe_dir.path())),
            Err(RulesError::NoRulesDir)
        ));
        assert!(matches!(
            resolve_rules_dir(None, Some(exe_dir.path())),
            Err(RulesError::RulesDirNotFound(_))
        ));

        std::fs::create_dir(exe_dir.path().join(RULES_DIR_NAME)).unwrap();
        let fallback = resolve_rules_dir(None, Some(exe_dir.path())).unwrap();
        assert_eq!(fallback, exe_dir.path().join(RULES_DIR_NAME));
    }
}
