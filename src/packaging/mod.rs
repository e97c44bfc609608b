//! Package manager command generation
//!
//! Produces the primitive install/update/upgrade/add-repository strings and
//! proxy configuration contents for each supported package manager. Knows
//! nothing about bootstrap documents; the cloudinit compilers decide where
//! these strings end up.

pub mod apt;
pub mod yum;

use serde::{Deserialize, Serialize};

/// A package repository entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSource {
    /// Repository line or URL (`ppa:` shorthands are accepted on apt)
    #[serde(rename = "source", alias = "url")]
    pub url: String,
    /// ASCII-armoured signing key, empty when the repository is unsigned
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
}

impl PackageSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key: String::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Shorthand repository aliases fetch their own keys.
    pub fn is_alias(&self) -> bool {
        self.url.starts_with("ppa:")
    }
}

/// Pin/priority file content keyed by its install path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagePreference {
    pub path: String,
    pub content: String,
}

impl PackagePreference {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Proxy endpoints used by the package manager
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ftp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_proxy: Option<String>,
}

impl ProxySettings {
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            http: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.http.is_none() && self.https.is_none() && self.ftp.is_none()
    }

    /// The single URL a one-proxy consumer should use (http wins).
    pub fn primary(&self) -> Option<&str> {
        self.http.as_deref().or(self.https.as_deref())
    }
}

/// Command syntax of one package manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageManager {
    /// apt-get on Debian/Ubuntu; the series drives cloud-archive routing
    Apt { series: Option<String> },
    /// yum on CentOS/RHEL
    Yum,
}

impl PackageManager {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Apt { .. } => "apt",
            Self::Yum => "yum",
        }
    }

    /// Install command for a single package argument (may hold several
    /// tokens, e.g. a coalesced `--target-release` argument).
    pub fn install_command(&self, package: &str) -> String {
        match self {
            Self::Apt { .. } => format!("{} install {}", apt::APT_GET, package),
            Self::Yum => format!("{} install {}", yum::YUM, package),
        }
    }

    pub fn update_command(&self) -> String {
        match self {
            Self::Apt { .. } => format!("{} update", apt::APT_GET),
            Self::Yum => format!("{} makecache", yum::YUM),
        }
    }

    pub fn upgrade_command(&self) -> String {
        match self {
            Self::Apt { .. } => format!("{} upgrade", apt::APT_GET),
            Self::Yum => format!("{} update", yum::YUM),
        }
    }

    pub fn add_repository_command(&self, url: &str) -> Result<String, shlex::QuoteError> {
        let quoted = shlex::try_quote(url)?;
        Ok(match self {
            Self::Apt { .. } => format!("add-apt-repository --yes {}", quoted),
            Self::Yum => format!("yum-config-manager --add-repo {}", quoted),
        })
    }

    /// Contents of the package manager's proxy configuration
    pub fn proxy_config_contents(&self, settings: &ProxySettings) -> String {
        match self {
            Self::Apt { .. } => apt::proxy_config_contents(settings),
            Self::Yum => yum::proxy_config_contents(settings),
        }
    }

    pub fn proxy_config_file(&self) -> &'static str {
        match self {
            Self::Apt { .. } => apt::PROXY_CONFIG_FILE,
            Self::Yum => yum::CONFIG_FILE,
        }
    }

    /// Whether `name` must be requested from the cloud archive channel
    pub fn is_cloud_archive_package(&self, name: &str) -> bool {
        match self {
            Self::Apt { series } => {
                apt::cloud_tools_pocket(series.as_deref()).is_some()
                    && apt::CLOUD_ARCHIVE_PACKAGES.contains(&name)
            }
            Self::Yum => false,
        }
    }

    /// Package tokens requesting `name` from the cloud archive channel.
    ///
    /// Old first-boot agents only honour the channel when it arrives as the
    /// three separate tokens `--target-release <pocket> <name>`.
    pub fn apply_cloud_archive_target(&self, name: &str) -> Vec<String> {
        match self {
            Self::Apt { series } => match apt::cloud_tools_pocket(series.as_deref()) {
                Some(pocket) => vec![
                    "--target-release".to_string(),
                    pocket.to_string(),
                    name.to_string(),
                ],
                None => vec![name.to_string()],
            },
            Self::Yum => vec![name.to_string()],
        }
    }

    /// Baseline packages every provisioned machine receives
    pub fn default_packages(&self) -> &'static [&'static str] {
        match self {
            Self::Apt { .. } => apt::DEFAULT_PACKAGES,
            Self::Yum => yum::DEFAULT_PACKAGES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn precise() -> PackageManager {
        PackageManager::Apt {
            series: Some("precise".to_string()),
        }
    }

    #[test]
    fn test_install_commands() {
        assert_eq!(
            precise().install_command("curl"),
            "apt-get --option=Dpkg::Options::=--force-confold \
             --option=Dpkg::options::=--force-unsafe-io --assume-yes --quiet install curl"
        );
        assert_eq!(
            PackageManager::Yum.install_command("curl"),
            "yum --assumeyes --debuglevel=1 install curl"
        );
    }

    #[test]
    fn test_add_repository_quotes_url() {
        let cmd = precise()
            .add_repository_command("deb http://example.com trusty main")
            .unwrap();
        assert!(cmd.starts_with("add-apt-repository --yes '"));
        assert!(cmd.ends_with("deb http://example.com trusty main'"));

        let cmd = PackageManager::Yum
            .add_repository_command("http://example.com/x.repo")
            .unwrap();
        assert!(cmd.starts_with("yum-config-manager --add-repo "));
        assert!(cmd.contains("http://example.com/x.repo"));
    }

    #[test]
    fn test_add_repository_rejects_nul() {
        assert!(precise().add_repository_command("bad\0url").is_err());
    }

    #[test]
    fn test_cloud_archive_only_on_precise() {
        assert!(precise().is_cloud_archive_package("cloud-utils"));
        assert!(!precise().is_cloud_archive_package("curl"));

        let trusty = PackageManager::Apt {
            series: Some("trusty".to_string()),
        };
        assert!(!trusty.is_cloud_archive_package("cloud-utils"));
        assert!(!PackageManager::Yum.is_cloud_archive_package("cloud-utils"));
    }

    #[test]
    fn test_apply_cloud_archive_target() {
        assert_eq!(
            precise().apply_cloud_archive_target("cloud-utils"),
            vec!["--target-release", "precise-updates/cloud-tools", "cloud-utils"]
        );
        assert_eq!(
            PackageManager::Yum.apply_cloud_archive_target("cloud-utils"),
            vec!["cloud-utils"]
        );
    }

    #[test]
    fn test_proxy_settings_empty() {
        assert!(ProxySettings::default().is_empty());
        assert!(!ProxySettings::http("http://proxy:3128").is_empty());
        let no_proxy_only = ProxySettings {
            no_proxy: Some("localhost".to_string()),
            ..Default::default()
        };
        assert!(no_proxy_only.is_empty());
    }

    #[test]
    fn test_package_source_alias() {
        assert!(PackageSource::new("ppa:team/stable").is_alias());
        assert!(!PackageSource::new("deb http://x trusty main").is_alias());
    }

    #[test]
    fn test_package_source_yaml_field_names() {
        let src = PackageSource::new("deb http://x trusty main").with_key("KEY");
        let yaml = serde_yaml::to_string(&src).unwrap();
        assert!(yaml.contains("source: deb http://x trusty main"));
        assert!(yaml.contains("key: KEY"));

        let parsed: PackageSource = serde_yaml::from_str("url: http://y\n").unwrap();
        assert_eq!(parsed.url, "http://y");
        assert!(parsed.key.is_empty());
    }
}
