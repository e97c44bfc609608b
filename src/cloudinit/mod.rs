//! Bootstrap compiler
//!
//! Accumulates package-management intent and arbitrary commands for a fresh
//! machine, then renders it either as a structured first-boot document or
//! as an equivalent script.
//!
//! ```text
//!   CloudConfig ──owns──▶ ConfigDocument (attributes, bootcmd, runcmd, files)
//!        │
//!        └──uses──▶ PackageManager (apt | yum | none on Windows)
//!
//!   render_structured()  ─▶ "#cloud-config" YAML   (Windows: ps1)
//!   render_script()      ─▶ /bin/sh script          (Windows: ps1)
//! ```

mod centos;
pub mod document;
pub mod script;
mod ubuntu;
mod windows;

pub use document::{ConfigDocument, WriteFile};

use serde::Deserialize;

use crate::packaging::{PackageManager, PackagePreference, PackageSource, ProxySettings};
use crate::shell::QuoteError;

const PACKAGES: &str = "packages";
const PACKAGE_UPDATE: &str = "package_update";
const PACKAGE_UPGRADE: &str = "package_upgrade";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot serialize bootstrap document: {0}")]
    Serialization(String),

    #[error("invalid package {0:?}: expected --target-release <release> <package>")]
    InvalidPackageSpec(String),

    #[error("package sources were specified, but OS updates have been disabled")]
    ConfigConflict,

    #[error("invalid bootstrap document: {0}")]
    Validation(String),
}

impl From<QuoteError> for ConfigError {
    fn from(e: QuoteError) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Target operating system family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    #[serde(alias = "ubuntu")]
    Debian,
    #[serde(alias = "centos")]
    Rhel,
    Windows,
}

impl OsFamily {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "debian" | "ubuntu" => Some(Self::Debian),
            "rhel" | "centos" => Some(Self::Rhel),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debian => "debian",
            Self::Rhel => "rhel",
            Self::Windows => "windows",
        }
    }
}

impl std::str::FromStr for OsFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown OS family: {}", s))
    }
}

/// Attribute names a family stores its package settings under
struct PackageKeys {
    proxy: &'static str,
    mirror: &'static str,
    sources: &'static str,
    preferences: Option<&'static str>,
}

const APT_KEYS: PackageKeys = PackageKeys {
    proxy: "apt_proxy",
    mirror: "apt_mirror",
    sources: "apt_sources",
    preferences: Some("apt_preferences"),
};

const YUM_KEYS: PackageKeys = PackageKeys {
    proxy: "package_proxy",
    mirror: "package_mirror",
    sources: "package_sources",
    preferences: None,
};

/// Bootstrap compiler for one OS family
#[derive(Debug, Clone)]
pub struct CloudConfig {
    family: OsFamily,
    packaging: Option<PackageManager>,
    proxy: Option<ProxySettings>,
    doc: ConfigDocument,
}

impl CloudConfig {
    /// `series` selects release-specific package rules (Debian family only).
    pub fn new(family: OsFamily, series: Option<&str>) -> Self {
        let packaging = match family {
            OsFamily::Debian => Some(PackageManager::Apt {
                series: series.map(str::to_string),
            }),
            OsFamily::Rhel => Some(PackageManager::Yum),
            OsFamily::Windows => None,
        };

        Self {
            family,
            packaging,
            proxy: None,
            doc: ConfigDocument::new(),
        }
    }

    pub fn family(&self) -> OsFamily {
        self.family
    }

    pub fn package_manager(&self) -> Option<&PackageManager> {
        self.packaging.as_ref()
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.doc
    }

    fn keys(&self) -> Option<&'static PackageKeys> {
        match self.family {
            OsFamily::Debian => Some(&APT_KEYS),
            OsFamily::Rhel => Some(&YUM_KEYS),
            OsFamily::Windows => None,
        }
    }

    pub fn set_attribute<T: serde::Serialize>(&mut self, key: &str, value: T) -> Result<(), ConfigError> {
        self.doc.set_attribute(key, value)
    }

    pub fn add_boot_command(&mut self, cmd: impl Into<String>) {
        self.doc.add_boot_command(cmd);
    }

    pub fn add_run_command(&mut self, cmd: impl Into<String>) {
        self.doc.add_run_command(cmd);
    }

    pub fn add_file(&mut self, path: impl Into<String>, content: impl Into<String>, mode: u32) {
        self.doc.add_file(path, content, mode);
    }

    // Proxy

    pub fn set_package_proxy(&mut self, settings: &ProxySettings) -> Result<(), ConfigError> {
        let Some(keys) = self.keys() else {
            return Ok(());
        };
        match settings.primary() {
            Some(url) => self.doc.set_attribute(keys.proxy, url)?,
            None => {
                self.doc.unset_attribute(keys.proxy);
            }
        }
        self.proxy = Some(settings.clone()).filter(|s| !s.is_empty());
        Ok(())
    }

    pub fn unset_package_proxy(&mut self) {
        if let Some(keys) = self.keys() {
            self.doc.unset_attribute(keys.proxy);
            self.proxy = None;
        }
    }

    pub fn package_proxy(&self) -> Option<&ProxySettings> {
        self.proxy.as_ref()
    }

    // Mirror

    pub fn set_package_mirror(&mut self, url: &str) -> Result<(), ConfigError> {
        match self.keys() {
            Some(keys) => self.doc.set_attribute(keys.mirror, url),
            None => Ok(()),
        }
    }

    pub fn unset_package_mirror(&mut self) {
        if let Some(keys) = self.keys() {
            self.doc.unset_attribute(keys.mirror);
        }
    }

    pub fn package_mirror(&self) -> Option<String> {
        self.keys()
            .and_then(|keys| self.doc.attribute_as::<String>(keys.mirror))
            .filter(|m| !m.is_empty())
    }

    // Sources and preferences

    pub fn add_package_source(&mut self, source: PackageSource) -> Result<(), ConfigError> {
        let Some(keys) = self.keys() else {
            return Ok(());
        };
        let mut sources = self.package_sources();
        sources.push(source);
        self.doc.set_attribute(keys.sources, sources)
    }

    pub fn package_sources(&self) -> Vec<PackageSource> {
        self.keys()
            .and_then(|keys| self.doc.attribute_as(keys.sources))
            .unwrap_or_default()
    }

    /// Accepted everywhere; only the Debian family has a priority mechanism.
    pub fn add_package_preference(&mut self, preference: PackagePreference) -> Result<(), ConfigError> {
        let Some(key) = self.keys().and_then(|k| k.preferences) else {
            log::debug!("Package preferences are not supported on {}, ignoring", self.family.as_str());
            return Ok(());
        };
        let mut prefs = self.package_preferences();
        prefs.push(preference);
        self.doc.set_attribute(key, prefs)
    }

    pub fn package_preferences(&self) -> Vec<PackagePreference> {
        self.keys()
            .and_then(|k| k.preferences)
            .and_then(|key| self.doc.attribute_as(key))
            .unwrap_or_default()
    }

    // Packages

    pub fn add_package(&mut self, name: impl Into<String>) -> Result<(), ConfigError> {
        if self.packaging.is_none() {
            return Ok(());
        }
        let mut packages = self.packages();
        packages.push(name.into());
        self.doc.set_attribute(PACKAGES, packages)
    }

    pub fn packages(&self) -> Vec<String> {
        self.doc.attribute_as(PACKAGES).unwrap_or_default()
    }

    /// Add the package manager's baseline packages, requesting cloud-archive
    /// packages from their alternate channel.
    pub fn add_default_packages(&mut self) -> Result<(), ConfigError> {
        let Some(packaging) = self.packaging.clone() else {
            return Ok(());
        };
        for name in packaging.default_packages() {
            if packaging.is_cloud_archive_package(name) {
                for token in packaging.apply_cloud_archive_target(name) {
                    self.add_package(token)?;
                }
            } else {
                self.add_package(*name)?;
            }
        }
        Ok(())
    }

    // Update/upgrade

    pub fn set_system_update(&mut self, enabled: bool) -> Result<(), ConfigError> {
        if self.packaging.is_none() {
            return Ok(());
        }
        self.doc.set_attribute(PACKAGE_UPDATE, enabled)
    }

    pub fn enable_system_update(&mut self) -> Result<(), ConfigError> {
        self.set_system_update(true)
    }

    /// `None` until explicitly set.
    pub fn system_update(&self) -> Option<bool> {
        self.doc.attribute_as(PACKAGE_UPDATE)
    }

    pub fn set_system_upgrade(&mut self, enabled: bool) -> Result<(), ConfigError> {
        if self.packaging.is_none() {
            return Ok(());
        }
        self.doc.set_attribute(PACKAGE_UPGRADE, enabled)
    }

    pub fn enable_system_upgrade(&mut self) -> Result<(), ConfigError> {
        self.set_system_upgrade(true)
    }

    pub fn system_upgrade(&self) -> Option<bool> {
        self.doc.attribute_as(PACKAGE_UPGRADE)
    }

    /// Sources without updates are a contradiction.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.system_update() == Some(false) && !self.package_sources().is_empty() {
            return Err(ConfigError::ConfigConflict);
        }
        Ok(())
    }

    // Rendering

    pub fn render_structured(&self) -> Result<Vec<u8>, ConfigError> {
        self.validate()?;
        match self.family {
            OsFamily::Debian => ubuntu::render_structured(self),
            OsFamily::Rhel => centos::render_structured(self),
            OsFamily::Windows => windows::render(self),
        }
    }

    pub fn render_script(&self) -> Result<String, ConfigError> {
        self.validate()?;
        match self.family {
            OsFamily::Debian => {
                let doc = ubuntu::script_document(self);
                doc.render_script_with(&ubuntu::package_commands(self)?)
            }
            OsFamily::Rhel => self.doc.render_script_with(&centos::package_commands(self)?),
            OsFamily::Windows => {
                let bytes = windows::render(self)?;
                String::from_utf8(bytes).map_err(|e| ConfigError::Serialization(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_family_parse() {
        assert_eq!(OsFamily::parse("ubuntu"), Some(OsFamily::Debian));
        assert_eq!(OsFamily::parse("Debian"), Some(OsFamily::Debian));
        assert_eq!(OsFamily::parse("centos"), Some(OsFamily::Rhel));
        assert_eq!(OsFamily::parse("windows"), Some(OsFamily::Windows));
        assert_eq!(OsFamily::parse("plan9"), None);
    }

    #[test]
    fn test_os_family_deserialize_aliases() {
        let family: OsFamily = serde_yaml::from_str("ubuntu").unwrap();
        assert_eq!(family, OsFamily::Debian);
        let family: OsFamily = serde_yaml::from_str("centos").unwrap();
        assert_eq!(family, OsFamily::Rhel);
    }

    #[test]
    fn test_family_specific_attribute_names() {
        let mut ubuntu = CloudConfig::new(OsFamily::Debian, Some("trusty"));
        ubuntu.set_package_mirror("http://mirror").unwrap();
        assert!(ubuntu.document().attribute("apt_mirror").is_some());

        let mut centos = CloudConfig::new(OsFamily::Rhel, None);
        centos.set_package_mirror("http://mirror").unwrap();
        assert!(centos.document().attribute("package_mirror").is_some());
        assert_eq!(centos.package_mirror().as_deref(), Some("http://mirror"));
    }

    #[test]
    fn test_windows_ignores_package_operations() {
        let mut cfg = CloudConfig::new(OsFamily::Windows, None);
        cfg.set_package_proxy(&ProxySettings::http("http://proxy")).unwrap();
        cfg.set_package_mirror("http://mirror").unwrap();
        cfg.add_package_source(PackageSource::new("http://src")).unwrap();
        cfg.add_package_preference(PackagePreference::new("/p", "c")).unwrap();
        cfg.add_package("curl").unwrap();
        cfg.enable_system_update().unwrap();

        assert!(cfg.package_proxy().is_none());
        assert!(cfg.package_mirror().is_none());
        assert!(cfg.package_sources().is_empty());
        assert!(cfg.packages().is_empty());
        assert_eq!(cfg.system_update(), None);
    }

    #[test]
    fn test_centos_ignores_preferences() {
        let mut cfg = CloudConfig::new(OsFamily::Rhel, None);
        cfg.add_package_preference(PackagePreference::new("/p", "c")).unwrap();
        assert!(cfg.package_preferences().is_empty());
    }

    #[test]
    fn test_sources_with_updates_disabled_conflict() {
        for family in [OsFamily::Debian, OsFamily::Rhel] {
            let mut cfg = CloudConfig::new(family, None);
            cfg.add_package_source(PackageSource::new("ppa:team/stable")).unwrap();
            cfg.set_system_update(false).unwrap();
            assert!(matches!(cfg.render_structured(), Err(ConfigError::ConfigConflict)));
            assert!(matches!(cfg.render_script(), Err(ConfigError::ConfigConflict)));

            cfg.enable_system_update().unwrap();
            assert!(cfg.render_script().is_ok());
        }
    }

    #[test]
    fn test_untouched_update_flag_does_not_conflict() {
        let mut cfg = CloudConfig::new(OsFamily::Debian, None);
        cfg.add_package_source(PackageSource::new("ppa:team/stable")).unwrap();
        assert!(cfg.render_structured().is_ok());
    }

    #[test]
    fn test_default_packages_on_precise_use_target_release() {
        let mut cfg = CloudConfig::new(OsFamily::Debian, Some("precise"));
        cfg.add_default_packages().unwrap();
        let packages = cfg.packages();
        let pos = packages.iter().position(|p| p == "--target-release").unwrap();
        assert_eq!(packages[pos + 1], "precise-updates/cloud-tools");
        assert_eq!(packages[pos + 2], "cloud-utils");
        assert!(packages.contains(&"curl".to_string()));
    }

    #[test]
    fn test_default_packages_on_trusty_are_plain() {
        let mut cfg = CloudConfig::new(OsFamily::Debian, Some("trusty"));
        cfg.add_default_packages().unwrap();
        assert!(!cfg.packages().iter().any(|p| p == "--target-release"));
    }
}
