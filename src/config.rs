//! Provisioning manifest
//!
//! One YAML file describes the target platform, the service to install and
//! the package setup around it:
//!
//! ```yaml
//! platform:
//!   os: ubuntu
//!   series: trusty
//! service:
//!   name: agentd
//!   description: agent
//!   command: /usr/bin/agentd --run
//! packages:
//!   update: true
//!   packages: [curl]
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cloudinit::OsFamily;
use crate::provision::{PackageOptions, Platform};
use crate::service::{InitSystem, ServiceDescriptor};

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid manifest: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub platform: Platform,
    pub service: ServiceDescriptor,
    #[serde(default)]
    pub packages: PackageOptions,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded manifest {}", path.display());
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_yaml::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), ManifestError> {
        self.service
            .validate()
            .map_err(|e| ManifestError::Invalid(e.to_string()))?;

        let windows_family = self.platform.family == OsFamily::Windows;
        let windows_init = self.platform.init == Some(InitSystem::Windows);
        if self.platform.init.is_some() && windows_family != windows_init {
            return Err(ManifestError::Invalid(format!(
                "init system {} cannot manage services on {}",
                self.platform.init_system(),
                self.platform.family.as_str()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = "\
platform:
  os: ubuntu
  series: trusty
service:
  name: agentd
  description: agent
  command: /usr/bin/agentd --run
  environment:
    LOG: debug
packages:
  update: true
  packages: [curl]
";

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::from_yaml(MANIFEST).unwrap();
        assert_eq!(manifest.platform.family, OsFamily::Debian);
        assert_eq!(manifest.platform.init_system(), InitSystem::Upstart);
        assert_eq!(manifest.service.name, "agentd");
        assert_eq!(manifest.packages.packages, vec!["curl"]);
    }

    #[test]
    fn test_packages_section_optional() {
        let manifest = Manifest::from_yaml(
            "platform:\n  os: centos\nservice:\n  name: a\n  description: a\n  command: /bin/a\n",
        )
        .unwrap();
        assert_eq!(manifest.packages, PackageOptions::default());
    }

    #[test]
    fn test_rejects_bad_service() {
        let err = Manifest::from_yaml("platform:\n  os: centos\nservice:\n  name: a\n  description: a\n  command: \"\"\n")
            .unwrap_err();
        assert!(matches!(err, ManifestError::Invalid(_)));
    }

    #[test]
    fn test_rejects_mismatched_init() {
        let text = MANIFEST.replace("series: trusty", "init: windows");
        assert!(matches!(Manifest::from_yaml(&text), Err(ManifestError::Invalid(_))));

        let text = "platform:\n  os: windows\n  init: upstart\nservice:\n  name: a\n  description: a\n  command: a.exe\n";
        assert!(matches!(Manifest::from_yaml(text), Err(ManifestError::Invalid(_))));
    }

    #[test]
    fn test_unknown_os_is_yaml_error() {
        let text = MANIFEST.replace("os: ubuntu", "os: plan9");
        assert!(matches!(Manifest::from_yaml(&text), Err(ManifestError::Yaml(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manifest::load(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(err, ManifestError::Io { .. }));
    }
}
