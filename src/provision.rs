//! Provisioning compiler
//!
//! Ties the bootstrap compiler and service installation together: one
//! artifact that, run on a fresh machine, sets up packages and installs a
//! service.

use std::fmt;

use serde::Deserialize;

use crate::cloudinit::{CloudConfig, ConfigError, OsFamily};
use crate::packaging::{PackagePreference, PackageSource, ProxySettings};
use crate::service::{InitSystem, Service, ServiceDescriptor, ServiceError, SystemRunner};

/// Releases that boot with upstart
const UPSTART_SERIES: &[&str] = &["precise", "trusty", "utopic"];

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("package options: {0}")]
    Packaging(#[source] ConfigError),

    #[error("service {name}: {source}")]
    Service {
        name: String,
        #[source]
        source: ServiceError,
    },

    #[error("render: {0}")]
    Render(#[source] ConfigError),
}

/// Which artifact to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtifactFormat {
    /// Structured first-boot document
    #[default]
    CloudConfig,
    /// Executable script
    Script,
}

impl ArtifactFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cloud-config" | "cloudconfig" | "structured" => Some(Self::CloudConfig),
            "script" => Some(Self::Script),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CloudConfig => "cloud-config",
            Self::Script => "script",
        }
    }
}

impl std::str::FromStr for ArtifactFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown artifact format: {}", s))
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target machine
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Platform {
    #[serde(rename = "os")]
    pub family: OsFamily,
    #[serde(default)]
    pub series: Option<String>,
    /// Overrides the family's default init system
    #[serde(default)]
    pub init: Option<InitSystem>,
}

impl Platform {
    pub fn new(family: OsFamily) -> Self {
        Self {
            family,
            series: None,
            init: None,
        }
    }

    pub fn with_series(mut self, series: impl Into<String>) -> Self {
        self.series = Some(series.into());
        self
    }

    pub fn with_init(mut self, init: InitSystem) -> Self {
        self.init = Some(init);
        self
    }

    pub fn init_system(&self) -> InitSystem {
        if let Some(init) = self.init {
            return init;
        }
        match self.family {
            OsFamily::Debian => match self.series.as_deref() {
                Some(series) if UPSTART_SERIES.contains(&series) => InitSystem::Upstart,
                _ => InitSystem::Systemd { user: false },
            },
            OsFamily::Rhel => InitSystem::Systemd { user: false },
            OsFamily::Windows => InitSystem::Windows,
        }
    }
}

/// Package-management intent applied to the bootstrap compiler
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageOptions {
    #[serde(default)]
    pub proxy: Option<ProxySettings>,
    #[serde(default)]
    pub mirror: Option<String>,
    #[serde(default)]
    pub sources: Vec<PackageSource>,
    #[serde(default)]
    pub preferences: Vec<PackagePreference>,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub update: Option<bool>,
    #[serde(default)]
    pub upgrade: Option<bool>,
    /// Add the package manager's baseline packages
    #[serde(default)]
    pub default_packages: bool,
}

impl PackageOptions {
    fn apply(&self, cfg: &mut CloudConfig) -> Result<(), ConfigError> {
        if let Some(proxy) = &self.proxy {
            cfg.set_package_proxy(proxy)?;
        }
        if let Some(mirror) = self.mirror.as_deref().filter(|m| !m.is_empty()) {
            cfg.set_package_mirror(mirror)?;
        }
        for source in &self.sources {
            cfg.add_package_source(source.clone())?;
        }
        for preference in &self.preferences {
            cfg.add_package_preference(preference.clone())?;
        }
        if self.default_packages {
            cfg.add_default_packages()?;
        }
        for package in &self.packages {
            cfg.add_package(package.as_str())?;
        }

        // new sources are only usable after an index update
        match self.update {
            Some(update) => cfg.set_system_update(update)?,
            None if !self.sources.is_empty() => cfg.enable_system_update()?,
            None => {}
        }
        if let Some(upgrade) = self.upgrade {
            cfg.set_system_upgrade(upgrade)?;
        }
        Ok(())
    }
}

/// Rendered provisioning artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub format: ArtifactFormat,
    pub family: OsFamily,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

/// Compiles service installation plus package setup for one platform
#[derive(Debug, Clone)]
pub struct ProvisioningCompiler {
    platform: Platform,
}

impl ProvisioningCompiler {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Bootstrap compiler with package options applied and the service's
    /// install commands appended as run commands.
    pub fn compile(&self, descriptor: &ServiceDescriptor, options: &PackageOptions) -> Result<CloudConfig, ProvisionError> {
        let mut cfg = CloudConfig::new(self.platform.family, self.platform.series.as_deref());
        options.apply(&mut cfg).map_err(ProvisionError::Packaging)?;

        let init = self.platform.init_system();
        log::debug!(
            "Provisioning {} for {} with {}",
            descriptor.name,
            self.platform.family.as_str(),
            init
        );
        let service = Service::new(descriptor.clone(), init, SystemRunner);
        let cmds = service.install_commands().map_err(|source| ProvisionError::Service {
            name: descriptor.name.clone(),
            source,
        })?;
        for cmd in cmds {
            cfg.add_run_command(cmd);
        }
        Ok(cfg)
    }

    pub fn build(
        &self,
        descriptor: &ServiceDescriptor,
        options: &PackageOptions,
        format: ArtifactFormat,
    ) -> Result<Artifact, ProvisionError> {
        let cfg = self.compile(descriptor, options)?;
        let bytes = match format {
            ArtifactFormat::CloudConfig => cfg.render_structured(),
            ArtifactFormat::Script => cfg.render_script().map(String::into_bytes),
        }
        .map_err(ProvisionError::Render)?;

        Ok(Artifact {
            format,
            family: self.platform.family,
            bytes,
        })
    }
}
