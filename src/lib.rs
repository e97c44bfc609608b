//! sysprov - machine provisioning and service reconciliation
//!
//! A Rust implementation that:
//! - Compiles package setup and commands into a first-boot document or script
//!   for Debian, RHEL and Windows families
//! - Renders unit definitions for systemd, upstart and the Windows service
//!   manager and converges a live machine to them
//! - Combines both into one provisioning artifact
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 ProvisioningCompiler                 │
//! ├──────────────────────────┬───────────────────────────┤
//! │  CloudConfig             │  Service                  │
//! │  (ubuntu/centos/windows) │  (systemd/upstart/windows)│
//! ├──────────────────────────┼───────────────────────────┤
//! │  PackageManager (apt/yum)│  CommandRunner            │
//! └──────────────────────────┴───────────────────────────┘
//! ```

pub mod cloudinit;
pub mod config;
pub mod packaging;
pub mod provision;
pub mod service;
pub mod shell;

pub use cloudinit::{CloudConfig, ConfigDocument, ConfigError, OsFamily};
pub use config::{Manifest, ManifestError};
pub use provision::{Artifact, ArtifactFormat, PackageOptions, Platform, ProvisionError, ProvisioningCompiler};
pub use service::{InitSystem, Service, ServiceDescriptor, ServiceError};
