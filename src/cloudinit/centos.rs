//! CentOS/RHEL rendering rules
//!
//! The first-boot agent has no native yum proxy/mirror/source support here,
//! so those settings are compiled into run commands.

use super::script::{self, LOOPER, PACKAGE_MANAGER_LOOP};
use super::{CloudConfig, ConfigError, YUM_KEYS};
use crate::packaging::{yum, PackageManager, PackageSource};
use crate::shell;

pub(super) fn render_structured(cfg: &CloudConfig) -> Result<Vec<u8>, ConfigError> {
    let mut doc = cfg.doc.clone();
    doc.unset_attribute(YUM_KEYS.proxy);
    doc.unset_attribute(YUM_KEYS.mirror);
    doc.unset_attribute(YUM_KEYS.sources);

    let mut cmds = Vec::new();
    if let Some(packaging) = cfg.package_manager() {
        if let Some(cmd) = proxy_command(cfg, packaging)? {
            cmds.push(cmd);
        }
        if let Some(mirror) = cfg.package_mirror() {
            cmds.push(yum::replace_mirror_command(&mirror)?);
        }
        for (n, src) in cfg.package_sources().iter().enumerate() {
            cmds.extend(source_commands(packaging, n, src)?);
        }
    }
    doc.prepend_run_commands(cmds);
    doc.render_structured()
}

/// Appends the proxy line to the global yum config.
fn proxy_command(cfg: &CloudConfig, packaging: &PackageManager) -> Result<Option<String>, ConfigError> {
    let Some(proxy) = cfg.package_proxy() else {
        return Ok(None);
    };
    Ok(Some(format!(
        "/bin/echo {} >> {}",
        shell::quote(&packaging.proxy_config_contents(proxy))?,
        packaging.proxy_config_file()
    )))
}

fn source_commands(packaging: &PackageManager, n: usize, src: &PackageSource) -> Result<Vec<String>, ConfigError> {
    let mut cmds = Vec::new();
    if !src.key.is_empty() {
        let keyfile = format!("{}/sysprov-{}.key", yum::KEYFILE_DIR, n);
        cmds.extend(script::write_file_commands(&keyfile, &src.key, 0o644)?);
        cmds.push(format!("rpm --import {}", keyfile));
    }
    cmds.push(packaging.add_repository_command(&src.url).map_err(|_| {
        ConfigError::Serialization(format!("repository {:?} cannot be quoted", src.url))
    })?);
    Ok(cmds)
}

pub(super) fn package_commands(cfg: &CloudConfig) -> Result<Vec<String>, ConfigError> {
    let Some(packaging) = cfg.package_manager() else {
        return Ok(Vec::new());
    };
    let mut cmds = Vec::new();

    if let Some(cmd) = proxy_command(cfg, packaging)? {
        cmds.push(cmd);
    }

    if let Some(mirror) = cfg.package_mirror() {
        log::info!("Changing the package mirror is not supported on CentOS yet, setting {} anyway", mirror);
        cmds.push(script::log_progress("Changing package mirror does not yet work on CentOS")?);
        cmds.push(yum::replace_mirror_command(&mirror)?);
    }

    for (n, src) in cfg.package_sources().iter().enumerate() {
        cmds.push(script::log_progress(&format!("Adding yum repository: {}", src.url))?);
        cmds.extend(source_commands(packaging, n, src)?);
    }

    let mut looped = Vec::new();
    if cfg.system_update() == Some(true) {
        looped.push(script::log_progress("Running yum update")?);
        looped.push(format!("{}{}", LOOPER, packaging.update_command()));
    }
    if cfg.system_upgrade() == Some(true) {
        looped.push(script::log_progress("Running yum upgrade")?);
        looped.push(format!("{}{}", LOOPER, packaging.upgrade_command()));
    }
    for pkg in cfg.packages() {
        looped.push(script::log_progress(&format!("Installing package: {}", pkg))?);
        looped.push(format!("{}{}", LOOPER, packaging.install_command(&pkg)));
    }
    if !looped.is_empty() {
        cmds.push(PACKAGE_MANAGER_LOOP.to_string());
        cmds.extend(looped);
    }
    Ok(cmds)
}
