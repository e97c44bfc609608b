//! Debian/Ubuntu rendering rules
//!
//! Proxy, mirror and sources stay first-class document attributes that the
//! first-boot agent understands natively. Preferences become file writes.

use super::script::{self, LOOPER, PACKAGE_MANAGER_LOOP};
use super::{CloudConfig, ConfigDocument, ConfigError, APT_KEYS};
use crate::packaging::{apt, PackageManager};
use crate::shell;

const TARGET_RELEASE: &str = "--target-release";

/// Document as the script renderer sees it: preferences written as files.
pub(super) fn script_document(cfg: &CloudConfig) -> ConfigDocument {
    let mut doc = cfg.doc.clone();
    if let Some(key) = APT_KEYS.preferences {
        doc.unset_attribute(key);
    }
    for pref in cfg.package_preferences() {
        doc.add_file(pref.path, pref.content, 0o644);
    }
    doc
}

pub(super) fn render_structured(cfg: &CloudConfig) -> Result<Vec<u8>, ConfigError> {
    // the agent takes the tokens as listed, but a truncated target release is still invalid
    coalesce_packages(&cfg.packages())?;
    let mut doc = script_document(cfg);
    if let (Some(proxy), Some(packaging)) = (cfg.package_proxy(), cfg.package_manager()) {
        doc.add_boot_command(proxy_file_command(packaging, &packaging.proxy_config_contents(proxy))?);
    }
    doc.render_structured()
}

fn proxy_file_command(packaging: &PackageManager, contents: &str) -> Result<String, ConfigError> {
    Ok(format!(
        "printf '%s\\n' {} > {}",
        shell::quote(contents)?,
        packaging.proxy_config_file()
    ))
}

/// Package-management commands for the script form, in execution order.
pub(super) fn package_commands(cfg: &CloudConfig) -> Result<Vec<String>, ConfigError> {
    let Some(packaging) = cfg.package_manager() else {
        return Ok(Vec::new());
    };
    let mut cmds = Vec::new();

    if let Some(proxy) = cfg.package_proxy() {
        cmds.push(proxy_file_command(packaging, &packaging.proxy_config_contents(proxy))?);
    }

    if let Some(mirror) = cfg.package_mirror() {
        log::debug!("Rewriting apt sources to mirror {}", mirror);
        cmds.push(script::log_progress(&format!("Changing apt mirror to {}", mirror))?);
        cmds.push(format!("old_mirror=$({})", apt::EXTRACT_SOURCE));
        cmds.push(format!("new_mirror={}", shell::quote(&mirror)?));
        cmds.push(format!("sed -i s,$old_mirror,$new_mirror, {}", apt::SOURCES_FILE));
        cmds.extend(script::rename_list_files_commands(
            apt::LISTS_DIRECTORY,
            "$old_mirror",
            "$new_mirror",
        ));
    }

    let sources = cfg.package_sources();
    if !sources.is_empty() {
        cmds.push(script::log_progress("Installing add-apt-repository")?);
        cmds.push(packaging.install_command("python-software-properties"));
    }
    for src in &sources {
        if !src.is_alias() && !src.key.is_empty() {
            cmds.push(format!("printf '%s\\n' {} | apt-key add -", shell::quote(&src.key)?));
        }
        cmds.push(script::log_progress(&format!("Adding apt repository: {}", src.url))?);
        cmds.push(packaging.add_repository_command(&src.url).map_err(|_| {
            ConfigError::Serialization(format!("repository {:?} cannot be quoted", src.url))
        })?);
    }

    let mut looped = Vec::new();
    if cfg.system_update() == Some(true) {
        looped.push(script::log_progress("Running apt-get update")?);
        looped.push(format!("{}{}", LOOPER, packaging.update_command()));
    }
    if cfg.system_upgrade() == Some(true) {
        looped.push(script::log_progress("Running apt-get upgrade")?);
        looped.push(format!("{}{}", LOOPER, packaging.upgrade_command()));
    }
    for pkg in coalesce_packages(&cfg.packages())? {
        looped.push(script::log_progress(&format!("Installing package: {}", pkg))?);
        looped.push(format!("{}{}", LOOPER, packaging.install_command(&pkg)));
    }
    if !looped.is_empty() {
        cmds.push(PACKAGE_MANAGER_LOOP.to_string());
        cmds.extend(looped);
    }

    if !cmds.is_empty() {
        // debconf takes default answers instead of prompting
        cmds.insert(0, "export DEBIAN_FRONTEND=noninteractive".to_string());
    }
    Ok(cmds)
}

/// Join legacy `--target-release <release> <package>` token triples back
/// into one package argument.
pub(super) fn coalesce_packages(packages: &[String]) -> Result<Vec<String>, ConfigError> {
    let mut out = Vec::with_capacity(packages.len());
    let mut i = 0;
    while i < packages.len() {
        if packages[i] == TARGET_RELEASE {
            if i + 2 >= packages.len() {
                return Err(ConfigError::InvalidPackageSpec(packages[i..].join(" ")));
            }
            out.push(packages[i..i + 3].join(" "));
            i += 3;
        } else {
            out.push(packages[i].clone());
            i += 1;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::super::OsFamily;
    use super::*;
    use crate::packaging::{PackagePreference, PackageSource, ProxySettings};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_coalesce_target_release() {
        let pkgs = strings(&["curl", "--target-release", "trusty-updates/cloud-tools", "foo", "git"]);
        assert_eq!(
            coalesce_packages(&pkgs).unwrap(),
            strings(&["curl", "--target-release trusty-updates/cloud-tools foo", "git"])
        );
    }

    #[test]
    fn test_coalesce_rejects_short_target_release() {
        let err = coalesce_packages(&strings(&["--target-release", "onlyone"])).unwrap_err();
        match err {
            ConfigError::InvalidPackageSpec(rest) => assert_eq!(rest, "--target-release onlyone"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_script_has_noninteractive_export_before_installs() {
        let mut cfg = CloudConfig::new(OsFamily::Debian, Some("trusty"));
        cfg.add_package("curl").unwrap();
        let script = cfg.render_script().unwrap();

        let export = script.find("export DEBIAN_FRONTEND=noninteractive").unwrap();
        let install = script.find("package_manager_loop apt-get").unwrap();
        assert!(export < install);
    }

    #[test]
    fn test_no_export_without_package_work() {
        let mut cfg = CloudConfig::new(OsFamily::Debian, Some("trusty"));
        cfg.add_run_command("echo hello");
        let script = cfg.render_script().unwrap();
        assert!(!script.contains("DEBIAN_FRONTEND"));
        assert!(!script.contains("package_manager_loop"));
    }

    #[test]
    fn test_sources_import_keys_except_aliases() {
        let mut cfg = CloudConfig::new(OsFamily::Debian, Some("trusty"));
        cfg.enable_system_update().unwrap();
        cfg.add_package_source(PackageSource::new("ppa:team/stable").with_key("IGNORED")).unwrap();
        cfg.add_package_source(PackageSource::new("deb http://x trusty main").with_key("KEYDATA")).unwrap();
        let script = cfg.render_script().unwrap();

        assert!(!script.contains("IGNORED"));
        let key = script.find("KEYDATA | apt-key add -").unwrap();
        let repo = script.find("add-apt-repository --yes 'deb http://x trusty main'").unwrap();
        assert!(key < repo);
        assert!(script.contains("ppa:team/stable"));
    }

    #[test]
    fn test_preferences_written_before_installs() {
        let mut cfg = CloudConfig::new(OsFamily::Debian, Some("trusty"));
        cfg.add_package_preference(PackagePreference::new(
            "/etc/apt/preferences.d/cloud-tools",
            "Package: *\nPin: release n=trusty-updates/cloud-tools\nPin-Priority: 400\n",
        ))
        .unwrap();
        cfg.add_package("curl").unwrap();
        let script = cfg.render_script().unwrap();

        let pref = script.find("/etc/apt/preferences.d/cloud-tools").unwrap();
        let install = script.find("install curl").unwrap();
        assert!(pref < install);
    }

    #[test]
    fn test_structured_preferences_become_write_files() {
        let mut cfg = CloudConfig::new(OsFamily::Debian, Some("trusty"));
        cfg.add_package_preference(PackagePreference::new("/etc/apt/preferences.d/p", "Pin: x\n"))
            .unwrap();
        let out = String::from_utf8(cfg.render_structured().unwrap()).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();

        assert!(parsed.get("apt_preferences").is_none());
        assert_eq!(
            parsed["write_files"][0]["path"],
            serde_yaml::Value::String("/etc/apt/preferences.d/p".into())
        );
        // the compiler itself still holds the preference
        assert_eq!(cfg.package_preferences().len(), 1);
    }

    #[test]
    fn test_proxy_written_in_both_forms() {
        let mut cfg = CloudConfig::new(OsFamily::Debian, Some("trusty"));
        cfg.set_package_proxy(&ProxySettings::http("http://proxy:3128")).unwrap();

        let structured = String::from_utf8(cfg.render_structured().unwrap()).unwrap();
        let parsed: serde_yaml::Value =
            serde_yaml::from_str(&structured).unwrap();
        assert_eq!(parsed["apt_proxy"], serde_yaml::Value::String("http://proxy:3128".into()));
        assert!(structured.contains(apt::PROXY_CONFIG_FILE));

        let script = cfg.render_script().unwrap();
        assert!(script.contains("Acquire::http::Proxy"));
        assert!(script.contains(apt::PROXY_CONFIG_FILE));
    }

    #[test]
    fn test_mirror_change_renames_lists() {
        let mut cfg = CloudConfig::new(OsFamily::Debian, Some("trusty"));
        cfg.set_package_mirror("http://mirror.example.com/ubuntu").unwrap();
        let script = cfg.render_script().unwrap();

        assert!(script.contains("new_mirror="));
        assert!(script.contains("http://mirror.example.com/ubuntu"));
        assert!(script.contains("sed -i s,$old_mirror,$new_mirror, /etc/apt/sources.list"));
        assert!(script.contains("old_prefix=/var/lib/apt/lists/$(echo $old_mirror"));
        assert!(script.contains(r#"mv "$old" "$new""#));
    }
}
