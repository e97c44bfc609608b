//! systemd unit rendering and control
//!
//! Units are enabled by path so that units outside the standard search
//! directories get linked in.

use std::path::{Path, PathBuf};

use super::{run_checked, CommandRunner, InitBackend, ServiceDescriptor, ServiceError};
use crate::shell::{self, QuoteError};

const SYSTEM_UNIT_DIR: &str = "/etc/systemd/system";

#[derive(Debug, Clone, Copy)]
pub(crate) struct Systemd {
    pub user: bool,
}

impl Systemd {
    fn systemctl(&self, args: &[&str]) -> Vec<String> {
        let mut argv = vec!["systemctl".to_string()];
        if self.user {
            argv.push("--user".to_string());
        }
        argv.extend(args.iter().map(|a| a.to_string()));
        argv
    }

    fn wanted_by(&self) -> &'static str {
        if self.user {
            "default.target"
        } else {
            "multi-user.target"
        }
    }
}

fn unit_name(name: &str) -> String {
    format!("{}.service", name)
}

/// Reject values that would spill onto another unit file line and escape
/// `%` so systemd does not expand it as a specifier.
fn unit_value(field: &str, value: &str) -> Result<String, ServiceError> {
    if value.contains('\n') || value.contains('\r') {
        return Err(ServiceError::Serialization(format!("{} contains a newline", field)));
    }
    Ok(value.replace('%', "%%"))
}

fn environment_entry(key: &str, value: &str) -> Result<String, ServiceError> {
    if key.is_empty() || key.contains('=') || key.contains(char::is_whitespace) {
        return Err(ServiceError::Serialization(format!("bad environment variable name {:?}", key)));
    }
    let value = unit_value(key, value)?
        .replace('\\', "\\\\")
        .replace('"', "\\\"");
    Ok(format!("Environment=\"{}={}\"", key, value))
}

impl InitBackend for Systemd {
    fn default_init_dir(&self) -> PathBuf {
        if self.user {
            dirs::config_dir()
                .map(|p| p.join("systemd/user"))
                .unwrap_or_else(|| PathBuf::from(".config/systemd/user"))
        } else {
            PathBuf::from(SYSTEM_UNIT_DIR)
        }
    }

    fn unit_file_name(&self, name: &str) -> String {
        unit_name(name)
    }

    fn extra_script_file_name(&self, name: &str) -> String {
        format!("{}-extra.sh", name)
    }

    fn render_unit(&self, desc: &ServiceDescriptor, extra_script: Option<&Path>) -> Result<String, ServiceError> {
        let mut lines = vec![
            "[Unit]".to_string(),
            format!("Description={}", unit_value("description", &desc.description)?),
            "After=syslog.target".to_string(),
            "After=network.target".to_string(),
            String::new(),
            "[Service]".to_string(),
            "Type=simple".to_string(),
        ];
        for (key, value) in &desc.environment {
            lines.push(environment_entry(key, value)?);
        }
        for (name, value) in &desc.limits {
            lines.push(format!("Limit{}={}", name.to_uppercase(), unit_value(name, value)?));
        }
        if let Some(path) = extra_script {
            lines.push(format!("ExecStartPre={}", unit_value("extra script", &path.to_string_lossy())?));
        }
        lines.push(format!("ExecStart={}", unit_value("command", &desc.command)?));
        if let Some(output) = desc.output.as_deref().filter(|o| !o.is_empty()) {
            let output = unit_value("output", output)?;
            lines.push(format!("StandardOutput=append:{}", output));
            lines.push(format!("StandardError=append:{}", output));
        }
        lines.extend([
            "Restart=always".to_string(),
            "TimeoutSec=300".to_string(),
            String::new(),
            "[Install]".to_string(),
            format!("WantedBy={}", self.wanted_by()),
        ]);

        let mut unit = lines.join("\n");
        unit.push('\n');
        Ok(unit)
    }

    fn render_extra_script(&self, body: &str) -> String {
        let mut script = format!("#!/usr/bin/env bash\n\n{}", body);
        if !script.ends_with('\n') {
            script.push('\n');
        }
        script
    }

    fn status_query(&self, name: &str) -> Vec<String> {
        self.systemctl(&["status", &unit_name(name)])
    }

    fn enabled_pattern(&self, _name: &str, unit_path: &Path) -> String {
        format!("{}; enabled", regex::escape(&unit_path.to_string_lossy()))
    }

    fn running_pattern(&self, _name: &str) -> String {
        r"Active: active \(running\)".to_string()
    }

    fn enable_command(&self, _name: &str, unit_path: &Path) -> Vec<String> {
        self.systemctl(&["enable", &unit_path.to_string_lossy()])
    }

    fn disable_command(&self, name: &str) -> Option<Vec<String>> {
        Some(self.systemctl(&["disable", &unit_name(name)]))
    }

    fn start_command(&self, name: &str) -> Vec<String> {
        self.systemctl(&["start", &unit_name(name)])
    }

    fn stop_command(&self, name: &str) -> Vec<String> {
        self.systemctl(&["stop", &unit_name(name)])
    }

    fn list_services(&self, runner: &dyn CommandRunner, _init_dir: &Path) -> Result<Vec<String>, ServiceError> {
        let argv = self.systemctl(&["list-unit-files", "--type=service", "--no-legend", "--no-pager"]);
        let out = run_checked(runner, "list", &argv)?;
        Ok(parse_unit_files(&out.stdout))
    }

    fn make_dir_statement(&self, dir: &Path) -> Result<String, QuoteError> {
        Ok(format!("mkdir -p {}", shell::quote(&dir.to_string_lossy())?))
    }

    fn write_file_statements(&self, path: &Path, content: &str, executable: bool) -> Result<Vec<String>, QuoteError> {
        posix_write_statements(path, content, executable)
    }
}

/// Service names from `systemctl list-unit-files` output, skipping
/// template units.
fn parse_unit_files(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|unit| unit.strip_suffix(".service"))
        .filter(|name| !name.ends_with('@'))
        .map(str::to_string)
        .collect()
}

/// Heredoc write of `content` to `path`, made executable when asked
pub(crate) fn posix_write_statements(path: &Path, content: &str, executable: bool) -> Result<Vec<String>, QuoteError> {
    let path = path.to_string_lossy();
    let mut cmds = vec![shell::heredoc_write(&path, content)?];
    if executable {
        cmds.push(format!("chmod 0755 {}", shell::quote(&path)?));
    }
    Ok(cmds)
}
