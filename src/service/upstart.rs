//! Upstart job rendering and control

use std::path::{Path, PathBuf};

use super::systemd::posix_write_statements;
use super::{CommandRunner, InitBackend, ServiceDescriptor, ServiceError};
use crate::shell::{self, QuoteError};

const JOB_DIR: &str = "/etc/init";

#[derive(Debug, Clone, Copy)]
pub(crate) struct Upstart;

fn single_line(field: &str, value: &str) -> Result<(), ServiceError> {
    if value.contains('\n') || value.contains('\r') {
        return Err(ServiceError::Serialization(format!("{} contains a newline", field)));
    }
    Ok(())
}

fn quoted(field: &str, value: &str) -> Result<String, ServiceError> {
    single_line(field, value)?;
    Ok(format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\"")))
}

impl InitBackend for Upstart {
    fn default_init_dir(&self) -> PathBuf {
        PathBuf::from(JOB_DIR)
    }

    fn unit_file_name(&self, name: &str) -> String {
        format!("{}.conf", name)
    }

    fn extra_script_file_name(&self, name: &str) -> String {
        format!("{}-extra.sh", name)
    }

    fn render_unit(&self, desc: &ServiceDescriptor, extra_script: Option<&Path>) -> Result<String, ServiceError> {
        let mut lines = vec![
            format!("description {}", quoted("description", &desc.description)?),
            "author \"sysprov\"".to_string(),
            "start on runlevel [2345]".to_string(),
            "stop on runlevel [!2345]".to_string(),
            "respawn".to_string(),
            "normal exit 0".to_string(),
        ];
        for (key, value) in &desc.environment {
            if key.is_empty() || key.contains('=') || key.contains(char::is_whitespace) {
                return Err(ServiceError::Serialization(format!("bad environment variable name {:?}", key)));
            }
            lines.push(format!("env {}={}", key, quoted(key, value)?));
        }
        for (name, value) in &desc.limits {
            single_line(name, value)?;
            // one value sets both the soft and hard limit
            let value = if value.contains(' ') {
                value.clone()
            } else {
                format!("{} {}", value, value)
            };
            lines.push(format!("limit {} {}", name, value));
        }
        if let Some(path) = extra_script {
            lines.push(format!("pre-start exec {}", path.to_string_lossy()));
        }

        single_line("command", &desc.command)?;
        match desc.output.as_deref().filter(|o| !o.is_empty()) {
            Some(output) => {
                single_line("output", output)?;
                lines.push("script".to_string());
                lines.push(format!("  exec {} >> {} 2>&1", desc.command, output));
                lines.push("end script".to_string());
            }
            None => lines.push(format!("exec {}", desc.command)),
        }

        let mut job = lines.join("\n");
        job.push('\n');
        Ok(job)
    }

    fn render_extra_script(&self, body: &str) -> String {
        let mut script = format!("#!/usr/bin/env bash\n\n{}", body);
        if !script.ends_with('\n') {
            script.push('\n');
        }
        script
    }

    fn status_query(&self, name: &str) -> Vec<String> {
        vec!["status".to_string(), name.to_string()]
    }

    fn enabled_query(&self, name: &str) -> Vec<String> {
        vec!["initctl".to_string(), "show-config".to_string(), name.to_string()]
    }

    fn enabled_pattern(&self, _name: &str, _unit_path: &Path) -> String {
        r"(?m)^\s*start on".to_string()
    }

    fn running_pattern(&self, name: &str) -> String {
        format!(r"(?m)^{} start/running", regex::escape(name))
    }

    fn enable_command(&self, _name: &str, _unit_path: &Path) -> Vec<String> {
        vec!["initctl".to_string(), "reload-configuration".to_string()]
    }

    /// Jobs are enabled by their file existing; removal deletes it.
    fn disable_command(&self, _name: &str) -> Option<Vec<String>> {
        None
    }

    fn start_command(&self, name: &str) -> Vec<String> {
        vec!["start".to_string(), name.to_string()]
    }

    fn stop_command(&self, name: &str) -> Vec<String> {
        vec!["stop".to_string(), name.to_string()]
    }

    fn list_services(&self, _runner: &dyn CommandRunner, init_dir: &Path) -> Result<Vec<String>, ServiceError> {
        let pattern = init_dir.join("*.conf");
        let pattern = pattern.to_string_lossy();
        let paths = glob::glob(&pattern)
            .map_err(|e| ServiceError::Validation(format!("bad init directory {:?}: {}", init_dir, e)))?;

        let mut names = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) => {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        names.push(stem.to_string());
                    }
                }
                Err(e) => log::warn!("Skipping unreadable job file: {}", e),
            }
        }
        Ok(names)
    }

    fn make_dir_statement(&self, dir: &Path) -> Result<String, QuoteError> {
        Ok(format!("mkdir -p {}", shell::quote(&dir.to_string_lossy())?))
    }

    fn write_file_statements(&self, path: &Path, content: &str, executable: bool) -> Result<Vec<String>, QuoteError> {
        posix_write_statements(path, content, executable)
    }
}
