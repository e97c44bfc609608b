//! Backend-agnostic bootstrap document
//!
//! An attribute bag plus the three ordered command lists a first-boot agent
//! executes. Rendering takes `&self` and never mutates the document, so a
//! document renders to identical bytes however many times it is rendered.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_yaml::{Mapping, Value};

use super::{script, ConfigError};

/// Format marker the first-boot agent expects on line one
pub const CLOUD_CONFIG_HEADER: &str = "#cloud-config\n";

/// A file the first-boot agent writes before running commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteFile {
    pub path: String,
    pub content: String,
    #[serde(rename = "permissions", serialize_with = "serialize_mode")]
    pub mode: u32,
}

fn serialize_mode<S: Serializer>(mode: &u32, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{:04o}", mode))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDocument {
    attrs: BTreeMap<String, Value>,
    boot_cmds: Vec<String>,
    run_cmds: Vec<String>,
    files: Vec<WriteFile>,
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, replacing any previous value.
    pub fn set_attribute<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), ConfigError> {
        let value = serde_yaml::to_value(value)
            .map_err(|e| ConfigError::Serialization(format!("attribute {}: {}", key, e)))?;
        self.attrs.insert(key.to_string(), value);
        Ok(())
    }

    pub fn unset_attribute(&mut self, key: &str) -> Option<Value> {
        self.attrs.remove(key)
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    /// Typed view of an attribute; `None` when absent or of another shape.
    pub fn attribute_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attrs
            .get(key)
            .and_then(|v| serde_yaml::from_value(v.clone()).ok())
    }

    pub fn add_boot_command(&mut self, cmd: impl Into<String>) {
        self.boot_cmds.push(cmd.into());
    }

    pub fn add_run_command(&mut self, cmd: impl Into<String>) {
        self.run_cmds.push(cmd.into());
    }

    pub fn add_file(&mut self, path: impl Into<String>, content: impl Into<String>, mode: u32) {
        self.files.push(WriteFile {
            path: path.into(),
            content: content.into(),
            mode,
        });
    }

    pub fn boot_commands(&self) -> &[String] {
        &self.boot_cmds
    }

    pub fn run_commands(&self) -> &[String] {
        &self.run_cmds
    }

    pub fn files(&self) -> &[WriteFile] {
        &self.files
    }

    /// Put `cmds` ahead of the existing run commands (render-time copies only).
    pub(crate) fn prepend_run_commands(&mut self, cmds: Vec<String>) {
        let existing = std::mem::take(&mut self.run_cmds);
        self.run_cmds = cmds;
        self.run_cmds.extend(existing);
    }

    /// Serialize to the structured first-boot form.
    pub fn render_structured(&self) -> Result<Vec<u8>, ConfigError> {
        let mut doc = Mapping::new();
        for (key, value) in &self.attrs {
            doc.insert(Value::String(key.clone()), value.clone());
        }
        if !self.boot_cmds.is_empty() {
            doc.insert("bootcmd".into(), to_value("bootcmd", &self.boot_cmds)?);
        }
        if !self.run_cmds.is_empty() {
            doc.insert("runcmd".into(), to_value("runcmd", &self.run_cmds)?);
        }
        if !self.files.is_empty() {
            doc.insert("write_files".into(), to_value("write_files", &self.files)?);
        }

        let body = serde_yaml::to_string(&doc)
            .map_err(|e| ConfigError::Serialization(e.to_string()))?;

        let mut out = CLOUD_CONFIG_HEADER.as_bytes().to_vec();
        out.extend_from_slice(body.as_bytes());
        Ok(out)
    }

    /// Linearize into a POSIX shell script: file writes, boot commands,
    /// then run commands, in the order they were added.
    pub fn render_script(&self) -> Result<String, ConfigError> {
        self.render_script_with(&[])
    }

    /// Like [`render_script`](Self::render_script) with package management
    /// commands placed between the boot and run commands.
    pub(crate) fn render_script_with(&self, package_cmds: &[String]) -> Result<String, ConfigError> {
        let mut lines = script::preamble();
        for file in &self.files {
            lines.extend(script::write_file_commands(&file.path, &file.content, file.mode)?);
        }
        lines.extend(self.boot_cmds.iter().cloned());
        lines.extend(package_cmds.iter().cloned());
        lines.extend(self.run_cmds.iter().cloned());

        let mut out = lines.join("\n");
        out.push('\n');
        Ok(out)
    }
}

fn to_value<T: Serialize>(key: &str, value: &T) -> Result<Value, ConfigError> {
    serde_yaml::to_value(value).map_err(|e| ConfigError::Serialization(format!("{}: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let mut doc = ConfigDocument::new();
        doc.set_attribute("apt_mirror", "http://a").unwrap();
        doc.set_attribute("apt_mirror", "http://b").unwrap();
        assert_eq!(doc.attribute_as::<String>("apt_mirror").as_deref(), Some("http://b"));

        assert!(doc.unset_attribute("apt_mirror").is_some());
        assert!(doc.attribute("apt_mirror").is_none());
        assert!(doc.unset_attribute("apt_mirror").is_none());
    }

    #[test]
    fn test_attribute_as_wrong_shape() {
        let mut doc = ConfigDocument::new();
        doc.set_attribute("packages", vec!["curl"]).unwrap();
        assert_eq!(doc.attribute_as::<Vec<String>>("packages"), Some(vec!["curl".to_string()]));
        assert_eq!(doc.attribute_as::<bool>("packages"), None);
    }

    #[test]
    fn test_render_structured() {
        let mut doc = ConfigDocument::new();
        doc.set_attribute("package_update", true).unwrap();
        doc.add_boot_command("echo boot");
        doc.add_run_command("echo run");
        doc.add_file("/etc/motd", "hello\n", 0o644);

        let out = String::from_utf8(doc.render_structured().unwrap()).unwrap();
        assert!(out.starts_with("#cloud-config\n"));

        let parsed: Value = serde_yaml::from_str(&out).unwrap();
        assert_eq!(parsed["package_update"], Value::Bool(true));
        assert_eq!(parsed["bootcmd"][0], Value::String("echo boot".into()));
        assert_eq!(parsed["runcmd"][0], Value::String("echo run".into()));
        assert_eq!(parsed["write_files"][0]["path"], Value::String("/etc/motd".into()));
        assert_eq!(parsed["write_files"][0]["permissions"], Value::String("0644".into()));
    }

    #[test]
    fn test_render_structured_omits_empty_lists() {
        let out = String::from_utf8(ConfigDocument::new().render_structured().unwrap()).unwrap();
        assert!(!out.contains("runcmd"));
        assert!(!out.contains("bootcmd"));
        assert!(!out.contains("write_files"));
    }

    #[test]
    fn test_render_script_order() {
        let mut doc = ConfigDocument::new();
        doc.add_run_command("echo run-1");
        doc.add_boot_command("echo boot-1");
        doc.add_run_command("echo run-2");
        doc.add_file("/etc/motd", "hello", 0o644);

        let script = doc.render_script().unwrap();
        let file = script.find("/etc/motd").unwrap();
        let boot = script.find("echo boot-1").unwrap();
        let run1 = script.find("echo run-1").unwrap();
        let run2 = script.find("echo run-2").unwrap();
        assert!(file < boot && boot < run1 && run1 < run2);
        assert!(script.starts_with("#!/bin/sh\n"));
    }

    #[test]
    fn test_render_is_repeatable() {
        let mut doc = ConfigDocument::new();
        doc.set_attribute("apt_proxy", "http://proxy:3128").unwrap();
        doc.add_run_command("echo run");

        assert_eq!(doc.render_structured().unwrap(), doc.render_structured().unwrap());
        assert_eq!(doc.render_script().unwrap(), doc.render_script().unwrap());
    }

    #[test]
    fn test_unquotable_file_fails_script_render() {
        let mut doc = ConfigDocument::new();
        doc.add_file("/etc/bad", "nul\0byte", 0o644);
        assert!(matches!(doc.render_script(), Err(ConfigError::Serialization(_))));
    }
}
