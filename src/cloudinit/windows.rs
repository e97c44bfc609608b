//! Windows rendering rules
//!
//! Windows has no structured first-boot document: both render forms produce
//! the same PowerShell script, run by the first-boot agent because of the
//! `#ps1_sysnative` marker on its first line.

use super::{CloudConfig, ConfigError};
use crate::shell;

/// First line telling the first-boot agent to run the rest in 64-bit PowerShell
pub const PS1_HEADER: &str = "#ps1_sysnative";

const CRLF: &str = "\r\n";

pub(super) fn render(cfg: &CloudConfig) -> Result<Vec<u8>, ConfigError> {
    let doc = cfg.document();

    let mut script = String::from(PS1_HEADER);
    script.push_str(CRLF);
    for file in doc.files() {
        script.push_str(CRLF);
        script.push_str(&shell::ps_write_file(&file.path, &file.content)?);
    }
    for cmd in doc.boot_commands().iter().chain(doc.run_commands()) {
        script.push_str(CRLF);
        script.push_str(cmd);
    }
    Ok(script.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::super::OsFamily;
    use super::*;

    #[test]
    fn test_render_joins_commands_with_crlf() {
        let mut cfg = CloudConfig::new(OsFamily::Windows, None);
        cfg.add_run_command("Start-Service agentd");
        cfg.add_boot_command("Set-ExecutionPolicy Bypass");

        let out = String::from_utf8(render(&cfg).unwrap()).unwrap();
        assert_eq!(
            out,
            "#ps1_sysnative\r\n\r\nSet-ExecutionPolicy Bypass\r\nStart-Service agentd"
        );
    }

    #[test]
    fn test_script_equals_structured() {
        let mut cfg = CloudConfig::new(OsFamily::Windows, None);
        cfg.add_file(r"C:\sysprov\motd.txt", "hello", 0o644);
        cfg.add_run_command("Get-Service");

        let structured = cfg.render_structured().unwrap();
        let script = cfg.render_script().unwrap();
        assert_eq!(structured, script.into_bytes());
    }

    #[test]
    fn test_empty_document_is_just_the_header() {
        let cfg = CloudConfig::new(OsFamily::Windows, None);
        assert_eq!(cfg.render_script().unwrap(), "#ps1_sysnative\r\n");
    }

    #[test]
    fn test_files_written_before_commands() {
        let mut cfg = CloudConfig::new(OsFamily::Windows, None);
        cfg.add_run_command("Get-Content C:\\sysprov\\motd.txt");
        cfg.add_file(r"C:\sysprov\motd.txt", "hello", 0o644);

        let out = cfg.render_script().unwrap();
        let write = out.find("WriteAllText").unwrap();
        let read = out.find("Get-Content").unwrap();
        assert!(write < read);
        assert!(!out.replace("\r\n", "").contains('\n'));
    }
}
