//! Windows service manager
//!
//! The "unit file" is a PowerShell registration script: enabling a service
//! means running it, which creates the service with `New-Service`. Every
//! live command goes through `powershell.exe -Command`.

use std::path::{Path, PathBuf};

use super::{run_checked, CommandRunner, InitBackend, ServiceDescriptor, ServiceError};
use crate::shell::{self, QuoteError};

const SERVICE_DIR: &str = r"C:\ProgramData\sysprov\services";

const CRLF: &str = "\r\n";

#[derive(Debug, Clone, Copy)]
pub(crate) struct WindowsServices;

fn powershell(statement: String) -> Vec<String> {
    [
        "powershell.exe",
        "-NoProfile",
        "-NonInteractive",
        "-ExecutionPolicy",
        "Bypass",
        "-Command",
    ]
    .iter()
    .map(|s| s.to_string())
    .chain(std::iter::once(statement))
    .collect()
}

fn crlf_lines(lines: &[String]) -> String {
    let mut out = lines.join(CRLF);
    out.push_str(CRLF);
    out
}

impl InitBackend for WindowsServices {
    fn default_init_dir(&self) -> PathBuf {
        PathBuf::from(SERVICE_DIR)
    }

    fn unit_file_name(&self, name: &str) -> String {
        format!("{}.ps1", name)
    }

    fn extra_script_file_name(&self, name: &str) -> String {
        format!("{}-extra.ps1", name)
    }

    /// The service manager has no pre-start hook, so the extra script runs
    /// once at registration.
    fn render_unit(&self, desc: &ServiceDescriptor, extra_script: Option<&Path>) -> Result<String, ServiceError> {
        let name = shell::ps_quote(&desc.name)?;
        let mut lines = vec!["$ErrorActionPreference = \"Stop\"".to_string()];
        if let Some(path) = extra_script {
            lines.push(format!("& {}", shell::ps_quote(&path.to_string_lossy())?));
        }
        lines.push(format!(
            "New-Service -Name {} -DisplayName {} -Description {} -BinaryPathName {} -StartupType Automatic | Out-Null",
            name,
            shell::ps_quote(&desc.description)?,
            shell::ps_quote(&desc.description)?,
            shell::ps_quote(&desc.command)?,
        ));
        if !desc.environment.is_empty() {
            let entries = desc
                .environment
                .iter()
                .map(|(k, v)| shell::ps_quote(&format!("{}={}", k, v)))
                .collect::<Result<Vec<_>, _>>()?;
            lines.push(format!(
                "New-ItemProperty -Path {} -Name Environment -PropertyType MultiString -Value @({}) -Force | Out-Null",
                shell::ps_quote(&format!(r"HKLM:\SYSTEM\CurrentControlSet\Services\{}", desc.name))?,
                entries.join(", "),
            ));
        }
        if desc.output.is_some() || !desc.limits.is_empty() {
            log::debug!("Output redirection and limits are not supported for Windows service {}", desc.name);
        }
        lines.push(format!("sc.exe failure {} reset= 5 actions= restart/1000 | Out-Null", name));
        Ok(crlf_lines(&lines))
    }

    fn render_extra_script(&self, body: &str) -> String {
        let mut lines = vec!["$ErrorActionPreference = \"Stop\"".to_string()];
        lines.extend(body.lines().map(str::to_string));
        crlf_lines(&lines)
    }

    fn status_query(&self, name: &str) -> Vec<String> {
        powershell(format!(
            "Get-Service -Name {} | Format-List Name,Status,StartType",
            shell::ps_quote(name).unwrap_or_default()
        ))
    }

    fn enabled_pattern(&self, _name: &str, _unit_path: &Path) -> String {
        r"StartType\s*:\s*Automatic".to_string()
    }

    fn running_pattern(&self, _name: &str) -> String {
        r"Status\s*:\s*Running".to_string()
    }

    fn enable_command(&self, _name: &str, unit_path: &Path) -> Vec<String> {
        powershell(format!(
            "& {}",
            shell::ps_quote(&unit_path.to_string_lossy()).unwrap_or_default()
        ))
    }

    fn disable_command(&self, name: &str) -> Option<Vec<String>> {
        Some(powershell(format!(
            "sc.exe delete {}",
            shell::ps_quote(name).unwrap_or_default()
        )))
    }

    fn start_command(&self, name: &str) -> Vec<String> {
        powershell(format!("Start-Service -Name {}", shell::ps_quote(name).unwrap_or_default()))
    }

    fn stop_command(&self, name: &str) -> Vec<String> {
        powershell(format!("Stop-Service -Name {}", shell::ps_quote(name).unwrap_or_default()))
    }

    fn list_services(&self, runner: &dyn CommandRunner, _init_dir: &Path) -> Result<Vec<String>, ServiceError> {
        let out = run_checked(runner, "list", &powershell("(Get-Service).Name".to_string()))?;
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn make_dir_statement(&self, dir: &Path) -> Result<String, QuoteError> {
        Ok(format!(
            "New-Item -ItemType Directory -Force -Path {} | Out-Null",
            shell::ps_quote(&dir.to_string_lossy())?
        ))
    }

    fn write_file_statements(&self, path: &Path, content: &str, _executable: bool) -> Result<Vec<String>, QuoteError> {
        Ok(vec![shell::ps_write_file(&path.to_string_lossy(), content)?])
    }

    /// The install script is already PowerShell, so use the bare statement.
    fn script_statement(&self, argv: &[String]) -> Result<String, QuoteError> {
        Ok(argv.last().cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_registration_script() {
        let desc = ServiceDescriptor::new("agentd", "agent", r"C:\agent\agentd.exe --run").with_env("LOG", "debug");
        let script = WindowsServices
            .render_unit(&desc, Some(Path::new(r"C:\svc\agentd-extra.ps1")))
            .unwrap();
        let lines: Vec<&str> = script.split("\r\n").collect();

        assert_eq!(lines[0], "$ErrorActionPreference = \"Stop\"");
        assert_eq!(lines[1], r"& 'C:\svc\agentd-extra.ps1'");
        assert!(lines[2].starts_with("New-Service -Name 'agentd' -DisplayName 'agent'"));
        assert!(lines[2].contains(r"-BinaryPathName 'C:\agent\agentd.exe --run'"));
        assert!(lines[3].contains(r"'HKLM:\SYSTEM\CurrentControlSet\Services\agentd'"));
        assert!(lines[3].contains("@('LOG=debug')"));
        assert_eq!(lines[4], "sc.exe failure 'agentd' reset= 5 actions= restart/1000 | Out-Null");
        assert!(script.ends_with("\r\n"));
    }

    #[test]
    fn test_commands_go_through_powershell() {
        let argv = WindowsServices.start_command("agentd");
        assert_eq!(argv[0], "powershell.exe");
        assert_eq!(argv.last().map(String::as_str), Some("Start-Service -Name 'agentd'"));
        assert_eq!(
            WindowsServices.script_statement(&argv).unwrap(),
            "Start-Service -Name 'agentd'"
        );
    }

    #[test]
    fn test_status_patterns() {
        let out = "Name      : agentd\r\nStatus    : Running\r\nStartType : Automatic\r\n";
        let running = regex::Regex::new(&WindowsServices.running_pattern("agentd")).unwrap();
        let enabled = regex::Regex::new(&WindowsServices.enabled_pattern("agentd", Path::new("x"))).unwrap();
        assert!(running.is_match(out));
        assert!(enabled.is_match(out));
        assert!(!running.is_match("Status    : Stopped"));
    }

    #[test]
    fn test_extra_script_uses_crlf() {
        assert_eq!(
            WindowsServices.render_extra_script("Write-Host one\nWrite-Host two\n"),
            "$ErrorActionPreference = \"Stop\"\r\nWrite-Host one\r\nWrite-Host two\r\n"
        );
    }
}
