//! Service reconciliation
//!
//! Converges one supervised process on a live machine to its declarative
//! [`ServiceDescriptor`]. Every fact about the live system (unit file
//! present, content current, enabled, running) is recomputed on each call
//! through a [`CommandRunner`]; nothing is cached.
//!
//! ```text
//!   install()
//!     │
//!     ├─ exists_and_matches() + enabled() ──▶ converged? ──yes──▶ done
//!     │                                           │no
//!     ├─ exists? ──yes──▶ stop_and_remove()       │
//!     ├─ write unit file (+ extra script) ◀───────┘
//!     ├─ enable
//!     └─ start
//! ```

pub mod runner;
mod systemd;
mod upstart;
mod windows;

pub use runner::{CommandOutput, CommandRunner, RecordingRunner, SystemRunner};

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;

use crate::shell::QuoteError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid service: {0}")]
    Validation(String),

    #[error("cannot render service: {0}")]
    Serialization(String),

    #[error("{op}: {command}: {detail}")]
    LiveSystem {
        op: &'static str,
        command: String,
        detail: String,
    },

    #[error("{op}: {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<QuoteError> for ServiceError {
    fn from(e: QuoteError) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Declarative description of one supervised process
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub description: String,
    pub command: String,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Body of a script run before the process starts
    #[serde(default)]
    pub extra_script: Option<String>,
    /// Where unit files are written; the init system's default when unset
    #[serde(default)]
    pub init_dir: Option<PathBuf>,
    /// File the process's stdout and stderr are appended to
    #[serde(default)]
    pub output: Option<String>,
    /// Resource limits by lowercase name (`nofile`, `nproc`, ...)
    #[serde(default)]
    pub limits: BTreeMap<String, String>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_extra_script(mut self, body: impl Into<String>) -> Self {
        self.extra_script = Some(body.into());
        self
    }

    pub fn with_init_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.init_dir = Some(dir.into());
        self
    }

    pub fn with_output(mut self, path: impl Into<String>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn with_limit(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.limits.insert(name.into(), value.into());
        self
    }

    /// Extra script body, if one is configured and non-empty
    pub fn extra_script(&self) -> Option<&str> {
        self.extra_script.as_deref().filter(|s| !s.is_empty())
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.name.is_empty() {
            return Err(ServiceError::Validation("missing name".into()));
        }
        if self.name.contains(['/', '\\', '\0']) || self.name.contains(char::is_whitespace) {
            return Err(ServiceError::Validation(format!("bad name {:?}", self.name)));
        }
        if self.description.is_empty() {
            return Err(ServiceError::Validation(format!("{}: missing description", self.name)));
        }
        if self.command.is_empty() {
            return Err(ServiceError::Validation(format!("{}: missing command", self.name)));
        }
        if self.init_dir.as_ref().is_some_and(|d| d.as_os_str().is_empty()) {
            return Err(ServiceError::Validation(format!("{}: missing init directory", self.name)));
        }
        Ok(())
    }
}

/// Init system a service is registered with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum InitSystem {
    Systemd { user: bool },
    Upstart,
    Windows,
}

impl InitSystem {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "systemd" => Some(Self::Systemd { user: false }),
            "systemd-user" => Some(Self::Systemd { user: true }),
            "upstart" => Some(Self::Upstart),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Systemd { user: false } => "systemd",
            Self::Systemd { user: true } => "systemd-user",
            Self::Upstart => "upstart",
            Self::Windows => "windows",
        }
    }

    /// Init system of the local host
    pub fn detect() -> Option<Self> {
        if cfg!(windows) {
            return Some(Self::Windows);
        }
        if Path::new("/run/systemd/system").is_dir() {
            return Some(Self::Systemd { user: false });
        }
        if Path::new("/sbin/initctl").exists() {
            return Some(Self::Upstart);
        }
        None
    }

    pub(crate) fn backend(self) -> Box<dyn InitBackend> {
        match self {
            Self::Systemd { user } => Box::new(systemd::Systemd { user }),
            Self::Upstart => Box::new(upstart::Upstart),
            Self::Windows => Box::new(windows::WindowsServices),
        }
    }

    /// Directory unit files go in when a descriptor names none
    pub fn default_init_dir(self) -> PathBuf {
        self.backend().default_init_dir()
    }
}

impl fmt::Display for InitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InitSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown init system: {}", s))
    }
}

impl TryFrom<String> for InitSystem {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Per-init-system syntax and commands
///
/// Commands are argv vectors for live use. `script_statement` turns one into
/// a line of the init system's install script (POSIX shell or PowerShell).
pub(crate) trait InitBackend: fmt::Debug + Send + Sync {
    fn default_init_dir(&self) -> PathBuf;

    fn unit_file_name(&self, name: &str) -> String;

    fn extra_script_file_name(&self, name: &str) -> String;

    fn render_unit(&self, desc: &ServiceDescriptor, extra_script: Option<&Path>) -> Result<String, ServiceError>;

    fn render_extra_script(&self, body: &str) -> String;

    fn status_query(&self, name: &str) -> Vec<String>;

    fn enabled_query(&self, name: &str) -> Vec<String> {
        self.status_query(name)
    }

    /// Regex matched against the enabled query's output
    fn enabled_pattern(&self, name: &str, unit_path: &Path) -> String;

    /// Regex matched against the status query's output
    fn running_pattern(&self, name: &str) -> String;

    fn enable_command(&self, name: &str, unit_path: &Path) -> Vec<String>;

    fn disable_command(&self, name: &str) -> Option<Vec<String>>;

    fn start_command(&self, name: &str) -> Vec<String>;

    fn stop_command(&self, name: &str) -> Vec<String>;

    fn list_services(&self, runner: &dyn CommandRunner, init_dir: &Path) -> Result<Vec<String>, ServiceError>;

    fn make_dir_statement(&self, dir: &Path) -> Result<String, QuoteError>;

    fn write_file_statements(&self, path: &Path, content: &str, executable: bool) -> Result<Vec<String>, QuoteError>;

    fn script_statement(&self, argv: &[String]) -> Result<String, QuoteError> {
        crate::shell::join(argv.iter().map(String::as_str))
    }
}

/// Join `file` onto `dir`, keeping Windows separators for Windows paths
/// even when running elsewhere.
pub(crate) fn join_path(dir: &Path, file: &str) -> PathBuf {
    let s = dir.to_string_lossy();
    if s.contains('\\') && !s.contains('/') {
        PathBuf::from(format!("{}\\{}", s.trim_end_matches('\\'), file))
    } else {
        dir.join(file)
    }
}

/// Run `argv`, failing on spawn errors and non-zero exits.
pub(crate) fn run_checked(
    runner: &dyn CommandRunner,
    op: &'static str,
    argv: &[String],
) -> Result<CommandOutput, ServiceError> {
    let command = argv.join(" ");
    let Some((program, args)) = argv.split_first() else {
        return Err(ServiceError::LiveSystem {
            op,
            command,
            detail: "empty command".into(),
        });
    };
    let out = runner.run(program, args).map_err(|e| ServiceError::LiveSystem {
        op,
        command: command.clone(),
        detail: e.to_string(),
    })?;
    if !out.success() {
        return Err(ServiceError::LiveSystem {
            op,
            command,
            detail: out.detail(),
        });
    }
    Ok(out)
}

fn read_optional(op: &'static str, path: &Path) -> Result<Option<Vec<u8>>, ServiceError> {
    match std::fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ServiceError::Io {
            op,
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn remove_optional(op: &'static str, path: &Path) -> Result<(), ServiceError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ServiceError::Io {
            op,
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_file(op: &'static str, path: &Path, content: &[u8], executable: bool) -> Result<(), ServiceError> {
    let io_err = |source| ServiceError::Io {
        op,
        path: path.to_path_buf(),
        source,
    };
    std::fs::write(path, content).map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = if executable { 0o755 } else { 0o644 };
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(io_err)?;
    }
    #[cfg(not(unix))]
    let _ = executable;

    Ok(())
}

/// A service bound to an init system and a way of running commands
pub struct Service<R: CommandRunner = SystemRunner> {
    descriptor: ServiceDescriptor,
    init: InitSystem,
    backend: Box<dyn InitBackend>,
    runner: R,
}

impl<R: CommandRunner> fmt::Debug for Service<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("descriptor", &self.descriptor)
            .field("init", &self.init)
            .finish()
    }
}

impl<R: CommandRunner> Service<R> {
    pub fn new(descriptor: ServiceDescriptor, init: InitSystem, runner: R) -> Self {
        Self {
            descriptor,
            init,
            backend: init.backend(),
            runner,
        }
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub fn init_system(&self) -> InitSystem {
        self.init
    }

    /// Replace the descriptor wholesale; takes effect at the next install.
    pub fn update_descriptor(&mut self, descriptor: ServiceDescriptor) {
        self.descriptor = descriptor;
    }

    pub fn init_dir(&self) -> PathBuf {
        self.descriptor
            .init_dir
            .clone()
            .unwrap_or_else(|| self.backend.default_init_dir())
    }

    pub fn unit_path(&self) -> PathBuf {
        join_path(&self.init_dir(), &self.backend.unit_file_name(&self.descriptor.name))
    }

    pub fn extra_script_path(&self) -> Option<PathBuf> {
        self.descriptor.extra_script()?;
        Some(join_path(
            &self.init_dir(),
            &self.backend.extra_script_file_name(&self.descriptor.name),
        ))
    }

    /// Unit definition for the current descriptor
    pub fn render(&self) -> Result<Vec<u8>, ServiceError> {
        self.descriptor.validate()?;
        let extra = self.extra_script_path();
        let unit = self.backend.render_unit(&self.descriptor, extra.as_deref())?;
        Ok(unit.into_bytes())
    }

    pub fn render_extra_script(&self) -> Option<Vec<u8>> {
        self.descriptor
            .extra_script()
            .map(|body| self.backend.render_extra_script(body).into_bytes())
    }

    /// Whether the unit file exists, and whether it (and the extra script)
    /// match a fresh render. A missing file is not an error.
    pub fn exists_and_matches(&self) -> Result<(bool, bool), ServiceError> {
        let expected = self.render()?;
        let Some(current) = read_optional("exists", &self.unit_path())? else {
            return Ok((false, false));
        };
        let mut matches = current == expected;

        if let (Some(path), Some(expected)) = (self.extra_script_path(), self.render_extra_script()) {
            matches &= read_optional("exists", &path)?.is_some_and(|current| current == expected);
        }
        Ok((true, matches))
    }

    fn query_matches(&self, argv: &[String], pattern: &str) -> bool {
        let Some((program, args)) = argv.split_first() else {
            return false;
        };
        let out = match self.runner.run(program, args) {
            Ok(out) => out,
            Err(e) => {
                log::debug!("Status query {} failed: {}", argv.join(" "), e);
                return false;
            }
        };
        match Regex::new(pattern) {
            Ok(re) => re.is_match(&out.stdout),
            Err(e) => {
                log::warn!("Bad status pattern {:?}: {}", pattern, e);
                false
            }
        }
    }

    /// Whether the init system reports the service enabled. Query failures
    /// count as not enabled.
    pub fn enabled(&self) -> bool {
        let name = &self.descriptor.name;
        self.query_matches(
            &self.backend.enabled_query(name),
            &self.backend.enabled_pattern(name, &self.unit_path()),
        )
    }

    /// Whether the init system reports the service running. Query failures
    /// count as not running.
    pub fn running(&self) -> bool {
        let name = &self.descriptor.name;
        self.query_matches(&self.backend.status_query(name), &self.backend.running_pattern(name))
    }

    /// Unit file present and enabled
    pub fn installed(&self) -> Result<bool, ServiceError> {
        let (exists, _) = self.exists_and_matches()?;
        Ok(exists && self.enabled())
    }

    /// Unit file current and enabled
    pub fn exists(&self) -> Result<bool, ServiceError> {
        let (_, matches) = self.exists_and_matches()?;
        Ok(matches && self.enabled())
    }

    fn exec(&self, op: &'static str, argv: &[String]) -> Result<CommandOutput, ServiceError> {
        run_checked(&self.runner, op, argv)
    }

    fn write_files(&self) -> Result<(), ServiceError> {
        let dir = self.init_dir();
        std::fs::create_dir_all(&dir).map_err(|source| ServiceError::Io {
            op: "install",
            path: dir.clone(),
            source,
        })?;

        let unit = self.render()?;
        write_file("install", &self.unit_path(), &unit, false)?;
        if let (Some(path), Some(script)) = (self.extra_script_path(), self.render_extra_script()) {
            write_file("install", &path, &script, true)?;
        }
        Ok(())
    }

    /// Converge the live system to the descriptor.
    pub fn install(&self) -> Result<(), ServiceError> {
        let name = &self.descriptor.name;
        let (exists, matches) = self.exists_and_matches()?;
        if matches && self.enabled() {
            log::info!("Service {} is already installed", name);
            return Ok(());
        }
        // a registration without its unit file still has to be torn down
        if exists || self.enabled() {
            log::info!("Replacing stale service {}", name);
            self.stop_and_remove()?;
        }

        self.write_files()?;
        log::info!("Enabling service {}", name);
        self.exec("install", &self.backend.enable_command(name, &self.unit_path()))?;
        self.start()
    }

    pub fn start(&self) -> Result<(), ServiceError> {
        if self.running() {
            return Ok(());
        }
        log::info!("Starting service {}", self.descriptor.name);
        self.exec("start", &self.backend.start_command(&self.descriptor.name))?;
        Ok(())
    }

    pub fn stop(&self) -> Result<(), ServiceError> {
        if !self.running() {
            return Ok(());
        }
        log::info!("Stopping service {}", self.descriptor.name);
        self.exec("stop", &self.backend.stop_command(&self.descriptor.name))?;
        Ok(())
    }

    /// Disable the service and delete its files. Disabling an already
    /// disabled or unknown service is not an error.
    pub fn remove(&self) -> Result<(), ServiceError> {
        let name = &self.descriptor.name;
        if let Some(argv) = self.backend.disable_command(name) {
            if let Err(e) = self.exec("remove", &argv) {
                log::debug!("Ignoring disable failure for {}: {}", name, e);
            }
        }
        remove_optional("remove", &self.unit_path())?;
        // the file may outlive an extra script dropped from the descriptor
        let extra = join_path(&self.init_dir(), &self.backend.extra_script_file_name(name));
        remove_optional("remove", &extra)?;
        log::info!("Removed service {}", name);
        Ok(())
    }

    pub fn stop_and_remove(&self) -> Result<(), ServiceError> {
        self.stop()?;
        self.remove()
    }

    /// Script statements installing the service on an empty machine
    pub fn install_commands(&self) -> Result<Vec<String>, ServiceError> {
        let unit = String::from_utf8(self.render()?)
            .map_err(|e| ServiceError::Serialization(e.to_string()))?;
        let name = &self.descriptor.name;
        let unit_path = self.unit_path();

        let mut cmds = vec![self.backend.make_dir_statement(&self.init_dir())?];
        if let (Some(path), Some(body)) = (self.extra_script_path(), self.descriptor.extra_script()) {
            let script = self.backend.render_extra_script(body);
            cmds.extend(self.backend.write_file_statements(&path, &script, true)?);
        }
        cmds.extend(self.backend.write_file_statements(&unit_path, &unit, false)?);
        cmds.push(self.backend.script_statement(&self.backend.enable_command(name, &unit_path))?);
        cmds.push(self.backend.script_statement(&self.backend.start_command(name))?);
        Ok(cmds)
    }
}

/// Names of the services known to `init`
///
/// `init_dir` only matters to init systems that are listed by scanning
/// their unit directory.
pub fn list_services<R: CommandRunner>(
    init: InitSystem,
    init_dir: Option<&Path>,
    runner: &R,
) -> Result<Vec<String>, ServiceError> {
    let backend = init.backend();
    let dir = init_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| backend.default_init_dir());
    let mut names = backend.list_services(runner, &dir)?;
    names.sort();
    names.dedup();
    Ok(names)
}
