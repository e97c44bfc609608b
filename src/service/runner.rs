//! External command execution
//!
//! The only boundary between the reconciliation engine and the live system.
//! Backends describe commands as argv; a runner executes them and hands back
//! exit status and captured text.

use std::io;
use std::process::Command;
use std::sync::{Arc, Mutex};

/// Captured result of one external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful run printing `stdout`
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Run that exited with `code`, printing `stdout`
    pub fn exited(code: i32, stdout: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Best human-readable explanation of a failed run
    pub fn detail(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        match self.code {
            Some(code) if text.is_empty() => format!("exit status {}", code),
            Some(code) => format!("exit status {}: {}", code, text),
            None => format!("killed by signal: {}", text),
        }
    }
}

/// Runs external commands synchronously
pub trait CommandRunner {
    /// Run `program` with `args` to completion. `Err` means the program
    /// could not be run at all; a non-zero exit is still `Ok`.
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        (**self).run(program, args)
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for Arc<T> {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        (**self).run(program, args)
    }
}

/// Runs commands on the local host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        log::debug!("Running {} {}", program, args.join(" "));
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Debug, Clone)]
enum Response {
    Output(CommandOutput),
    Unavailable,
}

/// Fake runner that records every command line and answers from rules.
///
/// A rule matches when the recorded command line starts with its prefix.
/// The most recently added matching rule wins; unmatched commands succeed
/// with empty output.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<String>>,
    rules: Mutex<Vec<(String, Response)>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with `output`.
    pub fn respond(&self, prefix: impl Into<String>, output: CommandOutput) {
        lock(&self.rules).push((prefix.into(), Response::Output(output)));
    }

    /// Fail to spawn commands starting with `prefix`.
    pub fn unavailable(&self, prefix: impl Into<String>) {
        lock(&self.rules).push((prefix.into(), Response::Unavailable));
    }

    /// Every command line run so far, as `program arg arg...`
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Recorded command lines not matching any of `prefixes`
    pub fn calls_except(&self, prefixes: &[&str]) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !prefixes.iter().any(|p| c.starts_with(p)))
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.calls).clear();
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        let mut line = program.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        lock(&self.calls).push(line.clone());

        let rules = lock(&self.rules);
        match rules.iter().rev().find(|(prefix, _)| line.starts_with(prefix.as_str())) {
            Some((_, Response::Output(out))) => Ok(out.clone()),
            Some((_, Response::Unavailable)) => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: command not found", program),
            )),
            None => Ok(CommandOutput::ok("")),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_recording_runner_records_and_answers() {
        let runner = RecordingRunner::new();
        runner.respond("systemctl status", CommandOutput::exited(3, "Active: inactive (dead)"));
        runner.respond("systemctl status agentd", CommandOutput::ok("Active: active (running)"));

        let out = runner.run("systemctl", &args(&["status", "agentd.service"])).unwrap();
        assert!(out.success());
        assert!(out.stdout.contains("running"));

        let out = runner.run("systemctl", &args(&["status", "other.service"])).unwrap();
        assert_eq!(out.code, Some(3));

        let out = runner.run("systemctl", &args(&["start", "agentd.service"])).unwrap();
        assert!(out.success());

        assert_eq!(
            runner.calls(),
            vec![
                "systemctl status agentd.service",
                "systemctl status other.service",
                "systemctl start agentd.service",
            ]
        );
        assert_eq!(runner.calls_except(&["systemctl status"]), vec!["systemctl start agentd.service"]);
    }

    #[test]
    fn test_recording_runner_unavailable() {
        let runner = RecordingRunner::new();
        runner.unavailable("initctl");
        let err = runner.run("initctl", &args(&["reload-configuration"])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_system_runner_captures_output() {
        let out = SystemRunner.run("/bin/sh", &args(&["-c", "echo out; echo err >&2; exit 4"])).unwrap();
        assert_eq!(out.code, Some(4));
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.detail(), "exit status 4: err");
    }

    #[test]
    fn test_system_runner_missing_program() {
        assert!(SystemRunner.run("/nonexistent/sysprov-test", &[]).is_err());
    }
}
