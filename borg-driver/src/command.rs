//! Immutable borg command construction.
//!
//! A `Borg` value describes how to reach the tool (executable path, remote
//! shell, environment overrides) and hands out one `BorgInvocation` per call.
//! Invocations are plain values: program + args + env, fixed at construction.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Default location of the borg executable on the fleet image.
pub const DEFAULT_BORG_EXE: &str = "/usr/bin/borg";

/// Remote shell passed to borg via `--rsh`.
///
/// Host key checking is disabled because fleet devices are reimaged often and
/// the server's key churns with it; the identity file is the staged per-run
/// key copy.
#[derive(Debug, Clone)]
pub struct RemoteShell {
    key_path: Option<PathBuf>,
}

impl RemoteShell {
    pub fn new() -> Self {
        Self { key_path: None }
    }

    pub fn with_identity(key_path: impl Into<PathBuf>) -> Self {
        Self {
            key_path: Some(key_path.into()),
        }
    }

    /// Render the full `--rsh` argument value.
    pub fn render(&self) -> String {
        let mut rsh = String::from(
            "ssh -q -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null",
        );
        if let Some(key) = &self.key_path {
            rsh.push_str(" -i ");
            rsh.push_str(&key.to_string_lossy());
        }
        rsh
    }
}

impl Default for RemoteShell {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle describing how borg is invoked. Cheap to clone; every subcommand
/// method returns a fresh, fully-formed invocation.
#[derive(Debug, Clone)]
pub struct Borg {
    exe: PathBuf,
    remote_shell: Option<RemoteShell>,
    env: Vec<(String, String)>,
}

impl Borg {
    pub fn new() -> Self {
        Self {
            exe: PathBuf::from(DEFAULT_BORG_EXE),
            remote_shell: None,
            env: Vec::new(),
        }
    }

    pub fn with_exe(mut self, exe: impl Into<PathBuf>) -> Self {
        self.exe = exe.into();
        self
    }

    pub fn remote_shell(mut self, rsh: RemoteShell) -> Self {
        self.remote_shell = Some(rsh);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// `borg create --log-json --json <repo>::<archive> <paths…>`
    pub fn create(&self, archive: &str, paths: &[PathBuf]) -> BorgInvocation {
        let mut args = self.base_args();
        args.push("create".into());
        args.push("--log-json".into());
        args.push("--json".into());
        args.push(archive.into());
        for path in paths {
            args.push(path.as_os_str().to_os_string());
        }
        self.invocation(args)
    }

    /// `borg init --log-json --encryption none <repo>`
    ///
    /// Repositories are unencrypted on the server side; archives travel over
    /// SSH and the store itself sits on trusted hardware.
    pub fn init_unencrypted(&self, repository: &str) -> BorgInvocation {
        let mut args = self.base_args();
        args.push("init".into());
        args.push("--log-json".into());
        args.push("--encryption".into());
        args.push("none".into());
        args.push(repository.into());
        self.invocation(args)
    }

    /// `borg --log-json list --json <repo>`
    pub fn list(&self, repository: &str) -> BorgInvocation {
        let mut args = self.base_args();
        args.push("--log-json".into());
        args.push("list".into());
        args.push("--json".into());
        args.push(repository.into());
        self.invocation(args)
    }

    fn base_args(&self) -> Vec<OsString> {
        match &self.remote_shell {
            Some(rsh) => vec!["--rsh".into(), rsh.render().into()],
            None => Vec::new(),
        }
    }

    fn invocation(&self, args: Vec<OsString>) -> BorgInvocation {
        BorgInvocation {
            program: self.exe.clone(),
            args,
            env: self.env.clone(),
        }
    }
}

impl Default for Borg {
    fn default() -> Self {
        Self::new()
    }
}

/// One fully-described tool invocation. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct BorgInvocation {
    program: PathBuf,
    args: Vec<OsString>,
    env: Vec<(String, String)>,
}

impl BorgInvocation {
    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub(crate) fn to_command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        command.envs(self.env.iter().map(|(k, v)| (k, v)));
        command
    }
}
