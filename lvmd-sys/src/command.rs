// SPDX-License-Identifier: GPL-3.0-only

//! Execution of `lvm` subcommands
//!
//! Every invocation is `<prefix...> <subcommand> <args...>`. The prefix
//! defaults to the bare `lvm` binary and can be replaced, e.g. with an
//! `nsenter` wrapper or, in tests, with `sh -c <script>`.

use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{CommandError, EXIT_NOT_FOUND, Result, SysError, is_not_found_message};

/// Default path of the `lvm` binary
pub const DEFAULT_LVM_PATH: &str = "/sbin/lvm";

/// Default path of `nsenter`, used to reach the host's LVM from a container
pub const NSENTER_PATH: &str = "/usr/bin/nsenter";

/// How to invoke the LVM tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LvmCommand {
    prefix: Vec<String>,
}

impl Default for LvmCommand {
    fn default() -> Self {
        Self {
            prefix: vec![DEFAULT_LVM_PATH.to_string()],
        }
    }
}

impl LvmCommand {
    /// Use `prefix` in front of every subcommand. The first element is the
    /// program to execute.
    pub fn new(prefix: Vec<String>) -> Result<Self> {
        match prefix.first() {
            Some(program) if !program.is_empty() => Ok(Self { prefix }),
            _ => Err(SysError::InvalidArgument(
                "LVM command prefix must name a program".to_string(),
            )),
        }
    }

    /// Run `lvm` inside the mount, UTS, IPC, network and PID namespaces of
    /// the host's init process.
    pub fn nsenter() -> Self {
        let prefix = [
            NSENTER_PATH,
            "-m",
            "-u",
            "-i",
            "-n",
            "-p",
            "-t",
            "1",
            DEFAULT_LVM_PATH,
        ];
        Self {
            prefix: prefix.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    pub fn prefix(&self) -> &[String] {
        &self.prefix
    }

    pub fn render(&self, subcommand: &str, args: &[String]) -> String {
        let mut parts: Vec<&str> = self.prefix.iter().map(String::as_str).collect();
        parts.push(subcommand);
        parts.extend(args.iter().map(String::as_str));
        parts.join(" ")
    }

    /// Spawn a subcommand and expose its stdout as a stream.
    ///
    /// The returned [`LvmStream`] must be closed to learn whether the command
    /// succeeded. No timeout is applied: a hung `lvm` process blocks
    /// [`LvmStream::close`] until it exits.
    pub fn stream(&self, subcommand: &str, args: &[String]) -> Result<LvmStream> {
        let command = self.render(subcommand, args);
        let Some((program, prefix_args)) = self.prefix.split_first() else {
            return Err(SysError::InvalidArgument(
                "LVM command prefix must name a program".to_string(),
            ));
        };

        debug!("Running {command}");

        let mut child = Command::new(program)
            .args(prefix_args)
            .arg(subcommand)
            .args(args)
            .env("LC_ALL", "C")
            .env("LVM_SUPPRESS_FD_WARNINGS", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SysError::Spawn {
                command: command.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buffer = Vec::new();
                let _ = pipe.read_to_end(&mut buffer);
                buffer
            })
        });

        Ok(LvmStream {
            command,
            child: Some(child),
            stdout,
            stderr,
        })
    }

    /// Run a subcommand, logging its stdout line by line.
    pub fn call(&self, subcommand: &str, args: &[String]) -> Result<()> {
        let mut stream = self.stream(subcommand, args)?;
        let mut logged = Ok(());
        for line in BufReader::new(&mut stream).lines() {
            match line {
                Ok(line) => debug!("{subcommand}: {line}"),
                Err(error) => {
                    logged = Err(SysError::Io(error));
                    break;
                }
            }
        }
        stream.close()?;
        logged
    }

    /// Run a subcommand and decode its stdout as JSON into `T`.
    pub fn call_json<T: DeserializeOwned>(&self, subcommand: &str, args: &[String]) -> Result<T> {
        let mut stream = self.stream(subcommand, args)?;
        let decoded = serde_json::from_reader::<_, T>(BufReader::new(&mut stream));
        let command = stream.command().to_string();
        stream.close()?;
        decoded.map_err(|source| SysError::Decode { command, source })
    }
}

/// Stdout of a running `lvm` subcommand.
///
/// [`LvmStream::close`] drains the remaining output, joins the process and
/// turns a failed exit into [`SysError`]. Dropping an unclosed stream kills
/// and reaps the process so it never outlives the stream.
pub struct LvmStream {
    command: String,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr: Option<JoinHandle<Vec<u8>>>,
}

impl LvmStream {
    /// Rendered command line
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Wait for the process and report how it exited.
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let drained = match self.stdout.take() {
            Some(mut stdout) => io::copy(&mut stdout, &mut io::sink()).map(|_| ()),
            None => Ok(()),
        };
        let status = child.wait();
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        let stderr = String::from_utf8_lossy(&stderr).trim().to_string();

        let status = status?;
        if status.success() {
            return drained.map_err(SysError::Io);
        }

        let exit_code = status.code();
        if exit_code == Some(EXIT_NOT_FOUND) && is_not_found_message(&stderr) {
            return Err(SysError::NotFound(stderr));
        }

        Err(CommandError {
            command: self.command.clone(),
            exit_code,
            message: format!("`{}` failed with {status}: {stderr}", self.command),
        }
        .into())
    }
}

impl Read for LvmStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stdout.as_mut() {
            Some(stdout) => stdout.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for LvmStream {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            warn!("`{}` was not closed, killing it", self.command);
            self.stdout = None;
            let _ = child.kill();
            match child.wait() {
                Ok(status) => debug!("Reaped `{}`: {status}", self.command),
                Err(error) => warn!("Failed to reap `{}`: {error}", self.command),
            }
        }
    }
}
