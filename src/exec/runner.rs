//! Spawning external tools.

use super::Invocation;
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Number of trailing stderr lines kept for the failure message.
const STDERR_TAIL_LINES: usize = 20;

/// Runs one invocation to completion.
///
/// `Ok(())` means the tool exited successfully; anything else, including a
/// failure to spawn, is an `Err` describing what went wrong.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    async fn run(&mut self, invocation: &Invocation) -> Result<()>;
}

impl<R: CommandRunner> CommandRunner for &mut R {
    async fn run(&mut self, invocation: &Invocation) -> Result<()> {
        (**self).run(invocation).await
    }
}

/// Runs tools as child processes, forwarding their output to the log.
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ProcessRunner {
    async fn run(&mut self, invocation: &Invocation) -> Result<()> {
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", invocation.program))?;

        let stdout = child.stdout.take().context("Child stdout not captured")?;
        let stderr = child.stderr.take().context("Child stderr not captured")?;
        let mut out_reader = BufReader::new(stdout);
        let mut err_reader = BufReader::new(stderr);
        let mut out_buf = Vec::new();
        let mut err_buf = Vec::new();

        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut out_done = false;
        let mut err_done = false;

        // Drain both pipes together so neither can fill up and stall the child.
        // Output is raw bytes; only the exit status decides success.
        while !(out_done && err_done) {
            tokio::select! {
                read = out_reader.read_until(b'\n', &mut out_buf), if !out_done => {
                    if let Some(line) = take_line(&mut out_buf) {
                        tracing::info!(target: "tool", "{}", line);
                    }
                    out_done = end_of_stream(read, "stdout", &invocation.program);
                }
                read = err_reader.read_until(b'\n', &mut err_buf), if !err_done => {
                    if let Some(line) = take_line(&mut err_buf) {
                        tracing::info!(target: "tool", "{}", line);
                        if stderr_tail.len() == STDERR_TAIL_LINES {
                            stderr_tail.pop_front();
                        }
                        stderr_tail.push_back(line);
                    }
                    err_done = end_of_stream(read, "stderr", &invocation.program);
                }
            }
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("Failed to wait for {}", invocation.program))?;

        if status.success() {
            return Ok(());
        }

        let stderr_text = Vec::from(stderr_tail).join("\n");
        if stderr_text.is_empty() {
            anyhow::bail!("{} exited with {}", invocation.program, status);
        }
        anyhow::bail!("{} exited with {}:\n{}", invocation.program, status, stderr_text)
    }
}

/// Take the buffered line, decoding invalid UTF-8 lossily.
fn take_line(buf: &mut Vec<u8>) -> Option<String> {
    if buf.is_empty() {
        return None;
    }
    let line = String::from_utf8_lossy(buf)
        .trim_end_matches(['\n', '\r'])
        .to_string();
    buf.clear();
    Some(line)
}

/// Whether a pipe read finished the stream. A read error ends that pipe only.
fn end_of_stream(read: std::io::Result<usize>, pipe: &str, program: &str) -> bool {
    match read {
        Ok(0) => true,
        Ok(_) => false,
        Err(e) => {
            tracing::debug!("Stopped reading {} of {}: {}", pipe, program, e);
            true
        }
    }
}
