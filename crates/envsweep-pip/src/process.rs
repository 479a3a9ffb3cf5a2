use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub(crate) enum CommandOutcome {
    Finished(Output),
    TimedOut,
}

/// Runs a command to completion, killing it when the deadline passes.
/// Stdout and stderr are drained on helper threads so a chatty child can
/// never fill the pipe and deadlock against the poll loop.
pub(crate) fn run_with_deadline(
    mut command: Command,
    timeout: Option<Duration>,
) -> Result<CommandOutcome> {
    let program = command.get_program().to_string_lossy().into_owned();

    let Some(timeout) = timeout else {
        let output = command
            .output()
            .with_context(|| format!("failed to run {program}"))?;
        return Ok(CommandOutcome::Finished(output));
    };

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = command
        .spawn()
        .with_context(|| format!("failed to spawn {program}"))?;

    let stdout_drain = drain_on_thread(child.stdout.take());
    let stderr_drain = drain_on_thread(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child
            .try_wait()
            .with_context(|| format!("failed to poll {program}"))?
        {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(CommandOutcome::TimedOut);
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(CommandOutcome::Finished(Output {
        status,
        stdout: join_drain(stdout_drain),
        stderr: join_drain(stderr_drain),
    }))
}

fn drain_on_thread<R: Read + Send + 'static>(
    source: Option<R>,
) -> Option<thread::JoinHandle<Vec<u8>>> {
    source.map(|mut reader| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = reader.read_to_end(&mut buffer);
            buffer
        })
    })
}

fn join_drain(handle: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
