use crate::error::{Error, Result};
use log::debug;
use std::{
    io::Write,
    process::{Command, Stdio},
};

/// Runs `argv`, optionally feeding `stdin`, and returns trimmed stdout.
/// A non-zero exit becomes [`Error::Subprocess`] with the captured stderr.
pub fn run(argv: &[String], stdin: Option<&str>) -> Result<String> {
    let command = argv.join(" ");
    let (program, args) = argv.split_first().ok_or_else(|| Error::Spawn {
        command: command.clone(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
    })?;
    debug!("exec: {}", command);
    let spawn_err = |source| Error::Spawn { command: command.clone(), source };
    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_err)?;
    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes()).map_err(spawn_err)?;
    }
    let out = child.wait_with_output().map_err(spawn_err)?;
    if !out.status.success() {
        return Err(Error::Subprocess {
            command,
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

/// Like [`run`] but never fails: returns the exit status and stdout, logging
/// spawn errors. Used for best-effort host setup commands.
pub fn run_lenient(argv: &[&str]) -> (bool, String) {
    let owned: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
    match run(&owned, None) {
        Ok(out) => (true, out),
        Err(e) => {
            debug!("ignored: {}", e);
            (false, String::new())
        }
    }
}

/// Splits a command prefix such as `docker exec -i server awg` into argv.
pub fn split_command(prefix: &str) -> Vec<String> {
    prefix.split_whitespace().map(str::to_string).collect()
}
