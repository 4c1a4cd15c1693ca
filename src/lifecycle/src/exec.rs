/// Command execution capability.
///
/// Join, label and query operations shell out to external tools. They go
/// through [`CommandRunner`] so the coordination logic can be driven by a fake.
use async_trait::async_trait;
use std::process::Stdio;

/// Result of running an external command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty line of stderr, falling back to stdout.
    pub fn last_line(&self) -> &str {
        self.stderr
            .lines()
            .rev()
            .chain(self.stdout.lines().rev())
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("No output available")
    }

    /// True when either stream contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.stdout.contains(needle) || self.stderr.contains(needle)
    }
}

/// Runs an external program to completion.
///
/// A non-zero exit is reported through [`CommandOutput::exit_code`]; `Err` is
/// reserved for failures to spawn or wait on the process.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput>;
}

/// Privilege prefix for steps that modify node state: `sudo -E` unless the
/// process already runs as root.
pub fn default_privilege_prefix() -> Vec<String> {
    if nix::unistd::Uid::effective().is_root() {
        Vec::new()
    } else {
        vec!["sudo".to_string(), "-E".to_string()]
    }
}

/// Split `prefix + program + args` into the program to spawn and its arguments.
pub fn with_prefix(prefix: &[String], program: &str, args: Vec<String>) -> (String, Vec<String>) {
    match prefix.split_first() {
        Some((head, rest)) => {
            let mut full = rest.to_vec();
            full.push(program.to_string());
            full.extend(args);
            (head.clone(), full)
        }
        None => (program.to_string(), args),
    }
}

/// Runs commands on the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        // Arguments may carry the join token; only the count is logged.
        tracing::debug!("[SystemRunner] Running {} with {} argument(s)", program, args.len());

        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        Ok(CommandOutput {
            // Killed by a signal: no exit code.
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
