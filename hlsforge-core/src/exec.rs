use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

/// Runs external tools. Swapped out in tests for scripted outputs.
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &mut Command) -> std::io::Result<std::process::Output>;
}

#[derive(Debug, Default)]
pub struct SystemCommandExecutor;

#[async_trait::async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, command: &mut Command) -> std::io::Result<std::process::Output> {
        command.kill_on_drop(true).output().await
    }
}

/// Runs `command`, failing with `TimedOut` once `limit` elapses.
pub async fn run_with_limit(
    executor: &dyn CommandExecutor,
    command: &mut Command,
    limit: Option<Duration>,
) -> std::io::Result<std::process::Output> {
    match limit {
        Some(limit) => match timeout(limit, executor.run(command)).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("command exceeded {limit:?}"),
            )),
        },
        None => executor.run(command).await,
    }
}

/// Renders a command line for logs and error reports.
pub fn describe(command: &Command) -> String {
    let std_command = command.as_std();
    let mut parts = vec![std_command.get_program().to_string_lossy().to_string()];
    parts.extend(
        std_command
            .get_args()
            .map(|arg| arg.to_string_lossy().to_string()),
    );
    parts.join(" ")
}

/// Keeps the last `max_lines` lines of tool output.
pub fn tail_lines(output: &[u8], max_lines: usize) -> String {
    let text = String::from_utf8_lossy(output);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
