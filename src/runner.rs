use std::env;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::completion::Completion;
use crate::config::RunnerConfig;
use crate::logs::{self, Stream};

#[derive(Debug, Clone)]
pub struct CrawlJob {
    pub url: String,
    pub skip_chapters: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout_lines: Vec<String>,
    pub stderr_lines: Vec<String>,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn logs(&self) -> Vec<String> {
        logs::tag_lines(Stream::Stdout, &self.stdout_lines)
            .chain(logs::tag_lines(Stream::Stderr, &self.stderr_lines))
            .collect()
    }

    fn push(&mut self, stream: Stream, raw: &[u8]) {
        let lines = logs::decode(raw);
        for line in &lines {
            tracing::debug!(%stream, "{}", line);
        }
        match stream {
            Stream::Stdout => self.stdout_lines.extend(lines),
            Stream::Stderr => self.stderr_lines.extend(lines),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Không thể khởi chạy {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("Script vượt quá thời gian cho phép ({} giây).", .after.as_secs())]
    Timeout { after: Duration, outcome: ProcessOutcome },

    #[error("Lỗi khi chờ script kết thúc: {source}")]
    Wait { source: io::Error, outcome: ProcessOutcome },

    #[error("Crawler dừng mà không trả về kết quả.")]
    Lost,
}

type RunResult = std::result::Result<ProcessOutcome, RunError>;

/// Launches the external crawler script, one child process per job.
///
/// At most `max_concurrent` children run at a time; further jobs wait for a
/// slot. Dropping the future returned by [`ProcessRunner::run`] kills the
/// child it started.
#[derive(Clone)]
pub struct ProcessRunner {
    config: Arc<RunnerConfig>,
    permits: Arc<Semaphore>,
    spawned: Arc<AtomicUsize>,
}

impl ProcessRunner {
    pub fn new(config: RunnerConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            config: Arc::new(config),
            permits,
            spawned: Arc::new(AtomicUsize::new(0)),
        }
    }

    // counts attempts, including failed spawns
    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Builds `<interpreter> <script> --url <url> [--skip-chapters]`.
    pub fn command(&self, job: &CrawlJob) -> Command {
        let mut command = Command::new(&self.config.interpreter);
        command
            .arg(&self.config.script_path)
            .arg("--url")
            .arg(&job.url);
        if job.skip_chapters {
            command.arg("--skip-chapters");
        }

        command
            .current_dir(&self.config.work_dir)
            .env("PYTHONIOENCODING", env_or("PYTHONIOENCODING", "utf-8"))
            .env("PYTHONUTF8", env_or("PYTHONUTF8", "1"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    pub async fn run(&self, job: CrawlJob) -> RunResult {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| RunError::Lost)?;

        let (completion, rx) = Completion::new();
        let command = self.command(&job);
        tokio::spawn(drive(
            command,
            completion,
            permit,
            self.config.timeout,
            Arc::clone(&self.spawned),
            job.url,
        ));

        rx.await.map_err(|_| RunError::Lost)?
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

enum Finish {
    Exited(Option<i32>),
    WaitFailed(io::Error),
    TimedOut(Duration),
    Abandoned,
}

/// Owns one child process from spawn to exit. The permit is released only
/// once the child is gone, and before the result is handed back.
async fn drive(
    mut command: Command,
    mut completion: Completion<RunResult>,
    permit: OwnedSemaphorePermit,
    timeout: Option<Duration>,
    spawned: Arc<AtomicUsize>,
    url: String,
) {
    spawned.fetch_add(1, Ordering::SeqCst);
    let program = command.as_std().get_program().to_string_lossy().into_owned();

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(source) => {
            tracing::error!(%program, error = %source, "failed to start crawler");
            drop(permit);
            settle(&mut completion, Err(RunError::Spawn { program, source }));
            return;
        }
    };
    tracing::info!(pid = child.id(), %url, "crawler started");

    let mut outcome = ProcessOutcome::default();
    let finish = pump(&mut child, &mut outcome, &mut completion, timeout).await;

    let result = match finish {
        Finish::Exited(code) => {
            tracing::info!(?code, lines = outcome.stdout_lines.len() + outcome.stderr_lines.len(), "crawler exited");
            outcome.exit_code = code;
            Ok(outcome)
        }
        Finish::WaitFailed(source) => {
            tracing::error!(error = %source, "failed waiting for crawler");
            terminate(&mut child).await;
            Err(RunError::Wait { source, outcome })
        }
        Finish::TimedOut(after) => {
            tracing::warn!(?after, %url, "crawler timed out, killing");
            terminate(&mut child).await;
            Err(RunError::Timeout { after, outcome })
        }
        Finish::Abandoned => {
            tracing::info!(%url, "request dropped, killing crawler");
            terminate(&mut child).await;
            return;
        }
    };

    drop(permit);
    settle(&mut completion, result);
}

fn settle(completion: &mut Completion<RunResult>, result: RunResult) {
    if !completion.settle(result) {
        tracing::warn!("crawl result discarded; already settled or caller gone");
    }
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "failed to kill crawler");
    }
}

async fn pump(
    child: &mut Child,
    outcome: &mut ProcessOutcome,
    completion: &mut Completion<RunResult>,
    timeout: Option<Duration>,
) -> Finish {
    let mut stdout = child.stdout.take().map(BufReader::new);
    let mut stderr = child.stderr.take().map(BufReader::new);
    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    let mut status: Option<Option<i32>> = None;

    let deadline = async {
        match timeout {
            Some(after) => tokio::time::sleep(after).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let finish = loop {
        if let Some(code) = status {
            if stdout.is_none() && stderr.is_none() {
                break Finish::Exited(code);
            }
        }

        tokio::select! {
            read = read_line(&mut stdout, &mut out_buf), if stdout.is_some() => {
                if !read {
                    stdout = None;
                }
                outcome.push(Stream::Stdout, &out_buf);
                out_buf.clear();
            }
            read = read_line(&mut stderr, &mut err_buf), if stderr.is_some() => {
                if !read {
                    stderr = None;
                }
                outcome.push(Stream::Stderr, &err_buf);
                err_buf.clear();
            }
            exited = child.wait(), if status.is_none() => {
                match exited {
                    Ok(exit) => status = Some(exit.code()),
                    Err(e) => break Finish::WaitFailed(e),
                }
            }
            _ = &mut deadline => {
                break Finish::TimedOut(timeout.unwrap_or_default());
            }
            _ = completion.abandoned() => {
                break Finish::Abandoned;
            }
        }
    };

    // partial lines left behind by an interrupted read
    outcome.push(Stream::Stdout, &out_buf);
    outcome.push(Stream::Stderr, &err_buf);
    finish
}

// false at EOF or on error; bytes already read stay in `buf`
async fn read_line<R>(reader: &mut Option<BufReader<R>>, buf: &mut Vec<u8>) -> bool
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader.as_mut() else {
        return false;
    };
    match reader.read_until(b'\n', buf).await {
        Ok(0) => false,
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = %e, "crawler pipe read failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn runner() -> ProcessRunner {
        ProcessRunner::new(RunnerConfig::new("python", "crawlers/crawl_title.py", "/srv/web"))
    }

    fn args(command: &Command) -> Vec<&OsStr> {
        command.as_std().get_args().collect()
    }

    #[test]
    fn command_passes_url_flag() {
        let runner = runner();
        let job = CrawlJob { url: "https://example.com/truyen".into(), skip_chapters: false };
        let command = runner.command(&job);

        assert_eq!(command.as_std().get_program(), "python");
        assert_eq!(
            args(&command),
            vec!["crawlers/crawl_title.py", "--url", "https://example.com/truyen"]
        );
        assert_eq!(
            command.as_std().get_current_dir(),
            Some(std::path::Path::new("/srv/web"))
        );
    }

    #[test]
    fn command_appends_skip_chapters() {
        let runner = runner();
        let job = CrawlJob { url: "u".into(), skip_chapters: true };
        let command = runner.command(&job);

        assert_eq!(args(&command).last(), Some(&OsStr::new("--skip-chapters")));
    }

    #[test]
    fn command_forces_utf8() {
        let runner = runner();
        let job = CrawlJob { url: "u".into(), skip_chapters: false };
        let command = runner.command(&job);

        let envs: Vec<_> = command.as_std().get_envs().collect();
        assert!(envs.iter().any(|(k, v)| *k == "PYTHONUTF8" && v.is_some()));
        assert!(envs.iter().any(|(k, v)| *k == "PYTHONIOENCODING" && v.is_some()));
    }

    #[test]
    fn logs_list_stdout_before_stderr() {
        let outcome = ProcessOutcome {
            exit_code: Some(1),
            stdout_lines: vec!["a".into()],
            stderr_lines: vec!["b".into(), "c".into()],
        };
        assert_eq!(outcome.logs(), vec!["[stdout] a", "[stderr] b", "[stderr] c"]);
        assert!(!outcome.success());
    }

    #[test]
    fn zero_concurrency_still_admits_one() {
        let mut config = RunnerConfig::new("python", "x.py", ".");
        config.max_concurrent = 0;
        assert_eq!(ProcessRunner::new(config).available_slots(), 1);
    }
}
