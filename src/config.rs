use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use crate::error::{AppError, Result};

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_MAX_CONCURRENT: usize = 4;
pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct RunnerConfig {
    pub interpreter: PathBuf,
    pub script_path: PathBuf,
    pub work_dir: PathBuf,
    pub max_concurrent: usize,
    // None = no limit
    pub timeout: Option<Duration>,
}

impl RunnerConfig {
    pub fn new(interpreter: impl Into<PathBuf>, script_path: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            script_path: script_path.into(),
            work_dir: work_dir.into(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub body_limit: usize,
    pub runner: RunnerConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        let interpreter = first_var(&["PYTHON", "PYTHON_PATH"]).unwrap_or_else(|| "python".to_string());

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = match first_var(&["PORT", "CRAWLER_PORT"]) {
            Some(port) => parse_var::<u16>("PORT", &port)?,
            None => DEFAULT_PORT,
        };
        let ip = IpAddr::from_str(&host).map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;

        let work_dir = match env::var("CRAWLER_ROOT") {
            Ok(root) => PathBuf::from(root),
            Err(_) => env::current_dir().map_err(|e| AppError::ConfigError(format!("Cannot resolve working directory: {}", e)))?,
        };
        let script_path = env::var("CRAWLER_SCRIPT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| work_dir.join("crawlers").join("crawl_title.py"));

        let max_concurrent = match env::var("CRAWLER_MAX_CONCURRENT") {
            Ok(raw) => parse_var::<usize>("CRAWLER_MAX_CONCURRENT", &raw)?.max(1),
            Err(_) => DEFAULT_MAX_CONCURRENT,
        };
        let timeout_secs = match env::var("CRAWLER_TIMEOUT_SECS") {
            Ok(raw) => parse_var::<u64>("CRAWLER_TIMEOUT_SECS", &raw)?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };
        let body_limit = match env::var("CRAWLER_BODY_LIMIT") {
            Ok(raw) => parse_var::<usize>("CRAWLER_BODY_LIMIT", &raw)?,
            Err(_) => DEFAULT_BODY_LIMIT,
        };

        let mut runner = RunnerConfig::new(interpreter, script_path, work_dir);
        runner.max_concurrent = max_concurrent;
        runner.timeout = timeout_from_secs(timeout_secs);

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            body_limit,
            runner,
        })
    }
}

fn first_var(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| env::var(key).ok())
        .find(|value| !value.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| AppError::ConfigError(format!("Invalid {}: {}", name, e)))
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_disables_limit() {
        assert_eq!(timeout_from_secs(0), None);
        assert_eq!(timeout_from_secs(5), Some(Duration::from_secs(5)));
    }

    #[test]
    fn parse_var_reports_variable_name() {
        let err = parse_var::<u16>("PORT", "abc").unwrap_err();
        assert!(err.to_string().contains("Invalid PORT"));

        assert_eq!(parse_var::<u16>("PORT", " 8080 ").unwrap(), 8080);
    }

    #[test]
    fn runner_config_defaults() {
        let config = RunnerConfig::new("python", "crawlers/crawl_title.py", ".");
        assert_eq!(config.max_concurrent, DEFAULT_MAX_CONCURRENT);
        assert_eq!(config.timeout, Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)));
    }
}
