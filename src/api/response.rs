use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

use crate::api::models::CrawlResponse;
use crate::error::{AppError, Result};
use crate::runner::ProcessOutcome;

pub fn success<T: Serialize>(data: T) -> (StatusCode, Json<T>) {
    (StatusCode::OK, Json(data))
}

/// Exit code 0 is a success; anything else, including death by signal, is
/// reported as a failed crawl with the captured logs.
pub fn crawled(outcome: ProcessOutcome) -> Result<(StatusCode, Json<CrawlResponse>)> {
    let logs = outcome.logs();
    if outcome.success() {
        Ok(success(CrawlResponse { code: 0, logs }))
    } else {
        Err(AppError::ExitStatus { code: outcome.exit_code, logs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_exit_is_ok() {
        let outcome = ProcessOutcome {
            exit_code: Some(0),
            stdout_lines: vec!["hello".into()],
            stderr_lines: Vec::new(),
        };
        let (status, Json(body)) = crawled(outcome).unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.code, 0);
        assert_eq!(body.logs, vec!["[stdout] hello"]);
    }

    #[test]
    fn signal_exit_is_failure() {
        let outcome = ProcessOutcome {
            exit_code: None,
            ..Default::default()
        };
        let err = crawled(outcome).unwrap_err();
        assert!(matches!(err, AppError::ExitStatus { code: None, .. }));
    }
}
