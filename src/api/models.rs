use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::runner::CrawlJob;

pub const TITLE_KIND: &str = "title";

#[derive(Debug, Default, Deserialize)]
pub struct CrawlRequest {
    #[serde(default)]
    pub url: Option<String>,
    // absent => None, explicit null => Some(Value::Null)
    #[serde(default, rename = "type", deserialize_with = "present")]
    pub kind: Option<Value>,
    #[serde(default, rename = "skipChapters")]
    pub skip_chapters: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Loose truthiness for flags sent by browser clients: `false`, `null`, `0`
/// and `""` are off, anything else is on.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl CrawlRequest {
    pub fn into_job(self) -> Result<CrawlJob> {
        let url = match self.url {
            Some(url) if !url.trim().is_empty() => url,
            _ => return Err(AppError::InvalidRequest("Thiếu tham số url".to_string())),
        };

        let is_title = match &self.kind {
            None => true,
            Some(Value::String(kind)) => kind == TITLE_KIND,
            Some(_) => false,
        };
        if !is_title {
            return Err(AppError::Unsupported(
                "Hiện chỉ hỗ trợ crawl thông tin truyện (title).".to_string(),
            ));
        }

        Ok(CrawlJob {
            url,
            skip_chapters: self.skip_chapters.as_ref().is_some_and(truthy),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CrawlResponse {
    pub code: i32,
    pub logs: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
