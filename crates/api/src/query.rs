//! Shared query parameter types for API handlers.

use serde::Deserialize;

use crate::error::AppError;

/// `?q=&limit=` for search endpoints.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<i64>,
}

/// `?format=pdf|json` for report endpoints. PDF is the default.
#[derive(Debug, Deserialize)]
pub struct FormatParams {
    pub format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Pdf,
    Json,
}

impl FormatParams {
    pub fn report_format(&self) -> Result<ReportFormat, AppError> {
        match self.format.as_deref().map(str::trim) {
            None | Some("") | Some("pdf") => Ok(ReportFormat::Pdf),
            Some("json") => Ok(ReportFormat::Json),
            Some(other) => Err(AppError::BadRequest(format!(
                "Unsupported format '{other}'. Must be one of: pdf, json"
            ))),
        }
    }
}
