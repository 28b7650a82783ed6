//! Screening reports.
//!
//! [`ReportDocument`] is assembled from stored rows without side effects;
//! [`render_pdf`] lays it out on A4 pages. Handlers return either the
//! document as JSON or the PDF bytes.

pub mod document;
pub mod render;

pub use document::{
    AnalysisSummary, Finding, HistoryEntry, PatientSection, PhysicianSection, ReportDocument,
    ReportKind,
};
pub use render::render_pdf;

/// Error type for report rendering.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("PDF error: {0}")]
    Pdf(String),
}
