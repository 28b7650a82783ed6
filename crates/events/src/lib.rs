//! Outbound notifications for the screening service.
//!
//! - [`OtpMailer`]: the seam handlers use to deliver one-time codes.
//! - [`SmtpMailer`]: production delivery over SMTP via `lettre`.
//! - [`LogMailer`]: development fallback that logs codes instead of
//!   sending them, used when `SMTP_HOST` is not configured.

pub mod email;
pub mod mailer;

pub use email::{EmailConfig, EmailError, SmtpMailer};
pub use mailer::{LogMailer, OtpMailer, OtpMessage};
