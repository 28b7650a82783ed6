//! The one-time-code delivery seam.

use async_trait::async_trait;
use retina_core::otp::{OtpPurpose, OTP_VALIDITY_MINS};

use crate::email::EmailError;

/// A code addressed to one user.
#[derive(Debug, Clone)]
pub struct OtpMessage {
    pub to: String,
    /// Greeting name; the template falls back to a generic line when `None`.
    pub recipient_name: Option<String>,
    pub code: String,
    pub purpose: OtpPurpose,
}

impl OtpMessage {
    pub fn subject(&self) -> &'static str {
        match self.purpose {
            OtpPurpose::Signup => "Your OTP for DR Detection System",
            OtpPurpose::PasswordReset => "Password Reset Code for DR Detection System",
        }
    }

    pub fn title(&self) -> &'static str {
        match self.purpose {
            OtpPurpose::Signup => "Your OTP Code",
            OtpPurpose::PasswordReset => "Password Reset Code",
        }
    }

    /// The sentence introducing the code.
    pub fn lead(&self) -> String {
        match (self.purpose, self.recipient_name.as_deref()) {
            (OtpPurpose::Signup, Some(name)) => {
                format!("Hello {name}, your OTP for authentication is shown below.")
            }
            (OtpPurpose::Signup, None) => "Your verification OTP is shown below.".to_string(),
            (OtpPurpose::PasswordReset, Some(name)) => {
                format!("Hello {name}, use the reset code below to reset your password.")
            }
            (OtpPurpose::PasswordReset, None) => {
                "Use the reset code below to proceed with password reset.".to_string()
            }
        }
    }

    pub fn plain_body(&self) -> String {
        format!(
            "{title}\n\n{lead}\n\n    {code}\n\nThis code expires in {mins} minutes.\n",
            title = self.title(),
            lead = self.lead(),
            code = self.code,
            mins = OTP_VALIDITY_MINS,
        )
    }

    pub fn html_body(&self) -> String {
        format!(
            r#"<html>
<body style="margin:0;padding:0;font-family:Arial,sans-serif;background:#f3f6fa;">
  <div style="max-width:600px;margin:40px auto;background:#fff;border-radius:12px;padding:30px;text-align:center;">
    <h2 style="color:#1e3a8a;margin:0;">{title}</h2>
    <p style="color:#555;font-size:15px;">DR Detection System - AI Powered Screening</p>
    <p style="color:#333;font-size:16px;">{lead}</p>
    <div style="display:inline-block;background:#1e3a8a;color:#fff;padding:20px 40px;border-radius:10px;font-size:38px;letter-spacing:5px;font-weight:bold;">{code}</div>
    <p style="color:#777;font-size:13px;margin-top:30px;">This code expires in {mins} minutes.</p>
  </div>
</body>
</html>"#,
            title = self.title(),
            lead = escape_html(&self.lead()),
            code = self.code,
            mins = OTP_VALIDITY_MINS,
        )
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Delivers one-time codes. Implementations must not retain the code.
#[async_trait]
pub trait OtpMailer: Send + Sync {
    async fn send_code(&self, message: &OtpMessage) -> Result<(), EmailError>;
}

/// Logs codes at WARN instead of sending them.
///
/// Only suitable for local development; the code appears in the log.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl OtpMailer for LogMailer {
    async fn send_code(&self, message: &OtpMessage) -> Result<(), EmailError> {
        tracing::warn!(
            to = %message.to,
            purpose = message.purpose.as_str(),
            code = %message.code,
            "SMTP not configured, one-time code logged instead of emailed"
        );
        Ok(())
    }
}
