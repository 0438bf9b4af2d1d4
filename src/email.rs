use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::time::Duration;
use tracing::info;

use crate::config::MailSettings;
use crate::errors::JobsiftError;
use crate::report::Summary;

const SUBJECT: &str = "Job Parse Results";

pub struct ReportMailer<'a> {
    settings: &'a MailSettings,
}

impl<'a> ReportMailer<'a> {
    pub fn new(settings: &'a MailSettings) -> Self {
        Self { settings }
    }

    pub fn build_message(
        &self,
        timestamp: NaiveDateTime,
        summary: &Summary,
        file_name: &str,
        csv_bytes: Vec<u8>,
    ) -> Result<Message> {
        let from: Mailbox = self
            .settings
            .sender
            .parse()
            .map_err(|e| JobsiftError::Config(format!("Invalid SENDER_EMAIL: {}", e)))?;
        let to: Mailbox = self
            .settings
            .recipient
            .parse()
            .map_err(|e| JobsiftError::Config(format!("Invalid RECIPIENT_EMAIL: {}", e)))?;

        let csv_type = ContentType::parse("text/csv")
            .map_err(|e| JobsiftError::Report(format!("Failed to add attachment: {}", e)))?;
        let attachment = Attachment::new(file_name.to_string()).body(csv_bytes, csv_type);

        Message::builder()
            .from(from)
            .to(to)
            .subject(SUBJECT)
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(summary_body(timestamp, summary)))
                    .singlepart(attachment),
            )
            .map_err(|e| JobsiftError::Report(format!("Failed to add attachment: {}", e)).into())
    }

    pub fn send(&self, message: &Message) -> Result<()> {
        let creds = Credentials::new(self.settings.sender.clone(), self.settings.app_password.clone());
        let mailer = SmtpTransport::starttls_relay(&self.settings.smtp_host)
            .with_context(|| format!("Failed to configure SMTP relay {}", self.settings.smtp_host))?
            .port(self.settings.smtp_port)
            .credentials(creds)
            .timeout(Some(Duration::from_secs(30)))
            .build();

        mailer
            .send(message)
            .map_err(|e| anyhow!("Failed to send report email: {}", e))?;
        info!("Report emailed to {}", self.settings.recipient);
        Ok(())
    }
}

pub fn summary_body(timestamp: NaiveDateTime, summary: &Summary) -> String {
    format!(
        "Timestamp: {}\nTotal parsed jobs: {}\nFiltered for you: {}\n",
        timestamp.format("%Y-%m-%d %H:%M:%S"),
        summary.total,
        summary.fit
    )
}
