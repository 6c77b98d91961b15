use std::time::Duration;

use async_trait::async_trait;
use backoff::{ExponentialBackoff, backoff::Backoff};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use log::{error, info, warn};

use crate::config::{MailSettings, SmtpSecurity};
use crate::error::DispatchError;

const PLAIN_FALLBACK: &str = "Please enable HTML e-mail support to view this message.";
const MAX_ATTEMPTS: u32 = 3;

#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send(&self, subject: &str, html: &str) -> Result<(), DispatchError>;
}

pub struct SmtpDispatcher {
    settings: MailSettings,
}

impl SmtpDispatcher {
    pub fn new(settings: MailSettings) -> Self {
        SmtpDispatcher { settings }
    }

    fn transport(&self) -> Result<SmtpTransport, DispatchError> {
        let cfg = &self.settings;
        let use_auth = !(cfg.smtp_user.trim().is_empty() && cfg.smtp_pass.trim().is_empty());
        let mut builder = match cfg.security {
            SmtpSecurity::None => SmtpTransport::builder_dangerous(&cfg.smtp_host).port(cfg.smtp_port),
            SmtpSecurity::Ssl => {
                let tls = TlsParameters::new(cfg.smtp_host.clone()).map_err(DispatchError::Setup)?;
                SmtpTransport::relay(&cfg.smtp_host)
                    .map_err(DispatchError::Setup)?
                    .port(cfg.smtp_port)
                    .tls(Tls::Wrapper(tls))
            }
            SmtpSecurity::StartTls => SmtpTransport::starttls_relay(&cfg.smtp_host)
                .map_err(DispatchError::Setup)?
                .port(cfg.smtp_port),
        };
        if use_auth {
            builder = builder.credentials(Credentials::new(cfg.smtp_user.clone(), cfg.smtp_pass.clone()));
        }
        Ok(builder.build())
    }
}

/// HTML report with a plain-text fallback part; `to` may list several
/// comma-separated recipients.
pub fn build_message(settings: &MailSettings, subject: &str, html: &str) -> Result<Message, DispatchError> {
    let from: Mailbox = settings.from.parse().map_err(|source| DispatchError::Address {
        field: "sender",
        value: settings.from.clone(),
        source,
    })?;
    let mut builder = Message::builder().from(from);

    let mut recipients = 0;
    for addr in settings.to.split(',') {
        let addr = addr.trim();
        if addr.is_empty() {
            continue;
        }
        let mailbox: Mailbox = addr.parse().map_err(|source| DispatchError::Address {
            field: "recipient",
            value: addr.to_string(),
            source,
        })?;
        builder = builder.to(mailbox);
        recipients += 1;
    }
    if recipients == 0 {
        return Err(DispatchError::NoRecipients);
    }

    let message = builder
        .subject(subject)
        .multipart(MultiPart::alternative_plain_html(
            PLAIN_FALLBACK.to_string(),
            html.to_string(),
        ))?;
    Ok(message)
}

#[async_trait]
impl Dispatcher for SmtpDispatcher {
    async fn send(&self, subject: &str, html: &str) -> Result<(), DispatchError> {
        let email = build_message(&self.settings, subject, html)?;
        let mailer = self.transport()?;

        let mut backoff = ExponentialBackoff::default();
        backoff.max_elapsed_time = Some(Duration::from_secs(300));
        backoff.initial_interval = Duration::from_secs(1);
        backoff.max_interval = Duration::from_secs(30);

        let mut attempt = 1;
        loop {
            // lettre's SMTP client blocks, so keep it off the runtime threads
            let (mailer, message) = (mailer.clone(), email.clone());
            let sent = tokio::task::spawn_blocking(move || mailer.send(&message)).await?;
            match sent {
                Ok(_) => break,
                Err(e) => {
                    error!("SMTP attempt {} failed: {}", attempt, e);
                    if attempt >= MAX_ATTEMPTS {
                        return Err(DispatchError::Send { attempts: attempt, source: e });
                    }
                    match backoff.next_backoff() {
                        Some(delay) => {
                            warn!("Retrying SMTP in {:?}...", delay);
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        None => return Err(DispatchError::Send { attempts: attempt, source: e }),
                    }
                }
            }
        }

        info!("Report mailed to {} via {}:{}", self.settings.to, self.settings.smtp_host, self.settings.smtp_port);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(to: &str) -> MailSettings {
        MailSettings {
            smtp_host: "smtp.example.com".into(),
            smtp_port: 587,
            smtp_user: String::new(),
            smtp_pass: String::new(),
            from: "reports@example.com".into(),
            to: to.into(),
            security: SmtpSecurity::StartTls,
        }
    }

    #[test]
    fn builds_multipart_message_for_every_recipient() {
        let message = build_message(
            &settings("ops@example.com, oncall@example.com"),
            "ESXi getsmart report for Acme at 20240301",
            "<p>report</p>",
        )
        .unwrap();
        assert_eq!(message.envelope().to().len(), 2);
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: ESXi getsmart report for Acme at 20240301"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains(PLAIN_FALLBACK));
        assert!(raw.contains("<p>report</p>"));
    }

    #[test]
    fn invalid_recipient_is_dispatch_error() {
        let err = build_message(&settings("ops@example.com, not an address"), "s", "b").unwrap_err();
        assert!(matches!(err, DispatchError::Address { field: "recipient", .. }));
    }

    #[test]
    fn empty_recipient_list_is_dispatch_error() {
        let err = build_message(&settings(" , "), "s", "b").unwrap_err();
        assert!(matches!(err, DispatchError::NoRecipients));
    }

    #[tokio::test]
    async fn unreachable_server_fails_after_retries() {
        let mut cfg = settings("ops@example.com");
        cfg.smtp_host = "127.0.0.1".into();
        cfg.smtp_port = 1;
        cfg.security = SmtpSecurity::None;
        let err = SmtpDispatcher::new(cfg).send("s", "<p>b</p>").await.unwrap_err();
        assert!(matches!(err, DispatchError::Send { attempts: MAX_ATTEMPTS, .. }));
    }

    #[tokio::test]
    async fn slow_server_does_not_stall_other_tasks() {
        // Accepts connections into the backlog but never sends a greeting.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut cfg = settings("ops@example.com");
        cfg.smtp_host = "127.0.0.1".into();
        cfg.smtp_port = listener.local_addr().unwrap().port();
        cfg.security = SmtpSecurity::None;
        let dispatcher = SmtpDispatcher::new(cfg);

        let sending = tokio::spawn(async move { dispatcher.send("s", "<p>b</p>").await });
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!sending.is_finished());

        sending.abort();
        // Resets the pending connection so the blocked SMTP read returns.
        drop(listener);
    }
}
