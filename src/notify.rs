//! Parent notifications over SMS.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{SmsBackend, SmsSection};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("sms request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sms provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("phone number is empty")]
    EmptyPhone,
}

/// Delivers a text message and returns the provider's message id.
pub trait Notifier {
    fn send(&self, phone: &str, message: &str) -> Result<String, NotifyError>;
}

pub fn build_notifier(sms: &SmsSection) -> Result<Box<dyn Notifier>, NotifyError> {
    let notifier: Box<dyn Notifier> = match sms.backend {
        SmsBackend::Log => Box::new(LogNotifier),
        SmsBackend::Twilio => Box::new(TwilioNotifier::new(
            &sms.base_url,
            sms.account_sid.clone().unwrap_or_default(),
            sms.auth_token.clone().unwrap_or_default(),
            sms.from.clone().unwrap_or_default(),
        )?),
    };
    Ok(notifier)
}

pub fn render_message(template: &str, name: &str, expected_time: &str, academy: &str) -> String {
    template
        .replace("{name}", name)
        .replace("{expected_time}", expected_time)
        .replace("{academy}", academy)
}

/// Dry-run backend: writes the message to the log instead of sending it.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, phone: &str, message: &str) -> Result<String, NotifyError> {
        if phone.trim().is_empty() {
            return Err(NotifyError::EmptyPhone);
        }
        let id = format!("log-{}", Uuid::new_v4().simple());
        tracing::info!(%phone, %message, %id, "sms (dry run)");
        Ok(id)
    }
}

pub struct TwilioNotifier {
    client: reqwest::blocking::Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from: String,
}

#[derive(Deserialize)]
struct MessageResource {
    sid: String,
}

impl TwilioNotifier {
    pub fn new(
        base_url: &str,
        account_sid: String,
        auth_token: String,
        from: String,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            account_sid,
            auth_token,
            from,
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        )
    }
}

impl Notifier for TwilioNotifier {
    fn send(&self, phone: &str, message: &str) -> Result<String, NotifyError> {
        if phone.trim().is_empty() {
            return Err(NotifyError::EmptyPhone);
        }
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", phone), ("From", self.from.as_str()), ("Body", message)])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        let resource: MessageResource = response.json()?;
        tracing::debug!(%phone, sid = %resource.sid, "sms accepted");
        Ok(resource.sid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Accepts one request, hands its head and body back, and answers with
    /// `status` and `body`.
    fn one_shot_server(status: u16, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read header");
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some(v) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = v.trim().parse().expect("content length");
                }
                head.push_str(&line);
            }
            let mut buf = vec![0u8; content_length];
            reader.read_exact(&mut buf).expect("read body");
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            )
            .expect("write response");
            format!("{}\n{}", head, String::from_utf8_lossy(&buf))
        });
        (format!("http://{}", addr), handle)
    }

    #[test]
    fn template_placeholders_are_filled() {
        let text = render_message(
            "[{academy}] {name} expected {expected_time}",
            "Kim",
            "15:00:00",
            "Big Mama",
        );
        assert_eq!(text, "[Big Mama] Kim expected 15:00:00");
    }

    #[test]
    fn log_backend_refuses_empty_phone() {
        assert!(matches!(
            LogNotifier.send("  ", "hi"),
            Err(NotifyError::EmptyPhone)
        ));
        assert!(LogNotifier.send("010-1234-5678", "hi").is_ok());
    }

    #[test]
    fn twilio_posts_form_with_basic_auth() {
        let (base, handle) = one_shot_server(201, r#"{"sid":"SM123"}"#);
        let notifier = TwilioNotifier::new(
            &base,
            "AC42".to_string(),
            "secret".to_string(),
            "+15550000".to_string(),
        )
        .expect("client");
        let sid = notifier.send("+821012345678", "hello").expect("send");
        assert_eq!(sid, "SM123");

        let seen = handle.join().expect("server thread");
        assert!(seen.starts_with("POST /2010-04-01/Accounts/AC42/Messages.json"));
        assert!(seen.to_ascii_lowercase().contains("authorization: basic"));
        assert!(seen.contains("To=%2B821012345678"));
        assert!(seen.contains("Body=hello"));
    }

    #[test]
    fn twilio_rejection_surfaces_status() {
        let (base, handle) = one_shot_server(400, r#"{"message":"bad number"}"#);
        let notifier = TwilioNotifier::new(
            &base,
            "AC42".to_string(),
            "secret".to_string(),
            "+15550000".to_string(),
        )
        .expect("client");
        match notifier.send("123", "hello") {
            Err(NotifyError::Rejected { status, body }) => {
                assert_eq!(status, 400);
                assert!(body.contains("bad number"));
            }
            other => panic!("expected rejection, got {:?}", other.map(|_| ())),
        }
        handle.join().expect("server thread");
    }

    #[test]
    fn both_backends_build_from_config() {
        let sms = SmsSection {
            backend: SmsBackend::Log,
            ..SmsSection::default()
        };
        let log = build_notifier(&sms).expect("log backend");
        assert!(log.send("010-1234-5678", "hi").is_ok());

        let sms = SmsSection {
            backend: SmsBackend::Twilio,
            base_url: "http://127.0.0.1:9/".to_string(),
            ..SmsSection::default()
        };
        let twilio = build_notifier(&sms).expect("twilio backend");
        assert!(matches!(
            twilio.send(" ", "hi"),
            Err(NotifyError::EmptyPhone)
        ));
    }
}
