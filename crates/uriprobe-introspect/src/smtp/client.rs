//! Just enough SMTP to greet, authenticate and issue single commands.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use uriprobe_core::{BackendError, Endpoint, ProbeSettings};

use crate::session::{Connector, MailReply, MailSession, Session};
use crate::transport::{self, BoxedStream};

pub const CLIENT_NAME: &str = "uriprobe.local";

const MAX_LINE_LEN: u64 = 4096;
const MAX_REPLY_LINES: usize = 128;

pub fn default_port(scheme: &str) -> u16 {
    if scheme == "smtps" { 465 } else { 25 }
}

/// Read one possibly multi-line reply (`250-...` continues, `250 ...` ends).
pub async fn read_mail_reply<R>(reader: &mut R) -> Result<MailReply, BackendError>
where
    R: AsyncBufRead + Unpin + Send,
{
    let mut lines = Vec::new();
    loop {
        if lines.len() == MAX_REPLY_LINES {
            return Err(BackendError::Protocol(format!(
                "SMTP reply longer than {MAX_REPLY_LINES} lines"
            )));
        }
        let mut line = String::new();
        let read = (&mut *reader)
            .take(MAX_LINE_LEN)
            .read_line(&mut line)
            .await
            .map_err(|err| BackendError::from_io(&err))?;
        if read == 0 {
            return Err(BackendError::Io {
                kind: std::io::ErrorKind::UnexpectedEof,
                message: "connection closed by server".to_string(),
            });
        }
        if read as u64 == MAX_LINE_LEN && !line.ends_with('\n') {
            return Err(BackendError::Protocol(format!(
                "SMTP reply line longer than {MAX_LINE_LEN} bytes"
            )));
        }
        let line = line.trim_end_matches(['\r', '\n']);
        let code = line
            .get(..3)
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| BackendError::Protocol(format!("malformed SMTP reply {line:?}")))?;
        let separator = line.as_bytes().get(3).copied();
        lines.push(line.get(4..).unwrap_or_default().to_string());
        if separator != Some(b'-') {
            return Ok(MailReply { code, lines });
        }
    }
}

fn reject(reply: MailReply) -> BackendError {
    BackendError::server(reply.code, reply.text())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpConnector;

pub struct SmtpSession {
    stream: BufReader<BoxedStream>,
    read_timeout: Duration,
    greeting: String,
    extensions: Vec<String>,
}

impl SmtpSession {
    /// Read the greeting and introduce ourselves; falls back to HELO.
    pub async fn handshake(stream: BoxedStream, read_timeout: Duration) -> Result<Self, BackendError> {
        let mut session = Self {
            stream: BufReader::new(stream),
            read_timeout,
            greeting: String::new(),
            extensions: Vec::new(),
        };
        let greeting = session.read_reply().await?;
        if !greeting.is_positive() {
            return Err(reject(greeting));
        }
        session.greeting = greeting.text();

        match session.command(&format!("EHLO {CLIENT_NAME}")).await {
            Ok(reply) => {
                session.extensions = reply
                    .lines
                    .iter()
                    .skip(1)
                    .map(|line| line.to_ascii_uppercase())
                    .collect();
            }
            Err(BackendError::Server { .. }) => {
                session.command(&format!("HELO {CLIENT_NAME}")).await?;
            }
            Err(err) => return Err(err),
        }
        Ok(session)
    }

    pub async fn login(&mut self, user: &str, password: &str) -> Result<(), BackendError> {
        self.command("AUTH LOGIN").await?;
        self.command(&STANDARD.encode(user)).await?;
        self.command(&STANDARD.encode(password)).await?;
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<MailReply, BackendError> {
        match tokio::time::timeout(self.read_timeout, read_mail_reply(&mut self.stream)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout("smtp reply".to_string())),
        }
    }

    async fn send_line(&mut self, line: &str) -> Result<(), BackendError> {
        let stream = self.stream.get_mut();
        stream
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .map_err(|err| BackendError::from_io(&err))?;
        stream.flush().await.map_err(|err| BackendError::from_io(&err))
    }
}

#[async_trait]
impl Connector for SmtpConnector {
    type Session = SmtpSession;

    async fn connect(
        &self,
        endpoint: &Endpoint,
        settings: &ProbeSettings,
    ) -> Result<SmtpSession, BackendError> {
        let stream = transport::open(
            endpoint.host_or_localhost(),
            endpoint.port_or(default_port(endpoint.scheme())),
            endpoint.scheme() == "smtps",
            settings.timeouts.connect(),
            settings.tls.accept_invalid_certs,
        )
        .await?;
        let mut session = SmtpSession::handshake(stream, settings.timeouts.read()).await?;
        if let (Some(user), Some(password)) = (endpoint.user(), endpoint.password()) {
            session.login(user, password).await?;
        }
        Ok(session)
    }
}

#[async_trait]
impl Session for SmtpSession {
    async fn ping(&mut self) -> Result<(), BackendError> {
        self.command("NOOP").await.map(|_| ())
    }

    async fn close(mut self) -> Result<(), BackendError> {
        self.send_line("QUIT").await?;
        let _ = self.read_reply().await;
        self.stream
            .get_mut()
            .shutdown()
            .await
            .map_err(|err| BackendError::from_io(&err))
    }
}

#[async_trait]
impl MailSession for SmtpSession {
    fn greeting(&self) -> &str {
        &self.greeting
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    async fn command(&mut self, line: &str) -> Result<MailReply, BackendError> {
        self.send_line(line).await?;
        let reply = self.read_reply().await?;
        if reply.code >= 400 {
            return Err(reject(reply));
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn multi_line_reply() {
        let raw = "250-mail.example.com\r\n250-AUTH LOGIN PLAIN\r\n250 SIZE 1000\r\n";
        let mut reader = BufReader::new(raw.as_bytes());
        let reply = read_mail_reply(&mut reader).await.unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.lines.len(), 3);
        assert_eq!(reply.lines[1], "AUTH LOGIN PLAIN");
    }

    #[tokio::test]
    async fn malformed_reply_is_protocol_error() {
        let mut reader = BufReader::new("hello\r\n".as_bytes());
        assert!(matches!(
            read_mail_reply(&mut reader).await,
            Err(BackendError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn endless_replies_are_cut_off() {
        let raw = "250-more\r\n".repeat(MAX_REPLY_LINES + 1);
        let mut reader = BufReader::new(raw.as_bytes());
        assert!(matches!(
            read_mail_reply(&mut reader).await,
            Err(BackendError::Protocol(_))
        ));

        let raw = format!("220 {}", "x".repeat(MAX_LINE_LEN as usize));
        let mut reader = BufReader::new(raw.as_bytes());
        assert!(matches!(
            read_mail_reply(&mut reader).await,
            Err(BackendError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn handshake_falls_back_to_helo() {
        let (client, server) = tokio::io::duplex(1024);
        let server_task = tokio::spawn(async move {
            let mut server = BufReader::new(server);
            server.get_mut().write_all(b"220 mail ready\r\n").await.unwrap();
            let mut line = String::new();
            server.read_line(&mut line).await.unwrap();
            assert!(line.starts_with("EHLO"));
            server.get_mut().write_all(b"502 not implemented\r\n").await.unwrap();
            line.clear();
            server.read_line(&mut line).await.unwrap();
            assert!(line.starts_with("HELO"));
            server.get_mut().write_all(b"250 hello\r\n").await.unwrap();
        });
        let session = SmtpSession::handshake(Box::new(client), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(session.greeting(), "mail ready");
        assert!(session.extensions().is_empty());
        server_task.await.unwrap();
    }

    #[test]
    fn implicit_tls_port() {
        assert_eq!(default_port("smtps"), 465);
        assert_eq!(default_port("smtp"), 25);
    }
}
