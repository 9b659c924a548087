//! Minimal RESP2 client: enough to authenticate, select a database and
//! run the handful of read-mostly commands the adapter needs.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use uriprobe_core::{BackendError, Endpoint, ProbeSettings};

use crate::session::{Connector, KvSession, Reply, Session};
use crate::transport::{self, BoxedStream};

pub const DEFAULT_PORT: u16 = 6379;

/// Largest bulk string a server may announce (the proto-max-bulk-len default).
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

const MAX_LINE_LEN: u64 = 64 * 1024;
const PREALLOC_LIMIT: i64 = 1024;

/// Encode one command as a RESP array of bulk strings.
pub fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

type ReplyFuture<'a> = Pin<Box<dyn Future<Output = Result<Reply, BackendError>> + Send + 'a>>;

/// Read one reply, recursing into arrays.
pub fn read_reply<R>(reader: &mut R) -> ReplyFuture<'_>
where
    R: AsyncBufRead + Unpin + Send,
{
    Box::pin(async move {
        let line = read_line(reader).await?;
        let mut chars = line.chars();
        let marker = chars.next().unwrap_or_default();
        let body = chars.as_str();
        match marker {
            '+' => Ok(Reply::Status(body.to_string())),
            '-' => {
                let code = body.split_whitespace().next().unwrap_or("ERR");
                Err(BackendError::server(code, body))
            }
            ':' => parse_length(body).map(Reply::Integer),
            '$' => {
                let len = parse_length(body)?;
                if len < 0 {
                    return Ok(Reply::Nil);
                }
                if len > MAX_BULK_LEN {
                    return Err(BackendError::Protocol(format!(
                        "bulk length {len} exceeds {MAX_BULK_LEN}"
                    )));
                }
                // Grow with the bytes that actually arrive, not the announced size.
                let expected = len as u64 + 2;
                let mut buf = Vec::with_capacity(len.min(PREALLOC_LIMIT) as usize + 2);
                (&mut *reader)
                    .take(expected)
                    .read_to_end(&mut buf)
                    .await
                    .map_err(|err| BackendError::from_io(&err))?;
                if buf.len() as u64 != expected {
                    return Err(BackendError::Io {
                        kind: std::io::ErrorKind::UnexpectedEof,
                        message: "connection closed inside a bulk reply".to_string(),
                    });
                }
                buf.truncate(len as usize);
                Ok(Reply::Bulk(String::from_utf8_lossy(&buf).into_owned()))
            }
            '*' => {
                let len = parse_length(body)?;
                if len < 0 {
                    return Ok(Reply::Nil);
                }
                let mut items = Vec::with_capacity(len.min(PREALLOC_LIMIT) as usize);
                for _ in 0..len {
                    items.push(read_reply(reader).await?);
                }
                Ok(Reply::Array(items))
            }
            other => Err(BackendError::Protocol(format!(
                "unexpected RESP marker {other:?}"
            ))),
        }
    })
}

async fn read_line<R>(reader: &mut R) -> Result<String, BackendError>
where
    R: AsyncBufRead + Unpin + Send,
{
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
            "RESP line longer than {MAX_LINE_LEN} bytes"
        )));
    }
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return Err(BackendError::Protocol("empty RESP line".to_string()));
    }
    Ok(line.to_string())
}

fn parse_length(body: &str) -> Result<i64, BackendError> {
    body.trim()
        .parse()
        .map_err(|_| BackendError::Protocol(format!("invalid RESP length {body:?}")))
}

/// Opens RESP sessions, over TLS for `rediss`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisConnector;

pub struct RedisSession {
    stream: BufReader<BoxedStream>,
    read_timeout: Duration,
}

impl RedisSession {
    pub fn from_stream(stream: BoxedStream, read_timeout: Duration) -> Self {
        Self {
            stream: BufReader::new(stream),
            read_timeout,
        }
    }
}

#[async_trait]
impl Connector for RedisConnector {
    type Session = RedisSession;

    async fn connect(
        &self,
        endpoint: &Endpoint,
        settings: &ProbeSettings,
    ) -> Result<RedisSession, BackendError> {
        let stream = transport::open(
            endpoint.host_or_localhost(),
            endpoint.port_or(DEFAULT_PORT),
            endpoint.scheme() == "rediss",
            settings.timeouts.connect(),
            settings.tls.accept_invalid_certs,
        )
        .await?;
        let mut session = RedisSession::from_stream(stream, settings.timeouts.read());

        match (endpoint.user(), endpoint.password()) {
            (Some(user), Some(password)) => {
                session.command(&["AUTH", user, password]).await?;
            }
            (None, Some(password)) => {
                session.command(&["AUTH", password]).await?;
            }
            _ => {}
        }
        if let Some(index) = endpoint.database().filter(|db| db.parse::<u32>().is_ok()) {
            session.command(&["SELECT", index]).await?;
        }
        Ok(session)
    }
}

#[async_trait]
impl Session for RedisSession {
    async fn ping(&mut self) -> Result<(), BackendError> {
        let reply = self.command(&["PING"]).await?;
        match reply.as_text() {
            Some(text) if text.eq_ignore_ascii_case("PONG") => Ok(()),
            _ => Err(BackendError::Protocol(format!("unexpected PING reply {reply:?}"))),
        }
    }

    /// QUIT without waiting for the reply; the stream may hold an abandoned one.
    async fn close(mut self) -> Result<(), BackendError> {
        let stream = self.stream.get_mut();
        stream
            .write_all(&encode_command(&["QUIT"]))
            .await
            .map_err(|err| BackendError::from_io(&err))?;
        stream
            .shutdown()
            .await
            .map_err(|err| BackendError::from_io(&err))
    }
}

#[async_trait]
impl KvSession for RedisSession {
    async fn command(&mut self, args: &[&str]) -> Result<Reply, BackendError> {
        let verb = args.first().copied().unwrap_or_default().to_string();
        let limit = self.read_timeout;
        let exchange = async {
            let stream = self.stream.get_mut();
            stream
                .write_all(&encode_command(args))
                .await
                .map_err(|err| BackendError::from_io(&err))?;
            stream
                .flush()
                .await
                .map_err(|err| BackendError::from_io(&err))?;
            read_reply(&mut self.stream).await
        };
        match tokio::time::timeout(limit, exchange).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(format!("redis {verb}"))),
        }
    }
}
