//! Minimal RESP2 client for Redis-compatible store instances.
//!
//! Only what the coordinator needs is implemented: `AUTH`, `SELECT`, `PING`,
//! `INFO` and `BGREWRITEAOF`, each of which answers with a single
//! non-array reply. Each [`RedisInstance`] owns at most one connection,
//! opened lazily and replaced after any transport failure.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

use crate::error::ClientError;
use crate::instance::StoreInstance;

/// Largest bulk reply accepted (matches the server's own proto limit).
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Largest reply header or status line accepted, CRLF included.
const MAX_LINE_LEN: u64 = 64 * 1024;

/// Connection settings shared by every instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// TCP connect timeout.
    pub connect_timeout: Duration,

    /// Sent with `AUTH` right after connecting.
    pub password: Option<String>,

    /// Selected right after connecting when non-zero.
    pub db: i64,

    /// Fresh-connection retries for a command that hit a transport error.
    pub max_retries: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            password: None,
            db: 0,
            max_retries: 3,
        }
    }
}

/// A decoded non-error reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Status(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
}

/// Encode a command as a RESP array of bulk strings.
pub fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut buf = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        buf.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.extend_from_slice(arg.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf
}

struct Connection {
    stream: BufStream<TcpStream>,
}

impl Connection {
    async fn open(addr: &str, options: &ClientOptions) -> Result<Self, ClientError> {
        let stream = match timeout(options.connect_timeout, TcpStream::connect(addr)).await {
            Ok(result) => result?,
            Err(_) => return Err(ClientError::Timeout(options.connect_timeout)),
        };
        stream.set_nodelay(true)?;

        let mut conn = Self {
            stream: BufStream::new(stream),
        };

        if let Some(password) = &options.password {
            conn.command(&["AUTH", password.as_str()]).await?;
        }
        if options.db != 0 {
            let db = options.db.to_string();
            conn.command(&["SELECT", db.as_str()]).await?;
        }

        debug!(addr = %addr, db = options.db, "Connected to store instance");
        Ok(conn)
    }

    async fn command(&mut self, args: &[&str]) -> Result<Reply, ClientError> {
        self.stream.write_all(&encode_command(args)).await?;
        self.stream.flush().await?;
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> Result<Reply, ClientError> {
        let line = self.read_line().await?;
        let Some(tag) = line.chars().next() else {
            return Err(ClientError::Protocol("empty reply line".to_string()));
        };
        let body = &line[tag.len_utf8()..];

        match tag {
            '+' => Ok(Reply::Status(body.to_string())),
            '-' => Err(ClientError::Server(body.to_string())),
            ':' => body
                .parse()
                .map(Reply::Integer)
                .map_err(|_| ClientError::Protocol(format!("invalid integer reply: {body:?}"))),
            '$' => {
                let len: i64 = body
                    .parse()
                    .map_err(|_| ClientError::Protocol(format!("invalid bulk length: {body:?}")))?;
                if len < 0 {
                    return Ok(Reply::Bulk(None));
                }
                let len = usize::try_from(len)
                    .ok()
                    .filter(|len| *len <= MAX_BULK_LEN)
                    .ok_or_else(|| ClientError::Protocol(format!("bulk reply too large: {len}")))?;

                let mut data = vec![0u8; len + 2];
                self.stream.read_exact(&mut data).await?;
                if !data.ends_with(b"\r\n") {
                    return Err(ClientError::Protocol(
                        "bulk reply not terminated by CRLF".to_string(),
                    ));
                }
                data.truncate(len);
                Ok(Reply::Bulk(Some(data)))
            }
            other => Err(ClientError::Protocol(format!(
                "unsupported reply type {other:?}"
            ))),
        }
    }

    async fn read_line(&mut self) -> Result<String, ClientError> {
        let mut line = Vec::new();
        let n = (&mut self.stream)
            .take(MAX_LINE_LEN)
            .read_until(b'\n', &mut line)
            .await?;
        if n == 0 {
            return Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            )));
        }
        if !line.ends_with(b"\n") && n as u64 == MAX_LINE_LEN {
            return Err(ClientError::Protocol(format!(
                "reply line exceeds {MAX_LINE_LEN} bytes"
            )));
        }
        if !line.ends_with(b"\r\n") {
            return Err(ClientError::Protocol("reply line not terminated by CRLF".to_string()));
        }
        line.truncate(line.len() - 2);

        String::from_utf8(line)
            .map_err(|_| ClientError::Protocol("reply line is not UTF-8".to_string()))
    }
}

/// A Redis-compatible store instance reached over TCP.
pub struct RedisInstance {
    addr: String,
    options: ClientOptions,
    conn: Mutex<Option<Connection>>,
}

impl RedisInstance {
    /// Create a handle; no connection is made until the first command.
    pub fn new(addr: impl Into<String>, options: ClientOptions) -> Self {
        Self {
            addr: addr.into(),
            options,
            conn: Mutex::new(None),
        }
    }

    /// Create a handle and verify the instance answers `PING`.
    pub async fn connect(
        addr: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let instance = Self::new(addr, options);
        instance.ping().await?;
        Ok(instance)
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        match self.execute(&["PING"]).await? {
            Reply::Status(status) if status == "PONG" => Ok(()),
            other => Err(ClientError::Protocol(format!("unexpected PING reply: {other:?}"))),
        }
    }

    /// `INFO <section>`; returns the raw report text.
    pub async fn info(&self, section: &str) -> Result<String, ClientError> {
        match self.execute(&["INFO", section]).await? {
            Reply::Bulk(Some(data)) => String::from_utf8(data)
                .map_err(|_| ClientError::Protocol("INFO reply is not UTF-8".to_string())),
            other => Err(ClientError::Protocol(format!("unexpected INFO reply: {other:?}"))),
        }
    }

    /// `BGREWRITEAOF`; returns the server's status message.
    pub async fn bgrewriteaof(&self) -> Result<String, ClientError> {
        match self.execute(&["BGREWRITEAOF"]).await? {
            Reply::Status(status) => Ok(status),
            other => Err(ClientError::Protocol(format!(
                "unexpected BGREWRITEAOF reply: {other:?}"
            ))),
        }
    }

    async fn execute(&self, args: &[&str]) -> Result<Reply, ClientError> {
        let mut slot = self.conn.lock().await;
        let mut attempt = 0u32;

        loop {
            match self.exchange(&mut slot, args).await {
                Err(e) if e.is_connection_error() && attempt < self.options.max_retries => {
                    attempt += 1;
                    debug!(
                        instance = %self.addr,
                        attempt,
                        error = %e,
                        "Command failed, reconnecting"
                    );
                }
                result => return result,
            }
        }
    }

    /// Run one command, keeping the connection only if it is still in sync.
    ///
    /// The connection is held outside the slot while in flight, so a
    /// cancelled call drops it instead of leaving an unread reply behind.
    async fn exchange(
        &self,
        slot: &mut Option<Connection>,
        args: &[&str],
    ) -> Result<Reply, ClientError> {
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => Connection::open(&self.addr, &self.options).await?,
        };

        let result = conn.command(args).await;
        if !matches!(&result, Err(e) if e.is_connection_error()) {
            *slot = Some(conn);
        }
        result
    }
}

#[async_trait]
impl StoreInstance for RedisInstance {
    fn name(&self) -> &str {
        &self.addr
    }

    async fn query_status(&self) -> Result<String, ClientError> {
        self.info("persistence").await
    }

    async fn trigger_rewrite(&self) -> Result<(), ClientError> {
        let status = self.bgrewriteaof().await?;
        debug!(instance = %self.addr, status = %status, "BGREWRITEAOF accepted");
        Ok(())
    }
}
