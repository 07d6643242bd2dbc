//! Client for the SLIM service.
//!
//! This module provides a small, synchronous client: connect and check the
//! announced version, send statement batches, read back the response as an
//! ordered map, and say `bye`. Fixture failures come back as ordinary
//! entries in the [`Response`]; only transport and protocol problems are
//! errors.

use super::error::{ClientError, ClientResult};
use crate::PROTOCOL_VERSION;
use crate::protocol::handshake::{read_version_line, versions_match};
use crate::protocol::statement::{decode_result_values, encode_statements};
use crate::protocol::{BYE, ProtocolError, SlimException, Statement, Value, decode, encode};
use crate::protocol::{read_frame, write_frame};
use indexmap::IndexMap;
use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

/// Connection settings for [`SlimClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Version the server must announce
    pub expected_version: f64,
    /// Upper bound on establishing the TCP connection
    pub connect_timeout: Option<Duration>,
    /// Upper bound on each blocking read; expiry is a fatal session error
    pub read_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            expected_version: PROTOCOL_VERSION,
            connect_timeout: Some(Duration::from_secs(5)),
            read_timeout: None,
        }
    }
}

/// Poll-connect policy for services that may still be starting up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait between attempts
    pub interval: Duration,
    /// Give up after this many attempts; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10),
            max_attempts: Some(500),
        }
    }
}

/// Result entries of one batch, keyed by statement id in response order.
///
/// Values are kept exactly as the server sent them, exceptions included;
/// [`Response::exception`] parses one on demand.
///
/// A statement that never ran (because an earlier stop-test halted the
/// batch) has no entry: [`Response::get`] returns `None`, which is distinct
/// from an entry holding the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    entries: IndexMap<String, Value>,
}

impl Response {
    /// Value for `id`, if the server produced an entry for it.
    pub fn get(&self, id: &str) -> Option<&Value> {
        self.entries.get(id)
    }

    /// String value for `id`; `None` if absent or a list.
    pub fn get_str(&self, id: &str) -> Option<&str> {
        self.get(id).and_then(Value::as_str)
    }

    /// Decoded exception for `id`, if its entry is one.
    pub fn exception(&self, id: &str) -> Option<SlimException> {
        self.get_str(id).and_then(SlimException::parse)
    }

    /// Whether an entry exists for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the response has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Statement ids in response order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// `(id, value)` pairs in response order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(id, value)| (id.as_str(), value))
    }

    /// Take the underlying ordered map.
    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.entries
    }
}

impl FromIterator<(String, Value)> for Response {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Synchronous client for one SLIM session.
pub struct SlimClient {
    connection: Option<Connection>,
    peer: SocketAddr,
    server_version: f64,
}

struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl SlimClient {
    /// Connect with default options and check the announced version.
    pub fn connect(host: &str, port: u16) -> ClientResult<Self> {
        Self::connect_with(host, port, &ClientOptions::default())
    }

    /// Connect and check the announced version against `options`.
    ///
    /// A refused connection fails immediately with
    /// [`ClientError::Connection`]; callers poll with
    /// [`SlimClient::connect_with_retry`] while a service starts.
    pub fn connect_with(host: &str, port: u16, options: &ClientOptions) -> ClientResult<Self> {
        let target = format!("{host}:{port}");
        let candidates: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|source| ClientError::Connection {
                addr: target.clone(),
                source,
            })?
            .collect();

        let mut last_err = None;
        for candidate in candidates {
            let attempt = match options.connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(&candidate, timeout),
                None => TcpStream::connect(candidate),
            };
            match attempt {
                Ok(stream) => return Self::handshake(stream, candidate, options),
                Err(err) => last_err = Some(err),
            }
        }

        match last_err {
            Some(source) => Err(ClientError::Connection {
                addr: target,
                source,
            }),
            None => Err(ClientError::NoAddress(target)),
        }
    }

    /// Connect, retrying refused connections according to `policy`.
    pub fn connect_with_retry(
        host: &str,
        port: u16,
        options: &ClientOptions,
        policy: &RetryPolicy,
    ) -> ClientResult<Self> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match Self::connect_with(host, port, options) {
                Ok(client) => return Ok(client),
                Err(err) if err.is_retryable() && policy.max_attempts.is_none_or(|max| attempt < max) => {
                    tracing::debug!(attempt, error = %err, "service not ready, retrying");
                    thread::sleep(policy.interval);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn handshake(stream: TcpStream, peer: SocketAddr, options: &ClientOptions) -> ClientResult<Self> {
        stream.set_nodelay(true).ok();
        stream.set_read_timeout(options.read_timeout)?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream);
        let server_version = read_version_line(&mut reader)?;
        if !versions_match(options.expected_version, server_version) {
            writer.get_ref().shutdown(Shutdown::Both).ok();
            return Err(ProtocolError::VersionMismatch {
                expected: options.expected_version,
                actual: server_version,
            }
            .into());
        }

        tracing::debug!(%peer, server_version, "connected to slim service");
        Ok(Self {
            connection: Some(Connection { reader, writer }),
            peer,
            server_version,
        })
    }

    /// Version announced by the server during the handshake.
    pub fn server_version(&self) -> f64 {
        self.server_version
    }

    /// Address of the server.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Whether the session is still usable.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Send one batch and wait for its response.
    ///
    /// Any transport or protocol error drops the connection; reconnect to
    /// continue.
    pub fn invoke_and_get_response(&mut self, statements: &[Statement]) -> ClientResult<Response> {
        let connection = self.connection.as_mut().ok_or(ClientError::NotConnected)?;
        let result = connection.exchange(statements);
        if result.is_err() {
            self.close();
        }
        result
    }

    /// Tell the server the session is over. No response is expected.
    pub fn send_bye(&mut self) -> ClientResult<()> {
        let connection = self.connection.as_mut().ok_or(ClientError::NotConnected)?;
        write_frame(&mut connection.writer, BYE)?;
        Ok(())
    }

    /// Close the connection. Safe to call repeatedly and after `send_bye`.
    pub fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.shutdown();
        }
    }
}

impl Connection {
    fn exchange(&mut self, statements: &[Statement]) -> ClientResult<Response> {
        let payload = encode(&encode_statements(statements));
        write_frame(&mut self.writer, &payload)?;

        let frame = read_frame(&mut self.reader)?;
        Ok(decode_result_values(decode(&frame)?)?.into_iter().collect())
    }

    fn shutdown(self) {
        let Connection { reader, writer } = self;
        // A failed flush means the peer is already gone.
        if let Ok(stream) = writer.into_inner() {
            stream.shutdown(Shutdown::Both).ok();
        }
        reader.get_ref().shutdown(Shutdown::Both).ok();
    }
}

impl Drop for SlimClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SlimClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlimClient")
            .field("peer", &self.peer)
            .field("server_version", &self.server_version)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ExceptionKind;

    fn response() -> Response {
        [
            ("a".to_string(), Value::str("1")),
            ("empty".to_string(), Value::str("")),
            (
                "boom".to_string(),
                Value::str(SlimException::no_instance("x", "f").encode()),
            ),
            ("table".to_string(), Value::list(["r1", "r2"])),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_missing_is_distinct_from_empty() {
        let response = response();
        assert_eq!(response.get_str("empty"), Some(""));
        assert_eq!(response.get("absent"), None);
        assert!(response.contains("empty"));
        assert!(!response.contains("absent"));
    }

    #[test]
    fn test_exception_lookup() {
        let response = response();
        assert_eq!(
            response.exception("boom").map(|e| e.kind),
            Some(ExceptionKind::NoInstance)
        );
        assert!(response.exception("a").is_none());
        assert!(response.exception("table").is_none());
    }

    #[test]
    fn test_response_order() {
        let ids: Vec<_> = response().ids().map(str::to_owned).collect();
        assert_eq!(ids, vec!["a", "empty", "boom", "table"]);
    }

    #[test]
    fn test_refused_connection_is_retryable() {
        // Bind then drop to find a port nothing listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let err = SlimClient::connect("127.0.0.1", port).unwrap_err();
        assert!(err.is_retryable(), "{err}");

        let policy = RetryPolicy {
            interval: Duration::from_millis(1),
            max_attempts: Some(3),
        };
        let err = SlimClient::connect_with_retry("127.0.0.1", port, &ClientOptions::default(), &policy)
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
