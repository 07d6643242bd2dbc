//! SLIM service: one session per connection.
//!
//! A session announces the protocol version, then reads frames until the
//! client says `bye` or closes the stream. Each frame holds one statement
//! batch; it is executed by the session's own [`Interpreter`] and answered
//! with exactly one response frame. Codec and protocol errors end the
//! session; fixture failures never do.

use super::error::{ConfigError, ServiceError, ServiceResult};
use super::interaction::Interaction;
use super::interpreter::Interpreter;
use super::registry::FixtureRegistry;
use super::ServiceConfig;
use crate::PROTOCOL_VERSION;
use crate::protocol::statement::{decode_statements, encode_results};
use crate::protocol::{BYE, CodecError, decode, encode, read_frame, write_frame, write_version_line};
use parking_lot::Mutex;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use uuid::Uuid;

/// How a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client sent `bye`
    Bye,
    /// The client closed the stream between frames
    Disconnected,
}

/// Counters for a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// How the session ended
    pub end: SessionEnd,
    /// Batches answered
    pub batches: usize,
    /// Statements executed (halted batches count only executed statements)
    pub statements: usize,
}

/// Service entry point: shared fixture types plus the interaction strategy.
#[derive(Clone)]
pub struct Service {
    registry: Arc<FixtureRegistry>,
    interaction: Arc<dyn Interaction>,
}

impl Service {
    /// Create a service over `registry` using `interaction`.
    pub fn new(registry: Arc<FixtureRegistry>, interaction: Arc<dyn Interaction>) -> Self {
        Self {
            registry,
            interaction,
        }
    }

    /// Create a service using the interaction named in `config`.
    pub fn from_config(
        registry: Arc<FixtureRegistry>,
        config: &ServiceConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(registry, config.interaction()?))
    }

    /// Name of the interaction strategy in use.
    pub fn interaction_name(&self) -> &'static str {
        self.interaction.name()
    }

    /// Run one session over `reader`/`writer` with a fresh interpreter.
    pub fn handle<R: BufRead, W: Write>(&self, reader: R, writer: W) -> ServiceResult<SessionSummary> {
        let interpreter = Interpreter::new(Arc::clone(&self.registry), Arc::clone(&self.interaction));
        let mut session = Session {
            reader,
            writer,
            interpreter,
            batches: 0,
            statements: 0,
        };
        session.run()
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("registry", &self.registry)
            .field("interaction", &self.interaction.name())
            .finish()
    }
}

struct Session<R, W> {
    reader: R,
    writer: W,
    interpreter: Interpreter,
    batches: usize,
    statements: usize,
}

impl<R: BufRead, W: Write> Session<R, W> {
    fn run(&mut self) -> ServiceResult<SessionSummary> {
        write_version_line(&mut self.writer, PROTOCOL_VERSION)?;

        let end = loop {
            let payload = match read_frame(&mut self.reader) {
                Ok(payload) => payload,
                Err(CodecError::Closed) => break SessionEnd::Disconnected,
                Err(err) => return Err(err.into()),
            };

            if payload == BYE {
                break SessionEnd::Bye;
            }

            let response = self.execute(&payload)?;
            write_frame(&mut self.writer, &response)?;
        };

        self.interpreter.reset();
        Ok(SessionSummary {
            end,
            batches: self.batches,
            statements: self.statements,
        })
    }

    fn execute(&mut self, payload: &[u8]) -> Result<Vec<u8>, ServiceError> {
        let statements = decode_statements(decode(payload)?)?;
        tracing::debug!(statements = statements.len(), "received batch");

        let execution = self.interpreter.execute(statements);
        self.batches += 1;
        self.statements += execution.results.len();
        if execution.halted() {
            tracing::info!(executed = execution.results.len(), "batch halted by stop-test exception");
        }

        Ok(encode(&encode_results(&execution.results)))
    }
}

/// Shared count of sessions currently being served.
#[derive(Debug, Clone, Default)]
pub struct SessionCounter(Arc<Mutex<usize>>);

impl SessionCounter {
    /// Sessions in progress right now.
    pub fn active(&self) -> usize {
        *self.0.lock()
    }

    fn enter(&self) -> SessionGuard {
        *self.0.lock() += 1;
        SessionGuard(self.clone())
    }
}

struct SessionGuard(SessionCounter);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        *self.0.0.lock() -= 1;
    }
}

/// TCP accept loop serving one worker thread per connection.
pub struct SlimListener {
    listener: TcpListener,
    service: Service,
    sessions: SessionCounter,
}

impl SlimListener {
    /// Bind `addr` for `service`.
    pub fn bind<A: ToSocketAddrs>(addr: A, service: Service) -> std::io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr)?,
            service,
            sessions: SessionCounter::default(),
        })
    }

    /// Address actually bound (useful after binding port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle onto the live-session count.
    pub fn sessions(&self) -> SessionCounter {
        self.sessions.clone()
    }

    /// Accept connections forever.
    pub fn serve(self) -> std::io::Result<()> {
        let addr = self.listener.local_addr()?;
        tracing::info!(%addr, interaction = self.service.interaction_name(), "slim service listening");

        for incoming in self.listener.incoming() {
            match incoming {
                Ok(stream) => {
                    let service = self.service.clone();
                    let guard = self.sessions.enter();
                    thread::spawn(move || {
                        let _guard = guard;
                        serve_connection(&service, stream);
                    });
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to accept connection");
                }
            }
        }

        Ok(())
    }

    /// Run [`SlimListener::serve`] on a background thread.
    pub fn spawn(self) -> std::io::Result<ListenerHandle> {
        let addr = self.local_addr()?;
        let sessions = self.sessions();
        thread::Builder::new()
            .name("slim-listener".into())
            .spawn(move || self.serve())?;
        Ok(ListenerHandle { addr, sessions })
    }
}

/// A listener running on a detached background thread.
pub struct ListenerHandle {
    addr: SocketAddr,
    sessions: SessionCounter,
}

impl ListenerHandle {
    /// Bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Sessions in progress right now.
    pub fn active_sessions(&self) -> usize {
        self.sessions.active()
    }
}

fn serve_connection(service: &Service, stream: TcpStream) {
    let session_id = Uuid::new_v4();
    let peer = stream.peer_addr().ok();
    let _span = tracing::info_span!("session", id = %session_id, ?peer).entered();
    tracing::info!("connection accepted");

    stream.set_nodelay(true).ok();
    let reader = match stream.try_clone() {
        Ok(clone) => BufReader::new(clone),
        Err(err) => {
            tracing::warn!(error = %err, "could not clone stream");
            return;
        }
    };
    let writer = BufWriter::new(&stream);

    match service.handle(reader, writer) {
        Ok(summary) => tracing::info!(
            end = ?summary.end,
            batches = summary.batches,
            statements = summary.statements,
            "session closed"
        ),
        Err(err) => tracing::warn!(error = %err, "session aborted"),
    }

    stream.shutdown(Shutdown::Both).ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::statement::{decode_results, encode_statements};
    use crate::protocol::{ProtocolError, Statement, Value};
    use crate::runtime::fixture::FixtureClass;
    use crate::runtime::interaction::DefaultInteraction;
    use std::io::Cursor;

    #[derive(Default)]
    struct Echo;

    fn service() -> Service {
        let mut registry = FixtureRegistry::new();
        registry.register_class(
            FixtureClass::<Echo>::new("Echo")
                .default_constructor()
                .method("echo", 1, |_, args| Ok(args[0].clone())),
        );
        Service::new(Arc::new(registry), Arc::new(DefaultInteraction))
    }

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        write_frame(&mut out, payload).unwrap();
        out
    }

    fn batch(statements: &[Statement]) -> Vec<u8> {
        frame(&encode(&encode_statements(statements)))
    }

    #[test]
    fn test_session_answers_each_batch_then_bye() {
        let mut input = batch(&[Statement::make("m", "e", "Echo")]);
        input.extend(batch(&[Statement::call("c", "e", "echo").arg("hi")]));
        input.extend(frame(BYE));

        let mut output = Vec::new();
        let summary = service().handle(Cursor::new(input), &mut output).unwrap();
        assert_eq!(
            summary,
            SessionSummary {
                end: SessionEnd::Bye,
                batches: 2,
                statements: 2
            }
        );

        let mut reader = Cursor::new(output);
        let version = crate::protocol::read_version_line(&mut reader).unwrap();
        assert_eq!(version, PROTOCOL_VERSION);
        let first = decode_results(decode(&read_frame(&mut reader).unwrap()).unwrap()).unwrap();
        assert_eq!(first[0].id, "m");
        let second = decode_results(decode(&read_frame(&mut reader).unwrap()).unwrap()).unwrap();
        assert_eq!(second[0].outcome.to_value(), Value::str("hi"));
        assert!(matches!(read_frame(&mut reader), Err(CodecError::Closed)));
    }

    #[test]
    fn test_eof_between_frames_is_a_disconnect() {
        let mut output = Vec::new();
        let summary = service().handle(Cursor::new(Vec::new()), &mut output).unwrap();
        assert_eq!(summary.end, SessionEnd::Disconnected);
        assert_eq!(output, b"Slim -- V0.5\n");
    }

    #[test]
    fn test_truncated_frame_aborts_session() {
        let err = service()
            .handle(Cursor::new(b"000050:[000001:".to_vec()), Vec::new())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Codec(CodecError::Truncated(_))), "{err}");
    }

    #[test]
    fn test_unknown_verb_aborts_session() {
        let payload = encode(&Value::List(vec![Value::list(["id", "launch", "x"])]));
        let err = service()
            .handle(Cursor::new(frame(&payload)), Vec::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Protocol(ProtocolError::UnknownVerb { .. })
        ));
    }

    #[test]
    fn test_each_session_starts_empty() {
        let service = service();
        let mut first = batch(&[Statement::make("m", "e", "Echo")]);
        first.extend(frame(BYE));
        service.handle(Cursor::new(first), Vec::new()).unwrap();

        let second = batch(&[Statement::call("c", "e", "echo").arg("x")]);
        let mut output = Vec::new();
        service.handle(Cursor::new(second), &mut output).unwrap();

        let mut reader = Cursor::new(output);
        crate::protocol::read_version_line(&mut reader).unwrap();
        let results = decode_results(decode(&read_frame(&mut reader).unwrap()).unwrap()).unwrap();
        let exception = results[0].outcome.exception().unwrap();
        assert_eq!(exception.kind, crate::protocol::ExceptionKind::NoInstance);
    }

    #[test]
    fn test_session_counter() {
        let counter = SessionCounter::default();
        let guard = counter.enter();
        assert_eq!(counter.active(), 1);
        drop(guard);
        assert_eq!(counter.active(), 0);
    }
}
