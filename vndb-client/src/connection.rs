//! Connection management.
//!
//! Each [`Connection`] spawns one task that owns the transport halves, the
//! frame decoder and the request queue. Callers talk to it through an inbox
//! channel, so every queue mutation happens on that task, one event at a time.

use crate::config::{ConnectionConfig, MAX_READ_BUFFER_SIZE, MIN_READ_BUFFER_SIZE};
use crate::error::ClientError;
use crate::queue::{PendingReply, PendingRequest, RequestQueue};
use crate::tls::{create_insecure_tls_connector, create_tls_connector};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;
use vndb_protocol::reply::{parse_ack, parse_dbstats, parse_error, parse_results};
use vndb_protocol::{Command, CommandKind, DbStats, Decoder, Encoder, ProtocolError, Results};

type CloseSender = oneshot::Sender<Result<(), ClientError>>;

enum Envelope {
    Request(PendingRequest),
    Close(CloseSender),
}

/// Decoded success payload of an issued command.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// `ok` reply to `login` or `set`.
    Ack(String),
    DbStats(DbStats),
    Results(Results),
}

impl Outcome {
    /// Converts the payload back to JSON, e.g. for display.
    pub fn into_value(self) -> Value {
        match self {
            Outcome::Ack(ack) => Value::String(ack),
            Outcome::DbStats(stats) => Value::Object(stats),
            Outcome::Results(results) => json!({
                "num": results.num,
                "more": results.more,
                "items": results.items,
            }),
        }
    }
}

/// A connection to a VNDB server.
///
/// Requests are written one at a time in the order they were issued; the
/// next one goes out only after the reply to the previous one has arrived.
pub struct Connection {
    session_id: Uuid,
    inbox: mpsc::UnboundedSender<Envelope>,
    closed: AtomicBool,
}

impl Connection {
    /// Opens a TCP connection (and TLS session, when enabled) to the configured server.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, ClientError> {
        let addr = config.addr();
        tracing::debug!("Connecting to {}...", addr);

        let tcp_stream = tokio::time::timeout(config.connect_timeout(), TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                tracing::debug!("Connection timeout");
                ClientError::Timeout
            })?
            .map_err(|e| {
                tracing::debug!("Connection failed: {}", e);
                ClientError::Io(e)
            })?;

        tcp_stream.set_nodelay(true).ok();

        if !config.tls.enabled {
            tracing::debug!("TCP connected (plaintext)");
            return Ok(Self::from_stream(tcp_stream, config.read_buffer_size));
        }

        let (connector, server_name) = if config.tls.insecure {
            tracing::warn!("Using insecure TLS (certificate verification disabled)");
            create_insecure_tls_connector(&config.tls, &config.host)?
        } else {
            create_tls_connector(&config.tls, &config.host)?
        };

        tracing::debug!("Performing TLS handshake...");
        let tls_stream =
            tokio::time::timeout(config.connect_timeout(), connector.connect(server_name, tcp_stream))
                .await
                .map_err(|_| ClientError::Timeout)?
                .map_err(|e| ClientError::TlsHandshake(e.to_string()))?;
        tracing::debug!("TLS handshake complete");

        Ok(Self::from_stream(tls_stream, config.read_buffer_size))
    }

    /// Starts a connection over an already established transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_stream<S>(stream: S, read_buffer_size: usize) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let session_id = Uuid::new_v4();
        let (inbox, rx) = mpsc::unbounded_channel();
        let (reader, writer) = tokio::io::split(stream);

        let task = ConnectionTask {
            session_id,
            reader,
            writer: Some(writer),
            decoder: Decoder::new(),
            queue: RequestQueue::new(),
            inbox: rx,
            closer: None,
            closing: false,
            read_buffer_size: read_buffer_size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE),
        };
        tokio::spawn(task.run());
        tracing::debug!("[{}] connection established", session_id);

        Self {
            session_id,
            inbox,
            closed: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Returns whether `close()` was called or the transport has gone away.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.inbox.is_closed()
    }

    /// Queues a raw message and returns its deferred reply.
    ///
    /// The request is queued when this returns; the reply resolves with the
    /// raw reply line.
    pub fn enqueue(&self, message: &str) -> Result<PendingReply, ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::ConnectionClosed);
        }

        let frame = Encoder::encode_message(message)?.freeze();
        let (request, reply) = PendingRequest::new(message.to_string(), frame);
        tracing::debug!("[{}] queueing {}", self.session_id, request.command_name());

        self.inbox
            .send(Envelope::Request(request))
            .map_err(|_| ClientError::ConnectionClosed)?;
        Ok(reply)
    }

    /// Sends a raw message and returns the raw reply, without classification.
    pub fn write(
        &self,
        message: &str,
    ) -> impl Future<Output = Result<String, ClientError>> + Send + 'static {
        let reply = self.enqueue(message);
        async move { reply?.await }
    }

    /// Issues a command and decodes its reply.
    ///
    /// Argument errors are detected before anything is queued. An `error`
    /// reply fails with [`ClientError::Server`].
    pub fn issue(
        &self,
        command: Command,
    ) -> impl Future<Output = Result<Outcome, ClientError>> + Send + 'static {
        let kind = command.kind();
        self.issue_with(command, move |line| parse_outcome(kind, line))
    }

    /// Issues a command and decodes its reply with `parse`.
    ///
    /// `parse` returns `Ok(None)` for a reply of the wrong kind, which fails
    /// with [`ProtocolError::UnexpectedResponse`].
    pub fn issue_with<T, P>(
        &self,
        command: Command,
        parse: P,
    ) -> impl Future<Output = Result<T, ClientError>> + Send + 'static
    where
        T: Send + 'static,
        P: FnOnce(&str) -> Result<Option<T>, ProtocolError> + Send + 'static,
    {
        let reply = command
            .to_line()
            .map_err(ClientError::from)
            .and_then(|line| self.enqueue(&line));

        async move {
            let line = reply?.await?;
            decode_reply(&line, parse)
        }
    }

    /// Half-closes the transport once every queued request has been answered,
    /// then waits for the server to close its side.
    pub async fn close(&self) -> Result<(), ClientError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!("[{}] closing connection", self.session_id);

        let (tx, rx) = oneshot::channel();
        if self.inbox.send(Envelope::Close(tx)).is_err() {
            // Task already gone: the transport is terminated.
            return Ok(());
        }
        rx.await.unwrap_or(Ok(()))
    }
}

/// Classifies a reply line: `error` replies first, then `parse`.
fn decode_reply<T>(
    line: &str,
    parse: impl FnOnce(&str) -> Result<Option<T>, ProtocolError>,
) -> Result<T, ClientError> {
    if let Some(detail) = parse_error(line)? {
        return Err(ClientError::Server(detail));
    }
    parse(line)?.ok_or_else(|| ProtocolError::UnexpectedResponse(line.to_string()).into())
}

fn parse_outcome(kind: CommandKind, line: &str) -> Result<Option<Outcome>, ProtocolError> {
    Ok(match kind {
        CommandKind::Login | CommandKind::Set => parse_ack(line)?.map(Outcome::Ack),
        CommandKind::DbStats => parse_dbstats(line)?.map(Outcome::DbStats),
        CommandKind::Get => parse_results(line)?.map(Outcome::Results),
    })
}

struct ConnectionTask<S> {
    session_id: Uuid,
    reader: ReadHalf<S>,
    writer: Option<WriteHalf<S>>,
    decoder: Decoder,
    queue: RequestQueue,
    inbox: mpsc::UnboundedReceiver<Envelope>,
    closer: Option<CloseSender>,
    /// Shut the writer down as soon as the queue drains.
    closing: bool,
    read_buffer_size: usize,
}

impl<S> ConnectionTask<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn run(mut self) {
        let mut buf = vec![0u8; self.read_buffer_size];
        let mut inbox_open = true;

        let failure = loop {
            tokio::select! {
                envelope = self.inbox.recv(), if inbox_open => {
                    match envelope {
                        Some(Envelope::Request(request)) => self.queue.push(request),
                        Some(Envelope::Close(closer)) => {
                            self.closer = Some(closer);
                            self.closing = true;
                        }
                        None => {
                            // Every handle dropped; finish what is queued and stop.
                            inbox_open = false;
                            self.closing = true;
                        }
                    }
                    if let Err(e) = self.dispatch().await {
                        break Some(e);
                    }
                }
                read = self.reader.read(&mut buf) => {
                    match read {
                        Ok(0) => {
                            tracing::debug!("[{}] server closed the connection", self.session_id);
                            break None;
                        }
                        Ok(n) => {
                            if let Err(e) = self.on_data(&buf[..n]).await {
                                break Some(e);
                            }
                        }
                        Err(e) => break Some(ClientError::Io(e)),
                    }
                }
            }

            if !inbox_open && self.writer.is_none() {
                break None;
            }
        };

        self.finish(failure);
    }

    /// Writes the head of the queue if the wire is free.
    async fn dispatch(&mut self) -> Result<(), ClientError> {
        let Some(frame) = self.queue.start_next() else {
            if self.closing && self.queue.is_drained() {
                self.shutdown_writer().await?;
            }
            return Ok(());
        };

        let Some(writer) = self.writer.as_mut() else {
            // Raced with close(): nothing can be written anymore.
            self.queue.resolve(Err(ClientError::ConnectionClosed));
            self.queue.reject_queued(|| ClientError::ConnectionClosed);
            return Ok(());
        };

        tracing::debug!(
            "[{}] sending {} ({} bytes, {} queued)",
            self.session_id,
            self.queue.in_flight_command().unwrap_or_default(),
            frame.len(),
            self.queue.queued()
        );
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Pairs every complete frame with the in-flight request.
    async fn on_data(&mut self, data: &[u8]) -> Result<(), ClientError> {
        self.decoder.extend(data);

        loop {
            let reply: Result<String, ClientError> = match self.decoder.decode_line() {
                Ok(Some(line)) => Ok(line),
                Ok(None) => return Ok(()),
                // The frame is consumed, so the stream stays aligned.
                Err(ProtocolError::InvalidUtf8) => Err(ProtocolError::InvalidUtf8.into()),
                Err(e) => return Err(e.into()),
            };

            match self.queue.in_flight_command() {
                Some(command) => tracing::debug!("[{}] reply to {}", self.session_id, command),
                None => {
                    tracing::warn!(
                        "[{}] discarding frame received with no request in flight",
                        self.session_id
                    );
                    continue;
                }
            }

            self.queue.resolve(reply);
            self.dispatch().await?;
        }
    }

    async fn shutdown_writer(&mut self) -> Result<(), ClientError> {
        if let Some(mut writer) = self.writer.take() {
            tracing::debug!("[{}] half-closing transport", self.session_id);
            writer.shutdown().await?;
        }
        Ok(())
    }

    fn finish(mut self, failure: Option<ClientError>) {
        match &failure {
            Some(e) => tracing::debug!("[{}] connection failed: {}", self.session_id, e),
            None => tracing::debug!("[{}] connection closed", self.session_id),
        }

        // Collect whatever reached the inbox after the last event.
        self.inbox.close();
        while let Ok(envelope) = self.inbox.try_recv() {
            match envelope {
                Envelope::Request(request) => self.queue.push(request),
                Envelope::Close(closer) => self.closer = Some(closer),
            }
        }

        if let Some(closer) = self.closer.take() {
            let result = match &failure {
                None => Ok(()),
                Some(ClientError::Io(e)) => Err(ClientError::Io(std::io::Error::new(
                    e.kind(),
                    e.to_string(),
                ))),
                Some(_) => Err(ClientError::ConnectionClosed),
            };
            let _ = closer.send(result);
        }

        self.queue
            .resolve(Err(failure.unwrap_or(ClientError::ConnectionClosed)));
        let rejected = self.queue.reject_queued(|| ClientError::ConnectionClosed);
        if rejected > 0 {
            tracing::debug!(
                "[{}] rejected {} queued requests",
                self.session_id,
                rejected
            );
        }
    }
}
