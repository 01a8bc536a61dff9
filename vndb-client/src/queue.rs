//! Single-flight request queue.
//!
//! Owns the FIFO of requests waiting for the wire and the one request that
//! is currently in flight. It performs no I/O: the connection task asks it
//! for the next frame to write and hands it every reply frame, so the
//! ordering rules can be exercised without a transport.

use crate::error::ClientError;
use bytes::Bytes;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

type ReplySender = oneshot::Sender<Result<String, ClientError>>;

/// Deferred reply of a queued request.
///
/// Resolves with the raw reply line (sentinel stripped), or with the error
/// that ended the connection. Dropping it does not withdraw the request.
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<Result<String, ClientError>>,
}

impl Future for PendingReply {
    type Output = Result<String, ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(ClientError::ConnectionClosed)))
    }
}

/// A request waiting for, or occupying, the wire.
#[derive(Debug)]
pub struct PendingRequest {
    message: String,
    frame: Bytes,
    reply: ReplySender,
}

impl PendingRequest {
    /// Creates a request from its message and encoded frame.
    pub fn new(message: String, frame: Bytes) -> (Self, PendingReply) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                message,
                frame,
                reply,
            },
            PendingReply { rx },
        )
    }

    /// Command name (first token), safe to log without the body.
    pub fn command_name(&self) -> &str {
        self.message.split(' ').next().unwrap_or_default()
    }
}

#[derive(Debug)]
enum Flight {
    Idle,
    InFlight(PendingRequest),
}

/// FIFO queue with at most one request in flight.
#[derive(Debug)]
pub struct RequestQueue {
    queued: VecDeque<PendingRequest>,
    flight: Flight,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self {
            queued: VecDeque::new(),
            flight: Flight::Idle,
        }
    }

    /// Appends a request to the tail of the queue.
    pub fn push(&mut self, request: PendingRequest) {
        self.queued.push_back(request);
    }

    /// Moves the head of the queue in flight and returns its frame.
    ///
    /// Returns `None` while a request is already in flight or when the queue
    /// is empty.
    pub fn start_next(&mut self) -> Option<Bytes> {
        if !self.is_idle() {
            return None;
        }
        let request = self.queued.pop_front()?;
        let frame = request.frame.clone();
        self.flight = Flight::InFlight(request);
        Some(frame)
    }

    /// Pairs a reply with the in-flight request and frees the wire.
    ///
    /// Returns `false` if nothing was in flight.
    pub fn resolve(&mut self, reply: Result<String, ClientError>) -> bool {
        match std::mem::replace(&mut self.flight, Flight::Idle) {
            Flight::InFlight(request) => {
                // The caller may have dropped its PendingReply.
                let _ = request.reply.send(reply);
                true
            }
            Flight::Idle => false,
        }
    }

    /// Rejects every request that has not been written yet.
    ///
    /// Returns the number of rejected requests.
    pub fn reject_queued(&mut self, error: impl Fn() -> ClientError) -> usize {
        let count = self.queued.len();
        for request in self.queued.drain(..) {
            let _ = request.reply.send(Err(error()));
        }
        count
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.flight, Flight::Idle)
    }

    /// Returns the command name of the in-flight request.
    pub fn in_flight_command(&self) -> Option<&str> {
        match &self.flight {
            Flight::InFlight(request) => Some(request.command_name()),
            Flight::Idle => None,
        }
    }

    /// Number of requests waiting behind the in-flight one.
    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    /// True when nothing is queued or in flight.
    pub fn is_drained(&self) -> bool {
        self.is_idle() && self.queued.is_empty()
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::task;
    use tokio_test::{assert_pending, assert_ready};

    fn request(message: &str) -> (PendingRequest, PendingReply) {
        let mut frame = message.as_bytes().to_vec();
        frame.push(vndb_protocol::SENTINEL);
        PendingRequest::new(message.to_string(), Bytes::from(frame))
    }

    #[test]
    fn test_single_flight_in_fifo_order() {
        let mut queue = RequestQueue::new();
        let (first, first_reply) = request("dbstats");
        let (second, second_reply) = request("get vn basic (id = 1)");
        queue.push(first);
        queue.push(second);

        let mut first_reply = task::spawn(first_reply);
        let mut second_reply = task::spawn(second_reply);

        assert_eq!(queue.start_next().unwrap().as_ref(), b"dbstats\x04");
        assert_eq!(queue.in_flight_command(), Some("dbstats"));
        // Wire is busy.
        assert!(queue.start_next().is_none());
        assert_eq!(queue.queued(), 1);

        assert!(queue.resolve(Ok("dbstats {}".into())));
        assert_eq!(
            assert_ready!(first_reply.poll()).unwrap(),
            "dbstats {}"
        );
        assert_pending!(second_reply.poll());

        assert_eq!(
            queue.start_next().unwrap().as_ref(),
            b"get vn basic (id = 1)\x04"
        );
        assert!(queue.resolve(Ok("results {}".into())));
        assert_eq!(
            assert_ready!(second_reply.poll()).unwrap(),
            "results {}"
        );
        assert!(queue.is_drained());
    }

    #[test]
    fn test_resolve_without_in_flight() {
        let mut queue = RequestQueue::new();
        assert!(!queue.resolve(Ok("ok".into())));
        assert!(queue.start_next().is_none());
    }

    #[test]
    fn test_reject_queued_leaves_in_flight() {
        let mut queue = RequestQueue::new();
        let (first, first_reply) = request("dbstats");
        let (second, second_reply) = request("dbstats");
        queue.push(first);
        queue.push(second);
        queue.start_next();

        let mut first_reply = task::spawn(first_reply);
        let mut second_reply = task::spawn(second_reply);

        assert_eq!(queue.reject_queued(|| ClientError::ConnectionClosed), 1);
        assert!(matches!(
            assert_ready!(second_reply.poll()),
            Err(ClientError::ConnectionClosed)
        ));
        assert_pending!(first_reply.poll());
        assert!(!queue.is_idle());

        queue.resolve(Err(ClientError::ConnectionClosed));
        assert!(assert_ready!(first_reply.poll()).is_err());
    }

    #[test]
    fn test_dropped_queue_closes_replies() {
        let (request, reply) = request("dbstats");
        let mut queue = RequestQueue::new();
        queue.push(request);
        drop(queue);

        let mut reply = task::spawn(reply);
        assert!(matches!(
            assert_ready!(reply.poll()),
            Err(ClientError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_dropped_reply_still_frees_wire() {
        let mut queue = RequestQueue::new();
        let (request, reply) = request("dbstats");
        queue.push(request);
        drop(reply);

        queue.start_next();
        assert!(queue.resolve(Ok("dbstats {}".into())));
        assert!(queue.is_drained());
    }

    #[test]
    fn test_command_name() {
        let (request, _reply) = request(r#"login {"password":"secret"}"#);
        assert_eq!(request.command_name(), "login");
    }
}
