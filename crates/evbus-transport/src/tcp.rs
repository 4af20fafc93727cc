//! TCP implementation of the publish-mode socket.
//!
//! Each bound socket runs one accept task, and each accepted subscriber gets
//! its own writer task fed by a bounded queue. Every message is written as a
//! 4-byte big-endian length followed by the message bytes. `send` never waits
//! on a subscriber: one whose queue is full is disconnected, and one whose
//! writes fail is dropped.

use crate::{Endpoint, PubContext, PubSocket, TransportError};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::{JoinError, JoinHandle};

/// Backoff after a failed accept (e.g. file descriptor exhaustion).
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Messages queued per subscriber before it is disconnected.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Time `close` gives each subscriber to drain its queue.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct ContextShared {
    open_sockets: AtomicUsize,
    terminated: AtomicBool,
    queue_capacity: usize,
}

/// Context for TCP publish sockets.
#[derive(Debug)]
pub struct TcpContext {
    shared: Arc<ContextShared>,
}

impl TcpContext {
    /// Create a new context with the default per-subscriber queue capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a new context whose sockets queue at most `capacity` messages
    /// per subscriber (minimum 1).
    #[must_use]
    pub fn with_queue_capacity(capacity: usize) -> Self {
        Self {
            shared: Arc::new(ContextShared {
                open_sockets: AtomicUsize::new(0),
                terminated: AtomicBool::new(false),
                queue_capacity: capacity.max(1),
            }),
        }
    }

    /// Number of sockets created from this context and not yet closed.
    #[must_use]
    pub fn open_sockets(&self) -> usize {
        self.shared.open_sockets.load(Ordering::SeqCst)
    }
}

impl Default for TcpContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubContext for TcpContext {
    type Socket = TcpPubSocket;

    fn socket(&self) -> Result<TcpPubSocket, TransportError> {
        if self.shared.terminated.load(Ordering::SeqCst) {
            return Err(TransportError::Terminated);
        }
        self.shared.open_sockets.fetch_add(1, Ordering::SeqCst);
        Ok(TcpPubSocket {
            context: Arc::clone(&self.shared),
            state: SocketState::Idle,
            subscribers: Vec::new(),
        })
    }

    async fn terminate(&mut self) -> Result<(), TransportError> {
        let open = self.open_sockets();
        if open > 0 {
            return Err(TransportError::SocketsOpen(open));
        }
        self.shared.terminated.store(true, Ordering::SeqCst);
        tracing::debug!("TCP context terminated");
        Ok(())
    }
}

struct Subscriber {
    peer: SocketAddr,
    queue: mpsc::Sender<Arc<[u8]>>,
    writer: JoinHandle<()>,
}

impl Subscriber {
    fn spawn(stream: TcpStream, peer: SocketAddr, capacity: usize) -> Self {
        let (queue, messages) = mpsc::channel(capacity);
        let writer = tokio::spawn(write_loop(stream, peer, messages));
        Self {
            peer,
            queue,
            writer,
        }
    }
}

enum SocketState {
    Idle,
    Bound {
        local_addr: SocketAddr,
        accept_task: JoinHandle<()>,
        incoming: mpsc::UnboundedReceiver<Subscriber>,
    },
    Closed,
}

/// TCP publish socket.
pub struct TcpPubSocket {
    context: Arc<ContextShared>,
    state: SocketState,
    subscribers: Vec<Subscriber>,
}

impl TcpPubSocket {
    /// Address the socket is listening on, once bound.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.state {
            SocketState::Bound { local_addr, .. } => Some(*local_addr),
            SocketState::Idle | SocketState::Closed => None,
        }
    }

    /// Number of connected subscribers, including ones accepted since the
    /// last send.
    pub fn subscriber_count(&mut self) -> usize {
        self.collect_incoming();
        self.subscribers.len()
    }

    fn collect_incoming(&mut self) {
        if let SocketState::Bound { incoming, .. } = &mut self.state {
            while let Ok(subscriber) = incoming.try_recv() {
                self.subscribers.push(subscriber);
            }
        }
    }
}

#[async_trait]
impl PubSocket for TcpPubSocket {
    async fn bind(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        match self.state {
            SocketState::Idle => {}
            SocketState::Bound { .. } => return Err(TransportError::AlreadyBound),
            SocketState::Closed => return Err(TransportError::Closed),
        }

        let listener = TcpListener::bind(endpoint.bind_address())
            .await
            .map_err(|e| TransportError::Bind(format!("{endpoint}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::Bind(format!("{endpoint}: {e}")))?;

        let (tx, incoming) = mpsc::unbounded_channel();
        let accept_task = tokio::spawn(accept_loop(listener, tx, self.context.queue_capacity));

        tracing::info!(%endpoint, %local_addr, "Publish socket bound");

        self.state = SocketState::Bound {
            local_addr,
            accept_task,
            incoming,
        };
        Ok(())
    }

    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        match self.state {
            SocketState::Bound { .. } => {}
            SocketState::Idle => return Err(TransportError::NotBound),
            SocketState::Closed => return Err(TransportError::Closed),
        }
        self.collect_incoming();

        let len =
            u32::try_from(frame.len()).map_err(|_| TransportError::FrameTooLarge(frame.len()))?;
        let mut message = Vec::with_capacity(4 + frame.len());
        message.extend_from_slice(&len.to_be_bytes());
        message.extend_from_slice(frame);
        let message: Arc<[u8]> = message.into();

        self.subscribers
            .retain(|subscriber| match subscriber.queue.try_send(Arc::clone(&message)) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(peer = %subscriber.peer, "Disconnecting slow subscriber");
                    subscriber.writer.abort();
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(peer = %subscriber.peer, "Dropping disconnected subscriber");
                    false
                }
            });

        tracing::trace!(
            frame_len = frame.len(),
            subscribers = self.subscribers.len(),
            "Frame queued"
        );
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match std::mem::replace(&mut self.state, SocketState::Closed) {
            SocketState::Closed => return Err(TransportError::Closed),
            SocketState::Bound { accept_task, .. } => {
                accept_task.abort();
                // Wait for the task to drop the listener so the port is free.
                report_task_failure("accept", accept_task.await);
            }
            SocketState::Idle => {}
        }

        for Subscriber {
            peer,
            queue,
            mut writer,
        } in std::mem::take(&mut self.subscribers)
        {
            drop(queue);
            match tokio::time::timeout(FLUSH_TIMEOUT, &mut writer).await {
                Ok(result) => {
                    report_task_failure("subscriber writer", result);
                }
                Err(_) => {
                    tracing::debug!(%peer, "Subscriber did not drain before close");
                    writer.abort();
                }
            }
        }

        self.context.open_sockets.fetch_sub(1, Ordering::SeqCst);
        tracing::info!("Publish socket closed");
        Ok(())
    }

    fn local_port(&self) -> Option<u16> {
        self.local_addr().map(|addr| addr.port())
    }
}

impl Drop for TcpPubSocket {
    fn drop(&mut self) {
        for subscriber in &self.subscribers {
            subscriber.writer.abort();
        }
        match &self.state {
            SocketState::Closed => return,
            SocketState::Bound { accept_task, .. } => accept_task.abort(),
            SocketState::Idle => {}
        }
        self.context.open_sockets.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Log a task that ended other than by cancellation. Returns whether it did.
fn report_task_failure(task: &'static str, result: Result<(), JoinError>) -> bool {
    match result {
        Err(e) if !e.is_cancelled() => {
            tracing::error!(task, error = %e, "Task failed");
            true
        }
        _ => false,
    }
}

async fn accept_loop(
    listener: TcpListener,
    tx: mpsc::UnboundedSender<Subscriber>,
    queue_capacity: usize,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
                }
                tracing::debug!(%peer, "Subscriber connected");
                if tx
                    .send(Subscriber::spawn(stream, peer, queue_capacity))
                    .is_err()
                {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

async fn write_loop(
    mut stream: TcpStream,
    peer: SocketAddr,
    mut messages: mpsc::Receiver<Arc<[u8]>>,
) {
    while let Some(message) = messages.recv().await {
        if let Err(e) = stream.write_all(&message).await {
            tracing::debug!(%peer, error = %e, "Subscriber write failed");
            return;
        }
    }
    if let Err(e) = stream.shutdown().await {
        tracing::debug!(%peer, error = %e, "Subscriber shutdown failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::time::{sleep, timeout};
    use tokio_test::assert_ok;

    fn loopback() -> Endpoint {
        Endpoint::new("127.0.0.1", 0)
    }

    async fn connect(socket: &mut TcpPubSocket) -> TcpStream {
        let addr = socket.local_addr().unwrap();
        let expected = socket.subscriber_count() + 1;
        let stream = TcpStream::connect(addr).await.unwrap();
        timeout(Duration::from_secs(5), async {
            while socket.subscriber_count() < expected {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("subscriber was not accepted");
        stream
    }

    async fn read_message(stream: &mut TcpStream) -> Vec<u8> {
        let mut len = [0u8; 4];
        stream.read_exact(&mut len).await.unwrap();
        let mut frame = vec![0u8; u32::from_be_bytes(len) as usize];
        stream.read_exact(&mut frame).await.unwrap();
        frame
    }

    #[tokio::test]
    async fn subscribers_receive_frames_in_order() {
        let context = TcpContext::new();
        let mut socket = context.socket().unwrap();
        socket.bind(&loopback()).await.unwrap();

        let mut first = connect(&mut socket).await;
        let mut second = connect(&mut socket).await;

        socket.send(b"one").await.unwrap();
        socket.send(b"").await.unwrap();
        socket.send(b"three\x00").await.unwrap();

        for stream in [&mut first, &mut second] {
            assert_eq!(read_message(stream).await, b"one");
            assert_eq!(read_message(stream).await, b"");
            assert_eq!(read_message(stream).await, b"three\x00");
        }

        socket.close().await.unwrap();
    }

    #[tokio::test]
    async fn send_without_subscribers_is_dropped() {
        let context = TcpContext::new();
        let mut socket = context.socket().unwrap();
        socket.bind(&loopback()).await.unwrap();

        assert_ok!(socket.send(b"nobody listens").await);
        assert_eq!(socket.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn disconnected_subscriber_is_dropped() {
        let context = TcpContext::new();
        let mut socket = context.socket().unwrap();
        socket.bind(&loopback()).await.unwrap();

        let stream = connect(&mut socket).await;
        drop(stream);

        // The first write after a peer reset may still succeed locally.
        timeout(Duration::from_secs(5), async {
            while socket.subscriber_count() > 0 {
                socket.send(&[0u8; 1024]).await.unwrap();
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("subscriber was not dropped");
    }

    #[tokio::test]
    async fn stalled_subscriber_does_not_block_others() {
        let context = TcpContext::with_queue_capacity(4);
        let mut socket = context.socket().unwrap();
        socket.bind(&loopback()).await.unwrap();

        let _stalled = connect(&mut socket).await;
        let mut healthy = connect(&mut socket).await;
        let frame = vec![0xA5u8; 256 * 1024];

        // The stalled peer never reads; once the kernel buffers and its queue
        // fill up it is disconnected while the healthy peer keeps receiving.
        timeout(Duration::from_secs(30), async {
            for _ in 0..1000 {
                socket.send(&frame).await.unwrap();
                assert_eq!(read_message(&mut healthy).await, frame);
                if socket.subscriber_count() == 1 {
                    return;
                }
            }
            panic!("stalled subscriber was never disconnected");
        })
        .await
        .expect("send blocked on a stalled subscriber");

        socket.send(b"after").await.unwrap();
        assert_eq!(read_message(&mut healthy).await, b"after");

        socket.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_flushes_queued_frames() {
        let context = TcpContext::new();
        let mut socket = context.socket().unwrap();
        socket.bind(&loopback()).await.unwrap();
        let mut stream = connect(&mut socket).await;

        for i in 0..10u8 {
            socket.send(&[i]).await.unwrap();
        }
        socket.close().await.unwrap();

        for i in 0..10u8 {
            assert_eq!(read_message(&mut stream).await, [i]);
        }
        let mut rest = Vec::new();
        assert_eq!(stream.read_to_end(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn task_failures_are_reported_unless_cancelled() {
        let panicked: JoinHandle<()> = tokio::spawn(async { panic!("accept loop crashed") });
        assert!(report_task_failure("accept", panicked.await));

        let cancelled = tokio::spawn(std::future::pending::<()>());
        cancelled.abort();
        assert!(!report_task_failure("accept", cancelled.await));

        let finished = tokio::spawn(async {});
        assert!(!report_task_failure("accept", finished.await));
    }

    #[tokio::test]
    async fn bind_conflict_fails() {
        let context = TcpContext::new();
        let mut first = context.socket().unwrap();
        first.bind(&loopback()).await.unwrap();
        let port = first.local_addr().unwrap().port();

        let mut second = context.socket().unwrap();
        let result = second.bind(&Endpoint::new("127.0.0.1", port)).await;

        assert!(matches!(result, Err(TransportError::Bind(_))));
    }

    #[tokio::test]
    async fn send_requires_bind() {
        let context = TcpContext::new();
        let mut socket = context.socket().unwrap();

        assert!(matches!(
            socket.send(b"x").await,
            Err(TransportError::NotBound)
        ));
    }

    #[tokio::test]
    async fn closed_socket_rejects_use() {
        let context = TcpContext::new();
        let mut socket = context.socket().unwrap();
        socket.bind(&loopback()).await.unwrap();
        socket.close().await.unwrap();

        assert!(matches!(socket.send(b"x").await, Err(TransportError::Closed)));
        assert!(matches!(socket.close().await, Err(TransportError::Closed)));
        assert!(socket.local_addr().is_none());
    }

    #[tokio::test]
    async fn terminate_requires_closed_sockets() {
        let mut context = TcpContext::new();
        let mut socket = context.socket().unwrap();
        assert_eq!(context.open_sockets(), 1);

        assert!(matches!(
            context.terminate().await,
            Err(TransportError::SocketsOpen(1))
        ));

        socket.close().await.unwrap();
        assert_ok!(context.terminate().await);
        assert!(matches!(context.socket(), Err(TransportError::Terminated)));
    }

    #[tokio::test]
    async fn dropped_socket_releases_context() {
        let mut context = TcpContext::new();
        let mut socket = context.socket().unwrap();
        socket.bind(&loopback()).await.unwrap();
        drop(socket);

        assert_eq!(context.open_sockets(), 0);
        assert_ok!(context.terminate().await);
    }
}
