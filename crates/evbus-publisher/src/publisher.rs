//! Typed publisher for one event type.

use crate::PublisherError;
use evbus_proto::{encode_frame, Event, EventName, EventVersion, Marshal, TopicPrefix};
use evbus_registry::{PublisherEntry, Registration, Registry};
use evbus_transport::{Endpoint, PubContext, PubSocket, TcpContext};
use std::fmt;
use std::marker::PhantomData;
use std::net::SocketAddr;

/// Teardown progress of a publisher.
///
/// Each state is reached only after the step leading to it succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Bound and registered
    Active,
    /// Registry entry removed, socket still open
    Unregistered,
    /// Socket closed, context still alive
    SocketClosed,
    /// Fully torn down
    Terminated,
}

/// Publisher of events of one `(name, version)` type.
///
/// Owns one bound socket and one registry registration from a successful
/// [`create`](Self::create) until a successful [`stop`](Self::stop).
pub struct Publisher<P, C: PubContext = TcpContext> {
    topic_prefix: TopicPrefix,
    endpoint: Endpoint,
    registration: Box<dyn Registration>,
    socket: C::Socket,
    context: C,
    state: Lifecycle,
    _payload: PhantomData<fn(&P)>,
}

impl<P: Marshal, C: PubContext> Publisher<P, C> {
    /// Bind a socket from `context` to `endpoint` and register the publisher.
    ///
    /// Any step that fails releases what earlier steps acquired: a failed
    /// bind never reaches the registry, a failed registration closes the
    /// socket before returning.
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint host is a wildcard address (it is also
    /// the host advertised to subscribers), if the socket cannot be created or
    /// bound, or if the registry rejects the publisher.
    pub async fn create(
        mut context: C,
        endpoint: Endpoint,
        event_name: EventName,
        event_version: EventVersion,
        registry: &dyn Registry,
    ) -> Result<Self, PublisherError> {
        if endpoint.is_wildcard() {
            if let Err(e) = context.terminate().await {
                tracing::warn!(error = %e, "Failed to terminate context after endpoint error");
            }
            return Err(PublisherError::WildcardHost(endpoint));
        }

        let mut socket = match context.socket() {
            Ok(socket) => socket,
            Err(e) => {
                if let Err(err) = context.terminate().await {
                    tracing::warn!(error = %err, "Failed to terminate context after socket error");
                }
                return Err(PublisherError::SocketCreate(e));
            }
        };

        if let Err(source) = socket.bind(&endpoint).await {
            release(&mut socket, &mut context).await;
            return Err(PublisherError::Bind { endpoint, source });
        }

        let topic_prefix = TopicPrefix::new(&event_name, event_version);

        let port = socket.local_port().unwrap_or(endpoint.port);
        let entry = PublisherEntry::new(event_name, event_version, endpoint.host.clone(), port);

        let registration = match registry.register(&entry).await {
            Ok(registration) => registration,
            Err(e) => {
                release(&mut socket, &mut context).await;
                return Err(PublisherError::Registration(e));
            }
        };

        tracing::info!(
            %entry,
            registration_id = %registration.id(),
            topic_prefix = %topic_prefix,
            "Publisher started"
        );

        Ok(Self {
            topic_prefix,
            endpoint,
            registration,
            socket,
            context,
            state: Lifecycle::Active,
            _payload: PhantomData,
        })
    }

    /// Send each event as its own frame, in order.
    ///
    /// Not atomic: when event `i` fails, events before it have already been
    /// sent and events after it are not attempted.
    ///
    /// # Errors
    ///
    /// Returns error carrying the failing event's index if its payload cannot
    /// be encoded or its frame cannot be sent, or if the publisher is stopped.
    pub async fn publish(&mut self, events: &[Event<P>]) -> Result<(), PublisherError> {
        if self.state != Lifecycle::Active {
            return Err(PublisherError::Stopped(self.state));
        }

        for (index, event) in events.iter().enumerate() {
            let frame = encode_frame(&self.topic_prefix, event)
                .map_err(|source| PublisherError::PayloadEncoding { index, source })?;

            self.socket
                .send(&frame)
                .await
                .map_err(|source| PublisherError::Send { index, source })?;
        }

        tracing::debug!(
            topic_prefix = %self.topic_prefix,
            events = events.len(),
            "Published batch"
        );
        Ok(())
    }
}

impl<P, C: PubContext> Publisher<P, C> {
    /// Unregister, close the socket, then terminate the context.
    ///
    /// A failed step leaves every later resource untouched; calling `stop`
    /// again resumes from the failed step. Stopping a terminated publisher
    /// does nothing.
    ///
    /// # Errors
    ///
    /// Returns error naming the teardown step that failed.
    pub async fn stop(&mut self) -> Result<(), PublisherError> {
        if self.state == Lifecycle::Active {
            self.registration
                .unregister()
                .await
                .map_err(PublisherError::Unregistration)?;
            self.state = Lifecycle::Unregistered;
        }

        if self.state == Lifecycle::Unregistered {
            self.socket
                .close()
                .await
                .map_err(PublisherError::SocketClose)?;
            self.state = Lifecycle::SocketClosed;
        }

        if self.state == Lifecycle::SocketClosed {
            self.context
                .terminate()
                .await
                .map_err(PublisherError::ContextTermination)?;
            self.state = Lifecycle::Terminated;

            tracing::info!(topic_prefix = %self.topic_prefix, "Publisher stopped");
        }

        Ok(())
    }

    /// Current teardown state.
    #[must_use]
    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// Topic prefix shared by every frame of this publisher.
    #[must_use]
    pub fn topic_prefix(&self) -> &TopicPrefix {
        &self.topic_prefix
    }

    /// Endpoint the socket was bound to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl<P: Marshal> Publisher<P, TcpContext> {
    /// Create a publisher over a fresh TCP context.
    ///
    /// # Errors
    ///
    /// See [`create`](Self::create).
    pub async fn bind(
        endpoint: Endpoint,
        event_name: EventName,
        event_version: EventVersion,
        registry: &dyn Registry,
    ) -> Result<Self, PublisherError> {
        Self::create(
            TcpContext::new(),
            endpoint,
            event_name,
            event_version,
            registry,
        )
        .await
    }
}

impl<P> Publisher<P, TcpContext> {
    /// Address the TCP socket is listening on.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr()
    }

    /// Number of connected subscribers.
    pub fn subscriber_count(&mut self) -> usize {
        self.socket.subscriber_count()
    }
}

impl<P, C: PubContext> fmt::Debug for Publisher<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("topic_prefix", &self.topic_prefix.to_string())
            .field("endpoint", &self.endpoint)
            .field("registration_id", &self.registration.id())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<P, C: PubContext> Drop for Publisher<P, C> {
    fn drop(&mut self) {
        if self.state != Lifecycle::Terminated {
            tracing::warn!(
                topic_prefix = %self.topic_prefix,
                state = ?self.state,
                "Publisher dropped without a completed stop"
            );
        }
    }
}

async fn release<C: PubContext>(socket: &mut C::Socket, context: &mut C) {
    if let Err(e) = socket.close().await {
        tracing::warn!(error = %e, "Failed to close socket during rollback");
    }
    if let Err(e) = context.terminate().await {
        tracing::warn!(error = %e, "Failed to terminate context during rollback");
    }
}
