//! Request correlation and one-shot response mappers.
//!
//! A session registers a [`ResponseMapper`] for a request id before writing
//! the request to the engine. When the terminal reply for that id arrives the
//! entry is removed, and if the reply is a `response` the mapper rewrites it
//! before it is relayed. Continuing replies never touch the table.
//!
//! The mapper is taken out of the table by [`Correlator::settle`] and awaited
//! afterwards through [`Settled::resolve`], so a long-running mapper (for
//! example packaging a converted world) never holds the table lock.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::protocol::message::{Frame, Reply, ReplyKind};

/// Asynchronous one-shot post-processor for a terminal `response` reply.
pub struct ResponseMapper(Box<dyn FnOnce(Reply) -> BoxFuture<'static, Reply> + Send>);

impl ResponseMapper {
    /// Wrap an async closure as a mapper.
    pub fn new<F, Fut>(map: F) -> Self
    where
        F: FnOnce(Reply) -> Fut + Send + 'static,
        Fut: Future<Output = Reply> + Send + 'static,
    {
        Self(Box::new(move |reply| Box::pin(map(reply))))
    }

    /// Run the mapper, consuming it.
    pub async fn apply(self, reply: Reply) -> Reply {
        (self.0)(reply).await
    }
}

impl fmt::Debug for ResponseMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseMapper")
    }
}

/// Outcome of settling one frame against the mapper table.
#[derive(Debug)]
pub enum Settled {
    /// Relay the reply unchanged.
    Relay(Reply),
    /// Apply the mapper to the reply, then relay its result.
    Map(Reply, ResponseMapper),
}

impl Settled {
    /// Produce the reply to relay, awaiting the mapper if there is one.
    pub async fn resolve(self) -> Reply {
        match self {
            Self::Relay(reply) => reply,
            Self::Map(reply, mapper) => mapper.apply(reply).await,
        }
    }
}

/// Per-session table of outstanding response mappers keyed by request id.
#[derive(Debug, Default)]
pub struct Correlator {
    mappers: HashMap<String, ResponseMapper>,
}

impl Correlator {
    /// Create an empty correlator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `mapper` for `request_id`, replacing any earlier mapper for
    /// the same id.
    pub fn register(&mut self, request_id: &str, mapper: ResponseMapper) {
        if self
            .mappers
            .insert(request_id.to_owned(), mapper)
            .is_some()
        {
            debug!(request_id, "correlator: replaced outstanding mapper");
        }
    }

    /// Number of outstanding mappers.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.mappers.len()
    }

    /// Whether a mapper is outstanding for `request_id`.
    #[must_use]
    pub fn is_pending(&self, request_id: &str) -> bool {
        self.mappers.contains_key(request_id)
    }

    /// Settle `frame` against the table.
    ///
    /// Continuing frames pass through untouched. A terminal frame always
    /// removes the entry for its request id; the mapper is only returned
    /// for application when the reply is a `response`.
    pub fn settle(&mut self, frame: Frame) -> Settled {
        let reply = match frame {
            Frame::Continuing(reply) => return Settled::Relay(reply),
            Frame::Terminal(reply) => reply,
        };

        let mapper = reply
            .request_id()
            .and_then(|request_id| self.mappers.remove(request_id));

        match mapper {
            Some(mapper) if reply.kind == ReplyKind::Response => Settled::Map(reply, mapper),
            Some(_) => {
                debug!(
                    request_id = reply.request_id().unwrap_or_default(),
                    kind = reply.kind.as_str(),
                    "correlator: dropped mapper for non-response terminal reply"
                );
                Settled::Relay(reply)
            }
            None => Settled::Relay(reply),
        }
    }

    /// Settle `frame` and resolve it in one step.
    pub async fn on_message(&mut self, frame: Frame) -> Reply {
        self.settle(frame).resolve().await
    }

    /// Drop every outstanding mapper, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let count = self.mappers.len();
        self.mappers.clear();
        count
    }
}
