//! Request/response channels between contexts.
//!
//! Each context owns an [`Inbox`] and hands out cloneable [`Mailbox`] handles.
//! A request carries a one-shot reply slot; a closed inbox means the target
//! context is gone, a dropped reply slot means it died mid-request.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use super::messages::{Envelope, Request, Response, Sender};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Extension context invalidated")]
    ContextInvalidated,
    #[error("Receiving end dropped the request without responding")]
    NoResponse,
    #[error("No response within {0:?}")]
    Timeout(Duration),
}

/// A request waiting in an inbox together with its reply slot
#[derive(Debug)]
pub struct Incoming<Req, Resp> {
    pub request: Req,
    reply: oneshot::Sender<Resp>,
}

impl<Req, Resp> Incoming<Req, Resp> {
    /// Returns false when the requester stopped waiting.
    pub fn respond(self, response: Resp) -> bool {
        self.reply.send(response).is_ok()
    }

    pub fn into_parts(self) -> (Req, Responder<Resp>) {
        (self.request, Responder(self.reply))
    }
}

/// Reply slot detached from its request
#[derive(Debug)]
pub struct Responder<Resp>(oneshot::Sender<Resp>);

impl<Resp> Responder<Resp> {
    pub fn respond(self, response: Resp) -> bool {
        self.0.send(response).is_ok()
    }
}

pub type Inbox<Req, Resp> = mpsc::Receiver<Incoming<Req, Resp>>;

#[derive(Debug)]
pub struct Mailbox<Req, Resp> {
    tx: mpsc::Sender<Incoming<Req, Resp>>,
}

impl<Req, Resp> Clone for Mailbox<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

pub fn mailbox<Req, Resp>(capacity: usize) -> (Mailbox<Req, Resp>, Inbox<Req, Resp>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Mailbox { tx }, rx)
}

impl<Req, Resp> Mailbox<Req, Resp> {
    pub async fn request(&self, request: Req) -> Result<Resp, ChannelError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Incoming { request, reply })
            .await
            .map_err(|_| ChannelError::ContextInvalidated)?;
        response.await.map_err(|_| ChannelError::NoResponse)
    }

    pub async fn request_timeout(&self, request: Req, limit: Duration) -> Result<Resp, ChannelError> {
        match tokio::time::timeout(limit, self.request(request)).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout(limit)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A context's connection to the coordinator. Stamps every request with the
/// context's identity.
#[derive(Debug, Clone)]
pub struct ContextLink {
    mailbox: Mailbox<Envelope, Response>,
    sender: Sender,
}

impl ContextLink {
    pub fn new(mailbox: Mailbox<Envelope, Response>, sender: Sender) -> Self {
        Self { mailbox, sender }
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    pub async fn send(&self, request: Request) -> Result<Response, ChannelError> {
        self.mailbox
            .request(Envelope::new(self.sender, request))
            .await
    }
}
