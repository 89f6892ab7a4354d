//! The peer-side handle to one mailbox: a pair of single-producer, single-consumer
//! channels to and from [`crate::mail_center::MailCenter`]'s dispatcher.

use std::sync::mpsc::{Receiver, Sender};
use std::sync::Mutex;

use engine_core::{EngineError, EngineResult};

use crate::error::MailError;
use crate::mail::Mail;

/// Handle held by whichever [`crate::actor_service::ActorService`] created it. Sending
/// never blocks (the underlying channel is unbounded); receiving is always non-blocking
/// (`try_recv`), matching the runner's cooperative, never-await loop.
pub struct MailBox {
    name: String,
    to_center: Sender<Mail>,
    from_center: Mutex<Receiver<Mail>>,
}

impl MailBox {
    pub(crate) fn new(name: String, to_center: Sender<Mail>, from_center: Receiver<Mail>) -> Self {
        Self {
            name,
            to_center,
            from_center: Mutex::new(from_center),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn send(&self, mail: Mail) -> EngineResult<()> {
        self.to_center
            .send(mail)
            .map_err(|_| EngineError::from(MailError::Disconnected(self.name.clone())))
    }

    /// Pop the next piece of routed mail, if any, without blocking.
    #[must_use]
    pub fn try_recv(&self) -> Option<Mail> {
        self.from_center.lock().expect("poisoned").try_recv().ok()
    }

    /// Drain every piece of mail currently waiting without blocking.
    pub fn drain(&self) -> Vec<Mail> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
