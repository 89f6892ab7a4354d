//! `ActorService`: the per-runner service that turns a [`MailBox`] into local events.
//!
//! Every runner that wants to send or receive cross-runner mail registers one. On each
//! `OnUpdate` it drains its mailbox and re-publishes every piece of mail on the runner's
//! own event bus under the mail's event name, with the mail's `from`/`data` folded into
//! the published `Dict` — so a service never has to know whether an event originated
//! locally or arrived from another runner.

use engine_core::{kind, Dict, EngineResult, RunnerContext, Service, ServiceKind};

use crate::mail::Mail;
use crate::mail_center::MailCenter;
use crate::mailbox::MailBox;

pub struct ActorService {
    mailbox: MailBox,
}

impl ActorService {
    /// Register a mailbox named `name` with the process-wide [`MailCenter`] and wrap it
    /// in a service ready to be added to a runner.
    pub fn new(name: &str) -> EngineResult<Self> {
        let mailbox = MailCenter::global().create(name)?;
        Ok(Self { mailbox })
    }

    #[must_use]
    pub fn mailbox_name(&self) -> &str {
        self.mailbox.name()
    }

    pub fn send_mail(&self, to: &str, event: &str, data: Dict) -> EngineResult<()> {
        self.mailbox
            .send(Mail::unicast(self.mailbox.name(), to, event, data))
    }

    pub fn broadcast(&self, event: &str, data: Dict) -> EngineResult<()> {
        self.mailbox.send(Mail::broadcast(self.mailbox.name(), event, data))
    }
}

impl ActorService {
    /// Drain the mailbox, republishing each piece of mail as a local event. Called by
    /// [`ActorAdapter::on_update`]; exposed directly so a sibling service holding the same
    /// `Arc<ActorService>` never needs to go through the service map to drive it.
    pub fn pump(&self, ctx: &mut RunnerContext) -> EngineResult<()> {
        for mail in self.mailbox.drain() {
            let mut data = mail.data;
            data.insert("from", mail.from);
            ctx.invoke_event(&mail.event, &data)?;
        }
        Ok(())
    }

    fn teardown(&self) {
        let _ = MailCenter::global().delete(self.mailbox.name());
    }
}

/// Adapts a shared [`ActorService`] into an `engine_core::Service` so it can be added to a
/// runner's `ServiceMap` while other services (e.g. `engine_net::SocketRouterService`) keep
/// their own `Arc` clone to call `send_mail`/`broadcast` directly — the same wiring
/// `engine_io::reactor_service` uses for `IoEventLoopService`.
struct ActorAdapter(std::sync::Arc<ActorService>);

impl Service for ActorAdapter {
    fn kind(&self) -> ServiceKind {
        kind::ACTOR
    }

    fn on_update(&mut self, ctx: &mut RunnerContext) -> EngineResult<()> {
        self.0.pump(ctx)
    }

    fn on_destroy(&mut self, _ctx: &mut RunnerContext) {
        self.0.teardown();
    }
}

/// Build the `Service` that drives `actor`'s lifecycle on whichever runner it is added to.
#[must_use]
pub fn actor_service(actor: std::sync::Arc<ActorService>) -> Box<dyn Service> {
    Box::new(ActorAdapter(actor))
}
