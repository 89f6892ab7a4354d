//! The process-wide mailbox registry and its dispatcher thread.
//!
//! Grounded on the teacher's long-running dispatcher pattern
//! (`ddd_domain::eventing::engine::EventEngine`, which spawns a worker draining a queue
//! and fanning out to registered handlers) and its registry-by-stable-name pattern
//! (`ddd_application::InMemoryCommandBus`, a map keyed by a stable identifier and
//! dispatched to at runtime), adapted from async tasks to a single OS thread: the
//! dispatcher never awaits, it polls every mailbox's outgoing channel once per pass and
//! sleeps briefly when a pass finds nothing to route.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use engine_core::{EngineError, EngineResult};

use crate::error::MailError;
use crate::mail::{validate_name, Mail, Target};
use crate::mailbox::MailBox;

/// How long the dispatcher sleeps after a pass that routed nothing, to avoid spinning.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

struct Office {
    from_peer: Receiver<Mail>,
    to_peer: Sender<Mail>,
}

struct Registry {
    offices: HashMap<String, Office>,
}

/// The process-wide singleton holding every mailbox and the thread that routes mail
/// between them.
pub struct MailCenter {
    registry: Arc<Mutex<Registry>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: Sender<()>,
    shutdown_rx: Mutex<Option<Receiver<()>>>,
}

static GLOBAL: OnceLock<MailCenter> = OnceLock::new();

impl MailCenter {
    /// Access the process-wide instance, creating and starting its dispatcher thread on
    /// first use.
    pub fn global() -> &'static MailCenter {
        GLOBAL.get_or_init(|| {
            let center = MailCenter::new();
            center.start_dispatcher();
            center
        })
    }

    fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        Self {
            registry: Arc::new(Mutex::new(Registry {
                offices: HashMap::new(),
            })),
            dispatcher: Mutex::new(None),
            shutdown_tx,
            shutdown_rx: Mutex::new(Some(shutdown_rx)),
        }
    }

    fn start_dispatcher(&self) {
        let Some(shutdown_rx) = self.shutdown_rx.lock().expect("poisoned").take() else {
            return;
        };
        let registry = self.registry.clone();
        let handle = thread::Builder::new()
            .name("mail-center-dispatcher".into())
            .spawn(move || dispatch_loop(&registry, &shutdown_rx))
            .expect("failed to spawn mail-center-dispatcher thread");
        *self.dispatcher.lock().expect("poisoned") = Some(handle);
    }

    /// Create a new mailbox. Fails if the name is invalid or already registered.
    pub fn create(&self, name: &str) -> EngineResult<MailBox> {
        validate_name(name).map_err(|msg| EngineError::from(MailError::NameInvalid(msg.to_string())))?;

        let mut registry = self.registry.lock().expect("poisoned");
        if registry.offices.contains_key(name) {
            return Err(EngineError::from(MailError::AlreadyExists(name.to_string())));
        }

        let (peer_tx, office_rx) = mpsc::channel::<Mail>();
        let (office_tx, peer_rx) = mpsc::channel::<Mail>();
        registry.offices.insert(
            name.to_string(),
            Office {
                from_peer: office_rx,
                to_peer: office_tx,
            },
        );

        Ok(MailBox::new(name.to_string(), peer_tx, peer_rx))
    }

    /// Remove a mailbox. Any mail already queued for it is dropped.
    pub fn delete(&self, name: &str) -> EngineResult<()> {
        let mut registry = self.registry.lock().expect("poisoned");
        registry
            .offices
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::from(MailError::NotFound(name.to_string())))
    }

    #[must_use]
    pub fn mailbox_count(&self) -> usize {
        self.registry.lock().expect("poisoned").offices.len()
    }

    /// Ask the dispatcher thread to stop and join it. Intended for orderly process
    /// shutdown and for tests that need a clean slate.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.dispatcher.lock().expect("poisoned").take() {
            let _ = handle.join();
        }
    }
}

fn dispatch_loop(registry: &Mutex<Registry>, shutdown_rx: &Receiver<()>) {
    loop {
        if shutdown_rx.try_recv().is_ok() {
            return;
        }

        let mut routed_any = false;
        {
            let reg = registry.lock().expect("poisoned");
            let names: Vec<String> = reg.offices.keys().cloned().collect();
            drop(reg);

            for name in names {
                loop {
                    let mail = {
                        let reg = registry.lock().expect("poisoned");
                        let Some(office) = reg.offices.get(&name) else {
                            break;
                        };
                        match office.from_peer.try_recv() {
                            Ok(mail) => mail,
                            Err(_) => break,
                        }
                    };
                    routed_any = true;
                    route(registry, &name, mail);
                }
            }
        }

        if !routed_any {
            thread::sleep(IDLE_SLEEP);
        }
    }
}

fn route(registry: &Mutex<Registry>, sender: &str, mail: Mail) {
    let reg = registry.lock().expect("poisoned");
    match &mail.to {
        Target::Unicast(to) => {
            if let Some(office) = reg.offices.get(to) {
                let _ = office.to_peer.send(mail);
            } else {
                tracing::warn!(to, from = sender, event = %mail.event, "dropping mail: no such mailbox");
            }
        }
        Target::Broadcast => {
            for (name, office) in &reg.offices {
                if name == sender {
                    continue;
                }
                let _ = office.to_peer.send(mail.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::Dict;
    use std::time::{Duration, Instant};

    fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_millis(500);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn create_rejects_duplicate_and_invalid_names() {
        let center = MailCenter::new();
        center.start_dispatcher();
        let _a = center.create("dup-test-a").unwrap();
        assert!(center.create("dup-test-a").is_err());
        assert!(center.create("").is_err());
        assert!(center.create("all").is_err());
        center.shutdown();
    }

    #[test]
    fn unicast_mail_is_delivered() {
        let center = MailCenter::new();
        center.start_dispatcher();
        let alice = center.create("alice-unicast").unwrap();
        let bob = center.create("bob-unicast").unwrap();

        alice
            .send(Mail::unicast("alice-unicast", "bob-unicast", "ping", Dict::new()))
            .unwrap();

        assert!(wait_for(|| bob.try_recv().is_some() || bob.drain().len() > 0));
        center.shutdown();
    }

    #[test]
    fn unicast_to_unknown_mailbox_is_dropped_not_fatal() {
        let center = MailCenter::new();
        center.start_dispatcher();
        let alice = center.create("alice-unknown").unwrap();
        alice
            .send(Mail::unicast("alice-unknown", "ghost", "ping", Dict::new()))
            .unwrap();
        thread::sleep(Duration::from_millis(20));
        center.shutdown();
    }

    #[test]
    fn broadcast_reaches_everyone_but_sender() {
        let center = MailCenter::new();
        center.start_dispatcher();
        let a = center.create("bc-a").unwrap();
        let b = center.create("bc-b").unwrap();
        let c = center.create("bc-c").unwrap();

        a.send(Mail::broadcast("bc-a", "shutdown", Dict::new())).unwrap();

        assert!(wait_for(|| !b.drain().is_empty()));
        assert!(wait_for(|| !c.drain().is_empty()));
        assert!(a.try_recv().is_none());
        center.shutdown();
    }

    #[test]
    fn delete_then_create_allows_reuse_of_name() {
        let center = MailCenter::new();
        center.start_dispatcher();
        let _mb = center.create("reusable").unwrap();
        center.delete("reusable").unwrap();
        assert!(center.create("reusable").is_ok());
        center.shutdown();
    }

    #[test]
    fn delete_unknown_mailbox_errors() {
        let center = MailCenter::new();
        center.start_dispatcher();
        assert!(center.delete("never-created").is_err());
        center.shutdown();
    }
}
