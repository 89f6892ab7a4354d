//! The runner lifecycle: a [`ServiceMap`] driven through create → update-loop → destroy,
//! plus the context object handed to every service's lifecycle method.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::dict::Dict;
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::event_bus::EventBus;
use crate::service::{Service, ServiceFactory, ServiceKind};
use crate::service_map::ServiceMap;
use crate::signal;
use crate::traverser;

/// What a service sees of its runner: the sibling service map and the event bus,
/// reached through delegation methods rather than raw references so a service's own
/// lifecycle call can safely borrow them while the caller holds the service itself out
/// of the map (see [`ServiceMap::take`]).
#[derive(Clone)]
pub struct RunnerContext {
    services: Arc<Mutex<ServiceMap>>,
    event_bus: Arc<Mutex<EventBus>>,
    /// Kind of the service currently being driven through this context, if any. Lets
    /// `invoke_event` tell "this subscriber is unresolvable because it's the service
    /// that's mid-call right now" apart from "this subscriber is genuinely gone".
    current: Option<ServiceKind>,
}

impl RunnerContext {
    fn new(services: Arc<Mutex<ServiceMap>>, event_bus: Arc<Mutex<EventBus>>) -> Self {
        Self {
            services,
            event_bus,
            current: None,
        }
    }

    /// A context identical to this one, but tagged as being handed to `kind` for the
    /// duration of one lifecycle call.
    #[must_use]
    fn for_service(&self, kind: ServiceKind) -> Self {
        Self {
            services: self.services.clone(),
            event_bus: self.event_bus.clone(),
            current: Some(kind),
        }
    }

    #[must_use]
    pub fn has_service(&self, kind: ServiceKind) -> bool {
        self.services.lock().expect("service map poisoned").has(kind)
    }

    /// Borrow a sibling service for the duration of `f`. Returns `None` if no such
    /// service is registered, or if it is the same kind currently being invoked (it has
    /// been taken out of the map for that call).
    pub fn with_service<R>(&self, kind: ServiceKind, f: impl FnOnce(&dyn Service) -> R) -> Option<R> {
        let map = self.services.lock().expect("service map poisoned");
        map.get(kind).map(f)
    }

    pub fn subscribe_event(&self, event: &str, kind: ServiceKind) -> EngineResult<()> {
        self.event_bus.lock().expect("event bus poisoned").subscribe(event, kind)
    }

    pub fn unsubscribe_event(&self, event: &str, kind: ServiceKind) -> EngineResult<()> {
        self.event_bus.lock().expect("event bus poisoned").unsubscribe(event, kind)
    }

    /// Synchronously invoke every subscriber of `event` with `data`, in subscription
    /// order. An event with no subscribers is an error. If some subscribers no longer
    /// resolve (their kind was removed, or — legitimately — it's the service currently
    /// mid-call through this very context) the invocation still runs every other
    /// subscriber; a subscriber that returned an error or failed to resolve is folded
    /// into a single aggregate `EngineError` naming every offending kind, except the
    /// currently-executing one, which is skipped rather than reported missing.
    pub fn invoke_event(&self, event: &str, data: &Dict) -> EngineResult<()> {
        let subscribers = self.event_bus.lock().expect("event bus poisoned").subscribers_of(event);
        if subscribers.is_empty() {
            return Err(EngineError::no_subscribers(event));
        }
        let subscriber_count = subscribers.len();

        let mut failures: Vec<(ServiceKind, EngineError)> = Vec::new();
        let mut missing: Vec<ServiceKind> = Vec::new();

        for kind in subscribers {
            let taken = self.services.lock().expect("service map poisoned").take(kind);
            let Some(mut service) = taken else {
                if self.current != Some(kind) {
                    missing.push(kind);
                }
                continue;
            };
            let mut child_ctx = self.for_service(kind);
            let result = service.on_event(&mut child_ctx, event, data);
            self.services.lock().expect("service map poisoned").put(service);
            if let Err(err) = result {
                failures.push((kind, err));
            }
        }

        if failures.is_empty() && missing.is_empty() {
            return Ok(());
        }

        let mut context = Dict::new();
        for (kind, err) in &failures {
            context.insert(kind.name, err.to_string());
        }
        for kind in &missing {
            context.insert(kind.name, "subscriber no longer resolves".to_string());
        }

        let (first_kind, first_description) = failures
            .first()
            .map(|(kind, err)| (*kind, err.to_string()))
            .unwrap_or_else(|| {
                let kind = missing[0];
                (kind, "subscriber no longer resolves".to_string())
            });

        Err(EngineError::new(
            ErrorKind::ConfigInvalid,
            format!(
                "{} of {subscriber_count} subscriber(s) of '{event}' failed, first: {first_kind}: {first_description}",
                failures.len() + missing.len(),
            ),
        )
        .with_code("EVENT_HANDLERS_FAILED")
        .with_context("event", event.to_string())
        .with_context("failures", crate::dict::Value::Dict(context)))
    }
}

/// Accumulates service factories before a [`Runner`] exists to host them.
#[derive(Default)]
pub struct RunnerBuilder {
    factories: Vec<ServiceFactory>,
}

impl RunnerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_service(mut self, factory: impl FnOnce() -> Box<dyn Service> + Send + 'static) -> Self {
        self.factories.push(Box::new(factory));
        self
    }

    /// Build a [`Runner`] meant to be driven directly on the calling thread (the main
    /// runner).
    pub fn build(self) -> EngineResult<Runner> {
        let mut map = ServiceMap::new();
        for factory in self.factories {
            map.add(factory())?;
        }
        let create_order = traverser::topological_order(&map)?;

        Ok(Runner {
            services: Arc::new(Mutex::new(map)),
            event_bus: Arc::new(Mutex::new(EventBus::new())),
            stop_requested: Arc::new(AtomicBool::new(false)),
            create_order,
        })
    }

    /// Build a [`Runner`] meant to be driven on a dedicated OS thread, returning a
    /// [`StopHandle`] the owning thread can use to ask the loop to exit.
    pub fn build_thread_runner(self) -> EngineResult<(ThreadRunner, StopHandle)> {
        let runner = self.build()?;
        let stop_handle = StopHandle(runner.stop_requested.clone());
        Ok((ThreadRunner::new(runner), stop_handle))
    }
}

/// One runner: a service map, an event bus, and the dependency order its services were
/// created in (and will be destroyed in, reversed).
pub struct Runner {
    services: Arc<Mutex<ServiceMap>>,
    event_bus: Arc<Mutex<EventBus>>,
    stop_requested: Arc<AtomicBool>,
    create_order: Vec<ServiceKind>,
}

impl Runner {
    fn context(&self) -> RunnerContext {
        RunnerContext::new(self.services.clone(), self.event_bus.clone())
    }

    /// Create every service, loop `OnUpdate` until interrupted or stopped, then destroy
    /// every service in reverse order. Destruction always runs, even if creation,
    /// the update loop, or the signal check failed first.
    pub fn run(&mut self) -> EngineResult<()> {
        let create_result = self.create_services();
        let run_result = create_result.and_then(|()| self.loop_until_stopped());
        self.destroy_services();
        run_result
    }

    fn create_services(&mut self) -> EngineResult<()> {
        for kind in self.create_order.clone() {
            let mut service = self
                .services
                .lock()
                .expect("service map poisoned")
                .take(kind)
                .expect("service present during create");
            let mut ctx = self.context().for_service(kind);
            let result = service.on_create(&mut ctx);
            self.services.lock().expect("service map poisoned").put(service);
            result?;
        }
        Ok(())
    }

    fn loop_until_stopped(&mut self) -> EngineResult<()> {
        loop {
            if self.stop_requested.load(Ordering::Acquire) {
                return Ok(());
            }
            if signal::is_interrupted() {
                return Err(EngineError::interrupted());
            }

            for kind in self.create_order.clone() {
                let taken = self.services.lock().expect("service map poisoned").take(kind);
                let Some(mut service) = taken else { continue };
                let mut ctx = self.context().for_service(kind);
                let result = service.on_update(&mut ctx);
                self.services.lock().expect("service map poisoned").put(service);
                result?;
            }
        }
    }

    fn destroy_services(&mut self) {
        for kind in self.create_order.clone().into_iter().rev() {
            let taken = self.services.lock().expect("service map poisoned").take(kind);
            if let Some(mut service) = taken {
                let mut ctx = self.context().for_service(kind);
                service.on_destroy(&mut ctx);
            }
        }
    }
}

/// A [`Runner`] driven on its own OS thread.
pub struct ThreadRunner {
    runner: Option<Runner>,
    handle: Option<JoinHandle<EngineResult<()>>>,
}

impl ThreadRunner {
    fn new(runner: Runner) -> Self {
        Self {
            runner: Some(runner),
            handle: None,
        }
    }

    pub fn start(&mut self) -> EngineResult<()> {
        if self.handle.is_some() {
            return Err(EngineError::from_kind(ErrorKind::ThreadAlreadyStarted));
        }
        let mut runner = self
            .runner
            .take()
            .ok_or_else(|| EngineError::from_kind(ErrorKind::ThreadAlreadyStarted))?;
        self.handle = Some(thread::spawn(move || runner.run()));
        Ok(())
    }

    /// Ask the runner to stop via `stop_handle` and join its thread, returning whatever
    /// `Runner::run` returned.
    pub fn stop(&mut self, stop_handle: &StopHandle) -> EngineResult<()> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| EngineError::from_kind(ErrorKind::ThreadNotStarted))?;
        stop_handle.request_stop();
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(EngineError::new(ErrorKind::OsError, "runner thread panicked")),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

/// A cloneable handle letting any thread request a [`ThreadRunner`]'s loop to exit.
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Release);
    }
}
