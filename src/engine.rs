//! # State Engine
//!
//! Routes submitted events to the handler registered for their variant and
//! commits the states those handlers emit.
//!
//! ## Pipeline
//!
//! Each registration owns one pipeline task:
//!
//! 1. A subscription to the internal [`EventBus`], filtered to the variant
//! 2. The registration's [`ConcurrencyPolicy`], fed a finder that starts one
//!    handler invocation per event
//! 3. A commit loop that drops stale or repeated states, notifies
//!    `on_progression`, and applies the rest to the [`StateStore`]
//!
//! Pipeline tasks hold the store, the registry, and the handler, never the
//! engine itself, so dropping an engine without calling [`StateEngine::end`]
//! still lets every task wind down once the bus closes.
//!
//! ## Shutdown
//!
//! [`StateEngine::end`] closes the bus, cancels every live invocation, waits
//! for each to reach a terminal state, lets the pipelines drain, and finally ends
//! the store. Once it returns no emit can reach state subscribers.

use chrono::{DateTime, Utc};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::EngineConfig;
use crate::constants::operations;
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EngineState, EventBus};
use crate::execution::{
    Actioner, ConcurrencyPolicy, Controller, Emission, EventHandler, EventStream, Finder,
    InvocationRegistry, InvocationStream,
};
use crate::logging::log_engine_operation;
use crate::observer::{NoopObserver, ObserverHook};
use crate::state_machine::{Progression, StateStore};

/// Extension point run by [`StateEngine::submit`] before an event is dispatched
///
/// Returning an error rejects the event: it is logged, reported to the
/// observer's `on_failure`, and returned to the submitter as
/// [`EngineError::EventRejected`].
pub trait EventInterceptor<E>: Send + Sync + 'static {
    fn on_event(&self, event: &E) -> anyhow::Result<()>;
}

impl<E, F> EventInterceptor<E> for F
where
    F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn on_event(&self, event: &E) -> anyhow::Result<()> {
        (self)(event)
    }
}

/// Point-in-time view of an engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub registered_variants: usize,
    pub live_invocations: usize,
    pub state_subscribers: usize,
    pub transitions_committed: u64,
    pub ended: bool,
    pub captured_at: DateTime<Utc>,
}

/// Builder for engines that need more than [`StateEngine::new`] defaults
pub struct EngineBuilder<E: EngineEvent, S: EngineState> {
    initial: S,
    config: EngineConfig,
    observer: Arc<dyn ObserverHook<E, S>>,
    default_policy: Option<Arc<dyn ConcurrencyPolicy<E, S>>>,
    interceptor: Option<Arc<dyn EventInterceptor<E>>>,
}

impl<E: EngineEvent, S: EngineState> EngineBuilder<E, S> {
    pub fn new(initial: S) -> Self {
        Self {
            initial,
            config: EngineConfig::default(),
            observer: Arc::new(NoopObserver),
            default_policy: None,
            interceptor: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ObserverHook<E, S>>) -> Self {
        self.observer = observer;
        self
    }

    /// Policy for registrations that do not name one. Overrides
    /// `config.default_policy`.
    pub fn default_policy(mut self, policy: Arc<dyn ConcurrencyPolicy<E, S>>) -> Self {
        self.default_policy = Some(policy);
        self
    }

    pub fn event_interceptor(mut self, interceptor: impl EventInterceptor<E>) -> Self {
        self.interceptor = Some(Arc::new(interceptor));
        self
    }

    pub fn build(self) -> Result<StateEngine<E, S>> {
        self.config.validate()?;

        let default_policy = self
            .default_policy
            .unwrap_or_else(|| self.config.default_policy.into_policy());

        Ok(StateEngine::assemble(
            self.initial,
            self.config,
            self.observer,
            default_policy,
            self.interceptor,
        ))
    }
}

/// Event-driven state container
///
/// ```rust
/// use transition_engine::{Actioner, EngineEvent, StateEngine};
/// use futures::StreamExt;
///
/// #[derive(Debug, Clone)]
/// struct Increment;
///
/// impl EngineEvent for Increment {
///     type Variant = ();
///     fn variant(&self) {}
/// }
///
/// # #[tokio::main]
/// # async fn main() -> transition_engine::Result<()> {
/// let engine = StateEngine::<Increment, i64>::new(0);
/// engine.register((), |_event: Increment, actioner: Actioner<Increment, i64>| async move {
///     actioner.emit(actioner.current_state() + 1);
///     anyhow::Ok(())
/// })?;
///
/// let mut states = engine.subscribe_states();
/// engine.submit(Increment)?;
/// assert_eq!(states.next().await, Some(1));
///
/// engine.end().await;
/// # Ok(())
/// # }
/// ```
pub struct StateEngine<E: EngineEvent, S: EngineState> {
    store: Arc<StateStore<E, S>>,
    bus: EventBus<E>,
    controllers: RwLock<HashMap<E::Variant, Controller<E, S>>>,
    registry: Arc<InvocationRegistry<E, S>>,
    pipelines: Mutex<Vec<JoinHandle<()>>>,
    /// Held shared by `submit`, exclusively while the bus closes
    intake: RwLock<()>,
    config: EngineConfig,
    default_policy: Arc<dyn ConcurrencyPolicy<E, S>>,
    interceptor: Option<Arc<dyn EventInterceptor<E>>>,
}

impl<E: EngineEvent, S: EngineState> StateEngine<E, S> {
    /// Engine with default configuration, a no-op observer, and the merge policy
    pub fn new(initial: S) -> Self {
        let config = EngineConfig::default();
        let default_policy = config.default_policy.into_policy();
        Self::assemble(initial, config, Arc::new(NoopObserver), default_policy, None)
    }

    pub fn builder(initial: S) -> EngineBuilder<E, S> {
        EngineBuilder::new(initial)
    }

    fn assemble(
        initial: S,
        config: EngineConfig,
        observer: Arc<dyn ObserverHook<E, S>>,
        default_policy: Arc<dyn ConcurrencyPolicy<E, S>>,
        interceptor: Option<Arc<dyn EventInterceptor<E>>>,
    ) -> Self {
        observer.on_init(&initial);
        let store = Arc::new(StateStore::new(
            initial,
            config.state_channel_capacity,
            observer,
        ));

        debug!(
            strict_mode = config.strict_mode,
            policy = default_policy.name(),
            "🚀 State engine created"
        );

        Self {
            store,
            bus: EventBus::new(),
            controllers: RwLock::new(HashMap::new()),
            registry: Arc::new(InvocationRegistry::new()),
            pipelines: Mutex::new(Vec::new()),
            intake: RwLock::new(()),
            config,
            default_policy,
            interceptor,
        }
    }

    /// Register `handler` for `variant` under the engine's default policy
    ///
    /// Must be called within a Tokio runtime: the variant's pipeline is
    /// spawned immediately.
    pub fn register<H>(&self, variant: E::Variant, handler: H) -> Result<()>
    where
        H: EventHandler<E, S>,
    {
        let policy = Arc::clone(&self.default_policy);
        self.register_with_policy(variant, handler, policy)
    }

    /// Register `handler` for `variant` under an explicit concurrency policy
    pub fn register_with_policy<H>(
        &self,
        variant: E::Variant,
        handler: H,
        policy: Arc<dyn ConcurrencyPolicy<E, S>>,
    ) -> Result<()>
    where
        H: EventHandler<E, S>,
    {
        let variant_name = format!("{variant:?}");
        let mut controllers = self.controllers.write();

        if controllers.contains_key(&variant) {
            log_engine_operation(
                operations::REGISTER,
                Some(&variant_name),
                "duplicate",
                None,
            );
            return Err(EngineError::DuplicateHandler {
                variant: variant_name,
            });
        }

        let receiver = self.bus.subscribe().ok_or(EngineError::Terminated)?;
        let controller = Controller::new(variant, Arc::new(handler), policy);

        let events: EventStream<E> = stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|event| (event, receiver))
        })
        .filter(move |event| future::ready(event.is_variant(variant)))
        .boxed();

        let finder = self.finder(&controller);
        let emissions = controller.policy().flatten(events, finder);
        let pipeline = tokio::spawn(run_pipeline(
            Arc::clone(&self.store),
            emissions,
            variant_name.clone(),
        ));

        log_engine_operation(
            operations::REGISTER,
            Some(&variant_name),
            "registered",
            Some(controller.policy().name()),
        );

        controllers.insert(variant, controller);
        self.pipelines.lock().push(pipeline);
        Ok(())
    }

    /// Per-event factory: one actioner, one supervised handler task, one
    /// invocation stream
    fn finder(&self, controller: &Controller<E, S>) -> Finder<E, S> {
        let store = Arc::clone(&self.store);
        let registry = Arc::clone(&self.registry);
        let handler = Arc::clone(controller.handler());
        let variant = controller.variant();

        Arc::new(move |event: E| {
            let (output, receiver) = mpsc::unbounded_channel();
            let actioner = Actioner::new(Arc::clone(&store), output);
            let invocation = InvocationStream::new(event.clone(), receiver, actioner.clone());

            if !registry.admit(&actioner) {
                trace!(actioner_id = %actioner.id(), "Engine closing, invocation not started");
                actioner.cancel();
                return invocation;
            }

            tokio::spawn(supervise_invocation(
                variant,
                Arc::clone(&handler),
                event,
                actioner,
                Arc::clone(&registry),
                Arc::clone(store.observer()),
            ));
            invocation
        })
    }

    /// Dispatch `event` to the pipeline registered for its variant
    ///
    /// Returns once the event is queued; handler outcomes are reported to the
    /// observer, never to the submitter. An event reported through
    /// `on_event_received` is always published, even when `end` races it.
    pub fn submit(&self, event: E) -> Result<()> {
        let _intake = self.intake.read_recursive();
        if self.bus.is_closed() {
            return Err(EngineError::Terminated);
        }

        let variant = event.variant();
        if self.config.strict_mode && !self.has_handler(variant) {
            return Err(EngineError::NoHandler {
                variant: format!("{variant:?}"),
            });
        }

        let observer = self.store.observer();
        observer.on_event_received(&event);

        if let Some(interceptor) = &self.interceptor {
            if let Err(err) = interceptor.on_event(&event) {
                let failure = EngineError::EventRejected {
                    variant: format!("{variant:?}"),
                    message: format!("{err:#}"),
                };
                error!(variant = ?variant, error = %failure, "❌ Event rejected before dispatch");
                log_engine_operation(
                    operations::SUBMIT,
                    Some(&format!("{variant:?}")),
                    "rejected",
                    Some(&format!("{err:#}")),
                );
                observer.on_failure(&failure);
                return Err(failure);
            }
        }

        let delivered = self.bus.publish(event)?;
        trace!(variant = ?variant, delivered, "📤 Event submitted");
        Ok(())
    }

    /// Latest committed state
    pub fn current_state(&self) -> S {
        self.store.current_state()
    }

    /// Every state committed from now on; ends when the engine ends
    pub fn subscribe_states(&self) -> BoxStream<'static, S> {
        self.store.subscribe_stream()
    }

    /// Raw broadcast receiver for committed states
    pub fn subscribe(&self) -> broadcast::Receiver<S> {
        self.store.subscribe()
    }

    pub fn has_handler(&self, variant: E::Variant) -> bool {
        self.controllers.read().contains_key(&variant)
    }

    pub fn registered_variants(&self) -> Vec<E::Variant> {
        self.controllers.read().keys().copied().collect()
    }

    /// Number of handler invocations that have not yet finished
    pub fn live_invocations(&self) -> usize {
        self.registry.len()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_ended(&self) -> bool {
        self.store.is_ended()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            registered_variants: self.controllers.read().len(),
            live_invocations: self.registry.len(),
            state_subscribers: self.store.subscriber_count(),
            transitions_committed: self.store.transitions_committed(),
            ended: self.store.is_ended(),
            captured_at: Utc::now(),
        }
    }

    /// Shut the engine down
    ///
    /// Resolves only after every live invocation has been cancelled or has
    /// completed, every pipeline has drained its queued events, and the state
    /// stream has closed. Later calls return at once.
    ///
    /// Events queued before the bus closed still reach their policy; the
    /// invocations they would start are cancelled before the handler runs.
    pub async fn end(&self) {
        let closed = {
            let _intake = self.intake.write();
            self.bus.close()
        };
        if !closed {
            debug!("Engine already closing");
        }

        // Closing the registry serializes with admission: nothing can be
        // admitted after this point, so one snapshot sees every live actioner
        self.registry.close();
        let live = self.registry.snapshot();
        for actioner in &live {
            actioner.cancel();
        }
        future::join_all(live.iter().map(|actioner| actioner.finished())).await;

        // With the bus closed and every invocation terminal, each pipeline
        // runs out of events and emissions on its own
        let pipelines = std::mem::take(&mut *self.pipelines.lock());
        for pipeline in pipelines {
            if let Err(err) = pipeline.await {
                if err.is_panic() {
                    warn!(error = %err, "⚠️ Pipeline task panicked");
                }
            }
        }

        let already_ended = self.store.is_ended();
        self.store.end();

        if !already_ended {
            info!(
                cancelled = live.len(),
                committed = self.store.transitions_committed(),
                "🏁 State engine ended"
            );
            log_engine_operation(
                operations::SHUTDOWN,
                None,
                "completed",
                Some(&format!("cancelled {} live invocation(s)", live.len())),
            );
        }
    }
}

impl<E: EngineEvent, S: EngineState> Debug for StateEngine<E, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateEngine")
            .field("config", &self.config)
            .field("default_policy", &self.default_policy.name())
            .field("registered_variants", &self.registered_variants())
            .field("live_invocations", &self.registry.len())
            .field("ended", &self.store.is_ended())
            .finish()
    }
}

async fn run_pipeline<E: EngineEvent, S: EngineState>(
    store: Arc<StateStore<E, S>>,
    mut emissions: BoxStream<'static, Emission<E, S>>,
    variant: String,
) {
    debug!(variant = %variant, "🔌 Pipeline started");
    while let Some(emission) = emissions.next().await {
        commit_emission(&store, emission);
    }
    debug!(variant = %variant, "🔌 Pipeline drained");
}

/// Router-level dedup against the live state, then commit
fn commit_emission<E: EngineEvent, S: EngineState>(
    store: &StateStore<E, S>,
    emission: Emission<E, S>,
) {
    if store.is_ended() {
        trace!("Dropping emission after engine end");
        return;
    }

    let current = store.current_state();
    if store.has_transitioned() && current == emission.state {
        trace!(state = ?emission.state, "Skipping unchanged state");
        return;
    }

    let Emission { event, state } = emission;
    store
        .observer()
        .on_progression(&Progression::new(current, event, state.clone()));

    match store.apply(state) {
        Ok(()) => {}
        Err(EngineError::Terminated) => trace!("Store ended before commit"),
        Err(err) => warn!(error = %err, "⚠️ Unexpected commit failure"),
    }
}

/// Run one handler invocation to its end and settle its actioner
///
/// The handler runs in its own task so a panic surfaces as a `JoinError`
/// instead of tearing down the supervisor.
async fn supervise_invocation<E: EngineEvent, S: EngineState>(
    variant: E::Variant,
    handler: Arc<dyn EventHandler<E, S>>,
    event: E,
    actioner: Actioner<E, S>,
    registry: Arc<InvocationRegistry<E, S>>,
    observer: Arc<dyn ObserverHook<E, S>>,
) {
    let running = {
        let actioner = actioner.clone();
        tokio::spawn(async move { handler.handle(event, actioner).await })
    };

    let outcome = match running.await {
        Ok(outcome) => outcome,
        Err(err) if err.is_panic() => Err(anyhow::anyhow!("handler panicked: {err}")),
        Err(err) => Err(anyhow::anyhow!("handler task aborted: {err}")),
    };

    match outcome {
        Ok(()) => {
            if let Err(err) = actioner.complete() {
                warn!(
                    variant = ?variant,
                    actioner_id = %actioner.id(),
                    error = %err,
                    "⚠️ Handler returned with open subscriptions, cancelling"
                );
                observer.on_failure(&err);
                actioner.cancel();
            }
        }
        Err(err) => {
            let failure = EngineError::handler_failed(variant, &err);
            error!(
                variant = ?variant,
                actioner_id = %actioner.id(),
                error = %failure,
                "❌ Handler failed"
            );
            observer.on_failure(&failure);
            actioner.cancel();
        }
    }

    registry.release(&actioner.id());
}
