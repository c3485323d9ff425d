//! Handler registrations, one per event variant.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::actioner::Actioner;
use super::concurrency::ConcurrencyPolicy;
use crate::events::{EngineEvent, EngineState};

/// Asynchronous handler for one event variant
///
/// A handler receives the event and its invocation's [`Actioner`], emits zero
/// or more states over time, and returns once its work is done. Returning an
/// error reports a failure for this invocation only.
///
/// Plain async closures implement this trait:
///
/// ```rust
/// use transition_engine::{Actioner, EventHandler};
///
/// fn assert_handler<H: EventHandler<(), i64>>(_: H) {}
///
/// assert_handler(|_event: (), actioner: Actioner<(), i64>| async move {
///     actioner.emit(actioner.current_state() + 1);
///     anyhow::Ok(())
/// });
/// ```
#[async_trait]
pub trait EventHandler<E, S>: Send + Sync + 'static {
    async fn handle(&self, event: E, actioner: Actioner<E, S>) -> anyhow::Result<()>;
}

#[async_trait]
impl<E, S, F, Fut> EventHandler<E, S> for F
where
    E: Send + 'static,
    S: Send + 'static,
    F: Fn(E, Actioner<E, S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, event: E, actioner: Actioner<E, S>) -> anyhow::Result<()> {
        (self)(event, actioner).await
    }
}

/// Registration record binding a variant to its handler and policy
pub struct Controller<E: EngineEvent, S> {
    variant: E::Variant,
    handler: Arc<dyn EventHandler<E, S>>,
    policy: Arc<dyn ConcurrencyPolicy<E, S>>,
    registered_at: DateTime<Utc>,
}

impl<E: EngineEvent, S: EngineState> Controller<E, S> {
    pub fn new(
        variant: E::Variant,
        handler: Arc<dyn EventHandler<E, S>>,
        policy: Arc<dyn ConcurrencyPolicy<E, S>>,
    ) -> Self {
        Self {
            variant,
            handler,
            policy,
            registered_at: Utc::now(),
        }
    }

    pub fn variant(&self) -> E::Variant {
        self.variant
    }

    pub fn handler(&self) -> &Arc<dyn EventHandler<E, S>> {
        &self.handler
    }

    pub fn policy(&self) -> &Arc<dyn ConcurrencyPolicy<E, S>> {
        &self.policy
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }
}

impl<E: EngineEvent, S> fmt::Debug for Controller<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("variant", &self.variant)
            .field("policy", &self.policy.name())
            .field("registered_at", &self.registered_at)
            .finish()
    }
}
