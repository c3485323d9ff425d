//! # Concurrency Policies
//!
//! A policy flattens "one event in, one invocation stream out" into a single
//! stream of emissions for a variant. The router hands each policy the
//! filtered event stream and a [`Finder`]; calling the finder starts one
//! handler invocation and returns its [`InvocationStream`].
//!
//! Every policy here keeps two guarantees:
//!
//! - no event vanishes without its finder being called
//! - once an invocation stream has been dropped the flattened output never
//!   carries anything from it (dropping the stream cancels its actioner)

use futures::stream::{self, BoxStream, SelectAll, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;

use super::actioner::Actioner;
use crate::events::{EngineEvent, EngineState};

/// A candidate state tagged with the event whose handler produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Emission<E, S> {
    pub event: E,
    pub state: S,
}

/// Output of one handler invocation
///
/// Ends once the invocation finishes. Dropping it cancels the invocation.
pub struct InvocationStream<E, S> {
    event: E,
    receiver: mpsc::UnboundedReceiver<S>,
    actioner: Actioner<E, S>,
}

impl<E, S: EngineState> InvocationStream<E, S> {
    pub fn new(event: E, receiver: mpsc::UnboundedReceiver<S>, actioner: Actioner<E, S>) -> Self {
        Self {
            event,
            receiver,
            actioner,
        }
    }

    pub fn event(&self) -> &E {
        &self.event
    }

    pub fn actioner(&self) -> &Actioner<E, S> {
        &self.actioner
    }
}

// Never pinned structurally; all fields are polled through `&mut`
impl<E, S> Unpin for InvocationStream<E, S> {}

impl<E: Clone, S: EngineState> Stream for InvocationStream<E, S> {
    type Item = Emission<E, S>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.receiver.poll_recv(cx).map(|state| {
            state.map(|state| Emission {
                event: this.event.clone(),
                state,
            })
        })
    }
}

impl<E, S> Drop for InvocationStream<E, S> {
    fn drop(&mut self) {
        self.actioner.cancel();
    }
}

/// Starts one handler invocation for an event
pub type Finder<E, S> = Arc<dyn Fn(E) -> InvocationStream<E, S> + Send + Sync>;

/// Filtered events for a single variant
pub type EventStream<E> = BoxStream<'static, E>;

/// Flattened emissions for a single variant
pub type EmissionStream<E, S> = BoxStream<'static, Emission<E, S>>;

/// Rule for flattening concurrently produced invocation streams
pub trait ConcurrencyPolicy<E, S>: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Flatten per-event invocation streams into one emission stream
    fn flatten(&self, events: EventStream<E>, finder: Finder<E, S>) -> EmissionStream<E, S>;
}

/// Serializable selection of the built-in policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyMode {
    /// Run every invocation concurrently and interleave their output
    #[default]
    Merge,
    /// Queue events and run one invocation at a time, in order
    Sequential,
    /// Cancel the live invocation when a newer event arrives
    Latest,
    /// Cancel invocations for events that arrive while one is live
    Exhaust,
}

impl ConcurrencyMode {
    pub fn into_policy<E: EngineEvent, S: EngineState>(self) -> Arc<dyn ConcurrencyPolicy<E, S>> {
        match self {
            Self::Merge => Arc::new(MergePolicy),
            Self::Sequential => Arc::new(SequentialPolicy),
            Self::Latest => Arc::new(LatestPolicy),
            Self::Exhaust => Arc::new(ExhaustPolicy),
        }
    }
}

async fn next_event<E>(events: &mut Option<EventStream<E>>) -> Option<E> {
    match events {
        Some(events) => events.next().await,
        None => None,
    }
}

async fn next_emission<E: Clone, S: EngineState>(
    current: &mut Option<InvocationStream<E, S>>,
) -> Option<Emission<E, S>> {
    match current {
        Some(invocation) => invocation.next().await,
        None => None,
    }
}

/// Every event starts its own invocation immediately
///
/// The output interleaves emissions from all live invocations in emission
/// order and completes only once the event stream has closed and every
/// invocation it started has finished.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergePolicy;

struct MergeDriver<E, S> {
    events: Option<EventStream<E>>,
    active: SelectAll<InvocationStream<E, S>>,
    finder: Finder<E, S>,
}

impl<E: EngineEvent, S: EngineState> ConcurrencyPolicy<E, S> for MergePolicy {
    fn name(&self) -> &'static str {
        "merge"
    }

    fn flatten(&self, events: EventStream<E>, finder: Finder<E, S>) -> EmissionStream<E, S> {
        let driver = MergeDriver {
            events: Some(events),
            active: SelectAll::new(),
            finder,
        };

        stream::unfold(driver, |mut driver| async move {
            loop {
                if driver.events.is_none() && driver.active.is_empty() {
                    return None;
                }

                tokio::select! {
                    event = next_event(&mut driver.events), if driver.events.is_some() => match event {
                        Some(event) => {
                            let invocation = (driver.finder)(event);
                            driver.active.push(invocation);
                        }
                        None => driver.events = None,
                    },
                    Some(emission) = driver.active.next(), if !driver.active.is_empty() => {
                        return Some((emission, driver));
                    }
                    else => {}
                }
            }
        })
        .boxed()
    }
}

/// Events queue up and invocations run one at a time, first in first out
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialPolicy;

struct SequentialDriver<E, S> {
    events: Option<EventStream<E>>,
    queue: VecDeque<E>,
    current: Option<InvocationStream<E, S>>,
    finder: Finder<E, S>,
}

impl<E: EngineEvent, S: EngineState> ConcurrencyPolicy<E, S> for SequentialPolicy {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn flatten(&self, events: EventStream<E>, finder: Finder<E, S>) -> EmissionStream<E, S> {
        let driver = SequentialDriver {
            events: Some(events),
            queue: VecDeque::new(),
            current: None,
            finder,
        };

        stream::unfold(driver, |mut driver| async move {
            loop {
                if driver.current.is_none() {
                    if let Some(event) = driver.queue.pop_front() {
                        driver.current = Some((driver.finder)(event));
                    } else if driver.events.is_none() {
                        return None;
                    }
                }

                tokio::select! {
                    event = next_event(&mut driver.events), if driver.events.is_some() => match event {
                        Some(event) => driver.queue.push_back(event),
                        None => driver.events = None,
                    },
                    emission = next_emission(&mut driver.current), if driver.current.is_some() => match emission {
                        Some(emission) => return Some((emission, driver)),
                        None => driver.current = None,
                    },
                    else => {}
                }
            }
        })
        .boxed()
    }
}

/// A newer event cancels the live invocation and discards its unread output
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestPolicy;

struct SingleDriver<E, S> {
    events: Option<EventStream<E>>,
    current: Option<InvocationStream<E, S>>,
    finder: Finder<E, S>,
}

impl<E, S> SingleDriver<E, S> {
    fn new(events: EventStream<E>, finder: Finder<E, S>) -> Self {
        Self {
            events: Some(events),
            current: None,
            finder,
        }
    }
}

impl<E: EngineEvent, S: EngineState> ConcurrencyPolicy<E, S> for LatestPolicy {
    fn name(&self) -> &'static str {
        "latest"
    }

    fn flatten(&self, events: EventStream<E>, finder: Finder<E, S>) -> EmissionStream<E, S> {
        stream::unfold(SingleDriver::new(events, finder), |mut driver| async move {
            loop {
                if driver.events.is_none() && driver.current.is_none() {
                    return None;
                }

                tokio::select! {
                    event = next_event(&mut driver.events), if driver.events.is_some() => match event {
                        Some(event) => {
                            if let Some(superseded) = driver.current.take() {
                                debug!(
                                    actioner_id = %superseded.actioner().id(),
                                    "⏭️ Superseding live invocation"
                                );
                            }
                            driver.current = Some((driver.finder)(event));
                        }
                        None => driver.events = None,
                    },
                    emission = next_emission(&mut driver.current), if driver.current.is_some() => match emission {
                        Some(emission) => return Some((emission, driver)),
                        None => driver.current = None,
                    },
                    else => {}
                }
            }
        })
        .boxed()
    }
}

/// Events arriving while an invocation is live are cancelled on arrival
///
/// The finder still runs for every such event, so each one gets an actioner
/// that is already cancelled by the time its handler first emits.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExhaustPolicy;

impl<E: EngineEvent, S: EngineState> ConcurrencyPolicy<E, S> for ExhaustPolicy {
    fn name(&self) -> &'static str {
        "exhaust"
    }

    fn flatten(&self, events: EventStream<E>, finder: Finder<E, S>) -> EmissionStream<E, S> {
        stream::unfold(SingleDriver::new(events, finder), |mut driver| async move {
            loop {
                if driver.events.is_none() && driver.current.is_none() {
                    return None;
                }

                tokio::select! {
                    event = next_event(&mut driver.events), if driver.events.is_some() => match event {
                        Some(event) => {
                            let invocation = (driver.finder)(event);
                            if driver.current.is_some() {
                                debug!(
                                    actioner_id = %invocation.actioner().id(),
                                    "🚫 Invocation busy, dropping event"
                                );
                            } else {
                                driver.current = Some(invocation);
                            }
                        }
                        None => driver.events = None,
                    },
                    emission = next_emission(&mut driver.current), if driver.current.is_some() => match emission {
                        Some(emission) => return Some((emission, driver)),
                        None => driver.current = None,
                    },
                    else => {}
                }
            }
        })
        .boxed()
    }
}
