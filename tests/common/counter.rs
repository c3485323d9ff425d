//! Counter domain shared by the integration suites

use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use transition_engine::{Actioner, EngineConfig, EngineEvent, ObserverHook, StateEngine};

use super::observers::RecordingObserver;

#[derive(Debug, Clone, PartialEq)]
pub enum CounterEvent {
    Increment,
    Set(i64),
    Delayed { delay_ms: u64, value: i64 },
    Feed(Vec<i64>),
    Fail(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterVariant {
    Increment,
    Set,
    Delayed,
    Feed,
    Fail,
}

impl EngineEvent for CounterEvent {
    type Variant = CounterVariant;

    fn variant(&self) -> CounterVariant {
        match self {
            Self::Increment => CounterVariant::Increment,
            Self::Set(_) => CounterVariant::Set,
            Self::Delayed { .. } => CounterVariant::Delayed,
            Self::Feed(_) => CounterVariant::Feed,
            Self::Fail(_) => CounterVariant::Fail,
        }
    }
}

pub type CounterActioner = Actioner<CounterEvent, i64>;
pub type CounterEngine = StateEngine<CounterEvent, i64>;

/// Strict engine at `initial` reporting to a fresh recording observer
pub fn recorded_engine(initial: i64) -> (CounterEngine, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::default());
    let engine = StateEngine::builder(initial)
        .config(EngineConfig::strict())
        .observer(observer.clone() as Arc<dyn ObserverHook<CounterEvent, i64>>)
        .build()
        .expect("default strict config is valid");
    (engine, observer)
}

/// Emits `current + 1`
pub async fn increment(_event: CounterEvent, actioner: CounterActioner) -> anyhow::Result<()> {
    actioner.emit(actioner.current_state() + 1);
    Ok(())
}

/// Emits the requested value twice in a row
pub async fn set_twice(event: CounterEvent, actioner: CounterActioner) -> anyhow::Result<()> {
    if let CounterEvent::Set(value) = event {
        actioner.emit(value);
        actioner.emit(value);
    }
    Ok(())
}

/// Sleeps, then emits the requested value
pub async fn delayed(event: CounterEvent, actioner: CounterActioner) -> anyhow::Result<()> {
    if let CounterEvent::Delayed { delay_ms, value } = event {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        actioner.emit(value);
    }
    Ok(())
}

/// Bridges the event's values into states through `observe_each_as_state`
pub async fn feed(event: CounterEvent, actioner: CounterActioner) -> anyhow::Result<()> {
    if let CounterEvent::Feed(values) = event {
        let source = futures::stream::iter(values.into_iter().map(Ok::<_, anyhow::Error>));
        actioner.observe_each_as_state(source, |value| value).await;
    }
    Ok(())
}

/// Always fails with the event's message
pub async fn fail(event: CounterEvent, _actioner: CounterActioner) -> anyhow::Result<()> {
    match event {
        CounterEvent::Fail(message) => Err(anyhow::anyhow!(message)),
        other => Err(anyhow::anyhow!("unexpected event {other:?}")),
    }
}

/// Next published state, failing the test after two seconds
pub async fn next_state(states: &mut BoxStream<'static, i64>) -> Option<i64> {
    tokio::time::timeout(Duration::from_secs(2), states.next())
        .await
        .expect("timed out waiting for a published state")
}

/// The next `count` published states
pub async fn take_states(states: &mut BoxStream<'static, i64>, count: usize) -> Vec<i64> {
    let mut collected = Vec::with_capacity(count);
    for _ in 0..count {
        match next_state(states).await {
            Some(state) => collected.push(state),
            None => break,
        }
    }
    collected
}

/// Poll `condition` every few milliseconds until it holds, failing after two seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
