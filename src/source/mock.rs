//! Deterministic in-process sources for demos and tests.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::SourceError;
use crate::item::{Field, Item};

use super::{Source, SourceFactory, SourceHandle};

/// Sequence number stamped by the mock sources.
pub const SEQ: Field<i64> = Field::new("seq");
/// Pseudo-random reading stamped by [`MockSensor`].
pub const READING: Field<f64> = Field::new("reading");

/// Replays a fixed list of items, optionally spaced in time, then completes.
#[derive(Clone)]
pub struct FixedSource {
    items: Vec<Item>,
    interval: Option<Duration>,
}

impl FixedSource {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items,
            interval: None,
        }
    }

    pub fn spaced(items: Vec<Item>, interval: Duration) -> Self {
        Self {
            items,
            interval: Some(interval),
        }
    }
}

#[async_trait]
impl Source for FixedSource {
    async fn run(self: Box<Self>, out: SourceHandle) -> Result<(), SourceError> {
        for item in self.items {
            if out.emit(item).await.is_err() {
                return Ok(());
            }
            if let Some(interval) = self.interval {
                if out.sleep(interval).await.is_err() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

impl SourceFactory for FixedSource {
    fn create(&self) -> Box<dyn Source> {
        Box::new(self.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Emits `seq`/`reading` items from a seeded generator: bounded, or
/// continuous on an interval.
#[derive(Clone)]
pub struct MockSensor {
    count: Option<u64>,
    interval: Duration,
    max: f64,
    seed: u64,
}

impl MockSensor {
    /// Bounded run of `count` readings in `0.0..max`, emitted back to back.
    pub fn bounded(count: u64, max: f64) -> Self {
        Self {
            count: Some(count),
            interval: Duration::ZERO,
            max,
            seed: 0x9e37_79b9_7f4a_7c15,
        }
    }

    /// Continuous readings in `0.0..max`, one per `interval`, until stopped.
    pub fn updates(interval: Duration, max: f64) -> Self {
        Self {
            count: None,
            interval,
            max,
            seed: 0x9e37_79b9_7f4a_7c15,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

#[async_trait]
impl Source for MockSensor {
    async fn run(self: Box<Self>, out: SourceHandle) -> Result<(), SourceError> {
        let mut state = self.seed;
        let mut seq: i64 = 0;
        loop {
            if let Some(count) = self.count {
                if seq as u64 >= count {
                    return Ok(());
                }
            }
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let reading = (state >> 11) as f64 / (1u64 << 53) as f64 * self.max;
            let item = Item::new()
                .with_field(SEQ.name(), seq)
                .with_field(READING.name(), reading);
            if out.emit(item).await.is_err() {
                return Ok(());
            }
            seq += 1;
            if !self.interval.is_zero() && out.sleep(self.interval).await.is_err() {
                return Ok(());
            }
        }
    }
}

impl SourceFactory for MockSensor {
    fn create(&self) -> Box<dyn Source> {
        Box::new(self.clone())
    }

    fn name(&self) -> &str {
        "mock_sensor"
    }
}

/// Heartbeat source: items carrying nothing but their creation timestamp.
#[derive(Clone)]
pub struct EmptySource {
    interval: Duration,
    count: Option<u64>,
}

impl EmptySource {
    pub fn updates(interval: Duration) -> Self {
        Self {
            interval,
            count: None,
        }
    }

    pub fn bounded(count: u64, interval: Duration) -> Self {
        Self {
            interval,
            count: Some(count),
        }
    }
}

#[async_trait]
impl Source for EmptySource {
    async fn run(self: Box<Self>, out: SourceHandle) -> Result<(), SourceError> {
        let mut emitted: u64 = 0;
        loop {
            if let Some(count) = self.count {
                if emitted >= count {
                    return Ok(());
                }
            }
            if out.emit(Item::new()).await.is_err() {
                return Ok(());
            }
            emitted += 1;
            if !self.interval.is_zero() && out.sleep(self.interval).await.is_err() {
                return Ok(());
            }
        }
    }
}

impl SourceFactory for EmptySource {
    fn create(&self) -> Box<dyn Source> {
        Box::new(self.clone())
    }

    fn name(&self) -> &str {
        "empty"
    }
}

/// Emits a few items, then fails. Exists to exercise the fatal path.
#[derive(Clone)]
pub struct FailingSource {
    emit_first: u64,
    message: String,
}

impl FailingSource {
    pub fn new(emit_first: u64, message: impl Into<String>) -> Self {
        Self {
            emit_first,
            message: message.into(),
        }
    }
}

#[async_trait]
impl Source for FailingSource {
    async fn run(self: Box<Self>, out: SourceHandle) -> Result<(), SourceError> {
        for seq in 0..self.emit_first {
            let item = Item::new().with_field(SEQ.name(), seq as i64);
            if out.emit(item).await.is_err() {
                return Ok(());
            }
        }
        Err(SourceError::new(self.message))
    }
}

impl SourceFactory for FailingSource {
    fn create(&self) -> Box<dyn Source> {
        Box::new(self.clone())
    }

    fn name(&self) -> &str {
        "failing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn handle(capacity: usize) -> (SourceHandle, mpsc::Receiver<Item>, CancellationToken) {
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        (SourceHandle::new(tx, cancel.clone()), rx, cancel)
    }

    #[tokio::test]
    async fn fixed_source_replays_in_order() {
        let items = vec![
            Item::new().with_field("n", 1),
            Item::new().with_field("n", 2),
        ];
        let (out, mut rx, _cancel) = handle(8);
        Box::new(FixedSource::new(items.clone()))
            .run(out)
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), items[0]);
        assert_eq!(rx.recv().await.unwrap(), items[1]);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn mock_sensor_is_deterministic_per_seed() {
        let sensor = MockSensor::bounded(3, 10.0).with_seed(7);
        let (out, mut rx, _cancel) = handle(8);
        Box::new(sensor.clone()).run(out).await.unwrap();
        let mut first = Vec::new();
        while let Some(item) = rx.recv().await {
            first.push(item.get(READING).unwrap());
        }

        let (out, mut rx, _cancel) = handle(8);
        Box::new(sensor).run(out).await.unwrap();
        let mut second = Vec::new();
        while let Some(item) = rx.recv().await {
            second.push(item.get(READING).unwrap());
        }
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert!(first.iter().all(|r| (0.0..10.0).contains(r)));
    }

    #[tokio::test]
    async fn continuous_source_stops_on_cancellation() {
        let (out, mut rx, cancel) = handle(1);
        let task = tokio::spawn(
            Box::new(MockSensor::updates(Duration::from_millis(1), 1.0)).run(out),
        );
        assert!(rx.recv().await.is_some());
        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn failing_source_reports_after_preamble() {
        let (out, mut rx, _cancel) = handle(8);
        let result = Box::new(FailingSource::new(2, "sensor unplugged")).run(out).await;
        assert_eq!(result.unwrap_err().message(), "sensor unplugged");
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
