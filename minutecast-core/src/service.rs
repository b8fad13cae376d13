//! Long-running refresh and publish loops.
//!
//! The current snapshot lives in a `watch` channel. The refresh task owns the
//! sender and is its only writer; the publish loop clones the latest value on
//! every tick and derives a fresh state from it. A slow fetch never holds up
//! publishing.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    engine::derive,
    model::{ForecastSnapshot, WeatherState},
    publish::{PAYLOAD_OFFLINE, PAYLOAD_ONLINE, Registration, Sensor, StatePublisher, Topics},
    source::ForecastSource,
};

pub struct CastService {
    source: ForecastSource,
    publisher: Arc<dyn StatePublisher>,
    topics: Topics,
    refresh_every: Duration,
    publish_every: Duration,
}

impl CastService {
    pub fn new(source: ForecastSource, publisher: Arc<dyn StatePublisher>, topics: Topics) -> Self {
        Self {
            source,
            publisher,
            topics,
            refresh_every: Duration::from_secs(80 * 60),
            publish_every: Duration::from_secs(30),
        }
    }

    pub fn with_intervals(mut self, refresh_every: Duration, publish_every: Duration) -> Self {
        self.refresh_every = refresh_every;
        self.publish_every = publish_every;
        self
    }

    /// Announce the sensors and mark the device online.
    pub async fn register(&self) -> Result<()> {
        for sensor in Sensor::ALL {
            let registration = Registration::for_sensor(sensor, &self.topics);
            let payload = serde_json::to_vec(&registration)
                .context("Failed to serialize registration payload")?;
            debug!(?sensor, "sending registration payload");
            self.publisher
                .publish(&self.topics.discovery(sensor), &payload, false)
                .await
                .with_context(|| format!("Failed to register sensor {sensor:?}"))?;
        }

        self.publisher
            .publish(&self.topics.available(), PAYLOAD_ONLINE.as_bytes(), true)
            .await
            .context("Failed to announce availability")
    }

    /// Derive the state for `now` and publish it. Publish failures are logged.
    pub async fn publish_once(
        &self,
        snapshot: &ForecastSnapshot,
        now: DateTime<Utc>,
    ) -> Result<WeatherState> {
        let state = derive(snapshot, now);
        let payload = serde_json::to_vec(&state).context("Failed to serialize state")?;
        debug!(?state, "sending state update");

        for (topic, data, retain) in [
            (self.topics.attributes(), payload.as_slice(), false),
            (self.topics.state(), payload.as_slice(), false),
            (self.topics.available(), PAYLOAD_ONLINE.as_bytes(), true),
        ] {
            if let Err(err) = self.publisher.publish(&topic, data, retain).await {
                warn!(error = %err, %topic, "failed to publish state");
            }
        }

        Ok(state)
    }

    /// Run until `shutdown` resolves, then mark the device offline.
    pub async fn run<F>(self, initial: ForecastSnapshot, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (tx, mut rx) = watch::channel(initial);

        let refresher = self
            .source
            .is_live()
            .then(|| tokio::spawn(refresh_loop(self.source.clone(), self.refresh_every, tx)));

        let mut publish = tokio::time::interval(self.publish_every);
        publish.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::pin!(shutdown);

        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown => break Ok(()),
                _ = publish.tick() => {
                    let snapshot = rx.borrow_and_update().clone();
                    if let Err(err) = self.publish_once(&snapshot, Utc::now()).await {
                        break Err(err);
                    }
                }
            }
        };

        if let Some(task) = refresher {
            task.abort();
        }
        outcome?;

        info!("shutting down");
        self.publisher
            .publish(&self.topics.available(), PAYLOAD_OFFLINE.as_bytes(), true)
            .await
            .context("Failed to announce offline status")
    }
}

/// Refetch every `every`, replacing the shared snapshot on success.
async fn refresh_loop(
    source: ForecastSource,
    every: Duration,
    tx: watch::Sender<ForecastSnapshot>,
) {
    let mut refresh = tokio::time::interval(every);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
    refresh.tick().await;

    loop {
        refresh.tick().await;
        match source.refresh().await {
            Ok(snapshot) => {
                info!(anchor = %snapshot.anchor_time, "forecast refreshed");
                tx.send_replace(snapshot);
            }
            Err(err) => warn!(error = %err, "forecast refresh failed, keeping previous"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{Interval, Status},
        provider::ForecastProvider,
    };
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    #[derive(Debug)]
    struct FixedProvider {
        snapshot: Option<ForecastSnapshot>,
    }

    #[async_trait]
    impl ForecastProvider for FixedProvider {
        async fn fetch(&self) -> Result<ForecastSnapshot> {
            let mut snap = self.snapshot.clone().ok_or_else(|| anyhow!("provider down"))?;
            snap.anchor_time = Utc::now();
            Ok(snap)
        }
    }

    /// Takes `delay` to answer every fetch.
    #[derive(Debug)]
    struct SlowProvider {
        delay: Duration,
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ForecastProvider for SlowProvider {
        async fn fetch(&self) -> Result<ForecastSnapshot> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(rain_soon())
        }
    }

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<(String, String, bool)>>,
    }

    #[async_trait]
    impl StatePublisher for Recorder {
        async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<()> {
            let payload = String::from_utf8_lossy(payload).into_owned();
            self.messages.lock().unwrap().push((topic.to_string(), payload, retain));
            Ok(())
        }
    }

    impl Recorder {
        fn topics(&self) -> Vec<String> {
            self.messages.lock().unwrap().iter().map(|(t, _, _)| t.clone()).collect()
        }

        fn states(&self) -> Vec<String> {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _, _)| t == "test/state")
                .map(|(_, p, _)| p.clone())
                .collect()
        }
    }

    fn rain_soon() -> ForecastSnapshot {
        ForecastSnapshot {
            overall_kind: Some("RAIN".into()),
            overall_phrase: "Rain in 10 min".into(),
            intervals: vec![Interval::new(0, 10, None), Interval::new(10, 30, Some("RAIN"))],
            anchor_time: Utc::now(),
        }
    }

    fn service(provider: impl ForecastProvider + 'static, recorder: Arc<Recorder>) -> CastService {
        let source = ForecastSource::new(Box::new(provider), None);
        CastService::new(source, recorder, Topics::new("test"))
    }

    #[tokio::test]
    async fn register_announces_three_sensors_then_online() {
        let recorder = Arc::new(Recorder::default());
        service(FixedProvider { snapshot: None }, recorder.clone()).register().await.unwrap();

        assert_eq!(
            recorder.topics(),
            vec![
                "homeassistant/sensor/test/rain/config",
                "homeassistant/sensor/test/rainstart/config",
                "homeassistant/sensor/test/rainend/config",
                "test/available",
            ]
        );
    }

    #[tokio::test]
    async fn publish_once_sends_state_to_both_topics() {
        let recorder = Arc::new(Recorder::default());
        let svc = service(FixedProvider { snapshot: None }, recorder.clone());
        let snap = rain_soon();

        let state = svc.publish_once(&snap, snap.anchor_time).await.unwrap();
        assert_eq!(state.status, Status::Soon);

        let messages = recorder.messages.lock().unwrap().clone();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].0, "test/attributes");
        assert_eq!(messages[1].0, "test/state");
        assert_eq!(messages[0].1, messages[1].1);
        let json: serde_json::Value = serde_json::from_str(&messages[1].1).unwrap();
        assert_eq!(json["weather"], "SOON");
        assert_eq!(json["rain_start"], 10);
        assert_eq!(messages[2], ("test/available".to_string(), "online".to_string(), true));
    }

    #[tokio::test]
    async fn run_publishes_until_shutdown_then_goes_offline() {
        let recorder = Arc::new(Recorder::default());
        let svc = service(FixedProvider { snapshot: Some(rain_soon()) }, recorder.clone())
            .with_intervals(Duration::from_secs(3600), Duration::from_millis(10));

        svc.run(rain_soon(), tokio::time::sleep(Duration::from_millis(50))).await.unwrap();

        assert!(!recorder.states().is_empty());
        let messages = recorder.messages.lock().unwrap().clone();
        let last = messages.last().unwrap();
        assert_eq!(last, &("test/available".to_string(), "offline".to_string(), true));
    }

    #[tokio::test]
    async fn refreshed_forecast_reaches_publishes() {
        let mut fresh = rain_soon();
        fresh.overall_phrase = "refreshed".into();
        let recorder = Arc::new(Recorder::default());
        let svc = service(FixedProvider { snapshot: Some(fresh) }, recorder.clone())
            .with_intervals(Duration::from_millis(20), Duration::from_millis(10));

        svc.run(rain_soon(), tokio::time::sleep(Duration::from_millis(150))).await.unwrap();

        let states = recorder.states();
        assert!(states.first().unwrap().contains("Rain in 10 min"));
        assert!(states.iter().any(|s| s.contains("refreshed")));
    }

    #[tokio::test]
    async fn slow_fetch_does_not_stall_publishing_or_shutdown() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let provider =
            SlowProvider { delay: Duration::from_millis(500), fetches: fetches.clone() };
        let recorder = Arc::new(Recorder::default());
        let svc = service(provider, recorder.clone())
            .with_intervals(Duration::from_millis(20), Duration::from_millis(10));

        let run = svc.run(rain_soon(), tokio::time::sleep(Duration::from_millis(150)));
        tokio::time::timeout(Duration::from_millis(400), run)
            .await
            .expect("shutdown waited for the fetch")
            .unwrap();

        assert!(fetches.load(Ordering::SeqCst) >= 1);
        assert!(recorder.states().len() >= 5, "publishing stalled during a fetch");
        let messages = recorder.messages.lock().unwrap().clone();
        assert_eq!(messages.last().unwrap().1, "offline");
    }

    #[tokio::test]
    async fn test_data_mode_never_refreshes() {
        #[derive(Debug)]
        struct Offline(Arc<AtomicUsize>);

        #[async_trait]
        impl ForecastProvider for Offline {
            async fn fetch(&self) -> Result<ForecastSnapshot> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(rain_soon())
            }

            fn is_live(&self) -> bool {
                false
            }
        }

        let fetches = Arc::new(AtomicUsize::new(0));
        let recorder = Arc::new(Recorder::default());
        let svc = service(Offline(fetches.clone()), recorder.clone())
            .with_intervals(Duration::from_millis(5), Duration::from_millis(10));

        svc.run(rain_soon(), tokio::time::sleep(Duration::from_millis(60))).await.unwrap();

        assert_eq!(fetches.load(Ordering::SeqCst), 0);
        assert!(!recorder.states().is_empty());
    }
}
