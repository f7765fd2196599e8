use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::client::{HttpUsageApi, UsageApi};
use crate::core::config::AppConfig;
use crate::core::error::{FetchError, PollError};
use crate::core::models::usage::UsageSnapshot;
use crate::core::notifier;
use crate::core::org::OrgResolver;
use crate::core::parser::parse_usage;
use crate::core::store::{CredentialStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Idle,
    Resolving,
    Fetching,
    Ready,
    Error,
}

impl PollState {
    /// A cycle is in flight; new triggers are coalesced.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Resolving | Self::Fetching)
    }
}

impl std::fmt::Display for PollState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Resolving => write!(f, "resolving"),
            Self::Fetching => write!(f, "fetching"),
            Self::Ready => write!(f, "ready"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// New snapshot committed; `alerts` are the thresholds crossed, ascending.
    Updated { alerts: Vec<u8> },
    Failed(PollError),
    /// Another cycle was already in flight.
    Coalesced,
    /// The credential changed mid-flight and the result was dropped.
    Cancelled,
}

/// Receives the poller's outbound signals. Called after the state lock is released.
pub trait PollObserver: Send + Sync {
    fn on_snapshot_updated(&self, _snapshot: &UsageSnapshot) {}
    fn on_alert(&self, _threshold: u8, _percentage: u8) {}
    fn on_error(&self, _message: &str) {}
    fn on_state_changed(&self, _state: PollState) {}
}

enum Event {
    State(PollState),
    Snapshot(Arc<UsageSnapshot>),
    Alert { threshold: u8, percentage: u8 },
    Error(String),
}

struct Inner {
    state: PollState,
    snapshot: Arc<UsageSnapshot>,
    store: CredentialStore,
    generation: u64,
    cancel: CancellationToken,
}

impl Inner {
    fn transition(&mut self, state: PollState, events: &mut Vec<Event>) {
        if self.state != state {
            debug!("Poll state {} -> {}", self.state, state);
            self.state = state;
            events.push(Event::State(state));
        }
    }

    fn fail(&mut self, err: &PollError, events: &mut Vec<Event>) {
        let message = err.to_string();
        warn!("Poll failed: {}", message);
        self.snapshot = Arc::new(self.snapshot.with_error(message.clone()));
        self.transition(PollState::Error, events);
        events.push(Event::Error(message));
    }

    /// Drop whatever cycle is in flight so its result is never committed.
    fn cancel_in_flight(&mut self, events: &mut Vec<Event>) {
        if self.state.is_busy() {
            debug!("Cancelling in-flight poll");
            self.cancel.cancel();
            self.generation += 1;
            self.transition(PollState::Idle, events);
        }
    }

    fn is_current(&self, generation: u64, token: &CancellationToken) -> bool {
        self.generation == generation && !token.is_cancelled()
    }
}

/// Owns the current snapshot and runs poll cycles one at a time.
pub struct UsagePoller {
    inner: Mutex<Inner>,
    api: Arc<dyn UsageApi>,
    resolver: OrgResolver,
    observers: Vec<Arc<dyn PollObserver>>,
}

impl UsagePoller {
    pub fn new(api: Arc<dyn UsageApi>, resolver: OrgResolver, store: CredentialStore) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: PollState::Idle,
                snapshot: Arc::new(UsageSnapshot::default()),
                store,
                generation: 0,
                cancel: CancellationToken::new(),
            }),
            api,
            resolver,
            observers: Vec::new(),
        }
    }

    /// Poller talking to the real endpoints described by `config`.
    pub fn from_config(config: &AppConfig, store: CredentialStore) -> Result<Self, FetchError> {
        let api = HttpUsageApi::new(config.api.clone(), config.poll.timeout())?;
        Ok(Self::new(
            Arc::new(api),
            OrgResolver::new(config.api.org_cookie_key.clone()),
            store,
        ))
    }

    pub fn with_observer(mut self, observer: Arc<dyn PollObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub async fn snapshot(&self) -> Arc<UsageSnapshot> {
        self.inner.lock().await.snapshot.clone()
    }

    pub async fn state(&self) -> PollState {
        self.inner.lock().await.state
    }

    pub async fn last_notified_threshold(&self) -> u8 {
        let mut inner = self.inner.lock().await;
        inner.store.reload();
        inner.store.load_notified_threshold()
    }

    pub async fn notifications_enabled(&self) -> bool {
        let mut inner = self.inner.lock().await;
        inner.store.reload();
        inner.store.notifications_enabled()
    }

    pub async fn set_credential(&self, credential: &str) -> Result<(), StoreError> {
        let mut events = Vec::new();
        let result = {
            let mut inner = self.inner.lock().await;
            inner.cancel_in_flight(&mut events);
            inner.store.set(credential)
        };
        self.dispatch(events);
        result
    }

    /// Forget the credential, re-arm all thresholds and reset the snapshot to empty.
    pub async fn clear_credential(&self) -> Result<(), StoreError> {
        let mut events = Vec::new();
        let result = {
            let mut inner = self.inner.lock().await;
            inner.cancel_in_flight(&mut events);
            let result = inner.store.clear();
            inner.snapshot = Arc::new(UsageSnapshot::default());
            inner.transition(PollState::Idle, &mut events);
            events.push(Event::Snapshot(inner.snapshot.clone()));
            result
        };
        self.dispatch(events);
        result
    }

    pub async fn set_notifications_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .store
            .set_notifications_enabled(enabled)
    }

    /// Run one poll cycle unless one is already in flight.
    pub async fn poll_now(&self) -> PollOutcome {
        let mut events = Vec::new();
        let started = {
            let mut inner = self.inner.lock().await;
            if inner.state.is_busy() {
                debug!("Poll already in flight, coalescing trigger");
                None
            } else {
                inner.store.reload();
                let credential = inner.store.get().map(str::to_string);
                match credential {
                    Some(credential) => {
                        inner.generation += 1;
                        inner.cancel = CancellationToken::new();
                        inner.transition(PollState::Resolving, &mut events);
                        Some(Ok((credential, inner.generation, inner.cancel.clone())))
                    }
                    None => {
                        let err = PollError::CredentialMissing;
                        inner.fail(&err, &mut events);
                        Some(Err(err))
                    }
                }
            }
        };
        self.dispatch(events);

        let (credential, generation, token) = match started {
            None => return PollOutcome::Coalesced,
            Some(Err(err)) => return PollOutcome::Failed(err),
            Some(Ok(started)) => started,
        };

        let resolved = tokio::select! {
            _ = token.cancelled() => return PollOutcome::Cancelled,
            resolved = self.resolver.resolve(&credential, self.api.as_ref()) => resolved,
        };
        let org_id = match resolved {
            Ok(org_id) => org_id,
            Err(err) => {
                return self
                    .finish(generation, &token, Err(PollError::from(err)))
                    .await
            }
        };

        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock().await;
            if !inner.is_current(generation, &token) {
                return PollOutcome::Cancelled;
            }
            inner.transition(PollState::Fetching, &mut events);
        }
        self.dispatch(events);

        let fetched = tokio::select! {
            _ = token.cancelled() => return PollOutcome::Cancelled,
            fetched = self.api.fetch_usage(&org_id, &credential) => fetched,
        };
        self.finish(generation, &token, fetched.map_err(PollError::from))
            .await
    }

    async fn finish(
        &self,
        generation: u64,
        token: &CancellationToken,
        result: Result<String, PollError>,
    ) -> PollOutcome {
        let mut events = Vec::new();
        let outcome = {
            let mut inner = self.inner.lock().await;
            if !inner.is_current(generation, token) {
                debug!("Discarding result of cancelled poll");
                return PollOutcome::Cancelled;
            }

            match result.and_then(|body| parse_usage(&body, &inner.snapshot, Utc::now())) {
                Ok(snapshot) => {
                    let snapshot = Arc::new(snapshot);
                    inner.snapshot = snapshot.clone();
                    inner.transition(PollState::Ready, &mut events);
                    events.push(Event::Snapshot(snapshot.clone()));

                    let alerts = Self::check_thresholds(&mut inner, &snapshot, &mut events);
                    PollOutcome::Updated { alerts }
                }
                Err(err) => {
                    inner.fail(&err, &mut events);
                    PollOutcome::Failed(err)
                }
            }
        };
        self.dispatch(events);
        outcome
    }

    fn check_thresholds(
        inner: &mut Inner,
        snapshot: &UsageSnapshot,
        events: &mut Vec<Event>,
    ) -> Vec<u8> {
        inner.store.reload();
        let percentage = snapshot.session.percent();
        let last = inner.store.load_notified_threshold();
        debug!(
            "Checking notifications: percentage={}%, enabled={}, lastNotified={}%",
            percentage,
            inner.store.notifications_enabled(),
            last
        );
        if !inner.store.notifications_enabled() {
            return Vec::new();
        }

        let decision = notifier::evaluate(percentage, last);
        if let Err(e) = inner.store.save_notified_threshold(decision.last_notified) {
            warn!("Failed to persist notified threshold: {}", e);
        }
        for threshold in &decision.alerts {
            info!("Alert for {}% threshold at {}%", threshold, percentage);
            events.push(Event::Alert {
                threshold: *threshold,
                percentage,
            });
        }
        decision.alerts
    }

    fn dispatch(&self, events: Vec<Event>) {
        for event in events {
            for observer in &self.observers {
                match &event {
                    Event::State(state) => observer.on_state_changed(*state),
                    Event::Snapshot(snapshot) => observer.on_snapshot_updated(snapshot),
                    Event::Alert {
                        threshold,
                        percentage,
                    } => observer.on_alert(*threshold, *percentage),
                    Event::Error(message) => observer.on_error(message),
                }
            }
        }
    }

    /// Poll on a fixed schedule until `shutdown` fires.
    ///
    /// The first tick is immediate. Each tick spawns its own cycle, so a slow
    /// fetch never pushes back the next tick; overlapping ticks are coalesced.
    pub async fn run(self: Arc<Self>, period: Duration, shutdown: CancellationToken) {
        info!("Poller starting, interval {}s", period.as_secs());
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let poller = Arc::clone(&self);
                    tokio::spawn(async move {
                        poller.poll_now().await;
                    });
                }
                _ = shutdown.cancelled() => {
                    let mut events = Vec::new();
                    self.inner.lock().await.cancel_in_flight(&mut events);
                    self.dispatch(events);
                    info!("Poller stopped");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct FakeApi {
        bootstrap: Result<String, FetchError>,
        usage: std::sync::Mutex<Result<String, FetchError>>,
        usage_calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl FakeApi {
        fn with_usage(body: &str) -> Self {
            Self {
                bootstrap: Ok(r#"{"account":{"lastActiveOrgId":"org-boot"}}"#.to_string()),
                usage: std::sync::Mutex::new(Ok(body.to_string())),
                usage_calls: AtomicUsize::new(0),
                gate: None,
            }
        }

        fn gated(body: &str, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::with_usage(body)
            }
        }

        fn set_usage(&self, usage: Result<&str, FetchError>) {
            *self.usage.lock().unwrap() = usage.map(str::to_string);
        }
    }

    #[async_trait]
    impl UsageApi for FakeApi {
        async fn fetch_bootstrap(&self, _credential: &str) -> Result<String, FetchError> {
            self.bootstrap.clone()
        }

        async fn fetch_usage(&self, _org_id: &str, _credential: &str) -> Result<String, FetchError> {
            self.usage_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let usage = self.usage.lock().unwrap().clone();
            usage
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: std::sync::Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn alerts(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter(|e| e.starts_with("alert"))
                .collect()
        }
    }

    impl PollObserver for Recorder {
        fn on_snapshot_updated(&self, snapshot: &UsageSnapshot) {
            self.events
                .lock()
                .unwrap()
                .push(format!("snapshot {}", snapshot.session.used_units));
        }

        fn on_alert(&self, threshold: u8, percentage: u8) {
            self.events
                .lock()
                .unwrap()
                .push(format!("alert {} {}", threshold, percentage));
        }

        fn on_error(&self, message: &str) {
            self.events.lock().unwrap().push(format!("error {}", message));
        }

        fn on_state_changed(&self, state: PollState) {
            self.events.lock().unwrap().push(format!("state {}", state));
        }
    }

    const COOKIE: &str = "sessionKey=sk-ant-1; lastActiveOrg=org-1";

    fn setup(
        api: Arc<FakeApi>,
        credential: Option<&str>,
    ) -> (tempfile::TempDir, Arc<Recorder>, Arc<UsagePoller>) {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CredentialStore::open(dir.path().join("state.json"));
        if let Some(credential) = credential {
            store.set(credential).unwrap();
        }
        let recorder = Arc::new(Recorder::default());
        let poller = UsagePoller::new(api, OrgResolver::new("lastActiveOrg"), store)
            .with_observer(recorder.clone());
        (dir, recorder, Arc::new(poller))
    }

    async fn wait_for_state(poller: &UsagePoller, state: PollState) {
        for _ in 0..1000 {
            if poller.state().await == state {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("poller never reached {}", state);
    }

    #[tokio::test]
    async fn missing_credential_fails_fast() {
        let api = Arc::new(FakeApi::with_usage("{}"));
        let (_dir, recorder, poller) = setup(api.clone(), None);
        let before = poller.snapshot().await;

        let outcome = poller.poll_now().await;
        assert_eq!(outcome, PollOutcome::Failed(PollError::CredentialMissing));
        assert_eq!(poller.state().await, PollState::Error);

        let after = poller.snapshot().await;
        assert_eq!(after.last_error.as_deref(), Some("Session cookie not set"));
        assert_eq!(after.session, before.session);
        assert!(!after.has_data());
        assert_eq!(api.usage_calls.load(Ordering::SeqCst), 0);
        assert!(recorder
            .events()
            .contains(&"error Session cookie not set".to_string()));
    }

    #[tokio::test]
    async fn successful_poll_updates_snapshot_and_alerts() {
        let api = Arc::new(FakeApi::with_usage(
            r#"{"five_hour":{"utilization":76.4,"resets_at":"2026-01-31T07:59:00.000Z"}}"#,
        ));
        let (_dir, recorder, poller) = setup(api, Some(COOKIE));

        let outcome = poller.poll_now().await;
        assert_eq!(outcome, PollOutcome::Updated { alerts: vec![25, 50, 75] });
        assert_eq!(poller.state().await, PollState::Ready);
        assert_eq!(poller.snapshot().await.session.used_units, 76);
        assert_eq!(poller.last_notified_threshold().await, 75);
        assert_eq!(
            recorder.events(),
            vec![
                "state resolving",
                "state fetching",
                "state ready",
                "snapshot 76",
                "alert 25 76",
                "alert 50 76",
                "alert 75 76",
            ]
        );
    }

    #[tokio::test]
    async fn drop_then_rise_fires_again() {
        let api = Arc::new(FakeApi::with_usage(r#"{"five_hour":{"utilization":80}}"#));
        let (_dir, recorder, poller) = setup(api.clone(), Some(COOKIE));

        poller.poll_now().await;
        api.set_usage(Ok(r#"{"five_hour":{"utilization":40}}"#));
        assert_eq!(poller.poll_now().await, PollOutcome::Updated { alerts: vec![] });
        assert_eq!(poller.last_notified_threshold().await, 25);

        api.set_usage(Ok(r#"{"five_hour":{"utilization":60}}"#));
        assert_eq!(poller.poll_now().await, PollOutcome::Updated { alerts: vec![50] });
        assert_eq!(recorder.alerts().len(), 4);
    }

    #[tokio::test]
    async fn http_error_keeps_last_snapshot() {
        let api = Arc::new(FakeApi::with_usage(r#"{"five_hour":{"utilization":30}}"#));
        let (_dir, _recorder, poller) = setup(api.clone(), Some(COOKIE));
        poller.poll_now().await;

        api.set_usage(Err(FetchError::HttpStatus(500)));
        let outcome = poller.poll_now().await;
        assert_eq!(outcome, PollOutcome::Failed(PollError::HttpStatus(500)));
        assert_eq!(poller.state().await, PollState::Error);
        let snapshot = poller.snapshot().await;
        assert_eq!(snapshot.session.used_units, 30);
        assert_eq!(snapshot.last_error.as_deref(), Some("HTTP 500"));

        // Errors are not terminal.
        api.set_usage(Ok(r#"{"five_hour":{"utilization":31}}"#));
        assert!(matches!(poller.poll_now().await, PollOutcome::Updated { .. }));
        assert!(poller.snapshot().await.last_error.is_none());
    }

    #[tokio::test]
    async fn unparseable_body_is_a_failure() {
        let api = Arc::new(FakeApi::with_usage("[]"));
        let (_dir, _recorder, poller) = setup(api, Some(COOKIE));
        let outcome = poller.poll_now().await;
        assert!(matches!(outcome, PollOutcome::Failed(PollError::BodyParse(_))));
        assert!(!poller.snapshot().await.has_data());
    }

    #[tokio::test]
    async fn unresolved_org_skips_usage_fetch() {
        let api = Arc::new(FakeApi {
            bootstrap: Err(FetchError::HttpStatus(401)),
            ..FakeApi::with_usage("{}")
        });
        let (_dir, _recorder, poller) = setup(api.clone(), Some("sk-ant-bare"));
        let outcome = poller.poll_now().await;
        assert!(matches!(
            outcome,
            PollOutcome::Failed(PollError::OrganizationUnresolved(_))
        ));
        assert_eq!(api.usage_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            poller.snapshot().await.last_error.as_deref(),
            Some("Could not get org ID from cookie")
        );
    }

    #[tokio::test]
    async fn disabled_notifications_leave_threshold_alone() {
        let api = Arc::new(FakeApi::with_usage(r#"{"five_hour":{"utilization":95}}"#));
        let (_dir, recorder, poller) = setup(api, Some(COOKIE));
        poller.set_notifications_enabled(false).await.unwrap();

        assert_eq!(poller.poll_now().await, PollOutcome::Updated { alerts: vec![] });
        assert_eq!(poller.last_notified_threshold().await, 0);
        assert!(recorder.alerts().is_empty());
    }

    #[tokio::test]
    async fn settings_written_by_another_process_are_picked_up() {
        let api = Arc::new(FakeApi::with_usage(r#"{"five_hour":{"utilization":95}}"#));
        let (dir, recorder, poller) = setup(api, None);

        let mut other = CredentialStore::open(dir.path().join("state.json"));
        other.set(COOKIE).unwrap();
        other.set_notifications_enabled(false).unwrap();

        assert_eq!(poller.poll_now().await, PollOutcome::Updated { alerts: vec![] });
        assert!(recorder.alerts().is_empty());
        assert!(!CredentialStore::open(dir.path().join("state.json")).notifications_enabled());
    }

    #[tokio::test]
    async fn concurrent_poll_is_coalesced() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(FakeApi::gated(r#"{"five_hour":{"utilization":10}}"#, gate.clone()));
        let (_dir, _recorder, poller) = setup(api.clone(), Some(COOKIE));

        let first = tokio::spawn({
            let poller = poller.clone();
            async move { poller.poll_now().await }
        });
        wait_for_state(&poller, PollState::Fetching).await;

        assert_eq!(poller.poll_now().await, PollOutcome::Coalesced);

        gate.notify_one();
        let outcome = first.await.unwrap();
        assert!(matches!(outcome, PollOutcome::Updated { .. }));
        assert_eq!(api.usage_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clearing_mid_flight_discards_result() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(FakeApi::gated(r#"{"five_hour":{"utilization":90}}"#, gate.clone()));
        let (_dir, recorder, poller) = setup(api, Some(COOKIE));

        let in_flight = tokio::spawn({
            let poller = poller.clone();
            async move { poller.poll_now().await }
        });
        wait_for_state(&poller, PollState::Fetching).await;

        poller.clear_credential().await.unwrap();
        gate.notify_one();

        assert_eq!(in_flight.await.unwrap(), PollOutcome::Cancelled);
        assert_eq!(poller.state().await, PollState::Idle);
        assert!(!poller.snapshot().await.has_data());
        assert_eq!(poller.last_notified_threshold().await, 0);
        assert!(recorder.alerts().is_empty());
    }

    #[tokio::test]
    async fn new_credential_mid_flight_discards_result() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(FakeApi::gated(r#"{"five_hour":{"utilization":50}}"#, gate.clone()));
        let (_dir, _recorder, poller) = setup(api, Some(COOKIE));

        let in_flight = tokio::spawn({
            let poller = poller.clone();
            async move { poller.poll_now().await }
        });
        wait_for_state(&poller, PollState::Fetching).await;

        poller
            .set_credential("sessionKey=sk-ant-2; lastActiveOrg=org-2")
            .await
            .unwrap();
        gate.notify_one();

        assert_eq!(in_flight.await.unwrap(), PollOutcome::Cancelled);
        assert_eq!(poller.snapshot().await.session.used_units, 0);
    }

    #[tokio::test]
    async fn clear_resets_snapshot_and_threshold() {
        let api = Arc::new(FakeApi::with_usage(r#"{"five_hour":{"utilization":55}}"#));
        let (_dir, recorder, poller) = setup(api, Some(COOKIE));
        poller.poll_now().await;
        assert_eq!(poller.last_notified_threshold().await, 50);

        poller.clear_credential().await.unwrap();
        assert_eq!(poller.last_notified_threshold().await, 0);
        assert_eq!(*poller.snapshot().await, UsageSnapshot::default());
        assert_eq!(recorder.events().last().map(String::as_str), Some("snapshot 0"));
        assert_eq!(
            poller.poll_now().await,
            PollOutcome::Failed(PollError::CredentialMissing)
        );
    }

    #[tokio::test]
    async fn run_polls_immediately_and_stops_on_shutdown() {
        let api = Arc::new(FakeApi::with_usage(r#"{"five_hour":{"utilization":5}}"#));
        let (_dir, _recorder, poller) = setup(api.clone(), Some(COOKIE));
        let shutdown = CancellationToken::new();

        let runner = tokio::spawn(poller.clone().run(Duration::from_secs(3600), shutdown.clone()));
        wait_for_state(&poller, PollState::Ready).await;
        shutdown.cancel();
        runner.await.unwrap();

        assert_eq!(api.usage_calls.load(Ordering::SeqCst), 1);
        assert_eq!(poller.snapshot().await.session.used_units, 5);
    }
}
