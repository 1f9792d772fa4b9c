//! Polling loop.
//!
//! Each tick runs, in order:
//! 1. re-authentication and device lookup, when the auth interval has elapsed
//!    or no credential is held;
//! 2. discovery and the periodic (aggregate) fetch, when the aggregate
//!    interval has elapsed;
//! 3. the live fetch.
//!
//! A failed login does not move `last_auth_at`, so the next tick retries.
//! The aggregate timestamp moves whenever the fetch was attempted, even if
//! it failed or returned nothing usable.

use crate::config::Config;
use crate::discovery::{state_topic, DiscoveryAnnouncer, DiscoverySettings};
use crate::error::FetchError;
use crate::extract::{AggregateSample, CadenceKind, Category, ReadingSample};
use crate::geohome_api::GeoApi;
use crate::publisher::Publisher;
use crate::session::{is_due, DeviceIdentity, SessionManager};
use crate::units::{gas_volume_to_energy, scale_tariff};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub auth_interval: Duration,
    pub aggregate_interval: Duration,
    pub live_interval: Duration,
    pub topic_root: String,
    pub calorific_value: f64,
    pub tariff_scale: f64,
    pub discovery: DiscoverySettings,
}

impl From<&Config> for SchedulerSettings {
    fn from(config: &Config) -> Self {
        Self {
            auth_interval: config.auth_interval,
            aggregate_interval: config.aggregate_interval,
            live_interval: config.live_interval,
            topic_root: config.topic_root.clone(),
            calorific_value: config.calorific_value,
            tariff_scale: config.tariff_scale,
            discovery: DiscoverySettings {
                enabled: config.discovery,
                persist: config.discovery_persist,
            },
        }
    }
}

/// Mutable scheduling state. Unset timestamps are due on the first tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollState {
    pub last_auth_at: Option<Instant>,
    pub last_aggregate_at: Option<Instant>,
    pub discovery_sent: bool,
}

impl PollState {
    // Timestamps never move backwards
    fn mark_auth(&mut self, now: Instant) {
        self.last_auth_at = Some(self.last_auth_at.map_or(now, |last| last.max(now)));
    }

    fn mark_aggregate(&mut self, now: Instant) {
        self.last_aggregate_at = Some(self.last_aggregate_at.map_or(now, |last| last.max(now)));
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub auth_attempted: bool,
    pub auth_succeeded: bool,
    pub aggregate_ran: bool,
    pub discovery_published: usize,
    pub values_published: usize,
}

pub struct RefreshScheduler<A, P> {
    api: A,
    publisher: P,
    session: SessionManager,
    announcer: DiscoveryAnnouncer,
    settings: SchedulerSettings,
    state: PollState,
}

impl<A: GeoApi, P: Publisher> RefreshScheduler<A, P> {
    pub fn new(api: A, publisher: P, session: SessionManager, settings: SchedulerSettings) -> Self {
        let announcer = DiscoveryAnnouncer::new(settings.discovery, &settings.topic_root);
        Self {
            api,
            publisher,
            session,
            announcer,
            settings,
            state: PollState::default(),
        }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Polls forever, sleeping `live_interval` between ticks.
    pub async fn run(mut self) {
        info!(
            "Polling live data every {:?}, periodic data every {:?}, re-authenticating every {:?}",
            self.settings.live_interval, self.settings.aggregate_interval, self.settings.auth_interval
        );
        loop {
            let summary = self.tick(Instant::now()).await;
            debug!("Tick finished: {summary:?}");
            sleep(self.settings.live_interval).await;
        }
    }

    /// Runs one polling cycle as of `now`.
    pub async fn tick(&mut self, now: Instant) -> TickSummary {
        let mut summary = TickSummary::default();

        if self
            .session
            .is_auth_due(now, self.state.last_auth_at, self.settings.auth_interval)
        {
            summary.auth_attempted = true;
            match self.session.refresh(&self.api, now).await {
                Ok(_) => {
                    self.state.mark_auth(now);
                    summary.auth_succeeded = true;
                }
                Err(e) => warn!("{e}; retrying on next tick"),
            }
        }

        let Some((credential, device)) = self.session.active() else {
            warn!("No authenticated session, skipping data fetch");
            return summary;
        };
        let token = credential.token().to_string();
        let device = device.clone();

        if is_due(now, self.state.last_aggregate_at, self.settings.aggregate_interval) {
            summary.aggregate_ran = true;
            summary.discovery_published = self
                .announcer
                .announce_if_needed(&mut self.state.discovery_sent, &device, &self.publisher)
                .await;
            summary.values_published += self.refresh_aggregate(&token, &device).await;
            self.state.mark_aggregate(now);
        }

        summary.values_published += self.refresh_live(&token, &device).await;
        summary
    }

    async fn refresh_aggregate(&mut self, token: &str, device: &DeviceIdentity) -> usize {
        let periodic = match self.api.periodic_data(token, &device.device_id).await {
            Ok(periodic) => periodic,
            Err(e) => {
                self.fetch_failed("periodic", FetchError::from(e));
                return 0;
            }
        };

        let mut published = 0;
        for category in Category::ALL {
            let sample = AggregateSample::from_readings(
                &periodic.total_consumption_list,
                &periodic.active_tariff_list,
                category,
            );
            let total = match category {
                Category::Electricity => sample.total_consumption,
                Category::Gas => sample
                    .total_consumption
                    .map(|m3| gas_volume_to_energy(m3, self.settings.calorific_value)),
            };
            let tariff = sample
                .tariff_price_per_unit
                .map(|price| scale_tariff(price, self.settings.tariff_scale));

            published += self
                .publish_value(device, CadenceKind::TotalConsumption, category, total)
                .await as usize;
            published += self
                .publish_value(device, CadenceKind::ActiveTariff, category, tariff)
                .await as usize;
        }
        published
    }

    async fn refresh_live(&mut self, token: &str, device: &DeviceIdentity) -> usize {
        let live = match self.api.live_data(token, &device.device_id).await {
            Ok(live) => live,
            Err(e) => {
                self.fetch_failed("live", FetchError::from(e));
                return 0;
            }
        };

        let mut published = 0;
        for category in Category::ALL {
            let sample = ReadingSample::from_readings(&live.power, category);
            published += self
                .publish_value(device, CadenceKind::Live, category, sample.instant_value_watts)
                .await as usize;
        }
        published
    }

    fn fetch_failed(&mut self, what: &str, error: FetchError) {
        warn!("No {what} data this cycle: {error}");
        if error.is_unauthorized() {
            self.session.invalidate();
        }
    }

    /// Publishes `value` if present. Returns whether a message went out.
    async fn publish_value(
        &self,
        device: &DeviceIdentity,
        cadence: CadenceKind,
        category: Category,
        value: Option<f64>,
    ) -> bool {
        let Some(value) = value else {
            debug!("No {cadence} {category} reading");
            return false;
        };

        let topic = state_topic(&self.settings.topic_root, &device.device_id, cadence, category);
        let payload = value.to_string();
        match self.publisher.publish(&topic, payload.as_bytes(), false).await {
            Ok(()) => {
                debug!("{topic} = {payload}");
                true
            }
            Err(e) => {
                warn!("Publish to {topic} failed: {e}");
                false
            }
        }
    }
}
