//! Session-wide location and weather context.
//!
//! One [`ContextualDataCache`] per session runs the chain
//! geolocation → (reverse geocode ‖ weather fetch) at most once and publishes
//! the result as a [`ContextSnapshot`]. Views never mutate it; they hold a
//! read-only [`ContextHandle`].
//!
//! ```text
//!   ensure_loaded()
//!        │
//!        ▼
//!   geolocation ──unsupported──▶ status=unavailable, loading=false
//!        │ ───────denied──────▶ status=denied, loading=false (no weather)
//!        ▼ coords
//!   ┌────────────────────┬─────────────────────┐
//!   │ reverse geocode    │ weather (once)      │
//!   │ fail → placeholder │ fail → code=none    │
//!   └────────────────────┴─────────────────────┘
//! ```

use crate::error::{Capability, FarmError, FarmResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Label shown when coordinates are known but could not be named.
pub const LOCATION_UNAVAILABLE: &str = "Location Unavailable";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A named place returned by reverse geocoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Human-readable label, e.g. "Kothri Kalan, Madhya Pradesh".
    pub name: String,
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LocationStatus {
    Detecting,
    Resolved {
        name: String,
        region: Option<String>,
    },
    Denied,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationContext {
    pub status: LocationStatus,
    pub coordinates: Option<Coordinates>,
}

impl LocationContext {
    fn detecting() -> Self {
        Self {
            status: LocationStatus::Detecting,
            coordinates: None,
        }
    }

    /// Display name when resolved.
    pub fn name(&self) -> Option<&str> {
        match &self.status {
            LocationStatus::Resolved { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self.status, LocationStatus::Detecting)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    /// WMO weather code.
    pub code: Option<i32>,
    pub loading: bool,
    /// Set once a fetch has completed successfully or failed terminally.
    pub fetched: bool,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl WeatherSnapshot {
    fn pending() -> Self {
        Self {
            code: None,
            loading: true,
            fetched: false,
            fetched_at: None,
        }
    }
}

/// What every view reads: location and weather together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub location: LocationContext,
    pub weather: WeatherSnapshot,
}

impl Default for ContextSnapshot {
    fn default() -> Self {
        Self {
            location: LocationContext::detecting(),
            weather: WeatherSnapshot::pending(),
        }
    }
}

impl ContextSnapshot {
    /// True once the chain can make no further progress this session.
    pub fn is_settled(&self) -> bool {
        self.location.is_settled() && !self.weather.loading
    }
}

/// Device position source. Fails with `PermissionDenied` or `Unsupported`.
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn current_position(&self) -> FarmResult<Coordinates>;
}

#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, coordinates: Coordinates) -> FarmResult<Place>;
}

/// Source of the current WMO weather code for a position.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn weather_code(&self, coordinates: Coordinates) -> FarmResult<i32>;
}

/// Geolocation for hosts without a sensor: a configured position, or none.
#[derive(Debug, Clone, Default)]
pub struct FixedGeolocation {
    position: Option<Coordinates>,
}

impl FixedGeolocation {
    pub fn new(position: Option<Coordinates>) -> Self {
        Self { position }
    }
}

#[async_trait]
impl GeolocationProvider for FixedGeolocation {
    async fn current_position(&self) -> FarmResult<Coordinates> {
        self.position
            .ok_or(FarmError::Unsupported(Capability::Geolocation))
    }
}

/// Owner of the session's location/weather snapshot.
pub struct ContextualDataCache {
    geolocation: Arc<dyn GeolocationProvider>,
    geocoder: Arc<dyn ReverseGeocoder>,
    weather: Arc<dyn WeatherSource>,
    state: watch::Sender<ContextSnapshot>,
    started: AtomicBool,
    weather_requested: AtomicBool,
    weather_calls: AtomicUsize,
}

impl ContextualDataCache {
    pub fn new(
        geolocation: Arc<dyn GeolocationProvider>,
        geocoder: Arc<dyn ReverseGeocoder>,
        weather: Arc<dyn WeatherSource>,
    ) -> Self {
        let (state, _) = watch::channel(ContextSnapshot::default());
        Self {
            geolocation,
            geocoder,
            weather,
            state,
            started: AtomicBool::new(false),
            weather_requested: AtomicBool::new(false),
            weather_calls: AtomicUsize::new(0),
        }
    }

    /// Read-only handle for a view.
    pub fn handle(&self) -> ContextHandle {
        ContextHandle {
            rx: self.state.subscribe(),
        }
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        self.state.borrow().clone()
    }

    /// Number of weather requests issued so far (never more than one).
    pub fn weather_requests(&self) -> usize {
        self.weather_calls.load(Ordering::SeqCst)
    }

    /// Run the geolocation → geocode/weather chain if it has not run yet.
    ///
    /// Callers arriving while the chain is in flight, or after it finished,
    /// return immediately and read the snapshot instead. Nothing is queued.
    /// The chain runs on its own task, so dropping this future does not
    /// cancel it.
    pub async fn ensure_loaded(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!(target: "farmshield::context", "context chain already started, reading snapshot");
            return;
        }

        let cache = Arc::clone(self);
        if let Err(e) = tokio::spawn(async move { cache.load_chain().await }).await {
            warn!(target: "farmshield::context", error = %e, "context chain task failed");
        }
    }

    async fn load_chain(&self) {
        let coordinates = match self.geolocation.current_position().await {
            Ok(c) => c,
            Err(FarmError::PermissionDenied(_)) => {
                warn!(target: "farmshield::context", "geolocation permission denied, skipping weather");
                self.settle_location(LocationStatus::Denied, None);
                return;
            }
            Err(e) => {
                warn!(target: "farmshield::context", error = %e, "geolocation unavailable");
                self.settle_location(LocationStatus::Unavailable, None);
                return;
            }
        };

        info!(
            target: "farmshield::context",
            lat = coordinates.latitude,
            lon = coordinates.longitude,
            "📍 position acquired"
        );
        self.state.send_modify(|s| s.location.coordinates = Some(coordinates));

        tokio::join!(
            self.resolve_place(coordinates),
            self.fetch_weather_once(coordinates)
        );
    }

    async fn resolve_place(&self, coordinates: Coordinates) {
        let status = match self.geocoder.reverse(coordinates).await {
            Ok(place) if !place.name.trim().is_empty() => {
                info!(target: "farmshield::context", place = %place.name, "location resolved");
                LocationStatus::Resolved {
                    name: place.name,
                    region: place.region,
                }
            }
            Ok(_) => {
                warn!(target: "farmshield::context", "geocoder returned an empty name");
                Self::placeholder_status()
            }
            Err(e) => {
                warn!(target: "farmshield::context", error = %e, "reverse geocoding failed");
                Self::placeholder_status()
            }
        };
        self.state.send_modify(|s| s.location.status = status);
    }

    async fn fetch_weather_once(&self, coordinates: Coordinates) {
        if self.state.borrow().weather.fetched
            || self.weather_requested.swap(true, Ordering::SeqCst)
        {
            debug!(target: "farmshield::context", "weather already requested this session");
            return;
        }
        self.weather_calls.fetch_add(1, Ordering::SeqCst);

        match self.weather.weather_code(coordinates).await {
            Ok(code) => {
                info!(target: "farmshield::context", code, "🌦️ weather fetched");
                self.state.send_modify(|s| {
                    s.weather = WeatherSnapshot {
                        code: Some(code),
                        loading: false,
                        fetched: true,
                        fetched_at: Some(Utc::now()),
                    };
                });
            }
            Err(e) => {
                let terminal = !e.is_retryable();
                warn!(target: "farmshield::context", error = %e, terminal, "weather fetch failed");
                self.state.send_modify(|s| {
                    s.weather.code = None;
                    s.weather.loading = false;
                    s.weather.fetched = terminal;
                    if terminal {
                        s.weather.fetched_at = Some(Utc::now());
                    }
                });
            }
        }
    }

    fn settle_location(&self, status: LocationStatus, coordinates: Option<Coordinates>) {
        self.state.send_modify(|s| {
            s.location = LocationContext {
                status,
                coordinates,
            };
            s.weather.loading = false;
        });
    }

    fn placeholder_status() -> LocationStatus {
        LocationStatus::Resolved {
            name: LOCATION_UNAVAILABLE.to_string(),
            region: None,
        }
    }
}

/// Read-only view of the cache.
#[derive(Debug, Clone)]
pub struct ContextHandle {
    rx: watch::Receiver<ContextSnapshot>,
}

impl ContextHandle {
    pub fn snapshot(&self) -> ContextSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next change. Returns `None` once the cache is gone.
    pub async fn changed(&mut self) -> Option<ContextSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until location and weather have both settled.
    pub async fn settled(&mut self) -> ContextSnapshot {
        loop {
            let current = self.rx.borrow_and_update().clone();
            if current.is_settled() {
                return current;
            }
            if self.rx.changed().await.is_err() {
                return self.rx.borrow().clone();
            }
        }
    }
}
