//! # FarmShield Core
//!
//! Client-side orchestration for the FarmShield dashboard: which panel is
//! showing, where the farm is and what the sky is doing, and how to reach
//! the advisory backend.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  NavigationRouter ── AddressObserver (#fragment history)  │
//! │                                                           │
//! │  ContextualDataCache                                      │
//! │     geolocation ─┬─▶ ReverseGeocoder (Nominatim)          │
//! │                  └─▶ WeatherSource (BackendClient)        │
//! │          │                                                │
//! │          └─watch─▶ ContextHandle (read-only, per view)    │
//! │                                                           │
//! │  BackendClient: /api/recommend /api/weather /api/chat ... │
//! └───────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod geocode;
pub mod locale;
pub mod market;
pub mod navigation;
pub mod weather;

pub use api::{
    BackendClient, CropRecommendation, CropSuggestion, PestDiagnosis, RecommendQuery, Upload,
    CHAT_VOICE_PATH, PEST_QUERY_VOICE_PATH,
};
pub use config::FarmConfig;
pub use context::{
    ContextHandle, ContextSnapshot, ContextualDataCache, Coordinates, FixedGeolocation,
    GeolocationProvider, LocationContext, LocationStatus, Place, ReverseGeocoder,
    WeatherSnapshot, WeatherSource, LOCATION_UNAVAILABLE,
};
pub use error::{Capability, FarmError, FarmResult};
pub use geocode::{NominatimGeocoder, SearchMatch};
pub use locale::{LocaleProvider, TableLocale};
pub use market::{filter_by_commodity, MandiRate, Trend, SUPPORTED_STATES};
pub use navigation::{AddressObserver, MemoryHistory, NavigationRouter, ViewTag};
pub use weather::{DailyForecast, ForecastSeries, WeatherCondition, WeatherReport};
