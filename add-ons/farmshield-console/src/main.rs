//! FarmShield terminal console.
//!
//! Drives the dashboard core from stdin: hash navigation with back/forward,
//! the shared location/weather context, the backend endpoints, and the two
//! voice assistants. Pass a fragment (e.g. `#mandi`) to deep-link on start.

use anyhow::Context;
use farmshield_core::{
    filter_by_commodity, AddressObserver, BackendClient, ContextHandle, ContextSnapshot,
    ContextualDataCache, FarmConfig, FixedGeolocation, LocaleProvider, LocationStatus, MandiRate,
    MemoryHistory, NavigationRouter, NominatimGeocoder, RecommendQuery, TableLocale, Upload,
    ViewTag, WeatherCondition, WeatherReport,
};
use farmshield_voice::{
    HttpVoiceBackend, LanguagePolicy, Microphone, Phase, Playback, SpeechSynthesizer,
    VoiceEvent, VoiceFeature, VoiceSession,
};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOCALE_TABLES: &str = include_str!("../locales.toml");

const HELP: &str = "\
commands:
  go <view>            dashboard | crops | pest | bot | mandi | weather | anything else
  back | forward       walk the history
  where                current view, location, and weather
  weather              full report for the detected location
  city <name>          weather for a named place
  recommend [place]    crop advice for the detected location or a named place
  ask <message>        chat with Sahayak
  pest-ask <question>  describe a pest problem in text
  scan <image>         diagnose a leaf photo
  mandi [state]        market rates (default state from config)
  find <commodity>     filter the last mandi rates
  record chat|pest     start a voice question
  stop chat|pest       finish recording and send it
  speak chat|pest      read the last answer aloud (again to stop)
  lang <code>          switch UI language (en, hi)
  quit";

#[cfg(feature = "native-audio")]
fn audio_devices() -> (Arc<dyn Microphone>, Arc<dyn SpeechSynthesizer>) {
    use farmshield_voice::{CpalMicrophone, HttpTts, PlaceholderSpeech, SinkSpeech};

    let speech: Arc<dyn SpeechSynthesizer> =
        match HttpTts::from_env().and_then(|tts| SinkSpeech::new(Arc::new(tts))) {
            Ok(sink) => Arc::new(sink),
            Err(e) => {
                tracing::warn!(error = %e, "speech output disabled");
                Arc::new(PlaceholderSpeech)
            }
        };
    (Arc::new(CpalMicrophone), speech)
}

#[cfg(not(feature = "native-audio"))]
fn audio_devices() -> (Arc<dyn Microphone>, Arc<dyn SpeechSynthesizer>) {
    use farmshield_voice::{PlaceholderSpeech, UnavailableMicrophone};

    (Arc::new(UnavailableMicrophone), Arc::new(PlaceholderSpeech))
}

fn log_voice_events(name: &'static str, mut events: mpsc::UnboundedReceiver<VoiceEvent>) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::debug!(target: "farmshield::console", session = name, ?event, "voice event");
        }
    });
}

struct Console {
    config: FarmConfig,
    locale: TableLocale,
    backend: BackendClient,
    geocoder: Arc<NominatimGeocoder>,
    cache: Arc<ContextualDataCache>,
    context: ContextHandle,
    history: Arc<MemoryHistory>,
    router: NavigationRouter<Arc<MemoryHistory>>,
    chat: VoiceSession,
    pest: VoiceSession,
    last_rates: Vec<MandiRate>,
}

impl Console {
    fn view_title(&self, view: &ViewTag) -> String {
        if view.is_placeholder() {
            format!("{} ({})", self.locale.text("nav.coming_soon"), view)
        } else {
            self.locale.text(&format!("nav.{}", view))
        }
    }

    fn context_line(&self, snap: &ContextSnapshot) -> String {
        let location = match &snap.location.status {
            LocationStatus::Detecting => self.locale.text("location.detecting"),
            LocationStatus::Resolved { name, .. } => name.clone(),
            LocationStatus::Denied => self.locale.text("location.denied"),
            LocationStatus::Unavailable => self.locale.text("location.unavailable"),
        };
        let weather = match (snap.weather.loading, snap.weather.code) {
            (true, _) => self.locale.text("weather.loading"),
            (false, Some(code)) => self.locale.text(WeatherCondition::from_wmo(code).label_key()),
            (false, None) => self.locale.text("weather.unknown"),
        };
        format!("📍 {}  |  🌦️ {}", location, weather)
    }

    fn render(&self) {
        let view = self.router.active_view();
        println!("== {} ==  (#{})", self.view_title(view), self.history.current_fragment());
        if matches!(view, ViewTag::Dashboard | ViewTag::Weather) {
            println!("{}", self.context_line(&self.context.snapshot()));
        }
    }

    /// Reset whatever voice session the view we just left owned.
    fn left_view(&mut self, previous: &ViewTag) {
        if previous == self.router.active_view() {
            return;
        }
        match previous {
            ViewTag::Bot => self.chat.close(),
            ViewTag::Pest => self.pest.close(),
            _ => {}
        }
    }

    fn session(&mut self, which: &str) -> anyhow::Result<&mut VoiceSession> {
        match which {
            "chat" => Ok(&mut self.chat),
            "pest" => Ok(&mut self.pest),
            other => anyhow::bail!("unknown voice assistant `{}` (chat or pest)", other),
        }
    }

    /// Returns `false` when the user asked to quit.
    async fn handle(&mut self, line: &str) -> anyhow::Result<bool> {
        let line = line.trim();
        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((c, rest)) => (c, rest.trim()),
            None => (line, ""),
        };

        match command {
            "" => {}
            "help" | "?" => println!("{}", HELP),
            "quit" | "exit" => return Ok(false),
            "go" => {
                let previous = self.router.active_view().clone();
                self.router.navigate(arg);
                self.left_view(&previous);
                self.render();
            }
            "back" | "forward" => {
                let moved = if command == "back" {
                    self.history.back()
                } else {
                    self.history.forward()
                };
                match moved {
                    Some(fragment) => {
                        let previous = self.router.active_view().clone();
                        self.router.on_history_change(&fragment);
                        self.left_view(&previous);
                        self.render();
                    }
                    None => println!("(no further history)"),
                }
            }
            "where" => {
                self.render();
                let snap = self.context.snapshot();
                println!("{}", serde_json::to_string_pretty(&snap)?);
            }
            "weather" => {
                let coordinates = self
                    .context
                    .snapshot()
                    .location
                    .coordinates
                    .context("location not known yet; try `city <name>`")?;
                let report = self.backend.weather(coordinates).await?;
                let label = self.context.snapshot().location.name().unwrap_or("here").to_string();
                self.print_weather(&label, &report);
            }
            "city" => {
                anyhow::ensure!(!arg.is_empty(), "usage: city <name>");
                match self.geocoder.search(arg).await? {
                    Some(found) => {
                        let report = self.backend.weather(found.coordinates).await?;
                        self.print_weather(&found.name, &report);
                    }
                    None => println!("City not found"),
                }
            }
            "recommend" => {
                let query = if arg.is_empty() {
                    let coordinates = self
                        .context
                        .snapshot()
                        .location
                        .coordinates
                        .context("location not known; try `recommend <place>`")?;
                    RecommendQuery::At(coordinates)
                } else {
                    RecommendQuery::Named {
                        location_name: arg.to_string(),
                    }
                };
                let advice = self.backend.recommend(&query).await?;
                if let Some(location) = &advice.location {
                    println!("📍 {}", location);
                }
                println!("🟤 {}: {}", advice.soil_type, advice.soil_characteristics);
                for crop in &advice.crops {
                    println!("  🌱 {} (water: {}) - {}", crop.name, crop.water_need, crop.reason);
                }
            }
            "ask" => {
                anyhow::ensure!(!arg.is_empty(), "usage: ask <message>");
                let reply = self.backend.chat(arg, &self.locale.locale()).await?;
                println!("🤖 {}", reply);
            }
            "pest-ask" => {
                anyhow::ensure!(!arg.is_empty(), "usage: pest-ask <question>");
                let solution = self.backend.pest_query(arg, &self.locale.locale()).await?;
                println!("🐛 {}", solution);
            }
            "scan" => {
                anyhow::ensure!(!arg.is_empty(), "usage: scan <image path>");
                let path = Path::new(arg);
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "leaf.jpg".to_string());
                let diagnosis = self
                    .backend
                    .pest_scan(Upload::new(bytes, file_name, image_mime(path)))
                    .await?;
                println!("🔬 {}", diagnosis.diagnosis);
                if !diagnosis.symptoms.is_empty() {
                    println!("   symptoms: {}", diagnosis.symptoms);
                }
                for (i, step) in diagnosis.remedy.iter().enumerate() {
                    println!("   {}. {}", i + 1, step);
                }
            }
            "mandi" => {
                let state = if arg.is_empty() {
                    self.config.default_state.clone()
                } else {
                    arg.to_string()
                };
                if !farmshield_core::market::is_supported_state(&state) {
                    println!("(no data for {}; the backend will answer with its default state)", state);
                }
                self.last_rates = self.backend.mandi(&state).await?;
                print_rates(self.last_rates.iter());
            }
            "find" => print_rates(filter_by_commodity(&self.last_rates, arg).into_iter()),
            "record" => {
                let session = self.session(arg)?;
                session.start().await?;
                if session.phase() == Phase::Recording {
                    println!("🎙️ {} recording; `stop {}` to send", session.feature().name, arg);
                }
            }
            "stop" => {
                let session = self.session(arg)?;
                let phase = session.stop().await;
                match (phase, session.result_text()) {
                    (Phase::Result, Some(text)) => println!("✅ {}", text),
                    (Phase::Error, Some(text)) => println!("⚠️ {}", text),
                    (other, _) => println!("(nothing to stop: {:?})", other),
                }
            }
            "speak" => {
                let session = self.session(arg)?;
                match session.toggle_playback()? {
                    Playback::Speaking => println!("🔊 speaking"),
                    Playback::Silent => println!("🔇 silent"),
                }
            }
            "lang" => {
                let known = self.locale.locales();
                if !known.contains(&arg) {
                    println!("no table for `{}`, using en (have: {})", arg, known.join(", "));
                }
                self.locale.set_locale(arg);
                self.render();
            }
            other => println!("unknown command `{}`; try `help`", other),
        }
        Ok(true)
    }

    fn print_weather(&self, label: &str, report: &WeatherReport) {
        println!(
            "🌦️ {}: {} {}°C, humidity {}%, wind {} km/h",
            label,
            self.locale.text(report.condition().label_key()),
            reading(report.temperature, 1),
            reading(report.humidity, 0),
            reading(report.wind_speed, 1)
        );
        if let Some(advice) = &report.ai_advice {
            println!("   💡 {}", advice);
        }
        for day in report.daily() {
            println!(
                "   {}  {:<14} {:>5.1} / {:>5.1}",
                day.date,
                self.locale.text(day.condition().label_key()),
                day.max,
                day.min
            );
        }
    }
}

fn reading(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "--".to_string(), |v| format!("{:.*}", precision, v))
}

fn image_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

fn print_rates<'a>(rates: impl Iterator<Item = &'a MandiRate>) {
    for rate in rates {
        let arrow = match rate.trend {
            farmshield_core::Trend::Up => "▲",
            farmshield_core::Trend::Down => "▼",
            farmshield_core::Trend::Stable => "•",
        };
        println!(
            "  {} {:<20} {:<18} ₹{:>6.0}  ({:.0} - {:.0})",
            arrow, rate.commodity, rate.market, rate.price, rate.min_price, rate.max_price
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[farmshield] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = FarmConfig::load().context("loading configuration")?;
    let locale = TableLocale::from_toml_str(&config.locale, LOCALE_TABLES)?;
    let backend = BackendClient::new(&config)?;
    let geocoder = Arc::new(NominatimGeocoder::new(&config)?);

    let cache = Arc::new(ContextualDataCache::new(
        Arc::new(FixedGeolocation::new(config.device_position())),
        geocoder.clone(),
        Arc::new(backend.clone()),
    ));
    let context = cache.handle();
    {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.ensure_loaded().await });
    }

    let fragment = std::env::args().nth(1).unwrap_or_default();
    let history = Arc::new(MemoryHistory::with_fragment(&fragment));
    let router = NavigationRouter::new(Arc::clone(&history));

    let (microphone, speech) = audio_devices();
    let voice_backend = Arc::new(HttpVoiceBackend::new(backend.clone()));
    let language = LanguagePolicy::from_setting(config.speech_locale.as_deref());
    let (chat, chat_events) = VoiceSession::new(
        VoiceFeature::chat_assistant(),
        microphone.clone(),
        voice_backend.clone(),
        speech.clone(),
        language.clone(),
    );
    let (pest, pest_events) = VoiceSession::new(
        VoiceFeature::pest_helpline(),
        microphone,
        voice_backend,
        speech,
        language,
    );
    log_voice_events("chat", chat_events);
    log_voice_events("pest", pest_events);

    tracing::info!(
        backend = %backend.base_url(),
        locale = %config.locale,
        "FarmShield console started"
    );

    let mut console = Console {
        config,
        locale,
        backend,
        geocoder,
        cache,
        context,
        history,
        router,
        chat,
        pest,
        last_rates: Vec::new(),
    };
    console.render();
    println!("type `help` for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match console.handle(&line).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("⚠️ {:#}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("CTRL-C received; shutting down console");
                break;
            }
        }
    }

    console.chat.close();
    console.pest.close();
    tracing::debug!(
        target: "farmshield::console",
        weather_requests = console.cache.weather_requests(),
        "session finished"
    );
    Ok(())
}
