//! Conversation dispatcher.
//!
//! Routes inbound messages by command, keeps the per-conversation
//! "awaiting location" state and runs the geocode → forecast → quip chain.
//! The transport is abstracted behind [`Outbox`], providers behind their
//! traits, so the whole flow can run against fakes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::geocode::{Coordinates, Geocoder};
use crate::humor::{pick_quip, Humorist};
use crate::metrics::{self, FlowOutcome, FlowTimer};
use crate::weather::ForecastProvider;
use crate::{Error, Result};

pub const GREETING: &str = "Ahoy, weather voyager, ready to rhyme?\n\
Come decode the skies or share a funny line!\n\
Let's banter about clouds or the oddities of fate,\n\
In this whimsical chat, laughter awaits!";

pub const LOCATION_PROMPT: &str = "Enter a Location: ";
pub const WEATHER_ACK: &str = "Here's the weather!";
pub const FORECAST_UNAVAILABLE: &str =
    "Sorry, the forecast is unavailable right now. Please try again later.";
pub const ASK_LLM_USAGE: &str = "Usage: /ask_llm <text>";

const ASK_LLM_PREFIX: &str = "/ask_llm";

/// Inbound text message, transport-neutral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub chat_id: i64,
    pub message_id: i32,
    pub text: String,
}

impl Incoming {
    pub fn new<S: Into<String>>(chat_id: i64, message_id: i32, text: S) -> Self {
        Self {
            chat_id,
            message_id,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    Plain,
    Markdown,
}

/// Outbound message, transport-neutral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub text: String,
    pub format: MessageFormat,
    pub reply_to: Option<i32>,
}

impl Outgoing {
    pub fn plain<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            format: MessageFormat::Plain,
            reply_to: None,
        }
    }

    pub fn markdown<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            format: MessageFormat::Markdown,
            reply_to: None,
        }
    }

    pub fn reply<S: Into<String>>(text: S, message_id: i32) -> Self {
        Self {
            text: text.into(),
            format: MessageFormat::Plain,
            reply_to: Some(message_id),
        }
    }
}

/// Delivers outbound messages to a conversation.
#[async_trait]
pub trait Outbox: Send + Sync {
    async fn send(&self, chat_id: i64, message: Outgoing) -> Result<()>;
}

/// What the dispatcher decided to do with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Start,
    WeatherPrompt,
    WeatherReport,
    AskLlm,
    Echo,
}

impl Route {
    /// Route by command; does not know about pending prompts.
    /// Any `@mention` on the command is accepted.
    pub fn from_text(text: &str) -> Self {
        Self::addressed(text, None)
    }

    /// Like [`Route::from_text`], but a command mentioning another bot
    /// (`/weather@OtherBot`) is treated as plain text.
    pub fn addressed(text: &str, bot_username: Option<&str>) -> Self {
        let token = text.split_whitespace().next().unwrap_or("");
        let (command, mention) = match token.split_once('@') {
            Some((command, mention)) => (command, Some(mention)),
            None => (token, None),
        };

        if let (Some(mention), Some(me)) = (mention, bot_username) {
            if !mention.eq_ignore_ascii_case(me.trim_start_matches('@')) {
                return Route::Echo;
            }
        }

        match command {
            "/start" => Route::Start,
            "/weather" => Route::WeatherPrompt,
            _ if text.starts_with(ASK_LLM_PREFIX) => Route::AskLlm,
            _ => Route::Echo,
        }
    }

    /// Metrics label.
    pub fn flow(self) -> &'static str {
        match self {
            Route::Start => "start",
            Route::WeatherPrompt => "weather_prompt",
            Route::WeatherReport => "weather",
            Route::AskLlm => "ask_llm",
            Route::Echo => "echo",
        }
    }
}

/// Text after `/ask_llm`, without an optional `@botname` mention.
pub fn ask_llm_query(text: &str) -> &str {
    let rest = text.strip_prefix(ASK_LLM_PREFIX).unwrap_or(text);
    let rest = match rest.strip_prefix('@') {
        Some(mentioned) => mentioned
            .split_once(char::is_whitespace)
            .map_or("", |(_, tail)| tail),
        None => rest,
    };
    rest.trim()
}

/// Message shown when the geocoder has no match.
pub fn location_not_found(query: &str) -> String {
    format!(
        "Sorry, I couldn't find \"{}\". Send /weather to try another place.",
        query.trim()
    )
}

/// Result of a successful weather lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub coordinates: Coordinates,
    pub description: String,
    pub quip: String,
}

impl WeatherReport {
    /// Attach a quip drawn from `rng` to a fetched description.
    pub fn new<R: Rng + ?Sized>(coordinates: Coordinates, description: String, rng: &mut R) -> Self {
        let quip = pick_quip(&description, rng).to_string();
        Self {
            coordinates,
            description,
            quip,
        }
    }

    /// The three messages sent for a report, in order.
    pub fn messages(&self) -> [Outgoing; 3] {
        [
            Outgoing::plain(WEATHER_ACK),
            Outgoing::markdown(format!("*Weather:* {}\n", self.description)),
            Outgoing::plain(self.quip.clone()),
        ]
    }
}

/// Geocode a query and fetch the description of its next forecast slot.
pub async fn lookup_weather(
    geocoder: &dyn Geocoder,
    forecasts: &dyn ForecastProvider,
    query: &str,
) -> Result<(Coordinates, String)> {
    let coordinates = geocoder.locate(query).await?;
    let description = forecasts.describe(coordinates).await?;
    Ok((coordinates, description))
}

/// A registered "enter a location" prompt.
#[derive(Debug, Clone, Copy)]
pub struct PendingPrompt {
    requested_at: Instant,
}

impl PendingPrompt {
    fn new() -> Self {
        Self {
            requested_at: Instant::now(),
        }
    }

    fn is_live(&self, ttl: Duration) -> bool {
        self.requested_at.elapsed() < ttl
    }
}

/// Result of handling one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handled {
    pub route: Route,
    pub outcome: FlowOutcome,
}

/// Message router with its providers injected.
pub struct Dispatcher {
    geocoder: Arc<dyn Geocoder>,
    forecasts: Arc<dyn ForecastProvider>,
    humorist: Arc<dyn Humorist>,
    pending: RwLock<HashMap<i64, PendingPrompt>>,
    pending_ttl: Duration,
    bot_username: Option<String>,
    rng: Mutex<StdRng>,
}

impl Dispatcher {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        forecasts: Arc<dyn ForecastProvider>,
        humorist: Arc<dyn Humorist>,
        pending_ttl: Duration,
    ) -> Self {
        Self {
            geocoder,
            forecasts,
            humorist,
            pending: RwLock::new(HashMap::new()),
            pending_ttl,
            bot_username: None,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Use a seeded random source for quip selection.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Ignore commands that mention a different bot.
    pub fn with_bot_username<S: Into<String>>(mut self, username: S) -> Self {
        self.bot_username = Some(username.into());
        self
    }

    /// Whether the conversation has a live location prompt.
    pub async fn is_awaiting_location(&self, chat_id: i64) -> bool {
        self.pending
            .read()
            .await
            .get(&chat_id)
            .is_some_and(|prompt| prompt.is_live(self.pending_ttl))
    }

    /// Handle one inbound message and send the replies.
    pub async fn handle(&self, incoming: &Incoming, outbox: &dyn Outbox) -> Result<Handled> {
        let route = if self.take_pending(incoming.chat_id).await {
            Route::WeatherReport
        } else {
            Route::addressed(&incoming.text, self.bot_username.as_deref())
        };

        debug!(chat_id = incoming.chat_id, ?route, "Routing message");

        let timer = FlowTimer::start(route.flow());
        match self.execute(route, incoming, outbox).await {
            Ok(outcome) => {
                timer.finish(outcome);
                Ok(Handled { route, outcome })
            }
            Err(err) => {
                timer.finish(FlowOutcome::TransportError);
                Err(err)
            }
        }
    }

    /// Resolve, fetch and pick a quip for a location query.
    pub async fn weather_report(&self, query: &str) -> Result<WeatherReport> {
        let (coordinates, description) =
            lookup_weather(self.geocoder.as_ref(), self.forecasts.as_ref(), query).await?;
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        Ok(WeatherReport::new(coordinates, description, &mut *rng))
    }

    async fn execute(
        &self,
        route: Route,
        incoming: &Incoming,
        outbox: &dyn Outbox,
    ) -> Result<FlowOutcome> {
        let chat_id = incoming.chat_id;

        match route {
            Route::Start => {
                outbox.send(chat_id, Outgoing::plain(GREETING)).await?;
            }
            Route::WeatherPrompt => {
                outbox.send(chat_id, Outgoing::markdown(LOCATION_PROMPT)).await?;
                let mut pending = self.pending.write().await;
                self.sweep_expired(&mut pending);
                pending.insert(chat_id, PendingPrompt::new());
                metrics::set_pending_prompts(pending.len());
            }
            Route::WeatherReport => return self.send_weather(incoming, outbox).await,
            Route::AskLlm => {
                let query = ask_llm_query(&incoming.text);
                if query.is_empty() {
                    outbox.send(chat_id, Outgoing::plain(ASK_LLM_USAGE)).await?;
                    return Ok(FlowOutcome::Usage);
                }
                let reply = self.humorist.add_humor(query).await;
                outbox.send(chat_id, Outgoing::plain(reply)).await?;
            }
            Route::Echo => {
                outbox
                    .send(chat_id, Outgoing::reply(incoming.text.clone(), incoming.message_id))
                    .await?;
            }
        }

        Ok(FlowOutcome::Ok)
    }

    async fn send_weather(&self, incoming: &Incoming, outbox: &dyn Outbox) -> Result<FlowOutcome> {
        let chat_id = incoming.chat_id;
        let query = incoming.text.trim();

        match self.weather_report(query).await {
            Ok(report) => {
                info!(
                    chat_id,
                    query,
                    description = %report.description,
                    "Sending weather report"
                );
                for message in report.messages() {
                    outbox.send(chat_id, message).await?;
                }
                Ok(FlowOutcome::Ok)
            }
            Err(err) if err.is_resolution_failure() || matches!(err, Error::InvalidArgument(_)) => {
                warn!(chat_id, query, error = %err, "Location not resolved");
                outbox
                    .send(chat_id, Outgoing::plain(location_not_found(query)))
                    .await?;
                Ok(FlowOutcome::LocationNotFound)
            }
            Err(err) if err.is_fetch_failure() => {
                warn!(chat_id, query, error = %err, "Forecast fetch failed");
                outbox
                    .send(chat_id, Outgoing::plain(FORECAST_UNAVAILABLE))
                    .await?;
                Ok(FlowOutcome::ForecastUnavailable)
            }
            Err(err) => Err(err),
        }
    }

    /// Remove the conversation's prompt; true if it was still live.
    async fn take_pending(&self, chat_id: i64) -> bool {
        let prompt = {
            let mut pending = self.pending.write().await;
            let prompt = pending.remove(&chat_id);
            self.sweep_expired(&mut pending);
            metrics::set_pending_prompts(pending.len());
            prompt
        };

        match prompt {
            Some(prompt) if prompt.is_live(self.pending_ttl) => true,
            Some(_) => {
                debug!(chat_id, "Discarding expired location prompt");
                false
            }
            None => false,
        }
    }

    /// Drop prompts of conversations that never answered.
    fn sweep_expired(&self, pending: &mut HashMap<i64, PendingPrompt>) {
        let before = pending.len();
        pending.retain(|_, prompt| prompt.is_live(self.pending_ttl));
        let expired = before - pending.len();
        if expired > 0 {
            debug!(expired, "Swept expired location prompts");
        }
    }
}
