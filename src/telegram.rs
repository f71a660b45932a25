//! Telegram transport: teloxide long polling in front of the dispatcher.

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::dispatching::Dispatcher as UpdateDispatcher;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode};
use tracing::{error, info};

use crate::config::Config;
use crate::dispatcher::{Dispatcher, Incoming, MessageFormat, Outbox, Outgoing};
use crate::geocode::NominatimClient;
use crate::integrations::OpenRouterClient;
use crate::weather::OpenWeatherClient;
use crate::Result;

/// [`Outbox`] backed by the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramOutbox {
    bot: Bot,
}

impl TelegramOutbox {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Outbox for TelegramOutbox {
    async fn send(&self, chat_id: i64, message: Outgoing) -> Result<()> {
        let mut request = self.bot.send_message(ChatId(chat_id), message.text);
        if message.format == MessageFormat::Markdown {
            request = request.parse_mode(ParseMode::Markdown);
        }
        if let Some(reply_to) = message.reply_to {
            request = request.reply_to_message_id(MessageId(reply_to));
        }
        request.await?;
        Ok(())
    }
}

/// Convert a Telegram message; non-text updates are skipped.
pub fn incoming_from(msg: &Message) -> Option<Incoming> {
    msg.text()
        .map(|text| Incoming::new(msg.chat.id.0, msg.id.0, text))
}

/// Build the dispatcher with production providers.
pub fn build_dispatcher(config: &Config) -> Result<Dispatcher> {
    let geocoder = NominatimClient::from_config(config)?;
    let forecasts = OpenWeatherClient::from_config(config)?;
    let humorist = OpenRouterClient::from_config(config)?;

    Ok(Dispatcher::new(
        Arc::new(geocoder),
        Arc::new(forecasts),
        Arc::new(humorist),
        config.pending_ttl,
    ))
}

async fn handle_message(bot: Bot, msg: Message, dispatcher: Arc<Dispatcher>) -> Result<()> {
    let Some(incoming) = incoming_from(&msg) else {
        return Ok(());
    };

    let outbox = TelegramOutbox::new(bot);
    dispatcher.handle(&incoming, &outbox).await?;
    Ok(())
}

/// Start long polling until Ctrl+C.
pub async fn run(config: &Config) -> Result<()> {
    let token = config.require_bot_token()?.to_string();
    let dispatcher = build_dispatcher(config)?;

    let bot = Bot::new(token);
    let me = bot.get_me().await?;
    info!(username = me.username(), "Starting weather bot...");

    let dispatcher = Arc::new(dispatcher.with_bot_username(me.username()));

    let handler = dptree::entry().branch(Update::filter_message().endpoint(
        |bot: Bot, msg: Message, dispatcher: Arc<Dispatcher>| async move {
            let chat_id = msg.chat.id.0;
            if let Err(err) = handle_message(bot, msg, dispatcher).await {
                error!(chat_id, "Handler error: {err:?}");
            }
            Ok::<_, teloxide::RequestError>(())
        },
    ));

    UpdateDispatcher::builder(bot, handler)
        .dependencies(dptree::deps![dispatcher])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
