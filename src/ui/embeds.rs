use async_trait::async_trait;
use serenity::{
    all::{Colour, Timestamp},
    builder::{CreateEmbed, CreateEmbedFooter, CreateMessage, EditMessage},
    http::Http,
    model::id::ChannelId,
};
use std::sync::Arc;
use tracing::debug;

use super::{buttons::control_rows, Card, CardKind, StatusHandle, StatusRenderer};
use crate::error::{MusicError, MusicResult};

/// Standard palette for the bot's embeds
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(34, 255, 51);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const NOW_PLAYING_PINK: Colour = Colour::from_rgb(255, 105, 180);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
}

/// Builds the embed for a status card.
pub fn card_embed(card: &Card) -> CreateEmbed {
    let colour = match card.kind {
        CardKind::NowPlaying => colors::NOW_PLAYING_PINK,
        CardKind::Queue | CardKind::Volume => colors::SUCCESS_GREEN,
    };

    let mut embed = CreateEmbed::default()
        .title(&card.title)
        .description(&card.body)
        .color(colour);

    if let Some(footer) = &card.footer {
        embed = embed.footer(CreateEmbedFooter::new(footer));
    }

    if let Some(thumbnail) = &card.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    simple_embed(title, description, colors::ERROR_RED)
}

pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    simple_embed(title, description, colors::SUCCESS_GREEN)
}

pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    simple_embed(title, description, colors::INFO_BLUE)
}

fn simple_embed(title: &str, description: &str, colour: Colour) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colour)
        .timestamp(Timestamp::now())
}

/// Renders status cards as Discord embeds with their control buttons.
pub struct DiscordRenderer {
    http: Arc<Http>,
}

impl DiscordRenderer {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl StatusRenderer for DiscordRenderer {
    async fn send(&self, channel_id: ChannelId, card: &Card) -> MusicResult<StatusHandle> {
        let message = channel_id
            .send_message(
                &self.http,
                CreateMessage::new()
                    .embed(card_embed(card))
                    .components(control_rows(card.kind)),
            )
            .await
            .map_err(render_error)?;

        Ok(StatusHandle {
            channel_id,
            message_id: message.id,
        })
    }

    async fn update(&self, handle: &StatusHandle, card: &Card) -> MusicResult<()> {
        let result = handle
            .channel_id
            .edit_message(
                &self.http,
                handle.message_id,
                EditMessage::new()
                    .embed(card_embed(card))
                    .components(control_rows(card.kind)),
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            // Someone deleted the message; nothing left to update.
            Err(e) if is_unknown_message(&e) => {
                debug!("Status message {} is gone, skipping update", handle.message_id);
                Ok(())
            }
            Err(e) => Err(render_error(e)),
        }
    }

    async fn delete(&self, handle: &StatusHandle) -> MusicResult<()> {
        match handle
            .channel_id
            .delete_message(&self.http, handle.message_id)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_unknown_message(&e) => Ok(()),
            Err(e) => Err(render_error(e)),
        }
    }

    async fn notify(&self, channel_id: ChannelId, text: &str) -> MusicResult<()> {
        channel_id
            .say(&self.http, text)
            .await
            .map(|_| ())
            .map_err(render_error)
    }
}

fn render_error(err: serenity::Error) -> MusicError {
    MusicError::Render(err.to_string())
}

fn is_unknown_message(err: &serenity::Error) -> bool {
    use serenity::http::HttpError;

    matches!(
        err,
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response))
            if response.status_code.as_u16() == 404
    )
}
