//! # Status cards
//!
//! The player never talks to Discord directly. It builds plain-text
//! [`Card`]s and hands them to a [`StatusRenderer`], keeping the returned
//! [`StatusHandle`]s so the same message can later be edited or deleted.
//!
//! [`embeds::DiscordRenderer`] is the production renderer; it turns cards into
//! embeds and attaches the [`buttons`] for each card kind.

pub mod buttons;
pub mod embeds;

use async_trait::async_trait;
use serenity::model::id::{ChannelId, MessageId};

use crate::{
    audio::{
        queue::QueueView,
        song::{format_duration, Song},
    },
    error::MusicResult,
};

/// Cells in the volume bar.
const VOLUME_BAR_CELLS: usize = 25;

/// Reference to a rendered status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusHandle {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardKind {
    NowPlaying,
    Queue,
    Volume,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub kind: CardKind,
    pub title: String,
    pub body: String,
    pub footer: Option<String>,
    pub thumbnail: Option<String>,
}

impl Card {
    /// Now-playing card for `song`, with the next song in the footer.
    pub fn now_playing(song: &Song, up_next: Option<&Song>, paused: bool) -> Self {
        let mut footer = match &song.requested_by {
            Some(user) => format!("@{} ({})", user.name, song.pretty_duration()),
            None => format!("({})", song.pretty_duration()),
        };
        if let Some(next) = up_next {
            footer.push_str(&format!(" Up next: {}", next.display_title()));
        }

        Self {
            kind: CardKind::NowPlaying,
            title: now_playing_title(paused).to_string(),
            body: format!("[**{}**]({})", song.display_title(), song.link()),
            footer: Some(footer),
            thumbnail: song.thumbnail.clone(),
        }
    }

    /// Queue card; the footer sums up the whole queue.
    pub fn queue(view: &QueueView) -> Self {
        let footer = (!view.is_empty())
            .then(|| format!("{} songs ({})", view.len, format_duration(view.total_duration)));

        Self {
            kind: CardKind::Queue,
            title: "Song Queue ♫".to_string(),
            body: view.to_string(),
            footer,
            thumbnail: None,
        }
    }

    pub fn volume(volume: u8, changed_by: Option<&str>) -> Self {
        Self {
            kind: CardKind::Volume,
            title: format!("Current volume : {}%", volume),
            body: volume_bar(volume),
            footer: changed_by.map(|name| format!("Changed by {}", name)),
            thumbnail: None,
        }
    }
}

pub fn now_playing_title(paused: bool) -> &'static str {
    if paused {
        "Now Paused ♫"
    } else {
        "Now Playing ♫"
    }
}

/// 25-cell bar, one filled cell per 4% of volume.
pub fn volume_bar(volume: u8) -> String {
    let filled = (volume.min(100) / 4) as usize;
    format!(
        "{}{}",
        "█".repeat(filled),
        "░".repeat(VOLUME_BAR_CELLS - filled)
    )
}

/// Sends, edits and deletes status messages.
#[async_trait]
pub trait StatusRenderer: Send + Sync {
    async fn send(&self, channel_id: ChannelId, card: &Card) -> MusicResult<StatusHandle>;

    async fn update(&self, handle: &StatusHandle, card: &Card) -> MusicResult<()>;

    async fn delete(&self, handle: &StatusHandle) -> MusicResult<()>;

    /// Plain text notice, e.g. a song that failed to download.
    async fn notify(&self, channel_id: ChannelId, text: &str) -> MusicResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        queue::SongQueue,
        song::{resolved, Requester},
    };
    use serenity::model::id::UserId;

    #[test]
    fn volume_bar_scales() {
        assert_eq!(volume_bar(0), "░".repeat(25));
        assert_eq!(volume_bar(100), "█".repeat(25));
        assert_eq!(volume_bar(20), format!("{}{}", "█".repeat(5), "░".repeat(20)));
    }

    #[test]
    fn now_playing_footer_mentions_next_song() {
        let mut song = resolved("a", "First", 65);
        song.requested_by = Some(Requester::new(UserId::new(1), "plom"));
        let next = resolved("b", "Second", 30);

        let card = Card::now_playing(&song, Some(&next), false);
        assert_eq!(card.title, "Now Playing ♫");
        assert_eq!(card.body, "[**First**](https://youtu.be/a)");
        assert_eq!(card.footer.as_deref(), Some("@plom (1m5s) Up next: Second"));

        let paused = Card::now_playing(&song, None, true);
        assert_eq!(paused.title, "Now Paused ♫");
        assert_eq!(paused.footer.as_deref(), Some("@plom (1m5s)"));
    }

    #[test]
    fn queue_card_sums_up_the_queue() {
        let mut queue = SongQueue::new();
        queue.append(
            vec![resolved("a", "First", 65), resolved("b", "Second", 3600)],
            &Requester::new(UserId::new(1), "plom"),
            false,
        );

        let card = Card::queue(&queue.windowed_view(1));
        assert_eq!(card.footer.as_deref(), Some("2 songs (1h1m5s)"));
        assert_eq!(Card::queue(&SongQueue::new().windowed_view(10)).footer, None);
    }
}
