//! # Audio Module
//!
//! Per-guild playback for plombot.
//!
//! ## Architecture
//!
//! ### [`player`] - Music Player
//! - One [`MusicPlayer`](player::MusicPlayer) per guild
//! - Drives the queue through the voice transport, one loop at a time
//! - Skips songs that fail to resolve or download
//!
//! ### [`queue`] - Song Queue
//! - Ordered playlist with a play cursor
//! - Insert-next, shuffle of upcoming songs, repeat modes
//! - Cursor-centred view for the queue card
//!
//! ### [`transport`] - Voice Seam
//! - [`AudioTransport`](transport::AudioTransport) and its handle, implemented
//!   over songbird in [`songbird_transport`]
//! - Completion is signalled, never polled
//!
//! ### [`registry`] and [`watchdog`]
//! - Registry of live players with idle eviction
//! - Countdown that leaves channels nobody is listening in
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use plombot::audio::{player::PlayerServices, registry::PlayerRegistry, song::{Requester, Song}};
//! use serenity::all::{ChannelId, GuildId, UserId};
//! use std::sync::Arc;
//!
//! # async fn example(services: Arc<PlayerServices>) -> plombot::error::MusicResult<()> {
//! let registry = PlayerRegistry::new(services, 20);
//! let player = registry.get_or_create(GuildId::new(123456789)).await;
//!
//! let requester = Requester::new(UserId::new(1), "plom");
//! player.enqueue(vec![Song::from_query("daft punk one more time")], &requester, false).await;
//! player.connect(ChannelId::new(987654321)).await?;
//! player.play().await?;
//! # Ok(())
//! # }
//! ```

pub mod player;
pub mod queue;
pub mod registry;
pub mod song;
pub mod songbird_transport;
pub mod transport;
pub mod watchdog;

#[cfg(test)]
pub(crate) mod testing;
