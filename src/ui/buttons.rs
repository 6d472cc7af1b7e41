//! Buttons attached to the status cards.
//!
//! Every button's custom id maps back to a [`PlayerControl`]; the bot's
//! component handler parses it and drives the guild's player.

use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

use super::CardKind;

/// Discord allows five buttons per action row.
const BUTTONS_PER_ROW: usize = 5;

/// Fine volume step. Volume is whole percent, so this is the closest to
/// the old reaction controls' 1.75.
const FINE_STEP: i32 = 2;
const COARSE_STEP: i32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeStep {
    DownMore,
    Down,
    Up,
    UpMore,
    /// Back to the configured default volume.
    Reset,
}

impl VolumeStep {
    /// Volume to apply, before clamping.
    pub fn target(self, current: u8, default_volume: u8) -> i32 {
        let current = i32::from(current);
        match self {
            VolumeStep::DownMore => current - COARSE_STEP,
            VolumeStep::Down => current - FINE_STEP,
            VolumeStep::Up => current + FINE_STEP,
            VolumeStep::UpMore => current + COARSE_STEP,
            VolumeStep::Reset => i32::from(default_volume),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerControl {
    Pause,
    Resume,
    Skip,
    Stop,
    Queue,
    /// Posts a fresh volume card.
    ShowVolume,
    Shuffle,
    Volume(VolumeStep),
}

const NOW_PLAYING_CONTROLS: &[PlayerControl] = &[
    PlayerControl::Pause,
    PlayerControl::Resume,
    PlayerControl::Skip,
    PlayerControl::Stop,
    PlayerControl::Queue,
    PlayerControl::ShowVolume,
];

const QUEUE_CONTROLS: &[PlayerControl] = &[PlayerControl::Shuffle];

const VOLUME_CONTROLS: &[PlayerControl] = &[
    PlayerControl::Volume(VolumeStep::DownMore),
    PlayerControl::Volume(VolumeStep::Down),
    PlayerControl::Volume(VolumeStep::Up),
    PlayerControl::Volume(VolumeStep::UpMore),
    PlayerControl::Volume(VolumeStep::Reset),
];

impl PlayerControl {
    pub fn custom_id(self) -> &'static str {
        match self {
            PlayerControl::Pause => "music_pause",
            PlayerControl::Resume => "music_resume",
            PlayerControl::Skip => "music_skip",
            PlayerControl::Stop => "music_stop",
            PlayerControl::Queue => "music_queue",
            PlayerControl::ShowVolume => "music_volume",
            PlayerControl::Shuffle => "music_shuffle",
            PlayerControl::Volume(VolumeStep::DownMore) => "music_volume_down_more",
            PlayerControl::Volume(VolumeStep::Down) => "music_volume_down",
            PlayerControl::Volume(VolumeStep::Up) => "music_volume_up",
            PlayerControl::Volume(VolumeStep::UpMore) => "music_volume_up_more",
            PlayerControl::Volume(VolumeStep::Reset) => "music_volume_reset",
        }
    }

    pub fn from_custom_id(id: &str) -> Option<Self> {
        NOW_PLAYING_CONTROLS
            .iter()
            .chain(QUEUE_CONTROLS)
            .chain(VOLUME_CONTROLS)
            .copied()
            .find(|control| control.custom_id() == id)
    }

    fn emoji(self) -> char {
        match self {
            PlayerControl::Pause => '⏸',
            PlayerControl::Resume => '▶',
            PlayerControl::Skip => '⏭',
            PlayerControl::Stop => '⏹',
            PlayerControl::Queue => '📜',
            PlayerControl::ShowVolume => '🔊',
            PlayerControl::Shuffle => '🔀',
            PlayerControl::Volume(VolumeStep::DownMore) => '⏬',
            PlayerControl::Volume(VolumeStep::Down) => '⬇',
            PlayerControl::Volume(VolumeStep::Up) => '⬆',
            PlayerControl::Volume(VolumeStep::UpMore) => '⏫',
            PlayerControl::Volume(VolumeStep::Reset) => '✳',
        }
    }

    fn style(self) -> ButtonStyle {
        match self {
            PlayerControl::Stop => ButtonStyle::Danger,
            PlayerControl::Pause | PlayerControl::Resume => ButtonStyle::Primary,
            _ => ButtonStyle::Secondary,
        }
    }

    pub fn button(self) -> CreateButton {
        CreateButton::new(self.custom_id())
            .emoji(self.emoji())
            .style(self.style())
    }
}

/// Controls shown under a card of `kind`.
pub fn controls_for(kind: CardKind) -> &'static [PlayerControl] {
    match kind {
        CardKind::NowPlaying => NOW_PLAYING_CONTROLS,
        CardKind::Queue => QUEUE_CONTROLS,
        CardKind::Volume => VOLUME_CONTROLS,
    }
}

pub fn control_rows(kind: CardKind) -> Vec<CreateActionRow> {
    controls_for(kind)
        .chunks(BUTTONS_PER_ROW)
        .map(|row| CreateActionRow::Buttons(row.iter().map(|control| control.button()).collect()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn custom_ids_parse_back() {
        for kind in [CardKind::NowPlaying, CardKind::Queue, CardKind::Volume] {
            for control in controls_for(kind) {
                assert_eq!(PlayerControl::from_custom_id(control.custom_id()), Some(*control));
            }
        }
        assert_eq!(PlayerControl::from_custom_id("queue_next"), None);
    }

    #[test]
    fn volume_steps() {
        assert_eq!(VolumeStep::Up.target(20, 20), 22);
        assert_eq!(VolumeStep::DownMore.target(5, 20), -3);
        assert_eq!(VolumeStep::UpMore.target(96, 20), 104);
        assert_eq!(VolumeStep::Reset.target(73, 20), 20);
    }

    #[test]
    fn now_playing_controls_span_two_rows() {
        let rows = serde_json::to_value(control_rows(CardKind::NowPlaying)).unwrap();
        assert_eq!(rows.as_array().map(Vec::len), Some(2));
        assert_eq!(rows[0]["components"][0]["custom_id"], "music_pause");
        assert_eq!(rows[1]["components"][0]["custom_id"], "music_volume");
    }
}
