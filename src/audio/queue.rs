use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;
use tracing::{debug, info};

use crate::{
    audio::song::{Requester, Song},
    error::{MusicError, MusicResult},
    ui::StatusHandle,
};

/// Rows shown by [`SongQueue::windowed_view`] when no size is given.
pub const DEFAULT_WINDOW: usize = 10;

/// Width budget shared by a row's title and its duration.
const ROW_WIDTH: usize = 41;

/// Repeat behaviour applied when the cursor advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    /// Replay the current song.
    Track,
    /// Wrap to the first song after the last one.
    Queue,
}

/// Ordered playlist with a play cursor.
///
/// `0 <= cursor <= len` always holds. The song under the cursor is the one
/// playing (or about to play); a cursor equal to `len` means the queue has
/// run out.
#[derive(Debug, Default)]
pub struct SongQueue {
    songs: Vec<Song>,
    cursor: usize,
    message: Option<StatusHandle>,
}

impl SongQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Moves the cursor, clamped to the queue length.
    pub fn set_cursor(&mut self, index: usize) {
        self.cursor = index.min(self.songs.len());
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn next_song(&self) -> Option<&Song> {
        self.songs.get(self.cursor)
    }

    /// Song after the current one.
    pub fn up_next(&self) -> Option<&Song> {
        self.songs.get(self.cursor + 1)
    }

    /// Overwrites the song at `index`, typically after its metadata resolved.
    pub fn replace(&mut self, index: usize, song: Song) {
        if let Some(slot) = self.songs.get_mut(index) {
            *slot = song;
        }
    }

    /// Adds songs requested by `user`.
    ///
    /// With `insert_next` the songs are spliced directly after the cursor in
    /// their given order, otherwise they go to the end.
    pub fn append(&mut self, songs: Vec<Song>, user: &Requester, insert_next: bool) {
        let count = songs.len();
        let songs = songs.into_iter().map(|mut song| {
            song.requested_by = Some(user.clone());
            song
        });

        if insert_next {
            let at = (self.cursor + 1).min(self.songs.len());
            self.songs.splice(at..at, songs);
            info!("⏭️ {} inserted {} songs after position {}", user.name, count, self.cursor);
        } else {
            self.songs.extend(songs);
            info!("➕ {} queued {} songs", user.name, count);
        }
    }

    pub fn clear(&mut self) {
        self.songs.clear();
        self.cursor = 0;
        info!("🗑️ Queue cleared");
    }

    /// Shuffles the songs after the cursor. The current song never moves.
    pub fn shuffle(&mut self) {
        self.shuffle_with(&mut rand::thread_rng());
    }

    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let start = self.cursor + 1;
        if self.songs.len() < start + 2 {
            debug!("Fewer than two songs after the cursor, nothing to shuffle");
            return;
        }

        self.songs[start..].shuffle(rng);
        info!("🔀 Shuffled {} upcoming songs", self.songs.len() - start);
    }

    /// Removes and returns the song at `index`.
    ///
    /// The cursor is not shifted; callers that remove before the cursor
    /// adjust it themselves. It is only clamped so it stays within bounds.
    pub fn remove_at(&mut self, index: usize) -> MusicResult<Song> {
        if index >= self.songs.len() {
            return Err(MusicError::OutOfRange {
                index,
                len: self.songs.len(),
            });
        }

        let song = self.songs.remove(index);
        self.cursor = self.cursor.min(self.songs.len());
        debug!("❌ Removed song at position {}", index);
        Ok(song)
    }

    /// Moves the cursor past the current song according to `mode`.
    pub fn advance(&mut self, mode: LoopMode) {
        if mode == LoopMode::Track {
            return;
        }

        let next = self.cursor + 1;
        self.cursor = if next < self.songs.len() {
            next
        } else if mode == LoopMode::Queue {
            0
        } else {
            self.songs.len()
        };
    }

    /// Sum of the known durations, in seconds.
    pub fn total_duration(&self) -> u64 {
        self.songs.iter().filter_map(|song| song.duration).sum()
    }

    pub fn message(&self) -> Option<&StatusHandle> {
        self.message.as_ref()
    }

    pub fn set_message(&mut self, handle: Option<StatusHandle>) -> Option<StatusHandle> {
        std::mem::replace(&mut self.message, handle)
    }

    /// Cursor-centred slice of at most `max_count` songs for display.
    pub fn windowed_view(&self, max_count: usize) -> QueueView {
        let Some((start, end)) = window_bounds(self.songs.len(), self.cursor, max_count) else {
            return QueueView::default();
        };

        let entries = self.songs[start..end]
            .iter()
            .enumerate()
            .map(|(offset, song)| QueueEntry::new(start + offset, song, start + offset == self.cursor))
            .collect();

        QueueView {
            entries,
            len: self.songs.len(),
            total_duration: self.total_duration(),
        }
    }
}

/// Picks the `[start, end)` range shown for a queue of `len` songs.
fn window_bounds(len: usize, cursor: usize, max_count: usize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }

    if len <= max_count {
        Some((0, len))
    } else if cursor + max_count > len + 1 {
        // Near the end: show the last `max_count` songs.
        Some((len.saturating_sub(max_count), len))
    } else {
        let start = cursor.saturating_sub(1);
        Some((start, start + max_count))
    }
}

/// One formatted row of a [`QueueView`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub index: usize,
    pub title: String,
    pub url: String,
    pub duration: String,
    pub current: bool,
}

impl QueueEntry {
    fn new(index: usize, song: &Song, current: bool) -> Self {
        let duration = song.pretty_duration();
        let budget = ROW_WIDTH.saturating_sub(duration.chars().count());
        let title = song
            .display_title()
            .chars()
            .take(budget)
            .filter(|c| !matches!(c, '[' | ']' | '(' | ')'))
            .collect();

        Self {
            index,
            title,
            url: song.link(),
            duration,
            current,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueView {
    pub entries: Vec<QueueEntry>,
    /// Songs in the whole queue, not just the window.
    pub len: usize,
    pub total_duration: u64,
}

impl QueueView {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        self.entries.iter().find(|entry| entry.current)
    }
}

impl fmt::Display for QueueView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return write!(f, "(empty)");
        }

        for entry in &self.entries {
            let symbol = if entry.current { "⭄" } else { "--" };
            writeln!(
                f,
                " {} {} [**{}**]({}) ({})",
                symbol, entry.index, entry.title, entry.url, entry.duration
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::song::resolved;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};
    use serenity::model::id::UserId;

    fn user() -> Requester {
        Requester::new(UserId::new(42), "plom")
    }

    fn queue_of(ids: &[&str]) -> SongQueue {
        let mut queue = SongQueue::new();
        let songs = ids.iter().map(|id| resolved(id, id, 180)).collect();
        queue.append(songs, &user(), false);
        queue
    }

    fn ids(queue: &SongQueue) -> Vec<String> {
        queue
            .songs()
            .iter()
            .map(|song| song.youtube_id.clone().unwrap_or_default())
            .collect()
    }

    #[test]
    fn append_stamps_requester() {
        let queue = queue_of(&["a", "b"]);
        assert!(queue
            .songs()
            .iter()
            .all(|song| song.requested_by.as_ref().map(|r| r.name.as_str()) == Some("plom")));
        assert_eq!(queue.next_song().and_then(|s| s.youtube_id.as_deref()), Some("a"));
    }

    #[test]
    fn insert_next_splices_after_cursor() {
        let mut queue = queue_of(&["A", "B", "C"]);
        queue.set_cursor(1);

        queue.append(vec![resolved("X", "X", 60), resolved("Y", "Y", 60)], &user(), true);

        assert_eq!(ids(&queue), vec!["A", "B", "X", "Y", "C"]);
        assert_eq!(queue.cursor(), 1);

        let view = queue.windowed_view(DEFAULT_WINDOW);
        let current = view.entries.iter().position(|e| e.current).unwrap();
        assert_eq!(view.entries[current].title, "B");
        assert_eq!(view.entries[current + 1].title, "X");
    }

    #[test]
    fn insert_next_into_empty_queue() {
        let mut queue = SongQueue::new();
        queue.append(vec![resolved("X", "X", 60)], &user(), true);
        assert_eq!(ids(&queue), vec!["X"]);
        assert_eq!(queue.cursor(), 0);
    }

    #[test]
    fn clear_resets_cursor() {
        let mut queue = queue_of(&["a", "b", "c"]);
        queue.set_cursor(2);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.cursor(), 0);
        assert!(queue.next_song().is_none());
    }

    #[test]
    fn shuffle_keeps_prefix_and_multiset() {
        let names: Vec<String> = (0..12).map(|i| format!("s{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut queue = queue_of(&refs);
        queue.set_cursor(4);

        let before = ids(&queue);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..5 {
            queue.shuffle_with(&mut rng);
        }
        let after = ids(&queue);

        assert_eq!(before[..=4], after[..=4]);
        let mut tail_before = before[5..].to_vec();
        let mut tail_after = after[5..].to_vec();
        tail_before.sort();
        tail_after.sort();
        assert_eq!(tail_before, tail_after);
        assert_eq!(queue.cursor(), 4);
    }

    #[test]
    fn shuffle_is_noop_with_one_song_after_cursor() {
        let mut queue = queue_of(&["a", "b", "c"]);
        queue.set_cursor(1);
        queue.shuffle_with(&mut StdRng::seed_from_u64(1));
        assert_eq!(ids(&queue), vec!["a", "b", "c"]);
    }

    #[test]
    fn remove_at_rejects_invalid_index() {
        let mut queue = queue_of(&["a", "b"]);
        let err = queue.remove_at(2).unwrap_err();
        assert!(matches!(err, MusicError::OutOfRange { index: 2, len: 2 }));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn remove_then_view_stays_in_bounds() {
        for len in 1..25usize {
            for cursor in 0..=len {
                for index in 0..len {
                    let names: Vec<String> = (0..len).map(|i| format!("s{i}")).collect();
                    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
                    let mut queue = queue_of(&refs);
                    queue.set_cursor(cursor);

                    let removed = queue.remove_at(index).unwrap();
                    assert_eq!(removed.youtube_id.as_deref(), Some(names[index].as_str()));
                    assert!(queue.cursor() <= queue.len());

                    let view = queue.windowed_view(DEFAULT_WINDOW);
                    assert!(view.entries.len() <= DEFAULT_WINDOW);
                    assert!(view.entries.iter().all(|e| e.index < queue.len()));
                }
            }
        }
    }

    #[test]
    fn window_rules() {
        assert_eq!(window_bounds(0, 0, 10), None);
        assert_eq!(window_bounds(7, 3, 10), Some((0, 7)));
        assert_eq!(window_bounds(10, 9, 10), Some((0, 10)));
        // cursor - 1 + max > len: trailing window
        assert_eq!(window_bounds(15, 8, 10), Some((5, 15)));
        assert_eq!(window_bounds(15, 15, 10), Some((5, 15)));
        // otherwise start just before the cursor
        assert_eq!(window_bounds(30, 0, 10), Some((0, 10)));
        assert_eq!(window_bounds(30, 5, 10), Some((4, 14)));
        assert_eq!(window_bounds(15, 6, 10), Some((5, 15)));
    }

    #[test]
    fn empty_view_renders_marker() {
        let queue = SongQueue::new();
        assert_eq!(queue.windowed_view(DEFAULT_WINDOW).to_string(), "(empty)");
    }

    #[test]
    fn view_marks_only_the_cursor() {
        let mut queue = queue_of(&["a", "b", "c"]);
        queue.set_cursor(1);
        let view = queue.windowed_view(DEFAULT_WINDOW);

        assert_eq!(view.entries.iter().filter(|e| e.current).count(), 1);
        assert_eq!(view.current().map(|e| e.index), Some(1));
        assert_eq!(
            view.to_string(),
            " -- 0 [**a**](https://youtu.be/a) (3m0s)\n \
             ⭄ 1 [**b**](https://youtu.be/b) (3m0s)\n \
             -- 2 [**c**](https://youtu.be/c) (3m0s)\n"
        );
    }

    #[test]
    fn row_titles_are_cleaned_and_truncated() {
        let song = resolved("id", "Artist - Song (Official Video) [HD] with a very long tail", 200);
        let entry = QueueEntry::new(0, &song, false);
        // 41 - len("3m20s") characters before stripping brackets
        assert_eq!(entry.title, "Artist - Song Official Video HD ");
    }

    #[test]
    fn advance_policies() {
        let mut queue = queue_of(&["a", "b", "c"]);

        queue.set_cursor(1);
        queue.advance(LoopMode::Track);
        assert_eq!(queue.cursor(), 1);

        queue.advance(LoopMode::Off);
        assert_eq!(queue.cursor(), 2);

        queue.advance(LoopMode::Off);
        assert_eq!(queue.cursor(), 3);
        assert!(queue.next_song().is_none());

        queue.set_cursor(2);
        queue.advance(LoopMode::Queue);
        assert_eq!(queue.cursor(), 0);

        queue.set_cursor(3);
        queue.advance(LoopMode::Off);
        assert_eq!(queue.cursor(), 3);
    }
}
