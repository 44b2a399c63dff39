//! Queue navigation for the host.
//!
//! Both functions return the next shared now-playing value, or `None` when
//! the current value should stay as it is. Play/pause intent carries over
//! from the current value.

use crate::model::{NowPlaying, QueueItem};

fn current_index(queue: &[QueueItem], current: Option<&NowPlaying>) -> Option<usize> {
    let queue_id = current?.queue_id.as_deref()?;
    queue.iter().position(|item| item.queue_id == queue_id)
}

fn intent(current: Option<&NowPlaying>) -> bool {
    current.map_or(true, |np| np.track.is_none() || np.is_playing)
}

/// Moves to the entry after the current one.
///
/// With nothing current (or a current entry no longer in the queue) playback
/// starts at the first entry. At the last entry, wraps when `loop_queue` is
/// set and otherwise does nothing.
pub fn play_next(
    queue: &[QueueItem],
    current: Option<&NowPlaying>,
    loop_queue: bool,
) -> Option<NowPlaying> {
    let first = queue.first()?;
    let is_playing = intent(current);

    let Some(index) = current_index(queue, current) else {
        return Some(NowPlaying::for_item(first, is_playing));
    };

    match queue.get(index + 1) {
        Some(next) => Some(NowPlaying::for_item(next, is_playing)),
        None if loop_queue => Some(NowPlaying::for_item(first, is_playing)),
        None => None,
    }
}

/// Moves to the entry before the current one.
///
/// At the first entry, wraps to the last when `loop_queue` is set and
/// otherwise restarts the first entry.
pub fn play_previous(
    queue: &[QueueItem],
    current: Option<&NowPlaying>,
    loop_queue: bool,
) -> Option<NowPlaying> {
    let first = queue.first()?;
    let is_playing = intent(current);

    let target = match current_index(queue, current) {
        Some(0) if loop_queue => queue.last().unwrap_or(first),
        Some(0) | None => first,
        Some(index) => &queue[index - 1],
    };
    Some(NowPlaying::for_item(target, is_playing))
}
