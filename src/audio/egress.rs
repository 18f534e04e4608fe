//! # Playback Egress
//!
//! Orders synthesized-speech fragments for the browser. Fragments belong
//! to turns; the front turn's fragments are handed to the client the
//! moment they arrive, while fragments of later turns are buffered until
//! every earlier turn has retired. A turn retires once it is complete and
//! all of its fragments have been handed off, and retiring cascades into
//! flushing the next turn's buffer.
//!
//! The queue never inspects the audio bytes. Opus pages pass through
//! opaque; decoding happens in the browser.

use crate::router::AudioFragment;
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug)]
struct Turn {
    turn_id: u64,
    buffered: VecDeque<AudioFragment>,
    complete: bool,
}

/// Per-session FIFO of turns with in-turn fragment ordering.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    turns: VecDeque<Turn>,
    muted: bool,
    /// Fragments dropped because playback was muted.
    discarded_fragments: u64,
    /// Fragments handed to the client over the queue's lifetime.
    released_fragments: u64,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn discarded_fragments(&self) -> u64 {
        self.discarded_fragments
    }

    pub fn released_fragments(&self) -> u64 {
        self.released_fragments
    }

    /// Turns currently held (front in-flight turn included).
    pub fn pending_turns(&self) -> usize {
        self.turns.len()
    }

    /// Accept one fragment. Returns the fragments releasable right now:
    /// the fragment itself when its turn is at the front, nothing when it
    /// had to be buffered or was discarded by mute.
    pub fn push(&mut self, fragment: AudioFragment) -> Vec<AudioFragment> {
        if self.muted {
            // Mute discards new arrivals only; fragments buffered before
            // the mute stay queued.
            self.discarded_fragments += 1;
            return Vec::new();
        }

        let turn_id = fragment.turn_id;
        if !self.turns.iter().any(|t| t.turn_id == turn_id) {
            self.turns.push_back(Turn {
                turn_id,
                buffered: VecDeque::new(),
                complete: false,
            });
        }

        let at_front = self
            .turns
            .front()
            .map(|t| t.turn_id == turn_id)
            .unwrap_or(false);

        if at_front {
            self.released_fragments += 1;
            vec![fragment]
        } else {
            if let Some(turn) = self.turns.iter_mut().find(|t| t.turn_id == turn_id) {
                turn.buffered.push_back(fragment);
            }
            Vec::new()
        }
    }

    /// Mark a turn complete. Returns fragments of later turns that become
    /// releasable once the completed turn (and any already-drained
    /// successors) retire.
    pub fn complete_turn(&mut self, turn_id: u64) -> Vec<AudioFragment> {
        if let Some(turn) = self.turns.iter_mut().find(|t| t.turn_id == turn_id) {
            turn.complete = true;
        }
        self.advance()
    }

    /// Discard newly arriving fragments until unmuted.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Drop every queued turn and fragment. Used on client stop and on
    /// session teardown.
    pub fn stop(&mut self) {
        let dropped: usize = self.turns.iter().map(|t| t.buffered.len()).sum();
        if dropped > 0 {
            debug!(dropped_fragments = dropped, "Playback queue cleared");
        }
        self.turns.clear();
    }

    /// Retire drained complete turns from the front, flushing each newly
    /// fronted turn's buffer. Flushed turns that are themselves complete
    /// retire in the same pass.
    fn advance(&mut self) -> Vec<AudioFragment> {
        let mut released = Vec::new();

        loop {
            match self.turns.front_mut() {
                Some(front) => {
                    while let Some(fragment) = front.buffered.pop_front() {
                        self.released_fragments += 1;
                        released.push(fragment);
                    }
                    if front.complete {
                        self.turns.pop_front();
                    } else {
                        break;
                    }
                }
                None => break,
            }
        }

        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(turn_id: u64, sequence_in_turn: u64) -> AudioFragment {
        AudioFragment {
            bytes: vec![turn_id as u8, sequence_in_turn as u8],
            turn_id,
            sequence_in_turn,
        }
    }

    #[test]
    fn test_front_turn_releases_immediately() {
        let mut q = PlaybackQueue::new();
        assert_eq!(q.push(fragment(1, 1)).len(), 1);
        assert_eq!(q.push(fragment(1, 2)).len(), 1);
        assert_eq!(q.released_fragments(), 2);
    }

    #[test]
    fn test_later_turn_buffers_until_front_retires() {
        let mut q = PlaybackQueue::new();
        assert_eq!(q.push(fragment(1, 1)).len(), 1);

        // Turn 2 audio arrives while turn 1 is still open.
        assert!(q.push(fragment(2, 1)).is_empty());
        assert!(q.push(fragment(2, 2)).is_empty());
        assert_eq!(q.pending_turns(), 2);

        // Completing turn 1 flushes turn 2's buffer in order.
        let released = q.complete_turn(1);
        assert_eq!(
            released
                .iter()
                .map(|f| (f.turn_id, f.sequence_in_turn))
                .collect::<Vec<_>>(),
            vec![(2, 1), (2, 2)]
        );

        // Turn 2 is now the front; its next fragment releases directly.
        assert_eq!(q.push(fragment(2, 3)).len(), 1);
    }

    #[test]
    fn test_retire_cascades_through_complete_turns() {
        let mut q = PlaybackQueue::new();
        q.push(fragment(1, 1));
        q.push(fragment(2, 1));
        q.push(fragment(3, 1));
        q.complete_turn(2);
        q.complete_turn(3);

        // One completion retires turns 1..3 and flushes everything queued.
        let released = q.complete_turn(1);
        assert_eq!(
            released.iter().map(|f| f.turn_id).collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert_eq!(q.pending_turns(), 0);
    }

    #[test]
    fn test_completing_turn_without_fragments_is_harmless() {
        let mut q = PlaybackQueue::new();
        assert!(q.complete_turn(1).is_empty());
        assert_eq!(q.pending_turns(), 0);
    }

    #[test]
    fn test_mute_discards_new_but_keeps_buffered() {
        let mut q = PlaybackQueue::new();
        q.push(fragment(1, 1));
        q.push(fragment(2, 1));

        q.set_muted(true);
        assert!(q.push(fragment(2, 2)).is_empty());
        assert!(q.push(fragment(1, 2)).is_empty());
        assert_eq!(q.discarded_fragments(), 2);

        // The pre-mute buffered fragment still flushes on retire.
        q.set_muted(false);
        let released = q.complete_turn(1);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].turn_id, 2);
    }

    #[test]
    fn test_stop_clears_everything() {
        let mut q = PlaybackQueue::new();
        q.push(fragment(1, 1));
        q.push(fragment(2, 1));
        q.stop();
        assert_eq!(q.pending_turns(), 0);
        assert!(q.complete_turn(1).is_empty());

        // A new turn after stop starts at the front again.
        assert_eq!(q.push(fragment(3, 1)).len(), 1);
    }
}
