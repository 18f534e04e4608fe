//! # Event Router
//!
//! Classifies each decoded upstream event into exactly one category:
//! ASR interim/final, translation interim/final, synthesized audio,
//! lifecycle, or ignorable telemetry. Each event becomes actions for the
//! connection actor: transcript segments for the client, audio fragments
//! for the playback queue, and turn boundaries.
//!
//! The router owns the Turn bookkeeping. A turn opens implicitly with the
//! first event after the previous turn completed; a final ASR or
//! translation event closes that side's contribution but does not end the
//! turn. Only the synthesized-sentence-end lifecycle event (or session
//! finish, for a turn still open at the end) ends a turn, which flushes
//! still-open interim text, marks the turn's audio set releasable, and
//! allocates the next turn.
//!
//! The router is deliberately pure state: it never touches a transport, so
//! the ordering guarantee reduces to "actions come out in the order events
//! went in".

use crate::protocol::{EventType, TranslateResponse};

/// Which side of the translation a segment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Recognized text in the speaker's language.
    Source,
    /// Translated text in the listener's language.
    Target,
}

/// One piece of recognized or translated text.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    pub direction: Direction,
    pub text: String,
    pub language: String,
    pub is_final: bool,
    /// Upstream per-direction sequence number, carried through.
    pub sequence: i64,
    pub turn_id: u64,
    pub speaker_change: bool,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
}

/// One synthesized-audio fragment. Ownership moves to the playback queue.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFragment {
    pub bytes: Vec<u8>,
    pub turn_id: u64,
    pub sequence_in_turn: u64,
}

/// What the connection actor should do with one routed event.
#[derive(Debug, Clone, PartialEq)]
pub enum RouterAction {
    /// Forward a transcript segment to the client.
    Segment(TranscriptSegment),
    /// Hand a synthesized-audio fragment to the playback queue.
    Fragment(AudioFragment),
    /// The turn ended: the playback queue may release it and the client
    /// gets a `turnComplete`.
    TurnComplete { turn_id: u64 },
    /// Upstream acknowledged the session; the client gets `status: ready`.
    SessionReady,
    /// Upstream finished the session normally.
    SessionClosed,
    /// Upstream failed or canceled the session; the message is surfaced
    /// to the client verbatim.
    SessionFailed { message: String },
}

#[derive(Debug, Clone)]
struct PendingText {
    text: String,
    sequence: i64,
    speaker_change: bool,
    start_time_ms: i64,
    end_time_ms: i64,
}

/// Per-session router state. One instance per session, owned by the
/// connection actor; never shared.
#[derive(Debug)]
pub struct EventRouter {
    source_language: String,
    target_language: String,
    turn_id: u64,
    turn_has_content: bool,
    fragment_seq: u64,
    pending_source: Option<PendingText>,
    pending_target: Option<PendingText>,
    telemetry_events: u64,
}

impl EventRouter {
    pub fn new(source_language: &str, target_language: &str) -> Self {
        Self {
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            turn_id: 1,
            turn_has_content: false,
            fragment_seq: 0,
            pending_source: None,
            pending_target: None,
            telemetry_events: 0,
        }
    }

    /// Telemetry events seen and ignored (usage reports, unknown codes).
    pub fn telemetry_events(&self) -> u64 {
        self.telemetry_events
    }

    /// Route one decoded upstream event. Actions come out in the exact
    /// order they must reach downstream consumers.
    pub fn handle(&mut self, resp: &TranslateResponse) -> Vec<RouterAction> {
        let event = match resp.event_type() {
            Some(ev) => ev,
            None => {
                self.telemetry_events += 1;
                return Vec::new();
            }
        };

        match event {
            EventType::SessionStarted => vec![RouterAction::SessionReady],

            EventType::SessionFailed | EventType::SessionCanceled => {
                let message = if resp.message.is_empty() {
                    "session failed".to_string()
                } else {
                    resp.message.clone()
                };
                vec![RouterAction::SessionFailed { message }]
            }

            EventType::SessionFinished => {
                // A turn still open at session end is finalized first so
                // the client sees its text and exactly one turnComplete
                // before the close.
                let mut actions = if self.turn_has_content {
                    self.finish_turn()
                } else {
                    Vec::new()
                };
                actions.push(RouterAction::SessionClosed);
                actions
            }

            EventType::SourceSubtitleStart | EventType::SourceSubtitleResponse => {
                self.interim(Direction::Source, resp)
            }
            EventType::SourceSubtitleEnd => self.finalize(Direction::Source, resp),

            EventType::TranslationSubtitleStart | EventType::TranslationSubtitleResponse => {
                self.interim(Direction::Target, resp)
            }
            EventType::TranslationSubtitleEnd => self.finalize(Direction::Target, resp),

            EventType::TtsSentenceStart | EventType::TtsResponse => self.fragment(resp),

            EventType::TtsSentenceEnd => {
                // Sentence end may still carry trailing audio; queue it
                // before closing the turn.
                let mut actions = self.fragment(resp);
                actions.extend(self.finish_turn());
                actions
            }

            // Request-direction codes echoed back, usage reports and mute
            // notifications carry nothing for downstream consumers.
            EventType::StartSession
            | EventType::FinishSession
            | EventType::TaskRequest
            | EventType::UsageResponse
            | EventType::AudioMuted => {
                self.telemetry_events += 1;
                Vec::new()
            }
        }
    }

    fn language_for(&self, direction: Direction) -> &str {
        match direction {
            Direction::Source => &self.source_language,
            Direction::Target => &self.target_language,
        }
    }

    fn pending_mut(&mut self, direction: Direction) -> &mut Option<PendingText> {
        match direction {
            Direction::Source => &mut self.pending_source,
            Direction::Target => &mut self.pending_target,
        }
    }

    fn segment(
        &self,
        direction: Direction,
        pending: &PendingText,
        is_final: bool,
    ) -> TranscriptSegment {
        TranscriptSegment {
            direction,
            text: pending.text.clone(),
            language: self.language_for(direction).to_string(),
            is_final,
            sequence: pending.sequence,
            turn_id: self.turn_id,
            speaker_change: pending.speaker_change,
            start_time_ms: pending.start_time_ms,
            end_time_ms: pending.end_time_ms,
        }
    }

    fn interim(&mut self, direction: Direction, resp: &TranslateResponse) -> Vec<RouterAction> {
        if resp.text.is_empty() {
            return Vec::new();
        }
        self.turn_has_content = true;
        let pending = PendingText {
            text: resp.text.clone(),
            sequence: resp.sequence,
            speaker_change: resp.speaker_change,
            start_time_ms: resp.start_time_ms,
            end_time_ms: resp.end_time_ms,
        };
        let segment = self.segment(direction, &pending, false);
        *self.pending_mut(direction) = Some(pending);
        vec![RouterAction::Segment(segment)]
    }

    /// A `...End` event closes the side's contribution to the turn: emit
    /// exactly one final segment, preferring the final event's own text
    /// and falling back to the last interim's.
    fn finalize(&mut self, direction: Direction, resp: &TranslateResponse) -> Vec<RouterAction> {
        let previous = self.pending_mut(direction).take();
        let text = if !resp.text.is_empty() {
            resp.text.clone()
        } else if let Some(p) = &previous {
            p.text.clone()
        } else {
            return Vec::new();
        };

        self.turn_has_content = true;
        let pending = PendingText {
            text,
            sequence: resp.sequence,
            speaker_change: resp.speaker_change,
            start_time_ms: resp.start_time_ms,
            end_time_ms: resp.end_time_ms,
        };
        vec![RouterAction::Segment(self.segment(direction, &pending, true))]
    }

    fn fragment(&mut self, resp: &TranslateResponse) -> Vec<RouterAction> {
        if resp.data.is_empty() {
            return Vec::new();
        }
        self.turn_has_content = true;
        self.fragment_seq += 1;
        vec![RouterAction::Fragment(AudioFragment {
            bytes: resp.data.clone(),
            turn_id: self.turn_id,
            sequence_in_turn: self.fragment_seq,
        })]
    }

    /// End the current turn: flush still-open interim text as final
    /// segments, signal the boundary, and allocate the next turn.
    fn finish_turn(&mut self) -> Vec<RouterAction> {
        let mut actions = Vec::new();

        for direction in [Direction::Source, Direction::Target] {
            if let Some(pending) = self.pending_mut(direction).take() {
                actions.push(RouterAction::Segment(self.segment(
                    direction, &pending, true,
                )));
            }
        }

        actions.push(RouterAction::TurnComplete {
            turn_id: self.turn_id,
        });

        self.turn_id += 1;
        self.turn_has_content = false;
        self.fragment_seq = 0;
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> EventRouter {
        EventRouter::new("zh", "en")
    }

    fn event(ev: EventType) -> TranslateResponse {
        TranslateResponse {
            event: ev.code(),
            ..TranslateResponse::default()
        }
    }

    fn text_event(ev: EventType, text: &str, sequence: i64) -> TranslateResponse {
        TranslateResponse {
            event: ev.code(),
            text: text.to_string(),
            sequence,
            ..TranslateResponse::default()
        }
    }

    fn audio_event(ev: EventType, data: &[u8]) -> TranslateResponse {
        TranslateResponse {
            event: ev.code(),
            data: data.to_vec(),
            ..TranslateResponse::default()
        }
    }

    fn segments(actions: &[RouterAction]) -> Vec<&TranscriptSegment> {
        actions
            .iter()
            .filter_map(|a| match a {
                RouterAction::Segment(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_session_started_maps_to_ready() {
        let mut r = router();
        assert_eq!(
            r.handle(&event(EventType::SessionStarted)),
            vec![RouterAction::SessionReady]
        );
    }

    #[test]
    fn test_interims_then_final_emit_one_final_per_side() {
        let mut r = router();
        let mut finals = 0;

        for (i, text) in ["你", "你好", "你好吗"].iter().enumerate() {
            let actions = r.handle(&text_event(
                EventType::SourceSubtitleResponse,
                text,
                i as i64,
            ));
            let segs = segments(&actions);
            assert_eq!(segs.len(), 1);
            assert!(!segs[0].is_final);
        }

        // Final event with its own (superseding) text.
        let actions = r.handle(&text_event(EventType::SourceSubtitleEnd, "你好吗?", 3));
        for seg in segments(&actions) {
            assert!(seg.is_final);
            assert_eq!(seg.text, "你好吗?");
            assert_eq!(seg.language, "zh");
            finals += 1;
        }
        assert_eq!(finals, 1);

        // Ending the turn must not re-emit the already-finalized side.
        let actions = r.handle(&event(EventType::TtsSentenceEnd));
        assert!(segments(&actions).is_empty());
    }

    #[test]
    fn test_final_with_empty_text_uses_last_interim() {
        let mut r = router();
        r.handle(&text_event(EventType::TranslationSubtitleResponse, "Hel", 1));
        r.handle(&text_event(
            EventType::TranslationSubtitleResponse,
            "Hello",
            2,
        ));

        let actions = r.handle(&text_event(EventType::TranslationSubtitleEnd, "", 3));
        let segs = segments(&actions);
        assert_eq!(segs.len(), 1);
        assert!(segs[0].is_final);
        assert_eq!(segs[0].text, "Hello");
        assert_eq!(segs[0].language, "en");
    }

    #[test]
    fn test_final_without_any_text_emits_nothing() {
        let mut r = router();
        let actions = r.handle(&text_event(EventType::SourceSubtitleEnd, "", 1));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_translation_final_then_turn_boundary_order() {
        let mut r = router();

        let actions = r.handle(&text_event(EventType::TranslationSubtitleEnd, "Hello", 5));
        assert_eq!(segments(&actions).len(), 1);
        assert!(!actions
            .iter()
            .any(|a| matches!(a, RouterAction::TurnComplete { .. })));

        let actions = r.handle(&event(EventType::TtsSentenceEnd));
        let completes: Vec<_> = actions
            .iter()
            .filter(|a| matches!(a, RouterAction::TurnComplete { .. }))
            .collect();
        assert_eq!(completes.len(), 1);
    }

    #[test]
    fn test_session_finished_flushes_open_turn_exactly_once() {
        let mut r = router();
        r.handle(&text_event(EventType::SourceSubtitleResponse, "partial", 1));

        let actions = r.handle(&event(EventType::SessionFinished));
        // Flushed interim becomes final, then one turnComplete, then close.
        let segs = segments(&actions);
        assert_eq!(segs.len(), 1);
        assert!(segs[0].is_final);
        assert_eq!(segs[0].text, "partial");

        let completes = actions
            .iter()
            .filter(|a| matches!(a, RouterAction::TurnComplete { .. }))
            .count();
        assert_eq!(completes, 1);
        assert_eq!(actions.last(), Some(&RouterAction::SessionClosed));
    }

    #[test]
    fn test_session_finished_without_content_skips_turn_complete() {
        let mut r = router();
        let actions = r.handle(&event(EventType::SessionFinished));
        assert_eq!(actions, vec![RouterAction::SessionClosed]);
    }

    #[test]
    fn test_fragments_keep_arrival_order_and_turn_ids() {
        let mut r = router();

        let a1 = r.handle(&audio_event(EventType::TtsSentenceStart, &[1]));
        let a2 = r.handle(&audio_event(EventType::TtsResponse, &[2]));
        let a3 = r.handle(&audio_event(EventType::TtsSentenceEnd, &[3]));

        let frags: Vec<AudioFragment> = a1
            .into_iter()
            .chain(a2)
            .chain(a3)
            .filter_map(|a| match a {
                RouterAction::Fragment(f) => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(frags.len(), 3);
        assert!(frags.iter().all(|f| f.turn_id == 1));
        assert_eq!(
            frags.iter().map(|f| f.sequence_in_turn).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        // Next turn's fragments get the next turn id and a fresh sequence.
        let actions = r.handle(&audio_event(EventType::TtsResponse, &[4]));
        match &actions[0] {
            RouterAction::Fragment(f) => {
                assert_eq!(f.turn_id, 2);
                assert_eq!(f.sequence_in_turn, 1);
            }
            other => panic!("expected fragment, got {:?}", other),
        }
    }

    #[test]
    fn test_failure_message_is_verbatim() {
        let mut r = router();
        let mut resp = event(EventType::SessionFailed);
        resp.message = "quota exhausted for resource".to_string();
        assert_eq!(
            r.handle(&resp),
            vec![RouterAction::SessionFailed {
                message: "quota exhausted for resource".to_string()
            }]
        );
    }

    #[test]
    fn test_usage_and_unknown_events_are_counted_telemetry() {
        let mut r = router();
        assert!(r.handle(&event(EventType::UsageResponse)).is_empty());
        let unknown = TranslateResponse {
            event: 9999,
            ..TranslateResponse::default()
        };
        assert!(r.handle(&unknown).is_empty());
        assert_eq!(r.telemetry_events(), 2);
    }
}
