//! Upstream event-code enumeration.
//!
//! The engine multiplexes everything over one event-code field: session
//! lifecycle in the 1xx range, audio task submission at 200, synthesized
//! speech in the 3xx range and subtitle text in the 65x range. The numeric
//! values here follow the engine's published id families; `EventType` is
//! the single place to adjust if the live contract differs.

/// Event codes exchanged with the upstream translation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Client -> engine: open a translation session.
    StartSession,
    /// Client -> engine: no more audio will follow.
    FinishSession,
    /// Engine -> client: the session is ready for audio.
    SessionStarted,
    /// Engine -> client: the session was canceled server-side.
    SessionCanceled,
    /// Engine -> client: the session ended normally.
    SessionFinished,
    /// Engine -> client: the session failed; the response metadata carries
    /// a human-readable message.
    SessionFailed,
    /// Engine -> client: usage/billing telemetry. Ignored by the bridge.
    UsageResponse,
    /// Client -> engine: one audio chunk.
    TaskRequest,
    /// Engine -> client: the input audio was muted upstream. Telemetry.
    AudioMuted,
    /// Engine -> client: first synthesized fragment of a sentence.
    TtsSentenceStart,
    /// Engine -> client: synthesized sentence complete. Marks the turn
    /// boundary for the bridge.
    TtsSentenceEnd,
    /// Engine -> client: one synthesized audio fragment.
    TtsResponse,
    /// Engine -> client: recognition of a new source utterance began.
    SourceSubtitleStart,
    /// Engine -> client: interim source-language text.
    SourceSubtitleResponse,
    /// Engine -> client: final source-language text for the utterance.
    SourceSubtitleEnd,
    /// Engine -> client: translation of a new utterance began.
    TranslationSubtitleStart,
    /// Engine -> client: interim target-language text.
    TranslationSubtitleResponse,
    /// Engine -> client: final target-language text for the utterance.
    TranslationSubtitleEnd,
}

impl EventType {
    /// Numeric wire code for this event.
    pub fn code(self) -> u64 {
        match self {
            EventType::StartSession => 100,
            EventType::FinishSession => 102,
            EventType::SessionStarted => 150,
            EventType::SessionCanceled => 151,
            EventType::SessionFinished => 152,
            EventType::SessionFailed => 153,
            EventType::UsageResponse => 154,
            EventType::TaskRequest => 200,
            EventType::AudioMuted => 250,
            EventType::TtsSentenceStart => 350,
            EventType::TtsSentenceEnd => 351,
            EventType::TtsResponse => 352,
            EventType::SourceSubtitleStart => 650,
            EventType::SourceSubtitleResponse => 651,
            EventType::SourceSubtitleEnd => 652,
            EventType::TranslationSubtitleStart => 653,
            EventType::TranslationSubtitleResponse => 654,
            EventType::TranslationSubtitleEnd => 655,
        }
    }

    /// Map a wire code back to an event. Unknown codes return `None` and
    /// are treated as ignorable telemetry by the router.
    pub fn from_code(code: u64) -> Option<Self> {
        Some(match code {
            100 => EventType::StartSession,
            102 => EventType::FinishSession,
            150 => EventType::SessionStarted,
            151 => EventType::SessionCanceled,
            152 => EventType::SessionFinished,
            153 => EventType::SessionFailed,
            154 => EventType::UsageResponse,
            200 => EventType::TaskRequest,
            250 => EventType::AudioMuted,
            350 => EventType::TtsSentenceStart,
            351 => EventType::TtsSentenceEnd,
            352 => EventType::TtsResponse,
            650 => EventType::SourceSubtitleStart,
            651 => EventType::SourceSubtitleResponse,
            652 => EventType::SourceSubtitleEnd,
            653 => EventType::TranslationSubtitleStart,
            654 => EventType::TranslationSubtitleResponse,
            655 => EventType::TranslationSubtitleEnd,
            _ => return None,
        })
    }

    /// Human-readable name for logs.
    pub fn name(self) -> &'static str {
        match self {
            EventType::StartSession => "StartSession",
            EventType::FinishSession => "FinishSession",
            EventType::SessionStarted => "SessionStarted",
            EventType::SessionCanceled => "SessionCanceled",
            EventType::SessionFinished => "SessionFinished",
            EventType::SessionFailed => "SessionFailed",
            EventType::UsageResponse => "UsageResponse",
            EventType::TaskRequest => "TaskRequest",
            EventType::AudioMuted => "AudioMuted",
            EventType::TtsSentenceStart => "TTSSentenceStart",
            EventType::TtsSentenceEnd => "TTSSentenceEnd",
            EventType::TtsResponse => "TTSResponse",
            EventType::SourceSubtitleStart => "SourceSubtitleStart",
            EventType::SourceSubtitleResponse => "SourceSubtitleResponse",
            EventType::SourceSubtitleEnd => "SourceSubtitleEnd",
            EventType::TranslationSubtitleStart => "TranslationSubtitleStart",
            EventType::TranslationSubtitleResponse => "TranslationSubtitleResponse",
            EventType::TranslationSubtitleEnd => "TranslationSubtitleEnd",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [EventType; 18] = [
        EventType::StartSession,
        EventType::FinishSession,
        EventType::SessionStarted,
        EventType::SessionCanceled,
        EventType::SessionFinished,
        EventType::SessionFailed,
        EventType::UsageResponse,
        EventType::TaskRequest,
        EventType::AudioMuted,
        EventType::TtsSentenceStart,
        EventType::TtsSentenceEnd,
        EventType::TtsResponse,
        EventType::SourceSubtitleStart,
        EventType::SourceSubtitleResponse,
        EventType::SourceSubtitleEnd,
        EventType::TranslationSubtitleStart,
        EventType::TranslationSubtitleResponse,
        EventType::TranslationSubtitleEnd,
    ];

    #[test]
    fn test_code_mapping_round_trips() {
        for ev in ALL {
            assert_eq!(EventType::from_code(ev.code()), Some(ev));
        }
    }

    #[test]
    fn test_unknown_codes_map_to_none() {
        for code in [0u64, 1, 99, 500, 999] {
            assert_eq!(EventType::from_code(code), None);
        }
    }
}
