//! Typed request builders and the response parser.
//!
//! The schema is fixed: the bridge exchanges exactly one request shape and
//! one response shape with the engine, so no dynamic schema is loaded. The
//! field numbers below are the whole recognized vocabulary; anything else
//! in an inbound frame is skipped by wire type.

use crate::config::AudioConfig;
use crate::error::BridgeError;
use crate::protocol::events::EventType;
use crate::protocol::wire::{WireReader, WireWriter, WIRE_LEN, WIRE_VARINT};

/// Top-level request fields.
mod req {
    pub const EVENT: u32 = 1;
    pub const REQUEST_META: u32 = 2;
    pub const USER: u32 = 3;
    pub const SOURCE_AUDIO: u32 = 4;
    pub const TARGET_AUDIO: u32 = 5;
    pub const REQUEST_PARAMS: u32 = 6;
}

/// Request/response metadata block fields.
mod meta {
    pub const SESSION_ID: u32 = 1;
    pub const SEQUENCE: u32 = 2;
    pub const MESSAGE: u32 = 3;
}

/// User-info block fields.
mod user {
    pub const UID: u32 = 1;
    pub const DID: u32 = 2;
    pub const PLATFORM: u32 = 3;
    pub const SDK_VERSION: u32 = 4;
}

/// Audio block fields (shared by source and target audio).
mod audio {
    pub const FORMAT: u32 = 1;
    pub const RATE: u32 = 2;
    pub const BITS: u32 = 3;
    pub const CHANNEL: u32 = 4;
    pub const BINARY_DATA: u32 = 5;
}

/// Request-parameters block fields.
mod params {
    pub const MODE: u32 = 1;
    pub const SOURCE_LANGUAGE: u32 = 2;
    pub const TARGET_LANGUAGE: u32 = 3;
}

/// Top-level response fields.
mod resp {
    pub const EVENT: u32 = 1;
    pub const RESPONSE_META: u32 = 2;
    pub const TEXT: u32 = 3;
    pub const DATA: u32 = 4;
    pub const SPK_CHG: u32 = 5;
    pub const START_TIME: u32 = 6;
    pub const END_TIME: u32 = 7;
}

const USER_ID: &str = "meeting_translate_bridge";
const USER_PLATFORM: &str = "web";
const USER_SDK_VERSION: &str = "1.0.0";

fn meta_block(session_id: &str) -> WireWriter {
    let mut w = WireWriter::new();
    w.string_field(meta::SESSION_ID, session_id);
    w
}

/// Build the StartSession frame: session id, identity block, audio format
/// parameters for both directions, and the language pair.
pub fn build_start_session(
    session_id: &str,
    source_language: &str,
    target_language: &str,
    audio_cfg: &AudioConfig,
) -> Vec<u8> {
    let mut frame = WireWriter::new();
    frame.varint_field(req::EVENT, EventType::StartSession.code());
    frame.message_field(req::REQUEST_META, meta_block(session_id));

    let mut user_block = WireWriter::new();
    user_block.string_field(user::UID, USER_ID);
    user_block.string_field(user::DID, USER_ID);
    user_block.string_field(user::PLATFORM, USER_PLATFORM);
    user_block.string_field(user::SDK_VERSION, USER_SDK_VERSION);
    frame.message_field(req::USER, user_block);

    let mut source_audio = WireWriter::new();
    source_audio.string_field(audio::FORMAT, &audio_cfg.source_format);
    source_audio.varint_field(audio::RATE, u64::from(audio_cfg.source_rate));
    source_audio.varint_field(audio::BITS, u64::from(audio_cfg.source_bits));
    source_audio.varint_field(audio::CHANNEL, u64::from(audio_cfg.source_channels));
    frame.message_field(req::SOURCE_AUDIO, source_audio);

    let mut target_audio = WireWriter::new();
    target_audio.string_field(audio::FORMAT, &audio_cfg.target_format);
    target_audio.varint_field(audio::RATE, u64::from(audio_cfg.target_rate));
    frame.message_field(req::TARGET_AUDIO, target_audio);

    let mut request_params = WireWriter::new();
    request_params.string_field(params::MODE, &audio_cfg.mode);
    request_params.string_field(params::SOURCE_LANGUAGE, source_language);
    request_params.string_field(params::TARGET_LANGUAGE, target_language);
    frame.message_field(req::REQUEST_PARAMS, request_params);

    frame.finish()
}

/// Build a TaskRequest frame carrying one PCM chunk.
pub fn build_audio_chunk(session_id: &str, pcm: &[u8]) -> Vec<u8> {
    let mut frame = WireWriter::new();
    frame.varint_field(req::EVENT, EventType::TaskRequest.code());
    frame.message_field(req::REQUEST_META, meta_block(session_id));

    let mut source_audio = WireWriter::new();
    source_audio.bytes_field(audio::BINARY_DATA, pcm);
    frame.message_field(req::SOURCE_AUDIO, source_audio);

    frame.finish()
}

/// Build the FinishSession frame.
pub fn build_finish(session_id: &str) -> Vec<u8> {
    let mut frame = WireWriter::new();
    frame.varint_field(req::EVENT, EventType::FinishSession.code());
    frame.message_field(req::REQUEST_META, meta_block(session_id));
    frame.finish()
}

/// One decoded inbound frame from the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslateResponse {
    /// Raw event code as received; may be outside [`EventType`].
    pub event: u64,
    pub session_id: String,
    /// Per-direction sequence number from the response metadata.
    pub sequence: i64,
    /// Failure message, populated on SessionFailed.
    pub message: String,
    /// Recognized or translated text for subtitle events.
    pub text: String,
    /// Synthesized audio bytes for TTS events (opus in ogg).
    pub data: Vec<u8>,
    /// Speaker-change flag for subtitle events.
    pub speaker_change: bool,
    /// Utterance timing, milliseconds from session start.
    pub start_time_ms: i64,
    pub end_time_ms: i64,
}

impl TranslateResponse {
    /// Decode one inbound frame. Unknown fields are skipped; truncation
    /// anywhere is a framing error.
    pub fn parse(buf: &[u8]) -> Result<Self, BridgeError> {
        let mut out = TranslateResponse::default();
        let mut r = WireReader::new(buf);

        while !r.is_at_end() {
            let (field, wire_type) = r.read_tag()?;
            match (field, wire_type) {
                (resp::EVENT, WIRE_VARINT) => out.event = r.read_varint()?,
                (resp::RESPONSE_META, WIRE_LEN) => {
                    let block = r.read_length_delimited()?;
                    out.parse_meta(block)?;
                }
                (resp::TEXT, WIRE_LEN) => {
                    out.text = read_string(&mut r)?;
                }
                (resp::DATA, WIRE_LEN) => {
                    out.data = r.read_length_delimited()?.to_vec();
                }
                (resp::SPK_CHG, WIRE_VARINT) => out.speaker_change = r.read_varint()? != 0,
                (resp::START_TIME, WIRE_VARINT) => out.start_time_ms = r.read_varint()? as i64,
                (resp::END_TIME, WIRE_VARINT) => out.end_time_ms = r.read_varint()? as i64,
                (_, wt) => r.skip_value(wt)?,
            }
        }

        Ok(out)
    }

    fn parse_meta(&mut self, block: &[u8]) -> Result<(), BridgeError> {
        let mut r = WireReader::new(block);
        while !r.is_at_end() {
            let (field, wire_type) = r.read_tag()?;
            match (field, wire_type) {
                (meta::SESSION_ID, WIRE_LEN) => self.session_id = read_string(&mut r)?,
                (meta::SEQUENCE, WIRE_VARINT) => self.sequence = r.read_varint()? as i64,
                (meta::MESSAGE, WIRE_LEN) => self.message = read_string(&mut r)?,
                (_, wt) => r.skip_value(wt)?,
            }
        }
        Ok(())
    }

    /// The recognized event, if the code belongs to the fixed enumeration.
    pub fn event_type(&self) -> Option<EventType> {
        EventType::from_code(self.event)
    }
}

fn read_string(r: &mut WireReader<'_>) -> Result<String, BridgeError> {
    let start = r.position();
    let bytes = r.read_length_delimited()?;
    String::from_utf8(bytes.to_vec()).map_err(|_| {
        BridgeError::Framing(format!("invalid UTF-8 in string field at offset {}", start))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encode a response frame the way the engine would, for parser tests.
    fn encode_response(
        event: EventType,
        session_id: &str,
        sequence: i64,
        message: &str,
        text: &str,
        data: &[u8],
        speaker_change: bool,
    ) -> Vec<u8> {
        let mut frame = WireWriter::new();
        frame.varint_field(resp::EVENT, event.code());

        let mut meta_w = WireWriter::new();
        meta_w.string_field(meta::SESSION_ID, session_id);
        meta_w.int_field(meta::SEQUENCE, sequence);
        if !message.is_empty() {
            meta_w.string_field(meta::MESSAGE, message);
        }
        frame.message_field(resp::RESPONSE_META, meta_w);

        if !text.is_empty() {
            frame.string_field(resp::TEXT, text);
        }
        if !data.is_empty() {
            frame.bytes_field(resp::DATA, data);
        }
        if speaker_change {
            frame.bool_field(resp::SPK_CHG, true);
        }
        frame.finish()
    }

    #[test]
    fn test_response_round_trip() {
        let buf = encode_response(
            EventType::SourceSubtitleEnd,
            "sess-1",
            7,
            "",
            "你好",
            &[],
            true,
        );
        let parsed = TranslateResponse::parse(&buf).unwrap();
        assert_eq!(parsed.event_type(), Some(EventType::SourceSubtitleEnd));
        assert_eq!(parsed.session_id, "sess-1");
        assert_eq!(parsed.sequence, 7);
        assert_eq!(parsed.text, "你好");
        assert!(parsed.speaker_change);
        assert!(parsed.data.is_empty());
    }

    #[test]
    fn test_response_with_audio_payload() {
        let opus = vec![0x4f, 0x67, 0x67, 0x53, 0x00, 0x01];
        let buf = encode_response(EventType::TtsResponse, "sess-2", 3, "", "", &opus, false);
        let parsed = TranslateResponse::parse(&buf).unwrap();
        assert_eq!(parsed.event_type(), Some(EventType::TtsResponse));
        assert_eq!(parsed.data, opus);
        assert!(parsed.text.is_empty());
    }

    #[test]
    fn test_failure_message_carried_verbatim() {
        let buf = encode_response(
            EventType::SessionFailed,
            "sess-3",
            0,
            "invalid resource id",
            "",
            &[],
            false,
        );
        let parsed = TranslateResponse::parse(&buf).unwrap();
        assert_eq!(parsed.message, "invalid resource id");
    }

    #[test]
    fn test_unknown_event_code_is_preserved() {
        let mut frame = WireWriter::new();
        frame.varint_field(resp::EVENT, 999);
        let parsed = TranslateResponse::parse(&frame.finish()).unwrap();
        assert_eq!(parsed.event, 999);
        assert_eq!(parsed.event_type(), None);
    }

    #[test]
    fn test_unknown_fields_are_skipped() {
        let mut frame = WireWriter::new();
        frame.varint_field(resp::EVENT, EventType::SessionStarted.code());
        frame.string_field(40, "future extension");
        frame.varint_field(41, 17);
        let parsed = TranslateResponse::parse(&frame.finish()).unwrap();
        assert_eq!(parsed.event_type(), Some(EventType::SessionStarted));
    }

    #[test]
    fn test_truncated_frame_is_framing_error() {
        let buf = encode_response(
            EventType::TranslationSubtitleEnd,
            "sess-4",
            1,
            "",
            "Hello",
            &[],
            false,
        );
        // Chop mid length-delimited value.
        let err = TranslateResponse::parse(&buf[..buf.len() - 2]).unwrap_err();
        assert!(matches!(err, BridgeError::Framing(_)));
    }

    #[test]
    fn test_empty_frame_decodes_to_defaults() {
        let parsed = TranslateResponse::parse(&[]).unwrap();
        assert_eq!(parsed, TranslateResponse::default());
    }

    #[test]
    fn test_start_session_frame_round_trips_through_reader() {
        let cfg = AudioConfig::default();
        let buf = build_start_session("sess-9", "zh", "en", &cfg);

        // The response parser only knows the response schema, but the raw
        // reader must be able to walk every field of the request frame.
        let mut r = WireReader::new(&buf);
        let mut saw_event = false;
        let mut saw_params = false;
        while !r.is_at_end() {
            let (field, wt) = r.read_tag().unwrap();
            match field {
                req::EVENT => {
                    assert_eq!(r.read_varint().unwrap(), EventType::StartSession.code());
                    saw_event = true;
                }
                req::REQUEST_PARAMS => {
                    let block = r.read_length_delimited().unwrap();
                    let mut pr = WireReader::new(block);
                    let mut langs = Vec::new();
                    while !pr.is_at_end() {
                        let (f, _) = pr.read_tag().unwrap();
                        let v = String::from_utf8(pr.read_length_delimited().unwrap().to_vec())
                            .unwrap();
                        if f == params::SOURCE_LANGUAGE || f == params::TARGET_LANGUAGE {
                            langs.push(v);
                        }
                    }
                    assert_eq!(langs, vec!["zh", "en"]);
                    saw_params = true;
                }
                _ => r.skip_value(wt).unwrap(),
            }
        }
        assert!(saw_event && saw_params);
    }

    #[test]
    fn test_audio_chunk_frame_carries_session_and_bytes() {
        let pcm = vec![1u8, 2, 3, 4];
        let buf = build_audio_chunk("sess-7", &pcm);

        let mut r = WireReader::new(&buf);
        let mut found_pcm = false;
        let mut found_session = false;
        while !r.is_at_end() {
            let (field, wt) = r.read_tag().unwrap();
            match field {
                req::SOURCE_AUDIO => {
                    let block = r.read_length_delimited().unwrap();
                    let mut ar = WireReader::new(block);
                    let (f, _) = ar.read_tag().unwrap();
                    assert_eq!(f, audio::BINARY_DATA);
                    assert_eq!(ar.read_length_delimited().unwrap(), pcm.as_slice());
                    found_pcm = true;
                }
                req::REQUEST_META => {
                    let block = r.read_length_delimited().unwrap();
                    let mut mr = WireReader::new(block);
                    let (f, _) = mr.read_tag().unwrap();
                    assert_eq!(f, meta::SESSION_ID);
                    assert_eq!(mr.read_length_delimited().unwrap(), b"sess-7");
                    found_session = true;
                }
                _ => r.skip_value(wt).unwrap(),
            }
        }
        assert!(found_pcm && found_session);
    }
}
