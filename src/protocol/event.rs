//! Decoding of individual `data: <json>` frames into typed stream events.

use serde::Deserialize;

use super::message::{ChartConfig, TableRow, ToolTrace};
use crate::error::ChatError;

/// Prefix every meaningful frame starts with.
pub const DATA_PREFIX: &str = "data: ";
/// Payload marking normal end of the event stream.
pub const DONE_SENTINEL: &str = "[DONE]";

const LOG_PREVIEW_CHARS: usize = 120;

/// A typed event carried by one frame.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum StreamEvent {
    /// Answer text delta.
    Text(String),
    /// Reasoning trace delta.
    Thought(String),
    /// Full replacement of the tabular result.
    Table(Option<Vec<TableRow>>),
    /// Full replacement of chart data and chart config.
    Chart {
        data: Option<Vec<serde_json::Value>>,
        config: Option<ChartConfig>,
    },
    /// Tool execution status update.
    Trace(ToolTrace),
    /// Keep-alive sent by the backend when the stream opens.
    Ping,
    /// Failure reported in-band by the backend.
    Error(String),
}

impl StreamEvent {
    /// Wire name of this event's kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Text(_) => "text",
            StreamEvent::Thought(_) => "thought",
            StreamEvent::Table(_) => "table",
            StreamEvent::Chart { .. } => "chart",
            StreamEvent::Trace(_) => "trace",
            StreamEvent::Ping => "ping",
            StreamEvent::Error(_) => "error",
        }
    }
}

/// Result of parsing one frame that the caller must act on.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedFrame {
    Event(StreamEvent),
    Done,
}

/// Detailed outcome of decoding one frame, including the ways a frame can be
/// skipped. [`parse_frame`] collapses the skip cases to `None`.
#[derive(Debug)]
pub enum FrameDecode {
    Event(StreamEvent),
    Done,
    /// No `data: ` prefix (blank keep-alive, comment, stray text).
    NotData,
    /// The payload was not valid JSON or did not match its kind's shape.
    Malformed(ChatError),
    /// A `type` this client does not know.
    UnknownKind(String),
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    config: Option<serde_json::Value>,
}

/// Parse one frame into an event, the end-of-stream marker, or nothing.
///
/// Malformed payloads are logged and skipped; they never abort the stream.
#[must_use]
pub fn parse_frame(frame: &str) -> Option<ParsedFrame> {
    match decode_frame(frame) {
        FrameDecode::Event(event) => Some(ParsedFrame::Event(event)),
        FrameDecode::Done => Some(ParsedFrame::Done),
        FrameDecode::NotData | FrameDecode::Malformed(_) | FrameDecode::UnknownKind(_) => None,
    }
}

/// Decode one frame, reporting why it was skipped when it carries no event.
#[must_use]
pub fn decode_frame(frame: &str) -> FrameDecode {
    let Some(payload) = frame.trim().strip_prefix(DATA_PREFIX) else {
        return FrameDecode::NotData;
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return FrameDecode::Done;
    }

    let mut wire: WireEvent = match serde_json::from_str(payload) {
        Ok(wire) => wire,
        Err(err) => {
            tracing::warn!(
                error = %err,
                frame = preview(payload),
                "discarding malformed stream frame"
            );
            return FrameDecode::Malformed(ChatError::Decode(err.to_string()));
        }
    };

    let kind = std::mem::take(&mut wire.kind);
    match into_event(&kind, wire) {
        Ok(Some(event)) => FrameDecode::Event(event),
        Ok(None) => FrameDecode::UnknownKind(kind),
        Err(err) => {
            tracing::warn!(
                error = %err,
                frame = preview(payload),
                "discarding stream frame with unexpected payload shape"
            );
            FrameDecode::Malformed(err)
        }
    }
}

fn into_event(kind: &str, wire: WireEvent) -> Result<Option<StreamEvent>, ChatError> {
    let event = match kind {
        "text" => StreamEvent::Text(wire.content.unwrap_or_default()),
        "thought" => StreamEvent::Thought(wire.content.unwrap_or_default()),
        "table" => StreamEvent::Table(decode_optional(wire.data, "table")?),
        "chart" => StreamEvent::Chart {
            data: decode_optional(wire.data, "chart data")?,
            config: decode_optional(wire.config, "chart config")?,
        },
        "trace" => {
            let data = wire
                .data
                .ok_or_else(|| ChatError::Decode("trace event without data".to_string()))?;
            StreamEvent::Trace(decode_value(data, "trace")?)
        }
        "ping" => StreamEvent::Ping,
        "error" => StreamEvent::Error(
            wire.content.unwrap_or_else(|| "Unknown error".to_string()),
        ),
        other => {
            tracing::debug!(kind = other, "ignoring unknown stream event kind");
            return Ok(None);
        }
    };
    Ok(Some(event))
}

fn decode_optional<T>(value: Option<serde_json::Value>, what: &str) -> Result<Option<T>, ChatError>
where
    T: serde::de::DeserializeOwned,
{
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => decode_value(value, what).map(Some),
    }
}

fn decode_value<T>(value: serde_json::Value, what: &str) -> Result<T, ChatError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(value).map_err(|err| ChatError::Decode(format!("{what}: {err}")))
}

fn preview(payload: &str) -> &str {
    match payload.char_indices().nth(LOG_PREVIEW_CHARS) {
        Some((idx, _)) => &payload[..idx],
        None => payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{ChartType, TraceStatus};

    fn event(frame: &str) -> StreamEvent {
        match parse_frame(frame) {
            Some(ParsedFrame::Event(event)) => event,
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn test_done_sentinel() {
        assert_eq!(parse_frame("data: [DONE]\n\n"), Some(ParsedFrame::Done));
        assert_eq!(parse_frame("  data:  [DONE]  "), Some(ParsedFrame::Done));
    }

    #[test]
    fn test_not_data_prefixed_is_discarded() {
        assert_eq!(parse_frame("not-data-prefixed"), None);
        assert_eq!(parse_frame(""), None);
        assert_eq!(parse_frame(": keep-alive"), None);
        assert!(matches!(decode_frame("event: x"), FrameDecode::NotData));
    }

    #[test]
    fn test_bad_json_is_discarded_without_panic() {
        assert_eq!(parse_frame("data: {bad json"), None);
        assert!(matches!(
            decode_frame("data: {bad json"),
            FrameDecode::Malformed(ChatError::Decode(_))
        ));
    }

    #[test]
    fn test_unknown_kind_is_discarded() {
        assert_eq!(parse_frame(r#"data: {"type":"citation","data":[1]}"#), None);
        match decode_frame(r#"data: {"type":"citation"}"#) {
            FrameDecode::UnknownKind(kind) => assert_eq!(kind, "citation"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_text_and_thought() {
        assert_eq!(
            event(r#"data: {"type":"text","content":"Hel"}"#),
            StreamEvent::Text("Hel".to_string())
        );
        assert_eq!(
            event(r#"data: {"type":"thought","content":"hmm"}"#),
            StreamEvent::Thought("hmm".to_string())
        );
    }

    #[test]
    fn test_table_with_summary_field() {
        let parsed = event(
            r#"data: {"type":"table","data":[{"model":"A","n":3}],"summary":"Query returned 1 rows."}"#,
        );
        let StreamEvent::Table(Some(rows)) = parsed else {
            panic!("expected table rows");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["model"], "A");
    }

    #[test]
    fn test_table_rows_must_be_objects() {
        assert_eq!(parse_frame(r#"data: {"type":"table","data":[1,2]}"#), None);
    }

    #[test]
    fn test_chart_with_config_only() {
        let parsed = event(r#"data: {"type":"chart","config":{"type":"line","xKey":"d","yKey":"v"}}"#);
        let StreamEvent::Chart { data, config } = parsed else {
            panic!("expected chart");
        };
        assert!(data.is_none());
        assert_eq!(config.unwrap().chart_type, ChartType::Line);
    }

    #[test]
    fn test_trace_payload() {
        let parsed = event(
            r#"data: {"type":"trace","data":{"tool":"execute_sql","status":"pending","args":{"query":"select 1"}}}"#,
        );
        let StreamEvent::Trace(trace) = parsed else {
            panic!("expected trace");
        };
        assert_eq!(trace.tool, "execute_sql");
        assert_eq!(trace.status, TraceStatus::Pending);
        assert!(trace.args.is_some());
    }

    #[test]
    fn test_trace_without_data_is_malformed() {
        assert!(matches!(
            decode_frame(r#"data: {"type":"trace"}"#),
            FrameDecode::Malformed(_)
        ));
    }

    #[test]
    fn test_ping_and_error() {
        assert_eq!(
            event(r#"data: {"type": "ping", "content": "connected"}"#),
            StreamEvent::Ping
        );
        assert_eq!(
            event(r#"data: {"type":"error","content":"db down"}"#),
            StreamEvent::Error("db down".to_string())
        );
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let long = "数".repeat(200);
        assert_eq!(preview(&long).chars().count(), LOG_PREVIEW_CHARS);
    }
}
