//! Merging of stream events into the in-progress assistant message.

use crate::protocol::event::StreamEvent;
use crate::protocol::message::{Message, ToolTrace};

/// Inserted before error text appended to a message's content.
pub const ERROR_ANNOTATION_PREFIX: &str = "\n\n❌ Error: ";

/// What applying one event did to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The message changed.
    Merged,
    /// A trace re-delivery was recognised and dropped.
    DuplicateTrace,
    /// The event carries nothing for the message (keep-alive).
    Ignored,
}

/// How [`upsert_trace`] placed an incoming trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceUpsert {
    /// Merged into the pending entry at this index.
    Updated(usize),
    Appended,
    Duplicate,
}

/// Record a tool status update in `logs`.
///
/// The first entry for the same tool that is still `pending` absorbs the
/// update in place. Otherwise the update is appended, unless it repeats the
/// last entry's tool, status and message exactly.
pub fn upsert_trace(logs: &mut Vec<ToolTrace>, incoming: ToolTrace) -> TraceUpsert {
    if let Some(index) = logs
        .iter()
        .position(|entry| entry.tool == incoming.tool && entry.status.is_pending())
    {
        logs[index].merge_from(incoming);
        return TraceUpsert::Updated(index);
    }

    if logs
        .last()
        .is_some_and(|last| last.same_report_as(&incoming))
    {
        return TraceUpsert::Duplicate;
    }

    logs.push(incoming);
    TraceUpsert::Appended
}

/// Append an inline error annotation to the message content.
pub fn annotate_error(message: &mut Message, text: &str) {
    message.content.push_str(ERROR_ANNOTATION_PREFIX);
    message.content.push_str(text);
}

/// Apply one event to `message` in place.
///
/// Text and thoughts only ever grow; table and chart payloads replace the
/// previous ones wholesale.
pub fn apply_event(message: &mut Message, event: StreamEvent) -> Applied {
    match event {
        StreamEvent::Text(delta) => message.content.push_str(&delta),
        StreamEvent::Thought(delta) => message
            .thoughts
            .get_or_insert_with(String::new)
            .push_str(&delta),
        StreamEvent::Table(rows) => message.table_data = rows,
        StreamEvent::Chart { data, config } => {
            message.chart_data = data;
            message.chart_config = config;
        }
        StreamEvent::Trace(trace) => {
            let tool = trace.tool.clone();
            match upsert_trace(&mut message.trace_logs, trace) {
                TraceUpsert::Updated(index) => {
                    tracing::debug!(tool = %tool, index, "trace updated in place");
                }
                TraceUpsert::Appended => {
                    tracing::debug!(tool = %tool, "trace appended");
                }
                TraceUpsert::Duplicate => {
                    tracing::debug!(tool = %tool, "duplicate trace dropped");
                    return Applied::DuplicateTrace;
                }
            }
        }
        StreamEvent::Ping => return Applied::Ignored,
        StreamEvent::Error(text) => {
            tracing::warn!(error = %text, "backend reported an error in-stream");
            annotate_error(message, &text);
        }
    }
    Applied::Merged
}

/// Owner of the single in-progress assistant message.
///
/// Sealing consumes the reconciler, so a finished message can no longer be
/// reached through it.
#[derive(Debug)]
pub struct MessageReconciler {
    message: Message,
    events_applied: u64,
}

impl MessageReconciler {
    /// Start from an empty assistant placeholder.
    #[must_use]
    pub fn new() -> Self {
        Self::with_message(Message::assistant_placeholder())
    }

    #[must_use]
    pub fn with_message(message: Message) -> Self {
        Self {
            message,
            events_applied: 0,
        }
    }

    pub fn apply(&mut self, event: StreamEvent) -> Applied {
        let applied = apply_event(&mut self.message, event);
        if applied == Applied::Merged {
            self.events_applied += 1;
        }
        applied
    }

    pub fn annotate_error(&mut self, text: &str) {
        annotate_error(&mut self.message, text);
    }

    #[must_use]
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Events that changed the message so far.
    #[must_use]
    pub fn events_applied(&self) -> u64 {
        self.events_applied
    }

    #[must_use]
    pub fn seal(self) -> Message {
        self.message
    }
}

impl Default for MessageReconciler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{ChartConfig, ChartType, TraceStatus};
    use serde_json::json;

    fn trace(tool: &str, status: TraceStatus, message: Option<&str>) -> StreamEvent {
        let mut trace = ToolTrace::new(tool, status);
        trace.message = message.map(str::to_owned);
        StreamEvent::Trace(trace)
    }

    fn rows(value: serde_json::Value) -> Option<Vec<crate::protocol::TableRow>> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_text_appends() {
        let mut reconciler = MessageReconciler::new();
        reconciler.apply(StreamEvent::Text("Hel".to_string()));
        reconciler.apply(StreamEvent::Text("lo".to_string()));
        assert_eq!(reconciler.message().content, "Hello");
    }

    #[test]
    fn test_thought_starts_from_unset() {
        let mut message = Message::assistant_placeholder();
        assert!(message.thoughts.is_none());
        apply_event(&mut message, StreamEvent::Thought("Let me ".to_string()));
        apply_event(&mut message, StreamEvent::Thought("check".to_string()));
        assert_eq!(message.thoughts.as_deref(), Some("Let me check"));
    }

    #[test]
    fn test_table_is_replaced_not_merged() {
        let mut message = Message::assistant_placeholder();
        apply_event(
            &mut message,
            StreamEvent::Table(rows(json!([{"a": 1}, {"a": 2}]))),
        );
        apply_event(&mut message, StreamEvent::Table(rows(json!([{"b": 3}]))));
        assert_eq!(message.table_data, rows(json!([{"b": 3}])));
    }

    #[test]
    fn test_chart_replaces_both_halves() {
        let mut message = Message::assistant_placeholder();
        apply_event(
            &mut message,
            StreamEvent::Chart {
                data: Some(vec![json!({"x": "a", "y": 1})]),
                config: Some(ChartConfig {
                    chart_type: ChartType::Bar,
                    x_key: Some("x".to_string()),
                    y_key: Some("y".to_string()),
                    title: None,
                }),
            },
        );
        apply_event(
            &mut message,
            StreamEvent::Chart {
                data: None,
                config: Some(ChartConfig {
                    chart_type: ChartType::Pie,
                    x_key: None,
                    y_key: None,
                    title: Some("t".to_string()),
                }),
            },
        );
        assert!(message.chart_data.is_none());
        assert_eq!(
            message.chart_config.as_ref().map(|c| &c.chart_type),
            Some(&ChartType::Pie)
        );
    }

    #[test]
    fn test_pending_then_success_updates_in_place() {
        let mut message = Message::assistant_placeholder();
        apply_event(&mut message, trace("search", TraceStatus::Pending, None));
        apply_event(
            &mut message,
            trace("search", TraceStatus::Success, Some("done")),
        );
        assert_eq!(message.trace_logs.len(), 1);
        assert_eq!(message.trace_logs[0].status, TraceStatus::Success);
        assert_eq!(message.trace_logs[0].message.as_deref(), Some("done"));
    }

    #[test]
    fn test_repeated_final_status_is_deduplicated() {
        let mut reconciler = MessageReconciler::new();
        let first = reconciler.apply(trace("search", TraceStatus::Success, Some("done")));
        let second = reconciler.apply(trace("search", TraceStatus::Success, Some("done")));
        assert_eq!(first, Applied::Merged);
        assert_eq!(second, Applied::DuplicateTrace);
        assert_eq!(reconciler.message().trace_logs.len(), 1);
        assert_eq!(reconciler.events_applied(), 1);
    }

    #[test]
    fn test_dedup_only_compares_last_entry() {
        let mut logs = Vec::new();
        let done = ToolTrace::new("search", TraceStatus::Success).with_message("done");
        upsert_trace(&mut logs, done.clone());
        upsert_trace(
            &mut logs,
            ToolTrace::new("sql", TraceStatus::Error).with_message("boom"),
        );
        assert_eq!(upsert_trace(&mut logs, done), TraceUpsert::Appended);
        assert_eq!(logs.len(), 3);
    }

    #[test]
    fn test_different_message_is_not_duplicate() {
        let mut logs = Vec::new();
        upsert_trace(
            &mut logs,
            ToolTrace::new("search", TraceStatus::Success).with_message("1 row"),
        );
        let placed = upsert_trace(
            &mut logs,
            ToolTrace::new("search", TraceStatus::Success).with_message("2 rows"),
        );
        assert_eq!(placed, TraceUpsert::Appended);
        assert_eq!(logs.len(), 2);
    }

    #[test]
    fn test_first_pending_match_wins() {
        let mut logs = vec![
            ToolTrace::new("search", TraceStatus::Pending).with_message("first"),
            ToolTrace::new("sql", TraceStatus::Pending),
            ToolTrace::new("search", TraceStatus::Pending).with_message("second"),
        ];
        let placed = upsert_trace(&mut logs, ToolTrace::new("search", TraceStatus::Success));
        assert_eq!(placed, TraceUpsert::Updated(0));
        assert_eq!(logs[0].status, TraceStatus::Success);
        assert_eq!(logs[0].message.as_deref(), Some("first"));
        assert!(logs[2].status.is_pending());
    }

    #[test]
    fn test_out_of_order_kinds_keep_trace_upsert() {
        let mut message = Message::assistant_placeholder();
        apply_event(&mut message, trace("sql", TraceStatus::Pending, None));
        apply_event(&mut message, StreamEvent::Text("partial ".to_string()));
        apply_event(&mut message, StreamEvent::Table(rows(json!([{"n": 1}]))));
        apply_event(&mut message, trace("sql", TraceStatus::Error, Some("timeout")));
        assert_eq!(message.trace_logs.len(), 1);
        assert_eq!(message.trace_logs[0].status, TraceStatus::Error);
    }

    #[test]
    fn test_progress_status_without_tool_appends() {
        let mut message = Message::assistant_placeholder();
        apply_event(
            &mut message,
            trace("", TraceStatus::Other("thinking".to_string()), Some("...")),
        );
        apply_event(
            &mut message,
            trace("execute_sql", TraceStatus::Other("executing".to_string()), None),
        );
        assert_eq!(message.trace_logs.len(), 2);
    }

    #[test]
    fn test_ping_is_ignored_and_error_annotates() {
        let mut reconciler = MessageReconciler::new();
        assert_eq!(reconciler.apply(StreamEvent::Ping), Applied::Ignored);
        assert!(reconciler.message().is_blank());

        reconciler.apply(StreamEvent::Text("partial".to_string()));
        reconciler.apply(StreamEvent::Error("db down".to_string()));
        let sealed = reconciler.seal();
        assert_eq!(sealed.content, "partial\n\n❌ Error: db down");
    }
}
