use serde::{Deserialize, Serialize};
use std::fmt;

/// One row of tabular data: column name to cell value.
pub type TableRow = serde_json::Map<String, serde_json::Value>;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Execution status of one tool invocation.
///
/// The backend may report progress states beyond the three terminal-ish
/// ones (`info`, `thinking`, `executing`); those are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TraceStatus {
    Pending,
    Success,
    Error,
    Other(String),
}

impl TraceStatus {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            TraceStatus::Pending => "pending",
            TraceStatus::Success => "success",
            TraceStatus::Error => "error",
            TraceStatus::Other(name) => name,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, TraceStatus::Pending)
    }
}

impl From<String> for TraceStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "pending" => TraceStatus::Pending,
            "success" => TraceStatus::Success,
            "error" => TraceStatus::Error,
            _ => TraceStatus::Other(value),
        }
    }
}

impl From<TraceStatus> for String {
    fn from(value: TraceStatus) -> Self {
        match value {
            TraceStatus::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for TraceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tool invocation's status as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolTrace {
    #[serde(default)]
    pub tool: String,
    pub status: TraceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

impl ToolTrace {
    #[must_use]
    pub fn new(tool: impl Into<String>, status: TraceStatus) -> Self {
        Self {
            tool: tool.into(),
            status,
            message: None,
            args: None,
            output: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Shallow merge: fields present on `incoming` win, absent ones keep
    /// their current value.
    pub fn merge_from(&mut self, incoming: ToolTrace) {
        self.tool = incoming.tool;
        self.status = incoming.status;
        if incoming.message.is_some() {
            self.message = incoming.message;
        }
        if incoming.args.is_some() {
            self.args = incoming.args;
        }
        if incoming.output.is_some() {
            self.output = incoming.output;
        }
    }

    /// Same tool, status and message: a re-delivery of an already recorded entry.
    #[must_use]
    pub fn same_report_as(&self, other: &ToolTrace) -> bool {
        self.tool == other.tool && self.status == other.status && self.message == other.message
    }
}

/// Chart flavour requested by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Area,
    Other(String),
}

impl From<String> for ChartType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "bar" => ChartType::Bar,
            "line" => ChartType::Line,
            "pie" => ChartType::Pie,
            "area" => ChartType::Area,
            _ => ChartType::Other(value),
        }
    }
}

impl From<ChartType> for String {
    fn from(value: ChartType) -> Self {
        match value {
            ChartType::Bar => "bar".to_string(),
            ChartType::Line => "line".to_string(),
            ChartType::Pie => "pie".to_string(),
            ChartType::Area => "area".to_string(),
            ChartType::Other(name) => name,
        }
    }
}

fn default_chart_type() -> ChartType {
    ChartType::Bar
}

/// Rendering hints that accompany chart data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    #[serde(rename = "type", default = "default_chart_type")]
    pub chart_type: ChartType,
    #[serde(default)]
    pub x_key: Option<String>,
    #[serde(default)]
    pub y_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// One turn in the conversation.
///
/// User messages are complete when created. An assistant message starts as
/// an empty placeholder and is filled in by the stream reconciler; once the
/// reconciler is sealed the message is handed out by value and no longer
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoughts: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace_logs: Vec<ToolTrace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_data: Option<Vec<TableRow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_data: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_config: Option<ChartConfig>,
}

impl Message {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            ..Self::assistant_placeholder()
        }
    }

    /// Empty assistant message shown while the answer streams in.
    #[must_use]
    pub fn assistant_placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            thoughts: None,
            trace_logs: Vec::new(),
            table_data: None,
            chart_data: None,
            chart_config: None,
        }
    }

    /// Chart data and config are both present and there is something to plot.
    #[must_use]
    pub fn has_renderable_chart(&self) -> bool {
        self.chart_config.is_some() && self.chart_data.as_ref().is_some_and(|d| !d.is_empty())
    }

    /// Nothing has been streamed into this message yet.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.content.is_empty()
            && self.thoughts.as_deref().is_none_or(str::is_empty)
            && self.trace_logs.is_empty()
            && self.table_data.is_none()
            && self.chart_data.is_none()
            && self.chart_config.is_none()
    }
}
