use std::io::{self, Write};

use ragchat_rs::config::{load_config_or_default, AppConfig, FeaturesConfig};
use ragchat_rs::conversation::Conversation;
use ragchat_rs::observability::init_tracing;
use ragchat_rs::protocol::{Message, TraceStatus};
use ragchat_rs::stream::{StreamController, StreamOutcome, StreamSnapshot, StreamState};
use ragchat_rs::transport::HttpTransport;
use tokio::io::{AsyncBufReadExt, BufReader};

const CONFIG_PATH_ENV: &str = "RAGCHAT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

fn main() {
    let config_path =
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config_or_default(&config_path).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration from '{config_path}': {e}");
        eprintln!("Please copy 'config.example.yaml' to 'config.yaml' and modify as needed.");
        std::process::exit(1);
    });

    init_tracing(&config.features.log_level);
    let runtime = build_runtime();

    runtime.block_on(async move {
        run(config).await;
    });
}

fn build_runtime() -> tokio::runtime::Runtime {
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_io();
    runtime_builder.enable_time();
    runtime_builder.build().unwrap_or_else(|e| {
        eprintln!("Failed to initialize Tokio runtime: {e}");
        std::process::exit(1);
    })
}

async fn run(config: AppConfig) {
    let transport = HttpTransport::new(&config.backend).unwrap_or_else(|e| {
        eprintln!("Failed to set up HTTP transport: {e}");
        std::process::exit(1);
    });
    tracing::info!(url = %transport.chat_url(), "ragchat ready");
    eprintln!("Ask a question. /reset clears the conversation, /quit or Ctrl-D exits, Ctrl-C stops an answer.");

    let mut conversation = Conversation::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                tracing::error!(error = %err, "failed to read stdin");
                break;
            }
        };
        match line.trim() {
            "" => {}
            "/quit" | "/exit" => break,
            "/reset" => {
                conversation.clear();
                eprintln!("(conversation cleared)");
            }
            question => ask(&transport, &mut conversation, question, &config).await,
        }
    }
}

fn prompt() {
    let mut stderr = io::stderr().lock();
    let _ = write!(stderr, "\n> ");
    let _ = stderr.flush();
}

async fn ask(
    transport: &HttpTransport,
    conversation: &mut Conversation,
    question: &str,
    config: &AppConfig,
) {
    let request = conversation.push_user(question);
    let controller =
        StreamController::new().with_idle_timeout(config.backend.idle_read_timeout());
    let cancel = controller.cancel_handle();
    let mut snapshots = controller.subscribe();
    let mut printer = AnswerPrinter::new(&config.features);

    let run = controller.run(transport, &request);
    tokio::pin!(run);
    let outcome = loop {
        tokio::select! {
            biased;
            outcome = &mut run => break outcome,
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                tracing::debug!("cancel requested");
                cancel.cancel();
            }
            changed = snapshots.changed() => {
                if changed.is_ok() {
                    let snapshot = snapshots.borrow_and_update().clone();
                    printer.render(&snapshot);
                }
            }
        }
    };

    printer.render(&StreamSnapshot {
        state: outcome.state,
        message: outcome.message.clone(),
    });
    printer.finish(&outcome);
    conversation.push_assistant(outcome.message);
}

/// Prints each snapshot's new content to stdout and side-channel details to
/// stderr.
struct AnswerPrinter {
    show_thoughts: bool,
    show_traces: bool,
    content_printed: usize,
    thoughts_printed: usize,
    trace_statuses: Vec<TraceStatus>,
}

impl AnswerPrinter {
    fn new(features: &FeaturesConfig) -> Self {
        Self {
            show_thoughts: features.show_thoughts,
            show_traces: features.show_traces,
            content_printed: 0,
            thoughts_printed: 0,
            trace_statuses: Vec::new(),
        }
    }

    fn render(&mut self, snapshot: &StreamSnapshot) {
        let message = &snapshot.message;
        if self.show_thoughts {
            if let Some(thoughts) = message.thoughts.as_deref() {
                if let Some(delta) = thoughts.get(self.thoughts_printed..) {
                    if !delta.is_empty() {
                        eprint!("{delta}");
                        self.thoughts_printed = thoughts.len();
                    }
                }
            }
        }
        if self.show_traces {
            self.render_traces(message);
        }
        if let Some(delta) = message.content.get(self.content_printed..) {
            if !delta.is_empty() {
                let mut stdout = io::stdout().lock();
                let _ = stdout.write_all(delta.as_bytes());
                let _ = stdout.flush();
                self.content_printed = message.content.len();
            }
        }
    }

    fn render_traces(&mut self, message: &Message) {
        for (index, trace) in message.trace_logs.iter().enumerate() {
            if self.trace_statuses.get(index) == Some(&trace.status) {
                continue;
            }
            let tool = if trace.tool.is_empty() { "agent" } else { &trace.tool };
            match trace.message.as_deref() {
                Some(text) => eprintln!("\n[{tool}] {}: {text}", trace.status),
                None => eprintln!("\n[{tool}] {}", trace.status),
            }
            if index < self.trace_statuses.len() {
                self.trace_statuses[index] = trace.status.clone();
            } else {
                self.trace_statuses.push(trace.status.clone());
            }
        }
    }

    fn finish(&self, outcome: &StreamOutcome) {
        println!();
        let message = &outcome.message;
        if let Some(rows) = &message.table_data {
            let columns: Vec<&str> = rows
                .first()
                .map(|row| row.keys().map(String::as_str).collect())
                .unwrap_or_default();
            eprintln!("[table: {} rows; columns: {}]", rows.len(), columns.join(", "));
        }
        if message.has_renderable_chart() {
            if let (Some(config), Some(data)) = (&message.chart_config, &message.chart_data) {
                let chart_type: String = config.chart_type.clone().into();
                let title = config.title.as_deref().unwrap_or("untitled");
                eprintln!("[chart: {chart_type} \"{title}\", {} points]", data.len());
            }
        }
        if outcome.state == StreamState::Cancelled {
            eprintln!("(answer stopped)");
        }
    }
}
