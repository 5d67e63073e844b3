use std::convert::Infallible;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{stream, StreamExt};
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

const DEFAULT_PORT: u16 = 927;
const DEFAULT_DELAY_MS: u64 = 40;
const CHAT_PATH: &str = "/api/rag/chat";

type MockBody = UnsyncBoxBody<Bytes, Infallible>;

#[derive(Copy, Clone)]
enum MockScenario {
    /// Thought, tool traces, table, chart and a word-by-word answer.
    Answer,
    /// Partial answer, then an in-band error event.
    InbandError,
    /// 503 before any body is sent.
    HttpError,
    /// One text frame, then the connection goes quiet.
    Stall,
}

struct MockState {
    scenario: MockScenario,
    delay: Duration,
    requests: AtomicU64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let port = env_u16("MOCK_PORT", DEFAULT_PORT);
    let state = Arc::new(MockState {
        scenario: parse_scenario(),
        delay: Duration::from_millis(env_u64("MOCK_DELAY_MS", DEFAULT_DELAY_MS)),
        requests: AtomicU64::new(0),
    });

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind mock backend on 127.0.0.1:{port}: {err}"));
    eprintln!("mock rag backend listening on http://127.0.0.1:{port}{CHAT_PATH}");

    let conn_builder = AutoBuilder::new(TokioExecutor::new());
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok((stream, remote_addr)) => (stream, remote_addr),
            Err(err) => {
                eprintln!("accept error: {err}");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let conn_builder = conn_builder.clone();
        let service_state = Arc::clone(&state);
        let service = service_fn(move |request: Request<Incoming>| {
            let state_ref = Arc::clone(&service_state);
            async move { Ok::<_, Infallible>(handle_request(request, &state_ref).await) }
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(io, service).await {
                eprintln!("mock backend connection error from {remote_addr}: {err}");
            }
        });
    }
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_scenario() -> MockScenario {
    match env::var("MOCK_SCENARIO").as_deref() {
        Ok("inband_error") => MockScenario::InbandError,
        Ok("http_error") => MockScenario::HttpError,
        Ok("stall") => MockScenario::Stall,
        Ok("answer") | Err(_) => MockScenario::Answer,
        Ok(other) => {
            eprintln!("unknown MOCK_SCENARIO '{other}', fallback to answer");
            MockScenario::Answer
        }
    }
}

async fn handle_request(request: Request<Incoming>, state: &Arc<MockState>) -> Response<MockBody> {
    let (parts, body) = request.into_parts();
    drain_request_body(body).await;

    if parts.method == Method::GET && parts.uri.path() == "/_mock/stats" {
        let body = format!(
            "{{\"requests\":{}}}",
            state.requests.load(Ordering::Relaxed)
        );
        return simple_response(StatusCode::OK, "application/json", Bytes::from(body));
    }
    if parts.method != Method::POST {
        return simple_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "application/json",
            Bytes::from_static(br#"{"detail":"Method Not Allowed"}"#),
        );
    }
    if parts.uri.path() != CHAT_PATH {
        return simple_response(
            StatusCode::NOT_FOUND,
            "application/json",
            Bytes::from_static(br#"{"detail":"Not Found"}"#),
        );
    }
    state.requests.fetch_add(1, Ordering::Relaxed);

    match state.scenario {
        MockScenario::Answer => event_stream_response(paced_body(ANSWER_FRAMES, state.delay, false)),
        MockScenario::InbandError => {
            event_stream_response(paced_body(INBAND_ERROR_FRAMES, state.delay, false))
        }
        MockScenario::HttpError => simple_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "application/json",
            Bytes::from_static(br#"{"detail":"mock_injected_error"}"#),
        ),
        MockScenario::Stall => event_stream_response(paced_body(STALL_FRAMES, state.delay, true)),
    }
}

async fn drain_request_body(mut body: Incoming) {
    while let Some(frame_result) = body.frame().await {
        if frame_result.is_err() {
            break;
        }
    }
}

/// Emit each frame after `delay`; with `stall`, keep the body open afterwards.
fn paced_body(frames: &'static [&'static [u8]], delay: Duration, stall: bool) -> MockBody {
    let paced = stream::iter(frames.iter().copied()).then(move |frame| async move {
        tokio::time::sleep(delay).await;
        Ok::<_, Infallible>(Frame::data(Bytes::from_static(frame)))
    });
    if stall {
        StreamBody::new(paced.chain(stream::pending())).boxed_unsync()
    } else {
        StreamBody::new(paced).boxed_unsync()
    }
}

fn event_stream_response(body: MockBody) -> Response<MockBody> {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

fn simple_response(
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
) -> Response<MockBody> {
    let mut response = Response::new(Full::new(body).boxed_unsync());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

const PING_FRAME: &[u8] = b"data: {\"type\": \"ping\", \"content\": \"connected\"}\n\n";

const STALL_FRAMES: &[&[u8]] = &[
    PING_FRAME,
    b"data: {\"type\": \"text\", \"content\": \"Working on it\"}\n\n",
];

const ANSWER_FRAMES: &[&[u8]] = &[
    PING_FRAME,
    b"data: {\"type\": \"trace\", \"data\": {\"tool\": \"\", \"status\": \"thinking\", \"message\": \"Planning the query\"}}\n\n",
    b"data: {\"type\": \"thought\", \"content\": \"The question asks for counts per model, \"}\n\n",
    b"data: {\"type\": \"thought\", \"content\": \"so a GROUP BY over the cars table is enough.\"}\n\n",
    b"data: {\"type\": \"trace\", \"data\": {\"tool\": \"execute_sql\", \"status\": \"pending\", \"args\": {\"query\": \"SELECT model, COUNT(*) AS n FROM cars GROUP BY model\"}}}\n\n",
    b"data: {\"type\": \"trace\", \"data\": {\"tool\": \"execute_sql\", \"status\": \"success\", \"message\": \"3 rows\", \"output\": {\"row_count\": 3}}}\n\n",
    b"data: {\"type\": \"trace\", \"data\": {\"tool\": \"execute_sql\", \"status\": \"success\", \"message\": \"3 rows\", \"output\": {\"row_count\": 3}}}\n\n",
    b"data: {\"type\": \"table\", \"data\": [{\"model\": \"Aurora\", \"n\": 12}, {\"model\": \"Borealis\", \"n\": 7}, {\"model\": \"Cirrus\", \"n\": 3}], \"summary\": \"Query returned 3 rows.\"}\n\n",
    b"data: {\"type\": \"chart\", \"data\": [{\"model\": \"Aurora\", \"n\": 12}, {\"model\": \"Borealis\", \"n\": 7}, {\"model\": \"Cirrus\", \"n\": 3}], \"config\": {\"type\": \"bar\", \"xKey\": \"model\", \"yKey\": \"n\", \"title\": \"Cars per model\"}}\n\n",
    b"data: {\"type\": \"text\", \"content\": \"Aurora \"}\n\n",
    b"data: {\"type\": \"text\", \"content\": \"leads \"}\n\n",
    b"data: {\"type\": \"text\", \"content\": \"with \"}\n\n",
    b"data: {\"type\": \"text\", \"content\": \"12 cars, \"}\n\n",
    b"data: {\"type\": \"text\", \"content\": \"followed by Borealis (7) \"}\n\n",
    b"data: {\"type\": \"text\", \"content\": \"and Cirrus (3).\"}\n\n",
    b"data: [DONE]\n\n",
];

const INBAND_ERROR_FRAMES: &[&[u8]] = &[
    PING_FRAME,
    b"data: {\"type\": \"trace\", \"data\": {\"tool\": \"execute_sql\", \"status\": \"pending\"}}\n\n",
    b"data: {\"type\": \"text\", \"content\": \"Let me look that up\"}\n\n",
    b"data: {\"type\": \"trace\", \"data\": {\"tool\": \"execute_sql\", \"status\": \"error\", \"message\": \"relation \\\"cars\\\" does not exist\"}}\n\n",
    b"data: {\"type\": \"error\", \"content\": \"Query failed\"}\n\n",
    b"data: [DONE]\n\n",
];
