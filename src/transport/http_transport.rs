use std::time::Duration;

use futures_util::StreamExt;
use http::header::{ACCEPT, CONTENT_TYPE};

use super::{ChatBody, ChatTransport};
use crate::config::BackendConfig;
use crate::error::ChatError;
use crate::protocol::request::ChatRequest;

const ERROR_BODY_EXCERPT_MAX_BYTES: usize = 512;

fn build_reqwest_client(
    pool_idle_timeout: Option<Duration>,
    connect_timeout: Duration,
    use_env_proxy: bool,
    proxy_url: Option<&str>,
) -> Result<reqwest::Client, ChatError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(1)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(connect_timeout)
        .redirect(reqwest::redirect::Policy::none());

    if let Some(proxy_url) = proxy_url {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|err| ChatError::Transport(format!("Invalid proxy URL: {err}")))?;
        builder = builder.no_proxy().proxy(proxy);
    } else if !use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| ChatError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// HTTP transport that posts the conversation and streams the answer body.
///
/// No overall request timeout is set: answers stream for as long as the
/// backend keeps producing them. Stalls are bounded by the stream
/// controller's idle-read timeout instead.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    chat_url: url::Url,
}

impl HttpTransport {
    /// Create a transport for the backend described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Config`] when the chat URL does not parse, or
    /// [`ChatError::Transport`] when the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self, ChatError> {
        let chat_url = url::Url::parse(&config.chat_url())
            .map_err(|err| ChatError::Config(format!("Invalid chat URL: {err}")))?;
        let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
        };
        let client = build_reqwest_client(
            pool_idle_timeout,
            Duration::from_secs(config.connect_timeout_secs),
            config.http_use_env_proxy,
            config.proxy.as_deref(),
        )?;
        Ok(Self { client, chat_url })
    }

    #[must_use]
    pub fn chat_url(&self) -> &url::Url {
        &self.chat_url
    }

    async fn dispatch(&self, request: &ChatRequest) -> Result<ChatBody, ChatError> {
        let body = request
            .to_body()
            .map_err(|err| ChatError::Transport(format!("Failed to encode request: {err}")))?;

        let response = self
            .client
            .post(self.chat_url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .body(body)
            .send()
            .await
            .map_err(|err| ChatError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or_default();
            let excerpt = read_error_excerpt(response).await;
            let message = match (reason.is_empty(), excerpt.is_empty()) {
                (_, true) => reason.to_string(),
                (true, false) => excerpt,
                (false, false) => format!("{reason}: {excerpt}"),
            };
            tracing::error!(status = status.as_u16(), %message, "chat request rejected");
            return Err(ChatError::Upstream {
                status: status.as_u16(),
                message,
            });
        }
        if response.content_length() == Some(0) {
            return Err(ChatError::MissingBody);
        }

        tracing::debug!(status = status.as_u16(), url = %self.chat_url, "chat stream opened");
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ChatError::from))
            .boxed())
    }
}

impl ChatTransport for HttpTransport {
    type Body = ChatBody;

    async fn open(&self, request: &ChatRequest) -> Result<Self::Body, ChatError> {
        self.dispatch(request).await
    }
}

async fn read_error_excerpt(mut response: reqwest::Response) -> String {
    let mut collected = Vec::with_capacity(ERROR_BODY_EXCERPT_MAX_BYTES);
    while collected.len() < ERROR_BODY_EXCERPT_MAX_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => collected.extend_from_slice(&chunk),
            Ok(None) | Err(_) => break,
        }
    }
    collected.truncate(ERROR_BODY_EXCERPT_MAX_BYTES);
    String::from_utf8_lossy(&collected).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_url_from_config() {
        let config = BackendConfig {
            base_url: "http://127.0.0.1:927/".to_string(),
            ..BackendConfig::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(
            transport.chat_url().as_str(),
            "http://127.0.0.1:927/api/rag/chat"
        );
    }
}
