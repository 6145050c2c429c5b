//! WebSurfer: fetches one page per turn and reports its text.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::core::text::{strip_json_fence, truncate};
use crate::core::types::ParticipantSpec;
use crate::io::completion::{ChatMessage, CompletionClient, CompletionRequest, transcript_messages};
use crate::io::prompt::PromptEngine;
use crate::participants::{Participant, TurnRequest};

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>")
        .expect("script regex should be valid")
});

/// Raw markup kept per page, as a multiple of the text limit.
const RAW_PAGE_FACTOR: usize = 4;
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex should be valid"));

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum WebAction {
    Fetch { url: String },
    Answer { answer: String },
}

pub struct WebSurfer {
    spec: ParticipantSpec,
    client: Arc<dyn CompletionClient>,
    prompts: Arc<PromptEngine>,
    http: reqwest::Client,
    page_limit_bytes: usize,
}

impl WebSurfer {
    pub fn new(
        spec: ParticipantSpec,
        client: Arc<dyn CompletionClient>,
        prompts: Arc<PromptEngine>,
        timeout: Duration,
        page_limit_bytes: usize,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build web client")?;
        Ok(Self {
            spec,
            client,
            prompts,
            http,
            page_limit_bytes,
        })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let parsed = reqwest::Url::parse(url).with_context(|| format!("parse url {url}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("unsupported url scheme '{}'", parsed.scheme());
        }
        info!(url = %parsed, "fetching page");
        let response = self
            .http
            .get(parsed.clone())
            .send()
            .await
            .with_context(|| format!("GET {parsed}"))?;
        let status = response.status();
        let mut response = response;
        let mut body = LimitedBody::new(self.page_limit_bytes.saturating_mul(RAW_PAGE_FACTOR));
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("read body of {parsed}"))?
        {
            if !body.push(&chunk) {
                warn!(url = %parsed, limit = body.limit, "page body truncated");
                break;
            }
        }
        let body = String::from_utf8_lossy(&body.buf);
        Ok(format!(
            "Fetched {parsed} ({status})\n=======================\n{}",
            truncate(&html_to_text(&body), self.page_limit_bytes)
        ))
    }
}

/// Response bytes kept up to a fixed limit.
struct LimitedBody {
    buf: Vec<u8>,
    limit: usize,
}

impl LimitedBody {
    fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }

    /// Append what fits. Returns false once the limit is reached and
    /// reading should stop.
    fn push(&mut self, chunk: &[u8]) -> bool {
        let remaining = self.limit.saturating_sub(self.buf.len());
        let keep = chunk.len().min(remaining);
        self.buf.extend_from_slice(&chunk[..keep]);
        keep == chunk.len() && self.buf.len() < self.limit
    }
}

/// Drop scripts, styles and tags, and collapse blank runs.
fn html_to_text(html: &str) -> String {
    let without_scripts = SCRIPT_RE.replace_all(html, " ");
    let text = TAG_RE.replace_all(&without_scripts, " ");
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Participant for WebSurfer {
    fn spec(&self) -> &ParticipantSpec {
        &self.spec
    }

    #[instrument(skip_all, fields(participant = %self.spec.name))]
    async fn respond(&mut self, request: &TurnRequest<'_>) -> Result<String> {
        let mut messages = transcript_messages(request.transcript);
        messages.push(ChatMessage::user(
            self.prompts.render_web_surfer(request.instruction)?,
        ));
        let raw = self
            .client
            .complete(&CompletionRequest {
                messages,
                json_output: true,
            })
            .await
            .context("web surfer completion")?;
        let action: WebAction = serde_json::from_str(strip_json_fence(&raw))
            .with_context(|| format!("parse web surfer action: {}", raw.trim()))?;
        match action {
            WebAction::Answer { answer } => Ok(answer),
            WebAction::Fetch { url } => self.fetch(&url).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_is_reduced_to_text() {
        let html = "<html><head><style>p { color: red }</style>\
            <script>alert(1)</script></head>\n\
            <body><h1>Title</h1>\n<p>Some <b>bold</b> text.</p>\n\n</body></html>";
        assert_eq!(html_to_text(html), "Title\nSome bold text.");
    }

    #[test]
    fn actions_parse_untagged() {
        let fetch: WebAction =
            serde_json::from_str(r#"{"url": "https://example.com"}"#).expect("fetch");
        assert_eq!(
            fetch,
            WebAction::Fetch {
                url: "https://example.com".to_string()
            }
        );
        let answer: WebAction =
            serde_json::from_str(r#"{"answer": "no browsing needed"}"#).expect("answer");
        assert!(matches!(answer, WebAction::Answer { .. }));
    }

    #[test]
    fn page_body_stops_at_the_limit() {
        let mut body = LimitedBody::new(10);
        assert!(body.push(b"<p>abc"));
        assert!(!body.push(b"defghijklmnop"));
        assert_eq!(body.buf, b"<p>abcdefg");
        assert!(!body.push(b"more"));
        assert_eq!(body.buf.len(), 10);
    }

    #[test]
    fn body_that_fits_keeps_reading() {
        let mut body = LimitedBody::new(64);
        assert!(body.push(b"<html>"));
        assert!(body.push(b"</html>"));
        assert_eq!(body.buf, b"<html></html>");
    }

    #[tokio::test]
    async fn non_http_urls_are_refused() {
        let surfer = WebSurfer::new(
            ParticipantSpec::new("WebSurfer", "browses"),
            Arc::new(crate::test_support::ScriptedCompletion::new(Vec::new())),
            Arc::new(PromptEngine::new()),
            Duration::from_secs(1),
            1024,
        )
        .expect("surfer");
        let err = surfer.fetch("file:///etc/passwd").await.unwrap_err();
        assert!(err.to_string().contains("unsupported url scheme 'file'"));
    }
}
