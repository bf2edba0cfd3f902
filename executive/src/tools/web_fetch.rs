//! Plain HTTP GET of the first URL mentioned in the input.

use std::io::Read;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, instrument};

use super::ToolContext;
use crate::core::text::truncate_bytes;
use crate::core::types::{FetchedPage, ToolResult};

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>"'`)\]]+"#).expect("url regex should compile")
});

#[derive(Debug, Clone)]
pub struct WebFetchTool {
    client: reqwest::blocking::Client,
    max_bytes: usize,
}

impl WebFetchTool {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("executive/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self { client, max_bytes })
    }

    #[instrument(skip_all, name = "web_fetch")]
    pub fn run(&self, input: &str, _ctx: &ToolContext<'_>) -> Result<ToolResult> {
        let Some(url) = first_url(input) else {
            return Ok(ToolResult::error("no http(s) URL in input"));
        };
        debug!(url, "fetching");

        let response = match self.client.get(url).send() {
            Ok(response) => response,
            Err(err) => return Ok(ToolResult::error(format!("fetch {url}: {err}"))),
        };
        let status = response.status().as_u16();
        // Only the kept prefix is ever read off the wire.
        let mut body = Vec::new();
        let limit = u64::try_from(self.max_bytes).unwrap_or(u64::MAX);
        if let Err(err) = response.take(limit).read_to_end(&mut body) {
            return Ok(ToolResult::error(format!("read body of {url}: {err}")));
        }
        debug!(status, body_bytes = body.len(), "fetched");

        Ok(ToolResult::Page(FetchedPage {
            url: url.to_string(),
            status,
            content: decode_prefix(&body, self.max_bytes),
        }))
    }
}

/// Decode a body prefix, dropping a multibyte char cut off at the end.
fn decode_prefix(bytes: &[u8], max_bytes: usize) -> String {
    let complete = match std::str::from_utf8(bytes) {
        Ok(_) => bytes,
        Err(err) if err.error_len().is_none() => &bytes[..err.valid_up_to()],
        Err(_) => bytes,
    };
    let text = String::from_utf8_lossy(complete);
    truncate_bytes(&text, max_bytes).to_string()
}

fn first_url(input: &str) -> Option<&str> {
    URL_RE
        .find(input)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':']))
}
