//! Smoke test for a running query server (`ragwatch probe`).
//!
//! Checks `/health`, then sends each message to `/response/{message}` and
//! collects the answers. Failures are reported per message rather than
//! aborting the run.

use anyhow::{bail, Context, Result};
use std::time::Duration;

pub const DEFAULT_MESSAGES: &[&str] = &["What is this course about?", "When is the final exam?"];

#[derive(Debug)]
pub struct ProbeAnswer {
    pub message: String,
    pub outcome: Result<String, String>,
}

#[derive(Debug)]
pub struct ProbeReport {
    pub version: Option<String>,
    pub answers: Vec<ProbeAnswer>,
}

impl ProbeReport {
    pub fn all_ok(&self) -> bool {
        self.version.is_some() && self.answers.iter().all(|a| a.outcome.is_ok())
    }
}

/// `{base}/response/{message}` with the message percent-encoded as one segment.
pub fn response_url(base: &str, message: &str) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(base).with_context(|| format!("invalid URL {base}"))?;
    {
        let Ok(mut segments) = url.path_segments_mut() else {
            bail!("URL cannot be a base: {base}");
        };
        segments.pop_if_empty().push("response").push(message);
    }
    Ok(url)
}

pub async fn run_probe(base: &str, messages: &[String]) -> Result<ProbeReport> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()?;

    let health_url = format!("{}/health", base.trim_end_matches('/'));
    let version = match client.get(&health_url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let body: serde_json::Value = resp.json().await?;
            Some(
                body.get("version")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
            )
        }
        Ok(resp) => {
            tracing::warn!("[probe] health returned {}", resp.status());
            None
        }
        Err(e) => {
            tracing::warn!("[probe] health check failed: {}", e);
            None
        }
    };

    let mut answers = Vec::with_capacity(messages.len());
    for message in messages {
        let url = response_url(base, message)?;
        let outcome = match client.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                if status.is_success() {
                    Ok(text)
                } else {
                    Err(format!("HTTP {}: {}", status, text))
                }
            }
            Err(e) => Err(e.to_string()),
        };
        answers.push(ProbeAnswer {
            message: message.clone(),
            outcome,
        });
    }

    Ok(ProbeReport { version, answers })
}
