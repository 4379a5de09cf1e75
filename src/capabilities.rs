//! Contracts for the external collaborators the core calls into: messaging
//! transport, speech transcription, structured (language-model) extraction,
//! session persistence, and report rendering. The core never implements
//! transport, speech or PDF generation itself.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::warn;

use crate::error::{ReportError, Result};
use crate::report::Report;
use crate::session::Session;

#[async_trait]
pub trait MessagingTransport: Send + Sync {
    async fn deliver(&self, conversation_id: &str, text: &str) -> Result<()>;
    async fn fetch_binary(&self, resource_ref: &str) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Returns the transcript, or an empty string when nothing was heard.
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;
}

/// The opaque language-model extraction capability used when no local rule
/// matches. Returns a JSON object honoring the schema description it is
/// prompted with.
#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    async fn extract(&self, prompt: &str, schema_json: &str) -> Result<serde_json::Value>;
}

#[async_trait]
pub trait SessionPersistence: Send + Sync {
    async fn load(&self) -> Result<HashMap<String, Session>>;
    async fn save(&self, sessions: &HashMap<String, Session>) -> Result<()>;
}

/// Rendering of user-facing report output. `render_document` is the
/// PDF-style export; implementations without one return `RenderFailed`.
pub trait ReportRenderer: Send + Sync {
    fn render_summary(&self, report: &Report) -> String;
    fn render_document(&self, report: &Report) -> Result<Vec<u8>>;
}

/// Bounded retry with exponential backoff for transient collaborator
/// failures: 3 attempts, 4s base delay doubling up to a 10s cap.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        exp.min(self.max_delay)
    }

    /// Runs `operation` up to `max_attempts` times, sleeping between
    /// attempts. Returns the last error when all attempts fail.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        label, attempt, self.max_attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!("{} failed after {} attempts: {}", label, attempt, err);
                    return Err(err);
                }
            }
        }
    }
}

#[async_trait]
impl<P: SessionPersistence + ?Sized> SessionPersistence for std::sync::Arc<P> {
    async fn load(&self) -> Result<HashMap<String, Session>> {
        (**self).load().await
    }

    async fn save(&self, sessions: &HashMap<String, Session>) -> Result<()> {
        (**self).save(sessions).await
    }
}

/// In-memory persistence, useful for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryPersistence {
    saved: tokio::sync::Mutex<HashMap<String, Session>>,
}

#[async_trait]
impl SessionPersistence for InMemoryPersistence {
    async fn load(&self) -> Result<HashMap<String, Session>> {
        Ok(self.saved.lock().await.clone())
    }

    async fn save(&self, sessions: &HashMap<String, Session>) -> Result<()> {
        *self.saved.lock().await = sessions.clone();
        Ok(())
    }
}

/// Minimal text renderer: one line per populated field. Document export is
/// left to a real renderer collaborator.
pub struct PlainTextRenderer;

impl ReportRenderer for PlainTextRenderer {
    fn render_summary(&self, report: &Report) -> String {
        let mut lines = vec![format!("Report for {}", orelse(&report.date, "(undated)"))];
        push_scalar(&mut lines, "Site", &report.site_name);
        push_scalar(&mut lines, "Segment", &report.segment);
        push_scalar(&mut lines, "Category", &report.category);
        push_scalar(&mut lines, "Time", &report.time);
        push_scalar(&mut lines, "Weather", &report.weather);
        push_scalar(&mut lines, "Impression", &report.impression);
        if !report.company.is_empty() {
            let names: Vec<&str> = report.company.iter().map(|c| c.name.as_str()).collect();
            lines.push(format!("Companies: {}", names.join(", ")));
        }
        if !report.people.is_empty() {
            lines.push(format!("People: {}", report.people.join(", ")));
        }
        for role in &report.roles {
            lines.push(format!("  {} - {}", role.name, role.role));
        }
        if !report.tools.is_empty() {
            let items: Vec<&str> = report.tools.iter().map(|t| t.item.as_str()).collect();
            lines.push(format!("Tools: {}", items.join(", ")));
        }
        if !report.service.is_empty() {
            let tasks: Vec<&str> = report.service.iter().map(|s| s.task.as_str()).collect();
            lines.push(format!("Services: {}", tasks.join(", ")));
        }
        if !report.activities.is_empty() {
            lines.push(format!("Activities: {}", report.activities.join(", ")));
        }
        for issue in &report.issues {
            let mut line = format!("Issue: {}", issue.description);
            if let Some(caused_by) = &issue.caused_by {
                line.push_str(&format!(" (caused by {})", caused_by));
            }
            if issue.has_photo {
                line.push_str(" [photo]");
            }
            lines.push(line);
        }
        push_scalar(&mut lines, "Comments", &report.comments);
        lines.join("\n")
    }

    fn render_document(&self, _report: &Report) -> Result<Vec<u8>> {
        Err(ReportError::RenderFailed(
            "no document renderer configured".to_string(),
        ))
    }
}

fn orelse<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

fn push_scalar(lines: &mut Vec<String>, label: &str, value: &str) {
    if !value.is_empty() {
        lines.push(format!("{}: {}", label, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(4));
        assert_eq!(policy.backoff(2), Duration::from_secs(8));
        assert_eq!(policy.backoff(3), Duration::from_secs(10));
        assert_eq!(policy.backoff(6), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failure() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let calls = AtomicU32::new(0);
        let result = policy
            .run("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ReportError::DeliveryFailed("transient".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        };
        let result: Result<()> = policy
            .run("test", || async {
                Err(ReportError::DeliveryFailed("down".to_string()))
            })
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_summary_lists_populated_fields_only() {
        let mut report = Report::default();
        report.date = "2024-03-11".into();
        report.site_name = "Downtown".into();
        report.issues.push(crate::report::IssueEntry::new("leak"));

        let summary = PlainTextRenderer.render_summary(&report);
        assert!(summary.contains("Site: Downtown"));
        assert!(summary.contains("Issue: leak"));
        assert!(!summary.contains("Weather"));
    }
}
