//! The message-processing pipeline: normalizer -> splitter -> classifier /
//! field matcher / fallback extractor -> merge/revise -> state machine.
//!
//! One inbound message is one unit of work. The per-conversation session
//! lock is held from classification through persistence, so messages for the
//! same conversation are strictly serialized while different conversations
//! proceed in parallel.

use chrono::{Duration, Utc};
use log::{info, warn};

use crate::capabilities::{
    MessagingTransport, ReportRenderer, RetryPolicy, SessionPersistence, StructuredExtractor,
    Transcriber,
};
use crate::error::Result;
use crate::fallback::extract_fragment;
use crate::matcher::{classify_fragment, is_reset_phrase, Directive};
use crate::merge::merge;
use crate::report::ReportDelta;
use crate::revise::{correct_entry, delete_entry};
use crate::session::{Session, SessionStore};
use crate::splitter::split_message;

const RESET_PROMPT: &str = "Start a new report? Reply \"yes\" for a new report or \"no\" to keep the current one.";
const IDLE_PROMPT: &str = "It has been a while since your last message. Start a new report? Reply \"yes\" for a new report or \"no\" to continue the existing one.";
const UNRECOGNIZED: &str = "Sorry, I could not make sense of that. The report is unchanged.";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pause after which the next message triggers a reset confirmation.
    pub pause_threshold: Duration,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            pause_threshold: Duration::hours(8),
            retry: RetryPolicy::default(),
        }
    }
}

/// What the command layer should send back for one inbound message.
#[derive(Debug, Default, PartialEq)]
pub struct Reply {
    pub messages: Vec<String>,
    /// Rendered export document, when one was requested and produced.
    pub document: Option<Vec<u8>>,
}

impl Reply {
    fn text(message: impl Into<String>) -> Self {
        Reply {
            messages: vec![message.into()],
            document: None,
        }
    }
}

pub struct ReportEngine<X, P, R> {
    store: SessionStore,
    extractor: X,
    persistence: P,
    renderer: R,
    config: EngineConfig,
}

impl<X, P, R> ReportEngine<X, P, R>
where
    X: StructuredExtractor,
    P: SessionPersistence,
    R: ReportRenderer,
{
    /// Builds an engine, reloading previously persisted sessions. A failed
    /// load logs and starts from an empty store; it never aborts startup.
    pub async fn new(extractor: X, persistence: P, renderer: R, config: EngineConfig) -> Self {
        let saved = match persistence.load().await {
            Ok(saved) => saved,
            Err(err) => {
                warn!("session load failed, starting empty: {}", err);
                Default::default()
            }
        };
        info!("loaded {} session(s)", saved.len());
        ReportEngine {
            store: SessionStore::from_saved(saved, Utc::now()),
            extractor,
            persistence,
            renderer,
            config,
        }
    }

    /// Processes one text message for a conversation and returns the reply.
    pub async fn handle_message(&self, conversation_id: &str, text: &str) -> Result<Reply> {
        let now = Utc::now();
        let entry = self.store.entry(conversation_id, now);
        let reply = {
            let mut session = entry.lock().await;
            self.advance(&mut session, text, now).await
        };
        self.persist().await;
        Ok(reply)
    }

    /// Processes a voice message: fetch the media, transcribe, then handle
    /// the transcript as a regular text message. Transport and transcription
    /// failures degrade to a user-visible warning.
    pub async fn handle_audio(
        &self,
        transport: &dyn MessagingTransport,
        transcriber: &dyn Transcriber,
        conversation_id: &str,
        resource_ref: &str,
    ) -> Result<Reply> {
        let audio = self
            .config
            .retry
            .run("media fetch", || transport.fetch_binary(resource_ref))
            .await;
        let audio = match audio {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("voice fetch failed: {}", err);
                return Ok(Reply::text(
                    "I could not retrieve your voice message, please try again.",
                ));
            }
        };

        let transcript = self
            .config
            .retry
            .run("transcription", || transcriber.transcribe(&audio))
            .await;
        match transcript {
            Ok(text) if !text.trim().is_empty() => {
                self.handle_message(conversation_id, &text).await
            }
            Ok(_) => Ok(Reply::text(
                "I could not hear anything in that voice message.",
            )),
            Err(err) => {
                warn!("transcription failed: {}", err);
                Ok(Reply::text(
                    "I could not transcribe your voice message, please try again.",
                ))
            }
        }
    }

    /// Current report for a conversation, if one exists yet.
    pub async fn report(&self, conversation_id: &str) -> Option<crate::report::Report> {
        if !self
            .store
            .conversation_ids()
            .iter()
            .any(|id| id == conversation_id)
        {
            return None;
        }
        let entry = self.store.entry(conversation_id, Utc::now());
        let session = entry.lock().await;
        Some(session.report.clone())
    }

    /// Persists all sessions; called on shutdown and after every message.
    /// Save failures must not break the conversation, so they only log.
    pub async fn persist(&self) {
        let snapshot = self.store.snapshot_all().await;
        if let Err(err) = self.persistence.save(&snapshot).await {
            warn!("session save failed: {}", err);
        }
    }

    /// One state-machine step for an already-locked session.
    async fn advance(
        &self,
        session: &mut Session,
        text: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Reply {
        let trimmed = text.trim();

        if session.awaiting_reset_confirmation {
            session.last_interaction = now;
            return self.handle_reset_reply(session, trimmed, now).await;
        }

        if let Some((field, old)) = session.awaiting_spelling_correction.clone() {
            session.last_interaction = now;
            let replacement = trimmed.trim_end_matches(['.', '!', '?']).trim();
            if replacement.is_empty() || replacement.eq_ignore_ascii_case(&old) {
                return Reply::text(format!(
                    "That is the same value. What should \"{}\" be instead?",
                    old
                ));
            }
            session.push_snapshot();
            correct_entry(&mut session.report, field, &old, replacement);
            session.awaiting_spelling_correction = None;
            return Reply::text(format!("Corrected \"{}\" to \"{}\".", old, replacement));
        }

        // A long pause means the message may belong to a new day's report;
        // park it and ask before applying.
        if session.is_idle(now, self.config.pause_threshold) && !is_confirmation_word(trimmed) {
            session.awaiting_reset_confirmation = true;
            session.pending_input = Some(trimmed.to_string());
            session.last_interaction = now;
            return Reply::text(IDLE_PROMPT);
        }

        session.last_interaction = now;
        self.process_text(session, trimmed).await
    }

    async fn handle_reset_reply(
        &self,
        session: &mut Session,
        reply: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Reply {
        let word = reply.trim_end_matches(['.', '!', '?']).to_lowercase();
        match word.as_str() {
            "yes" | "new" | "new report" => {
                session.reset(now);
                Reply::text("Started a new report.")
            }
            "no" | "existing" | "continue" => {
                session.awaiting_reset_confirmation = false;
                match session.pending_input.take() {
                    // The parked message is replayed as if freshly received.
                    Some(pending) => self.process_text(session, &pending).await,
                    None => Reply::text("Continuing the existing report."),
                }
            }
            _ => Reply::text(RESET_PROMPT),
        }
    }

    async fn process_text(&self, session: &mut Session, text: &str) -> Reply {
        let fragments = split_message(text);
        if fragments.is_empty() {
            return Reply::text(UNRECOGNIZED);
        }

        let classified: Vec<(String, Option<Directive>)> = fragments
            .into_iter()
            .map(|fragment| {
                let directive = classify_fragment(&fragment);
                (fragment, directive)
            })
            .collect();

        // A reset anywhere in the message discards every other fragment; the
        // actual reset waits for confirmation.
        if classified
            .iter()
            .any(|(_, d)| matches!(d, Some(Directive::Reset)))
        {
            session.awaiting_reset_confirmation = true;
            session.pending_input = None;
            return Reply::text(RESET_PROMPT);
        }

        let mut directives = Vec::with_capacity(classified.len());
        for (fragment, directive) in classified {
            match directive {
                Some(directive) => directives.push(directive),
                None => {
                    let delta =
                        extract_fragment(&self.extractor, &self.config.retry, &fragment).await;
                    directives.push(Directive::Update(delta));
                }
            }
        }

        let mut messages = Vec::new();
        let mut document = None;
        let mut combined = ReportDelta::default();

        for directive in directives {
            // Fragments apply in message order: any accumulated field updates
            // land before a later command reads or mutates the report.
            if !matches!(directive, Directive::Update(_)) {
                apply_combined(session, &mut combined, &mut messages);
            }
            match directive {
                Directive::Reset => {} // handled above
                Directive::Undo => {
                    if session.undo() {
                        messages.push("Reverted the last change.".to_string());
                    } else {
                        messages.push("Nothing to undo.".to_string());
                    }
                }
                Directive::Status => {
                    messages.push(self.renderer.render_summary(&session.report));
                }
                Directive::Export => match self.renderer.render_document(&session.report) {
                    Ok(bytes) => {
                        document = Some(bytes);
                        messages.push("Here is your report document.".to_string());
                    }
                    Err(err) => {
                        warn!("document rendering failed: {}", err);
                        messages.push(
                            "Could not generate the report document right now.".to_string(),
                        );
                    }
                },
                Directive::Delete { field, value } => {
                    session.push_snapshot();
                    delete_entry(&mut session.report, field, value.as_deref());
                    messages.push(match value {
                        Some(value) => {
                            format!("Deleted \"{}\" from {}.", value, field.canonical_name())
                        }
                        None => format!("Cleared {}.", field.canonical_name()),
                    });
                }
                Directive::Correct { field, old, new } => {
                    session.push_snapshot();
                    correct_entry(&mut session.report, field, &old, &new);
                    messages.push(format!("Corrected \"{}\" to \"{}\".", old, new));
                }
                Directive::CorrectPrompt { field, old } => {
                    session.awaiting_spelling_correction = Some((field, old.clone()));
                    messages.push(format!("What should \"{}\" be instead?", old));
                }
                Directive::Clear { field } => {
                    session.push_snapshot();
                    session.report.clear_field(field);
                    messages.push(format!("Cleared {}.", field.canonical_name()));
                }
                Directive::Update(delta) => combined.absorb(delta),
            }
        }

        apply_combined(session, &mut combined, &mut messages);

        if messages.is_empty() {
            messages.push(UNRECOGNIZED.to_string());
        }
        Reply { messages, document }
    }
}

/// Merges the update fragments accumulated so far into the report, as one
/// undoable step. No-op on an empty delta.
fn apply_combined(session: &mut Session, combined: &mut ReportDelta, messages: &mut Vec<String>) {
    if combined.is_empty() {
        return;
    }
    session.push_snapshot();
    merge(&mut session.report, combined);
    messages.push(format!("Updated {}.", combined.touched_fields().join(", ")));
    *combined = ReportDelta::default();
}

/// Vocabulary that must never trip the idle-pause confirmation, because it
/// is itself an answer to one.
fn is_confirmation_word(text: &str) -> bool {
    let word = text.trim_end_matches(['.', '!', '?']).to_lowercase();
    matches!(
        word.as_str(),
        "yes" | "no" | "new" | "new report" | "existing" | "continue"
    ) || is_reset_phrase(text)
}
