//! # Site Report Builder
//!
//! A library for turning free-form chat messages into a structured
//! construction-site report, maintained across a conversation with
//! corrections, deletions and undo.
//!
//! ## Core Concepts
//!
//! - **Report**: the structured record (site, people, roles, tools,
//!   services, activities, issues, ...) built up over one conversation
//! - **Fragment**: one command-sized slice of an inbound message
//! - **Directive**: a non-data instruction (reset/undo/delete/correct/clear)
//!   produced by classification and dispatched by the engine
//! - **Fuzzy merge**: list entries are deduplicated by string similarity, so
//!   a near-duplicate corrects the existing entry in place instead of piling
//!   up variants
//! - **Session**: per-conversation state with a bounded undo history and a
//!   small confirmation state machine
//!
//! Transport, speech-to-text, document rendering and persistence are
//! capability traits the caller implements; the core only does extraction,
//! reconciliation and session bookkeeping.
//!
//! ## Example
//!
//! ```rust,ignore
//! use site_report_builder::*;
//!
//! let engine = ReportEngine::new(
//!     my_extractor,
//!     my_persistence,
//!     PlainTextRenderer,
//!     EngineConfig::default(),
//! )
//! .await;
//!
//! let reply = engine
//!     .handle_message("chat-42", "add site Downtown Project, weather: cloudy")
//!     .await?;
//! for message in reply.messages {
//!     transport.deliver("chat-42", &message).await?;
//! }
//! ```

pub mod capabilities;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod matcher;
pub mod merge;
pub mod normalize;
pub mod report;
pub mod revise;
pub mod session;
pub mod splitter;

#[cfg(feature = "gemini")]
pub mod llm;

pub use capabilities::{
    InMemoryPersistence, MessagingTransport, PlainTextRenderer, ReportRenderer, RetryPolicy,
    SessionPersistence, StructuredExtractor, Transcriber,
};
pub use engine::{EngineConfig, Reply, ReportEngine};
pub use error::{ReportError, Result};
pub use matcher::{classify_fragment, Directive};
pub use merge::{merge, similarity, MERGE_THRESHOLD};
pub use report::{
    CompanyEntry, IssueEntry, Report, ReportDelta, ReportField, RoleEntry, ServiceEntry, ToolEntry,
};
pub use revise::{correct_entry, delete_entry, REVISE_THRESHOLD};
pub use session::{Session, SessionStore, HISTORY_LIMIT};
pub use splitter::split_message;
