use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use site_report_builder::*;

/// Extractor that always fails, standing in for an unreachable language
/// model. Every scenario below that relies on it must work from the local
/// pattern rules and heuristics alone.
struct OfflineExtractor;

#[async_trait]
impl StructuredExtractor for OfflineExtractor {
    async fn extract(&self, _prompt: &str, _schema: &str) -> Result<serde_json::Value> {
        Err(ReportError::ExtractionFailed("offline".to_string()))
    }
}

/// Extractor returning one canned JSON payload.
struct CannedExtractor(serde_json::Value);

#[async_trait]
impl StructuredExtractor for CannedExtractor {
    async fn extract(&self, _prompt: &str, _schema: &str) -> Result<serde_json::Value> {
        Ok(self.0.clone())
    }
}

/// Transport whose media fetch either yields fixed bytes or fails.
struct StaticTransport {
    audio: Option<Vec<u8>>,
}

#[async_trait]
impl MessagingTransport for StaticTransport {
    async fn deliver(&self, _conversation_id: &str, _text: &str) -> Result<()> {
        Ok(())
    }

    async fn fetch_binary(&self, _resource_ref: &str) -> Result<Vec<u8>> {
        self.audio
            .clone()
            .ok_or_else(|| ReportError::DeliveryFailed("media unavailable".to_string()))
    }
}

/// Transcriber returning a fixed transcript, or failing when given none.
struct StaticTranscriber {
    transcript: Option<String>,
}

#[async_trait]
impl Transcriber for StaticTranscriber {
    async fn transcribe(&self, _audio: &[u8]) -> Result<String> {
        self.transcript
            .clone()
            .ok_or_else(|| ReportError::TranscriptionFailed("model unavailable".to_string()))
    }
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        pause_threshold: chrono::Duration::hours(8),
        retry: RetryPolicy {
            max_attempts: 1,
            base_delay: StdDuration::from_millis(1),
            max_delay: StdDuration::from_millis(1),
        },
    }
}

async fn offline_engine() -> ReportEngine<OfflineExtractor, InMemoryPersistence, PlainTextRenderer>
{
    ReportEngine::new(
        OfflineExtractor,
        InMemoryPersistence::default(),
        PlainTextRenderer,
        fast_config(),
    )
    .await
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let engine = offline_engine().await;

    engine
        .handle_message(
            "chat",
            "add site Downtown Project, add people Anna as engineer, issue water leakage",
        )
        .await
        .unwrap();

    let report = engine.report("chat").await.unwrap();
    assert_eq!(report.site_name, "Downtown Project");
    assert_eq!(report.people, vec!["Anna".to_string()]);
    assert_eq!(
        report.roles,
        vec![RoleEntry {
            name: "Anna".to_string(),
            role: "Engineer".to_string(),
        }]
    );
    assert_eq!(report.issues, vec![IssueEntry::new("water leakage")]);

    println!("✓ End-to-end extraction scenario passed");
}

#[tokio::test]
async fn test_repeated_issue_merges_to_one_entry() {
    let engine = offline_engine().await;

    engine
        .handle_message("chat", "issue water leak")
        .await
        .unwrap();
    engine
        .handle_message("chat", "issue water leak")
        .await
        .unwrap();

    let report = engine.report("chat").await.unwrap();
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].description, "water leak");
}

#[tokio::test]
async fn test_near_duplicate_replaces_in_place() {
    let engine = offline_engine().await;

    engine
        .handle_message("chat", "issue water leek")
        .await
        .unwrap();
    engine
        .handle_message("chat", "issue scaffolding wobble")
        .await
        .unwrap();
    engine
        .handle_message("chat", "issue water leak")
        .await
        .unwrap();

    let report = engine.report("chat").await.unwrap();
    assert_eq!(report.issues.len(), 2);
    assert_eq!(report.issues[0].description, "water leak");
    assert_eq!(report.issues[1].description, "scaffolding wobble");
}

#[tokio::test]
async fn test_delete_thresholds() {
    let engine = offline_engine().await;
    engine
        .handle_message("chat", "tools: Crane")
        .await
        .unwrap();

    engine
        .handle_message("chat", "delete tools Bulldozer")
        .await
        .unwrap();
    assert_eq!(engine.report("chat").await.unwrap().tools.len(), 1);

    engine
        .handle_message("chat", "delete tools Cran")
        .await
        .unwrap();
    assert!(engine.report("chat").await.unwrap().tools.is_empty());
}

#[tokio::test]
async fn test_clear_is_idempotent() {
    let engine = offline_engine().await;
    engine
        .handle_message("chat", "tools: crane, drill")
        .await
        .unwrap();

    engine.handle_message("chat", "tools: none").await.unwrap();
    assert!(engine.report("chat").await.unwrap().tools.is_empty());

    engine.handle_message("chat", "tools: none").await.unwrap();
    assert!(engine.report("chat").await.unwrap().tools.is_empty());
}

#[tokio::test]
async fn test_undo_walks_back_to_blank_then_noop() {
    let engine = offline_engine().await;
    let messages = [
        "add site Downtown",
        "weather: cloudy",
        "tools: crane",
    ];
    for message in messages {
        engine.handle_message("chat", message).await.unwrap();
    }

    for _ in 0..messages.len() {
        engine.handle_message("chat", "undo").await.unwrap();
    }
    let report = engine.report("chat").await.unwrap();
    assert!(report.is_empty(), "expected blank report, got {:?}", report);

    let extra = engine.handle_message("chat", "undo").await.unwrap();
    assert_eq!(extra.messages, vec!["Nothing to undo.".to_string()]);
}

#[tokio::test]
async fn test_two_step_correction_roundtrip() {
    let engine = offline_engine().await;
    engine
        .handle_message("chat", "add site Downtown")
        .await
        .unwrap();

    let prompt = engine
        .handle_message("chat", "correct site Downtown")
        .await
        .unwrap();
    assert!(prompt.messages[0].contains("Downtown"));

    engine.handle_message("chat", "Uptown").await.unwrap();
    let report = engine.report("chat").await.unwrap();
    assert_eq!(report.site_name, "Uptown");
}

#[tokio::test]
async fn test_idle_pause_parks_and_replays_input() {
    let config = EngineConfig {
        pause_threshold: chrono::Duration::zero(),
        ..fast_config()
    };
    let engine = ReportEngine::new(
        OfflineExtractor,
        InMemoryPersistence::default(),
        PlainTextRenderer,
        config,
    )
    .await;

    // First contact creates the session; the second message arrives "late"
    // because the pause threshold is zero.
    engine
        .handle_message("chat", "add site Downtown")
        .await
        .unwrap();
    let parked = engine
        .handle_message("chat", "tools: crane")
        .await
        .unwrap();
    assert!(parked.messages[0].contains("Start a new report?"));
    assert!(engine.report("chat").await.unwrap().tools.is_empty());

    // Declining replays the parked message verbatim.
    engine.handle_message("chat", "no").await.unwrap();
    let report = engine.report("chat").await.unwrap();
    assert_eq!(report.tools.len(), 1);
    assert_eq!(report.site_name, "Downtown");
}

#[tokio::test]
async fn test_sessions_survive_engine_restart() {
    let persistence = Arc::new(InMemoryPersistence::default());

    let engine = ReportEngine::new(
        OfflineExtractor,
        persistence.clone(),
        PlainTextRenderer,
        fast_config(),
    )
    .await;
    engine
        .handle_message("chat", "add site Downtown")
        .await
        .unwrap();
    drop(engine);

    let restarted = ReportEngine::new(
        OfflineExtractor,
        persistence,
        PlainTextRenderer,
        fast_config(),
    )
    .await;
    let report = restarted.report("chat").await.unwrap();
    assert_eq!(report.site_name, "Downtown");
}

#[tokio::test]
async fn test_fallback_delta_flows_into_merge() {
    let extractor = CannedExtractor(serde_json::json!({
        "roles": [{"name": "bob", "role": "architect"}],
    }));
    let engine = ReportEngine::new(
        extractor,
        InMemoryPersistence::default(),
        PlainTextRenderer,
        fast_config(),
    )
    .await;

    engine
        .handle_message("chat", "bob drew up the plans today")
        .await
        .unwrap();

    let report = engine.report("chat").await.unwrap();
    assert_eq!(report.people, vec!["Bob".to_string()]);
    assert_eq!(
        report.roles,
        vec![RoleEntry {
            name: "Bob".to_string(),
            role: "Architect".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_status_renders_summary_without_mutating() {
    let engine = offline_engine().await;
    engine
        .handle_message("chat", "add site Downtown, weather: cloudy")
        .await
        .unwrap();
    let before = engine.report("chat").await.unwrap();

    let status = engine.handle_message("chat", "status").await.unwrap();
    assert!(status.messages[0].contains("Site: Downtown"));
    assert!(status.messages[0].contains("Weather: cloudy"));
    assert_eq!(engine.report("chat").await.unwrap(), before);
}

#[tokio::test]
async fn test_voice_message_flows_into_report() {
    let engine = offline_engine().await;
    let transport = StaticTransport {
        audio: Some(vec![1, 2, 3]),
    };
    let transcriber = StaticTranscriber {
        transcript: Some("add site Downtown".to_string()),
    };

    let reply = engine
        .handle_audio(&transport, &transcriber, "chat", "media-1")
        .await
        .unwrap();
    assert!(reply.messages[0].contains("Updated"));
    assert_eq!(engine.report("chat").await.unwrap().site_name, "Downtown");
}

#[tokio::test]
async fn test_voice_fetch_failure_degrades_to_warning() {
    let engine = offline_engine().await;
    let transport = StaticTransport { audio: None };
    let transcriber = StaticTranscriber {
        transcript: Some("add site Downtown".to_string()),
    };

    let reply = engine
        .handle_audio(&transport, &transcriber, "chat", "media-1")
        .await
        .unwrap();
    assert!(reply.messages[0].contains("could not retrieve"));
    assert!(engine.report("chat").await.is_none());
}

#[tokio::test]
async fn test_voice_empty_transcript_degrades_to_warning() {
    let engine = offline_engine().await;
    let transport = StaticTransport {
        audio: Some(vec![1, 2, 3]),
    };
    let transcriber = StaticTranscriber {
        transcript: Some("   ".to_string()),
    };

    let reply = engine
        .handle_audio(&transport, &transcriber, "chat", "media-1")
        .await
        .unwrap();
    assert!(reply.messages[0].contains("could not hear"));
}

#[tokio::test]
async fn test_voice_transcription_failure_degrades_to_warning() {
    let engine = offline_engine().await;
    let transport = StaticTransport {
        audio: Some(vec![1, 2, 3]),
    };
    let transcriber = StaticTranscriber { transcript: None };

    let reply = engine
        .handle_audio(&transport, &transcriber, "chat", "media-1")
        .await
        .unwrap();
    assert!(reply.messages[0].contains("could not transcribe"));
    assert!(engine.report("chat").await.is_none());
}

#[tokio::test]
async fn test_conversations_are_isolated() {
    let engine = offline_engine().await;
    engine
        .handle_message("chat-a", "add site Downtown")
        .await
        .unwrap();
    engine
        .handle_message("chat-b", "add site Harbor")
        .await
        .unwrap();

    assert_eq!(engine.report("chat-a").await.unwrap().site_name, "Downtown");
    assert_eq!(engine.report("chat-b").await.unwrap().site_name, "Harbor");
}
