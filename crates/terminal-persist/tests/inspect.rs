//! Subcommands against a file store.

use chrono::{Duration, Utc};

use terminal_persist::{Command, Inspector};
use terminal_persist_core::{
    CompanionKind, PersistenceSettings, SessionEnvelope, StorageScope, TerminalSessionRecord,
};

fn envelope(age: Duration) -> SessionEnvelope {
    let mut editor = TerminalSessionRecord::new("t1", "editor", 1);
    editor.is_active = true;
    editor.working_directory = "/srv/app".to_string();
    editor.scrollback = Some((0..1200).map(|i| format!("line {i}")).collect());

    let mut agent = TerminalSessionRecord::new("t2", "agent", 2);
    agent.companion_process_type = Some(CompanionKind::Claude);

    SessionEnvelope::new(
        vec![editor, agent],
        Some("t1".into()),
        PersistenceSettings::default().session.envelope_config(),
        Utc::now() - age,
    )
}

async fn seeded(age: Duration) -> (tempfile::TempDir, Inspector) {
    let dir = tempfile::tempdir().unwrap();
    let inspector = Inspector::open(dir.path(), PersistenceSettings::default());
    inspector.store().save(&envelope(age)).await.unwrap();
    (dir, inspector)
}

#[tokio::test]
async fn info_lists_terminals() {
    let (_dir, inspector) = seeded(Duration::hours(3)).await;

    let out = inspector.run(&Command::Info { json: false }).await.unwrap();

    assert!(out.contains("2 terminal(s)"));
    assert!(out.contains("3h ago"));
    assert!(out.contains("editor"));
    assert!(out.contains("/srv/app"));
    assert!(out.contains("[Claude]"));
    assert!(!out.contains("expired"));
}

#[tokio::test]
async fn info_json_on_empty_store_is_null() {
    let dir = tempfile::tempdir().unwrap();
    let inspector = Inspector::open(dir.path(), PersistenceSettings::default());

    let out = inspector.run(&Command::Info { json: true }).await.unwrap();
    assert_eq!(out.trim(), "null");
}

#[tokio::test]
async fn export_decodes_compressed_scrollback() {
    let (dir, inspector) = seeded(Duration::minutes(1)).await;
    let target = dir.path().join("export.json");

    inspector
        .run(&Command::Export {
            output: Some(target.clone()),
            include_expired: false,
        })
        .await
        .unwrap();

    let exported: SessionEnvelope =
        serde_json::from_str(&std::fs::read_to_string(target).unwrap()).unwrap();
    let lines = exported.terminals[0].scrollback.as_ref().unwrap();
    assert_eq!(lines.len(), 1200);
    assert_eq!(lines[1199], "line 1199");
}

#[tokio::test]
async fn export_without_session_fails() {
    let dir = tempfile::tempdir().unwrap();
    let inspector = Inspector::open(dir.path(), PersistenceSettings::default());
    let export = Command::Export {
        output: None,
        include_expired: false,
    };
    assert!(inspector.run(&export).await.is_err());
}

#[tokio::test]
async fn export_refuses_expired_session_unless_asked() {
    let (_dir, inspector) = seeded(Duration::days(10)).await;

    let err = inspector
        .run(&Command::Export {
            output: None,
            include_expired: false,
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("expired"));

    let out = inspector
        .run(&Command::Export {
            output: None,
            include_expired: true,
        })
        .await
        .unwrap();
    let exported: SessionEnvelope = serde_json::from_str(&out).unwrap();
    assert_eq!(exported.terminals.len(), 2);
    assert!(inspector.store().exists().await.unwrap());
}

#[tokio::test]
async fn cleanup_respects_expiry() {
    let (_dir, fresh) = seeded(Duration::days(2)).await;
    let out = fresh.run(&Command::Cleanup).await.unwrap();
    assert!(out.contains("has not expired"));
    assert!(fresh.store().exists().await.unwrap());

    let (_dir, stale) = seeded(Duration::days(10)).await;
    let out = stale.run(&Command::Cleanup).await.unwrap();
    assert!(out.contains("Purged"));
    assert!(!stale.store().exists().await.unwrap());
}

#[tokio::test]
async fn clear_only_touches_its_scope() {
    let dir = tempfile::tempdir().unwrap();
    let global = Inspector::open(dir.path(), PersistenceSettings::default());
    let mut settings = PersistenceSettings::default();
    settings.storage.scope = StorageScope::Workspace {
        id: "ws/app".to_string(),
    };
    let workspace = Inspector::open(dir.path(), settings);

    global.store().save(&envelope(Duration::hours(1))).await.unwrap();
    workspace.store().save(&envelope(Duration::hours(1))).await.unwrap();

    workspace.run(&Command::Clear).await.unwrap();

    assert!(!workspace.store().exists().await.unwrap());
    assert!(global.store().exists().await.unwrap());
    let again = workspace.run(&Command::Clear).await.unwrap();
    assert!(again.contains("No saved session"));
}

#[tokio::test]
async fn stats_json_counts_companions() {
    let (_dir, inspector) = seeded(Duration::hours(1)).await;

    let out = inspector.run(&Command::Stats { json: true }).await.unwrap();
    let stats: serde_json::Value = serde_json::from_str(&out).unwrap();

    assert_eq!(stats["terminalCount"], 2);
    assert_eq!(stats["companionTerminals"], 1);
    assert_eq!(stats["hasSession"], true);
}

#[tokio::test]
async fn schema_command_prints_json() {
    let dir = tempfile::tempdir().unwrap();
    let inspector = Inspector::open(dir.path(), PersistenceSettings::default());

    let out = inspector
        .run(&Command::Schema { draft07: true })
        .await
        .unwrap();
    let schema: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert!(schema.get("definitions").is_some());
}
