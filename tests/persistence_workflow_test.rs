//! Persistence Workflow Integration Tests
//!
//! Tests for the complete lifecycle over the synchronous local store:
//! - Loading, merging and writing back stored values
//! - Surviving a restart
//! - Workspace and session scopes
//! - Legacy keys and custom migrations
//! - One-shot reads, removal and clearing a store

mod common;

use common::{TestFixture, default_layout};
use kvpersist::{Loaded, PersistTarget, Persistence};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};

// =============================================================================
// Loading and Merging
// =============================================================================

#[test]
fn test_stored_layout_merges_with_defaults_and_is_rewritten() {
    let fixture = TestFixture::with_local_file(&[(
        "global:layout",
        r#"{"theme":"light","panels":{"left":300}}"#,
    )]);

    let layout = fixture
        .persistence
        .persisted(PersistTarget::global("layout"), default_layout());

    assert!(layout.is_ready());
    assert_eq!(
        layout.get(),
        json!({"theme": "light", "panels": {"left": 300, "right": 250}})
    );

    // The merged shape replaced the partial one on disk
    let stored = fixture.read_local_file();
    assert_eq!(
        stored["global:layout"],
        r#"{"panels":{"left":300,"right":250},"theme":"light"}"#
    );
}

#[test]
fn test_missing_value_uses_defaults_and_writes_nothing() {
    let fixture = TestFixture::new();

    let layout = fixture
        .persistence
        .persisted(PersistTarget::global("layout"), default_layout());

    assert_eq!(layout.get(), default_layout());
    assert!(!fixture.read_local_file().contains_key("global:layout"));
}

#[test]
fn test_unknown_keys_survive_and_mismatched_shapes_keep_defaults() {
    let fixture = TestFixture::with_local_file(&[(
        "global:layout",
        r#"{"theme":"light","panels":[1,2],"zoom":1.5}"#,
    )]);

    let layout = fixture
        .persistence
        .persisted(PersistTarget::global("layout"), default_layout());

    assert_eq!(
        layout.get(),
        json!({
            "theme": "light",
            "panels": {"left": 200, "right": 250},
            "zoom": 1.5
        })
    );
}

#[test]
fn test_stored_array_replaces_default_array() {
    let fixture = TestFixture::with_local_file(&[("global:recent", r#"["b"]"#)]);

    let recent = fixture
        .persistence
        .persisted(PersistTarget::global("recent"), json!(["a", "c"]));

    assert_eq!(recent.get(), json!(["b"]));
}

// =============================================================================
// Mutations and Restart
// =============================================================================

#[test]
fn test_values_survive_restart() {
    let fixture = TestFixture::new();

    let layout = fixture
        .persistence
        .persisted(PersistTarget::global("layout"), default_layout());
    layout.set_path(&["panels", "right"], json!(400));
    layout.update(|value| value["theme"] = json!("light"));

    let reopened = fixture.reopen();
    let again = reopened.persisted(PersistTarget::global("layout"), default_layout());

    assert_eq!(
        again.get(),
        json!({"theme": "light", "panels": {"left": 200, "right": 400}})
    );
}

#[test]
fn test_typed_binding_roundtrip() {
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Window {
        width: u32,
        height: u32,
        maximized: bool,
    }

    let fixture = TestFixture::new();
    let defaults = Window {
        width: 1024,
        height: 768,
        maximized: false,
    };

    let window = fixture
        .persistence
        .persisted_typed(PersistTarget::global("window"), &defaults)
        .unwrap();
    window.set_path(&["maximized"], json!(true));

    let reopened = fixture.reopen();
    let again = reopened
        .persisted_typed(PersistTarget::global("window"), &defaults)
        .unwrap();

    let loaded: Window = again.get_as().unwrap();
    assert_eq!(
        loaded,
        Window {
            maximized: true,
            ..defaults
        }
    );
}

#[test]
fn test_listener_receives_change_from_loaded_value() {
    let fixture = TestFixture::new();
    {
        let layout = fixture
            .persistence
            .persisted(PersistTarget::global("draft"), json!(""));
        layout.set(json!("wip"));
    }

    let reopened = fixture.reopen();
    let draft = reopened.persisted(PersistTarget::global("draft"), json!(""));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    draft.on_change(move |key, old, new| {
        sink.lock()
            .unwrap()
            .push((key.to_string(), old.clone(), new.clone()));
    });

    draft.set(json!("fix: typo"));

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![("draft".to_string(), json!("wip"), json!("fix: typo"))]
    );
}

// =============================================================================
// Scopes
// =============================================================================

#[test]
fn test_workspaces_and_sessions_are_isolated() {
    let fixture = TestFixture::new();
    let persistence = &fixture.persistence;

    let a = persistence.persisted(PersistTarget::workspace("/work/alpha", "tabs"), json!([]));
    let b = persistence.persisted(PersistTarget::workspace("/work/beta", "tabs"), json!([]));
    let s1 = persistence.persisted(
        PersistTarget::session("/work/alpha", "s1", "tabs"),
        json!([]),
    );

    a.set(json!(["a.rs"]));
    b.set(json!(["b.rs"]));
    s1.set(json!(["s1.rs"]));

    let reopened = fixture.reopen();
    let load = |target: PersistTarget| reopened.persisted(target, json!([])).get();

    assert_eq!(load(PersistTarget::workspace("/work/alpha", "tabs")), json!(["a.rs"]));
    assert_eq!(load(PersistTarget::workspace("/work/beta", "tabs")), json!(["b.rs"]));
    assert_eq!(
        load(PersistTarget::scoped("/work/alpha", Some("s1"), "tabs")),
        json!(["s1.rs"])
    );
    assert_eq!(
        load(PersistTarget::session("/work/alpha", "s2", "tabs")),
        json!([])
    );

    let alpha = Persistence::workspace_storage("/work/alpha");
    let stored = fixture.read_local_file();
    assert!(stored.contains_key(&format!("{alpha}:workspace:tabs")));
    assert!(stored.contains_key(&format!("{alpha}:session:s1:tabs")));
}

#[tokio::test]
async fn test_clear_store_drops_only_that_store() {
    let fixture = TestFixture::new();
    let persistence = &fixture.persistence;
    let dir = "/work/alpha";

    persistence
        .persisted(PersistTarget::workspace(dir, "tabs"), json!([]))
        .set(json!(["a.rs"]));
    persistence
        .persisted(PersistTarget::session(dir, "s1", "draft"), json!(""))
        .set(json!("wip"));
    persistence
        .persisted(PersistTarget::global("theme"), json!("dark"))
        .set(json!("light"));

    persistence
        .clear_store(&Persistence::workspace_storage(dir))
        .await
        .unwrap();

    let stored = fixture.read_local_file();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored["global:theme"], r#""light""#);

    let tabs = persistence
        .read(&PersistTarget::workspace(dir, "tabs"), &json!([]))
        .await
        .unwrap();
    assert_eq!(tabs, Loaded::Missing);
}

// =============================================================================
// Legacy Keys and Migrations
// =============================================================================

#[test]
fn test_legacy_key_moves_once() {
    let fixture = TestFixture::with_local_file(&[("layout", r#"{"theme":"light"}"#)]);
    let target = PersistTarget::global("layout").with_legacy(["layout"]);

    let layout = fixture.persistence.persisted(target.clone(), default_layout());
    assert_eq!(
        layout.get(),
        json!({"theme": "light", "panels": {"left": 200, "right": 250}})
    );

    let stored = fixture.read_local_file();
    assert!(!stored.contains_key("layout"));
    assert_eq!(
        stored["global:layout"],
        r#"{"panels":{"left":200,"right":250},"theme":"light"}"#
    );

    // Later loads read the current key
    let reopened = fixture.reopen();
    let again = reopened.persisted(target, default_layout());
    assert_eq!(again.get()["theme"], "light");
}

#[test]
fn test_first_present_legacy_key_wins() {
    let fixture = TestFixture::with_local_file(&[
        ("layout.v1", r#"{"theme":"v1"}"#),
        ("layout.v2", r#"{"theme":"v2"}"#),
    ]);
    let target = PersistTarget::global("layout").with_legacy(["layout.v2", "layout.v1"]);

    let layout = fixture.persistence.persisted(target, default_layout());

    assert_eq!(layout.get()["theme"], "v2");
    let stored = fixture.read_local_file();
    assert!(!stored.contains_key("layout.v2"));
    assert!(stored.contains_key("layout.v1"));
}

#[test]
fn test_migration_reshapes_stored_value() {
    let fixture = TestFixture::with_local_file(&[(
        "global:layout",
        r#"{"theme":"light","rightPanelWidth":320}"#,
    )]);
    let target = PersistTarget::global("layout").with_migration(|mut value| {
        if let Some(obj) = value.as_object_mut() {
            if let Some(width) = obj.remove("rightPanelWidth") {
                obj.insert("panels".into(), json!({ "right": width }));
            }
        }
        Ok(value)
    });

    let layout = fixture.persistence.persisted(target, default_layout());

    assert_eq!(
        layout.get(),
        json!({"theme": "light", "panels": {"left": 200, "right": 320}})
    );
    assert!(!fixture.read_local_file()["global:layout"].contains("rightPanelWidth"));
}

// =============================================================================
// One-shot Reads and Removal
// =============================================================================

#[tokio::test]
async fn test_read_reports_each_outcome() {
    let fixture = TestFixture::with_local_file(&[
        ("global:theme", r#""light""#),
        ("global:token", "not json at all"),
    ]);
    let persistence = &fixture.persistence;

    let missing = persistence
        .read(&PersistTarget::global("absent"), &json!(null))
        .await
        .unwrap();
    assert_eq!(missing, Loaded::Missing);
    assert_eq!(missing.or_defaults(&json!(1)), json!(1));

    let found = persistence
        .read(&PersistTarget::global("theme"), &json!("dark"))
        .await
        .unwrap();
    assert_eq!(found, Loaded::Found(json!("light")));

    let opaque = persistence
        .read(&PersistTarget::global("token"), &json!(""))
        .await
        .unwrap();
    assert_eq!(opaque, Loaded::Opaque("not json at all".to_string()));
}

#[tokio::test]
async fn test_remove_persisted() {
    let fixture = TestFixture::new();
    let target = PersistTarget::global("theme");

    let theme = fixture.persistence.persisted(target.clone(), json!("dark"));
    theme.set(json!("light"));
    assert!(fixture.read_local_file().contains_key("global:theme"));

    fixture.persistence.remove_persisted(&target).unwrap();

    assert!(!fixture.read_local_file().contains_key("global:theme"));
    let loaded = fixture
        .persistence
        .read(&target, &json!("dark"))
        .await
        .unwrap();
    assert_eq!(loaded, Loaded::Missing);
}
