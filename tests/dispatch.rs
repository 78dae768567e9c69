mod common;

use std::sync::atomic::Ordering;

use serde_json::json;

use common::harness;
use webpilot::{ActionStep, EngineError, PersistedAction, StateStore};

fn step(value: serde_json::Value) -> ActionStep {
    serde_json::from_value(value).unwrap()
}

fn persisted(id: i64, value: serde_json::Value) -> PersistedAction {
    PersistedAction {
        id,
        data: step(value),
        result: None,
    }
}

#[tokio::test]
async fn unknown_action_is_rejected_before_any_session() {
    let h = harness();
    let err = h
        .dispatcher
        .execute(&persisted(1, json!({"action": "teleport"})), false)
        .await
        .unwrap_err();

    match err {
        EngineError::UnknownAction(tag) => assert_eq!(tag, "teleport"),
        other => panic!("expected UnknownAction, got {other}"),
    }
    assert_eq!(h.engine.launch_count(), 0);
    assert_eq!(h.store.browser_state().await.unwrap(), None);
}

#[tokio::test]
async fn ask_and_terminate_pass_through_unexecuted() {
    let h = harness();
    for value in [
        json!({"action": "ask", "question": "which account?"}),
        json!({"action": "terminate", "reason": "done"}),
    ] {
        let result = h.dispatcher.execute(&persisted(1, value), true).await.unwrap();
        assert_eq!(result, None);
    }
    assert_eq!(h.engine.launch_count(), 0);
}

#[tokio::test]
async fn plugin_result_is_returned_and_recorded() {
    let h = harness();
    let action = h
        .store
        .append_action(&step(json!({"action": "echo.say", "text": "hi planner"})))
        .await
        .unwrap();

    let result = h.dispatcher.execute(&action, false).await.unwrap();
    assert_eq!(result.as_deref(), Some("hi planner"));

    let log = h.store.actions().await.unwrap();
    assert_eq!(log[0].result.as_deref(), Some("hi planner"));
    assert_eq!(h.engine.launch_count(), 0);
}

#[tokio::test]
async fn plugin_failure_surfaces_as_result_data() {
    let h = harness();
    let action = h
        .store
        .append_action(&step(json!({"action": "echo.fail"})))
        .await
        .unwrap();

    let result = h.dispatcher.execute(&action, false).await.unwrap();
    assert_eq!(result.as_deref(), Some("error: echo broke"));
    let log = h.store.actions().await.unwrap();
    assert_eq!(log[0].result.as_deref(), Some("error: echo broke"));
}

#[tokio::test]
async fn navigate_captures_page_state() {
    let h = harness();
    h.dispatcher
        .execute(
            &persisted(
                1,
                json!({"action": "browser.navigate", "url": "https://example.com"}),
            ),
            false,
        )
        .await
        .unwrap();

    let state = h.store.browser_state().await.unwrap().unwrap();
    assert_eq!(state.url, "https://example.com");
    assert!(!state.html.is_empty());
    assert!(!state.html.contains("<script"));
}

#[tokio::test]
async fn click_on_missing_selector_still_captures_state() {
    let h = harness();
    h.dispatcher
        .execute(
            &persisted(1, json!({"action": "browser.click", "selector": "#missing"})),
            false,
        )
        .await
        .unwrap();

    // Both click paths were attempted, then the capture proceeded anyway.
    let page = h.engine.sessions.lock().unwrap()[0].page.clone();
    let calls = page.calls();
    assert!(calls.iter().any(|c| c == "click #missing"));
    assert!(calls.iter().any(|c| c == "click_in_page #missing"));
    assert!(h.store.browser_state().await.unwrap().is_some());
}

#[tokio::test]
async fn selectors_are_normalized_before_use() {
    let h = harness();
    h.dispatcher
        .execute(
            &persisted(
                1,
                json!({"action": "browser.click", "selector": "a[href=&quot;/x&quot;]"}),
            ),
            false,
        )
        .await
        .unwrap();

    let page = h.engine.sessions.lock().unwrap()[0].page.clone();
    assert!(
        page.calls()
            .iter()
            .any(|c| c == "click a[href^=\"/x\"]"),
        "calls: {:?}",
        page.calls()
    );
}

#[tokio::test]
async fn persistent_sessions_are_reused() {
    let h = harness();
    for url in ["https://a.example", "https://b.example"] {
        h.dispatcher
            .execute(
                &persisted(1, json!({"action": "browser.navigate", "url": url})),
                true,
            )
            .await
            .unwrap();
    }
    assert_eq!(h.engine.launch_count(), 1);
    let sessions = h.engine.sessions.lock().unwrap();
    assert!(!sessions[0].closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn persistent_sessions_restore_and_flush_the_cookie_jar() {
    let h = harness();
    let seeded = json!([{"name": "sid", "value": "abc", "domain": "example.com"}]);
    std::fs::write(&h.cookie_path, seeded.to_string()).unwrap();

    h.dispatcher
        .execute(
            &persisted(1, json!({"action": "browser.navigate", "url": "https://a.example"})),
            true,
        )
        .await
        .unwrap();

    // The seeded jar reaches the page exactly once, at session setup.
    let page = h.engine.sessions.lock().unwrap()[0].page.clone();
    assert_eq!(*page.cookies.lock().unwrap(), *seeded.as_array().unwrap());
    let restores = |calls: Vec<String>| {
        calls
            .iter()
            .filter(|call| call.starts_with("set_cookies"))
            .count()
    };
    assert_eq!(restores(page.calls()), 1);

    // A cookie picked up mid-flow must land in the jar file on release.
    page.cookies
        .lock()
        .unwrap()
        .push(json!({"name": "session", "value": "xyz", "domain": "a.example"}));
    h.dispatcher
        .execute(
            &persisted(1, json!({"action": "browser.navigate", "url": "https://b.example"})),
            true,
        )
        .await
        .unwrap();

    assert_eq!(restores(page.calls()), 1, "cached reuse must not re-restore");
    let jar: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(&h.cookie_path).unwrap()).unwrap();
    assert_eq!(jar.len(), 2);
    assert!(jar.iter().any(|cookie| cookie["name"] == json!("session")));
}

#[tokio::test]
async fn ephemeral_sessions_launch_and_tear_down_independently() {
    let h = harness();
    for _ in 0..2 {
        h.dispatcher
            .execute(
                &persisted(
                    1,
                    json!({"action": "browser.navigate", "url": "https://example.com"}),
                ),
                false,
            )
            .await
            .unwrap();
    }
    assert_eq!(h.engine.launch_count(), 2);
    let sessions = h.engine.sessions.lock().unwrap();
    for session in sessions.iter() {
        assert!(session.closed.load(Ordering::SeqCst));
        assert!(session.page.closed.load(Ordering::SeqCst));
    }
}

#[tokio::test]
async fn page_state_upsert_is_last_write_wins() {
    let h = harness();
    for url in ["https://first.example", "https://second.example"] {
        h.dispatcher
            .execute(
                &persisted(1, json!({"action": "browser.navigate", "url": url})),
                false,
            )
            .await
            .unwrap();
    }
    let state = h.store.browser_state().await.unwrap().unwrap();
    assert_eq!(state.url, "https://second.example");
}
