//! Live feed client against a local axum WebSocket stub.

mod common;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use common::*;
use kanban_sync::error::BoardError;
use kanban_sync::feed::{pump_feed, FeedEnvelope, ProjectEvent, WsFeed};
use kanban_sync::models::UserId;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct FeedStub {
    frames: Arc<Vec<String>>,
    seen: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

async fn upgrade(
    ws: WebSocketUpgrade,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    State(stub): State<FeedStub>,
) -> Response {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    stub.seen.lock().unwrap().push((project_id, auth));
    ws.on_upgrade(move |socket| replay(socket, stub.frames.clone()))
}

async fn replay(mut socket: WebSocket, frames: Arc<Vec<String>>) {
    for frame in frames.iter() {
        if socket.send(Message::Text(frame.clone())).await.is_err() {
            return;
        }
    }
    let _ = socket.send(Message::Close(None)).await;
}

async fn start_feed(frames: Vec<String>) -> (FeedStub, String) {
    let stub = FeedStub {
        frames: Arc::new(frames),
        ..Default::default()
    };
    let app = Router::new()
        .route("/ws/projects/:id", get(upgrade))
        .with_state(stub.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (stub, format!("http://{}", addr))
}

fn frame(event: serde_json::Value) -> String {
    json!({"projectId": PROJECT, "event": event}).to_string()
}

#[tokio::test]
async fn test_feed_forwards_envelopes_and_skips_garbage() {
    let (stub, url) = start_feed(vec![
        frame(json!({"type": "task.deleted", "taskId": "t1"})),
        "{not json".to_string(),
        frame(json!({"type": "list.deleted", "listId": "done"})),
    ])
    .await;

    let feed = WsFeed::new(&url, &PROJECT.into(), Some(UserId::from(OWNER)));
    let (handle, mut rx) = feed.spawn();

    let mut received: Vec<FeedEnvelope> = Vec::new();
    while let Some(envelope) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("feed stalled")
    {
        received.push(envelope);
    }

    assert_eq!(received.len(), 2);
    assert_eq!(received[0].event.kind(), "task.deleted");
    assert_eq!(
        received[1].event,
        ProjectEvent::ListDeleted {
            list_id: "done".into()
        }
    );
    handle.await.unwrap().unwrap();

    let seen = stub.seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![(PROJECT.to_string(), Some("Bearer owner".to_string()))]
    );
}

#[tokio::test]
async fn test_pumped_feed_updates_subscribed_board() {
    let (_stub, url) = start_feed(vec![
        frame(json!({"type": "task.deleted", "taskId": "t2"})),
        frame(json!({
            "type": "task.created",
            "task": {
                "id": "t7", "title": "From another client", "listId": "done",
                "projectId": PROJECT, "position": 0, "priority": "low", "userId": MEMBER
            }
        })),
        json!({"projectId": "p2", "event": {"type": "list.deleted", "listId": "todo"}})
            .to_string(),
    ])
    .await;

    let (reconciler, _gateway) = setup_board().await;
    reconciler.subscribe(&PROJECT.into()).await;

    let (handle, rx) = WsFeed::new(&url, &PROJECT.into(), None).spawn();
    let applied = tokio::time::timeout(Duration::from_secs(5), pump_feed(&reconciler, rx))
        .await
        .expect("feed stalled");
    handle.await.unwrap().unwrap();

    assert_eq!(applied, 2, "envelope for another project is ignored");
    assert_eq!(order(&reconciler, "todo").await, pairs(&[("t1", 0), ("t3", 1)]));
    assert_eq!(order(&reconciler, "done").await, pairs(&[("t7", 0)]));
    assert_eq!(reconciler.lists().await.len(), 3);
}

#[tokio::test]
async fn test_unreachable_feed_reports_error() {
    // bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let feed = WsFeed::new(&format!("http://{}", addr), &PROJECT.into(), None);
    let (tx, _rx) = tokio::sync::mpsc::channel(1);
    let err = feed.run(tx).await.unwrap_err();
    assert!(matches!(err, BoardError::Feed(_)));
}
