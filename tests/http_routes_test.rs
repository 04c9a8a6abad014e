//! REST collaborator routes
//!
//! Run: cargo test --test http_routes_test

use actix_web::{http::StatusCode, test, web, App};
use serde_json::{json, Value};
use std::sync::Arc;
use video_live_service::config::{Config, WsConfig};
use video_live_service::models::{User, UserId, Video, VideoId};
use video_live_service::routes;
use video_live_service::state::AppState;
use video_live_service::store::{EntityStore, MemoryStore};
use video_live_service::websocket::Topic;

async fn setup() -> (Arc<MemoryStore>, AppState) {
    let store = Arc::new(MemoryStore::new());
    store
        .save_video(&Video::new(VideoId(1), "Launch day"))
        .await
        .unwrap();
    store.save_user(User::new(UserId(5), "carol")).await;

    let config = Arc::new(Config {
        port: 0,
        database_url: None,
        run_migrations: false,
        ws: WsConfig::default(),
    });
    (store.clone(), AppState::new(config, store))
}

#[actix_web::test]
async fn test_health() {
    let (_store, state) = setup().await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, "OK");
}

#[actix_web::test]
async fn test_comment_is_created_and_announced() {
    let (store, state) = setup().await;
    let (_listener, mut rx) = state.lifecycle.connect(Topic::Comments);
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/comments")
        .set_json(json!({"user_id": 5, "video_id": 1, "content": "great video"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["content"], "great video");
    assert_eq!(body["user_id"], 5);

    assert_eq!(
        rx.try_recv().unwrap(),
        r#"{"message":"New comment by carol on Launch day"}"#
    );
    assert!(store.get_video(VideoId(1)).await.unwrap().is_some());
}

#[actix_web::test]
async fn test_comment_for_unknown_video_is_404() {
    let (_store, state) = setup().await;
    let (_listener, mut rx) = state.lifecycle.connect(Topic::Comments);
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/comments")
        .set_json(json!({"user_id": 5, "video_id": 99, "content": "hello?"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(rx.try_recv().is_err());
}

#[actix_web::test]
async fn test_video_detail_upserts_watch_history() {
    let (store, state) = setup().await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::configure),
    )
    .await;

    for _ in 0..3 {
        let req = test::TestRequest::get()
            .uri("/api/videos/1?user_id=5")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["title"], "Launch day");
    }

    let history = store.watch_history_for_user(UserId(5)).await.unwrap();
    assert_eq!(history.len(), 1);

    let req = test::TestRequest::get().uri("/api/videos/2").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_metrics_exposition() {
    let (_store, state) = setup().await;
    // Touch a websocket metric so the registry is not empty
    let (_conn, _rx) = state.lifecycle.connect(Topic::Comments);
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let body = test::call_and_read_body(&app, req).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("video_live_ws_connections_active"));
}
