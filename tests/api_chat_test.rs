//! Integration tests for the chat session API endpoints

mod test_utils;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use mockito::Matcher;
    use serde_json::json;
    use tower::util::ServiceExt;

    use gemini_chat::ai::chat::FALLBACK_REPLY;
    use gemini_chat::api::public::chat::SessionResponse;
    use gemini_chat::api::spawn_session_sweeper;

    use crate::test_utils::{
        FLASH, PRO, body_to_string, create_session, gemini_sse_body, slow_gemini_host,
        sse_events, stalled_gemini_host, test_app, test_app_with_state,
    };

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method(method)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn get_session(app: &axum::Router, id: &str) -> (StatusCode, String) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/sessions/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        (status, body_to_string(response.into_body()).await)
    }

    /// Tests a new session starts empty with the default model
    #[tokio::test]
    async fn it_creates_a_session() {
        let app = test_app("http://127.0.0.1:1");
        let session = create_session(&app).await;

        assert_eq!(session.selected_model_id, FLASH);
        assert!(session.messages.is_empty());
        assert!(!session.has_remote_context);

        let (status, body) = get_session(&app, &session.session_id.to_string()).await;
        assert_eq!(status, StatusCode::OK);
        let fetched: SessionResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(fetched.session_id, session.session_id);
    }

    /// Tests unknown sessions are reported as not found
    #[tokio::test]
    async fn it_returns_not_found_for_unknown_session() {
        let app = test_app("http://127.0.0.1:1");
        let (status, _) = get_session(&app, "6a503659-15e4-4427-835f-7873f8ff8ecf").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    /// Tests a message streams partial frames followed by the full reply
    #[tokio::test]
    async fn it_streams_a_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Regex(r"gemini-1\.5-flash-latest:streamGenerateContent".to_string()))
            .match_header("x-goog-api-key", "test-api-key")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(gemini_sse_body(&["Hello", " there"]))
            .create_async()
            .await;

        let app = test_app(&server.url());
        let session = create_session(&app).await;
        let id = session.session_id.to_string();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/sessions/{id}/messages"),
                json!({"message": "Hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let events = sse_events(&body_to_string(response.into_body()).await);

        mock.assert_async().await;
        assert_eq!(
            events,
            vec![
                json!({"type": "partial", "text": "Hello▌"}),
                json!({"type": "partial", "text": "Hello there▌"}),
                json!({"type": "complete", "text": "Hello there"}),
            ]
        );

        let (status, body) = get_session(&app, &id).await;
        assert_eq!(status, StatusCode::OK);
        let session: SessionResponse = serde_json::from_str(&body).unwrap();
        let contents: Vec<&str> = session.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Hi", "Hello there"]);
        assert!(session.has_remote_context);
    }

    /// Tests a rate limited request ends with a notice and the fallback reply
    #[tokio::test]
    async fn it_falls_back_when_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Regex(r"streamGenerateContent".to_string()))
            .with_status(429)
            .with_body(r#"{"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#)
            .expect(3)
            .create_async()
            .await;

        let app = test_app(&server.url());
        let id = create_session(&app).await.session_id.to_string();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/sessions/{id}/messages"),
                json!({"message": "Hi"}),
            ))
            .await
            .unwrap();
        let events = sse_events(&body_to_string(response.into_body()).await);

        mock.assert_async().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["type"], "notice");
        assert!(events[0]["message"].as_str().unwrap().contains("Rate limit exceeded"));
        assert_eq!(events[1], json!({"type": "complete", "text": FALLBACK_REPLY}));

        let (_, body) = get_session(&app, &id).await;
        let session: SessionResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[1].content, FALLBACK_REPLY);
    }

    /// Tests empty messages are rejected before anything is sent
    #[tokio::test]
    async fn it_rejects_empty_messages() {
        let app = test_app("http://127.0.0.1:1");
        let id = create_session(&app).await.session_id.to_string();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/sessions/{id}/messages"),
                json!({"message": "  "}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    /// Tests selecting a model from the catalog and rejecting one that isn't
    #[tokio::test]
    async fn it_selects_a_model() {
        let app = test_app("http://127.0.0.1:1");
        let id = create_session(&app).await.session_id.to_string();

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &format!("/api/sessions/{id}/model"),
                json!({"model_id": PRO}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let session: SessionResponse =
            serde_json::from_str(&body_to_string(response.into_body()).await).unwrap();
        assert_eq!(session.selected_model_id, PRO);

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &format!("/api/sessions/{id}/model"),
                json!({"model_id": "models/not-a-model"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let (_, body) = get_session(&app, &id).await;
        let session: SessionResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(session.selected_model_id, PRO);
    }

    /// Tests clearing history twice leaves an empty session both times
    #[tokio::test]
    async fn it_clears_history() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", Matcher::Regex(r"streamGenerateContent".to_string()))
            .with_status(200)
            .with_body(gemini_sse_body(&["ok"]))
            .create_async()
            .await;

        let app = test_app(&server.url());
        let id = create_session(&app).await.session_id.to_string();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/sessions/{id}/messages"),
                json!({"message": "Hi"}),
            ))
            .await
            .unwrap();
        body_to_string(response.into_body()).await;

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri(format!("/api/sessions/{id}/clear"))
                        .method("POST")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let session: SessionResponse =
                serde_json::from_str(&body_to_string(response.into_body()).await).unwrap();
            assert!(session.messages.is_empty());
            assert!(!session.has_remote_context);
        }
    }

    /// Tests deleting a session
    #[tokio::test]
    async fn it_deletes_a_session() {
        let app = test_app("http://127.0.0.1:1");
        let id = create_session(&app).await.session_id.to_string();

        let delete = || {
            Request::builder()
                .uri(format!("/api/sessions/{id}"))
                .method("DELETE")
                .body(Body::empty())
                .unwrap()
        };

        let response = app.clone().oneshot(delete()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app.clone().oneshot(delete()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let (status, _) = get_session(&app, &id).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    /// Tests a second message on a session that is still replying is rejected
    #[tokio::test]
    async fn it_rejects_a_message_while_busy() {
        let app = test_app(&stalled_gemini_host().await);
        let id = create_session(&app).await.session_id.to_string();
        let uri = format!("/api/sessions/{id}/messages");

        let first = app
            .clone()
            .oneshot(json_request("POST", &uri, json!({"message": "Hi"})))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .clone()
            .oneshot(json_request("POST", &uri, json!({"message": "Hello?"})))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);

        let clear = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/sessions/{id}/clear"))
                    .method("POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(clear.status(), StatusCode::CONFLICT);
    }

    /// Tests reading a session waits for the reply in progress
    #[tokio::test]
    async fn it_waits_for_a_reply_before_reading_the_session() {
        let host = slow_gemini_host(gemini_sse_body(&["Slow reply"]), Duration::from_millis(100)).await;
        let app = test_app(&host);
        let id = create_session(&app).await.session_id.to_string();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/sessions/{id}/messages"),
                json!({"message": "Hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (status, body) = get_session(&app, &id).await;
        assert_eq!(status, StatusCode::OK);
        let session: SessionResponse = serde_json::from_str(&body).unwrap();
        let contents: Vec<&str> = session.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Hi", "Slow reply"]);
    }

    /// Tests idle sessions expire and can no longer be found
    #[tokio::test]
    async fn it_expires_idle_sessions() {
        let (app, state) = test_app_with_state("http://127.0.0.1:1");
        let id = create_session(&app).await.session_id.to_string();

        let removed = state.write().unwrap().remove_idle_sessions(Duration::from_secs(60 * 60));
        assert_eq!(removed, 0);
        let (status, _) = get_session(&app, &id).await;
        assert_eq!(status, StatusCode::OK);

        let removed = state.write().unwrap().remove_idle_sessions(Duration::ZERO);
        assert_eq!(removed, 1);
        let (status, _) = get_session(&app, &id).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    /// Tests a session busy with a reply is never expired
    #[tokio::test]
    async fn it_keeps_busy_sessions() {
        let (app, state) = test_app_with_state(&stalled_gemini_host().await);
        let id = create_session(&app).await.session_id.to_string();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/sessions/{id}/messages"),
                json!({"message": "Hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let removed = state.write().unwrap().remove_idle_sessions(Duration::ZERO);
        assert_eq!(removed, 0);
        assert_eq!(state.read().unwrap().sessions.len(), 1);
    }

    /// Tests the background sweeper removes idle sessions
    #[tokio::test]
    async fn it_sweeps_idle_sessions_in_the_background() {
        let (app, state) = test_app_with_state("http://127.0.0.1:1");
        let id = create_session(&app).await.session_id.to_string();

        spawn_session_sweeper(state.clone(), Duration::from_millis(10), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (status, _) = get_session(&app, &id).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(state.read().unwrap().sessions.is_empty());
    }
}
