//! Integration tests for the HTTP generation backend.

mod common;

use common::*;
use serde_json::json;
use storyreel::backend::{HttpBackend, FALLBACK_VOICE_ID};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn backend(server: &MockServer) -> HttpBackend {
    HttpBackend::new(&format!("{}/api/", server.uri())).unwrap()
}

/// Test that image generation posts the prompt and returns the image URL.
#[tokio::test]
async fn test_generate_image() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate-image"))
        .and(body_json(json!({ "prompt": "a lighthouse" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "imageUrl": "https://cdn/1.png" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let url = backend(&server).await.generate_image("a lighthouse").await.unwrap();
    assert_eq!(url, "https://cdn/1.png");
}

/// Test that narration requests carry the text and the voice id.
#[tokio::test]
async fn test_generate_audio_sends_voice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate-audio"))
        .and(body_json(json!({ "text": "Once upon a time.", "voiceId": FALLBACK_VOICE_ID })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "audioUrl": "https://cdn/1.mp3" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let voice = VoiceId::resolve(Some("not a voice!"));
    let url = backend(&server)
        .await
        .generate_audio("Once upon a time.", &voice)
        .await
        .unwrap();
    assert_eq!(url, "https://cdn/1.mp3");
}

/// Test story generation.
#[tokio::test]
async fn test_generate_story() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate-story"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "story": "One. Two." })),
        )
        .mount(&server)
        .await;

    let story = backend(&server).await.generate_story("anything").await.unwrap();
    assert_eq!(story, "One. Two.");
}

/// Test that server errors surface as errors naming the endpoint.
#[tokio::test]
async fn test_server_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate-image"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let error = backend(&server).await.generate_image("x").await.unwrap_err();
    assert!(format!("{error:#}").contains("generate-image"));
}

/// Test that a response without the expected field is rejected.
#[tokio::test]
async fn test_malformed_response_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate-audio"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "url": "nope" })))
        .mount(&server)
        .await;

    let result = backend(&server)
        .await
        .generate_audio("text", &VoiceId::default())
        .await;
    assert!(result.is_err());
}

/// Test that an unreachable backend fails instead of hanging.
#[tokio::test]
async fn test_unreachable_backend() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let backend = HttpBackend::new(&uri).unwrap();
    assert!(backend.generate_story("x").await.is_err());
}

/// Test that several clients can be created in one process.
#[tokio::test]
async fn test_backend_created_twice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate-story"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "story": "Once." })))
        .mount(&server)
        .await;

    let first = HttpBackend::new(&server.uri()).unwrap();
    let second = HttpBackend::new(&server.uri()).unwrap();

    assert_eq!(first.generate_story("x").await.unwrap(), "Once.");
    assert_eq!(second.generate_story("x").await.unwrap(), "Once.");
}

/// Test voice id resolution.
#[test]
fn test_voice_id_resolution() {
    assert_eq!(VoiceId::resolve(Some("narrator_2")).as_str(), "narrator_2");
    assert_eq!(VoiceId::resolve(Some("  warm-voice ")).as_str(), "warm-voice");
    assert_eq!(VoiceId::resolve(Some("")).as_str(), FALLBACK_VOICE_ID);
    assert_eq!(VoiceId::resolve(Some("a/b")).as_str(), FALLBACK_VOICE_ID);
    assert_eq!(VoiceId::resolve(None).as_str(), FALLBACK_VOICE_ID);
}
