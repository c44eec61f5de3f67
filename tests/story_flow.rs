//! End-to-end test: story generation, scene narration and ambient music
//! with every component running on one bus.

mod common;

use common::*;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use storyreel::backend::HttpBackend;
use storyreel::crossfade::{self, CrossfadeConfig};
use storyreel::mixer::{self, MixerInputs};
use storyreel::sentiment::TrackTable;
use storyreel::{narration, scene};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WAIT: Duration = Duration::from_secs(10);

async fn mock_backend(narration_clip: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate-story"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "story": "They slept in a quiet meadow. The end."
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/generate-image"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "imageUrl": "https://img.test/1.png" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/generate-audio"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "audioUrl": narration_clip })))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_story_plays_narration_over_mood_music() {
    let dir = tempfile::tempdir().unwrap();
    let clip = path_str(&write_wav(dir.path(), "narration.wav", 0.2, 3000));
    let calm = path_str(&write_wav(dir.path(), "calm.wav", 0.5, 500));
    let neutral = path_str(&write_wav(dir.path(), "neutral.wav", 0.5, 400));

    let server = mock_backend(&clip).await;

    let mut config = Config::default();
    config.backend_url = server.uri();
    config.audio.crossfade_ms = 100;
    config.audio.scene_crossfade_ms = 100;
    config.audio.frame_ms = 5;
    config.tracks = TrackTable {
        default: neutral.clone(),
        moods: BTreeMap::from([("calm".to_string(), calm.clone())]),
    };

    let bus = EventBus::new();
    let mut events = bus.subscribe();
    let inputs = MixerInputs::new();

    let scheduler = crossfade::init(
        &bus,
        CrossfadeConfig::from(&config.audio),
        inputs.ambient.clone(),
    );
    let _narration = narration::init(&bus, inputs.narration.clone());
    let backend = Arc::new(HttpBackend::new(&config.backend_url).unwrap());
    let scenes = scene::init(&bus, SceneSettings::from(&config), backend);
    let _output = mixer::init(inputs.clone());

    bus.send(Event::Scene(SceneAction::RequestStory {
        prompt: config.story_prompt.clone(),
    }));

    // The first scene narrates to the end
    let ended = wait_for_event(&mut events, WAIT, |event| {
        matches!(event, Event::Narration(NarrationAction::Ended { index: 0 }))
    })
    .await;
    assert!(ended.is_some());

    {
        let scheduler = scheduler.read().await;
        assert_eq!(scheduler.current_slot().resource_ref(), Some(calm.as_str()));
        assert_eq!(scheduler.current_slot().current_volume(), 0.2);
    }
    {
        let scenes = scenes.read().await;
        let scene = scenes.current_scene().unwrap();
        assert_eq!(scene.text(), "They slept in a quiet meadow.");
        assert_eq!(scene.image_ref.as_deref(), Some("https://img.test/1.png"));
        assert_eq!(scene.narration_ref.as_deref(), Some(clip.as_str()));
    }

    // Moving on changes the mood and crossfades to the default track
    bus.send(Event::Scene(SceneAction::NavigateNext));
    let (mut swapped, mut narrated) = (false, false);
    while !(swapped && narrated) {
        let event = wait_for_event(&mut events, WAIT, |event| {
            matches!(
                event,
                Event::Crossfade(CrossfadeAction::TransitionComplete { .. })
                    | Event::Narration(NarrationAction::Ended { index: 1 })
            )
        })
        .await;

        match event {
            Some(Event::Crossfade(CrossfadeAction::TransitionComplete { track })) => {
                assert_eq!(track, neutral);
                swapped = true;
            }
            Some(_) => narrated = true,
            None => panic!("second scene never finished (swapped: {swapped}, narrated: {narrated})"),
        }
    }

    scheduler.write().await.dispose();
    assert!(inputs.ambient.iter().all(|buffer| buffer.lock().unwrap().is_paused()));
}
