#[macro_use]
extern crate log;

use anyhow::Result;
use std::sync::Arc;
use storyreel::{
    backend::HttpBackend,
    config,
    crossfade::{self, CrossfadeConfig},
    event::{self, Event, EventBus},
    mixer::{self, MixerInputs},
    narration, net,
    scene::{self, SceneAction, SceneSettings},
    stdin,
};

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init();

    let config = match config::load().await {
        Ok(config) => config,
        Err(e) => {
            warn!("{e:#}, using default configuration");
            config::Config::default()
        }
    };

    let bus = EventBus::new();
    event::debug(&bus);

    let inputs = MixerInputs::new();

    let scheduler = crossfade::init(
        &bus,
        CrossfadeConfig::from(&config.audio),
        inputs.ambient.clone(),
    );
    let _narration = narration::init(&bus, inputs.narration.clone());

    let backend = Arc::new(HttpBackend::new(&config.backend_url)?);
    let _scenes = scene::init(&bus, SceneSettings::from(&config), backend);

    let listener = net::bind(&config.audio.listen_addr).await?;
    net::init(listener, mixer::init(inputs));

    stdin::start(&bus, config.audio.volume, config.audio.volume_debounce());

    bus.send(Event::Scene(SceneAction::RequestStory {
        prompt: config.story_prompt.clone(),
    }));

    let mut bus_rx = bus.subscribe();
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = async {
            while let Some(event) = bus_rx.recv().await {
                if matches!(event, Event::Shutdown) {
                    break;
                }
            }
        } => {}
    }

    info!("Shutting down");
    scheduler.write().await.dispose();

    Ok(())
}
