use crate::{buffer::SharedBuffer, constants::SAMPLE_RATE, sources::Sample};
use std::time::Duration;
use tokio::{sync::watch, time::Instant};

const TARGET_CHUNK_SIZE: usize = 128;

pub type MixerOutput = watch::Receiver<Vec<Sample>>;

/// Everything that ends up in the output stream
#[derive(Clone)]
pub struct MixerInputs {
    pub narration: SharedBuffer,
    pub ambient: [SharedBuffer; 2],
}

impl MixerInputs {
    pub fn new() -> Self {
        Self {
            narration: crate::buffer::shared(),
            ambient: [crate::buffer::shared(), crate::buffer::shared()],
        }
    }

    fn all(&self) -> [&SharedBuffer; 3] {
        [&self.narration, &self.ambient[0], &self.ambient[1]]
    }
}

impl Default for MixerInputs {
    fn default() -> Self {
        Self::new()
    }
}

/// Adds `samples` scaled by `gain` onto `acc`, saturating at the i16 range.
pub fn mix_into(acc: &mut [Sample], samples: &[Sample], gain: f32) {
    if gain <= 0.0 {
        return;
    }

    for (out, sample) in acc.iter_mut().zip(samples) {
        out.0 = out.0.saturating_add((sample.0 as f32 * gain) as i16);
        out.1 = out.1.saturating_add((sample.1 as f32 * gain) as i16);
    }
}

/// Pulls `count` samples from every input and mixes them at each buffer's
/// own volume.
pub fn mix_chunk(inputs: &MixerInputs, count: usize) -> Vec<Sample> {
    let mut chunk = vec![(0, 0); count];

    for input in inputs.all() {
        let (samples, volume) = match input.lock() {
            Ok(mut buffer) => (buffer.pull_samples(count), buffer.volume()),
            Err(_) => {
                error!("Mixer input is poisoned, skipping it");
                continue;
            }
        };
        mix_into(&mut chunk, &samples, volume);
    }

    chunk
}

pub fn init(inputs: MixerInputs) -> MixerOutput {
    let (tx, rx) = watch::channel(Default::default());

    tokio::spawn(async move {
        let start_time = Instant::now();
        let mut sample_send_count: u64 = 0;

        let sleep_time = Duration::from_micros(
            ((TARGET_CHUNK_SIZE as f64 / SAMPLE_RATE as f64) * 1_000_000.0) as u64,
        );

        loop {
            let expected_sent_samples =
                ((start_time.elapsed() + sleep_time).as_secs_f64() * SAMPLE_RATE as f64) as u64;
            let chunk_size = expected_sent_samples.saturating_sub(sample_send_count) as usize;

            let chunk = mix_chunk(&inputs, chunk_size);

            if tx.send(chunk).is_err() {
                warn!("Mixer output has no receivers, stopping mixer");
                break;
            }
            sample_send_count += chunk_size as u64;

            tokio::time::sleep(sleep_time).await;
        }
    });

    rx
}
