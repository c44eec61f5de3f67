//! Streaming track loader.
//!
//! A track locator is either an `http(s)` URL returned by the generation
//! backend or a path on the local filesystem. Tracks are decoded with
//! symphonia on a blocking thread, resampled to [OUTPUT_SAMPLE_RATE] and
//! pushed into a [SharedBuffer] under a load ticket.

use crate::{
    buffer::SharedBuffer,
    sources::{Sample, OUTPUT_SAMPLE_RATE},
};
use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use itertools::Itertools;
use rubato::{FftFixedIn, Resampler};
use std::{fs::File, io::Cursor, path::Path};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

const RESAMPLER_CHUNK_SIZE: usize = 1024;

/// Called exactly once per load: `Ok` as soon as the first samples are
/// playable, `Err` if the track could not produce any audio.
pub type LoadNotifier = Box<dyn FnOnce(Result<(), String>) + Send>;

pub fn is_remote(locator: &str) -> bool {
    locator.starts_with("http://") || locator.starts_with("https://")
}

/// Starts loading `locator` into `buffer` in the background.
pub fn spawn_load(locator: String, ticket: u64, buffer: SharedBuffer, notify: LoadNotifier) {
    tokio::spawn(async move {
        let source = match open(&locator).await {
            Ok(source) => source,
            Err(e) => {
                warn!("Could not open track {locator}: {e:#}");
                if let Ok(mut buf) = buffer.lock() {
                    if buf.accepts(ticket) {
                        buf.mark_failed(format!("{e:#}"));
                    }
                }
                notify(Err(format!("{e:#}")));
                return;
            }
        };

        let hint = hint_for(&locator);
        let result =
            tokio::task::spawn_blocking(move || decode_into(source, hint, ticket, buffer, notify))
                .await;

        match result {
            Ok(Ok(())) => debug!("Finished decoding {locator}"),
            Ok(Err(e)) => warn!("Error while decoding {locator}: {e:#}"),
            Err(e) => error!("Decoder task for {locator} failed: {e:?}"),
        }
    });
}

async fn open(locator: &str) -> Result<Box<dyn MediaSource>> {
    if is_remote(locator) {
        let body: Bytes = reqwest::get(locator)
            .await
            .with_context(|| format!("Request to {locator} failed"))?
            .error_for_status()
            .with_context(|| format!("Fetching {locator} failed"))?
            .bytes()
            .await
            .with_context(|| format!("Reading body of {locator} failed"))?;

        Ok(Box::new(Cursor::new(body)))
    } else {
        let path = locator.to_string();
        let file = tokio::task::spawn_blocking(move || File::open(path))
            .await?
            .with_context(|| format!("Could not open {locator}"))?;

        Ok(Box::new(file))
    }
}

fn hint_for(locator: &str) -> Hint {
    let mut hint = Hint::new();
    let path = locator.split(['?', '#']).next().unwrap_or(locator);
    if let Some(ext) = Path::new(path).extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }
    hint
}

fn decode_into(
    source: Box<dyn MediaSource>,
    hint: Hint,
    ticket: u64,
    buffer: SharedBuffer,
    notify: LoadNotifier,
) -> Result<()> {
    let mut notify = Some(notify);
    let mut resampler: Option<StereoResampler> = None;

    let push = |frames: Vec<Sample>, notify: &mut Option<LoadNotifier>| -> Result<bool> {
        if frames.is_empty() {
            return Ok(true);
        }
        let accepted = buffer
            .lock()
            .map_err(|_| anyhow!("Track buffer lock poisoned"))?
            .push_samples_for(ticket, frames);
        if accepted {
            if let Some(notify) = notify.take() {
                notify(Ok(()));
            }
        }
        Ok(accepted)
    };

    let result = decode(source, hint, |frames, rate| {
        if rate == OUTPUT_SAMPLE_RATE {
            return push(frames, &mut notify);
        }
        if resampler.is_none() {
            resampler = Some(StereoResampler::new(rate, OUTPUT_SAMPLE_RATE)?);
        }
        match resampler.as_mut() {
            Some(resampler) => push(resampler.process(&frames)?, &mut notify),
            None => Ok(false),
        }
    });

    let result = result.and_then(|()| match resampler.as_mut() {
        Some(resampler) => push(resampler.flush()?, &mut notify).map(|_| ()),
        None => Ok(()),
    });

    if let Ok(mut buf) = buffer.lock() {
        if buf.accepts(ticket) {
            match (&result, notify.is_some()) {
                (Err(e), true) => buf.mark_failed(format!("{e:#}")),
                (Ok(()), true) => buf.mark_failed("track contained no audio"),
                _ => buf.set_eof(true),
            }
        }
    }

    if let Some(notify) = notify.take() {
        match &result {
            Err(e) => notify(Err(format!("{e:#}"))),
            Ok(()) => notify(Err("track contained no audio".to_string())),
        }
    }

    result
}

/// Decodes the default track of `source`, handing stereo frames and their
/// sample rate to `on_frames` until it returns `false` or the stream ends.
fn decode<F>(source: Box<dyn MediaSource>, hint: Hint, mut on_frames: F) -> Result<()>
where
    F: FnMut(Vec<Sample>, u32) -> Result<bool>,
{
    let mss = MediaSourceStream::new(source, Default::default());

    let format_opts: FormatOptions = Default::default();
    let metadata_opts: MetadataOptions = Default::default();
    let decoder_opts: DecoderOptions = Default::default();

    let probed =
        symphonia::default::get_probe().format(&hint, mss, &format_opts, &metadata_opts)?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .context("Could not find any tracks in file")?;
    let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &decoder_opts)?;
    let track_id = track.id;

    let mut sample_buf = None;

    loop {
        // Symphonia returns UnexpectedEof at the regular end of stream
        let packet = match format.next_packet() {
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(());
            }
            packet => packet?,
        };

        if packet.track_id() != track_id {
            continue;
        }

        let audio_buf = match decoder.decode(&packet) {
            Ok(audio_buf) => audio_buf,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("Skipping undecodable packet: {e}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *audio_buf.spec();
        let buf = sample_buf
            .get_or_insert_with(|| SampleBuffer::<i16>::new(audio_buf.capacity() as u64, spec));
        buf.copy_interleaved_ref(audio_buf);

        let frames = to_stereo(buf.samples(), spec.channels.count());
        if !on_frames(frames, spec.rate)? {
            return Ok(());
        }
    }
}

/// Folds interleaved samples of any channel count into stereo frames.
pub fn to_stereo(samples: &[i16], channels: usize) -> Vec<Sample> {
    match channels {
        0 => vec![],
        1 => samples.iter().map(|&s| (s, s)).collect(),
        2 => samples.iter().copied().tuples().collect(),
        n => samples.chunks_exact(n).map(|c| (c[0], c[1])).collect(),
    }
}

struct StereoResampler {
    inner: FftFixedIn<f64>,
    pending: [Vec<f64>; 2],
}

impl StereoResampler {
    fn new(from: u32, to: u32) -> Result<Self> {
        let inner = FftFixedIn::<f64>::new(from as usize, to as usize, RESAMPLER_CHUNK_SIZE, 2, 2)
            .with_context(|| format!("Failed to create {from}Hz -> {to}Hz resampler"))?;

        Ok(Self {
            inner,
            pending: [Vec::new(), Vec::new()],
        })
    }

    fn process(&mut self, frames: &[Sample]) -> Result<Vec<Sample>> {
        for &(left, right) in frames {
            self.pending[0].push(left as f64 / 32768.0);
            self.pending[1].push(right as f64 / 32768.0);
        }

        let mut output = Vec::new();
        loop {
            let needed = self.inner.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }
            let chunk: Vec<Vec<f64>> = self
                .pending
                .iter_mut()
                .map(|ch| ch.drain(..needed).collect())
                .collect();
            let resampled = self.inner.process(&chunk, None)?;
            output.extend(interleave(&resampled));
        }

        Ok(output)
    }

    fn flush(&mut self) -> Result<Vec<Sample>> {
        if self.pending[0].is_empty() {
            return Ok(vec![]);
        }
        let chunk: Vec<Vec<f64>> = self.pending.iter_mut().map(|ch| ch.drain(..).collect()).collect();
        let resampled = self.inner.process_partial(Some(chunk.as_slice()), None)?;
        Ok(interleave(&resampled))
    }
}

fn interleave(channels: &[Vec<f64>]) -> Vec<Sample> {
    let to_i16 = |s: f64| (s * 32767.0).clamp(-32768.0, 32767.0) as i16;
    match channels {
        [left, right, ..] => left
            .iter()
            .zip(right.iter())
            .map(|(&l, &r)| (to_i16(l), to_i16(r)))
            .collect(),
        _ => vec![],
    }
}
