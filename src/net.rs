use crate::{
    constants::{BIT_DEPTH, CHANNELS, SAMPLE_RATE},
    mixer::MixerOutput,
    sources::Sample,
};
use anyhow::{Context, Result};
use byteorder::{ByteOrder, LittleEndian};
use hound::{SampleFormat, WavSpec};
use std::net::SocketAddr;
use tokio::{io::AsyncWriteExt, net::TcpListener};

/// Header of a WAV file without a known length, so players keep reading
pub fn wav_header() -> Vec<u8> {
    let spec = WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: BIT_DEPTH,
        sample_format: SampleFormat::Int,
    };

    spec.into_header_for_infinite_file()
}

/// Interleaved little-endian PCM
pub fn encode_samples(samples: &[Sample]) -> Vec<u8> {
    let mut bytes = vec![0u8; samples.len() * 4];

    for (frame, (left, right)) in bytes.chunks_exact_mut(4).zip(samples) {
        LittleEndian::write_i16(&mut frame[..2], *left);
        LittleEndian::write_i16(&mut frame[2..], *right);
    }

    bytes
}

pub async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Could not listen on {addr}"))
}

/// Serves the mix as an endless WAV stream to every client that connects.
pub fn init(listener: TcpListener, source: MixerOutput) {
    tokio::spawn(async move {
        if let Ok(addr) = listener.local_addr() {
            info!("Streaming audio on {addr}");
        }

        loop {
            match accept(&listener, &source).await {
                Ok(addr) => info!("Accepted connection from {addr}"),
                Err(e) => error!("Failed to accept connection: {e:?}"),
            }
        }
    });
}

async fn accept(listener: &TcpListener, source: &MixerOutput) -> Result<SocketAddr> {
    let (mut stream, addr) = listener.accept().await?;
    let mut source = source.clone();

    tokio::spawn(async move {
        if let Err(e) = stream.write_all(&wav_header()).await {
            warn!("Failed to write wav header to {addr}: {e}");
            return;
        }

        loop {
            if source.changed().await.is_err() {
                debug!("Mixer stopped, closing stream to {addr}");
                break;
            }

            let bytes = encode_samples(&source.borrow_and_update());

            if let Err(e) = stream.write_all(&bytes).await {
                info!("Client {addr} disconnected: {e}");
                break;
            }
        }
    });

    Ok(addr)
}
