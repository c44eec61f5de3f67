//! Unit tests for the mixer and the WAV stream encoding

#[cfg(test)]
mod tests {
    use crate::mixer::{mix_chunk, mix_into, MixerInputs};
    use crate::net::{encode_samples, wav_header};

    #[test]
    fn test_mix_into_applies_gain() {
        let mut acc = vec![(100, -100); 2];
        mix_into(&mut acc, &[(1000, 1000), (-1000, 500)], 0.5);

        assert_eq!(acc, vec![(600, 400), (-400, 150)]);
    }

    #[test]
    fn test_mix_into_saturates() {
        let mut acc = vec![(i16::MAX - 10, i16::MIN + 10)];
        mix_into(&mut acc, &[(1000, -1000)], 1.0);

        assert_eq!(acc, vec![(i16::MAX, i16::MIN)]);
    }

    #[test]
    fn test_mix_into_skips_silent_inputs() {
        let mut acc = vec![(7, 7)];
        mix_into(&mut acc, &[(1000, 1000)], 0.0);

        assert_eq!(acc, vec![(7, 7)]);
    }

    #[test]
    fn test_mix_chunk_uses_buffer_volumes() {
        let inputs = MixerInputs::new();
        {
            let mut narration = inputs.narration.lock().unwrap();
            narration.push_samples(vec![(1000, 1000); 4]);
            narration.set_paused(false);
        }
        {
            let mut ambient = inputs.ambient[1].lock().unwrap();
            ambient.push_samples(vec![(1000, -1000); 2]);
            ambient.set_volume(0.2);
            ambient.set_paused(false);
        }
        {
            // Paused input contributes nothing
            let mut ambient = inputs.ambient[0].lock().unwrap();
            ambient.push_samples(vec![(5000, 5000); 4]);
        }

        let chunk = mix_chunk(&inputs, 4);

        assert_eq!(chunk, vec![(1200, 800), (1200, 800), (1000, 1000), (1000, 1000)]);
    }

    #[test]
    fn test_wav_header_describes_stream() {
        let header = wav_header();

        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"WAVE");
        // Channel count and sample rate in the fmt chunk
        assert_eq!(u16::from_le_bytes([header[22], header[23]]), 2);
        assert_eq!(
            u32::from_le_bytes([header[24], header[25], header[26], header[27]]),
            48000
        );
    }

    #[test]
    fn test_encode_samples_little_endian_interleaved() {
        let bytes = encode_samples(&[(1, -1), (0x1234, 0)]);

        assert_eq!(bytes, vec![0x01, 0x00, 0xff, 0xff, 0x34, 0x12, 0x00, 0x00]);
    }
}
