// Output audio parameters shared by the mixer and the network stream
pub const SAMPLE_RATE: u32 = 48000; // 48 kHz output rate
pub const BIT_DEPTH: u16 = 16; // 16 bits per sample
pub const CHANNELS: u16 = 2; // Stereo channel
