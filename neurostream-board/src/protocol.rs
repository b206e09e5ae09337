//! Binary wire protocol for board sample frames
//!
//! Each frame is 15 bytes: `0xA0` header, one sample counter byte, four
//! channels of 24-bit big-endian two's-complement ADC counts, `0xC0` footer.
//! The parser is incremental: feed it whatever bytes arrived and it yields
//! complete frames, buffering partial ones and resynchronizing on garbage.

/// Frame start marker.
pub const FRAME_HEADER: u8 = 0xA0;
/// Frame end marker.
pub const FRAME_FOOTER: u8 = 0xC0;
/// Channels per frame.
pub const CHANNELS: usize = 4;
/// Total frame length in bytes.
pub const FRAME_LEN: usize = 2 + CHANNELS * 3 + 1;

/// Microvolts per ADC count (24-bit front end, gain 24, 4.5 V reference).
const SCALE_UV: f32 = 4.5 / 24.0 / ((1 << 23) as f32 - 1.0) * 1.0e6;

/// One decoded sample frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub counter: u8,
    /// Channel values in microvolts.
    pub channels: [f32; CHANNELS],
}

/// Incremental frame decoder with resync.
#[derive(Debug, Default)]
pub struct FrameParser {
    pending: Vec<u8>,
    dropped_bytes: u64,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes skipped while hunting for frame boundaries.
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes
    }

    /// Feed raw bytes, returning every complete frame they finish.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.pending.extend_from_slice(bytes);
        let mut frames = Vec::new();

        loop {
            // Hunt for the next header byte.
            match self.pending.iter().position(|&b| b == FRAME_HEADER) {
                Some(0) => {}
                Some(skip) => {
                    self.dropped_bytes += skip as u64;
                    self.pending.drain(..skip);
                }
                None => {
                    self.dropped_bytes += self.pending.len() as u64;
                    self.pending.clear();
                    break;
                }
            }

            if self.pending.len() < FRAME_LEN {
                break;
            }

            if self.pending[FRAME_LEN - 1] != FRAME_FOOTER {
                // Header byte was payload noise; skip it and rescan.
                self.dropped_bytes += 1;
                self.pending.drain(..1);
                continue;
            }

            let counter = self.pending[1];
            let mut channels = [0.0f32; CHANNELS];
            for (ch, value) in channels.iter_mut().enumerate() {
                let off = 2 + ch * 3;
                *value = decode_i24(&self.pending[off..off + 3]) as f32 * SCALE_UV;
            }
            frames.push(Frame { counter, channels });
            self.pending.drain(..FRAME_LEN);
        }

        frames
    }
}

/// Decode 3 bytes of big-endian two's-complement into i32.
fn decode_i24(bytes: &[u8]) -> i32 {
    let raw = ((bytes[0] as i32) << 16) | ((bytes[1] as i32) << 8) | bytes[2] as i32;
    // Sign-extend bit 23.
    (raw << 8) >> 8
}

/// Encode one frame; used by the synthetic board and tests.
pub fn encode_frame(counter: u8, channels_uv: &[f32; CHANNELS]) -> [u8; FRAME_LEN] {
    let mut out = [0u8; FRAME_LEN];
    out[0] = FRAME_HEADER;
    out[1] = counter;
    for (ch, &uv) in channels_uv.iter().enumerate() {
        let counts = (uv / SCALE_UV).round().clamp(-8_388_608.0, 8_388_607.0) as i32;
        let off = 2 + ch * 3;
        out[off] = ((counts >> 16) & 0xFF) as u8;
        out[off + 1] = ((counts >> 8) & 0xFF) as u8;
        out[off + 2] = (counts & 0xFF) as u8;
    }
    out[FRAME_LEN - 1] = FRAME_FOOTER;
    out
}
