use bytes::{BufMut, Bytes, BytesMut};

const RIFF: &[u8; 4] = b"RIFF";
const WAVE: &[u8; 4] = b"WAVE";
const FMT: &[u8; 4] = b"fmt ";
const DATA: &[u8; 4] = b"data";
const PCM: u16 = 1;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WavError {
    #[error("no samples to join")]
    Empty,
    #[error("not a RIFF/WAVE file")]
    NotWave,
    #[error("truncated {0} chunk")]
    Truncated(&'static str),
    #[error("missing {0} chunk")]
    MissingChunk(&'static str),
}

/// Sample format from a WAV `fmt ` chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WavFormat {
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl WavFormat {
    pub fn pcm(channels: u16, sample_rate: u32, bits_per_sample: u16) -> Self {
        Self {
            audio_format: PCM,
            channels,
            sample_rate,
            bits_per_sample,
        }
    }

    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * u32::from(self.block_align())
    }
}

/// A parsed WAV file: its format and raw frame bytes.
#[derive(Clone, Debug)]
pub struct Wav {
    pub format: WavFormat,
    pub frames: Bytes,
}

fn u16_at(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

fn u32_at(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

/// Parse a RIFF/WAVE file, skipping chunks other than `fmt ` and `data`.
pub fn parse(bytes: &Bytes) -> Result<Wav, WavError> {
    if bytes.len() < 12 || &bytes[0..4] != RIFF || &bytes[8..12] != WAVE {
        return Err(WavError::NotWave);
    }

    let mut format = None;
    let mut frames = None;
    let mut pos = 12;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = u32_at(bytes, pos + 4) as usize;
        let body = pos + 8;

        if id == FMT {
            if size < 16 || body + 16 > bytes.len() {
                return Err(WavError::Truncated("fmt"));
            }
            format = Some(WavFormat {
                audio_format: u16_at(bytes, body),
                channels: u16_at(bytes, body + 2),
                sample_rate: u32_at(bytes, body + 4),
                bits_per_sample: u16_at(bytes, body + 14),
            });
        } else if id == DATA {
            // Streaming writers leave the size unset; take what is there.
            let end = body.saturating_add(size).min(bytes.len());
            frames = Some(bytes.slice(body..end));
        }

        // Chunks are word aligned.
        pos = body.saturating_add(size).saturating_add(size & 1);
    }

    Ok(Wav {
        format: format.ok_or(WavError::MissingChunk("fmt"))?,
        frames: frames.ok_or(WavError::MissingChunk("data"))?,
    })
}

/// Write a canonical 44-byte-header WAV file.
pub fn encode(format: &WavFormat, frames: &[u8]) -> Bytes {
    let data_len = frames.len() as u32;
    let mut out = BytesMut::with_capacity(44 + frames.len());
    out.put_slice(RIFF);
    out.put_u32_le(36 + data_len);
    out.put_slice(WAVE);
    out.put_slice(FMT);
    out.put_u32_le(16);
    out.put_u16_le(format.audio_format);
    out.put_u16_le(format.channels);
    out.put_u32_le(format.sample_rate);
    out.put_u32_le(format.byte_rate());
    out.put_u16_le(format.block_align());
    out.put_u16_le(format.bits_per_sample);
    out.put_slice(DATA);
    out.put_u32_le(data_len);
    out.put_slice(frames);
    out.freeze()
}

/// Concatenate the frames of every sample into one file using the first sample's format.
pub fn join(samples: &[Bytes]) -> Result<Bytes, WavError> {
    let (first, rest) = samples.split_first().ok_or(WavError::Empty)?;
    let head = parse(first)?;
    let mut frames = BytesMut::from(&head.frames[..]);
    for sample in rest {
        frames.put_slice(&parse(sample)?.frames);
    }
    Ok(encode(&head.format, &frames))
}
