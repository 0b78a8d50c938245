//! PCM16 WAV codec.
//!
//! Parses RIFF/WAVE containers by walking their sub-chunks and writes the
//! canonical 44-byte header. Only linear PCM at 16 bits per sample is
//! accepted; everything else is rejected rather than converted.

use crate::error::{Result, StemwerkError};
use std::io::Write;

/// Size of the canonical RIFF/WAVE/fmt/data header written by [`encode`].
pub const CANONICAL_HEADER_LEN: usize = 44;

/// Format tag for linear PCM in the fmt chunk.
const FORMAT_PCM: u16 = 1;

/// Bytes per sample for PCM16.
const BYTES_PER_SAMPLE: usize = 2;

/// Minimum fmt chunk body holding the fields read by the decoder.
const FMT_MIN_LEN: usize = 16;

/// Format metadata of a decoded PCM16 WAV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channel_count: u16,
    /// Bits per sample (always 16 after a successful decode)
    pub bits_per_sample: u16,
    /// Byte offset of the PCM data within the source buffer
    pub data_offset: usize,
    /// Length of the PCM data in bytes
    pub data_len: usize,
}

impl WavFormat {
    /// Format describing `data_len` bytes of PCM16 laid out with the canonical header.
    pub fn canonical(sample_rate: u32, channel_count: u16, data_len: usize) -> Self {
        Self {
            sample_rate,
            channel_count,
            bits_per_sample: 16,
            data_offset: CANONICAL_HEADER_LEN,
            data_len,
        }
    }

    /// Bytes per interleaved frame.
    pub fn block_align(&self) -> usize {
        self.channel_count as usize * BYTES_PER_SAMPLE
    }

    /// Bytes of audio per second, or `None` if it does not fit the
    /// 32-bit header field.
    pub fn byte_rate(&self) -> Option<u32> {
        u32::try_from(self.block_align())
            .ok()
            .and_then(|align| self.sample_rate.checked_mul(align))
    }

    /// Number of frames in the data chunk.
    pub fn frames(&self) -> usize {
        match self.block_align() {
            0 => 0,
            align => self.data_len / align,
        }
    }

    /// Duration of the audio data in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Interleaved little-endian PCM16 bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PcmBuffer(Vec<u8>);

impl PcmBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Encode interleaved samples as little-endian bytes.
    pub fn from_samples(samples: &[i16]) -> Self {
        let mut bytes = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        Self(bytes)
    }

    /// Decode into interleaved samples. A trailing odd byte is ignored.
    pub fn to_samples(&self) -> Vec<i16> {
        self.0
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    /// Number of whole frames for the given channel count.
    pub fn frames(&self, channel_count: u16) -> usize {
        match channel_count as usize * BYTES_PER_SAMPLE {
            0 => 0,
            align => self.0.len() / align,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Returns true if `bytes` start with a RIFF/WAVE signature.
///
/// Fewer than 12 bytes is simply not a WAV file.
pub fn sniff(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

fn le_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn le_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Fields read from the first fmt chunk.
struct FmtFields {
    format_tag: u16,
    channel_count: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// Decode a PCM16 WAV file held entirely in memory.
///
/// Sub-chunks are scanned in order from offset 12; the first `fmt ` and the
/// first `data` chunk win and scanning stops once both are seen. A chunk
/// whose declared length runs past the end of `bytes` ends the scan.
///
/// # Errors
///
/// - [`StemwerkError::MissingRiffHeader`] if [`sniff`] fails
/// - [`StemwerkError::MissingFormatChunk`] / [`StemwerkError::MissingDataChunk`]
/// - [`StemwerkError::UnsupportedAudioFormat`] for non-PCM format tags
/// - [`StemwerkError::UnsupportedBitDepth`] for anything but 16-bit samples
/// - [`StemwerkError::MalformedFormatChunk`] for a short fmt chunk or zero
///   channels / sample rate
/// - [`StemwerkError::MisalignedAudioData`] if the data is not whole frames
pub fn decode(bytes: &[u8]) -> Result<(WavFormat, PcmBuffer)> {
    if !sniff(bytes) {
        return Err(StemwerkError::MissingRiffHeader);
    }

    let mut pos = 12usize;
    let mut fmt: Option<FmtFields> = None;
    let mut data: Option<(usize, usize)> = None;

    while pos + 8 <= bytes.len() {
        let chunk_id = &bytes[pos..pos + 4];
        let chunk_len = le_u32(bytes, pos + 4) as usize;
        let body = pos + 8;

        let Some(body_end) = body.checked_add(chunk_len) else {
            break;
        };
        if body_end > bytes.len() {
            log::debug!(
                "WAV chunk {:?} at offset {} overruns the buffer, stopping scan",
                String::from_utf8_lossy(chunk_id),
                pos
            );
            break;
        }

        match chunk_id {
            b"fmt " if fmt.is_none() => {
                if chunk_len < FMT_MIN_LEN {
                    return Err(StemwerkError::MalformedFormatChunk {
                        message: format!("fmt chunk is {chunk_len} bytes, need {FMT_MIN_LEN}"),
                    });
                }
                fmt = Some(FmtFields {
                    format_tag: le_u16(bytes, body),
                    channel_count: le_u16(bytes, body + 2),
                    sample_rate: le_u32(bytes, body + 4),
                    bits_per_sample: le_u16(bytes, body + 14),
                });
            }
            b"data" if data.is_none() => {
                data = Some((body, chunk_len));
            }
            _ => {}
        }

        if fmt.is_some() && data.is_some() {
            break;
        }

        // Chunks are word-aligned: odd lengths carry one pad byte.
        pos = body_end + (chunk_len % 2);
    }

    let fmt = fmt.ok_or(StemwerkError::MissingFormatChunk)?;
    let (data_offset, data_len) = data.ok_or(StemwerkError::MissingDataChunk)?;

    if fmt.format_tag != FORMAT_PCM {
        return Err(StemwerkError::UnsupportedAudioFormat {
            tag: fmt.format_tag,
        });
    }
    if fmt.bits_per_sample != 16 {
        return Err(StemwerkError::UnsupportedBitDepth {
            bits: fmt.bits_per_sample,
        });
    }
    if fmt.channel_count == 0 {
        return Err(StemwerkError::MalformedFormatChunk {
            message: "channel count is 0".to_string(),
        });
    }
    if fmt.sample_rate == 0 {
        return Err(StemwerkError::MalformedFormatChunk {
            message: "sample rate is 0".to_string(),
        });
    }

    let format = WavFormat {
        sample_rate: fmt.sample_rate,
        channel_count: fmt.channel_count,
        bits_per_sample: fmt.bits_per_sample,
        data_offset,
        data_len,
    };

    header_fields(&format, data_len)
        .map_err(|message| StemwerkError::MalformedFormatChunk { message })?;

    let block_align = format.block_align();
    if data_len % block_align != 0 {
        return Err(StemwerkError::MisalignedAudioData {
            len: data_len,
            block_align,
        });
    }

    let pcm = PcmBuffer::new(bytes[data_offset..data_offset + data_len].to_vec());
    Ok((format, pcm))
}

/// Header fields that depend on the format, checked against their widths.
struct HeaderFields {
    block_align: u16,
    byte_rate: u32,
    riff_len: u32,
    data_len: u32,
}

fn header_fields(format: &WavFormat, pcm_len: usize) -> std::result::Result<HeaderFields, String> {
    let block_align = u16::try_from(format.block_align()).map_err(|_| {
        format!(
            "{} channels exceed the 16-bit frame size field",
            format.channel_count
        )
    })?;
    let byte_rate = format.byte_rate().ok_or_else(|| {
        format!(
            "byte rate of {} Hz x {} channels exceeds 32 bits",
            format.sample_rate, format.channel_count
        )
    })?;
    let riff_len = u32::try_from(pcm_len)
        .ok()
        .and_then(|len| len.checked_add((CANONICAL_HEADER_LEN - 8) as u32))
        .ok_or_else(|| format!("{pcm_len} bytes of audio exceed the 32-bit RIFF size"))?;

    Ok(HeaderFields {
        block_align,
        byte_rate,
        riff_len,
        data_len: riff_len - (CANONICAL_HEADER_LEN - 8) as u32,
    })
}

/// Build the canonical 44-byte header for `pcm_len` bytes of PCM16.
fn header(format: &WavFormat, pcm_len: usize) -> Result<[u8; CANONICAL_HEADER_LEN]> {
    let fields = header_fields(format, pcm_len)
        .map_err(|message| StemwerkError::UnencodableFormat { message })?;

    let mut out = [0u8; CANONICAL_HEADER_LEN];
    out[0..4].copy_from_slice(b"RIFF");
    out[4..8].copy_from_slice(&fields.riff_len.to_le_bytes());
    out[8..12].copy_from_slice(b"WAVE");
    out[12..16].copy_from_slice(b"fmt ");
    out[16..20].copy_from_slice(&16u32.to_le_bytes());
    out[20..22].copy_from_slice(&FORMAT_PCM.to_le_bytes());
    out[22..24].copy_from_slice(&format.channel_count.to_le_bytes());
    out[24..28].copy_from_slice(&format.sample_rate.to_le_bytes());
    out[28..32].copy_from_slice(&fields.byte_rate.to_le_bytes());
    out[32..34].copy_from_slice(&fields.block_align.to_le_bytes());
    out[34..36].copy_from_slice(&16u16.to_le_bytes());
    out[36..40].copy_from_slice(b"data");
    out[40..44].copy_from_slice(&fields.data_len.to_le_bytes());
    Ok(out)
}

/// Encode PCM16 data with the canonical header.
///
/// Only the sample rate and channel count of `format` are used; the offset
/// and length fields describe the output layout and follow from `pcm`.
///
/// # Errors
///
/// [`StemwerkError::UnencodableFormat`] if a header field cannot hold the
/// value the format implies.
pub fn encode(format: &WavFormat, pcm: &PcmBuffer) -> Result<Vec<u8>> {
    let header = header(format, pcm.len())?;
    let mut out = Vec::with_capacity(CANONICAL_HEADER_LEN + pcm.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(pcm.as_bytes());
    Ok(out)
}

/// Stream the canonical encoding of `pcm` into `writer`.
///
/// The header is validated before anything is written.
pub fn encode_to(writer: &mut dyn Write, format: &WavFormat, pcm: &PcmBuffer) -> Result<()> {
    let header = header(format, pcm.len())?;
    writer.write_all(&header)?;
    writer.write_all(pcm.as_bytes())?;
    Ok(())
}
