//! Segment planning for windowed inference.
//!
//! Splits a signal of `total_frames` into fixed-length segments that overlap
//! by a fixed number of frames. Works on frame counts only, never samples.

use crate::defaults;
use crate::error::{Result, StemwerkError};

/// Segment length and overlap, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkPolicy {
    pub segment_secs: f64,
    pub overlap_secs: f64,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            segment_secs: defaults::SEGMENT_SECS,
            overlap_secs: defaults::OVERLAP_SECS,
        }
    }
}

impl ChunkPolicy {
    pub fn new(segment_secs: f64, overlap_secs: f64) -> Self {
        Self {
            segment_secs,
            overlap_secs,
        }
    }

    /// Reject policies that cannot produce a forward-moving plan.
    pub fn validate(&self) -> Result<()> {
        if !self.segment_secs.is_finite() || self.segment_secs <= 0.0 {
            return Err(invalid(format!(
                "segment length must be positive, got {}s",
                self.segment_secs
            )));
        }
        if !self.overlap_secs.is_finite() || self.overlap_secs < 0.0 {
            return Err(invalid(format!(
                "overlap must be non-negative, got {}s",
                self.overlap_secs
            )));
        }
        if self.overlap_secs >= self.segment_secs {
            return Err(invalid(format!(
                "overlap ({}s) must be shorter than the segment ({}s)",
                self.overlap_secs, self.segment_secs
            )));
        }
        Ok(())
    }
}

fn invalid(message: String) -> StemwerkError {
    StemwerkError::InvalidChunkPolicy { message }
}

/// One inference window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Position in the plan, starting at 0
    pub index: usize,
    pub start_frame: u64,
    pub length_frames: u64,
}

impl Segment {
    /// One past the last frame covered.
    pub fn end_frame(&self) -> u64 {
        self.start_frame + self.length_frames
    }
}

/// Ordered segments plus the policy that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPlan {
    pub segments: Vec<Segment>,
    pub segment_secs: f64,
    pub overlap_secs: f64,
    pub segment_frames: u64,
    pub overlap_frames: u64,
    pub hop_frames: u64,
    pub total_frames: u64,
}

impl ChunkPlan {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Frames shared by segment `index` and the one after it (0 for the last).
    pub fn overlap_with_next(&self, index: usize) -> u64 {
        match (self.segments.get(index), self.segments.get(index + 1)) {
            (Some(current), Some(next)) => current.end_frame().saturating_sub(next.start_frame),
            _ => 0,
        }
    }
}

/// Plan segments covering `[0, total_frames)`.
///
/// `segment_frames` and `overlap_frames` are the policy durations times the
/// sample rate, rounded to whole frames. Consecutive segments start
/// `hop_frames = segment_frames - overlap_frames` apart; the last segment is
/// cut at `total_frames`. An empty signal yields an empty plan.
///
/// # Errors
///
/// [`StemwerkError::InvalidChunkPolicy`] for an invalid policy, a zero sample
/// rate, or a segment shorter than one frame.
pub fn plan(total_frames: u64, sample_rate: u32, policy: ChunkPolicy) -> Result<ChunkPlan> {
    policy.validate()?;
    if sample_rate == 0 {
        return Err(invalid("sample rate must be positive".to_string()));
    }

    let segment_frames = (policy.segment_secs * sample_rate as f64).round() as u64;
    let overlap_frames = (policy.overlap_secs * sample_rate as f64).round() as u64;
    if segment_frames == 0 {
        return Err(invalid(format!(
            "segment of {}s is shorter than one frame at {} Hz",
            policy.segment_secs, sample_rate
        )));
    }
    let hop_frames = segment_frames.saturating_sub(overlap_frames).max(1);

    let chunk_count = if total_frames == 0 {
        0
    } else {
        total_frames
            .saturating_sub(overlap_frames)
            .div_ceil(hop_frames)
            .max(1)
    };

    let mut segments = Vec::with_capacity(chunk_count as usize);
    for index in 0..chunk_count {
        let start_frame = index * hop_frames;
        if start_frame >= total_frames {
            break;
        }
        segments.push(Segment {
            index: index as usize,
            start_frame,
            length_frames: segment_frames.min(total_frames - start_frame),
        });
    }

    Ok(ChunkPlan {
        segments,
        segment_secs: policy.segment_secs,
        overlap_secs: policy.overlap_secs,
        segment_frames,
        overlap_frames,
        hop_frames,
        total_frames,
    })
}
