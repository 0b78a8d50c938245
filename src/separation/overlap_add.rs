//! Overlap-add reconstruction of per-segment inference output.
//!
//! Each segment contributes its samples scaled by a linear cross-fade
//! weight: ramps up across the region it shares with the previous segment
//! and down across the region it shares with the next. Both ramps over one
//! overlap sum to 1, and the accumulated weight is divided out at the end,
//! so an identity separator reproduces its input exactly.

use crate::error::{Result, StemwerkError};
use crate::separation::chunk_plan::{ChunkPlan, Segment};

/// Accumulates weighted stem audio over a whole signal.
pub struct OverlapAdd {
    channels: usize,
    total_frames: usize,
    /// Weighted sample sums, one interleaved buffer per stem
    sums: Vec<Vec<f32>>,
    /// Accumulated weight per frame (identical for every stem)
    weights: Vec<f32>,
}

/// Cross-fade weight for frame `t` of a segment `len` frames long.
fn crossfade_weight(t: u64, len: u64, fade_in: u64, fade_out: u64) -> f32 {
    let rise = if t < fade_in {
        (t + 1) as f32 / (fade_in + 1) as f32
    } else {
        1.0
    };
    let fall = if fade_out > 0 && t >= len.saturating_sub(fade_out) {
        (len - t) as f32 / (fade_out + 1) as f32
    } else {
        1.0
    };
    rise * fall
}

impl OverlapAdd {
    pub fn new(stem_count: usize, total_frames: usize, channels: u16) -> Self {
        let channels = channels as usize;
        Self {
            channels,
            total_frames,
            sums: vec![vec![0.0; total_frames * channels]; stem_count],
            weights: vec![0.0; total_frames],
        }
    }

    /// Add one segment's output, one interleaved buffer per stem.
    ///
    /// # Errors
    ///
    /// [`StemwerkError::Inference`] if the stem count or any buffer length
    /// does not match the segment.
    pub fn add(&mut self, plan: &ChunkPlan, segment: &Segment, stems: &[Vec<i16>]) -> Result<()> {
        if stems.len() != self.sums.len() {
            return Err(StemwerkError::Inference {
                segment: segment.index,
                message: format!(
                    "separator returned {} stems, expected {}",
                    stems.len(),
                    self.sums.len()
                ),
            });
        }

        let len = segment.length_frames;
        let expected = len as usize * self.channels;
        if let Some(bad) = stems.iter().find(|s| s.len() != expected) {
            return Err(StemwerkError::Inference {
                segment: segment.index,
                message: format!(
                    "separator returned {} samples, expected {}",
                    bad.len(),
                    expected
                ),
            });
        }

        let fade_in = match segment.index {
            0 => 0,
            i => plan.overlap_with_next(i - 1),
        };
        let fade_out = plan.overlap_with_next(segment.index);
        let start = segment.start_frame as usize;

        for t in 0..len {
            let weight = crossfade_weight(t, len, fade_in, fade_out);
            let frame = start + t as usize;
            if frame >= self.total_frames {
                break;
            }
            self.weights[frame] += weight;

            let src = t as usize * self.channels;
            let dst = frame * self.channels;
            for (sum, stem) in self.sums.iter_mut().zip(stems) {
                for ch in 0..self.channels {
                    sum[dst + ch] += stem[src + ch] as f32 * weight;
                }
            }
        }
        Ok(())
    }

    /// Normalize by the accumulated weight and convert back to PCM16 samples.
    ///
    /// Frames no segment touched come out silent.
    pub fn finish(self) -> Vec<Vec<i16>> {
        let channels = self.channels;
        let weights = self.weights;
        self.sums
            .into_iter()
            .map(|sum| {
                sum.iter()
                    .enumerate()
                    .map(|(i, &value)| {
                        let w = weights[i / channels];
                        if w <= 0.0 {
                            0
                        } else {
                            (value / w)
                                .round()
                                .clamp(i16::MIN as f32, i16::MAX as f32)
                                as i16
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::separation::chunk_plan::{ChunkPolicy, plan};

    fn slice_segment(signal: &[i16], seg: &Segment, channels: usize) -> Vec<i16> {
        let start = seg.start_frame as usize * channels;
        let end = seg.end_frame() as usize * channels;
        signal[start..end].to_vec()
    }

    #[test]
    fn crossfade_ramps_sum_to_one() {
        let overlap = 4;
        let len = 10;
        for k in 0..overlap {
            let tail = crossfade_weight(len - overlap + k, len, 0, overlap);
            let head = crossfade_weight(k, len, overlap, 0);
            assert!((tail + head - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn crossfade_is_flat_without_overlap() {
        for t in 0..8 {
            assert_eq!(crossfade_weight(t, 8, 0, 0), 1.0);
        }
    }

    #[test]
    fn identity_segments_reconstruct_input() {
        let channels = 2usize;
        let total = 2_345usize;
        let signal: Vec<i16> = (0..total * channels)
            .map(|i| ((i as i32 * 7919) % 60000 - 30000) as i16)
            .collect();
        let plan = plan(total as u64, 100, ChunkPolicy::default()).unwrap();
        assert!(plan.len() > 1);

        let mut ola = OverlapAdd::new(2, total, channels as u16);
        for seg in &plan.segments {
            let slice = slice_segment(&signal, seg, channels);
            ola.add(&plan, seg, &[slice.clone(), slice]).unwrap();
        }

        let stems = ola.finish();
        assert_eq!(stems.len(), 2);
        assert_eq!(stems[0], signal);
        assert_eq!(stems[1], signal);
    }

    #[test]
    fn overlap_region_blends_between_segments() {
        // Segment 0 outputs 1000, segment 1 outputs 0: the overlap ramps down.
        let plan = plan(150, 10, ChunkPolicy::new(10.0, 5.0)).unwrap();
        assert_eq!(plan.len(), 2);
        let mut ola = OverlapAdd::new(1, 150, 1);
        ola.add(&plan, &plan.segments[0], &[vec![1000; 100]]).unwrap();
        ola.add(&plan, &plan.segments[1], &[vec![0; 100]]).unwrap();

        let out = &ola.finish()[0];
        assert_eq!(out[0], 1000);
        assert_eq!(out[49], 1000);
        assert!(out[50] < 1000 && out[50] > 900);
        assert!(out[99] > 0 && out[99] < 100);
        assert_eq!(out[100], 0);
        for pair in out[50..100].windows(2) {
            assert!(pair[0] >= pair[1], "cross-fade must ramp down monotonically");
        }
    }

    #[test]
    fn wrong_stem_count_is_inference_error() {
        let plan = plan(100, 10, ChunkPolicy::default()).unwrap();
        let mut ola = OverlapAdd::new(4, 100, 1);
        let result = ola.add(&plan, &plan.segments[0], &[vec![0; 100]]);
        assert!(matches!(
            result,
            Err(StemwerkError::Inference { segment: 0, .. })
        ));
    }

    #[test]
    fn wrong_sample_count_is_inference_error() {
        let plan = plan(100, 10, ChunkPolicy::default()).unwrap();
        let mut ola = OverlapAdd::new(1, 100, 2);
        let result = ola.add(&plan, &plan.segments[0], &[vec![0; 100]]);
        assert!(result.is_err());
    }

    #[test]
    fn untouched_frames_are_silent() {
        let ola = OverlapAdd::new(1, 4, 1);
        assert_eq!(ola.finish(), vec![vec![0, 0, 0, 0]]);
    }

    #[test]
    fn extreme_values_survive_reconstruction() {
        let plan = plan(300, 10, ChunkPolicy::new(10.0, 2.0)).unwrap();
        let signal: Vec<i16> = (0..300)
            .map(|i| if i % 2 == 0 { i16::MAX } else { i16::MIN })
            .collect();
        let mut ola = OverlapAdd::new(1, 300, 1);
        for seg in &plan.segments {
            ola.add(&plan, seg, &[slice_segment(&signal, seg, 1)]).unwrap();
        }
        assert_eq!(ola.finish()[0], signal);
    }
}
