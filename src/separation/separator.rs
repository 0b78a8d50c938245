use crate::error::{Result, StemwerkError};
use crate::stems::Stem;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Trait for the source-separation inference step.
///
/// Implementations receive one segment of interleaved PCM16 audio and return
/// one buffer per requested stem, each the same length as the input segment.
/// The orchestrator treats this as a black box.
pub trait StemSeparator: Send + Sync {
    /// Separate one segment.
    ///
    /// # Arguments
    /// * `segment` - Interleaved 16-bit samples for this window
    /// * `channels` - Channel count of the interleaving
    /// * `sample_rate` - Sample rate of the input in Hz
    /// * `stems` - Stems to produce, in the order they must be returned
    ///
    /// # Returns
    /// One interleaved buffer per entry of `stems`, or an error
    fn separate(
        &self,
        segment: &[i16],
        channels: u16,
        sample_rate: u32,
        stems: &[Stem],
    ) -> Result<Vec<Vec<i16>>>;

    /// Name of the loaded model
    fn model_name(&self) -> &str;
}

impl<T: StemSeparator> StemSeparator for Arc<T> {
    fn separate(
        &self,
        segment: &[i16],
        channels: u16,
        sample_rate: u32,
        stems: &[Stem],
    ) -> Result<Vec<Vec<i16>>> {
        (**self).separate(segment, channels, sample_rate, stems)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Copies the input segment into every stem.
///
/// Stands in for the inference engine when no model is loaded, so the whole
/// pipeline can run end to end. Output stems are exact copies of the input.
#[derive(Debug, Clone)]
pub struct PassthroughSeparator {
    model_name: String,
}

impl PassthroughSeparator {
    pub fn new() -> Self {
        Self {
            model_name: "passthrough".to_string(),
        }
    }

    /// Label the passthrough with the artifact it stands in for.
    pub fn for_model(model_name: &str) -> Self {
        Self {
            model_name: format!("passthrough ({})", model_name),
        }
    }
}

impl Default for PassthroughSeparator {
    fn default() -> Self {
        Self::new()
    }
}

impl StemSeparator for PassthroughSeparator {
    fn separate(
        &self,
        segment: &[i16],
        _channels: u16,
        _sample_rate: u32,
        stems: &[Stem],
    ) -> Result<Vec<Vec<i16>>> {
        Ok(stems.iter().map(|_| segment.to_vec()).collect())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Mock separator for testing
///
/// Each stem is filled with a constant value (its position in the request,
/// plus one, times `scale`) unless configured to fail.
#[derive(Debug, Clone)]
pub struct MockSeparator {
    model_name: String,
    scale: i16,
    fail_on_segment: Option<usize>,
    calls: Arc<AtomicUsize>,
}

impl MockSeparator {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            scale: 100,
            fail_on_segment: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configure the mock to fail on the first call
    pub fn with_failure(self) -> Self {
        self.with_fail_on_segment(0)
    }

    /// Configure the mock to fail on the n-th call (0-based)
    pub fn with_fail_on_segment(mut self, segment: usize) -> Self {
        self.fail_on_segment = Some(segment);
        self
    }

    /// Number of `separate` calls so far, shared across clones
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StemSeparator for MockSeparator {
    fn separate(
        &self,
        segment: &[i16],
        _channels: u16,
        _sample_rate: u32,
        stems: &[Stem],
    ) -> Result<Vec<Vec<i16>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_segment == Some(call) {
            return Err(StemwerkError::Inference {
                segment: call,
                message: "mock separation failure".to_string(),
            });
        }
        Ok(stems
            .iter()
            .enumerate()
            .map(|(i, _)| vec![(i as i16 + 1) * self.scale; segment.len()])
            .collect())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_copies_input_to_every_stem() {
        let separator = PassthroughSeparator::new();
        let input = vec![1i16, -2, 3, -4];
        let stems = [Stem::Vocals, Stem::Instrumental];

        let out = separator.separate(&input, 2, 44100, &stems).unwrap();
        assert_eq!(out, vec![input.clone(), input]);
    }

    #[test]
    fn test_passthrough_model_name() {
        assert_eq!(PassthroughSeparator::new().model_name(), "passthrough");
        assert_eq!(
            PassthroughSeparator::for_model("htdemucs-4s").model_name(),
            "passthrough (htdemucs-4s)"
        );
    }

    #[test]
    fn test_mock_fills_stems_with_constants() {
        let separator = MockSeparator::new("mock");
        let out = separator
            .separate(&[0; 6], 2, 8000, &[Stem::Drums, Stem::Bass])
            .unwrap();
        assert_eq!(out, vec![vec![100; 6], vec![200; 6]]);
    }

    #[test]
    fn test_mock_fails_on_configured_call() {
        let separator = MockSeparator::new("mock").with_fail_on_segment(1);
        assert!(separator.separate(&[0; 2], 1, 8000, &[Stem::Vocals]).is_ok());

        match separator.separate(&[0; 2], 1, 8000, &[Stem::Vocals]) {
            Err(StemwerkError::Inference { segment, message }) => {
                assert_eq!(segment, 1);
                assert_eq!(message, "mock separation failure");
            }
            other => panic!("Expected Inference error, got {:?}", other),
        }
        assert_eq!(separator.calls(), 2);
    }

    #[test]
    fn test_mock_call_count_is_shared_between_clones() {
        let separator = MockSeparator::new("mock");
        let clone = separator.clone();
        clone.separate(&[0; 2], 1, 8000, &[Stem::Vocals]).unwrap();
        assert_eq!(separator.calls(), 1);
    }

    #[test]
    fn test_arc_separator_delegates() {
        let separator = Arc::new(MockSeparator::new("shared"));
        assert_eq!(StemSeparator::model_name(&separator), "shared");
    }
}
