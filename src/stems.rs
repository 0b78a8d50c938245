//! Stem vocabulary per model stem count.
//!
//! Two-stem models split into vocals and instrumental; four-stem models
//! produce drums, bass, other and vocals. Other counts have no vocabulary
//! and no published model, so they are rejected.

use crate::error::{Result, StemwerkError};
use std::fmt;
use std::str::FromStr;

/// One isolated track produced by separation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stem {
    Vocals,
    Instrumental,
    Drums,
    Bass,
    Other,
}

const TWO_STEMS: &[Stem] = &[Stem::Vocals, Stem::Instrumental];
const FOUR_STEMS: &[Stem] = &[Stem::Drums, Stem::Bass, Stem::Other, Stem::Vocals];

/// Stem counts that have both a vocabulary and a model.
pub const SUPPORTED_STEM_COUNTS: &[u32] = &[2, 4];

impl Stem {
    /// Lower-case name, also used as the output file stem.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stem::Vocals => "vocals",
            Stem::Instrumental => "instrumental",
            Stem::Drums => "drums",
            Stem::Bass => "bass",
            Stem::Other => "other",
        }
    }

    /// Output file name for this stem.
    pub fn file_name(&self) -> String {
        format!("{}.wav", self.as_str())
    }
}

impl fmt::Display for Stem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stem {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vocals" => Ok(Stem::Vocals),
            "instrumental" => Ok(Stem::Instrumental),
            "drums" => Ok(Stem::Drums),
            "bass" => Ok(Stem::Bass),
            "other" => Ok(Stem::Other),
            _ => Err(()),
        }
    }
}

/// Stems a model with `count` outputs produces, in model output order.
///
/// # Errors
///
/// [`StemwerkError::UnsupportedStemCount`] for counts other than 2 and 4.
pub fn vocabulary(count: u32) -> Result<&'static [Stem]> {
    match count {
        2 => Ok(TWO_STEMS),
        4 => Ok(FOUR_STEMS),
        _ => Err(StemwerkError::UnsupportedStemCount { count }),
    }
}

/// Normalize a caller's stem selection against the vocabulary for `count`.
///
/// Names are trimmed and lower-cased; duplicates and names outside the
/// vocabulary are dropped. The result follows vocabulary order, so the
/// caller's ordering does not matter.
///
/// # Errors
///
/// - [`StemwerkError::UnsupportedStemCount`] if `count` has no vocabulary
/// - [`StemwerkError::NoStemsSelected`] if nothing valid remains
pub fn select<S: AsRef<str>>(count: u32, names: &[S]) -> Result<Vec<Stem>> {
    let vocab = vocabulary(count)?;

    let requested: Vec<Stem> = names
        .iter()
        .filter_map(|name| name.as_ref().parse::<Stem>().ok())
        .collect();

    let selected: Vec<Stem> = vocab
        .iter()
        .copied()
        .filter(|stem| requested.contains(stem))
        .collect();

    if selected.is_empty() {
        return Err(StemwerkError::NoStemsSelected {
            count,
            valid: describe(vocab),
        });
    }
    Ok(selected)
}

/// Comma-separated stem names, e.g. `"drums, bass, other, vocals"`.
pub fn describe(stems: &[Stem]) -> String {
    stems
        .iter()
        .map(Stem::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_stem_vocabulary() {
        assert_eq!(vocabulary(2).unwrap(), &[Stem::Vocals, Stem::Instrumental]);
    }

    #[test]
    fn four_stem_vocabulary() {
        assert_eq!(
            vocabulary(4).unwrap(),
            &[Stem::Drums, Stem::Bass, Stem::Other, Stem::Vocals]
        );
    }

    #[test]
    fn six_stems_are_unsupported() {
        assert!(matches!(
            vocabulary(6),
            Err(StemwerkError::UnsupportedStemCount { count: 6 })
        ));
    }

    #[test]
    fn select_normalizes_case_and_duplicates() {
        let selected = select(4, &["VOCALS", " drums ", "vocals", "Drums"]).unwrap();
        assert_eq!(selected, vec![Stem::Drums, Stem::Vocals]);
    }

    #[test]
    fn select_is_order_insensitive() {
        let a = select(4, &["bass", "other"]).unwrap();
        let b = select(4, &["other", "bass"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn select_drops_names_outside_vocabulary() {
        let selected = select(2, &["drums", "vocals", "piano"]).unwrap();
        assert_eq!(selected, vec![Stem::Vocals]);
    }

    #[test]
    fn select_empty_result_fails() {
        let result = select(4, &["instrumental", "piano"]);
        match result {
            Err(StemwerkError::NoStemsSelected { count, valid }) => {
                assert_eq!(count, 4);
                assert_eq!(valid, "drums, bass, other, vocals");
            }
            other => panic!("Expected NoStemsSelected, got {:?}", other),
        }
    }

    #[test]
    fn select_with_no_names_fails() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            select(2, &empty),
            Err(StemwerkError::NoStemsSelected { .. })
        ));
    }

    #[test]
    fn select_checks_stem_count_first() {
        assert!(matches!(
            select(3, &["vocals"]),
            Err(StemwerkError::UnsupportedStemCount { count: 3 })
        ));
    }

    #[test]
    fn stem_file_names() {
        assert_eq!(Stem::Vocals.file_name(), "vocals.wav");
        assert_eq!(Stem::Instrumental.file_name(), "instrumental.wav");
    }

    #[test]
    fn supported_counts_have_vocabularies() {
        for &count in SUPPORTED_STEM_COUNTS {
            assert_eq!(vocabulary(count).unwrap().len(), count as usize);
        }
    }
}
