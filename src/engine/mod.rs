mod tract;

use anyhow::{Result, bail};
use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

pub use self::tract::TractEngine;
use crate::models::Rect;

/// Length of a face descriptor vector.
pub const DESCRIPTOR_LEN: usize = 128;

/// Euclidean distance below which two descriptors are considered the same
/// person.
pub const CLASSIFY_TOLERANCE: f32 = 0.6;

/// Fixed-length face feature vector.
///
/// Stored in the faces table as a little-endian f32 blob; the codec is
/// explicit on purpose, the raw memory is never reinterpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor(pub [f32; DESCRIPTOR_LEN]);

impl Descriptor {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; DESCRIPTOR_LEN * 4];
        LittleEndian::write_f32_into(&self.0, &mut buf);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Descriptor> {
        if data.len() != DESCRIPTOR_LEN * 4 {
            bail!("descriptor blob is {} bytes, expected {}", data.len(), DESCRIPTOR_LEN * 4);
        }
        let mut values = [0f32; DESCRIPTOR_LEN];
        LittleEndian::read_f32_into(data, &mut values);
        Ok(Descriptor(values))
    }

    pub fn distance(&self, other: &Descriptor) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }
}

/// One detected face: bounding box plus descriptor.
#[derive(Debug, Clone)]
pub struct Face {
    pub rect: Rect,
    pub descriptor: Descriptor,
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not load or decode the image at all.
    #[error("cannot load image: {0}")]
    ImageLoad(String),
    /// Model inference failed.
    #[error("inference failed: {0}")]
    Inference(anyhow::Error),
}

/// The classification resource.
///
/// Holds mutable internal state (the loaded reference sample set) and is
/// not safe for concurrent use; the job coordinator guarantees all calls
/// happen on one owner thread.
pub trait FaceEngine: Send + Sync {
    /// Detect and describe a face. `Ok(None)` means the image did not
    /// contain exactly one face; zero and several are not distinguished.
    fn extract_single_face(&self, data: &[u8]) -> Result<Option<Face>, EngineError>;

    /// Replace the loaded reference sample set. Must be called before
    /// `classify` whenever a new training set is built.
    fn set_reference_samples(&mut self, samples: &[Descriptor], categories: &[i32]);

    /// Return the category of the closest acceptable reference sample, or
    /// a negative value when nothing matches.
    fn classify(&self, descriptor: &Descriptor) -> i32;
}

/// Linear nearest-neighbor matcher over the loaded reference samples.
pub struct Matcher {
    samples: Vec<Descriptor>,
    categories: Vec<i32>,
    tolerance: f32,
}

impl Matcher {
    pub fn new(tolerance: f32) -> Matcher {
        Matcher { samples: Vec::new(), categories: Vec::new(), tolerance }
    }

    pub fn set_samples(&mut self, samples: &[Descriptor], categories: &[i32]) {
        debug_assert_eq!(samples.len(), categories.len());
        self.samples = samples.to_vec();
        self.categories = categories.to_vec();
    }

    pub fn classify(&self, descriptor: &Descriptor) -> i32 {
        let mut best: Option<(f32, i32)> = None;
        for (sample, &cat) in self.samples.iter().zip(self.categories.iter()) {
            let dist = descriptor.distance(sample);
            if best.is_none_or(|(d, _)| dist < d) {
                best = Some((dist, cat));
            }
        }
        match best {
            Some((dist, cat)) if dist <= self.tolerance => cat,
            _ => -1,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(fill: f32) -> Descriptor {
        Descriptor([fill; DESCRIPTOR_LEN])
    }

    #[test]
    fn descriptor_byte_codec() {
        let mut values = [0f32; DESCRIPTOR_LEN];
        for (i, v) in values.iter_mut().enumerate() {
            *v = i as f32 * 0.125 - 4.0;
        }
        let original = Descriptor(values);
        let decoded = Descriptor::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn descriptor_rejects_wrong_length() {
        assert!(Descriptor::from_bytes(&[0u8; 12]).is_err());
        assert!(Descriptor::from_bytes(&[0u8; DESCRIPTOR_LEN * 4 + 1]).is_err());
    }

    #[test]
    fn matcher_picks_nearest_within_tolerance() {
        let mut matcher = Matcher::new(CLASSIFY_TOLERANCE);
        matcher.set_samples(&[descriptor(0.0), descriptor(1.0)], &[0, 1]);

        assert_eq!(matcher.classify(&descriptor(0.01)), 0);
        assert_eq!(matcher.classify(&descriptor(0.99)), 1);
        // Far from both samples.
        assert_eq!(matcher.classify(&descriptor(10.0)), -1);
    }

    #[test]
    fn empty_matcher_never_matches() {
        let matcher = Matcher::new(CLASSIFY_TOLERANCE);
        assert_eq!(matcher.classify(&descriptor(0.0)), -1);
    }
}
