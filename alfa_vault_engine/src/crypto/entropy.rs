//! Shannon entropy gate for generated key material.
//!
//! A 32-byte buffer can show at most log2(32) = 5 bits of plug-in entropy per
//! byte, so the estimate is normalised to the 8-bit scale by dividing by
//! `log2(min(len, 256))`. All-distinct bytes score 8.0, a constant buffer 0.0.

use serde::Serialize;

/// Minimum normalised entropy accepted for key material (bits per byte)
pub const MIN_KEY_ENTROPY: f64 = 7.5;

/// Strength tier reported by [`analyze`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrengthRating {
    Weak,
    Fair,
    Strong,
    Excellent,
}

impl StrengthRating {
    fn from_entropy(bits_per_byte: f64) -> Self {
        if bits_per_byte >= MIN_KEY_ENTROPY {
            Self::Excellent
        } else if bits_per_byte >= 6.0 {
            Self::Strong
        } else if bits_per_byte >= 4.0 {
            Self::Fair
        } else {
            Self::Weak
        }
    }
}

/// Result of a key strength analysis
#[derive(Debug, Clone, Serialize)]
pub struct KeyStrength {
    /// Normalised Shannon entropy, bits per byte (0.0 ..= 8.0)
    pub entropy: f64,
    /// Number of distinct byte values in the buffer
    pub distinct_bytes: usize,
    /// Buffer length
    pub length: usize,
    pub rating: StrengthRating,
}

impl KeyStrength {
    pub fn is_acceptable(&self) -> bool {
        self.entropy >= MIN_KEY_ENTROPY
    }
}

fn histogram(bytes: &[u8]) -> [u32; 256] {
    let mut counts = [0u32; 256];
    for &b in bytes {
        counts[b as usize] += 1;
    }
    counts
}

/// Normalised Shannon entropy of `bytes` in bits per byte
pub fn shannon_entropy(bytes: &[u8]) -> f64 {
    if bytes.len() < 2 {
        return 0.0;
    }

    let len = bytes.len() as f64;
    let raw: f64 = histogram(bytes)
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum();

    let max = (bytes.len().min(256) as f64).log2();
    (raw / max * 8.0).clamp(0.0, 8.0)
}

/// Check whether `bytes` is acceptable as key material
pub fn validate(bytes: &[u8]) -> bool {
    shannon_entropy(bytes) >= MIN_KEY_ENTROPY
}

/// Analyze the strength of candidate key material
pub fn analyze(bytes: &[u8]) -> KeyStrength {
    let entropy = shannon_entropy(bytes);
    KeyStrength {
        entropy,
        distinct_bytes: histogram(bytes).iter().filter(|&&c| c > 0).count(),
        length: bytes.len(),
        rating: StrengthRating::from_entropy(entropy),
    }
}
