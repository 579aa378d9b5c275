//! Block mixing with 16-bit saturation.

use serde::{Deserialize, Serialize};

/// How a rendered block is combined with what is already in the mailbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MixMode {
    /// Saturating sum with the existing audio.
    #[default]
    Add,
    /// Overwrite the existing audio.
    Replace,
}

/// Sum (or copy) `src` into `dst`, clamping to `i16` range.
///
/// Only `min(dst.len(), src.len())` samples are touched.
#[inline]
pub fn mix_into(dst: &mut [i16], src: &[i16], mode: MixMode) {
    match mode {
        MixMode::Add => {
            for (d, s) in dst.iter_mut().zip(src) {
                *d = d.saturating_add(*s);
            }
        }
        MixMode::Replace => {
            let n = dst.len().min(src.len());
            dst[..n].copy_from_slice(&src[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_add_clamps_high_and_low() {
        let mut dst = [30000i16, -30000, 50];
        mix_into(&mut dst, &[10000, -10000, 100], MixMode::Add);
        assert_eq!(dst, [32767, -32768, 150]);
    }

    #[test]
    fn test_replace_copies() {
        let mut dst = [1i16, 2, 3];
        mix_into(&mut dst, &[7, 8, 9], MixMode::Replace);
        assert_eq!(dst, [7, 8, 9]);
    }

    #[test]
    fn test_mode_parses_lowercase() {
        let mode: MixMode = serde_json::from_str("\"replace\"").unwrap();
        assert_eq!(mode, MixMode::Replace);
    }

    proptest! {
        #[test]
        fn prop_add_matches_clamped_wide_sum(a: i16, b: i16) {
            let mut dst = [a];
            mix_into(&mut dst, &[b], MixMode::Add);
            let wide = (a as i32 + b as i32).clamp(i16::MIN as i32, i16::MAX as i32);
            prop_assert_eq!(dst[0] as i32, wide);
        }
    }
}
