//! Sample format and level conversion.

/// Largest magnitude a converted sample reaches in either direction.
///
/// Scaling by 32767 (not 32768) keeps the positive and negative clamps
/// symmetric: -1.0 maps to -32767, and `i16::MIN` is never produced.
pub const PCM_FULL_SCALE: f32 = 32767.0;

/// Converts one float sample to signed 16-bit PCM.
///
/// - `x >= 1.0` maps to `32767`
/// - `x <= -1.0` maps to `-32767`
/// - anything else maps to `round(x * 32767)`, half away from zero
///
/// NaN maps to 0. Infinities follow the clamps. No dithering.
///
/// # Example
///
/// ```
/// use session_relay::format::f32_to_pcm;
///
/// assert_eq!(f32_to_pcm(1.5), 32767);
/// assert_eq!(f32_to_pcm(-1.0), -32767);
/// assert_eq!(f32_to_pcm(0.5), 16384);
/// assert_eq!(f32_to_pcm(f32::NAN), 0);
/// ```
#[inline]
#[must_use]
pub fn f32_to_pcm(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    if sample >= 1.0 {
        return i16::MAX;
    }
    if sample <= -1.0 {
        return -i16::MAX;
    }
    (sample * PCM_FULL_SCALE).round() as i16
}

/// Batch converts float samples to PCM.
#[must_use]
pub fn f32_slice_to_pcm(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|&s| f32_to_pcm(s)).collect()
}

/// Converts a level in decibels to a linear amplitude factor.
///
/// `0.0` dB is unity gain; `-6.0` dB roughly halves the amplitude.
#[inline]
#[must_use]
pub fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db * 0.05)
}

/// Converts a linear amplitude factor to decibels.
///
/// Zero maps to negative infinity.
#[inline]
#[must_use]
pub fn linear_to_db(linear: f32) -> f32 {
    linear.log10() * 20.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_pcm_clamps_at_unity() {
        assert_eq!(f32_to_pcm(1.0), 32767);
        assert_eq!(f32_to_pcm(-1.0), -32767);
        assert_eq!(f32_to_pcm(0.0), 0);
    }

    #[test]
    fn test_f32_to_pcm_saturates_out_of_range() {
        assert_eq!(f32_to_pcm(2.0), 32767);
        assert_eq!(f32_to_pcm(-2.0), -32767);
        assert_eq!(f32_to_pcm(1000.0), 32767);
        assert_eq!(f32_to_pcm(-1000.0), -32767);
    }

    #[test]
    fn test_f32_to_pcm_non_finite() {
        assert_eq!(f32_to_pcm(f32::NAN), 0);
        assert_eq!(f32_to_pcm(f32::INFINITY), 32767);
        assert_eq!(f32_to_pcm(f32::NEG_INFINITY), -32767);
    }

    #[test]
    fn test_f32_to_pcm_rounds_to_nearest() {
        // 0.5 * 32767 = 16383.5 rounds away from zero
        assert_eq!(f32_to_pcm(0.5), 16384);
        assert_eq!(f32_to_pcm(-0.5), -16384);
        // Just below unity stays below the clamp
        assert_eq!(f32_to_pcm(0.99999), 32767);
        assert_eq!(f32_to_pcm(0.999), 32734);
    }

    #[test]
    fn test_f32_to_pcm_matches_reference_formula() {
        let mut x = -0.999f32;
        while x < 0.999 {
            let expected = (x * 32767.0).round() as i16;
            assert_eq!(f32_to_pcm(x), expected, "x = {x}");
            x += 0.0137;
        }
    }

    #[test]
    fn test_batch_conversion() {
        let pcm = f32_slice_to_pcm(&[0.0, 0.25, -0.25, 1.0, -3.0]);
        assert_eq!(pcm, vec![0, 8192, -8192, 32767, -32767]);
    }

    #[test]
    fn test_db_to_linear() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_linear(-20.0) - 0.1).abs() < 1e-6);
        assert!((db_to_linear(-10.0) - 0.316_227_8).abs() < 1e-5);
    }

    #[test]
    fn test_linear_to_db() {
        assert!(linear_to_db(1.0).abs() < 1e-6);
        assert!((linear_to_db(0.1) + 20.0).abs() < 1e-4);
        assert_eq!(linear_to_db(0.0), f32::NEG_INFINITY);
    }
}
