//! Uncertainty-weighted confidence blending.

/// Smallest weight the ML estimate ever receives.
pub const MIN_ML_WEIGHT: f64 = 0.3;

/// Weight given to the ML estimate for a given total uncertainty.
///
/// Lower uncertainty means more trust in the model, floored at
/// [`MIN_ML_WEIGHT`]. Non-finite uncertainty is treated as total.
pub fn ml_weight(total_uncertainty: f64) -> f64 {
    let uncertainty = if total_uncertainty.is_finite() {
        total_uncertainty.clamp(0.0, 1.0)
    } else {
        1.0
    };
    (1.0 - uncertainty).max(MIN_ML_WEIGHT)
}

/// `base * (1 - w) + ml * w`.
///
/// Not clamped: for inputs in `[0, 1]` the result stays in `[0, 1]`, and an
/// out-of-range input must stay visible to validation.
pub fn blend_confidence(base: f64, ml: f64, total_uncertainty: f64) -> f64 {
    let w = ml_weight(total_uncertainty);
    base * (1.0 - w) + ml * w
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_weight_floor() {
        assert_eq!(ml_weight(1.0), MIN_ML_WEIGHT);
        assert_eq!(ml_weight(0.9), MIN_ML_WEIGHT);
        assert!((ml_weight(0.2) - 0.8).abs() < 1e-12);
        assert_eq!(ml_weight(f64::NAN), MIN_ML_WEIGHT);
    }

    #[test]
    fn test_blend_values() {
        // w = 0.8: 0.5 * 0.2 + 0.9 * 0.8
        assert!((blend_confidence(0.5, 0.9, 0.2) - 0.82).abs() < 1e-12);
        // w floored at 0.3: 0.6 * 0.7 + 0.2 * 0.3
        assert!((blend_confidence(0.6, 0.2, 1.0) - 0.48).abs() < 1e-12);
    }

    #[test]
    fn test_blend_does_not_hide_bad_inputs() {
        assert!(blend_confidence(0.5, 1.5, 0.2) > 1.0);
        assert!(blend_confidence(f64::NAN, 0.5, 0.1).is_nan());
    }

    proptest! {
        #[test]
        fn prop_blend_stays_in_unit_interval(
            base in 0.0f64..=1.0,
            ml in 0.0f64..=1.0,
            uncertainty in -1.0f64..2.0,
        ) {
            let blended = blend_confidence(base, ml, uncertainty);
            prop_assert!((0.0..=1.0 + 1e-12).contains(&blended));
        }

        #[test]
        fn prop_blend_between_inputs(
            base in 0.0f64..=1.0,
            ml in 0.0f64..=1.0,
            uncertainty in 0.0f64..=1.0,
        ) {
            let blended = blend_confidence(base, ml, uncertainty);
            prop_assert!(blended >= base.min(ml) - 1e-12);
            prop_assert!(blended <= base.max(ml) + 1e-12);
        }
    }
}
