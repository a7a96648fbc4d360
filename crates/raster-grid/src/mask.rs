//! Validity mask combination.
//!
//! Both operations are pure and run in parallel over cells.

use rayon::prelude::*;

use crate::error::{RasterError, Result};

/// Elementwise conjunction of validity masks.
///
/// A cell is valid in the result only if it is valid in every input.
pub fn combine(masks: &[&[bool]]) -> Result<Vec<bool>> {
    let (first, rest) = masks
        .split_first()
        .ok_or_else(|| RasterError::InvalidInput("no masks to combine".to_string()))?;

    for (i, m) in rest.iter().enumerate() {
        if m.len() != first.len() {
            return Err(RasterError::grid_mismatch(format!(
                "mask {} has {} cells, mask 0 has {}",
                i + 1,
                m.len(),
                first.len()
            )));
        }
    }

    let mut combined = first.to_vec();
    for m in rest {
        combined
            .par_iter_mut()
            .zip(m.par_iter())
            .for_each(|(acc, &valid)| *acc &= valid);
    }
    Ok(combined)
}

/// Replace every cell invalidated by `mask` with `nodata`.
pub fn apply(values: &[f32], mask: &[bool], nodata: f32) -> Result<Vec<f32>> {
    if values.len() != mask.len() {
        return Err(RasterError::grid_mismatch(format!(
            "{} values but {} mask cells",
            values.len(),
            mask.len()
        )));
    }

    Ok(values
        .par_iter()
        .zip(mask.par_iter())
        .map(|(&v, &valid)| if valid { v } else { nodata })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: [bool; 4] = [true, true, false, false];
    const B: [bool; 4] = [true, false, true, false];
    const C: [bool; 4] = [false, true, true, true];

    #[test]
    fn test_combine_is_conjunction() {
        assert_eq!(combine(&[&A, &B]).unwrap(), vec![true, false, false, false]);
    }

    #[test]
    fn test_combine_commutative_and_associative() {
        assert_eq!(combine(&[&A, &B]).unwrap(), combine(&[&B, &A]).unwrap());

        let ab = combine(&[&A, &B]).unwrap();
        let bc = combine(&[&B, &C]).unwrap();
        let left = combine(&[&ab, &C]).unwrap();
        let right = combine(&[&A, &bc]).unwrap();
        assert_eq!(left, right);
        assert_eq!(left, combine(&[&A, &B, &C]).unwrap());
    }

    #[test]
    fn test_combine_single_mask_is_identity() {
        assert_eq!(combine(&[&C]).unwrap(), C.to_vec());
    }

    #[test]
    fn test_combine_rejects_empty_and_mismatched() {
        assert!(matches!(combine(&[]), Err(RasterError::InvalidInput(_))));
        let short = [true; 3];
        assert!(matches!(
            combine(&[&A, &short]),
            Err(RasterError::GridMismatch(_))
        ));
    }

    #[test]
    fn test_apply_sets_nodata() {
        let out = apply(&[1.0, 2.0, 3.0, 4.0], &B, -1.0).unwrap();
        assert_eq!(out, vec![1.0, -1.0, 3.0, -1.0]);
    }

    #[test]
    fn test_apply_rejects_mismatch() {
        assert!(matches!(
            apply(&[1.0, 2.0], &A, 0.0),
            Err(RasterError::GridMismatch(_))
        ));
    }
}
