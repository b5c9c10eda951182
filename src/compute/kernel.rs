//! Elementwise array kernels with broadcasting.

use crate::error::{QuantityError, Result};
use ndarray::{ArrayD, IxDyn, Zip};

/// Standard broadcasting: shapes are aligned at the trailing axis and each
/// pair of extents must be equal or contain a 1.
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let ndim = a.len().max(b.len());
    let mut shape = vec![0; ndim];
    for i in 0..ndim {
        let da = if i < ndim - a.len() { 1 } else { a[i - (ndim - a.len())] };
        let db = if i < ndim - b.len() { 1 } else { b[i - (ndim - b.len())] };
        shape[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => {
                return Err(QuantityError::ShapeMismatch {
                    left: a.to_vec(),
                    right: b.to_vec(),
                })
            }
        };
    }
    Ok(shape)
}

pub fn broadcast_to(a: &ArrayD<f64>, shape: &[usize]) -> Result<ArrayD<f64>> {
    a.broadcast(IxDyn(shape))
        .map(|view| view.to_owned())
        .ok_or_else(|| QuantityError::ShapeMismatch {
            left: a.shape().to_vec(),
            right: shape.to_vec(),
        })
}

/// Applies `f` pairwise after broadcasting both operands to a common shape.
pub fn zip_with(a: &ArrayD<f64>, b: &ArrayD<f64>, f: impl Fn(f64, f64) -> f64) -> Result<ArrayD<f64>> {
    if a.shape() == b.shape() {
        return Ok(Zip::from(a).and(b).map_collect(|&x, &y| f(x, y)));
    }
    let shape = broadcast_shape(a.shape(), b.shape())?;
    let (av, bv) = match (a.broadcast(IxDyn(&shape)), b.broadcast(IxDyn(&shape))) {
        (Some(av), Some(bv)) => (av, bv),
        _ => {
            return Err(QuantityError::ShapeMismatch {
                left: a.shape().to_vec(),
                right: b.shape().to_vec(),
            })
        }
    };
    Ok(Zip::from(&av).and(&bv).map_collect(|&x, &y| f(x, y)))
}

/// Repeats `error` across the leading axes of `shape`. The error must be a
/// scalar or have exactly the trailing extents of `shape`.
pub fn tile_trailing(error: &ArrayD<f64>, shape: &[usize]) -> Result<ArrayD<f64>> {
    let trailing = error.shape();
    if error.ndim() == 0 || shape.ends_with(trailing) {
        return broadcast_to(error, shape);
    }
    Err(QuantityError::ShapeMismatch {
        left: shape.to_vec(),
        right: trailing.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr0, arr1, arr2, Array};
    use rstest::rstest;

    #[rstest]
    #[case(&[3, 4], &[4], Some(vec![3, 4]))]
    #[case(&[3, 1], &[1, 4], Some(vec![3, 4]))]
    #[case(&[], &[5], Some(vec![5]))]
    #[case(&[3, 4], &[3], None)]
    #[case(&[2], &[3], None)]
    fn test_broadcast_shape(#[case] a: &[usize], #[case] b: &[usize], #[case] expected: Option<Vec<usize>>) {
        assert_eq!(broadcast_shape(a, b).ok(), expected);
    }

    #[test]
    fn test_zip_with_scalar_and_vector() {
        let a = arr0(2.0).into_dyn();
        let b = arr1(&[1.0, 2.0, 3.0]).into_dyn();
        let out = zip_with(&a, &b, |x, y| x * y).unwrap();
        assert_eq!(out, arr1(&[2.0, 4.0, 6.0]).into_dyn());
    }

    #[test]
    fn test_tile_trailing_duplicates_rows() {
        let err = arr1(&[0.1, 0.2, 0.3, 0.4]).into_dyn();
        let tiled = tile_trailing(&err, &[3, 4]).unwrap();
        assert_eq!(tiled.shape(), &[3, 4]);
        for row in tiled.outer_iter() {
            assert_eq!(row, arr1(&[0.1, 0.2, 0.3, 0.4]).into_dyn());
        }
    }

    #[test]
    fn test_tile_trailing_rejects_leading_match() {
        let err = Array::from_elem(IxDyn(&[3]), 0.1);
        let res = tile_trailing(&err, &[3, 4]);
        match res {
            Err(QuantityError::ShapeMismatch { left, right }) => {
                assert_eq!(left, vec![3, 4]);
                assert_eq!(right, vec![3]);
            }
            other => panic!("expected shape mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_tile_trailing_scalar_and_full_shape() {
        let full = arr2(&[[1.0, 2.0], [3.0, 4.0]]).into_dyn();
        assert_eq!(tile_trailing(&full, &[2, 2]).unwrap(), full);
        let scalar = tile_trailing(&arr0(0.5).into_dyn(), &[2, 2]).unwrap();
        assert!(scalar.iter().all(|&e| e == 0.5));
    }
}
