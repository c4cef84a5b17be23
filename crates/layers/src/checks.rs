//! Lightweight validation helpers shared across layer components.
//!
//! Every helper takes a `label` naming the tensor under test so failures read
//! like `linear.weight: expected shape [4, 8], got [8, 4]`. They return
//! `candle_core::Result<()>` so call sites can propagate errors without
//! panicking.

use candle_core::{DType, Error, Result, Tensor};

/// Ensures a tensor matches the expected dimensions exactly.
pub fn expect_shape(label: &str, tensor: &Tensor, expected: &[usize]) -> Result<()> {
    let actual = tensor.dims();
    if actual == expected {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{label}: expected shape {:?}, got {:?}",
            expected, actual
        )))
    }
}

/// Ensures a tensor has at least `rank` axes.
pub fn expect_rank_at_least(label: &str, tensor: &Tensor, rank: usize) -> Result<()> {
    if tensor.rank() >= rank {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{label}: expected at least {rank} axes, got {:?}",
            tensor.dims()
        )))
    }
}

/// Ensures the trailing axis carries `dim` features.
pub fn expect_last_dim(label: &str, tensor: &Tensor, dim: usize) -> Result<()> {
    match tensor.dims().last() {
        Some(&actual) if actual == dim => Ok(()),
        _ => Err(Error::Msg(format!(
            "{label}: expected trailing dim {dim}, got {:?}",
            tensor.dims()
        ))),
    }
}

/// Checks the tensor dtype is one of the allowed values.
pub fn expect_dtype_in(label: &str, tensor: &Tensor, allowed: &[DType]) -> Result<()> {
    let dtype = tensor.dtype();
    if allowed.iter().copied().any(|allowed| allowed == dtype) {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{label}: expected dtype in {:?}, got {:?}",
            allowed, dtype
        )))
    }
}

/// Rejects strided views; parameters must own contiguous storage.
pub fn expect_contiguous(label: &str, tensor: &Tensor) -> Result<()> {
    if tensor.is_contiguous() {
        Ok(())
    } else {
        Err(Error::Msg(format!("{label}: tensor must be contiguous")))
    }
}
