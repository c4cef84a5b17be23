//! Builders for masks that drop padded source positions.

use candle_core::{Device, Result, Tensor};

use super::{KEEP_DTYPE, MASK_DTYPE};

/// Keep mask shaped `[batch, max_len]`: `1` where `position < lengths[b]`.
pub fn sequence_mask(device: &Device, lengths: &[usize], max_len: usize) -> Result<Tensor> {
    let mut data = vec![0u8; lengths.len() * max_len];
    for (b, &valid) in lengths.iter().enumerate() {
        let valid = valid.min(max_len);
        let row_start = b * max_len;
        data[row_start..row_start + valid].fill(1);
    }
    Tensor::from_vec(data, (lengths.len(), max_len), device)
}

/// Additive mask shaped `[batch, q_len, k_len]` with `-inf` past each length.
pub fn padding_mask_from_lengths(
    device: &Device,
    key_lengths: &[usize],
    q_len: usize,
    k_len: usize,
) -> Result<Tensor> {
    let batch = key_lengths.len();
    let mut data = vec![0f32; batch * q_len * k_len];

    for (b, &valid) in key_lengths.iter().enumerate() {
        let valid = valid.min(k_len);
        for q in 0..q_len {
            let row_start = (b * q_len + q) * k_len;
            data[row_start + valid..row_start + k_len].fill(f32::NEG_INFINITY);
        }
    }

    Tensor::from_vec(data, (batch, q_len, k_len), device)?.to_dtype(MASK_DTYPE)
}

/// Replaces entries of `tensor` with `value` wherever `keep` is zero.
///
/// `keep` must broadcast to the shape of `tensor`.
pub fn masked_fill(tensor: &Tensor, keep: &Tensor, value: f64) -> Result<Tensor> {
    let keep = keep
        .to_dtype(KEEP_DTYPE)?
        .broadcast_as(tensor.shape())?
        .contiguous()?;
    let fill = Tensor::full(value, tensor.shape(), tensor.device())?.to_dtype(tensor.dtype())?;
    keep.where_cond(tensor, &fill)
}

pub(crate) fn additive_mask_like(scores: &Tensor, key_lengths: &[usize]) -> Result<Tensor> {
    let (_, q_len, k_len) = scores.dims3()?;
    padding_mask_from_lengths(scores.device(), key_lengths, q_len, k_len)?
        .to_dtype(scores.dtype())
}
