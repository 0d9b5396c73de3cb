//! Conversion between [`ndarray`] arrays and candle tensors.
use candle_core::{Device, Result, Tensor};
use ndarray::{Array2, ArrayView2};

/// Copies a `[rows, cols]` array into a tensor.
pub fn array2_to_tensor(a: ArrayView2<f32>, device: &Device) -> Result<Tensor> {
    let v = a.iter().cloned().collect::<Vec<_>>();
    Tensor::from_vec(v, a.dim(), device)
}

/// Copies a two-dimensional tensor into an array.
pub fn tensor_to_array2(t: &Tensor) -> Result<Array2<f32>> {
    let (rows, cols) = t.dims2()?;
    let v: Vec<f32> = t.flatten_all()?.to_vec1()?;
    Array2::from_shape_vec((rows, cols), v).map_err(|e| candle_core::Error::Msg(e.to_string()))
}
