use ndarray::{Array2, ArrayView4};

/// Unfolds an NCHW input into a matrix for GEMM convolution (im2col).
///
/// Each row is one output position `(b, oh, ow)`; columns are ordered
/// `(c, kh, kw)` so they line up with an `(out, in, kh, kw)` kernel reshaped
/// to `(out, in * kh * kw)`. Out-of-bounds taps read the zero padding.
#[allow(clippy::too_many_arguments)]
pub fn im2col(
    input: ArrayView4<'_, f32>,
    kernel_h: usize,
    kernel_w: usize,
    stride_h: usize,
    stride_w: usize,
    pad_h: usize,
    pad_w: usize,
    out_h: usize,
    out_w: usize,
) -> Array2<f32> {
    let (batch, channels, height, width) = input.dim();
    let col_h = batch * out_h * out_w;
    let col_w = channels * kernel_h * kernel_w;

    let mut col_matrix = Array2::zeros((col_h, col_w));

    for b in 0..batch {
        for oh in 0..out_h {
            for ow in 0..out_w {
                let row_idx = b * (out_h * out_w) + oh * out_w + ow;
                let mut row = col_matrix.row_mut(row_idx);

                for c in 0..channels {
                    for kh in 0..kernel_h {
                        let ih = (oh * stride_h + kh).wrapping_sub(pad_h);
                        if ih >= height {
                            continue;
                        }
                        for kw in 0..kernel_w {
                            let iw = (ow * stride_w + kw).wrapping_sub(pad_w);
                            if iw < width {
                                row[(c * kernel_h + kh) * kernel_w + kw] = input[[b, c, ih, iw]];
                            }
                        }
                    }
                }
            }
        }
    }

    col_matrix
}
