use crate::{conv2d_impl::im2col, init::LayerKind, Error, Result, Tensor};
use ndarray::{Array1, Array4, Ix4};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Uniform;

/// 2D convolution over NCHW input with symmetric zero padding.
#[derive(Debug, Clone)]
pub struct Conv2D {
    name: String,
    stride: usize,
    padding: usize,
    /// `(out_channels, in_channels, kernel_h, kernel_w)`
    weights: Array4<f32>,
    bias: Option<Array1<f32>>,
}

impl Conv2D {
    pub fn new(
        name: String,
        weights: Array4<f32>,
        bias: Option<Array1<f32>>,
        stride: usize,
        padding: usize,
    ) -> Result<Self> {
        let filters = weights.shape()[0];

        if let Some(ref b) = bias {
            if b.len() != filters {
                return Err(Error::Layer(format!(
                    "Bias size {} doesn't match filters {}",
                    b.len(),
                    filters
                )));
            }
        }

        if stride == 0 {
            return Err(Error::Layer(format!("{}: stride must be positive", name)));
        }

        Ok(Self {
            name,
            stride,
            padding,
            weights,
            bias,
        })
    }

    /// Bias-free convolution with weights drawn from U(-1/sqrt(fan_in), 1/sqrt(fan_in)).
    pub fn uniform<R: Rng>(
        name: String,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        padding: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let fan_in = in_channels * kernel_size * kernel_size;
        if fan_in == 0 || out_channels == 0 {
            return Err(Error::Layer(format!(
                "{}: cannot build a {}x{} convolution from {} to {} channels",
                name, kernel_size, kernel_size, in_channels, out_channels
            )));
        }

        let bound = 1.0 / (fan_in as f32).sqrt();
        let weights = Array4::random_using(
            (out_channels, in_channels, kernel_size, kernel_size),
            Uniform::new(-bound, bound),
            rng,
        );

        Self::new(name, weights, None, 1, padding)
    }

    pub fn in_channels(&self) -> usize {
        self.weights.shape()[1]
    }

    pub fn out_channels(&self) -> usize {
        self.weights.shape()[0]
    }

    pub fn kernel_size(&self) -> (usize, usize) {
        (self.weights.shape()[2], self.weights.shape()[3])
    }

    pub fn weights(&self) -> &Array4<f32> {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut Array4<f32> {
        &mut self.weights
    }

    fn compute_output_size(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        let (kernel_h, kernel_w) = self.kernel_size();
        let padded_h = height + 2 * self.padding;
        let padded_w = width + 2 * self.padding;

        if padded_h < kernel_h || padded_w < kernel_w {
            return Err(Error::Layer(format!(
                "{}: kernel {:?} larger than padded input {}x{}",
                self.name,
                (kernel_h, kernel_w),
                padded_h,
                padded_w
            )));
        }

        Ok((
            (padded_h - kernel_h) / self.stride + 1,
            (padded_w - kernel_w) / self.stride + 1,
        ))
    }
}

impl super::Layer for Conv2D {
    fn forward(&mut self, input: &Tensor, _mode: super::Mode) -> Result<Tensor> {
        let (batch_size, in_channels, height, width) = super::nchw("Conv2D", input.shape())?;

        if in_channels != self.in_channels() {
            return Err(Error::ShapeMismatch {
                expected: vec![self.in_channels()],
                actual: vec![in_channels],
            });
        }

        let input_4d = input
            .data()
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))?;

        let (kernel_h, kernel_w) = self.kernel_size();
        let (out_height, out_width) = self.compute_output_size(height, width)?;

        let cols = im2col(
            input_4d,
            kernel_h,
            kernel_w,
            self.stride,
            self.stride,
            self.padding,
            self.padding,
            out_height,
            out_width,
        );

        let filters = self.out_channels();
        let kernel_matrix = self
            .weights
            .view()
            .into_shape_with_order((filters, in_channels * kernel_h * kernel_w))
            .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))?;

        let mut output = cols.dot(&kernel_matrix.t());

        if let Some(ref bias) = self.bias {
            output += bias;
        }

        let output = output
            .into_shape_with_order((batch_size, out_height, out_width, filters))
            .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))?
            .permuted_axes([0, 3, 1, 2])
            .as_standard_layout()
            .into_owned();

        Ok(Tensor::new(output.into_dyn()))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        let (batch_size, in_channels, height, width) = super::nchw("Conv2D", input_shape)?;
        if in_channels != self.in_channels() {
            return Err(Error::ShapeMismatch {
                expected: vec![self.in_channels()],
                actual: vec![in_channels],
            });
        }
        let (out_height, out_width) = self.compute_output_size(height, width)?;
        Ok(vec![batch_size, self.out_channels(), out_height, out_width])
    }

    fn num_parameters(&self) -> usize {
        self.weights.len() + self.bias.as_ref().map_or(0, |b| b.len())
    }

    fn visit_mut(&mut self, f: &mut dyn FnMut(LayerKind<'_>)) {
        f(LayerKind::Convolution(self));
    }
}
