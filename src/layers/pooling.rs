use crate::{Error, Result, Tensor};
use ndarray::{Array4, Ix4};

/// Average pooling over NCHW input without padding.
///
/// Output size is `floor((H - k) / s) + 1`, so odd inputs drop the trailing
/// row/column.
#[derive(Debug, Clone)]
pub struct AveragePooling2D {
    name: String,
    pool_size: (usize, usize),
    strides: (usize, usize),
}

impl AveragePooling2D {
    pub fn new(name: String, pool_size: (usize, usize), strides: Option<(usize, usize)>) -> Self {
        let strides = strides.unwrap_or(pool_size);
        Self {
            name,
            pool_size,
            strides,
        }
    }

    pub fn pool_size(&self) -> (usize, usize) {
        self.pool_size
    }

    fn compute_output_size(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        if height < self.pool_size.0 || width < self.pool_size.1 {
            return Err(Error::Layer(format!(
                "{}: pool window {:?} larger than input {}x{}",
                self.name, self.pool_size, height, width
            )));
        }

        if self.strides.0 == 0 || self.strides.1 == 0 {
            return Err(Error::Layer(format!("{}: stride must be positive", self.name)));
        }

        Ok((
            (height - self.pool_size.0) / self.strides.0 + 1,
            (width - self.pool_size.1) / self.strides.1 + 1,
        ))
    }
}

impl super::Layer for AveragePooling2D {
    fn forward(&mut self, input: &Tensor, _mode: super::Mode) -> Result<Tensor> {
        let (batch_size, channels, height, width) =
            super::nchw("AveragePooling2D", input.shape())?;

        let input_4d = input
            .data()
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|e| Error::Layer(format!("Reshape failed: {}", e)))?;

        let (out_height, out_width) = self.compute_output_size(height, width)?;
        let area = (self.pool_size.0 * self.pool_size.1) as f32;

        let mut output = Array4::zeros((batch_size, channels, out_height, out_width));

        for b in 0..batch_size {
            for c in 0..channels {
                for oh in 0..out_height {
                    for ow in 0..out_width {
                        let h_start = oh * self.strides.0;
                        let w_start = ow * self.strides.1;

                        let mut sum = 0.0;
                        for h in h_start..h_start + self.pool_size.0 {
                            for w in w_start..w_start + self.pool_size.1 {
                                sum += input_4d[[b, c, h, w]];
                            }
                        }
                        output[[b, c, oh, ow]] = sum / area;
                    }
                }
            }
        }

        Ok(Tensor::new(output.into_dyn()))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        let (batch_size, channels, height, width) =
            super::nchw("AveragePooling2D", input_shape)?;
        let (out_height, out_width) = self.compute_output_size(height, width)?;
        Ok(vec![batch_size, channels, out_height, out_width])
    }
}
