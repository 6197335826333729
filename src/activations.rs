use ndarray::{Array, Axis, Dimension, Zip};

use crate::{Result, Tensor};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    Linear,
    ReLU,
    Sigmoid,
    Tanh,
    Softmax,
    LogSoftmax,
}

impl Activation {
    pub fn apply(&self, tensor: &mut Tensor) -> Result<()> {
        self.apply_array(tensor.data_mut());
        Ok(())
    }

    /// In-place application. Softmax variants normalize over the last axis.
    pub fn apply_array<D: Dimension>(&self, data: &mut Array<f32, D>) {
        match self {
            Activation::Linear => {}
            Activation::ReLU => Zip::from(data).for_each(|x| *x = x.max(0.0)),
            Activation::Sigmoid => Zip::from(data).for_each(|x| *x = 1.0 / (1.0 + (-*x).exp())),
            Activation::Tanh => Zip::from(data).for_each(|x| *x = x.tanh()),
            Activation::Softmax => Self::softmax_lanes(data, false),
            Activation::LogSoftmax => Self::softmax_lanes(data, true),
        }
    }

    fn softmax_lanes<D: Dimension>(data: &mut Array<f32, D>, log: bool) {
        if data.ndim() == 0 {
            return;
        }
        let last = Axis(data.ndim() - 1);

        for mut lane in data.lanes_mut(last) {
            let max_val = lane.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let sum: f32 = lane.iter().map(|x| (x - max_val).exp()).sum();

            if log {
                let log_sum = sum.ln();
                lane.mapv_inplace(|x| x - max_val - log_sum);
            } else {
                lane.mapv_inplace(|x| (x - max_val).exp() / sum);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_relu() {
        let mut tensor = Tensor::from_vec(vec![-1.0, 0.0, 1.0, 2.0], &[4]).unwrap();
        Activation::ReLU.apply(&mut tensor).unwrap();
        assert_eq!(tensor.to_vec(), vec![0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_sigmoid() {
        let mut tensor = Tensor::from_vec(vec![0.0], &[1]).unwrap();
        Activation::Sigmoid.apply(&mut tensor).unwrap();
        assert_abs_diff_eq!(tensor.to_vec()[0], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_softmax() {
        let mut tensor = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[3]).unwrap();
        Activation::Softmax.apply(&mut tensor).unwrap();
        let result = tensor.to_vec();

        let sum: f32 = result.iter().sum();
        assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-6);

        assert!(result[2] > result[1]);
        assert!(result[1] > result[0]);
    }

    #[test]
    fn test_log_softmax_rows() {
        let mut tensor =
            Tensor::from_vec(vec![1.0, 2.0, 3.0, 1000.0, 1000.0, 1000.0], &[2, 3]).unwrap();
        Activation::LogSoftmax.apply(&mut tensor).unwrap();

        for row in tensor.data().outer_iter() {
            let total: f32 = row.iter().map(|x| x.exp()).sum();
            assert_abs_diff_eq!(total, 1.0, epsilon = 1e-5);
        }
        assert_abs_diff_eq!(tensor.to_vec()[3], -(3.0_f32).ln(), epsilon = 1e-5);
    }
}
