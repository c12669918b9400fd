/*
 * @Author       : 老董
 * @Date         : 2026-03-02
 * @Description  : 参数/状态的初始化策略
 */

use crate::tensor::Tensor;
use rand::rngs::StdRng;

/// 初始化策略
///
/// 所有随机策略都通过显式传入的RNG生成，保证同一键流下可重复。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Init {
    /// 常数初始化
    Constant(f32),
    /// 全零
    Zeros,
    /// 全一
    Ones,
    /// 整型常数（计数器类状态用）
    ConstantI32(i32),
    /// 整型全零
    ZerosI32,
    /// 整型全一
    OnesI32,
    /// 正态分布
    Normal { mean: f32, std: f32 },
    /// Kaiming/He 初始化（适用于 `ReLU`）
    Kaiming,
    /// Xavier/Glorot 初始化（适用于 Sigmoid/Tanh）
    Xavier,
}

impl Init {
    /// 生成初始化后的 Tensor（使用指定的 RNG）
    pub fn generate(&self, shape: &[usize], rng: &mut StdRng) -> Tensor {
        match self {
            Self::Constant(v) => Tensor::full(shape, *v),
            Self::Zeros => Tensor::zeros(shape),
            Self::Ones => Tensor::ones(shape),
            Self::ConstantI32(v) => Tensor::full_i32(shape, *v),
            Self::ZerosI32 => Tensor::zeros_i32(shape),
            Self::OnesI32 => Tensor::ones_i32(shape),
            Self::Normal { mean, std } => Tensor::normal_with_rng(*mean, *std, shape, rng),
            Self::Kaiming => {
                let fan_in = shape.first().copied().unwrap_or(1).max(1);
                let std = (2.0 / fan_in as f32).sqrt();
                Tensor::normal_with_rng(0.0, std, shape, rng)
            }
            Self::Xavier => {
                let fan_in = shape.first().copied().unwrap_or(1).max(1);
                let fan_out = shape.get(1).copied().unwrap_or(1).max(1);
                let std = (2.0 / (fan_in + fan_out) as f32).sqrt();
                Tensor::normal_with_rng(0.0, std, shape, rng)
            }
        }
    }
}
