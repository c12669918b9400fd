use ndarray::{Array, ArrayD, IxDyn};
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

mod ops;

#[cfg(test)]
pub mod tests;

/// 张量元素类型
///
/// 本层只做形状/字节量层面的 introspection，数值内核全部委托给 ndarray，
/// 因此只需覆盖训练接口实际用到的两种元素类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    F32,
    I32,
}

impl DType {
    /// 单个元素占用的字节数
    pub const fn itemsize(&self) -> usize {
        match self {
            Self::F32 | Self::I32 => 4,
        }
    }

    /// 元素类型名（用于摘要表的输出描述）
    pub const fn name(&self) -> &'static str {
        match self {
            Self::F32 => "float32",
            Self::I32 => "int32",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum TensorData {
    F32(ArrayD<f32>),
    I32(ArrayD<i32>),
}

/// 定义张量的结构体。其可以是标量、向量、矩阵或更高维度的数组。
/// 注：只要通Tensor初始化的都是张量（即使标量也是张量）；
/// 标量的`shape`为`[]`，向量为`[n]`，矩阵为`[n,m]`，以此类推。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    data: TensorData,
}

impl Tensor {
    /// 创建一个f32张量。`data`的长度必须和`shape`中所有元素的乘积相等。
    pub fn new(data: &[f32], shape: &[usize]) -> Tensor {
        let data = Array::from_shape_vec(IxDyn(shape), data.to_vec()).unwrap();
        Tensor {
            data: TensorData::F32(data),
        }
    }

    /// 创建一个i32张量。`data`的长度必须和`shape`中所有元素的乘积相等。
    pub fn new_i32(data: &[i32], shape: &[usize]) -> Tensor {
        let data = Array::from_shape_vec(IxDyn(shape), data.to_vec()).unwrap();
        Tensor {
            data: TensorData::I32(data),
        }
    }

    /// 创建一个f32标量（形状为`[]`）
    pub fn scalar(value: f32) -> Tensor {
        Self::new(&[value], &[])
    }

    /// 创建一个i32标量（形状为`[]`）
    pub fn scalar_i32(value: i32) -> Tensor {
        Self::new_i32(&[value], &[])
    }

    /// 创建全零f32张量
    pub fn zeros(shape: &[usize]) -> Tensor {
        Tensor {
            data: TensorData::F32(ArrayD::zeros(IxDyn(shape))),
        }
    }

    /// 创建全一f32张量
    pub fn ones(shape: &[usize]) -> Tensor {
        Tensor {
            data: TensorData::F32(ArrayD::ones(IxDyn(shape))),
        }
    }

    /// 创建全一i32张量
    pub fn ones_i32(shape: &[usize]) -> Tensor {
        Tensor {
            data: TensorData::I32(ArrayD::ones(IxDyn(shape))),
        }
    }

    /// 创建全零i32张量
    pub fn zeros_i32(shape: &[usize]) -> Tensor {
        Tensor {
            data: TensorData::I32(ArrayD::zeros(IxDyn(shape))),
        }
    }

    /// 创建所有元素为`value`的i32张量
    pub fn full_i32(shape: &[usize], value: i32) -> Tensor {
        Tensor {
            data: TensorData::I32(ArrayD::from_elem(IxDyn(shape), value)),
        }
    }

    /// 创建所有元素为`value`的f32张量
    pub fn full(shape: &[usize], value: f32) -> Tensor {
        Tensor {
            data: TensorData::F32(ArrayD::from_elem(IxDyn(shape), value)),
        }
    }

    /// 创建服从正态分布的随机张量（使用指定RNG，保证可重复）
    pub fn normal_with_rng(mean: f32, std_dev: f32, shape: &[usize], rng: &mut StdRng) -> Tensor {
        let data_len = shape.iter().product::<usize>();
        let mut data = Vec::with_capacity(data_len);

        while data.len() < data_len {
            let u1: f32 = rng.r#gen();
            let u2: f32 = rng.r#gen();
            let r = (-2.0 * u1.ln()).sqrt();
            let theta = 2.0 * std::f32::consts::PI * u2;
            let z0 = mean + std_dev * r * theta.cos();
            let z1 = mean + std_dev * r * theta.sin();

            if z0.is_finite() {
                data.push(z0);
            }
            if data.len() < data_len && z1.is_finite() {
                data.push(z1);
            }
        }
        data.truncate(data_len);

        Tensor::new(&data, shape)
    }

    /// 创建在[min, max)区间均匀分布的随机张量（使用指定RNG）
    pub fn uniform_with_rng(min: f32, max: f32, shape: &[usize], rng: &mut StdRng) -> Tensor {
        let data = (0..shape.iter().product::<usize>())
            .map(|_| rng.gen_range(min..max))
            .collect::<Vec<_>>();
        Tensor::new(&data, shape)
    }
}

// ==================== 属性 ====================

impl Tensor {
    /// 返回张量的形状
    pub fn shape(&self) -> &[usize] {
        match &self.data {
            TensorData::F32(a) => a.shape(),
            TensorData::I32(a) => a.shape(),
        }
    }

    /// 返回张量的维度（阶数）
    pub fn dimension(&self) -> usize {
        self.shape().len()
    }

    /// 返回张量的元素个数
    pub fn size(&self) -> usize {
        match &self.data {
            TensorData::F32(a) => a.len(),
            TensorData::I32(a) => a.len(),
        }
    }

    /// 返回张量的元素类型
    pub const fn dtype(&self) -> DType {
        match &self.data {
            TensorData::F32(_) => DType::F32,
            TensorData::I32(_) => DType::I32,
        }
    }

    /// 返回张量占用的总字节数
    pub fn bytes(&self) -> usize {
        self.size() * self.dtype().itemsize()
    }

    /// 若张量只含1个元素，以f32形式返回其值（i32会被转换）
    pub fn to_scalar(&self) -> Option<f32> {
        if self.size() != 1 {
            return None;
        }
        match &self.data {
            TensorData::F32(a) => a.iter().next().copied(),
            TensorData::I32(a) => a.iter().next().map(|&v| v as f32),
        }
    }

    /// 若张量只含1个i32元素，返回其值
    pub fn to_scalar_i32(&self) -> Option<i32> {
        if self.size() != 1 {
            return None;
        }
        match &self.data {
            TensorData::I32(a) => a.iter().next().copied(),
            TensorData::F32(_) => None,
        }
    }

    pub(crate) fn data(&self) -> &TensorData {
        &self.data
    }

    pub(crate) fn from_data(data: TensorData) -> Tensor {
        Tensor { data }
    }
}
