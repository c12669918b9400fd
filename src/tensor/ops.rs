/*
 * @Author       : 老董
 * @Date         : 2026-02-11
 * @Description  : 张量的基本运算（逐元素加/乘、矩阵乘、ReLU）
 *
 * 数值内核委托给 ndarray；本层只负责：
 * - 动态元素类型（f32/i32）的匹配
 * - 标量与低维张量的广播
 * - 形状不兼容时以统一的中文信息 panic（与 Tensor 构造器一致）
 */

use super::{Tensor, TensorData};
use ndarray::{ArrayD, Ix2};
use std::ops::{Add, Mul};

/// 逐元素二元运算（含广播）：
/// - 形状相同：直接逐元素
/// - 任一侧只有1个元素：按标量广播
/// - 否则尝试将较小的一侧广播到较大的一侧
fn zip_broadcast<T: Copy>(
    op_name: &str,
    a: &ArrayD<T>,
    b: &ArrayD<T>,
    op: impl Fn(T, T) -> T,
) -> ArrayD<T> {
    if a.shape() == b.shape() {
        let mut out = a.clone();
        out.zip_mut_with(b, |x, y| *x = op(*x, *y));
        return out;
    }
    if b.len() == 1 {
        let s = *b.iter().next().unwrap();
        return a.mapv(|x| op(x, s));
    }
    if a.len() == 1 {
        let s = *a.iter().next().unwrap();
        return b.mapv(|x| op(s, x));
    }
    if let Some(bb) = b.broadcast(a.raw_dim()) {
        let mut out = a.clone();
        out.zip_mut_with(&bb, |x, y| *x = op(*x, *y));
        return out;
    }
    if let Some(ab) = a.broadcast(b.raw_dim()) {
        let mut out = ab.to_owned();
        out.zip_mut_with(b, |x, y| *x = op(*x, *y));
        return out;
    }
    panic!(
        "形状不一致，故无法{}：第一个张量的形状为{:?}，第二个张量的形状为{:?}",
        op_name,
        a.shape(),
        b.shape()
    );
}

fn binop(op_name: &str, a: &Tensor, b: &Tensor, f: fn(f32, f32) -> f32, i: fn(i32, i32) -> i32) -> Tensor {
    match (a.data(), b.data()) {
        (TensorData::F32(x), TensorData::F32(y)) => {
            Tensor::from_data(TensorData::F32(zip_broadcast(op_name, x, y, f)))
        }
        (TensorData::I32(x), TensorData::I32(y)) => {
            Tensor::from_data(TensorData::I32(zip_broadcast(op_name, x, y, i)))
        }
        _ => panic!(
            "元素类型不一致，故无法{}：{} vs {}",
            op_name,
            a.dtype().name(),
            b.dtype().name()
        ),
    }
}

impl Add<&Tensor> for &Tensor {
    type Output = Tensor;

    fn add(self, rhs: &Tensor) -> Tensor {
        binop("相加", self, rhs, |x, y| x + y, |x, y| x + y)
    }
}

impl Mul<&Tensor> for &Tensor {
    type Output = Tensor;

    fn mul(self, rhs: &Tensor) -> Tensor {
        binop("相乘", self, rhs, |x, y| x * y, |x, y| x * y)
    }
}

impl Add<f32> for &Tensor {
    type Output = Tensor;

    fn add(self, rhs: f32) -> Tensor {
        match self.data() {
            TensorData::F32(a) => Tensor::from_data(TensorData::F32(a.mapv(|x| x + rhs))),
            TensorData::I32(_) => panic!("i32张量不能与f32纯数相加"),
        }
    }
}

impl Add<i32> for &Tensor {
    type Output = Tensor;

    fn add(self, rhs: i32) -> Tensor {
        match self.data() {
            TensorData::I32(a) => Tensor::from_data(TensorData::I32(a.mapv(|x| x + rhs))),
            TensorData::F32(a) => Tensor::from_data(TensorData::F32(a.mapv(|x| x + rhs as f32))),
        }
    }
}

impl Mul<f32> for &Tensor {
    type Output = Tensor;

    fn mul(self, rhs: f32) -> Tensor {
        match self.data() {
            TensorData::F32(a) => Tensor::from_data(TensorData::F32(a.mapv(|x| x * rhs))),
            TensorData::I32(_) => panic!("i32张量不能与f32纯数相乘"),
        }
    }
}

impl Tensor {
    /// ReLU激活：逐元素取max(x, 0)
    pub fn relu(&self) -> Tensor {
        match self.data() {
            TensorData::F32(a) => Tensor::from_data(TensorData::F32(a.mapv(|x| x.max(0.0)))),
            TensorData::I32(a) => Tensor::from_data(TensorData::I32(a.mapv(|x| x.max(0)))),
        }
    }

    /// 矩阵乘法：`[n, k] @ [k, m] = [n, m]`（仅支持2维f32张量）
    pub fn matmul(&self, rhs: &Tensor) -> Tensor {
        let (TensorData::F32(a), TensorData::F32(b)) = (self.data(), rhs.data()) else {
            panic!("矩阵乘法仅支持f32张量");
        };
        let a = a
            .view()
            .into_dimensionality::<Ix2>()
            .unwrap_or_else(|_| panic!("矩阵乘法要求2维张量，实际形状为{:?}", self.shape()));
        let b = b
            .view()
            .into_dimensionality::<Ix2>()
            .unwrap_or_else(|_| panic!("矩阵乘法要求2维张量，实际形状为{:?}", rhs.shape()));
        assert!(
            a.shape()[1] == b.shape()[0],
            "形状不一致，故无法矩阵相乘：第一个张量的形状为{:?}，第二个张量的形状为{:?}",
            a.shape(),
            b.shape()
        );
        Tensor::from_data(TensorData::F32(a.dot(&b).into_dyn()))
    }
}
