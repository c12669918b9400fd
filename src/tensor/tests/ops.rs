use crate::tensor::Tensor;
use approx::assert_abs_diff_eq;

/// 测试逐元素加法与乘法
#[test]
fn test_elementwise() {
    let a = Tensor::new(&[1.0, 2.0, 3.0], &[3]);
    let b = Tensor::new(&[4.0, 5.0, 6.0], &[3]);

    assert_eq!(&a + &b, Tensor::new(&[5.0, 7.0, 9.0], &[3]));
    assert_eq!(&a * &b, Tensor::new(&[4.0, 10.0, 18.0], &[3]));
}

/// 测试标量广播：`[n] * []`与`[] * [n]`均可
#[test]
fn test_scalar_broadcast() {
    let x = Tensor::new(&[1.0, 2.0, 3.0], &[3]);
    let w = Tensor::scalar(2.0);

    assert_eq!(&x * &w, Tensor::new(&[2.0, 4.0, 6.0], &[3]));
    assert_eq!(&w * &x, Tensor::new(&[2.0, 4.0, 6.0], &[3]));

    // i32标量加纯数
    let n = Tensor::scalar_i32(0);
    assert_eq!((&n + 1).to_scalar_i32(), Some(1));
}

/// 测试bias广播：`[batch, out] + [1, out]`
#[test]
fn test_bias_broadcast() {
    let x = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
    let b = Tensor::new(&[10.0, 20.0], &[1, 2]);

    assert_eq!(&x + &b, Tensor::new(&[11.0, 22.0, 13.0, 24.0], &[2, 2]));
}

/// 测试矩阵乘法
#[test]
fn test_matmul() {
    let a = Tensor::new(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
    let b = Tensor::new(&[1.0, 0.0, 0.0, 1.0, 1.0, 1.0], &[3, 2]);

    let c = a.matmul(&b);
    assert_eq!(c.shape(), &[2, 2]);
    assert_eq!(c, Tensor::new(&[4.0, 5.0, 10.0, 11.0], &[2, 2]));

    // 标量输出也应保持2维形状
    let row = Tensor::new(&[1.0, 2.0], &[1, 2]);
    let col = Tensor::new(&[3.0, 4.0], &[2, 1]);
    let out = row.matmul(&col);
    assert_eq!(out.shape(), &[1, 1]);
    assert_abs_diff_eq!(out.to_scalar().unwrap(), 11.0, epsilon = 1e-6);
}

/// 测试ReLU激活
#[test]
fn test_relu() {
    let x = Tensor::new(&[-1.0, 0.0, 2.5], &[3]);
    assert_eq!(x.relu(), Tensor::new(&[0.0, 0.0, 2.5], &[3]));

    let n = Tensor::new_i32(&[-3, 4], &[2]);
    assert_eq!(n.relu(), Tensor::new_i32(&[0, 4], &[2]));
}

/// 测试形状不兼容时panic
#[test]
#[should_panic(expected = "形状不一致")]
fn test_mismatched_shapes_panic() {
    let a = Tensor::new(&[1.0, 2.0], &[2]);
    let b = Tensor::new(&[1.0, 2.0, 3.0], &[3]);
    let _ = &a + &b;
}
