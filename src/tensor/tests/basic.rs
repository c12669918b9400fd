use crate::tensor::{DType, Tensor};

/// 测试标量张量的形状与取值
#[test]
fn test_scalar() {
    let t = Tensor::scalar(3.5);
    assert_eq!(t.shape(), &[] as &[usize]);
    assert_eq!(t.size(), 1);
    assert_eq!(t.dimension(), 0);
    assert_eq!(t.to_scalar(), Some(3.5));

    let n = Tensor::scalar_i32(7);
    assert_eq!(n.dtype(), DType::I32);
    assert_eq!(n.to_scalar_i32(), Some(7));
    // i32标量也可以转成f32读取
    assert_eq!(n.to_scalar(), Some(7.0));
}

/// 测试元素类型的itemsize与总字节数
#[test]
fn test_dtype_bytes() {
    assert_eq!(DType::F32.itemsize(), 4);
    assert_eq!(DType::I32.itemsize(), 4);
    assert_eq!(DType::F32.name(), "float32");
    assert_eq!(DType::I32.name(), "int32");

    let t = Tensor::ones_i32(&[5]);
    assert_eq!(t.size(), 5);
    assert_eq!(t.bytes(), 20); // 5个int32元素
}

/// 测试构造器的形状
#[test]
fn test_constructors() {
    let t = Tensor::new(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
    assert_eq!(t.shape(), &[2, 3]);
    assert_eq!(t.dtype(), DType::F32);

    let z = Tensor::zeros(&[3, 2]);
    assert_eq!(z.size(), 6);
    assert!(z == Tensor::new(&[0.0; 6], &[3, 2]));

    let f = Tensor::full(&[2], 2.5);
    assert_eq!(f, Tensor::new(&[2.5, 2.5], &[2]));
}

/// 测试带种子的随机构造器可重复
#[test]
fn test_seeded_random_reproducible() {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    let mut rng1 = StdRng::seed_from_u64(42);
    let mut rng2 = StdRng::seed_from_u64(42);

    let a = Tensor::normal_with_rng(0.0, 1.0, &[4, 4], &mut rng1);
    let b = Tensor::normal_with_rng(0.0, 1.0, &[4, 4], &mut rng2);
    assert_eq!(a, b, "相同种子应生成相同张量");

    let c = Tensor::uniform_with_rng(-1.0, 1.0, &[8], &mut rng1);
    let d = Tensor::uniform_with_rng(-1.0, 1.0, &[8], &mut rng2);
    assert_eq!(c, d);
}
