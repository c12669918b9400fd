/*
 * @Author       : 老董
 * @Date         : 2026-03-22
 * @Description  : Linear (全连接) 层
 *
 * 声明式风格的全连接层：`output = x @ W + b`
 */

use crate::errors::ModuleError;
use crate::nn::declarative::{DeclarativeModule, Scope};
use crate::nn::init::Init;
use crate::tensor::Tensor;
use crate::tree::Tree;

/// Linear (全连接) 层
///
/// # 输入/输出形状
/// - 输入：[batch_size, in_features]
/// - 输出：[batch_size, out_features]
///
/// # 使用示例
/// ```ignore
/// let fc = Linear::new(784, 128, true);
/// let gm = generalize(ModuleValue::declarative(fc))?;
/// let (y, states) = gm.init(&mut rng, &CallArgs::new().arg(x))?;
/// ```
pub struct Linear {
    /// 输入特征维度
    in_features: usize,
    /// 输出特征维度
    out_features: usize,
    /// 是否使用偏置
    use_bias: bool,
}

impl Linear {
    /// 创建新的 Linear 层
    ///
    /// # 参数
    /// - `in_features`: 输入特征维度
    /// - `out_features`: 输出特征维度
    /// - `use_bias`: 是否使用偏置
    pub fn new(in_features: usize, out_features: usize, use_bias: bool) -> Self {
        Self {
            in_features,
            out_features,
            use_bias,
        }
    }

    /// 获取输入特征维度
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// 获取输出特征维度
    pub fn out_features(&self) -> usize {
        self.out_features
    }
}

impl DeclarativeModule for Linear {
    fn call(
        &self,
        scope: &mut Scope<'_, '_>,
        input: &Tree<Tensor>,
    ) -> Result<Tree<Tensor>, ModuleError> {
        let Tree::Leaf(x) = input else {
            return Err(ModuleError::InvalidOperation(
                "Linear层的输入须是单个张量".to_string(),
            ));
        };

        // 权重：Kaiming 初始化适合 ReLU
        let weights = scope.param(
            "w",
            &[self.in_features, self.out_features],
            &Init::Kaiming,
        )?;
        let output = x.matmul(&weights);

        if self.use_bias {
            // 偏置：零初始化，[1, out]按batch广播
            let bias = scope.param("b", &[1, self.out_features], &Init::Zeros)?;
            Ok(Tree::leaf(&output + &bias))
        } else {
            Ok(Tree::leaf(output))
        }
    }
}
