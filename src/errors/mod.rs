use thiserror::Error;

/// 模块层统一错误类型
///
/// 所有`init`/`apply`/`summarize`路径上的致命错误都同步传播给调用者，
/// 不在内部重试（结构性不匹配重试也不会成功）。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    // 分发（generalize）用
    #[error("无法识别的模块值：{0}")]
    UnsupportedModule(String),

    // init/apply生命周期
    #[error("模块尚未初始化，请先调用init")]
    UninitializedModule,
    #[error("模块已初始化，重复init前需先调用reset")]
    AlreadyInitialized,

    // 参数绑定
    #[error("路径`{path}`缺少所需参数")]
    MissingParameter { path: String },
    #[error("路径`{path}`的参数形状不一致：期望{expected:?}，实际{got:?}")]
    ShapeMismatch {
        path: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    // 结构合并
    #[error("路径`{path}`的结构合并冲突：{message}")]
    MergeConflict { path: String, message: String },

    // 名称分配（由唯一名分配器在内部消解，不会逃逸到调用者）
    #[error("名称`{0}`重复")]
    DuplicateName(String),

    #[error("无效操作：{0}")]
    InvalidOperation(String),
}
