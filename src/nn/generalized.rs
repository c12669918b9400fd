/*
 * @Author       : 老董
 * @Date         : 2026-03-08
 * @Description  : 泛化模块接口与分发
 *
 * 两种模块风格（命令式闭包注册 / 声明式惰性绑定）被适配到同一个
 * init/apply契约后面；分发函数按优先级识别模块值并选择适配器，
 * 本身是无副作用的纯分类，且幂等（已泛化的值原样通过）。
 */

use super::collections::{ParameterCollection, States};
use super::declarative::{DeclarativeAdapter, DeclarativeModule};
use super::imperative::ImperativeModule;
use super::summary::SummaryRecorder;
use crate::errors::ModuleError;
use crate::rng::RngSeq;
use crate::tensor::Tensor;
use crate::tree::Tree;
use crate::utils::CallArgs;
use enum_dispatch::enum_dispatch;
use std::any::Any;

/// 一次trace的执行模式
#[derive(Debug, Clone, Copy)]
pub enum TraceMode<'a> {
    /// 初始化：注册并生成所有参数/状态
    Init,
    /// 应用：以外部提供的值替换注册
    Apply {
        params: &'a Tree<Tensor>,
        states: &'a ParameterCollection,
    },
}

impl TraceMode<'_> {
    pub const fn is_initializing(&self) -> bool {
        matches!(self, Self::Init)
    }
}

/// 泛化后的模块（适配器的带标签联合）
#[enum_dispatch]
#[derive(Debug)]
pub enum AnyModule {
    Imperative(ImperativeModule),
    Declarative(DeclarativeAdapter),
}

/// 泛化模块接口
///
/// init与apply除RNG键流与返回的容器外不产生任何外部可见效果；
/// 传入的参数/状态容器不会被就地修改，返回值总是新容器。
#[enum_dispatch(AnyModule)]
pub trait GeneralizedModule {
    /// 模块名（参数树/摘要表的根命名用）
    fn module_name(&self) -> String;

    /// 是否已完成过一次init
    fn is_initialized(&self) -> bool;

    /// 登记init已完成（init与摘要引擎内部使用）
    fn mark_initialized(&self);

    /// 显式重置；之后允许再次init
    fn reset(&self);

    /// 共享的执行入口：init/apply与摘要引擎都走这里。
    /// `recorder`存在时会沿途登记每个子模块的摘要行。
    fn trace(
        &self,
        mode: TraceMode<'_>,
        rng: Option<&mut RngSeq>,
        training: bool,
        recorder: Option<&SummaryRecorder>,
        args: &CallArgs,
    ) -> Result<(Tree<Tensor>, States), ModuleError>;

    /// 初始化：从RNG与输入确定性地生成全部参数/状态。
    /// 未经reset的重复init报`AlreadyInitialized`。
    ///
    /// # 返回
    /// （输出，{参数树, 状态集}）
    fn init(&self, rng: &mut RngSeq, args: &CallArgs) -> Result<(Tree<Tensor>, States), ModuleError> {
        if self.is_initialized() {
            return Err(ModuleError::AlreadyInitialized);
        }
        let result = self.trace(TraceMode::Init, Some(rng), false, None, args)?;
        self.mark_initialized();
        Ok(result)
    }

    /// 应用：以外部提供的参数/状态重放前向计算。
    /// init之前调用报`UninitializedModule`；缺路径报`MissingParameter`。
    ///
    /// # 返回
    /// （输出，{新参数树, 新状态集}）；集合未变化时也返回新容器
    fn apply(
        &self,
        params: &Tree<Tensor>,
        states: &ParameterCollection,
        rng: Option<&mut RngSeq>,
        training: bool,
        args: &CallArgs,
    ) -> Result<(Tree<Tensor>, States), ModuleError> {
        if !self.is_initialized() {
            return Err(ModuleError::UninitializedModule);
        }
        self.trace(TraceMode::Apply { params, states }, rng, training, None, args)
    }
}

// ==================== 分发 ====================

/// 未分类的模块值（用户提供的原始形式）
pub enum ModuleValue {
    /// 已满足泛化接口
    Generalized(AnyModule),
    /// 命令式（闭包注册）风格
    Imperative(ImperativeModule),
    /// 声明式（惰性绑定）风格
    Declarative(Box<dyn DeclarativeModule>),
    /// 无法识别的值
    Opaque(Box<dyn Any>),
}

impl ModuleValue {
    /// 包装一个声明式模块值
    pub fn declarative(module: impl DeclarativeModule + 'static) -> Self {
        Self::Declarative(Box::new(module))
    }

    /// 包装一个任意值（分发时将报不支持）
    pub fn opaque(value: impl Any) -> Self {
        Self::Opaque(Box::new(value))
    }
}

impl From<AnyModule> for ModuleValue {
    fn from(m: AnyModule) -> Self {
        Self::Generalized(m)
    }
}

impl From<ImperativeModule> for ModuleValue {
    fn from(m: ImperativeModule) -> Self {
        Self::Imperative(m)
    }
}

impl From<DeclarativeAdapter> for ModuleValue {
    fn from(m: DeclarativeAdapter) -> Self {
        Self::Generalized(AnyModule::Declarative(m))
    }
}

/// 按优先级识别模块值并泛化：
/// 已泛化 > 命令式风格 > 声明式风格；无适配器认领时报错。
/// 纯分类函数，无副作用；对已泛化的值幂等。
pub fn generalize(value: impl Into<ModuleValue>) -> Result<AnyModule, ModuleError> {
    match value.into() {
        ModuleValue::Generalized(m) => Ok(m),
        ModuleValue::Imperative(m) => Ok(AnyModule::Imperative(m)),
        ModuleValue::Declarative(m) => Ok(AnyModule::Declarative(DeclarativeAdapter::from_boxed(m))),
        ModuleValue::Opaque(v) => Err(ModuleError::UnsupportedModule(format!(
            "未知类型（TypeId: {:?}）",
            (*v).type_id()
        ))),
    }
}
