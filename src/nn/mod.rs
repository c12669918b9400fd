/*
 * @Author       : 老董
 * @Date         : 2026-03-01
 * @Description  : 负责模块层的构建：泛化接口、两种风格的适配器、
 *                 参数/状态容器与摘要引擎
 */

mod collections;
mod declarative;
mod generalized;
mod imperative;
mod init;
pub mod layer;
mod summary;

pub use collections::{
    PARAMETERS, Parameter, ParameterCollection, STATES, States, get_parameter, merge_collections,
    split_into_collections, submodule_collections,
};
pub use declarative::{DeclarativeAdapter, DeclarativeModule, Scope, Variable};
pub use generalized::{AnyModule, GeneralizedModule, ModuleValue, TraceMode, generalize};
pub use imperative::{ImperativeModule, TraceCtx};
pub use init::Init;
pub use summary::{
    ShapeDesc, Summary, SummaryRecorder, SummaryTableEntry, format_count_and_size, format_size,
    summarize, summarize_applied,
};

#[cfg(test)]
mod tests;
