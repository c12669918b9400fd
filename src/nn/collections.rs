/*
 * @Author       : 老董
 * @Date         : 2026-03-05
 * @Description  : 参数/状态容器
 *
 * 叶子值以集合名（"parameters"、"states"、"batch_stats"或用户自定义）
 * 分区；"parameters"集合可训练，其余集合不可训练。
 * 不变量：同一条路径在整棵树范围内至多属于一个集合。
 */

use crate::errors::ModuleError;
use crate::tensor::Tensor;
use crate::tree::{Path, Tree};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 可训练参数所在的集合名
pub const PARAMETERS: &str = "parameters";
/// 命令式风格状态所在的默认集合名
pub const STATES: &str = "states";

/// 按集合名划分的参数树集
pub type ParameterCollection = BTreeMap<String, Tree<Tensor>>;

/// 打上集合标签的叶子值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub collection: String,
    pub value: Tensor,
}

impl Parameter {
    pub fn new(collection: &str, value: Tensor) -> Self {
        Self {
            collection: collection.to_string(),
            value,
        }
    }

    /// 是否属于可训练集合
    pub fn is_trainable(&self) -> bool {
        self.collection == PARAMETERS
    }
}

/// init/apply之间穿行的{参数, 状态}值对
///
/// 训练循环在两次调用之间独占持有；每次apply按值传入并以返回值
/// 整体替换，任何组件都不就地修改交出去的States。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct States {
    pub params: Tree<Tensor>,
    pub states: ParameterCollection,
}

impl States {
    pub fn new(params: Tree<Tensor>, states: ParameterCollection) -> Self {
        Self { params, states }
    }

    /// 以新参数树替换，返回新值
    pub fn with_params(mut self, params: Tree<Tensor>) -> Self {
        self.params = params;
        self
    }

    /// 以新状态集替换，返回新值
    pub fn with_states(mut self, states: ParameterCollection) -> Self {
        self.states = states;
        self
    }
}

// ==================== 集合的拆分/过滤/合并 ====================

/// 把带标签的树按集合名拆成独立的参数树集
pub fn split_into_collections(tagged: &Tree<Parameter>) -> ParameterCollection {
    let mut names: BTreeSet<String> = BTreeSet::new();
    for p in tagged.leaves() {
        names.insert(p.collection.clone());
    }

    names
        .into_iter()
        .filter_map(|name| {
            tagged
                .filter_map(&mut |p: &Parameter| {
                    (p.collection == name).then(|| p.value.clone())
                })
                .map(|tree| (name, tree))
        })
        .collect()
}

/// 在集合集中按顶层名称查找叶子参数。
/// 同名出现在多个集合违反分区不变量，按无效操作报错。
pub fn get_parameter(
    collections: &ParameterCollection,
    name: &str,
) -> Result<Parameter, ModuleError> {
    let path = Path::root().child(name);
    let hits: Vec<(&String, &Tensor)> = collections
        .iter()
        .filter_map(|(collection, tree)| tree.get_leaf(&path).map(|t| (collection, t)))
        .collect();

    match hits.as_slice() {
        [] => Err(ModuleError::MissingParameter {
            path: name.to_string(),
        }),
        [(collection, value)] => Ok(Parameter::new(collection.as_str(), (*value).clone())),
        _ => Err(ModuleError::InvalidOperation(format!(
            "参数`{}`同时出现在多个集合中：{:?}",
            name,
            hits.iter().map(|(c, _)| c.as_str()).collect::<Vec<_>>()
        ))),
    }
}

/// 取某个子模块名下的各集合子树（不含该子模块没有条目的集合）
pub fn submodule_collections(
    collections: &ParameterCollection,
    name: &str,
) -> ParameterCollection {
    let path = Path::root().child(name);
    collections
        .iter()
        .filter_map(|(collection, tree)| {
            tree.get(&path)
                .map(|sub| (collection.clone(), sub.clone()))
        })
        .collect()
}

/// 合并两个集合集；同名集合做结构化合并
pub fn merge_collections(
    a: &ParameterCollection,
    b: &ParameterCollection,
) -> Result<ParameterCollection, ModuleError> {
    let mut out = a.clone();
    for (name, tree) in b {
        let merged = match a.get(name) {
            Some(existing) => existing.merge(tree)?,
            None => tree.clone(),
        };
        out.insert(name.clone(), merged);
    }
    Ok(out)
}
