/*
 * @Author       : 老董
 * @Date         : 2026-02-15
 * @Description  : 嵌套参数树（pytree）与层级路径
 *
 * Tree 是参数/状态容器的统一嵌套表示：叶子、字典、列表、元组。
 * Path 以字符串或下标段定位树中的某个位置，可哈希、可排序，
 * 展示时以"/"连接。所有遍历顺序由 BTreeMap 保证稳定。
 */

use crate::errors::ModuleError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[cfg(test)]
pub mod tests;

// ==================== 路径 ====================

/// 路径段：字典键或序列下标
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, "{k}"),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        Self::Key(s.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(s: String) -> Self {
        Self::Key(s)
    }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

/// 层级路径：路径段的有序序列
///
/// 空路径表示树根。
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Path(Vec<PathSegment>);

impl Path {
    /// 根路径（空序列）
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    /// 返回追加一段后的新路径
    pub fn child(&self, segment: impl Into<PathSegment>) -> Path {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Path(segments)
    }

    pub fn push(&mut self, segment: impl Into<PathSegment>) {
        self.0.push(segment.into());
    }

    pub fn pop(&mut self) -> Option<PathSegment> {
        self.0.pop()
    }

    /// 路径深度（段数），根为0
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// 是否以`prefix`开头（任何路径都以根开头）
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// 截断到指定深度的前缀路径
    pub fn truncated(&self, depth: usize) -> Path {
        Path(self.0.iter().take(depth).cloned().collect())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("/");
        write!(f, "{joined}")
    }
}

// ==================== 嵌套树 ====================

/// 嵌套参数树
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tree<T> {
    Leaf(T),
    Dict(BTreeMap<String, Tree<T>>),
    List(Vec<Tree<T>>),
    Tuple(Vec<Tree<T>>),
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self::Dict(BTreeMap::new())
    }
}

impl<T> From<T> for Tree<T> {
    fn from(value: T) -> Self {
        Self::Leaf(value)
    }
}

impl<T> Tree<T> {
    /// 空字典树
    pub fn dict() -> Self {
        Self::default()
    }

    pub fn leaf(value: T) -> Self {
        Self::Leaf(value)
    }

    /// 树中是否没有任何叶子
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Leaf(_) => false,
            Self::Dict(m) => m.values().all(Tree::is_empty),
            Self::List(v) | Self::Tuple(v) => v.iter().all(Tree::is_empty),
        }
    }

    /// 对每个叶子应用`f`，保持结构不变
    pub fn map<U>(&self, f: &mut impl FnMut(&T) -> U) -> Tree<U> {
        match self {
            Self::Leaf(v) => Tree::Leaf(f(v)),
            Self::Dict(m) => Tree::Dict(m.iter().map(|(k, t)| (k.clone(), t.map(f))).collect()),
            Self::List(v) => Tree::List(v.iter().map(|t| t.map(f)).collect()),
            Self::Tuple(v) => Tree::Tuple(v.iter().map(|t| t.map(f)).collect()),
        }
    }

    /// 对每个叶子应用`f`，丢弃返回None的叶子并剪掉空容器
    pub fn filter_map<U>(&self, f: &mut impl FnMut(&T) -> Option<U>) -> Option<Tree<U>> {
        match self {
            Self::Leaf(v) => f(v).map(Tree::Leaf),
            Self::Dict(m) => {
                let out: BTreeMap<String, Tree<U>> = m
                    .iter()
                    .filter_map(|(k, t)| t.filter_map(f).map(|t| (k.clone(), t)))
                    .collect();
                (!out.is_empty()).then_some(Tree::Dict(out))
            }
            Self::List(v) => {
                let out: Vec<Tree<U>> = v.iter().filter_map(|t| t.filter_map(f)).collect();
                (!out.is_empty()).then_some(Tree::List(out))
            }
            Self::Tuple(v) => {
                let out: Vec<Tree<U>> = v.iter().filter_map(|t| t.filter_map(f)).collect();
                (!out.is_empty()).then_some(Tree::Tuple(out))
            }
        }
    }

    /// 收集所有叶子（深度优先，字典按键序）
    pub fn leaves(&self) -> Vec<&T> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a T>) {
        match self {
            Self::Leaf(v) => out.push(v),
            Self::Dict(m) => m.values().for_each(|t| t.collect_leaves(out)),
            Self::List(v) | Self::Tuple(v) => v.iter().for_each(|t| t.collect_leaves(out)),
        }
    }

    /// 展平为（路径，叶子）对；字典键与序列下标统一作为路径段
    pub fn leaf_paths(&self) -> Vec<(Path, &T)> {
        let mut out = Vec::new();
        self.collect_leaf_paths(Path::root(), &mut out);
        out
    }

    fn collect_leaf_paths<'a>(&'a self, path: Path, out: &mut Vec<(Path, &'a T)>) {
        match self {
            Self::Leaf(v) => out.push((path, v)),
            Self::Dict(m) => {
                for (k, t) in m {
                    t.collect_leaf_paths(path.child(k.as_str()), out);
                }
            }
            Self::List(v) | Self::Tuple(v) => {
                for (i, t) in v.iter().enumerate() {
                    t.collect_leaf_paths(path.child(i), out);
                }
            }
        }
    }

    /// 展平为（"/"连接的名称，叶子）对；序列下标不进入名称
    pub fn flatten_names(&self) -> Vec<(String, &T)> {
        let mut out = Vec::new();
        self.collect_flatten_names(Path::root(), &mut out);
        out
    }

    fn collect_flatten_names<'a>(&'a self, path: Path, out: &mut Vec<(String, &'a T)>) {
        match self {
            Self::Leaf(v) => out.push((path.to_string(), v)),
            Self::Dict(m) => {
                for (k, t) in m {
                    t.collect_flatten_names(path.child(k.as_str()), out);
                }
            }
            Self::List(v) | Self::Tuple(v) => {
                for t in v {
                    t.collect_flatten_names(path.clone(), out);
                }
            }
        }
    }

    /// 按路径取子树
    pub fn get(&self, path: &Path) -> Option<&Tree<T>> {
        let mut node = self;
        for segment in path.segments() {
            node = match (node, segment) {
                (Self::Dict(m), PathSegment::Key(k)) => m.get(k)?,
                (Self::List(v) | Self::Tuple(v), PathSegment::Index(i)) => v.get(*i)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// 按路径取叶子值
    pub fn get_leaf(&self, path: &Path) -> Option<&T> {
        match self.get(path)? {
            Self::Leaf(v) => Some(v),
            _ => None,
        }
    }

    /// 在指定路径写入叶子，必要时创建中间字典；
    /// 已有叶子会被覆盖，叶子与子树冲突则报`MergeConflict`
    pub fn insert(&mut self, path: &Path, value: T) -> Result<(), ModuleError> {
        self.insert_inner(path.segments(), path, value)
    }

    fn insert_inner(
        &mut self,
        segments: &[PathSegment],
        full: &Path,
        value: T,
    ) -> Result<(), ModuleError> {
        let Some((head, rest)) = segments.split_first() else {
            return match self {
                Self::Leaf(_) => {
                    *self = Self::Leaf(value);
                    Ok(())
                }
                Self::Dict(m) if m.is_empty() => {
                    *self = Self::Leaf(value);
                    Ok(())
                }
                _ => Err(ModuleError::MergeConflict {
                    path: full.to_string(),
                    message: "叶子不能覆盖非空子树".to_string(),
                }),
            };
        };

        match (&mut *self, head) {
            (Self::Dict(m), PathSegment::Key(k)) => m
                .entry(k.clone())
                .or_insert_with(Tree::dict)
                .insert_inner(rest, full, value),
            (Self::List(v) | Self::Tuple(v), PathSegment::Index(i)) => {
                if *i > v.len() {
                    return Err(ModuleError::MergeConflict {
                        path: full.to_string(),
                        message: format!("下标{}超出序列长度{}", i, v.len()),
                    });
                }
                if *i == v.len() {
                    v.push(Tree::dict());
                }
                v[*i].insert_inner(rest, full, value)
            }
            _ => Err(ModuleError::MergeConflict {
                path: full.to_string(),
                message: "路径段与现有结构不匹配".to_string(),
            }),
        }
    }
}

impl<T: Clone> Tree<T> {
    /// 从（路径，叶子）对重建嵌套树。
    /// 下标段统一重建为List（元组的区分只在展平方向有意义）。
    pub fn unflatten(pairs: &[(Path, T)]) -> Result<Tree<T>, ModuleError> {
        if let [(path, value)] = pairs {
            if path.is_root() {
                return Ok(Tree::Leaf(value.clone()));
            }
        }
        let first_is_index = pairs
            .first()
            .is_some_and(|(p, _)| matches!(p.segments().first(), Some(PathSegment::Index(_))));
        let mut root = if first_is_index {
            Tree::List(Vec::new())
        } else {
            Tree::dict()
        };
        for (path, value) in pairs {
            root.insert(path, value.clone())?;
        }
        Ok(root)
    }

    /// 结构化合并两棵树：
    /// - 两边同为字典：键并集，双方共有的键递归合并
    /// - 两边同为列表/元组：长度必须一致，逐项合并
    /// - 其余组合（含叶子对叶子）为合并冲突
    pub fn merge(&self, other: &Tree<T>) -> Result<Tree<T>, ModuleError> {
        Self::merge_at(self, other, &Path::root())
    }

    fn merge_at(a: &Tree<T>, b: &Tree<T>, path: &Path) -> Result<Tree<T>, ModuleError> {
        match (a, b) {
            (Tree::Dict(ma), Tree::Dict(mb)) => {
                let mut out = ma.clone();
                for (k, vb) in mb {
                    let merged = match ma.get(k) {
                        Some(va) => Self::merge_at(va, vb, &path.child(k.as_str()))?,
                        None => vb.clone(),
                    };
                    out.insert(k.clone(), merged);
                }
                Ok(Tree::Dict(out))
            }
            (Tree::List(va), Tree::List(vb)) | (Tree::Tuple(va), Tree::Tuple(vb)) => {
                if va.len() != vb.len() {
                    return Err(ModuleError::MergeConflict {
                        path: path.to_string(),
                        message: format!("序列长度不一致：{} vs {}", va.len(), vb.len()),
                    });
                }
                let items = va
                    .iter()
                    .zip(vb)
                    .enumerate()
                    .map(|(i, (x, y))| Self::merge_at(x, y, &path.child(i)))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(match a {
                    Tree::List(_) => Tree::List(items),
                    _ => Tree::Tuple(items),
                })
            }
            _ => Err(ModuleError::MergeConflict {
                path: path.to_string(),
                message: "节点类型不一致，无法合并".to_string(),
            }),
        }
    }
}

/// 返回子树根层直接持有的叶子项（键 -> 叶子）
///
/// 摘要引擎用它统计某个模块自己直接持有的参数，
/// 不含更深层子模块的参数。
pub fn direct_leaves<T>(tree: &Tree<T>) -> Vec<(&String, &T)> {
    match tree {
        Tree::Dict(m) => m
            .iter()
            .filter_map(|(k, t)| match t {
                Tree::Leaf(v) => Some((k, v)),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
