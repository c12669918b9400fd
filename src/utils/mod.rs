//! # 结构工具模块
//!
//! 本模块提供模块层共用的结构工具：
//! - 唯一名分配器（同级同名子模块的去重）
//! - 类型名到snake_case的转换
//! - 参数树的计数/字节量统计
//! - 依赖注入式调用适配（按声明的参数名过滤关键字参数包）

use crate::tensor::Tensor;
use crate::tree::Tree;
use std::collections::{BTreeMap, BTreeSet};


// ==================== 名称分配 ====================

/// 在`used`集合中为`candidate`分配唯一名称：
/// 若已被占用则依次尝试`candidate_1`、`candidate_2`…，
/// 成功后将结果登记进集合（先到先得，顺序确定）。
pub fn get_unique_name(used: &mut BTreeSet<String>, candidate: &str) -> String {
    if used.insert(candidate.to_string()) {
        return candidate.to_string();
    }
    let mut i = 1;
    loop {
        let name = format!("{candidate}_{i}");
        if used.insert(name.clone()) {
            return name;
        }
        i += 1;
    }
}

/// 将驼峰类型名转为snake_case；连续的单字符段会被折叠
/// （`"ModuleA"` -> `"module_a"`，`"MLP"` -> `"mlp"`）
pub fn lower_snake_case(s: &str) -> String {
    let mut snake = String::new();
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() && i != 0 {
            snake.push('_');
        }
        snake.extend(ch.to_lowercase());
    }

    let parts: Vec<&str> = snake.split('_').collect();
    let mut output: Vec<String> = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        if i == 0 || parts[i - 1].len() > 1 {
            output.push((*part).to_string());
        } else if let Some(last) = output.last_mut() {
            last.push_str(part);
        }
    }
    output.join("_")
}

/// 取完整类型路径的最后一段（去掉模块前缀与泛型参数）
pub fn short_type_name(full: &str) -> &str {
    let no_generics = full.split('<').next().unwrap_or(full);
    no_generics.rsplit("::").next().unwrap_or(no_generics)
}

/// 合并多个映射；后来者的键与已有键冲突时，用唯一名分配器改名后并入
pub fn merge_with_unique_names<V: Clone>(
    first: &BTreeMap<String, V>,
    rest: &[&BTreeMap<String, V>],
) -> BTreeMap<String, V> {
    let mut output = first.clone();
    for map in rest {
        let mut used: BTreeSet<String> = output.keys().cloned().collect();
        for (name, value) in map.iter() {
            output.insert(get_unique_name(&mut used, name), value.clone());
        }
    }
    output
}

// ==================== 参数统计 ====================

/// 参数树的总元素个数
pub fn parameters_count(params: &Tree<Tensor>) -> usize {
    params.leaves().iter().map(|t| t.size()).sum()
}

/// 参数树占用的总字节数
pub fn parameters_bytes(params: &Tree<Tensor>) -> usize {
    params.leaves().iter().map(|t| t.bytes()).sum()
}

// ==================== 调用参数包与依赖注入 ====================

/// 调用参数包：位置参数 + 关键字参数
///
/// 统一两种模块风格的调用约定：模块的用户函数只声明自己需要的
/// 关键字参数，训练循环则可以往包里塞任意多余的键。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    args: Vec<Tree<Tensor>>,
    kwargs: BTreeMap<String, Tree<Tensor>>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个位置参数（builder风格）
    pub fn arg(mut self, value: impl Into<Tree<Tensor>>) -> Self {
        self.args.push(value.into());
        self
    }

    /// 追加一个关键字参数（builder风格）
    pub fn kwarg(mut self, name: &str, value: impl Into<Tree<Tensor>>) -> Self {
        self.kwargs.insert(name.to_string(), value.into());
        self
    }

    pub fn positional(&self) -> &[Tree<Tensor>] {
        &self.args
    }

    pub fn named(&self, name: &str) -> Option<&Tree<Tensor>> {
        self.kwargs.get(name)
    }

    pub fn kwargs(&self) -> &BTreeMap<String, Tree<Tensor>> {
        &self.kwargs
    }

    /// 取模块的"输入"：首个位置参数；若无位置参数且只有一个
    /// 关键字参数，则取它
    pub fn single(&self) -> Option<&Tree<Tensor>> {
        if let Some(first) = self.args.first() {
            return Some(first);
        }
        if self.kwargs.len() == 1 {
            return self.kwargs.values().next();
        }
        None
    }
}

/// 目标可调用对象声明的参数名列表
///
/// Rust没有运行期签名反射，因此由适配方显式列出目标声明的
/// 关键字参数名；`var_kwargs`表示目标带全收参数，过滤被旁路。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    declared: Vec<String>,
    var_kwargs: bool,
}

impl Signature {
    pub fn new(names: &[&str]) -> Self {
        Self {
            declared: names.iter().map(|s| (*s).to_string()).collect(),
            var_kwargs: false,
        }
    }

    /// 全收签名：所有关键字参数原样转发
    pub fn with_var_kwargs() -> Self {
        Self {
            declared: Vec::new(),
            var_kwargs: true,
        }
    }

    pub fn declares(&self, name: &str) -> bool {
        self.declared.iter().any(|n| n == name)
    }

    /// 按声明过滤调用参数包：
    /// - 位置参数原样转发，并按位消耗前缀的声明名
    /// - 关键字参数先按`rename`改名，再保留"已声明且未被位置
    ///   参数覆盖"的键；未知键静默丢弃
    /// - 全收签名时关键字参数不过滤
    pub fn filter(&self, args: &CallArgs, rename: &[(String, String)]) -> CallArgs {
        let mut kwargs = args.kwargs.clone();
        for (old, new) in rename {
            if let Some(value) = kwargs.remove(old) {
                kwargs.insert(new.clone(), value);
            }
        }

        if !self.var_kwargs {
            let n_args = args.args.len().min(self.declared.len());
            let arg_names = &self.declared[..n_args];
            let kwarg_names = &self.declared[n_args..];
            kwargs.retain(|name, _| {
                kwarg_names.iter().any(|n| n == name) && !arg_names.iter().any(|n| n == name)
            });
        }

        CallArgs {
            args: args.args.clone(),
            kwargs,
        }
    }
}

/// 依赖注入包装器：把异构签名的目标可调用对象适配到统一的
/// 调用约定上
pub struct Injected<F> {
    f: F,
    signature: Signature,
    rename: Vec<(String, String)>,
}

impl<F> Injected<F> {
    pub fn new(f: F, signature: Signature) -> Self {
        Self {
            f,
            signature,
            rename: Vec::new(),
        }
    }

    /// 调用前把关键字参数`old`改名为`new`
    pub fn rename(mut self, old: &str, new: &str) -> Self {
        self.rename.push((old.to_string(), new.to_string()));
        self
    }

    /// 过滤参数包后调用目标
    pub fn call<R>(&self, args: &CallArgs) -> R
    where
        F: Fn(&CallArgs) -> R,
    {
        (self.f)(&self.signature.filter(args, &self.rename))
    }
}
