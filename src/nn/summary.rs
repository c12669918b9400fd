/*
 * @Author       : 老董
 * @Date         : 2026-03-20
 * @Description  : 模块摘要引擎
 *
 * 在一次带记录钩子的trace里，为每个子模块调用登记一行
 * （路径、类型、输出形状、参数量），随后：
 * 1. 去重：同一路径的第二次出现不再计入参数量（共享子模块
 *    只统计一次足迹，但输出形状照常列出）；
 * 2. 按深度折叠：超过请求深度的行并入其恰好位于该深度的
 *    祖先行，参数量/字节量相加；
 * 3. 渲染：逐行输出并附总计行。
 * trace中模块抛出的任何错误原样上抛，引擎不吞错。
 */

use super::collections::ParameterCollection;
use super::generalized::{AnyModule, GeneralizedModule, TraceMode};
use crate::errors::ModuleError;
use crate::rng::RngSeq;
use crate::tensor::{DType, Tensor};
use crate::tree::{Path, Tree, direct_leaves};
use crate::utils::CallArgs;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;

/// 叶子的形状+元素类型描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeDesc {
    pub shape: Vec<usize>,
    pub dtype: DType,
}

impl From<&Tensor> for ShapeDesc {
    fn from(t: &Tensor) -> Self {
        Self {
            shape: t.shape().to_vec(),
            dtype: t.dtype(),
        }
    }
}

impl fmt::Display for ShapeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.shape, self.dtype.name())
    }
}

/// 摘要表的一行：一次子模块调用
///
/// 参数量只统计该模块"自己"直接持有的叶子；子模块的footprint
/// 由各自的行承载，折叠时再汇总到祖先。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTableEntry {
    pub path: Path,
    pub module_type_name: String,
    pub output: Tree<ShapeDesc>,
    pub trainable_count: usize,
    pub trainable_bytes: usize,
    pub non_trainable_count: usize,
    pub non_trainable_bytes: usize,
}

fn direct_footprint(tree: &Tree<Tensor>) -> (usize, usize) {
    direct_leaves(tree)
        .iter()
        .fold((0, 0), |(c, b), (_, t)| (c + t.size(), b + t.bytes()))
}

impl SummaryTableEntry {
    /// 在一次子模块调用退出时构造其摘要行。
    /// `params`是trace的整棵参数树（可训练）；`non_trainable`是
    /// 其余各集合的树；两者都只取`path`层的直接叶子。
    pub fn record(
        path: &Path,
        module_type_name: &str,
        output: &Tree<Tensor>,
        params: &Tree<Tensor>,
        non_trainable: &[&Tree<Tensor>],
    ) -> Self {
        let empty = Tree::dict();
        let own_params = params.get(path).unwrap_or(&empty);
        let (trainable_count, trainable_bytes) = direct_footprint(own_params);

        let (mut non_trainable_count, mut non_trainable_bytes) = (0, 0);
        for tree in non_trainable {
            if let Some(sub) = tree.get(path) {
                let (c, b) = direct_footprint(sub);
                non_trainable_count += c;
                non_trainable_bytes += b;
            }
        }

        Self {
            path: path.clone(),
            module_type_name: module_type_name.to_string(),
            output: output.map(&mut |t| ShapeDesc::from(t)),
            trainable_count,
            trainable_bytes,
            non_trainable_count,
            non_trainable_bytes,
        }
    }
}

/// trace内的摘要记录器
///
/// 行槽在进入作用域时预留、退出时填充，保证最终顺序是先序
/// （父行先于子行）；出错的作用域留下空槽，收尾时被丢弃。
/// 仅在单线程trace内使用。
#[derive(Debug, Default)]
pub struct SummaryRecorder {
    entries: RefCell<Vec<Option<SummaryTableEntry>>>,
}

impl SummaryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预留一个行槽，返回其编号
    pub fn begin(&self) -> usize {
        let mut entries = self.entries.borrow_mut();
        entries.push(None);
        entries.len() - 1
    }

    /// 填充先前预留的行槽
    pub fn finish(&self, slot: usize, entry: SummaryTableEntry) {
        self.entries.borrow_mut()[slot] = Some(entry);
    }

    fn into_entries(self) -> Vec<SummaryTableEntry> {
        self.entries.into_inner().into_iter().flatten().collect()
    }
}

// ==================== 引擎 ====================

/// 对未初始化的模块执行一次带记录的init trace并生成摘要；
/// 成功后模块视同已完成init。
pub fn summarize(
    module: &AnyModule,
    rng: &mut RngSeq,
    args: &CallArgs,
    depth: usize,
) -> Result<Summary, ModuleError> {
    if module.is_initialized() {
        return Err(ModuleError::InvalidOperation(
            "模块已初始化，请改用summarize_applied".to_string(),
        ));
    }
    let recorder = SummaryRecorder::new();
    module.trace(TraceMode::Init, Some(rng), false, Some(&recorder), args)?;
    module.mark_initialized();
    Ok(Summary::build(recorder.into_entries(), depth))
}

/// 对已初始化的模块以外部参数/状态执行一次带记录的apply trace
/// 并生成摘要
pub fn summarize_applied(
    module: &AnyModule,
    params: &Tree<Tensor>,
    states: &ParameterCollection,
    rng: Option<&mut RngSeq>,
    args: &CallArgs,
    depth: usize,
) -> Result<Summary, ModuleError> {
    if !module.is_initialized() {
        return Err(ModuleError::UninitializedModule);
    }
    let recorder = SummaryRecorder::new();
    module.trace(
        TraceMode::Apply { params, states },
        rng,
        false,
        Some(&recorder),
        args,
    )?;
    Ok(Summary::build(recorder.into_entries(), depth))
}

/// 去重、折叠后的摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub depth: usize,
    pub rows: Vec<SummaryTableEntry>,
    pub trainable_count: usize,
    pub trainable_bytes: usize,
    pub non_trainable_count: usize,
    pub non_trainable_bytes: usize,
}

impl Summary {
    fn build(mut entries: Vec<SummaryTableEntry>, depth: usize) -> Self {
        // 1. 去重：同一路径的第二次出现清零参数量（输出形状保留）
        let mut seen: BTreeSet<Path> = BTreeSet::new();
        for entry in &mut entries {
            if !seen.insert(entry.path.clone()) {
                entry.trainable_count = 0;
                entry.trainable_bytes = 0;
                entry.non_trainable_count = 0;
                entry.non_trainable_bytes = 0;
            }
        }

        // 2. 折叠：深于请求深度的行并入恰好位于该深度的祖先行。
        //    先序保证祖先行总在前面；同路径多次出现时并入最近一次。
        let mut rows: Vec<SummaryTableEntry> = Vec::new();
        for entry in entries {
            if entry.path.depth() <= depth {
                rows.push(entry);
            } else {
                let ancestor = entry.path.truncated(depth);
                if let Some(row) = rows.iter_mut().rev().find(|r| r.path == ancestor) {
                    row.trainable_count += entry.trainable_count;
                    row.trainable_bytes += entry.trainable_bytes;
                    row.non_trainable_count += entry.non_trainable_count;
                    row.non_trainable_bytes += entry.non_trainable_bytes;
                }
            }
        }

        // 3. 总计：折叠后的行恰好构成整棵树足迹的一个划分
        let (trainable_count, trainable_bytes, non_trainable_count, non_trainable_bytes) =
            rows.iter().fold((0, 0, 0, 0), |(tc, tb, nc, nb), r| {
                (
                    tc + r.trainable_count,
                    tb + r.trainable_bytes,
                    nc + r.non_trainable_count,
                    nb + r.non_trainable_bytes,
                )
            });

        Self {
            depth,
            rows,
            trainable_count,
            trainable_bytes,
            non_trainable_count,
            non_trainable_bytes,
        }
    }

    /// 渲染成对齐的纯文本表格
    pub fn render(&self) -> String {
        let header = ["路径", "类型", "输出", "可训练参数", "非可训练参数"];
        let mut cells: Vec<[String; 5]> = Vec::with_capacity(self.rows.len() + 1);

        for row in &self.rows {
            let path_cell = if row.path.is_root() {
                row.module_type_name.clone()
            } else {
                format!("{}{}", "  ".repeat(row.path.depth()), row.path)
            };
            cells.push([
                path_cell,
                row.module_type_name.clone(),
                render_output(&row.output),
                format_count_and_size(row.trainable_count, row.trainable_bytes),
                format_count_and_size(row.non_trainable_count, row.non_trainable_bytes),
            ]);
        }
        cells.push([
            "总计".to_string(),
            String::new(),
            String::new(),
            format_count_and_size(self.trainable_count, self.trainable_bytes),
            format_count_and_size(self.non_trainable_count, self.non_trainable_bytes),
        ]);

        let widths: Vec<usize> = (0..header.len())
            .map(|col| {
                cells
                    .iter()
                    .map(|row| row[col].chars().count())
                    .chain(std::iter::once(header[col].chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();
        let total_width: usize = widths.iter().sum::<usize>() + 2 * (header.len() - 1);

        let fmt_row = |row: &[String]| -> String {
            row.iter()
                .enumerate()
                .map(|(i, cell)| {
                    let pad = widths[i].saturating_sub(cell.chars().count());
                    format!("{}{}", cell, " ".repeat(pad))
                })
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let mut out = String::new();
        out.push_str(&fmt_row(&header.map(String::from)));
        out.push('\n');
        out.push_str(&"─".repeat(total_width));
        out.push('\n');
        for (i, row) in cells.iter().enumerate() {
            if i == cells.len() - 1 {
                out.push_str(&"─".repeat(total_width));
                out.push('\n');
            }
            out.push_str(&fmt_row(row));
            out.push('\n');
        }
        out.push_str(&format!(
            "总参数量（含状态）：{}  {}\n",
            self.trainable_count + self.non_trainable_count,
            format_size(self.trainable_bytes + self.non_trainable_bytes)
        ));
        out
    }

    /// 转换为 JSON 字符串
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// 从 JSON 字符串解析
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

fn render_output(output: &Tree<ShapeDesc>) -> String {
    output
        .leaves()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// 参数量单元格："{个数}  {字节量}"，零个数渲染为空
pub fn format_count_and_size(count: usize, bytes: usize) -> String {
    if count == 0 {
        String::new()
    } else {
        format!("{}  {}", count, format_size(bytes))
    }
}

/// 按量级选择单位后缀：>1e9→GB、>1e6→MB、>1e3→KB、否则B；
/// KB/MB/GB保留一位小数，B取整数
pub fn format_size(size: usize) -> String {
    if size > 1_000_000_000 {
        format!("{:.1} GB", size as f64 / 1e9)
    } else if size > 1_000_000 {
        format!("{:.1} MB", size as f64 / 1e6)
    } else if size > 1_000 {
        format!("{:.1} KB", size as f64 / 1e3)
    } else {
        format!("{size} B")
    }
}
