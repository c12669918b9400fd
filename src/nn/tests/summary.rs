/*
 * @Description  : 摘要引擎单元测试
 *
 * 嵌套模块A->B->C（参数/状态均为int32，便于核对字节量）：
 * - A: a1[1]参数, a2[2]状态
 * - B: b1[3]参数, b2[4]状态
 * - C: c1[5]参数, c2[6]状态
 * depth=1时C并入B行：可训练8个/32 B，非可训练10个/40 B；
 * 总计可训练9/36 B，非可训练12/48 B，合计21/84 B。
 */

use crate::errors::ModuleError;
use crate::nn::{
    DeclarativeModule, GeneralizedModule, ImperativeModule, Init, ModuleValue, Scope, Summary,
    format_count_and_size, format_size, generalize, summarize, summarize_applied,
};
use crate::rng::RngSeq;
use crate::tensor::Tensor;
use crate::tree::{Path, Tree};
use crate::utils::CallArgs;

struct ModuleC;

impl DeclarativeModule for ModuleC {
    fn call(
        &self,
        scope: &mut Scope<'_, '_>,
        input: &Tree<Tensor>,
    ) -> Result<Tree<Tensor>, ModuleError> {
        let Tree::Leaf(x) = input else {
            return Err(ModuleError::InvalidOperation("缺少输入".to_string()));
        };
        let _c1 = scope.param("c1", &[5], &Init::OnesI32)?;
        let _c2 = scope.variable("states", "c2", &[6], &Init::OnesI32)?;
        Ok(Tree::leaf(x.relu()))
    }
}

struct ModuleB;

impl DeclarativeModule for ModuleB {
    fn call(
        &self,
        scope: &mut Scope<'_, '_>,
        input: &Tree<Tensor>,
    ) -> Result<Tree<Tensor>, ModuleError> {
        let _b1 = scope.param("b1", &[3], &Init::OnesI32)?;
        let _b2 = scope.variable("states", "b2", &[4], &Init::OnesI32)?;
        let x = scope.child(&ModuleC, input)?;
        let Tree::Leaf(x) = x else {
            return Err(ModuleError::InvalidOperation("输出应是张量".to_string()));
        };
        Ok(Tree::leaf(x.relu()))
    }
}

struct ModuleA;

impl DeclarativeModule for ModuleA {
    fn call(
        &self,
        scope: &mut Scope<'_, '_>,
        input: &Tree<Tensor>,
    ) -> Result<Tree<Tensor>, ModuleError> {
        let _a1 = scope.param("a1", &[1], &Init::OnesI32)?;
        let _a2 = scope.variable("states", "a2", &[2], &Init::OnesI32)?;
        let x = scope.child(&ModuleB, input)?;
        let Tree::Leaf(x) = x else {
            return Err(ModuleError::InvalidOperation("输出应是张量".to_string()));
        };
        Ok(Tree::leaf(x.relu()))
    }
}

fn batch_args() -> CallArgs {
    CallArgs::new().arg(Tensor::ones(&[10, 2]))
}

/// 测试depth=1的折叠与总计
#[test]
fn test_nested_summary_depth_folding() {
    let gm = generalize(ModuleValue::declarative(ModuleA)).unwrap();
    let mut rng = RngSeq::new(42);

    let summary = summarize(&gm, &mut rng, &batch_args(), 1).unwrap();

    // 根行（A自己）+ module_b行（并入了module_c）
    assert_eq!(summary.rows.len(), 2);

    let root = &summary.rows[0];
    assert!(root.path.is_root());
    assert_eq!(root.module_type_name, "ModuleA");
    assert_eq!(root.trainable_count, 1);
    assert_eq!(root.trainable_bytes, 4);
    assert_eq!(root.non_trainable_count, 2);
    assert_eq!(root.non_trainable_bytes, 8);

    let b = &summary.rows[1];
    assert_eq!(b.path, Path::root().child("module_b"));
    assert_eq!(b.module_type_name, "ModuleB");
    assert_eq!(b.trainable_count, 8, "c1并入b1：3+5");
    assert_eq!(b.trainable_bytes, 32);
    assert_eq!(b.non_trainable_count, 10, "c2并入b2：4+6");
    assert_eq!(b.non_trainable_bytes, 40);

    // 总计
    assert_eq!(summary.trainable_count, 9);
    assert_eq!(summary.trainable_bytes, 36);
    assert_eq!(summary.non_trainable_count, 12);
    assert_eq!(summary.non_trainable_bytes, 48);

    // 摘要成功后模块视同已init
    assert!(gm.is_initialized());
}

/// 测试depth=2保留三行且每行只含自己的直接参数
#[test]
fn test_nested_summary_full_depth() {
    let gm = generalize(ModuleValue::declarative(ModuleA)).unwrap();
    let mut rng = RngSeq::new(42);

    let summary = summarize(&gm, &mut rng, &batch_args(), 2).unwrap();

    assert_eq!(summary.rows.len(), 3);
    assert_eq!(
        summary.rows[2].path,
        Path::root().child("module_b").child("module_c")
    );
    assert_eq!(summary.rows[1].trainable_count, 3, "depth=2时B只含b1");
    assert_eq!(summary.rows[2].trainable_count, 5);
    // 输出形状照常记录
    assert_eq!(
        summary.rows[2].output.leaves()[0].shape,
        vec![10, 2]
    );

    // 总计与depth无关
    assert_eq!(summary.trainable_count, 9);
    assert_eq!(summary.non_trainable_count, 12);
}

/// 测试渲染：包含各行数字与总计行
#[test]
fn test_render_contains_expected_figures() {
    let gm = generalize(ModuleValue::declarative(ModuleA)).unwrap();
    let mut rng = RngSeq::new(42);

    let text = summarize(&gm, &mut rng, &batch_args(), 1).unwrap().render();

    assert!(text.contains("module_b"), "应包含子模块路径：\n{text}");
    assert!(text.contains("8  32 B"), "B行可训练参数：\n{text}");
    assert!(text.contains("10  40 B"), "B行非可训练参数：\n{text}");
    assert!(text.contains("[10, 2] float32"), "输出形状描述：\n{text}");
    assert!(
        text.contains("总参数量（含状态）：21  84 B"),
        "合计行：\n{text}"
    );
}

/// 测试字节量格式化的阈值与小数位（5个int32=20 B，1500个int32=6.0 KB）
#[test]
fn test_format_size_thresholds() {
    assert_eq!(format_size(20), "20 B");
    assert_eq!(format_size(1000), "1000 B");
    assert_eq!(format_size(6000), "6.0 KB");
    assert_eq!(format_size(2_500_000), "2.5 MB");
    assert_eq!(format_size(3_200_000_000), "3.2 GB");

    assert_eq!(format_count_and_size(5, 20), "5  20 B");
    assert_eq!(format_count_and_size(1500, 6000), "1500  6.0 KB");
    assert_eq!(format_count_and_size(0, 0), "", "零个数渲染为空");
}

/// 大参数块在摘要中以KB呈现
struct BigParam;

impl DeclarativeModule for BigParam {
    fn call(
        &self,
        scope: &mut Scope<'_, '_>,
        input: &Tree<Tensor>,
    ) -> Result<Tree<Tensor>, ModuleError> {
        let _k = scope.param("k", &[1500], &Init::ZerosI32)?;
        Ok(input.clone())
    }
}

#[test]
fn test_summary_kb_scale() {
    let gm = generalize(ModuleValue::declarative(BigParam)).unwrap();
    let mut rng = RngSeq::new(1);

    let summary = summarize(&gm, &mut rng, &batch_args(), 0).unwrap();
    assert_eq!(summary.trainable_count, 1500);
    assert_eq!(summary.trainable_bytes, 6000);
    assert!(summary.render().contains("1500  6.0 KB"));
}

/// 共享子模块：同一名称两处调用
struct SharedLeaf;

impl DeclarativeModule for SharedLeaf {
    fn call(
        &self,
        scope: &mut Scope<'_, '_>,
        input: &Tree<Tensor>,
    ) -> Result<Tree<Tensor>, ModuleError> {
        let _w = scope.param("w", &[2], &Init::Ones)?;
        Ok(input.clone())
    }
}

struct SharingRoot;

impl DeclarativeModule for SharingRoot {
    fn call(
        &self,
        scope: &mut Scope<'_, '_>,
        input: &Tree<Tensor>,
    ) -> Result<Tree<Tensor>, ModuleError> {
        let h = scope.child_named("shared", &SharedLeaf, input)?;
        scope.child_named("shared", &SharedLeaf, &h)
    }
}

/// 测试去重：共享子模块第二次出现参数量清零，但输出形状照常列出
#[test]
fn test_shared_submodule_deduplicated() {
    let gm = generalize(ModuleValue::declarative(SharingRoot)).unwrap();
    let mut rng = RngSeq::new(42);

    let summary = summarize(&gm, &mut rng, &batch_args(), 3).unwrap();

    let shared_rows: Vec<_> = summary
        .rows
        .iter()
        .filter(|r| r.path == Path::root().child("shared"))
        .collect();
    assert_eq!(shared_rows.len(), 2, "两次调用各列一行");
    assert_eq!(shared_rows[0].trainable_count, 2);
    assert_eq!(shared_rows[1].trainable_count, 0, "第二次出现不再计参数量");
    assert_eq!(shared_rows[1].output.leaves().len(), 1, "输出形状照常记录");

    // 足迹只统计一次
    assert_eq!(summary.trainable_count, 2);
}

/// 测试命令式模块的摘要路径
#[test]
fn test_imperative_summary() {
    let gm = generalize(ImperativeModule::new("m", |ctx, args| {
        let Some(Tree::Leaf(x)) = args.named("x") else {
            return Err(ModuleError::InvalidOperation("缺少输入x".to_string()));
        };
        let n = ctx.get_state("n", &[], &Init::ZerosI32)?;
        let w = ctx.get_parameter("w", &[], &Init::Constant(2.0))?;
        ctx.set_state("n", &n + 1)?;
        Ok(Tree::leaf(x * &w))
    }))
    .unwrap();
    let mut rng = RngSeq::new(42);
    let args = CallArgs::new().kwarg("x", Tensor::scalar(3.0));

    let summary = summarize(&gm, &mut rng, &args, 1).unwrap();

    // 根行 + 模块作用域行
    assert_eq!(summary.rows.len(), 2);
    assert_eq!(summary.rows[1].path, Path::root().child("m"));
    assert_eq!(summary.trainable_count, 1);
    assert_eq!(summary.non_trainable_count, 1);
}

/// 测试引擎的生命周期约束与JSON往返
#[test]
fn test_engine_lifecycle_and_json() {
    let gm = generalize(ModuleValue::declarative(ModuleA)).unwrap();
    let mut rng = RngSeq::new(42);

    // init前summarize_applied报未初始化
    let err = summarize_applied(
        &gm,
        &Tree::dict(),
        &Default::default(),
        None,
        &batch_args(),
        1,
    )
    .unwrap_err();
    assert_eq!(err, ModuleError::UninitializedModule);

    let summary = summarize(&gm, &mut rng, &batch_args(), 1).unwrap();

    // 已初始化后再summarize报无效操作
    let err = summarize(&gm, &mut rng, &batch_args(), 1).unwrap_err();
    assert!(matches!(err, ModuleError::InvalidOperation(_)));

    // JSON往返
    let json = summary.to_json().unwrap();
    let parsed = Summary::from_json(&json).unwrap();
    assert_eq!(parsed, summary);
}

/// 测试summarize_applied：以外部参数/状态重放并生成摘要
#[test]
fn test_summarize_applied() {
    let gm = generalize(ModuleValue::declarative(ModuleA)).unwrap();
    let mut rng = RngSeq::new(42);
    let (_, states) = gm.init(&mut rng, &batch_args()).unwrap();

    let summary =
        summarize_applied(&gm, &states.params, &states.states, None, &batch_args(), 1).unwrap();
    assert_eq!(summary.trainable_count, 9);
    assert_eq!(summary.non_trainable_count, 12);
}

/// trace中途出错的模块
struct Exploding;

impl DeclarativeModule for Exploding {
    fn call(
        &self,
        scope: &mut Scope<'_, '_>,
        _input: &Tree<Tensor>,
    ) -> Result<Tree<Tensor>, ModuleError> {
        let _w = scope.param("w", &[2], &Init::Ones)?;
        Err(ModuleError::InvalidOperation("模块内部错误".to_string()))
    }
}

/// 测试模块抛错时引擎原样上抛（不吞错）
#[test]
fn test_engine_surfaces_module_error() {
    let gm = generalize(ModuleValue::declarative(Exploding)).unwrap();
    let mut rng = RngSeq::new(42);

    let err = summarize(&gm, &mut rng, &batch_args(), 1).unwrap_err();
    assert_eq!(
        err,
        ModuleError::InvalidOperation("模块内部错误".to_string())
    );
    assert!(!gm.is_initialized(), "失败的摘要不应标记init完成");
}
