/*
 * @Author       : 老董
 * @Date         : 2026-03-12
 * @Description  : 命令式（闭包注册）风格的模块适配器
 *
 * 用户函数在一次trace内，通过TraceCtx命令式地登记命名参数与命名
 * 状态，并可在同一次调用中更新状态。init阶段以占位初始化器执行
 * 一次trace，把登记到的参数/状态按路径收进两套集合；apply阶段
 * 重放trace，登记读取直接返回外部提供的值，set_state产生的变更
 * 汇成新的状态集合返回。
 *
 * 状态返回值的约定：init返回各状态"首次登记"的值（trace内的
 * set_state不影响init的返回），apply返回set_state之后的值。
 */

use super::collections::{ParameterCollection, STATES, States};
use super::generalized::{GeneralizedModule, TraceMode};
use super::init::Init;
use super::summary::{SummaryRecorder, SummaryTableEntry};
use crate::errors::ModuleError;
use crate::rng::RngSeq;
use crate::tensor::Tensor;
use crate::tree::{Path, Tree};
use crate::utils::{CallArgs, Signature, get_unique_name};
use rand::rngs::StdRng;
use std::cell::Cell;
use std::collections::BTreeSet;

/// 一次trace的记录/替换上下文
///
/// init模式下是"记录上下文"：登记(路径, 形状)并生成初值；
/// apply模式下是"替换上下文"：按路径查外部提供的值。
/// 生命周期只覆盖一次trace，名称去重状态也只在本次trace内有效。
pub struct TraceCtx<'a> {
    initializing: bool,
    training: bool,
    rng: Option<&'a mut RngSeq>,
    path: Path,
    used_names: Vec<BTreeSet<String>>,
    params: Tree<Tensor>,
    init_states: Tree<Tensor>,
    states_now: Tree<Tensor>,
    recorder: Option<&'a SummaryRecorder>,
}

impl TraceCtx<'_> {
    /// 本次trace是否处于训练模式
    pub const fn training(&self) -> bool {
        self.training
    }

    /// 本次trace是否处于初始化模式
    pub const fn is_initializing(&self) -> bool {
        self.initializing
    }

    /// 从键序列派生一个StdRng（dropout等随机算子用）
    pub fn next_rng(&mut self) -> Result<StdRng, ModuleError> {
        match self.rng.as_deref_mut() {
            Some(seq) => Ok(seq.next_rng()),
            None => Err(ModuleError::InvalidOperation(
                "本次trace未提供rng".to_string(),
            )),
        }
    }

    /// 登记/读取当前作用域下的命名参数
    ///
    /// - init模式：首次登记时用`init`生成初值；同路径重复登记返回
    ///   已有值，形状不一致报`ShapeMismatch`
    /// - apply模式：返回外部提供的值；缺路径报`MissingParameter`
    pub fn get_parameter(
        &mut self,
        name: &str,
        shape: &[usize],
        init: &Init,
    ) -> Result<Tensor, ModuleError> {
        let path = self.path.child(name);

        if self.initializing {
            if let Some(existing) = self.params.get_leaf(&path) {
                if existing.shape() != shape {
                    return Err(ModuleError::ShapeMismatch {
                        path: path.to_string(),
                        expected: existing.shape().to_vec(),
                        got: shape.to_vec(),
                    });
                }
                return Ok(existing.clone());
            }
            let mut rng = self.next_rng()?;
            let value = init.generate(shape, &mut rng);
            self.params.insert(&path, value.clone())?;
            Ok(value)
        } else {
            let Some(value) = self.params.get_leaf(&path) else {
                return Err(ModuleError::MissingParameter {
                    path: path.to_string(),
                });
            };
            if value.shape() != shape {
                return Err(ModuleError::ShapeMismatch {
                    path: path.to_string(),
                    expected: shape.to_vec(),
                    got: value.shape().to_vec(),
                });
            }
            Ok(value.clone())
        }
    }

    /// 登记/读取当前作用域下的命名状态
    ///
    /// 同一次trace内先前的`set_state`对读取可见。
    pub fn get_state(
        &mut self,
        name: &str,
        shape: &[usize],
        init: &Init,
    ) -> Result<Tensor, ModuleError> {
        let path = self.path.child(name);

        if let Some(existing) = self.states_now.get_leaf(&path) {
            if existing.shape() != shape {
                return Err(ModuleError::ShapeMismatch {
                    path: path.to_string(),
                    expected: shape.to_vec(),
                    got: existing.shape().to_vec(),
                });
            }
            return Ok(existing.clone());
        }

        if self.initializing {
            let mut rng = self.next_rng()?;
            let value = init.generate(shape, &mut rng);
            self.init_states.insert(&path, value.clone())?;
            self.states_now.insert(&path, value.clone())?;
            Ok(value)
        } else {
            Err(ModuleError::MissingParameter {
                path: path.to_string(),
            })
        }
    }

    /// 更新当前作用域下的命名状态；后续读取返回新值
    pub fn set_state(&mut self, name: &str, value: Tensor) -> Result<(), ModuleError> {
        let path = self.path.child(name);
        // init模式下，未经get_state直接set视作创建事件，计入初始状态
        if self.initializing && self.init_states.get_leaf(&path).is_none() {
            self.init_states.insert(&path, value.clone())?;
        }
        self.states_now.insert(&path, value)
    }

    /// 进入命名子作用域执行`f`；重入同名作用域共享其中的登记。
    /// 摘要记录器存在时，每次进入都会登记一行。
    pub fn scope(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Self) -> Result<Tree<Tensor>, ModuleError>,
    ) -> Result<Tree<Tensor>, ModuleError> {
        if let Some(level) = self.used_names.last_mut() {
            level.insert(name.to_string());
        }
        self.run_scope(name, f)
    }

    /// 进入自动去重命名的子作用域：同级同名候选依次得到
    /// `name`、`name_1`、`name_2`…（先到先得）
    pub fn unique_scope(
        &mut self,
        candidate: &str,
        f: impl FnOnce(&mut Self) -> Result<Tree<Tensor>, ModuleError>,
    ) -> Result<Tree<Tensor>, ModuleError> {
        let name = {
            let level = self
                .used_names
                .last_mut()
                .expect("scope栈不应为空");
            get_unique_name(level, candidate)
        };
        self.run_scope(&name, f)
    }

    fn run_scope(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Self) -> Result<Tree<Tensor>, ModuleError>,
    ) -> Result<Tree<Tensor>, ModuleError> {
        self.path.push(name);
        self.used_names.push(BTreeSet::new());
        let slot = self.recorder.map(SummaryRecorder::begin);

        let result = f(self);

        self.used_names.pop();
        let path = self.path.clone();
        self.path.pop();

        if let (Some(recorder), Some(slot)) = (self.recorder, slot) {
            if let Ok(output) = &result {
                recorder.finish(
                    slot,
                    SummaryTableEntry::record(
                        &path,
                        name,
                        output,
                        &self.params,
                        &[&self.states_now],
                    ),
                );
            }
        }
        result
    }
}

/// 命令式风格模块的包装器
pub struct ImperativeModule {
    name: String,
    forward: Box<dyn Fn(&mut TraceCtx<'_>, &CallArgs) -> Result<Tree<Tensor>, ModuleError>>,
    signature: Signature,
    initialized: Cell<bool>,
}

impl ImperativeModule {
    /// 包装一个用户函数；关键字参数不过滤（全收签名）
    pub fn new(
        name: &str,
        forward: impl Fn(&mut TraceCtx<'_>, &CallArgs) -> Result<Tree<Tensor>, ModuleError> + 'static,
    ) -> Self {
        Self::with_signature(name, forward, Signature::with_var_kwargs())
    }

    /// 包装一个用户函数并声明其接受的关键字参数名；
    /// trace前按声明过滤参数包（未知键静默丢弃）
    pub fn with_signature(
        name: &str,
        forward: impl Fn(&mut TraceCtx<'_>, &CallArgs) -> Result<Tree<Tensor>, ModuleError> + 'static,
        signature: Signature,
    ) -> Self {
        Self {
            name: name.to_string(),
            forward: Box::new(forward),
            signature,
            initialized: Cell::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ImperativeModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImperativeModule")
            .field("name", &self.name)
            .field("initialized", &self.initialized.get())
            .finish_non_exhaustive()
    }
}

impl GeneralizedModule for ImperativeModule {
    fn module_name(&self) -> String {
        self.name.clone()
    }

    fn is_initialized(&self) -> bool {
        self.initialized.get()
    }

    fn mark_initialized(&self) {
        self.initialized.set(true);
    }

    fn reset(&self) {
        self.initialized.set(false);
    }

    fn trace(
        &self,
        mode: TraceMode<'_>,
        rng: Option<&mut RngSeq>,
        training: bool,
        recorder: Option<&SummaryRecorder>,
        args: &CallArgs,
    ) -> Result<(Tree<Tensor>, States), ModuleError> {
        let filtered = self.signature.filter(args, &[]);

        let (params, states_in) = match mode {
            TraceMode::Init => (Tree::dict(), ParameterCollection::new()),
            TraceMode::Apply { params, states } => (params.clone(), states.clone()),
        };
        let states_now = states_in.get(STATES).cloned().unwrap_or_default();

        let mut ctx = TraceCtx {
            initializing: mode.is_initializing(),
            training,
            rng,
            path: Path::root(),
            used_names: vec![BTreeSet::new()],
            params,
            init_states: Tree::dict(),
            states_now,
            recorder,
        };

        // 整个用户函数在以模块名命名的根作用域内执行，
        // 参数树因此嵌套在模块名之下
        let root_slot = recorder.map(SummaryRecorder::begin);
        let output = ctx.scope(&self.name, |ctx| (self.forward)(ctx, &filtered))?;

        let states_tree = if ctx.initializing {
            ctx.init_states.clone()
        } else {
            ctx.states_now.clone()
        };
        let mut states_out = states_in;
        if !states_tree.is_empty() {
            states_out.insert(STATES.to_string(), states_tree);
        }

        if let (Some(recorder), Some(slot)) = (recorder, root_slot) {
            recorder.finish(
                slot,
                SummaryTableEntry::record(
                    &Path::root(),
                    &self.name,
                    &output,
                    &ctx.params,
                    &[&ctx.states_now],
                ),
            );
        }

        Ok((output, States::new(ctx.params, states_out)))
    }
}
