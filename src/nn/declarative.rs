/*
 * @Author       : 老董
 * @Date         : 2026-03-16
 * @Description  : 声明式（惰性绑定）风格的模块适配器
 *
 * 用户以结构体实现DeclarativeModule：参数在call内通过Scope首次
 * 调用时惰性绑定，可变值以命名集合（区别于"parameters"）登记，
 * 并可查询是否已存在。init触发一次惰性绑定得到完整参数树与各
 * 集合初值；apply以外部提供的值重新绑定，调用期间集合可变，
 * 被重新赋值的集合以新值返回。与命令式适配器的init/apply契约
 * 完全对称，仅登记方式不同。
 */

use super::collections::{ParameterCollection, States};
use super::generalized::{GeneralizedModule, TraceMode};
use super::init::Init;
use super::summary::{SummaryRecorder, SummaryTableEntry};
use crate::errors::ModuleError;
use crate::rng::RngSeq;
use crate::tensor::Tensor;
use crate::tree::{Path, Tree};
use crate::utils::{CallArgs, get_unique_name, lower_snake_case, short_type_name};
use rand::rngs::StdRng;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

/// 声明式模块契约
///
/// 实现者是普通结构体（可持有配置字段与子模块字段），
/// 前向逻辑写在`call`里，参数/变量通过Scope惰性绑定。
pub trait DeclarativeModule {
    /// 模块类型名（摘要表用），默认取类型名的最后一段
    fn type_name(&self) -> String {
        short_type_name(std::any::type_name::<Self>()).to_string()
    }

    /// 模块实例的默认名称，默认为类型名的snake_case
    fn name(&self) -> String {
        lower_snake_case(&self.type_name())
    }

    /// 紧凑定义式前向：参数与变量在调用内绑定
    fn call(
        &self,
        scope: &mut Scope<'_, '_>,
        input: &Tree<Tensor>,
    ) -> Result<Tree<Tensor>, ModuleError>;
}

/// 变量句柄：指向某个命名集合中的一个可变槽位
///
/// 同一槽位的所有句柄共享存储；`set`的效果对本次trace内的
/// 后续读取可见，并在trace结束时汇入返回的集合。
#[derive(Clone)]
pub struct Variable {
    collection: String,
    path: Path,
    slot: Rc<RefCell<Tensor>>,
}

impl Variable {
    /// 读取当前值
    pub fn value(&self) -> Tensor {
        self.slot.borrow().clone()
    }

    /// 重新赋值
    pub fn set(&self, value: Tensor) {
        *self.slot.borrow_mut() = value;
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// 一次trace的绑定状态（Scope是它的薄借用封装）
struct BindCtx<'a> {
    initializing: bool,
    training: bool,
    rng: Option<&'a mut RngSeq>,
    path: Path,
    used_names: Vec<BTreeSet<String>>,
    params: Tree<Tensor>,
    supplied: Option<&'a ParameterCollection>,
    slots: BTreeMap<(String, Path), Rc<RefCell<Tensor>>>,
    recorder: Option<&'a SummaryRecorder>,
}

impl BindCtx<'_> {
    fn next_rng(&mut self) -> Result<StdRng, ModuleError> {
        match self.rng.as_deref_mut() {
            Some(seq) => Ok(seq.next_rng()),
            None => Err(ModuleError::InvalidOperation(
                "本次trace未提供rng".to_string(),
            )),
        }
    }

    /// 把登记的变量槽按集合名汇成参数树集（取槽位当前值）
    fn collection_trees(&self) -> Result<ParameterCollection, ModuleError> {
        let mut out = ParameterCollection::new();
        for ((collection, path), slot) in &self.slots {
            out.entry(collection.clone())
                .or_insert_with(Tree::dict)
                .insert(path, slot.borrow().clone())?;
        }
        Ok(out)
    }
}

/// 声明式模块的绑定作用域
pub struct Scope<'c, 'a> {
    ctx: &'c mut BindCtx<'a>,
}

impl Scope<'_, '_> {
    /// 本次trace是否处于训练模式
    pub fn training(&self) -> bool {
        self.ctx.training
    }

    /// 本次trace是否处于初始化模式
    pub fn is_initializing(&self) -> bool {
        self.ctx.initializing
    }

    /// 从键序列派生一个StdRng
    pub fn next_rng(&mut self) -> Result<StdRng, ModuleError> {
        self.ctx.next_rng()
    }

    /// 惰性绑定当前作用域下的命名参数
    ///
    /// 首次调用生成初值；同路径再次绑定返回已有值，形状不一致
    /// 报`ShapeMismatch`；apply模式缺路径报`MissingParameter`。
    pub fn param(&mut self, name: &str, shape: &[usize], init: &Init) -> Result<Tensor, ModuleError> {
        let path = self.ctx.path.child(name);

        if let Some(existing) = self.ctx.params.get_leaf(&path) {
            if existing.shape() != shape {
                return Err(ModuleError::ShapeMismatch {
                    path: path.to_string(),
                    expected: existing.shape().to_vec(),
                    got: shape.to_vec(),
                });
            }
            return Ok(existing.clone());
        }

        if self.ctx.initializing {
            let mut rng = self.ctx.next_rng()?;
            let value = init.generate(shape, &mut rng);
            self.ctx.params.insert(&path, value.clone())?;
            Ok(value)
        } else {
            Err(ModuleError::MissingParameter {
                path: path.to_string(),
            })
        }
    }

    /// 把一个可变值声明进命名集合，返回其句柄
    ///
    /// init模式下首次声明用`init`生成初值；apply模式下以外部
    /// 提供的集合值填充槽位。同一路径的重复声明共享槽位。
    pub fn variable(
        &mut self,
        collection: &str,
        name: &str,
        shape: &[usize],
        init: &Init,
    ) -> Result<Variable, ModuleError> {
        let path = self.ctx.path.child(name);
        let key = (collection.to_string(), path.clone());

        if let Some(slot) = self.ctx.slots.get(&key) {
            let got = slot.borrow().shape().to_vec();
            if got != shape {
                return Err(ModuleError::ShapeMismatch {
                    path: format!("{collection}/{path}"),
                    expected: shape.to_vec(),
                    got,
                });
            }
            return Ok(Variable {
                collection: collection.to_string(),
                path,
                slot: Rc::clone(slot),
            });
        }

        let value = if self.ctx.initializing {
            let mut rng = self.ctx.next_rng()?;
            init.generate(shape, &mut rng)
        } else {
            let supplied = self
                .ctx
                .supplied
                .and_then(|c| c.get(collection))
                .and_then(|t| t.get_leaf(&path));
            let Some(value) = supplied else {
                return Err(ModuleError::MissingParameter {
                    path: format!("{collection}/{path}"),
                });
            };
            if value.shape() != shape {
                return Err(ModuleError::ShapeMismatch {
                    path: format!("{collection}/{path}"),
                    expected: shape.to_vec(),
                    got: value.shape().to_vec(),
                });
            }
            value.clone()
        };

        let slot = Rc::new(RefCell::new(value));
        self.ctx.slots.insert(key, Rc::clone(&slot));
        Ok(Variable {
            collection: collection.to_string(),
            path,
            slot,
        })
    }

    /// 查询命名集合中某个变量是否已存在
    /// （首次绑定trace中、尚未声明时为false）
    pub fn has_variable(&self, collection: &str, name: &str) -> bool {
        let path = self.ctx.path.child(name);
        if self
            .ctx
            .slots
            .contains_key(&(collection.to_string(), path.clone()))
        {
            return true;
        }
        self.ctx
            .supplied
            .and_then(|c| c.get(collection))
            .and_then(|t| t.get_leaf(&path))
            .is_some()
    }

    /// 以自动去重的名称调用子模块（同级同类型依次得到
    /// `linear`、`linear_1`…）
    pub fn child(
        &mut self,
        module: &dyn DeclarativeModule,
        input: &Tree<Tensor>,
    ) -> Result<Tree<Tensor>, ModuleError> {
        let name = {
            let level = self
                .ctx
                .used_names
                .last_mut()
                .expect("scope栈不应为空");
            get_unique_name(level, &module.name())
        };
        self.run_child(&name, module, input)
    }

    /// 以指定名称调用子模块；两处调用同一名称即共享同一参数子树
    pub fn child_named(
        &mut self,
        name: &str,
        module: &dyn DeclarativeModule,
        input: &Tree<Tensor>,
    ) -> Result<Tree<Tensor>, ModuleError> {
        if let Some(level) = self.ctx.used_names.last_mut() {
            level.insert(name.to_string());
        }
        self.run_child(name, module, input)
    }

    fn run_child(
        &mut self,
        name: &str,
        module: &dyn DeclarativeModule,
        input: &Tree<Tensor>,
    ) -> Result<Tree<Tensor>, ModuleError> {
        self.ctx.path.push(name);
        self.ctx.used_names.push(BTreeSet::new());
        let slot = self.ctx.recorder.map(SummaryRecorder::begin);

        let result = {
            let mut sub = Scope { ctx: &mut *self.ctx };
            module.call(&mut sub, input)
        };

        self.ctx.used_names.pop();
        let path = self.ctx.path.clone();
        self.ctx.path.pop();

        if let (Some(recorder), Some(slot)) = (self.ctx.recorder, slot) {
            if let Ok(output) = &result {
                let state_trees = self.ctx.collection_trees()?;
                let refs: Vec<&Tree<Tensor>> = state_trees.values().collect();
                recorder.finish(
                    slot,
                    SummaryTableEntry::record(&path, &module.type_name(), output, &self.ctx.params, &refs),
                );
            }
        }
        result
    }
}

/// 声明式模块的泛化适配器
pub struct DeclarativeAdapter {
    module: Box<dyn DeclarativeModule>,
    initialized: Cell<bool>,
}

impl DeclarativeAdapter {
    pub fn new(module: impl DeclarativeModule + 'static) -> Self {
        Self::from_boxed(Box::new(module))
    }

    pub fn from_boxed(module: Box<dyn DeclarativeModule>) -> Self {
        Self {
            module,
            initialized: Cell::new(false),
        }
    }
}

impl std::fmt::Debug for DeclarativeAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeclarativeAdapter")
            .field("name", &self.module.name())
            .field("initialized", &self.initialized.get())
            .finish_non_exhaustive()
    }
}

impl GeneralizedModule for DeclarativeAdapter {
    fn module_name(&self) -> String {
        self.module.name()
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
        let Some(input) = args.single() else {
            return Err(ModuleError::InvalidOperation(
                "声明式模块的调用需要一个输入".to_string(),
            ));
        };

        let (params, supplied) = match mode {
            TraceMode::Init => (Tree::dict(), None),
            TraceMode::Apply { params, states } => (params.clone(), Some(states)),
        };

        let mut ctx = BindCtx {
            initializing: mode.is_initializing(),
            training,
            rng,
            path: Path::root(),
            used_names: vec![BTreeSet::new()],
            params,
            supplied,
            slots: BTreeMap::new(),
            recorder,
        };

        let root_slot = recorder.map(SummaryRecorder::begin);
        let output = {
            let mut scope = Scope { ctx: &mut ctx };
            self.module.call(&mut scope, input)?
        };

        // 集合返回槽位的最终值；外部提供但本次未登记的集合原样放回
        let registered = ctx.collection_trees()?;
        let mut states_out = supplied.cloned().unwrap_or_default();
        for (name, tree) in &registered {
            states_out.insert(name.clone(), tree.clone());
        }

        if let (Some(recorder), Some(slot)) = (recorder, root_slot) {
            let refs: Vec<&Tree<Tensor>> = registered.values().collect();
            recorder.finish(
                slot,
                SummaryTableEntry::record(
                    &Path::root(),
                    &self.module.type_name(),
                    &output,
                    &ctx.params,
                    &refs,
                ),
            );
        }

        Ok((output, States::new(ctx.params, states_out)))
    }
}
