//! # Only Keras
//!
//! `only_keras`项目旨在用纯rust仿造[keras](https://keras.io)/[elegy](https://github.com/poets-ai/elegy)
//! 这类高层训练API：把“命令式闭包+显式参数字典”和“声明式树+惰性参数绑定”
//! 两种分裂的模块风格统一在同一个`init`/`apply`接口之后，
//! 让同一套训练循环、指标与摘要工具能驱动任意一种风格写成的模型。
//!

pub mod errors;
pub mod nn;
pub mod rng;
pub mod tensor;
pub mod tree;
pub mod utils;
