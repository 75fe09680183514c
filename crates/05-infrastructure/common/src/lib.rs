//! # Infrastructure Common
//!
//! 这个 crate 提供了依赖注入容器各层共用的基础类型。
//!
//! ## 核心组件
//!
//! - [`TypeInfo`] - 服务类型元数据
//! - [`ResolutionState`] - 服务解析状态
//! - [`ScopedResource`] - 作用域资源能力
//! - [`errors`] - 按阶段划分的错误类型
//!
//! ## 设计原则
//!
//! - 基于 Rust 类型系统的显式元数据，不做运行时签名反射
//! - 错误类型化，可按阶段区分
//! - 作用域资源通过 trait 显式声明

pub mod errors;
pub mod lifecycle;
pub mod metadata;

pub use errors::*;
pub use lifecycle::*;
pub use metadata::*;
