//! # Dependency Injection Abstractions
//!
//! 依赖注入抽象层，定义服务注册和依赖解析的核心类型。
//!
//! ## 核心接口
//!
//! - [`ServiceDescriptor`] - 服务描述符
//! - [`Registry`] - 服务注册表
//! - [`ServiceResolver`] - 服务解析器接口
//! - [`Factory`] - 强类型工厂构建器
//! - [`ContainerConfig`] - 容器配置

pub mod container;
pub mod descriptor;
pub mod factory;
pub mod registry;
pub mod resolver;

pub use container::*;
pub use descriptor::*;
pub use factory::*;
pub use registry::*;
pub use resolver::*;
