//! # 依赖注入具体实现
//!
//! 提供依赖图校验器、惰性解析的容器、容器构建器以及按类型查询。
//!
//! ```
//! use di_abstractions::{Constant, Factory, ServiceSet};
//! use di_impl::ContainerBuilder;
//! use std::sync::Arc;
//!
//! struct Config { url: String }
//! struct Client { config: Arc<Config> }
//!
//! let container = ContainerBuilder::new()
//!     .source(
//!         ServiceSet::new()
//!             .with("config", Constant::new(Config { url: "http://localhost".into() }))
//!             .with(
//!                 "client",
//!                 Factory::new(|deps| Ok(Client { config: deps.get::<Config>("config")? }))
//!                     .depends_on::<Config>("config"),
//!             ),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let client = container.get::<Client>("client").unwrap();
//! assert!(Arc::ptr_eq(&client.config, &container.get::<Config>("config").unwrap()));
//! container.close().unwrap();
//! ```

pub mod builder;
pub mod container;
pub mod query;
pub mod validator;

pub use builder::*;
pub use container::*;
pub use query::*;
pub use validator::*;
