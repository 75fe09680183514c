//! 服务工厂
//!
//! 提供生产者函数的类型擦除形式，以及注册时使用的强类型构建器。

use crate::descriptor::{Instance, MatchStrategy, Parameter, ProducedType, ProducedTypeBuilder, ProducerSignature};
use crate::registry::ServiceDefinition;
use crate::resolver::Dependencies;
use infrastructure_common::ScopedResource;
use std::fmt;
use std::sync::Arc;

/// 类型擦除后的生产者函数
///
/// 返回 `Ok(None)` 表示生产者产出了空值，容器会将其视为解析错误。
pub type FactoryFn = Arc<dyn Fn(&Dependencies) -> anyhow::Result<Option<Produced>> + Send + Sync>;

/// 生产者的产出
pub enum Produced {
    /// 普通值，直接作为服务实例
    Value(Instance),
    /// 作用域资源，容器进入后把目标值作为服务实例
    Scoped(Box<dyn ErasedScopedResource>),
}

impl Produced {
    /// 包装普通值
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::Value(Arc::new(value))
    }

    /// 包装作用域资源
    pub fn scoped<R: ScopedResource>(resource: R) -> Self {
        Self::Scoped(Box::new(resource))
    }

    /// 是否为作用域资源
    pub fn is_scoped(&self) -> bool {
        matches!(self, Self::Scoped(_))
    }
}

impl fmt::Debug for Produced {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Produced::Value"),
            Self::Scoped(_) => f.write_str("Produced::Scoped"),
        }
    }
}

/// 类型擦除后的作用域资源
pub trait ErasedScopedResource: Send {
    /// 获取资源，返回服务实例
    fn enter(&mut self) -> anyhow::Result<Instance>;

    /// 释放资源
    fn exit(&mut self) -> anyhow::Result<()>;
}

impl<R: ScopedResource> ErasedScopedResource for R {
    fn enter(&mut self) -> anyhow::Result<Instance> {
        let target = ScopedResource::enter(self)?;
        Ok(Arc::new(target))
    }

    fn exit(&mut self) -> anyhow::Result<()> {
        ScopedResource::exit(self)
    }
}

/// 工厂构建器
///
/// ```
/// use di_abstractions::{Factory, ServiceSet};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct Polite { name: Arc<String> }
///
/// impl Greeter for Polite {
///     fn greet(&self) -> String {
///         format!("你好, {}", self.name)
///     }
/// }
///
/// let mut services = ServiceSet::new();
/// services
///     .value("name", "世界".to_string())
///     .add(
///         "greeter",
///         Factory::new(|deps| Ok(Polite { name: deps.get::<String>("name")? }))
///             .depends_on::<String>("name")
///             .implements::<dyn Greeter, _>(|polite| polite as Arc<dyn Greeter>),
///     );
/// assert_eq!(services.len(), 2);
/// ```
pub struct Factory<T> {
    producer: FactoryFn,
    produced: ProducedTypeBuilder<T>,
    parameters: Vec<Parameter>,
}

impl<T: Send + Sync + 'static> Factory<T> {
    /// 由总是产出值的函数创建工厂
    pub fn new<F>(produce: F) -> Self
    where
        F: Fn(&Dependencies) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::optional(move |deps| produce(deps).map(Some))
    }

    /// 由可能产出空值的函数创建工厂
    pub fn optional<F>(produce: F) -> Self
    where
        F: Fn(&Dependencies) -> anyhow::Result<Option<T>> + Send + Sync + 'static,
    {
        let producer: FactoryFn =
            Arc::new(move |deps: &Dependencies| Ok(produce(deps)?.map(Produced::value)));
        Self::from_fn(producer)
    }

    /// 由产出作用域资源的函数创建工厂，服务类型为资源的目标类型
    pub fn scoped<R, F>(produce: F) -> Self
    where
        R: ScopedResource<Target = T>,
        F: Fn(&Dependencies) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let producer: FactoryFn =
            Arc::new(move |deps: &Dependencies| Ok(Some(Produced::scoped(produce(deps)?))));
        Self::from_fn(producer)
    }

    fn from_fn(producer: FactoryFn) -> Self {
        Self {
            producer,
            produced: ProducedType::builder::<T>(),
            parameters: Vec::new(),
        }
    }

    /// 声明一个依赖，使用容器默认的匹配策略
    #[must_use]
    pub fn depends_on<D: ?Sized + 'static>(mut self, name: impl Into<String>) -> Self {
        self.parameters.push(Parameter::typed::<D>(name));
        self
    }

    /// 声明一个依赖并指定匹配策略
    #[must_use]
    pub fn depends_on_with<D: ?Sized + 'static>(
        mut self,
        name: impl Into<String>,
        strategy: MatchStrategy,
    ) -> Self {
        self.parameters
            .push(Parameter::typed::<D>(name).with_strategy(strategy));
        self
    }

    /// 声明服务可以作为 `U` 使用
    #[must_use]
    pub fn implements<U, F>(mut self, upcast: F) -> Self
    where
        U: ?Sized + 'static,
        F: Fn(Arc<T>) -> Arc<U> + Send + Sync + 'static,
    {
        self.produced = self.produced.implements(upcast);
        self
    }
}

impl<T: Send + Sync + 'static> From<Factory<T>> for ServiceDefinition {
    fn from(factory: Factory<T>) -> Self {
        ServiceDefinition::Producer {
            producer: Some(factory.producer),
            signature: ProducerSignature {
                produced: Some(factory.produced.build()),
                parameters: factory.parameters,
            },
        }
    }
}

/// 固定值构建器
pub struct Constant<T> {
    value: Option<T>,
    produced: ProducedTypeBuilder<T>,
}

impl<T: Send + Sync + 'static> Constant<T> {
    /// 包装一个值
    pub fn new(value: T) -> Self {
        Self::optional(Some(value))
    }

    /// 包装一个可能为空的值，为空时合并到注册表会失败
    pub fn optional(value: Option<T>) -> Self {
        Self {
            value,
            produced: ProducedType::builder::<T>(),
        }
    }

    /// 声明值可以作为 `U` 使用
    #[must_use]
    pub fn implements<U, F>(mut self, upcast: F) -> Self
    where
        U: ?Sized + 'static,
        F: Fn(Arc<T>) -> Arc<U> + Send + Sync + 'static,
    {
        self.produced = self.produced.implements(upcast);
        self
    }
}

impl<T: Send + Sync + 'static> From<Constant<T>> for ServiceDefinition {
    fn from(constant: Constant<T>) -> Self {
        ServiceDefinition::Value {
            value: constant.value.map(|value| Arc::new(value) as Instance),
            produced: constant.produced.build(),
        }
    }
}
