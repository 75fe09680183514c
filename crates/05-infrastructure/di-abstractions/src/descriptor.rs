//! 服务描述符
//!
//! 描述符是注册的基本单元：名称、生产者、声明的依赖以及生产的类型。
//! 依赖的名称和类型由外部（注册代码）显式给出，这里只负责校验元数据是否完整。

use crate::factory::FactoryFn;
use indexmap::IndexMap;
use infrastructure_common::{ConfigurationError, ConfigurationResult, TypeInfo};
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// 类型擦除后的服务实例
pub type Instance = Arc<dyn Any + Send + Sync>;

/// 把实例转换为 `Box<Arc<U>>` 的类型视图函数
type Caster = Arc<dyn Fn(&Instance) -> Option<Box<dyn Any>> + Send + Sync>;

/// 依赖匹配策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// 按名称查找，提供者的类型必须与声明类型完全一致
    ExactType,
    /// 按名称查找，提供者的类型可以是声明类型或其实现（子类型）
    Subtype,
    /// 忽略名称，在整个注册表中查找唯一类型匹配的提供者
    ByType,
}

impl Default for MatchStrategy {
    fn default() -> Self {
        Self::Subtype
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ExactType => "exact_type",
            Self::Subtype => "subtype",
            Self::ByType => "by_type",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
struct TypeView {
    info: TypeInfo,
    caster: Caster,
}

/// 服务生产的类型
///
/// 除了具体类型本身，还可以声明若干"视图"（通常是 trait 对象），
/// 这就是本容器里的子类型关系：`Repo` 声明了 `dyn Repository` 视图后，
/// 就可以满足要求 `dyn Repository` 的依赖。
#[derive(Clone)]
pub struct ProducedType {
    info: TypeInfo,
    views: Vec<TypeView>,
}

impl ProducedType {
    /// 只包含具体类型本身的生产类型
    pub fn of<T: Send + Sync + 'static>() -> Self {
        Self::builder::<T>().build()
    }

    /// 创建带视图声明的生产类型构建器
    pub fn builder<T: Send + Sync + 'static>() -> ProducedTypeBuilder<T> {
        ProducedTypeBuilder::new()
    }

    /// 具体类型
    pub fn info(&self) -> TypeInfo {
        self.info
    }

    /// 所有可满足的类型（包含具体类型本身）
    pub fn assignable_types(&self) -> impl Iterator<Item = TypeInfo> + '_ {
        self.views.iter().map(|view| view.info)
    }

    /// 是否与指定类型完全一致
    pub fn is_exactly(&self, required: &TypeInfo) -> bool {
        self.info == *required
    }

    /// 是否可以赋值给指定类型（完全一致或声明了对应视图）
    pub fn is_assignable_to(&self, required: &TypeInfo) -> bool {
        self.views.iter().any(|view| view.info == *required)
    }

    /// 按匹配策略判断是否满足要求的类型
    pub fn satisfies(&self, required: &TypeInfo, strategy: MatchStrategy) -> bool {
        match strategy {
            MatchStrategy::ExactType => self.is_exactly(required),
            MatchStrategy::Subtype | MatchStrategy::ByType => self.is_assignable_to(required),
        }
    }

    /// 实例的具体类型是否就是本类型
    pub fn accepts(&self, instance: &Instance) -> bool {
        Any::type_id(&**instance) == self.info.id
    }

    /// 通过已声明的视图把实例转换为 `Arc<U>`
    pub fn cast<U: ?Sized + 'static>(&self, instance: &Instance) -> Option<Arc<U>> {
        let wanted = TypeId::of::<U>();
        let view = self.views.iter().find(|view| view.info.id == wanted)?;
        (view.caster)(instance)?
            .downcast::<Arc<U>>()
            .ok()
            .map(|typed| *typed)
    }
}

impl PartialEq for ProducedType {
    fn eq(&self, other: &Self) -> bool {
        self.info == other.info
    }
}

impl Eq for ProducedType {}

impl fmt::Debug for ProducedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducedType")
            .field("type", &self.info.name)
            .field(
                "views",
                &self.views.iter().skip(1).map(|view| view.info.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// 生产类型构建器
pub struct ProducedTypeBuilder<T> {
    produced: ProducedType,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> ProducedTypeBuilder<T> {
    fn new() -> Self {
        let identity: Caster = Arc::new(|instance: &Instance| {
            Arc::clone(instance)
                .downcast::<T>()
                .ok()
                .map(|typed| Box::new(typed) as Box<dyn Any>)
        });
        Self {
            produced: ProducedType {
                info: TypeInfo::of::<T>(),
                views: vec![TypeView {
                    info: TypeInfo::of::<T>(),
                    caster: identity,
                }],
            },
            _marker: PhantomData,
        }
    }

    /// 声明一个视图，例如 `implements::<dyn Repository, _>(|repo| repo as Arc<dyn Repository>)`
    ///
    /// 重复声明同一视图时保留第一次的声明。
    #[must_use]
    pub fn implements<U, F>(mut self, upcast: F) -> Self
    where
        U: ?Sized + 'static,
        F: Fn(Arc<T>) -> Arc<U> + Send + Sync + 'static,
    {
        let info = TypeInfo::of::<U>();
        if self.produced.is_assignable_to(&info) {
            return self;
        }
        let caster: Caster = Arc::new(move |instance: &Instance| {
            Arc::clone(instance)
                .downcast::<T>()
                .ok()
                .map(|typed| Box::new(upcast(typed)) as Box<dyn Any>)
        });
        self.produced.views.push(TypeView { info, caster });
        self
    }

    /// 完成构建
    pub fn build(self) -> ProducedType {
        self.produced
    }
}

/// 依赖声明：某个依赖位要求的类型以及可选的匹配策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencySpec {
    /// 要求的类型
    pub required: TypeInfo,
    /// 匹配策略，为空时使用容器的默认策略
    pub strategy: Option<MatchStrategy>,
}

impl DependencySpec {
    /// 创建依赖声明
    pub fn new(required: TypeInfo) -> Self {
        Self {
            required,
            strategy: None,
        }
    }

    /// 指定匹配策略
    #[must_use]
    pub fn with_strategy(mut self, strategy: MatchStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// 实际生效的匹配策略
    pub fn effective_strategy(&self, default: MatchStrategy) -> MatchStrategy {
        self.strategy.unwrap_or(default)
    }
}

/// 外部提取得到的生产者参数
#[derive(Debug, Clone)]
pub struct Parameter {
    /// 参数名称，即依赖的服务名称
    pub name: String,
    /// 参数类型，缺失时构建描述符会失败
    pub required: Option<TypeInfo>,
    /// 匹配策略
    pub strategy: Option<MatchStrategy>,
}

impl Parameter {
    /// 带类型的参数
    pub fn typed<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: Some(TypeInfo::of::<T>()),
            strategy: None,
        }
    }

    /// 没有类型声明的参数
    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: None,
            strategy: None,
        }
    }

    /// 指定匹配策略
    #[must_use]
    pub fn with_strategy(mut self, strategy: MatchStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

/// 外部提取得到的生产者签名
#[derive(Debug, Clone, Default)]
pub struct ProducerSignature {
    /// 返回类型
    pub produced: Option<ProducedType>,
    /// 参数列表，顺序即依赖解析顺序
    pub parameters: Vec<Parameter>,
}

impl ProducerSignature {
    /// 创建签名
    pub fn new(produced: ProducedType) -> Self {
        Self {
            produced: Some(produced),
            parameters: Vec::new(),
        }
    }

    /// 添加参数
    #[must_use]
    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }
}

/// 生产者：固定值或工厂函数
#[derive(Clone)]
pub enum Producer {
    /// 已经存在的值
    Value(Instance),
    /// 根据依赖创建实例的工厂
    Factory(FactoryFn),
}

impl Producer {
    /// 是否为固定值
    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }
}

impl PartialEq for Producer {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => Arc::ptr_eq(a, b),
            (Self::Factory(a), Self::Factory(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Value(<instance>)"),
            Self::Factory(_) => f.write_str("Factory(<function>)"),
        }
    }
}

/// 服务描述符
#[derive(Clone)]
pub struct ServiceDescriptor {
    name: String,
    produced: ProducedType,
    producer: Producer,
    dependencies: IndexMap<String, DependencySpec>,
}

impl ServiceDescriptor {
    /// 从值创建描述符
    ///
    /// 值为空，或值的实际类型不是声明的类型时失败。
    pub fn from_value(
        name: impl Into<String>,
        value: Option<Instance>,
        produced: ProducedType,
    ) -> ConfigurationResult<Self> {
        let name = name.into();
        let Some(instance) = value else {
            return Err(ConfigurationError::NullValue { name });
        };
        if !produced.accepts(&instance) {
            return Err(ConfigurationError::ValueTypeMismatch {
                name,
                expected: produced.info(),
            });
        }
        Ok(Self {
            name,
            produced,
            producer: Producer::Value(instance),
            dependencies: IndexMap::new(),
        })
    }

    /// 从具体类型的值创建描述符
    pub fn value<T: Send + Sync + 'static>(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            produced: ProducedType::of::<T>(),
            producer: Producer::Value(Arc::new(value)),
            dependencies: IndexMap::new(),
        }
    }

    /// 从生产者及其签名创建描述符
    ///
    /// 生产者、返回类型或任一参数类型缺失时失败。
    pub fn from_producer(
        name: impl Into<String>,
        producer: Option<FactoryFn>,
        signature: ProducerSignature,
    ) -> ConfigurationResult<Self> {
        let name = name.into();
        let Some(producer) = producer else {
            return Err(ConfigurationError::MissingProducer { name });
        };
        let Some(produced) = signature.produced else {
            return Err(ConfigurationError::MissingReturnType { name });
        };

        let mut dependencies = IndexMap::with_capacity(signature.parameters.len());
        for parameter in signature.parameters {
            let Some(required) = parameter.required else {
                return Err(ConfigurationError::MissingParameterType {
                    name,
                    parameter: parameter.name,
                });
            };
            if dependencies.contains_key(&parameter.name) {
                return Err(ConfigurationError::DuplicateParameter {
                    name,
                    parameter: parameter.name,
                });
            }
            dependencies.insert(
                parameter.name,
                DependencySpec {
                    required,
                    strategy: parameter.strategy,
                },
            );
        }

        Ok(Self {
            name,
            produced,
            producer: Producer::Factory(producer),
            dependencies,
        })
    }

    /// 服务名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 生产的类型
    pub fn produced_type(&self) -> &ProducedType {
        &self.produced
    }

    /// 生产者
    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    /// 声明的依赖，按声明顺序
    pub fn dependencies(&self) -> &IndexMap<String, DependencySpec> {
        &self.dependencies
    }

    /// 是否为值形式的描述符
    pub fn is_value(&self) -> bool {
        self.producer.is_value()
    }

    /// 值形式描述符自带的实例
    pub fn initial_instance(&self) -> Option<&Instance> {
        match &self.producer {
            Producer::Value(instance) => Some(instance),
            Producer::Factory(_) => None,
        }
    }
}

impl PartialEq for ServiceDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.producer == other.producer
            && self.produced == other.produced
            && self.dependencies == other.dependencies
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("produced", &self.produced)
            .field("producer", &self.producer)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

impl fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.produced.info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::Produced;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    #[derive(Debug)]
    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    fn noop_factory() -> FactoryFn {
        Arc::new(|_| Ok(Some(Produced::value(English))))
    }

    #[test]
    fn test_from_value_none_is_rejected() {
        let result = ServiceDescriptor::from_value("a", None, ProducedType::of::<String>());
        assert_eq!(
            result.unwrap_err(),
            ConfigurationError::NullValue {
                name: "a".to_string()
            }
        );
    }

    #[test]
    fn test_from_value_wrong_type_is_rejected() {
        let port: Instance = Arc::new("8080".to_string());
        let result = ServiceDescriptor::from_value("port", Some(port), ProducedType::of::<u32>());
        assert_eq!(
            result.unwrap_err(),
            ConfigurationError::ValueTypeMismatch {
                name: "port".to_string(),
                expected: TypeInfo::of::<u32>(),
            }
        );

        let port: Instance = Arc::new(8080u32);
        assert!(ServiceDescriptor::from_value("port", Some(port), ProducedType::of::<u32>()).is_ok());
    }

    #[test]
    fn test_from_value_has_no_dependencies() {
        let descriptor = ServiceDescriptor::value("a", "str".to_string());
        assert!(descriptor.is_value());
        assert!(descriptor.dependencies().is_empty());
        assert!(descriptor.produced_type().info().is::<String>());
        assert_eq!(descriptor.to_string(), "a: String");
    }

    #[test]
    fn test_from_producer_missing_producer() {
        let result = ServiceDescriptor::from_producer(
            "a",
            None,
            ProducerSignature::new(ProducedType::of::<English>()),
        );
        assert!(matches!(result, Err(ConfigurationError::MissingProducer { .. })));
    }

    #[test]
    fn test_from_producer_missing_return_type() {
        let result =
            ServiceDescriptor::from_producer("a", Some(noop_factory()), ProducerSignature::default());
        assert!(matches!(result, Err(ConfigurationError::MissingReturnType { .. })));
    }

    #[test]
    fn test_from_producer_untyped_parameter() {
        let signature =
            ProducerSignature::new(ProducedType::of::<English>()).parameter(Parameter::untyped("b"));
        let result = ServiceDescriptor::from_producer("a", Some(noop_factory()), signature);
        assert_eq!(
            result.unwrap_err(),
            ConfigurationError::MissingParameterType {
                name: "a".to_string(),
                parameter: "b".to_string()
            }
        );
    }

    #[test]
    fn test_from_producer_duplicate_parameter() {
        let signature = ProducerSignature::new(ProducedType::of::<English>())
            .parameter(Parameter::typed::<String>("b"))
            .parameter(Parameter::typed::<u32>("b"));
        let result = ServiceDescriptor::from_producer("a", Some(noop_factory()), signature);
        assert!(matches!(result, Err(ConfigurationError::DuplicateParameter { .. })));
    }

    #[test]
    fn test_from_producer_keeps_parameter_types() {
        let signature = ProducerSignature::new(ProducedType::of::<English>())
            .parameter(Parameter::typed::<String>("b"))
            .parameter(Parameter::typed::<dyn Greeter>("c").with_strategy(MatchStrategy::ByType));
        let descriptor =
            ServiceDescriptor::from_producer("a", Some(noop_factory()), signature).unwrap();

        let names: Vec<_> = descriptor.dependencies().keys().cloned().collect();
        assert_eq!(names, vec!["b", "c"]);
        assert!(descriptor.dependencies()["b"].required.is::<String>());
        assert_eq!(
            descriptor.dependencies()["c"].strategy,
            Some(MatchStrategy::ByType)
        );
    }

    #[test]
    fn test_equality_ignores_name() {
        let factory = noop_factory();
        let signature = ProducerSignature::new(ProducedType::of::<English>());
        let a = ServiceDescriptor::from_producer("a", Some(factory.clone()), signature.clone()).unwrap();
        let b = ServiceDescriptor::from_producer("b", Some(factory), signature.clone()).unwrap();
        let c = ServiceDescriptor::from_producer("a", Some(noop_factory()), signature).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_views_and_cast() {
        let produced = ProducedType::builder::<English>()
            .implements::<dyn Greeter, _>(|english| english as Arc<dyn Greeter>)
            .build();
        let instance: Instance = Arc::new(English);

        assert!(produced.accepts(&instance));
        assert!(produced.is_assignable_to(&TypeInfo::of::<dyn Greeter>()));
        assert!(!produced.is_exactly(&TypeInfo::of::<dyn Greeter>()));
        assert!(!produced.satisfies(&TypeInfo::of::<dyn Greeter>(), MatchStrategy::ExactType));

        let greeter = produced.cast::<dyn Greeter>(&instance).unwrap();
        assert_eq!(greeter.greet(), "hello");
        assert!(produced.cast::<English>(&instance).is_some());
        assert!(produced.cast::<String>(&instance).is_none());
    }

    #[test]
    fn test_strategy_serde_names() {
        let strategy: MatchStrategy = serde_json::from_str("\"by_type\"").unwrap();
        assert_eq!(strategy, MatchStrategy::ByType);
        assert_eq!(MatchStrategy::default(), MatchStrategy::Subtype);
    }
}
