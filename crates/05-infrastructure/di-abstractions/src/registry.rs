//! 服务注册表
//!
//! 注册表按插入顺序保存名称到描述符的映射。合并是原子的：
//! 任何一条定义出错，注册表都保持合并前的状态。

use crate::descriptor::{Instance, ProducedType, ProducerSignature, ServiceDescriptor};
use crate::factory::FactoryFn;
use indexmap::{IndexMap, IndexSet};
use infrastructure_common::{ConfigurationError, ConfigurationResult};
use std::fmt;
use std::hash::BuildHasher;
use std::sync::Arc;
use tracing::debug;

/// 服务定义：尚未校验的注册项
pub enum ServiceDefinition {
    /// 值形式
    Value {
        /// 值，为空时合并失败
        value: Option<Instance>,
        /// 值的类型
        produced: ProducedType,
    },
    /// 生产者形式
    Producer {
        /// 生产者，缺失时合并失败
        producer: Option<FactoryFn>,
        /// 外部提取的签名
        signature: ProducerSignature,
    },
}

impl ServiceDefinition {
    /// 具体类型的值
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::Value {
            value: Some(Arc::new(value)),
            produced: ProducedType::of::<T>(),
        }
    }

    /// 转换为描述符
    pub fn into_descriptor(self, name: impl Into<String>) -> ConfigurationResult<ServiceDescriptor> {
        match self {
            Self::Value { value, produced } => ServiceDescriptor::from_value(name, value, produced),
            Self::Producer {
                producer,
                signature,
            } => ServiceDescriptor::from_producer(name, producer, signature),
        }
    }
}

impl fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value { value, produced } => f
                .debug_struct("Value")
                .field("present", &value.is_some())
                .field("produced", produced)
                .finish(),
            Self::Producer {
                producer,
                signature,
            } => f
                .debug_struct("Producer")
                .field("present", &producer.is_some())
                .field("signature", signature)
                .finish(),
        }
    }
}

/// 服务来源
///
/// 可以合并进注册表的任何东西：服务集合、名称到定义的映射、或者服务模块。
pub trait ServiceSource {
    /// 按顺序展开为名称与定义
    fn into_definitions(self) -> Vec<(String, ServiceDefinition)>;

    /// 用于日志的来源描述
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// 服务模块
///
/// 把一组相关服务的注册逻辑放在一起，通过引用合并进注册表。
pub trait ServiceModule {
    /// 向服务集合添加定义
    fn configure(&self, services: &mut ServiceSet);

    /// 模块名称
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// 服务集合
#[derive(Debug, Default)]
pub struct ServiceSet {
    definitions: Vec<(String, ServiceDefinition)>,
}

impl ServiceSet {
    /// 创建空集合
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加定义
    pub fn add(
        &mut self,
        name: impl Into<String>,
        definition: impl Into<ServiceDefinition>,
    ) -> &mut Self {
        self.definitions.push((name.into(), definition.into()));
        self
    }

    /// 添加具体类型的值
    pub fn value<T: Send + Sync + 'static>(&mut self, name: impl Into<String>, value: T) -> &mut Self {
        self.add(name, ServiceDefinition::value(value))
    }

    /// 链式添加定义
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, definition: impl Into<ServiceDefinition>) -> Self {
        self.add(name, definition);
        self
    }

    /// 已添加的名称
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|(name, _)| name.as_str())
    }

    /// 定义数量
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl ServiceSource for ServiceSet {
    fn into_definitions(self) -> Vec<(String, ServiceDefinition)> {
        self.definitions
    }

    fn describe(&self) -> String {
        format!("ServiceSet({})", self.definitions.len())
    }
}

impl ServiceSource for Vec<(String, ServiceDefinition)> {
    fn into_definitions(self) -> Vec<(String, ServiceDefinition)> {
        self
    }
}

impl<S: BuildHasher> ServiceSource for IndexMap<String, ServiceDefinition, S> {
    fn into_definitions(self) -> Vec<(String, ServiceDefinition)> {
        self.into_iter().collect()
    }
}

impl<M: ServiceModule + ?Sized> ServiceSource for &M {
    fn into_definitions(self) -> Vec<(String, ServiceDefinition)> {
        let mut services = ServiceSet::new();
        self.configure(&mut services);
        services.into_definitions()
    }

    fn describe(&self) -> String {
        self.name().to_string()
    }
}

/// 服务注册表
#[derive(Clone, Default)]
pub struct Registry {
    entries: IndexMap<String, ServiceDescriptor>,
}

impl Registry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 合并一个服务来源，返回新增的服务数量
    ///
    /// 与已有名称冲突或来源内部重名时，返回按字典序排列的全部冲突名称；
    /// 任何定义无法转换为描述符时同样失败。失败时注册表不变。
    pub fn merge<S: ServiceSource>(&mut self, source: S) -> ConfigurationResult<usize> {
        let origin = source.describe();
        let definitions = source.into_definitions();

        let mut duplicates = IndexSet::new();
        {
            let mut seen = IndexSet::with_capacity(definitions.len());
            for (name, _) in &definitions {
                if self.entries.contains_key(name) || !seen.insert(name.as_str()) {
                    duplicates.insert(name.clone());
                }
            }
        }
        if !duplicates.is_empty() {
            let mut names: Vec<String> = duplicates.into_iter().collect();
            names.sort();
            return Err(ConfigurationError::DuplicateNames { names });
        }

        let descriptors = definitions
            .into_iter()
            .map(|(name, definition)| definition.into_descriptor(name))
            .collect::<ConfigurationResult<Vec<_>>>()?;

        let count = descriptors.len();
        for descriptor in descriptors {
            self.entries.insert(descriptor.name().to_string(), descriptor);
        }
        debug!("从 {} 合并了 {} 个服务", origin, count);
        Ok(count)
    }

    /// 插入单个描述符，名称已存在时失败
    pub fn insert(&mut self, descriptor: ServiceDescriptor) -> ConfigurationResult<()> {
        if self.entries.contains_key(descriptor.name()) {
            return Err(ConfigurationError::DuplicateNames {
                names: vec![descriptor.name().to_string()],
            });
        }
        self.entries.insert(descriptor.name().to_string(), descriptor);
        Ok(())
    }

    /// 移除服务，保持其余服务的顺序
    pub fn remove(&mut self, name: &str) -> Option<ServiceDescriptor> {
        self.entries.shift_remove(name)
    }

    /// 按名称获取描述符
    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.entries.get(name)
    }

    /// 按插入位置获取描述符
    pub fn get_index(&self, index: usize) -> Option<&ServiceDescriptor> {
        self.entries.get_index(index).map(|(_, descriptor)| descriptor)
    }

    /// 名称在注册表中的位置
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.get_index_of(name)
    }

    /// 是否注册了指定名称
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// 所有名称，按插入顺序
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// 所有名称与描述符，按插入顺序
    pub fn items(&self) -> impl Iterator<Item = (&str, &ServiceDescriptor)> {
        self.entries
            .iter()
            .map(|(name, descriptor)| (name.as_str(), descriptor))
    }

    /// 服务数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.values().map(ToString::to_string))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{Constant, Factory};

    struct Storage;

    impl ServiceModule for Storage {
        fn configure(&self, services: &mut ServiceSet) {
            services
                .value("path", "/tmp/data".to_string())
                .add("size", Factory::new(|_| Ok(42u64)));
        }
    }

    #[test]
    fn test_merge_keeps_insertion_order() {
        let mut registry = Registry::new();
        registry
            .merge(ServiceSet::new().with("b", Constant::new(1u8)).with("a", Constant::new(2u8)))
            .unwrap();
        registry.merge(&Storage).unwrap();

        assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["b", "a", "path", "size"]);
        assert_eq!(registry.index_of("path"), Some(2));
        assert_eq!(registry.get_index(3).unwrap().name(), "size");
    }

    #[test]
    fn test_merge_rejects_existing_names_atomically() {
        let mut registry = Registry::new();
        registry
            .merge(ServiceSet::new().with("a", Constant::new(1u8)).with("b", Constant::new(1u8)))
            .unwrap();

        let error = registry
            .merge(
                ServiceSet::new()
                    .with("c", Constant::new(1u8))
                    .with("b", Constant::new(1u8))
                    .with("a", Constant::new(1u8)),
            )
            .unwrap_err();

        assert_eq!(
            error,
            ConfigurationError::DuplicateNames {
                names: vec!["a".to_string(), "b".to_string()]
            }
        );
        assert_eq!(registry.len(), 2);
        assert!(!registry.contains("c"));
    }

    #[test]
    fn test_merge_rejects_names_repeated_within_source() {
        let mut registry = Registry::new();
        let error = registry
            .merge(vec![
                ("x".to_string(), ServiceDefinition::value(1u8)),
                ("x".to_string(), ServiceDefinition::value(2u8)),
            ])
            .unwrap_err();
        assert!(matches!(error, ConfigurationError::DuplicateNames { names } if names == ["x"]));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_merge_invalid_definition_leaves_registry_unchanged() {
        let mut registry = Registry::new();
        let error = registry
            .merge(
                ServiceSet::new()
                    .with("ok", Constant::new(1u8))
                    .with("empty", Constant::<u8>::optional(None)),
            )
            .unwrap_err();
        assert!(matches!(error, ConfigurationError::NullValue { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_insert_and_remove() {
        let mut registry = Registry::new();
        registry.insert(ServiceDescriptor::value("a", 1u8)).unwrap();
        registry.insert(ServiceDescriptor::value("b", 2u8)).unwrap();
        assert!(registry.insert(ServiceDescriptor::value("a", 3u8)).is_err());

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_merge_index_map() {
        let mut definitions = IndexMap::new();
        definitions.insert("a".to_string(), ServiceDefinition::value("x".to_string()));
        let mut registry = Registry::new();
        assert_eq!(registry.merge(definitions).unwrap(), 1);
        assert_eq!(registry.get("a").unwrap().to_string(), "a: String");
    }
}
