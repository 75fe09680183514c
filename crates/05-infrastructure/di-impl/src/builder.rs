//! 容器构建器
//!
//! 收集服务来源并在 [`ContainerBuilder::build`] 时校验依赖图。
//! 注册阶段的第一个错误会被记录下来，并在构建时返回，之后的来源不再合并。

use crate::container::Container;
use crate::validator::GraphValidator;
use di_abstractions::{
    ContainerConfig, MatchStrategy, Registry, ServiceDefinition, ServiceDescriptor, ServiceSource,
};
use infrastructure_common::{ConfigurationError, ConfigurationResult, ContainerError, ContainerResult};
use tracing::{debug, error, info};

/// 容器构建器
#[derive(Debug, Default)]
pub struct ContainerBuilder {
    registry: Registry,
    config: ContainerConfig,
    pending_error: Option<ConfigurationError>,
}

impl ContainerBuilder {
    /// 创建构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用指定配置创建构建器
    pub fn with_config(config: ContainerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// 替换容器配置
    #[must_use]
    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// 设置默认匹配策略
    #[must_use]
    pub fn strategy(mut self, strategy: MatchStrategy) -> Self {
        self.config.default_strategy = strategy;
        self
    }

    /// 合并一个服务来源，可多次调用，顺序即调用顺序
    #[must_use]
    pub fn source<S: ServiceSource>(mut self, source: S) -> Self {
        if self.pending_error.is_none() {
            if let Err(e) = self.registry.merge(source) {
                self.pending_error = Some(e);
            }
        }
        self
    }

    /// 合并一个服务来源并立即返回结果
    pub fn try_source<S: ServiceSource>(&mut self, source: S) -> ConfigurationResult<usize> {
        self.registry.merge(source)
    }

    /// 添加单个服务，名称已存在时记录错误
    #[must_use]
    pub fn set(mut self, name: impl Into<String>, definition: impl Into<ServiceDefinition>) -> Self {
        if self.pending_error.is_none() {
            if let Err(e) = self.try_set(name, definition) {
                self.pending_error = Some(e);
            }
        }
        self
    }

    /// 添加单个服务并立即返回结果
    pub fn try_set(
        &mut self,
        name: impl Into<String>,
        definition: impl Into<ServiceDefinition>,
    ) -> ConfigurationResult<()> {
        let descriptor = definition.into().into_descriptor(name)?;
        self.registry.insert(descriptor)
    }

    /// 移除尚未封存的服务
    #[must_use]
    pub fn remove(mut self, name: &str) -> Self {
        if self.registry.remove(name).is_some() {
            debug!("移除服务: {}", name);
        }
        self
    }

    /// 已注册的描述符
    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.registry.get(name)
    }

    /// 是否注册了指定名称
    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// 已注册的服务数量
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// 是否没有任何服务
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// 校验依赖图并封存容器
    ///
    /// 配置、注册或校验出错时不会返回容器，此时没有任何生产者被调用过。
    /// 最长依赖链超过 `max_resolution_depth` 同样在这里报告。
    pub fn build(self) -> ContainerResult<Container> {
        self.config.validate().map_err(|e| {
            error!("容器配置无效: {}", e);
            ContainerError::InvalidConfig {
                message: e.to_string(),
            }
        })?;

        if let Some(e) = self.pending_error {
            error!("服务注册失败: {}", e);
            return Err(e.into());
        }

        let bindings = GraphValidator::new(&self.registry, self.config.default_strategy)
            .with_max_depth(self.config.max_resolution_depth)
            .check()
            .map_err(|e| {
                error!("依赖图校验失败: {}", e);
                e
            })?;

        let count = self.registry.len();
        let container = Container::new(self.registry, bindings, self.config);
        info!(container = %container.id(), "容器构建完成，共 {} 个服务", count);
        Ok(container)
    }
}
