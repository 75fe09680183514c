//! 服务解析抽象
//!
//! 生产者通过 [`Dependencies`] 获取依赖。依赖可能已经就绪，也可能因为处于
//! 循环中而只能以延迟引用的形式存在，延迟引用在首次解引用时才向容器求值。

use crate::descriptor::{Instance, ProducedType};
use indexmap::IndexMap;
use infrastructure_common::{ResolutionError, ResolutionResult, TypeInfo};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

/// 服务解析器 trait
pub trait ServiceResolver: Send + Sync {
    /// 按名称解析服务
    ///
    /// 服务正在构建中（位于当前解析栈上）时返回 [`ServiceRef::Deferred`]，
    /// 否则返回已就绪的实例。
    fn resolve_ref(&self, name: &str) -> ResolutionResult<ServiceRef>;

    /// 是否注册了指定名称的服务
    fn contains(&self, name: &str) -> bool;
}

/// 已就绪的服务实例
#[derive(Clone)]
pub struct ResolvedService {
    name: String,
    instance: Instance,
    produced: ProducedType,
}

impl ResolvedService {
    /// 创建已就绪的服务
    pub fn new(name: impl Into<String>, instance: Instance, produced: ProducedType) -> Self {
        Self {
            name: name.into(),
            instance,
            produced,
        }
    }

    /// 服务名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 类型擦除的实例
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// 声明的生产类型
    pub fn produced_type(&self) -> &ProducedType {
        &self.produced
    }

    /// 按请求的类型取出实例
    pub fn cast<T: ?Sized + 'static>(&self) -> ResolutionResult<Arc<T>> {
        self.produced
            .cast::<T>(&self.instance)
            .ok_or_else(|| ResolutionError::TypeMismatch {
                name: self.name.clone(),
                expected: TypeInfo::of::<T>(),
                actual: self.produced.info(),
            })
    }
}

impl fmt::Debug for ResolvedService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedService")
            .field("name", &self.name)
            .field("produced", &self.produced)
            .finish()
    }
}

/// 延迟引用：持有名称和解析器句柄，解引用时才求值
#[derive(Clone, Debug)]
pub struct DeferredRef {
    name: String,
    resolver: ResolverHandle,
}

impl DeferredRef {
    /// 创建延迟引用
    pub fn new(name: impl Into<String>, resolver: ResolverHandle) -> Self {
        Self {
            name: name.into(),
            resolver,
        }
    }

    /// 引用的服务名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 求值，服务仍在构建中时返回 [`ResolutionError::InProgress`]
    pub fn resolve(&self) -> ResolutionResult<ResolvedService> {
        match self.resolver.get_ref(&self.name)? {
            ServiceRef::Ready(service) => Ok(service),
            ServiceRef::Deferred(_) => Err(ResolutionError::InProgress {
                name: self.name.clone(),
            }),
        }
    }
}

/// 服务引用
#[derive(Clone, Debug)]
pub enum ServiceRef {
    /// 已就绪
    Ready(ResolvedService),
    /// 延迟
    Deferred(DeferredRef),
}

impl ServiceRef {
    /// 服务名称
    pub fn name(&self) -> &str {
        match self {
            Self::Ready(service) => service.name(),
            Self::Deferred(deferred) => deferred.name(),
        }
    }

    /// 是否为延迟引用
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }

    /// 求值为已就绪的服务
    pub fn resolve(&self) -> ResolutionResult<ResolvedService> {
        match self {
            Self::Ready(service) => Ok(service.clone()),
            Self::Deferred(deferred) => deferred.resolve(),
        }
    }

    /// 按请求的类型取出实例
    pub fn get<T: ?Sized + 'static>(&self) -> ResolutionResult<Arc<T>> {
        match self {
            Self::Ready(service) => service.cast::<T>(),
            Self::Deferred(deferred) => deferred.resolve()?.cast::<T>(),
        }
    }
}

/// 带类型的延迟句柄
///
/// 在构造期间保存下来，等到所在的循环全部构建完成后再调用 [`Lazy::get`]。
pub struct Lazy<T: ?Sized> {
    reference: ServiceRef,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + 'static> Lazy<T> {
    /// 包装服务引用
    pub fn new(reference: ServiceRef) -> Self {
        Self {
            reference,
            _marker: PhantomData,
        }
    }

    /// 引用的服务名称
    pub fn name(&self) -> &str {
        self.reference.name()
    }

    /// 取出实例
    pub fn get(&self) -> ResolutionResult<Arc<T>> {
        self.reference.get::<T>()
    }
}

impl<T: ?Sized> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            reference: self.reference.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("name", &self.reference.name())
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

/// 解析器句柄
///
/// 只持有弱引用，生产者保存句柄不会延长容器的生命周期。
#[derive(Clone)]
pub struct ResolverHandle {
    resolver: Weak<dyn ServiceResolver>,
}

struct Detached;

impl ServiceResolver for Detached {
    fn resolve_ref(&self, name: &str) -> ResolutionResult<ServiceRef> {
        Err(ResolutionError::ContainerDropped {
            name: name.to_string(),
        })
    }

    fn contains(&self, _name: &str) -> bool {
        false
    }
}

impl ResolverHandle {
    /// 包装解析器的弱引用
    pub fn new(resolver: Weak<dyn ServiceResolver>) -> Self {
        Self { resolver }
    }

    /// 不指向任何解析器的句柄
    pub fn detached() -> Self {
        let resolver: Weak<dyn ServiceResolver> = Weak::<Detached>::new();
        Self { resolver }
    }

    /// 解析器是否仍然存活
    pub fn is_alive(&self) -> bool {
        self.resolver.strong_count() > 0
    }

    /// 按名称解析服务引用
    pub fn get_ref(&self, name: &str) -> ResolutionResult<ServiceRef> {
        let resolver = self
            .resolver
            .upgrade()
            .ok_or_else(|| ResolutionError::ContainerDropped {
                name: name.to_string(),
            })?;
        resolver.resolve_ref(name)
    }

    /// 按名称解析并取出实例
    pub fn get<T: ?Sized + 'static>(&self, name: &str) -> ResolutionResult<Arc<T>> {
        self.get_ref(name)?.get::<T>()
    }

    /// 创建延迟句柄，此时不做任何解析
    pub fn lazy<T: ?Sized + 'static>(&self, name: impl Into<String>) -> Lazy<T> {
        Lazy::new(ServiceRef::Deferred(DeferredRef::new(name, self.clone())))
    }
}

impl fmt::Debug for ResolverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// 生产者可见的依赖集合
///
/// 键为依赖位名称（即生产者声明的参数名），按声明顺序排列。
pub struct Dependencies {
    consumer: String,
    slots: IndexMap<String, ServiceRef>,
    resolver: ResolverHandle,
}

impl Dependencies {
    /// 创建依赖集合
    pub fn new(
        consumer: impl Into<String>,
        slots: IndexMap<String, ServiceRef>,
        resolver: ResolverHandle,
    ) -> Self {
        Self {
            consumer: consumer.into(),
            slots,
            resolver,
        }
    }

    /// 正在构建的服务名称
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// 依赖位的引用，未声明的依赖位返回错误
    pub fn reference(&self, slot: &str) -> ResolutionResult<&ServiceRef> {
        self.slots
            .get(slot)
            .ok_or_else(|| ResolutionError::UndeclaredDependency {
                consumer: self.consumer.clone(),
                dependency: slot.to_string(),
            })
    }

    /// 取出依赖实例
    ///
    /// 依赖处于循环中且尚未构建完成时返回 [`ResolutionError::InProgress`]，
    /// 这种情况应改用 [`Dependencies::lazy`]。
    pub fn get<T: ?Sized + 'static>(&self, slot: &str) -> ResolutionResult<Arc<T>> {
        self.reference(slot)?.get::<T>()
    }

    /// 取出依赖的延迟句柄
    pub fn lazy<T: ?Sized + 'static>(&self, slot: &str) -> ResolutionResult<Lazy<T>> {
        Ok(Lazy::new(self.reference(slot)?.clone()))
    }

    /// 依赖位是否处于延迟状态
    pub fn is_deferred(&self, slot: &str) -> bool {
        self.slots.get(slot).map_or(false, ServiceRef::is_deferred)
    }

    /// 解析器句柄，用于按需获取未声明的服务
    pub fn resolver(&self) -> &ResolverHandle {
        &self.resolver
    }

    /// 依赖位名称，按声明顺序
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// 依赖位数量
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// 是否没有依赖
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependencies")
            .field("consumer", &self.consumer)
            .field("slots", &self.slots.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(name: &str, value: u32) -> ServiceRef {
        ServiceRef::Ready(ResolvedService::new(
            name,
            Arc::new(value),
            ProducedType::of::<u32>(),
        ))
    }

    #[test]
    fn test_get_declared_slot() {
        let mut slots = IndexMap::new();
        slots.insert("port".to_string(), ready("port", 8080));
        let deps = Dependencies::new("server", slots, ResolverHandle::detached());

        assert_eq!(*deps.get::<u32>("port").unwrap(), 8080);
        assert_eq!(deps.names().collect::<Vec<_>>(), vec!["port"]);
    }

    #[test]
    fn test_undeclared_slot() {
        let deps = Dependencies::new("server", IndexMap::new(), ResolverHandle::detached());
        let error = deps.get::<u32>("port").unwrap_err();
        assert!(matches!(error, ResolutionError::UndeclaredDependency { .. }));
    }

    #[test]
    fn test_wrong_type_is_mismatch() {
        let error = ready("port", 1).get::<String>().unwrap_err();
        assert!(matches!(error, ResolutionError::TypeMismatch { .. }));
    }

    #[test]
    fn test_detached_handle_reports_dropped() {
        let handle = ResolverHandle::detached();
        assert!(!handle.is_alive());
        let lazy = handle.lazy::<u32>("port");
        assert_eq!(lazy.name(), "port");
        assert!(matches!(
            lazy.get().unwrap_err(),
            ResolutionError::ContainerDropped { .. }
        ));
    }
}
