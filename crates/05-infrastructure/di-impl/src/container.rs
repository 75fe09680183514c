//! 依赖注入容器
//!
//! 容器在构建时已经通过校验，之后只做两件事：按需构建并缓存实例，
//! 以及在关闭时按获取顺序的逆序释放作用域资源。

use crate::query::{TypeMatches, TypeQuery};
use crate::validator::DependencyBindings;
use di_abstractions::{
    ContainerConfig, ContainerStats, DeferredRef, Dependencies, ErasedScopedResource, Instance,
    Lazy, Produced, Producer, Registry, ResolvedService, ResolverHandle, ServiceDescriptor,
    ServiceRef, ServiceResolver,
};
use indexmap::IndexMap;
use infrastructure_common::{
    CloseError, QueryResult, ReleaseFailure, ResolutionError, ResolutionResult, ResolutionState,
    ScopedResource,
};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;

enum Slot {
    Unresolved,
    InProgress,
    Resolved(Instance),
}

impl Slot {
    fn state(&self) -> ResolutionState {
        match self {
            Self::Unresolved => ResolutionState::Unresolved,
            Self::InProgress => ResolutionState::InProgress,
            Self::Resolved(_) => ResolutionState::Resolved,
        }
    }
}

struct AcquiredScope {
    name: String,
    resource: Box<dyn ErasedScopedResource>,
}

#[derive(Default)]
struct ResolverState {
    slots: IndexMap<String, Slot>,
    stack: Vec<String>,
    scopes: Vec<AcquiredScope>,
    closed: bool,
}

type Built = (Instance, Option<Box<dyn ErasedScopedResource>>);

/// 构建期间占用的槽位
///
/// 无论构建成功、失败还是生产者 panic，离开作用域时都会弹出解析栈；
/// 槽位仍处于构建中时恢复为未解析，下次访问会重新调用生产者。
struct Construction<'s> {
    state: &'s RefCell<ResolverState>,
    name: &'s str,
    depth: usize,
}

impl Drop for Construction<'_> {
    fn drop(&mut self) {
        let Ok(mut state) = self.state.try_borrow_mut() else {
            return;
        };
        state.stack.truncate(self.depth);
        if let Some(slot) = state.slots.get_mut(self.name) {
            if matches!(slot, Slot::InProgress) {
                *slot = Slot::Unresolved;
            }
        }
    }
}

struct ContainerInner {
    id: Uuid,
    registry: Registry,
    bindings: DependencyBindings,
    config: ContainerConfig,
    handle: ResolverHandle,
    // 同一线程内的递归解析可以重入，不同线程之间按容器串行
    state: ReentrantMutex<RefCell<ResolverState>>,
}

impl ContainerInner {
    fn ready(&self, descriptor: &ServiceDescriptor, instance: Instance) -> ServiceRef {
        ServiceRef::Ready(ResolvedService::new(
            descriptor.name(),
            instance,
            descriptor.produced_type().clone(),
        ))
    }

    fn construct(&self, descriptor: &ServiceDescriptor) -> ResolutionResult<Built> {
        let name = descriptor.name();
        let factory = match descriptor.producer() {
            Producer::Value(instance) => return Ok((Arc::clone(instance), None)),
            Producer::Factory(factory) => factory,
        };

        let mut slots = IndexMap::with_capacity(descriptor.dependencies().len());
        for (slot, provider) in self.bindings.slots(name) {
            slots.insert(slot.to_string(), self.resolve_ref(provider)?);
        }
        let dependencies = Dependencies::new(name, slots, self.handle.clone());

        debug!(container = %self.id, service = name, "调用生产者");
        let produced = factory(&dependencies)
            .map_err(unwrap_resolution_error)?
            .ok_or_else(|| ResolutionError::NullProducedValue {
                name: name.to_string(),
            })?;

        let expected = descriptor.produced_type();
        match produced {
            Produced::Value(instance) => {
                if !expected.accepts(&instance) {
                    return Err(ResolutionError::ProducedTypeMismatch {
                        name: name.to_string(),
                        expected: expected.info(),
                    });
                }
                Ok((instance, None))
            }
            Produced::Scoped(mut resource) => {
                let instance = resource.enter().map_err(unwrap_resolution_error)?;
                if !expected.accepts(&instance) {
                    if let Err(e) = resource.exit() {
                        warn!(container = %self.id, service = name, "释放类型错误的作用域资源失败: {}", e);
                    }
                    return Err(ResolutionError::ProducedTypeMismatch {
                        name: name.to_string(),
                        expected: expected.info(),
                    });
                }
                debug!(container = %self.id, service = name, "进入作用域资源");
                Ok((instance, Some(resource)))
            }
        }
    }
}

impl ServiceResolver for ContainerInner {
    fn resolve_ref(&self, name: &str) -> ResolutionResult<ServiceRef> {
        let descriptor = self
            .registry
            .get(name)
            .ok_or_else(|| ResolutionError::NameNotFound {
                name: name.to_string(),
            })?;

        let guard = self.state.lock();
        let depth = {
            let mut state = guard.borrow_mut();
            let state = &mut *state;
            let slot = state
                .slots
                .get_mut(name)
                .ok_or_else(|| ResolutionError::NameNotFound {
                    name: name.to_string(),
                })?;
            match &*slot {
                Slot::Resolved(instance) => return Ok(self.ready(descriptor, Arc::clone(instance))),
                Slot::InProgress => {
                    debug!(container = %self.id, service = name, "服务正在构建中，返回延迟引用");
                    return Ok(ServiceRef::Deferred(DeferredRef::new(name, self.handle.clone())));
                }
                Slot::Unresolved => {}
            }
            if state.closed {
                return Err(ResolutionError::ContainerClosed {
                    name: name.to_string(),
                });
            }
            if state.stack.len() >= self.config.max_resolution_depth {
                return Err(ResolutionError::DepthExceeded {
                    name: name.to_string(),
                    depth: self.config.max_resolution_depth,
                });
            }
            *slot = Slot::InProgress;
            let depth = state.stack.len();
            state.stack.push(name.to_string());
            depth
        };
        let _construction = Construction {
            state: &guard,
            name,
            depth,
        };

        match self.construct(descriptor) {
            Ok((instance, scope)) => {
                let mut state = guard.borrow_mut();
                state
                    .slots
                    .insert(name.to_string(), Slot::Resolved(Arc::clone(&instance)));
                if let Some(resource) = scope {
                    state.scopes.push(AcquiredScope {
                        name: name.to_string(),
                        resource,
                    });
                }
                Ok(self.ready(descriptor, instance))
            }
            Err(e) => {
                debug!(container = %self.id, service = name, "服务构建失败: {}", e);
                Err(e)
            }
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.registry.contains(name)
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        if !self.config.release_on_drop {
            return;
        }
        let scopes = std::mem::take(&mut self.state.get_mut().get_mut().scopes);
        if scopes.is_empty() {
            return;
        }
        warn!(
            container = %self.id,
            "容器未关闭即被释放，释放剩余的 {} 个作用域资源",
            scopes.len()
        );
        release(self.id, scopes);
    }
}

/// 还原经由生产者 `?` 透传的容器错误，其余错误作为生产者错误保留
fn unwrap_resolution_error(error: anyhow::Error) -> ResolutionError {
    match error.downcast::<ResolutionError>() {
        Ok(resolution) => resolution,
        Err(other) => ResolutionError::Producer(other),
    }
}

fn release(id: Uuid, scopes: Vec<AcquiredScope>) -> Vec<ReleaseFailure> {
    let mut failures = Vec::new();
    for mut scope in scopes.into_iter().rev() {
        match scope.resource.exit() {
            Ok(()) => debug!(container = %id, service = %scope.name, "作用域资源已释放"),
            Err(source) => {
                warn!(container = %id, service = %scope.name, "作用域资源释放失败: {}", source);
                failures.push(ReleaseFailure {
                    name: scope.name,
                    source,
                });
            }
        }
    }
    failures
}

/// 依赖注入容器
///
/// 克隆得到的是同一个容器的另一个句柄。
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    pub(crate) fn new(registry: Registry, bindings: DependencyBindings, config: ContainerConfig) -> Self {
        let slots = registry
            .items()
            .map(|(name, descriptor)| {
                let slot = match descriptor.initial_instance() {
                    Some(instance) => Slot::Resolved(Arc::clone(instance)),
                    None => Slot::Unresolved,
                };
                (name.to_string(), slot)
            })
            .collect();

        let inner = Arc::new_cyclic(|weak: &Weak<ContainerInner>| {
            let resolver: Weak<dyn ServiceResolver> = weak.clone();
            ContainerInner {
                id: Uuid::new_v4(),
                registry,
                bindings,
                config,
                handle: ResolverHandle::new(resolver),
                state: ReentrantMutex::new(RefCell::new(ResolverState {
                    slots,
                    ..ResolverState::default()
                })),
            }
        });
        Self { inner }
    }

    /// 容器ID
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// 容器配置
    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    /// 获取服务实例
    ///
    /// `T` 可以是服务的具体类型，也可以是注册时声明的视图（例如 trait 对象）。
    pub fn get<T: ?Sized + 'static>(&self, name: &str) -> ResolutionResult<Arc<T>> {
        self.get_ref(name)?.get::<T>()
    }

    /// 获取服务引用，服务正在构建中时返回延迟引用
    pub fn get_ref(&self, name: &str) -> ResolutionResult<ServiceRef> {
        self.inner.resolve_ref(name)
    }

    /// 创建延迟句柄，此时不做任何解析
    pub fn lazy<T: ?Sized + 'static>(&self, name: impl Into<String>) -> Lazy<T> {
        self.inner.handle.lazy(name)
    }

    /// 指向本容器的弱句柄
    pub fn handle(&self) -> ResolverHandle {
        self.inner.handle.clone()
    }

    /// 所有服务名称，按注册顺序
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.inner.registry.keys()
    }

    /// 所有服务名称与描述符，按注册顺序
    pub fn items(&self) -> impl Iterator<Item = (&str, &ServiceDescriptor)> {
        self.inner.registry.items()
    }

    /// 服务描述符
    pub fn descriptor(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.inner.registry.get(name)
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// 服务数量
    pub fn len(&self) -> usize {
        self.inner.registry.len()
    }

    /// 是否没有任何服务
    pub fn is_empty(&self) -> bool {
        self.inner.registry.is_empty()
    }

    /// 是否注册了指定名称
    pub fn contains(&self, name: &str) -> bool {
        self.inner.registry.contains(name)
    }

    /// 服务的解析状态
    pub fn state_of(&self, name: &str) -> Option<ResolutionState> {
        let guard = self.inner.state.lock();
        let state = guard.borrow();
        state.slots.get(name).map(Slot::state)
    }

    /// 统计信息
    pub fn stats(&self) -> ContainerStats {
        let guard = self.inner.state.lock();
        let state = guard.borrow();
        ContainerStats {
            registered_services: self.inner.registry.len(),
            resolved_services: state
                .slots
                .values()
                .filter(|slot| matches!(slot, Slot::Resolved(_)))
                .count(),
            active_scoped_resources: state.scopes.len(),
            closed: state.closed,
        }
    }

    /// 按类型查询
    pub fn query(&self) -> TypeQuery<'_> {
        TypeQuery::new(self)
    }

    /// 查找唯一的类型匹配服务
    pub fn find_one_by_type<T: ?Sized + 'static>(&self) -> QueryResult<Arc<T>> {
        self.query().find_one::<T>()
    }

    /// 按注册顺序惰性遍历所有类型匹配的服务
    pub fn find_all_by_type<T: ?Sized + 'static>(&self) -> TypeMatches<'_, T> {
        self.query().find_all::<T>()
    }

    /// 关闭容器，按获取顺序的逆序释放作用域资源
    ///
    /// 某个资源释放失败不会中断其余资源的释放，所有失败一并返回。
    /// 重复调用不做任何事。已缓存的实例在关闭后仍可获取。
    pub fn close(&self) -> Result<(), CloseError> {
        let scopes = {
            let guard = self.inner.state.lock();
            let mut state = guard.borrow_mut();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            std::mem::take(&mut state.scopes)
        };

        let count = scopes.len();
        let failures = release(self.inner.id, scopes);
        info!(
            container = %self.inner.id,
            "容器已关闭，释放 {} 个作用域资源，失败 {} 个",
            count,
            failures.len()
        );
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CloseError { failures })
        }
    }

    /// 是否已关闭
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().borrow().closed
    }

    /// 创建离开作用域时自动关闭容器的守卫
    pub fn scope(&self) -> ContainerScope {
        ContainerScope {
            container: self.clone(),
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.inner.id)
            .field("services", &self.inner.registry)
            .finish()
    }
}

impl ScopedResource for Container {
    type Target = Container;

    fn enter(&mut self) -> anyhow::Result<Container> {
        Ok(self.clone())
    }

    fn exit(&mut self) -> anyhow::Result<()> {
        self.close()?;
        Ok(())
    }
}

/// 容器作用域守卫
///
/// 守卫释放时关闭容器，释放失败只记录日志；需要错误详情时调用 [`ContainerScope::close`]。
pub struct ContainerScope {
    container: Container,
}

impl ContainerScope {
    /// 显式关闭并返回释放错误
    pub fn close(self) -> Result<(), CloseError> {
        self.container.close()
    }
}

impl Deref for ContainerScope {
    type Target = Container;

    fn deref(&self) -> &Container {
        &self.container
    }
}

impl Drop for ContainerScope {
    fn drop(&mut self) {
        if let Err(e) = self.container.close() {
            warn!(container = %self.container.id(), "作用域结束时关闭容器失败: {}", e);
        }
    }
}
