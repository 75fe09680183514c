//! 按类型查询
//!
//! 候选只根据描述符声明的类型筛选，不会为了判断类型而构建其他服务。

use crate::container::Container;
use infrastructure_common::{QueryError, QueryResult, ResolutionResult, TypeInfo};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// 类型查询
#[derive(Debug, Clone, Copy)]
pub struct TypeQuery<'c> {
    container: &'c Container,
}

impl<'c> TypeQuery<'c> {
    /// 创建查询
    pub fn new(container: &'c Container) -> Self {
        Self { container }
    }

    /// 生产类型可以作为 `T` 使用的服务名称，按注册顺序
    pub fn candidates<T: ?Sized + 'static>(&self) -> Vec<&'c str> {
        let required = TypeInfo::of::<T>();
        self.container
            .registry()
            .items()
            .filter(|(_, descriptor)| descriptor.produced_type().is_assignable_to(&required))
            .map(|(name, _)| name)
            .collect()
    }

    /// 获取唯一匹配的服务实例
    pub fn find_one<T: ?Sized + 'static>(&self) -> QueryResult<Arc<T>> {
        let candidates = self.candidates::<T>();
        match candidates.as_slice() {
            [] => Err(QueryError::NoMatch {
                required: TypeInfo::of::<T>(),
            }),
            [only] => Ok(self.container.get::<T>(only)?),
            _ => Err(QueryError::Ambiguous {
                required: TypeInfo::of::<T>(),
                candidates: candidates.iter().map(|name| (*name).to_string()).collect(),
            }),
        }
    }

    /// 惰性遍历所有匹配的服务实例
    pub fn find_all<T: ?Sized + 'static>(&self) -> TypeMatches<'c, T> {
        TypeMatches {
            container: self.container,
            required: TypeInfo::of::<T>(),
            position: 0,
            _marker: PhantomData,
        }
    }
}

/// 类型匹配的服务序列
///
/// 每次前进时才解析下一个匹配的服务；克隆后可以从当前位置重新遍历，
/// 已解析的服务直接取缓存，不会重复调用生产者。
pub struct TypeMatches<'c, T: ?Sized> {
    container: &'c Container,
    required: TypeInfo,
    position: usize,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<'c, T: ?Sized + 'static> Iterator for TypeMatches<'c, T> {
    type Item = ResolutionResult<Arc<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let registry = self.container.registry();
        while let Some(descriptor) = registry.get_index(self.position) {
            self.position += 1;
            if descriptor.produced_type().is_assignable_to(&self.required) {
                return Some(self.container.get::<T>(descriptor.name()));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.container.len().saturating_sub(self.position);
        (0, Some(remaining))
    }
}

impl<T: ?Sized> Clone for TypeMatches<'_, T> {
    fn clone(&self) -> Self {
        Self {
            container: self.container,
            required: self.required,
            position: self.position,
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for TypeMatches<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeMatches")
            .field("required", &self.required)
            .field("position", &self.position)
            .finish()
    }
}
