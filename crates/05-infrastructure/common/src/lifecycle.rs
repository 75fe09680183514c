//! 服务生命周期管理

/// 服务解析状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionState {
    /// 未解析，生产者尚未成功执行
    Unresolved,
    /// 解析中，服务位于解析栈上
    InProgress,
    /// 已解析，实例已缓存
    Resolved,
}

impl Default for ResolutionState {
    fn default() -> Self {
        Self::Unresolved
    }
}

impl ResolutionState {
    /// 是否已缓存实例
    pub fn is_resolved(self) -> bool {
        matches!(self, Self::Resolved)
    }
}

/// 作用域资源 trait
///
/// 生产者可以返回一个作用域资源而不是普通值：容器在解析时调用 [`enter`](Self::enter)，
/// 把返回的目标值作为服务实例缓存，并在关闭时按获取顺序的逆序调用 [`exit`](Self::exit)。
///
/// ```
/// use infrastructure_common::ScopedResource;
///
/// struct Pool { open: bool }
///
/// impl ScopedResource for Pool {
///     type Target = String;
///
///     fn enter(&mut self) -> anyhow::Result<String> {
///         self.open = true;
///         Ok("postgres://localhost".to_string())
///     }
///
///     fn exit(&mut self) -> anyhow::Result<()> {
///         self.open = false;
///         Ok(())
///     }
/// }
/// ```
pub trait ScopedResource: Send + 'static {
    /// 进入作用域后得到的服务实例类型
    type Target: Send + Sync + 'static;

    /// 获取资源
    fn enter(&mut self) -> anyhow::Result<Self::Target>;

    /// 释放资源
    fn exit(&mut self) -> anyhow::Result<()>;
}
