//! 错误类型定义
//!
//! 错误按照发生的阶段划分：注册（配置错误）、封存（校验错误）、
//! 首次访问（解析错误）、按类型查询（查询错误）以及关闭容器（释放错误）。

use crate::metadata::TypeInfo;
use thiserror::Error;

/// 容器配置加载错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置解析失败: {source}")]
    ParseError {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("配置验证失败: {message}")]
    ValidationError { message: String },
}

/// 配置错误类型
///
/// 在注册/合并阶段产生，早于任何校验。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("服务 {name} 的值为空")]
    NullValue { name: String },

    #[error("服务 {name} 缺少生产者")]
    MissingProducer { name: String },

    #[error("服务 {name} 缺少返回类型声明")]
    MissingReturnType { name: String },

    #[error("服务 {name} 的参数 {parameter} 缺少类型声明")]
    MissingParameterType { name: String, parameter: String },

    #[error("服务 {name} 的参数 {parameter} 重复声明")]
    DuplicateParameter { name: String, parameter: String },

    #[error("重复的服务名称: {names:?}")]
    DuplicateNames { names: Vec<String> },

    #[error("服务 {name} 的值与声明的类型 {expected} 不符")]
    ValueTypeMismatch { name: String, expected: TypeInfo },
}

/// 校验错误类型
///
/// 在容器封存时产生，此时尚未创建任何实例。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("未解析的依赖: {consumer} => {dependency}: {required}")]
    UnresolvedDependency {
        consumer: String,
        dependency: String,
        required: TypeInfo,
    },

    #[error("{consumer} 依赖 {dependency}: {expected}，但 {dependency} 的类型是 {actual}")]
    TypeMismatch {
        consumer: String,
        dependency: String,
        expected: TypeInfo,
        actual: TypeInfo,
    },

    #[error("{repeated} 依赖自身，依赖路径: {}", format_path(.path, .repeated))]
    CyclicDependency { path: Vec<String>, repeated: String },

    #[error("{consumer} 的依赖 {dependency}: {required} 没有匹配的提供者")]
    NoCandidate {
        consumer: String,
        dependency: String,
        required: TypeInfo,
    },

    #[error("{consumer} 的依赖 {dependency}: {required} 匹配到多个提供者: {candidates:?}")]
    AmbiguousDependency {
        consumer: String,
        dependency: String,
        required: TypeInfo,
        candidates: Vec<String>,
    },

    #[error("依赖链 {} 超过最大解析深度 {limit}", .chain.join(" -> "))]
    DepthExceeded { chain: Vec<String>, limit: usize },
}

impl ValidationError {
    /// 创建循环依赖错误
    pub fn cycle(path: Vec<String>, repeated: impl Into<String>) -> Self {
        Self::CyclicDependency {
            path,
            repeated: repeated.into(),
        }
    }

    /// 循环本身的成员（从第一次出现重复名称的位置开始）
    ///
    /// 遍历根不在环上时，`path` 会带有通往环的前缀，这里将其去掉。
    pub fn cycle_members(&self) -> Option<&[String]> {
        match self {
            Self::CyclicDependency { path, repeated } => {
                let start = path.iter().position(|name| name == repeated).unwrap_or(0);
                Some(&path[start..])
            }
            _ => None,
        }
    }
}

fn format_path(path: &[String], repeated: &str) -> String {
    let mut rendered = path.join(" -> ");
    if !rendered.is_empty() {
        rendered.push_str(" -> ");
    }
    rendered.push_str(repeated);
    rendered
}

/// 解析错误类型
///
/// 在首次访问某个服务时产生，只影响本次调用。
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("服务不存在: {name}")]
    NameNotFound { name: String },

    #[error("服务 {name} 的生产者返回了空值")]
    NullProducedValue { name: String },

    #[error("服务 {name} 的生产者返回了错误的类型，期望 {expected}")]
    ProducedTypeMismatch { name: String, expected: TypeInfo },

    #[error("服务 {name} 类型不匹配: 期望 {expected}, 实际 {actual}")]
    TypeMismatch {
        name: String,
        expected: TypeInfo,
        actual: TypeInfo,
    },

    #[error("服务 {name} 仍在构建中，只能以延迟引用方式获取")]
    InProgress { name: String },

    #[error("服务 {consumer} 没有声明依赖 {dependency}")]
    UndeclaredDependency { consumer: String, dependency: String },

    #[error("解析 {name} 时超过最大解析深度 {depth}")]
    DepthExceeded { name: String, depth: usize },

    #[error("容器已关闭，无法构建服务 {name}")]
    ContainerClosed { name: String },

    #[error("容器已释放，无法解引用服务 {name}")]
    ContainerDropped { name: String },

    /// 生产者或作用域资源自身的错误，原样透传
    #[error(transparent)]
    Producer(#[from] anyhow::Error),
}

impl ResolutionError {
    /// 是否为生产者自身的错误（而非容器层面的错误）
    pub fn is_producer_error(&self) -> bool {
        matches!(self, Self::Producer(_))
    }

    /// 尝试把生产者错误还原为具体类型
    pub fn producer_error<E>(&self) -> Option<&E>
    where
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        match self {
            Self::Producer(source) => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// 按类型查询错误
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("没有类型为 {required} 的服务")]
    NoMatch { required: TypeInfo },

    #[error("类型为 {required} 的服务不唯一: {candidates:?}")]
    Ambiguous {
        required: TypeInfo,
        candidates: Vec<String>,
    },

    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

/// 单个作用域资源的释放失败
#[derive(Error, Debug)]
#[error("释放作用域资源 {name} 失败: {source}")]
pub struct ReleaseFailure {
    /// 服务名称
    pub name: String,
    /// 释放时的错误
    #[source]
    pub source: anyhow::Error,
}

/// 关闭容器时的聚合错误
///
/// 即使某个资源释放失败，其余资源仍会继续释放，所有失败在这里一并返回。
#[derive(Error, Debug)]
#[error("关闭容器时有 {} 个作用域资源释放失败: {:?}", .failures.len(), failed_names(.failures))]
pub struct CloseError {
    /// 按释放顺序排列的失败记录
    pub failures: Vec<ReleaseFailure>,
}

impl CloseError {
    /// 释放失败的服务名称，按释放顺序
    pub fn names(&self) -> Vec<&str> {
        failed_names(&self.failures)
    }
}

fn failed_names(failures: &[ReleaseFailure]) -> Vec<&str> {
    failures.iter().map(|failure| failure.name.as_str()).collect()
}

/// 容器构建错误
///
/// 配置错误和校验错误都会中止整个构建，不会返回部分可用的容器。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    #[error("配置错误: {source}")]
    Configuration {
        #[from]
        source: ConfigurationError,
    },

    #[error("校验错误: {source}")]
    Validation {
        #[from]
        source: ValidationError,
    },

    #[error("容器配置无效: {message}")]
    InvalidConfig { message: String },
}

/// 结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;
pub type ValidationResult<T> = Result<T, ValidationError>;
pub type ResolutionResult<T> = Result<T, ResolutionError>;
pub type QueryResult<T> = Result<T, QueryError>;
pub type ContainerResult<T> = Result<T, ContainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_members_strip_prefix() {
        let error = ValidationError::cycle(
            vec!["root".to_string(), "a".to_string(), "b".to_string()],
            "a",
        );
        let members = error.cycle_members().unwrap();
        assert_eq!(members, ["a".to_string(), "b".to_string()]);
        assert_eq!(error.to_string(), "a 依赖自身，依赖路径: root -> a -> b -> a");
    }

    #[test]
    fn test_self_cycle_is_path_of_one() {
        let error = ValidationError::cycle(vec!["a".to_string()], "a");
        assert_eq!(error.cycle_members().unwrap().len(), 1);
    }

    #[test]
    fn test_depth_exceeded_renders_chain() {
        let error = ValidationError::DepthExceeded {
            chain: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            limit: 2,
        };
        assert_eq!(error.to_string(), "依赖链 a -> b -> c 超过最大解析深度 2");
        assert!(error.cycle_members().is_none());
    }

    #[test]
    fn test_producer_error_downcast() {
        #[derive(Debug, thiserror::Error)]
        #[error("连接失败")]
        struct ConnectError;

        let error = ResolutionError::from(anyhow::Error::new(ConnectError));
        assert!(error.is_producer_error());
        assert!(error.producer_error::<ConnectError>().is_some());
        assert_eq!(error.to_string(), "连接失败");
    }

    #[test]
    fn test_close_error_lists_names() {
        let error = CloseError {
            failures: vec![
                ReleaseFailure {
                    name: "pool".to_string(),
                    source: anyhow::anyhow!("busy"),
                },
                ReleaseFailure {
                    name: "cache".to_string(),
                    source: anyhow::anyhow!("io"),
                },
            ],
        };
        assert_eq!(error.names(), vec!["pool", "cache"]);
    }
}
