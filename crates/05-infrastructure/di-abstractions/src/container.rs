//! 容器配置与统计

use crate::descriptor::MatchStrategy;
use infrastructure_common::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// 环境变量前缀，例如 `DI_MAX_RESOLUTION_DEPTH=32`
pub const ENV_PREFIX: &str = "DI";

/// 容器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// 依赖没有指定匹配策略时使用的策略
    pub default_strategy: MatchStrategy,
    /// 最大解析深度
    ///
    /// 构建时检查声明的最长依赖链，运行时限制经由句柄的重入解析。
    pub max_resolution_depth: usize,
    /// 容器释放时是否释放尚未关闭的作用域资源
    pub release_on_drop: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            default_strategy: MatchStrategy::Subtype,
            max_resolution_depth: 100,
            release_on_drop: true,
        }
    }
}

impl ContainerConfig {
    /// 从配置文件和环境变量加载
    ///
    /// 文件不存在时使用默认值；环境变量覆盖文件中的设置。
    pub fn load(path: &str) -> ConfigResult<Self> {
        debug!("加载容器配置: {}", path);

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| {
                error!("容器配置构建失败: {}", e);
                ConfigError::ParseError {
                    source: Box::new(e),
                }
            })?;

        Self::from_settings(settings)
    }

    /// 从 TOML 文本解析
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()
            .map_err(|e| ConfigError::ParseError {
                source: Box::new(e),
            })?;

        Self::from_settings(settings)
    }

    fn from_settings(settings: config::Config) -> ConfigResult<Self> {
        let config: Self = settings.try_deserialize().map_err(|e| {
            error!("容器配置绑定失败: {}", e);
            ConfigError::ParseError {
                source: Box::new(e),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_resolution_depth == 0 {
            return Err(ConfigError::ValidationError {
                message: "max_resolution_depth 必须大于 0".to_string(),
            });
        }
        Ok(())
    }

    /// 设置默认匹配策略
    #[must_use]
    pub fn with_default_strategy(mut self, strategy: MatchStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    /// 设置最大解析深度
    #[must_use]
    pub fn with_max_resolution_depth(mut self, depth: usize) -> Self {
        self.max_resolution_depth = depth;
        self
    }

    /// 设置释放时是否清理作用域资源
    #[must_use]
    pub fn with_release_on_drop(mut self, release: bool) -> Self {
        self.release_on_drop = release;
        self
    }
}

/// 容器统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerStats {
    /// 已注册服务数量
    pub registered_services: usize,
    /// 已缓存实例的服务数量
    pub resolved_services: usize,
    /// 尚未释放的作用域资源数量
    pub active_scoped_resources: usize,
    /// 是否已关闭
    pub closed: bool,
}
