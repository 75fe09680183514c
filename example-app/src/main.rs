//! # 示例应用程序
//!
//! 演示依赖注入容器的完整流程：以模块注册服务、作用域资源、trait 视图、
//! 延迟引用、按类型查询，以及关闭时按逆序释放资源。

use clap::Parser;
use di_abstractions::{Constant, ContainerConfig, Factory, Lazy, ServiceModule, ServiceSet};
use di_impl::ContainerBuilder;
use infrastructure_common::ScopedResource;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "example-app")]
#[command(about = "Lorn ADSP 依赖注入容器示例")]
struct Args {
    /// 容器配置文件路径（不含扩展名时自动探测）
    #[arg(short, long, default_value = "config/container")]
    config: String,

    /// 日志级别，`RUST_LOG` 存在时以其为准
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 数据库地址
    #[arg(long, default_value = "postgres://localhost/adsp")]
    database_url: String,

    /// 连接池大小
    #[arg(long, default_value_t = 4)]
    pool_size: usize,
}

/// 数据库设置
#[derive(Debug, Clone)]
struct DatabaseSettings {
    url: String,
    pool_size: usize,
}

/// 记录作用域资源的释放顺序
#[derive(Debug, Default)]
struct ReleaseLog(Mutex<Vec<&'static str>>);

impl ReleaseLog {
    fn record(&self, name: &'static str) {
        self.0.lock().push(name);
    }
}

/// 连接池
struct ConnectionPool {
    settings: Arc<DatabaseSettings>,
    log: Arc<ReleaseLog>,
}

/// 连接池进入后得到的连接集合
#[derive(Debug)]
struct Connections {
    url: String,
    size: usize,
}

impl ScopedResource for ConnectionPool {
    type Target = Connections;

    fn enter(&mut self) -> anyhow::Result<Connections> {
        info!("打开连接池: {} ({} 个连接)", self.settings.url, self.settings.pool_size);
        Ok(Connections {
            url: self.settings.url.clone(),
            size: self.settings.pool_size,
        })
    }

    fn exit(&mut self) -> anyhow::Result<()> {
        info!("关闭连接池: {}", self.settings.url);
        self.log.record("connection_pool");
        Ok(())
    }
}

/// 审计通道，依赖连接池，因此总是在连接池之前释放
struct AuditChannel {
    connections: Arc<Connections>,
    log: Arc<ReleaseLog>,
}

/// 审计写入端
#[derive(Debug)]
struct AuditSink {
    target: String,
}

impl ScopedResource for AuditChannel {
    type Target = AuditSink;

    fn enter(&mut self) -> anyhow::Result<AuditSink> {
        Ok(AuditSink {
            target: format!("{}#audit", self.connections.url),
        })
    }

    fn exit(&mut self) -> anyhow::Result<()> {
        self.log.record("audit_channel");
        Ok(())
    }
}

trait Repository: Send + Sync {
    fn entity(&self) -> &'static str;

    fn describe(&self) -> String;
}

struct UserRepository {
    connections: Arc<Connections>,
}

impl Repository for UserRepository {
    fn entity(&self) -> &'static str {
        "user"
    }

    fn describe(&self) -> String {
        format!("{} 仓储，{} 个连接", self.entity(), self.connections.size)
    }
}

struct OrderRepository {
    connections: Arc<Connections>,
}

impl Repository for OrderRepository {
    fn entity(&self) -> &'static str {
        "order"
    }

    fn describe(&self) -> String {
        format!("{} 仓储，{} 个连接", self.entity(), self.connections.size)
    }
}

/// 订单服务只持有用户服务的延迟引用
struct OrderService {
    orders: Arc<dyn Repository>,
    users: Lazy<UserService>,
}

struct UserService {
    users: Arc<dyn Repository>,
    orders: Arc<OrderService>,
}

/// 数据访问模块
struct DataModule {
    settings: DatabaseSettings,
    log: Arc<ReleaseLog>,
}

impl ServiceModule for DataModule {
    fn configure(&self, services: &mut ServiceSet) {
        let pool_log = Arc::clone(&self.log);
        let audit_log = Arc::clone(&self.log);

        services
            .add("database", Constant::new(self.settings.clone()))
            .add(
                "connection_pool",
                Factory::scoped(move |deps| {
                    Ok(ConnectionPool {
                        settings: deps.get::<DatabaseSettings>("database")?,
                        log: Arc::clone(&pool_log),
                    })
                })
                .depends_on::<DatabaseSettings>("database"),
            )
            .add(
                "audit_channel",
                Factory::scoped(move |deps| {
                    Ok(AuditChannel {
                        connections: deps.get::<Connections>("connection_pool")?,
                        log: Arc::clone(&audit_log),
                    })
                })
                .depends_on::<Connections>("connection_pool"),
            )
            .add(
                "user_repository",
                Factory::new(|deps| {
                    Ok(UserRepository {
                        connections: deps.get::<Connections>("connection_pool")?,
                    })
                })
                .depends_on::<Connections>("connection_pool")
                .implements::<dyn Repository, _>(|repo| repo as Arc<dyn Repository>),
            )
            .add(
                "order_repository",
                Factory::new(|deps| {
                    Ok(OrderRepository {
                        connections: deps.get::<Connections>("connection_pool")?,
                    })
                })
                .depends_on::<Connections>("connection_pool")
                .implements::<dyn Repository, _>(|repo| repo as Arc<dyn Repository>),
            );
    }
}

/// 业务服务
fn business_services() -> ServiceSet {
    ServiceSet::new()
        .with(
            "order_service",
            Factory::new(|deps| {
                Ok(OrderService {
                    orders: deps.get::<dyn Repository>("order_repository")?,
                    users: deps.resolver().lazy("user_service"),
                })
            })
            .depends_on::<dyn Repository>("order_repository"),
        )
        .with(
            "user_service",
            Factory::new(|deps| {
                Ok(UserService {
                    users: deps.get::<dyn Repository>("user_repository")?,
                    orders: deps.get::<OrderService>("order_service")?,
                })
            })
            .depends_on::<dyn Repository>("user_repository")
            .depends_on::<OrderService>("order_service"),
        )
}

fn main() {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("启动依赖注入容器示例");
    if let Err(e) = run(&args) {
        error!("示例运行失败: {:#}", e);
        std::process::exit(1);
    }
    info!("示例结束");
}

fn run(args: &Args) -> anyhow::Result<()> {
    let config = ContainerConfig::load(&args.config)?;
    info!("容器配置: {:?}", config);

    let log = Arc::new(ReleaseLog::default());
    let module = DataModule {
        settings: DatabaseSettings {
            url: args.database_url.clone(),
            pool_size: args.pool_size,
        },
        log: Arc::clone(&log),
    };

    let container = ContainerBuilder::with_config(config)
        .source(&module)
        .source(business_services())
        .build()?;
    info!("已注册服务: {:?}", container.keys().collect::<Vec<_>>());

    let users = container.get::<UserService>("user_service")?;
    info!("用户服务就绪: {}", users.users.describe());

    let back = users.orders.users.get()?;
    info!(
        "订单服务通过延迟引用拿到的用户服务与容器中的实例相同: {}",
        Arc::ptr_eq(&users, &back)
    );
    info!("订单服务使用: {}", users.orders.orders.describe());

    let audit = container.get::<AuditSink>("audit_channel")?;
    info!("审计写入端: {}", audit.target);

    for repository in container.find_all_by_type::<dyn Repository>() {
        info!("发现仓储: {}", repository?.describe());
    }

    println!("{}", serde_json::to_string_pretty(&container.stats())?);

    container.close()?;
    println!("释放顺序: {:?}", log.0.lock());
    Ok(())
}
