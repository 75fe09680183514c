//! 集中的容器场景测试

use di_abstractions::{Constant, Factory, MatchStrategy, ServiceModule, ServiceSet};
use di_impl::ContainerBuilder;
use infrastructure_common::{ContainerError, QueryError, TypeInfo, ValidationError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct A;

#[derive(Debug)]
struct B;

#[derive(Debug)]
struct C {
    a: Arc<A>,
}

trait Repository: Send + Sync {
    fn table(&self) -> &str;
}

struct UserRepository {
    table: Arc<String>,
}

impl Repository for UserRepository {
    fn table(&self) -> &str {
        &self.table
    }
}

struct UserService {
    repository: Arc<dyn Repository>,
}

/// 以模块方式注册的存储层
struct StorageModule;

impl ServiceModule for StorageModule {
    fn configure(&self, services: &mut ServiceSet) {
        services.value("table", "users".to_string()).add(
            "user_repository",
            Factory::new(|deps| {
                Ok(UserRepository {
                    table: deps.get::<String>("table")?,
                })
            })
            .depends_on::<String>("table")
            .implements::<dyn Repository, _>(|repo| repo as Arc<dyn Repository>),
        );
    }
}

#[test]
fn test_abc_scenario() {
    let a_calls = Arc::new(AtomicUsize::new(0));
    let c_calls = Arc::new(AtomicUsize::new(0));
    let (a_counter, c_counter) = (Arc::clone(&a_calls), Arc::clone(&c_calls));

    let container = ContainerBuilder::new()
        .source(
            ServiceSet::new()
                .with(
                    "a",
                    Factory::new(move |_| {
                        a_counter.fetch_add(1, Ordering::SeqCst);
                        Ok(A)
                    }),
                )
                .with("b", Factory::new(|_| Ok(B)))
                .with(
                    "c",
                    Factory::new(move |deps| {
                        c_counter.fetch_add(1, Ordering::SeqCst);
                        Ok(C {
                            a: deps.get::<A>("a")?,
                        })
                    })
                    .depends_on::<A>("a"),
                ),
        )
        .build()
        .unwrap();

    let c = container.get::<C>("c").unwrap();
    assert!(Arc::ptr_eq(&c.a, &container.get::<A>("a").unwrap()));
    container.get::<C>("c").unwrap();

    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(c_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_mutual_dependency_fails_build() {
    let error = ContainerBuilder::new()
        .source(
            ServiceSet::new()
                .with("a", Factory::new(|_| Ok(A)).depends_on::<B>("b"))
                .with("b", Factory::new(|_| Ok(B)).depends_on::<A>("a")),
        )
        .build()
        .unwrap_err();
    assert!(matches!(
        error,
        ContainerError::Validation {
            source: ValidationError::CyclicDependency { .. }
        }
    ));
}

#[test]
fn test_provider_of_wrong_type_fails_build() {
    let error = ContainerBuilder::new()
        .source(
            ServiceSet::new()
                .with("a", Factory::new(|_| Ok(A)).depends_on::<B>("b"))
                .with("b", Factory::new(|_| Ok(A))),
        )
        .build()
        .unwrap_err();
    let ContainerError::Validation { source } = error else {
        panic!("应为校验错误");
    };
    assert_eq!(
        source,
        ValidationError::TypeMismatch {
            consumer: "a".to_string(),
            dependency: "b".to_string(),
            expected: TypeInfo::of::<B>(),
            actual: TypeInfo::of::<A>(),
        }
    );
    assert_eq!(
        source.to_string(),
        "a 依赖 b: B，但 b 的类型是 A"
    );
}

#[test]
fn test_module_and_mapping_sources() {
    let container = ContainerBuilder::new()
        .source(&StorageModule)
        .source(ServiceSet::new().with(
            "user_service",
            Factory::new(|deps| {
                Ok(UserService {
                    repository: deps.get::<dyn Repository>("user_repository")?,
                })
            })
            .depends_on::<dyn Repository>("user_repository"),
        ))
        .build()
        .unwrap();

    assert_eq!(
        container.keys().collect::<Vec<_>>(),
        vec!["table", "user_repository", "user_service"]
    );
    let service = container.get::<UserService>("user_service").unwrap();
    assert_eq!(service.repository.table(), "users");

    let repository = container.find_one_by_type::<dyn Repository>().unwrap();
    assert!(Arc::ptr_eq(&repository, &service.repository));
}

#[test]
fn test_by_type_strategy_ignores_slot_names() {
    let container = ContainerBuilder::new()
        .strategy(MatchStrategy::ByType)
        .source(&StorageModule)
        .source(ServiceSet::new().with(
            "user_service",
            Factory::new(|deps| {
                Ok(UserService {
                    repository: deps.get::<dyn Repository>("repo")?,
                })
            })
            .depends_on::<dyn Repository>("repo"),
        ))
        .build()
        .unwrap();

    let service = container.get::<UserService>("user_service").unwrap();
    assert_eq!(service.repository.table(), "users");
}

#[test]
fn test_exact_strategy_rejects_trait_view() {
    let error = ContainerBuilder::new()
        .source(&StorageModule)
        .source(ServiceSet::new().with(
            "user_service",
            Factory::new(|deps| {
                Ok(UserService {
                    repository: deps.get::<dyn Repository>("user_repository")?,
                })
            })
            .depends_on_with::<dyn Repository>("user_repository", MatchStrategy::ExactType),
        ))
        .build()
        .unwrap_err();
    assert!(matches!(
        error,
        ContainerError::Validation {
            source: ValidationError::TypeMismatch { .. }
        }
    ));
}

#[test]
fn test_find_one_requires_single_match() {
    let container = ContainerBuilder::new()
        .source(
            ServiceSet::new()
                .with("first", Constant::new(A))
                .with("second", Constant::new(A))
                .with("only", Constant::new(B)),
        )
        .build()
        .unwrap();

    assert!(container.find_one_by_type::<B>().is_ok());
    assert!(matches!(
        container.find_one_by_type::<A>().unwrap_err(),
        QueryError::Ambiguous { .. }
    ));
    assert!(matches!(
        container.find_one_by_type::<C>().unwrap_err(),
        QueryError::NoMatch { .. }
    ));
    assert_eq!(container.find_all_by_type::<A>().count(), 2);
}
