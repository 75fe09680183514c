//! 依赖图的性质测试

use di_abstractions::{Factory, ServiceSet};
use di_impl::ContainerBuilder;
use infrastructure_common::{ContainerError, ValidationError};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn node(index: usize) -> String {
    format!("n{index}")
}

/// `graph[i]` 是节点 i 依赖的节点
fn services(graph: &[Vec<usize>], calls: &Arc<AtomicUsize>) -> ServiceSet {
    let mut services = ServiceSet::new();
    for (index, providers) in graph.iter().enumerate() {
        let calls = Arc::clone(calls);
        let mut factory = Factory::new(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(index)
        });
        for provider in providers {
            factory = factory.depends_on::<usize>(node(*provider));
        }
        services.add(node(index), factory);
    }
    services
}

/// 只从高编号指向低编号的随机无环图
fn dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..12).prop_flat_map(|size| {
        (0..size)
            .map(|index| proptest::sample::subsequence((0..index).collect::<Vec<_>>(), 0..=index))
            .collect::<Vec<_>>()
    })
}

/// 链 n0 <- n1 <- ... 加上一条从 lo 指向 hi 的回边
fn chain_with_back_edge() -> impl Strategy<Value = (usize, usize, usize)> {
    (1usize..10)
        .prop_flat_map(|size| (Just(size), 0..size))
        .prop_flat_map(|(size, lo)| (Just(size), Just(lo), lo..size))
}

proptest! {
    #[test]
    fn test_acyclic_graphs_validate_without_building(graph in dag()) {
        let calls = Arc::new(AtomicUsize::new(0));
        let container = ContainerBuilder::new()
            .source(services(&graph, &calls))
            .build()
            .unwrap();
        prop_assert_eq!(calls.load(Ordering::SeqCst), 0);

        for index in (0..graph.len()).rev() {
            prop_assert_eq!(*container.get::<usize>(&node(index)).unwrap(), index);
        }
        prop_assert_eq!(calls.load(Ordering::SeqCst), graph.len());

        container.get::<usize>(&node(0)).unwrap();
        prop_assert_eq!(calls.load(Ordering::SeqCst), graph.len());
    }

    #[test]
    fn test_back_edge_is_rejected_with_real_cycle((size, lo, hi) in chain_with_back_edge()) {
        let mut graph: Vec<Vec<usize>> = (0..size)
            .map(|index| if index == 0 { Vec::new() } else { vec![index - 1] })
            .collect();
        graph[lo].push(hi);

        let edges: HashSet<(String, String)> = graph
            .iter()
            .enumerate()
            .flat_map(|(consumer, providers)| {
                providers.iter().map(move |provider| (node(consumer), node(*provider)))
            })
            .collect();

        let calls = Arc::new(AtomicUsize::new(0));
        let error = ContainerBuilder::new()
            .source(services(&graph, &calls))
            .build()
            .unwrap_err();
        prop_assert_eq!(calls.load(Ordering::SeqCst), 0);

        let source = match error {
            ContainerError::Validation { source } => source,
            other => return Err(TestCaseError::fail(format!("应为校验错误: {other}"))),
        };
        let is_cyclic = matches!(source, ValidationError::CyclicDependency { .. });
        prop_assert!(is_cyclic);

        let members = source.cycle_members().unwrap().to_vec();
        prop_assert!(!members.is_empty());
        for (position, member) in members.iter().enumerate() {
            let next = &members[(position + 1) % members.len()];
            prop_assert!(edges.contains(&(member.clone(), next.clone())));
        }
    }
}
