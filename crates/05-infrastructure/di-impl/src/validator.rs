//! 依赖图校验
//!
//! 封存时一次性完成：先为每个依赖位确定提供者并检查类型，再检测循环
//! 并计算最长依赖链。校验只读取描述符元数据，不会调用任何生产者。

use di_abstractions::{DependencySpec, MatchStrategy, Registry};
use indexmap::IndexMap;
use infrastructure_common::{ValidationError, ValidationResult};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// 依赖绑定：消费者 → 依赖位 → 提供者
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyBindings {
    bindings: IndexMap<String, IndexMap<String, String>>,
}

impl DependencyBindings {
    /// 依赖位绑定的提供者
    pub fn provider(&self, consumer: &str, slot: &str) -> Option<&str> {
        self.bindings
            .get(consumer)
            .and_then(|slots| slots.get(slot))
            .map(String::as_str)
    }

    /// 消费者的全部绑定，按声明顺序
    pub fn slots(&self, consumer: &str) -> impl Iterator<Item = (&str, &str)> {
        self.bindings
            .get(consumer)
            .into_iter()
            .flat_map(|slots| slots.iter().map(|(slot, provider)| (slot.as_str(), provider.as_str())))
    }

    /// 所有消费者，按注册顺序
    pub fn consumers(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }
}

/// 依赖图校验器
pub struct GraphValidator<'r> {
    registry: &'r Registry,
    default_strategy: MatchStrategy,
    max_depth: Option<usize>,
}

impl<'r> GraphValidator<'r> {
    /// 创建校验器
    pub fn new(registry: &'r Registry, default_strategy: MatchStrategy) -> Self {
        Self {
            registry,
            default_strategy,
            max_depth: None,
        }
    }

    /// 限制最长依赖链上需要构建的服务数量
    ///
    /// 值形式的服务已经就绪，不计入链长。
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// 执行校验，成功时返回依赖绑定
    ///
    /// 所有存在性与类型错误先于循环和深度错误报告。
    pub fn check(&self) -> ValidationResult<DependencyBindings> {
        let bindings = self.bind()?;
        self.walk(&bindings)?;
        Ok(bindings)
    }

    fn bind(&self) -> ValidationResult<DependencyBindings> {
        let mut bindings = IndexMap::with_capacity(self.registry.len());
        for (consumer, descriptor) in self.registry.items() {
            let mut slots = IndexMap::with_capacity(descriptor.dependencies().len());
            for (slot, spec) in descriptor.dependencies() {
                let provider = self.bind_one(consumer, slot, spec)?;
                debug!("绑定依赖: {}.{} => {}", consumer, slot, provider);
                slots.insert(slot.clone(), provider);
            }
            bindings.insert(consumer.to_string(), slots);
        }
        Ok(DependencyBindings { bindings })
    }

    fn bind_one(&self, consumer: &str, slot: &str, spec: &DependencySpec) -> ValidationResult<String> {
        match spec.effective_strategy(self.default_strategy) {
            MatchStrategy::ByType => {
                let candidates: Vec<&str> = self
                    .registry
                    .items()
                    .filter(|(_, descriptor)| descriptor.produced_type().is_assignable_to(&spec.required))
                    .map(|(name, _)| name)
                    .collect();
                match candidates.as_slice() {
                    [] => Err(ValidationError::NoCandidate {
                        consumer: consumer.to_string(),
                        dependency: slot.to_string(),
                        required: spec.required,
                    }),
                    [only] => Ok((*only).to_string()),
                    _ => Err(ValidationError::AmbiguousDependency {
                        consumer: consumer.to_string(),
                        dependency: slot.to_string(),
                        required: spec.required,
                        candidates: candidates.iter().map(|name| (*name).to_string()).collect(),
                    }),
                }
            }
            strategy => {
                let provider = self.registry.get(slot).ok_or_else(|| {
                    ValidationError::UnresolvedDependency {
                        consumer: consumer.to_string(),
                        dependency: slot.to_string(),
                        required: spec.required,
                    }
                })?;
                if !provider.produced_type().satisfies(&spec.required, strategy) {
                    return Err(ValidationError::TypeMismatch {
                        consumer: consumer.to_string(),
                        dependency: slot.to_string(),
                        expected: spec.required,
                        actual: provider.produced_type().info(),
                    });
                }
                Ok(slot.to_string())
            }
        }
    }
}

/// 深度优先遍历中的一帧
struct Frame<'a> {
    name: &'a str,
    providers: Vec<&'a str>,
    next: usize,
}

impl<'a> Frame<'a> {
    fn new(name: &'a str, bindings: &'a DependencyBindings) -> Self {
        Self {
            name,
            providers: bindings.slots(name).map(|(_, provider)| provider).collect(),
            next: 0,
        }
    }
}

impl GraphValidator<'_> {
    /// 以显式栈做深度优先遍历，检测循环并计算每个节点的最长依赖链
    ///
    /// 只有完整探索过且不在环上的节点才会记入 `explored`，
    /// 因此跳过这些节点不会漏掉任何循环。
    fn walk(&self, bindings: &DependencyBindings) -> ValidationResult<()> {
        // 节点 => (最长依赖链上需要构建的服务数, 链上的下一个节点)
        let mut explored: HashMap<&str, (usize, Option<&str>)> = HashMap::new();

        for root in bindings.consumers() {
            if explored.contains_key(root) {
                continue;
            }
            let mut frames = vec![Frame::new(root, bindings)];
            let mut on_path = HashSet::from([root]);

            while let Some(frame) = frames.last_mut() {
                if let Some(&provider) = frame.providers.get(frame.next) {
                    frame.next += 1;
                    if explored.contains_key(provider) {
                        continue;
                    }
                    if on_path.contains(provider) {
                        let path = frames.iter().map(|frame| frame.name.to_string()).collect();
                        return Err(ValidationError::cycle(path, provider));
                    }
                    on_path.insert(provider);
                    frames.push(Frame::new(provider, bindings));
                    continue;
                }

                let name = frame.name;
                let mut height = 0;
                let mut next = None;
                for provider in &frame.providers {
                    if let Some((below, _)) = explored.get(provider) {
                        if *below > height {
                            height = *below;
                            next = Some(*provider);
                        }
                    }
                }
                if !self.is_ready(name) {
                    height += 1;
                }
                frames.pop();
                on_path.remove(name);

                if let Some(limit) = self.max_depth {
                    if height > limit {
                        return Err(ValidationError::DepthExceeded {
                            chain: chain_from(name, next, &explored),
                            limit,
                        });
                    }
                }
                debug!("依赖链长度: {} => {}", name, height);
                explored.insert(name, (height, next));
            }
        }
        Ok(())
    }

    fn is_ready(&self, name: &str) -> bool {
        self.registry
            .get(name)
            .is_some_and(|descriptor| descriptor.is_value())
    }
}

fn chain_from<'a>(
    start: &str,
    mut next: Option<&'a str>,
    explored: &HashMap<&'a str, (usize, Option<&'a str>)>,
) -> Vec<String> {
    let mut chain = vec![start.to_string()];
    while let Some(step) = next {
        chain.push(step.to_string());
        next = explored.get(step).and_then(|(_, following)| *following);
    }
    chain
}
