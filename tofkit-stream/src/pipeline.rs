//! Keyed computation graph with a memoising evaluator.
//!
//! Nodes are either parameters (fixed values), providers (functions of other keys)
//! or unset placeholders. Evaluating a set of targets walks the graph depth-first
//! from the targets and computes every provider at most once.

use crate::error::{Result, StreamError};
use crate::key::{Key, MonitorKind, RunKind};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

type ProviderFn<V> = Arc<dyn Fn(&[&V]) -> Result<V> + Send + Sync>;

/// A function computing one key from the values of other keys.
pub struct Provider<V> {
    inputs: Vec<Key>,
    func: ProviderFn<V>,
}

impl<V> Provider<V> {
    /// Keys whose values are passed to the function, in order.
    #[must_use]
    pub fn inputs(&self) -> &[Key] {
        &self.inputs
    }
}

impl<V> Clone for Provider<V> {
    fn clone(&self) -> Self {
        Self {
            inputs: self.inputs.clone(),
            func: Arc::clone(&self.func),
        }
    }
}

impl<V> fmt::Debug for Provider<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// A node of the graph.
#[derive(Debug, Clone)]
pub enum Node<V> {
    /// A fixed value.
    Param(V),
    /// A computed value.
    Provider(Provider<V>),
    /// A placeholder without value; evaluating it fails.
    Unset,
}

/// A keyed directed acyclic graph of parameters and providers.
#[derive(Debug, Clone)]
pub struct Pipeline<V> {
    nodes: HashMap<Key, Node<V>>,
}

impl<V> Default for Pipeline<V> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }
}

impl<V: Clone> Pipeline<V> {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to a fixed value, replacing any provider.
    pub fn set(&mut self, key: Key, value: V) {
        self.nodes.insert(key, Node::Param(value));
    }

    /// Turns `key` into a placeholder without value.
    pub fn unset(&mut self, key: Key) {
        self.nodes.insert(key, Node::Unset);
    }

    /// Registers a provider computing `key` from `inputs`, in order.
    pub fn insert<F>(&mut self, key: Key, inputs: Vec<Key>, func: F)
    where
        F: Fn(&[&V]) -> Result<V> + Send + Sync + 'static,
    {
        self.nodes.insert(
            key,
            Node::Provider(Provider {
                inputs,
                func: Arc::new(func),
            }),
        );
    }

    pub(crate) fn insert_node(&mut self, key: Key, node: Node<V>) {
        self.nodes.insert(key, node);
    }

    /// Returns true if the graph has a node for `key`.
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        self.nodes.contains_key(key)
    }

    /// The node registered for `key`.
    #[must_use]
    pub fn node(&self, key: &Key) -> Option<&Node<V>> {
        self.nodes.get(key)
    }

    /// The value of a parameter.
    #[must_use]
    pub fn param(&self, key: &Key) -> Option<&V> {
        match self.nodes.get(key) {
            Some(Node::Param(value)) => Some(value),
            _ => None,
        }
    }

    /// Every key of the graph.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.nodes.keys()
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct inputs of `key`. Parameters and placeholders have none.
    #[must_use]
    pub fn parents(&self, key: &Key) -> &[Key] {
        match self.nodes.get(key) {
            Some(Node::Provider(provider)) => &provider.inputs,
            _ => &[],
        }
    }

    /// Every key `key` transitively depends on, excluding itself.
    #[must_use]
    pub fn ancestors(&self, key: &Key) -> BTreeSet<Key> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<Key> = self.parents(key).to_vec();
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend_from_slice(self.parents(&next));
            }
        }
        seen
    }

    /// Every key that transitively depends on any of `keys`, excluding `keys`.
    #[must_use]
    pub fn descendants(&self, keys: &[Key]) -> BTreeSet<Key> {
        let mut children: HashMap<Key, Vec<Key>> = HashMap::new();
        for (key, node) in &self.nodes {
            if let Node::Provider(provider) = node {
                for input in &provider.inputs {
                    children.entry(*input).or_default().push(*key);
                }
            }
        }
        let mut seen = BTreeSet::new();
        let mut stack: Vec<Key> = keys.to_vec();
        while let Some(next) = stack.pop() {
            for child in children.get(&next).into_iter().flatten() {
                if seen.insert(*child) {
                    stack.push(*child);
                }
            }
        }
        for key in keys {
            seen.remove(key);
        }
        seen
    }

    /// The part of the graph needed to compute `targets`.
    ///
    /// # Errors
    /// Returns [`StreamError::MissingInput`] if a target has no node.
    pub fn subgraph(&self, targets: &[Key]) -> Result<Self> {
        let mut nodes = HashMap::new();
        let mut stack: Vec<Key> = Vec::new();
        for target in targets {
            if !self.contains(target) {
                return Err(StreamError::MissingInput {
                    key: *target,
                    needed_by: "the requested targets".to_string(),
                });
            }
            stack.push(*target);
        }
        while let Some(key) = stack.pop() {
            if nodes.contains_key(&key) {
                continue;
            }
            if let Some(node) = self.nodes.get(&key) {
                stack.extend_from_slice(self.parents(&key));
                nodes.insert(key, node.clone());
            }
        }
        Ok(Self { nodes })
    }

    /// Keeps only nodes whose run and monitor kinds are among the given ones.
    ///
    /// Keys without a run (or monitor) kind are always kept.
    ///
    /// # Errors
    /// Returns [`StreamError::MissingConstraint`] if `run_kinds` is empty, or if a
    /// kept provider depends on a key that was removed.
    pub fn restrict(&self, run_kinds: &[RunKind], monitor_kinds: &[MonitorKind]) -> Result<Self> {
        if run_kinds.is_empty() {
            return Err(StreamError::MissingConstraint(
                "at least one run kind is required".to_string(),
            ));
        }
        let keep = |key: &Key| {
            key.run().map_or(true, |run| run_kinds.contains(&run))
                && key.monitor().map_or(true, |m| monitor_kinds.contains(&m))
        };
        let nodes: HashMap<Key, Node<V>> = self
            .nodes
            .iter()
            .filter(|(key, _)| keep(key))
            .map(|(key, node)| (*key, node.clone()))
            .collect();
        for (key, node) in &nodes {
            if let Node::Provider(provider) = node {
                if let Some(removed) = provider
                    .inputs
                    .iter()
                    .find(|input| self.contains(input) && !keep(input))
                {
                    return Err(StreamError::MissingConstraint(format!(
                        "`{key}` depends on `{removed}`, which is excluded by the given run and monitor kinds"
                    )));
                }
            }
        }
        Ok(Self { nodes })
    }

    /// Computes `targets`.
    ///
    /// # Errors
    /// Returns an error if a required key is missing or unset, the graph has a cycle,
    /// or a provider fails.
    pub fn compute(&self, targets: &[Key]) -> Result<HashMap<Key, V>> {
        let mut cache = HashMap::new();
        let mut visiting = HashSet::new();
        let mut out = HashMap::with_capacity(targets.len());
        for target in targets {
            self.evaluate(target, "the requested targets", &mut cache, &mut visiting)?;
            out.insert(*target, self.lookup(target, &cache)?.clone());
        }
        Ok(out)
    }

    /// Computes a single key.
    ///
    /// # Errors
    /// See [`Self::compute`].
    pub fn compute_one(&self, target: &Key) -> Result<V> {
        let mut values = self.compute(std::slice::from_ref(target))?;
        values.remove(target).ok_or(StreamError::Unset(*target))
    }

    fn lookup<'a>(&'a self, key: &Key, cache: &'a HashMap<Key, V>) -> Result<&'a V> {
        match self.nodes.get(key) {
            Some(Node::Param(value)) => Ok(value),
            _ => cache.get(key).ok_or(StreamError::Unset(*key)),
        }
    }

    fn evaluate(
        &self,
        key: &Key,
        needed_by: &str,
        cache: &mut HashMap<Key, V>,
        visiting: &mut HashSet<Key>,
    ) -> Result<()> {
        if cache.contains_key(key) {
            return Ok(());
        }
        let provider = match self.nodes.get(key) {
            None => {
                return Err(StreamError::MissingInput {
                    key: *key,
                    needed_by: needed_by.to_string(),
                })
            }
            Some(Node::Param(_)) => return Ok(()),
            Some(Node::Unset) => return Err(StreamError::Unset(*key)),
            Some(Node::Provider(provider)) => provider,
        };
        if !visiting.insert(*key) {
            return Err(StreamError::Cycle(*key));
        }
        let consumer = format!("`{key}`");
        for input in &provider.inputs {
            self.evaluate(input, &consumer, cache, visiting)?;
        }
        visiting.remove(key);
        let value = {
            let args = provider
                .inputs
                .iter()
                .map(|input| self.lookup(input, cache))
                .collect::<Result<Vec<&V>>>()?;
            (provider.func)(&args)?
        };
        cache.insert(*key, value);
        Ok(())
    }
}
