//! Incremental evaluation of a pipeline over chunks of dynamic inputs.

use crate::accumulator::{Accumulator, AccumulatorSpec, StreamValue};
use crate::error::{Result, StreamError};
use crate::key::Key;
use crate::pipeline::Pipeline;
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Runs a pipeline chunk by chunk, accumulating intermediate results.
///
/// Everything that does not depend on a dynamic key is computed once at
/// construction. Each chunk then only recomputes the path from the dynamic keys
/// to the accumulators, and [`finalize`](Self::finalize) evaluates the targets
/// from the accumulated values.
///
/// The pipeline must be linear in the dynamic keys up to the accumulators; this
/// is not checked.
#[derive(Debug)]
pub struct StreamProcessor<V> {
    process_graph: Pipeline<V>,
    finalize_graph: Pipeline<V>,
    dynamic_keys: BTreeSet<Key>,
    target_keys: Vec<Key>,
    accumulators: BTreeMap<Key, Accumulator<V>>,
    dependencies: BTreeMap<Key, BTreeSet<Key>>,
    allow_bypass: bool,
}

impl<V: StreamValue> StreamProcessor<V> {
    /// Creates a processor.
    ///
    /// `accumulators` names the keys at which values are summed across chunks.
    /// Accumulators for keys the targets do not need are dropped. With
    /// `allow_bypass`, dynamic values are also visible to the finalize step, which
    /// is only correct if they are valid for every chunk accumulated so far.
    ///
    /// # Errors
    /// Returns an error if a target is not in `base`, or if evaluating the static
    /// part of the graph or an accumulator factory fails.
    pub fn new(
        base: &Pipeline<V>,
        dynamic_keys: &[Key],
        target_keys: &[Key],
        accumulators: impl IntoIterator<Item = (Key, AccumulatorSpec<V>)>,
        allow_bypass: bool,
    ) -> Result<Self> {
        let mut graph = base.clone();
        for key in dynamic_keys {
            graph.unset(*key);
        }
        let mut graph = graph.subgraph(target_keys)?;

        let mut nodes = graph.descendants(dynamic_keys);
        nodes.extend(dynamic_keys.iter().copied());
        let parents: Vec<Key> = nodes
            .iter()
            .flat_map(|key| graph.parents(key).iter().copied())
            .filter(|key| !nodes.contains(key))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        debug!(
            "precomputing {} static inputs of {} dynamic nodes",
            parents.len(),
            nodes.len()
        );
        for (key, value) in base.compute(&parents)? {
            graph.set(key, value);
        }
        let mut graph = graph.subgraph(target_keys)?;
        for key in dynamic_keys {
            if !graph.contains(key) {
                graph.unset(*key);
            }
        }

        let dynamic_keys: BTreeSet<Key> = dynamic_keys.iter().copied().collect();
        let mut built = BTreeMap::new();
        let mut dependencies = BTreeMap::new();
        for (key, spec) in accumulators {
            if !graph.contains(&key) {
                debug!("dropping accumulator `{key}` not needed by the targets");
                continue;
            }
            let accumulator = match spec {
                AccumulatorSpec::Instance(acc) => acc,
                AccumulatorSpec::Factory { inputs, build } => {
                    let values = base.compute(&inputs)?;
                    let args = inputs
                        .iter()
                        .map(|input| values.get(input).ok_or(StreamError::Unset(*input)))
                        .collect::<Result<Vec<&V>>>()?;
                    build(&args)?
                }
            };
            let deps: BTreeSet<Key> = graph
                .ancestors(&key)
                .intersection(&dynamic_keys)
                .copied()
                .collect();
            dependencies.insert(key, deps);
            built.insert(key, accumulator);
        }
        info!(
            "stream processor ready: {} dynamic keys, {} accumulators, {} targets",
            dynamic_keys.len(),
            built.len(),
            target_keys.len()
        );

        Ok(Self {
            finalize_graph: graph.clone(),
            process_graph: graph,
            dynamic_keys,
            target_keys: target_keys.to_vec(),
            accumulators: built,
            dependencies,
            allow_bypass,
        })
    }

    /// Creates a processor with an [`Accumulator::eternal`] at every key of `accumulate_at`.
    ///
    /// # Errors
    /// See [`Self::new`].
    pub fn with_eternal(
        base: &Pipeline<V>,
        dynamic_keys: &[Key],
        target_keys: &[Key],
        accumulate_at: &[Key],
    ) -> Result<Self> {
        Self::new(
            base,
            dynamic_keys,
            target_keys,
            accumulate_at
                .iter()
                .map(|key| (*key, AccumulatorSpec::Instance(Accumulator::eternal()))),
            false,
        )
    }

    /// Keys that each accumulator depends on among the dynamic keys.
    #[must_use]
    pub fn accumulator_dependencies(&self) -> &BTreeMap<Key, BTreeSet<Key>> {
        &self.dependencies
    }

    /// Accumulators kept after pruning.
    #[must_use]
    pub fn accumulators(&self) -> &BTreeMap<Key, Accumulator<V>> {
        &self.accumulators
    }

    /// Pushes the values computed from `chunk` into the accumulators that depend on it.
    ///
    /// Accumulators depending on none of the chunk's keys are left untouched.
    ///
    /// # Errors
    /// Returns [`StreamError::NonDynamicKeys`] if the chunk contains keys that were not
    /// declared dynamic, [`StreamError::MissingDynamicKeys`] if it provides only some
    /// of an accumulator's dynamic inputs, and propagates evaluation errors.
    pub fn accumulate(&mut self, chunk: HashMap<Key, V>) -> Result<()> {
        let mut non_dynamic: Vec<Key> = chunk
            .keys()
            .filter(|key| !self.dynamic_keys.contains(key))
            .copied()
            .collect();
        if !non_dynamic.is_empty() {
            non_dynamic.sort();
            return Err(StreamError::NonDynamicKeys(non_dynamic));
        }

        let mut to_update = Vec::new();
        for (acc_key, deps) in &self.dependencies {
            if deps.iter().all(|key| !chunk.contains_key(key)) {
                continue;
            }
            let missing: Vec<Key> = deps
                .iter()
                .filter(|key| !chunk.contains_key(key))
                .copied()
                .collect();
            if !missing.is_empty() {
                return Err(StreamError::MissingDynamicKeys {
                    accumulator: *acc_key,
                    missing,
                });
            }
            to_update.push(*acc_key);
        }

        for (key, value) in chunk {
            if self.allow_bypass {
                self.finalize_graph.set(key, value.clone());
            }
            self.process_graph.set(key, value);
        }
        let mut computed = self.process_graph.compute(&to_update)?;
        for key in &to_update {
            if let (Some(value), Some(acc)) = (computed.remove(key), self.accumulators.get_mut(key)) {
                acc.push(value)?;
            }
        }
        debug!("accumulated chunk into {} accumulators", to_update.len());
        Ok(())
    }

    /// Computes the targets from the accumulated values.
    ///
    /// # Errors
    /// Propagates evaluation errors, including [`StreamError::Unset`] when a target
    /// needs an accumulator that has not received any chunk.
    pub fn finalize(&mut self) -> Result<HashMap<Key, V>> {
        for (key, acc) in &self.accumulators {
            match acc.value()? {
                Some(value) => self.finalize_graph.set(*key, value),
                None => {
                    if let Some(node) = self.process_graph.node(key) {
                        self.finalize_graph.insert_node(*key, node.clone());
                    }
                }
            }
        }
        self.finalize_graph.compute(&self.target_keys)
    }

    /// [`accumulate`](Self::accumulate) followed by [`finalize`](Self::finalize).
    ///
    /// # Errors
    /// See both methods.
    pub fn add_chunk(&mut self, chunk: HashMap<Key, V>) -> Result<HashMap<Key, V>> {
        self.accumulate(chunk)?;
        self.finalize()
    }

    /// Clears every accumulator.
    pub fn clear(&mut self) {
        for acc in self.accumulators.values_mut() {
            acc.clear();
        }
    }
}
