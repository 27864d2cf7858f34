//! Accumulators combining values across stream chunks.

use crate::error::Result;
use crate::key::Key;
use std::collections::VecDeque;
use std::fmt;

/// Default number of chunks kept by a [`RollingAccumulator`].
pub const DEFAULT_WINDOW: usize = 10;

/// A value that can be summed across chunks.
pub trait StreamValue: Clone {
    /// Adds `other` into `self`.
    ///
    /// # Errors
    /// Returns an error if the two values cannot be combined.
    fn accumulate(&mut self, other: &Self) -> Result<()>;

    /// Preprocessing applied to every value before it is stored.
    ///
    /// The default is the identity. Types with an event representation may
    /// override this to histogram events before summing.
    #[must_use]
    fn maybe_hist(self) -> Self {
        self
    }
}

impl StreamValue for f64 {
    fn accumulate(&mut self, other: &Self) -> Result<()> {
        *self += other;
        Ok(())
    }
}

/// Running sum of every value pushed since creation or the last clear.
#[derive(Clone)]
pub struct EternalAccumulator<V> {
    value: Option<V>,
    preprocess: Option<fn(V) -> V>,
}

impl<V> Default for EternalAccumulator<V> {
    fn default() -> Self {
        Self {
            value: None,
            preprocess: None,
        }
    }
}

impl<V> fmt::Debug for EternalAccumulator<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EternalAccumulator")
            .field("is_empty", &self.value.is_none())
            .finish_non_exhaustive()
    }
}

impl<V: StreamValue> EternalAccumulator<V> {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `preprocess` to every pushed value instead of [`StreamValue::maybe_hist`].
    #[must_use]
    pub fn with_preprocess(mut self, preprocess: fn(V) -> V) -> Self {
        self.preprocess = Some(preprocess);
        self
    }

    /// Returns true if nothing has been pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    /// Adds a value.
    ///
    /// # Errors
    /// Propagates errors from [`StreamValue::accumulate`].
    pub fn push(&mut self, value: V) -> Result<()> {
        let value = match self.preprocess {
            Some(preprocess) => preprocess(value),
            None => value.maybe_hist(),
        };
        match &mut self.value {
            Some(total) => total.accumulate(&value)?,
            None => self.value = Some(value),
        }
        Ok(())
    }

    /// The sum so far, or `None` if empty.
    #[must_use]
    pub fn value(&self) -> Option<V> {
        self.value.clone()
    }

    /// Drops the accumulated value.
    pub fn clear(&mut self) {
        self.value = None;
    }
}

/// Sum over the most recent values pushed.
#[derive(Debug, Clone)]
pub struct RollingAccumulator<V> {
    window: usize,
    values: VecDeque<V>,
}

impl<V: StreamValue> Default for RollingAccumulator<V> {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl<V: StreamValue> RollingAccumulator<V> {
    /// Creates an accumulator keeping at most `window` values (at least one).
    #[must_use]
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            values: VecDeque::with_capacity(window),
        }
    }

    /// Maximum number of values kept.
    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    /// Number of values currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing has been pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Adds a value, evicting the oldest one if the window is full.
    pub fn push(&mut self, value: V) {
        if self.values.len() == self.window {
            self.values.pop_front();
        }
        self.values.push_back(value.maybe_hist());
    }

    /// Sum of the values in the window, or `None` if empty.
    ///
    /// # Errors
    /// Propagates errors from [`StreamValue::accumulate`].
    pub fn value(&self) -> Result<Option<V>> {
        let mut values = self.values.iter();
        let Some(first) = values.next() else {
            return Ok(None);
        };
        let mut total = first.clone();
        for value in values {
            total.accumulate(value)?;
        }
        Ok(Some(total))
    }

    /// Drops every value.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Accumulation strategy of a [`StreamProcessor`](crate::StreamProcessor) target.
#[derive(Debug, Clone)]
pub enum Accumulator<V> {
    /// Sum over the whole stream.
    Eternal(EternalAccumulator<V>),
    /// Sum over the most recent chunks.
    Rolling(RollingAccumulator<V>),
}

impl<V: StreamValue> Accumulator<V> {
    /// An eternal accumulator.
    #[must_use]
    pub fn eternal() -> Self {
        Self::Eternal(EternalAccumulator::new())
    }

    /// A rolling accumulator over `window` chunks.
    #[must_use]
    pub fn rolling(window: usize) -> Self {
        Self::Rolling(RollingAccumulator::new(window))
    }

    /// Adds a value.
    ///
    /// # Errors
    /// Propagates errors from [`StreamValue::accumulate`].
    pub fn push(&mut self, value: V) -> Result<()> {
        match self {
            Self::Eternal(acc) => acc.push(value),
            Self::Rolling(acc) => {
                acc.push(value);
                Ok(())
            }
        }
    }

    /// The accumulated value, or `None` if empty.
    ///
    /// # Errors
    /// Propagates errors from [`StreamValue::accumulate`].
    pub fn value(&self) -> Result<Option<V>> {
        match self {
            Self::Eternal(acc) => Ok(acc.value()),
            Self::Rolling(acc) => acc.value(),
        }
    }

    /// Returns true if nothing has been pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Eternal(acc) => acc.is_empty(),
            Self::Rolling(acc) => acc.is_empty(),
        }
    }

    /// Drops accumulated state.
    pub fn clear(&mut self) {
        match self {
            Self::Eternal(acc) => acc.clear(),
            Self::Rolling(acc) => acc.clear(),
        }
    }
}

type AccumulatorFactory<V> = Box<dyn Fn(&[&V]) -> Result<Accumulator<V>> + Send + Sync>;

/// An accumulator, or a recipe building one from values of the base pipeline.
pub enum AccumulatorSpec<V> {
    /// A ready accumulator.
    Instance(Accumulator<V>),
    /// Builds the accumulator from the values of `inputs` in the base pipeline.
    Factory {
        /// Keys evaluated on the base pipeline and passed to `build`.
        inputs: Vec<Key>,
        /// Constructor.
        build: AccumulatorFactory<V>,
    },
}

impl<V> AccumulatorSpec<V> {
    /// Wraps a factory closure.
    pub fn factory<F>(inputs: Vec<Key>, build: F) -> Self
    where
        F: Fn(&[&V]) -> Result<Accumulator<V>> + Send + Sync + 'static,
    {
        Self::Factory {
            inputs,
            build: Box::new(build),
        }
    }
}

impl<V> From<Accumulator<V>> for AccumulatorSpec<V> {
    fn from(acc: Accumulator<V>) -> Self {
        Self::Instance(acc)
    }
}

impl<V> fmt::Debug for AccumulatorSpec<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(_) => f.write_str("AccumulatorSpec::Instance"),
            Self::Factory { inputs, .. } => f
                .debug_struct("AccumulatorSpec::Factory")
                .field("inputs", inputs)
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_eternal_sums_everything() {
        let mut acc = EternalAccumulator::new();
        assert!(acc.value().is_none());
        for v in [1.0, 2.0, 3.5] {
            acc.push(v).unwrap();
        }
        assert_relative_eq!(acc.value().unwrap(), 6.5);
        acc.clear();
        assert!(acc.is_empty());
    }

    #[test]
    fn test_eternal_preprocess() {
        let mut acc = EternalAccumulator::new().with_preprocess(|v: f64| v * 2.0);
        acc.push(1.0).unwrap();
        acc.push(2.0).unwrap();
        assert_relative_eq!(acc.value().unwrap(), 6.0);
    }

    #[test]
    fn test_rolling_evicts_oldest() {
        let mut acc = RollingAccumulator::new(3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            acc.push(v);
        }
        assert_eq!(acc.len(), 3);
        assert_relative_eq!(acc.value().unwrap().unwrap(), 12.0);
        assert_eq!(RollingAccumulator::<f64>::default().window(), DEFAULT_WINDOW);
        assert_eq!(RollingAccumulator::<f64>::new(0).window(), 1);
    }

    #[test]
    fn test_enum_dispatch() {
        let mut eternal = Accumulator::eternal();
        let mut rolling = Accumulator::rolling(1);
        for v in [1.0, 2.0] {
            eternal.push(v).unwrap();
            rolling.push(v).unwrap();
        }
        assert_relative_eq!(eternal.value().unwrap().unwrap(), 3.0);
        assert_relative_eq!(rolling.value().unwrap().unwrap(), 2.0);
        rolling.clear();
        assert!(rolling.is_empty());
        assert!(rolling.value().unwrap().is_none());
    }
}
