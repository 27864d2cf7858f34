//! Keys of the computation graph.
//!
//! A key names a quantity and optionally the run and monitor it belongs to, so a
//! single operation can be registered once per run kind.

use std::fmt;

/// Kind of measurement a quantity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RunKind {
    /// Sample measurement.
    SampleRun,
    /// Background measurement.
    BackgroundRun,
    /// Measurement without sample.
    EmptyBeamRun,
    /// Transmission measurement.
    TransmissionRun,
    /// Vanadium normalisation measurement.
    VanadiumRun,
}

impl RunKind {
    /// Every run kind.
    pub const ALL: [RunKind; 5] = [
        Self::SampleRun,
        Self::BackgroundRun,
        Self::EmptyBeamRun,
        Self::TransmissionRun,
        Self::VanadiumRun,
    ];
}

/// Beam monitor a quantity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MonitorKind {
    /// Monitor upstream of the sample.
    Incident,
    /// Monitor downstream of the sample.
    Transmission,
    /// Numbered monitors.
    Monitor1,
    /// Numbered monitors.
    Monitor2,
    /// Numbered monitors.
    Monitor3,
}

impl MonitorKind {
    /// Every monitor kind.
    pub const ALL: [MonitorKind; 5] = [
        Self::Incident,
        Self::Transmission,
        Self::Monitor1,
        Self::Monitor2,
        Self::Monitor3,
    ];
}

/// Identifier of a node in a [`Pipeline`](crate::Pipeline).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    name: &'static str,
    run: Option<RunKind>,
    monitor: Option<MonitorKind>,
}

impl Key {
    /// A key not tied to any run or monitor.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            run: None,
            monitor: None,
        }
    }

    /// The same quantity for run `run`.
    #[must_use]
    pub const fn for_run(mut self, run: RunKind) -> Self {
        self.run = Some(run);
        self
    }

    /// The same quantity for monitor `monitor`.
    #[must_use]
    pub const fn for_monitor(mut self, monitor: MonitorKind) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Name of the quantity.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run kind, if any.
    #[must_use]
    pub fn run(&self) -> Option<RunKind> {
        self.run
    }

    /// Monitor kind, if any.
    #[must_use]
    pub fn monitor(&self) -> Option<MonitorKind> {
        self.monitor
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)?;
        match (self.run, self.monitor) {
            (None, None) => Ok(()),
            (Some(run), None) => write!(f, "[{run:?}]"),
            (None, Some(monitor)) => write!(f, "[{monitor:?}]"),
            (Some(run), Some(monitor)) => write!(f, "[{run:?}, {monitor:?}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let key = Key::new("RawMonitor")
            .for_run(RunKind::SampleRun)
            .for_monitor(MonitorKind::Incident);
        assert_eq!(key.to_string(), "RawMonitor[SampleRun, Incident]");
        assert_eq!(Key::new("PulseStride").to_string(), "PulseStride");
    }

    #[test]
    fn test_run_kind_distinguishes_keys() {
        let sample = Key::new("Raw").for_run(RunKind::SampleRun);
        let background = Key::new("Raw").for_run(RunKind::BackgroundRun);
        assert_ne!(sample, background);
        assert_eq!(sample.name(), background.name());
    }
}
