//! Observer hooks for long running batch operations.
//!
//! Batch stages report once per (ROI, condition) unit of work. Reporting is
//! purely informational: observers cannot cancel or reorder the work.

/// One completed unit of work within a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUnit<'a> {
    pub done: usize,
    pub total: usize,
    pub roi: &'a str,
    pub condition: &'a str,
}

impl ProgressUnit<'_> {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.done as f64 / self.total as f64
        }
    }
}

pub trait ProgressObserver {
    fn on_unit(&mut self, unit: &ProgressUnit<'_>);
}

impl<F> ProgressObserver for F
where
    F: FnMut(&ProgressUnit<'_>),
{
    fn on_unit(&mut self, unit: &ProgressUnit<'_>) {
        self(unit)
    }
}

/// Discards every notification.
#[derive(Default, Debug, Clone, Copy)]
pub struct Silent;

impl ProgressObserver for Silent {
    fn on_unit(&mut self, _unit: &ProgressUnit<'_>) {}
}

/// Emits a trace event per unit.
#[derive(Default, Debug, Clone, Copy)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_unit(&mut self, unit: &ProgressUnit<'_>) {
        tracing::trace!(
            "{}/{} done: {} {}",
            unit.done,
            unit.total,
            unit.roi,
            unit.condition
        );
    }
}

/// Counts units and forwards them to an observer.
pub struct ProgressCounter<'o> {
    done: usize,
    total: usize,
    observer: &'o mut dyn ProgressObserver,
}

impl<'o> ProgressCounter<'o> {
    pub fn new(total: usize, observer: &'o mut dyn ProgressObserver) -> Self {
        Self {
            done: 0,
            total,
            observer,
        }
    }

    pub fn advance(&mut self, roi: &str, condition: &str) {
        self.done += 1;
        self.observer.on_unit(&ProgressUnit {
            done: self.done,
            total: self.total,
            roi,
            condition,
        });
    }

    pub fn done(&self) -> usize {
        self.done
    }
}
