use crate::{
    data::{AUTO_PEAKS_DIRECTIVE, Peaks, Trace},
    error::ConfigError,
    utils::nearest_sample,
};
use quantal_common::{Real, Time};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Adds or removes single peaks at user chosen points.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualEditor {
    /// Snap targets to the sample nearest in time.
    pub lock_to_data: bool,
    /// An existing peak this close to the target time is removed instead of a
    /// new one being added.
    pub tolerance: Time,
}

impl Default for ManualEditor {
    fn default() -> Self {
        Self {
            lock_to_data: true,
            tolerance: 0.0,
        }
    }
}

impl ManualEditor {
    /// Where a click at `target` lands on `trace`.
    pub fn resolve(&self, trace: &Trace, target: (Time, Real)) -> Option<(Time, Real)> {
        if self.lock_to_data {
            let i = nearest_sample(&trace.times, target.0)?;
            Some((*trace.times.get(i)?, *trace.values.get(i)?))
        } else {
            Some(target)
        }
    }

    /// `current` with the peak at `target` removed if present, or added if not.
    /// The result is ordered by time.
    pub fn toggle(&self, current: &Peaks, trace: &Trace, target: (Time, Real)) -> Peaks {
        let Some((time, value)) = self.resolve(trace, target) else {
            return current.clone();
        };
        let is_target = |t: Time| (t - time).abs() <= self.tolerance;

        let mut points: Vec<(Time, Real)> = current.iter().collect();
        if points.iter().any(|&(t, _)| is_target(t)) {
            points.retain(|&(t, _)| !is_target(t));
            debug!("Removed peak at {time}");
        } else {
            points.push((time, value));
            debug!("Added peak at {time} ({value})");
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (times, amplitudes) = points.into_iter().unzip();
        Peaks { times, amplitudes }
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMode {
    #[default]
    Auto,
    Manual,
}

/// Cursor position snapped to a trace sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crosshair {
    pub time: Time,
    pub value: Real,
}

/// Values of the `autoPeaks` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoPeaks {
    Disable,
    Enable,
}

impl AutoPeaks {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Disable" => Some(Self::Disable),
            "Enable" => Some(Self::Enable),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disable => "Disable",
            Self::Enable => "Enable",
        }
    }
}

impl Default for DetectionSession {
    fn default() -> Self {
        Self::new(ManualEditor::default())
    }
}

/// Auto/manual detection state carried between update cycles.
///
/// Manual mode disables automatic detection and enables point editing with a
/// crosshair. Returning to auto mode discards the crosshair.
#[derive(Debug, Clone)]
pub struct DetectionSession {
    mode: DetectionMode,
    locked: bool,
    baseline_allowed: bool,
    crosshair: Option<Crosshair>,
    pub editor: ManualEditor,
}

impl DetectionSession {
    pub fn new(editor: ManualEditor) -> Self {
        Self {
            mode: DetectionMode::Auto,
            locked: false,
            baseline_allowed: true,
            crosshair: None,
            editor,
        }
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn auto_controls_enabled(&self) -> bool {
        self.mode == DetectionMode::Auto
    }

    pub fn point_editing_enabled(&self) -> bool {
        self.mode == DetectionMode::Manual
    }

    /// False once a dataset has asked for baseline removal to be switched off.
    pub fn baseline_allowed(&self) -> bool {
        self.baseline_allowed
    }

    pub fn crosshair(&self) -> Option<Crosshair> {
        self.crosshair
    }

    pub fn set_mode(&mut self, mode: DetectionMode) -> Result<(), ConfigError> {
        if self.locked && mode != self.mode {
            return Err(ConfigError::ModeLocked);
        }
        if mode != self.mode {
            info!("Peak detection mode: {mode:?}");
        }
        if mode == DetectionMode::Auto {
            self.crosshair = None;
        }
        self.mode = mode;
        Ok(())
    }

    /// Applies presentation directives carried by a dataset.
    /// `autoPeaks = Disable` forces and locks manual mode with baseline removal
    /// off; `Enable` lifts the lock and leaves the current mode in place.
    pub fn apply_controls(&mut self, controls: &BTreeMap<String, String>) {
        for (key, value) in controls {
            if key != AUTO_PEAKS_DIRECTIVE {
                debug!("Ignoring directive {key} = {value}");
                continue;
            }
            match AutoPeaks::parse(value) {
                Some(AutoPeaks::Disable) => {
                    info!("Automatic peak detection disabled for this dataset");
                    self.mode = DetectionMode::Manual;
                    self.locked = true;
                    self.baseline_allowed = false;
                }
                Some(AutoPeaks::Enable) => {
                    self.locked = false;
                    self.baseline_allowed = true;
                }
                None => warn!("Unknown {AUTO_PEAKS_DIRECTIVE} value {value}"),
            }
        }
    }

    /// Tracks the cursor in manual mode, snapped to the nearest sample of `trace`.
    pub fn hover(&mut self, trace: &Trace, x: Time) -> Option<Crosshair> {
        if self.mode != DetectionMode::Manual {
            return None;
        }
        let i = nearest_sample(&trace.times, x)?;
        self.crosshair = Some(Crosshair {
            time: *trace.times.get(i)?,
            value: *trace.values.get(i)?,
        });
        self.crosshair
    }

    /// Applies a click to `current`. Clicks outside manual mode are ignored.
    pub fn click(&self, current: &Peaks, trace: &Trace, target: (Time, Real)) -> Option<Peaks> {
        if self.mode != DetectionMode::Manual {
            warn!("Turn on manual peak editing to edit peaks");
            return None;
        }
        Some(self.editor.toggle(current, trace, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace() -> Trace {
        Trace::new(vec![0.0, 1.0, 2.0, 3.0], vec![0.5, 2.0, 0.1, 4.0])
    }

    #[test]
    fn toggle_snaps_adds_and_removes() {
        let editor = ManualEditor::default();
        let trace = trace();
        let added = editor.toggle(&Peaks::default(), &trace, (2.8, 0.0));
        assert_eq!(added.times, vec![3.0]);
        assert_eq!(added.amplitudes, vec![4.0]);

        let two = editor.toggle(&added, &trace, (1.2, 9.0));
        assert_eq!(two.times, vec![1.0, 3.0]);

        let removed = editor.toggle(&two, &trace, (3.1, 0.0));
        assert_eq!(removed.times, vec![1.0]);
        assert_eq!(removed.amplitudes, vec![2.0]);
    }

    #[test]
    fn unlocked_toggle_uses_raw_point() {
        let editor = ManualEditor {
            lock_to_data: false,
            tolerance: 0.25,
        };
        let added = editor.toggle(&Peaks::default(), &trace(), (1.5, 7.0));
        assert_eq!(added.times, vec![1.5]);
        assert_eq!(added.amplitudes, vec![7.0]);
        assert!(editor.toggle(&added, &trace(), (1.6, 0.0)).is_empty());
    }

    #[test]
    fn mode_transitions() {
        let mut session = DetectionSession::new(ManualEditor::default());
        assert_eq!(session.mode(), DetectionMode::Auto);
        assert!(session.hover(&trace(), 1.0).is_none());

        session.set_mode(DetectionMode::Manual).unwrap();
        assert!(session.point_editing_enabled());
        assert!(!session.auto_controls_enabled());
        assert_eq!(
            session.hover(&trace(), 2.7),
            Some(Crosshair {
                time: 3.0,
                value: 4.0
            })
        );

        session.set_mode(DetectionMode::Auto).unwrap();
        assert!(session.crosshair().is_none());
        assert!(session.click(&Peaks::default(), &trace(), (1.0, 0.0)).is_none());
    }

    #[test]
    fn disable_directive_locks_manual_mode() {
        let mut session = DetectionSession::new(ManualEditor::default());
        let mut controls = BTreeMap::new();
        controls.insert(AUTO_PEAKS_DIRECTIVE.to_owned(), "Disable".to_owned());
        session.apply_controls(&controls);
        assert_eq!(session.mode(), DetectionMode::Manual);
        assert!(session.is_locked());
        assert!(!session.baseline_allowed());
        assert_eq!(
            session.set_mode(DetectionMode::Auto),
            Err(ConfigError::ModeLocked)
        );

        controls.insert(AUTO_PEAKS_DIRECTIVE.to_owned(), "Enable".to_owned());
        session.apply_controls(&controls);
        assert!(!session.is_locked());
        assert_eq!(session.mode(), DetectionMode::Manual);
        session.set_mode(DetectionMode::Auto).unwrap();
    }
}
