//! Classification aggregator
//!
//! Each estimator run produces a [`ComponentReading`]. The aggregator keeps one
//! independent slot per component kind and resolves "the" component with a
//! fixed priority: diode, then capacitor, then inductor, then resistor.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::config::BoardConfig;

/// Index of a test point in the board table.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeId(pub u8);

impl NodeId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {}", self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Resistor,
    Capacitor,
    Inductor,
    Diode,
}

impl ComponentKind {
    /// Resolution order, highest priority first.
    pub const PRIORITY: [ComponentKind; 4] = [
        ComponentKind::Diode,
        ComponentKind::Capacitor,
        ComponentKind::Inductor,
        ComponentKind::Resistor,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Resistor => "Resistor",
            Self::Capacitor => "Capacitor",
            Self::Inductor => "Inductor",
            Self::Diode => "Diode",
        }
    }
}

/// Result of one estimator run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub enum ComponentReading {
    Resistor {
        ohms: f32,
    },
    Capacitor {
        microfarads: f32,
    },
    Inductor {
        millihenries: f32,
    },
    Diode {
        forward_volts: f32,
        anode: NodeId,
        cathode: NodeId,
    },
    #[default]
    None,
}

impl ComponentReading {
    pub const fn kind(&self) -> Option<ComponentKind> {
        match self {
            Self::Resistor { .. } => Some(ComponentKind::Resistor),
            Self::Capacitor { .. } => Some(ComponentKind::Capacitor),
            Self::Inductor { .. } => Some(ComponentKind::Inductor),
            Self::Diode { .. } => Some(ComponentKind::Diode),
            Self::None => None,
        }
    }

    pub const fn is_detected(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Display adapter that prints diode terminals by board name.
    pub fn named<'a>(&'a self, board: &'a BoardConfig) -> NamedReading<'a> {
        NamedReading {
            reading: self,
            board,
        }
    }

    fn write_value(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Resistor { ohms } => {
                if ohms < 1_000.0 {
                    write!(f, "{:.1} Ω", ohms)
                } else if ohms < 1_000_000.0 {
                    write!(f, "{:.2} kΩ", ohms / 1_000.0)
                } else {
                    write!(f, "{:.2} MΩ", ohms / 1_000_000.0)
                }
            }
            Self::Capacitor { microfarads } => {
                if microfarads < 1.0 {
                    write!(f, "{:.1} nF", microfarads * 1_000.0)
                } else {
                    write!(f, "{:.2} µF", microfarads)
                }
            }
            Self::Inductor { millihenries } => write!(f, "{:.3} mH", millihenries),
            Self::Diode { forward_volts, .. } => write!(f, "Vf {:.2} V", forward_volts),
            Self::None => f.write_str("no component detected"),
        }
    }
}

impl fmt::Display for ComponentReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(kind) = self.kind() {
            write!(f, "{} ", kind.label())?;
        }
        self.write_value(f)?;
        if let Self::Diode { anode, cathode, .. } = self {
            write!(f, " (anode {}, cathode {})", anode, cathode)?;
        }
        Ok(())
    }
}

pub struct NamedReading<'a> {
    reading: &'a ComponentReading,
    board: &'a BoardConfig,
}

impl fmt::Display for NamedReading<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reading {
            ComponentReading::Diode { anode, cathode, .. } => {
                write!(f, "Diode ")?;
                self.reading.write_value(f)?;
                write!(
                    f,
                    " (anode {}, cathode {})",
                    self.board.name(anode.index()),
                    self.board.name(cathode.index())
                )
            }
            other => write!(f, "{}", other),
        }
    }
}

/// Most recent reading of one kind.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub reading: ComponentReading,
    /// Monotonic time the estimator finished
    pub timestamp_ms: u64,
}

/// One independent optional slot per component kind.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassificationState {
    pub resistor: Option<Slot>,
    pub capacitor: Option<Slot>,
    pub inductor: Option<Slot>,
    pub diode: Option<Slot>,
}

impl ClassificationState {
    pub const fn new() -> Self {
        Self {
            resistor: None,
            capacitor: None,
            inductor: None,
            diode: None,
        }
    }

    /// Store `reading` in the slot of its kind. `None` readings are ignored.
    ///
    /// Returns whether a slot was written.
    pub fn record(&mut self, reading: ComponentReading, timestamp_ms: u64) -> bool {
        let Some(kind) = reading.kind() else {
            return false;
        };
        *self.slot_mut(kind) = Some(Slot {
            reading,
            timestamp_ms,
        });
        true
    }

    pub fn slot(&self, kind: ComponentKind) -> Option<&Slot> {
        match kind {
            ComponentKind::Resistor => self.resistor.as_ref(),
            ComponentKind::Capacitor => self.capacitor.as_ref(),
            ComponentKind::Inductor => self.inductor.as_ref(),
            ComponentKind::Diode => self.diode.as_ref(),
        }
    }

    fn slot_mut(&mut self, kind: ComponentKind) -> &mut Option<Slot> {
        match kind {
            ComponentKind::Resistor => &mut self.resistor,
            ComponentKind::Capacitor => &mut self.capacitor,
            ComponentKind::Inductor => &mut self.inductor,
            ComponentKind::Diode => &mut self.diode,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Highest-priority detected reading, or `None`.
    pub fn resolve(&self) -> ComponentReading {
        ComponentKind::PRIORITY
            .iter()
            .find_map(|kind| self.slot(*kind))
            .map_or(ComponentReading::None, |slot| slot.reading)
    }

    /// Freeze the slots into an immutable snapshot for publication.
    pub fn snapshot(&self, cycle: u32) -> ClassificationSnapshot {
        ClassificationSnapshot {
            cycle,
            slots: *self,
            resolved: self.resolve(),
        }
    }
}

/// Completed, immutable result of one measurement cycle.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassificationSnapshot {
    /// Number of the cycle that produced this snapshot, 0 before the first
    pub cycle: u32,
    pub slots: ClassificationState,
    pub resolved: ComponentReading,
}

impl ClassificationSnapshot {
    pub const EMPTY: Self = Self {
        cycle: 0,
        slots: ClassificationState::new(),
        resolved: ComponentReading::None,
    };

    pub fn slot(&self, kind: ComponentKind) -> Option<&Slot> {
        self.slots.slot(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    const RESISTOR: ComponentReading = ComponentReading::Resistor { ohms: 4_700.0 };
    const CAPACITOR: ComponentReading = ComponentReading::Capacitor { microfarads: 100.0 };

    #[test]
    fn test_capacitor_outranks_resistor() {
        let mut state = ClassificationState::new();
        assert!(state.record(RESISTOR, 10));
        assert!(state.record(CAPACITOR, 20));

        let snapshot = state.snapshot(1);
        assert_eq!(snapshot.resolved, CAPACITOR);
        assert_eq!(snapshot.slot(ComponentKind::Resistor).unwrap().reading, RESISTOR);
    }

    #[test]
    fn test_full_priority_order() {
        let mut state = ClassificationState::new();
        let inductor = ComponentReading::Inductor { millihenries: 1.0 };
        let diode = ComponentReading::Diode {
            forward_volts: 0.6,
            anode: NodeId(0),
            cathode: NodeId(1),
        };

        state.record(RESISTOR, 1);
        assert_eq!(state.resolve(), RESISTOR);
        state.record(inductor, 2);
        assert_eq!(state.resolve(), inductor);
        state.record(CAPACITOR, 3);
        assert_eq!(state.resolve(), CAPACITOR);
        state.record(diode, 4);
        assert_eq!(state.resolve(), diode);
    }

    #[test]
    fn test_none_leaves_slots_untouched() {
        let mut state = ClassificationState::new();
        state.record(RESISTOR, 1);
        assert!(!state.record(ComponentReading::None, 2));
        assert_eq!(state.resistor.unwrap().timestamp_ms, 1);

        state.reset();
        assert_eq!(state.resolve(), ComponentReading::None);
        assert_eq!(state, ClassificationState::default());
    }

    #[test]
    fn test_later_reading_overwrites_slot() {
        let mut state = ClassificationState::new();
        state.record(RESISTOR, 1);
        state.record(ComponentReading::Resistor { ohms: 220.0 }, 5);
        let slot = state.slot(ComponentKind::Resistor).unwrap();
        assert_eq!(slot.reading, ComponentReading::Resistor { ohms: 220.0 });
        assert_eq!(slot.timestamp_ms, 5);
    }

    #[test]
    fn test_display_units() {
        assert_eq!(RESISTOR.to_string(), "Resistor 4.70 kΩ");
        assert_eq!(
            ComponentReading::Resistor { ohms: 330.0 }.to_string(),
            "Resistor 330.0 Ω"
        );
        assert_eq!(
            ComponentReading::Capacitor { microfarads: 0.1 }.to_string(),
            "Capacitor 100.0 nF"
        );
        assert_eq!(ComponentReading::None.to_string(), "no component detected");
    }
}
