//! Compiler state carried across the waypoint loop.

use crate::error::{KrlError, KrlResult};
use crate::path::AttributeValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The two interpolation modes a program uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveKind {
    /// Joint-interpolated (`PTP`). Used for the home bookends and the first waypoint.
    PointToPoint,
    /// Cartesian straight-line (`LIN`). Used for every later waypoint.
    Continuous,
}

/// Where the program is in its `PTP ... LIN ... PTP` shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    NotStarted,
    Approach,
    Path,
    Return,
}

/// Mutable state of one compilation run.
///
/// Tracks the last value emitted per variable and the last emitted path speed, so a
/// value is only written when it changes. Owned by exactly one run and discarded with it.
#[derive(Clone, Debug)]
pub struct CompilerState {
    last_values: BTreeMap<String, AttributeValue>,
    last_path_speed: Option<f64>,
    phase: Phase,
}

impl Default for CompilerState {
    fn default() -> Self {
        Self {
            last_values: BTreeMap::new(),
            last_path_speed: None,
            phase: Phase::NotStarted,
        }
    }
}

impl CompilerState {
    /// Fresh state whose path speed is the one already declared in the header.
    pub fn new(initial_path_speed: f64) -> Self {
        Self {
            last_path_speed: Some(initial_path_speed),
            ..Default::default()
        }
    }

    /// Records `value` for `name`. Returns `true` when it differs from the last
    /// emitted value (or nothing was emitted yet) and an assignment is needed.
    pub fn observe_variable(&mut self, name: &str, value: AttributeValue) -> bool {
        if self.last_values.get(name) == Some(&value) {
            return false;
        }
        self.last_values.insert(name.to_string(), value);
        true
    }

    /// Records a path speed. Returns `true` when a `$VEL.CP` change is needed.
    pub fn observe_path_speed(&mut self, speed: f64) -> bool {
        if self.last_path_speed == Some(speed) {
            return false;
        }
        self.last_path_speed = Some(speed);
        true
    }

    pub fn last_value(&self, name: &str) -> Option<AttributeValue> {
        self.last_values.get(name).copied()
    }

    pub fn last_path_speed(&self) -> Option<f64> {
        self.last_path_speed
    }

    /// Kind of the most recent move, `None` before the first one.
    pub fn move_kind(&self) -> Option<MoveKind> {
        match self.phase {
            Phase::NotStarted => None,
            Phase::Approach | Phase::Return => Some(MoveKind::PointToPoint),
            Phase::Path => Some(MoveKind::Continuous),
        }
    }

    /// Advances the move state machine.
    ///
    /// A program opens with point-to-point moves, switches to continuous moves once,
    /// and switches back once for the return. Continuous motion needs a known prior
    /// pose, so it is rejected before any point-to-point move and after the return.
    pub fn enter(&mut self, kind: MoveKind) -> KrlResult<()> {
        let next = match (self.phase, kind) {
            (Phase::NotStarted | Phase::Approach, MoveKind::PointToPoint) => Phase::Approach,
            (Phase::Approach | Phase::Path, MoveKind::Continuous) => Phase::Path,
            (Phase::Path | Phase::Return, MoveKind::PointToPoint) => Phase::Return,
            (phase, kind) => {
                return Err(KrlError::input(format!(
                    "illegal {kind:?} move in phase {phase:?}"
                )));
            }
        };
        if self.move_kind() != Some(kind) {
            tracing::trace!(from = ?self.move_kind(), to = ?kind, "move kind changed");
        }
        self.phase = next;
        Ok(())
    }
}
