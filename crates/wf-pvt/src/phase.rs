//! Active phase set and dense component indexing.
//!
//! Blackoil carries up to three phases, each paired with one surface
//! component. Runs with fewer active phases (dead oil, gas-water) pack the
//! active components densely; every per-component vector in the well model
//! is indexed through [`PhaseSet::comp_index`].

use crate::error::{PvtError, PvtResult};
use serde::{Deserialize, Serialize};

/// One of the blackoil phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Water,
    Oil,
    Gas,
}

impl Phase {
    /// Canonical ordering used for dense component indices.
    pub const CANONICAL: [Phase; 3] = [Phase::Water, Phase::Oil, Phase::Gas];

    pub fn name(self) -> &'static str {
        match self {
            Phase::Water => "water",
            Phase::Oil => "oil",
            Phase::Gas => "gas",
        }
    }
}

/// The set of phases active in the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSet {
    water: bool,
    oil: bool,
    gas: bool,
}

impl PhaseSet {
    pub fn new(water: bool, oil: bool, gas: bool) -> PvtResult<Self> {
        if !(water || oil || gas) {
            return Err(PvtError::InvalidArg {
                what: "phase set must contain at least one phase",
            });
        }
        Ok(Self { water, oil, gas })
    }

    /// The standard three-phase set.
    pub fn all() -> Self {
        Self {
            water: true,
            oil: true,
            gas: true,
        }
    }

    pub fn is_active(&self, phase: Phase) -> bool {
        match phase {
            Phase::Water => self.water,
            Phase::Oil => self.oil,
            Phase::Gas => self.gas,
        }
    }

    /// Number of active phases (== number of conserved components).
    pub fn n_phases(&self) -> usize {
        usize::from(self.water) + usize::from(self.oil) + usize::from(self.gas)
    }

    /// Dense component index of `phase`, or `None` when inactive.
    ///
    /// Active phases are packed in canonical (water, oil, gas) order.
    pub fn comp_index(&self, phase: Phase) -> Option<usize> {
        if !self.is_active(phase) {
            return None;
        }
        let mut idx = 0;
        for p in Phase::CANONICAL {
            if p == phase {
                return Some(idx);
            }
            if self.is_active(p) {
                idx += 1;
            }
        }
        None
    }

    /// Dense component index of `phase`, erroring when inactive.
    pub fn comp_index_checked(&self, phase: Phase) -> PvtResult<usize> {
        self.comp_index(phase).ok_or(PvtError::PhaseNotActive {
            what: phase.name(),
        })
    }

    /// Phase occupying dense component slot `comp`.
    pub fn phase_of_comp(&self, comp: usize) -> Option<Phase> {
        self.active().nth(comp)
    }

    /// Iterate active phases in canonical order.
    pub fn active(&self) -> impl Iterator<Item = Phase> + '_ {
        Phase::CANONICAL
            .into_iter()
            .filter(move |p| self.is_active(*p))
    }

    /// Both oil and gas active, so dissolution/vaporization can occur.
    pub fn has_oil_gas(&self) -> bool {
        self.oil && self.gas
    }
}

impl Default for PhaseSet {
    fn default() -> Self {
        Self::all()
    }
}
