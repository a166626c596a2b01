//! Static per-timestep well description.
//!
//! The driver owns this configuration and hands it to the well core by
//! reference; nothing here is mutated during a timestep. Optional physics
//! (polymer, foam, solvent, brine, thermal energy) is switched on per well
//! through [`TracerConfig`]; each enabled unit names the reservoir equation
//! row its transport contribution couples to.

use crate::error::{WellError, WellResult};
use crate::tables::{Table1d, Table2d};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use wf_core::units::{self, Length, Pressure, Ratio, VolRate, Volume};
use wf_core::{CellId, Real, WellId};
use wf_pvt::{Phase, PhaseSet, VfpTable};

/// Wellbore volume used by the storage term, 0.1 cubic feet.
pub const WELLBORE_VOLUME_DEFAULT_M3: Real = 0.002831684659200;

/// Declared flow direction of the well.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WellKind {
    Producer,
    Injector,
}

impl WellKind {
    pub fn is_producer(self) -> bool {
        self == WellKind::Producer
    }

    pub fn is_injector(self) -> bool {
        self == WellKind::Injector
    }

    /// Sign of surface rates under this role: producers carry negative
    /// rates, injectors positive.
    pub fn rate_sign(self) -> Real {
        match self {
            WellKind::Producer => -1.0,
            WellKind::Injector => 1.0,
        }
    }
}

/// One perforation, bound to a single reservoir cell.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PerfConfig {
    pub cell: CellId,
    /// Connection transmissibility factor [m³]; multiplied by the cell's
    /// rock-compaction transmissibility multiplier at assembly time.
    pub connection_factor: Real,
    /// True vertical depth of the perforation.
    pub depth: Length,
    pub bore_diameter: Length,
    pub perf_length: Length,
    /// Representative radius for the shear-velocity contact area.
    pub rep_radius: Length,
}

impl PerfConfig {
    pub fn new(cell: CellId, connection_factor: Real, depth: Length) -> Self {
        Self {
            cell,
            connection_factor,
            depth,
            bore_diameter: units::m(0.2159),
            perf_length: units::m(1.0),
            rep_radius: units::m(0.1),
        }
    }

    /// Cross-sectional flow area seen by the injectivity velocity unknown.
    pub fn flow_area(&self) -> Real {
        PI * self.bore_diameter.value * self.perf_length.value
    }

    /// Cylindrical contact area used for the shear-velocity estimate.
    pub fn contact_area(&self) -> Real {
        2.0 * PI * self.rep_radius.value * self.perf_length.value
    }
}

/// Active control target for the well equation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ControlMode {
    /// Hold bottom-hole pressure at its limit.
    Bhp,
    /// Hold tubing-head pressure at its limit through the lift table.
    Thp,
    /// Hold a surface-volume rate; `phase` of `None` targets the total.
    SurfaceRate {
        phase: Option<Phase>,
        target: VolRate,
    },
    /// Hold a reservoir-volume rate; `factors` convert surface to
    /// reservoir volumes per dense component.
    ReservoirRate { target: VolRate, factors: Vec<Real> },
}

/// Pressure limits and the active control mode.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WellControls {
    pub mode: ControlMode,
    /// Lower pressure bound for producers, upper bound for injectors.
    pub bhp_limit: Pressure,
    pub thp_limit: Option<Pressure>,
    /// Lift performance table; required for THP control and THP
    /// operability checks.
    pub vfp: Option<VfpTable>,
}

impl Default for WellControls {
    fn default() -> Self {
        Self {
            mode: ControlMode::Bhp,
            bhp_limit: units::pa(units::constants::ATM_PA),
            thp_limit: None,
            vfp: None,
        }
    }
}

/// Polymer transport riding on the water component.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolymerConfig {
    /// Reservoir equation row of the polymer balance.
    pub cell_eq: usize,
    /// Injected concentration [kg/m³].
    pub injection_concentration: Real,
    /// Viscosity multiplier curve over concentration; divides the water
    /// mobility of injecting wells.
    pub visc_mult: Option<Table1d>,
    pub shear: Option<ShearConfig>,
    pub molecular_weight: Option<PolyMwConfig>,
}

/// Shear thinning of the water mobility near the wellbore.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShearConfig {
    /// Shear factor over (concentration, water velocity).
    pub factor_table: Table2d,
    /// Optional velocity-to-shear-rate conversion; divided by the bore
    /// diameter when applied.
    pub shrate: Option<Real>,
    /// Critical water saturation of the drainage curve.
    pub swcr: Real,
}

/// Polymer molecular-weight transport with the injectivity sub-model.
///
/// Enabling this on an injector adds a velocity and a skin-pressure
/// unknown per perforation. Tables missing at the point of use are
/// reported as configuration errors.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolyMwConfig {
    /// Reservoir equation row of the molecular-weight balance.
    pub cell_eq: usize,
    /// Skin pressure over (throughput, velocity) when injecting plain water.
    pub skin_water_table: Option<Table2d>,
    pub skin_poly_table: Option<SkinPolyTable>,
    /// Molecular weight over (throughput, velocity).
    pub mw_table: Option<Table2d>,
}

/// Skin-pressure table at a reference polymer concentration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SkinPolyTable {
    pub table: Table2d,
    pub ref_concentration: Real,
}

/// Foam transport riding on the gas component.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FoamConfig {
    pub cell_eq: usize,
    pub injection_concentration: Real,
}

/// Solvent transport as a fraction of the gas stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolventConfig {
    pub cell_eq: usize,
    pub injection_fraction: Real,
}

/// Salt transport riding on the water component.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrineConfig {
    pub cell_eq: usize,
    pub injection_concentration: Real,
}

/// Thermal energy transport.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnergyConfig {
    pub cell_eq: usize,
    /// Injection-condition specific enthalpy [J/kg] per dense component.
    pub injection_enthalpy: Vec<Real>,
    /// Injection-condition phase density [kg/m³] per dense component.
    pub injection_density: Vec<Real>,
}

/// Optional physics enabled for this well.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TracerConfig {
    pub polymer: Option<PolymerConfig>,
    pub foam: Option<FoamConfig>,
    pub solvent: Option<SolventConfig>,
    pub brine: Option<BrineConfig>,
    pub energy: Option<EnergyConfig>,
}

/// Immutable description of one well for one timestep.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WellConfig {
    pub name: String,
    pub id: WellId,
    pub kind: WellKind,
    pub phases: PhaseSet,
    pub preferred_phase: Phase,
    /// Perforations in depth order, shallowest first.
    pub perfs: Vec<PerfConfig>,
    /// Datum depth of the bottom-hole pressure.
    pub reference_depth: Length,
    pub efficiency_factor: Ratio,
    pub allow_crossflow: bool,
    pub wellbore_volume: Volume,
    /// Injected phase; required for injectors.
    pub injection_phase: Option<Phase>,
    pub controls: WellControls,
    pub tracers: TracerConfig,
}

impl WellConfig {
    pub fn new(
        name: impl Into<String>,
        id: WellId,
        kind: WellKind,
        phases: PhaseSet,
        preferred_phase: Phase,
        perfs: Vec<PerfConfig>,
    ) -> Self {
        Self {
            name: name.into(),
            id,
            kind,
            phases,
            preferred_phase,
            perfs,
            reference_depth: units::m(0.0),
            efficiency_factor: units::unitless(1.0),
            allow_crossflow: true,
            wellbore_volume: units::m3(WELLBORE_VOLUME_DEFAULT_M3),
            injection_phase: None,
            controls: WellControls::default(),
            tracers: TracerConfig::default(),
        }
    }

    pub fn n_comps(&self) -> usize {
        self.phases.n_phases()
    }

    pub fn n_perfs(&self) -> usize {
        self.perfs.len()
    }

    /// True when the polymer molecular-weight sub-model adds per-perforation
    /// velocity and skin-pressure unknowns.
    pub fn has_injectivity(&self) -> bool {
        self.kind.is_injector()
            && self
                .tracers
                .polymer
                .as_ref()
                .is_some_and(|p| p.molecular_weight.is_some())
    }

    /// Structural checks; table presence is verified at the point of use.
    pub fn validate(&self) -> WellResult<()> {
        if self.perfs.is_empty() {
            return Err(WellError::InvalidConfig {
                what: format!("well {} has no perforations", self.name),
            });
        }
        if !self.phases.is_active(self.preferred_phase) {
            return Err(WellError::InvalidConfig {
                what: format!(
                    "well {}: preferred phase {} is not active",
                    self.name,
                    self.preferred_phase.name()
                ),
            });
        }
        if self.kind.is_injector() {
            match self.injection_phase {
                Some(phase) if self.phases.is_active(phase) => {}
                Some(phase) => {
                    return Err(WellError::InvalidConfig {
                        what: format!(
                            "well {}: injection phase {} is not active",
                            self.name,
                            phase.name()
                        ),
                    });
                }
                None => {
                    return Err(WellError::InvalidConfig {
                        what: format!("injector {} has no injection phase", self.name),
                    });
                }
            }
        }
        if !(self.efficiency_factor.value > 0.0) {
            return Err(WellError::InvalidConfig {
                what: format!("well {}: efficiency factor must be positive", self.name),
            });
        }
        if let ControlMode::SurfaceRate {
            phase: Some(phase), ..
        } = &self.controls.mode
        {
            if !self.phases.is_active(*phase) {
                return Err(WellError::InvalidConfig {
                    what: format!(
                        "well {}: rate-controlled phase {} is not active",
                        self.name,
                        phase.name()
                    ),
                });
            }
        }
        if let ControlMode::ReservoirRate { factors, .. } = &self.controls.mode {
            if factors.len() != self.n_comps() {
                return Err(WellError::InvalidConfig {
                    what: format!(
                        "well {}: reservoir-rate factors must cover every component",
                        self.name
                    ),
                });
            }
        }
        for perf in &self.perfs {
            if !(perf.connection_factor.is_finite() && perf.connection_factor >= 0.0) {
                return Err(WellError::InvalidConfig {
                    what: format!("well {}: non-physical connection factor", self.name),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_core::Id;

    fn one_perf() -> Vec<PerfConfig> {
        vec![PerfConfig::new(CellId::from_index(0), 1e-12, units::m(2000.0))]
    }

    fn producer() -> WellConfig {
        WellConfig::new(
            "P-1",
            Id::from_index(0),
            WellKind::Producer,
            PhaseSet::all(),
            Phase::Oil,
            one_perf(),
        )
    }

    #[test]
    fn defaults_validate() {
        assert!(producer().validate().is_ok());
    }

    #[test]
    fn injector_needs_injection_phase() {
        let mut cfg = producer();
        cfg.kind = WellKind::Injector;
        assert!(cfg.validate().is_err());
        cfg.injection_phase = Some(Phase::Water);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn no_perforations_rejected() {
        let mut cfg = producer();
        cfg.perfs.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn injectivity_requires_injector_and_tables() {
        let mut cfg = producer();
        cfg.tracers.polymer = Some(PolymerConfig {
            cell_eq: 3,
            injection_concentration: 1.0,
            visc_mult: None,
            shear: None,
            molecular_weight: Some(PolyMwConfig {
                cell_eq: 4,
                skin_water_table: None,
                skin_poly_table: None,
                mw_table: None,
            }),
        });
        assert!(!cfg.has_injectivity());
        cfg.kind = WellKind::Injector;
        cfg.injection_phase = Some(Phase::Water);
        assert!(cfg.has_injectivity());
    }

    #[test]
    fn config_round_trips_through_json() {
        let mut cfg = producer();
        cfg.controls.mode = ControlMode::SurfaceRate {
            phase: Some(Phase::Oil),
            target: units::m3ps(0.05),
        };
        cfg.controls.thp_limit = Some(units::pa(20e5));
        cfg.tracers.brine = Some(BrineConfig {
            cell_eq: 3,
            injection_concentration: 50.0,
        });
        let text = serde_json::to_string(&cfg).unwrap();
        let back: WellConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.name, cfg.name);
        assert_eq!(back.id, cfg.id);
        assert_eq!(back.kind, cfg.kind);
        assert_eq!(back.perfs[0].cell, cfg.perfs[0].cell);
        assert_eq!(back.perfs[0].depth.value, cfg.perfs[0].depth.value);
        assert_eq!(back.controls.thp_limit.map(|p| p.value), Some(20e5));
        match back.controls.mode {
            ControlMode::SurfaceRate { phase, target } => {
                assert_eq!(phase, Some(Phase::Oil));
                assert_eq!(target.value, 0.05);
            }
            other => panic!("unexpected control mode: {other:?}"),
        }
        assert_eq!(
            back.tracers.brine.as_ref().map(|b| b.injection_concentration),
            Some(50.0)
        );
    }

    #[test]
    fn rate_sign_follows_role() {
        assert_eq!(WellKind::Producer.rate_sign(), -1.0);
        assert_eq!(WellKind::Injector.rate_sign(), 1.0);
    }
}
