//! Plain-data description of a simulation setup.
//!
//! A [`ScenarioSpec`] carries everything the solver needs as serde-friendly
//! values (vectors as `Vec<f64>`, constraints as tagged variants), so callers
//! can deserialize it from whatever format they use and turn it into a
//! ready-to-run [`Simulator`].

use crate::constraint::{CircleConstraint, Constraint, CoupledCircleConstraint, PlanarConstraint};
use crate::error::DynamicsError;
use crate::forces::ZeroForce;
use crate::integration::IntegratorSettings;
use crate::particle_system::ParticleSystem;
use crate::simulation::{Simulator, StabilizationGains};
use crate::types::SpaceVec;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForceSpec {
    #[default]
    None,
    SurfaceGravity {
        g: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintSpec {
    Circle {
        particle: usize,
        origin: Vec<f64>,
        radius: f64,
    },
    /// `origin_particle` is the centre, `particle` the constrained point.
    CoupledCircle {
        origin_particle: usize,
        particle: usize,
        radius: f64,
    },
    Planar {
        particle: usize,
        normal: Vec<f64>,
        point: Vec<f64>,
    },
}

impl ConstraintSpec {
    pub fn build(&self, ps: &ParticleSystem) -> Result<Constraint, DynamicsError> {
        let constraint = match self {
            ConstraintSpec::Circle {
                particle,
                origin,
                radius,
            } => CircleConstraint::new(ps, *particle, SpaceVec::from_vec(origin.clone()), *radius)?
                .into(),
            ConstraintSpec::CoupledCircle {
                origin_particle,
                particle,
                radius,
            } => CoupledCircleConstraint::new(ps, *origin_particle, *particle, *radius)?.into(),
            ConstraintSpec::Planar {
                particle,
                normal,
                point,
            } => PlanarConstraint::new(
                ps,
                *particle,
                SpaceVec::from_vec(normal.clone()),
                SpaceVec::from_vec(point.clone()),
            )?
            .into(),
        };
        Ok(constraint)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioSpec {
    pub dim: usize,
    pub masses: Vec<f64>,
    #[serde(default)]
    pub force: ForceSpec,
    #[serde(default)]
    pub constraints: Vec<ConstraintSpec>,
    #[serde(default)]
    pub stabilization: StabilizationGains,
    #[serde(default)]
    pub integrator: IntegratorSettings,
    #[serde(default)]
    pub record_diagnostics: bool,
}

impl ScenarioSpec {
    pub fn build(&self) -> Result<Simulator> {
        let ps = match self.force {
            ForceSpec::None => ParticleSystem::new(self.dim, self.masses.clone(), ZeroForce),
            ForceSpec::SurfaceGravity { g } => {
                ParticleSystem::with_surface_gravity(self.dim, self.masses.clone(), g)
            }
        }
        .context("Failed to build particle system.")?;

        let constraints = self
            .constraints
            .iter()
            .enumerate()
            .map(|(idx, spec)| {
                spec.build(&ps)
                    .with_context(|| format!("Invalid constraint #{idx}."))
            })
            .collect::<Result<Vec<_>>>()?;

        self.integrator
            .validate()
            .context("Invalid integrator settings.")?;

        let simulator = Simulator::new(ps, constraints)?
            .with_gains(self.stabilization)
            .with_settings(self.integrator)
            .with_diagnostics(self.record_diagnostics);
        Ok(simulator)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConstraintSpec, ForceSpec, ScenarioSpec};
    use crate::integration::{IntegratorMethod, IntegratorSettings};
    use crate::simulation::StabilizationGains;
    use crate::types::QVec;
    use approx::assert_relative_eq;

    fn pendulum() -> ScenarioSpec {
        ScenarioSpec {
            dim: 2,
            masses: vec![1.0, 1.0],
            force: ForceSpec::SurfaceGravity { g: 1.0 },
            constraints: vec![
                ConstraintSpec::Circle {
                    particle: 0,
                    origin: vec![0.0, 0.0],
                    radius: 1.0,
                },
                ConstraintSpec::CoupledCircle {
                    origin_particle: 0,
                    particle: 1,
                    radius: 2.0,
                },
                ConstraintSpec::Planar {
                    particle: 1,
                    normal: vec![0.0, 1.0],
                    point: vec![0.0, 0.0],
                },
            ],
            stabilization: StabilizationGains::default(),
            integrator: IntegratorSettings::default(),
            record_diagnostics: true,
        }
    }

    #[test]
    fn builds_simulator_in_declared_order() {
        let sim = pendulum().build().expect("valid scenario");
        let kinds: Vec<_> = sim
            .constraint_mapper()
            .constraints()
            .iter()
            .map(|c| c.kind())
            .collect();
        assert_eq!(kinds, ["circle", "coupled circle", "planar"]);

        let q0 = QVec::from_vec(vec![1.0, 0.0, 3.0, 0.0]);
        let trajectory = sim
            .simulate(&q0, &QVec::zeros(4), &[0.0, 0.1])
            .expect("simulation");
        assert!(trajectory.points[1].diagnostics.is_some());
    }

    #[test]
    fn reports_which_constraint_is_invalid() {
        let mut spec = pendulum();
        spec.constraints.push(ConstraintSpec::CoupledCircle {
            origin_particle: 1,
            particle: 1,
            radius: 1.0,
        });
        let err = spec.build().expect_err("self coupling");
        let message = format!("{err:#}");
        assert!(message.contains("Invalid constraint #3"), "{message}");
        assert!(message.contains("to itself"), "{message}");
    }

    #[test]
    fn reports_bad_particle_systems_and_settings() {
        let mut spec = pendulum();
        spec.masses = vec![1.0, -2.0];
        let err = spec.build().expect_err("negative mass");
        assert!(format!("{err:#}").contains("particle system"));

        let mut spec = pendulum();
        spec.integrator.max_steps = 0;
        let err = spec.build().expect_err("no steps allowed");
        assert!(format!("{err:#}").contains("max_steps"));

        let mut spec = pendulum();
        spec.dim = 3;
        let err = spec.build().expect_err("2d vectors in 3d space");
        assert!(format!("{err:#}").contains("circle origin"));
    }

    #[test]
    fn deserializes_minimal_json_with_defaults() {
        let json = r#"{
            "dim": 2,
            "masses": [1.0, 2.0],
            "force": { "kind": "surface_gravity", "g": 9.81 },
            "constraints": [
                { "kind": "circle", "particle": 0, "origin": [0.0, 0.0], "radius": 1.0 },
                { "kind": "coupled_circle", "origin_particle": 0, "particle": 1, "radius": 0.5 },
                { "kind": "planar", "particle": 1, "normal": [0.0, 1.0], "point": [0.0, -1.0] }
            ]
        }"#;
        let spec: ScenarioSpec = serde_json::from_str(json).expect("valid scenario json");
        assert_eq!(spec.force, ForceSpec::SurfaceGravity { g: 9.81 });
        assert_eq!(spec.stabilization, StabilizationGains::default());
        assert_eq!(spec.integrator, IntegratorSettings::default());
        assert!(!spec.record_diagnostics);
        assert_eq!(
            spec.constraints[1],
            ConstraintSpec::CoupledCircle {
                origin_particle: 0,
                particle: 1,
                radius: 0.5,
            }
        );

        let sim = spec.build().expect("valid scenario");
        assert_eq!(sim.gains().position, 1.0);
        assert_eq!(sim.gains().velocity, 1.0);
        let kinds: Vec<_> = sim
            .constraint_mapper()
            .constraints()
            .iter()
            .map(|c| c.kind())
            .collect();
        assert_eq!(kinds, ["circle", "coupled circle", "planar"]);
        let q = QVec::zeros(4);
        let f = sim.particle_system().force(&q, &q).expect("force");
        assert_relative_eq!(f[3], -2.0 * 9.81);
    }

    #[test]
    fn partial_settings_fill_in_defaults() {
        let json = r#"{
            "dim": 3,
            "masses": [1.0],
            "stabilization": { "position": 4.0 },
            "integrator": { "rtol": 1e-6, "method": { "Rk4": { "step": 0.01 } } },
            "record_diagnostics": true
        }"#;
        let spec: ScenarioSpec = serde_json::from_str(json).expect("valid scenario json");
        assert_eq!(spec.force, ForceSpec::None);
        assert!(spec.constraints.is_empty());
        assert_eq!(spec.stabilization.position, 4.0);
        assert_eq!(spec.stabilization.velocity, 1.0);
        assert_eq!(spec.integrator.rtol, 1e-6);
        assert_eq!(spec.integrator.atol, IntegratorSettings::default().atol);
        assert_eq!(
            spec.integrator.method,
            IntegratorMethod::Rk4 { step: 0.01 }
        );
        assert!(spec.record_diagnostics);

        let round_trip: ScenarioSpec =
            serde_json::from_str(&serde_json::to_string(&spec).expect("serialize"))
                .expect("deserialize");
        assert_eq!(round_trip, spec);
    }

    #[test]
    fn unknown_constraint_kind_is_rejected() {
        let json = r#"{
            "dim": 2,
            "masses": [1.0],
            "constraints": [{ "kind": "sphere", "particle": 0, "radius": 1.0 }]
        }"#;
        let err = serde_json::from_str::<ScenarioSpec>(json).expect_err("unknown kind");
        assert!(err.to_string().contains("sphere"), "{err}");
    }
}
