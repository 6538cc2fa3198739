//! Simulation parameters.
//!
//! `PhysicsConfig` is the complete set the engine runs with. `PhysicsParams`
//! is a partial update where every field is optional, as sent by
//! `modifyPhysics`.

use serde::{Deserialize, Serialize};

/// Numerical integration scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Integrator {
    Euler,
    #[default]
    Verlet,
}

/// Configuration for the force model and integrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhysicsConfig {
    pub integrator: Integrator,
    /// Spring constant applied to every spring.
    pub stiffness: f32,
    /// Repulsion coefficient between every pair of particles.
    pub repulsion: f32,
    /// Fraction of velocity removed each step.
    pub friction: f32,
    /// Pull every particle toward the origin.
    pub gravity: bool,
    /// Time step per tick.
    pub dt: f32,
    /// Barnes-Hut opening threshold; 0 selects exact brute force.
    pub theta: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            integrator: Integrator::Verlet,
            stiffness: 1000.0,
            repulsion: 600.0,
            friction: 0.3,
            gravity: false,
            dt: 0.02,
            theta: 0.4,
        }
    }
}

impl PhysicsConfig {
    /// Overlay the fields present in `params`.
    pub fn with_params(mut self, params: &PhysicsParams) -> Self {
        if let Some(integrator) = params.integrator {
            self.integrator = integrator;
        }
        if let Some(stiffness) = params.stiffness {
            self.stiffness = stiffness;
        }
        if let Some(repulsion) = params.repulsion {
            self.repulsion = repulsion;
        }
        if let Some(friction) = params.friction {
            self.friction = friction;
        }
        if let Some(gravity) = params.gravity {
            self.gravity = gravity;
        }
        if let Some(dt) = params.dt {
            self.dt = dt;
        }
        if let Some(theta) = params.theta() {
            self.theta = theta;
        }
        self
    }
}

/// Partial parameter update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhysicsParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrator: Option<Integrator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stiffness: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repulsion: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friction: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gravity: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dt: Option<f32>,
    /// Accuracy of the repulsion approximation in `[0, 1]`; `theta = 1 - precision`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<f32>,
    /// Tick interval in milliseconds, possibly fractional. Consumed by the run
    /// loop, not the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

impl PhysicsParams {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn theta(&self) -> Option<f32> {
        self.precision.map(|p| 1.0 - p.clamp(0.0, 1.0))
    }

    /// `timeout` rounded to whole milliseconds, at least 1. Non-finite values
    /// are treated as absent.
    pub fn timeout_ms(&self) -> Option<u32> {
        self.timeout
            .filter(|t| t.is_finite())
            .map(|t| t.round().clamp(1.0, u32::MAX as f64) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PhysicsConfig::default();
        assert_eq!(config.integrator, Integrator::Verlet);
        assert_eq!(config.stiffness, 1000.0);
        assert_eq!(config.repulsion, 600.0);
        assert_eq!(config.friction, 0.3);
        assert!(!config.gravity);
        assert_eq!(config.dt, 0.02);
        assert_eq!(config.theta, 0.4);
    }

    #[test]
    fn test_with_params_overlays_present_fields() {
        let params = PhysicsParams {
            repulsion: Some(100.0),
            gravity: Some(true),
            precision: Some(0.75),
            ..PhysicsParams::default()
        };
        let config = PhysicsConfig::default().with_params(&params);

        assert_eq!(config.repulsion, 100.0);
        assert!(config.gravity);
        assert_eq!(config.theta, 0.25);
        assert_eq!(config.stiffness, 1000.0);
        assert_eq!(config.integrator, Integrator::Verlet);
    }

    #[test]
    fn test_precision_one_is_exact() {
        let params = PhysicsParams {
            precision: Some(1.0),
            ..PhysicsParams::default()
        };
        assert_eq!(PhysicsConfig::default().with_params(&params).theta, 0.0);
    }

    #[test]
    fn test_from_json() {
        let params = PhysicsParams::from_json(
            r#"{"integrator": "euler", "stiffness": 10, "dt": 0.05, "timeout": 40}"#,
        )
        .unwrap();
        assert_eq!(params.integrator, Some(Integrator::Euler));
        assert_eq!(params.stiffness, Some(10.0));
        assert_eq!(params.dt, Some(0.05));
        assert_eq!(params.timeout_ms(), Some(40));
        assert_eq!(params.repulsion, None);

        assert_eq!(PhysicsParams::from_json("{}").unwrap(), PhysicsParams::default());
        assert!(PhysicsParams::from_json(r#"{"integrator": "rk4"}"#).is_err());
    }

    #[test]
    fn test_fractional_timeout_rounds() {
        let params = PhysicsParams::from_json(r#"{"timeout": 16.666666666666668}"#).unwrap();
        assert_eq!(params.timeout_ms(), Some(17));

        let tiny = PhysicsParams {
            timeout: Some(0.2),
            ..PhysicsParams::default()
        };
        assert_eq!(tiny.timeout_ms(), Some(1));
        assert_eq!(PhysicsParams::default().timeout_ms(), None);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: PhysicsConfig = serde_json::from_str(r#"{"friction": 0.5}"#).unwrap();
        assert_eq!(config.friction, 0.5);
        assert_eq!(config.repulsion, 600.0);
    }
}
