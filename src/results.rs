//! Result records and the streaming event protocol
//!
//! A solve emits a sequence of [`SolverEvent`]s: logs, step points, one
//! `phase_result` per phase and a trailing `final` summary. Each event
//! serializes as `{"type": …, "content": …}`, ready for NDJSON framing by
//! an external adapter.

use serde::{Deserialize, Serialize};

/// Cumulative displacement at a node
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NodeResult {
    /// 1-based node id
    pub id: usize,
    pub ux: f64,
    pub uy: f64,
}

/// Stress state at one quadrature point of one element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressResult {
    /// 1-based element id
    pub element_id: usize,
    /// 1-based Gauss point id within the element
    pub gp_id: usize,
    pub sig_xx: f64,
    pub sig_yy: f64,
    pub sig_xy: f64,
    /// Out-of-plane stress, derived from the in-plane state
    pub sig_zz: f64,
    /// Load fraction at which this state was committed
    pub m_stage: f64,
    #[serde(default)]
    pub is_yielded: bool,
    #[serde(default)]
    pub pwp_steady: f64,
    #[serde(default)]
    pub pwp_excess: f64,
    #[serde(default)]
    pub pwp_total: f64,
}

/// One committed point of the load-fraction history
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StepPoint {
    pub m_stage: f64,
    /// Largest incremental displacement magnitude at that fraction (m)
    pub max_disp: f64,
}

/// Outcome of a single phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase_id: String,
    pub success: bool,
    pub displacements: Vec<NodeResult>,
    pub stresses: Vec<StressResult>,
    /// Final load fraction ξ (FoS for safety phases)
    pub reached_m_stage: f64,
    #[serde(default)]
    pub step_points: Vec<StepPoint>,
    /// Step counter at which the phase gave up, if it did
    #[serde(default)]
    pub step_failed_at: Option<usize>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Trailing summary of a whole solve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverSummary {
    pub success: bool,
    pub phases: Vec<PhaseResult>,
    pub log: Vec<String>,
}

/// Streaming progress events of a solve
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum SolverEvent {
    Log(String),
    StepPoint(StepPoint),
    PhaseResult(PhaseResult),
    Final(SolverSummary),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = SolverEvent::Log("hello".to_string());
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"log","content":"hello"}"#);

        let event = SolverEvent::StepPoint(StepPoint {
            m_stage: 0.5,
            max_disp: 0.001,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.starts_with(r#"{"type":"step_point","content":{"#));
    }

    #[test]
    fn test_stress_result_round_trip_is_bit_identical() {
        let stress = StressResult {
            element_id: 7,
            gp_id: 2,
            sig_xx: -12.345678901234567,
            sig_yy: -90.000000000000014,
            sig_xy: 1.5e-13,
            sig_zz: -30.70000000000001,
            m_stage: 0.8500000000000002,
            is_yielded: true,
            pwp_steady: -9.81,
            pwp_excess: -0.12,
            pwp_total: -9.93,
        };
        let json = serde_json::to_string(&stress).unwrap();
        let back: StressResult = serde_json::from_str(&json).unwrap();
        assert_eq!(stress, back);
    }
}
