//! Error types and the stable error-code catalog
//!
//! Every failure surfaced to a caller carries a stable code (`VAL_…`,
//! `SLV_…`, `NUM_…`, `SRM_…`, `SYS_…`) plus a human-readable title and
//! description, formatted as `[CODE] Title: Description`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error codes shared with external adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Validation (1000-1999)
    ValToleranceOob,
    ValIterationsOob,
    ValStepSizeOob,
    ValLoadFracOob,
    ValMaxStepsOob,
    ValIterMismatch,
    ValEmptyMesh,
    ValOverElementLimit,

    // Convergence & stability (2000-2999)
    SolverDiverged,
    SolverMaxIterations,
    SolverStepLimit,
    SolverCutbackLimit,
    SolverSingularMatrix,
    SolverUnstableGeometry,

    // Numerical & physics (3000-3999)
    NumOverflow,
    NumNanDetected,
    SrmLimitReached,

    // System & resource (9000-9999)
    SysOverloadPrevention,
    SysInternalError,
}

impl ErrorCode {
    /// The stable wire code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::ValToleranceOob => "VAL_1001",
            ErrorCode::ValIterationsOob => "VAL_1002",
            ErrorCode::ValStepSizeOob => "VAL_1003",
            ErrorCode::ValLoadFracOob => "VAL_1004",
            ErrorCode::ValMaxStepsOob => "VAL_1005",
            ErrorCode::ValIterMismatch => "VAL_1006",
            ErrorCode::ValEmptyMesh => "VAL_1101",
            ErrorCode::ValOverElementLimit => "VAL_1102",
            ErrorCode::SolverDiverged => "SLV_2001",
            ErrorCode::SolverMaxIterations => "SLV_2002",
            ErrorCode::SolverStepLimit => "SLV_2003",
            ErrorCode::SolverCutbackLimit => "SLV_2004",
            ErrorCode::SolverSingularMatrix => "SLV_2101",
            ErrorCode::SolverUnstableGeometry => "SLV_2102",
            ErrorCode::NumOverflow => "NUM_3001",
            ErrorCode::NumNanDetected => "NUM_3002",
            ErrorCode::SrmLimitReached => "SRM_3101",
            ErrorCode::SysOverloadPrevention => "SYS_9001",
            ErrorCode::SysInternalError => "SYS_9999",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ErrorCode::ValToleranceOob => "Tolerance Out of Bounds",
            ErrorCode::ValIterationsOob => "Max Iterations Out of Bounds",
            ErrorCode::ValStepSizeOob => "Initial Step Size Out of Bounds",
            ErrorCode::ValLoadFracOob => "Max Load Fraction Out of Bounds",
            ErrorCode::ValMaxStepsOob => "Max Total Steps Out of Bounds",
            ErrorCode::ValIterMismatch => "Iteration Range Mismatch",
            ErrorCode::ValEmptyMesh => "Empty Mesh Generated",
            ErrorCode::ValOverElementLimit => "Element Count Exceeds Limit",
            ErrorCode::SolverDiverged => "Convergence Failure (Divergence)",
            ErrorCode::SolverMaxIterations => "Max Iterations Reached",
            ErrorCode::SolverStepLimit => "Maximum Steps Reached",
            ErrorCode::SolverCutbackLimit => "Step Size Limit Reached",
            ErrorCode::SolverSingularMatrix => "Singular Stiffness Matrix",
            ErrorCode::SolverUnstableGeometry => "Unstable Geometry",
            ErrorCode::NumOverflow => "Numerical Overflow",
            ErrorCode::NumNanDetected => "Non-Finite Value Detected",
            ErrorCode::SrmLimitReached => "SRM Limit State",
            ErrorCode::SysOverloadPrevention => "Overload Prevention",
            ErrorCode::SysInternalError => "Internal Error",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::ValToleranceOob => {
                "The convergence tolerance must be between 0.001 and 0.1. Values outside this \
                 range may cause instability or excessive calculation time."
            }
            ErrorCode::ValIterationsOob => {
                "Maximum iterations per step must be between 1 and 100. High values can hang \
                 the process, while low values may prevent convergence."
            }
            ErrorCode::ValStepSizeOob => {
                "The initial MStage step size must be between 0.001 and 1.0."
            }
            ErrorCode::ValLoadFracOob => {
                "The maximum load fraction for adaptive stepping must be between 0.01 and 1.0."
            }
            ErrorCode::ValMaxStepsOob => {
                "The maximum number of allowed load increments must be between 1 and 1000 to \
                 prevent infinite loops."
            }
            ErrorCode::ValIterMismatch => {
                "The minimum desired iterations cannot be greater than the maximum desired \
                 iterations."
            }
            ErrorCode::ValEmptyMesh => {
                "The mesh generator produced zero elements. This usually happens if the input \
                 polygons are overlapping, crossing, or have invalid coordinates."
            }
            ErrorCode::ValOverElementLimit => {
                "The mesh contains more than 4000 elements. This exceeds the maximum allowed \
                 element count for performance reasons."
            }
            ErrorCode::SolverDiverged => {
                "The solver failed to reach equilibrium. The residual forces are increasing, \
                 indicating a possible collapse or unstable model configuration."
            }
            ErrorCode::SolverMaxIterations => {
                "The step failed to converge within the allotted number of iterations. Try \
                 reducing the step size or increasing tolerance."
            }
            ErrorCode::SolverStepLimit => {
                "The solver reached the maximum allowed number of load increments (MStage \
                 steps) without completing the phase."
            }
            ErrorCode::SolverCutbackLimit => {
                "The solver attempted to reduce the step size to find equilibrium, but the \
                 size became too small to continue. The model is likely at a physical limit \
                 state (failure)."
            }
            ErrorCode::SolverSingularMatrix => {
                "The global stiffness matrix is not invertible. This usually means the model \
                 is not properly restrained (missing boundary conditions) or has detached \
                 elements."
            }
            ErrorCode::SolverUnstableGeometry => {
                "The active mesh region has no free degrees of freedom or is geometrically \
                 unstable."
            }
            ErrorCode::NumOverflow => {
                "A calculation result exceeded the floating-point limits. This often happens \
                 near a catastrophic failure point in the soil."
            }
            ErrorCode::NumNanDetected => {
                "A non-finite value appeared in stresses, displacements or residual forces. \
                 The phase cannot continue."
            }
            ErrorCode::SrmLimitReached => {
                "Safety analysis stopped because the model reached a critical failure state \
                 where further strength reduction is impossible."
            }
            ErrorCode::SysOverloadPrevention => {
                "Calculation blocked because the requested settings would likely exceed \
                 safety or memory limits."
            }
            ErrorCode::SysInternalError => "An unspecified internal error occurred.",
        }
    }

    /// The `[CODE] Title: Description` string used in logs and responses
    pub fn message(&self) -> String {
        format!("[{}] {}: {}", self.code(), self.title(), self.description())
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// Main error type of the engine
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("{0}")]
    Validation(ErrorCode),

    #[error("mesh generation failed: {0}")]
    MeshGeneration(String),

    #[error("{}", ErrorCode::SolverSingularMatrix.message())]
    SingularMatrix,

    #[error("{}", ErrorCode::NumNanDetected.message())]
    NonFinite,

    #[error("element {element_id} is degenerate (|A| = {area:.3e})")]
    DegenerateElement { element_id: usize, area: f64 },

    #[error("material '{0}' not found in the request library")]
    MaterialNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the crate
pub type SolverResult<T> = Result<T, SolverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_format() {
        let msg = ErrorCode::ValToleranceOob.message();
        assert!(msg.starts_with("[VAL_1001] Tolerance Out of Bounds:"));
    }

    #[test]
    fn test_error_display_carries_code() {
        let err = SolverError::Validation(ErrorCode::ValEmptyMesh);
        assert!(err.to_string().contains("VAL_1101"));
        let err = SolverError::SingularMatrix;
        assert!(err.to_string().contains("SLV_2101"));
    }
}
