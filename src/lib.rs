//! Geo Solver - A native Rust finite element engine for staged
//! geotechnical analysis
//!
//! This library provides a 2D plane-strain analysis pipeline for layered
//! soil models, supporting:
//! - Unstructured T6 mesh generation over polygonal soil regions
//! - Constant-strain (T3) and quadratic (T6) triangle elements
//! - Mohr-Coulomb elastoplasticity with drainage-aware pore pressures
//! - Staged construction: K0 initialization, excavation and fill,
//!   point/line loading, material overrides
//! - Safety analysis by the Strength Reduction Method
//!
//! ## Example
//! ```no_run
//! use geo_solver::prelude::*;
//!
//! let request: MeshRequest = serde_json::from_str("...").unwrap();
//! let mesh = generate_mesh(&request);
//!
//! let solver_request = SolverRequest {
//!     mesh,
//!     phases: vec![/* staged phases */],
//!     settings: SolverSettings::default(),
//!     water_level: None,
//!     water_levels: vec![],
//!     point_loads: vec![],
//!     line_loads: vec![],
//!     materials: vec![],
//! };
//!
//! let cancel = CancelToken::new();
//! let summary = solve(&solver_request, &cancel, |event| {
//!     println!("{}", serde_json::to_string(&event).unwrap());
//! });
//! assert!(summary.success);
//! ```

pub mod constitutive;
pub mod elements;
pub mod error;
pub mod geometry;
pub mod math;
pub mod mesh;
pub mod model;
pub mod results;
pub mod solver;

// Re-export common types
pub mod prelude {
    pub use crate::elements::{DrainageType, Material, MaterialModel};
    pub use crate::error::{ErrorCode, SolverError, SolverResult};
    pub use crate::geometry::Point;
    pub use crate::mesh::generate_mesh;
    pub use crate::model::{
        LineLoad, MeshRequest, MeshResponse, MeshSettings, PhaseRequest, PhaseType, PointLoad,
        PolygonData, SolverRequest, SolverSettings, WaterLevel,
    };
    pub use crate::results::{
        NodeResult, PhaseResult, SolverEvent, SolverSummary, StepPoint, StressResult,
    };
    pub use crate::solver::{solve, CancelToken};
}
