//! Wire data model: mesh and solver requests, phases, settings
//!
//! Field names follow the external JSON contract of the original service
//! (`materialId`, `pointLoads`, …); indices are 0-based internally, with
//! 1-based ids on the wire where the schema says so.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::elements::Material;
use crate::geometry::Point;

/// A named phreatic polyline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterLevel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub points: Vec<Point>,
}

/// A polygonal soil region of the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolygonData {
    /// CCW vertex ring
    pub vertices: Vec<Point>,
    #[serde(default)]
    pub mesh_size: Option<f64>,
    #[serde(default)]
    pub boundary_refinement_factor: Option<f64>,
    #[serde(rename = "materialId")]
    pub material_id: String,
}

/// A concentrated load anchored at a coordinate (kN)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointLoad {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub fx: f64,
    pub fy: f64,
}

/// A distributed traction along a segment (kN/m)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineLoad {
    pub id: String,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub fx: f64,
    pub fy: f64,
}

/// Global mesh sizing defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshSettings {
    pub mesh_size: f64,
    pub boundary_refinement_factor: f64,
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self {
            mesh_size: 2.0,
            boundary_refinement_factor: 1.0,
        }
    }
}

/// Input to [`crate::mesh::generate_mesh`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshRequest {
    pub polygons: Vec<PolygonData>,
    pub materials: Vec<Material>,
    #[serde(rename = "pointLoads", default)]
    pub point_loads: Vec<PointLoad>,
    #[serde(rename = "lineLoads", default)]
    pub line_loads: Vec<LineLoad>,
    #[serde(default)]
    pub mesh_settings: MeshSettings,
    /// Legacy single polyline, kept for compatibility
    #[serde(default)]
    pub water_level: Option<Vec<Point>>,
    #[serde(default)]
    pub water_levels: Vec<WaterLevel>,
}

/// One constrained node
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundaryCondition {
    /// 0-based node index
    pub node: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoundaryConditions {
    /// Both dofs fixed (base of the model)
    pub full_fixed: Vec<BoundaryCondition>,
    /// Fixed normal to the boundary (vertical rollers on the sides)
    pub normal_fixed: Vec<BoundaryCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointLoadAssignment {
    pub point_load_id: String,
    /// 1-based node id, ready to use by external consumers
    pub assigned_node_id: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineLoadAssignment {
    pub line_load_id: String,
    /// 1-based element id
    pub element_id: usize,
    /// 1-based node ids `[corner1, corner2, midpoint]` of the loaded edge
    pub edge_nodes: Vec<usize>,
}

/// Material bound to one element
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementMaterial {
    /// 1-based element id
    pub element_id: usize,
    pub material: Material,
    /// 0-based index of the source polygon
    #[serde(default)]
    pub polygon_id: Option<usize>,
}

/// Output of the mesh generator and mesh input of the solver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshResponse {
    pub success: bool,
    /// Node coordinates `[[x, y], …]`, 0-based indexing
    pub nodes: Vec<[f64; 2]>,
    /// 0-based node index tuples; 6 entries for T6, 3 for T3
    pub elements: Vec<Vec<usize>>,
    pub boundary_conditions: BoundaryConditions,
    #[serde(default)]
    pub point_load_assignments: Vec<PointLoadAssignment>,
    #[serde(default)]
    pub line_load_assignments: Vec<LineLoadAssignment>,
    pub element_materials: Vec<ElementMaterial>,
    #[serde(default)]
    pub error: Option<String>,
}

impl MeshResponse {
    /// An empty, failed response carrying an error message
    pub fn failed(error: String) -> Self {
        Self {
            success: false,
            nodes: Vec::new(),
            elements: Vec::new(),
            boundary_conditions: BoundaryConditions::default(),
            point_load_assignments: Vec::new(),
            line_load_assignments: Vec::new(),
            element_materials: Vec::new(),
            error: Some(error),
        }
    }
}

/// Kind of analysis performed by a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseType {
    /// Standard elastoplastic deformation analysis
    #[default]
    Plastic,
    /// Geostatic stress initialization without deformation
    K0Procedure,
    /// Deformation-based gravity activation (runs the plastic path)
    GravityLoading,
    /// Groundwater-driven loading (runs the plastic path)
    Flow,
    /// Strength Reduction Method
    SafetyAnalysis,
}

/// One stage of a staged construction sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRequest {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phase_type: PhaseType,
    /// Phase this one continues from
    #[serde(default)]
    pub parent_id: Option<String>,
    /// 0-based polygon indices active in this phase
    pub active_polygon_indices: Vec<usize>,
    /// Ids of point/line loads active in this phase
    #[serde(default)]
    pub active_load_ids: Vec<String>,
    /// Restart the reported total displacement from this phase
    #[serde(default)]
    pub reset_displacements: bool,
    /// polygon index → material id, applied at phase start
    #[serde(default)]
    pub material_overrides: Option<HashMap<usize, String>>,
    #[serde(default)]
    pub active_water_level_id: Option<String>,
}

/// Numerical controls of the incremental solver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_min_desired_iterations")]
    pub min_desired_iterations: usize,
    #[serde(default = "default_max_desired_iterations")]
    pub max_desired_iterations: usize,
    #[serde(default = "default_initial_step_size")]
    pub initial_step_size: f64,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_load_fraction")]
    pub max_load_fraction: f64,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Incremental displacement above which a step counts as collapsed (m)
    #[serde(default = "default_max_displacement_limit")]
    pub max_displacement_limit: f64,
}

fn default_max_iterations() -> usize {
    60
}
fn default_min_desired_iterations() -> usize {
    3
}
fn default_max_desired_iterations() -> usize {
    15
}
fn default_initial_step_size() -> f64 {
    0.05
}
fn default_tolerance() -> f64 {
    0.01
}
fn default_max_load_fraction() -> f64 {
    0.5
}
fn default_max_steps() -> usize {
    100
}
fn default_max_displacement_limit() -> f64 {
    10.0
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            min_desired_iterations: default_min_desired_iterations(),
            max_desired_iterations: default_max_desired_iterations(),
            initial_step_size: default_initial_step_size(),
            tolerance: default_tolerance(),
            max_load_fraction: default_max_load_fraction(),
            max_steps: default_max_steps(),
            max_displacement_limit: default_max_displacement_limit(),
        }
    }
}

/// Input to [`crate::solver::solve`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverRequest {
    pub mesh: MeshResponse,
    pub phases: Vec<PhaseRequest>,
    #[serde(default)]
    pub settings: SolverSettings,
    #[serde(default)]
    pub water_level: Option<Vec<Point>>,
    #[serde(default)]
    pub water_levels: Vec<WaterLevel>,
    #[serde(default)]
    pub point_loads: Vec<PointLoad>,
    #[serde(default)]
    pub line_loads: Vec<LineLoad>,
    /// Library of all materials, used to resolve overrides
    #[serde(default)]
    pub materials: Vec<Material>,
}

impl SolverRequest {
    /// The phreatic polyline in effect for this solve: the legacy field
    /// first, then the first named water level.
    pub fn effective_water_points(&self) -> Vec<Point> {
        if let Some(points) = &self.water_level {
            if !points.is_empty() {
                return points.clone();
            }
        }
        self.water_levels
            .first()
            .map(|wl| wl.points.clone())
            .unwrap_or_default()
    }
}
