//! Shared builders for the integration scenarios
#![allow(dead_code)]

use geo_solver::prelude::*;

/// A drained soil material with sensible defaults for testing
pub fn soil(id: &str) -> Material {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "name": id,
        "color": "#c2a060",
        "youngsModulus": 60000.0,
        "effyoungsModulus": 50000.0,
        "poissonsRatio": 0.3,
        "unitWeightUnsaturated": 18.0,
        "unitWeightSaturated": 20.0,
        "cohesion": 5.0,
        "frictionAngle": 30.0,
        "material_model": "linear_elastic",
        "drainage_type": "drained"
    }))
    .expect("valid material json")
}

/// A rectangular single-region mesh request
pub fn rectangle_mesh_request(
    width: f64,
    height: f64,
    mesh_size: f64,
    material: Material,
) -> MeshRequest {
    MeshRequest {
        polygons: vec![PolygonData {
            vertices: vec![
                Point::new(0.0, 0.0),
                Point::new(width, 0.0),
                Point::new(width, height),
                Point::new(0.0, height),
            ],
            mesh_size: None,
            boundary_refinement_factor: None,
            material_id: material.id.clone(),
        }],
        materials: vec![material],
        point_loads: Vec::new(),
        line_loads: Vec::new(),
        mesh_settings: MeshSettings {
            mesh_size,
            boundary_refinement_factor: 1.0,
        },
        water_level: None,
        water_levels: Vec::new(),
    }
}

/// A two-layer stacked mesh request (polygon 0 below, polygon 1 on top)
pub fn two_layer_mesh_request(
    width: f64,
    split_y: f64,
    top_y: f64,
    lower: Material,
    upper: Material,
) -> MeshRequest {
    MeshRequest {
        polygons: vec![
            PolygonData {
                vertices: vec![
                    Point::new(0.0, 0.0),
                    Point::new(width, 0.0),
                    Point::new(width, split_y),
                    Point::new(0.0, split_y),
                ],
                mesh_size: None,
                boundary_refinement_factor: None,
                material_id: lower.id.clone(),
            },
            PolygonData {
                vertices: vec![
                    Point::new(0.0, split_y),
                    Point::new(width, split_y),
                    Point::new(width, top_y),
                    Point::new(0.0, top_y),
                ],
                mesh_size: None,
                boundary_refinement_factor: None,
                material_id: upper.id.clone(),
            },
        ],
        materials: vec![lower, upper],
        point_loads: Vec::new(),
        line_loads: Vec::new(),
        mesh_settings: MeshSettings {
            mesh_size: 2.0,
            boundary_refinement_factor: 1.0,
        },
        water_level: None,
        water_levels: Vec::new(),
    }
}

/// A plastic phase activating the given polygons
pub fn plastic_phase(id: &str, parent: Option<&str>, polygons: &[usize]) -> PhaseRequest {
    PhaseRequest {
        id: id.to_string(),
        name: id.to_string(),
        phase_type: PhaseType::Plastic,
        parent_id: parent.map(|p| p.to_string()),
        active_polygon_indices: polygons.to_vec(),
        active_load_ids: Vec::new(),
        reset_displacements: false,
        material_overrides: None,
        active_water_level_id: None,
    }
}

pub fn k0_phase(id: &str, polygons: &[usize]) -> PhaseRequest {
    PhaseRequest {
        phase_type: PhaseType::K0Procedure,
        ..plastic_phase(id, None, polygons)
    }
}

/// Run a solve collecting all streamed events
pub fn run(request: &SolverRequest) -> (SolverSummary, Vec<SolverEvent>) {
    let mut events = Vec::new();
    let cancel = CancelToken::new();
    let summary = solve(request, &cancel, |event| events.push(event));
    (summary, events)
}

/// Wrap a mesh into a solver request with no loads
pub fn solver_request(mesh: MeshResponse, phases: Vec<PhaseRequest>) -> SolverRequest {
    SolverRequest {
        mesh,
        phases,
        settings: SolverSettings::default(),
        water_level: None,
        water_levels: Vec::new(),
        point_loads: Vec::new(),
        line_loads: Vec::new(),
        materials: Vec::new(),
    }
}

/// Locate the element-table Gauss point record nearest to (x, y)
pub fn nearest_stress<'a>(
    mesh: &MeshResponse,
    stresses: &'a [StressResult],
    x: f64,
    y: f64,
) -> &'a StressResult {
    // Gauss point coordinates are recomputed from the element geometry
    let mut best: Option<(&StressResult, f64)> = None;
    for s in stresses {
        let (gx, gy) = gauss_point_position(mesh, s.element_id, s.gp_id);
        let dist = (gx - x).powi(2) + (gy - y).powi(2);
        if best.map_or(true, |(_, d)| dist < d) {
            best = Some((s, dist));
        }
    }
    best.expect("no stress records").0
}

/// Physical position of a Gauss point, reconstructed from the connectivity
pub fn gauss_point_position(mesh: &MeshResponse, element_id: usize, gp_id: usize) -> (f64, f64) {
    let element = &mesh.elements[element_id - 1];
    let corners: Vec<[f64; 2]> = element[..3].iter().map(|&n| mesh.nodes[n]).collect();
    if element.len() == 3 {
        return (
            (corners[0][0] + corners[1][0] + corners[2][0]) / 3.0,
            (corners[0][1] + corners[1][1] + corners[2][1]) / 3.0,
        );
    }
    // Barycentric Gauss locations of the T6 rule, matching the kernel order
    let bary = [
        [1.0 / 6.0, 1.0 / 6.0, 2.0 / 3.0],
        [1.0 / 6.0, 2.0 / 3.0, 1.0 / 6.0],
        [2.0 / 3.0, 1.0 / 6.0, 1.0 / 6.0],
    ][gp_id - 1];
    let x = bary[0] * corners[0][0] + bary[1] * corners[1][0] + bary[2] * corners[2][0];
    let y = bary[0] * corners[0][1] + bary[1] * corners[1][1] + bary[2] * corners[2][1];
    (x, y)
}
