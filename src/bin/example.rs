//! Demo: mesh and solve a two-layer staged excavation, streaming the
//! solver events as newline-delimited JSON to stdout.
//!
//! Run with: cargo run --bin geo-example

use anyhow::{bail, Result};
use geo_solver::prelude::*;

fn sand() -> Material {
    serde_json::from_value(serde_json::json!({
        "id": "sand",
        "name": "Dense Sand",
        "color": "#d2b48c",
        "youngsModulus": 60000.0,
        "effyoungsModulus": 50000.0,
        "poissonsRatio": 0.3,
        "unitWeightUnsaturated": 18.0,
        "unitWeightSaturated": 20.0,
        "cohesion": 5.0,
        "frictionAngle": 32.0,
        "material_model": "mohr_coulomb",
        "drainage_type": "drained"
    }))
    .expect("valid material json")
}

fn soft_clay() -> Material {
    serde_json::from_value(serde_json::json!({
        "id": "clay",
        "name": "Soft Clay",
        "color": "#8b7765",
        "youngsModulus": 12000.0,
        "effyoungsModulus": 10000.0,
        "poissonsRatio": 0.35,
        "unitWeightUnsaturated": 16.0,
        "unitWeightSaturated": 18.0,
        "cohesion": 3.0,
        "frictionAngle": 22.0,
        "undrainedShearStrength": 40.0,
        "material_model": "mohr_coulomb",
        "drainage_type": "drained"
    }))
    .expect("valid material json")
}

fn main() -> Result<()> {
    env_logger::init();

    // Two stacked layers: clay over sand, 20 m wide
    let mesh_request = MeshRequest {
        polygons: vec![
            PolygonData {
                vertices: vec![
                    Point::new(0.0, 0.0),
                    Point::new(20.0, 0.0),
                    Point::new(20.0, 6.0),
                    Point::new(0.0, 6.0),
                ],
                mesh_size: None,
                boundary_refinement_factor: None,
                material_id: "sand".to_string(),
            },
            PolygonData {
                vertices: vec![
                    Point::new(0.0, 6.0),
                    Point::new(20.0, 6.0),
                    Point::new(20.0, 9.0),
                    Point::new(0.0, 9.0),
                ],
                mesh_size: None,
                boundary_refinement_factor: None,
                material_id: "clay".to_string(),
            },
        ],
        materials: vec![sand(), soft_clay()],
        point_loads: vec![],
        line_loads: vec![],
        mesh_settings: MeshSettings {
            mesh_size: 2.0,
            boundary_refinement_factor: 1.0,
        },
        water_level: Some(vec![Point::new(0.0, 4.0), Point::new(20.0, 4.0)]),
        water_levels: vec![],
    };

    let mesh = generate_mesh(&mesh_request);
    if !mesh.success {
        bail!("mesh generation failed: {:?}", mesh.error);
    }
    eprintln!(
        "mesh: {} nodes, {} elements",
        mesh.nodes.len(),
        mesh.elements.len()
    );

    // Phase 1: geostatic initialization of both layers.
    // Phase 2: excavate the clay layer.
    let phases = vec![
        PhaseRequest {
            id: "initial".to_string(),
            name: "Initial stresses".to_string(),
            phase_type: PhaseType::K0Procedure,
            parent_id: None,
            active_polygon_indices: vec![0, 1],
            active_load_ids: vec![],
            reset_displacements: false,
            material_overrides: None,
            active_water_level_id: None,
        },
        PhaseRequest {
            id: "excavate".to_string(),
            name: "Excavate top layer".to_string(),
            phase_type: PhaseType::Plastic,
            parent_id: Some("initial".to_string()),
            active_polygon_indices: vec![0],
            active_load_ids: vec![],
            reset_displacements: true,
            material_overrides: None,
            active_water_level_id: None,
        },
    ];

    let request = SolverRequest {
        mesh,
        phases,
        settings: SolverSettings::default(),
        water_level: Some(vec![Point::new(0.0, 4.0), Point::new(20.0, 4.0)]),
        water_levels: vec![],
        point_loads: vec![],
        line_loads: vec![],
        materials: vec![sand(), soft_clay()],
    };

    let cancel = CancelToken::new();
    let summary = solve(&request, &cancel, |event| {
        // NDJSON framing, one event per line
        if let Ok(line) = serde_json::to_string(&event) {
            println!("{line}");
        }
    });

    if !summary.success {
        bail!("analysis failed; see the event log");
    }
    for phase in &summary.phases {
        eprintln!(
            "phase {}: reached m_stage {:.3} with {} stress records",
            phase.phase_id,
            phase.reached_m_stage,
            phase.stresses.len()
        );
    }
    Ok(())
}
