//! Benchmarks for mesh generation and a representative staged solve

use criterion::{criterion_group, criterion_main, Criterion};
use geo_solver::prelude::*;

fn sand() -> Material {
    serde_json::from_value(serde_json::json!({
        "id": "sand",
        "name": "Sand",
        "color": "#c2a060",
        "youngsModulus": 60000.0,
        "effyoungsModulus": 50000.0,
        "poissonsRatio": 0.3,
        "unitWeightUnsaturated": 18.0,
        "unitWeightSaturated": 20.0,
        "cohesion": 5.0,
        "frictionAngle": 30.0,
        "material_model": "mohr_coulomb",
        "drainage_type": "drained"
    }))
    .unwrap()
}

fn mesh_request(mesh_size: f64) -> MeshRequest {
    MeshRequest {
        polygons: vec![PolygonData {
            vertices: vec![
                Point::new(0.0, 0.0),
                Point::new(20.0, 0.0),
                Point::new(20.0, 8.0),
                Point::new(0.0, 8.0),
            ],
            mesh_size: None,
            boundary_refinement_factor: None,
            material_id: "sand".to_string(),
        }],
        materials: vec![sand()],
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

fn bench_mesh_generation(c: &mut Criterion) {
    let request = mesh_request(1.0);
    c.bench_function("generate_mesh 20x8 m", |b| {
        b.iter(|| {
            let response = generate_mesh(&request);
            assert!(response.success);
            response
        })
    });
}

fn bench_gravity_solve(c: &mut Criterion) {
    let mesh = generate_mesh(&mesh_request(1.5));
    assert!(mesh.success);

    let request = SolverRequest {
        mesh,
        phases: vec![PhaseRequest {
            id: "gravity".to_string(),
            name: "gravity".to_string(),
            phase_type: PhaseType::Plastic,
            parent_id: None,
            active_polygon_indices: vec![0],
            active_load_ids: Vec::new(),
            reset_displacements: false,
            material_overrides: None,
            active_water_level_id: None,
        }],
        settings: SolverSettings::default(),
        water_level: None,
        water_levels: Vec::new(),
        point_loads: Vec::new(),
        line_loads: Vec::new(),
        materials: Vec::new(),
    };

    c.bench_function("gravity solve 20x8 m", |b| {
        b.iter(|| {
            let cancel = CancelToken::new();
            let summary = solve(&request, &cancel, |_| {});
            assert!(summary.success);
            summary
        })
    });
}

criterion_group!(benches, bench_mesh_generation, bench_gravity_solve);
criterion_main!(benches);
