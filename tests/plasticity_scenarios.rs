//! Elastoplastic scenarios: partial yielding under a concentrated load and
//! strength-reduction safety analysis.

mod common;

use common::*;
use geo_solver::prelude::*;

fn weak_soil() -> Material {
    serde_json::from_value(serde_json::json!({
        "id": "weak",
        "name": "Weak Soil",
        "color": "#b09070",
        "youngsModulus": 12000.0,
        "effyoungsModulus": 10000.0,
        "poissonsRatio": 0.3,
        "unitWeightUnsaturated": 18.0,
        "unitWeightSaturated": 20.0,
        "cohesion": 5.0,
        "frictionAngle": 20.0,
        "material_model": "mohr_coulomb",
        "drainage_type": "drained"
    }))
    .unwrap()
}

fn loaded_request(load_fy: f64) -> (MeshResponse, SolverRequest) {
    let mut mesh_request = rectangle_mesh_request(10.0, 5.0, 2.0, weak_soil());
    mesh_request.point_loads.push(PointLoad {
        id: "crest".to_string(),
        x: 5.0,
        y: 5.0,
        fx: 0.0,
        fy: load_fy,
    });
    let mesh = generate_mesh(&mesh_request);
    assert!(mesh.success, "mesh error: {:?}", mesh.error);

    let mut phase = plastic_phase("loading", None, &[0]);
    phase.active_load_ids.push("crest".to_string());

    let mut request = solver_request(mesh.clone(), vec![phase]);
    request.point_loads.push(PointLoad {
        id: "crest".to_string(),
        x: 5.0,
        y: 5.0,
        fx: 0.0,
        fy: load_fy,
    });
    (mesh, request)
}

#[test]
fn weak_soil_partially_yields_under_point_load() {
    let (_mesh, request) = loaded_request(-200.0);
    let (summary, _) = run(&request);
    assert!(summary.success, "log: {:?}", summary.log);

    let phase = &summary.phases[0];
    assert!(
        (phase.reached_m_stage - 1.0).abs() < 1e-9,
        "reached {}",
        phase.reached_m_stage
    );

    // Some, but not most, of the mesh goes plastic
    let mut yielded_elements = std::collections::HashSet::new();
    let mut all_elements = std::collections::HashSet::new();
    for stress in &phase.stresses {
        all_elements.insert(stress.element_id);
        if stress.is_yielded {
            yielded_elements.insert(stress.element_id);
        }
    }
    assert!(
        !yielded_elements.is_empty(),
        "expected at least one yielded Gauss point"
    );
    let fraction = yielded_elements.len() as f64 / all_elements.len() as f64;
    assert!(
        fraction > 0.02 && fraction < 0.55,
        "yielded element fraction {fraction}"
    );

    // Displacements stay bounded well below collapse
    let max_disp = phase
        .step_points
        .last()
        .map(|p| p.max_disp)
        .unwrap_or_default();
    assert!(max_disp < 0.1, "max displacement {max_disp}");

    // Yield concentrates under the load: the closest yielded point sits in
    // the upper half of the model
    let top_half_yield = phase
        .stresses
        .iter()
        .filter(|s| s.is_yielded)
        .any(|s| gauss_point_position(&request.mesh, s.element_id, s.gp_id).1 > 2.5);
    assert!(top_half_yield, "yield zone should reach the loaded surface");
}

#[test]
fn safety_analysis_reduces_strength_beyond_unity() {
    let (_mesh, mut request) = loaded_request(-100.0);

    let mut safety = plastic_phase("safety", Some("loading"), &[0]);
    safety.phase_type = PhaseType::SafetyAnalysis;
    safety.active_load_ids.push("crest".to_string());
    request.phases.push(safety);

    let (summary, events) = run(&request);

    // The loading phase must succeed and the safety phase must push the
    // strength-reduction factor past 1.0 before finding the limit state.
    assert!(summary.phases[0].success, "log: {:?}", summary.log);
    let safety_result = &summary.phases[1];
    assert!(
        safety_result.reached_m_stage > 1.0,
        "FoS {} not beyond unity",
        safety_result.reached_m_stage
    );

    // A safety phase that reached its limit logged the cutback floor
    if !safety_result.success {
        assert!(summary
            .log
            .iter()
            .any(|l| l.contains("Step size too small") || l.contains("Limit state")));
    }

    // Step points of the safety phase start at ξ = 1
    let safety_points = &safety_result.step_points;
    assert!((safety_points.first().unwrap().m_stage - 1.0).abs() < 1e-9);
    assert!(events
        .iter()
        .any(|e| matches!(e, SolverEvent::Log(msg) if msg.contains("Safety Analysis"))));
}

#[test]
fn material_override_resets_on_next_phase() {
    let stiff: Material = serde_json::from_value(serde_json::json!({
        "id": "stiff",
        "name": "Stiff Fill",
        "color": "#888888",
        "youngsModulus": 200000.0,
        "effyoungsModulus": 200000.0,
        "poissonsRatio": 0.25,
        "unitWeightUnsaturated": 22.0,
        "material_model": "linear_elastic",
        "drainage_type": "drained"
    }))
    .unwrap();

    let material = soil("sand");
    let mesh = generate_mesh(&rectangle_mesh_request(10.0, 5.0, 2.0, material));

    let mut p1 = plastic_phase("override-phase", None, &[0]);
    p1.material_overrides = Some([(0usize, "stiff".to_string())].into_iter().collect());
    let p2 = plastic_phase("clean-phase", Some("override-phase"), &[0]);

    let mut request = solver_request(mesh, vec![p1, p2]);
    request.materials = vec![soil("sand"), stiff];

    let (summary, _) = run(&request);
    assert!(summary.success, "log: {:?}", summary.log);

    // The override is announced, and the follow-up phase restores baseline
    assert!(summary
        .log
        .iter()
        .any(|l| l.contains("Overriding material for Polygon 0")));
    assert!(summary
        .log
        .iter()
        .any(|l| l.contains("elements to original material")));
}

#[test]
fn undrained_a_gravity_builds_excess_pore_pressure() {
    let undrained: Material = serde_json::from_value(serde_json::json!({
        "id": "ua",
        "name": "Undrained Clay",
        "color": "#907050",
        "youngsModulus": 12000.0,
        "effyoungsModulus": 10000.0,
        "poissonsRatio": 0.3,
        "unitWeightUnsaturated": 16.0,
        "unitWeightSaturated": 18.0,
        "cohesion": 10.0,
        "frictionAngle": 20.0,
        "material_model": "linear_elastic",
        "drainage_type": "undrained_a"
    }))
    .unwrap();

    let mut mesh_request = rectangle_mesh_request(10.0, 5.0, 2.0, undrained);
    let table = vec![Point::new(0.0, 5.0), Point::new(10.0, 5.0)];
    mesh_request.water_level = Some(table.clone());
    let mesh = generate_mesh(&mesh_request);
    assert!(mesh.success);

    let mut request = solver_request(mesh.clone(), vec![plastic_phase("gravity", None, &[0])]);
    request.water_level = Some(table);

    let (summary, _) = run(&request);
    assert!(summary.success, "log: {:?}", summary.log);

    // Gravity compresses the skeleton, so the volumetric penalty produces
    // compressive (negative) excess pressure growing with depth
    let phase = &summary.phases[0];
    let deep = nearest_stress(&mesh, &phase.stresses, 5.0, 0.5);
    let shallow = nearest_stress(&mesh, &phase.stresses, 5.0, 4.5);
    assert!(deep.pwp_excess < 0.0, "deep excess {}", deep.pwp_excess);
    assert!(
        deep.pwp_excess < shallow.pwp_excess,
        "excess must grow with depth: {} vs {}",
        deep.pwp_excess,
        shallow.pwp_excess
    );
    for stress in &phase.stresses {
        assert!(
            (stress.pwp_total - (stress.pwp_steady + stress.pwp_excess)).abs() < 1e-9
        );
    }
}
