//! The 3-node compatibility element must run through the whole pipeline:
//! hand-built T3 meshes, gravity plus a point load, and the K0 procedure.

mod common;

use common::*;
use geo_solver::prelude::*;

fn elastic() -> Material {
    serde_json::from_value(serde_json::json!({
        "id": "fill",
        "name": "Fill",
        "color": "#999999",
        "youngsModulus": 60000.0,
        "effyoungsModulus": 50000.0,
        "poissonsRatio": 0.3,
        "unitWeightUnsaturated": 18.0,
        "k0_x": 0.5,
        "material_model": "linear_elastic",
        "drainage_type": "drained"
    }))
    .unwrap()
}

/// A unit square split into two constant-strain triangles
fn square_t3_mesh(material: &Material) -> MeshResponse {
    serde_json::from_value(serde_json::json!({
        "success": true,
        "nodes": [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
        "elements": [[0, 1, 2], [0, 2, 3]],
        "boundary_conditions": {
            "full_fixed": [{"node": 0}, {"node": 1}],
            "normal_fixed": [{"node": 2}, {"node": 3}]
        },
        "point_load_assignments": [
            {"point_load_id": "crown", "assigned_node_id": 4}
        ],
        "line_load_assignments": [],
        "element_materials": [
            {"element_id": 1, "material": material, "polygon_id": 0},
            {"element_id": 2, "material": material, "polygon_id": 0}
        ]
    }))
    .unwrap()
}

#[test]
fn t3_gravity_and_point_load_solve() {
    let material = elastic();
    let mesh = square_t3_mesh(&material);

    let mut phase = plastic_phase("loading", None, &[0]);
    phase.active_load_ids.push("crown".to_string());

    let mut request = solver_request(mesh, vec![phase]);
    request.point_loads.push(PointLoad {
        id: "crown".to_string(),
        x: 0.0,
        y: 1.0,
        fx: 0.0,
        fy: -10.0,
    });

    let (summary, _) = run(&request);
    assert!(summary.success, "log: {:?}", summary.log);

    let phase = &summary.phases[0];
    // One centroid quadrature point per T3 element
    assert_eq!(phase.stresses.len(), 2);
    for stress in &phase.stresses {
        assert_eq!(stress.gp_id, 1);
        assert!(
            stress.sig_yy < 0.0,
            "self-weight plus the crown load compress the square, got {}",
            stress.sig_yy
        );
    }

    // The loaded corner settles
    let crown = phase.displacements.iter().find(|d| d.id == 4).unwrap();
    assert!(crown.uy < 0.0, "crown uy {}", crown.uy);
}

#[test]
fn t3_k0_initialization() {
    let material = elastic();
    let mesh = square_t3_mesh(&material);
    let request = solver_request(mesh.clone(), vec![k0_phase("initial", &[0])]);

    let (summary, _) = run(&request);
    assert!(summary.success, "log: {:?}", summary.log);

    let phase = &summary.phases[0];
    assert_eq!(phase.stresses.len(), 2);
    for stress in &phase.stresses {
        let (_, cy) = gauss_point_position(&mesh, stress.element_id, stress.gp_id);
        let expected_v = -18.0 * (1.0 - cy);
        assert!(
            (stress.sig_yy - expected_v).abs() < 0.02 * expected_v.abs().max(0.5),
            "sig_yy {} vs {}",
            stress.sig_yy,
            expected_v
        );
        let ratio = stress.sig_xx / stress.sig_yy;
        assert!((ratio - 0.5).abs() < 0.01, "K0 ratio {ratio}");
    }
    for d in &phase.displacements {
        assert_eq!((d.ux, d.uy), (0.0, 0.0));
    }
}
