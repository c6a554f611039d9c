//! Gravity switch-on of a single-material column: the vertical stress at
//! every Gauss point must match the overburden −γ·(H − y), and the event
//! stream must follow the log → step points → phase result → final order.

mod common;

use common::*;
use geo_solver::prelude::*;

#[test]
fn gravity_column_matches_overburden() {
    let material = soil("sand");
    let mesh = generate_mesh(&rectangle_mesh_request(10.0, 5.0, 2.0, material));
    assert!(mesh.success, "mesh error: {:?}", mesh.error);

    let request = solver_request(mesh.clone(), vec![plastic_phase("gravity", None, &[0])]);
    let (summary, _) = run(&request);
    assert!(summary.success, "log: {:?}", summary.log);

    let phase = &summary.phases[0];
    assert!((phase.reached_m_stage - 1.0).abs() < 1e-9);

    // Every Gauss point carries the overburden of the soil above it
    for stress in &phase.stresses {
        let (_, gy) = gauss_point_position(&mesh, stress.element_id, stress.gp_id);
        let expected = -18.0 * (5.0 - gy);
        assert!(
            (stress.sig_yy - expected).abs() <= 0.01 * expected.abs().max(1.0),
            "sig_yy {} vs overburden {} at y = {:.3}",
            stress.sig_yy,
            expected,
            gy
        );
        assert!(!stress.is_yielded);
        // Dry model: no pore pressures anywhere
        assert_eq!(stress.pwp_total, 0.0);
    }

    // The bottom-centre point approaches the full -90 kPa
    let bottom = nearest_stress(&mesh, &phase.stresses, 5.0, 0.0);
    assert!(
        bottom.sig_yy < -75.0,
        "bottom stress too small: {}",
        bottom.sig_yy
    );

    // Settlement: the column top moves down
    let top_node = mesh
        .nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| (n[1] - 5.0).abs() < 1e-6)
        .min_by(|(_, a), (_, b)| {
            (a[0] - 5.0).abs().partial_cmp(&(b[0] - 5.0).abs()).unwrap()
        })
        .map(|(i, _)| i)
        .unwrap();
    let top_disp = phase
        .displacements
        .iter()
        .find(|d| d.id == top_node + 1)
        .unwrap();
    assert!(top_disp.uy < 0.0, "top of column must settle, got {}", top_disp.uy);

    // Base nodes stay put
    for bc in &mesh.boundary_conditions.full_fixed {
        let d = phase.displacements.iter().find(|d| d.id == bc.node + 1).unwrap();
        assert_eq!(d.ux, 0.0);
        assert_eq!(d.uy, 0.0);
    }
}

#[test]
fn event_stream_is_ordered() {
    let material = soil("sand");
    let mesh = generate_mesh(&rectangle_mesh_request(10.0, 5.0, 2.0, material));
    let request = solver_request(mesh, vec![plastic_phase("gravity", None, &[0])]);
    let (_, events) = run(&request);

    assert!(matches!(events.first(), Some(SolverEvent::Log(_))));
    assert!(matches!(events.last(), Some(SolverEvent::Final(_))));

    // The load fraction never decreases along the stream
    let mut last_m = -1.0;
    let mut saw_phase_result = false;
    for event in &events {
        match event {
            SolverEvent::StepPoint(p) => {
                assert!(!saw_phase_result, "step points precede the phase result");
                assert!(p.m_stage >= last_m);
                last_m = p.m_stage;
            }
            SolverEvent::PhaseResult(_) => saw_phase_result = true,
            _ => {}
        }
    }
    assert!(saw_phase_result);
    assert!((last_m - 1.0).abs() < 1e-9);
}

#[test]
fn mid_phase_cancellation_stops_without_final_event() {
    let material = soil("sand");
    let mesh = generate_mesh(&rectangle_mesh_request(10.0, 5.0, 2.0, material));
    let request = solver_request(mesh, vec![plastic_phase("gravity", None, &[0])]);

    // Cancel from inside the event stream, after the first committed step:
    // the solver must notice at the next step boundary.
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let mut events = Vec::new();
    let summary = solve(&request, &cancel, |e| {
        if matches!(&e, SolverEvent::StepPoint(p) if p.m_stage > 0.0) {
            trigger.cancel();
        }
        events.push(e);
    });

    assert!(!summary.success);
    assert!(
        !events.iter().any(|e| matches!(e, SolverEvent::Final(_))),
        "a solve cancelled mid-phase must not emit a final event"
    );
    assert!(events
        .iter()
        .any(|e| matches!(e, SolverEvent::Log(msg) if msg.contains("cancelled"))));
    // The interrupted phase still reports its partial result
    assert!(events
        .iter()
        .any(|e| matches!(e, SolverEvent::PhaseResult(r) if !r.success)));
}

#[test]
fn cancelled_solve_emits_no_final_event() {
    let material = soil("sand");
    let mesh = generate_mesh(&rectangle_mesh_request(10.0, 5.0, 2.0, material));
    let request = solver_request(mesh, vec![plastic_phase("gravity", None, &[0])]);

    let cancel = CancelToken::new();
    cancel.cancel();
    let mut events = Vec::new();
    let summary = solve(&request, &cancel, |e| events.push(e));

    assert!(!summary.success);
    assert!(!events.iter().any(|e| matches!(e, SolverEvent::Final(_))));
    assert!(events
        .iter()
        .any(|e| matches!(e, SolverEvent::Log(msg) if msg.contains("cancelled"))));
}
