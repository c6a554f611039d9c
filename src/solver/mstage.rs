//! Incremental phase driver: M-stage load advancement with Newton–Raphson
//! equilibrium iteration
//!
//! A phase advances a load fraction ξ from 0 to 1 (plastic) or grows it
//! beyond 1 until failure (safety analysis). Each step solves equilibrium
//! with a modified Newton scheme: the tangent is the elastic (or
//! drainage-penalized) stiffness, assembled and factorized once per phase,
//! while the internal force tracks the full elastoplastic stress update.
//! Non-converged steps are retried from the step-start snapshot with a
//! halved ξ increment.

use std::collections::{HashMap, HashSet};

use nalgebra::{DMatrix, DVector};

use crate::constitutive::{derive_sigma_zz, update_stress};
use crate::error::ErrorCode;
use crate::math::{GVec, SparseCholeskySolver, SparseMatrixBuilder, Vec3};
use crate::model::{PhaseRequest, PhaseType, SolverRequest};
use crate::results::{NodeResult, PhaseResult, SolverEvent, StepPoint, StressResult};
use crate::solver::{CancelToken, ElementTable, EventSink, GaussState, StateArray};

/// Step-size floor below which a plastic phase gives up
const PLASTIC_STEP_FLOOR: f64 = 1e-4;
/// Step-size floor for safety (SRM) phases
const SAFETY_STEP_FLOOR: f64 = 1e-3;
/// Open-ended ξ ceiling of a safety phase
const SAFETY_M_STAGE_CAP: f64 = 100.0;

/// A phase's result plus whether the driver stopped because the caller
/// cancelled mid-loop. The flag lets the phase loop honor the streaming
/// contract (no `final` event after a cancellation) without overloading
/// the wire-visible result.
pub(crate) struct PhaseOutcome {
    pub result: PhaseResult,
    pub cancelled: bool,
}

/// Run one plastic / gravity-loading / flow / safety phase.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_incremental_phase(
    request: &SolverRequest,
    phase: &PhaseRequest,
    tables: &[ElementTable],
    active: &[usize],
    state: &mut StateArray,
    total_displacement: &mut GVec,
    cancel: &CancelToken,
    sink: &mut EventSink,
) -> PhaseOutcome {
    let settings = &request.settings;
    let mesh = &request.mesh;
    let num_nodes = mesh.nodes.len();
    let num_dof = num_nodes * 2;
    let is_srm = phase.phase_type == PhaseType::SafetyAnalysis;

    let fail = |error: String, step: usize, m_stage: f64, points: Vec<StepPoint>| PhaseOutcome {
        result: PhaseResult {
            phase_id: phase.id.clone(),
            success: false,
            displacements: Vec::new(),
            stresses: Vec::new(),
            reached_m_stage: m_stage,
            step_points: points,
            step_failed_at: Some(step),
            error: Some(error),
        },
        cancelled: false,
    };

    // --- Active nodes and constrained dofs ---
    let mut active_nodes: HashSet<usize> = HashSet::new();
    for &idx in active {
        active_nodes.extend(tables[idx].nodes.iter().copied());
    }

    let mut fixed_dofs: HashSet<usize> = HashSet::new();
    for bc in &mesh.boundary_conditions.full_fixed {
        fixed_dofs.insert(bc.node * 2);
        fixed_dofs.insert(bc.node * 2 + 1);
    }
    let min_x = mesh.nodes.iter().map(|n| n[0]).fold(f64::INFINITY, f64::min);
    let max_x = mesh
        .nodes
        .iter()
        .map(|n| n[0])
        .fold(f64::NEG_INFINITY, f64::max);
    for bc in &mesh.boundary_conditions.normal_fixed {
        let nx = mesh.nodes[bc.node][0];
        if (nx - min_x).abs() < 1e-3 || (nx - max_x).abs() < 1e-3 {
            fixed_dofs.insert(bc.node * 2);
        }
    }

    let mut free_dofs: Vec<usize> = Vec::new();
    let mut free_index: Vec<Option<usize>> = vec![None; num_dof];
    for dof in 0..num_dof {
        if !fixed_dofs.contains(&dof) && active_nodes.contains(&(dof / 2)) {
            free_index[dof] = Some(free_dofs.len());
            free_dofs.push(dof);
        }
    }
    if free_dofs.is_empty() {
        let msg = ErrorCode::SolverUnstableGeometry.message();
        sink.log(msg.clone());
        return fail(msg, 0, if is_srm { 1.0 } else { 0.0 }, Vec::new());
    }

    // --- Incremental external force ---
    let parent_phase = phase
        .parent_id
        .as_ref()
        .and_then(|pid| request.phases.iter().find(|p| &p.id == pid));
    let delta_f_external =
        compute_delta_external_force(request, phase, parent_phase, tables, state);

    // --- Initial internal force from the committed stress field ---
    let mut f_int_initial = GVec::zeros(num_dof);
    for &idx in active {
        let table = &tables[idx];
        accumulate_internal_force(table, &state[idx], &mut f_int_initial);
    }

    sink.log(format!(
        "Phase {} | F_int_initial norm: {:.2} kN | delta_F_external norm: {:.2} kN | \
         reset_disp: {}",
        phase.name,
        f_int_initial.norm(),
        delta_f_external.norm(),
        phase.reset_displacements
    ));

    // --- Tangent stiffness: assembled and factorized once per phase ---
    let mut builder = SparseMatrixBuilder::new(free_dofs.len());
    for &idx in active {
        let table = &tables[idx];
        let k_el = tangent_stiffness(table);
        let dof_slots: Vec<Option<usize>> = table
            .nodes
            .iter()
            .flat_map(|&n| [free_index[n * 2], free_index[n * 2 + 1]])
            .collect();
        builder.add_element_matrix(&dof_slots, k_el.as_slice(), dof_slots.len());
    }
    let mut factorization = SparseCholeskySolver::new(&builder.to_csr());
    if let Err(reason) = factorization.factorize() {
        let msg = format!("{} ({reason})", ErrorCode::SolverSingularMatrix.message());
        sink.log(msg.clone());
        return fail(msg, 0, if is_srm { 1.0 } else { 0.0 }, Vec::new());
    }

    // --- M-stage loop ---
    let step_floor = if is_srm {
        SAFETY_STEP_FLOOR
    } else {
        PLASTIC_STEP_FLOOR
    };
    let mut current_m = if is_srm {
        sink.log(format!(
            "--- Phase {}: Starting Safety Analysis (SRM) ---",
            phase.name
        ));
        1.0
    } else {
        0.0
    };
    let mut step_size = settings.initial_step_size;
    let mut step_count: usize = 0;
    let mut current_u_incremental = GVec::zeros(num_dof);

    let mut step_points = vec![StepPoint {
        m_stage: current_m,
        max_disp: 0.0,
    }];
    sink.emit(SolverEvent::StepPoint(step_points[0]));

    // Phase-local state history, committed to the global arrays on success
    let mut phase_state: StateArray = state.clone();
    let mut numerical_failure = false;
    let mut was_cancelled = false;

    sink.log(format!("Solving equilibrium for phase {}...", phase.name));

    while (!is_srm && current_m < 1.0) || (is_srm && current_m < SAFETY_M_STAGE_CAP) {
        if cancel.is_cancelled() {
            sink.log("Analysis cancelled by user during MStage loop.");
            was_cancelled = true;
            break;
        }
        if step_count > settings.max_steps {
            sink.log(format!(
                "Max steps ({}) reached. Terminating phase.",
                settings.max_steps
            ));
            break;
        }
        if step_size < step_floor {
            if is_srm {
                sink.log(format!(
                    "SRM: Step size too small ({step_size:.5}). Limit state reached."
                ));
            } else {
                sink.log(format!(
                    "Step size too small ({step_size:.5}). Terminating phase."
                ));
            }
            break;
        }

        if !is_srm && current_m + step_size > 1.0 {
            step_size = 1.0 - current_m;
        }
        let target_m = current_m + step_size;
        let srm_factor = is_srm.then_some(target_m);

        // Snapshot at the start of this step attempt
        let step_start: Vec<Vec<GaussState>> = active
            .iter()
            .map(|&idx| phase_state[idx].clone())
            .collect();

        // --- Newton–Raphson on the incremental displacement ---
        let mut step_du = GVec::zeros(num_dof);
        let mut converged = false;
        let mut iteration = 0;
        let mut trial: Vec<Vec<GaussState>> = Vec::new();

        while iteration < settings.max_iterations {
            iteration += 1;

            let mut u_candidate = &*total_displacement + &current_u_incremental;
            u_candidate += &step_du;

            let (f_int, new_trial) =
                internal_forces(tables, active, &step_start, &u_candidate, srm_factor, num_dof);
            trial = new_trial;

            let residual = &f_int_initial + &delta_f_external * target_m - f_int;
            let residual_free = gather(&residual, &free_dofs);
            let norm_r = residual_free.norm();
            let mut f_base = gather(&(&f_int_initial + &delta_f_external), &free_dofs).norm();
            if f_base < 1.0 {
                f_base = 1.0;
            }

            if !norm_r.is_finite() {
                sink.log(ErrorCode::NumNanDetected.message());
                numerical_failure = true;
                break;
            }

            if norm_r / f_base < settings.tolerance && iteration > 1 {
                converged = true;
                break;
            }

            let du_free = factorization.solve(&residual_free);
            if du_free.iter().any(|v| !v.is_finite()) {
                sink.log(ErrorCode::NumNanDetected.message());
                numerical_failure = true;
                break;
            }
            for (local, &dof) in free_dofs.iter().enumerate() {
                step_du[dof] += du_free[local];
            }
        }

        if numerical_failure {
            break;
        }

        if converged {
            let max_disp_candidate = max_displacement(&(&current_u_incremental + &step_du));
            if max_disp_candidate > settings.max_displacement_limit {
                // Collapse guard: discard the step and try a smaller one
                sink.log(format!(
                    "Phase {} | Step rejected: incremental displacement {max_disp_candidate:.3} m \
                     exceeds the limit {:.3} m.",
                    phase.name, settings.max_displacement_limit
                ));
                if step_size > step_floor {
                    step_size *= 0.5;
                    continue;
                }
                sink.log(format!(
                    "Step size too small ({step_size:.5}). Aborting phase."
                ));
                break;
            }

            step_count += 1;
            current_u_incremental += &step_du;
            current_m = target_m;

            for (slot, &idx) in active.iter().enumerate() {
                phase_state[idx] = trial[slot].clone();
            }

            let max_disp = max_displacement(&current_u_incremental);
            let label = if is_srm { "Msf" } else { "MStage" };
            sink.log(format!(
                "Phase {} | Step {step_count}: {label} {current_m:.4} | Max Incremental Disp: \
                 {max_disp:.6} m | Iterations {iteration}",
                phase.name
            ));
            let point = StepPoint {
                m_stage: current_m,
                max_disp,
            };
            step_points.push(point);
            sink.emit(SolverEvent::StepPoint(point));

            if iteration < settings.min_desired_iterations {
                step_size *= 1.2;
            } else if iteration > settings.max_desired_iterations {
                step_size *= 0.5;
            }
        } else {
            sink.log(format!(
                "Phase {} failed to converge. Reducing step size...",
                phase.name
            ));
            if step_size > step_floor {
                step_size *= 0.5;
                continue;
            }
            sink.log(format!(
                "Step size too small ({step_size:.5}). Aborting phase."
            ));
            break;
        }
    }

    // --- Phase result gathering ---
    let final_u_total = &*total_displacement + &current_u_incremental;
    let displacements = (0..num_nodes)
        .map(|i| NodeResult {
            id: i + 1,
            ux: final_u_total[i * 2],
            uy: final_u_total[i * 2 + 1],
        })
        .collect();

    let mut stresses = Vec::new();
    for &idx in active {
        let table = &tables[idx];
        for (gp_idx, gp_state) in phase_state[idx].iter().enumerate() {
            let gp = &table.matrices.quadrature[gp_idx];
            let pwp_total = gp.pwp_steady + gp_state.pwp_excess;
            stresses.push(StressResult {
                element_id: table.id,
                gp_id: gp_idx + 1,
                sig_xx: gp_state.stress[0],
                sig_yy: gp_state.stress[1],
                sig_xy: gp_state.stress[2],
                sig_zz: derive_sigma_zz(
                    &table.material,
                    gp_state.stress[0],
                    gp_state.stress[1],
                    pwp_total,
                ),
                m_stage: current_m,
                is_yielded: gp_state.yielded,
                pwp_steady: gp.pwp_steady,
                pwp_excess: gp_state.pwp_excess,
                pwp_total,
            });
        }
    }

    let success =
        !numerical_failure && ((!is_srm && current_m >= 0.999) || (is_srm && current_m > 1.0));

    if success {
        if phase.reset_displacements {
            *total_displacement = current_u_incremental;
        } else {
            *total_displacement = final_u_total;
        }
        *state = phase_state;
    }

    let error = if success {
        None
    } else if was_cancelled {
        Some("Analysis cancelled by user.".to_string())
    } else {
        Some(format!("Phase failed at step {step_count}."))
    };

    PhaseOutcome {
        result: PhaseResult {
            phase_id: phase.id.clone(),
            success,
            displacements,
            stresses,
            reached_m_stage: current_m,
            step_points,
            step_failed_at: (!success).then_some(step_count),
            error,
        },
        cancelled: was_cancelled,
    }
}

/// Element tangent used by the modified Newton scheme: the elastic
/// stiffness, volumetrically stiffened for Undrained A/B.
fn tangent_stiffness(table: &ElementTable) -> DMatrix<f64> {
    if table.penalty == 0.0 {
        return table.matrices.k.clone();
    }
    let mut d_tan = table.matrices.d;
    d_tan[(0, 0)] += table.penalty;
    d_tan[(0, 1)] += table.penalty;
    d_tan[(1, 0)] += table.penalty;
    d_tan[(1, 1)] += table.penalty;

    let n_dofs = table.matrices.num_dofs();
    let mut k = DMatrix::zeros(n_dofs, n_dofs);
    for gp in &table.matrices.quadrature {
        k += gp.b.transpose() * d_tan * &gp.b * (gp.det_j * gp.weight);
    }
    k
}

/// ΔF_external of a phase relative to its parent: gravity activation and
/// removal, excavation stress release, and the applied-load set difference.
fn compute_delta_external_force(
    request: &SolverRequest,
    phase: &PhaseRequest,
    parent_phase: Option<&PhaseRequest>,
    tables: &[ElementTable],
    state: &StateArray,
) -> GVec {
    let num_dof = request.mesh.nodes.len() * 2;
    let mut delta_f = GVec::zeros(num_dof);

    let parent_active: HashSet<usize> = parent_phase
        .map(|p| p.active_polygon_indices.iter().copied().collect())
        .unwrap_or_default();
    let current_active: HashSet<usize> = phase.active_polygon_indices.iter().copied().collect();

    // Gravity changes
    for table in tables {
        let now = current_active.contains(&table.polygon_id);
        let before = parent_active.contains(&table.polygon_id);
        if now == before {
            continue;
        }
        let sign = if now { 1.0 } else { -1.0 };
        for (local, &node) in table.nodes.iter().enumerate() {
            delta_f[node * 2] += sign * table.matrices.f_gravity[local * 2];
            delta_f[node * 2 + 1] += sign * table.matrices.f_gravity[local * 2 + 1];
        }
    }

    // Excavation stress release: a removed region stops supporting its
    // neighbours, so its internal force is applied as an external action.
    for (idx, table) in tables.iter().enumerate() {
        if parent_active.contains(&table.polygon_id)
            && !current_active.contains(&table.polygon_id)
        {
            accumulate_internal_force(table, &state[idx], &mut delta_f);
        }
    }

    // Load set difference
    let mut current_loads = GVec::zeros(num_dof);
    let mut parent_loads = GVec::zeros(num_dof);
    apply_loads(request, &phase.active_load_ids, &mut current_loads);
    if let Some(parent) = parent_phase {
        apply_loads(request, &parent.active_load_ids, &mut parent_loads);
    }
    delta_f += current_loads - parent_loads;

    delta_f
}

/// Scatter the resolved point and line loads of `active_ids` into `target`.
fn apply_loads(request: &SolverRequest, active_ids: &[String], target: &mut GVec) {
    let mesh = &request.mesh;
    let point_loads: HashMap<&str, _> = request
        .point_loads
        .iter()
        .map(|pl| (pl.id.as_str(), pl))
        .collect();
    let line_loads: HashMap<&str, _> = request
        .line_loads
        .iter()
        .map(|ll| (ll.id.as_str(), ll))
        .collect();

    for id in active_ids {
        if let Some(pl) = point_loads.get(id.as_str()) {
            if let Some(assignment) = mesh
                .point_load_assignments
                .iter()
                .find(|a| &a.point_load_id == id)
            {
                let node = assignment.assigned_node_id - 1;
                target[node * 2] += pl.fx;
                target[node * 2 + 1] += pl.fy;
            }
        }

        if let Some(ll) = line_loads.get(id.as_str()) {
            for assignment in mesh
                .line_load_assignments
                .iter()
                .filter(|a| &a.line_load_id == id)
            {
                let edge = &assignment.edge_nodes;
                if edge.len() < 2 {
                    continue;
                }
                let n1 = edge[0] - 1;
                let n2 = edge[1] - 1;
                let p1 = mesh.nodes[n1];
                let p2 = mesh.nodes[n2];
                let length = ((p2[0] - p1[0]).powi(2) + (p2[1] - p1[1]).powi(2)).sqrt();
                let total = [ll.fx * length, ll.fy * length];

                if edge.len() == 3 {
                    // Parabolic distribution on a quadratic edge
                    let mid = edge[2] - 1;
                    for (node, factor) in [(n1, 1.0 / 6.0), (n2, 1.0 / 6.0), (mid, 2.0 / 3.0)] {
                        target[node * 2] += total[0] * factor;
                        target[node * 2 + 1] += total[1] * factor;
                    }
                } else {
                    // Tributary halves on a linear edge
                    for node in [n1, n2] {
                        target[node * 2] += total[0] / 2.0;
                        target[node * 2 + 1] += total[1] / 2.0;
                    }
                }
            }
        }
    }
}

/// ∫ Bᵀσ dV of one element, scattered into the global vector
fn accumulate_internal_force(table: &ElementTable, gp_states: &[GaussState], out: &mut GVec) {
    let n_dofs = table.matrices.num_dofs();
    let mut f_el = DVector::zeros(n_dofs);
    for (gp, gp_state) in table.matrices.quadrature.iter().zip(gp_states) {
        f_el += gp.b.transpose() * gp_state.stress * (gp.det_j * gp.weight);
    }
    for (local, &node) in table.nodes.iter().enumerate() {
        out[node * 2] += f_el[local * 2];
        out[node * 2 + 1] += f_el[local * 2 + 1];
    }
}

/// Evaluate internal forces and trial Gauss states for a displacement
/// candidate, running the drainage-aware constitutive update per point.
fn internal_forces(
    tables: &[ElementTable],
    active: &[usize],
    step_start: &[Vec<GaussState>],
    u_candidate: &GVec,
    srm_factor: Option<f64>,
    num_dof: usize,
) -> (GVec, Vec<Vec<GaussState>>) {
    let mut f_int = GVec::zeros(num_dof);
    let mut trial: Vec<Vec<GaussState>> = Vec::with_capacity(active.len());

    for (slot, &idx) in active.iter().enumerate() {
        let table = &tables[idx];
        let n_nodes = table.nodes.len();

        let mut u_el = DVector::zeros(n_nodes * 2);
        for (local, &node) in table.nodes.iter().enumerate() {
            u_el[local * 2] = u_candidate[node * 2];
            u_el[local * 2 + 1] = u_candidate[node * 2 + 1];
        }

        let mut f_el = DVector::zeros(n_nodes * 2);
        let mut gp_trials = Vec::with_capacity(table.matrices.quadrature.len());

        for (gp_idx, gp) in table.matrices.quadrature.iter().enumerate() {
            let start = &step_start[slot][gp_idx];

            let eps_total_dyn = &gp.b * &u_el;
            let eps_total = Vec3::new(eps_total_dyn[0], eps_total_dyn[1], eps_total_dyn[2]);
            let d_eps = eps_total - start.strain;

            let update = update_stress(
                &table.material,
                &table.matrices.d,
                table.penalty,
                &start.stress,
                start.pwp_excess,
                gp.pwp_steady,
                &d_eps,
                srm_factor,
            );

            f_el += gp.b.transpose() * update.stress * (gp.det_j * gp.weight);

            gp_trials.push(GaussState {
                stress: update.stress,
                strain: eps_total,
                pwp_excess: update.pwp_excess,
                yielded: update.yielded,
            });
        }

        for (local, &node) in table.nodes.iter().enumerate() {
            f_int[node * 2] += f_el[local * 2];
            f_int[node * 2 + 1] += f_el[local * 2 + 1];
        }
        trial.push(gp_trials);
    }

    (f_int, trial)
}

fn gather(vector: &GVec, dofs: &[usize]) -> DVector<f64> {
    DVector::from_iterator(dofs.len(), dofs.iter().map(|&d| vector[d]))
}

/// Largest per-node displacement magnitude
fn max_displacement(u: &GVec) -> f64 {
    let mut max = 0.0f64;
    for i in 0..u.len() / 2 {
        let mag = (u[i * 2].powi(2) + u[i * 2 + 1].powi(2)).sqrt();
        max = max.max(mag);
    }
    max
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_max_displacement() {
        let u = GVec::from_vec(vec![3.0, 4.0, 0.0, 1.0]);
        assert_relative_eq!(max_displacement(&u), 5.0);
    }

    #[test]
    fn test_gather_picks_dofs() {
        let v = GVec::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        let picked = gather(&v, &[0, 3]);
        assert_eq!(picked.len(), 2);
        assert_relative_eq!(picked[0], 1.0);
        assert_relative_eq!(picked[1], 4.0);
    }
}
