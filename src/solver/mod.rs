//! Staged phase solver
//!
//! Processes the phase sequence of a [`SolverRequest`]: K0 geostatic
//! initialization, incremental plastic phases and strength-reduction safety
//! phases. Progress is streamed through [`SolverEvent`]s; the caller may
//! cancel cooperatively between steps via a [`CancelToken`].

pub mod k0;
pub mod mstage;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use nalgebra::DVector;

use crate::constitutive::derive_sigma_zz;
use crate::elements::{compute_element_matrices, ElementMatrices, Material};
use crate::error::ErrorCode;
use crate::geometry::WaterTable;
use crate::math::Vec3;
use crate::model::{PhaseRequest, PhaseType, SolverRequest};
use crate::results::{NodeResult, PhaseResult, SolverEvent, SolverSummary, StressResult};

/// Cooperative cancellation flag shared with the caller
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the solve to stop at the next step boundary
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Precomputed per-element arrays plus the material binding.
///
/// Rebuilt in place when a phase override (or the reset at phase start)
/// swaps the material; node connectivity never changes.
pub(crate) struct ElementTable {
    /// 1-based element id on the wire
    pub id: usize,
    pub nodes: Vec<usize>,
    pub polygon_id: usize,
    pub material: Material,
    pub original_material: Material,
    pub matrices: ElementMatrices,
    /// Volumetric penalty of the bound material (zero unless Undrained A/B)
    pub penalty: f64,
}

impl ElementTable {
    fn coords(&self, nodes: &[[f64; 2]]) -> Vec<[f64; 2]> {
        self.nodes.iter().map(|&n| nodes[n]).collect()
    }

    /// Rebind to `material`, recomputing stiffness, gravity and quadrature
    /// caches. Stress state is owned by the solver and left untouched.
    fn rebind_material(
        &mut self,
        material: &Material,
        mesh_nodes: &[[f64; 2]],
        water: &WaterTable,
    ) -> bool {
        match compute_element_matrices(
            self.id,
            &self.coords(mesh_nodes),
            material,
            water,
            1.0,
        ) {
            Ok(matrices) => {
                self.matrices = matrices;
                self.material = material.clone();
                self.penalty = material.volumetric_penalty();
                true
            }
            Err(err) => {
                warn!("element {}: material rebind failed: {err}", self.id);
                false
            }
        }
    }
}

/// Mutable state of one quadrature point, carried across phases
#[derive(Debug, Clone)]
pub(crate) struct GaussState {
    pub stress: Vec3,
    pub strain: Vec3,
    pub pwp_excess: f64,
    pub yielded: bool,
}

impl Default for GaussState {
    fn default() -> Self {
        Self {
            stress: Vec3::zeros(),
            strain: Vec3::zeros(),
            pwp_excess: 0.0,
            yielded: false,
        }
    }
}

/// Per-element Gauss point states, indexed like the element tables
pub(crate) type StateArray = Vec<Vec<GaussState>>;

/// Event sink: forwards to the caller and mirrors log lines into the
/// summary log.
pub(crate) struct EventSink<'a> {
    emit: &'a mut dyn FnMut(SolverEvent),
    pub log: Vec<String>,
}

impl<'a> EventSink<'a> {
    fn new(emit: &'a mut dyn FnMut(SolverEvent)) -> Self {
        Self {
            emit,
            log: Vec::new(),
        }
    }

    pub fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.log.push(message.clone());
        (self.emit)(SolverEvent::Log(message));
    }

    pub fn emit(&mut self, event: SolverEvent) {
        (self.emit)(event);
    }
}

/// Run the staged analysis, streaming events into `emit`.
///
/// The returned summary matches the `final` event. On cancellation the
/// solver logs, stops, and (per the streaming contract) emits no `final`
/// event; the partial summary is still returned for in-process callers.
pub fn solve<F>(request: &SolverRequest, cancel: &CancelToken, mut emit: F) -> SolverSummary
where
    F: FnMut(SolverEvent),
{
    let mut sink = EventSink::new(&mut emit);
    solve_inner(request, cancel, &mut sink)
}

fn solve_inner(
    request: &SolverRequest,
    cancel: &CancelToken,
    sink: &mut EventSink,
) -> SolverSummary {
    // --- Pre-flight validation ---
    let violations = validate_settings(request);
    if !violations.is_empty() {
        for code in &violations {
            sink.log(code.message());
        }
        let phase_id = request
            .phases
            .first()
            .map(|p| p.id.clone())
            .unwrap_or_else(|| "error".to_string());
        let result = PhaseResult {
            phase_id,
            success: false,
            displacements: Vec::new(),
            stresses: Vec::new(),
            reached_m_stage: 0.0,
            step_points: Vec::new(),
            step_failed_at: None,
            error: Some(
                "Calculation blocked due to invalid solver settings. Please check the logs."
                    .to_string(),
            ),
        };
        sink.emit(SolverEvent::PhaseResult(result.clone()));
        return SolverSummary {
            success: false,
            phases: vec![result],
            log: sink.log.clone(),
        };
    }

    let mesh = &request.mesh;
    let num_nodes = mesh.nodes.len();
    let num_dof = num_nodes * 2;
    let water = WaterTable::from_points(&request.effective_water_points());

    // --- Element tables ---
    let mut tables: Vec<ElementTable> = Vec::with_capacity(mesh.elements.len());
    for (i, connectivity) in mesh.elements.iter().enumerate() {
        let elem_id = i + 1;
        let Some(meta) = mesh
            .element_materials
            .iter()
            .find(|em| em.element_id == elem_id)
        else {
            continue;
        };
        let coords: Vec<[f64; 2]> = connectivity.iter().map(|&n| mesh.nodes[n]).collect();
        let matrices =
            match compute_element_matrices(elem_id, &coords, &meta.material, &water, 1.0) {
                Ok(m) => m,
                Err(err) => {
                    sink.log(format!("ERROR: element {elem_id} skipped: {err}"));
                    continue;
                }
            };
        tables.push(ElementTable {
            id: elem_id,
            nodes: connectivity.clone(),
            polygon_id: meta.polygon_id.unwrap_or(0),
            material: meta.material.clone(),
            original_material: meta.material.clone(),
            matrices,
            penalty: meta.material.volumetric_penalty(),
        });
    }

    let mut warned_materials: Vec<String> = Vec::new();
    for table in &tables {
        if warned_materials.contains(&table.material.id) {
            continue;
        }
        warned_materials.push(table.material.id.clone());
        for warning in table.material.validation_warnings() {
            warn!("{warning}");
        }
    }

    // --- Global state ---
    let mut total_displacement: DVector<f64> = DVector::zeros(num_dof);
    let mut state: StateArray = tables
        .iter()
        .map(|t| vec![GaussState::default(); t.matrices.quadrature.len()])
        .collect();

    let material_library: HashMap<&str, &Material> =
        request.materials.iter().map(|m| (m.id.as_str(), m)).collect();

    let mut phase_results: Vec<PhaseResult> = Vec::new();
    let mut cancelled = false;

    for phase in &request.phases {
        if cancel.is_cancelled() {
            sink.log("Analysis cancelled by user.");
            cancelled = true;
            break;
        }

        sink.log(format!(
            "--- Starting Phase: {} ({}) [Type: {:?}] ---",
            phase.name, phase.id, phase.phase_type
        ));

        // Step 0: restore baseline materials so overrides from earlier
        // branches of the phase tree do not leak. Safety phases inherit the
        // parent's override state untouched.
        if phase.phase_type != PhaseType::SafetyAnalysis {
            let mut reset_count = 0;
            for table in tables.iter_mut() {
                if table.material.id != table.original_material.id {
                    let original = table.original_material.clone();
                    if table.rebind_material(&original, &mesh.nodes, &water) {
                        reset_count += 1;
                    }
                }
            }
            if reset_count > 0 {
                sink.log(format!("Reset {reset_count} elements to original material."));
            }
        }

        // Step 0b: apply this phase's material overrides
        if let Some(overrides) = &phase.material_overrides {
            let mut ordered: Vec<(&usize, &String)> = overrides.iter().collect();
            ordered.sort_by_key(|(poly_idx, _)| **poly_idx);
            for (&poly_idx, mat_id) in ordered {
                let Some(&new_material) = material_library.get(mat_id.as_str()) else {
                    sink.log(format!(
                        "WARNING: Material override ID {mat_id} for polygon {poly_idx} not \
                         found in request materials."
                    ));
                    continue;
                };
                let affected: Vec<usize> = tables
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.polygon_id == poly_idx)
                    .map(|(i, _)| i)
                    .collect();
                if affected.is_empty() {
                    sink.log(format!(
                        "WARNING: No elements found for polygon index {poly_idx} to override."
                    ));
                    continue;
                }
                sink.log(format!(
                    "Overriding material for Polygon {poly_idx}: New Material '{}' ({})",
                    new_material.name, new_material.id
                ));
                for idx in affected {
                    tables[idx].rebind_material(new_material, &mesh.nodes, &water);
                }
            }
        }

        // Step 1: active element selection
        let active: Vec<usize> = tables
            .iter()
            .enumerate()
            .filter(|(_, t)| phase.active_polygon_indices.contains(&t.polygon_id))
            .map(|(i, _)| i)
            .collect();

        // Step 2: phase-type dispatch
        let outcome = if phase.phase_type == PhaseType::K0Procedure {
            mstage::PhaseOutcome {
                result: run_k0(
                    phase,
                    &tables,
                    &active,
                    &mesh.nodes,
                    &water,
                    &mut state,
                    &mut total_displacement,
                    sink,
                ),
                cancelled: false,
            }
        } else {
            mstage::run_incremental_phase(
                request,
                phase,
                &tables,
                &active,
                &mut state,
                &mut total_displacement,
                cancel,
                sink,
            )
        };

        let success = outcome.result.success;
        let step_failed_at = outcome.result.step_failed_at;
        sink.emit(SolverEvent::PhaseResult(outcome.result.clone()));
        phase_results.push(outcome.result);

        // Any cancellation, mid-loop or while the phase was finishing,
        // ends the solve here, before a `final` event can be emitted.
        if outcome.cancelled || cancel.is_cancelled() {
            if !outcome.cancelled {
                sink.log("Analysis cancelled by user.");
            }
            cancelled = true;
            break;
        }

        if success {
            sink.log(format!("Phase {} completed successfully.", phase.name));
        } else {
            sink.log(format!(
                "Phase {} failed at step {}.",
                phase.name,
                step_failed_at.unwrap_or(0)
            ));
            break;
        }
    }

    let summary = SolverSummary {
        success: !phase_results.is_empty() && phase_results.iter().all(|p| p.success),
        phases: phase_results,
        log: sink.log.clone(),
    };
    if !cancelled {
        sink.emit(SolverEvent::Final(summary.clone()));
    }
    summary
}

/// K0 dispatch: one-shot geostatic initialization, no displacements.
#[allow(clippy::too_many_arguments)]
fn run_k0(
    phase: &PhaseRequest,
    tables: &[ElementTable],
    active: &[usize],
    mesh_nodes: &[[f64; 2]],
    water: &WaterTable,
    state: &mut StateArray,
    total_displacement: &mut DVector<f64>,
    sink: &mut EventSink,
) -> PhaseResult {
    sink.log("Running K0 Procedure for stress initialization...");

    let k0_states = k0::compute_geostatic_stresses(tables, active, mesh_nodes, water);

    for (table_idx, gp_states) in &k0_states {
        let slot = &mut state[*table_idx];
        for (gp_idx, (stress, _pwp)) in gp_states.iter().enumerate() {
            slot[gp_idx] = GaussState {
                stress: *stress,
                strain: Vec3::zeros(),
                pwp_excess: 0.0,
                yielded: false,
            };
        }
    }

    // The K0 procedure generates stress without deformation
    total_displacement.fill(0.0);

    let displacements = (0..mesh_nodes.len())
        .map(|i| NodeResult {
            id: i + 1,
            ux: 0.0,
            uy: 0.0,
        })
        .collect();

    let mut stresses = Vec::new();
    for (table_idx, gp_states) in &k0_states {
        let table = &tables[*table_idx];
        for (gp_idx, (stress, pwp)) in gp_states.iter().enumerate() {
            stresses.push(StressResult {
                element_id: table.id,
                gp_id: gp_idx + 1,
                sig_xx: stress[0],
                sig_yy: stress[1],
                sig_xy: stress[2],
                sig_zz: derive_sigma_zz(&table.material, stress[0], stress[1], *pwp),
                m_stage: 1.0,
                is_yielded: false,
                pwp_steady: *pwp,
                pwp_excess: 0.0,
                pwp_total: *pwp,
            });
        }
    }

    sink.log("K0 Procedure completed.");

    PhaseResult {
        phase_id: phase.id.clone(),
        success: true,
        displacements,
        stresses,
        reached_m_stage: 1.0,
        step_points: Vec::new(),
        step_failed_at: None,
        error: None,
    }
}

/// Pre-flight settings validation, one error code per violated bound
fn validate_settings(request: &SolverRequest) -> Vec<ErrorCode> {
    let settings = &request.settings;
    let mut violations = Vec::new();

    if settings.tolerance < 0.001 || settings.tolerance > 0.1 {
        violations.push(ErrorCode::ValToleranceOob);
    }
    if settings.max_iterations < 1 || settings.max_iterations > 100 {
        violations.push(ErrorCode::ValIterationsOob);
    }
    if settings.initial_step_size < 0.001 || settings.initial_step_size > 1.0 {
        violations.push(ErrorCode::ValStepSizeOob);
    }
    if settings.max_load_fraction < 0.01 || settings.max_load_fraction > 1.0 {
        violations.push(ErrorCode::ValLoadFracOob);
    }
    if settings.max_steps < 1 || settings.max_steps > 1000 {
        violations.push(ErrorCode::ValMaxStepsOob);
    }
    if settings.min_desired_iterations > settings.max_desired_iterations {
        violations.push(ErrorCode::ValIterMismatch);
    }
    if request.mesh.elements.len() > crate::mesh::MAX_ELEMENTS {
        violations.push(ErrorCode::ValOverElementLimit);
    }

    violations
}
