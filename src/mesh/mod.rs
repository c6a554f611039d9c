//! Unstructured T6 mesh generation over polygonal soil regions
//!
//! The generator builds a planar straight-line graph from the region
//! boundaries, runs a constrained Delaunay triangulation with quality
//! refinement (`spade`), enforces per-region area caps, promotes the
//! triangles to six-node quadratic elements with shared edge midpoints and
//! finally derives boundary conditions and load assignments.

use std::collections::{BTreeMap, HashMap};

use log::warn;
use rstar::{primitives::GeomWithData, RTree};
use spade::handles::FixedVertexHandle;
use spade::{
    AngleLimit, ConstrainedDelaunayTriangulation, Point2, RefinementParameters, Triangulation,
};

use crate::error::{ErrorCode, SolverError, SolverResult};
use crate::geometry::{point_in_polygon, point_segment_distance, triangle_signed_area, Point};
use crate::model::{
    BoundaryCondition, BoundaryConditions, ElementMaterial, LineLoadAssignment, MeshRequest,
    MeshResponse, PointLoadAssignment,
};

/// Hard cap on the element count, mirrored by the solver's pre-flight check
pub const MAX_ELEMENTS: usize = 4000;
/// Spatial tolerance for boundary detection and edge matching
const BOUNDARY_TOL: f64 = 1e-3;
/// Minimum quality angle requested from the Delaunay refinement (degrees)
const MIN_ANGLE_DEG: f64 = 20.0;
/// Upper bound on area-cap enforcement sweeps
const MAX_AREA_PASSES: usize = 16;

type Cdt = ConstrainedDelaunayTriangulation<Point2<f64>>;

/// Generate a conforming T6 mesh for the request.
///
/// Failures are reported inside the response (`success = false` plus an
/// error string), matching the wire contract.
pub fn generate_mesh(request: &MeshRequest) -> MeshResponse {
    match try_generate_mesh(request) {
        Ok(response) => response,
        Err(SolverError::Validation(code)) => MeshResponse::failed(code.message()),
        Err(err) => MeshResponse::failed(format!(
            "{} | {}",
            ErrorCode::SysInternalError.message(),
            err
        )),
    }
}

fn try_generate_mesh(request: &MeshRequest) -> SolverResult<MeshResponse> {
    for material in &request.materials {
        for warning in material.validation_warnings() {
            warn!("{warning}");
        }
    }

    let sizing = RegionSizing::new(request);

    // --- 1. PSLG assembly ---
    let mut cdt = Cdt::new();
    let vertex_of = |cdt: &mut Cdt, x: f64, y: f64| -> SolverResult<FixedVertexHandle> {
        // Deduplicate by rounded coordinates so shared polygon corners meet
        let px = (x * 1e6).round() / 1e6;
        let py = (y * 1e6).round() / 1e6;
        cdt.insert(Point2::new(px, py))
            .map_err(|e| SolverError::MeshGeneration(format!("vertex insertion failed: {e:?}")))
    };

    // Each unique geometric boundary edge is discretized once, with the
    // finest target length of the polygons sharing it. BTreeMap keeps the
    // insertion order, and with it the node numbering, reproducible.
    let mut edge_targets: BTreeMap<(i64, i64, i64, i64), f64> = BTreeMap::new();
    for (poly_idx, poly) in request.polygons.iter().enumerate() {
        let target = sizing.edge_length(poly_idx);
        let n = poly.vertices.len();
        for i in 0..n {
            let p1 = poly.vertices[i];
            let p2 = poly.vertices[(i + 1) % n];
            let key = edge_key(p1, p2);
            edge_targets
                .entry(key)
                .and_modify(|t| *t = t.min(target))
                .or_insert(target);
        }
    }

    let mut constraint_pairs: Vec<(FixedVertexHandle, FixedVertexHandle)> = Vec::new();
    for (&key, &target) in edge_targets.iter() {
        let (p1, p2) = edge_from_key(key);
        let dist = p1.distance_to(&p2);
        let n_segs = ((dist / target).ceil() as usize).max(1);

        let mut prev = vertex_of(&mut cdt, p1.x, p1.y)?;
        for j in 1..=n_segs {
            let t = j as f64 / n_segs as f64;
            let (cx, cy) = if j == n_segs {
                (p2.x, p2.y)
            } else {
                (p1.x + t * (p2.x - p1.x), p1.y + t * (p2.y - p1.y))
            };
            let curr = vertex_of(&mut cdt, cx, cy)?;
            constraint_pairs.push((prev, curr));
            prev = curr;
        }
    }

    for (a, b) in constraint_pairs {
        if a == b {
            continue;
        }
        if !cdt.can_add_constraint(a, b) {
            return Err(SolverError::Validation(ErrorCode::ValEmptyMesh));
        }
        cdt.add_constraint(a, b);
    }

    // --- 2. Required point-load vertices ---
    for pl in &request.point_loads {
        vertex_of(&mut cdt, pl.x, pl.y)?;
    }

    // --- 3. Quality refinement with per-region area caps ---
    let uniform_cap = sizing.uniform_area_cap();
    let mut params = RefinementParameters::<f64>::new()
        .exclude_outer_faces(true)
        .with_angle_limit(AngleLimit::from_deg(MIN_ANGLE_DEG))
        .with_max_additional_vertices(20_000);
    if let Some(cap) = uniform_cap {
        params = params.with_max_allowed_area(cap);
    }
    cdt.refine(params);

    if uniform_cap.is_none() {
        enforce_region_area_caps(&mut cdt, request, &sizing)?;
    }

    // --- 4. Extract triangles with region attributes ---
    let mut nodes: Vec<[f64; 2]> = cdt
        .vertices()
        .map(|v| [v.position().x, v.position().y])
        .collect();

    let mut corner_triangles: Vec<([usize; 3], usize)> = Vec::new();
    for face in cdt.inner_faces() {
        let positions = face.positions();
        let verts = face.vertices();
        let (cx, cy) = face_centroid(&positions);

        let Some(region) = region_of(request, cx, cy) else {
            continue;
        };

        let area = triangle_signed_area(
            [positions[0].x, positions[0].y],
            [positions[1].x, positions[1].y],
            [positions[2].x, positions[2].y],
        );
        if area.abs() < 1e-12 {
            warn!("discarding degenerate triangle at ({cx:.3}, {cy:.3})");
            continue;
        }

        let mut ids = [
            verts[0].fix().index(),
            verts[1].fix().index(),
            verts[2].fix().index(),
        ];
        if area < 0.0 {
            ids.swap(1, 2);
        }
        corner_triangles.push((ids, region));
    }

    if corner_triangles.is_empty() {
        return Err(SolverError::Validation(ErrorCode::ValEmptyMesh));
    }
    if corner_triangles.len() > MAX_ELEMENTS {
        return Err(SolverError::Validation(ErrorCode::ValOverElementLimit));
    }

    // --- 5. T6 promotion with shared midpoints ---
    let mut midpoint_of: HashMap<(usize, usize), usize> = HashMap::new();
    let mut elements: Vec<Vec<usize>> = Vec::with_capacity(corner_triangles.len());
    let mut element_regions: Vec<usize> = Vec::with_capacity(corner_triangles.len());

    for &(corners, region) in &corner_triangles {
        let mut connectivity = corners.to_vec();
        for edge in [(0, 1), (1, 2), (2, 0)] {
            let (a, b) = (corners[edge.0], corners[edge.1]);
            let key = (a.min(b), a.max(b));
            let mid = *midpoint_of.entry(key).or_insert_with(|| {
                let mx = (nodes[a][0] + nodes[b][0]) / 2.0;
                let my = (nodes[a][1] + nodes[b][1]) / 2.0;
                nodes.push([mx, my]);
                nodes.len() - 1
            });
            connectivity.push(mid);
        }
        elements.push(connectivity);
        element_regions.push(region);
    }

    // --- 6. Boundary conditions ---
    let boundary_conditions = detect_boundary_conditions(&nodes);

    // --- 7. Load resolution ---
    let point_load_assignments = resolve_point_loads(request, &nodes);
    let line_load_assignments = resolve_line_loads(request, &nodes, &elements);

    // --- 8. Element materials ---
    let mut element_materials = Vec::with_capacity(elements.len());
    for (elem_idx, &region) in element_regions.iter().enumerate() {
        let poly = &request.polygons[region];
        let material = request
            .materials
            .iter()
            .find(|m| m.id == poly.material_id)
            .ok_or_else(|| SolverError::MaterialNotFound(poly.material_id.clone()))?;
        element_materials.push(ElementMaterial {
            element_id: elem_idx + 1,
            material: material.clone(),
            polygon_id: Some(region),
        });
    }

    Ok(MeshResponse {
        success: true,
        nodes,
        elements,
        boundary_conditions,
        point_load_assignments,
        line_load_assignments,
        element_materials,
        error: None,
    })
}

/// Per-region sizing parameters resolved against the global defaults
struct RegionSizing {
    edge_lengths: Vec<f64>,
    area_caps: Vec<f64>,
}

impl RegionSizing {
    fn new(request: &MeshRequest) -> Self {
        let global_size = request.mesh_settings.mesh_size;
        let global_refinement = request.mesh_settings.boundary_refinement_factor;

        let mut edge_lengths = Vec::with_capacity(request.polygons.len());
        let mut area_caps = Vec::with_capacity(request.polygons.len());
        for poly in &request.polygons {
            let size = poly.mesh_size.filter(|s| *s > 0.0).unwrap_or(global_size);
            let refinement = poly
                .boundary_refinement_factor
                .filter(|r| *r > 0.0)
                .unwrap_or(global_refinement);
            edge_lengths.push(size / refinement.max(0.1));
            area_caps.push(0.5 * size * size);
        }
        Self {
            edge_lengths,
            area_caps,
        }
    }

    fn edge_length(&self, region: usize) -> f64 {
        self.edge_lengths[region]
    }

    fn area_cap(&self, region: usize) -> f64 {
        self.area_caps[region]
    }

    /// The shared area cap when every region agrees, letting the Delaunay
    /// refinement enforce it directly.
    fn uniform_area_cap(&self) -> Option<f64> {
        let first = *self.area_caps.first()?;
        if self
            .area_caps
            .iter()
            .all(|cap| (cap - first).abs() < 1e-12)
        {
            Some(first)
        } else {
            None
        }
    }
}

/// Split faces exceeding their region's area cap by inserting centroids,
/// re-running the quality refinement between sweeps.
fn enforce_region_area_caps(
    cdt: &mut Cdt,
    request: &MeshRequest,
    sizing: &RegionSizing,
) -> SolverResult<()> {
    for _pass in 0..MAX_AREA_PASSES {
        let mut to_split: Vec<Point2<f64>> = Vec::new();
        for face in cdt.inner_faces() {
            let positions = face.positions();
            let (cx, cy) = face_centroid(&positions);
            let Some(region) = region_of(request, cx, cy) else {
                continue;
            };
            let area = triangle_signed_area(
                [positions[0].x, positions[0].y],
                [positions[1].x, positions[1].y],
                [positions[2].x, positions[2].y],
            )
            .abs();
            if area > sizing.area_cap(region) {
                to_split.push(Point2::new(cx, cy));
            }
        }

        if to_split.is_empty() {
            return Ok(());
        }

        for point in to_split {
            cdt.insert(point)
                .map_err(|e| SolverError::MeshGeneration(format!("refinement failed: {e:?}")))?;
        }
        cdt.refine(
            RefinementParameters::<f64>::new()
                .exclude_outer_faces(true)
                .with_angle_limit(AngleLimit::from_deg(MIN_ANGLE_DEG))
                .with_max_additional_vertices(20_000),
        );
    }
    warn!("area-cap enforcement did not settle within {MAX_AREA_PASSES} passes");
    Ok(())
}

fn face_centroid(positions: &[Point2<f64>; 3]) -> (f64, f64) {
    (
        (positions[0].x + positions[1].x + positions[2].x) / 3.0,
        (positions[0].y + positions[1].y + positions[2].y) / 3.0,
    )
}

/// First polygon containing the point, if any
fn region_of(request: &MeshRequest, x: f64, y: f64) -> Option<usize> {
    request
        .polygons
        .iter()
        .position(|poly| point_in_polygon(&poly.vertices, x, y))
}

/// Quantized undirected edge key so both polygons sharing an edge agree
fn edge_key(p1: Point, p2: Point) -> (i64, i64, i64, i64) {
    let q = |v: f64| (v * 1e6).round() as i64;
    let a = (q(p1.x), q(p1.y));
    let b = (q(p2.x), q(p2.y));
    if a <= b {
        (a.0, a.1, b.0, b.1)
    } else {
        (b.0, b.1, a.0, a.1)
    }
}

fn edge_from_key(key: (i64, i64, i64, i64)) -> (Point, Point) {
    (
        Point::new(key.0 as f64 / 1e6, key.1 as f64 / 1e6),
        Point::new(key.2 as f64 / 1e6, key.3 as f64 / 1e6),
    )
}

/// Fix the base of the model and roll the vertical sides
fn detect_boundary_conditions(nodes: &[[f64; 2]]) -> BoundaryConditions {
    let mut bc = BoundaryConditions::default();
    if nodes.is_empty() {
        return bc;
    }

    let min_x = nodes.iter().map(|n| n[0]).fold(f64::INFINITY, f64::min);
    let max_x = nodes.iter().map(|n| n[0]).fold(f64::NEG_INFINITY, f64::max);
    let min_y = nodes.iter().map(|n| n[1]).fold(f64::INFINITY, f64::min);

    for (i, node) in nodes.iter().enumerate() {
        let (nx, ny) = (node[0], node[1]);
        if (ny - min_y).abs() < BOUNDARY_TOL {
            bc.full_fixed.push(BoundaryCondition { node: i });
        } else if (nx - min_x).abs() < BOUNDARY_TOL || (nx - max_x).abs() < BOUNDARY_TOL {
            bc.normal_fixed.push(BoundaryCondition { node: i });
        }
    }
    bc
}

/// Nearest-node resolution of point loads through an R-tree
fn resolve_point_loads(request: &MeshRequest, nodes: &[[f64; 2]]) -> Vec<PointLoadAssignment> {
    if request.point_loads.is_empty() || nodes.is_empty() {
        return Vec::new();
    }

    let tree = RTree::bulk_load(
        nodes
            .iter()
            .enumerate()
            .map(|(i, n)| GeomWithData::new([n[0], n[1]], i))
            .collect(),
    );

    request
        .point_loads
        .iter()
        .filter_map(|pl| {
            tree.nearest_neighbor(&[pl.x, pl.y])
                .map(|nearest| PointLoadAssignment {
                    point_load_id: pl.id.clone(),
                    assigned_node_id: nearest.data + 1,
                })
        })
        .collect()
}

/// Match T6 element edges lying on each line-load segment.
///
/// An edge qualifies when both of its corner nodes fall on the segment
/// within the boundary tolerance; the record keeps `[c1, c2, midpoint]` so
/// the solver can distribute the traction parabolically.
fn resolve_line_loads(
    request: &MeshRequest,
    nodes: &[[f64; 2]],
    elements: &[Vec<usize>],
) -> Vec<LineLoadAssignment> {
    let mut assignments = Vec::new();

    for ll in &request.line_loads {
        let a = [ll.x1, ll.y1];
        let b = [ll.x2, ll.y2];

        for (elem_idx, connectivity) in elements.iter().enumerate() {
            if connectivity.len() != 6 {
                continue;
            }
            for (c_a, c_b, mid) in [(0usize, 1usize, 3usize), (1, 2, 4), (2, 0, 5)] {
                let na = connectivity[c_a];
                let nb = connectivity[c_b];
                let on_segment = point_segment_distance(nodes[na], a, b) < BOUNDARY_TOL
                    && point_segment_distance(nodes[nb], a, b) < BOUNDARY_TOL;
                if on_segment {
                    assignments.push(LineLoadAssignment {
                        line_load_id: ll.id.clone(),
                        element_id: elem_idx + 1,
                        edge_nodes: vec![na + 1, nb + 1, connectivity[mid] + 1],
                    });
                }
            }
        }
    }

    assignments
}
