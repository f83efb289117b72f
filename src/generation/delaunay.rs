//! 2D Delaunay triangulation of room points via convex hull
//!
//! Lifting each point onto the paraboloid `(x, x² + z², z)` turns the planar
//! Delaunay triangulation into the lower faces of the lifted 3D convex hull.
//! The hull comes from parry3d; its faces are mapped back to input indices,
//! the downward-facing ones are kept, and a final edge-flip pass in `f64`
//! settles any choice the `f32` hull made between near-co-circular points.

use glam::{DVec2, DVec3};
use parry3d::math::Point;
use parry3d::transformation;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::{Result, TerrainError};

/// Twice the signed area of `abc`; positive when counter-clockwise
#[inline]
pub fn orientation(a: DVec2, b: DVec2, c: DVec2) -> f64 {
    (b - a).perp_dot(c - a)
}

/// In-circle determinant for a counter-clockwise triangle `abc`
///
/// Positive when `d` lies strictly inside the circumcircle, zero when it lies
/// on it.
pub fn in_circumcircle(a: DVec2, b: DVec2, c: DVec2, d: DVec2) -> f64 {
    let ad = a - d;
    let bd = b - d;
    let cd = c - d;
    ad.length_squared() * bd.perp_dot(cd)
        + bd.length_squared() * cd.perp_dot(ad)
        + cd.length_squared() * ad.perp_dot(bd)
}

/// Lift a point onto the paraboloid, relative to `origin`
#[inline]
fn lift(p: DVec2, origin: DVec2) -> DVec3 {
    let d = p - origin;
    DVec3::new(d.x, d.length_squared(), d.y)
}

/// Triangulate a point set
///
/// Returns counter-clockwise index triples into `points`. Fewer than three
/// points, or all points collinear, gives an empty triangulation.
pub fn triangulate(points: &[DVec2]) -> Vec<[usize; 3]> {
    let n = points.len();
    if n < 3 || all_collinear(points) {
        return Vec::new();
    }

    let origin = points.iter().copied().sum::<DVec2>() / n as f64;
    let lifted: Vec<DVec3> = points.iter().map(|&p| lift(p, origin)).collect();
    let hull_input: Vec<Point<f32>> = lifted
        .iter()
        .map(|l| Point::new(l.x as f32, l.y as f32, l.z as f32))
        .collect();

    let (hull_vertices, faces) = match transformation::try_convex_hull(&hull_input) {
        Ok(hull) => hull,
        Err(err) => {
            log::warn!("delaunay: convex hull of {} lifted points failed: {:?}", n, err);
            return Vec::new();
        }
    };

    // Hull vertices may be reordered or dropped, so map them back by position
    let source: Vec<usize> = hull_vertices
        .iter()
        .map(|v| nearest_input(&hull_input, v))
        .collect();

    let interior = lifted.iter().copied().sum::<DVec3>() / n as f64;
    let mut seen = HashSet::new();
    let mut triangles = Vec::new();

    for face in &faces {
        let [a, b, c] = face.map(|i| source[i as usize]);
        if a == b || b == c || a == c {
            continue;
        }

        // Orient the face normal away from the hull interior
        let normal = (lifted[b] - lifted[a]).cross(lifted[c] - lifted[a]);
        let facing = normal.dot(lifted[a] - interior);
        let outward = if facing < 0.0 { -normal } else { normal };
        // A flat hull (all points co-circular) has no interior side; every face is lower
        if outward.y > 0.0 && facing != 0.0 {
            continue;
        }

        let area = orientation(points[a], points[b], points[c]);
        if area == 0.0 {
            continue;
        }
        let tri = if area > 0.0 { [a, b, c] } else { [a, c, b] };

        let mut key = tri;
        key.sort_unstable();
        if seen.insert(key) {
            triangles.push(tri);
        }
    }

    if triangles.is_empty() {
        log::warn!("delaunay: convex hull of {} lifted points has no lower faces", n);
        return triangles;
    }

    // Near-co-circular points can fall inside the f32 hull; insert them exactly
    let used: HashSet<usize> = triangles.iter().flatten().copied().collect();
    for i in (0..n).filter(|i| !used.contains(i)) {
        insert_point(points, &mut triangles, i);
    }

    let flips = legalize(points, &mut triangles);
    if flips > 0 {
        log::debug!("delaunay: {} edge flips after hull extraction", flips);
    }

    triangles
}

fn all_collinear(points: &[DVec2]) -> bool {
    let a = points[0];
    let Some(&b) = points.iter().find(|&&p| p != a) else {
        return true;
    };
    points.iter().all(|&c| orientation(a, b, c) == 0.0)
}

fn nearest_input(inputs: &[Point<f32>], target: &Point<f32>) -> usize {
    inputs
        .iter()
        .enumerate()
        .min_by(|(_, p), (_, q)| {
            (p.coords - target.coords)
                .norm_squared()
                .total_cmp(&(q.coords - target.coords).norm_squared())
        })
        .map_or(0, |(i, _)| i)
}

/// Insert point `p` into a counter-clockwise triangulation of a convex region
///
/// A point inside a triangle splits it in three, a point on an edge splits
/// both sides in two, and a point outside is fanned to every boundary edge
/// that faces it. Duplicates of an existing vertex are ignored.
fn insert_point(points: &[DVec2], triangles: &mut Vec<[usize; 3]>, p: usize) {
    let at = points[p];
    if triangles.iter().flatten().any(|&v| points[v] == at) {
        return;
    }

    let containing = triangles.iter().position(|t| {
        triangle_edges(t)
            .iter()
            .all(|&(a, b)| orientation(points[a], points[b], at) >= 0.0)
    });

    let Some(t) = containing else {
        let edges: Vec<(usize, usize)> = triangles.iter().flat_map(triangle_edges).collect();
        let owned: HashSet<(usize, usize)> = edges.iter().copied().collect();
        let visible: Vec<(usize, usize)> = edges
            .into_iter()
            .filter(|&(a, b)| !owned.contains(&(b, a)))
            .filter(|&(a, b)| orientation(points[a], points[b], at) < 0.0)
            .collect();
        triangles.extend(visible.into_iter().map(|(a, b)| [b, a, p]));
        return;
    };

    let tri = triangles[t];
    let on_edge = triangle_edges(&tri)
        .into_iter()
        .find(|&(a, b)| orientation(points[a], points[b], at) == 0.0);

    match on_edge {
        None => {
            let [a, b, c] = tri;
            triangles[t] = [a, b, p];
            triangles.push([b, c, p]);
            triangles.push([c, a, p]);
        }
        Some((a, b)) => {
            let c = opposite(&tri, a, b);
            triangles[t] = [a, p, c];
            triangles.push([p, b, c]);

            let twin = triangles
                .iter()
                .position(|u| triangle_edges(u).contains(&(b, a)));
            if let Some(u) = twin {
                let d = opposite(&triangles[u], b, a);
                triangles[u] = [b, p, d];
                triangles.push([p, a, d]);
            }
        }
    }
}

/// Flip edges whose opposite vertex lies inside the neighbour's circumcircle
///
/// `triangles` must be counter-clockwise. Returns the number of flips made.
fn legalize(points: &[DVec2], triangles: &mut [[usize; 3]]) -> usize {
    let max_flips = triangles.len() * triangles.len() + 1;
    let mut flips = 0;

    while flips < max_flips {
        let owner: HashMap<(usize, usize), usize> = triangles
            .iter()
            .enumerate()
            .flat_map(|(t, tri)| triangle_edges(tri).map(|edge| (edge, t)))
            .collect();

        let illegal = triangles.iter().enumerate().find_map(|(t, tri)| {
            triangle_edges(tri).into_iter().find_map(|(a, b)| {
                let u = *owner.get(&(b, a))?;
                let c = opposite(tri, a, b);
                let d = opposite(&triangles[u], b, a);
                (in_circumcircle(points[a], points[b], points[c], points[d]) > 0.0)
                    .then_some((t, u, a, b, c, d))
            })
        });

        let Some((t, u, a, b, c, d)) = illegal else {
            return flips;
        };
        // Quad a-d-b-c is convex and counter-clockwise; swap diagonal ab for cd
        triangles[t] = [a, d, c];
        triangles[u] = [d, b, c];
        flips += 1;
    }

    log::warn!("delaunay: edge flipping stopped after {} flips", flips);
    flips
}

/// Vertex of `t` that is not on the directed edge `a -> b`
#[inline]
fn opposite(t: &[usize; 3], a: usize, b: usize) -> usize {
    t.iter().copied().find(|&v| v != a && v != b).unwrap_or(t[0])
}

#[inline]
fn triangle_edges(t: &[usize; 3]) -> [(usize, usize); 3] {
    [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])]
}

/// Unique undirected edges of the Delaunay triangulation, each as `(low, high)`
///
/// When there are no triangles (two points, or all points on one line) the
/// points are chained in order along their dominant axis, which is the
/// degenerate triangulation of a collinear set.
///
/// # Errors
///
/// Returns `DegenerateLayout` for fewer than two points.
pub fn delaunay_edges(points: &[DVec2]) -> Result<Vec<(usize, usize)>> {
    if points.len() < 2 {
        return Err(TerrainError::DegenerateLayout(format!(
            "need at least 2 rooms to connect (got {})",
            points.len()
        )));
    }

    let triangles = triangulate(points);
    if triangles.is_empty() {
        return Ok(collinear_chain(points));
    }

    let edges: BTreeSet<(usize, usize)> = triangles
        .iter()
        .flat_map(triangle_edges)
        .map(|(a, b)| (a.min(b), a.max(b)))
        .collect();

    log::debug!(
        "delaunay: {} points, {} triangles, {} edges",
        points.len(),
        triangles.len(),
        edges.len()
    );

    Ok(edges.into_iter().collect())
}

fn collinear_chain(points: &[DVec2]) -> Vec<(usize, usize)> {
    let (min, max) = points.iter().fold(
        (DVec2::splat(f64::INFINITY), DVec2::splat(f64::NEG_INFINITY)),
        |(min, max), &p| (min.min(p), max.max(p)),
    );
    let along_x = max.x - min.x >= max.y - min.y;

    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&a, &b| {
        let (pa, pb) = (points[a], points[b]);
        let (ka, kb) = if along_x {
            ((pa.x, pa.y), (pb.x, pb.y))
        } else {
            ((pa.y, pa.x), (pb.y, pb.x))
        };
        ka.0.total_cmp(&kb.0).then(ka.1.total_cmp(&kb.1))
    });

    order
        .windows(2)
        .map(|w| (w[0].min(w[1]), w[0].max(w[1])))
        .collect()
}
