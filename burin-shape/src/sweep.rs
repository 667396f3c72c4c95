//! The sweepline pass: intersection detection, snap rounding and the
//! rebuild of an intersection-free graph.
//!
//! A horizontal line conceptually sweeps the plane top to bottom. The set of
//! edges it currently crosses is kept in x-order; neighbouring edges are
//! tested for crossings whenever they first become neighbours, and detected
//! crossings are queued as events so the order can be maintained past them.
//! Every cut found this way (plus the snap-rounding adjacencies computed
//! afterwards) subdivides its source edge; the subdivided pieces are then
//! reassembled into a fresh graph whose points are snapped to the rounding
//! grid and sorted in sweep order.

use crate::geom::{grid_key, half_round, ihalf_round, round_point, sweep_cmp};
use crate::shape::{BackData, Shape, ShapeKind};
use crate::{BooleanOp, FillRule, ShapeError};
use kurbo::{Point, Vec2};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Positional tolerance when locating edges in the sweep status.
const POS_EPS: f64 = 1e-9;

struct WorkEdge {
    /// Rounded endpoints, in the source edge's direction.
    st: Point,
    en: Point,
    /// Rounded edge vector.
    dx: Vec2,
    weight: i32,
    back: BackData,
    /// Interned ids of the rounded endpoints.
    st_id: u32,
    en_id: u32,
    /// Subdivision positions along `st -> en`.
    cuts: Vec<(f64, u32)>,
}

impl WorkEdge {
    fn upper(&self) -> Point {
        if sweep_cmp(self.st, self.en) == Ordering::Greater {
            self.en
        } else {
            self.st
        }
    }

    fn lower(&self) -> Point {
        if sweep_cmp(self.st, self.en) == Ordering::Greater {
            self.st
        } else {
            self.en
        }
    }

    fn horizontal(&self) -> bool {
        self.st.y == self.en.y
    }

    /// x-position on the sweepline at height `y`; only valid for
    /// non-horizontal edges.
    fn x_at(&self, y: f64) -> f64 {
        let (up, lo) = (self.upper(), self.lower());
        up.x + (y - up.y) * (lo.x - up.x) / (lo.y - up.y)
    }

    /// dx/dy of the downward-oriented edge; orders edges that share a point
    /// on the sweepline.
    fn slope(&self) -> f64 {
        let (up, lo) = (self.upper(), self.lower());
        (lo.x - up.x) / (lo.y - up.y)
    }
}

enum EventKind {
    Insert(u32),
    Remove(u32),
    Horizontal(u32),
    /// The two edges and the interned crossing point.
    Cross(u32, u32, u32),
}

struct Event {
    y: f64,
    x: f64,
    rank: u8,
    kind: EventKind,
}

impl Event {
    fn key(&self) -> (f64, f64, u8) {
        (self.y, self.x, self.rank)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key()
            .partial_cmp(&other.key())
            .unwrap_or(Ordering::Equal)
    }
}

/// A subdivided piece of a work edge in the rebuilt graph.
struct Piece {
    edge: usize,
}

pub(crate) struct Sweeper {
    work: Vec<WorkEdge>,
    points: Vec<Point>,
    index: FxHashMap<(i64, i64), u32>,
    /// For interned points: the sweep status edge immediately to the left at
    /// the moment the point's event was handled, and the sweep y back then.
    left_records: FxHashMap<u32, (u32, f64)>,
}

impl Sweeper {
    pub(crate) fn new() -> Self {
        Self {
            work: Vec::new(),
            points: Vec::new(),
            index: FxHashMap::default(),
            left_records: FxHashMap::default(),
        }
    }

    fn intern(&mut self, p: Point) -> u32 {
        let key = grid_key(p);
        *self.index.entry(key).or_insert_with(|| {
            self.points.push(p);
            (self.points.len() - 1) as u32
        })
    }

    /// Add all edges of a shape, rounded to the grid. `weight_mul` lets the
    /// boolean difference modes invert the second operand; `path_id`
    /// overrides missing back data (used to label cutting edges).
    pub(crate) fn add_shape(&mut self, shape: &Shape, weight_mul: i32, path_id: Option<i32>) {
        for i in 0..shape.num_edges() {
            let edge = shape.edge(i);
            if edge.st < 0 || edge.en < 0 {
                continue;
            }
            let st = round_point(shape.point(edge.st as usize).x);
            let en = round_point(shape.point(edge.en as usize).x);
            if grid_key(st) == grid_key(en) {
                continue; // collapses on the grid
            }
            let back = shape.back_data(i).copied().unwrap_or(BackData {
                path_id: path_id.unwrap_or(-1),
                piece_id: i as i32,
                t_start: 0.0,
                t_end: 1.0,
            });
            let st_id = self.intern(st);
            let en_id = self.intern(en);
            self.work.push(WorkEdge {
                st,
                en,
                dx: en - st,
                weight: edge.weight * weight_mul,
                back,
                st_id,
                en_id,
                cuts: Vec::new(),
            });
        }
    }

    /// Run the sweep, collecting crossing cuts on every work edge.
    pub(crate) fn run(&mut self) {
        let mut heap: BinaryHeap<std::cmp::Reverse<Event>> = BinaryHeap::new();
        for (i, work) in self.work.iter().enumerate() {
            let i = i as u32;
            if work.horizontal() {
                let up = work.upper();
                heap.push(std::cmp::Reverse(Event {
                    y: up.y,
                    x: up.x.min(work.lower().x),
                    rank: 2,
                    kind: EventKind::Horizontal(i),
                }));
            } else {
                let (up, lo) = (work.upper(), work.lower());
                heap.push(std::cmp::Reverse(Event {
                    y: up.y,
                    x: up.x,
                    rank: 2,
                    kind: EventKind::Insert(i),
                }));
                heap.push(std::cmp::Reverse(Event {
                    y: lo.y,
                    x: lo.x,
                    rank: 0,
                    kind: EventKind::Remove(i),
                }));
            }
        }

        let mut status: Vec<u32> = Vec::new();
        let mut pos: Vec<i32> = vec![-1; self.work.len()];
        let mut seen: FxHashSet<(u32, u32)> = FxHashSet::default();

        while let Some(std::cmp::Reverse(event)) = heap.pop() {
            let y = event.y;
            match event.kind {
                EventKind::Insert(e) => {
                    let idx = self.locate(&status, y, self.work[e as usize].upper().x, e);
                    status.insert(idx, e);
                    for (at, &moved) in status.iter().enumerate().skip(idx) {
                        pos[moved as usize] = at as i32;
                    }
                    let pid = if sweep_cmp(self.work[e as usize].st, self.work[e as usize].en)
                        == Ordering::Greater
                    {
                        self.work[e as usize].en_id
                    } else {
                        self.work[e as usize].st_id
                    };
                    if idx > 0 {
                        let left = status[idx - 1];
                        self.left_records.entry(pid).or_insert((left, y));
                        self.test_pair(left, e, y, &mut heap, &mut seen);
                    }
                    if idx + 1 < status.len() {
                        self.test_pair(e, status[idx + 1], y, &mut heap, &mut seen);
                    }
                }
                EventKind::Remove(e) => {
                    let idx = pos[e as usize];
                    if idx < 0 {
                        continue;
                    }
                    let idx = idx as usize;
                    let pid = if sweep_cmp(self.work[e as usize].st, self.work[e as usize].en)
                        == Ordering::Greater
                    {
                        self.work[e as usize].st_id
                    } else {
                        self.work[e as usize].en_id
                    };
                    if idx > 0 {
                        self.left_records.entry(pid).or_insert((status[idx - 1], y));
                    }
                    status.remove(idx);
                    pos[e as usize] = -1;
                    for (at, &moved) in status.iter().enumerate().skip(idx) {
                        pos[moved as usize] = at as i32;
                    }
                    if idx > 0 && idx < status.len() {
                        self.test_pair(status[idx - 1], status[idx], y, &mut heap, &mut seen);
                    }
                }
                EventKind::Horizontal(e) => {
                    // Horizontal edges never enter the status; they are
                    // tested against everything the sweepline crosses in
                    // their x-span. Endpoint touches are left to the
                    // adjacency pass.
                    let (st, en) = (self.work[e as usize].st, self.work[e as usize].en);
                    let (lo_x, hi_x) = (st.x.min(en.x), st.x.max(en.x));
                    let candidates: Vec<u32> = status
                        .iter()
                        .copied()
                        .filter(|&s| {
                            let x = self.work[s as usize].x_at(y);
                            x >= lo_x - POS_EPS && x <= hi_x + POS_EPS
                        })
                        .collect();
                    for s in candidates {
                        self.test_pair(e, s, y, &mut heap, &mut seen);
                    }
                }
                EventKind::Cross(e1, e2, pid) => {
                    let (i, j) = (pos[e1 as usize], pos[e2 as usize]);
                    if i < 0 || j < 0 {
                        continue;
                    }
                    let (i, j) = (i as usize, j as usize);
                    if i.abs_diff(j) != 1 {
                        continue; // order already resolved differently
                    }
                    let m = i.min(j);
                    status.swap(m, m + 1);
                    pos[status[m] as usize] = m as i32;
                    pos[status[m + 1] as usize] = (m + 1) as i32;
                    if m > 0 {
                        self.left_records.entry(pid).or_insert((status[m - 1], y));
                        self.test_pair(status[m - 1], status[m], y, &mut heap, &mut seen);
                    }
                    if m + 2 < status.len() {
                        self.test_pair(status[m + 1], status[m + 2], y, &mut heap, &mut seen);
                    }
                }
            }
        }
    }

    /// Binary-search the status position for an edge inserted at its upper
    /// endpoint, breaking x-ties by slope.
    fn locate(&self, status: &[u32], y: f64, x: f64, e: u32) -> usize {
        let slope = self.work[e as usize].slope();
        let mut lo = 0usize;
        let mut hi = status.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            let other = &self.work[status[mid] as usize];
            let ox = other.x_at(y);
            let before = if (ox - x).abs() <= POS_EPS {
                other.slope() <= slope
            } else {
                ox < x
            };
            if before {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Test two edges that just became sweep neighbours for a proper
    /// crossing; record the cut on both and queue the swap event.
    fn test_pair(
        &mut self,
        a: u32,
        b: u32,
        current_y: f64,
        heap: &mut BinaryHeap<std::cmp::Reverse<Event>>,
        seen: &mut FxHashSet<(u32, u32)>,
    ) {
        let key = (a.min(b), a.max(b));
        if seen.contains(&key) {
            return;
        }
        let ea = &self.work[a as usize];
        let eb = &self.work[b as usize];
        let denom = ea.dx.cross(eb.dx);
        if denom == 0.0 {
            return; // parallel or colinear; adjacency handles overlaps
        }
        let diff = eb.st - ea.st;
        let ta = diff.cross(eb.dx) / denom;
        let tb = diff.cross(ea.dx) / denom;
        let eps = 1e-12;
        if ta <= eps || ta >= 1.0 - eps || tb <= eps || tb >= 1.0 - eps {
            return; // endpoint touch; the adjacency pass deals with it
        }
        let at = ea.st + ta * ea.dx;
        seen.insert(key);
        let pid = self.intern(round_point(at));
        self.work[a as usize].cuts.push((ta, pid));
        self.work[b as usize].cuts.push((tb, pid));
        heap.push(std::cmp::Reverse(Event {
            y: at.y.max(current_y),
            x: at.x,
            rank: 1,
            kind: EventKind::Cross(a, b, pid),
        }));
    }

    /// The snap-rounding adjacency pass: every interned point that lands in
    /// the half-grid band around an edge cuts that edge.
    pub(crate) fn check_adjacencies(&mut self) {
        for pid in 0..self.points.len() as u32 {
            let p = self.points[pid as usize];
            for e in 0..self.work.len() {
                if self.work[e].st_id == pid || self.work[e].en_id == pid {
                    continue;
                }
                if let Some(t) = teste_adjacency(&self.work[e], p) {
                    self.work[e].cuts.push((t, pid));
                }
            }
        }
    }

    /// Rebuild the subdivided graph. Returns the result shape (points in
    /// sweep order) plus, for each result point, the result edge recorded to
    /// its left during the sweep (the winding seed hints).
    pub(crate) fn build(mut self, want_back: bool) -> (Shape, Vec<Option<usize>>) {
        // Sort the interned points into sweep order.
        let mut order: Vec<u32> = (0..self.points.len() as u32).collect();
        order.sort_by(|&a, &b| sweep_cmp(self.points[a as usize], self.points[b as usize]));
        let mut remap = vec![0u32; self.points.len()];
        for (new, &old) in order.iter().enumerate() {
            remap[old as usize] = new as u32;
        }

        let mut result = Shape::new();
        result.make_back_data(want_back);
        for &old in &order {
            result.add_point(self.points[old as usize]);
        }

        // Emit the subdivided pieces of every work edge.
        let mut pieces: Vec<Vec<Piece>> = Vec::with_capacity(self.work.len());
        for work in &mut self.work {
            let mut cuts = std::mem::take(&mut work.cuts);
            cuts.push((0.0, work.st_id));
            cuts.push((1.0, work.en_id));
            cuts.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

            let mut emitted = Vec::new();
            let (mut last_t, mut last_p) = cuts[0];
            for &(t, p) in &cuts[1..] {
                if p == last_p {
                    last_t = t;
                    continue;
                }
                let edge = result.add_weighted_edge(
                    remap[last_p as usize] as usize,
                    remap[p as usize] as usize,
                    work.weight,
                );
                if let Some(edge) = edge {
                    let span = work.back.t_end - work.back.t_start;
                    result.set_back_data(
                        edge,
                        BackData {
                            path_id: work.back.path_id,
                            piece_id: work.back.piece_id,
                            t_start: work.back.t_start + last_t * span,
                            t_end: work.back.t_start + t * span,
                        },
                    );
                    emitted.push(Piece { edge });
                }
                last_t = t;
                last_p = p;
            }
            pieces.push(emitted);
        }

        // Resolve the per-point left records into result edges.
        let mut seeds: Vec<Option<usize>> = vec![None; result.num_points()];
        for (&pid, &(left_work, at_y)) in &self.left_records {
            let target = remap[pid as usize] as usize;
            let mut found = None;
            for piece in &pieces[left_work as usize] {
                let edge = result.edge(piece.edge);
                let (sy, ey) = (
                    result.point(edge.st as usize).x.y,
                    result.point(edge.en as usize).x.y,
                );
                if at_y >= sy.min(ey) && at_y <= sy.max(ey) {
                    found = Some(piece.edge);
                    break;
                }
            }
            seeds[target] = found;
        }

        (result, seeds)
    }
}

/// The narrow-band adjacency test: does the rounded point `p` lie on the
/// rounded edge?
///
/// The perpendicular offset is measured in half-grid units and must be
/// small; within the band, the point is on the edge iff the edge vector
/// separates opposite corners of the half-grid cell around the point, and
/// the parametric position lies strictly inside the edge. Returns that
/// parametric position.
fn teste_adjacency(work: &WorkEdge, p: Point) -> Option<f64> {
    let adir = work.dx;
    let len2 = adir.hypot2();
    if len2 == 0.0 {
        return None;
    }
    let len = len2.sqrt();
    let diff = p - work.st;

    let e = ihalf_round(adir.cross(diff) / len);
    if e <= -3.0 || e >= 3.0 {
        return None;
    }

    // 0.5 would be exact, but leaves no slack against rounding noise.
    let rad = half_round(0.501);
    let d1 = adir.cross(diff - Vec2::new(rad, rad));
    let d2 = adir.cross(diff + Vec2::new(rad, rad));
    let adjacent = if (d1 < 0.0 && d2 > 0.0) || (d1 > 0.0 && d2 < 0.0) {
        true
    } else {
        let d3 = adir.cross(diff + Vec2::new(rad, -rad));
        let d4 = adir.cross(diff + Vec2::new(-rad, rad));
        (d3 < 0.0 && d4 > 0.0) || (d3 > 0.0 && d4 < 0.0)
    };
    if !adjacent {
        return None;
    }

    let t = adir.dot(diff);
    if t > 0.0 && t < len2 {
        Some(t / len2)
    } else {
        None
    }
}

/// Shared tail of the conversion pipeline: doublon merge, vertex star sort,
/// winding computation with sweep seeds.
fn assemble_and_wind(
    result: &mut Shape,
    seeds: Vec<Option<usize>>,
    keep_separate: impl Fn(&Shape, usize) -> bool,
) -> (Vec<(i32, i32)>, Vec<Option<usize>>) {
    let edge_remap = {
        let shape = &*result;
        let keep: Vec<bool> = (0..shape.num_edges())
            .map(|i| keep_separate(shape, i))
            .collect();
        result.assemble_aretes(|i| keep[i])
    };
    let seeds: Vec<Option<usize>> = seeds
        .into_iter()
        .map(|s| s.and_then(|e| edge_remap[e]))
        .collect();

    result.store_old_degrees();
    result.sort_edges();

    let windings = {
        let shape = &*result;
        shape.get_windings(|fi| {
            seeds[fi].and_then(|e| {
                let edge = shape.edge(e);
                let (sy, ey) = (
                    shape.point(edge.st as usize).x.y,
                    shape.point(edge.en as usize).x.y,
                );
                // The record names the edge left of the point; the region
                // between them is that edge's greater-x side, which is the
                // traversal-left side iff the edge points downward. Pieces
                // that rounded horizontal have no usable side; fall back to
                // the brute query.
                (ey != sy).then_some((e, ey > sy))
            })
        })
    };
    (windings, seeds)
}

impl Shape {
    /// Build an intersection-free polygon from this graph.
    ///
    /// All self-intersections are resolved into vertices, duplicate edges
    /// are merged, and every edge ends up oriented with the filled interior
    /// (per `rule`, optionally inverted) on its left. The input must be
    /// Eulerian unless the rule is [`FillRule::JustDont`].
    pub fn convert_to_shape(&self, rule: FillRule, invert: bool) -> Result<Self, ShapeError> {
        if rule != FillRule::JustDont && !self.is_eulerian() {
            return Err(ShapeError::InvalidInput);
        }
        if self.num_points() <= 1 || self.num_edges() <= 1 {
            let mut empty = Self::new();
            empty.set_kind(ShapeKind::Polygon);
            return Ok(empty);
        }

        let mut sweeper = Sweeper::new();
        sweeper.add_shape(self, 1, None);
        sweeper.run();
        sweeper.check_adjacencies();
        let (mut result, seeds) = sweeper.build(self.has_back_data());

        if rule == FillRule::JustDont {
            result.assemble_aretes(|_| false);
            result.sort_edges();
            result.apply_fill_rule(&[], rule, invert);
        } else {
            let (windings, _) = assemble_and_wind(&mut result, seeds, |_, _| false);
            result.apply_fill_rule(&windings, rule, invert);
        }
        result.prune_isolated_points();
        // Retention rebuilt the incidence lists; restore the clockwise
        // vertex order the polygon invariants promise.
        result.sort_edges();
        result.set_kind(ShapeKind::Polygon);
        Ok(result)
    }

    /// Orient an already intersection-free graph so the inside (even-odd)
    /// is on the left of every edge.
    pub fn reoriente(&self) -> Result<Self, ShapeError> {
        let mut result = self.clone();
        if result.num_points() <= 1 || result.num_edges() <= 1 {
            result.set_kind(ShapeKind::Polygon);
            return Ok(result);
        }
        result.sort_points();
        result.sort_edges();
        let windings = result.get_windings(|_| None);
        result.apply_fill_rule(&windings, FillRule::EvenOdd, false);
        result.prune_isolated_points();
        result.sort_edges();
        result.set_kind(ShapeKind::Polygon);
        Ok(result)
    }

    /// Combine two polygons with a boolean operation.
    ///
    /// Inputs must be clean polygons (as produced by
    /// [`convert_to_shape`](Self::convert_to_shape)), except for
    /// [`BooleanOp::Cut`] and [`BooleanOp::Slice`], whose second operand is
    /// an arbitrary graph of cutting edges labelled `cut_path_id` in the
    /// result's back data.
    pub fn booleen(
        a: &Self,
        b: &Self,
        mode: BooleanOp,
        cut_path_id: i32,
    ) -> Result<Self, ShapeError> {
        if a.num_points() <= 1 || a.num_edges() <= 1 || b.num_points() <= 1 || b.num_edges() <= 1
        {
            let mut empty = Self::new();
            empty.set_kind(ShapeKind::Polygon);
            return Ok(empty);
        }
        if !matches!(mode, BooleanOp::Cut | BooleanOp::Slice) {
            a.expect_polygon()?;
            b.expect_polygon()?;
        }

        let want_back =
            a.has_back_data() || b.has_back_data() || matches!(mode, BooleanOp::Cut | BooleanOp::Slice);

        let mut sweeper = Sweeper::new();
        sweeper.add_shape(a, 1, None);
        // For difference-style modes the second operand counts negatively;
        // for cut and slice its edges do not influence windings at all.
        let b_weight = match mode {
            BooleanOp::Difference | BooleanOp::SymmetricDifference => -1,
            BooleanOp::Cut | BooleanOp::Slice => 0,
            _ => 1,
        };
        sweeper.add_shape(b, b_weight, Some(cut_path_id));
        sweeper.run();
        sweeper.check_adjacencies();
        let (mut result, seeds) = sweeper.build(want_back);

        let is_cut_edge = |shape: &Self, i: usize| -> bool {
            shape.back_data(i).is_some_and(|bd| bd.path_id == cut_path_id)
        };

        match mode {
            BooleanOp::Slice => {
                result.assemble_aretes(|_| false);
                // Keep only the first operand's edges, subdivided wherever
                // the cutting edges crossed them.
                let path_ids = result_back_snapshot(&result);
                result.retain_oriented(|i, edge| {
                    if edge.st < 0 || edge.en < 0 {
                        return None;
                    }
                    (path_ids[i] != cut_path_id).then_some(false)
                });
            }
            BooleanOp::Cut => {
                let (windings, _) =
                    assemble_and_wind(&mut result, seeds, |shape, i| is_cut_edge(shape, i));
                // Duplicate every cutting edge in reverse so the faces on
                // both sides of the slit own a boundary edge, then orient
                // each pair by the parity of the surrounding windings.
                let n = result.num_edges();
                for i in 0..n {
                    if is_cut_edge(&result, i) {
                        let edge = *result.edge(i);
                        let data = result.back_data(i).copied();
                        if let Some(twin) =
                            result.add_weighted_edge(edge.en as usize, edge.st as usize, edge.weight)
                        {
                            if let Some(data) = data {
                                result.set_back_data(twin, data.reversed());
                            }
                        }
                        let (le, ri) = windings[i];
                        if (le % 2).abs() < (ri % 2).abs() {
                            result.inverse(i);
                        }
                    }
                }
                result.sort_edges();
            }
            _ => {
                let (windings, _) = assemble_and_wind(&mut result, seeds, |_, _| false);
                result.retain_oriented(|i, _| {
                    let (le, ri) = windings[i];
                    match mode {
                        BooleanOp::Union | BooleanOp::Difference => {
                            if le > 0 && ri <= 0 {
                                Some(false)
                            } else if le <= 0 && ri > 0 {
                                Some(true)
                            } else {
                                None
                            }
                        }
                        BooleanOp::Intersection => {
                            if le > 1 && ri <= 1 {
                                Some(false)
                            } else if le <= 1 && ri > 1 {
                                Some(true)
                            } else {
                                None
                            }
                        }
                        BooleanOp::SymmetricDifference => {
                            let (le, ri) = (le.abs(), ri.abs());
                            if le > 0 && ri == 0 {
                                Some(false)
                            } else if le == 0 && ri > 0 {
                                Some(true)
                            } else {
                                None
                            }
                        }
                        BooleanOp::Cut | BooleanOp::Slice => unreachable!(),
                    }
                });
            }
        }

        result.prune_isolated_points();
        if !result.is_eulerian() {
            log::warn!("boolean operation produced a non-eulerian graph; clearing result");
            return Err(ShapeError::EulerFailure);
        }
        result.sort_edges();
        result.set_kind(ShapeKind::Polygon);
        Ok(result)
    }
}

// The slice branch needs the back-data path ids while mutating the shape.
fn result_back_snapshot(shape: &Shape) -> Vec<i32> {
    (0..shape.num_edges())
        .map(|i| shape.back_data(i).map_or(-1, |bd| bd.path_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::cmp_clockwise;
    use crate::FillRule;

    fn bowtie() -> Shape {
        let mut shape = Shape::new();
        let a = shape.add_point(Point::new(0.0, 0.0));
        let b = shape.add_point(Point::new(10.0, 10.0));
        let c = shape.add_point(Point::new(10.0, 0.0));
        let d = shape.add_point(Point::new(0.0, 10.0));
        shape.add_edge(a, b).unwrap();
        shape.add_edge(b, c).unwrap();
        shape.add_edge(c, d).unwrap();
        shape.add_edge(d, a).unwrap();
        shape
    }

    /// Walk a vertex's incidence list in order.
    fn star(shape: &Shape, p: usize) -> Vec<(usize, bool)> {
        let mut out = Vec::new();
        let mut cur = shape.point(p).first_edge;
        while cur >= 0 {
            let starts = shape.edge(cur as usize).st == p as i32;
            out.push((cur as usize, starts));
            cur = shape.next_at(p, cur as usize);
        }
        out
    }

    #[test]
    fn result_stars_are_clockwise() {
        let poly = bowtie().convert_to_shape(FillRule::NonZero, false).unwrap();
        for p in 0..poly.num_points() {
            let star = star(&poly, p);
            assert_eq!(star.len(), poly.point(p).total_degree() as usize);
            for pair in star.windows(2) {
                let dir = |(e, starts): (usize, bool)| {
                    let dx = poly.edge(e).dx;
                    if starts { dx } else { -dx }
                };
                assert_ne!(
                    cmp_clockwise(dir(pair[0]), dir(pair[1])),
                    std::cmp::Ordering::Greater,
                    "star at point {p} is not clockwise"
                );
            }
        }
    }

    #[test]
    fn result_edges_do_not_cross() {
        let poly = bowtie().convert_to_shape(FillRule::NonZero, false).unwrap();
        for i in 0..poly.num_edges() {
            for j in (i + 1)..poly.num_edges() {
                let (a, b) = (poly.edge(i), poly.edge(j));
                let (a0, a1) = (
                    poly.point(a.st as usize).x,
                    poly.point(a.en as usize).x,
                );
                let (b0, b1) = (
                    poly.point(b.st as usize).x,
                    poly.point(b.en as usize).x,
                );
                let d1 = a1 - a0;
                let d2 = b1 - b0;
                let denom = d1.cross(d2);
                if denom == 0.0 {
                    continue;
                }
                let diff = b0 - a0;
                let ta = diff.cross(d2) / denom;
                let tb = diff.cross(d1) / denom;
                let eps = 1e-9;
                assert!(
                    !(ta > eps && ta < 1.0 - eps && tb > eps && tb < 1.0 - eps),
                    "edges {i} and {j} cross"
                );
            }
        }
    }

    #[test]
    fn adjacency_band_detects_on_edge_points() {
        let work = WorkEdge {
            st: Point::new(0.0, 0.0),
            en: Point::new(10.0, 0.0),
            dx: Vec2::new(10.0, 0.0),
            weight: 1,
            back: BackData {
                path_id: -1,
                piece_id: -1,
                t_start: 0.0,
                t_end: 1.0,
            },
            st_id: 0,
            en_id: 1,
            cuts: Vec::new(),
        };
        // Exactly on the edge.
        let t = teste_adjacency(&work, round_point(Point::new(5.0, 0.0)));
        assert!(t.is_some());
        assert!((t.unwrap() - 0.5).abs() < 1e-9);
        // Within half a grid cell.
        assert!(teste_adjacency(&work, round_point(Point::new(5.0, 0.0008))).is_some());
        // Clearly off the edge.
        assert!(teste_adjacency(&work, round_point(Point::new(5.0, 0.5))).is_none());
        // Beyond the endpoints.
        assert!(teste_adjacency(&work, round_point(Point::new(11.0, 0.0))).is_none());
    }
}
