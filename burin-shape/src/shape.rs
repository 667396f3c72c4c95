//! Directed planar graph storage and topology.

use crate::geom::{cmp_clockwise, sweep_cmp};
use crate::{FillRule, ShapeError};
use kurbo::{Affine, Point, Rect, Vec2};
use smallvec::SmallVec;

/// Sentinel for "no index" in the intrusive edge lists.
pub(crate) const NONE: i32 = -1;

/// What kind of graph a [`Shape`] currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShapeKind {
    /// Just a bunch of edges; may contain intersections and duplicates.
    #[default]
    Graph,
    /// Intersection-free, Eulerian, inside on the left of each edge.
    Polygon,
    /// Intersection-free graph whose faces are polygons.
    PolyPatch,
}

/// A vertex of the graph.
///
/// The edges incident to a point are threaded through a doubly-linked list
/// (`first_edge`/`last_edge` here, `next_s`/`prev_s`/`next_e`/`prev_e` on the
/// edges). After [`Shape::sort_edges`] the list is ordered clockwise by
/// outgoing direction.
#[derive(Debug, Clone, Copy)]
pub struct SweepPoint {
    /// Position.
    pub x: Point,
    /// First and last edge in the incidence list, `-1` when isolated.
    pub first_edge: i32,
    /// See `first_edge`.
    pub last_edge: i32,
    /// Number of edges ending here.
    pub in_degree: i32,
    /// Number of edges starting here.
    pub out_degree: i32,
    /// Degree before the last topology-changing pass; scratch data.
    pub old_degree: i32,
}

impl SweepPoint {
    fn new(x: Point) -> Self {
        Self {
            x,
            first_edge: NONE,
            last_edge: NONE,
            in_degree: 0,
            out_degree: 0,
            old_degree: 0,
        }
    }

    /// Total number of edge endpoints at this point.
    pub fn total_degree(&self) -> i32 {
        self.in_degree + self.out_degree
    }
}

/// A directed edge of the graph.
#[derive(Debug, Clone, Copy)]
pub struct SweepEdge {
    /// Start point index, `-1` when disconnected.
    pub st: i32,
    /// End point index, `-1` when disconnected.
    pub en: i32,
    /// Next/previous edge in the start point's incidence list.
    pub next_s: i32,
    /// See `next_s`.
    pub prev_s: i32,
    /// Next/previous edge in the end point's incidence list.
    pub next_e: i32,
    /// See `next_e`.
    pub prev_e: i32,
    /// Edge vector, end minus start.
    pub dx: Vec2,
    /// Multiplicity of the edge; doublon merging folds parallel edges into
    /// one edge with a summed weight.
    pub weight: i32,
}

/// Per-edge record of where an edge came from in the original paths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackData {
    /// Identifier of the source path, as given to the path builder.
    pub path_id: i32,
    /// Index of the path command within the source path.
    pub piece_id: i32,
    /// Parametric position of the edge start within the piece.
    pub t_start: f64,
    /// Parametric position of the edge end within the piece.
    pub t_end: f64,
}

impl BackData {
    pub(crate) fn reversed(self) -> Self {
        Self {
            t_start: self.t_end,
            t_end: self.t_start,
            ..self
        }
    }
}

/// A directed planar graph; the working representation of the shape engine.
#[derive(Debug, Clone, Default)]
pub struct Shape {
    kind: ShapeKind,
    points: Vec<SweepPoint>,
    edges: Vec<SweepEdge>,
    back: Option<Vec<BackData>>,
}

impl Shape {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data and make room for `points` points and `edges` edges.
    pub fn reset(&mut self, points: usize, edges: usize) {
        self.kind = ShapeKind::Graph;
        self.points.clear();
        self.points.reserve(points);
        self.edges.clear();
        self.edges.reserve(edges);
        if let Some(back) = &mut self.back {
            back.clear();
            back.reserve(edges);
        }
    }

    /// Enable or disable per-edge back data.
    pub fn make_back_data(&mut self, enable: bool) {
        if enable {
            if self.back.is_none() {
                self.back = Some(vec![
                    BackData {
                        path_id: -1,
                        piece_id: -1,
                        t_start: 0.0,
                        t_end: 1.0,
                    };
                    self.edges.len()
                ]);
            }
        } else {
            self.back = None;
        }
    }

    /// Whether edges carry back data.
    pub fn has_back_data(&self) -> bool {
        self.back.is_some()
    }

    /// What kind of graph this currently is.
    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    pub(crate) fn set_kind(&mut self, kind: ShapeKind) {
        self.kind = kind;
    }

    /// Declare the graph a polygon without checking any invariant.
    ///
    /// Only for callers that constructed an intersection-free, Eulerian,
    /// correctly-oriented graph by hand.
    pub fn force_to_polygon(&mut self) {
        self.kind = ShapeKind::Polygon;
    }

    /// Number of points.
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Access a point.
    pub fn point(&self, i: usize) -> &SweepPoint {
        &self.points[i]
    }

    /// Access an edge.
    pub fn edge(&self, i: usize) -> &SweepEdge {
        &self.edges[i]
    }

    /// All points.
    pub fn points(&self) -> &[SweepPoint] {
        &self.points
    }

    /// All edges.
    pub fn edges(&self) -> &[SweepEdge] {
        &self.edges
    }

    /// Back data of edge `i`, if back data is enabled.
    pub fn back_data(&self, i: usize) -> Option<&BackData> {
        self.back.as_ref().map(|b| &b[i])
    }

    pub(crate) fn set_back_data(&mut self, i: usize, data: BackData) {
        if let Some(back) = &mut self.back {
            back[i] = data;
        }
    }

    /// Add a point, returning its index.
    pub fn add_point(&mut self, x: Point) -> usize {
        self.points.push(SweepPoint::new(x));
        self.points.len() - 1
    }

    /// Add an edge with weight 1 between two point indices, returning its
    /// index. Degenerate edges (both endpoints equal) are refused.
    pub fn add_edge(&mut self, st: usize, en: usize) -> Option<usize> {
        self.add_weighted_edge(st, en, 1)
    }

    /// Add an edge with an explicit weight.
    pub fn add_weighted_edge(&mut self, st: usize, en: usize, weight: i32) -> Option<usize> {
        if st == en {
            return None;
        }
        let dx = self.points[en].x - self.points[st].x;
        let e = self.edges.len();
        self.edges.push(SweepEdge {
            st: NONE,
            en: NONE,
            next_s: NONE,
            prev_s: NONE,
            next_e: NONE,
            prev_e: NONE,
            dx,
            weight,
        });
        if let Some(back) = &mut self.back {
            back.push(BackData {
                path_id: -1,
                piece_id: -1,
                t_start: 0.0,
                t_end: 1.0,
            });
        }
        self.connect_start(st, e);
        self.connect_end(en, e);
        Some(e)
    }

    /// The endpoint of edge `b` that is not `p`.
    pub fn other(&self, p: usize, b: usize) -> usize {
        let edge = &self.edges[b];
        if edge.st == p as i32 {
            edge.en as usize
        } else {
            edge.st as usize
        }
    }

    /// Next edge after `b` in the incidence list at point `p`, `-1` at the
    /// end of the list.
    pub fn next_at(&self, p: usize, b: usize) -> i32 {
        let edge = &self.edges[b];
        if edge.st == p as i32 {
            edge.next_s
        } else if edge.en == p as i32 {
            edge.next_e
        } else {
            NONE
        }
    }

    /// Previous edge before `b` in the incidence list at point `p`.
    pub fn prev_at(&self, p: usize, b: usize) -> i32 {
        let edge = &self.edges[b];
        if edge.st == p as i32 {
            edge.prev_s
        } else if edge.en == p as i32 {
            edge.prev_e
        } else {
            NONE
        }
    }

    /// Like [`next_at`](Self::next_at), but the list is circular.
    pub fn cycle_next_at(&self, p: usize, b: usize) -> i32 {
        let next = self.next_at(p, b);
        if next < 0 { self.points[p].first_edge } else { next }
    }

    /// Like [`prev_at`](Self::prev_at), but the list is circular.
    pub fn cycle_prev_at(&self, p: usize, b: usize) -> i32 {
        let prev = self.prev_at(p, b);
        if prev < 0 { self.points[p].last_edge } else { prev }
    }

    fn set_next_link(&mut self, p: usize, b: usize, to: i32) {
        let edge = &mut self.edges[b];
        if edge.st == p as i32 {
            edge.next_s = to;
        } else {
            edge.next_e = to;
        }
    }

    fn connect_start(&mut self, p: usize, e: usize) {
        let last = self.points[p].last_edge;
        {
            let edge = &mut self.edges[e];
            edge.st = p as i32;
            edge.prev_s = last;
            edge.next_s = NONE;
        }
        if last >= 0 {
            self.set_next_link(p, last as usize, e as i32);
        } else {
            self.points[p].first_edge = e as i32;
        }
        self.points[p].last_edge = e as i32;
        self.points[p].out_degree += 1;
    }

    fn connect_end(&mut self, p: usize, e: usize) {
        let last = self.points[p].last_edge;
        {
            let edge = &mut self.edges[e];
            edge.en = p as i32;
            edge.prev_e = last;
            edge.next_e = NONE;
        }
        if last >= 0 {
            self.set_next_link(p, last as usize, e as i32);
        } else {
            self.points[p].first_edge = e as i32;
        }
        self.points[p].last_edge = e as i32;
        self.points[p].in_degree += 1;
    }

    /// Reverse edge `e` in place: start and end swap, the edge vector flips,
    /// and back data swaps its parameter range. The incidence lists stay
    /// valid because the edge remains attached to both endpoints.
    pub fn inverse(&mut self, e: usize) {
        {
            let edge = &mut self.edges[e];
            std::mem::swap(&mut edge.st, &mut edge.en);
            std::mem::swap(&mut edge.next_s, &mut edge.next_e);
            std::mem::swap(&mut edge.prev_s, &mut edge.prev_e);
            edge.dx = -edge.dx;
        }
        let (st, en) = (self.edges[e].st, self.edges[e].en);
        // The old start became the end and vice versa.
        self.points[en as usize].in_degree += 1;
        self.points[en as usize].out_degree -= 1;
        self.points[st as usize].out_degree += 1;
        self.points[st as usize].in_degree -= 1;
        if let Some(back) = &mut self.back {
            back[e] = back[e].reversed();
        }
    }

    /// Apply an affine transform to every point.
    pub fn transform(&mut self, affine: Affine) {
        for point in &mut self.points {
            point.x = affine * point.x;
        }
        for edge in &mut self.edges {
            if edge.st < 0 || edge.en < 0 {
                continue;
            }
            let st = self.points[edge.st as usize].x;
            let en = self.points[edge.en as usize].x;
            edge.dx = en - st;
        }
    }

    /// The bounding box of all points, `None` when empty.
    pub fn bounding_box(&self) -> Option<Rect> {
        let mut iter = self.points.iter().map(|p| p.x);
        let first = iter.next()?;
        let mut rect = Rect::from_points(first, first);
        for p in iter {
            rect = rect.union_pt(p);
        }
        Some(rect)
    }

    /// Whether every vertex has equal in- and out-degree.
    pub fn is_eulerian(&self) -> bool {
        self.points.iter().all(|p| p.in_degree == p.out_degree)
    }

    /// Record the current degree of every point in its scratch field.
    pub(crate) fn store_old_degrees(&mut self) {
        for i in 0..self.points.len() {
            self.points[i].old_degree = self.points[i].total_degree();
        }
    }

    /// Sort all points by (y, x), remapping edge endpoints.
    ///
    /// Winding computation relies on this order: the first point of each
    /// still-unvisited component is then its topmost-leftmost vertex.
    pub fn sort_points(&mut self) {
        let mut order: Vec<usize> = (0..self.points.len()).collect();
        order.sort_by(|&a, &b| sweep_cmp(self.points[a].x, self.points[b].x));
        // old index -> new index
        let mut remap = vec![0usize; self.points.len()];
        for (new, &old) in order.iter().enumerate() {
            remap[old] = new;
        }
        let mut new_points = Vec::with_capacity(self.points.len());
        for &old in &order {
            new_points.push(self.points[old]);
        }
        self.points = new_points;
        for edge in &mut self.edges {
            if edge.st >= 0 {
                edge.st = remap[edge.st as usize] as i32;
            }
            if edge.en >= 0 {
                edge.en = remap[edge.en as usize] as i32;
            }
        }
    }

    /// Sort the incidence list of every vertex clockwise by outgoing
    /// direction. Edges arriving at the vertex are ordered by their negated
    /// vector.
    pub fn sort_edges(&mut self) {
        let mut stars: Vec<SmallVec<[(i32, bool); 4]>> =
            vec![SmallVec::new(); self.points.len()];
        for (i, edge) in self.edges.iter().enumerate() {
            if edge.st >= 0 {
                stars[edge.st as usize].push((i as i32, true));
            }
            if edge.en >= 0 {
                stars[edge.en as usize].push((i as i32, false));
            }
        }
        for (p, star) in stars.iter_mut().enumerate() {
            star.sort_by(|&(a, a_starts), &(b, b_starts)| {
                let da = if a_starts {
                    self.edges[a as usize].dx
                } else {
                    -self.edges[a as usize].dx
                };
                let db = if b_starts {
                    self.edges[b as usize].dx
                } else {
                    -self.edges[b as usize].dx
                };
                cmp_clockwise(da, db).then(a.cmp(&b))
            });
            self.relink_vertex(p, star);
        }
    }

    fn relink_vertex(&mut self, p: usize, ordered: &[(i32, bool)]) {
        self.points[p].first_edge = NONE;
        self.points[p].last_edge = NONE;
        let mut prev: Option<(i32, bool)> = None;
        for &(e, starts) in ordered {
            {
                let edge = &mut self.edges[e as usize];
                if starts {
                    edge.prev_s = prev.map_or(NONE, |(pe, _)| pe);
                    edge.next_s = NONE;
                } else {
                    edge.prev_e = prev.map_or(NONE, |(pe, _)| pe);
                    edge.next_e = NONE;
                }
            }
            match prev {
                Some((pe, pe_starts)) => {
                    let prev_edge = &mut self.edges[pe as usize];
                    if pe_starts {
                        prev_edge.next_s = e;
                    } else {
                        prev_edge.next_e = e;
                    }
                }
                None => self.points[p].first_edge = e,
            }
            self.points[p].last_edge = e;
            prev = Some((e, starts));
        }
    }

    /// Rebuild all incidence lists and degrees from the edge endpoints.
    pub(crate) fn rebuild_links(&mut self) {
        for point in &mut self.points {
            point.first_edge = NONE;
            point.last_edge = NONE;
            point.in_degree = 0;
            point.out_degree = 0;
        }
        for e in 0..self.edges.len() {
            let (st, en) = (self.edges[e].st, self.edges[e].en);
            self.edges[e] = SweepEdge {
                st: NONE,
                en: NONE,
                next_s: NONE,
                prev_s: NONE,
                next_e: NONE,
                prev_e: NONE,
                ..self.edges[e]
            };
            self.connect_start(st as usize, e);
            self.connect_end(en as usize, e);
        }
    }

    /// Merge doublon edges: edges sharing both endpoints collapse into one
    /// edge whose weight is the sum of same-direction weights minus the
    /// opposite-direction ones. Zero-weight results are removed.
    ///
    /// `keep_separate` exempts edges (by index) from merging; the cut
    /// operation uses this for its cutting edges. Returns the remap from old
    /// edge indices to surviving ones (`None` for dropped and absorbed
    /// edges).
    pub(crate) fn assemble_aretes(
        &mut self,
        keep_separate: impl Fn(usize) -> bool,
    ) -> Vec<Option<usize>> {
        use rustc_hash::FxHashMap;

        let mut groups: FxHashMap<(i32, i32), usize> = FxHashMap::default();
        let mut new_edges: Vec<SweepEdge> = Vec::with_capacity(self.edges.len());
        let mut new_back: Option<Vec<BackData>> = self.back.as_ref().map(|_| Vec::new());
        let mut separate: Vec<bool> = Vec::with_capacity(self.edges.len());
        let mut to_slot: Vec<Option<usize>> = vec![None; self.edges.len()];

        for (i, edge) in self.edges.iter().enumerate() {
            let data = self.back.as_ref().map(|b| b[i]);
            if keep_separate(i) {
                to_slot[i] = Some(new_edges.len());
                new_edges.push(*edge);
                separate.push(true);
                if let (Some(nb), Some(data)) = (&mut new_back, data) {
                    nb.push(data);
                }
                continue;
            }
            let key = (edge.st.min(edge.en), edge.st.max(edge.en));
            match groups.entry(key) {
                std::collections::hash_map::Entry::Occupied(o) => {
                    let slot = *o.get();
                    let repr = &mut new_edges[slot];
                    if repr.st == edge.st {
                        repr.weight += edge.weight;
                    } else {
                        repr.weight -= edge.weight;
                    }
                    to_slot[i] = Some(slot);
                }
                std::collections::hash_map::Entry::Vacant(v) => {
                    v.insert(new_edges.len());
                    to_slot[i] = Some(new_edges.len());
                    new_edges.push(*edge);
                    separate.push(false);
                    if let (Some(nb), Some(data)) = (&mut new_back, data) {
                        nb.push(data);
                    }
                }
            }
        }

        // Flip negative-weight representatives, drop zero-weight ones.
        // Exempted edges keep whatever weight they carry.
        let mut slot_to_final: Vec<Option<usize>> = vec![None; new_edges.len()];
        let mut kept_edges = Vec::with_capacity(new_edges.len());
        let mut kept_back = self.back.as_ref().map(|_| Vec::new());
        for (i, mut edge) in new_edges.into_iter().enumerate() {
            if edge.weight == 0 && !separate[i] {
                continue;
            }
            let mut data = new_back.as_ref().map(|b| b[i]);
            if edge.weight < 0 {
                std::mem::swap(&mut edge.st, &mut edge.en);
                edge.dx = -edge.dx;
                edge.weight = -edge.weight;
                data = data.map(BackData::reversed);
            }
            slot_to_final[i] = Some(kept_edges.len());
            kept_edges.push(edge);
            if let (Some(kb), Some(data)) = (&mut kept_back, data) {
                kb.push(data);
            }
        }
        self.edges = kept_edges;
        self.back = kept_back;
        self.rebuild_links();

        to_slot
            .into_iter()
            .map(|slot| slot.and_then(|s| slot_to_final[s]))
            .collect()
    }

    /// Drop points with no incident edges, remapping edge endpoints.
    pub(crate) fn prune_isolated_points(&mut self) {
        let mut remap = vec![NONE; self.points.len()];
        let mut kept = Vec::with_capacity(self.points.len());
        for (i, point) in self.points.iter().enumerate() {
            if point.total_degree() > 0 {
                remap[i] = kept.len() as i32;
                kept.push(*point);
            }
        }
        self.points = kept;
        for edge in &mut self.edges {
            edge.st = remap[edge.st as usize];
            edge.en = remap[edge.en as usize];
        }
    }

    /// Compute the winding number of a point by iterating all edges.
    ///
    /// A ray is cast from the point straight up; edges crossing it
    /// contribute their weight, signed by direction. Edges with an endpoint
    /// exactly on the ray contribute half a crossing, so two edges meeting
    /// on the ray count once.
    pub fn winding(&self, px: Point) -> i32 {
        let mut lr = 0i32;
        let mut ll = 0i32;
        let mut rr = 0i32;

        for edge in &self.edges {
            if edge.st < 0 || edge.en < 0 {
                continue;
            }
            let ast = self.points[edge.st as usize].x;
            let aen = self.points[edge.en as usize].x;
            let weight = edge.weight;

            // The edge's x extent must cover the ray.
            if ast.x < aen.x {
                if ast.x > px.x || aen.x < px.x {
                    continue;
                }
            } else if ast.x < px.x || aen.x > px.x {
                continue;
            }

            // Endpoint exactly on the ray: half crossings via ll/rr.
            if ast.x == px.x {
                if ast.y >= px.y || aen.x == px.x {
                    continue;
                }
                if aen.x < px.x {
                    ll += weight;
                } else {
                    rr -= weight;
                }
                continue;
            }
            if aen.x == px.x {
                if aen.y >= px.y || ast.x == px.x {
                    continue;
                }
                if ast.x < px.x {
                    ll -= weight;
                } else {
                    rr += weight;
                }
                continue;
            }

            // The edge must reach strictly above the point.
            if ast.y < aen.y {
                if ast.y >= px.y {
                    continue;
                }
            } else if aen.y >= px.y {
                continue;
            }

            let diff = px - ast;
            let cote = edge.dx.cross(diff);
            if cote == 0.0 {
                continue;
            }
            if cote < 0.0 {
                if ast.x > px.x {
                    lr += weight;
                }
            } else if ast.x < px.x {
                lr -= weight;
            }
        }
        lr + (ll + rr) / 2
    }

    /// Compute left/right winding numbers for every edge.
    ///
    /// Points must be sorted with [`sort_points`](Self::sort_points) and
    /// vertex stars with [`sort_edges`](Self::sort_edges). The graph is
    /// walked depth-first component by component, seeded at each component's
    /// topmost-leftmost vertex. `seed_hint` may name an already-wound edge
    /// whose left (`true`) or right (`false`) winding equals the winding of
    /// the region above that vertex — the sweep records the edge to the left
    /// of every point for this purpose. Without a usable hint the seed falls
    /// back to a brute-force [`winding`](Self::winding) query. Along the
    /// walk, `right = left - weight` holds for every edge.
    pub fn get_windings(
        &self,
        seed_hint: impl Fn(usize) -> Option<(usize, bool)>,
    ) -> Vec<(i32, i32)> {
        let ne = self.edges.len();
        let mut windings = vec![(0i32, 0i32); ne];
        let mut visited = vec![false; ne];
        let mut prec = vec![NONE; ne];
        let mut last_pt_used = 0usize;

        while last_pt_used < self.points.len() {
            // Find the next component's topmost point.
            let mut fi = last_pt_used;
            while fi < self.points.len() {
                let first = self.points[fi].first_edge;
                if first >= 0 && !visited[first as usize] {
                    break;
                }
                fi += 1;
            }
            last_pt_used = fi + 1;
            if fi >= self.points.len() {
                break;
            }

            let start = self.points[fi].first_edge as usize;
            let mut outside = if fi == 0 {
                // The very first point is topmost-leftmost of everything;
                // the region above it is outside every contour.
                0
            } else {
                seed_hint(fi)
                    .and_then(|(e, use_left)| {
                        visited[e].then(|| if use_left { windings[e].0 } else { windings[e].1 })
                    })
                    .unwrap_or_else(|| self.winding(self.points[fi].x))
            };
            if self.edges[start].en == fi as i32 {
                outside += self.edges[start].weight;
            }
            visited[start] = true;
            windings[start] = (outside, outside - self.edges[start].weight);
            prec[start] = NONE;

            // Depth-first traversal following the clockwise-previous edge
            // around each vertex.
            let mut cur = start;
            let mut cur_dir = true;
            loop {
                let c_pt = if cur_dir {
                    self.edges[cur].en as usize
                } else {
                    self.edges[cur].st as usize
                };

                // Search clockwise-backwards for an unvisited edge.
                let mut nb = cur as i32;
                let mut region;
                loop {
                    let nbe = &self.edges[nb as usize];
                    region = if nbe.en == c_pt as i32 {
                        windings[nb as usize].1
                    } else {
                        windings[nb as usize].0
                    };
                    let nnb = self.cycle_prev_at(c_pt, nb as usize);
                    if nnb == nb {
                        nb = NONE; // cul-de-sac
                        break;
                    }
                    nb = nnb;
                    if nb < 0 || nb as usize == cur || !visited[nb as usize] {
                        break;
                    }
                }

                if nb < 0 || nb as usize == cur {
                    // Backtrack.
                    let o_pt = if cur_dir {
                        self.edges[cur].st
                    } else {
                        self.edges[cur].en
                    };
                    let back = prec[cur];
                    if back < 0 {
                        break;
                    }
                    cur = back as usize;
                    cur_dir = self.edges[cur].en == o_pt;
                } else {
                    let nb = nb as usize;
                    visited[nb] = true;
                    if self.edges[nb].st == c_pt as i32 {
                        windings[nb] = (region + self.edges[nb].weight, region);
                    } else {
                        windings[nb] = (region, region - self.edges[nb].weight);
                    }
                    prec[nb] = cur as i32;
                    cur_dir = self.edges[nb].st == c_pt as i32;
                    cur = nb;
                }
            }
        }
        windings
    }

    /// Keep, reverse or delete every edge according to a fill rule and the
    /// computed windings, leaving a polygon with the inside on the left of
    /// each kept edge. Consumes the windings produced by
    /// [`get_windings`](Self::get_windings).
    pub(crate) fn apply_fill_rule(
        &mut self,
        windings: &[(i32, i32)],
        rule: FillRule,
        invert: bool,
    ) {
        self.retain_oriented(|i, edge| {
            // JustDont runs without windings.
            let (le, ri) = windings.get(i).copied().unwrap_or((0, 0));
            match rule {
                FillRule::NonZero => {
                    // Inside is wherever the winding is non-zero, of either
                    // sign; invert changes nothing for this rule.
                    if ri == 0 && le != 0 {
                        Some(false)
                    } else if le == 0 && ri != 0 {
                        Some(true)
                    } else {
                        None
                    }
                }
                FillRule::Positive => {
                    let (le, ri) = if invert { (-le, -ri) } else { (le, ri) };
                    if le > 0 && ri <= 0 {
                        Some(false)
                    } else if le <= 0 && ri > 0 {
                        Some(true)
                    } else {
                        None
                    }
                }
                FillRule::EvenOdd => {
                    let le = (le % 2).abs();
                    let ri = (ri % 2).abs();
                    if le > 0 && ri == 0 {
                        Some(false)
                    } else if le == 0 && ri > 0 {
                        Some(true)
                    } else {
                        None
                    }
                }
                FillRule::JustDont => {
                    if edge.st < 0 || edge.en < 0 {
                        None
                    } else {
                        Some(false)
                    }
                }
            }
        });
        if rule == FillRule::JustDont {
            for edge in &mut self.edges {
                edge.weight = 0;
            }
        }
    }

    /// Retain edges by predicate; `Some(false)` keeps, `Some(true)` keeps
    /// reversed, `None` drops. Kept edges get weight 1 unless the rule is
    /// weight-preserving. Links are rebuilt afterwards.
    pub(crate) fn retain_oriented(
        &mut self,
        mut decide: impl FnMut(usize, &SweepEdge) -> Option<bool>,
    ) {
        let mut kept = Vec::with_capacity(self.edges.len());
        let mut kept_back = self.back.as_ref().map(|_| Vec::new());
        for (i, edge) in self.edges.iter().enumerate() {
            let Some(reverse) = decide(i, edge) else {
                continue;
            };
            let mut edge = *edge;
            let mut data = self.back.as_ref().map(|b| b[i]);
            if reverse {
                std::mem::swap(&mut edge.st, &mut edge.en);
                edge.dx = -edge.dx;
                data = data.map(BackData::reversed);
            }
            edge.weight = 1;
            kept.push(edge);
            if let (Some(kb), Some(data)) = (&mut kept_back, data) {
                kb.push(data);
            }
        }
        self.edges = kept;
        self.back = kept_back;
        self.rebuild_links();
    }

    /// Check the polygon preconditions for an operation input.
    pub(crate) fn expect_polygon(&self) -> Result<(), ShapeError> {
        if self.kind != ShapeKind::Polygon {
            return Err(ShapeError::InvalidInput);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(shape: &mut Shape) -> [usize; 4] {
        // Oriented so the inside is on the left of each edge (y grows
        // downward): down the left, right along the bottom, up the right,
        // left along the top.
        let a = shape.add_point(Point::new(0.0, 0.0));
        let b = shape.add_point(Point::new(0.0, 10.0));
        let c = shape.add_point(Point::new(10.0, 10.0));
        let d = shape.add_point(Point::new(10.0, 0.0));
        shape.add_edge(a, b).unwrap();
        shape.add_edge(b, c).unwrap();
        shape.add_edge(c, d).unwrap();
        shape.add_edge(d, a).unwrap();
        [a, b, c, d]
    }

    #[test]
    fn degrees_and_links() {
        let mut shape = Shape::new();
        square(&mut shape);
        assert!(shape.is_eulerian());
        for i in 0..4 {
            assert_eq!(shape.point(i).total_degree(), 2);
        }
        // Walking the incidence list at point 0 reaches both edges.
        let p0 = 0;
        let first = shape.point(p0).first_edge;
        assert!(first >= 0);
        let second = shape.next_at(p0, first as usize);
        assert!(second >= 0);
        assert_eq!(shape.next_at(p0, second as usize), NONE);
    }

    #[test]
    fn inverse_flips_everything() {
        let mut shape = Shape::new();
        let a = shape.add_point(Point::new(0.0, 0.0));
        let b = shape.add_point(Point::new(1.0, 2.0));
        let e = shape.add_edge(a, b).unwrap();
        shape.inverse(e);
        assert_eq!(shape.edge(e).st, b as i32);
        assert_eq!(shape.edge(e).en, a as i32);
        assert_eq!(shape.edge(e).dx, Vec2::new(-1.0, -2.0));
        assert!(!shape.is_eulerian());
        assert_eq!(shape.point(a).in_degree, 1);
        assert_eq!(shape.point(b).out_degree, 1);
    }

    #[test]
    fn winding_inside_square() {
        let mut shape = Shape::new();
        square(&mut shape);
        assert_eq!(shape.winding(Point::new(5.0, 5.0)), 1);
        assert_eq!(shape.winding(Point::new(15.0, 5.0)), 0);
        assert_eq!(shape.winding(Point::new(-5.0, 5.0)), 0);
        assert_eq!(shape.winding(Point::new(5.0, -5.0)), 0);
    }

    #[test]
    fn winding_at_vertex_is_half_counted() {
        let mut shape = Shape::new();
        square(&mut shape);
        // At a corner the incident edges are skipped (not strictly above),
        // so the corner's upper region winds zero.
        assert_eq!(shape.winding(Point::new(0.0, 0.0)), 0);
    }

    #[test]
    fn doublon_merge_cancels_opposite_edges() {
        let mut shape = Shape::new();
        let a = shape.add_point(Point::new(0.0, 0.0));
        let b = shape.add_point(Point::new(10.0, 0.0));
        shape.add_edge(a, b).unwrap();
        shape.add_edge(b, a).unwrap();
        shape.assemble_aretes(|_| false);
        assert_eq!(shape.num_edges(), 0);
    }

    #[test]
    fn doublon_merge_sums_same_direction() {
        let mut shape = Shape::new();
        let a = shape.add_point(Point::new(0.0, 0.0));
        let b = shape.add_point(Point::new(10.0, 0.0));
        shape.add_edge(a, b).unwrap();
        shape.add_edge(a, b).unwrap();
        shape.add_weighted_edge(b, a, 1).unwrap();
        shape.assemble_aretes(|_| false);
        assert_eq!(shape.num_edges(), 1);
        assert_eq!(shape.edge(0).weight, 1);
        assert_eq!(shape.edge(0).st, a as i32);
    }

    #[test]
    fn windings_of_oriented_square() {
        let mut shape = Shape::new();
        square(&mut shape);
        shape.sort_points();
        shape.sort_edges();
        let windings = shape.get_windings(|_| None);
        for (i, &(le, ri)) in windings.iter().enumerate() {
            assert_eq!(le, 1, "edge {i} left winding");
            assert_eq!(ri, 0, "edge {i} right winding");
        }
    }

    #[test]
    fn windings_satisfy_weight_identity() {
        let mut shape = Shape::new();
        square(&mut shape);
        shape.sort_points();
        shape.sort_edges();
        let windings = shape.get_windings(|_| None);
        for (i, &(le, ri)) in windings.iter().enumerate() {
            assert_eq!(ri, le - shape.edge(i).weight);
        }
    }
}
