//! Shared scene fixtures.
//!
//! The camera sits at (0, 0, 3) looking down -Z with a 45 degree field of
//! view, so on a 200x200 viewport one pixel spans about 0.0124 world units at
//! z = 0 and pixel (100, 100) looks at the origin.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc;

use subpick::*;

pub const VIEWPORT: (u32, u32) = (200, 200);

/// Pixel centers of the fixture geometry.
pub const CLICK_A: (f32, f32) = (52.0, 100.0);
pub const CLICK_B: (f32, f32) = (148.0, 100.0);
pub const CLICK_C: (f32, f32) = (100.0, 36.0);
pub const CLICK_NODE: (f32, f32) = (100.0, 164.0);
pub const CLICK_EMPTY: (f32, f32) = (100.0, 100.0);

pub const MODEL: &str = "m";

fn quad(x0: f32, x1: f32, y0: f32, y1: f32) -> [Vec3; 4] {
    [
        Vec3::new(x0, y0, 0.0),
        Vec3::new(x1, y0, 0.0),
        Vec3::new(x1, y1, 0.0),
        Vec3::new(x0, y1, 0.0),
    ]
}

/// Triangles covering `[first, first + 1]` as a quad, padded with degenerate
/// triangles up to `faces`.
fn range_indices(base: u32, faces: usize) -> Vec<u32> {
    let mut indices = vec![base, base + 1, base + 2, base, base + 2, base + 3];
    indices.resize(faces * 3, base);
    indices
}

/// "beam_0": range A = faces 0..100 (left quad), range B = faces 100..150 (right quad).
pub fn beam() -> BatchedPickableMesh {
    let mut positions = quad(-1.0, -0.2, -0.3, 0.3).to_vec();
    positions.extend(quad(0.2, 1.0, -0.3, 0.3));
    let mut indices = range_indices(0, 100);
    indices.extend(range_indices(4, 50));

    BatchedPickableMesh::new(
        "beam_0",
        positions,
        indices,
        beam_ranges(),
        Material::new("steel", Vec4::splat(0.7)),
        Vec4::new(1.0, 0.55, 0.0, 1.0),
    )
    .with_model_key(MODEL)
}

pub fn beam_ranges() -> DrawRangeMap {
    DrawRangeMap::from([
        ("A".to_string(), Span::new(0, 300)),
        ("B".to_string(), Span::new(300, 150)),
    ])
}

/// "meshC": a single range C above the beam.
pub fn mesh_c() -> BatchedPickableMesh {
    BatchedPickableMesh::new(
        "meshC",
        quad(-0.4, 0.4, 0.6, 1.0).to_vec(),
        vec![0, 1, 2, 0, 2, 3],
        mesh_c_ranges(),
        Material::new("concrete", Vec4::splat(0.5)),
        Vec4::new(1.0, 0.55, 0.0, 1.0),
    )
    .with_model_key(MODEL)
}

pub fn mesh_c_ranges() -> DrawRangeMap {
    DrawRangeMap::from([("C".to_string(), Span::new(0, 6))])
}

pub fn hierarchy() -> Hierarchy {
    Hierarchy::from([
        ("1".to_string(), HierarchyEntry::new("frame", None)),
        ("A".to_string(), HierarchyEntry::new("Beam A", Some("1"))),
        ("B".to_string(), HierarchyEntry::new("Beam B", Some("1"))),
        ("C".to_string(), HierarchyEntry::new("Slab C", Some("1"))),
    ])
}

pub fn draw_ranges() -> MeshDrawRanges {
    MeshDrawRanges::from([
        ("beam_0".to_string(), beam_ranges()),
        ("meshC".to_string(), mesh_c_ranges()),
    ])
}

/// Everything a listener was told, in order.
#[derive(Debug, Default)]
pub struct Recorded {
    pub infos: Vec<Option<ObjectInfo>>,
    pub tree_selections: Vec<Vec<u32>>,
    pub trees: Vec<(String, TreeNode)>,
}

impl Recorded {
    pub fn tree(&self, key: &str) -> Option<&TreeNode> {
        self.trees.iter().find(|(k, _)| k == key).map(|(_, root)| root)
    }
}

pub struct RecordingListener(pub Rc<RefCell<Recorded>>);

impl SelectionListener for RecordingListener {
    fn on_object_info(&mut self, info: Option<&ObjectInfo>) {
        self.0.borrow_mut().infos.push(info.cloned());
    }

    fn on_tree_selection(&mut self, node_ids: &[u32]) {
        self.0.borrow_mut().tree_selections.push(node_ids.to_vec());
    }

    fn on_model_tree(&mut self, key: &str, root: &TreeNode) {
        self.0.borrow_mut().trees.push((key.to_string(), root.clone()));
    }
}

/// A coordinator over an empty scene with a recording listener attached.
pub fn recording(index: DrawRangeIndex) -> (SelectionCoordinator, Rc<RefCell<Recorded>>) {
    let scene = Scene::new(Options {
        gpu_point_picking: false,
        ..Options::default()
    });
    let mut coordinator = SelectionCoordinator::new(scene, index, VIEWPORT);
    let recorded = Rc::new(RefCell::new(Recorded::default()));
    coordinator.add_listener(Box::new(RecordingListener(Rc::clone(&recorded))));
    (coordinator, recorded)
}

pub struct Fixture {
    pub coordinator: SelectionCoordinator,
    pub beam: MeshId,
    pub slab: MeshId,
    pub nodes: PointsId,
    pub recorded: Rc<RefCell<Recorded>>,
}

pub fn fixture_with(options: Options) -> Fixture {
    let index = DrawRangeIndex::from_options(&options).expect("index worker");
    let mut scene = Scene::new(options);
    let beam = scene.add_mesh(beam());
    let slab = scene.add_mesh(mesh_c());
    let nodes = scene.add_points(
        PointCloud::new("nodes", vec![Vec3::new(0.0, -0.8, 0.0)]).with_model_key(MODEL),
    );

    let mut coordinator = SelectionCoordinator::new(scene, index, VIEWPORT);
    let recorded = Rc::new(RefCell::new(Recorded::default()));
    coordinator.add_listener(Box::new(RecordingListener(Rc::clone(&recorded))));

    coordinator.register_model(MODEL, hierarchy(), draw_ranges());
    coordinator.flush();
    assert!(recorded.borrow().tree(MODEL).is_some(), "model registers");

    Fixture {
        coordinator,
        beam,
        slab,
        nodes,
        recorded,
    }
}

pub fn fixture() -> Fixture {
    fixture_with(Options {
        gpu_point_picking: false,
        point_pick_threshold: 0.05,
        ..Options::default()
    })
}

pub fn click(at: (f32, f32)) -> PointerEvent {
    PointerEvent::click(at.0, at.1)
}

pub fn shift_click(at: (f32, f32)) -> PointerEvent {
    PointerEvent::shift_click(at.0, at.1)
}

/// Selected range ids of one mesh, sorted.
pub fn selected(coordinator: &SelectionCoordinator, mesh: MeshId) -> Vec<String> {
    let mut ids: Vec<String> = coordinator
        .scene()
        .selection
        .selection(mesh)
        .map(|set| set.iter().cloned().collect())
        .unwrap_or_default();
    ids.sort();
    ids
}

/// Range ids highlighted on a mesh, read from its render state.
pub fn highlighted(coordinator: &SelectionCoordinator, mesh: MeshId) -> Vec<String> {
    let mut ids: Vec<String> = coordinator
        .scene()
        .registry
        .mesh(mesh)
        .map(|m| m.selected_ranges().iter().cloned().collect())
        .unwrap_or_default();
    ids.sort();
    ids
}

/// Storage that holds every write until the test lets it through.
pub struct GatedBackend {
    inner: MemoryBackend,
    gate: mpsc::Receiver<()>,
}

impl GatedBackend {
    /// The backend plus the sender that releases one write per message.
    pub fn new() -> (mpsc::Sender<()>, Self) {
        let (open, gate) = mpsc::channel();
        let backend = Self {
            inner: MemoryBackend::new(),
            gate,
        };
        (open, backend)
    }
}

impl CacheBackend for GatedBackend {
    fn load(&self, key: &str) -> Result<Option<ModelCacheEntry>> {
        self.inner.load(key)
    }

    fn store(&mut self, entry: &ModelCacheEntry) -> Result<()> {
        let _ = self.gate.recv();
        self.inner.store(entry)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys()
    }
}
