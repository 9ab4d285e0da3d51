//! The Selection Coordinator: from a click to a selected, named element.
//!
//! Per click the coordinator resolves the hit, maps it to a draw range,
//! applies the selection policy to the store and publishes what was picked.
//! Failures anywhere along the way are logged and end the click as a no-op;
//! nothing propagates to the caller.
//!
//! The selection itself changes inside [`SelectionCoordinator::handle_click`].
//! Everything answered by the [`DrawRangeIndex`] (names, tree ids, model
//! registration, name searches) arrives later: the render loop calls
//! [`SelectionCoordinator::poll`] once per frame and listeners hear about each
//! answer as it lands.

use std::collections::{HashMap, VecDeque};

use glam::{Vec2, Vec3};
use subpick_core::{
    DrawRange, ElementId, Hierarchy, MeshDrawRanges, MeshId, PickError, PointsId, RangeId, Result,
    Scene, TreeNode,
};
use subpick_render::{Camera, GpuPointPicker};

use crate::index::{DrawRangeIndex, Pending};
use crate::resolver::{GpuPointResolver, Hit, HitResolver, HitTarget, PickQuery, RaycastResolver};

/// A pointer click.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    /// Position in physical pixels from the top-left corner of the viewport.
    pub position: Vec2,
    /// Whether shift was held (toggle instead of replace).
    pub shift: bool,
}

impl PointerEvent {
    pub fn click(x: f32, y: f32) -> Self {
        Self {
            position: Vec2::new(x, y),
            shift: false,
        }
    }

    pub fn shift_click(x: f32, y: f32) -> Self {
        Self {
            position: Vec2::new(x, y),
            shift: true,
        }
    }
}

/// What the object-info panel shows for the last click.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub target: HitTarget,
    /// Face index for meshes, vertex index for point clouds.
    pub index: u32,
    /// Draw range the hit fell in, if any.
    pub range_id: Option<RangeId>,
    /// Semantic name of the element behind the range.
    pub name: Option<String>,
    /// Tree node id of the element, for tree-view sync.
    pub node_id: Option<u32>,
    /// Click position in model coordinates (global offset added back).
    pub coordinates: Vec3,
}

/// View collaborators notified after every selection change.
pub trait SelectionListener {
    /// The last click's object info, or `None` when it hit nothing.
    fn on_object_info(&mut self, info: Option<&ObjectInfo>);

    /// Tree node ids of the current selection, sorted.
    fn on_tree_selection(&mut self, node_ids: &[u32]);

    /// A registered model's element tree, once the index has built it.
    fn on_model_tree(&mut self, _key: &str, _root: &TreeNode) {}
}

/// Ties pointer events to the scene, the selection store and the index.
pub struct SelectionCoordinator {
    scene: Scene,
    index: DrawRangeIndex,
    resolvers: Vec<Box<dyn HitResolver>>,
    camera: Camera,
    viewport: (u32, u32),
    listeners: Vec<Box<dyn SelectionListener>>,
    next_tree_id: u32,
    /// Tree ids per model, filled in when each model's tree arrives.
    tree_ids: HashMap<String, HashMap<ElementId, u32>>,
    jobs: VecDeque<Job>,
    /// Lookups for the most recent click; a newer click replaces them.
    pending_info: Option<InfoRequest>,
}

impl SelectionCoordinator {
    /// Creates a coordinator with CPU raycasting for meshes and points.
    pub fn new(scene: Scene, index: DrawRangeIndex, viewport: (u32, u32)) -> Self {
        let aspect = viewport.0.max(1) as f32 / viewport.1.max(1) as f32;
        Self {
            scene,
            index,
            resolvers: vec![Box::new(RaycastResolver::new())],
            camera: Camera::new(aspect),
            viewport,
            listeners: Vec::new(),
            next_tree_id: 0,
            tree_ids: HashMap::new(),
            jobs: VecDeque::new(),
            pending_info: None,
        }
    }

    /// Routes point-cloud hits through the GPU id pass.
    ///
    /// Ignored when `gpu_point_picking` is off in the scene options.
    pub fn with_gpu_point_picker(mut self, picker: GpuPointPicker) -> Self {
        if self.scene.options.gpu_point_picking {
            self.resolvers = vec![
                Box::new(RaycastResolver::meshes_only()),
                Box::new(GpuPointResolver::new(picker)),
            ];
        } else {
            log::info!("GPU point picking disabled; points use the CPU ray test");
        }
        self
    }

    /// Adds another hit-testing strategy.
    pub fn add_resolver(&mut self, resolver: Box<dyn HitResolver>) {
        self.resolvers.push(resolver);
    }

    pub fn add_listener(&mut self, listener: Box<dyn SelectionListener>) {
        self.listeners.push(listener);
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn index(&self) -> &DrawRangeIndex {
        &self.index
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        if width > 0 && height > 0 {
            self.camera.set_aspect_ratio(width as f32 / height as f32);
        }
    }

    /// Sends a model's metadata to the index and queues its tree build.
    ///
    /// Returns immediately. Every hierarchy entry reserves one tree id, so
    /// ids never collide across models. Listeners get the tree through
    /// [`SelectionListener::on_model_tree`] from a later [`poll`](Self::poll).
    pub fn register_model(
        &mut self,
        key: &str,
        hierarchy: Hierarchy,
        draw_ranges: MeshDrawRanges,
    ) {
        let start_id = self.next_tree_id;
        let reserved = u32::try_from(hierarchy.len()).unwrap_or(u32::MAX);
        self.next_tree_id = start_id.saturating_add(reserved);

        let added = self.index.add(key, hierarchy, draw_ranges);
        let tree = self.index.build_hierarchy(key, None, start_id);
        self.jobs.push_back(Job::Model {
            key: key.to_string(),
            added: Answer::new("model registration", added, Ok(())),
            tree: Answer::new("build hierarchy", tree, None),
        });
    }

    /// Handles one click: resolve, map to a range, update selection, publish.
    ///
    /// The selection changes before this returns. Object info is published
    /// right away when it needs no index lookup, otherwise from a later
    /// [`poll`](Self::poll).
    pub fn handle_click(&mut self, event: &PointerEvent) {
        for resolver in &mut self.resolvers {
            resolver.prepare(&mut self.scene);
        }

        let query = PickQuery::new(&self.camera, event.position, self.viewport);
        let scene = &self.scene;
        let hit = self
            .resolvers
            .iter_mut()
            .filter_map(|resolver| resolver.resolve(scene, &query))
            .min_by(|a, b| a.distance.total_cmp(&b.distance));

        let Some(hit) = hit else {
            log::trace!("click at {} hit nothing", event.position);
            self.scene
                .selection
                .clear_selected_objects(&mut self.scene.registry);
            self.pending_info = None;
            self.publish(None);
            return;
        };

        let range = self.local_range(&hit);
        match (hit.target, &range) {
            (HitTarget::Mesh(mesh), Some(range)) => {
                let selection = &mut self.scene.selection;
                if event.shift {
                    selection.toggle_selected_object(
                        &mut self.scene.registry,
                        mesh,
                        &range.range_id,
                    );
                } else {
                    selection.select_only(&mut self.scene.registry, mesh, &range.range_id);
                }
            }
            // Points and range gaps are reported but never selected.
            _ => {
                if !event.shift {
                    self.scene
                        .selection
                        .clear_selected_objects(&mut self.scene.registry);
                }
            }
        }

        self.pending_info = Some(self.info_request(&hit, range.map(|r| r.range_id)));
        self.drain(false);
    }

    /// Replaces the selection with every range whose element is named in `names`.
    ///
    /// The search runs on the index; the selection changes on the
    /// [`poll`](Self::poll) that receives its answer.
    pub fn select_by_names(&mut self, key: &str, names: &[String]) {
        let members = self.index.get_draw_ranges_by_member_names(key, names);
        self.jobs.push_back(Job::Group {
            key: key.to_string(),
            members: Answer::new("member name lookup", members, Vec::new()),
        });
    }

    /// Applies every index answer that has arrived, without blocking.
    ///
    /// Call once per frame. Returns how many requests are still outstanding.
    pub fn poll(&mut self) -> usize {
        self.drain(false);
        self.outstanding()
    }

    /// Waits for every outstanding index answer and applies it.
    ///
    /// For batch tools and tests; interactive loops use [`poll`](Self::poll).
    pub fn flush(&mut self) {
        self.drain(true);
    }

    /// Tree node ids of every selected range, sorted and deduplicated.
    pub fn selected_tree_node_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .scene
            .selection
            .iter()
            .filter_map(|(mesh, range_id)| {
                let key = self.scene.registry.mesh(mesh)?.model_key()?;
                self.tree_ids.get(key)?.get(range_id).copied()
            })
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Hides every selected range and clears the selection.
    pub fn hide_selected(&mut self) {
        self.scene.selection.hide_selected(&mut self.scene.registry);
        self.publish_tree_selection();
    }

    /// Unhides every range of every mesh.
    pub fn show_all(&mut self) {
        self.scene.selection.unhide_all(&mut self.scene.registry);
    }

    /// Drops a model's meshes, points, selection entries and cached metadata.
    ///
    /// Outstanding work for the model is abandoned; the cache eviction itself
    /// completes on a later [`poll`](Self::poll).
    pub fn unload_model(&mut self, key: &str) -> (Vec<MeshId>, Vec<PointsId>) {
        let removed = self.scene.unload_model(key);
        self.tree_ids.remove(key);
        self.jobs.retain(|job| job.key() != key);
        if self
            .pending_info
            .as_ref()
            .is_some_and(|request| request.key.as_deref() == Some(key))
        {
            self.pending_info = None;
        }

        let evicted = self.index.remove(key);
        self.jobs.push_back(Job::Evict {
            key: key.to_string(),
            removed: Answer::new("model eviction", evicted, Ok(())),
        });
        self.publish_tree_selection();
        removed
    }

    fn outstanding(&self) -> usize {
        self.jobs.len() + usize::from(self.pending_info.is_some())
    }

    /// Finishes queued jobs in order, stopping at the first one still waiting,
    /// then advances the click lookups.
    fn drain(&mut self, block: bool) {
        while let Some(job) = self.jobs.front_mut() {
            if !job.ready(block) {
                break;
            }
            if let Some(job) = self.jobs.pop_front() {
                self.finish(job);
            }
        }

        let done = self
            .pending_info
            .as_mut()
            .is_some_and(|request| request.advance(&self.index, block));
        if done {
            if let Some(request) = self.pending_info.take() {
                self.publish(Some(&request.info));
            }
        }
    }

    fn finish(&mut self, job: Job) {
        match job {
            Job::Model { key, added, tree } => {
                if let Err(e) = added.into_value() {
                    log::error!("failed to register model '{key}': {e}");
                }
                let Some(root) = tree.into_value() else {
                    log::warn!("model '{key}' has no element tree");
                    return;
                };
                let ids = root
                    .iter()
                    .map(|node| (node.element_id.clone(), node.id))
                    .collect();
                self.tree_ids.insert(key.clone(), ids);
                log::debug!("model '{key}' registered with {} tree nodes", root.len());
                for listener in &mut self.listeners {
                    listener.on_model_tree(&key, &root);
                }
                self.publish_tree_selection();
            }
            Job::Group { key, members } => {
                let pairs: Vec<(MeshId, RangeId)> = members
                    .into_value()
                    .into_iter()
                    .filter_map(|(mesh_name, range_id)| match self.mesh_id(&key, &mesh_name) {
                        Ok(mesh) => Some((mesh, range_id)),
                        Err(e) => {
                            log::debug!("{e}");
                            None
                        }
                    })
                    .collect();

                self.scene
                    .selection
                    .clear_selected_objects(&mut self.scene.registry);
                let selected = self
                    .scene
                    .selection
                    .add_batch_of_meshes(&mut self.scene.registry, pairs);
                log::debug!("selected {selected} ranges of '{key}' by name");
                self.publish_tree_selection();
            }
            Job::Evict { key, removed } => {
                if let Err(e) = removed.into_value() {
                    log::error!("failed to evict model '{key}': {e}");
                }
            }
        }
    }

    fn mesh_id(&self, key: &str, mesh_name: &str) -> Result<MeshId> {
        self.scene
            .registry
            .find_mesh(key, mesh_name)
            .ok_or_else(|| PickError::MeshNotFound {
                key: key.to_string(),
                mesh: mesh_name.to_string(),
            })
    }

    /// A mesh hit's draw range, from the ranges the mesh was built with.
    ///
    /// Point hits resolve through the index instead.
    fn local_range(&self, hit: &Hit) -> Option<DrawRange> {
        match hit.target {
            HitTarget::Mesh(id) => self.scene.registry.mesh(id)?.draw_range_at_face(hit.index),
            HitTarget::Points(_) => None,
        }
    }

    fn model_key_of(&self, target: HitTarget) -> Option<&str> {
        match target {
            HitTarget::Mesh(id) => self.scene.registry.mesh(id)?.model_key(),
            HitTarget::Points(id) => self.scene.registry.points(id)?.model_key(),
        }
    }

    fn info_request(&self, hit: &Hit, range_id: Option<RangeId>) -> InfoRequest {
        let key = self.model_key_of(hit.target).map(str::to_string);
        let point = match (hit.target, key.as_deref()) {
            (HitTarget::Points(id), Some(key)) => self
                .scene
                .registry
                .points(id)
                .map(|cloud| self.index.get_point_id(key, cloud.name(), hit.index)),
            _ => None,
        };

        let mut request = InfoRequest {
            info: ObjectInfo {
                target: hit.target,
                index: hit.index,
                range_id,
                name: None,
                node_id: None,
                coordinates: hit.world_position + self.scene.options.model_offset,
            },
            key,
            point: point.map(|pending| Answer::new("point id lookup", pending, None)),
            name: None,
            node_id: None,
        };
        if request.point.is_none() {
            request.lookup_name(&self.index);
        }
        request
    }

    fn publish(&mut self, info: Option<&ObjectInfo>) {
        for listener in &mut self.listeners {
            listener.on_object_info(info);
        }
        self.publish_tree_selection();
    }

    fn publish_tree_selection(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        let ids = self.selected_tree_node_ids();
        for listener in &mut self.listeners {
            listener.on_tree_selection(&ids);
        }
    }
}

/// One index answer being waited on, with the value to use if it fails.
struct Answer<T> {
    what: &'static str,
    pending: Option<Pending<T>>,
    value: T,
}

impl<T> Answer<T> {
    fn new(what: &'static str, pending: Pending<T>, fallback: T) -> Self {
        Self {
            what,
            pending: Some(pending),
            value: fallback,
        }
    }

    /// Takes the answer if it is in; failures are logged and keep the fallback.
    fn ready(&mut self, block: bool) -> bool {
        let answer = match self.pending.take() {
            None => return true,
            Some(pending) if block => pending.wait(),
            Some(pending) => match pending.try_recv() {
                Some(answer) => answer,
                None => {
                    self.pending = Some(pending);
                    return false;
                }
            },
        };
        match answer {
            Ok(value) => self.value = value,
            Err(e) => log::error!("{} failed: {e}", self.what),
        }
        true
    }

    fn into_value(self) -> T {
        self.value
    }
}

/// Index work queued by the coordinator, finished in submission order.
enum Job {
    Model {
        key: String,
        added: Answer<Result<()>>,
        tree: Answer<Option<TreeNode>>,
    },
    Group {
        key: String,
        members: Answer<Vec<(String, RangeId)>>,
    },
    Evict {
        key: String,
        removed: Answer<Result<()>>,
    },
}

impl Job {
    fn key(&self) -> &str {
        match self {
            Job::Model { key, .. } | Job::Group { key, .. } | Job::Evict { key, .. } => key,
        }
    }

    fn ready(&mut self, block: bool) -> bool {
        match self {
            Job::Model { added, tree, .. } => {
                let added = added.ready(block);
                let tree = tree.ready(block);
                added && tree
            }
            Job::Group { members, .. } => members.ready(block),
            Job::Evict { removed, .. } => removed.ready(block),
        }
    }
}

/// Object info for a click, completed as its index lookups come back.
struct InfoRequest {
    info: ObjectInfo,
    key: Option<String>,
    point: Option<Answer<Option<DrawRange>>>,
    name: Option<Answer<Option<String>>>,
    node_id: Option<Answer<Option<u32>>>,
}

impl InfoRequest {
    /// Sends the name and tree id lookups once the range id is known.
    fn lookup_name(&mut self, index: &DrawRangeIndex) {
        if let (Some(key), Some(range_id)) = (&self.key, &self.info.range_id) {
            let name = index.get_name_from_range_id(key, range_id);
            let node_id = index.get_node_id(key, range_id);
            self.name = Some(Answer::new("name lookup", name, None));
            self.node_id = Some(Answer::new("node id lookup", node_id, None));
        }
    }

    /// Returns true once every lookup has answered.
    fn advance(&mut self, index: &DrawRangeIndex, block: bool) -> bool {
        if let Some(point) = &mut self.point {
            if !point.ready(block) {
                return false;
            }
            let range = self.point.take().and_then(Answer::into_value);
            self.info.range_id = range.map(|r| r.range_id);
            self.lookup_name(index);
        }

        let name_ready = self.name.as_mut().map_or(true, |a| a.ready(block));
        let node_ready = self.node_id.as_mut().map_or(true, |a| a.ready(block));
        if !(name_ready && node_ready) {
            return false;
        }
        self.info.name = self.name.take().and_then(Answer::into_value);
        self.info.node_id = self.node_id.take().and_then(Answer::into_value);
        true
    }
}
