//! Click-to-selection scenarios through the coordinator.

mod common;

use common::*;
use subpick::*;

#[test]
fn shift_click_toggles_then_plain_click_replaces() {
    let Fixture {
        mut coordinator,
        beam,
        slab,
        ..
    } = fixture();

    coordinator.handle_click(&shift_click(CLICK_A));
    assert_eq!(selected(&coordinator, beam), ["A"]);

    coordinator.handle_click(&shift_click(CLICK_B));
    assert_eq!(selected(&coordinator, beam), ["A", "B"]);
    assert_eq!(highlighted(&coordinator, beam), ["A", "B"]);

    coordinator.handle_click(&shift_click(CLICK_A));
    assert_eq!(selected(&coordinator, beam), ["B"]);
    assert_eq!(highlighted(&coordinator, beam), ["B"]);

    coordinator.handle_click(&click(CLICK_C));
    let snapshot = coordinator.scene().selection.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(selected(&coordinator, slab), ["C"]);
    assert!(highlighted(&coordinator, beam).is_empty());
}

#[test]
fn clicking_empty_space_clears_everything() {
    let Fixture {
        mut coordinator,
        beam,
        slab,
        recorded,
        ..
    } = fixture();

    coordinator.handle_click(&shift_click(CLICK_A));
    coordinator.handle_click(&shift_click(CLICK_C));
    assert_eq!(coordinator.scene().selection.len(), 2);

    coordinator.handle_click(&click(CLICK_EMPTY));
    assert!(coordinator.scene().selection.is_empty());
    assert!(highlighted(&coordinator, beam).is_empty());
    assert!(highlighted(&coordinator, slab).is_empty());

    let groups = coordinator.scene().registry.mesh(beam).unwrap().groups();
    assert!(groups
        .iter()
        .all(|g| g.material_index == MaterialSlot::Base.index()));

    let recorded = recorded.borrow();
    assert_eq!(recorded.infos.last(), Some(&None));
    assert_eq!(recorded.tree_selections.last(), Some(&Vec::new()));
}

#[test]
fn shift_click_on_empty_space_also_clears() {
    let Fixture {
        mut coordinator, ..
    } = fixture();
    coordinator.handle_click(&shift_click(CLICK_B));
    coordinator.handle_click(&shift_click(CLICK_EMPTY));
    assert!(coordinator.scene().selection.is_empty());
}

#[test]
fn object_info_carries_name_node_and_offset_coordinates() {
    let Fixture {
        mut coordinator,
        beam,
        recorded,
        ..
    } = fixture_with(Options {
        gpu_point_picking: false,
        model_offset: Vec3::new(1000.0, 0.0, -50.0),
        ..Options::default()
    });

    coordinator.handle_click(&click(CLICK_B));
    coordinator.flush();

    let node_b = coordinator
        .index()
        .get_node_id(MODEL, "B")
        .wait()
        .unwrap()
        .unwrap();
    let recorded = recorded.borrow();
    let info = recorded.infos.last().unwrap().as_ref().unwrap();
    assert_eq!(info.target, HitTarget::Mesh(beam));
    assert!(info.index == 100 || info.index == 101);
    assert_eq!(info.range_id.as_deref(), Some("B"));
    assert_eq!(info.name.as_deref(), Some("Beam B"));
    assert_eq!(info.node_id, Some(node_b));
    assert!((info.coordinates.x - 1000.6).abs() < 0.01);
    assert!((info.coordinates.z + 50.0).abs() < 1e-3);
    assert_eq!(recorded.tree_selections.last(), Some(&vec![node_b]));
}

#[test]
fn point_hits_report_info_without_selecting() {
    let Fixture {
        mut coordinator,
        beam,
        nodes,
        recorded,
        ..
    } = fixture();

    coordinator.handle_click(&click(CLICK_A));
    coordinator.handle_click(&shift_click(CLICK_NODE));
    assert_eq!(selected(&coordinator, beam), ["A"]);
    coordinator.flush();
    {
        let recorded = recorded.borrow();
        let info = recorded.infos.last().unwrap().as_ref().unwrap();
        assert_eq!(info.target, HitTarget::Points(nodes));
        assert_eq!(info.index, 0);
        assert!(info.range_id.is_none());
        assert!((info.coordinates.y + 0.8).abs() < 1e-5);
    }

    coordinator.handle_click(&click(CLICK_NODE));
    assert!(coordinator.scene().selection.is_empty());
}

#[test]
fn hidden_ranges_cannot_be_picked_until_shown() {
    let Fixture {
        mut coordinator,
        beam,
        ..
    } = fixture();

    coordinator.handle_click(&click(CLICK_A));
    coordinator.hide_selected();
    assert!(coordinator.scene().selection.is_empty());
    assert!(coordinator.scene().registry.mesh(beam).unwrap().is_hidden("A"));

    // The click now passes through A and hits nothing
    coordinator.handle_click(&shift_click(CLICK_A));
    assert!(coordinator.scene().selection.is_empty());

    coordinator.show_all();
    coordinator.handle_click(&click(CLICK_A));
    assert_eq!(selected(&coordinator, beam), ["A"]);
}

#[test]
fn select_by_names_replaces_selection() {
    let Fixture {
        mut coordinator,
        beam,
        slab,
        recorded,
        ..
    } = fixture();

    coordinator.handle_click(&click(CLICK_A));
    coordinator.select_by_names(MODEL, &["Beam B".to_string(), "Slab C".to_string()]);
    coordinator.flush();
    assert_eq!(coordinator.scene().selection.len(), 2);
    assert_eq!(selected(&coordinator, beam), ["B"]);
    assert_eq!(selected(&coordinator, slab), ["C"]);

    let index = coordinator.index();
    let mut expected = vec![
        index.get_node_id(MODEL, "B").wait().unwrap().unwrap(),
        index.get_node_id(MODEL, "C").wait().unwrap().unwrap(),
    ];
    expected.sort_unstable();
    assert_eq!(coordinator.selected_tree_node_ids(), expected);
    assert_eq!(recorded.borrow().tree_selections.last(), Some(&expected));

    coordinator.select_by_names(MODEL, &["nobody".to_string()]);
    coordinator.flush();
    assert!(coordinator.scene().selection.is_empty());
}

#[test]
fn unload_model_drops_objects_selection_and_cache() {
    let Fixture {
        mut coordinator, ..
    } = fixture();

    coordinator.handle_click(&shift_click(CLICK_A));
    coordinator.handle_click(&shift_click(CLICK_C));
    let (meshes, points) = coordinator.unload_model(MODEL);
    assert_eq!((meshes.len(), points.len()), (2, 1));
    assert!(coordinator.scene().selection.is_empty());
    assert!(coordinator.scene().registry.is_empty());
    assert!(coordinator.index().keys().wait().unwrap().is_empty());
    coordinator.flush();
    assert_eq!(coordinator.poll(), 0);

    // Nothing left to hit
    coordinator.handle_click(&click(CLICK_A));
    assert!(coordinator.scene().selection.is_empty());
}

#[test]
fn meshes_without_model_key_use_their_own_ranges() {
    let index = DrawRangeIndex::in_memory().unwrap();
    let mut scene = Scene::new(Options {
        gpu_point_picking: false,
        ..Options::default()
    });
    let local = scene.add_mesh(
        BatchedPickableMesh::new(
            "loose",
            vec![
                Vec3::new(-0.5, -0.5, 0.0),
                Vec3::new(0.5, -0.5, 0.0),
                Vec3::new(0.5, 0.5, 0.0),
                Vec3::new(-0.5, 0.5, 0.0),
            ],
            vec![0, 1, 2, 0, 2, 3],
            DrawRangeMap::from([("L".to_string(), Span::new(0, 6))]),
            Material::new("base", Vec4::ONE),
            Vec4::ONE,
        ),
    );
    let mut coordinator = SelectionCoordinator::new(scene, index, VIEWPORT);

    coordinator.handle_click(&click(CLICK_EMPTY));
    assert_eq!(selected(&coordinator, local), ["L"]);
    assert!(coordinator.selected_tree_node_ids().is_empty());
}

#[test]
fn tree_ids_do_not_collide_across_models() {
    let Fixture {
        mut coordinator,
        recorded,
        ..
    } = fixture();

    coordinator.register_model("m2", hierarchy(), draw_ranges());
    coordinator.flush();

    let recorded = recorded.borrow();
    let first: Vec<u32> = recorded.tree(MODEL).unwrap().iter().map(|n| n.id).collect();
    let second = recorded.tree("m2").unwrap();
    assert_eq!(second.len(), 4);
    assert!(second.iter().all(|n| !first.contains(&n.id)));
}

#[test]
fn orphan_entries_do_not_share_ids_with_the_next_model() {
    let (mut coordinator, recorded) = recording(DrawRangeIndex::in_memory().unwrap());
    let with_orphan = Hierarchy::from([
        ("1".to_string(), HierarchyEntry::new("root", None)),
        ("2".to_string(), HierarchyEntry::new("child", Some("1"))),
        ("9".to_string(), HierarchyEntry::new("orphan", Some("99"))),
    ]);
    let next = Hierarchy::from([("1".to_string(), HierarchyEntry::new("root2", None))]);

    coordinator.register_model("m1", with_orphan, MeshDrawRanges::new());
    coordinator.register_model("m2", next, MeshDrawRanges::new());
    coordinator.flush();

    let orphan = coordinator
        .index()
        .get_node_id("m1", "9")
        .wait()
        .unwrap()
        .expect("orphans get a tree id");
    let recorded = recorded.borrow();
    assert_eq!(recorded.tree("m1").unwrap().len(), 2);
    assert_ne!(recorded.tree("m2").unwrap().id, orphan);
}

#[test]
fn clicks_select_while_the_index_is_busy() {
    let (open, backend) = GatedBackend::new();
    let index = DrawRangeIndex::spawn(Box::new(backend), &Options::default()).unwrap();
    let (mut coordinator, recorded) = recording(index);
    let beam = coordinator.scene_mut().add_mesh(common::beam());

    // The worker is stuck persisting the model, yet nothing here waits on it
    coordinator.register_model(MODEL, hierarchy(), draw_ranges());
    coordinator.handle_click(&click(CLICK_B));
    assert_eq!(selected(&coordinator, beam), ["B"]);
    assert_eq!(coordinator.poll(), 2);
    assert!(recorded.borrow().infos.is_empty());
    assert!(recorded.borrow().trees.is_empty());

    open.send(()).unwrap();
    coordinator.flush();
    assert_eq!(coordinator.poll(), 0);

    let recorded = recorded.borrow();
    let node_b = recorded
        .tree(MODEL)
        .unwrap()
        .iter()
        .find(|n| n.element_id == "B")
        .unwrap()
        .id;
    let info = recorded.infos.last().unwrap().as_ref().unwrap();
    assert_eq!(info.name.as_deref(), Some("Beam B"));
    assert_eq!(info.node_id, Some(node_b));
    assert_eq!(recorded.tree_selections.last(), Some(&vec![node_b]));
}

#[test]
fn a_newer_click_replaces_pending_info() {
    let (open, backend) = GatedBackend::new();
    let index = DrawRangeIndex::spawn(Box::new(backend), &Options::default()).unwrap();
    let (mut coordinator, recorded) = recording(index);
    let beam = coordinator.scene_mut().add_mesh(common::beam());
    let slab = coordinator.scene_mut().add_mesh(mesh_c());

    coordinator.register_model(MODEL, hierarchy(), draw_ranges());
    coordinator.handle_click(&click(CLICK_A));
    coordinator.handle_click(&shift_click(CLICK_C));
    assert_eq!(selected(&coordinator, beam), ["A"]);
    assert_eq!(selected(&coordinator, slab), ["C"]);

    open.send(()).unwrap();
    coordinator.flush();

    let recorded = recorded.borrow();
    assert_eq!(recorded.infos.len(), 1);
    let info = recorded.infos[0].as_ref().unwrap();
    assert_eq!(info.name.as_deref(), Some("Slab C"));
    assert_eq!(recorded.tree_selections.last().map(Vec::len), Some(2));
}
