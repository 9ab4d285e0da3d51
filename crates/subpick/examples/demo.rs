//! Demo showing click-driven selection on a batched model.
//!
//! Builds a row of beams merged into one mesh, registers the model's element
//! hierarchy and draw ranges, then replays a few clicks and prints what the
//! view would show. Run with `RUST_LOG=debug` to see the index traffic.

use subpick::*;

const BEAMS: u32 = 8;
const VIEWPORT: (u32, u32) = (800, 200);

/// Printing listener standing in for the object-info panel and tree view.
struct Console;

impl SelectionListener for Console {
    fn on_object_info(&mut self, info: Option<&ObjectInfo>) {
        match info {
            Some(info) => println!(
                "  picked {} (range {}, face {}) at ({:.3}, {:.3}, {:.3})",
                info.name.as_deref().unwrap_or("<unnamed>"),
                info.range_id.as_deref().unwrap_or("-"),
                info.index,
                info.coordinates.x,
                info.coordinates.y,
                info.coordinates.z
            ),
            None => println!("  picked nothing"),
        }
    }

    fn on_tree_selection(&mut self, node_ids: &[u32]) {
        println!("  tree selection: {node_ids:?}");
    }

    fn on_model_tree(&mut self, key: &str, root: &TreeNode) {
        println!("model '{key}': tree '{}' with {} nodes", root.name, root.len());
    }
}

/// Stands in for the render loop: poll once per frame until the index is idle.
fn run_frames(coordinator: &mut SelectionCoordinator) {
    let mut frames = 0;
    while coordinator.poll() > 0 {
        frames += 1;
        std::thread::sleep(std::time::Duration::from_millis(16));
    }
    if frames > 0 {
        println!("  ({frames} frame(s) until the index answered)");
    }
}

/// One quad per beam, in a row along X, each beam its own draw range.
fn batched_beams() -> (BatchedPickableMesh, Hierarchy, MeshDrawRanges) {
    let mut positions = Vec::new();
    let mut indices = Vec::new();
    let mut ranges = DrawRangeMap::new();
    let mut hierarchy = Hierarchy::new();
    hierarchy.insert("frame".to_string(), HierarchyEntry::new("Frame", None));

    for i in 0..BEAMS {
        let x0 = -2.0 + i as f32 * 0.5;
        let base = i * 4;
        positions.extend([
            Vec3::new(x0, -0.2, 0.0),
            Vec3::new(x0 + 0.4, -0.2, 0.0),
            Vec3::new(x0 + 0.4, 0.2, 0.0),
            Vec3::new(x0, 0.2, 0.0),
        ]);
        indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);

        let id = format!("beam-{i}");
        ranges.insert(id.clone(), Span::new(i * 6, 6));
        hierarchy.insert(id, HierarchyEntry::new(format!("Beam {}", i + 1), Some("frame")));
    }

    let mesh = BatchedPickableMesh::new(
        "beams",
        positions,
        indices,
        ranges.clone(),
        Material::new("steel", Vec4::new(0.7, 0.7, 0.72, 1.0)),
        Vec4::new(1.0, 0.55, 0.0, 1.0),
    )
    .with_model_key("frame#1");

    (mesh, hierarchy, MeshDrawRanges::from([("beams".to_string(), ranges)]))
}

fn main() -> Result<()> {
    init_logging();

    let options = Options {
        gpu_point_picking: false,
        ..Options::default()
    };
    let index = DrawRangeIndex::from_options(&options)?;
    let mut coordinator = SelectionCoordinator::new(Scene::new(options), index, VIEWPORT);
    coordinator.camera_mut().position = Vec3::new(0.0, 0.0, 4.0);
    coordinator.add_listener(Box::new(Console));

    let (mesh, hierarchy, draw_ranges) = batched_beams();
    coordinator.scene_mut().add_mesh(mesh);
    coordinator.register_model("frame#1", hierarchy, draw_ranges);
    run_frames(&mut coordinator);

    let clicks = [
        ("click", PointerEvent::click(330.0, 100.0)),
        ("shift-click", PointerEvent::shift_click(470.0, 100.0)),
        ("shift-click", PointerEvent::shift_click(330.0, 100.0)),
        ("click empty", PointerEvent::click(400.0, 10.0)),
    ];
    for (label, event) in clicks {
        println!("{label} at {}", event.position);
        coordinator.handle_click(&event);
        println!("  {} range(s) selected", coordinator.scene().selection.len());
        run_frames(&mut coordinator);
    }

    coordinator.select_by_names("frame#1", &["Beam 2".into(), "Beam 7".into()]);
    run_frames(&mut coordinator);
    let selected = coordinator.scene().selection.len();
    println!("selected {selected} beams by name; hiding them");
    coordinator.hide_selected();
    coordinator.show_all();

    Ok(())
}
