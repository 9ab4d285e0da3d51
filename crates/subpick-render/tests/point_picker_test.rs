//! GPU point picking tests.
//!
//! These need a GPU adapter (real or software fallback). Without one they
//! print a note and return early.

use pollster::FutureExt;
use subpick_core::{PointCloud, PointMaterial, Registry, Vec3};
use subpick_render::{Camera, GpuContext, GpuPointPicker};

const VIEWPORT: (u32, u32) = (64, 64);

fn material(size: f32) -> PointMaterial {
    PointMaterial {
        size,
        ..PointMaterial::default()
    }
}

#[test]
fn headless_point_picking() {
    let gpu = match GpuContext::new_headless().block_on() {
        Ok(gpu) => gpu,
        Err(e) => {
            eprintln!("Skipping point picking tests: no GPU adapter available ({e})");
            return;
        }
    };
    let camera = Camera::new(1.0);

    // --- Nearest point wins ---
    {
        let mut registry = Registry::new();
        let front = registry
            .add_points(PointCloud::new("front", vec![Vec3::ZERO]).with_material(material(20.0)));
        let back = registry.add_points(
            PointCloud::new("back", vec![Vec3::new(0.0, 0.0, -1.0)]).with_material(material(20.0)),
        );

        let mut picker = GpuPointPicker::new(&gpu.device, &gpu.queue);
        picker.sync(&mut registry);
        assert!(picker.is_registered(front) && picker.is_registered(back));

        let hit = picker
            .pick_at(&camera, &registry, VIEWPORT, 32, 32)
            .expect("center pixel should hit a point");
        assert_eq!(hit.points, front);
        assert_eq!(hit.index, 0);
        assert!(hit.world_position.length() < 1e-5);

        // Corner is background
        assert!(picker.pick_at(&camera, &registry, VIEWPORT, 2, 2).is_none());

        // Out of bounds
        assert!(picker.pick_at(&camera, &registry, VIEWPORT, 64, 10).is_none());

        // Removing the front cloud exposes the one behind it
        registry.remove_points(front);
        picker.sync(&mut registry);
        let hit = picker.pick_at(&camera, &registry, VIEWPORT, 32, 32).unwrap();
        assert_eq!(hit.points, back);
    }

    // --- Morphed positions are what gets picked ---
    {
        let mut registry = Registry::new();
        let mut cloud = PointCloud::new(
            "nodes",
            vec![Vec3::new(-0.8, 0.0, 0.0), Vec3::new(0.8, 0.0, 0.0)],
        )
        .with_material(material(12.0));
        cloud.add_morph_target("collapse", vec![Vec3::ZERO, Vec3::new(-0.8, 0.0, 0.0)]);
        cloud.set_morph_influence(0, 1.0);
        let id = registry.add_points(cloud);

        let mut picker = GpuPointPicker::new(&gpu.device, &gpu.queue);
        picker.sync(&mut registry);
        let hit = picker.pick_at(&camera, &registry, VIEWPORT, 32, 32).unwrap();
        assert_eq!((hit.points, hit.index), (id, 1));
        assert!(hit.world_position.length() < 1e-5);
    }

    // --- Viewport resize recreates the target ---
    {
        let mut registry = Registry::new();
        registry.add_points(PointCloud::new("p", vec![Vec3::ZERO]).with_material(material(8.0)));
        let mut picker = GpuPointPicker::new(&gpu.device, &gpu.queue);
        picker.sync(&mut registry);
        assert!(picker.pick_at(&camera, &registry, (64, 64), 32, 32).is_some());
        assert!(picker.pick_at(&camera, &registry, (128, 128), 64, 64).is_some());
    }
}
