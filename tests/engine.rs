use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use scanvol::{
    Camera, CurveConfig, Interpolation, MaterialTable, MprEngine, PlaneConfig, PlaneKind,
    PlaneUpdate, Ray, RayTracer, RenderConfig, VolumeGrid, VolumeStore, WindowParams,
};

fn loaded_store(side: usize, value: f32) -> VolumeStore {
    let mut store = VolumeStore::new();
    store.load(VolumeGrid::uniform(side, value).expect("valid grid"));
    store
}

#[test]
fn full_study_workflow_produces_image_and_slices() {
    let store = loaded_store(16, 250.0);
    let materials = MaterialTable::default();

    let camera = Camera::look_at(
        Point3::new(8.0, 8.0, -30.0),
        Point3::new(8.0, 8.0, 8.0),
        Vector3::y(),
        50.0,
    )
    .expect("valid camera");
    let mut tracer = RayTracer::new(RenderConfig::default());
    let image = tracer
        .render_image(&store, &materials, 24, 24, &camera, None)
        .expect("valid camera geometry")
        .expect("render not cancelled");
    assert_eq!(image.dimensions(), (24, 24));
    assert!(tracer.metrics().rays_traced >= 24 * 24);

    let mut mpr = MprEngine::with_default_planes(&store);
    let window = WindowParams::new(250.0, 100.0);
    for id in mpr.plane_ids().collect::<Vec<_>>() {
        let slice = mpr
            .render_slice(&store, id, window)
            .expect("slice for loaded volume");
        assert_eq!(slice.plane_id, id);
        assert!(slice.image.pixels().all(|p| p.0[0] >= 0.0 && p.0[0] <= 1.0));
    }
}

#[test]
fn empty_store_yields_background_image_and_no_slices() {
    let store = VolumeStore::new();
    let materials = MaterialTable::default();
    let camera = Camera::look_at(
        Point3::new(0.0, 0.0, -5.0),
        Point3::origin(),
        Vector3::y(),
        45.0,
    )
    .expect("valid camera");

    let mut tracer = RayTracer::new(RenderConfig::default());
    let image = tracer
        .render_image(&store, &materials, 10, 6, &camera, None)
        .expect("valid camera geometry")
        .expect("render not cancelled");
    let background = tracer.config().background;
    assert!(image.pixels().all(|p| p.0 == background));

    let mpr = MprEngine::with_default_planes(&store);
    assert_eq!(mpr.plane_ids().count(), 0);
    let mut standalone = MprEngine::new();
    let id = standalone
        .create_plane(PlaneConfig::axis_aligned(
            PlaneKind::Axial,
            Point3::origin(),
            8,
            8,
        ))
        .expect("valid plane");
    assert!(standalone
        .render_slice(&store, id, WindowParams::new(0.0, 1.0))
        .is_none());
}

#[test]
fn rays_that_never_enter_a_volume_stay_background() {
    let store = loaded_store(8, 100.0);
    let materials = MaterialTable::default();
    let tracer = RayTracer::new(RenderConfig::default());

    let outside = Ray::new(Point3::new(50.0, 50.0, 50.0), Vector3::x());
    let traced = tracer.trace_ray(&store, &materials, outside);
    assert_eq!(traced.color, tracer.config().background);

    let inverted = Ray::new(Point3::new(4.0, 4.0, -2.0), Vector3::z()).with_range(9.0, 2.0);
    let traced = tracer.trace_ray(&store, &materials, inverted);
    assert!(traced.depth.is_infinite());
    assert!(traced.normal.is_none());
}

#[test]
fn windowing_pipeline_is_stable_across_repeated_application() {
    let params = WindowParams::new(40.0, 400.0).with_rescale(1.0, -1024.0);
    for raw in [0.0, 512.0, 1024.0, 4095.0] {
        let once = params.apply(raw);
        let twice = params.apply(raw);
        assert_eq!(once, twice);
        assert!((0.0..=1.0).contains(&once));
    }
}

#[test]
fn interpolation_kernels_agree_on_uniform_volumes() {
    let store = loaded_store(8, 77.0);
    let mut engine = MprEngine::new();
    let window = WindowParams::new(77.0, 1.0);

    for kernel in [
        Interpolation::Nearest,
        Interpolation::Trilinear,
        Interpolation::Tricubic,
        Interpolation::AntialiasedLinear,
    ] {
        let mut config = PlaneConfig::axis_aligned(
            PlaneKind::Axial,
            Point3::new(4.0, 4.0, 4.0),
            6,
            6,
        );
        config.interpolation = kernel;
        let id = engine.create_plane(config).expect("valid plane");
        let slice = engine
            .render_slice(&store, id, window)
            .expect("slice for loaded volume");
        for pixel in slice.image.pixels() {
            assert_relative_eq!(pixel.0[0], 0.5, epsilon = 1e-3);
        }
    }
}

#[test]
fn plane_reorientation_changes_the_reconstruction() {
    let mut store = VolumeStore::new();
    store.load(VolumeGrid::gradient_x(16, 0.0, 1000.0).expect("valid grid"));
    let mut engine = MprEngine::with_default_planes(&store);
    let axial = engine
        .plane_ids()
        .find(|id| engine.plane(*id).unwrap().kind() == PlaneKind::Axial)
        .expect("axial default plane");
    let window = WindowParams::new(500.0, 1000.0);

    let before = engine
        .render_slice(&store, axial, window)
        .expect("axial slice");
    // An axial slice of an x-gradient varies across each row.
    let row: Vec<f32> = (0..16).map(|x| before.image.get_pixel(x, 8).0[0]).collect();
    assert!(row.windows(2).any(|w| (w[1] - w[0]).abs() > 1e-3));

    // Reorient to sagittal geometry: the gradient axis is now the plane
    // normal, so each reconstructed slice is constant.
    engine
        .update_plane(
            axial,
            PlaneUpdate {
                normal: Some(Vector3::x()),
                up: Some(Vector3::z()),
                ..PlaneUpdate::default()
            },
        )
        .expect("valid reorientation");
    let after = engine
        .render_slice(&store, axial, window)
        .expect("sagittal slice");
    let values: Vec<f32> = after
        .image
        .pixels()
        .filter(|p| p.0[1] > 0.0)
        .map(|p| p.0[0])
        .collect();
    assert!(!values.is_empty());
    let first = values[0];
    assert!(values.iter().all(|v| (v - first).abs() < 1e-3));
}

#[test]
fn curved_reformation_tracks_a_bent_path() {
    let store = loaded_store(16, 300.0);
    let mut engine = MprEngine::with_default_planes(&store);
    let id = engine
        .create_curved_reformation(CurveConfig {
            control_points: vec![
                Point3::new(2.0, 2.0, 8.0),
                Point3::new(8.0, 8.0, 8.0),
                Point3::new(14.0, 2.0, 8.0),
            ],
            segments_per_span: 10,
            output_height: 8,
            sample_spacing: 0.5,
            ..CurveConfig::default()
        })
        .expect("valid curve");

    let image = engine
        .render_curved_reformation(&store, id, WindowParams::new(300.0, 1.0))
        .expect("reformation for loaded volume");
    assert_eq!(image.dimensions(), (21, 8));
    // The whole path lies inside the uniform cube: every sample mid-window.
    for pixel in image.pixels() {
        assert_relative_eq!(pixel.0[0], 0.5, epsilon = 1e-4);
        assert_relative_eq!(pixel.0[1], 1.0);
    }
}

#[test]
fn store_windowing_override_survives_engine_reads() {
    let mut store = loaded_store(8, 50.0);
    let id = store.iter().next().expect("loaded volume").0;
    assert!(store.set_windowing(id, 400.0, 40.0));

    // Engines read through the store without disturbing the override.
    let mut engine = MprEngine::with_default_planes(&store);
    let plane = engine.plane_ids().next().expect("default plane");
    engine
        .render_slice(&store, plane, WindowParams::new(40.0, 400.0))
        .expect("slice for loaded volume");
    assert_eq!(store.windowing(id), Some((400.0, 40.0)));
}
