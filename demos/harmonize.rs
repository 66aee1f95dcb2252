use env_logger::Env;
use noise::{NoiseFn, Perlin};
use street_grade::{
    core::{geometry::site::Site, heightmap::Heightmap},
    params::HarmonizeParams,
    pipeline::TerrainHarmonizer,
    road::definition::{ControlCurve, RoadDefinition},
    traits::TerrainFollowingEstimator,
};
use tiny_skia::{Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

fn octaved_perlin(perlin: &Perlin, x: f64, y: f64, octaves: usize, persistence: f64) -> f64 {
    let mut value = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = 1.0;
    let mut max_value = 0.0;

    for _ in 0..octaves {
        value += perlin.get([x * frequency, y * frequency]) * amplitude;
        max_value += amplitude;
        amplitude *= persistence;
        frequency *= 2.0;
    }

    value / max_value
}

fn curve(points: &[(f64, f64)]) -> ControlCurve {
    points.iter().map(|&(x, y)| Site::new(x, y)).collect()
}

fn ring(center: (f64, f64), radius: f64, points: usize) -> ControlCurve {
    (0..=points)
        .map(|i| {
            let angle = std::f64::consts::TAU * (i % points) as f64 / points as f64;
            Site::new(
                center.0 + radius * angle.cos(),
                center.1 + radius * angle.sin(),
            )
        })
        .collect()
}

fn roads() -> Vec<RoadDefinition> {
    vec![
        // highway crossing the map
        RoadDefinition::new(curve(&[
            (10.0, 250.0),
            (180.0, 210.0),
            (330.0, 260.0),
            (500.0, 230.0),
        ]))
        .half_width(6.0)
        .blend_distance(14.0)
        .priority(3),
        // local road ending on the highway
        RoadDefinition::new(curve(&[(200.0, 40.0), (210.0, 120.0), (190.0, 205.0)]))
            .priority(1),
        // local road crossing the highway
        RoadDefinition::new(curve(&[(380.0, 120.0), (360.0, 250.0), (400.0, 420.0)]))
            .priority(1),
        // roundabout with two connectors
        RoadDefinition::new(ring((120.0, 400.0), 30.0, 24)).priority(2),
        RoadDefinition::new(curve(&[(120.0, 370.0), (140.0, 300.0), (150.0, 225.0)]))
            .priority(1),
        RoadDefinition::new(curve(&[(10.0, 420.0), (60.0, 410.0), (90.0, 402.0)]))
            .priority(1),
        // dead end
        RoadDefinition::new(curve(&[(420.0, 60.0), (470.0, 110.0)])).half_width(3.0),
    ]
}

fn hillshade(heightmap: &Heightmap, col: usize, row: usize) -> f64 {
    let get = |c: usize, r: usize| {
        heightmap
            .get(c.min(heightmap.width() - 1), r.min(heightmap.height() - 1))
            .unwrap_or(0.0)
    };
    let cell = heightmap.cell_size();
    let dx = (get(col + 1, row) - get(col.saturating_sub(1), row)) / (2.0 * cell);
    let dy = (get(col, row + 1) - get(col, row.saturating_sub(1))) / (2.0 * cell);
    let normal = glam::DVec3::new(-dx, -dy, 1.0).normalize();
    let light = glam::DVec3::new(-1.0, -1.0, 1.5).normalize();
    normal.dot(light).clamp(0.0, 1.0)
}

fn write_to_image(heightmap: &Heightmap, roads: &[RoadDefinition], filename: &str) {
    let (width, height) = (heightmap.width() as u32, heightmap.height() as u32);
    let mut pixmap = Pixmap::new(width, height).unwrap();
    let mut paint = Paint::default();

    for row in 0..heightmap.height() {
        for col in 0..heightmap.width() {
            let shade = (hillshade(heightmap, col, row) * 255.0) as u8;
            paint.set_color_rgba8(shade, shade, shade, 255);
            pixmap.fill_rect(
                Rect::from_xywh(col as f32, row as f32, 1.0, 1.0).unwrap(),
                &paint,
                Transform::identity(),
                None,
            );
        }
    }

    paint.set_color_rgba8(200, 40, 40, 160);
    let stroke = Stroke {
        width: 1.0,
        ..Default::default()
    };
    let scale = 1.0 / heightmap.cell_size() as f32;
    for road in roads {
        let mut path = PathBuilder::new();
        for (i, site) in road.curve.points().iter().enumerate() {
            let (x, y) = (site.x as f32 * scale, site.y as f32 * scale);
            if i == 0 {
                path.move_to(x, y);
            } else {
                path.line_to(x, y);
            }
        }
        if let Some(path) = path.finish() {
            pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }
    }

    pixmap.save_png(filename).unwrap();
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let seed = 0;
    let (width, height, cell_size) = (512, 512, 1.0);
    let filename = "harmonize.png";

    let perlin = Perlin::new(seed);
    let mut heightmap = Heightmap::from_fn(width, height, cell_size, |site| {
        octaved_perlin(&perlin, site.x / 256.0, site.y / 256.0, 6, 0.5) * 40.0
    })
    .unwrap();

    let roads = roads();
    let params = HarmonizeParams::default().detection_radius(12.0);
    let outcome = TerrainHarmonizer::new(&params, &TerrainFollowingEstimator)
        .run(&mut heightmap, roads.clone())
        .unwrap();

    for (junction_type, count) in &outcome.summary.junctions {
        println!("{}: {}", junction_type.name(), count);
    }
    println!("Cells modified: {}", outcome.summary.cells_modified);

    println!("Writing to image...");
    write_to_image(&heightmap, &roads, filename);
}
