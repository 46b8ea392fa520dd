// tests/map_tests.rs

use macroquad::prelude::*;
use macroquad_tmx::physics::{BodyDef, BodyType, FixtureShape, PhysicsWorld};
use macroquad_tmx::{LayerKind, LoaderConfig, Logger, Map, MapError, MapLoader, ObjectRef, ObjectShape, Orientation};

fn load(xml: &str) -> Map {
    MapLoader::new(LoaderConfig {
        logger: Logger::silent(),
        ..LoaderConfig::default()
    })
    .load_from_str(xml)
    .expect("map should load")
}

const OBJECTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<map version="1.10" orientation="orthogonal" width="10" height="10" tilewidth="16" tileheight="16">
  <tileset firstgid="1" name="t" tilewidth="16" tileheight="16" tilecount="4" columns="2">
    <image source="missing.png" width="32" height="32"/>
  </tileset>
  <layer name="ground" width="10" height="10">
    <data encoding="csv">
1,1,1,1,1,1,1,1,1,1,
1,1,1,1,1,1,1,1,1,1,
1,1,1,1,1,1,1,1,1,1,
1,1,1,1,1,1,1,1,1,1,
1,1,1,1,1,1,1,1,1,1,
1,1,1,1,1,1,1,1,1,1,
1,1,1,1,1,1,1,1,1,1,
1,1,1,1,1,1,1,1,1,1,
1,1,1,1,1,1,1,1,1,1,
1,1,1,1,1,1,1,1,1,1
    </data>
  </layer>
  <objectgroup name="walls" opacity="0.5">
    <properties><property name="solid" type="bool" value="true"/></properties>
    <object id="1" name="box" x="0" y="0" width="10" height="10"/>
    <object id="2" name="far" x="120" y="120" width="20" height="20"/>
    <object id="3" name="ramp" x="40" y="0">
      <polygon points="0,0 40,0 40,20 20,20 20,40 0,40"/>
    </object>
    <object id="4" name="rail" x="0" y="100"><polyline points="0,0 50,0 50,30"/></object>
    <object id="5" name="coin" x="80" y="80" width="16" height="16"><ellipse/></object>
    <object id="6" name="bow" x="0" y="60"><polygon points="0,0 10,10 10,0 0,10"/></object>
    <object id="7" name="crate" gid="2" x="32" y="48"/>
  </objectgroup>
</map>"#;

fn find(map: &Map, name: &str) -> ObjectRef {
    for (li, layer) in map.layers().iter().enumerate() {
        if let Some(oi) = layer.objects().iter().position(|o| o.name == name) {
            return ObjectRef { layer: li, object: oi };
        }
    }
    panic!("no object named {name}");
}

#[test]
fn object_contains_points() {
    let map = load(OBJECTS);
    let layer = map.layer_by_name("walls").expect("walls");
    assert_eq!(layer.properties.get_bool("solid"), Some(true));

    let boxed = map.object(find(&map, "box")).expect("box");
    assert!(boxed.contains(vec2(5.0, 5.0)));
    assert!(!boxed.contains(vec2(15.0, 5.0)));

    let ramp = map.object(find(&map, "ramp")).expect("ramp");
    assert!(!ramp.convex());
    assert!(ramp.contains(vec2(45.0, 35.0)));
    assert!(!ramp.contains(vec2(75.0, 35.0)));

    let rail = map.object(find(&map, "rail")).expect("rail");
    assert_eq!(rail.shape, ObjectShape::Polyline);
    assert!(!rail.contains(vec2(40.0, 110.0)));
}

#[test]
fn hiding_a_layer_keeps_vertices_intact() {
    let mut map = load(OBJECTS);
    map.cull(Rect::new(0.0, 0.0, 160.0, 160.0));
    let before: Vec<_> = map.layers()[0].batches().map(|(t, v)| (t, v.to_vec())).collect();
    assert!(!before.is_empty());

    map.layers_mut()[0].visible = false;
    assert_eq!(map.layers()[0].batches().count(), 0);

    map.layers_mut()[0].visible = true;
    let after: Vec<_> = map.layers()[0].batches().map(|(t, v)| (t, v.to_vec())).collect();
    assert_eq!(before, after);
}

#[test]
fn object_layer_opacity_reaches_tile_objects() {
    let map = load(OBJECTS);
    let layer = map.layer_by_name("walls").expect("walls");
    let LayerKind::Objects { sets, colour, .. } = &layer.kind else {
        panic!("object layer expected");
    };
    assert_eq!(colour.a, 0.5);
    let verts: Vec<_> = sets.values().flat_map(|s| s.all_patches()).flatten().collect();
    assert_eq!(verts.len(), 4);
    assert!(verts.iter().all(|v| v.color.a == 0.5));
}

#[test]
fn index_queries_follow_moves() {
    let mut map = load(OBJECTS);
    let area = Rect::new(0.0, 0.0, 12.0, 12.0);
    assert!(matches!(map.query_index(area), Err(MapError::IndexUnavailable)));

    map.update_index(Rect::new(0.0, 0.0, 160.0, 160.0));
    assert!(map.index_available());
    let hits = map.query_index(area).expect("index");
    assert_eq!(hits, vec![find(&map, "box")]);
    assert!(!map.index_outline().is_empty());

    let far = find(&map, "far");
    map.move_object(far, vec2(-118.0, -118.0));
    assert!(!map.index_available());
    map.update_index(Rect::new(0.0, 0.0, 160.0, 160.0));
    let mut hits = map.query_index(area).expect("index");
    hits.sort();
    assert_eq!(hits, vec![find(&map, "box"), far]);
}

#[test]
fn tile_object_movement_waits_for_draw() {
    let mut map = load(OBJECTS);
    let r = find(&map, "crate");
    let handle = map.object(r).and_then(|o| o.quad()).expect("tile object quad");
    let quad_origin = |map: &Map| {
        map.layers()[handle.layer].sets().expect("sets")[&handle.texture]
            .quad_vertices(handle.quad)
            .expect("quad")[0]
            .position
    };
    assert_eq!(quad_origin(&map), vec2(32.0, 32.0));

    map.move_object(r, vec2(8.0, 0.0));
    assert_eq!(map.object(r).expect("crate").position, vec2(40.0, 32.0));
    assert_eq!(quad_origin(&map), vec2(32.0, 32.0));

    map.prepare_draw();
    assert_eq!(quad_origin(&map), vec2(40.0, 32.0));

    map.set_object_visible(r, false);
    map.prepare_draw();
    let set = &map.layers()[handle.layer].sets().expect("sets")[&handle.texture];
    assert!(set.quad_vertices(handle.quad).expect("quad").iter().all(|v| v.color.a == 0.0));
}

#[test]
fn isometric_objects_round_trip_through_projection() {
    let xml = r#"<map orientation="isometric" width="4" height="4" tilewidth="64" tileheight="32">
      <objectgroup name="o"><object name="a" x="32" y="0" width="32" height="32"/></objectgroup>
    </map>"#;
    let map = load(xml);
    assert_eq!(map.orientation(), Orientation::Isometric);
    let obj = &map.layers()[0].objects()[0];
    assert_eq!(obj.first_point(), vec2(32.0, 16.0));
    for p in obj.points() {
        let back = map.isometric_to_orthogonal(map.orthogonal_to_isometric(*p));
        assert!((back - *p).length() < 1e-3);
    }
    // the square becomes a diamond twice as wide as it is tall
    let b = obj.aabb();
    assert!((b.w - 2.0 * b.h).abs() < 1e-3, "{b:?}");
}

#[derive(Default)]
struct RecordingWorld {
    bodies: Vec<BodyDef>,
}

impl PhysicsWorld for RecordingWorld {
    type Body = usize;

    fn create_body(&mut self, def: BodyDef) -> usize {
        self.bodies.push(def);
        self.bodies.len() - 1
    }
}

#[test]
fn bodies_are_created_for_valid_objects_only() {
    let map = load(OBJECTS);
    let mut world = RecordingWorld::default();
    let bodies = map.create_bodies(&mut world, "walls", BodyType::Static);

    // the self-intersecting bow is skipped
    assert_eq!(bodies.len(), 6);
    assert_eq!(world.bodies.len(), 6);
    assert!(world.bodies.iter().all(|b| b.body_type == BodyType::Static));

    let shapes: Vec<_> = world.bodies.iter().map(|b| &b.shapes[0]).collect();
    assert!(matches!(shapes[0], FixtureShape::Box { .. }));
    assert!(matches!(shapes[3], FixtureShape::Chain(p) if p.len() == 3));
    assert!(matches!(shapes[4], FixtureShape::Circle { .. }));
    assert_eq!(world.bodies[2].shapes.len(), 2, "concave ramp is split in two");

    assert!(map.create_bodies(&mut world, "ground", BodyType::Static).is_empty());
    assert!(map.create_bodies(&mut world, "nope", BodyType::Static).is_empty());
}
