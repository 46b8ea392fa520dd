use log::LevelFilter;
use macroquad::prelude::*;
use macroquad_tmx::physics::{BodyDef, BodyType, PhysicsWorld};
use macroquad_tmx::render::draw::{DrawLayer, MapRenderer};
use macroquad_tmx::{LoaderConfig, Logger, MapLoader};

fn window_conf() -> Conf {
    Conf {
        window_title: "Objects Example".into(),
        window_width: 1280,
        window_height: 720,
        ..Default::default()
    }
}

/// Counts what a physics engine would have been asked to build.
#[derive(Default)]
struct CountingWorld {
    fixtures: usize,
}

impl PhysicsWorld for CountingWorld {
    type Body = BodyDef;

    fn create_body(&mut self, def: BodyDef) -> BodyDef {
        self.fixtures += def.shapes.len();
        def
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "assets/map.tmx".into());
    let layer = std::env::args().nth(2).unwrap_or_else(|| "collision".into());
    let mut map = match MapLoader::new(LoaderConfig {
        logger: Logger::new(LevelFilter::Debug),
        ..LoaderConfig::default()
    })
    .load(&path)
    {
        Ok(map) => map,
        Err(e) => {
            log::error!("failed to load {path}: {e}");
            return;
        }
    };

    let mut world = CountingWorld::default();
    let bodies = map.create_bodies(&mut world, &layer, BodyType::Static);
    println!("bodies={} fixtures={}", bodies.len(), world.fixtures);

    let renderer = MapRenderer::new(&map);
    let view = Rect::new(0.0, 0.0, screen_width(), screen_height());
    map.update_index(view);

    loop {
        clear_background(BLACK);
        renderer.draw(&mut map, view, DrawLayer::Debug);
        renderer.draw_debug(&map, false, true);

        let (mx, my) = mouse_position();
        let probe = Rect::new(mx - 8.0, my - 8.0, 16.0, 16.0);
        let hits = map.query_index(probe).unwrap_or_default();
        for r in &hits {
            if let Some(obj) = map.object(*r).filter(|o| o.contains(vec2(mx, my))) {
                let b = obj.aabb();
                draw_rectangle_lines(b.x, b.y, b.w, b.h, 2.0, YELLOW);
                draw_text(&obj.name, b.x, b.y - 4.0, 20.0, YELLOW);
            }
        }
        draw_rectangle_lines(probe.x, probe.y, probe.w, probe.h, 1.0, RED);

        draw_text("objects example", 20.0, 30.0, 32.0, WHITE);
        next_frame().await;
    }
}
