use anyhow::Context;
use log::LevelFilter;
use macroquad::prelude::*;
use macroquad_tmx::render::draw::{DrawLayer, MapRenderer};
use macroquad_tmx::{LoaderConfig, Logger, Map, MapLoader};

fn window_conf() -> Conf {
    Conf {
        window_title: "Basic Map".into(),
        window_width: 1280,
        window_height: 720,
        ..Default::default()
    }
}

fn load_map(path: &str) -> anyhow::Result<Map> {
    let mut loader = MapLoader::new(LoaderConfig {
        logger: Logger::new(LevelFilter::Info),
        ..LoaderConfig::default()
    })
    .with_search_path("assets");
    loader.load(path).with_context(|| format!("failed to load {path}"))
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "assets/map.tmx".into());
    let mut map = match load_map(&path) {
        Ok(map) => map,
        Err(e) => {
            log::error!("{e:#}");
            return;
        }
    };
    let renderer = MapRenderer::new(&map);

    let mut camera = Vec2::ZERO;
    let mut show_grid = false;

    loop {
        clear_background(BLACK);

        let speed = 400.0 * get_frame_time();
        if is_key_down(KeyCode::Left) {
            camera.x -= speed;
        }
        if is_key_down(KeyCode::Right) {
            camera.x += speed;
        }
        if is_key_down(KeyCode::Up) {
            camera.y -= speed;
        }
        if is_key_down(KeyCode::Down) {
            camera.y += speed;
        }
        if is_key_pressed(KeyCode::G) {
            show_grid = !show_grid;
        }

        let view = Rect::new(camera.x, camera.y, screen_width(), screen_height());
        set_camera(&Camera2D::from_display_rect(Rect::new(view.x, view.y + view.h, view.w, -view.h)));
        renderer.draw(&mut map, view, DrawLayer::All);
        renderer.draw_debug(&map, show_grid, false);
        set_default_camera();

        draw_text(&format!("FPS: {}", get_fps()), screen_width() - 135.0, 55.0, 30.0, RED);

        next_frame().await;
    }
}
