use std::{env, sync::Arc, thread, time::Instant};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal::delay::DelayNs;
use parking_lot::Mutex;
use tern_library_core::{
    app::{LibraryScreen, ScreenOutcome, Tab},
    config::LibraryConfig,
    framebuffer::{HEIGHT, WIDTH},
    input::ButtonState,
};

use crate::{
    display::{Frame, FrameDisplay, sample_buttons},
    documents::DesktopDocuments,
    storage::DesktopFs,
};

mod display;
mod documents;
mod storage;

type Screen = LibraryScreen<CriticalSectionRawMutex, DesktopFs, DesktopDocuments>;

struct ThreadDelay;

impl DelayNs for ThreadDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(std::time::Duration::from_nanos(ns as u64));
    }
}

struct Options {
    root: String,
    tab: Tab,
    start_path: Option<String>,
    clear_cache: bool,
}

fn usage() -> ! {
    eprintln!(
        "Usage: tern-library <library-root> [--tab recent|files|books] [--path /dir] [--clear-cache]"
    );
    std::process::exit(1);
}

fn parse_args() -> Options {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let mut root = None;
    let mut tab = Tab::Recent;
    let mut start_path = None;
    let mut clear_cache = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--tab" => {
                i += 1;
                tab = match args.get(i).map(String::as_str) {
                    Some("recent") => Tab::Recent,
                    Some("files") => Tab::Files,
                    Some("books") => Tab::Books,
                    _ => usage(),
                };
            }
            "--path" => {
                i += 1;
                match args.get(i) {
                    Some(path) if path.starts_with('/') => start_path = Some(path.clone()),
                    _ => usage(),
                }
            }
            "--clear-cache" => clear_cache = true,
            "-h" | "--help" => usage(),
            other if other.starts_with("--") => {
                eprintln!("Unknown option: {}", other);
                usage();
            }
            other => {
                if root.is_some() {
                    usage();
                }
                root = Some(other.to_string());
            }
        }
        i += 1;
    }

    let Some(root) = root else {
        usage();
    };
    Options {
        root,
        tab,
        start_path,
        clear_cache,
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = parse_args();
    let config = LibraryConfig::default();
    let documents = DesktopDocuments::new(&config.cover_dir);
    let screen: Screen = LibraryScreen::new(
        DesktopFs::new(&options.root),
        documents,
        config,
        options.tab,
    );

    if let Some(path) = &options.start_path {
        screen.sync().lock(|state| state.browser.set_base_path(path));
    }
    if options.clear_cache {
        let report = screen.clear_cache();
        log::info!(
            "Cover cache cleared: {} removed, {} failed",
            report.removed,
            report.failed
        );
    }
    screen.on_enter();

    // Portrait: the panel's long side is vertical.
    let (width, height) = (HEIGHT, WIDTH);
    let mut window = match minifb::Window::new(
        "Tern Library",
        width,
        height,
        minifb::WindowOptions::default(),
    ) {
        Ok(window) => window,
        Err(err) => {
            log::error!("Unable to open window: {}", err);
            std::process::exit(1);
        }
    };
    window.set_target_fps(60);

    let frame = Arc::new(Mutex::new(Frame::new(width, height)));
    log::info!("Library started on {}", options.root);

    thread::scope(|scope| {
        let worker = thread::Builder::new()
            .name("cover-worker".to_string())
            .spawn_scoped(scope, || futures::executor::block_on(screen.run_cover_worker(&mut ThreadDelay)));
        let renderer = thread::Builder::new()
            .name("render".to_string())
            .spawn_scoped(scope, || {
                let mut display = FrameDisplay::new(frame.clone());
                futures::executor::block_on(screen.run_render_loop(&mut display));
            });
        let (worker, renderer) = match (worker, renderer) {
            (Ok(worker), Ok(renderer)) => (worker, renderer),
            (worker, renderer) => {
                log::error!("Unable to start library threads");
                screen.on_exit();
                drop((worker, renderer));
                return;
            }
        };

        input_loop(&screen, &mut window, &frame);

        screen.on_exit();
        if worker.join().is_err() {
            log::error!("Cover worker panicked");
        }
        if renderer.join().is_err() {
            log::error!("Render thread panicked");
        }
    });

    let state = screen.into_state();
    log::info!(
        "Library closed with {} recent entries",
        state.recent.len()
    );
}

fn input_loop(screen: &Screen, window: &mut minifb::Window, frame: &Mutex<Frame>) {
    let mut buttons = ButtonState::new();
    let mut last_tick = Instant::now();
    let mut on_select = |path: &str, tab: Tab| {
        log::info!("Opening {} from the {} tab", path, tab.title());
    };

    while window.is_open() {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(last_tick).as_millis() as u32;
        last_tick = now;

        buttons.update(sample_buttons(window), elapsed_ms);
        if screen.handle_input(&buttons, &mut on_select) == ScreenOutcome::GoHome {
            log::info!("Leaving the library");
            break;
        }

        let mut frame = frame.lock();
        if frame.dirty {
            frame.dirty = false;
            if let Err(err) = window.update_with_buffer(&frame.pixels, frame.width, frame.height) {
                log::warn!("Window update failed: {}", err);
            }
        } else {
            drop(frame);
            window.update();
        }
    }
}
