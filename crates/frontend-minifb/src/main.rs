//! savekeep frontend.
//!
//! Drives a [`Session`] around the bundled demo core in one of two modes:
//!
//! - **GUI mode** (default): scaled minifb window with save-state hotkeys.
//! - **Headless mode** (`--headless`): scripted frames for automated runs;
//!   prints notices as they happen and the slot table at the end.
//!
//! ## GUI keys
//!
//! | Key    | Action                         |
//! |--------|--------------------------------|
//! | Arrows | move the cursor                |
//! | F5     | quick save                     |
//! | F9     | quick load                     |
//! | P      | open/close the pause menu      |
//! | R      | restart                        |
//! | G      | new general save               |
//! | L      | load the newest general save   |
//! | B      | simulate app backgrounding     |
//! | J      | enable JIT                     |
//! | Esc    | quit                           |

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use minifb::{Key, KeyRepeat, Scale, ScaleMode, Window, WindowOptions};

use savekeep_core::demo::{BUTTON_DOWN, BUTTON_LEFT, BUTTON_RIGHT, BUTTON_UP, SCREEN_HEIGHT, SCREEN_WIDTH};
use savekeep_core::slot::format_timestamp;
use savekeep_core::{
    Config, CoreCapabilities, DeepLink, DemoCore, GameRef, Session, SlotKind, SystemClock,
};

const FRAME_TIME: Duration = Duration::from_nanos(16_666_667);
/// Frames the scripted pause menu stays open in headless mode.
const PAUSE_MENU_FRAMES: usize = 30;

#[derive(Parser, Debug)]
#[command(name = "savekeep", version, about = "Save-state lifecycle demo for an emulator front-end")]
struct Args {
    /// Game name; slots are stored per game
    game: String,

    /// TOML configuration file
    #[arg(long, default_value = "savekeep.toml")]
    config: PathBuf,

    /// Run without a window
    #[arg(long)]
    headless: bool,

    /// Frames to run in headless mode
    #[arg(long, default_value_t = 600)]
    frames: usize,

    /// Quick save on this frame (headless)
    #[arg(long)]
    quick_save_at: Option<usize>,

    /// Quick load on this frame (headless)
    #[arg(long)]
    quick_load_at: Option<usize>,

    /// Open the pause menu on this frame (headless)
    #[arg(long)]
    pause_at: Option<usize>,

    /// Resume from this state file, as if opened through a deep link
    #[arg(long)]
    deep_link: Option<PathBuf>,

    /// Enable rewind snapshots regardless of the config file
    #[arg(long)]
    rewind: bool,

    /// Window scale factor
    #[arg(long, default_value_t = 8)]
    scale: usize,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Config {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    if args.rewind {
        config.rewind.enabled = true;
    }

    let caps = CoreCapabilities { live_snapshot: true, jit_toggle: true, ..CoreCapabilities::default() };
    let core = DemoCore::new("demo").with_capabilities(caps);
    let mut session = match Session::new(config, Box::new(core), Arc::new(SystemClock)) {
        Ok(session) => session,
        Err(e) => {
            log::error!("Cannot open save-state store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let game = GameRef::new(slug(&args.game), args.game.clone());
    session.set_game(game.clone());
    session.start();
    if let Some(path) = &args.deep_link {
        session.deep_link(DeepLink { game, save_state: Some(path.clone()) });
    }

    let result = if args.headless {
        run_headless(&args, &mut session);
        Ok(())
    } else {
        run_gui(&args, &mut session)
    };

    // Leaving the app counts as backgrounding it
    session.did_enter_background();
    session.flush();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Window: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn slug(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

// ─── GUI Mode ───────────────────────────────────────────────────────────────

fn run_gui(args: &Args, session: &mut Session) -> Result<(), minifb::Error> {
    let scale = args.scale.clamp(1, 16);
    let (w, h) = (SCREEN_WIDTH * scale, SCREEN_HEIGHT * scale);
    let mut window = Window::new(
        "savekeep",
        w,
        h,
        WindowOptions {
            scale: Scale::X1,
            scale_mode: ScaleMode::AspectRatioStretch,
            resize: true,
            ..Default::default()
        },
    )?;
    window.set_target_fps(60);

    let mut buf = vec![0u32; w * h];
    let mut last_notice = String::new();

    while window.is_open() && !window.is_key_down(Key::Escape) {
        let pressed = |key| window.is_key_pressed(key, KeyRepeat::No);
        if pressed(Key::F5) { session.perform_quick_save(); }
        if pressed(Key::F9) { session.perform_quick_load(); }
        if pressed(Key::R) { session.perform_restart(); }
        if pressed(Key::G) { session.request_save(SlotKind::General, None); }
        if pressed(Key::L) {
            if let Some(newest) = session.slots(SlotKind::General).last() {
                session.request_load(newest.id);
            }
        }
        if pressed(Key::B) { session.did_enter_background(); }
        if pressed(Key::J) { session.enable_jit(); }
        if pressed(Key::P) {
            if session.is_in_pause_menu() {
                session.leave_pause_menu();
            } else {
                session.enter_pause_menu();
            }
        }

        let mut buttons = 0;
        if window.is_key_down(Key::Up) { buttons |= BUTTON_UP; }
        if window.is_key_down(Key::Down) { buttons |= BUTTON_DOWN; }
        if window.is_key_down(Key::Left) { buttons |= BUTTON_LEFT; }
        if window.is_key_down(Key::Right) { buttons |= BUTTON_RIGHT; }
        session.set_input(buttons);

        session.run_frame();
        session.poll(Instant::now());

        for notice in session.notices().try_iter() {
            last_notice = notice.to_string();
        }
        let paused = if session.is_in_pause_menu() { " [paused]" } else { "" };
        window.set_title(&format!("savekeep - {}{} {}", args.game, paused, last_notice));

        if let Some(frame) = session.bridge().core().frame_snapshot() {
            scale_into(&frame.rgba, scale, &mut buf);
        }
        window.update_with_buffer(&buf, w, h)?;
    }
    Ok(())
}

/// Nearest-neighbour upscale of the RGBA screen into a 0RGB window buffer.
fn scale_into(rgba: &[u8], scale: usize, out: &mut [u32]) {
    let row = SCREEN_WIDTH * scale;
    for (y, line) in out.chunks_mut(row).enumerate() {
        let sy = y / scale;
        for (x, px) in line.iter_mut().enumerate() {
            let i = (sy * SCREEN_WIDTH + x / scale) * 4;
            if let Some(p) = rgba.get(i..i + 3) {
                *px = (p[0] as u32) << 16 | (p[1] as u32) << 8 | p[2] as u32;
            }
        }
    }
}

// ─── Headless Mode ──────────────────────────────────────────────────────────

fn run_headless(args: &Args, session: &mut Session) {
    let t0 = Instant::now();
    let leave_pause_at = args.pause_at.map(|f| f + PAUSE_MENU_FRAMES);

    for frame in 0..args.frames {
        if args.quick_save_at == Some(frame) { session.perform_quick_save(); }
        if args.quick_load_at == Some(frame) { session.perform_quick_load(); }
        if args.pause_at == Some(frame) { session.enter_pause_menu(); }
        if leave_pause_at == Some(frame) { session.leave_pause_menu(); }

        session.run_frame();
        // Simulated time keeps rewind ticks independent of host speed
        session.poll(t0 + FRAME_TIME * (frame as u32 + 1));

        for notice in session.notices().try_iter() {
            println!("[frame {:>5}] {}", frame, notice);
        }
    }
    session.flush();
    print_slots(session);
}

fn print_slots(session: &Session) {
    let kinds = [
        SlotKind::Auto, SlotKind::Quick, SlotKind::Pause,
        SlotKind::Rewind, SlotKind::General, SlotKind::Locked,
    ];
    println!("{:<8} {:>5}  {:<20} {:<8} {}", "kind", "id", "name", "core", "modified");
    for kind in kinds {
        for slot in session.slots(kind) {
            println!(
                "{:<8} {:>5}  {:<20} {:<8} {}",
                kind.label(),
                slot.id.to_string(),
                slot.name.as_deref().unwrap_or("-"),
                slot.core_id.as_deref().unwrap_or("-"),
                format_timestamp(slot.modified),
            );
        }
    }
}
