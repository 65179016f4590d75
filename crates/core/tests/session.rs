use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use savekeep_core::config::RewindConfig;
use savekeep_core::{
    Clock, Config, CoreCapabilities, CoreError, DeepLink, DemoCore, EmulatorCore, Frame, GameRef,
    ManualClock, Notice, RunState, Session, SlotId, SlotKind,
};

const EPOCH_SECS: u64 = 1_700_000_000;

fn config(dir: &Path) -> Config {
    Config { save_root: dir.to_path_buf(), prune_delay_ms: 0, ..Config::default() }
}

fn game() -> GameRef {
    GameRef::new("tetris-dx", "Tetris DX")
}

fn running_session(config: Config, core: Box<dyn EmulatorCore>) -> (Session, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_at(EPOCH_SECS));
    let mut session = Session::new(config, core, clock.clone()).unwrap();
    session.set_game(game());
    session.start();
    session.poll(Instant::now());
    (session, clock)
}

fn run(session: &mut Session, clock: &ManualClock, frames: usize) {
    for _ in 0..frames {
        session.run_frame();
    }
    clock.advance(Duration::from_secs(1));
}

/// Snapshot of a fresh demo core after `frames` frames.
fn demo_frame_after(frames: usize) -> Frame {
    let mut core = DemoCore::new("demo");
    core.start();
    for _ in 0..frames {
        core.run_frame();
    }
    core.frame_snapshot().unwrap()
}

fn temp_files(dir: &Path) -> usize {
    fs::read_dir(dir.join(".tmp")).unwrap().count()
}

/// Records the size of every file the core is asked to load.
struct SpyCore {
    inner: DemoCore,
    loaded_sizes: Arc<Mutex<Vec<u64>>>,
}

impl EmulatorCore for SpyCore {
    fn identifier(&self) -> &str { self.inner.identifier() }
    fn state(&self) -> RunState { self.inner.state() }
    fn start(&mut self) { self.inner.start() }
    fn stop(&mut self) { self.inner.stop() }
    fn pause(&mut self) { self.inner.pause() }
    fn resume(&mut self) -> bool { self.inner.resume() }
    fn save_state(&mut self, path: &Path) -> Result<(), CoreError> { self.inner.save_state(path) }
    fn load_state(&mut self, path: &Path) -> Result<(), CoreError> {
        let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        self.loaded_sizes.lock().unwrap().push(size);
        self.inner.load_state(path)
    }
    fn frame_snapshot(&self) -> Option<Frame> { self.inner.frame_snapshot() }
    fn run_frame(&mut self) { self.inner.run_frame() }
    fn capabilities(&self) -> CoreCapabilities { self.inner.capabilities() }
}

#[test]
fn repeated_pause_menu_entries_keep_one_pause_file() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, clock) = running_session(config(dir.path()), Box::new(DemoCore::new("demo")));
    run(&mut session, &clock, 10);

    for _ in 0..5 {
        session.enter_pause_menu();
        assert_eq!(temp_files(dir.path()), 1);
    }
    session.leave_pause_menu();
    assert_eq!(temp_files(dir.path()), 0);
    assert_eq!(session.bridge().state(), RunState::Running);
}

#[test]
fn auto_slots_never_exceed_two() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, clock) = running_session(config(dir.path()), Box::new(DemoCore::new("demo")));

    for i in 0..6 {
        run(&mut session, &clock, 3);
        let before = session.slots(SlotKind::Auto);
        assert!(session.did_enter_background());
        let after = session.slots(SlotKind::Auto);
        assert!(after.len() <= 2);
        if i >= 2 {
            // The previous oldest is the one refreshed
            assert_eq!(after.last().unwrap().id, before[0].id);
        }
    }
}

#[test]
fn auto_save_scenarios() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, clock) = running_session(config(dir.path()), Box::new(DemoCore::new("demo")));

    session.did_enter_background();
    run(&mut session, &clock, 2);

    // One existing auto slot: a second is created
    session.did_enter_background();
    let autos = session.slots(SlotKind::Auto);
    assert_eq!(autos.len(), 2);
    assert_eq!(autos[1].modified, clock.now());

    // Third trigger: the older one is overwritten and re-created
    run(&mut session, &clock, 2);
    let older = autos[0].clone();
    session.did_enter_background();
    let autos = session.slots(SlotKind::Auto);
    assert_eq!(autos.len(), 2);
    let refreshed = autos.iter().find(|s| s.id == older.id).unwrap();
    assert_eq!(refreshed.modified, clock.now());
    assert_eq!(refreshed.created, refreshed.modified);
    assert!(refreshed.modified > older.modified);
}

fn rewind_config(dir: &Path, max_states: usize) -> Config {
    Config {
        rewind: RewindConfig { enabled: true, interval_secs: 1, max_states, keep_states: false },
        ..config(dir)
    }
}

/// Run `ticks` rewind intervals, one simulated second each.
fn rewind_ticks(session: &mut Session, clock: &ManualClock, t0: Instant, ticks: u64) {
    for k in 1..=ticks {
        run(session, clock, 4);
        session.poll(t0 + Duration::from_secs(k));
    }
}

#[test]
fn rewind_retention_keeps_newest_ticks() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_at(EPOCH_SECS));
    let mut session = Session::new(rewind_config(dir.path(), 3), Box::new(DemoCore::new("demo")), clock.clone()).unwrap();
    session.set_game(game());
    session.start();
    let t0 = Instant::now();
    session.poll(t0);

    rewind_ticks(&mut session, &clock, t0, 5);
    session.flush();

    let ids: Vec<SlotId> = session.slots(SlotKind::Rewind).iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![SlotId(3), SlotId(4), SlotId(5)]);
}

#[test]
fn loading_rewind_slot_truncates_timeline() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_at(EPOCH_SECS));
    let mut session = Session::new(rewind_config(dir.path(), 10), Box::new(DemoCore::new("demo")), clock.clone()).unwrap();
    session.set_game(game());
    session.start();
    let t0 = Instant::now();
    session.poll(t0);

    rewind_ticks(&mut session, &clock, t0, 5);
    let rewinds = session.slots(SlotKind::Rewind);
    assert_eq!(rewinds.len(), 5);
    let target = rewinds[2].clone();

    assert!(session.request_load(target.id));
    session.flush();

    let left = session.slots(SlotKind::Rewind);
    assert_eq!(left.len(), 2);
    assert!(left.iter().all(|s| s.created < target.created));
    assert_eq!(session.bridge().core().frame_snapshot().unwrap(), demo_frame_after(12));
    assert_eq!(session.notices().try_recv().unwrap(), Notice::RewoundTo(target.display_name()));
}

#[test]
fn failed_rewind_load_still_truncates_timeline() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_at(EPOCH_SECS));
    let mut session = Session::new(rewind_config(dir.path(), 10), Box::new(DemoCore::new("demo")), clock.clone()).unwrap();
    session.set_game(game());
    session.start();
    let t0 = Instant::now();
    session.poll(t0);

    rewind_ticks(&mut session, &clock, t0, 5);
    let target = session.slots(SlotKind::Rewind)[2].clone();
    let path = session.coordinator().store().state_path(&game(), target.id).unwrap();
    fs::write(&path, b"not a save state").unwrap();
    let before = session.bridge().core().frame_snapshot();

    assert!(!session.request_load(target.id));
    session.flush();

    let left = session.slots(SlotKind::Rewind);
    assert_eq!(left.len(), 2);
    assert!(left.iter().all(|s| s.created < target.created));
    assert_eq!(session.bridge().core().frame_snapshot(), before);
    assert_eq!(session.bridge().state(), RunState::Running);
}

#[test]
fn missing_rewind_blob_still_truncates_timeline() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_at(EPOCH_SECS));
    let mut session = Session::new(rewind_config(dir.path(), 10), Box::new(DemoCore::new("demo")), clock.clone()).unwrap();
    session.set_game(game());
    session.start();
    let t0 = Instant::now();
    session.poll(t0);

    rewind_ticks(&mut session, &clock, t0, 4);
    let target = session.slots(SlotKind::Rewind)[1].clone();
    fs::remove_file(session.coordinator().store().state_path(&game(), target.id).unwrap()).unwrap();

    assert!(!session.request_load(target.id));
    session.flush();
    let left = session.slots(SlotKind::Rewind);
    assert_eq!(left.len(), 1);
    assert!(left[0].created < target.created);
}

#[test]
fn loading_other_kinds_clears_rewind_history() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_at(EPOCH_SECS));
    let mut session = Session::new(rewind_config(dir.path(), 10), Box::new(DemoCore::new("demo")), clock.clone()).unwrap();
    session.set_game(game());
    session.start();
    let t0 = Instant::now();
    session.poll(t0);

    assert!(session.perform_quick_save());
    rewind_ticks(&mut session, &clock, t0, 3);
    assert!(session.perform_quick_load());
    session.flush();
    assert!(session.slots(SlotKind::Rewind).is_empty());
}

#[test]
fn auto_slot_load_never_reads_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let sizes = Arc::new(Mutex::new(Vec::new()));
    let core = SpyCore { inner: DemoCore::new("demo"), loaded_sizes: sizes.clone() };
    let (mut session, clock) = running_session(config(dir.path()), Box::new(core));

    run(&mut session, &clock, 5);
    session.did_enter_background();
    run(&mut session, &clock, 5);
    session.did_enter_background();
    run(&mut session, &clock, 5);

    // Loading the oldest: the safety auto-save overwrites the very slot
    let oldest = session.slots(SlotKind::Auto)[0].id;
    assert!(session.request_load(oldest));
    assert_eq!(session.bridge().core().frame_snapshot().unwrap(), demo_frame_after(5));

    // Loading the newest: its file is moved aside and put back
    run(&mut session, &clock, 1);
    let autos = session.slots(SlotKind::Auto);
    assert_eq!(autos.len(), 2);
    let newest = autos[1].id;
    assert!(session.request_load(newest));

    let sizes = sizes.lock().unwrap();
    assert_eq!(sizes.len(), 2);
    assert!(sizes.iter().all(|&n| n > 0));
    for slot in session.slots(SlotKind::Auto) {
        let path = session.coordinator().store().state_path(&game(), slot.id).unwrap();
        assert!(fs::metadata(path).unwrap().len() > 0);
    }
    assert_eq!(temp_files(dir.path()), 0);
}

#[test]
fn save_and_load_preserve_run_state() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, clock) = running_session(config(dir.path()), Box::new(DemoCore::new("demo")));
    run(&mut session, &clock, 8);

    assert!(session.perform_quick_save());
    assert_eq!(session.bridge().state(), RunState::Running);
    assert!(session.perform_quick_load());
    assert_eq!(session.bridge().state(), RunState::Running);
    let id = session.request_save(SlotKind::General, Some("Boss".into())).unwrap();
    assert_eq!(session.bridge().state(), RunState::Running);

    session.enter_pause_menu();
    assert!(session.perform_quick_save());
    assert_eq!(session.bridge().state(), RunState::Paused);
    assert!(session.request_load(id));
    assert_eq!(session.bridge().state(), RunState::Paused);
    assert!(session.request_save_into(id));
    assert_eq!(session.bridge().state(), RunState::Paused);
}

#[test]
fn missing_quick_blob_is_a_quiet_noop() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, clock) = running_session(config(dir.path()), Box::new(DemoCore::new("demo")));
    run(&mut session, &clock, 4);
    assert!(session.perform_quick_save());
    assert_eq!(session.notices().try_recv().unwrap(), Notice::QuickSaved);

    let quick = session.slots(SlotKind::Quick)[0].id;
    fs::remove_file(session.coordinator().store().state_path(&game(), quick).unwrap()).unwrap();
    run(&mut session, &clock, 4);

    assert!(!session.perform_quick_load());
    assert!(session.notices().try_recv().is_err());
    assert_eq!(session.bridge().state(), RunState::Running);
    assert_eq!(session.bridge().core().frame_snapshot().unwrap(), demo_frame_after(8));
}

#[test]
fn deep_link_with_file_loads_silently() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, _clock) = running_session(config(dir.path()), Box::new(DemoCore::new("demo")));

    let external = dir.path().join("shared.state");
    let mut donor = DemoCore::new("demo");
    donor.start();
    for _ in 0..20 { donor.run_frame(); }
    donor.save_state(&external).unwrap();

    session.deep_link(DeepLink { game: game(), save_state: Some(external.clone()) });
    assert!(!session.has_staged_resume());
    assert_eq!(session.bridge().core().frame_snapshot().unwrap(), demo_frame_after(20));
    assert!(session.notices().try_recv().is_err());
    assert!(external.exists());
    assert_eq!(temp_files(dir.path()), 0);
}

#[test]
fn deep_link_waits_for_running_core() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_at(EPOCH_SECS));
    let mut session = Session::new(config(dir.path()), Box::new(DemoCore::new("demo")), clock).unwrap();
    session.set_game(game());

    let external = dir.path().join("shared.state");
    let mut donor = DemoCore::new("demo");
    donor.start();
    for _ in 0..7 { donor.run_frame(); }
    donor.save_state(&external).unwrap();

    session.deep_link(DeepLink { game: game(), save_state: Some(external) });
    assert!(session.has_staged_resume());
    session.start();
    session.poll(Instant::now());
    assert!(!session.has_staged_resume());
    assert_eq!(session.bridge().core().frame_snapshot().unwrap(), demo_frame_after(7));
}

#[test]
fn deep_link_to_other_game_discards_stash() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_at(EPOCH_SECS));
    let mut session = Session::new(config(dir.path()), Box::new(DemoCore::new("demo")), clock).unwrap();
    session.set_game(game());

    let external = dir.path().join("shared.state");
    let mut donor = DemoCore::new("demo");
    donor.start();
    donor.save_state(&external).unwrap();
    session.deep_link(DeepLink { game: game(), save_state: Some(external) });
    assert!(session.has_staged_resume());

    let other = GameRef::new("zelda-la", "Link's Awakening");
    session.deep_link(DeepLink { game: other.clone(), save_state: None });
    assert!(!session.has_staged_resume());
    assert_eq!(session.game(), Some(&other));
    assert_eq!(session.bridge().state(), RunState::Running);
    assert_eq!(temp_files(dir.path()), 0);
}

#[test]
fn deep_link_with_auto_load_resumes_newest_auto() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.save_states.auto_load = true;
    let (mut session, clock) = running_session(cfg, Box::new(DemoCore::new("demo")));

    run(&mut session, &clock, 10);
    session.did_enter_background();
    run(&mut session, &clock, 10);

    session.deep_link(DeepLink { game: game(), save_state: None });
    assert_eq!(session.bridge().core().frame_snapshot().unwrap(), demo_frame_after(10));
}

#[test]
fn deep_link_from_pause_menu_resumes_pause_state() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, clock) = running_session(config(dir.path()), Box::new(DemoCore::new("demo")));
    run(&mut session, &clock, 15);
    session.enter_pause_menu();

    session.deep_link(DeepLink { game: game(), save_state: None });
    assert!(!session.is_in_pause_menu());
    assert_eq!(session.bridge().state(), RunState::Running);
    assert_eq!(session.bridge().core().frame_snapshot().unwrap(), demo_frame_after(15));
    assert_eq!(temp_files(dir.path()), 0);
}

#[test]
fn switching_games_clears_rewind_slots() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_at(EPOCH_SECS));
    let mut session = Session::new(rewind_config(dir.path(), 5), Box::new(DemoCore::new("demo")), clock.clone()).unwrap();
    session.set_game(game());
    session.start();
    let t0 = Instant::now();
    session.poll(t0);
    rewind_ticks(&mut session, &clock, t0, 2);
    assert_eq!(session.slots(SlotKind::Rewind).len(), 2);

    session.set_game(GameRef::new("other", "Other"));
    session.set_game(game());
    assert!(session.slots(SlotKind::Rewind).is_empty());
}

#[test]
fn rewind_skipped_for_core_without_live_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_at(EPOCH_SECS));
    let core = DemoCore::new("gbc").with_capabilities(CoreCapabilities::default());
    let mut session = Session::new(rewind_config(dir.path(), 3), Box::new(core), clock.clone()).unwrap();
    session.set_game(game());
    session.start();
    let t0 = Instant::now();
    session.poll(t0);
    rewind_ticks(&mut session, &clock, t0, 3);
    assert!(session.slots(SlotKind::Rewind).is_empty());
}

#[test]
fn games_with_similar_ids_keep_separate_slots() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_at(EPOCH_SECS));
    let mut first = Session::new(config(dir.path()), Box::new(DemoCore::new("demo")), clock.clone()).unwrap();
    first.set_game(GameRef::new("pkmn/red", "Red"));
    first.start();
    assert!(first.perform_quick_save());
    assert!(first.request_save(SlotKind::Auto, None).is_some());
    run(&mut first, &clock, 3);
    assert!(first.request_save(SlotKind::Auto, None).is_some());
    drop(first);

    let mut second = Session::new(config(dir.path()), Box::new(DemoCore::new("demo")), clock.clone()).unwrap();
    second.set_game(GameRef::new("pkmn_red", "Red (alt)"));
    second.start();
    assert!(second.slots(SlotKind::Quick).is_empty());
    assert!(second.slots(SlotKind::Auto).is_empty());
}

#[test]
fn parent_dir_game_id_stays_inside_save_root() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("store");
    let clock = Arc::new(ManualClock::starting_at(EPOCH_SECS));
    let mut session = Session::new(config(&root), Box::new(DemoCore::new("demo")), clock).unwrap();
    session.set_game(GameRef::new("..", "Escape"));
    session.start();
    assert!(session.perform_quick_save());
    assert_eq!(session.slots(SlotKind::Quick).len(), 1);
    assert!(!dir.path().join("index.toml").exists());
}
