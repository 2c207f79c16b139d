use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use foldersync_core::{Action, SyncConfig};
use foldersync_sync::{snapshot, NoopObserver, PassOutcome, SyncEvent, SyncObserver, Synchronizer};
use tempfile::TempDir;

/// Keeps a one-line rendering of every event.
#[derive(Default)]
struct Recorder {
    lines: Mutex<Vec<String>>,
}

impl Recorder {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("recorder lock").clone()
    }

    fn clear(&self) {
        self.lines.lock().expect("recorder lock").clear();
    }
}

impl SyncObserver for Recorder {
    fn notify(&self, event: SyncEvent<'_>) {
        let line = match event {
            SyncEvent::PassStarted { .. } => "started".to_string(),
            SyncEvent::NoActionNeeded => "no action needed".to_string(),
            SyncEvent::ActionApplied { action, .. } => format!("applied {action}"),
            SyncEvent::ActionPlanned { action } => format!("planned {action}"),
            SyncEvent::ActionFailed { action, .. } => format!("failed {action}"),
            SyncEvent::EntrySkipped { path, .. } => format!("skipped {}", path.display()),
            SyncEvent::EntryIgnored { path } => format!("ignored {}", path.display()),
            SyncEvent::PassCompleted { .. } => "completed".to_string(),
            SyncEvent::PassFailed { .. } => "pass failed".to_string(),
            SyncEvent::PassInterrupted => "interrupted".to_string(),
        };
        self.lines.lock().expect("recorder lock").push(line);
    }
}

struct Env {
    _tmp: TempDir,
    source: PathBuf,
    replica: PathBuf,
}

impl Env {
    fn new() -> Self {
        let tmp = TempDir::new().expect("tmp");
        let source = tmp.path().join("source");
        let replica = tmp.path().join("replica");
        fs::create_dir_all(&source).expect("create source");
        fs::create_dir_all(&replica).expect("create replica");
        Self {
            _tmp: tmp,
            source,
            replica,
        }
    }

    fn config(&self) -> SyncConfig {
        SyncConfig::new(self.source.clone(), self.replica.clone())
    }

    fn synchronizer(&self, observer: Arc<dyn SyncObserver>) -> Synchronizer {
        Synchronizer::new(self.config(), observer)
    }

    fn write_source(&self, rel: &str, contents: &str) {
        write(&self.source, rel, contents);
    }

    fn replica_text(&self, rel: &str) -> String {
        fs::read_to_string(self.replica.join(rel)).expect("read replica file")
    }

    fn assert_converged(&self) {
        assert_eq!(
            snapshot::take(&self.source, &NoopObserver).expect("source snapshot"),
            snapshot::take(&self.replica, &NoopObserver).expect("replica snapshot"),
        );
    }
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, contents).expect("write file");
}

fn reconciled(outcome: PassOutcome) -> foldersync_sync::Report {
    match outcome {
        PassOutcome::Reconciled(report) => report,
        other => panic!("expected a reconcile, got {other:?}"),
    }
}

#[test]
fn scenario_a_populates_empty_replica() {
    let env = Env::new();
    env.write_source("a/b.txt", "hello");

    let recorder = Arc::new(Recorder::default());
    let mut sync = env.synchronizer(recorder.clone());
    let report = reconciled(sync.run_pass().expect("pass"));

    assert!(report.is_clean());
    assert!(env.replica.join("a").is_dir());
    assert_eq!(env.replica_text("a/b.txt"), "hello");

    let lines = recorder.lines();
    let dir = lines.iter().position(|l| l == "applied create-dir a");
    let file = lines.iter().position(|l| l == "applied copy-file a/b.txt");
    assert!(dir.is_some() && file.is_some(), "events: {lines:?}");
    assert!(dir < file, "directory must be created before its file: {lines:?}");
}

#[test]
fn scenario_b_propagates_content_change() {
    let env = Env::new();
    env.write_source("a/b.txt", "hello");
    write(&env.replica, "a/b.txt", "hello");

    let mut sync = env.synchronizer(Arc::new(NoopObserver));
    sync.run_pass().expect("first pass");

    env.write_source("a/b.txt", "world");
    let report = reconciled(sync.run_pass().expect("second pass"));

    assert_eq!(report.summary().files_updated, 1);
    assert_eq!(env.replica_text("a/b.txt"), "world");
}

#[test]
fn scenario_c_removes_deleted_directory() {
    let env = Env::new();
    fs::create_dir_all(env.source.join("c")).expect("mkdir c");
    fs::create_dir_all(env.replica.join("c")).expect("mkdir replica c");

    let mut sync = env.synchronizer(Arc::new(NoopObserver));
    sync.run_pass().expect("first pass");

    fs::remove_dir(env.source.join("c")).expect("rm c");
    let report = reconciled(sync.run_pass().expect("second pass"));

    assert_eq!(report.summary().dirs_deleted, 1);
    assert!(!env.replica.join("c").exists());
}

#[test]
fn scenario_d_untouched_source_needs_no_action() {
    let env = Env::new();
    env.write_source("a/b.txt", "hello");
    env.write_source("top.txt", "top");

    let recorder = Arc::new(Recorder::default());
    let mut sync = env.synchronizer(recorder.clone());
    sync.run_pass().expect("first pass");
    let before = fs::metadata(env.replica.join("a/b.txt"))
        .and_then(|m| m.modified())
        .expect("mtime");

    recorder.clear();
    let outcome = sync.run_pass().expect("second pass");

    assert!(matches!(outcome, PassOutcome::NoActionNeeded));
    assert_eq!(recorder.lines(), vec!["started", "no action needed"]);
    let after = fs::metadata(env.replica.join("a/b.txt"))
        .and_then(|m| m.modified())
        .expect("mtime");
    assert_eq!(before, after);
}

#[test]
fn second_reconcile_without_changes_applies_nothing() {
    let env = Env::new();
    env.write_source("x/y/z.bin", "payload");
    env.write_source("readme.md", "# hi");

    let mut config = env.config();
    config.change_detection = foldersync_core::ChangeDetection::Always;
    let mut sync = Synchronizer::new(config, Arc::new(NoopObserver));

    let first = reconciled(sync.run_pass().expect("first"));
    assert!(!first.results.is_empty());
    let second = reconciled(sync.run_pass().expect("second"));
    assert!(second.results.is_empty(), "second pass did {:?}", second.results);
}

#[test]
fn mixed_mutations_converge_in_one_pass() {
    let env = Env::new();
    env.write_source("keep.txt", "keep");
    env.write_source("edit.txt", "before");
    env.write_source("gone.txt", "gone");
    env.write_source("dir/inner/leaf.txt", "leaf");
    env.write_source("old/stuff.txt", "stuff");

    let mut sync = env.synchronizer(Arc::new(NoopObserver));
    sync.run_pass().expect("first pass");
    env.assert_converged();

    env.write_source("edit.txt", "after, and longer");
    fs::remove_file(env.source.join("gone.txt")).expect("rm gone");
    fs::remove_dir_all(env.source.join("old")).expect("rm old");
    env.write_source("new/deep/er/file.txt", "new");
    fs::create_dir_all(env.source.join("empty")).expect("mkdir empty");

    let report = reconciled(sync.run_pass().expect("second pass"));
    assert!(report.is_clean());
    env.assert_converged();
}

#[test]
fn kind_changes_converge_in_both_directions() {
    let env = Env::new();
    env.write_source("flip", "file first");
    env.write_source("flop/inner.txt", "dir first");

    let mut sync = env.synchronizer(Arc::new(NoopObserver));
    sync.run_pass().expect("first pass");

    fs::remove_file(env.source.join("flip")).expect("rm flip");
    env.write_source("flip/now.txt", "now a dir");
    fs::remove_dir_all(env.source.join("flop")).expect("rm flop");
    env.write_source("flop", "now a file");

    let report = reconciled(sync.run_pass().expect("second pass"));
    assert!(report.is_clean(), "failures: {:?}", report.summary().failures);
    env.assert_converged();
    assert_eq!(env.replica_text("flip/now.txt"), "now a dir");
    assert_eq!(env.replica_text("flop"), "now a file");
}

#[test]
fn replica_drift_triggers_resync() {
    let env = Env::new();
    env.write_source("a.txt", "a");

    let mut sync = env.synchronizer(Arc::new(NoopObserver));
    sync.run_pass().expect("first pass");

    fs::remove_file(env.replica.join("a.txt")).expect("rm replica copy");
    write(&env.replica, "junk.txt", "junk");

    let report = reconciled(sync.run_pass().expect("second pass"));
    assert_eq!(report.summary().files_created, 1);
    assert_eq!(report.summary().files_deleted, 1);
    env.assert_converged();
}

#[test]
fn replica_drift_is_ignored_when_disabled() {
    let env = Env::new();
    env.write_source("a.txt", "a");

    let mut config = env.config();
    config.detect_replica_drift = false;
    let mut sync = Synchronizer::new(config, Arc::new(NoopObserver));
    sync.run_pass().expect("first pass");

    fs::remove_file(env.replica.join("a.txt")).expect("rm replica copy");
    let outcome = sync.run_pass().expect("second pass");

    assert!(matches!(outcome, PassOutcome::NoActionNeeded));
    assert!(!env.replica.join("a.txt").exists());
}

/// Moves a source file aside the moment its parent directory is created in
/// the replica, so the copy that follows fails.
struct Saboteur {
    victim: PathBuf,
    hideout: PathBuf,
    armed: Mutex<bool>,
}

impl SyncObserver for Saboteur {
    fn notify(&self, event: SyncEvent<'_>) {
        if let SyncEvent::ActionApplied {
            action: Action::CreateDir(_),
            ..
        } = event
        {
            let mut armed = self.armed.lock().expect("saboteur lock");
            if *armed {
                fs::rename(&self.victim, &self.hideout).expect("hide victim");
                *armed = false;
            }
        }
    }
}

#[test]
fn failed_action_is_retried_next_pass() {
    let env = Env::new();
    env.write_source("d/f.txt", "content");
    let hideout = env.source.parent().expect("parent").join("f.hold");

    let mut config = env.config();
    config.detect_replica_drift = false;
    let observer = Arc::new(Saboteur {
        victim: env.source.join("d/f.txt"),
        hideout: hideout.clone(),
        armed: Mutex::new(true),
    });
    let mut sync = Synchronizer::new(config, observer);

    let first = reconciled(sync.run_pass().expect("first pass"));
    assert_eq!(first.summary().failed, 1);
    assert_eq!(first.summary().failures[0].path, PathBuf::from("d/f.txt"));
    assert!(!env.replica.join("d/f.txt").exists());

    // Restore identical content: the source snapshot matches the first
    // pass, so only discarded state makes the next pass re-diff.
    fs::rename(&hideout, env.source.join("d/f.txt")).expect("restore victim");
    let second = reconciled(sync.run_pass().expect("second pass"));

    assert!(second.is_clean());
    assert_eq!(env.replica_text("d/f.txt"), "content");
}

#[test]
fn one_failed_copy_does_not_block_the_other_ninety_nine() {
    let env = Env::new();
    for i in 0..100 {
        env.write_source(&format!("files/f{i:03}.txt"), &format!("file {i}"));
    }
    let hideout = env.source.parent().expect("parent").join("f042.hold");
    let observer = Arc::new(Saboteur {
        victim: env.source.join("files/f042.txt"),
        hideout,
        armed: Mutex::new(true),
    });
    let mut sync = env.synchronizer(observer);

    let report = reconciled(sync.run_pass().expect("pass"));
    let summary = report.summary();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].path, PathBuf::from("files/f042.txt"));
    assert_eq!(summary.files_created, 99);
    assert!(!report.interrupted);
    assert!(!env.replica.join("files/f042.txt").exists());
    for i in (0..100).filter(|i| *i != 42) {
        assert_eq!(
            env.replica_text(&format!("files/f{i:03}.txt")),
            format!("file {i}")
        );
    }
}

#[test]
fn dot_prefixed_source_files_next_to_their_namesakes_converge() {
    let env = Env::new();
    env.write_source("a", "payload");
    env.write_source(".a.foldersync.tmp", "sibling");
    env.write_source("sub/.b.foldersync.tmp", "nested sibling");
    env.write_source("sub/b", "nested payload");

    let mut sync = env.synchronizer(Arc::new(NoopObserver));
    let first = reconciled(sync.run_pass().expect("first pass"));
    assert!(first.is_clean());
    env.assert_converged();
    assert_eq!(env.replica_text(".a.foldersync.tmp"), "sibling");

    let second = sync.run_pass().expect("second pass");
    assert!(matches!(second, PassOutcome::NoActionNeeded));
    env.assert_converged();
}

#[test]
fn symlinks_are_not_mirrored() {
    #[cfg(unix)]
    {
        let env = Env::new();
        env.write_source("real.txt", "real");
        std::os::unix::fs::symlink(env.source.join("real.txt"), env.source.join("link"))
            .expect("symlink");

        let recorder = Arc::new(Recorder::default());
        let mut sync = env.synchronizer(recorder.clone());
        sync.run_pass().expect("pass");

        assert!(env.replica.join("real.txt").is_file());
        assert!(fs::symlink_metadata(env.replica.join("link")).is_err());
        assert!(recorder.lines().iter().any(|l| l.starts_with("ignored")));
    }
}

#[cfg(unix)]
mod unreadable {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    /// chmod 000 has no effect for root; such runs skip the assertions.
    fn lock(path: &Path) -> bool {
        fs::set_permissions(path, fs::Permissions::from_mode(0o000)).expect("chmod 000");
        fs::read(path).is_err()
    }

    fn unlock(path: &Path) {
        fs::set_permissions(path, fs::Permissions::from_mode(0o644)).expect("chmod 644");
    }

    #[test]
    fn one_unreadable_file_does_not_block_the_other_ninety_nine() {
        let env = Env::new();
        for i in 0..100 {
            env.write_source(&format!("files/f{i:03}.txt"), &format!("file {i}"));
        }
        let locked = env.source.join("files/f042.txt");
        if !lock(&locked) {
            unlock(&locked);
            return;
        }

        let recorder = Arc::new(Recorder::default());
        let mut sync = env.synchronizer(recorder.clone());
        let report = reconciled(sync.run_pass().expect("pass"));
        unlock(&locked);

        assert!(report.is_clean());
        assert_eq!(report.summary().files_created, 99);
        assert!(!env.replica.join("files/f042.txt").exists());
        assert_eq!(env.replica_text("files/f099.txt"), "file 99");
        assert!(recorder
            .lines()
            .iter()
            .any(|l| l.starts_with("skipped") && l.ends_with("f042.txt")));
    }

    #[test]
    fn unreadable_source_file_keeps_its_replica_copy() {
        let env = Env::new();
        env.write_source("secret.txt", "v1");
        env.write_source("open.txt", "open");

        let mut sync = env.synchronizer(Arc::new(NoopObserver));
        sync.run_pass().expect("first pass");

        let locked = env.source.join("secret.txt");
        if !lock(&locked) {
            unlock(&locked);
            return;
        }
        env.write_source("open.txt", "changed");
        let report = reconciled(sync.run_pass().expect("second pass"));
        unlock(&locked);

        assert!(report.is_clean());
        assert_eq!(env.replica_text("secret.txt"), "v1");
        assert_eq!(env.replica_text("open.txt"), "changed");
    }
}
