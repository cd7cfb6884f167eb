use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::process::Command;

use dot_fs::{NormalizedPath, OsFs};
use dot_state::MemoryState;
use dot_system::{Error, RealSystem, System, SystemReader};
use pretty_assertions::assert_eq;
use rstest::{fixture, rstest};
use tempfile::TempDir;

struct Live {
    temp: TempDir,
    system: RealSystem<OsFs, MemoryState>,
}

#[fixture]
fn live() -> Live {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("home/user")).unwrap();
    let system = RealSystem::new(OsFs::rooted(temp.path()), MemoryState::new());
    Live { temp, system }
}

fn mode(path: &std::path::Path) -> u32 {
    fs::symlink_metadata(path).unwrap().permissions().mode() & 0o777
}

#[rstest]
fn test_write_file_replaces_content_and_mode(mut live: Live) {
    let native = live.temp.path().join("home/user/foo");
    fs::write(&native, "old").unwrap();
    fs::set_permissions(&native, fs::Permissions::from_mode(0o777)).unwrap();

    live.system
        .write_file(&"/home/user/foo".into(), b"new", 0o644)
        .unwrap();

    assert_eq!(fs::read_to_string(&native).unwrap(), "new");
    assert_eq!(mode(&native), 0o644);
}

#[rstest]
fn test_mkdir_mode_is_exact(mut live: Live) {
    live.system.mkdir(&"/home/user/open".into(), 0o777).unwrap();
    assert_eq!(mode(&live.temp.path().join("home/user/open")), 0o777);
}

#[rstest]
fn test_write_symlink_replaces_file_atomically(mut live: Live) {
    let native = live.temp.path().join("home/user/link");
    fs::write(&native, "regular file").unwrap();

    live.system
        .write_symlink("dest", &"/home/user/link".into())
        .unwrap();
    live.system
        .write_symlink("other", &"/home/user/link".into())
        .unwrap();

    assert_eq!(fs::read_link(&native).unwrap().to_str(), Some("other"));
    let leftovers: Vec<_> = fs::read_dir(live.temp.path().join("home/user"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from("link")]);
}

fn leftover_scripts(name: &str) -> usize {
    fs::read_dir(std::env::temp_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(&format!(".{name}")))
        .count()
}

#[rstest]
fn test_run_script_executes_and_cleans_up(mut live: Live) {
    let marker = live.temp.path().join("ran");
    let name = format!(
        "ok-{}.sh",
        live.temp.path().file_name().unwrap().to_string_lossy()
    );
    let script = format!("#!/bin/sh\necho ran > '{}'\n", marker.display());

    live.system
        .run_script(&NormalizedPath::new(format!("/home/user/{name}")), script.as_bytes())
        .unwrap();

    assert_eq!(fs::read_to_string(&marker).unwrap(), "ran\n");
    assert_eq!(leftover_scripts(&name), 0);
}

#[rstest]
fn test_run_script_failure_reports_status_and_cleans_up(mut live: Live) {
    let name = format!(
        "fail-{}.sh",
        live.temp.path().file_name().unwrap().to_string_lossy()
    );

    let err = live
        .system
        .run_script(&NormalizedPath::new(format!("/home/user/{name}")), b"#!/bin/sh\nexit 3\n")
        .unwrap_err();

    match err {
        Error::Script { status, .. } => assert_eq!(status.code(), Some(3)),
        other => panic!("expected script error, got {other:?}"),
    }
    assert_eq!(leftover_scripts(&name), 0);
}

#[rstest]
fn test_idempotent_cmd_output(live: Live) {
    let out = live
        .system
        .idempotent_cmd_output(Command::new("echo").arg("hello"))
        .unwrap();
    assert_eq!(out, b"hello\n");

    let err = live
        .system
        .idempotent_cmd_output(&mut Command::new("false"))
        .unwrap_err();
    assert!(matches!(err, Error::Command { .. }));

    let err = live
        .system
        .idempotent_cmd_output(&mut Command::new("/nonexistent/dotsync-test-binary"))
        .unwrap_err();
    assert!(matches!(err, Error::Spawn { .. }));
}

#[rstest]
fn test_reads_see_rooted_paths(live: Live) {
    fs::write(live.temp.path().join("home/user/a"), "1").unwrap();
    fs::write(live.temp.path().join("home/user/b"), "2").unwrap();

    let names: Vec<String> = live
        .system
        .read_dir(&"/home/user".into())
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["a", "b"]);

    let matches = live.system.glob("/home/user/*").unwrap();
    assert_eq!(matches, vec![NormalizedPath::new("/home/user/a"), NormalizedPath::new("/home/user/b")]);
}
