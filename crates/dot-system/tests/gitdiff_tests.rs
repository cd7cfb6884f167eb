use dot_fs::{FileKind, MemFs, NormalizedPath, Vfs};
use dot_state::{MemoryState, PersistentState};
use dot_system::{GitDiffSystem, RealSystem, System, UnifiedEncoder};
use pretty_assertions::assert_eq;

fn home() -> RealSystem<MemFs, MemoryState> {
    let fs = MemFs::new();
    fs.create_file("/home/user/.bashrc", "old\n", 0o644).unwrap();
    fs.create_dir_all("/home/user/.cache", 0o700).unwrap();
    let mut state = MemoryState::new();
    state.set(b"script-runs", b"install.sh", b"sha256:0").unwrap();
    RealSystem::new(fs, state)
}

/// Every path with its kind, mode and content.
fn snapshot(fs: &MemFs) -> Vec<(NormalizedPath, FileKind, u32, Vec<u8>)> {
    fs.paths()
        .into_iter()
        .map(|path| {
            let metadata = fs.lstat(&path).unwrap();
            let content = match metadata.kind() {
                FileKind::File => fs.read_file(&path).unwrap(),
                FileKind::Symlink => fs.read_link(&path).unwrap().into_bytes(),
                _ => Vec::new(),
            };
            (path, metadata.kind(), metadata.perm(), content)
        })
        .collect()
}

fn diff_of(reader: &RealSystem<MemFs, MemoryState>, f: impl FnOnce(&mut dyn System)) -> String {
    let mut system = GitDiffSystem::new(reader, UnifiedEncoder::new(Vec::new()), "/home/user");
    f(&mut system);
    String::from_utf8(system.into_sink().into_inner()).unwrap()
}

#[test]
fn test_modified_file() {
    let reader = home();
    let out = diff_of(&reader, |s| {
        s.write_file(&"/home/user/.bashrc".into(), b"new\n", 0o644).unwrap()
    });
    insta::assert_snapshot!(out, @r"
    diff --git a/.bashrc b/.bashrc
    index 3367afdbbf91e638efe983616377c60477cc6612..3e757656cf36eca53338e520d134963a44f793f8 100644
    --- a/.bashrc
    +++ b/.bashrc
    @@ -1 +1 @@
    -old
    +new
    ");
}

#[test]
fn test_new_directory() {
    let reader = home();
    let out = diff_of(&reader, |s| s.mkdir(&"/home/user/.config".into(), 0o755).unwrap());
    insta::assert_snapshot!(out, @r"
    diff --git a/.config b/.config
    new file mode 40000
    index 0000000000000000000000000000000000000000..0000000000000000000000000000000000000000
    --- /dev/null
    +++ b/.config
    ");
}

#[test]
fn test_new_symlink() {
    let reader = home();
    let out = diff_of(&reader, |s| {
        s.write_symlink("target", &"/home/user/link".into()).unwrap()
    });
    insta::assert_snapshot!(out, @r"
    diff --git a/link b/link
    new file mode 120000
    index 0000000000000000000000000000000000000000..1de565933b05f74c75ff9a6520af5f9f8a5a2f1d
    --- /dev/null
    +++ b/link
    @@ -0,0 +1 @@
    +target
    \ No newline at end of file
    ");
}

#[test]
fn test_mode_change_only() {
    let reader = home();
    let out = diff_of(&reader, |s| s.chmod(&"/home/user/.bashrc".into(), 0o755).unwrap());
    insta::assert_snapshot!(out, @r"
    diff --git a/.bashrc b/.bashrc
    old mode 100644
    new mode 100755
    ");
}

#[test]
fn test_removal() {
    let reader = home();
    let out = diff_of(&reader, |s| s.remove_all(&"/home/user/.bashrc".into()).unwrap());
    insta::assert_snapshot!(out, @r"
    diff --git a/.bashrc b/.bashrc
    deleted file mode 100644
    index 0000000000000000000000000000000000000000..0000000000000000000000000000000000000000
    --- a/.bashrc
    +++ /dev/null
    ");
}

#[test]
fn test_script() {
    let reader = home();
    let out = diff_of(&reader, |s| {
        s.run_script(&"/home/user/install.sh".into(), b"#!/bin/sh\necho hi\n")
            .unwrap()
    });
    insta::assert_snapshot!(out, @r"
    diff --git a/install.sh b/install.sh
    new file mode 100755
    index 0000000000000000000000000000000000000000..4163036efa65bd4a469e752267498f01ea36a55c
    --- /dev/null
    +++ b/install.sh
    @@ -0,0 +1,2 @@
    +#!/bin/sh
    +echo hi
    ");
}

#[test]
fn test_rename() {
    let reader = home();
    let out = diff_of(&reader, |s| {
        s.rename(&"/home/user/.bashrc".into(), &"/home/user/.bashrc.old".into())
            .unwrap()
    });
    insta::assert_snapshot!(out, @r"
    diff --git a/.bashrc b/.bashrc.old
    rename from .bashrc
    rename to .bashrc.old
    ");
}

#[test]
fn test_diff_backend_never_mutates() {
    let reader = home();
    let before = snapshot(reader.fs());

    let out = diff_of(&reader, |s| {
        s.write_file(&"/home/user/.bashrc".into(), b"new\n", 0o600).unwrap();
        s.write_file(&"/home/user/fresh".into(), b"x\n", 0o644).unwrap();
        s.chmod(&"/home/user/.cache".into(), 0o755).unwrap();
        s.mkdir(&"/home/user/dir".into(), 0o755).unwrap();
        s.write_symlink("t", &"/home/user/l".into()).unwrap();
        s.rename(&"/home/user/.bashrc".into(), &"/home/user/b".into()).unwrap();
        s.remove_all(&"/home/user/.cache".into()).unwrap();
        s.run_script(&"/home/user/s.sh".into(), b"echo\n").unwrap();
        s.state_set(b"script-runs", b"install.sh", b"sha256:1").unwrap();
        s.state_delete(b"script-runs", b"install.sh").unwrap();
    });

    assert_eq!(out.matches("diff --git").count(), 8);
    assert_eq!(snapshot(reader.fs()), before);
    assert_eq!(
        reader.state().get(b"script-runs", b"install.sh").unwrap(),
        Some(b"sha256:0".to_vec())
    );
}
