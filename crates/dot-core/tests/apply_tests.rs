use std::io::ErrorKind;
use std::process::Command;

use dot_core::{ApplyOptions, Error, TargetState, TemplateFuncs};
use dot_fs::{DirEntry, Metadata, NormalizedPath};
use dot_system::{DryRunSystem, System, SystemReader};
use dot_test_utils::{CountingSystem, TestHome};
use pretty_assertions::assert_eq;
use serde_json::json;

fn target_state(home: &TestHome, system: &dyn System) -> TargetState {
    let data = json!({"name": "John Smith", "email": "hello@example.com"});
    let mut state = TargetState::new(home.target_dir(), 0o022, home.source_dir(), data, TemplateFuncs::new());
    state.populate(system).unwrap();
    state
}

fn apply(home: &TestHome, system: &mut dyn System) {
    let mut state = target_state(home, system);
    let report = state.apply(system, &ApplyOptions::default()).unwrap();
    assert!(report.is_ok(), "{:?}", report.errors);
}

/// Mutating calls a fresh apply would make right now.
fn pending_calls(home: &TestHome, system: &mut dyn System) -> Vec<String> {
    let mut counting = CountingSystem::new(system);
    let mut state = target_state(home, &counting);
    state.apply(&mut counting, &ApplyOptions::default()).unwrap();
    counting.calls().to_vec()
}

#[test]
fn test_end_to_end() {
    let home = TestHome::new();
    home.write_source("dot_bashrc", "bar");
    home.write_source(".git/HEAD", "HEAD");
    home.write_source("dot_hgrc.tmpl", "[ui]\nusername = {{ .name }} <{{ .email }}>\n");
    home.write_source("empty.tmpl", "{{ if false }}foo{{ end }}");
    home.write_source("empty_foo", "");
    home.write_source("symlink_bar", "empty");
    home.write_source("symlink_replace_symlink", "bar");
    home.write_target(".bashrc", "foo", 0o644);
    home.symlink_target("replace_symlink", "foo");

    let mut system = home.system();
    apply(&home, &mut system);

    home.assert_file(".bashrc", "bar");
    home.assert_missing(".git");
    home.assert_file(".hgrc", "[ui]\nusername = John Smith <hello@example.com>\n");
    home.assert_missing("empty");
    home.assert_file("foo", "");
    home.assert_mode("foo", 0o644);
    home.assert_symlink("bar", "empty");
    home.assert_symlink("replace_symlink", "bar");
}

#[test]
fn test_second_apply_makes_no_changes() {
    let home = TestHome::new();
    home.write_source("dot_bashrc", "export EDITOR=vi\n");
    home.write_source("private_dot_ssh/config", "Host *\n");
    home.write_source("executable_bin/tool", "#!/bin/sh\n");
    home.write_source("symlink_dot_vimrc", ".config/vim/vimrc\n");
    home.write_source("dot_gitconfig.tmpl", "[user]\n\tname = {{ .name }}\n");

    let mut system = home.system();
    assert!(!pending_calls(&home, &mut system).is_empty());
    assert_eq!(pending_calls(&home, &mut system), Vec::<String>::new());

    let mut state = target_state(&home, &system);
    let mut dry_run = DryRunSystem::new(&system);
    state.apply(&mut dry_run, &ApplyOptions::default()).unwrap();
    assert!(!dry_run.modified());

    home.assert_mode(".ssh", 0o700);
    home.assert_mode(".ssh/config", 0o644);
    home.assert_mode("bin/tool", 0o755);
    home.assert_symlink(".vimrc", ".config/vim/vimrc");
}

#[test]
fn test_dry_run_reports_pending_changes() {
    let home = TestHome::new();
    home.write_source("dot_profile", "umask 022\n");
    let system = home.system();

    let mut state = target_state(&home, &system);
    let mut dry_run = DryRunSystem::new(&system);
    state.apply(&mut dry_run, &ApplyOptions::default()).unwrap();

    assert!(dry_run.modified());
    home.assert_missing(".profile");
}

#[test]
fn test_wrong_mode_is_fixed_with_chmod_only() {
    let home = TestHome::new();
    home.write_source("dot_bashrc", "bar");
    home.write_target(".bashrc", "bar", 0o600);

    let mut system = home.system();
    assert_eq!(pending_calls(&home, &mut system), vec!["chmod /home/.bashrc"]);
    home.assert_mode(".bashrc", 0o644);
}

#[test]
fn test_non_regular_targets_are_replaced() {
    let home = TestHome::new();
    home.write_source("dot_bashrc", "bar");
    home.write_source("private_dot_ssh/config", "Host *\n");
    home.write_target(".bashrc/nested", "x", 0o644);
    home.write_target(".ssh", "not a dir", 0o644);

    let mut system = home.system();
    assert_eq!(
        pending_calls(&home, &mut system),
        vec![
            "remove_all /home/.bashrc",
            "write_file /home/.bashrc",
            "remove_all /home/.ssh",
            "mkdir /home/.ssh",
            "write_file /home/.ssh/config",
        ]
    );
    home.assert_file(".bashrc", "bar");
    home.assert_mode(".ssh", 0o700);
    home.assert_file(".ssh/config", "Host *\n");
}

#[test]
fn test_directory_is_replaced_by_symlink() {
    let home = TestHome::new();
    home.write_source("symlink_dot_vim", "target");
    home.write_target(".vim/vimrc", "set nocompatible\n", 0o644);

    let mut system = home.system();
    assert_eq!(
        pending_calls(&home, &mut system),
        vec!["remove_all /home/.vim", "write_symlink /home/.vim"]
    );
    home.assert_symlink(".vim", "target");
}

#[test]
fn test_file_is_replaced_by_symlink_in_place() {
    let home = TestHome::new();
    home.write_source("symlink_dot_vimrc", "target");
    home.write_target(".vimrc", "set nocompatible\n", 0o644);

    let mut system = home.system();
    assert_eq!(pending_calls(&home, &mut system), vec!["write_symlink /home/.vimrc"]);
    home.assert_symlink(".vimrc", "target");
}

#[test]
fn test_empty_content_removes_target() {
    let home = TestHome::new();
    home.write_source("dot_stale", "");
    home.write_source("symlink_gone.tmpl", "{{ if false }}target{{ end }}");
    home.write_target(".stale", "left over", 0o644);
    home.symlink_target("gone", "somewhere");

    let mut system = home.system();
    apply(&home, &mut system);

    home.assert_missing(".stale");
    home.assert_missing("gone");
}

#[test]
fn test_script_failure_stops_apply() {
    let home = TestHome::new();
    home.write_source("run_a.sh", "#!/bin/sh\nexit 3\n");
    home.write_source("b", "content");
    let mut system = home.system();

    let mut state = target_state(&home, &system);
    let err = state.apply(&mut system, &ApplyOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Script { ref name, .. } if name == "a.sh"), "{err}");
    home.assert_missing("b");
}

#[test]
fn test_keep_going_records_failures() {
    let home = TestHome::new();
    home.write_source("run_a.sh", "#!/bin/sh\nexit 3\n");
    home.write_source("b", "content");
    let mut system = home.system();

    let mut state = target_state(&home, &system);
    let report = state
        .apply(&mut system, &ApplyOptions { keep_going: true })
        .unwrap();

    assert_eq!(report.errors.len(), 1);
    assert!(matches!(report.errors[0], Error::Script { .. }));
    assert_eq!(report.visited, 2);
    home.assert_file("b", "content");
    assert!(report.into_result().is_err());
}

/// Reads through `inner`, except that files whose name is in `denied`
/// cannot be read.
struct DenyingReader<'a, S> {
    inner: &'a S,
    denied: &'a [&'a str],
}

impl<S: SystemReader> DenyingReader<'_, S> {
    fn check(&self, path: &NormalizedPath) -> dot_system::Result<()> {
        match path.file_name() {
            Some(name) if self.denied.contains(&name) => {
                Err(dot_fs::Error::kind(path.as_str(), ErrorKind::PermissionDenied, "denied").into())
            }
            _ => Ok(()),
        }
    }
}

impl<S: SystemReader> SystemReader for DenyingReader<'_, S> {
    fn stat(&self, path: &NormalizedPath) -> dot_system::Result<Metadata> {
        self.inner.stat(path)
    }

    fn lstat(&self, path: &NormalizedPath) -> dot_system::Result<Metadata> {
        self.inner.lstat(path)
    }

    fn read_dir(&self, path: &NormalizedPath) -> dot_system::Result<Vec<DirEntry>> {
        self.check(path)?;
        self.inner.read_dir(path)
    }

    fn read_file(&self, path: &NormalizedPath) -> dot_system::Result<Vec<u8>> {
        self.check(path)?;
        self.inner.read_file(path)
    }

    fn read_link(&self, path: &NormalizedPath) -> dot_system::Result<String> {
        self.inner.read_link(path)
    }

    fn glob(&self, pattern: &str) -> dot_system::Result<Vec<NormalizedPath>> {
        self.inner.glob(pattern)
    }

    fn state_get(&self, bucket: &[u8], key: &[u8]) -> dot_system::Result<Option<Vec<u8>>> {
        self.inner.state_get(bucket, key)
    }

    fn idempotent_cmd_output(&self, cmd: &mut Command) -> dot_system::Result<Vec<u8>> {
        self.inner.idempotent_cmd_output(cmd)
    }
}

#[test]
fn test_unreadable_sources_do_not_hide_siblings() {
    let home = TestHome::new();
    home.write_source("dot_bad", "secret");
    home.write_source("dot_good", "fine");
    home.write_source("private_dot_locked/config", "x");
    home.write_source("dot_config/app", "settings");
    let mut system = home.system();

    let mut state = TargetState::new(home.target_dir(), 0o022, home.source_dir(), json!({}), TemplateFuncs::new());
    let reader = DenyingReader {
        inner: &system,
        denied: &["dot_bad", "private_dot_locked"],
    };
    state.populate(&reader).unwrap();

    assert!(state.get(".good").is_some());
    assert!(state.get(".config/app").is_some());
    assert!(state.get(".bad").is_none());
    assert!(state.get(".locked").is_none());
    assert_eq!(state.read_errors().len(), 2);

    let report = state.apply(&mut system, &ApplyOptions::default()).unwrap();
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors.iter().all(|e| matches!(e, Error::Read { .. })));
    home.assert_file(".good", "fine");
    home.assert_file(".config/app", "settings");
    home.assert_missing(".bad");
    home.assert_missing(".locked");
}
