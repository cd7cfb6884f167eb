use dot_core::{ApplyOptions, Error, TargetState, TemplateError, TemplateFuncs};
use dot_fs::MemFs;
use dot_state::MemoryState;
use dot_system::{RealSystem, SystemReader};
use rstest::rstest;
use serde_json::json;

fn broken_state(template: &str) -> (TargetState, RealSystem<MemFs, MemoryState>) {
    let fs = MemFs::new();
    fs.create_file("/src/dot_broken.tmpl", template, 0o644).unwrap();
    fs.create_file("/src/dot_ok", "fine\n", 0o644).unwrap();
    fs.create_dir_all("/home/user", 0o755).unwrap();
    let system = RealSystem::new(fs, MemoryState::new());

    let funcs = TemplateFuncs::new().with("fail", || Err("boom".to_string()));
    let mut state = TargetState::new("/home/user", 0o022, "/src", json!({"known": 1}), funcs);
    state.populate(&system).unwrap();
    (state, system)
}

fn is_syntax(e: &TemplateError) -> bool {
    matches!(e, TemplateError::Syntax { .. })
}

fn is_undefined_field(e: &TemplateError) -> bool {
    matches!(e, TemplateError::UndefinedField { field, .. } if field == ".Unknown")
}

fn is_unknown_function(e: &TemplateError) -> bool {
    matches!(e, TemplateError::UnknownFunction { function, .. } if function == "func")
}

fn is_func_error(e: &TemplateError) -> bool {
    matches!(e, TemplateError::Func { function, message, .. } if function == "fail" && message == "boom")
}

#[rstest]
#[case::syntax("{{", is_syntax)]
#[case::unknown_field("{{ .Unknown }}", is_undefined_field)]
#[case::unknown_function("{{ func }}", is_unknown_function)]
#[case::function_error("{{ fail }}", is_func_error)]
fn test_template_errors(#[case] template: &str, #[case] check: fn(&TemplateError) -> bool) {
    let (mut state, mut system) = broken_state(template);

    match state.evaluate().unwrap_err() {
        Error::Template { name, source } => {
            assert_eq!(name, "dot_broken.tmpl");
            assert!(check(&source), "unexpected error: {source:?}");
        }
        other => panic!("expected a template error, got {other}"),
    }

    // The failure is reported again by apply, without stopping siblings
    let report = state.apply(&mut system, &ApplyOptions::default()).unwrap();
    assert_eq!(report.errors.len(), 1);
    assert!(matches!(report.errors[0], Error::Template { .. }));
    assert_eq!(system.read_file(&"/home/user/.ok".into()).unwrap(), b"fine\n");
    assert!(system.lstat(&"/home/user/.broken".into()).is_err());
}

#[test]
fn test_template_functions_are_called() {
    let fs = MemFs::new();
    fs.create_file("/src/dot_os.tmpl", "{{ os }}/{{ .arch }}\n", 0o644).unwrap();
    let system = RealSystem::new(fs, MemoryState::new());

    let funcs = TemplateFuncs::new().with("os", || Ok(json!("linux")));
    let mut state = TargetState::new("/home/user", 0o022, "/src", json!({"arch": "amd64"}), funcs);
    state.populate(&system).unwrap();
    state.evaluate().unwrap();

    let dot_core::Entry::File(file) = state.get(".os").unwrap() else {
        panic!("expected a file");
    };
    assert_eq!(file.contents().unwrap(), b"linux/amd64\n");
}
