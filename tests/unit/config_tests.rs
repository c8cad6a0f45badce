use super::*;

const MINIMAL: &str = r#"
server = "canvas.example.edu"
course_id = 42
assignment_group = "ECPC"
"#;

fn parse(input: &str) -> Result<Config, ConfigError> {
    Config::from_toml_str(input, Path::new("/course/grading.toml"))
}

#[test]
fn minimal_config_uses_defaults() {
    let config = parse(MINIMAL).expect("config should parse");
    assert_eq!(config.root_path, PathBuf::from("/course"));
    assert_eq!(config.submissions_path, PathBuf::from("submissions"));
    assert_eq!(config.code_path, PathBuf::from("code"));
    assert_eq!(config.token_env, "CANVAS_API_TOKEN");
    assert_eq!(config.theme, "dark");
    assert_eq!(config.status_batch_size, 5);
    assert_eq!(config.commands, CommandsConfig::default());
    assert!(config.group_filter.is_none());
    assert!(config.env.is_empty());
    assert_eq!(config.grades, default_grade_labels());
}

#[test]
fn relative_root_resolves_against_config_folder() {
    let config = parse(&format!("root_path = \"grading\"\n{MINIMAL}")).expect("config");
    assert_eq!(config.root_path, PathBuf::from("/course/grading"));

    let config = parse(&format!("root_path = \"/srv/grading\"\n{MINIMAL}")).expect("config");
    assert_eq!(config.root_path, PathBuf::from("/srv/grading"));
}

#[test]
fn group_filter_requires_both_keys() {
    let config = parse(&format!("groupset = \"Werkcolleges\"\ngroup = \"Groep A\"\n{MINIMAL}"))
        .expect("config");
    assert_eq!(
        config.group_filter,
        Some(GroupFilter {
            groupset: "Werkcolleges".to_string(),
            group: "Groep A".to_string(),
        })
    );

    let err = parse(&format!("groupset = \"Werkcolleges\"\n{MINIMAL}")).expect_err("invalid");
    assert!(err.to_string().contains("'group' is missing"));
    let err = parse(&format!("group = \"Groep A\"\n{MINIMAL}")).expect_err("invalid");
    assert!(err.to_string().contains("'groupset' is missing"));
}

#[test]
fn environments_keep_document_order() {
    let input = format!(
        "{MINIMAL}\n[env.zeta]\npython_version = \"3.11\"\n\n[env.alpha]\npython_version = \"3.12\"\npackage_spec = \"  -e . pytest  \"\n\n[env.blank]\npython_version = \"3.13\"\npackage_spec = \"   \"\n"
    );
    let config = parse(&input).expect("config");
    let names = config.env.iter().map(|env| env.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["zeta", "alpha", "blank"]);
    assert_eq!(config.env[0].package_spec, None);
    assert_eq!(config.env[1].package_spec.as_deref(), Some("-e . pytest"));
    assert_eq!(config.env[2].package_spec, None);
}

#[test]
fn rejects_zero_batch_size_and_too_many_environments() {
    let err = parse(&format!("status_batch_size = 0\n{MINIMAL}")).expect_err("invalid");
    assert!(matches!(err, ConfigError::Invalid(_)));

    let mut input = MINIMAL.to_string();
    for idx in 0..11 {
        input.push_str(&format!("\n[env.e{idx}]\npython_version = \"3.12\"\n"));
    }
    let err = parse(&input).expect_err("invalid");
    assert!(err.to_string().contains("at most 10"));
}

#[test]
fn custom_grade_labels_replace_defaults() {
    let input = format!(
        "{MINIMAL}\n[grades.pass]\nlabel = \"PASS\"\nstyle = \"success\"\n\n[grades.fail]\nlabel = \"FAIL\"\n"
    );
    let config = parse(&input).expect("config");
    assert_eq!(config.grades.len(), 2);
    let pass = config.grade_label(Some("pass")).expect("pass label");
    assert_eq!(pass.style, BadgeStyle::Success);
    let fail = config.grade_label(Some("fail")).expect("fail label");
    assert_eq!(fail.style, BadgeStyle::Info);
    assert!(config.grade_label(Some("Goed")).is_none());
    assert!(config.grade_label(None).is_none());
}

#[test]
fn commands_can_be_overridden_partially() {
    let config = parse(&format!("{MINIMAL}\n[commands]\neditor = \"true\"\n")).expect("config");
    assert_eq!(config.commands.editor, "true");
    assert_eq!(config.commands.uv, "uv");
    assert_eq!(config.commands.git, "git");
}

#[test]
fn accepts_legacy_env_prefix_key() {
    let config = parse(&format!("env_prefix = \"NSP2_\"\n{MINIMAL}")).expect("config");
    assert_eq!(config.course_id, 42);
}

#[test]
fn parse_errors_name_the_file() {
    let err = parse("server = ").expect_err("invalid toml");
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("/course/grading.toml"));
}

#[test]
fn default_config_parses() {
    let config = parse(DEFAULT_CONFIG).expect("default config should parse");
    assert_eq!(config.env.len(), 1);
    assert_eq!(config.env[0].name, "default");
}

#[test]
fn missing_file_reports_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = read_config(&dir.path().join(CONFIG_FILE)).expect_err("missing");
    assert!(matches!(err, ConfigError::NotFound));
    assert_eq!(
        err.to_string(),
        "No grading.toml file found. Are you in the correct folder?"
    );
}

#[test]
fn finds_config_in_parent_folder() {
    let dir = tempfile::tempdir().expect("tempdir");
    let nested = dir.path().join("a").join("b");
    fs::create_dir_all(&nested).expect("nested");
    fs::write(dir.path().join(CONFIG_FILE), MINIMAL).expect("write");

    let found = find_config_file(&nested).expect("config should be found");
    assert_eq!(found, dir.path().join(CONFIG_FILE));

    let config = read_config(&found).expect("config");
    assert_eq!(config.root_path, dir.path());
}

#[test]
fn init_writes_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(CONFIG_FILE);
    assert_eq!(
        init_config(dir.path()).expect("init"),
        InitOutcome::Created(path.clone())
    );
    assert_eq!(
        init_config(dir.path()).expect("init"),
        InitOutcome::AlreadyPresent(path)
    );
}

#[test]
fn load_reads_explicit_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("custom.toml");
    fs::write(&path, MINIMAL).expect("write");
    let (config, loaded_from) = load(Some(&path)).expect("load");
    assert_eq!(loaded_from, path);
    assert_eq!(config.course_id, 42);
}
