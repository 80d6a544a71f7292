//! Configuration files driving the elaboration pipeline.

use loom_config::{load_config, ConfigError, ElabConfig, CONFIG_FILE_NAME};
use loom_elaborate::lower;
use loom_ir::{
    ClockDomain, ElabError, FinalizationError, Memory, Module, NamingConflictError, PortConfig,
    Signal, Special, Value,
};
use std::fs;
use tempfile::TempDir;

fn project_with(toml: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CONFIG_FILE_NAME), toml).unwrap();
    dir
}

fn colliding_signals() -> Module {
    let mut top = Module::new("Top");
    for _ in 0..3 {
        let s = Signal::named("tmp", 1);
        top.comb([s.value().assign(Value::int(0)).unwrap()]).unwrap();
    }
    top
}

#[test]
fn missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    assert_eq!(load_config(dir.path()).unwrap(), ElabConfig::default());
}

#[test]
fn separator_shapes_identifiers() {
    let dir = project_with("[naming]\nseparator = \"__\"\n");
    let config = load_config(dir.path()).unwrap();
    let design = lower(colliding_signals(), &config).unwrap();
    let names: Vec<&str> = design.names().iter().map(|(_, n)| n).collect();
    assert_eq!(names, vec!["tmp", "Top__tmp", "Top__tmp__1"]);
}

#[test]
fn disabled_suffixes_surface_conflicts() {
    let dir = project_with("[naming]\nnumeric_suffix = false\n");
    let config = load_config(dir.path()).unwrap();
    let err = lower(colliding_signals(), &config).unwrap_err();
    assert!(matches!(
        err,
        ElabError::Naming(NamingConflictError::Identifier { .. })
    ));
}

#[test]
fn memory_domain_comes_from_config() {
    let dir = project_with("[domains]\ndefault_memory_domain = \"mem\"\n");
    let config = load_config(dir.path()).unwrap();
    let mut top = Module::new("Top");
    top.add_domain(ClockDomain::new("mem")).unwrap();
    let mut mem = Memory::new(4, 8);
    mem.port(PortConfig::default()).unwrap();
    top.add_special(mem).unwrap();
    let design = lower(top, &config).unwrap();
    let Special::Memory(mem) = &design.top().specials()[0] else {
        panic!("expected a memory");
    };
    assert_eq!(mem.ports()[0].clock_domain(), Some("mem"));
}

#[test]
fn undeclared_sync_can_be_required() {
    let count = Signal::named("count", 2);
    let counter = || {
        let mut top = Module::new("Top");
        top.sync("sync", [count.value().assign(count.value().add(Value::int(1))).unwrap()])
            .unwrap();
        top
    };

    let design = lower(counter(), &ElabConfig::default()).unwrap();
    assert_eq!(design.domains()[0].name(), "sync");

    let dir = project_with("[domains]\ncreate_sync = false\n");
    let config = load_config(dir.path()).unwrap();
    assert_eq!(
        lower(counter(), &config).unwrap_err(),
        ElabError::Finalization(FinalizationError::UndefinedDomain {
            module: "Top".into(),
            domain: "sync".into(),
        })
    );
}

#[test]
fn invalid_values_are_rejected() {
    for (toml, field) in [
        ("[finalize]\nmax_rounds = 0\n", "finalize.max_rounds"),
        ("[naming]\nseparator = \"\"\n", "naming.separator"),
        ("[domains]\ndefault_memory_domain = \"comb\"\n", "domains.default_memory_domain"),
    ] {
        let dir = project_with(toml);
        match load_config(dir.path()) {
            Err(ConfigError::ValidationError { field: got, .. }) => assert_eq!(got, field),
            other => panic!("expected a validation error for {field}, got {other:?}"),
        }
    }
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let dir = project_with("[finalize\nmax_rounds = 2\n");
    assert!(matches!(
        load_config(dir.path()),
        Err(ConfigError::ParseError(_))
    ));
}
