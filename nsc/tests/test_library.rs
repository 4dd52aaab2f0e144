use std::{
    path::{Path, PathBuf},
    sync::{atomic::AtomicBool, Arc},
};

use nsc::prelude::*;

const NWSCRIPT: &str = include_str!("fixtures/nwscript.nss");

fn compiler() -> Compiler {
    let engine = EngineTable::from_source("test", NWSCRIPT).unwrap();
    Compiler::new(Arc::new(engine))
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("nsc_{}_{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_bundled_library_compiles() {
    let output = compiler().compile("library", include_str!("fixtures/library.nss"));
    assert!(output.is_success(), "{:?}", output.diagnostics);
    assert_eq!(output.count(Severity::Error), 0);
    assert_eq!(output.count(Severity::Warning), 0);
    // One notice per bundled include, each expanded once.
    assert_eq!(output.count(Severity::Info), nsc_includes::LIBRARY.len());
}

#[test]
fn test_every_entry_checksum() {
    for entry in nsc_includes::LIBRARY {
        assert!(entry.verify(), "{}", entry.name);
        assert_eq!(entry.checksum, nsc_includes::fnv1a(entry.source.as_bytes()));
    }
}

#[test]
fn test_project_shadows_bundled() {
    let project = MemoryProvider::new("project").with("nw_i0_math", "int MathMax(int a, int b) { return 0; }");
    let output = compiler()
        .with_resolver(IncludeResolver::new().with_project(project))
        .compile("main", "#include \"nw_i0_math\"\nvoid main() { PrintInteger(MathMax(1, 2)); }");
    assert!(output.is_success());
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
}

#[test]
fn test_bundled_disabled() {
    let output = compiler()
        .with_resolver(IncludeResolver::new().with_bundled(false))
        .compile("main", "#include \"nw_i0_math\"\nvoid main() {}");
    assert!(matches!(output.error, Some(NscError::UnresolvedInclude { .. })));
    assert_eq!(output.diagnostics.last().unwrap().code, DiagCode::UnresolvedInclude);
}

#[test]
fn test_batch() {
    let paths = vec![
        fixture("hello.nss"),
        fixture("broken.nss"),
        fixture("conditional.nss"),
        fixture("missing.nss"),
    ];
    let outputs = compiler().compile_batch(&paths, 3, &AtomicBool::new(false));

    let names: Vec<&str> = outputs.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["hello", "broken", "conditional", "missing"]);
    let success: Vec<bool> = outputs.iter().map(|o| o.is_success()).collect();
    assert_eq!(success, vec![true, false, true, false]);
    assert!(matches!(outputs[3].error, Some(NscError::Io(_))));

    let single = compiler().compile_file(fixture("hello.nss"));
    assert_eq!(single.object.unwrap().bytes, outputs[0].object.as_ref().unwrap().bytes);
}

#[test]
fn test_batch_cancelled() {
    let paths = vec![fixture("hello.nss"), fixture("conditional.nss")];
    let outputs = compiler().compile_batch(&paths, 2, &AtomicBool::new(true));
    assert!(outputs.is_empty());
}

#[test]
fn test_config() {
    let yaml = format!(
        "table_version: test\nnwscript: '{}'\ninclude_paths: ['{}']\nwarnings_as_errors: true\n",
        fixture("nwscript.nss").display(),
        fixture("").display(),
    );
    let conf = CompilerConf::from_reader(yaml.as_bytes()).unwrap();
    let compiler = Compiler::from_conf(&conf).unwrap();
    assert_eq!(compiler.engine().version(), "test");

    // The fixture directory is a project include path.
    let output = compiler.compile("main", "#include \"conditional\"");
    assert!(output.is_success(), "{:?}", output.diagnostics);
    assert!(output.diagnostics.is_empty());
}

#[test]
fn test_config_requires_table_version() {
    let yaml = format!("nwscript: '{}'\n", fixture("nwscript.nss").display());
    let conf = CompilerConf::from_reader(yaml.as_bytes()).unwrap();
    assert!(matches!(Compiler::from_conf(&conf), Err(NscError::EngineTable(_))));
}

#[test]
fn test_single_byte_source() {
    let dir = scratch_dir("latin1");
    let path = dir.join("greet.nss");
    std::fs::write(&path, b"// caf\xE9\nvoid main() { PrintString(\"\xE9t\xE9\"); }\n").unwrap();

    let output = compiler().compile_file(&path);
    assert!(output.is_success(), "{:?} {:?}", output.error, output.diagnostics);
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);

    let bytes = output.object.unwrap().bytes;
    let consts: &[u8] = &[0x04, 0x05, 0x00, 0x03, 0xE9, b't', 0xE9];
    assert!(bytes.windows(consts.len()).any(|window| window == consts));
}

#[test]
fn test_sibling_include() {
    let dir = scratch_dir("siblings");
    std::fs::write(dir.join("inc_heal.nss"), "int HealAmount() { return 5; }\n").unwrap();
    std::fs::write(
        dir.join("heal.nss"),
        "#include \"inc_heal\"\nvoid main() { PrintInteger(HealAmount()); }\n",
    )
    .unwrap();

    let output = compiler().compile_file(dir.join("heal.nss"));
    assert!(output.is_success(), "{:?} {:?}", output.error, output.diagnostics);
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert_eq!(output.name, "heal");

    // Without the unit's directory the include is not found.
    let source = std::fs::read_to_string(dir.join("heal.nss")).unwrap();
    let output = compiler().compile("heal", &source);
    assert!(matches!(output.error, Some(NscError::UnresolvedInclude { .. })));
}
