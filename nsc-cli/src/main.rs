//! Entrypoint for CLI
use std::{
    env,
    error::Error,
    fs,
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
    time::Instant,
};

use log::{debug, error, info};
use nsc::{prelude::*, IMPL_VERSION};

static USAGE: &str = r#"
usage: nsc CMD [OPTIONS] [FILE...]

commands:
    compile     Compile scripts into NCS objects
    dis         Print the instruction listing of an NCS object
    includes    List the bundled include library

compile options:
    -o OUT                  Output file, or directory when compiling many files
    --config FILE           Configuration file (default: nsc.yaml if present)
    --nwscript FILE         Engine definition script
    --table-version V       Version label of the engine table (required here or in the config)
    -I DIR                  Add a project include directory
    --no-bundled            Do not fall back to the bundled include library
    --listing               Print the instruction listing of each object

examples:
    nsc compile --nwscript nwscript.nss --table-version nwn scripts/heal.nss
    nsc compile -o build scripts/*.nss
    nsc dis build/heal.ncs
"#;

/// Configuration file picked up from the working directory.
const DEFAULT_CONFIG: &str = "nsc.yaml";

fn run_compile(args: CompileArgs) -> Result<bool, Box<dyn Error>> {
    let mut conf = match &args.config {
        Some(path) => CompilerConf::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => CompilerConf::from_file(DEFAULT_CONFIG)?,
        None => CompilerConf::default(),
    };
    if let Some(path) = args.nwscript {
        conf.nwscript = Some(path);
    }
    if let Some(version) = args.table_version {
        conf.table_version = Some(version);
    }
    conf.include_paths.extend(args.include_paths);
    if args.no_bundled {
        conf.use_bundled_library = false;
    }
    debug!("{:?}", conf);

    let compiler = Compiler::from_conf(&conf)?;
    info!(
        "engine table {} with {} functions",
        compiler.engine().version(),
        compiler.engine().functions().len()
    );

    let start = Instant::now();
    let cancel = AtomicBool::new(false);
    let outputs = compiler.compile_batch(&args.files, conf.jobs(), &cancel);

    let mut failed = 0;
    for (path, output) in args.files.iter().zip(outputs.iter()) {
        for diagnostic in &output.diagnostics {
            eprintln!("{}", diagnostic);
        }

        let object = match &output.object {
            Some(object) => object,
            None => {
                error!("{}: compile failed", path.display());
                failed += 1;
                continue;
            }
        };

        let out_path = output_path(path, args.output.as_deref(), args.files.len() > 1);
        fs::write(&out_path, &object.bytes)?;
        info!("wrote {} ({} bytes)", out_path.display(), object.bytes.len());

        if args.listing {
            print!("{}", Disassembler::new(&object.bytes).listing()?);
        }
    }

    println!(
        "{} compiled, {} failed in {}ms",
        outputs.len() - failed,
        failed,
        start.elapsed().as_nanos() as f64 / 1000000.0
    );

    Ok(failed == 0)
}

/// Where the object of `source` is written.
fn output_path(source: &Path, output: Option<&Path>, many: bool) -> PathBuf {
    match output {
        Some(dir) if many || dir.is_dir() => {
            let file_name = source.with_extension("ncs");
            dir.join(file_name.file_name().unwrap_or(file_name.as_os_str()))
        }
        Some(file) => file.to_path_buf(),
        None => source.with_extension("ncs"),
    }
}

fn run_disassembler(filepath: impl AsRef<Path>) -> NscResult<()> {
    let bytecode = fs::read(filepath.as_ref())?;
    print!("{}", Disassembler::new(&bytecode).listing()?);
    Ok(())
}

fn print_includes() {
    println!("bundled include library, revision {}", nsc_includes::LIBRARY_REVISION);
    for entry in nsc_includes::LIBRARY {
        println!(
            "{: <16} {:016x} {: >6} bytes",
            entry.name,
            entry.checksum,
            entry.source.len()
        );
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    simple_logger::SimpleLogger::new().env().init()?;

    match parse_args() {
        Some(Cmd::Compile(args)) => {
            if !run_compile(args)? {
                std::process::exit(1)
            }
        }
        Some(Cmd::Dis { filepath }) => run_disassembler(filepath)?,
        Some(Cmd::Includes) => print_includes(),
        None => {
            print_usage();
            // FreeBSD EX_USAGE (64)
            std::process::exit(64)
        }
    }

    Ok(())
}

fn parse_args() -> Option<Cmd> {
    let mut args = env::args().skip(1);
    match args.next()?.as_str() {
        "compile" => parse_compile(args).map(Cmd::Compile),
        "dis" => Some(Cmd::Dis {
            filepath: consume_arg(&mut args)?,
        }),
        "includes" => Some(Cmd::Includes),
        _ => None,
    }
}

fn parse_compile(mut args: impl Iterator<Item = String>) -> Option<CompileArgs> {
    let mut compile = CompileArgs::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-o" => compile.output = Some(consume_arg(&mut args)?.into()),
            "--config" => compile.config = Some(consume_arg(&mut args)?.into()),
            "--nwscript" => compile.nwscript = Some(consume_arg(&mut args)?.into()),
            "--table-version" => compile.table_version = Some(consume_arg(&mut args)?),
            "-I" => compile.include_paths.push(consume_arg(&mut args)?.into()),
            "--no-bundled" => compile.no_bundled = true,
            "--listing" => compile.listing = true,
            flag if flag.starts_with('-') => return None,
            _ => compile.files.push(PathBuf::from(&arg)),
        }
    }

    if compile.files.is_empty() {
        None
    } else {
        Some(compile)
    }
}

/// Consumes the next argument, or `None` if there isn't one.
fn consume_arg(args: &mut impl Iterator<Item = String>) -> Option<String> {
    args.next()
}

fn print_usage() {
    println!("nsc v{IMPL_VERSION}");
    println!("{USAGE}");
}

enum Cmd {
    /// Compile scripts
    Compile(CompileArgs),
    /// Disassemble an object
    Dis { filepath: String },
    /// List bundled includes
    Includes,
}

#[derive(Default)]
struct CompileArgs {
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    nwscript: Option<PathBuf>,
    table_version: Option<String>,
    include_paths: Vec<PathBuf>,
    no_bundled: bool,
    listing: bool,
    files: Vec<PathBuf>,
}
