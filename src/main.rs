use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use acorn::diagnostic::render_diagnostics;
use acorn::module::CodegenBackend;

#[derive(Parser)]
#[command(name = "acorn", version, about = "Front-end and mid-end compiler for the acorn language")]
struct Cli {
    /// Source file to compile.
    path: PathBuf,

    /// Raise the log level one step per occurrence (warn -> info -> debug -> trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Backend stub: real LLVM emission is out of scope for this crate
/// (§1, §6). This exists only so the driver's sequencing can be
/// exercised end to end without a real codegen collaborator.
struct UnimplementedBackend;

impl CodegenBackend for UnimplementedBackend {
    fn emit_llvm_ir(&self, _module: &acorn::module::Module) -> std::io::Result<String> {
        Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "LLVM IR emission is not implemented in this crate"))
    }

    fn emit_object(&self, _module: &acorn::module::Module) -> std::io::Result<Vec<u8>> {
        Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "object emission is not implemented in this crate"))
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let source = match std::fs::read_to_string(&cli.path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("{}: I/O error: {err}", cli.path.display());
            return ExitCode::from(64);
        }
    };

    log::info!("compiling {}", cli.path.display());
    let ast = acorn::parse_source(&source);

    if !ast.diagnostics.is_empty() {
        log::debug!("{} parse diagnostic(s)", ast.diagnostics.len());
        let filename = cli.path.display().to_string();
        render_diagnostics(&ast.diagnostics, &filename, &source);
        return ExitCode::from(1);
    }

    let module_name = cli
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "module".to_string());

    let (module, _mirs, diagnostics) = acorn::compile_module(&ast, module_name);

    if !diagnostics.is_empty() {
        log::debug!("{} lowering diagnostic(s)", diagnostics.len());
        let filename = cli.path.display().to_string();
        render_diagnostics(&diagnostics, &filename, &source);
        return ExitCode::from(1);
    }

    let backend = UnimplementedBackend;
    let ll_path = cli.path.with_extension("ll");
    let o_path = cli.path.with_extension("o");

    match backend.emit_llvm_ir(&module) {
        Ok(ir) => {
            if let Err(err) = std::fs::write(&ll_path, ir) {
                eprintln!("{}: I/O error: {err}", ll_path.display());
                return ExitCode::from(64);
            }
        }
        Err(err) => {
            log::warn!("codegen backend unavailable: {err}");
        }
    }

    match backend.emit_object(&module) {
        Ok(obj) => {
            if let Err(err) = std::fs::write(&o_path, obj) {
                eprintln!("{}: I/O error: {err}", o_path.display());
                return ExitCode::from(64);
            }
        }
        Err(err) => {
            log::warn!("codegen backend unavailable: {err}");
        }
    }

    ExitCode::SUCCESS
}
