use std::path::PathBuf;
use std::process::exit;

use clap::Parser as CliParser;

use reflc::diagnostic::DiagnosticRenderer;
use reflc::scope::ObjectKind;
use reflc::translator::Translator;

#[derive(CliParser, Debug)]
#[clap(
    name = "reflc",
    about = "C-declaration translator that builds reflection metadata",
    allow_hyphen_values = true
)]
struct Cli {
    /// Input files to translate
    #[clap(value_name = "FILE", required = true)]
    input_files: Vec<PathBuf>,

    /// Files registered for quoted `#include` resolution
    #[clap(short = 'i', long = "include", value_name = "FILE", action = clap::ArgAction::Append)]
    include_files: Vec<PathBuf>,

    /// Preprocessor macro definitions
    #[clap(short = 'D', long = "define", value_name = "NAME[=VALUE]", action = clap::ArgAction::Append)]
    defines: Vec<String>,

    /// Print the file-scope object table after a successful run
    #[clap(long = "dump-objects")]
    dump_objects: bool,

    /// Enable verbose output
    #[clap(short = 'v', long = "verbose")]
    verbose: bool,
}

/// The main entry point for the application.
fn main() {
    if !run() {
        exit(1);
    }
}

fn run() -> bool {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    let _ = logger.try_init();

    // `NAME` alone defines the macro as `1`, matching cc's -D.
    let defines: Vec<(String, String)> = cli
        .defines
        .iter()
        .map(|def| match def.find('=') {
            Some(eq) => (def[..eq].to_string(), def[eq + 1..].to_string()),
            None => (def.clone(), "1".to_string()),
        })
        .collect();

    let renderer = DiagnosticRenderer::default();
    let mut ok = true;
    for path in &cli.input_files {
        if !translate_file(path, &cli, &defines, &renderer) {
            ok = false;
        }
    }
    ok
}

/// Run one file through its own translator. Independent units share no
/// state, so a failed file never poisons the next one.
fn translate_file(
    path: &PathBuf,
    cli: &Cli,
    defines: &[(String, String)],
    renderer: &DiagnosticRenderer,
) -> bool {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("reflc: cannot read '{}': {}", path.display(), err);
            return false;
        }
    };

    let mut translator = Translator::new();
    for (name, replacement) in defines {
        translator.define_macro(name, replacement);
    }
    for include in &cli.include_files {
        match std::fs::read_to_string(include) {
            Ok(text) => {
                translator.add_include_buffer(&include.display().to_string(), &text);
            }
            Err(err) => {
                eprintln!("reflc: cannot read '{}': {}", include.display(), err);
                return false;
            }
        }
    }

    log::debug!("translating {}", path.display());
    let unit = translator.parse_source(&path.display().to_string(), &text);

    if translator.has_errors() {
        renderer.print_all(&translator.diagnostics, &translator.sources);
        eprintln!(
            "reflc: {} error(s) in '{}'",
            translator.diagnostics.error_count(),
            path.display()
        );
        return false;
    }

    if cli.dump_objects {
        if let Some(unit) = unit {
            dump_objects(&translator, &unit);
        }
    }
    true
}

/// Print the file-scope object table, one line per object, with the
/// reconstructed type spelled outside-in.
fn dump_objects(translator: &Translator, unit: &reflc::translator::TranslationUnit) {
    for &object_ref in &unit.globals {
        let object = translator.scopes.object(object_ref);
        let kind = match object.kind {
            ObjectKind::Variable => "var",
            ObjectKind::Typedef => "typedef",
            ObjectKind::Function { body: Some(_) } => "func (defined)",
            ObjectKind::Function { body: None } => "func",
            ObjectKind::EnumConstant { .. } => "enum const",
        };
        let mut line = format!(
            "{:<16} {:<14} {}",
            object.name.as_str(),
            kind,
            translator.types.describe(object.ty)
        );
        if let ObjectKind::EnumConstant { value, .. } = object.kind {
            line.push_str(&format!(" = {}", value));
        }
        println!("{}", line);
    }
}
