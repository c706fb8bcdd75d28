//! Command-line front end.
//!
//! Arguments ending in `.cat` decode to a sibling `.mact` in the current
//! directory; `.mact` inputs encode to `.cat`. `--GENERATE-TEMPLATES <dir>`
//! sweeps a corpus instead and writes the template tables. Failures abort the
//! current file only; the process exits non-zero if any file failed.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use mact::db::{self, Databases};
use mact::decode::{DecodeOptions, decode, observe};
use mact::encode::{EncodeOptions, encode};
use mact::generate::TemplateGenerator;
use mact::mact::{parse, write};

#[derive(Parser)]
#[command(name = "mact", version)]
#[command(about = "Convert CAT game data to and from the MACT text form")]
struct Cli {
    /// Files to convert: `*.cat` decodes to `<base>.mact`, `*.mact` encodes
    /// to `<base>.cat`, both written to the current directory
    inputs: Vec<PathBuf>,

    /// Sweep a directory of CAT files and write template tables instead of
    /// converting anything
    #[arg(
        long = "GENERATE-TEMPLATES",
        alias = "generate-templates",
        value_name = "DIR",
        conflicts_with = "inputs"
    )]
    generate_templates: Option<PathBuf>,

    /// Enable track parameter optimization when encoding
    #[arg(long = "PO", alias = "po")]
    param_optimization: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let databases = Databases::load(Path::new("."));

    if let Some(dir) = &cli.generate_templates {
        return run_generate(dir, &databases);
    }

    let mut converted = 0usize;
    let mut failed = 0usize;
    for input in &cli.inputs {
        let result = match input.extension().and_then(OsStr::to_str) {
            Some("cat") => decode_file(input, &databases),
            Some("mact") => encode_file(input, &databases, cli.param_optimization),
            _ => {
                warn!("ignoring {:?}: not a .cat or .mact file", input);
                continue;
            }
        };
        converted += 1;
        if let Err(message) = result {
            error!("{}: {message}", input.display());
            failed += 1;
        }
    }

    if converted == 0 {
        error!("no CAT or MACT files found");
        return ExitCode::FAILURE;
    }
    if failed > 0 {
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Output file in the current directory: the input's base name up to the
/// first dot, plus the new extension.
fn output_path(input: &Path, extension: &str) -> PathBuf {
    let name = input
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or("output");
    let base = name.split('.').next().unwrap_or(name);
    PathBuf::from(format!("{base}.{extension}"))
}

fn decode_file(input: &Path, databases: &Databases) -> Result<(), String> {
    info!("<< {} >>", input.display());
    let data = fs::read(input).map_err(|e| e.to_string())?;
    let tree = decode(&data, databases, &DecodeOptions::default()).map_err(|e| e.to_string())?;
    let text = write::render(&tree);
    let output = output_path(input, "mact");
    fs::write(&output, text).map_err(|e| e.to_string())?;
    info!("wrote {}", output.display());
    Ok(())
}

fn encode_file(input: &Path, databases: &Databases, optimize: bool) -> Result<(), String> {
    info!("<< {} >>", input.display());
    if !optimize {
        info!("track param optimization is disabled, this will result in bigger files");
    }
    let text = fs::read_to_string(input).map_err(|e| e.to_string())?;
    let tree = parse::parse(&text).map_err(|e| e.to_string())?;
    let options = EncodeOptions {
        optimize,
        ..EncodeOptions::default()
    };
    let bytes = encode(&tree, databases, &options).map_err(|e| e.to_string())?;
    let output = output_path(input, "cat");
    fs::write(&output, bytes).map_err(|e| e.to_string())?;
    info!("wrote {}", output.display());
    Ok(())
}

fn run_generate(dir: &Path, databases: &Databases) -> ExitCode {
    let mut files = Vec::new();
    collect_cat_files(dir, &mut files);
    if files.is_empty() {
        error!("no CAT files found under {}", dir.display());
        return ExitCode::FAILURE;
    }

    let options = DecodeOptions::default();
    let mut generator = TemplateGenerator::new();
    for file in &files {
        info!("<< {} >>", file.display());
        let observations = fs::read(file)
            .map_err(|e| e.to_string())
            .and_then(|data| observe(&data, &options).map_err(|e| e.to_string()));
        match observations {
            Ok(observations) => generator.absorb(observations),
            Err(message) => error!("{}: {message}", file.display()),
        }
    }

    if let Err(e) = fs::create_dir_all("TEMPLATES") {
        error!("unable to create TEMPLATES directory: {e}");
        return ExitCode::FAILURE;
    }
    let tracks = generator.render_tracks(databases, options.endian);
    let conditions = generator.render_conditions(databases, options.endian);
    for (path, text) in [
        (db::TEMPLATES_TRACKS, tracks),
        (db::TEMPLATES_CONDITIONS, conditions),
    ] {
        if let Err(e) = fs::write(path, text) {
            error!("unable to write {path}: {e}");
            return ExitCode::FAILURE;
        }
        info!("wrote {path}");
    }
    ExitCode::SUCCESS
}

fn collect_cat_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        warn!("unable to read directory {}", dir.display());
        return;
    };
    let mut entries: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_cat_files(&path, out);
        } else if path.extension().and_then(OsStr::to_str) == Some("cat") {
            out.push(path);
        }
    }
}
