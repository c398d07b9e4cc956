use std::{
    error::Error,
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    process,
};

use docopt::Docopt;
use jackc::{Compiler, CompilerConfig, VmWriter};
use log::{error, info};
use rayon::prelude::{IntoParallelRefIterator, ParallelIterator};
use serde::Deserialize;

const USAGE: &str = "
Jack compiler: translates .jack classes into VM code.

Usage:
  jackc [options] <input>...
  jackc (-h | --help)
  jackc --version

Each input is a .jack file or a directory whose .jack files are compiled.
Output is written next to each source as <name>.vm.

Options:
  -h --help      Show this screen.
  --version      Show version.
  --comments     Emit // marker comments in the generated code.
  --stdout       Print the generated code instead of writing .vm files.
  --jobs=<n>     Worker threads, 0 for one per core [default: 0].
";

#[derive(Debug, Deserialize)]
struct Args {
    arg_input: Vec<String>,
    flag_comments: bool,
    flag_stdout: bool,
    flag_jobs: usize,
}

type UnitResult = Result<Option<String>, Box<dyn Error + Send + Sync>>;

fn main() {
    env_logger::init();
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| {
            d.version(Some(env!("CARGO_PKG_VERSION").to_string()))
                .deserialize()
        })
        .unwrap_or_else(|e| e.exit());

    let units = match collect_units(&args.arg_input) {
        Ok(u) => u,
        Err(e) => {
            eprintln!("{e}");
            process::exit(2);
        }
    };
    let compiler = Compiler::new(CompilerConfig {
        emit_comments: args.flag_comments,
    });

    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(args.flag_jobs)
        .build()
    {
        Ok(p) => p,
        Err(e) => {
            eprintln!("cannot start worker pool: {e}");
            process::exit(2);
        }
    };
    let results = pool.install(|| compile_all(&compiler, &units, args.flag_stdout));
    let stdout = io::stdout();
    let failed = report(&units, results, &mut stdout.lock());
    let status = exit_status(failed);
    if status != 0 {
        process::exit(status);
    }
}

/// Compiles every unit on the current rayon pool. Results keep input order.
fn compile_all(compiler: &Compiler, units: &[PathBuf], to_stdout: bool) -> Vec<UnitResult> {
    units
        .par_iter()
        .map(|path| compile_unit(compiler, path, to_stdout))
        .collect()
}

/// Prints generated text and failures. A failed unit does not hide the
/// results of the others. Returns the number of failures.
fn report<W: Write>(units: &[PathBuf], results: Vec<UnitResult>, out: &mut W) -> usize {
    let mut failed = 0;
    for (path, result) in units.iter().zip(results) {
        match result {
            Ok(Some(text)) => {
                if let Err(e) = out.write_all(text.as_bytes()) {
                    error!("cannot write to stdout: {e}");
                    failed += 1;
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!("{}: {e}", path.display());
                eprintln!("{}: {e}", path.display());
                failed += 1;
            }
        }
    }
    failed
}

fn exit_status(failed: usize) -> i32 {
    if failed > 0 {
        1
    } else {
        0
    }
}

/// `.jack` files named by `inputs`, expanding directories one level deep.
fn collect_units(inputs: &[String]) -> io::Result<Vec<PathBuf>> {
    let mut units = Vec::new();
    for input in inputs {
        let path = Path::new(input);
        if path.is_dir() {
            let mut found = Vec::new();
            for entry in fs::read_dir(path)? {
                let entry = entry?;
                if entry.file_type()?.is_file() && is_jack_file(&entry.path()) {
                    found.push(entry.path());
                }
            }
            found.sort();
            if found.is_empty() {
                info!("no .jack files in {}", path.display());
            }
            units.extend(found);
        } else if path.is_file() && is_jack_file(path) {
            units.push(path.to_path_buf());
        } else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{input}: not a .jack file or directory"),
            ));
        }
    }
    Ok(units)
}

fn is_jack_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("jack")
}

fn compile_unit(compiler: &Compiler, path: &Path, to_stdout: bool) -> UnitResult {
    info!("compiling {}", path.display());
    let source = fs::read_to_string(path)?;
    if to_stdout {
        let mut buf = Vec::new();
        compiler.compile_to(&source, &mut buf)?;
        return Ok(Some(String::from_utf8(buf)?));
    }
    let code = compiler.compile_str(&source)?;
    let out_path = path.with_extension("vm");
    let mut writer = VmWriter::new(BufWriter::new(File::create(&out_path)?));
    writer.write_all(&code)?;
    info!("wrote {}", out_path.display());
    Ok(None)
}
