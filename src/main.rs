use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use kaleido::Driver;

#[derive(Parser)]
#[command(name = "kaleido", version, about = "Incremental compiler and REPL for a small expression language")]
struct Cli {
    /// Script to run; drops into the REPL when omitted.
    script: Option<PathBuf>,

    /// Print the lowered IR of each compiled form.
    #[arg(long)]
    dump_ir: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut driver = Driver::new();
    driver.dump_ir = cli.dump_ir;

    match cli.script {
        Some(path) => {
            let src = match fs::read_to_string(&path) {
                Ok(src) => src,
                Err(e) => {
                    eprintln!("error: failed to read {}: {}", path.display(), e);
                    process::exit(1);
                }
            };
            if !driver.run_script(&src) {
                process::exit(1);
            }
        }
        None => {
            // The REPL always echoes what it compiled.
            driver.dump_ir = true;
            if let Err(e) = driver.repl() {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        }
    }
}
