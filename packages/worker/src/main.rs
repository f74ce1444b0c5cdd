use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use funcell_artifact::ArtifactKind;
use funcell_worker::{Worker, WorkerConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ArtifactArg {
    /// The artifact bytes are the unit itself.
    Direct,
    /// The artifact bytes are a zip archive containing the unit.
    Archive,
}

/// funcell - serve invocations of one WASM function module over stdio
#[derive(Parser, Debug)]
#[command(name = "funcell")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Artifact shape carried by `function` messages
    #[arg(long, value_enum, default_value_t = ArtifactArg::Archive)]
    artifact: ArtifactArg,

    /// Entry export invoked per request [default: `handle`, or `main` for
    /// direct artifacts]
    #[arg(long)]
    entry: Option<String>,

    /// Unit name resolved from the artifact
    #[arg(long, default_value = "Function")]
    unit: String,

    /// Extension appended to the unit name when scanning archive entries
    #[arg(long, default_value = ".wasm")]
    unit_extension: String,
}

fn main() {
    // Diagnostics go to stderr; stdout carries protocol envelopes only.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let artifact = match args.artifact {
        ArtifactArg::Direct => ArtifactKind::Direct,
        ArtifactArg::Archive => ArtifactKind::Archive,
    };
    let entry = args.entry.unwrap_or_else(|| {
        match artifact {
            ArtifactKind::Direct => "main",
            ArtifactKind::Archive => "handle",
        }
        .to_string()
    });
    let config = WorkerConfig {
        artifact,
        entry,
        unit_name: args.unit,
        unit_extension: args.unit_extension,
    };

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut worker = Worker::new(config);
    if let Err(e) = worker.run(stdin.lock(), stdout.lock()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
