mod bench;
mod check;
mod inspect;

use clap::{Parser, Subcommand};
use eyre_pretty::{Context, Result};
use vtxdec::DecoderOptions;

/// Parses a vertex type code, in decimal, hexadecimal (`0x`) or binary (`0b`). Underscores are
/// ignored.
fn parse_vtype(code: &str) -> Result<u32> {
    let code = code.replace("_", "");
    let code = if let Some(code) = code.strip_prefix("0x") {
        u32::from_str_radix(code, 16)
    } else if let Some(code) = code.strip_prefix("0b") {
        u32::from_str_radix(code, 2)
    } else {
        code.parse()
    };

    code.context("parsing vertex type code")
}

#[derive(Debug, Clone, Copy, clap::Args)]
struct Options {
    /// Keep integer texture coordinates as integers when possible
    #[arg(long, default_value_t = false)]
    raw_uv: bool,
    /// Expand 8-bit normals to floats
    #[arg(long, default_value_t = false)]
    expand_normals: bool,
    /// Apply the UV scale and offset while decoding
    #[arg(long, default_value_t = false)]
    prescale_uv: bool,
    /// Double the range of 16-bit texture coordinates
    #[arg(long, default_value_t = false)]
    double_uv: bool,
}

impl From<Options> for DecoderOptions {
    fn from(value: Options) -> Self {
        Self {
            expand_uv_to_float: !value.raw_uv,
            expand_8bit_normals_to_float: value.expand_normals,
            prescale_uv: value.prescale_uv,
            double_tex_coords: value.double_uv,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Describe the decoders of the given vertex types
    Describe {
        /// Vertex type codes
        #[arg(required = true)]
        codes: Vec<String>,
        /// Show the pipeline and layouts of each decoder
        #[arg(short, long, default_value_t = false)]
        detailed: bool,
        #[command(flatten)]
        options: Options,
    },
    /// Check that compiled decoders produce the same output as the interpreter
    ///
    /// Without codes, random vertex types are checked.
    Check {
        /// Vertex type codes
        codes: Vec<String>,
        /// Amount of random vertex types to check
        #[arg(short, long, default_value_t = 1000)]
        count: usize,
        /// Seed of the random generator
        #[arg(short, long)]
        seed: Option<u64>,
        #[command(flatten)]
        options: Options,
    },
    /// Measure the throughput of the interpreter and of the compiled decoder
    Bench {
        /// Vertex type code
        code: String,
        /// Vertices decoded per iteration
        #[arg(short, long, default_value_t = 4096)]
        vertices: usize,
        /// Amount of iterations
        #[arg(short, long, default_value_t = 256)]
        iterations: usize,
        #[command(flatten)]
        options: Options,
    },
    /// Print the code generated for a vertex type
    Disasm {
        /// Vertex type code
        code: String,
        /// Print the Cranelift IR instead of the machine code
        #[arg(long, default_value_t = false)]
        ir: bool,
        #[command(flatten)]
        options: Options,
    },
}

/// A CLI to inspect, check and benchmark vertex decoders.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Action to take
    #[command(subcommand)]
    command: Command,
}

fn setup_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or(EnvFilter::new("vtxtool=info,vtxdec=info,vtxjit=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn main() -> Result<()> {
    eyre_pretty::install()?;
    setup_tracing();

    let config = Args::parse();
    match config.command {
        Command::Describe {
            codes,
            detailed,
            options,
        } => {
            let vtypes = codes
                .iter()
                .map(|code| parse_vtype(code))
                .collect::<Result<Vec<_>>>()?;

            inspect::describe(&vtypes, options.into(), detailed)
        }
        Command::Check {
            codes,
            count,
            seed,
            options,
        } => {
            let vtypes = codes
                .iter()
                .map(|code| parse_vtype(code))
                .collect::<Result<Vec<_>>>()?;

            check::check(&vtypes, count, seed, options.into())
        }
        Command::Bench {
            code,
            vertices,
            iterations,
            options,
        } => bench::bench(parse_vtype(&code)?, vertices, iterations, options.into()),
        Command::Disasm { code, ir, options } => {
            inspect::disasm(parse_vtype(&code)?, options.into(), ir)
        }
    }
}
