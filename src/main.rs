use std::fs::File;
use std::io::BufReader;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use bitvec::vec::BitVec;
use clap::{Parser, ValueEnum};

use rexrs::circuit::Circuit;
use rexrs::literal::{Assignment, Instance, Literal, VariableIdx};

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    None,
}

impl LogLevel {
    fn to_trace(&self) -> Option<tracing::Level> {
        Some(match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::None => return None,
        })
    }
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the compiled circuit emitted by the external compiler
    #[arg(short, long, value_name = "circuit.nnf")]
    circuit: String,

    /// The instance to explain, one 0/1 per variable, e.g. 1,0,1,1,1
    #[arg(short, long, value_name = "BITS")]
    instance: String,

    /// Print the minimal sufficient reasons for the decision.
    #[arg(short, long)]
    reasons: bool,

    /// Print the literals shared by every sufficient reason.
    #[arg(long)]
    necessary_property: bool,

    /// Print the unique necessary reason, if one exists.
    #[arg(long)]
    necessary_reason: bool,

    /// Check whether the given literals explain the decision, e.g. -2,-4
    #[arg(short, long, value_name = "LITS")]
    because: Option<String>,

    /// Variables to flip before re-checking --because (even-if query)
    #[arg(short, long, value_name = "VARS")]
    flip: Option<String>,

    /// Check the decision for bias against the protected variables.
    #[arg(long)]
    bias: bool,

    /// Unprotected-variable mask for --bias, one 0/1 per variable
    #[arg(short, long, value_name = "BITS")]
    unprotected: Option<String>,

    /// Check decomposability and determinism before answering queries.
    #[arg(long)]
    validate: bool,

    /// Verbosity level. See `tracing::Level` for more information.
    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    verbosity: LogLevel,

    /// Print timing and size statistics.
    #[arg(short, long)]
    print_statistics: bool,
}

#[derive(Debug, Clone, Default)]
struct Statistics {
    parsing: Option<Duration>,
    preparation: Option<Duration>,
    enumeration: Option<Duration>,

    circuit_size: Option<usize>,
    decision_circuit_size: Option<usize>,
}

impl Statistics {
    fn print(&self) {
        if let Some(parsing) = self.parsing {
            println!("parsing time    : {parsing:.2?}");
        }
        if let Some(preparation) = self.preparation {
            println!("preparation time: {preparation:.2?}");
        }
        if let Some(enumeration) = self.enumeration {
            println!("enumeration time: {enumeration:.2?}");
        }
        if let Some(size) = self.circuit_size {
            println!("circuit size          : {size}");
        }
        if let Some(size) = self.decision_circuit_size {
            println!("decision circuit size : {size}");
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    if let Some(level) = args.verbosity.to_trace() {
        tracing_subscriber::fmt().with_max_level(level).init();
    }

    let mut statistics = Statistics::default();

    let file = File::open(&args.circuit)
        .with_context(|| format!("could not open circuit file {}", args.circuit))?;
    let mut reader = BufReader::new(file);

    let parsing_start = Instant::now();
    let circuit = Circuit::from_compiled(&mut reader).context("could not parse circuit")?;
    statistics.parsing = Some(parsing_start.elapsed());
    statistics.circuit_size = Some(circuit.node_count());

    if args.validate {
        circuit.validate().context("circuit is not well-formed")?;
    }

    let instance = parse_instance(&args.instance)?;

    let preparation_start = Instant::now();
    let decision = circuit
        .decision_circuit(&instance)
        .context("could not build the decision circuit")?;
    statistics.preparation = Some(preparation_start.elapsed());
    statistics.decision_circuit_size = Some(decision.node_count());

    if args.reasons {
        let enumeration_start = Instant::now();
        let reasons = decision.sufficient_reasons();
        statistics.enumeration = Some(enumeration_start.elapsed());
        println!("{reasons}");
    }

    if args.necessary_property {
        println!("necessary property: {}", decision.necessary_property());
    }

    if args.necessary_reason {
        println!("necessary reason: {}", decision.necessary_reason());
    }

    if let Some(ref literals) = args.because {
        let candidate = parse_assignment(literals)?;
        let holds = match args.flip {
            Some(ref variables) => {
                let variables = parse_variables(variables)?;
                circuit.even_if_because(&instance, &candidate, &variables)?
            }
            None => decision.because(&candidate),
        };
        println!("because: {holds}");
    }

    if args.bias {
        let Some(ref mask) = args.unprotected else {
            bail!("--bias requires --unprotected");
        };
        let unprotected = parse_bits(mask)?;
        println!("biased: {}", decision.decision_bias(&unprotected));
    }

    if args.print_statistics {
        statistics.print();
    }

    Ok(())
}

fn parse_bits(field: &str) -> anyhow::Result<BitVec> {
    field
        .split(',')
        .map(|token| match token.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => bail!("expected 0 or 1, found '{other}'"),
        })
        .collect()
}

fn parse_instance(field: &str) -> anyhow::Result<Instance> {
    Ok(Instance::from_bits(parse_bits(field)?))
}

fn parse_assignment(field: &str) -> anyhow::Result<Assignment> {
    let literals: Vec<Literal> = field
        .split(',')
        .map(|token| {
            let value = token
                .trim()
                .parse::<i64>()
                .with_context(|| format!("literal '{token}' is invalid"))?;
            Literal::from_dimacs(value)
                .with_context(|| format!("literal '{token}' denotes no variable"))
        })
        .collect::<anyhow::Result<_>>()?;

    Ok(Assignment::from_literals(literals))
}

fn parse_variables(field: &str) -> anyhow::Result<Vec<VariableIdx>> {
    field
        .split(',')
        .map(|token| {
            let index = token
                .trim()
                .parse::<u32>()
                .with_context(|| format!("variable '{token}' is invalid"))?;
            if index == 0 {
                bail!("variables are numbered from 1");
            }
            Ok(VariableIdx(index))
        })
        .collect()
}
