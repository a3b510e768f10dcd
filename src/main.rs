use clap::Parser;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use jslt::{Compiler, FileResolver, Value};

const EVAL_STACK_SIZE: usize = 256 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "jslt")]
#[command(about = "Transform JSON with a JSLT expression")]
#[command(version)]
struct Cli {
    /// Expression text, instead of an expression file
    #[arg(short = 'e', long = "expr")]
    expr: Option<String>,

    /// Bind an external variable: NAME=JSON (repeatable)
    #[arg(long = "var", value_name = "NAME=JSON")]
    vars: Vec<String>,

    /// Print output on a single line
    #[arg(long = "compact")]
    compact: bool,

    /// Directory imports are resolved against (default: the expression file's directory)
    #[arg(long = "module-path", value_name = "DIR")]
    module_path: Option<String>,

    /// Skip the optimizer
    #[arg(long = "no-optimize")]
    no_optimize: bool,

    /// Expression file
    #[arg()]
    expr_file: Option<String>,

    /// Input JSON file (default: stdin)
    #[arg()]
    input: Option<String>,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    // deep recursion in user functions needs more than the main thread's stack
    let outcome = std::thread::Builder::new()
        .stack_size(EVAL_STACK_SIZE)
        .spawn(move || run(cli))
        .map_err(|e| format!("Cannot start evaluation thread: {}", e))
        .and_then(|handle| handle.join().unwrap_or_else(|_| Err("Evaluation panicked".into())));
    if let Err(message) = outcome {
        eprintln!("Error: {}", message);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    // with -e the first positional is the input
    let (source, source_name, input_path) = match (&cli.expr, &cli.expr_file) {
        (Some(text), file) => (text.clone(), None, file.clone().or(cli.input.clone())),
        (None, Some(file)) => {
            let text = std::fs::read_to_string(file)
                .map_err(|e| format!("Cannot read expression file: {}: {}", file, e))?;
            (text, Some(file.clone()), cli.input.clone())
        }
        (None, None) => {
            return Err("No expression provided. Use -e 'expr' or give an expression file.".into())
        }
    };

    let module_dir = cli.module_path.clone().or_else(|| {
        source_name.as_ref().and_then(|f| {
            std::path::Path::new(f).parent().map(|p| p.to_string_lossy().into_owned())
        })
    });

    let mut compiler = Compiler::new()
        .with_resolver(Arc::new(FileResolver::new(module_dir.unwrap_or_else(|| ".".into()))));
    if let Some(name) = &source_name {
        compiler = compiler.with_source_name(name.as_str());
    }
    if cli.no_optimize {
        compiler = compiler.without_optimization();
    }
    let expression = compiler.compile(&source).map_err(|e| e.to_string())?;

    let variables = parse_vars(&cli.vars)?;

    let input_text = match input_path {
        Some(path) => std::fs::read_to_string(&path)
            .map_err(|e| format!("Cannot read input file: {}: {}", path, e))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("Cannot read stdin: {}", e))?;
            buf
        }
    };
    let input = if input_text.trim().is_empty() {
        Value::Null
    } else {
        Value::from_json_str(&input_text).map_err(|e| format!("Invalid input JSON: {}", e))?
    };

    let output = expression.apply_with(&variables, &input).map_err(|e| e.to_string())?;
    let rendered = if cli.compact {
        serde_json::to_string(&output)
    } else {
        serde_json::to_string_pretty(&output)
    };
    println!("{}", rendered.map_err(|e| e.to_string())?);
    Ok(())
}

fn parse_vars(vars: &[String]) -> Result<HashMap<String, Value>, String> {
    let mut out = HashMap::new();
    for var in vars {
        let (name, json) = var
            .split_once('=')
            .ok_or_else(|| format!("--var expects NAME=JSON, got '{}'", var))?;
        let value = Value::from_json_str(json)
            .map_err(|e| format!("Invalid JSON for variable '{}': {}", name, e))?;
        out.insert(name.to_string(), value);
    }
    Ok(out)
}
