use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use el_analyzer::{
    argument_hints, complete, hover, lint, parse, resolve_types, Bias, CompletionRequest,
    Diagnostic, Schema, Selection, Severity,
};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "EL_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Parser)]
#[command(
    name = "el-cli",
    version,
    about = "Check and explore expression language snippets against a schema."
)]
struct Cli {
    /// Raise log verbosity (`-v` debug, `-vv` trace). `EL_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct InputArgs {
    /// Schema describing available variables, functions and types
    /// (`.json`, `.yaml` or `.yml`).
    #[arg(long, value_name = "PATH")]
    schema: Option<PathBuf>,

    /// Expression to analyze.
    #[arg(value_name = "EXPR", required_unless_present = "file", conflicts_with = "file")]
    expr: Option<String>,

    /// Read the expression from a file instead.
    #[arg(short, long, value_name = "PATH")]
    file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Subcommand)]
enum Command {
    /// Lint the expression; exits non-zero when errors are found.
    Check {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Print the possible types of the expression.
    Types {
        #[command(flatten)]
        input: InputArgs,

        /// Resolve the innermost node at this byte offset instead.
        #[arg(long, value_name = "OFFSET")]
        offset: Option<usize>,
    },
    /// List completion candidates at a cursor.
    Complete {
        #[command(flatten)]
        input: InputArgs,

        /// Cursor byte offset.
        #[arg(long, value_name = "OFFSET")]
        cursor: usize,

        /// Behave like an explicit request: no prefix filtering.
        #[arg(long)]
        explicit: bool,
    },
    /// Show documentation for the reference or keyword at an offset.
    Hover {
        #[command(flatten)]
        input: InputArgs,

        #[arg(long, value_name = "OFFSET")]
        offset: usize,
    },
    /// Show argument name hints for one or more carets.
    Hints {
        #[command(flatten)]
        input: InputArgs,

        #[arg(long = "cursor", value_name = "OFFSET", required = true, num_args = 1..)]
        cursors: Vec<usize>,
    },
}

/// The expression under analysis plus everything needed to report on it.
struct Input {
    name: String,
    source: String,
    schema: Schema,
    format: Format,
}

impl Input {
    fn load(args: InputArgs) -> Result<Self> {
        let schema = match &args.schema {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("failed to read schema {}", path.display()))?;
                Schema::from_file_contents(path, &contents)
                    .with_context(|| format!("failed to load schema {}", path.display()))?
            }
            None => Schema::default(),
        };

        let (name, source) = match (args.expr, args.file) {
            (Some(expr), _) => ("<expr>".to_string(), expr),
            (None, Some(path)) => {
                let source = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                (path.display().to_string(), source.trim_end_matches('\n').to_string())
            }
            (None, None) => bail!("an expression or --file is required"),
        };

        tracing::debug!(
            input = %name,
            identifiers = schema.identifiers.len(),
            functions = schema.functions.len(),
            types = schema.types.len(),
            "input loaded"
        );
        Ok(Self {
            name,
            source,
            schema,
            format: args.format,
        })
    }

    fn check_offset(&self, offset: usize) -> Result<usize> {
        if offset > self.source.len() {
            bail!(
                "offset {offset} is past the end of the input ({} bytes)",
                self.source.len()
            );
        }
        if !self.source.is_char_boundary(offset) {
            bail!("offset {offset} is not on a character boundary");
        }
        Ok(offset)
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Check { input } => run_check(Input::load(input)?),
        Command::Types { input, offset } => {
            run_types(Input::load(input)?, offset)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Complete {
            input,
            cursor,
            explicit,
        } => {
            run_complete(Input::load(input)?, cursor, explicit)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Hover { input, offset } => {
            run_hover(Input::load(input)?, offset)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Hints { input, cursors } => {
            run_hints(Input::load(input)?, &cursors)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{rendered}");
    Ok(())
}

fn run_check(input: Input) -> Result<ExitCode> {
    let tree = parse(&input.source);
    let diagnostics = lint(&tree, &input.schema);
    let errors = diagnostics
        .iter()
        .filter(|diagnostic| diagnostic.severity == Severity::Error)
        .count();
    let warnings = diagnostics.len() - errors;

    match input.format {
        Format::Json => print_json(&diagnostics)?,
        Format::Text => {
            for diagnostic in &diagnostics {
                print_diagnostic(&input, diagnostic);
            }
            if diagnostics.is_empty() {
                eprintln!("no problems found in {}", input.name);
            } else {
                eprintln!("{errors} error(s), {warnings} warning(s) in {}", input.name);
            }
        }
    }

    Ok(if errors > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn run_types(input: Input, offset: Option<usize>) -> Result<()> {
    let tree = parse(&input.source);
    let node = match offset {
        Some(offset) => tree.resolve_inner(input.check_offset(offset)?, Bias::Any),
        None => tree.root().first_child().unwrap_or_else(|| tree.root()),
    };
    let types = resolve_types(&input.schema, node);

    match input.format {
        Format::Json => print_json(&json!({
            "kind": node.kind().to_string(),
            "from": node.from(),
            "to": node.to(),
            "types": types,
        })),
        Format::Text => {
            println!("{types}");
            Ok(())
        }
    }
}

fn run_complete(input: Input, cursor: usize, explicit: bool) -> Result<()> {
    let tree = parse(&input.source);
    let request = CompletionRequest {
        position: input.check_offset(cursor)?,
        explicit,
    };
    let result = complete(&tree, &input.schema, request);

    match input.format {
        Format::Json => print_json(&result),
        Format::Text => {
            let Some(result) = result else {
                eprintln!("no completions");
                return Ok(());
            };
            for option in &result.options {
                match &option.detail {
                    Some(detail) => println!("{}\t{}", option.label, detail),
                    None => println!("{}", option.label),
                }
            }
            Ok(())
        }
    }
}

fn run_hover(input: Input, offset: usize) -> Result<()> {
    let tree = parse(&input.source);
    let info = hover(&tree, &input.schema, input.check_offset(offset)?, Bias::Any);

    match input.format {
        Format::Json => print_json(&info),
        Format::Text => {
            match info {
                Some(info) => println!("{}", info.content),
                None => eprintln!("nothing to show"),
            }
            Ok(())
        }
    }
}

fn run_hints(input: Input, cursors: &[usize]) -> Result<()> {
    let tree = parse(&input.source);
    let selections = cursors
        .iter()
        .map(|cursor| input.check_offset(*cursor).map(Selection::caret))
        .collect::<Result<Vec<_>>>()?;
    let hints = argument_hints(&tree, &input.schema, &selections);

    match input.format {
        Format::Json => print_json(&hints),
        Format::Text => {
            for hint in &hints {
                println!("{}: {} in {}", hint.position, hint.text, hint.signature);
            }
            Ok(())
        }
    }
}

/// 1-based line and character column of a byte offset.
fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let prefix = source.get(..offset).unwrap_or(source);
    let line = prefix.matches('\n').count() + 1;
    let line_start = prefix.rfind('\n').map_or(0, |index| index + 1);
    let column = prefix[line_start..].chars().count() + 1;
    (line, column)
}

fn print_diagnostic(input: &Input, diagnostic: &Diagnostic) {
    let (level_label, level_marker) = match diagnostic.severity {
        Severity::Error => ("error", "  -"),
        Severity::Warning => ("warning", "  ~"),
    };
    eprintln!("{} {}: {}", level_marker, level_label, diagnostic.message);

    let (line, column) = line_column(&input.source, diagnostic.from);
    eprintln!("     --> {}:{}:{}", input.name, line, column);

    let Some(raw_line) = input.source.lines().nth(line - 1) else {
        return;
    };
    let display_line = raw_line.replace('\t', "    ");
    eprintln!("      {}", display_line);

    let mut caret_line = String::from("      ");
    for ch in raw_line.chars().take(column - 1) {
        match ch {
            '\t' => caret_line.push_str("    "),
            _ => caret_line.push(' '),
        }
    }

    let (end_line, end_column) = line_column(&input.source, diagnostic.to);
    let highlight_len = if end_line == line {
        end_column.saturating_sub(column)
    } else {
        raw_line.chars().count().saturating_sub(column - 1)
    };
    caret_line.push_str(&"^".repeat(highlight_len.max(1)));
    eprintln!("{}", caret_line);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_column_counts_characters() {
        let source = "1 +\n  é + x";
        assert_eq!(line_column(source, 0), (1, 1));
        assert_eq!(line_column(source, 3), (1, 4));
        assert_eq!(line_column(source, 4), (2, 1));
        let x = source.find('x').unwrap();
        assert_eq!(line_column(source, x), (2, 7));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
