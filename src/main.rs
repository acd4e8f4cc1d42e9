use std::io::Write;

use clap::{Args, Parser, Subcommand};
use treelox::{diagnostic::Diagnostics, tokenizer::TokenType, Lox};

#[derive(Debug, Parser)]
#[command(version, about = "A tree-walking Lox interpreter")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn command(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Repl)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a script.
    Run(FileArgs),
    /// Start an interactive prompt (the default).
    Repl,
    /// Print the tokens of a script.
    Tokens(FileArgs),
    /// Print the syntax tree of a script.
    Ast(FileArgs),
}

#[derive(Debug, Args)]
struct FileArgs {
    file: String,
}

/// Installs a stderr subscriber when `RUST_LOG` is set; otherwise logging
/// stays disabled.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .with(EnvFilter::from_default_env())
            .try_init();
    }
}

fn main() {
    init_tracing();
    let args = Cli::parse();

    let code = match args.command() {
        Command::Repl => repl_command(),
        Command::Run(args) => run_command(args),
        Command::Tokens(args) => tokens_command(args),
        Command::Ast(args) => ast_command(args),
    };

    std::process::exit(code);
}

fn read_source(file: &str) -> Result<String, i32> {
    std::fs::read_to_string(file).map_err(|e| {
        eprintln!("Could not read '{file}': {e}");
        66
    })
}

fn repl_command() -> i32 {
    println!("Welcome to the Lox REPL!");
    println!("EOF to exit. (Ctrl+D on *nix, Ctrl+Z on Windows)");

    let mut lox = Lox::default();
    let mut input = String::new();
    loop {
        print!("> ");
        if std::io::stdout().flush().is_err() {
            return 74;
        }

        input.clear();
        match std::io::stdin().read_line(&mut input) {
            Ok(0) => return 0,
            Ok(_) => {}
            Err(e) => {
                eprintln!("{e}");
                return 74;
            }
        }

        if let Err(e) = lox.run(&input) {
            eprintln!("{e}");
        }
    }
}

fn run_command(args: &FileArgs) -> i32 {
    let source = match read_source(&args.file) {
        Ok(source) => source,
        Err(code) => return code,
    };

    match Lox::default().run(&source) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    }
}

fn tokens_command(args: &FileArgs) -> i32 {
    let source = match read_source(&args.file) {
        Ok(source) => source,
        Err(code) => return code,
    };

    let mut diagnostics = Diagnostics::default();
    let tokens = treelox::tokenizer::tokens(&source, &mut diagnostics);

    let mut line = 0;
    for token in &tokens {
        if token.line != line {
            print!("{:4} ", token.line);
            line = token.line;
        } else {
            print!("   | ");
        }

        println!("{:<16} {}", token.token_type.to_string(), token.lexeme);

        if token.token_type == TokenType::Eof {
            break;
        }
    }

    if diagnostics.has_errors() {
        eprintln!("{diagnostics}");
        return 65;
    }
    0
}

fn ast_command(args: &FileArgs) -> i32 {
    let source = match read_source(&args.file) {
        Ok(source) => source,
        Err(code) => return code,
    };

    match Lox::default().parse(&source) {
        Ok(program) => {
            print!("{program}");
            0
        }
        Err(diagnostics) => {
            eprintln!("{diagnostics}");
            65
        }
    }
}
