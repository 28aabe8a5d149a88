use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};
use memmap2::Mmap;

use glox::ast_printer::AstPrinter;
use glox::parser::Parser;
use glox::scanner::Scanner;
use glox::{Lox, LoxError};

/// Exit code for malformed input (scan, parse, resolve).
const EXIT_DATAERR: i32 = 65;
/// Exit code for runtime failures.
const EXIT_SOFTWARE: i32 = 70;
/// Exit code for unreadable input files and failed terminal I/O.
const EXIT_IOERR: i32 = 74;

#[derive(ClapParser, Debug)]
#[command(version, about = "glox language interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Option<Commands>,

    /// Enable logging to glox.log
    #[arg(long, global = true)]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes a file, printing each token
    Tokenize {
        filename: PathBuf,

        /// Print the token list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parses a file and prints its AST
    Parse { filename: PathBuf },

    /// Runs a file as a program
    Run { filename: PathBuf },

    /// Starts an interactive session (the default)
    Repl,
}

/// Maps a file into memory and validates it as UTF-8.
fn read_source(filename: &Path) -> Result<String> {
    info!("Reading file: {:?}", filename);

    let file = File::open(filename).context(format!("Failed to open file {:?}", filename))?;
    let len = file
        .metadata()
        .context(format!("Failed to stat file {:?}", filename))?
        .len();

    // Mapping a zero-length file is an error on some platforms.
    if len == 0 {
        return Ok(String::new());
    }

    // SAFETY: the map is read-only and dropped before this function returns;
    // the bytes are copied out after UTF-8 validation.
    let map = unsafe { Mmap::map(&file) }.context(format!("Failed to map file {:?}", filename))?;
    let text = std::str::from_utf8(&map)
        .map_err(LoxError::from)
        .context(format!("File {:?} is not valid UTF-8", filename))?;

    info!("Read {} bytes from {:?}", len, filename);

    Ok(text.to_owned())
}

fn init_logger() -> Result<()> {
    let log_file = File::create("glox.log").context("Failed to create glox.log")?;

    Builder::new()
        .format(|buf, record| {
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("glox::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug)
        .parse_default_env()
        .init();

    info!("Logger initialized, writing to glox.log");
    Ok(())
}

fn exit_code(error: &LoxError) -> i32 {
    if error.is_static() {
        EXIT_DATAERR
    } else {
        EXIT_SOFTWARE
    }
}

fn tokenize(filename: &Path, json: bool) -> Result<()> {
    let source = read_source(filename)?;
    let (tokens, errors) = Scanner::new(&source).scan_tokens();

    for e in &errors {
        eprintln!("{}", e);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&tokens)?);
    } else {
        for token in &tokens {
            println!("{}", token);
        }
    }

    if !errors.is_empty() {
        debug!("Tokenization failed, exiting with code {}", EXIT_DATAERR);
        std::process::exit(EXIT_DATAERR);
    }

    Ok(())
}

fn parse(filename: &Path) -> Result<()> {
    let source = read_source(filename)?;
    let (tokens, _) = Scanner::new(&source).scan_tokens();

    match Parser::new(&tokens).parse() {
        Ok(statements) => {
            println!("{}", AstPrinter.print_program(&statements));
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(EXIT_DATAERR);
        }
    }
}

fn run(filename: &Path) -> Result<()> {
    let source = read_source(filename)?;
    let mut lox = Lox::new();

    if let Err(e) = lox.run(&source) {
        debug!("Run failed: {}", e);
        eprintln!("{}", e);
        std::process::exit(exit_code(&e));
    }

    info!("Program executed successfully");
    Ok(())
}

fn main() {
    if let Err(e) = try_main() {
        eprintln!("Error: {:#}", e);

        let io_failure = e.chain().any(|cause| {
            cause.downcast_ref::<io::Error>().is_some()
                || matches!(cause.downcast_ref::<LoxError>(), Some(LoxError::Io(_)))
        });
        std::process::exit(if io_failure { EXIT_IOERR } else { 1 });
    }
}

fn try_main() -> Result<()> {
    let args: Cli = Cli::parse();

    if args.log {
        init_logger()?;
    } else {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    match args.commands.unwrap_or(Commands::Repl) {
        Commands::Tokenize { filename, json } => tokenize(&filename, json),
        Commands::Parse { filename } => parse(&filename),
        Commands::Run { filename } => run(&filename),
        Commands::Repl => {
            let stdin = io::stdin();
            Lox::new().repl(stdin.lock(), io::stderr())?;
            Ok(())
        }
    }
}
