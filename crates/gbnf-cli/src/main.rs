use std::{
    io::{BufWriter, Read, Write},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use gbnf::{convert_to_bnf, ConvertOptions, Grammar};
use reglex::{
    assemble, AssembleOptions, LexError, Lexer, LexerGrammar, LexerOptions, ThreadedLexer,
    TokenSource,
};

#[derive(Parser)]
#[command(name = "gbnf", about = "EBNF grammar tools and a regex based lexer")]
struct Cli {
    /// Raise the log level, repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a grammar, optionally converted to BNF
    Print {
        grammar: PathBuf,
        /// Replace EBNF groups with synthesized rules
        #[arg(long)]
        bnf: bool,
        /// Synthesized repetitions refer to themselves at the start
        #[arg(long)]
        left_recursion: bool,
        /// Print the token tree instead of EBNF
        #[arg(long)]
        tree: bool,
    },
    /// Print the regex fragment of every token rule and the master regex
    Regex {
        grammar: PathBuf,
        /// Add the fallback group for uncovered input
        #[arg(long)]
        fallback: bool,
    },
    /// Tokenize a file, or stdin when no input is given
    Lex {
        grammar: PathBuf,
        input: Option<PathBuf>,
        #[arg(long, default_value_t = LexerOptions::default().buffer_size)]
        buffer_size: usize,
        /// Run the lexer on a worker thread
        #[arg(long)]
        threaded: bool,
        /// Add the fallback group for uncovered input
        #[arg(long)]
        fallback: bool,
        /// Report invalid tokens and keep going
        #[arg(long)]
        skip_invalid: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    if let Err(err) = run(cli.command) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_logger(verbose: u8) {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|level| log::LevelFilter::from_str(&level).ok())
        .unwrap_or(log::LevelFilter::Warn);
    let level = (0..verbose).fold(level, |level, _| raise(level));

    let result = simplelog::TermLogger::init(
        level,
        simplelog::ConfigBuilder::new()
            .set_time_format_custom(&[])
            .build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    );
    if let Err(err) = result {
        eprintln!("failed to set up logging: {err}");
    }
}

fn raise(level: log::LevelFilter) -> log::LevelFilter {
    use log::LevelFilter::*;
    match level {
        Off => Error,
        Error => Warn,
        Warn => Info,
        Info => Debug,
        Debug | Trace => Trace,
    }
}

fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Print {
            grammar,
            bnf,
            left_recursion,
            tree,
        } => {
            let mut grammar = load(&grammar)?;
            if bnf {
                let options = ConvertOptions {
                    prefer_right_recursion: !left_recursion,
                };
                convert_to_bnf(&mut grammar, &options).context("Failed to convert to BNF")?;
            }
            if tree {
                print!("{}", grammar.display_tree());
            } else {
                print!("{grammar}");
            }
        }
        Command::Regex { grammar, fallback } => {
            let grammar = load_lexer(&grammar, fallback)?.1;
            for rule in grammar.rules() {
                println!("{}\t{}", rule.name, rule.source);
            }
            for rule in grammar.configuration() {
                println!("{} (configuration)\t{}", rule.name, rule.source);
            }
            println!("whitespace\t{}", grammar.whitespace());
            println!();
            println!("{}", grammar.source());
            for (index, token) in grammar.token_groups() {
                println!("group {index}\t{}", token.name);
            }
            println!("group {}\twhitespace", grammar.whitespace_group());
            if let Some(index) = grammar.error_group() {
                println!("group {index}\terror");
            }
        }
        Command::Lex {
            grammar,
            input,
            buffer_size,
            threaded,
            fallback,
            skip_invalid,
        } => {
            let (grammar, lexer) = load_lexer(&grammar, fallback)?;
            let options = LexerOptions {
                buffer_size,
                ..Default::default()
            };
            let reader: Box<dyn Read + Send> = match &input {
                Some(path) => Box::new(
                    std::fs::File::open(path)
                        .with_context(|| format!("Failed to open `{}`", path.display()))?,
                ),
                None => Box::new(std::io::stdin()),
            };

            let lexer = Lexer::new(lexer, reader, &options);
            let mut source: Box<dyn TokenSource> = match threaded {
                true => Box::new(ThreadedLexer::new(lexer, &options)),
                false => Box::new(lexer),
            };
            print_tokens(&grammar, source.as_mut(), skip_invalid)?;
        }
    }
    Ok(())
}

fn load(path: &Path) -> anyhow::Result<Grammar> {
    let src = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read `{}`", path.display()))?;
    let grammar =
        gbnf::parse(&src).with_context(|| format!("Failed to parse `{}`", path.display()))?;
    log::info!(
        "{}: {} rules, {} options",
        path.display(),
        grammar.rule_count(),
        grammar.option_count()
    );
    Ok(grammar)
}

fn load_lexer(path: &Path, fallback: bool) -> anyhow::Result<(Grammar, Arc<LexerGrammar>)> {
    let mut grammar = load(path)?;
    convert_to_bnf(&mut grammar, &ConvertOptions::default()).context("Failed to convert to BNF")?;
    let options = AssembleOptions {
        use_error_fallback: fallback,
        ..Default::default()
    };
    let lexer = assemble(&grammar, &options).context("Failed to assemble the lexer")?;
    Ok((grammar, Arc::new(lexer)))
}

fn print_tokens(
    grammar: &Grammar,
    source: &mut dyn TokenSource,
    skip_invalid: bool,
) -> anyhow::Result<()> {
    let mut out = BufWriter::new(std::io::stdout().lock());
    loop {
        match source.next_token() {
            Ok(token) => writeln!(out, "{} {:?}", grammar.tag_name(token.token_type_id), token.text)?,
            Err(LexError::EndOfStream) => break,
            Err(err @ LexError::InvalidToken { .. }) if skip_invalid => log::warn!("{err}"),
            Err(err) => {
                out.flush()?;
                bail!(err);
            }
        }
    }
    out.flush()?;
    Ok(())
}
