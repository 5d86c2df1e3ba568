use std::io::{IsTerminal, Read};

use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ox::shell::{Shell, ShellOptions};

#[derive(Parser)]
#[command(name = "ox")]
#[command(about = "A typed shell with multi-interpreter subshells")]
#[command(version)]
struct Cli {
    /// Execute the script from command line argument
    #[arg(short = 'c')]
    script: Option<String>,

    /// Start an interactive session
    #[arg(short = 'i', long = "interactive")]
    interactive: bool,

    /// Prompt template (overrides OX_PROMPT)
    #[arg(long = "prompt")]
    prompt: Option<String>,

    /// Print the expanded prompt and exit
    #[arg(long = "render-prompt")]
    render_prompt: bool,

    /// Output results as JSON (stdout, stderr, exitCode)
    #[arg(long = "json")]
    json: bool,

    /// Script file to execute
    #[arg()]
    script_file: Option<String>,

    /// Positional parameters for the script
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

fn main() {
    // Respects RUST_LOG; diagnostics stay on stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let prompt = cli.prompt.clone().or_else(|| std::env::var("OX_PROMPT").ok());

    let mut shell = Shell::new(ShellOptions {
        interactive: cli.interactive,
        capture_output: cli.json,
        prompt,
        args: cli.args.clone(),
        ..Default::default()
    });

    if cli.render_prompt {
        print!("{}", shell.render_prompt());
        return;
    }

    // Determine script source: -c, file, interactive session, or stdin
    let script = if let Some(s) = cli.script {
        s
    } else if let Some(ref file) = cli.script_file {
        match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("ox: cannot read script file: {}: {}", file, e);
                std::process::exit(1);
            }
        }
    } else if cli.interactive || std::io::stdin().is_terminal() {
        std::process::exit(repl(shell));
    } else {
        let mut buf = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut buf) {
            eprintln!("ox: cannot read stdin: {}", e);
            std::process::exit(1);
        }
        buf
    };

    let result = shell.exec(&script);

    if cli.json {
        println!(
            "{}",
            serde_json::to_string(&result).unwrap_or_else(|_| String::from("{}"))
        );
    } else {
        if !result.stdout.is_empty() {
            print!("{}", result.stdout);
        }
        if !result.stderr.is_empty() {
            eprint!("{}", result.stderr);
        }
    }

    std::process::exit(result.exit_code);
}

/// Read-eval loop; lines are joined until the input forms complete statements
fn repl(mut shell: Shell) -> i32 {
    let mut rl: Editor<(), DefaultHistory> = match Editor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("ox: cannot start line editor: {}", e);
            return 1;
        }
    };

    let mut pending = String::new();
    loop {
        let prompt = if pending.is_empty() {
            shell.render_prompt()
        } else {
            "> ".to_string()
        };

        match rl.readline(&prompt) {
            Ok(line) => {
                pending.push_str(&line);
                pending.push('\n');
                if Shell::is_incomplete(&pending) {
                    continue;
                }
                let source = std::mem::take(&mut pending);
                if let Err(e) = rl.add_history_entry(source.trim_end()) {
                    tracing::warn!("failed to add history entry: {}", e);
                }
                shell.exec(&source);
                if shell.has_exited() {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                pending.clear();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("ox: {}", err);
                break;
            }
        }
    }
    shell.last_exit()
}
