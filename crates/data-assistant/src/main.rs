//! A terminal front end for the data assistant.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use bytes::Bytes;
use data_assistant::{ChatBuilder, ChatEvent};
use data_assistant::config::Config;
use data_assistant::core::PendingSubmission;
use data_assistant::core::conversation::{Role, Turn, TurnContent};
use data_assistant::core::ingest::UploadedFile;
use data_assistant_gemini_model::GeminiProvider;
use indicatif::{ProgressBar, ProgressStyle};
use mime::Mime;
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt, Lines};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

const BAR_CHAR: &str = "▎";

const HELP: &str = "\
Type a question, or one of:
  /attach <path> [message]  upload a file, optionally with a message
  /history                  show the conversation
  /clear                    start over
  /quit                     exit";

type Stdin = Lines<io::BufReader<io::Stdin>>;

#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Help,
    Quit,
    Clear,
    History,
    Attach {
        path: &'a str,
        message: Option<&'a str>,
    },
    Unknown(&'a str),
    Message(&'a str),
}

impl<'a> Input<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Input::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Input::Message(line);
        };
        let (name, rest) = command
            .split_once(char::is_whitespace)
            .map_or((command, ""), |(name, rest)| (name, rest.trim()));
        match name {
            "help" => Input::Help,
            "quit" | "exit" => Input::Quit,
            "clear" => Input::Clear,
            "history" => Input::History,
            "attach" if !rest.is_empty() => {
                let (path, message) = match rest.split_once(char::is_whitespace)
                {
                    Some((path, message)) => (path, Some(message.trim())),
                    None => (rest, None),
                };
                Input::Attach { path, message }
            }
            _ => Input::Unknown(name),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    debug!("loaded config: {config:?}");

    let model_provider = GeminiProvider::new(config.gemini_config());
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let chat = ChatBuilder::with_model_provider(model_provider)
        .with_system_instruction(include_str!("./system_prompt.md"))
        .with_generation_params(config.params)
        .with_request_timeout(config.request_timeout)
        .on_event(move |event| {
            event_tx.send(event).ok();
        })
        .build();

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    println!("{}", "📊 Data Assistant".bright_white().bold());
    println!("{}", HELP.dimmed());

    let mut stdin = io::BufReader::new(io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line(&mut stdin).await else {
            break;
        };
        let sent = match Input::parse(&line) {
            Input::Empty => continue,
            Input::Help => {
                println!("{}", HELP.dimmed());
                continue;
            }
            Input::Quit => break,
            Input::Unknown(name) => {
                println!("{}", format!("Unknown command: /{name}").yellow());
                continue;
            }
            Input::History => {
                match chat.snapshot().await {
                    Ok(turns) if turns.is_empty() => {
                        println!("{}", "The conversation is empty.".dimmed())
                    }
                    Ok(turns) => turns.iter().for_each(print_turn),
                    Err(err) => error!("{err}"),
                }
                continue;
            }
            Input::Clear => chat.clear(),
            Input::Attach { path, message } => {
                let file = match read_file(path).await {
                    Ok(file) => file,
                    Err(err) => {
                        print_warning(&format!("Could not open {path}: {err}"));
                        continue;
                    }
                };
                let mut submission = PendingSubmission::file(file);
                submission.text = message.map(ToOwned::to_owned);
                chat.submit(submission)
            }
            Input::Message(text) => chat.submit(PendingSubmission::text(text)),
        };
        if let Err(err) = sent {
            error!("{err}");
            break;
        }

        let mut progress_bar = None;

        loop {
            // Create a new progress bar if it has been finished.
            progress_bar
                .get_or_insert_with(|| {
                    let progress_bar = ProgressBar::new_spinner();
                    progress_bar.set_style(progress_style.clone());
                    progress_bar.set_message("🤔 Thinking...");
                    progress_bar
                })
                .inc(1);

            let sleep = sleep(Duration::from_millis(100));
            let event = select! {
                event = event_rx.recv() => {
                    let Some(event) = event else {
                        return ExitCode::FAILURE;
                    };
                    event
                },
                _ = sleep => {
                    continue;
                }
            };

            // Finish the progress bar before printing anything else.
            if let Some(progress_bar) = &progress_bar {
                progress_bar.finish_and_clear();
            }
            progress_bar = None;

            match event {
                ChatEvent::Turn(turn) => {
                    // Either typed by the user or already shown as a file
                    // diagnostic.
                    let shown = turn.role() == Role::User
                        && (turn.is_diagnostic()
                            || turn.content().as_text() == Some(line.trim()));
                    if !shown {
                        print_turn(&turn);
                    }
                }
                ChatEvent::FileDiagnostic(diagnostic) => {
                    print_warning(&diagnostic);
                }
                ChatEvent::Skipped => {
                    println!(
                        "{}",
                        "This file is already attached. Add a message to ask about it."
                            .dimmed()
                    );
                }
                ChatEvent::Cleared => {
                    println!("{}", "Conversation cleared.".dimmed());
                }
                ChatEvent::Idle => {
                    break;
                }
            }
        }
    }
    ExitCode::SUCCESS
}

async fn read_line(stdin: &mut Stdin) -> Option<String> {
    match stdin.next_line().await {
        Ok(line) => line,
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}

async fn read_file(path: &str) -> std::io::Result<UploadedFile> {
    let path = Path::new(path);
    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(UploadedFile::new(name, guess_mime(path), Bytes::from(bytes)))
}

fn guess_mime(path: &Path) -> Mime {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let essence = match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("csv") => "text/csv",
        Some("xlsx") => {
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        }
        Some("xlsm") => "application/vnd.ms-excel.sheet.macroenabled.12",
        Some("xls") => "application/vnd.ms-excel",
        Some("ods") => "application/vnd.oasis.opendocument.spreadsheet",
        Some("txt" | "md") => "text/plain",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    };
    essence.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

fn print_turn(turn: &Turn) {
    let text = match turn.content() {
        TurnContent::Text(text) => text.clone(),
        TurnContent::Image(image) => {
            let (width, height) = image.dimensions();
            format!("[image {} {width}x{height}]", image.name())
        }
    };
    match (turn.role(), turn.is_diagnostic()) {
        (_, true) => print_warning(&text),
        (Role::User, false) => {
            println!("{}👤 {}", BAR_CHAR.bright_green(), text.dimmed());
        }
        (Role::Assistant, false) => {
            println!("{}🤖 {}", BAR_CHAR.bright_cyan(), text.bright_white());
        }
    }
}

fn print_warning(text: &str) {
    println!("{}⚠️  {}", BAR_CHAR.bright_yellow(), text.yellow());
}
