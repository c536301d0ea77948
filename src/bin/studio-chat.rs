// studio-chat - streaming chat with OpenRouter models

use clap::Parser;
use std::path::PathBuf;
use studio::chat::{ChatSession, ChatSettings, TurnOutcome};
use studio::config::{
    self, CHAT_MAX_TOKENS_RANGE, CHAT_TEMPERATURE_RANGE, DEFAULT_CHAT_MODELS,
    DEFAULT_CHAT_SYSTEM_PROMPT, StudioConfig,
};
use studio::payload::ReasoningEffort;
use studio::render::{LineReader, StreamPrinter, create_markdown_skin};
use studio::{DownloadTracker, OpenRouterClient};
use tracing::{debug, warn};

const THOUGHTS_PLACEHOLDER: &str = "*Reasoning will appear here...*";

#[derive(Parser, Debug)]
#[command(author, version, about = "Chat with OpenRouter models from the terminal", long_about = None)]
struct Args {
    /// Config file (defaults to ./.studio.toml, then ~/.studio.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model to start with (defaults to the first entry of the model list)
    #[arg(short, long)]
    model: Option<String>,

    /// Reasoning effort (effort for OpenAI models, on/off for Grok)
    #[arg(short, long, value_enum)]
    effort: Option<ReasoningEffort>,

    /// Sampling temperature, 0.0 to 2.0
    #[arg(short, long)]
    temperature: Option<f32>,

    /// Maximum tokens per reply, 100 to 65535
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Wait for whole replies instead of streaming them
    #[arg(long)]
    no_stream: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn print_help() {
    println!("Commands:");
    println!("  /models              list models");
    println!("  /model <name|index>  switch model");
    println!("  /system [text]       show or set system instructions");
    println!("  /effort <level>      low, medium or high");
    println!("  /temperature <t>     0.0 to 2.0");
    println!("  /max-tokens <n>      100 to 65535");
    println!("  /stream on|off       stream replies or wait for them");
    println!("  /thoughts            show the reasoning of the last reply");
    println!("  /download            path of the last response file");
    println!("  /clear               clear the conversation");
    println!("  exit                 quit (Ctrl-C stops a reply in progress)");
    println!();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    let args = Args::parse();
    studio::logging::init(args.verbose);
    if let Ok(path) = dotenv {
        debug!("loaded .env from {}", path.display());
    }

    let mut config = StudioConfig::load(args.config.as_deref())?;
    if let Some(effort) = args.effort {
        config.chat.effort = effort;
    }
    if let Some(temperature) = args.temperature {
        config.chat.temperature = temperature;
    }
    if let Some(max_tokens) = args.max_tokens {
        config.chat.max_tokens = max_tokens;
    }
    config.chat = config.chat.clamped();

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let models = config::load_models(&config.chat.models_file, DEFAULT_CHAT_MODELS);
    let instructions =
        config::load_system_prompt(&config.chat.system_prompt_file, DEFAULT_CHAT_SYSTEM_PROMPT);
    let model = args
        .model
        .clone()
        .unwrap_or_else(|| models.first().cloned().unwrap_or_default());

    let client = OpenRouterClient::new(&config.api)?;
    let mut downloads = DownloadTracker::new();
    let mut settings = ChatSettings::from_config(&config.chat, model, instructions);
    settings.stream = !args.no_stream;
    let mut session = ChatSession::new(settings);

    let skin = create_markdown_skin();
    let mut thoughts = THOUGHTS_PLACEHOLDER.to_string();
    let mut input = LineReader::new();

    println!("💬 Studio v{} - OpenRouter Chat\n", env!("CARGO_PKG_VERSION"));
    println!("Model: {}", session.settings().model);
    println!("Temporary download files are kept in the OS temp directory until exit.");
    println!("Type /help for commands.\n");

    while let Some(line) = input.read("> ").await? {
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        if let Some(command) = line.strip_prefix('/') {
            let (name, arg) = match command.split_once(char::is_whitespace) {
                Some((name, arg)) => (name, arg.trim()),
                None => (command, ""),
            };
            let settings = session.settings_mut();

            match name {
                "help" => print_help(),
                "models" => {
                    println!("\nAvailable models:");
                    for (i, m) in models.iter().enumerate() {
                        let marker = if *m == settings.model { "•" } else { " " };
                        println!("  {} {:>2}. {}", marker, i + 1, m);
                    }
                    println!();
                }
                "model" => {
                    let chosen = arg
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| i.checked_sub(1))
                        .and_then(|i| models.get(i).cloned())
                        .unwrap_or_else(|| arg.to_string());
                    if chosen.is_empty() {
                        println!("Model: {}\n", settings.model);
                    } else {
                        settings.model = chosen;
                        println!("Model: {}\n", settings.model);
                    }
                }
                "system" => {
                    if !arg.is_empty() {
                        settings.instructions = arg.to_string();
                    }
                    println!("System instructions: {}\n", settings.instructions);
                }
                "effort" => match arg.parse::<ReasoningEffort>() {
                    Ok(effort) => {
                        settings.effort = effort;
                        println!("Reasoning effort: {}\n", effort);
                    }
                    Err(e) => eprintln!("{e}\n"),
                },
                "temperature" => match arg.parse::<f32>() {
                    Ok(t) => {
                        settings.temperature =
                            config::clamp_logged("temperature", t, CHAT_TEMPERATURE_RANGE);
                        println!("Temperature: {}\n", settings.temperature);
                    }
                    Err(e) => eprintln!("Invalid temperature '{arg}': {e}\n"),
                },
                "max-tokens" => match arg.parse::<u32>() {
                    Ok(n) => {
                        settings.max_tokens =
                            config::clamp_logged("max_tokens", n, CHAT_MAX_TOKENS_RANGE);
                        println!("Max tokens: {}\n", settings.max_tokens);
                    }
                    Err(e) => eprintln!("Invalid max tokens '{arg}': {e}\n"),
                },
                "stream" => {
                    settings.stream = !matches!(arg, "off" | "false" | "no");
                    println!("Streaming: {}\n", if settings.stream { "on" } else { "off" });
                }
                "thoughts" => {
                    println!("\n🧠 Model Thoughts");
                    skin.print_text(&thoughts);
                    println!();
                }
                "download" => match session.last_download() {
                    Some(path) => println!("⬇️  Last response: {}\n", path.display()),
                    None => println!("No response to download yet.\n"),
                },
                "clear" => {
                    session.clear();
                    thoughts = THOUGHTS_PLACEHOLDER.to_string();
                    println!("History cleared.\n");
                }
                other => eprintln!("Unknown command: /{other} (try /help)\n"),
            }
            continue;
        }

        let streaming = session.settings().stream;
        let mut printer = StreamPrinter::new();
        println!();

        let reply = session
            .send(
                &client,
                &mut downloads,
                &line,
                |snapshot| {
                    if streaming {
                        if let Err(e) = printer.update(snapshot) {
                            warn!("terminal write failed: {}", e);
                        }
                    }
                },
                async {
                    let _ = tokio::signal::ctrl_c().await;
                },
            )
            .await;

        let Some(reply) = reply else {
            continue;
        };
        thoughts = reply.reasoning.clone();

        match reply.outcome {
            TurnOutcome::Completed => {
                if !streaming {
                    skin.print_text(&reply.content);
                }
                println!("\n");
                if let Some(path) = &reply.download {
                    println!("⬇️  Download: {}\n", path.display());
                }
            }
            TurnOutcome::Stopped => println!("\n⏹️  Stopped.\n"),
            TurnOutcome::Failed => eprintln!("{}\n", reply.content),
        }
    }

    println!("Goodbye!");
    Ok(())
}
