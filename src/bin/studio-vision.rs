// studio-vision - prompt and/or image in, text and/or generated image out

use clap::Parser;
use std::path::{Path, PathBuf};
use studio::config::{
    self, DEFAULT_VISION_MODELS, DEFAULT_VISION_SYSTEM_PROMPT, StudioConfig,
    VISION_MAX_TOKENS_RANGE,
};
use studio::media::ImageAttachment;
use studio::render::{LineReader, create_markdown_skin};
use studio::vision::error_status;
use studio::{DownloadTracker, OpenRouterClient, OutputMode, Studio, StudioOutcome, StudioRequest};
use termimad::MadSkin;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(author, version, about = "Multimodal AI studio via OpenRouter", long_about = None)]
struct Args {
    /// Text prompt; with --prompt or --image the request runs once and exits
    #[arg(short, long)]
    prompt: Option<String>,

    /// Image to send along with the prompt
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Model (defaults to the first entry of the model list)
    #[arg(short, long)]
    model: Option<String>,

    /// System instructions (defaults to the system prompt file)
    #[arg(long)]
    instructions: Option<String>,

    /// Maximum tokens, 8192 to 65535
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Directory for generated images
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Never request image output
    #[arg(long)]
    analysis_only: bool,

    /// Print the model list and exit
    #[arg(long)]
    list_models: bool,

    /// Config file (defaults to ./.studio.toml, then ~/.studio.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Form state of the interactive studio
struct Form {
    image: Option<(PathBuf, ImageAttachment)>,
    model: String,
    instructions: String,
    max_tokens: u32,
    mode: OutputMode,
}

impl Form {
    fn request(&self, prompt: &str) -> StudioRequest {
        StudioRequest {
            prompt: prompt.to_string(),
            image: self.image.as_ref().map(|(_, image)| image.clone()),
            model: self.model.clone(),
            instructions: self.instructions.clone(),
            max_tokens: self.max_tokens,
            mode: self.mode,
        }
    }
}

fn attach(path: &Path) -> anyhow::Result<ImageAttachment> {
    let image = ImageAttachment::from_path(path)?;
    println!("🖼️  Attached {} ({} bytes as JPEG)", path.display(), image.size());
    Ok(image)
}

fn show(outcome: &StudioOutcome, output_dir: &Path, skin: &MadSkin) {
    println!();
    if !outcome.text.is_empty() {
        skin.print_text(&outcome.text);
        println!();
    }
    if let Some(image) = &outcome.image {
        match image.save_in(output_dir) {
            Ok(path) => println!("🖼️  Image output: {}", path.display()),
            Err(e) => eprintln!("❌ Could not save image: {e}"),
        }
    }
    if let Some(path) = &outcome.download {
        println!("⬇️  Download Text Response: {}", path.display());
    }
    println!("{}\n", outcome.status);
}

async fn run_once(
    studio: &Studio<'_>,
    request: &StudioRequest,
    downloads: Option<&mut DownloadTracker>,
    output_dir: &Path,
    skin: &MadSkin,
) -> Option<StudioOutcome> {
    println!("⏳ Running {}...", request.model);
    match studio.run(request, downloads).await {
        Ok(outcome) => {
            show(&outcome, output_dir, skin);
            Some(outcome)
        }
        Err(e) if e.is_validation() => {
            eprintln!("⚠️  {e}\n");
            None
        }
        Err(e) => {
            println!("{}\n", error_status(&e));
            None
        }
    }
}

fn print_help() {
    println!("Type a prompt to run it. Commands:");
    println!("  /image [path]        attach an image, or detach with no path");
    println!("  /run                 run with the attached image and no prompt");
    println!("  /models              list models");
    println!("  /model <name|index>  switch model");
    println!("  /system [text]       show or set system instructions");
    println!("  /max-tokens <n>      8192 to 65535");
    println!("  /analysis on|off     never ask for image output");
    println!("  /download            path of the last text response file");
    println!("  /clear               clear inputs and outputs");
    println!("  exit                 quit");
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
    if let Some(max_tokens) = args.max_tokens {
        config.vision.max_tokens = max_tokens;
    }
    if let Some(dir) = &args.output_dir {
        config.vision.output_dir = dir.clone();
    }
    config.vision = config.vision.clamped();

    let models = config::load_models(&config.vision.models_file, DEFAULT_VISION_MODELS);
    if args.list_models {
        for model in &models {
            println!("{model}");
        }
        return Ok(());
    }

    let instructions = args.instructions.clone().unwrap_or_else(|| {
        config::load_system_prompt(&config.vision.system_prompt_file, DEFAULT_VISION_SYSTEM_PROMPT)
    });
    let mut form = Form {
        image: None,
        model: args
            .model
            .clone()
            .unwrap_or_else(|| models.first().cloned().unwrap_or_default()),
        instructions,
        max_tokens: config.vision.max_tokens,
        mode: if args.analysis_only {
            OutputMode::AnalysisOnly
        } else {
            OutputMode::AllowImageOutput
        },
    };

    let client = OpenRouterClient::new(&config.api)?;
    let studio = Studio::new(&client);
    let skin = create_markdown_skin();
    let output_dir = config.vision.output_dir.clone();

    if let Some(path) = &args.image {
        form.image = Some((path.clone(), attach(path)?));
    }

    // Single shot: no download file, it would be gone on exit
    if args.prompt.is_some() || args.image.is_some() {
        let request = form.request(args.prompt.as_deref().unwrap_or_default());
        if run_once(&studio, &request, None, &output_dir, &skin).await.is_none() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut downloads = DownloadTracker::new();
    let mut last_download: Option<PathBuf> = None;
    let mut input = LineReader::new();

    println!("👁️ Multimodal AI Studio (via OpenRouter)");
    println!("Provide a text prompt and/or an image to any model and see what happens.\n");
    println!("Model: {}", form.model);
    println!("Type /help for commands.\n");

    while let Some(line) = input.read("> ").await? {
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let Some(command) = line.strip_prefix('/') else {
            let request = form.request(&line);
            last_download = run_once(&studio, &request, Some(&mut downloads), &output_dir, &skin)
                .await
                .and_then(|outcome| outcome.download);
            continue;
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };

        match name {
            "help" => print_help(),
            "run" => {
                if let Some((path, _)) = &form.image {
                    println!("🖼️  Image: {}", path.display());
                }
                let request = form.request("");
                last_download = run_once(&studio, &request, Some(&mut downloads), &output_dir, &skin)
                    .await
                    .and_then(|outcome| outcome.download);
            }
            "image" if arg.is_empty() => {
                form.image = None;
                println!("Image detached.\n");
            }
            "image" => {
                let path = PathBuf::from(arg);
                match attach(&path) {
                    Ok(image) => form.image = Some((path, image)),
                    Err(e) => eprintln!("❌ {e}\n"),
                }
            }
            "models" => {
                println!("\nAvailable models:");
                for (i, m) in models.iter().enumerate() {
                    let marker = if *m == form.model { "•" } else { " " };
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
                if !chosen.is_empty() {
                    form.model = chosen;
                }
                println!("Model: {}\n", form.model);
            }
            "system" => {
                if !arg.is_empty() {
                    form.instructions = arg.to_string();
                }
                println!("System instructions: {}\n", form.instructions);
            }
            "max-tokens" => match arg.parse::<u32>() {
                Ok(n) => {
                    form.max_tokens = config::clamp_logged("max_tokens", n, VISION_MAX_TOKENS_RANGE);
                    println!("Max tokens: {}\n", form.max_tokens);
                }
                Err(e) => eprintln!("Invalid max tokens '{arg}': {e}\n"),
            },
            "analysis" => {
                form.mode = if matches!(arg, "off" | "false" | "no") {
                    OutputMode::AllowImageOutput
                } else {
                    OutputMode::AnalysisOnly
                };
                println!("Analysis only: {}\n", form.mode == OutputMode::AnalysisOnly);
            }
            "download" => match &last_download {
                Some(path) => println!("⬇️  Last text response: {}\n", path.display()),
                None => println!("No text response to download yet.\n"),
            },
            "clear" => {
                form.image = None;
                last_download = None;
                println!("Inputs and outputs cleared.\n");
            }
            other => eprintln!("Unknown command: /{other} (try /help)\n"),
        }
    }

    println!("Goodbye!");
    Ok(())
}
