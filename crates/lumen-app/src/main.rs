use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use lumen_app::{AppConfig, ChatPanel, Cli, NotSentReason, SendOutcome};
use lumen_bridge::{Bridge, InProcessTransport};
use lumen_host::HostServices;
use lumen_modes::Mode;
use lumen_providers::provider_ids;
use lumen_types::Attachment;
use std::io::{self, BufRead, Write};
use std::path::Path;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    let transport = InProcessTransport::new();
    let _host = HostServices::install(transport.clone(), cli.workdir.clone());
    let bridge = Bridge::new(transport);

    let mut panel = ChatPanel::new(bridge, config);
    if let Some(provider) = cli.provider {
        panel.set_provider(provider);
    }
    if let Some(model) = cli.model {
        panel.set_model(model);
    }
    if let Some(mode) = Mode::from_name(&cli.mode) {
        panel.set_mode(mode);
    } else {
        eprintln!("{} unknown mode '{}', using ask", "warning:".yellow(), cli.mode);
    }
    if let Some(turns) = cli.max_turns {
        panel.options.max_tool_turns = turns;
    }
    if cli.no_stream {
        panel.options.stream = false;
    }

    println!(
        "{} {} | provider {} | model {} | mode {}",
        "lumen".cyan().bold(),
        env!("CARGO_PKG_VERSION"),
        panel.provider_id.green(),
        panel.model_id.green(),
        panel.mode.name().green(),
    );
    if cli.verbose {
        println!(
            "{} workdir {} | request logs under {}",
            "debug:".dimmed(),
            cli.workdir.display(),
            lumen_logging::logs_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "<unavailable>".to_string()),
        );
    }
    println!("Type /help for commands.\n");

    let stdin = io::stdin();
    loop {
        print!("{} ", format!("[{}]>", panel.mode.name()).blue().bold());
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            if !handle_command(&mut panel, command).await? {
                break;
            }
            continue;
        }

        panel.input = line.to_string();
        match panel.send().await {
            SendOutcome::Replied(text) => {
                println!("\n{}\n", text);
            }
            SendOutcome::NotSent(NotSentReason::EmptyInput) => {}
            SendOutcome::NotSent(NotSentReason::ModeUnavailable) => {
                println!(
                    "{} {} mode needs attached context; use /attach <file>",
                    "note:".yellow(),
                    panel.mode.name()
                );
            }
            SendOutcome::Failed(note) => {
                println!("{} {}", "error:".red().bold(), note);
            }
            SendOutcome::TurnLimit(n) => {
                println!(
                    "{} agent stopped after {} tool turns without a final answer",
                    "note:".yellow(),
                    n
                );
            }
            SendOutcome::Cancelled => {
                println!("{} cancelled", "note:".yellow());
            }
        }
    }

    Ok(())
}

/// Slash commands. Returns false to quit.
async fn handle_command(panel: &mut ChatPanel, command: &str) -> Result<bool> {
    let mut parts = command.splitn(2, ' ');
    let name = parts.next().unwrap_or("");
    let arg = parts.next().unwrap_or("").trim();

    match name {
        "quit" | "exit" | "q" => return Ok(false),
        "help" => {
            println!("  /mode <name>      switch mode ({})", mode_names());
            println!("  /provider <id>    switch provider ({})", provider_ids().join(", "));
            println!("  /model <id>       switch model");
            println!("  /models           list the current provider's models");
            println!("  /attach <file>    attach a file as context");
            println!("  /context          show attached context");
            println!("  /clear            clear attached context");
            println!("  /history          print the conversation");
            println!("  /quit             exit");
        }
        "mode" => match Mode::from_name(arg) {
            Some(mode) => {
                panel.set_mode(mode);
                println!("mode: {}", mode.name().green());
                println!("{}", mode.placeholder().dimmed());
            }
            None => println!("{} modes: {}", "error:".red(), mode_names()),
        },
        "provider" => {
            if provider_ids().iter().any(|p| *p == arg) {
                panel.set_provider(arg);
                println!("provider: {}", arg.green());
            } else {
                println!("{} providers: {}", "error:".red(), provider_ids().join(", "));
            }
        }
        "model" => {
            if arg.is_empty() {
                println!("model: {}", panel.model_id.green());
            } else {
                panel.set_model(arg);
                println!("model: {}", arg.green());
            }
        }
        "models" => {
            let list = panel.refresh_models().await;
            if list.success {
                for model in &panel.models {
                    println!("  {}  {}", model.id.green(), model.display_name.dimmed());
                }
            } else {
                println!(
                    "{} {}",
                    "error:".red(),
                    list.error.unwrap_or_else(|| "unknown failure".to_string())
                );
            }
        }
        "attach" => match load_attachment(arg) {
            Ok(attachment) => {
                println!("attached: {}", attachment.path.green());
                panel.attach(attachment);
            }
            Err(e) => println!("{} {}", "error:".red(), e),
        },
        "context" => {
            if panel.context.is_empty() {
                println!("no attached context");
            }
            for a in &panel.context {
                println!("  {} ({} bytes, {})", a.path, a.content.len(), a.language);
            }
        }
        "clear" => {
            panel.clear_context();
            println!("context cleared");
        }
        "history" => {
            for msg in &panel.messages {
                println!("{}: {}", msg.role.as_str().bold(), msg.content);
            }
        }
        _ => println!("{} unknown command '/{}'", "error:".red(), name),
    }
    Ok(true)
}

fn mode_names() -> String {
    Mode::ALL
        .iter()
        .map(|m| m.name())
        .collect::<Vec<_>>()
        .join(", ")
}

fn load_attachment(path: &str) -> Result<Attachment> {
    use anyhow::Context;
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path))?;
    let language = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(language_for_extension)
        .unwrap_or("")
        .to_string();
    Ok(Attachment {
        path: path.to_string(),
        language,
        content,
    })
}

fn language_for_extension(ext: &str) -> &'static str {
    match ext {
        "rs" => "rust",
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "go" => "go",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        "java" => "java",
        "rb" => "ruby",
        "sh" => "bash",
        "toml" => "toml",
        "json" => "json",
        "md" => "markdown",
        "html" => "html",
        "css" => "css",
        _ => "",
    }
}
