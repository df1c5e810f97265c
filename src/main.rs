//! Adaptive Agency
//!
//! Command-line host for the tool forge:
//! - Scans previously generated tools on start
//! - Generates and revises tools on request
//! - Invokes any loaded tool with JSON parameters

use adaptive_agency::forge::{CapabilitySpec, ForgeConfig, SynthesisOutcome, ToolForge};
use adaptive_agency::tools::{ForgeTool, ReviseTool, ToolCall, ToolRegistry};
use adaptive_agency::utils::init_logging;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "adaptive_agency", version, about = "Generate, load and run tools at runtime")]
struct Cli {
    /// JSON forge configuration; FORGE_* environment variables override it
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// With no command, starts an interactive session
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Load generated tools and report what was found
    Scan,
    /// List loaded tools
    List,
    /// Show loaded artifact units with their paths and digests
    Units,
    /// Generate a new tool
    Synthesize {
        name: String,
        description: String,
        /// Inputs, e.g. "text: str, count: int"
        #[arg(long)]
        inputs: Option<String>,
        /// Outputs, e.g. "result: str"
        #[arg(long)]
        outputs: Option<String>,
        /// Human-readable name
        #[arg(long)]
        title: Option<String>,
    },
    /// Rebuild a generated tool from feedback
    Revise { name: String, feedback: String },
    /// Run a loaded tool with JSON parameters
    Invoke {
        name: String,
        #[arg(value_name = "JSON")]
        params: String,
    },
}

// ──────────────────────────────────────────────────────────────────────────────
// MAIN ENTRY POINT
// ──────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize logging
    init_logging("adaptive_agency=info");

    let config = match &cli.config {
        Some(path) => ForgeConfig::load(path).await?,
        None => ForgeConfig::default(),
    }
    .apply_env();
    info!("Artifacts in {:?}, model {}", config.artifact_dir, config.model);

    // Initialize tools
    let tools = Arc::new(ToolRegistry::new());
    let forge = Arc::new(ToolForge::new(&config, config.build_provider(), tools.clone()));
    tools.register_instance(ForgeTool::new(forge.clone())).await;
    tools.register_instance(ReviseTool::new(forge.clone())).await;

    // Load existing generated tools
    let scan = forge.load_existing().await;

    match cli.command {
        None => interactive(&forge, &tools).await,
        Some(Command::Scan) => {
            println!("{}", serde_json::to_string_pretty(&scan)?);
            Ok(())
        }
        Some(Command::List) => {
            print!("{}", tools.generate_tools_prompt().await);
            Ok(())
        }
        Some(Command::Units) => {
            println!("{}", serde_json::to_string_pretty(&forge.loader().units().await)?);
            Ok(())
        }
        Some(Command::Synthesize { name, description, inputs, outputs, title }) => {
            let mut spec = build_spec(&name, &description, inputs.as_deref(), outputs.as_deref())?;
            if let Some(title) = title {
                spec = spec.with_display_name(title);
            }
            report(forge.synthesize(&spec).await)
        }
        Some(Command::Revise { name, feedback }) => report(forge.revise_existing(&name, &feedback).await),
        Some(Command::Invoke { name, params }) => invoke(&tools, &name, &params).await,
    }
}

fn build_spec(name: &str, description: &str, inputs: Option<&str>, outputs: Option<&str>) -> Result<CapabilitySpec> {
    let mut spec = CapabilitySpec::new(name, description);
    if let Some(inputs) = inputs.filter(|s| !s.trim().is_empty()) {
        spec.inputs = CapabilitySpec::parse_params(inputs)?;
    }
    if let Some(outputs) = outputs.filter(|s| !s.trim().is_empty()) {
        spec.outputs = CapabilitySpec::parse_params(outputs)?;
    }
    Ok(spec)
}

fn report(outcome: SynthesisOutcome) -> Result<()> {
    match &outcome {
        SynthesisOutcome::Registered { message, .. } => {
            println!("✅ {}", message);
            Ok(())
        }
        SynthesisOutcome::Failed { message, kind, .. } => bail!("{:?}: {}", kind, message),
    }
}

async fn invoke(tools: &ToolRegistry, name: &str, params: &str) -> Result<()> {
    let parameters: serde_json::Value = serde_json::from_str(params)
        .or_else(|_| serde_json::to_value(params))
        .context("Invalid parameters")?;
    let call = ToolCall { name: name.to_string(), parameters };
    let output = tools.execute(&call).await?;
    if output.success {
        println!("{}", output.summary);
        Ok(())
    } else {
        bail!("{}", output.summary)
    }
}

async fn interactive(forge: &ToolForge, tools: &ToolRegistry) -> Result<()> {
    println!("\n{}", "═".repeat(60));
    println!("🚀 Adaptive Agency v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", "═".repeat(60));
    println!("🔧 Tools: {}", tools.tool_names().await.join(", "));
    println!("\n💡 Commands: 'quit' | 'list' | 'forge' | 'revise' | 'call'\n");

    loop {
        let Some(command) = prompt("🤖 You: ")? else { break };

        match command.to_lowercase().as_str() {
            "" => continue,
            "quit" | "exit" | "q" => {
                println!("\n👋 Goodbye!\n");
                break;
            }
            "list" => println!("\n{}", tools.generate_tools_prompt().await),
            "forge" => {
                let name = prompt("   name: ")?.unwrap_or_default();
                let description = prompt("   description: ")?.unwrap_or_default();
                let inputs = prompt("   inputs (e.g. text: str): ")?.unwrap_or_default();
                let outputs = prompt("   outputs (e.g. result: str): ")?.unwrap_or_default();
                let spec = match build_spec(&name, &description, Some(&inputs), Some(&outputs)) {
                    Ok(spec) => spec,
                    Err(e) => {
                        println!("❌ {}\n", e);
                        continue;
                    }
                };
                println!("\n⚙️  Generating...\n");
                print_outcome(&forge.synthesize(&spec).await);
            }
            "revise" => {
                let name = prompt("   name: ")?.unwrap_or_default();
                let feedback = prompt("   what should change: ")?.unwrap_or_default();
                println!("\n⚙️  Revising...\n");
                print_outcome(&forge.revise_existing(&name, &feedback).await);
            }
            "call" => {
                let name = prompt("   tool: ")?.unwrap_or_default();
                let params = prompt("   params (JSON): ")?.unwrap_or_default();
                if let Err(e) = invoke(tools, &name, &params).await {
                    println!("❌ {}\n", e);
                }
            }
            other => println!("Unknown command '{}'\n", other),
        }
    }

    Ok(())
}

/// Read one trimmed line; `None` on end of input
fn prompt(label: &str) -> Result<Option<String>> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn print_outcome(outcome: &SynthesisOutcome) {
    let status = if outcome.is_registered() { "✅" } else { "❌" };
    println!("{} {}\n", status, outcome.message());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_synthesize_args() {
        let cli = Cli::try_parse_from([
            "adaptive_agency",
            "synthesize",
            "reverse_text",
            "Reverse a string",
            "--inputs",
            "text: str",
            "--config",
            "forge.json",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("forge.json")));
        match cli.command {
            Some(Command::Synthesize { name, inputs, outputs, .. }) => {
                assert_eq!(name, "reverse_text");
                assert_eq!(inputs.as_deref(), Some("text: str"));
                assert!(outputs.is_none());
            }
            _ => panic!("expected synthesize"),
        }
    }

    #[test]
    fn test_rejects_stray_arguments_and_honors_subcommand_help() {
        let err = Cli::try_parse_from(["adaptive_agency", "revise", "a", "b", "c"]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);

        let err = Cli::try_parse_from(["adaptive_agency", "scan", "--help"]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_build_spec_ignores_blank_lists() {
        let spec = build_spec("shout", "Uppercase", Some("  "), Some("result: str")).unwrap();
        assert!(spec.inputs.is_empty());
        assert_eq!(spec.outputs.len(), 1);
    }
}
