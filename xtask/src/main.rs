use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use meshdfu_core::protocol::{Field, FieldValue, Message, MessageType, infer};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Tasks for the project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project
    Build,
    /// Run the test suite
    Test,
    /// Run the CLI
    Run {
        /// Arguments passed through to meshdfu
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
    /// Decode a hex-encoded DFU message
    Decode {
        /// Message bytes as hex, without the link tag
        hex: String,
    },
    /// Encode a DFU message from field assignments
    Encode {
        /// Message type (FWID, READY_APP, START_DFU, DFU_DATA)
        kind: String,
        /// Field assignments such as appVersion=2 or dataSegment=00ff
        fields: Vec<String>,
    },
}

fn cargo(args: &[&str]) -> Result<()> {
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("cargo {} failed", args.join(" "));
    }
    Ok(())
}

fn parse_assignment(assignment: &str) -> Result<(Field, FieldValue)> {
    let (name, value) = assignment
        .split_once('=')
        .ok_or_else(|| anyhow!("expected name=value, got {:?}", assignment))?;
    let field: Field = name.parse()?;

    let value = if !field.is_integer() {
        FieldValue::Raw(hex::decode(value).with_context(|| format!("{} takes hex bytes", field))?)
    } else if let Some(hex_digits) = value.strip_prefix("0x") {
        FieldValue::Int(u64::from_str_radix(hex_digits, 16)?)
    } else {
        FieldValue::Int(value.parse()?)
    };
    Ok((field, value))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => {
            println!("Building project...");
            cargo(&["build", "--workspace"])?;
        }
        Commands::Test => {
            println!("Running tests...");
            cargo(&["test", "--workspace"])?;
        }
        Commands::Run { args } => {
            println!("Running CLI...");
            let mut cmd = vec!["run", "-p", "meshdfu-cli", "--"];
            cmd.extend(args.iter().map(String::as_str));
            cargo(&cmd)?;
        }
        Commands::Decode { hex } => {
            let bytes = hex::decode(hex.trim()).context("invalid hex")?;
            let message = infer(&bytes)?;
            println!("{:#?}", message);
        }
        Commands::Encode { kind, fields } => {
            let kind = MessageType::from_name(kind)
                .ok_or_else(|| anyhow!("unknown message type {:?}", kind))?;
            let mut message = Message::new(kind);
            for assignment in fields {
                let (field, value) = parse_assignment(assignment)?;
                message.set(field, value);
            }
            let encoded = message.encode()?;
            for warning in &encoded.warnings {
                eprintln!("warning: {}", warning);
            }
            println!("{}", hex::encode(&encoded.bytes));
        }
    }

    Ok(())
}
