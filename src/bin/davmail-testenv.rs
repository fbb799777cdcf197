#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for inspecting the DavMail test environment

use clap::{Parser, Subcommand};
use davmail_testkit::{EnvironmentSummary, TrustOverride, fixture};
use std::io::Write;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "davmail-testenv")]
#[command(about = "Inspect the DavMail integration test environment")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the test configuration and print it (password redacted)
    Check,

    /// Print the serialized test message
    Fixture {
        /// Recipient address
        #[arg(long)]
        to: Option<String>,
    },

    /// Handshake with a TLS endpoint under the configured trust policy
    Probe {
        /// Host to connect to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to connect to
        #[arg(long)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match &args.command {
        Command::Check => cmd_check(&args)?,
        Command::Fixture { to } => cmd_fixture(to.as_deref())?,
        Command::Probe { host, port } => cmd_probe(&args, host, *port).await?,
    }

    Ok(())
}

fn cmd_check(args: &Args) -> anyhow::Result<()> {
    let env = davmail_testkit::try_environment()?;
    let summary = env.summary();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    Ok(())
}

fn cmd_fixture(to: Option<&str>) -> anyhow::Result<()> {
    let message = fixture::create_message(to)?;
    let mut stdout = std::io::stdout().lock();
    message.write_to(&mut stdout)?;
    stdout.flush()?;
    Ok(())
}

async fn cmd_probe(args: &Args, host: &str, port: u16) -> anyhow::Result<()> {
    let env = davmail_testkit::try_environment()?;
    let trust = match davmail_testkit::trust::registered() {
        Some(registered) => registered.clone(),
        None => TrustOverride::new(env.trust_policy().clone())?,
    };

    let fingerprint = trust.probe(host, port).await?;

    if args.json {
        let report = serde_json::json!({
            "host": host,
            "port": port,
            "policy": trust.policy().to_string(),
            "fingerprint": fingerprint.as_str(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Policy:      {}", trust.policy());
        println!("Fingerprint: {fingerprint}");
    }

    Ok(())
}

fn print_summary(summary: &EnvironmentSummary) {
    let credentials = &summary.credentials;
    println!("URL:         {}", credentials.url.as_deref().unwrap_or("-"));
    println!("Username:    {}", credentials.username.as_deref().unwrap_or("-"));
    println!(
        "Password:    {}",
        if credentials.password.is_some() {
            "(set)"
        } else {
            "-"
        }
    );
    println!("Mode:        {}", summary.mode.as_deref().unwrap_or("-"));
    println!("Server mode: {}", summary.server_mode);
    println!("Trust:       {}", summary.trust);

    if let Some(krb) = &summary.kerberos {
        println!(
            "Kerberos:    realm={} kdc={}",
            krb.realm.as_deref().unwrap_or("-"),
            krb.kdc.as_deref().unwrap_or("-")
        );
    }
}
