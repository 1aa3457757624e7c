//! hcert-verify CLI - Offline verification of signed health certificates.
//!
//! This binary decodes scanned `HC1:` payloads and runs the verification
//! engine against a trust list and rule set loaded from local files.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use hcert_verify_core::{
    InMemoryRuleRepository, LiteralEvaluator, Rule, TrustList, TrustRegistry, Verdict,
    VerificationEngine, VerifyConfig, VerifyError,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// hcert-verify - Offline verification of signed health certificates.
///
/// Certificates are read as the text scanned from their QR code, including
/// the `HC1:` prefix. Verification needs a DSC trust list and, optionally,
/// a business rule set, both as JSON files.
#[derive(Parser)]
#[command(name = "hcert-verify")]
#[command(version = VERSION)]
#[command(about = "Offline verification of signed health certificates")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a certificate without checking its signature
    Decode {
        /// Scanned QR text
        qr: String,
    },

    /// Verify a certificate
    Verify {
        /// Scanned QR text
        qr: String,

        /// DSC trust list (JSON)
        #[arg(long)]
        trust_list: PathBuf,

        /// Business rules (JSON array)
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Acceptance country (overrides config)
        #[arg(long)]
        country: Option<String>,

        /// Region within the acceptance country (overrides config)
        #[arg(long)]
        region: Option<String>,

        /// Verification time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

fn read_file(path: &Path) -> Result<String, VerifyError> {
    std::fs::read_to_string(path).map_err(|e| VerifyError::config(format!("{}: {e}", path.display())))
}

fn load_rules(path: &Path) -> Result<Vec<Rule>, VerifyError> {
    serde_json::from_str(&read_file(path)?)
        .map_err(|e| VerifyError::config(format!("invalid rules file {}: {e}", path.display())))
}

fn run_decode(config: &VerifyConfig, qr: &str, json_output: bool) -> Result<ExitCode, VerifyError> {
    let engine = VerificationEngine::new(
        config.clone(),
        Arc::new(TrustRegistry::new()),
        Arc::new(InMemoryRuleRepository::new()),
        Arc::new(LiteralEvaluator),
    );
    let claims = engine.decode(qr)?;
    let output = claims.to_json();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
    } else {
        println!("Issuer:  {}", claims.issuer_country);
        if let Some(iat) = claims.valid_from {
            println!("Issued:  {iat}");
        }
        println!("Expires: {}", claims.valid_until);
        println!();
        println!("{}", serde_json::to_string_pretty(&output["hcert"]).unwrap_or_default());
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_verify(
    config: VerifyConfig,
    qr: &str,
    trust_list: &Path,
    rules: Option<&Path>,
    at: DateTime<Utc>,
    json_output: bool,
) -> Result<ExitCode, VerifyError> {
    let certificates = TrustList::from_json(&read_file(trust_list)?)?;
    let rules = match rules {
        Some(path) => load_rules(path)?,
        None => Vec::new(),
    };

    let engine = VerificationEngine::new(
        config,
        Arc::new(TrustRegistry::with_certificates(certificates)),
        Arc::new(InMemoryRuleRepository::with_rules(rules)),
        Arc::new(LiteralEvaluator),
    );
    let report = engine.verify(qr, at).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
    } else {
        println!("Certificate: {} ({:?})", report.uci, report.certificate_type);
        println!("Issuer:      {}", report.issuer_country);
        println!("Signed by:   {}", report.signer_kid);
        println!("Expires:     {}", report.expires_at);
        for rule in &report.rules {
            println!("  [{:?}] {} {}", rule.outcome, rule.identifier, rule.description);
        }
        println!();
        match &report.verdict {
            Verdict::Valid => println!("VALID"),
            Verdict::Invalid { reasons } => {
                println!("INVALID");
                reasons.iter().for_each(|r| println!("  - {r}"));
            }
            Verdict::Incomplete { reasons } => {
                println!("INCOMPLETE");
                reasons.iter().for_each(|r| println!("  - {r}"));
            }
        }
    }

    Ok(match report.verdict {
        Verdict::Valid => ExitCode::SUCCESS,
        Verdict::Invalid { .. } => ExitCode::from(1),
        Verdict::Incomplete { .. } => ExitCode::from(2),
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let json_output = cli.format == "json";

    // Initialize logging (suppress for JSON output)
    if json_output {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::ERROR)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = match &cli.config {
        Some(path) => VerifyConfig::load(path),
        None => Ok(VerifyConfig::default()),
    };

    let result = match config {
        Err(e) => Err(e),
        Ok(config) => match cli.command {
            Commands::Decode { qr } => run_decode(&config, &qr, json_output),
            Commands::Verify {
                qr,
                trust_list,
                rules,
                country,
                region,
                at,
            } => {
                let mut config = config;
                if let Some(country) = country {
                    config.acceptance_country = country;
                }
                if region.is_some() {
                    config.region = region;
                }
                match config.validate() {
                    Ok(()) => {
                        run_verify(
                            config,
                            &qr,
                            &trust_list,
                            rules.as_deref(),
                            at.unwrap_or_else(Utc::now),
                            json_output,
                        )
                        .await
                    }
                    Err(e) => Err(e),
                }
            }
        },
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            if json_output {
                let output = serde_json::json!({ "error": e.to_string() });
                println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
            } else {
                eprintln!("Error: {e}");
            }
            ExitCode::from(2)
        }
    }
}
