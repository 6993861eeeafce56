use std::{
    fs,
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use t9c_ledger::{
    auth::{CallAuthenticator, SignedCall},
    config::GenesisConfig,
    units::format_units,
    Address, LedgerCall, LedgerEvent, SharedLedger, TokenLedger,
};

#[derive(Parser)]
#[command(name = "t9c")]
#[command(about = "TotheNineCloud (T9C) ledger operator tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an ed25519 keypair and print its address
    Keygen {
        #[arg(long)]
        out_dir: PathBuf,
    },

    /// Build the genesis ledger and print the deployment summary
    Genesis {
        /// TOML genesis parameters
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Owner address, overrides the config file
        #[arg(long)]
        owner: Option<Address>,
    },

    /// Sign a JSONL file of ledger calls
    Sign {
        calls: PathBuf,

        /// 32-byte ed25519 secret key (64 hex chars)
        #[arg(long)]
        sk_hex: String,

        #[arg(long, default_value_t = 1)]
        start_nonce: u64,

        /// Output file, stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Verify and apply a JSONL file of signed calls against a fresh genesis
    Replay {
        signed: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        owner: Option<Address>,
    },
}

//==================== helpers ====================//

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn write_all(p: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = p.parent() {
        fs::create_dir_all(parent).ok();
    }
    let mut f = fs::File::create(p).with_context(|| format!("create {}", p.display()))?;
    f.write_all(bytes)
        .with_context(|| format!("write {}", p.display()))
}

fn load_genesis(config: Option<&Path>, owner: Option<Address>) -> Result<TokenLedger> {
    let mut genesis = match config {
        Some(path) => GenesisConfig::load(path)?,
        None => GenesisConfig::default(),
    };
    if owner.is_some() {
        genesis.owner = owner;
    }
    genesis.build().context("genesis")
}

fn json_lines(path: &Path) -> Result<Vec<(usize, String)>> {
    let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut lines = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        lines.push((idx + 1, line));
    }
    Ok(lines)
}

#[derive(Serialize)]
struct Summary<'a> {
    name: &'a str,
    symbol: &'a str,
    decimals: u8,
    owner: Address,
    paused: bool,
    total_supply: String,
    total_burned: String,
    total_fees_collected: String,
    owner_balance: String,
    max_transaction_amount: String,
    max_wallet_amount: String,
    reflection_fee_percent: u8,
    height: u64,
    state_root: String,
}

impl<'a> Summary<'a> {
    fn of(ledger: &'a TokenLedger) -> Self {
        let d = ledger.decimals();
        Self {
            name: ledger.name(),
            symbol: ledger.symbol(),
            decimals: d,
            owner: ledger.owner(),
            paused: ledger.is_paused(),
            total_supply: format_units(ledger.total_supply(), d),
            total_burned: format_units(ledger.total_burned(), d),
            total_fees_collected: format_units(ledger.total_fees_collected(), d),
            owner_balance: format_units(ledger.balance_of(&ledger.owner()), d),
            max_transaction_amount: format_units(ledger.max_transaction_amount(), d),
            max_wallet_amount: format_units(ledger.max_wallet_amount(), d),
            reflection_fee_percent: ledger.reflection_fee_percent(),
            height: ledger.height(),
            state_root: hex::encode(ledger.state_root()),
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ReplayLine {
    Ok {
        line: usize,
        caller: Address,
        height: u64,
        events: Vec<LedgerEvent>,
    },
    Rejected {
        line: usize,
        caller: Address,
        error: String,
    },
    Unauthenticated {
        line: usize,
        error: String,
    },
}

//==================== commands ====================//

fn keygen_cmd(out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir).with_context(|| format!("mkdir {}", out_dir.display()))?;

    let mut sk_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut sk_bytes);
    let sk = SigningKey::from_bytes(&sk_bytes);
    let pk = sk.verifying_key();

    write_all(&out_dir.join("sk.hex"), hex::encode(sk_bytes).as_bytes())?;
    write_all(&out_dir.join("pk.hex"), hex::encode(pk.as_bytes()).as_bytes())?;
    println!("{}", Address::from_verifying_key(&pk));
    tracing::info!(dir = %out_dir.display(), "keypair written");
    Ok(())
}

fn genesis_cmd(config: Option<&Path>, owner: Option<Address>) -> Result<()> {
    let ledger = load_genesis(config, owner)?;
    println!("{}", serde_json::to_string_pretty(&Summary::of(&ledger))?);
    Ok(())
}

fn sign_cmd(calls: &Path, sk_hex: &str, start_nonce: u64, out: Option<&Path>) -> Result<()> {
    let sk_bytes: [u8; 32] = hex::decode(sk_hex.trim())
        .context("invalid --sk-hex")?
        .try_into()
        .map_err(|_| anyhow!("--sk-hex must be exactly 32 bytes"))?;
    let sk = SigningKey::from_bytes(&sk_bytes);

    let mut output = String::new();
    for (offset, (line_no, line)) in json_lines(calls)?.into_iter().enumerate() {
        let call: LedgerCall = serde_json::from_str(&line)
            .with_context(|| format!("{}:{line_no}: invalid call", calls.display()))?;
        let signed = SignedCall::sign(&sk, start_nonce + offset as u64, call);
        output.push_str(&serde_json::to_string(&signed)?);
        output.push('\n');
    }

    match out {
        Some(path) => {
            write_all(path, output.as_bytes())?;
            tracing::info!(path = %path.display(), "signed calls written");
        }
        None => print!("{output}"),
    }
    Ok(())
}

fn replay_cmd(signed: &Path, config: Option<&Path>, owner: Option<Address>) -> Result<()> {
    let ledger = SharedLedger::new(load_genesis(config, owner)?);
    let mut auth = CallAuthenticator::new();
    let (mut applied, mut rejected) = (0usize, 0usize);

    for (line_no, line) in json_lines(signed)? {
        let envelope: SignedCall = serde_json::from_str(&line)
            .with_context(|| format!("{}:{line_no}: invalid signed call", signed.display()))?;
        let result = match auth.verify(&envelope) {
            Err(err) => {
                rejected += 1;
                ReplayLine::Unauthenticated {
                    line: line_no,
                    error: err.to_string(),
                }
            }
            Ok(caller) => {
                match ledger.execute_recorded(&caller, &envelope.call, envelope.digest()) {
                    Ok(outcome) => {
                        applied += 1;
                        ReplayLine::Ok {
                            line: line_no,
                            caller,
                            height: outcome.height,
                            events: outcome.events,
                        }
                    }
                    Err(err) => {
                        rejected += 1;
                        ReplayLine::Rejected {
                            line: line_no,
                            caller,
                            error: err.to_string(),
                        }
                    }
                }
            }
        };
        println!("{}", serde_json::to_string(&result)?);
    }

    let summary = ledger.with_ledger(|l| serde_json::to_string_pretty(&Summary::of(l)))?;
    println!("{summary}");
    tracing::info!(applied, rejected, "replay finished");
    Ok(())
}

//==================== main ====================//

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Keygen { out_dir } => keygen_cmd(&out_dir),
        Commands::Genesis { config, owner } => genesis_cmd(config.as_deref(), owner),
        Commands::Sign {
            calls,
            sk_hex,
            start_nonce,
            out,
        } => sign_cmd(&calls, &sk_hex, start_nonce, out.as_deref()),
        Commands::Replay {
            signed,
            config,
            owner,
        } => replay_cmd(&signed, config.as_deref(), owner),
    }
}
