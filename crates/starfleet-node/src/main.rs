//! starfleet: operator CLI for the Starfleet staking ledger.
//!
//! Every invocation opens the sled database under `--data-dir`, which holds
//! both the ledger state and the local asset store, runs one command and
//! exits. The time each operation sees is the wall clock unless `--now`
//! pins it.
//!
//! Usage:
//!   starfleet deploy             --params <file>
//!   starfleet status
//!   starfleet deposit            --from <addr> --amount <units>
//!   starfleet withdraw           --from <addr>
//!   starfleet transfer-tokens    --caller <addr> --custodian <addr>
//!   starfleet account-startrac   --caller <addr> --file <json> [--overwrite]
//!   starfleet claim              --from <addr>
//!   starfleet validate           [--expected-owner <addr>] [--expected-t-zero <ts>]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use starfleet_assets::AssetStore;
use starfleet_core::collaborator::{NativeLedger, TokenLedger};
use starfleet_core::error::StakeError;
use starfleet_core::event::LedgerEvent;
use starfleet_core::params::DeployParams;
use starfleet_core::phase::Phase;
use starfleet_core::types::{Address, Balance, Timestamp};
use starfleet_state::{deploy, LedgerQuery, StakeEngine, StateDb};

mod snapshot;
mod validate;

use validate::Expectations;

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "starfleet", version, about = "Starfleet staking ledger operator CLI")]
struct Args {
    /// Directory for the persistent database.
    #[arg(long, global = true, default_value = "~/.starfleet/data")]
    data_dir: PathBuf,

    /// Unix time to run the command at. Defaults to the wall clock.
    #[arg(long, global = true)]
    now: Option<Timestamp>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy a new ledger from a JSON params file.
    Deploy {
        #[arg(long)]
        params: PathBuf,
    },

    /// Print configuration, phase and totals.
    Status,

    /// Print the stake, entitlement and bridged stake of one address.
    Account {
        #[arg(long)]
        address: Address,
    },

    /// List current participants.
    Participants,

    /// List committed ledger events.
    Events,

    /// Stake tokens during boarding.
    Deposit {
        #[arg(long)]
        from: Address,
        /// Amount in token base units.
        #[arg(long)]
        amount: Balance,
    },

    /// Withdraw a whole stake while the minimum is unmet.
    Withdraw {
        #[arg(long)]
        from: Address,
    },

    /// Move the pooled tokens to a multisig custodian.
    TransferTokens {
        #[arg(long)]
        caller: Address,
        #[arg(long)]
        custodian: Address,
    },

    /// Record secondary-pool entitlements from a JSON file.
    AccountStartrac {
        #[arg(long)]
        caller: Address,
        #[arg(long)]
        file: PathBuf,
        /// Replace entitlements that are already assigned.
        #[arg(long)]
        overwrite: bool,
    },

    /// Claim an assigned entitlement.
    Claim {
        #[arg(long)]
        from: Address,
    },

    /// Sweep a foreign token held by the ledger to the owner.
    RecoverTokens {
        #[arg(long)]
        caller: Address,
        #[arg(long)]
        token: Address,
    },

    /// Sweep native currency held by the ledger to the owner.
    RecoverEther {
        #[arg(long)]
        caller: Address,
    },

    TransferOwnership {
        #[arg(long)]
        caller: Address,
        #[arg(long)]
        new_owner: Address,
    },

    /// Always refused; kept so operators get an explicit answer.
    RenounceOwnership {
        #[arg(long)]
        caller: Address,
    },

    /// Check the deployment against the expected configuration.
    Validate {
        #[arg(long)]
        expected_owner: Option<Address>,
        #[arg(long)]
        expected_t_zero: Option<Timestamp>,
        /// Phase expected at `--now` (pre-start, boarding, locked, bridge-window, closed).
        #[arg(long, value_parser = parse_phase)]
        expected_phase: Option<Phase>,
    },

    // ── Local asset tooling ──────────────────────────────────────────────────
    /// Credit tokens to an address (development faucet).
    Mint {
        #[arg(long)]
        token: Option<Address>,
        #[arg(long)]
        to: Address,
        #[arg(long)]
        amount: Balance,
    },

    /// Set the allowance `owner` grants the ledger on the managed token.
    Approve {
        #[arg(long)]
        owner: Address,
        #[arg(long)]
        amount: Balance,
    },

    /// Register a contract, optionally with an owner list.
    RegisterContract {
        #[arg(long)]
        address: Address,
        /// Comma-separated owners. Omit for a contract without owner enumeration.
        #[arg(long, value_delimiter = ',')]
        owners: Option<Vec<Address>>,
    },

    /// Force native currency onto an address.
    ForceNative {
        #[arg(long)]
        to: Address,
        #[arg(long)]
        amount: Balance,
    },
}

fn parse_phase(s: &str) -> Result<Phase, String> {
    match s {
        "pre-start" => Ok(Phase::PreStart),
        "boarding" => Ok(Phase::Boarding),
        "locked" => Ok(Phase::Locked),
        "bridge-window" => Ok(Phase::BridgeWindow),
        "closed" => Ok(Phase::Closed),
        other => Err(format!("unknown phase '{other}'")),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,starfleet=debug")),
        )
        .init();

    let args = Args::parse();
    let now = args.now.unwrap_or_else(|| chrono::Utc::now().timestamp());

    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let sled_db = sled::open(&data_dir).context("opening database")?;
    let state = Arc::new(StateDb::with_db(sled_db.clone()).context("opening state trees")?);
    let assets = AssetStore::with_db(sled_db).context("opening asset trees")?;

    let result = run(args.command, Arc::clone(&state), assets, now);
    state.flush().context("flushing database")?;
    result
}

fn run(command: Command, state: Arc<StateDb>, assets: AssetStore, now: Timestamp) -> anyhow::Result<()> {
    match command {
        Command::Deploy { params } => {
            let params = load_params(&params)?;
            let cfg = deploy(&state, &params, now).context("deploying ledger")?;
            println!("Deployed ledger {}", cfg.ledger);
            println!("Token:          {}", cfg.token);
            println!("Owner:          {}", params.owner);
            println!("t_zero:         {}", cfg.clock.t_zero());
            println!("Boarding ends:  {}", cfg.clock.boarding_period_end());
            println!("Lock ends:      {}", cfg.clock.lock_period_end());
            println!("Bridge ends:    {}", cfg.clock.bridge_period_end());
            Ok(())
        }

        Command::Status => {
            println!("{}", LedgerQuery::new(&state).describe(now)?);
            Ok(())
        }

        Command::Validate { expected_owner, expected_t_zero, expected_phase } => {
            let exp = Expectations {
                owner: expected_owner,
                t_zero: expected_t_zero,
                phase: expected_phase,
                ..Default::default()
            };
            let failures = validate::validate(&state, &exp, now)?;
            for f in &failures {
                println!("=============== Error ================");
                println!("{}", f.check);
                println!("\tExpected: {}", f.expected);
                println!("\tActual:   {}", f.actual);
            }
            if !failures.is_empty() {
                bail!("{} deployment check(s) failed", failures.len());
            }
            println!("All deployment checks passed.");
            Ok(())
        }

        // Asset tooling works on the raw store and needs no deployed ledger,
        // except where the managed token is implied.
        Command::Mint { token, to, amount } => {
            let token = match token {
                Some(t) => t,
                None => state.config().context("no --token given and no ledger deployed")?.token,
            };
            assets.mint(&token, &to, amount)?;
            println!("Minted {} of {} to {}", amount, token, to);
            Ok(())
        }
        Command::Approve { owner, amount } => {
            let cfg = state.config()?;
            assets.approve(&cfg.token, &owner, &cfg.ledger, amount)?;
            println!("{} approved the ledger for {}", owner, amount);
            Ok(())
        }
        Command::RegisterContract { address, owners } => {
            assets.register_contract(&address, owners)?;
            println!("Registered contract {}", address);
            Ok(())
        }
        Command::ForceNative { to, amount } => {
            assets.force_native(&to, amount)?;
            println!("Forced {} native units onto {}", amount, to);
            Ok(())
        }

        other => {
            let mut engine = StakeEngine::new(state, assets).context("loading ledger")?;
            run_ledger(other, &mut engine, now)
        }
    }
}

fn run_ledger(command: Command, engine: &mut StakeEngine<AssetStore>, now: Timestamp) -> anyhow::Result<()> {
    let events = match command {
        Command::Account { address } => {
            println!("Address:      {}", address);
            println!("Stake:        {}", engine.get_stake(&address)?);
            println!("Entitlement:  {}", engine.get_startrac_amount(&address)?);
            println!("Bridged:      {}", engine.get_bridged_stake(&address)?);
            let token = engine.config().token;
            println!("Balance:      {}", engine.assets().balance_of(&token, &address)?);
            println!("Native:       {}", engine.assets().native_balance(&address)?);
            return Ok(());
        }
        Command::Participants => {
            let members = engine.get_participants()?;
            for m in &members {
                println!("{}  {}", m, engine.get_stake(m)?);
            }
            println!("{} participant(s)", members.len());
            return Ok(());
        }
        Command::Events => {
            for record in engine.events()? {
                println!("#{:<6} {:>12}  {:?}", record.seq, record.at, record.event);
            }
            return Ok(());
        }

        Command::Deposit { from, amount } => refused(engine.deposit(from, amount, now))?,
        Command::Withdraw { from } => refused(engine.withdraw(from, now))?,
        Command::TransferTokens { caller, custodian } => {
            refused(engine.transfer_tokens(caller, custodian, now))?
        }
        Command::AccountStartrac { caller, file, overwrite } => {
            let (contributors, amounts) = snapshot::load(&file)?;
            let report = refused(engine.account_startrac(caller, &contributors, &amounts, overwrite, now))?;
            println!(
                "assigned {}  overwritten {}  cleared {}  skipped: zero {} existing {} claimed {}",
                report.assigned,
                report.overwritten,
                report.cleared,
                report.skipped_zero,
                report.skipped_existing,
                report.skipped_claimed
            );
            report.events
        }
        Command::Claim { from } => refused(engine.fallback_withdraw_tokens(from, now))?,
        Command::RecoverTokens { caller, token } => {
            refused(engine.withdraw_misplaced_tokens(caller, token, now))?
        }
        Command::RecoverEther { caller } => refused(engine.withdraw_misplaced_ether(caller, now))?,
        Command::TransferOwnership { caller, new_owner } => {
            refused(engine.transfer_ownership(caller, new_owner, now))?
        }
        Command::RenounceOwnership { caller } => {
            refused(engine.renounce_ownership(caller))?;
            Vec::new()
        }

        Command::Deploy { .. }
        | Command::Status
        | Command::Validate { .. }
        | Command::Mint { .. }
        | Command::Approve { .. }
        | Command::RegisterContract { .. }
        | Command::ForceNative { .. } => bail!("command does not operate on the ledger engine"),
    };
    print_events(&events);
    Ok(())
}

/// Log a refused operation with its error class before handing it to anyhow.
fn refused<T>(result: Result<T, StakeError>) -> anyhow::Result<T> {
    result.map_err(|e| {
        warn!(kind = ?e.kind(), error = %e, "operation refused");
        anyhow::Error::new(e)
    })
}

fn print_events(events: &[LedgerEvent]) {
    for event in events {
        println!("{:?}", event);
    }
    info!(count = events.len(), "done");
}

/// Load deployment parameters from a JSON file.
fn load_params(path: &Path) -> anyhow::Result<DeployParams> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading deploy params from {}", path.display()))?;
    serde_json::from_str(&json).context("parsing deploy params JSON")
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")).ok();
    expand_tilde_with(path, home.as_deref())
}

fn expand_tilde_with(path: &Path, home: Option<&str>) -> PathBuf {
    match (path.strip_prefix("~"), home) {
        (Ok(stripped), Some(home)) => PathBuf::from(home).join(stripped),
        _ => path.to_path_buf(),
    }
}
