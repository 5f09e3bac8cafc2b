//! # CLI Interface
//!
//! Defines the command-line argument structure for `warden-node` using
//! `clap` derive. Every `run` flag can also come from a `WARDEN_*`
//! environment variable.

use clap::{Parser, Subcommand, ValueEnum};

use warden_protocol::config::{
    BLOCK_TIME_MS, DEFAULT_LOCK_PERIOD, DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT,
    DEFAULT_WITHDRAWAL_THRESHOLD,
};
use warden_protocol::crypto::IntentKind;

/// Warden devnet node.
///
/// Hosts one Warden custody contract on an in-memory ledger whose height
/// advances on a fixed block timer. Serves the JSON-RPC API and exposes
/// Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "warden-node",
    about = "Warden passkey custody devnet node",
    version,
    propagate_version = true
)]
pub struct WardenNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Generate a P-256 device key pair for testing against a devnet.
    Keygen,
    /// Compute the canonical authorization digest a device should sign.
    Digest(DigestArgs),
    /// Sign a 32-byte digest with a hex-encoded P-256 secret key.
    Sign(SignArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Port for the JSON-RPC and REST API.
    #[arg(long, env = "WARDEN_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "WARDEN_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Principal that deploys the contract and may force-revoke passkeys.
    #[arg(long, env = "WARDEN_DEPLOYER", default_value = "warden.deployer")]
    pub deployer: String,

    /// Withdrawals at or above this amount are time-locked, unless a
    /// wallet sets its own threshold.
    #[arg(long, env = "WARDEN_DEFAULT_THRESHOLD", default_value_t = DEFAULT_WITHDRAWAL_THRESHOLD)]
    pub default_threshold: u64,

    /// Default lock period in blocks, within [1, 1008].
    #[arg(long, env = "WARDEN_DEFAULT_LOCK_PERIOD", default_value_t = DEFAULT_LOCK_PERIOD)]
    pub default_lock_period: u64,

    /// Milliseconds between blocks.
    #[arg(long, env = "WARDEN_BLOCK_TIME_MS", default_value_t = BLOCK_TIME_MS)]
    pub block_time_ms: u64,

    /// Log output format: "pretty", "compact", or "json".
    #[arg(long, env = "WARDEN_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Intent kinds accepted on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntentArg {
    Authenticate,
    Withdraw,
    CancelWithdrawal,
    SetLimits,
    ExecuteBatch,
}

impl From<IntentArg> for IntentKind {
    fn from(arg: IntentArg) -> Self {
        match arg {
            IntentArg::Authenticate => IntentKind::Authenticate,
            IntentArg::Withdraw => IntentKind::Withdraw,
            IntentArg::CancelWithdrawal => IntentKind::CancelWithdrawal,
            IntentArg::SetLimits => IntentKind::SetLimits,
            IntentArg::ExecuteBatch => IntentKind::ExecuteBatch,
        }
    }
}

/// Arguments for the `digest` subcommand.
#[derive(Parser, Debug)]
pub struct DigestArgs {
    /// What the signature authorizes.
    #[arg(long, value_enum)]
    pub kind: IntentArg,

    /// Wallet principal.
    #[arg(long)]
    pub wallet: String,

    /// Amount, threshold, or request id, depending on the kind.
    #[arg(long, default_value_t = 0)]
    pub amount: u64,

    #[arg(long)]
    pub recipient: Option<String>,

    /// Token contract, for token withdrawals.
    #[arg(long)]
    pub token: Option<String>,

    /// The wallet's replay nonce.
    #[arg(long, default_value_t = 0)]
    pub nonce: u64,

    /// Extra payload to commit to, as text (e.g. a batch's JSON or a lock
    /// period).
    #[arg(long)]
    pub payload: Option<String>,
}

/// Arguments for the `sign` subcommand.
#[derive(Parser, Debug)]
pub struct SignArgs {
    /// Hex-encoded 32-byte P-256 secret key.
    #[arg(long, env = "WARDEN_DEVICE_KEY")]
    pub secret_key: String,

    /// Hex-encoded 32-byte digest.
    #[arg(long)]
    pub digest: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        WardenNodeCli::command().debug_assert();
    }

    #[test]
    fn run_defaults_match_protocol_constants() {
        let cli = WardenNodeCli::parse_from(["warden-node", "run"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.rpc_port, DEFAULT_RPC_PORT);
        assert_eq!(args.default_threshold, 1_000_000);
        assert_eq!(args.default_lock_period, 144);
        assert_eq!(args.block_time_ms, BLOCK_TIME_MS);
    }

    #[test]
    fn digest_kind_parses_kebab_case() {
        let cli = WardenNodeCli::parse_from([
            "warden-node",
            "digest",
            "--kind",
            "cancel-withdrawal",
            "--wallet",
            "alice",
            "--amount",
            "3",
        ]);
        let Commands::Digest(args) = cli.command else {
            panic!("expected digest");
        };
        assert_eq!(IntentKind::from(args.kind), IntentKind::CancelWithdrawal);
    }
}
