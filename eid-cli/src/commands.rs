//! Subcommand implementations.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use eid_core::constants::PUBLIC_KEY_LENGTH;
use eid_core::crypto::{agree, generate_keypair, KeyPair};
use eid_core::encoding::{from_hex_array, to_hex};
use eid_core::identity::{derive_identity_key, IdentityKey};
use eid_core::token::{
    compute_token, encode_token, rotation_counter, rotation_period, time_until_next_rotation,
};
use serde::Serialize;

#[derive(Args, Debug)]
pub struct ScheduleArgs {
    /// Beacon epoch, seconds since the UNIX epoch
    #[arg(long)]
    pub epoch: u64,

    /// Rotation exponent; the period is 2^exponent seconds
    #[arg(long, default_value_t = 10)]
    pub exponent: u8,

    /// Time to evaluate at, seconds since the UNIX epoch (default: now)
    #[arg(long)]
    pub now: Option<u64>,
}

#[derive(Args, Debug)]
pub struct TokenArgs {
    /// Identity key, 64 hex characters
    #[arg(long)]
    pub identity_key: String,

    #[command(flatten)]
    pub schedule: ScheduleArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Side {
    Beacon,
    Server,
}

#[derive(Args, Debug)]
pub struct DeriveArgs {
    /// Own X25519 private key, 64 hex characters
    #[arg(long)]
    pub private_key: String,

    /// The other side's X25519 public key, 64 hex characters
    #[arg(long)]
    pub peer_public_key: String,

    /// Which side owns `--private-key`
    #[arg(long, value_enum, default_value_t = Side::Beacon)]
    pub side: Side,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Output {
    Token {
        token: String,
        token_hex: String,
        counter: u64,
        rotates_in: u64,
    },
    NextRotation {
        /// `None` once the period no longer fits in 64 bits.
        period: Option<u64>,
        rotates_in: u64,
    },
    Identity {
        beacon_public_key: String,
        server_public_key: String,
        identity_key: String,
    },
    Keypair {
        public_key: String,
        private_key: String,
    },
}

impl Output {
    pub fn render(&self, json: bool) -> Result<String> {
        if json {
            return Ok(serde_json::to_string_pretty(self)?);
        }
        Ok(match self {
            Output::Token {
                token,
                token_hex,
                counter,
                rotates_in,
            } => format!("{token}\ncounter:    {counter}\nhex:        {token_hex}\nrotates in: {rotates_in}s"),
            Output::NextRotation {
                period: Some(period),
                rotates_in,
            } => format!("{rotates_in}s (period {period}s)"),
            Output::NextRotation {
                period: None,
                rotates_in,
            } => format!("{rotates_in}s (period 2^64s or longer)"),
            Output::Identity { identity_key, .. } => identity_key.clone(),
            Output::Keypair {
                public_key,
                private_key,
            } => format!("public:  {public_key}\nprivate: {private_key}"),
        })
    }
}

fn now_or(now: Option<u64>) -> Result<u64> {
    match now {
        Some(now) => Ok(now),
        None => Ok(SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system clock is before the UNIX epoch")?
            .as_secs()),
    }
}

fn key_arg(name: &str, hex: &str) -> Result<[u8; PUBLIC_KEY_LENGTH]> {
    from_hex_array(hex).with_context(|| format!("--{name} must be 32 bytes of hex"))
}

pub fn token(args: &TokenArgs) -> Result<Output> {
    let key = IdentityKey::from_bytes(key_arg("identity-key", &args.identity_key)?);
    let ScheduleArgs {
        epoch,
        exponent,
        now,
    } = args.schedule;
    let now = now_or(now)?;

    let token = compute_token(&key, exponent, epoch, now)?;
    tracing::debug!(epoch, exponent, now, "token computed");
    Ok(Output::Token {
        token: encode_token(&token),
        token_hex: to_hex(&token),
        counter: rotation_counter(exponent, epoch, now)?,
        rotates_in: time_until_next_rotation(epoch, exponent, now)?,
    })
}

pub fn next_rotation(args: &ScheduleArgs) -> Result<Output> {
    let now = now_or(args.now)?;
    Ok(Output::NextRotation {
        period: rotation_period(args.exponent),
        rotates_in: time_until_next_rotation(args.epoch, args.exponent, now)?,
    })
}

pub fn derive_identity(args: &DeriveArgs) -> Result<Output> {
    let own = KeyPair::from_private_key(key_arg("private-key", &args.private_key)?);
    let peer = key_arg("peer-public-key", &args.peer_public_key)?;

    let secret = agree(&peer, &own.private_key)?;
    if secret.is_zero() {
        bail!("peer public key yields the all-zero shared secret");
    }
    let (server, beacon) = match args.side {
        Side::Beacon => (peer, own.public_key),
        Side::Server => (own.public_key, peer),
    };
    let identity = derive_identity_key(&secret, &server, &beacon)?;
    Ok(Output::Identity {
        beacon_public_key: to_hex(&beacon),
        server_public_key: to_hex(&server),
        identity_key: to_hex(identity.as_bytes()),
    })
}

pub fn keypair() -> Output {
    let pair = generate_keypair();
    Output::Keypair {
        public_key: to_hex(&pair.public_key),
        private_key: to_hex(&pair.private_key),
    }
}
