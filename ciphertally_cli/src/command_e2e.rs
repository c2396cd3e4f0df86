use crate::config::Config;
use anyhow::{anyhow, bail};
use ciphertally::*;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::time::Duration;
use tracing::info;

const ORACLE_TIMEOUT: Duration = Duration::from_secs(30);

fn parse_votes(input: &str) -> anyhow::Result<Vec<bool>> {
    input
        .split(',')
        .map(|vote| match vote.trim().to_lowercase().as_str() {
            "yes" | "y" | "1" | "true" => Ok(true),
            "no" | "n" | "0" | "false" => Ok(false),
            other => Err(anyhow!("invalid vote {:?}, expected yes or no", other)),
        })
        .collect()
}

pub fn command_e2e(matches: &clap::ArgMatches, config: &Config) -> anyhow::Result<()> {
    let votes = parse_votes(matches.value_of("VOTES").unwrap_or_default())?;

    let seed: u64 = match matches.value_of("seed") {
        Some(seed) => seed.parse()?,
        None => rand::random(),
    };
    info!(seed, "running tally");
    let (ledger, batch_id, counts) = run_tally(config, &votes, seed)?;

    for notification in ledger.notifications() {
        println!("{}", serde_json::to_string(notification)?);
    }

    let vote_count = ledger.vote_count(batch_id).unwrap_or_default();
    if counts.total() != vote_count {
        bail!(
            "tally does not add up: {} yes + {} no != {} votes",
            counts.yes,
            counts.no,
            vote_count
        );
    }
    let expected_yes = votes.iter().filter(|v| **v).count() as u64;
    if counts.yes != expected_yes {
        bail!(
            "tally does not match the votes cast: {} yes, expected {}",
            counts.yes,
            expected_yes
        );
    }

    println!("> Tally verified OK");
    println!("  yes: {}", counts.yes);
    println!("  no:  {}", counts.no);

    if let Some(path) = matches.value_of("state-out") {
        let path = crate::expand(path);
        let bytes = if path.ends_with(".json") {
            ledger.to_json()?.into_bytes()
        } else {
            ledger.to_bytes()?
        };
        std::fs::write(&path, bytes)?;
        println!("> State written to {}", path);
    }

    Ok(())
}

/// Run one batch through a fresh ledger. Every key and ballot is drawn from `seed`.
fn run_tally(
    config: &Config,
    votes: &[bool],
    seed: u64,
) -> anyhow::Result<(LedgerState<ElGamalAlgebra>, BatchId, DecryptedCounts)> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);

    let (tally_secret, tally_public) = generate_tally_keypair(&mut rng);
    let mut oracle = LocalOracle::spawn(
        tally_secret,
        OracleSigner::from_rng(&mut rng),
        OracleConfig::default(),
    );

    let administrator = generate_principal_from(&mut rng);
    let admin = Call::new(administrator, 0);
    let mut ledger = LedgerState::new(config.ledger_config(), administrator, ElGamalAlgebra);

    let batch_id = ledger.open_batch(&admin)?;
    for vote in votes {
        let voter = generate_principal_from(&mut rng);
        ledger.add_provider(&admin, voter)?;
        let ballot = tally_public.encrypt_bool(*vote, &mut rng);
        ledger.submit_vote(&Call::new(voter, 0), &ballot)?;
    }
    ledger.close_batch(&admin)?;

    ledger.request_decryption(&admin, &mut oracle, batch_id)?;
    let response = oracle
        .next_response(ORACLE_TIMEOUT)
        .ok_or_else(|| anyhow!("decryption oracle did not respond"))?;
    let counts = ledger.complete_response(&oracle.verifier(), &response)?;

    Ok((ledger, batch_id, counts))
}
