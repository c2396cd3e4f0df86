use anyhow::Context;
use ciphertally::{ElGamalAlgebra, LedgerState};

pub fn command_inspect(matches: &clap::ArgMatches) -> anyhow::Result<()> {
    let filename = crate::expand(matches.value_of("INPUT").unwrap_or_default());
    let bytes =
        std::fs::read(&filename).with_context(|| format!("unable to read {}", filename))?;
    let ledger = LedgerState::<ElGamalAlgebra>::from_bytes(&bytes)
        .with_context(|| format!("unable to load ledger state from {}", filename))?;

    if matches.is_present("json") {
        println!("{}", ledger.to_json()?);
        return Ok(());
    }

    println!("system-id:     {}", ledger.system_id());
    println!("administrator: {}", ledger.administrator());
    println!("paused:        {}", ledger.is_paused());
    println!("cooldown:      {}s", ledger.cooldown_seconds());

    println!("Batches:");
    for batch in ledger.batches() {
        let state = if batch.is_open() { "open" } else { "closed" };
        println!(
            "  {}: {} votes ({})",
            batch.id(),
            batch.vote_count(),
            state
        );
        for counts in ledger.results_for_batch(batch.id()) {
            println!("    result: {} yes, {} no", counts.yes, counts.no);
        }
    }

    let pending: Vec<_> = ledger.pending_requests().collect();
    if !pending.is_empty() {
        println!("Pending decryption requests:");
        for request in pending {
            println!(
                "  {} for batch {} (state {})",
                request.request_id, request.batch_id, request.state_hash
            );
        }
    }

    Ok(())
}
