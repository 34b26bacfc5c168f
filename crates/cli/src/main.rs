use std::fs;

use anyhow::Context;
use clap::Parser;

use splitter_cli::{Args, Step, run};
use splitter_infra::LedgerConfig;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    splitter_observability::init();

    let config = LedgerConfig::from_env().context("loading ledger configuration")?;

    let script = args.script.display();
    let raw = fs::read_to_string(&args.script).with_context(|| format!("reading script {script}"))?;
    let steps: Vec<Step> =
        serde_json::from_str(&raw).with_context(|| format!("parsing script {script}"))?;

    tracing::info!(steps = steps.len(), ?config, "running script");
    let report = run(&steps, config);

    if let (Some(path), Some(journal)) = (&args.journal_out, report.journal.as_ref()) {
        let json = serde_json::to_string_pretty(journal).context("serializing journal")?;
        fs::write(path, json).with_context(|| format!("writing journal {}", path.display()))?;
        tracing::info!(path = %path.display(), entries = journal.len(), "journal exported");
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serializing report")?
    );
    Ok(())
}
