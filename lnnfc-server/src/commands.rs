//! lnnfc-server/src/commands.rs
//!
//! One function per subcommand. Each prints its result and returns an error
//! for a non-zero exit.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info};

use lnnfc_common::models::claim::MSAT_PER_SAT;
use lnnfc_common::traits::ClaimService;
use lnnfc_core::codec::lnurl;
use lnnfc_core::eventbus::LoggingObserver;
use lnnfc_core::services::{LoadTagRequest, LoadedTag, PaymentProcessor};

use crate::context::AppContext;
use crate::{DaemonArgs, LoadTagArgs};

/// Chooses between JSON and human-readable output.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", human());
        }
        Ok(())
    }
}

fn secs(value: f64, flag: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("{flag} must be a non-negative number of seconds"))
}

fn sats(msat: u64) -> u64 {
    msat / MSAT_PER_SAT
}

pub async fn load_tag(ctx: &AppContext, out: Output, args: LoadTagArgs) -> Result<()> {
    ctx.config.check_admin_pin(args.pin.as_deref())?;

    let amount_msat = args
        .amount
        .checked_mul(MSAT_PER_SAT)
        .context("amount is too large")?;
    let request = LoadTagRequest {
        timeout: secs(args.timeout, "--timeout")?,
        use_alt_encoding: ctx.config.use_bech32 && !args.plain,
        ..LoadTagRequest::new(
            amount_msat,
            args.uses.unwrap_or(ctx.config.default_tag_uses),
            args.title.unwrap_or_else(|| ctx.config.default_tag_title.clone()),
        )
    };

    println!("Place an NFC tag on the reader...");
    let loaded = match ctx.tag_loader().load_tag(&request).await {
        Ok(loaded) => loaded,
        Err(e) => {
            if let Some(id) = e.stale_claim_id() {
                error!("Withdraw link {id} may still exist on LNbits; delete it manually");
            }
            return Err(e.into());
        }
    };

    out.emit(&loaded, || loaded_summary(&loaded))
}

/// The LNURL is printed whole; it is the operator's only copy.
fn loaded_summary(loaded: &LoadedTag) -> String {
    format!(
        "Tag loaded\n  tag:    {}\n  link:   {}\n  amount: {} sats x {} use(s)\n  title:  {}\n  lnurl:  {}",
        loaded.tag_id,
        loaded.claim_id,
        sats(loaded.amount_msat),
        loaded.uses,
        loaded.title,
        loaded.redemption_reference,
    )
}

pub async fn read_tag(ctx: &AppContext, out: Output, timeout: f64) -> Result<()> {
    println!("Place an NFC tag on the reader...");
    let readout = ctx.tag_loader().read_tag(secs(timeout, "--timeout")?).await?;
    out.emit(&readout, || match (&readout.redemption_reference, &readout.url) {
        (Some(reference), Some(url)) => format!(
            "Tag {}\n  lnurl:     {}\n  url:       {}\n  encoding:  {}\n  valid:     {}",
            readout.tag_id,
            reference,
            lnurl::format_for_display(url, 80),
            readout.encoding.map_or_else(|| "-".to_string(), |e| format!("{e:?}")),
            readout.is_valid,
        ),
        _ => format!("Tag {} holds no LNURL", readout.tag_id),
    })
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

pub async fn clear_tag(ctx: &AppContext, out: Output, timeout: f64, yes: bool, pin: Option<String>) -> Result<()> {
    ctx.config.check_admin_pin(pin.as_deref())?;
    if !yes && !confirm("Erase the tag on the reader? The withdraw link is not deleted.")? {
        println!("Aborted");
        return Ok(());
    }

    println!("Place an NFC tag on the reader...");
    let cleared = ctx.tag_loader().clear_tag(secs(timeout, "--timeout")?).await?;
    out.emit(&cleared, || format!("Tag {} cleared", cleared.tag_id))
}

#[derive(Serialize)]
struct StatusReport {
    lnbits_url: String,
    wallet: String,
    balance_sat: u64,
    transport: String,
    reader_connected: bool,
}

pub async fn status(ctx: &AppContext, out: Output) -> Result<()> {
    let wallet = ctx
        .lnbits
        .get_wallet_info()
        .await
        .context("LNbits is not reachable")?;
    let report = StatusReport {
        lnbits_url: ctx.lnbits.base_url().to_string(),
        wallet: wallet.name,
        balance_sat: sats(wallet.balance_msat),
        transport: ctx.config.nfc_transport.clone(),
        reader_connected: true,
    };
    out.emit(&report, || {
        format!(
            "LNbits:  {} (wallet '{}', {} sats)\nReader:  {} (connected)",
            report.lnbits_url, report.wallet, report.balance_sat, report.transport
        )
    })
}

pub async fn list(ctx: &AppContext, out: Output, limit: usize) -> Result<()> {
    let links = ctx.lnbits.list_claims(limit).await?;
    out.emit(&links, || {
        if links.is_empty() {
            return "No withdraw links".to_string();
        }
        links
            .iter()
            .map(|l| {
                format!(
                    "{:<24} {:>10} sats  {}/{} used  {}",
                    l.id,
                    sats(l.amount_msat),
                    l.used_count,
                    l.max_uses,
                    l.title
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

pub async fn info(ctx: &AppContext, out: Output, timeout: f64) -> Result<()> {
    println!("Place an NFC tag on the reader...");
    let info = ctx.tag_loader().tag_info(secs(timeout, "--timeout")?).await?;
    out.emit(&info, || {
        let mut text = format!(
            "Tag {} ({}-byte UID)\n  image:   {} bytes, {} record(s) [{}]",
            info.tag_id,
            info.uid_length,
            info.message.size,
            info.message.records,
            info.message.record_types.join(", "),
        );
        if let Some(err) = &info.message.error {
            text.push_str(&format!("\n  error:   {err}"));
        }
        if let Some(claim) = &info.claim {
            text.push_str(&format!(
                "\n  lnurl:   {} ({:?}, valid: {})",
                lnurl::format_for_display(&claim.url, 60),
                claim.encoding,
                info.is_valid
            ));
        }
        text
    })
}

pub async fn verify(ctx: &AppContext, out: Output, claim_id: &str, timeout: f64) -> Result<()> {
    println!("Place an NFC tag on the reader...");
    let report = ctx
        .tag_loader()
        .verify_tag(claim_id, secs(timeout, "--timeout")?)
        .await?;
    out.emit(&report, || {
        format!(
            "Tag {} {} link {}",
            report.tag_id,
            if report.verified { "matches" } else { "does NOT match" },
            report.claim_id
        )
    })?;
    if !report.verified {
        bail!(
            "tag holds {} instead of {}",
            report.found.as_deref().unwrap_or("nothing"),
            report.expected
        );
    }
    Ok(())
}

pub async fn daemon(ctx: &AppContext, out: Output, args: DaemonArgs) -> Result<()> {
    let mut config = ctx.config.processor_config();
    if let Some(p) = args.poll_interval {
        config.poll_interval = secs(p, "--poll-interval")?;
    }
    if let Some(c) = args.cooldown {
        config.cooldown = secs(c, "--cooldown")?;
    }

    let mut processor = PaymentProcessor::new(ctx.transport.clone(), Arc::new(LoggingObserver), config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            return;
        }
        info!("Ctrl-C detected; stopping payment processor...");
        let _ = shutdown_tx.send(true);
    });

    println!("Payment processor running; press Ctrl-C to stop");
    processor.run(shutdown_rx).await?;

    let stats = processor.stats();
    out.emit(&stats, || {
        format!(
            "Stopped after {} cycle(s): {} processed, {} suppressed, {} failed, {} reader fault(s)",
            stats.cycles, stats.processed, stats.suppressed, stats.failures, stats.faults
        )
    })
}
