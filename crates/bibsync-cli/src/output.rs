use std::io::Write;

use bibsync_core::{CompareOutcome, Notice, ProgressEvent, PublicationRecord, ReconcileStats};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print a real-time progress event.
pub fn print_progress(
    w: &mut dyn Write,
    event: &ProgressEvent,
    color: ColorMode,
) -> std::io::Result<()> {
    match event {
        ProgressEvent::FetchStarted { source } => {
            writeln!(w, "Querying {}...", source)?;
        }
        ProgressEvent::FetchComplete {
            source,
            count,
            elapsed,
        } => {
            let line = format!(
                "{} -> {} publications ({:.1}s)",
                source,
                count,
                elapsed.as_secs_f64()
            );
            if color.enabled() {
                writeln!(w, "{}", line.green())?;
            } else {
                writeln!(w, "{}", line)?;
            }
        }
        ProgressEvent::SourceFailed { source, error } => {
            if color.enabled() {
                writeln!(w, "{} {} failed: {}", "WARNING:".yellow(), source, error)?;
            } else {
                writeln!(w, "WARNING: {} failed: {}", source, error)?;
            }
        }
        ProgressEvent::Deduplicated { raw, unique } => {
            writeln!(w, "{} crawled publications, {} unique by title", raw, unique)?;
        }
        ProgressEvent::YearFilter { years, kept } => {
            writeln!(w, "{} crawled publications in {}", kept, years.join(", "))?;
        }
        ProgressEvent::LocalSelected { count } => {
            writeln!(w, "{} local publications selected", count)?;
        }
        ProgressEvent::Reconciling { .. } => {
            // Not displayed in CLI output
        }
        ProgressEvent::Exported { path } => {
            if color.enabled() {
                writeln!(w, "{}", format!("Saved {}", path.display()).dimmed())?;
            } else {
                writeln!(w, "Saved {}", path.display())?;
            }
        }
    }
    Ok(())
}

/// One record as a short numbered block.
pub fn print_record(
    w: &mut dyn Write,
    index: usize,
    record: &PublicationRecord,
    color: ColorMode,
) -> std::io::Result<()> {
    let title = if record.title.is_empty() {
        "(untitled)"
    } else {
        record.title.as_str()
    };
    if color.enabled() {
        writeln!(w, "{} {}", format!("[{}]", index + 1).bold().yellow(), title.cyan())?;
    } else {
        writeln!(w, "[{}] {}", index + 1, title)?;
    }
    if !record.author.is_empty() {
        writeln!(w, "    Authors: {}", record.author)?;
    }
    writeln!(w, "    Year:    {}", record.year_or_unknown())?;
    if !record.container_title.is_empty() {
        writeln!(w, "    Venue:   {}", record.container_title)?;
    }
    if !record.doi.is_empty() {
        writeln!(w, "    DOI:     {}", record.doi)?;
    }
    Ok(())
}

fn print_heading(w: &mut dyn Write, heading: &str, color: ColorMode) -> std::io::Result<()> {
    writeln!(w)?;
    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", heading.bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{}", sep)?;
        writeln!(w, "{}", heading)?;
        writeln!(w, "{}", sep)?;
    }
    writeln!(w)?;
    Ok(())
}

/// Print a titled list of records, or a placeholder line when it is empty.
pub fn print_record_list(
    w: &mut dyn Write,
    heading: &str,
    records: &[PublicationRecord],
    color: ColorMode,
) -> std::io::Result<()> {
    print_heading(w, &format!("{} ({})", heading, records.len()), color)?;
    if records.is_empty() {
        if color.enabled() {
            writeln!(w, "{}", "(none)".dimmed())?;
        } else {
            writeln!(w, "(none)")?;
        }
        return Ok(());
    }
    for (i, record) in records.iter().enumerate() {
        print_record(w, i, record, color)?;
    }
    Ok(())
}

pub fn print_notices(w: &mut dyn Write, notices: &[Notice], color: ColorMode) -> std::io::Result<()> {
    for notice in notices {
        if color.enabled() {
            writeln!(w, "{} {}", "NOTE:".cyan(), notice)?;
        } else {
            writeln!(w, "NOTE: {}", notice)?;
        }
    }
    Ok(())
}

/// Print the final summary box.
pub fn print_summary(
    w: &mut dyn Write,
    stats: &ReconcileStats,
    failed_sources: &[String],
    color: ColorMode,
) -> std::io::Result<()> {
    print_heading(w, "SUMMARY", color)?;
    writeln!(w, "  Local publications:    {}", stats.local_total)?;
    writeln!(w, "  Crawled publications:  {}", stats.crawled_total)?;
    if color.enabled() {
        writeln!(w, "  In both:               {}", stats.common.to_string().green())?;
        writeln!(w, "  Missing locally:       {}", stats.missing.to_string().red())?;
        writeln!(w, "  Only in local file:    {}", stats.extra.to_string().yellow())?;
    } else {
        writeln!(w, "  In both:               {}", stats.common)?;
        writeln!(w, "  Missing locally:       {}", stats.missing)?;
        writeln!(w, "  Only in local file:    {}", stats.extra)?;
    }
    if !failed_sources.is_empty() {
        let line = format!("  Sources that failed:   {}", failed_sources.join(", "));
        if color.enabled() {
            writeln!(w, "{}", line.yellow())?;
        } else {
            writeln!(w, "{}", line)?;
        }
    }
    writeln!(w)?;
    Ok(())
}

/// Print the whole comparison report.
pub fn print_report(
    w: &mut dyn Write,
    outcome: &CompareOutcome,
    color: ColorMode,
) -> std::io::Result<()> {
    let failed: Vec<String> = outcome
        .fetch
        .failures
        .iter()
        .map(|f| format!("{} ({})", f.source, f.error))
        .collect();

    let Some(rec) = &outcome.reconciliation else {
        writeln!(w)?;
        print_notices(w, &outcome.notices, color)?;
        if !failed.is_empty() {
            writeln!(w, "Sources that failed: {}", failed.join(", "))?;
        }
        return Ok(());
    };

    print_record_list(w, "MISSING FROM LOCAL BIBLIOGRAPHY", &rec.missing, color)?;
    print_record_list(w, "NOT FOUND IN ANY SOURCE", &rec.extra, color)?;
    writeln!(w)?;
    print_notices(w, &outcome.notices, color)?;
    print_summary(w, &rec.stats, &failed, color)
}
