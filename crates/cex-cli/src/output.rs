use std::io::Write;

use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Totals over one `extract` run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub documents: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub entries: usize,
    pub overwritten: usize,
    pub sections_skipped: usize,
    pub superscript_documents: usize,
    pub unsupported: usize,
}

/// Print what input resolution found before extraction starts.
pub fn print_input_report(
    w: &mut dyn Write,
    documents: usize,
    unsupported: &[String],
    warnings: &[String],
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w, "Found {} TEI documents", documents)?;
    if !unsupported.is_empty() {
        let msg = format!("(Ignored {} unsupported inputs)", unsupported.len());
        if color.enabled() {
            writeln!(w, "{}", msg.dimmed())?;
        } else {
            writeln!(w, "{}", msg)?;
        }
    }
    for warning in warnings {
        if color.enabled() {
            writeln!(w, "{} {}", "WARNING:".yellow(), warning)?;
        } else {
            writeln!(w, "WARNING: {}", warning)?;
        }
    }
    writeln!(w)?;
    Ok(())
}

/// Print one line per failed document.
pub fn print_failures(
    w: &mut dyn Write,
    failures: &[(String, String)],
    color: ColorMode,
) -> std::io::Result<()> {
    if failures.is_empty() {
        return Ok(());
    }
    if color.enabled() {
        writeln!(w, "{}", "Failed documents:".red().bold())?;
    } else {
        writeln!(w, "Failed documents:")?;
    }
    for (name, error) in failures {
        writeln!(w, "  {}: {}", name, truncate(error, 160))?;
    }
    writeln!(w)?;
    Ok(())
}

pub fn print_summary(w: &mut dyn Write, summary: &RunSummary, color: ColorMode) -> std::io::Result<()> {
    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", "SUMMARY".bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{}", sep)?;
        writeln!(w, "SUMMARY")?;
        writeln!(w, "{}", sep)?;
    }

    writeln!(w, "  Documents processed: {}", summary.documents)?;
    if color.enabled() {
        writeln!(w, "  {} {}", "Succeeded:".green(), summary.succeeded)?;
    } else {
        writeln!(w, "  Succeeded: {}", summary.succeeded)?;
    }
    if summary.failed > 0 {
        if color.enabled() {
            writeln!(w, "  {} {}", "Failed:".red(), summary.failed)?;
        } else {
            writeln!(w, "  Failed: {}", summary.failed)?;
        }
    }
    writeln!(w, "  Citation contexts written: {}", summary.entries)?;
    if summary.superscript_documents > 0 {
        writeln!(w, "  Superscript-style documents: {}", summary.superscript_documents)?;
    }

    let notes = [
        (summary.overwritten, "Entries overwritten by a later sentence"),
        (summary.sections_skipped, "Sections skipped after segmentation errors"),
        (summary.unsupported, "Unsupported inputs ignored"),
    ];
    for (count, label) in notes {
        if count == 0 {
            continue;
        }
        let msg = format!("{}: {}", label, count);
        if color.enabled() {
            writeln!(w, "  {}", msg.dimmed())?;
        } else {
            writeln!(w, "  {}", msg)?;
        }
    }

    writeln!(w)?;
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}
