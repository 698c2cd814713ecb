use colored::Colorize;

use crate::models::{Discrepancy, Origin, UpdateRecord};

/// Print the shell plan to stdout, one command per line
pub fn print_plan(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

/// Print the number of stale manifest lists
pub fn print_summary(updates: usize) {
    let count = if updates == 0 {
        updates.to_string().green().bold()
    } else {
        updates.to_string().yellow().bold()
    };
    eprintln!(
        "{} {} manifest {} need an update",
        "SUMMARY:".bold(),
        count,
        if updates == 1 { "list" } else { "lists" }
    );
}

/// Explain, per stale manifest list, which digests do not balance
pub fn print_discrepancies(updates: &[UpdateRecord]) {
    for update in updates {
        eprintln!("\n{}", update.repo_tag.to_string().bold());
        eprintln!("{}", "─".repeat(60));
        for discrepancy in &update.discrepancies {
            eprintln!("  {}", describe(discrepancy));
        }
    }
}

fn describe(d: &Discrepancy) -> String {
    let digest = truncate_digest(d.digest.as_str());
    match (&d.last_origin, d.count) {
        (Origin::Arch(arch), n) if n > 0 => format!(
            "[{}] {} built by {} but not declared (x{})",
            "MISSING".yellow().bold(),
            digest.dimmed(),
            arch,
            n
        ),
        (Origin::TopLevel, n) if n < 0 => format!(
            "[{}] {} declared by top-level list but not built (x{})",
            "  STALE".red().bold(),
            digest.dimmed(),
            -n
        ),
        (_, n) if n > 0 => format!(
            "[{}] {} built {} more time(s) than declared",
            "MISSING".yellow().bold(),
            digest.dimmed(),
            n
        ),
        (_, n) => format!(
            "[{}] {} declared {} more time(s) than built",
            "  STALE".red().bold(),
            digest.dimmed(),
            -n
        ),
    }
}

fn truncate_digest(digest: &str) -> &str {
    if digest.len() > 19 {
        &digest[..19]
    } else {
        digest
    }
}
