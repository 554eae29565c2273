use crate::paper::PendingUpdate;
use crate::progress::ItemOutcome;
use colored::Colorize;

/// Outcome of every item of one batch, in processing order
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub items: Vec<ItemReport>,
}

/// Report for a single batch item
#[derive(Debug, Clone, PartialEq)]
pub struct ItemReport {
    pub index: usize,
    pub label: String,
    pub outcome: ItemOutcome,
    pub detail: String,
}

impl BatchReport {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn add(&mut self, item: ItemReport) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Count items with the given outcome
    pub fn count(&self, outcome: ItemOutcome) -> usize {
        self.items.iter().filter(|i| i.outcome == outcome).count()
    }

    pub fn count_errors(&self) -> usize {
        self.count(ItemOutcome::Error)
    }

    pub fn outcomes(&self) -> Vec<ItemOutcome> {
        self.items.iter().map(|i| i.outcome).collect()
    }

    /// Print the report to stdout with colors
    pub fn print(&self, title: &str) {
        println!();
        println!("{}", title.bold());
        println!("{}", "=".repeat(50));
        println!();

        println!("Processed: {} items", self.len());
        println!(
            "  {} succeeded, {} duplicates, {} skipped, {} errors",
            self.count(ItemOutcome::Success).to_string().green(),
            self.count(ItemOutcome::Duplicate).to_string().yellow(),
            self.count(ItemOutcome::SkippedUnrecognized).to_string().dimmed(),
            self.count_errors().to_string().red()
        );
        println!();

        let sections = [
            (ItemOutcome::Error, "ERRORS"),
            (ItemOutcome::Duplicate, "DUPLICATES"),
            (ItemOutcome::SkippedUnrecognized, "SKIPPED"),
        ];
        for (outcome, heading) in sections {
            let items: Vec<_> = self.items.iter().filter(|i| i.outcome == outcome).collect();
            if items.is_empty() {
                continue;
            }
            let heading = format!("{} ({})", heading, items.len());
            let heading = match outcome {
                ItemOutcome::Error => heading.red().bold(),
                ItemOutcome::Duplicate => heading.yellow().bold(),
                _ => heading.dimmed().bold(),
            };
            println!("{}", heading);
            for item in items {
                print_item(item);
            }
            println!();
        }

        // Successes are listed briefly
        let ok: Vec<_> = self
            .items
            .iter()
            .filter(|i| i.outcome == ItemOutcome::Success)
            .collect();
        if !ok.is_empty() {
            println!("{}", format!("OK ({})", ok.len()).green().bold());
            for item in ok.iter().take(5) {
                print_item(item);
            }
            if ok.len() > 5 {
                println!(
                    "  {} {} more...",
                    "...".dimmed(),
                    (ok.len() - 5).to_string().dimmed()
                );
            }
            println!();
        }
    }
}

fn print_item(item: &ItemReport) {
    println!(
        "  {} {} {}",
        format!("[{}]", item.index + 1).dimmed(),
        truncate(&item.label, 60),
        item.detail.dimmed()
    );
}

/// Print the changes one pending update would make
pub fn print_update(update: &PendingUpdate) {
    println!(
        "{} {}",
        format!("[{}]", update.paper_id).dimmed(),
        update.title.bold()
    );
    for (field, value) in update.changes.iter() {
        println!(
            "       {:<9} {}",
            format!("{}:", field),
            truncate(&value.replace('\n', " "), 70).cyan()
        );
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(index: usize, outcome: ItemOutcome) -> ItemReport {
        ItemReport {
            index,
            label: format!("paper {}", index),
            outcome,
            detail: String::new(),
        }
    }

    #[test]
    fn test_counts_by_outcome() {
        let mut report = BatchReport::new();
        report.add(item(0, ItemOutcome::Success));
        report.add(item(1, ItemOutcome::Error));
        report.add(item(2, ItemOutcome::Duplicate));
        report.add(item(3, ItemOutcome::Duplicate));

        assert_eq!(report.len(), 4);
        assert_eq!(report.count(ItemOutcome::Duplicate), 2);
        assert_eq!(report.count_errors(), 1);
        assert_eq!(report.count(ItemOutcome::SkippedUnrecognized), 0);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("éééééééééé", 6), "ééé...");
    }
}
