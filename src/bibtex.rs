use biblatex::Bibliography;

/// Validate a provider's BibTeX, returning it trimmed when it holds at least one entry
pub fn normalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if !trimmed.starts_with('@') {
        return None;
    }
    match Bibliography::parse(trimmed) {
        Ok(bibliography) if bibliography.len() > 0 => Some(trimmed.to_string()),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("Discarding unparseable BibTeX: {}", e);
            None
        }
    }
}

/// Citation key of the first entry
pub fn citation_key(raw: &str) -> Option<String> {
    Bibliography::parse(raw)
        .ok()?
        .into_iter()
        .next()
        .map(|entry| entry.key)
}

/// Preprint citation for an arXiv paper, replaced once a venue's BibTeX is found
pub fn arxiv_misc(arxiv_id: &str, title: &str, authors: &[String], year: Option<&str>) -> String {
    let surname = authors
        .first()
        .and_then(|a| a.split_whitespace().last())
        .map(|s| s.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase())
        .unwrap_or_else(|| "anonymous".to_string());
    let first_word = title
        .split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase())
        .find(|w| w.len() > 3)
        .unwrap_or_default();
    let key = format!("{}{}{}", surname, year.unwrap_or(""), first_word);

    let mut lines = vec![
        format!("@misc{{{},", key),
        format!("    title = {{{}}},", title),
        format!("    author = {{{}}},", authors.join(" and ")),
    ];
    if let Some(year) = year {
        lines.push(format!("    year = {{{}}},", year));
    }
    lines.push(format!("    eprint = {{{}}},", arxiv_id));
    lines.push("    archivePrefix = {arXiv}".to_string());
    lines.push("}".to_string());
    lines.join("\n")
}
