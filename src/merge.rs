use crate::paper::{is_blank, Field, FieldValues, MergePolicy, Paper, PendingUpdate};

/// Whether `candidate` may take the place of `current` for this field
pub fn admits(field: Field, current: Option<&str>, candidate: &str) -> bool {
    if candidate.trim().is_empty() {
        return false;
    }
    match field.policy() {
        MergePolicy::FillMissing => is_blank(current),
        MergePolicy::Overwrite => true,
    }
}

/// Fold one provider's answer into the values staged so far for `paper`.
///
/// For fill-missing fields the paper's own value and anything staged by an
/// earlier provider both count as present, so the first provider wins.
/// Overwrite fields take the latest provider's value.
pub fn stage(paper: &Paper, staged: &mut FieldValues, found: &FieldValues) {
    for (field, value) in found.iter() {
        let current = staged.get(field).or_else(|| paper.field(field));
        if admits(field, current, value) {
            staged.set(field, value.to_string());
        }
    }
}

/// Keep only the staged values that would actually change the paper
pub fn changes(paper: &Paper, staged: &FieldValues) -> FieldValues {
    let mut out = FieldValues::default();
    for (field, value) in staged.iter() {
        if admits(field, paper.field(field), value) && paper.field(field) != Some(value) {
            out.set(field, value.to_string());
        }
    }
    out
}

/// Build the pending update for a paper, or `None` when nothing would change
pub fn pending_update(paper: &Paper, staged: &FieldValues) -> Option<PendingUpdate> {
    let changes = changes(paper, staged);
    if changes.is_empty() {
        return None;
    }
    Some(PendingUpdate {
        paper_id: paper.id.clone(),
        title: paper.title.clone(),
        changes,
    })
}

/// Write admitted values into the paper, returning the fields that changed
pub fn apply(paper: &mut Paper, values: &FieldValues) -> Vec<Field> {
    let mut changed = Vec::new();
    for (field, value) in values.iter() {
        if admits(field, paper.field(field), value) && paper.field(field) != Some(value) {
            paper.set_field(field, value.to_string());
            changed.push(field);
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(venue: Option<&str>, bibtex: Option<&str>, code: Option<&str>) -> FieldValues {
        FieldValues {
            venue: venue.map(String::from),
            bibtex: bibtex.map(String::from),
            note: None,
            code_link: code.map(String::from),
        }
    }

    #[test]
    fn test_existing_venue_is_never_replaced() {
        let mut paper = Paper::new("Arxiv-1", "X");
        paper.venue = Some("ICLR 2019".to_string());

        let mut staged = FieldValues::default();
        stage(&paper, &mut staged, &values(Some("NeurIPS 2019"), None, None));

        assert!(pending_update(&paper, &staged).is_none());
        assert!(apply(&mut paper, &staged).is_empty());
        assert_eq!(paper.venue.as_deref(), Some("ICLR 2019"));
    }

    #[test]
    fn test_bibtex_last_provider_wins() {
        let mut paper = Paper::new("Arxiv-1", "X");
        paper.bibtex = Some("@misc{old}".to_string());

        let mut staged = FieldValues::default();
        stage(&paper, &mut staged, &values(None, Some("@article{first}"), None));
        stage(&paper, &mut staged, &values(None, Some("@inproceedings{second}"), None));

        let update = pending_update(&paper, &staged).unwrap();
        assert_eq!(update.changes.bibtex.as_deref(), Some("@inproceedings{second}"));
    }

    #[test]
    fn test_first_provider_wins_for_fill_missing() {
        let paper = Paper::new("Arxiv-1", "X");
        let mut staged = FieldValues::default();
        stage(&paper, &mut staged, &values(None, None, Some("https://github.com/a/b")));
        stage(&paper, &mut staged, &values(None, None, Some("https://github.com/c/d")));

        assert_eq!(staged.code_link.as_deref(), Some("https://github.com/a/b"));
    }

    #[test]
    fn test_note_fills_only_when_empty() {
        let mut paper = Paper::new("Arxiv-1", "X");
        paper.note = Some("read later".to_string());

        let found = FieldValues {
            note: Some("Accepted @ ICML 2021".to_string()),
            ..Default::default()
        };
        assert!(apply(&mut paper, &found).is_empty());

        paper.note = Some("   ".to_string());
        assert_eq!(apply(&mut paper, &found), vec![Field::Note]);
        assert_eq!(paper.note.as_deref(), Some("Accepted @ ICML 2021"));
    }

    #[test]
    fn test_identical_bibtex_is_not_a_change() {
        let mut paper = Paper::new("Arxiv-1", "X");
        paper.bibtex = Some("@misc{same}".to_string());

        let staged = values(None, Some("@misc{same}"), None);
        assert!(pending_update(&paper, &staged).is_none());
    }
}
