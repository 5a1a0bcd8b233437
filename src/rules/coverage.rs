use super::{sample_up_to, Proposal, RuleContext, SelectionRule};
use crate::columns::Field;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use std::collections::HashSet;
use tracing::debug;

/// Oversampling policy: the `top_categories` most frequent values (by distinct
/// declaration count) each contribute `per_category` draws instead of one.
#[derive(Debug, Clone, Copy)]
pub struct Oversample {
    pub top_categories: usize,
    pub per_category: usize,
}

/// Stratified-coverage rule: every distinct value of a categorical field ends
/// up represented in the sample.
///
/// Plain mode adds one uniformly random declaration for each value that has no
/// selected representative yet (first touch across rules wins). Oversampled
/// mode always draws, with extra draws for the most frequent categories.
pub struct CoverageRule {
    field: Field,
    label: &'static str,
    oversample: Option<Oversample>,
}

impl CoverageRule {
    pub fn plain(field: Field, label: &'static str) -> Self {
        CoverageRule {
            field,
            label,
            oversample: None,
        }
    }

    pub fn oversampled(field: Field, label: &'static str, oversample: Oversample) -> Self {
        CoverageRule {
            field,
            label,
            oversample: Some(oversample),
        }
    }
}

impl SelectionRule for CoverageRule {
    fn name(&self) -> &'static str {
        self.label
    }

    fn propose(&self, ctx: &RuleContext<'_>, rng: &mut StdRng) -> Vec<Proposal> {
        let Some(col) = ctx.columns.get(self.field) else {
            debug!(rule = self.label, "column not found, skipping");
            return Vec::new();
        };
        let values = ctx.table.distinct_values(col);
        let mut proposals = Vec::new();
        // Declarations picked earlier in this same pass also count as
        // representatives for later categories.
        let mut newly: HashSet<String> = HashSet::new();

        match self.oversample {
            Some(os) => {
                let mut counts: Vec<(&String, usize)> = values
                    .iter()
                    .map(|v| {
                        let n = ctx
                            .table
                            .declarations_with_value(ctx.id_column, col, v)
                            .len();
                        (v, n)
                    })
                    .collect();
                counts.sort_by(|a, b| b.1.cmp(&a.1));
                let top: HashSet<&String> = counts
                    .iter()
                    .take(os.top_categories)
                    .map(|(v, _)| *v)
                    .collect();

                for value in &values {
                    let ids = ctx.table.declarations_with_value(ctx.id_column, col, value);
                    let (count, reason) = if top.contains(value) {
                        (
                            os.per_category,
                            format!("{}: {} - most frequent category sample", self.label, value),
                        )
                    } else {
                        (
                            1,
                            format!(
                                "{}: {} - at least one declaration per category",
                                self.label, value
                            ),
                        )
                    };
                    for id in sample_up_to(&ids, count, rng) {
                        newly.insert(id.clone());
                        proposals.push(Proposal::new(id, reason.clone()));
                    }
                }
            }
            None => {
                for value in &values {
                    let ids = ctx.table.declarations_with_value(ctx.id_column, col, value);
                    let represented = ids
                        .iter()
                        .any(|id| ctx.selected.contains(id) || newly.contains(id));
                    if represented || ids.is_empty() {
                        continue;
                    }
                    if let Some(id) = ids.choose(rng) {
                        newly.insert(id.clone());
                        proposals.push(Proposal::new(
                            id.clone(),
                            format!(
                                "{}: {} - at least one declaration per category",
                                self.label, value
                            ),
                        ));
                    }
                }
            }
        }
        proposals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::ColumnMap;
    use crate::selection::Selection;
    use crate::table::test_table;
    use rand::SeedableRng;

    fn ctx<'a>(
        table: &'a crate::table::DeclarationTable,
        columns: &'a ColumnMap,
        selected: &'a Selection,
    ) -> RuleContext<'a> {
        RuleContext {
            table,
            columns,
            selected,
            id_column: "Beyanname_no",
        }
    }

    #[test]
    fn plain_coverage_hits_every_unrepresented_value() {
        let t = test_table(
            &["Beyanname_no", "Gonderen"],
            &[
                &["B1", "ACME"],
                &["B2", "ACME"],
                &["B3", "GLOBEX"],
                &["B4", "INITECH"],
            ],
        );
        let cols = ColumnMap::resolve(&t.headers);
        let mut selected = Selection::new();
        selected.add("B2", "earlier rule"); // ACME already represented
        let rule = CoverageRule::plain(Field::Sender, "Sender");
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let proposals = rule.propose(&ctx(&t, &cols, &selected), &mut rng);
        let picked: Vec<&str> = proposals.iter().map(|p| p.declaration.as_str()).collect();
        assert_eq!(picked, vec!["B3", "B4"]);
        assert!(proposals[0].reason.starts_with("Sender: GLOBEX"));
    }

    #[test]
    fn missing_column_proposes_nothing() {
        let t = test_table(&["Beyanname_no"], &[&["B1"]]);
        let cols = ColumnMap::resolve(&t.headers);
        let selected = Selection::new();
        let rule = CoverageRule::plain(Field::Sender, "Sender");
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        assert!(rule.propose(&ctx(&t, &cols, &selected), &mut rng).is_empty());
    }

    #[test]
    fn oversample_draws_extra_from_most_frequent_category() {
        let rows: Vec<Vec<String>> = (0..6)
            .map(|i| vec![format!("B{i}"), "CIF".to_string()])
            .chain([vec!["B9".to_string(), "FOB".to_string()]])
            .collect();
        let row_refs: Vec<Vec<&str>> = rows
            .iter()
            .map(|r| r.iter().map(String::as_str).collect())
            .collect();
        let refs: Vec<&[&str]> = row_refs.iter().map(Vec::as_slice).collect();
        let t = test_table(&["Beyanname_no", "Teslim_sekli"], &refs);
        let cols = ColumnMap::resolve(&t.headers);
        let selected = Selection::new();
        let rule = CoverageRule::oversampled(
            Field::DeliveryType,
            "Delivery type",
            Oversample {
                top_categories: 1,
                per_category: 3,
            },
        );
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let proposals = rule.propose(&ctx(&t, &cols, &selected), &mut rng);
        let cif = proposals
            .iter()
            .filter(|p| p.reason.contains("most frequent"))
            .count();
        let fob = proposals
            .iter()
            .filter(|p| p.declaration == "B9")
            .count();
        assert_eq!(cif, 3);
        assert_eq!(fob, 1);
    }
}
