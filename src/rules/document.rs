use super::{sample_up_to, Proposal, RuleContext, SelectionRule};
use crate::columns::Field;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Origin-proof document selection: for each listed document code, one random
/// declaration carrying it; if no code matched individually, one declaration
/// from the pooled matches.
pub struct OriginProofRule {
    pub codes: &'static [&'static str],
}

fn declarations_with_code(ctx: &RuleContext<'_>, code: &str) -> Vec<String> {
    ctx.table.declarations_where(ctx.id_column, |r| {
        ctx.columns
            .document_code_columns
            .iter()
            .any(|c| r.get(c).map(|v| v.trim() == code).unwrap_or(false))
    })
}

impl SelectionRule for OriginProofRule {
    fn name(&self) -> &'static str {
        "origin-proof-document"
    }

    fn propose(&self, ctx: &RuleContext<'_>, rng: &mut StdRng) -> Vec<Proposal> {
        if ctx.columns.document_code_columns.is_empty() {
            debug!("no document code columns, skipping");
            return Vec::new();
        }
        let mut proposals = Vec::new();
        let mut pooled: Vec<String> = Vec::new();
        for code in self.codes {
            let ids = declarations_with_code(ctx, code);
            if let Some(id) = ids.choose(rng) {
                proposals.push(Proposal::new(
                    id.clone(),
                    format!("Origin-proof document (code {code})"),
                ));
            }
            pooled.extend(ids);
        }
        if proposals.is_empty() {
            if let Some(id) = pooled.choose(rng) {
                proposals.push(Proposal::new(id.clone(), "Origin-proof document"));
            }
        }
        proposals
    }
}

/// Pooled document-code selection: up to `limit` random declarations carrying
/// any of the listed codes.
pub struct PooledDocumentCodeRule {
    pub name: &'static str,
    pub codes: &'static [&'static str],
    pub limit: usize,
    pub reason: &'static str,
}

impl SelectionRule for PooledDocumentCodeRule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn propose(&self, ctx: &RuleContext<'_>, rng: &mut StdRng) -> Vec<Proposal> {
        if ctx.columns.document_code_columns.is_empty() {
            debug!(rule = self.name, "no document code columns, skipping");
            return Vec::new();
        }
        let ids = ctx.table.declarations_where(ctx.id_column, |r| {
            ctx.columns.document_code_columns.iter().any(|c| {
                r.get(c)
                    .map(|v| self.codes.contains(&v.trim()))
                    .unwrap_or(false)
            })
        });
        sample_up_to(&ids, self.limit, rng)
            .into_iter()
            .map(|id| Proposal::new(id, self.reason))
            .collect()
    }
}

/// Co-occurrence selection: declarations whose line items carry *both* codes
/// (conjunction across the declaration, not per row).
pub struct CoOccurrenceRule {
    pub code_a: &'static str,
    pub code_b: &'static str,
    pub limit: usize,
    pub reason: &'static str,
}

impl SelectionRule for CoOccurrenceRule {
    fn name(&self) -> &'static str {
        "document-co-occurrence"
    }

    fn propose(&self, ctx: &RuleContext<'_>, rng: &mut StdRng) -> Vec<Proposal> {
        if ctx.columns.document_code_columns.is_empty() {
            debug!("no document code columns, skipping");
            return Vec::new();
        }
        let mut flags: HashMap<String, (bool, bool)> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for r in &ctx.table.rows {
            let Some(id) = r.get(ctx.id_column) else { continue };
            let id = id.trim();
            if id.is_empty() {
                continue;
            }
            let entry = flags.entry(id.to_string()).or_insert_with(|| {
                order.push(id.to_string());
                (false, false)
            });
            for c in &ctx.columns.document_code_columns {
                match r.get(c).map(str::trim) {
                    Some(v) if v == self.code_a => entry.0 = true,
                    Some(v) if v == self.code_b => entry.1 = true,
                    _ => {}
                }
            }
        }
        let ids: Vec<String> = order
            .into_iter()
            .filter(|id| matches!(flags.get(id), Some((true, true))))
            .collect();
        sample_up_to(&ids, self.limit, rng)
            .into_iter()
            .map(|id| Proposal::new(id, self.reason))
            .collect()
    }
}

/// Fixed-value selection: declarations whose field value is in a small
/// allowlist (regime allowlist, on-vehicle processing code).
pub struct ValueSetRule {
    pub name: &'static str,
    pub field: Field,
    pub values: &'static [&'static str],
    pub limit: usize,
    pub reason: &'static str,
}

impl SelectionRule for ValueSetRule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn propose(&self, ctx: &RuleContext<'_>, rng: &mut StdRng) -> Vec<Proposal> {
        let Some(col) = ctx.columns.get(self.field) else {
            debug!(rule = self.name, "column not found, skipping");
            return Vec::new();
        };
        let wanted: HashSet<&str> = self.values.iter().copied().collect();
        let ids = ctx.table.declarations_where(ctx.id_column, |r| {
            r.get(col).map(|v| wanted.contains(v.trim())).unwrap_or(false)
        });
        sample_up_to(&ids, self.limit, rng)
            .into_iter()
            .map(|id| Proposal::new(id, self.reason))
            .collect()
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
    fn co_occurrence_requires_both_codes_across_line_items() {
        let t = test_table(
            &["Beyanname_no", "Dokuman_kod_1", "Dokuman_kod_2"],
            &[
                &["B1", "0301", ""],
                &["B1", "0819", ""],
                &["B2", "0301", ""],
                &["B3", "0301", "0819"],
            ],
        );
        let cols = ColumnMap::resolve(&t.headers);
        let selected = Selection::new();
        let rule = CoOccurrenceRule {
            code_a: "0301",
            code_b: "0819",
            limit: 5,
            reason: "both documents",
        };
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let mut picked: Vec<String> = rule
            .propose(&ctx(&t, &cols, &selected), &mut rng)
            .into_iter()
            .map(|p| p.declaration)
            .collect();
        picked.sort();
        assert_eq!(picked, vec!["B1", "B3"]);
    }

    #[test]
    fn origin_proof_selects_one_per_code() {
        let t = test_table(
            &["Beyanname_no", "Dokuman_kod_1"],
            &[&["B1", "0302"], &["B2", "0807"], &["B3", "9999"]],
        );
        let cols = ColumnMap::resolve(&t.headers);
        let selected = Selection::new();
        let rule = OriginProofRule {
            codes: &["0302", "0807", "0307"],
        };
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let proposals = rule.propose(&ctx(&t, &cols, &selected), &mut rng);
        assert_eq!(proposals.len(), 2);
        assert!(proposals[0].reason.contains("0302"));
        assert!(proposals[1].reason.contains("0807"));
    }

    #[test]
    fn value_set_rule_honours_allowlist_and_limit() {
        let t = test_table(
            &["Beyanname_no", "Rejim"],
            &[&["B1", "5100"], &["B2", "4000"], &["B3", "2100"]],
        );
        let cols = ColumnMap::resolve(&t.headers);
        let selected = Selection::new();
        let rule = ValueSetRule {
            name: "processing-regime",
            field: Field::Regime,
            values: &["5100", "5171", "2100"],
            limit: 1,
            reason: "processing regime",
        };
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let proposals = rule.propose(&ctx(&t, &cols, &selected), &mut rng);
        assert_eq!(proposals.len(), 1);
        assert!(["B1", "B3"].contains(&proposals[0].declaration.as_str()));
    }
}
