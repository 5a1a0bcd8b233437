use super::{sample_up_to, Proposal, RuleContext, SelectionRule};
use crate::columns::{columns_containing_any, normalize_text, Field};
use crate::table::parse_number;
use rand::rngs::StdRng;
use tracing::debug;

/// Keyword-match selection: scan a set of free-text columns (resolved semantic
/// fields plus any header containing one of `column_fragments`) for domain
/// keywords, case-insensitively and diacritic-folded, then pick up to `limit`
/// matching declarations at random.
pub struct KeywordRule {
    pub name: &'static str,
    pub fields: &'static [Field],
    pub column_fragments: &'static [&'static str],
    pub keywords: &'static [&'static str],
    pub limit: usize,
    pub reason: &'static str,
}

impl KeywordRule {
    fn scan_columns(&self, ctx: &RuleContext<'_>) -> Vec<String> {
        let mut cols: Vec<String> = self
            .fields
            .iter()
            .filter_map(|&f| ctx.columns.get(f).map(str::to_string))
            .collect();
        if !self.column_fragments.is_empty() {
            for c in columns_containing_any(ctx.columns.headers(), self.column_fragments) {
                if !cols.contains(&c) {
                    cols.push(c);
                }
            }
        }
        cols
    }
}

impl SelectionRule for KeywordRule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn propose(&self, ctx: &RuleContext<'_>, rng: &mut StdRng) -> Vec<Proposal> {
        let cols = self.scan_columns(ctx);
        if cols.is_empty() {
            debug!(rule = self.name, "no matching columns, skipping");
            return Vec::new();
        }
        let keywords: Vec<String> = self.keywords.iter().map(|k| normalize_text(k)).collect();
        let ids = ctx.table.declarations_where(ctx.id_column, |r| {
            cols.iter().any(|c| {
                r.get(c)
                    .map(|v| {
                        let v = normalize_text(v);
                        keywords.iter().any(|k| v.contains(k))
                    })
                    .unwrap_or(false)
            })
        });
        sample_up_to(&ids, self.limit, rng)
            .into_iter()
            .map(|id| Proposal::new(id, self.reason))
            .collect()
    }
}

/// Foreign-expense selection: declarations with a positive amount in a foreign
/// expense column, or royalty/licence wording in the matching explanation
/// column; up to 5 picked at random.
pub struct ForeignExpenseRule;

const EXPENSE_FRAGMENTS: &[&str] = &["yurtdisigider", "royalti", "lisans"];
const EXPENSE_KEYWORDS: &[&str] = &[
    "royalti",
    "lisans",
    "license",
    "royalty",
    "know-how",
    "franchise",
];

impl SelectionRule for ForeignExpenseRule {
    fn name(&self) -> &'static str {
        "foreign-expense"
    }

    fn propose(&self, ctx: &RuleContext<'_>, rng: &mut StdRng) -> Vec<Proposal> {
        let candidates = columns_containing_any(ctx.columns.headers(), EXPENSE_FRAGMENTS);
        if candidates.is_empty() {
            debug!("no foreign expense columns, skipping");
            return Vec::new();
        }
        let (explanation_cols, amount_cols): (Vec<String>, Vec<String>) = candidates
            .into_iter()
            .partition(|c| crate::columns::normalize_column_name(c).contains("aciklama"));

        let keywords: Vec<String> = EXPENSE_KEYWORDS.iter().map(|k| normalize_text(k)).collect();
        let ids = ctx.table.declarations_where(ctx.id_column, |r| {
            let amount_hit = amount_cols
                .iter()
                .any(|c| r.get(c).map(parse_number).unwrap_or(0.0) > 0.0);
            let text_hit = explanation_cols.iter().any(|c| {
                r.get(c)
                    .map(|v| {
                        let v = normalize_text(v);
                        keywords.iter().any(|k| v.contains(k))
                    })
                    .unwrap_or(false)
            });
            amount_hit || text_hit
        });
        sample_up_to(&ids, 5, rng)
            .into_iter()
            .map(|id| Proposal::new(id, "Foreign expense / royalty / licence payment declared"))
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

    #[test]
    fn keyword_rule_matches_diacritics_insensitively() {
        let t = test_table(
            &["Beyanname_no", "Aciklama_44"],
            &[
                &["B1", "İSTİSNAİ KIYMET ile beyan"],
                &["B2", "normal"],
                &["B3", "kiymet istisnasi"],
            ],
        );
        let cols = ColumnMap::resolve(&t.headers);
        let selected = Selection::new();
        let ctx = RuleContext {
            table: &t,
            columns: &cols,
            selected: &selected,
            id_column: "Beyanname_no",
        };
        let rule = KeywordRule {
            name: "exceptional-value",
            fields: &[],
            column_fragments: &["aciklama", "44"],
            keywords: &["istisnai kiymet", "kiymet istisnasi"],
            limit: 5,
            reason: "Declared with exceptional value",
        };
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let mut picked: Vec<String> = rule
            .propose(&ctx, &mut rng)
            .into_iter()
            .map(|p| p.declaration)
            .collect();
        picked.sort();
        assert_eq!(picked, vec!["B1", "B3"]);
    }

    #[test]
    fn foreign_expense_matches_amount_or_explanation() {
        let t = test_table(
            &["Beyanname_no", "Yurtdisi_gider", "Yurtdisi_gider_aciklama"],
            &[
                &["B1", "150", ""],
                &["B2", "0", "royalty payment"],
                &["B3", "0", ""],
            ],
        );
        let cols = ColumnMap::resolve(&t.headers);
        let selected = Selection::new();
        let ctx = RuleContext {
            table: &t,
            columns: &cols,
            selected: &selected,
            id_column: "Beyanname_no",
        };
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let mut picked: Vec<String> = ForeignExpenseRule
            .propose(&ctx, &mut rng)
            .into_iter()
            .map(|p| p.declaration)
            .collect();
        picked.sort();
        assert_eq!(picked, vec!["B1", "B2"]);
    }
}
