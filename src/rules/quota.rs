use super::{sample_up_to, Proposal, RuleContext, SelectionRule};
use crate::columns::Field;
use crate::table::parse_number;
use rand::rngs::StdRng;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Per-regime-code quota: at least 5% of each regime code's declarations
/// (minimum one), preferring one declaration per distinct sender ordered by
/// invoice value, then topping the quota up with the highest-value
/// declarations. Without sender/value columns the quota falls back to a
/// uniform draw.
pub struct RegimeQuotaRule;

impl SelectionRule for RegimeQuotaRule {
    fn name(&self) -> &'static str {
        "Regime quota"
    }

    fn propose(&self, ctx: &RuleContext<'_>, rng: &mut StdRng) -> Vec<Proposal> {
        let Some(regime_col) = ctx.columns.get(Field::Regime) else {
            debug!("regime column not found, skipping quota rule");
            return Vec::new();
        };
        let sender_col = ctx.columns.get(Field::Sender);
        let value_col = ctx.columns.get(Field::InvoiceValue);

        let mut proposals = Vec::new();
        for code in ctx.table.distinct_values(regime_col) {
            let decls = ctx
                .table
                .declarations_with_value(ctx.id_column, regime_col, &code);
            if decls.is_empty() {
                continue;
            }
            let quota = ((decls.len() as f64 * 0.05) as usize).max(1);

            match (sender_col, value_col) {
                (Some(sender_col), Some(value_col)) => {
                    // Per (declaration, sender) invoice-value sums within this regime.
                    let mut index: HashMap<(String, String), usize> = HashMap::new();
                    let mut groups: Vec<(String, String, f64)> = Vec::new();
                    for r in &ctx.table.rows {
                        if r.get(regime_col).map(str::trim) != Some(code.as_str()) {
                            continue;
                        }
                        let (Some(id), Some(sender)) = (r.get(ctx.id_column), r.get(sender_col))
                        else {
                            continue;
                        };
                        let amount = r.get(value_col).map(parse_number).unwrap_or(0.0);
                        let key = (id.trim().to_string(), sender.trim().to_string());
                        match index.get(&key) {
                            Some(&i) => groups[i].2 += amount,
                            None => {
                                index.insert(key.clone(), groups.len());
                                groups.push((key.0, key.1, amount));
                            }
                        }
                    }
                    groups.sort_by(|a, b| b.2.total_cmp(&a.2));

                    let mut seen_senders: HashSet<&str> = HashSet::new();
                    let mut picked: Vec<&str> = Vec::new();
                    for (id, sender, _) in &groups {
                        if picked.len() >= quota {
                            break;
                        }
                        if seen_senders.insert(sender.as_str())
                            && !picked.contains(&id.as_str())
                        {
                            picked.push(id.as_str());
                            proposals.push(Proposal::new(
                                id.clone(),
                                format!("Regime code {code} - distinct sender sampling"),
                            ));
                        }
                    }
                    if picked.len() < quota {
                        // Fill the remainder with the highest-value declarations.
                        let mut totals: HashMap<&str, f64> = HashMap::new();
                        let mut order: Vec<&str> = Vec::new();
                        for (id, _, v) in &groups {
                            if picked.contains(&id.as_str()) {
                                continue;
                            }
                            if !totals.contains_key(id.as_str()) {
                                order.push(id.as_str());
                            }
                            *totals.entry(id.as_str()).or_insert(0.0) += v;
                        }
                        order.sort_by(|a, b| totals[b].total_cmp(&totals[a]));
                        for id in order.into_iter().take(quota - picked.len()) {
                            proposals.push(Proposal::new(
                                id,
                                format!("Regime code {code} - highest value sampling"),
                            ));
                        }
                    }
                }
                _ => {
                    for id in sample_up_to(&decls, quota, rng) {
                        proposals.push(Proposal::new(
                            id,
                            format!("Regime code {code} - random sampling"),
                        ));
                    }
                }
            }
        }
        proposals
    }
}

/// Top-N by a per-declaration numeric sum (gross weight, invoice value).
pub struct TopNRule {
    pub field: Field,
    pub n: usize,
    pub reason_prefix: &'static str,
}

impl SelectionRule for TopNRule {
    fn name(&self) -> &'static str {
        self.reason_prefix
    }

    fn propose(&self, ctx: &RuleContext<'_>, _rng: &mut StdRng) -> Vec<Proposal> {
        let Some(col) = ctx.columns.get(self.field) else {
            debug!(rule = self.reason_prefix, "column not found, skipping");
            return Vec::new();
        };
        let mut sums = ctx.table.sum_by_declaration(ctx.id_column, col);
        sums.sort_by(|a, b| b.1.total_cmp(&a.1));
        sums.into_iter()
            .take(self.n)
            .map(|(id, sum)| {
                Proposal::new(
                    id,
                    format!(
                        "{}: {:.2} - top {} declarations",
                        self.reason_prefix, sum, self.n
                    ),
                )
            })
            .collect()
    }
}
