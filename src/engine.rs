use crate::columns::{ColumnMap, Field};
use crate::config::SamplingParams;
use crate::rules::{standard_rules, RuleContext, SelectionRule};
use crate::selection::Selection;
use crate::table::{DeclarationTable, Record};
use crate::SamplingError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

/// Column appended to the materialized result holding the joined reasons.
pub const REASONS_COLUMN: &str = "Selection_Reasons";

/// Run statistics, populated once per sampling run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SamplingStats {
    pub total_declarations: usize,
    pub target_sample_count: usize,
    pub selected_count: usize,
}

impl SamplingStats {
    pub fn selection_percentage(&self) -> f64 {
        if self.total_declarations == 0 {
            0.0
        } else {
            self.selected_count as f64 / self.total_declarations as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct SummaryRow {
    pub declaration: String,
    pub reasons: String,
    pub date: Option<String>,
}

/// Materialized sampling result, ready for export.
#[derive(Debug, Clone)]
pub struct SampleReport {
    pub id_column: String,
    pub date_column: Option<String>,
    /// Detail headers: the input columns plus [`REASONS_COLUMN`].
    pub headers: Vec<String>,
    /// One row per selected declaration, unique-table order, reasons injected.
    pub rows: Vec<Record>,
    /// Summary rows in selection order.
    pub summary: Vec<SummaryRow>,
    pub stats: SamplingStats,
}

/// The declaration sampling engine.
///
/// Constructed empty; `set_table` loads data and resets all derived state;
/// `run_sampling` applies the rule registry and the random top-up. By default
/// each run starts from an empty selection; the inherited
/// accumulate-across-runs behaviour is available behind
/// `SamplingParams::accumulate`.
pub struct SamplingEngine {
    table: Option<DeclarationTable>,
    columns: ColumnMap,
    id_column: String,
    unique: Vec<Record>,
    selection: Selection,
    stats: SamplingStats,
    rules: Vec<Box<dyn SelectionRule>>,
}

impl Default for SamplingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplingEngine {
    pub fn new() -> Self {
        SamplingEngine {
            table: None,
            columns: ColumnMap::default(),
            id_column: String::new(),
            unique: Vec::new(),
            selection: Selection::new(),
            stats: SamplingStats::default(),
            rules: standard_rules(),
        }
    }

    /// Replace the rule registry (mainly for tests and custom methodologies).
    pub fn with_rules(mut self, rules: Vec<Box<dyn SelectionRule>>) -> Self {
        self.rules = rules;
        self
    }

    /// Load a line-item table, resolve columns once, derive the
    /// unique-declaration table and reset selection state.
    pub fn set_table(&mut self, table: DeclarationTable) -> Result<(), SamplingError> {
        let columns = ColumnMap::resolve(&table.headers);
        let id_column = columns
            .get(Field::DeclarationNo)
            .ok_or_else(|| {
                SamplingError::NoData("no declaration number column found in input".into())
            })?
            .to_string();
        self.unique = table.unique_declarations(&id_column);
        self.stats = SamplingStats {
            total_declarations: self.unique.len(),
            ..SamplingStats::default()
        };
        self.selection.clear();
        self.columns = columns;
        self.id_column = id_column;
        self.table = Some(table);
        Ok(())
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn stats(&self) -> &SamplingStats {
        &self.stats
    }

    /// Apply every rule in the registry, then top up to the target size with
    /// uniform random picks. Rule-driven selections are never trimmed, so the
    /// final count may exceed the target.
    pub fn run_sampling(
        &mut self,
        params: &SamplingParams,
        rng: &mut StdRng,
    ) -> Result<SampleReport, SamplingError> {
        let table = self
            .table
            .as_ref()
            .ok_or_else(|| SamplingError::NoData("no table loaded".into()))?;
        params.validate()?;

        if !params.accumulate {
            self.selection.clear();
        }
        let target = params.target_for(self.stats.total_declarations);
        self.stats.target_sample_count = target;

        for rule in &self.rules {
            let proposals = {
                let ctx = RuleContext {
                    table,
                    columns: &self.columns,
                    selected: &self.selection,
                    id_column: &self.id_column,
                };
                rule.propose(&ctx, rng)
            };
            debug!(rule = rule.name(), proposals = proposals.len(), "rule evaluated");
            for p in proposals {
                self.selection.add(&p.declaration, &p.reason);
            }
        }

        // Random top-up until the target is met or the pool runs out.
        let mut remaining: Vec<&str> = self
            .unique
            .iter()
            .filter_map(|r| r.get(&self.id_column))
            .map(str::trim)
            .filter(|id| !self.selection.contains(id))
            .collect();
        remaining.shuffle(rng);
        while self.selection.len() < target {
            let Some(id) = remaining.pop() else { break };
            self.selection.add(id, "Random sampling");
        }

        self.stats.selected_count = self.selection.len();
        info!(
            total = self.stats.total_declarations,
            target,
            selected = self.stats.selected_count,
            "sampling run complete"
        );
        Ok(self.materialize())
    }

    /// Join the selected ids back to their unique-declaration attributes plus
    /// the concatenated reasons.
    fn materialize(&self) -> SampleReport {
        let table = self.table.as_ref().expect("table checked by run_sampling");
        let date_column = self.columns.get(Field::Date).map(str::to_string);

        let mut headers = table.headers.clone();
        headers.push(REASONS_COLUMN.to_string());

        let mut rows = Vec::new();
        for r in &self.unique {
            let Some(id) = r.get(&self.id_column).map(str::trim) else {
                continue;
            };
            if !self.selection.contains(id) {
                continue;
            }
            let reasons = self.selection.joined_reasons(id);
            debug_assert!(!reasons.is_empty(), "selected declaration without reasons");
            let mut row = r.clone();
            row.values.insert(REASONS_COLUMN.to_string(), reasons);
            rows.push(row);
        }

        let summary = self
            .selection
            .ids()
            .iter()
            .map(|id| {
                let date = date_column.as_deref().and_then(|dc| {
                    self.unique
                        .iter()
                        .find(|r| r.get(&self.id_column).map(str::trim) == Some(id.as_str()))
                        .and_then(|r| r.get(dc))
                        .map(str::to_string)
                });
                SummaryRow {
                    declaration: id.clone(),
                    reasons: self.selection.joined_reasons(id),
                    date,
                }
            })
            .collect();

        SampleReport {
            id_column: self.id_column.clone(),
            date_column,
            headers,
            rows,
            summary,
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{test_table, DeclarationTable};
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    /// 1000 unique declarations over 3 regime codes (400/300/300), one line
    /// item each, with sender and invoice value columns.
    fn big_table() -> DeclarationTable {
        let headers = vec![
            "Beyanname_no".to_string(),
            "Rejim".to_string(),
            "Adi_unvani".to_string(),
            "Fatura_miktari".to_string(),
        ];
        let mut rows = Vec::new();
        for i in 0..1000usize {
            let regime = if i < 400 {
                "4000"
            } else if i < 700 {
                "5100"
            } else {
                "2100"
            };
            let mut values = HashMap::new();
            values.insert("Beyanname_no".to_string(), format!("B{i:04}"));
            values.insert("Rejim".to_string(), regime.to_string());
            values.insert("Adi_unvani".to_string(), format!("FIRM{}", i % 37));
            values.insert("Fatura_miktari".to_string(), format!("{}", (i * 13) % 997));
            rows.push(crate::table::Record { values });
        }
        DeclarationTable { headers, rows }
    }

    #[test]
    fn scenario_three_regimes_target_and_quota() {
        let mut engine = SamplingEngine::new();
        engine.set_table(big_table()).unwrap();
        let params = SamplingParams::default(); // 5%, [100, 150]
        let report = engine.run_sampling(&params, &mut rng(11)).unwrap();

        assert_eq!(report.stats.total_declarations, 1000);
        assert_eq!(report.stats.target_sample_count, 100);
        assert!(report.stats.selected_count >= 100);
        // Each regime code contributes at least one declaration.
        let selected_regimes: std::collections::HashSet<&str> = report
            .rows
            .iter()
            .filter_map(|r| r.get("Rejim"))
            .collect();
        assert!(selected_regimes.is_superset(&["4000", "5100", "2100"].into()));
        // Sender coverage is complete: every firm present in the input has a
        // selected representative.
        let selected_firms: std::collections::HashSet<&str> = report
            .rows
            .iter()
            .filter_map(|r| r.get("Adi_unvani"))
            .collect();
        assert_eq!(selected_firms.len(), 37);
        // Invariant: one summary row per selected declaration, reasons nonempty.
        assert_eq!(report.summary.len(), report.stats.selected_count);
        assert!(report.summary.iter().all(|s| !s.reasons.is_empty()));
        assert_eq!(report.rows.len(), report.stats.selected_count);
    }

    #[test]
    fn fixed_seed_runs_are_identical() {
        let params = SamplingParams::default();
        let mut a = SamplingEngine::new();
        a.set_table(big_table()).unwrap();
        let ra = a.run_sampling(&params, &mut rng(99)).unwrap();
        let mut b = SamplingEngine::new();
        b.set_table(big_table()).unwrap();
        let rb = b.run_sampling(&params, &mut rng(99)).unwrap();

        let ids = |r: &SampleReport| -> Vec<String> {
            r.summary.iter().map(|s| s.declaration.clone()).collect()
        };
        assert_eq!(ids(&ra), ids(&rb));
        let reasons = |r: &SampleReport| -> Vec<String> {
            r.summary.iter().map(|s| s.reasons.clone()).collect()
        };
        assert_eq!(reasons(&ra), reasons(&rb));
    }

    #[test]
    fn anonymized_schema_still_reaches_target_via_topup() {
        // Only a declaration id and an unrecognizable value column: every
        // coverage rule no-ops, top-up must carry the run to the target.
        let headers = vec!["Beyanname_no".to_string(), "col_x".to_string()];
        let mut rows = Vec::new();
        for i in 0..500usize {
            let mut values = HashMap::new();
            values.insert("Beyanname_no".to_string(), format!("B{i}"));
            values.insert("col_x".to_string(), i.to_string());
            rows.push(crate::table::Record { values });
        }
        let mut engine = SamplingEngine::new();
        engine.set_table(DeclarationTable { headers, rows }).unwrap();
        let params = SamplingParams::default();
        let report = engine.run_sampling(&params, &mut rng(5)).unwrap();
        assert_eq!(report.stats.target_sample_count, 100);
        assert_eq!(report.stats.selected_count, 100);
        assert!(report
            .summary
            .iter()
            .all(|s| s.reasons == "Random sampling"));
    }

    #[test]
    fn pool_smaller_than_target_selects_everything() {
        let t = test_table(
            &["Beyanname_no", "Rejim"],
            &[&["B1", "4000"], &["B2", "4000"], &["B3", "5100"]],
        );
        let mut engine = SamplingEngine::new();
        engine.set_table(t).unwrap();
        let params = SamplingParams::default(); // min 100 >> pool of 3
        let report = engine.run_sampling(&params, &mut rng(0)).unwrap();
        assert_eq!(report.stats.selected_count, 3);
    }

    #[test]
    fn rerun_resets_by_default_and_accumulates_on_request() {
        let mut engine = SamplingEngine::new();
        engine.set_table(big_table()).unwrap();
        let params = SamplingParams::default();
        let first = engine.run_sampling(&params, &mut rng(1)).unwrap();
        let second = engine.run_sampling(&params, &mut rng(2)).unwrap();
        // Reset-on-invoke: second run is a fresh selection of similar size.
        assert!(second.stats.selected_count <= first.stats.selected_count + 150);
        assert_eq!(second.summary.len(), second.stats.selected_count);

        let mut accum = params.clone();
        accum.accumulate = true;
        let third = engine.run_sampling(&accum, &mut rng(3)).unwrap();
        assert!(third.stats.selected_count >= second.stats.selected_count);
    }

    #[test]
    fn sampling_without_table_fails_fast() {
        let mut engine = SamplingEngine::new();
        let params = SamplingParams::default();
        let err = engine.run_sampling(&params, &mut rng(0)).unwrap_err();
        assert!(matches!(err, SamplingError::NoData(_)));
    }

    #[test]
    fn missing_id_column_is_rejected() {
        let t = test_table(&["foo", "bar"], &[&["1", "2"]]);
        let mut engine = SamplingEngine::new();
        assert!(matches!(
            engine.set_table(t),
            Err(SamplingError::NoData(_))
        ));
    }
}
