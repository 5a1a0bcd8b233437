//! Selection rule library.
//!
//! Each rule is an independent object consuming the full line-item table and a
//! read-only view of the current selection, and returning `(declaration,
//! reason)` proposals. The engine merges proposals into the accumulator, so
//! rules stay testable in isolation. A rule whose expected columns are absent
//! proposes nothing; heterogeneous input schemas make that a normal outcome,
//! not an error.

pub mod coverage;
pub mod document;
pub mod keyword;
pub mod quota;

use crate::columns::{ColumnMap, Field};
use crate::selection::Selection;
use crate::table::DeclarationTable;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;

pub use coverage::{CoverageRule, Oversample};
pub use document::{CoOccurrenceRule, OriginProofRule, PooledDocumentCodeRule, ValueSetRule};
pub use keyword::{ForeignExpenseRule, KeywordRule};
pub use quota::{RegimeQuotaRule, TopNRule};

/// A declaration proposed for the sample, with its human-readable
/// justification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub declaration: String,
    pub reason: String,
}

impl Proposal {
    pub fn new(declaration: impl Into<String>, reason: impl Into<String>) -> Self {
        Proposal {
            declaration: declaration.into(),
            reason: reason.into(),
        }
    }
}

/// Everything a rule may look at while proposing.
pub struct RuleContext<'a> {
    pub table: &'a DeclarationTable,
    pub columns: &'a ColumnMap,
    pub selected: &'a Selection,
    pub id_column: &'a str,
}

pub trait SelectionRule {
    fn name(&self) -> &'static str;
    fn propose(&self, ctx: &RuleContext<'_>, rng: &mut StdRng) -> Vec<Proposal>;
}

/// Uniformly pick at most `limit` distinct ids.
pub(crate) fn sample_up_to(ids: &[String], limit: usize, rng: &mut StdRng) -> Vec<String> {
    ids.choose_multiple(rng, limit.min(ids.len()))
        .cloned()
        .collect()
}

/// The standard registry, in the order the original audit methodology applies
/// them. Order only affects which reason is recorded first for a declaration
/// picked by several rules.
pub fn standard_rules() -> Vec<Box<dyn SelectionRule>> {
    vec![
        Box::new(RegimeQuotaRule),
        Box::new(CoverageRule::plain(Field::Sender, "Sender")),
        Box::new(CoverageRule::plain(Field::TariffCode, "Tariff code")),
        Box::new(CoverageRule::plain(Field::Country, "Country")),
        Box::new(TopNRule {
            field: Field::GrossWeight,
            n: 5,
            reason_prefix: "Highest gross weight",
        }),
        Box::new(TopNRule {
            field: Field::InvoiceValue,
            n: 5,
            reason_prefix: "Highest invoice value",
        }),
        Box::new(CoverageRule::plain(Field::ExemptionCode, "Exemption code")),
        Box::new(CoverageRule::plain(
            Field::SimplifiedProcedure,
            "Simplified procedure",
        )),
        Box::new(CoverageRule::plain(Field::OriginCountry, "Origin country")),
        Box::new(CoverageRule::oversampled(
            Field::TransportType,
            "Transport type",
            Oversample {
                top_categories: 1,
                per_category: 3,
            },
        )),
        Box::new(CoverageRule::oversampled(
            Field::DeliveryType,
            "Delivery type",
            Oversample {
                top_categories: 3,
                per_category: 3,
            },
        )),
        Box::new(ForeignExpenseRule),
        Box::new(KeywordRule {
            name: "exceptional-value",
            fields: &[],
            column_fragments: &["belge", "dokuman", "aciklama", "44"],
            keywords: &["istisnai kiymet", "istisnai", "kiymet istisnasi"],
            limit: 5,
            reason: "Declared with exceptional value",
        }),
        Box::new(ValueSetRule {
            name: "onboard-processing",
            field: Field::SimplifiedProcedure,
            values: &["3"],
            limit: 5,
            reason: "On-vehicle processing (simplified procedure code 3)",
        }),
        Box::new(CoverageRule::oversampled(
            Field::PaymentMethod,
            "Payment method",
            Oversample {
                top_categories: 1,
                per_category: 3,
            },
        )),
        Box::new(KeywordRule {
            name: "discount",
            fields: &[],
            column_fragments: &["yurtdisigider", "gider", "iskonto", "indirim", "discount"],
            keywords: &["iskonto", "indirim", "discount"],
            limit: 5,
            reason: "Discount applied on the declaration",
        }),
        Box::new(OriginProofRule {
            codes: &["0302", "0807", "0307"],
        }),
        Box::new(CoOccurrenceRule {
            code_a: "0301",
            code_b: "0819",
            limit: 5,
            reason: "Carries both an A.TR movement certificate and a supplier declaration",
        }),
        Box::new(KeywordRule {
            name: "set-classification",
            fields: &[Field::QuantityUnit],
            column_fragments: &["aciklama", "ticaritanimi", "esyatanimi"],
            keywords: &["set"],
            limit: 5,
            reason: "Goods classified as a set",
        }),
        Box::new(PooledDocumentCodeRule {
            name: "supplier-origin-declaration",
            codes: &["0876", "0842"],
            limit: 5,
            reason: "Supplier declaration / origin declaration document",
        }),
        Box::new(KeywordRule {
            name: "end-use-exemption",
            fields: &[Field::ExemptionCode],
            column_fragments: &[],
            keywords: &["nkul"],
            limit: 5,
            reason: "Reduced or zero duty rate for end-use (nkul exemption)",
        }),
        Box::new(ValueSetRule {
            name: "processing-regime",
            field: Field::Regime,
            values: &["5100", "5171", "2100"],
            limit: 5,
            reason: "Inward/outward processing regime declaration",
        }),
    ]
}
