//! Semantic column discovery.
//!
//! Upstream extractors produce heterogeneously named columns (e.g. the regime
//! column may arrive as `Rejim`, `Rejim_kodu` or `Rejim Kodu`). Each semantic
//! field declares an ordered candidate list; matching runs one normalization
//! routine (lowercase, separators stripped, Turkish diacritics folded) and a
//! substring-contains test. Absence of a field is not an error; dependent
//! rules simply no-op.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    DeclarationNo,
    Regime,
    Sender,
    TariffCode,
    Country,
    OriginCountry,
    GrossWeight,
    InvoiceValue,
    ExemptionCode,
    SimplifiedProcedure,
    TransportType,
    DeliveryType,
    PaymentMethod,
    QuantityUnit,
    Date,
}

impl Field {
    fn candidates(self) -> &'static [&'static str] {
        match self {
            Field::DeclarationNo => &["Beyanname_no", "Beyanname no", "Beyanname"],
            Field::Regime => &["Rejim"],
            Field::Sender => &[
                "Gonderen",
                "Gonderen_adi",
                "Gonderen_firma",
                "Adi_unvani",
                "Ihracatci",
            ],
            Field::TariffCode => &["Gtip"],
            Field::Country => &["Cikis_ulkesi", "Ihracat_ulkesi"],
            Field::OriginCountry => &["Mensei_ulke"],
            Field::GrossWeight => &["Brut_agirlik"],
            Field::InvoiceValue => &["Fatura_miktari"],
            Field::ExemptionCode => &["Muafiyet_kodu", "Muafiyet", "Muafiyet1", "Muafiyet2"],
            Field::SimplifiedProcedure => &[
                "Basitlestirilmis_usul",
                "Basitlestirilmis_usul_kodu",
                "Islem_kodu",
            ],
            Field::TransportType => &["Tasima_sekli", "Tasima_araci", "Tasima_turu"],
            Field::DeliveryType => &["Teslim_sekli"],
            Field::PaymentMethod => &["Odeme", "Odeme_sekli", "Odeme_yontemi"],
            Field::QuantityUnit => &["Miktar_birimi", "Olcu_birimi"],
            Field::Date => &["Tarih", "Tescil_tarihi", "Tescil"],
        }
    }
}

/// Fold a Turkish-accented character to its ASCII base.
fn fold_char(c: char) -> char {
    match c {
        'ç' | 'Ç' => 'c',
        'ğ' | 'Ğ' => 'g',
        'ı' | 'İ' => 'i',
        'ö' | 'Ö' => 'o',
        'ş' | 'Ş' => 's',
        'ü' | 'Ü' => 'u',
        _ => c.to_ascii_lowercase(),
    }
}

/// Normalize free text for keyword matching: lowercase and fold diacritics,
/// keep spaces.
pub fn normalize_text(s: &str) -> String {
    s.trim().chars().map(fold_char).collect()
}

/// Normalize a column name for matching: `normalize_text` plus separator
/// removal, so `"Rejim Kodu"`, `"rejim_kodu"` and `"RejimKodu"` all compare
/// equal.
pub fn normalize_column_name(s: &str) -> String {
    normalize_text(s)
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .collect()
}

/// Pick the first header matching any of `candidates` under normalized
/// substring-containment. Returns the header's original spelling.
pub fn resolve_column(candidates: &[&str], headers: &[String]) -> Option<String> {
    for cand in candidates {
        let cand_norm = normalize_column_name(cand);
        if let Some(h) = headers
            .iter()
            .find(|h| normalize_column_name(h).contains(&cand_norm))
        {
            return Some(h.clone());
        }
    }
    None
}

/// Headers whose normalized name contains every fragment in `fragments`.
pub fn columns_containing(headers: &[String], fragments: &[&str]) -> Vec<String> {
    headers
        .iter()
        .filter(|h| {
            let n = normalize_column_name(h);
            fragments.iter().all(|f| n.contains(&normalize_column_name(f)))
        })
        .cloned()
        .collect()
}

/// Headers whose normalized name contains at least one of `fragments`.
pub fn columns_containing_any(headers: &[String], fragments: &[&str]) -> Vec<String> {
    headers
        .iter()
        .filter(|h| {
            let n = normalize_column_name(h);
            fragments.iter().any(|f| n.contains(&normalize_column_name(f)))
        })
        .cloned()
        .collect()
}

/// Column lookup resolved once per run; rules consult this instead of
/// rescanning headers.
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    resolved: HashMap<Field, String>,
    /// Columns carrying line-item document codes ("Dokuman ... kod ...").
    pub document_code_columns: Vec<String>,
    headers: Vec<String>,
}

impl ColumnMap {
    pub fn resolve(headers: &[String]) -> Self {
        const ALL: &[Field] = &[
            Field::DeclarationNo,
            Field::Regime,
            Field::Sender,
            Field::TariffCode,
            Field::Country,
            Field::OriginCountry,
            Field::GrossWeight,
            Field::InvoiceValue,
            Field::ExemptionCode,
            Field::SimplifiedProcedure,
            Field::TransportType,
            Field::DeliveryType,
            Field::PaymentMethod,
            Field::QuantityUnit,
            Field::Date,
        ];
        let mut resolved = HashMap::new();
        for &field in ALL {
            if let Some(col) = resolve_column(field.candidates(), headers) {
                resolved.insert(field, col);
            }
        }
        let document_code_columns = columns_containing(headers, &["dokuman", "kod"]);
        ColumnMap {
            resolved,
            document_code_columns,
            headers: headers.to_vec(),
        }
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.resolved.get(&field).map(String::as_str)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalization_unifies_separators_and_diacritics() {
        assert_eq!(normalize_column_name("Rejim Kodu"), "rejimkodu");
        assert_eq!(normalize_column_name("rejim_kodu"), "rejimkodu");
        assert_eq!(normalize_column_name("Menşei Ülke"), "menseiulke");
        assert_eq!(normalize_text("İstisnai Kıymet"), "istisnai kiymet");
    }

    #[test]
    fn first_candidate_wins() {
        let h = headers(&["Adi_unvani", "Gonderen_firma"]);
        // Gonderen_firma matches an earlier candidate than Adi_unvani.
        assert_eq!(
            resolve_column(Field::Sender.candidates(), &h),
            Some("Gonderen_firma".to_string())
        );
    }

    #[test]
    fn resolution_is_idempotent_and_tolerates_absence() {
        let h = headers(&["Beyanname No", "Rejim Kodu", "Dokuman_kod_1"]);
        let a = ColumnMap::resolve(&h);
        let b = ColumnMap::resolve(&h);
        assert_eq!(a.get(Field::DeclarationNo), b.get(Field::DeclarationNo));
        assert_eq!(a.get(Field::Regime), Some("Rejim Kodu"));
        assert_eq!(a.get(Field::GrossWeight), None);
        assert_eq!(a.document_code_columns, vec!["Dokuman_kod_1"]);
    }

    #[test]
    fn fragment_scans_match_normalized_substrings() {
        let h = headers(&["Yurtdisi_gider", "Yurtdışı Gider Açıklama", "Fatura_miktari"]);
        let any = columns_containing_any(&h, &["yurtdisigider"]);
        assert_eq!(any.len(), 2);
        let all = columns_containing(&h, &["gider", "aciklama"]);
        assert_eq!(all, vec!["Yurtdışı Gider Açıklama"]);
    }
}
