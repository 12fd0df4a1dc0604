//! Header location and alias → canonical field mapping.
//!
//! Exports from the sequencing platform drift: headers gain or lose
//! punctuation, a group-title row sometimes sits above the real header row,
//! and pandas round-trips leave `Unnamed: N` placeholders behind. Matching is
//! done on a normalized `header_key` against fixed alias tables.

use std::collections::HashMap;
use std::hash::Hash;

use crate::models::enums::TemplateKind;
use crate::pipeline::import::{Grid, ImportError};

/// Rows scanned from the top of the sheet when looking for the header row.
pub const HEADER_SCAN_LIMIT: usize = 5;

/// Minimum alias hits for a row to count as the header row.
const MIN_HEADER_HITS: usize = 2;

/// Normalize a raw header for alias matching: lowercase, `.` → space,
/// collapsed whitespace.
pub fn header_key(raw: &str) -> String {
    raw.to_lowercase()
        .replace('.', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_placeholder_header(key: &str) -> bool {
    if key.is_empty() {
        return true;
    }
    match key.strip_prefix("unnamed:") {
        Some(rest) => rest.trim().chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// Canonical patient-list fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatientField {
    ReportDate,
    LabNumber,
    ImLabNumber,
    Name,
    Hkid,
    Dob,
    SexAge,
    Sex,
    Age,
    Ethnicity,
    SpecimenCollected,
    SpecimenArrived,
    CaseHistory,
    TypeOfTest,
    TypeOfFindings,
}

/// Canonical variant-review fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantField {
    ReportableVariant,
    Gene,
    Omim,
    HgvsC,
    HgvsP,
    Exon,
    Zygosity,
    Inheritance,
    Classification,
    ChrPos,
    RefAlt,
    SnpId,
    Phenotype,
    Title,
    FirstReview,
    SecondReview,
    SpecialRemarks,
    MotherGenotype,
    FatherGenotype,
}

/// Ordered alias table. A header maps to the first rule whose aliases
/// contain its key; `contains` rules match any header containing the token.
#[derive(Debug, Clone)]
pub struct ColumnRules<F: 'static> {
    exact: &'static [(F, &'static [&'static str])],
    contains: Vec<(F, &'static str)>,
}

impl<F: Copy + Eq + Hash> ColumnRules<F> {
    fn classify(&self, key: &str) -> Option<F> {
        self.exact
            .iter()
            .find(|(_, aliases)| aliases.contains(&key))
            .map(|(field, _)| *field)
            .or_else(|| {
                self.contains
                    .iter()
                    .find(|(_, token)| key.contains(token))
                    .map(|(field, _)| *field)
            })
    }

    fn hits(&self, headers: &[String]) -> usize {
        headers
            .iter()
            .filter(|h| self.classify(&header_key(h)).is_some())
            .count()
    }
}

const PATIENT_ALIASES: &[(PatientField, &[&str])] = &[
    (
        PatientField::ReportDate,
        &[
            "reported date",
            "report date",
            "singe gene reported date",
            "single gene reported date",
        ],
    ),
    (PatientField::LabNumber, &["lab no", "lab number", "lab #"]),
    (
        PatientField::ImLabNumber,
        &["im lab no", "im lab number", "im lab #", "im no"],
    ),
    (PatientField::Name, &["patient name", "name"]),
    (PatientField::Hkid, &["hkid", "hkid no"]),
    (PatientField::Dob, &["dob", "date of birth"]),
    (PatientField::SexAge, &["sex/age", "sex / age"]),
    (PatientField::Sex, &["sex", "gender"]),
    (PatientField::Age, &["age"]),
    (PatientField::Ethnicity, &["ethnicity"]),
    (
        PatientField::SpecimenCollected,
        &["sample collection date", "specimen collected", "collection date"],
    ),
    (
        PatientField::SpecimenArrived,
        &["sample receive date", "sample received date", "specimen arrived"],
    ),
    (
        PatientField::CaseHistory,
        &["case", "case history", "clinical history"],
    ),
    (PatientField::TypeOfTest, &["type of test", "test type"]),
    (PatientField::TypeOfFindings, &["type of findings", "findings"]),
];

const VARIANT_ALIASES: &[(VariantField, &[&str])] = &[
    (VariantField::ReportableVariant, &["reportable variant"]),
    (VariantField::Gene, &["gene names", "gene name", "gene", "genes"]),
    (VariantField::Omim, &["omim", "omim id", "gene omim"]),
    (
        VariantField::HgvsC,
        &["hgvs c (clinically relevant)", "hgvs c", "hgvsc", "transcript variant"],
    ),
    (
        VariantField::HgvsP,
        &["hgvs p (clinically relevant)", "hgvs p", "hgvsp"],
    ),
    (
        VariantField::Exon,
        &["exon number (clinically relevant)", "exon number", "exon"],
    ),
    (
        VariantField::Zygosity,
        &["zygosity", "zyogosity", "genotype/zygosity"],
    ),
    (VariantField::Inheritance, &["inheritance", "mode of inheritance"]),
    (
        VariantField::Classification,
        &["classification", "acmg classification", "clinical significance"],
    ),
    (VariantField::ChrPos, &["chr:pos", "position", "chr pos"]),
    (VariantField::RefAlt, &["ref/alt", "ref alt"]),
    (
        VariantField::SnpId,
        &["snp identifier", "dbsnp", "dbsnp id", "rsid", "rs id"],
    ),
    (VariantField::Phenotype, &["phenotype", "phenotypes"]),
    (VariantField::Title, &["title"]),
    (VariantField::FirstReview, &["first review and comment"]),
    (
        VariantField::SecondReview,
        &["second review and comment on reportable variant"],
    ),
    (VariantField::SpecialRemarks, &["special remarks"]),
];

impl ColumnRules<PatientField> {
    pub fn patient() -> Self {
        Self {
            exact: PATIENT_ALIASES,
            contains: Vec::new(),
        }
    }
}

impl ColumnRules<VariantField> {
    /// Variant rules; trio templates also map the parental genotype columns.
    pub fn variant(kind: TemplateKind) -> Self {
        let contains = match kind {
            TemplateKind::Trio => vec![
                (VariantField::MotherGenotype, "mother"),
                (VariantField::FatherGenotype, "father"),
            ],
            TemplateKind::Singleton => Vec::new(),
        };
        Self {
            exact: VARIANT_ALIASES,
            contains,
        }
    }
}

impl TemplateKind {
    /// `Trio` iff some header mentions the mother and some header mentions
    /// the father.
    pub fn detect<S: AsRef<str>>(headers: &[S]) -> Self {
        let lower: Vec<String> = headers.iter().map(|h| h.as_ref().to_lowercase()).collect();
        let has_mother = lower.iter().any(|h| h.contains("mother"));
        let has_father = lower.iter().any(|h| h.contains("father"));
        if has_mother && has_father {
            Self::Trio
        } else {
            Self::Singleton
        }
    }
}

/// Find the header row among the first `scan_limit` rows: the row with the
/// most alias hits, earliest on ties, at least two hits.
pub fn locate_header_row<F: Copy + Eq + Hash>(
    grid: &Grid,
    rules: &ColumnRules<F>,
    scan_limit: usize,
) -> Result<usize, ImportError> {
    let scanned = scan_limit.min(grid.height());
    let mut best: Option<(usize, usize)> = None;
    for index in 0..scanned {
        let hits = rules.hits(&grid.row_text(index));
        if hits >= MIN_HEADER_HITS && best.map_or(true, |(_, h)| hits > h) {
            best = Some((index, hits));
        }
    }
    best.map(|(index, _)| index)
        .ok_or(ImportError::HeaderNotFound { scanned })
}

/// Column positions of each canonical field found in a header row.
#[derive(Debug, Clone)]
pub struct ColumnMap<F> {
    columns: HashMap<F, Vec<usize>>,
    pub unmapped: Vec<String>,
}

impl<F: Copy + Eq + Hash> ColumnMap<F> {
    pub fn build<S: AsRef<str>>(headers: &[S], rules: &ColumnRules<F>) -> Self {
        let mut columns: HashMap<F, Vec<usize>> = HashMap::new();
        let mut unmapped = Vec::new();
        for (index, raw) in headers.iter().enumerate() {
            let key = header_key(raw.as_ref());
            if is_placeholder_header(&key) {
                continue;
            }
            match rules.classify(&key) {
                Some(field) => columns.entry(field).or_default().push(index),
                None => unmapped.push(raw.as_ref().trim().to_string()),
            }
        }
        Self { columns, unmapped }
    }

    /// First column mapped to `field`.
    pub fn get(&self, field: F) -> Option<usize> {
        self.columns.get(&field).and_then(|c| c.first().copied())
    }

    /// Every column mapped to `field`, left to right.
    pub fn all(&self, field: F) -> &[usize] {
        self.columns.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, field: F) -> bool {
        self.columns.contains_key(&field)
    }

    /// Ok when at least one of `fields` is mapped; otherwise the missing
    /// labels are reported.
    pub fn require_any(&self, fields: &[(F, &str)]) -> Result<(), ImportError> {
        if fields.iter().any(|(f, _)| self.contains(*f)) {
            return Ok(());
        }
        Err(ImportError::MissingColumns(
            fields.iter().map(|(_, label)| label.to_string()).collect(),
        ))
    }
}
