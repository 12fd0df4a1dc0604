//! Reportable-variant scan and summary sentence generation.
//!
//! Curators mark rows of a variant review export with a one-letter code in
//! the "Reportable Variant" column. Each marked row becomes a
//! `VariantFinding` carrying one generated sentence.

use super::columns::{ColumnMap, VariantField};
use super::row::{clean_text, is_missing};
use crate::models::enums::{FindingClass, TemplateKind};
use crate::models::VariantFinding;
use crate::pipeline::import::{CellValue, Grid};

pub const REPORTABLE_MARKER: &str = "Reportable Variant";

/// Outcome of reading one "Reportable Variant" cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Blank,
    Class(FindingClass),
    Unrecognized(String),
}

/// `A`, `c`, `I - inconclusive` and similar match; `Affected` does not.
pub fn parse_marker(raw: &str) -> Marker {
    let text = raw.trim();
    if is_missing(text) {
        return Marker::Blank;
    }
    let upper = text.to_uppercase();
    let mut chars = upper.chars();
    let class = match chars.next() {
        Some('A') => FindingClass::Affected,
        Some('C') => FindingClass::Carrier,
        Some('I') => FindingClass::Inconclusive,
        Some('N') => FindingClass::NotSignificant,
        _ => return Marker::Unrecognized(text.to_string()),
    };
    match chars.next() {
        None => Marker::Class(class),
        Some(c) if !c.is_alphabetic() => Marker::Class(class),
        Some(_) => Marker::Unrecognized(text.to_string()),
    }
}

pub fn canned_phrase(class: FindingClass) -> &'static str {
    match class {
        FindingClass::Affected => {
            "This variant is classified as pathogenic and is consistent with the patient's clinical presentation."
        }
        FindingClass::Carrier => {
            "This finding indicates carrier status for an autosomal recessive condition and is not expected to cause disease on its own."
        }
        FindingClass::Inconclusive => {
            "The clinical significance of this variant is uncertain; further evaluation, including segregation studies, may be informative."
        }
        FindingClass::NotSignificant => {
            "This variant is not considered to be of clinical significance for the indication tested."
        }
    }
}

fn phrase_for(finding: &VariantFinding) -> String {
    let phrase = canned_phrase(finding.reportable_class);
    match (&finding.reportable_class, finding.phenotype.as_deref()) {
        (FindingClass::Affected, Some(phenotype)) => {
            let stem = phrase.trim_end_matches('.');
            format!("{stem} of {phenotype}.")
        }
        _ => phrase.to_string(),
    }
}

/// One sentence describing the variant followed by the class phrase.
/// Absent parts are left out rather than rendered as blanks.
pub fn summary_sentence(finding: &VariantFinding) -> String {
    let zygosity = finding
        .zygosity
        .as_deref()
        .map(|z| format!("{} ", z.to_lowercase()))
        .unwrap_or_default();

    let hgvs = match (finding.hgvs_c.as_deref(), finding.hgvs_p.as_deref()) {
        (Some(c), Some(p)) => format!(", {c} ({p}),"),
        (Some(c), None) => format!(", {c},"),
        (None, Some(p)) => format!(", {p},"),
        (None, None) => String::new(),
    };

    let gene = finding
        .gene
        .as_deref()
        .map(|g| format!(" in the {g} gene"))
        .unwrap_or_default();

    let exon = finding
        .exon
        .as_deref()
        .map(|e| {
            let number = e
                .strip_prefix("exon")
                .or_else(|| e.strip_prefix("Exon"))
                .unwrap_or(e)
                .trim();
            format!(" (exon {number})")
        })
        .unwrap_or_default();

    format!(
        "A {zygosity}variant{hgvs} was detected{gene}{exon}. {}",
        phrase_for(finding)
    )
}

/// Highest-priority class among findings: A > C > I > N.
pub fn headline_class(findings: &[VariantFinding]) -> Option<FindingClass> {
    findings
        .iter()
        .map(|f| f.reportable_class)
        .max_by_key(FindingClass::priority)
}

/// Sentences of every finding, headline class first, in sheet order otherwise.
pub fn combined_summary(findings: &[VariantFinding]) -> String {
    let mut ordered: Vec<&VariantFinding> = findings.iter().collect();
    ordered.sort_by_key(|f| std::cmp::Reverse(f.reportable_class.priority()));
    ordered
        .iter()
        .map(|f| f.summary.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a parental genotype cell shows the alternate allele.
fn carries_variant(genotype: &str) -> Option<bool> {
    let g = genotype.trim().to_lowercase();
    if is_missing(&g) || g == "./." || g == ".|." || g == "." {
        return None;
    }
    match g.as_str() {
        "het" | "hom" | "hemi" | "heterozygous" | "homozygous" | "hemizygous" | "yes" | "present"
        | "detected" => return Some(true),
        "ref" | "wt" | "wild type" | "wildtype" | "no" | "absent" | "not detected" => {
            return Some(false)
        }
        _ => {}
    }
    let alleles: Vec<&str> = g.split(['/', '|']).collect();
    if alleles.len() == 2 && alleles.iter().all(|a| a.parse::<u32>().is_ok()) {
        return Some(alleles.iter().any(|a| *a != "0"));
    }
    None
}

/// Parent of origin from the two parental genotype cells of a trio.
pub fn parent_origin(mother: Option<&str>, father: Option<&str>) -> Option<String> {
    let mother = carries_variant(mother?)?;
    let father = carries_variant(father?)?;
    let origin = match (mother, father) {
        (true, false) => "Maternal",
        (false, true) => "Paternal",
        (true, true) => "Biparental",
        (false, false) => "De novo",
    };
    Some(origin.to_string())
}

/// Findings and warnings collected from a review sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewScan {
    pub findings: Vec<VariantFinding>,
    pub warnings: Vec<String>,
    pub rows_scanned: usize,
}

fn first_text(row: &[CellValue], columns: &[usize]) -> Option<String> {
    columns
        .iter()
        .filter_map(|col| row.get(*col))
        .find_map(clean_text)
}

/// Walk the data rows below `header_row` and build one finding per marked row.
pub fn scan_review(
    grid: &Grid,
    header_row: usize,
    map: &ColumnMap<VariantField>,
    kind: TemplateKind,
) -> ReviewScan {
    let mut scan = ReviewScan::default();
    let marker_columns = map.all(VariantField::ReportableVariant);

    for (index, row) in grid.rows().iter().enumerate().skip(header_row + 1) {
        let row_number = index + 1;
        scan.rows_scanned += 1;

        let raw = first_text(row, marker_columns).unwrap_or_default();
        let class = match parse_marker(&raw) {
            Marker::Blank => continue,
            Marker::Class(class) => class,
            Marker::Unrecognized(value) => {
                scan.warnings.push(format!(
                    "Row {row_number}: unrecognized {REPORTABLE_MARKER} value '{value}'"
                ));
                continue;
            }
        };

        let field = |f: VariantField| first_text(row, map.all(f));
        let mut finding = VariantFinding::new(class, row_number);
        finding.gene = field(VariantField::Gene);
        finding.omim = field(VariantField::Omim);
        finding.hgvs_c = field(VariantField::HgvsC);
        finding.hgvs_p = field(VariantField::HgvsP);
        finding.exon = field(VariantField::Exon);
        finding.zygosity = field(VariantField::Zygosity);
        finding.inheritance = field(VariantField::Inheritance);
        finding.classification =
            field(VariantField::Classification).or_else(|| field(VariantField::SecondReview));
        finding.chr_pos = field(VariantField::ChrPos);
        finding.ref_alt = field(VariantField::RefAlt);
        finding.snp_id = field(VariantField::SnpId);
        finding.phenotype = field(VariantField::Phenotype).or_else(|| field(VariantField::Title));
        if kind == TemplateKind::Trio {
            finding.parent_origin = parent_origin(
                field(VariantField::MotherGenotype).as_deref(),
                field(VariantField::FatherGenotype).as_deref(),
            );
        }
        finding.summary = summary_sentence(&finding);
        scan.findings.push(finding);
    }

    scan
}
