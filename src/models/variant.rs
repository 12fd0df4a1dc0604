use serde::{Deserialize, Serialize};

use super::enums::FindingClass;

/// A curated, reportable variant attached to a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantFinding {
    pub gene: Option<String>,
    pub omim: Option<String>,
    pub hgvs_c: Option<String>,
    pub hgvs_p: Option<String>,
    pub exon: Option<String>,
    pub zygosity: Option<String>,
    pub inheritance: Option<String>,
    pub parent_origin: Option<String>,
    pub classification: Option<String>,
    pub chr_pos: Option<String>,
    pub ref_alt: Option<String>,
    pub snp_id: Option<String>,
    pub phenotype: Option<String>,
    pub reportable_class: FindingClass,
    pub summary: String,
    /// 1-based row in the source spreadsheet.
    pub source_row: usize,
}

impl VariantFinding {
    pub fn new(reportable_class: FindingClass, source_row: usize) -> Self {
        Self {
            gene: None,
            omim: None,
            hgvs_c: None,
            hgvs_p: None,
            exon: None,
            zygosity: None,
            inheritance: None,
            parent_origin: None,
            classification: None,
            chr_pos: None,
            ref_alt: None,
            snp_id: None,
            phenotype: None,
            reportable_class,
            summary: String::new(),
            source_row,
        }
    }
}
