use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// One specimen accession in the registry.
///
/// Either `lab_number` or `im_lab_number` is always present; both act as
/// lookup keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub report_date: Option<NaiveDate>,
    pub lab_number: Option<String>,
    pub im_lab_number: Option<String>,
    pub name: Option<String>,
    pub hkid: Option<String>,
    pub dob: Option<NaiveDate>,
    pub sex: Option<String>,
    pub age: Option<String>,
    pub ethnicity: Option<String>,
    pub specimen_collected: Option<NaiveDate>,
    pub specimen_arrived: Option<NaiveDate>,
    pub case_history: Option<String>,
    pub type_of_test: Option<String>,
    pub type_of_findings: Option<String>,
    pub variant_summary: Option<String>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub updated_at: Option<NaiveDateTime>,
}

impl PatientRecord {
    /// The key used in logs and file names: lab number first, IM number otherwise.
    pub fn primary_key(&self) -> Option<&str> {
        self.lab_number
            .as_deref()
            .or(self.im_lab_number.as_deref())
    }

    pub fn has_key(&self) -> bool {
        self.primary_key().is_some()
    }
}

/// Aggregate counts over the patients table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientStats {
    pub total: i64,
    pub unique_lab_numbers: i64,
    pub unique_im_lab_numbers: i64,
    pub with_findings: i64,
}
