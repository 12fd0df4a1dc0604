use chrono::NaiveDate;
use printpdf::*;
use serde::Serialize;
use std::io::BufWriter;

use super::{wrap_text, ReportError};
use crate::models::{PatientRecord, VariantFinding};

const DISPLAY_DATE: &str = "%d/%m/%Y";
const ASSEMBLY: &str = "GRCh38";
const PAGE_WIDTH: Mm = Mm(210.0);
const PAGE_HEIGHT: Mm = Mm(297.0);
const TOP: Mm = Mm(280.0);
const BOTTOM: Mm = Mm(20.0);
const LEFT: Mm = Mm(20.0);
const VALUE_X: Mm = Mm(75.0);
const WRAP_WIDTH: usize = 90;
const VALUE_WRAP_WIDTH: usize = 60;

/// Printable fields of one finding, in report order.
#[derive(Debug, Clone, Serialize)]
pub struct GeneBlock {
    pub rows: Vec<(&'static str, String)>,
}

/// Display-ready view of a patient and their findings.
#[derive(Debug, Clone, Serialize)]
pub struct PatientReport {
    pub report_date: String,
    pub info: Vec<(&'static str, String)>,
    pub genes: Vec<GeneBlock>,
    pub summary: String,
}

fn display_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format(DISPLAY_DATE).to_string())
        .unwrap_or_default()
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn join_present(parts: &[&Option<String>], sep: &str) -> String {
    parts
        .iter()
        .filter_map(|p| p.as_deref())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

impl GeneBlock {
    fn from_finding(finding: &VariantFinding) -> Self {
        let variant = join_present(&[&finding.hgvs_c, &finding.hgvs_p], " ");
        Self {
            rows: vec![
                ("Gene name / OMIM", join_present(&[&finding.gene, &finding.omim], " / ")),
                ("Transcript / Variant in HGVS Nomenclature", variant),
                ("Exon Location", text(&finding.exon)),
                ("Genotype / Zygosity", text(&finding.zygosity)),
                ("Inheritance", text(&finding.inheritance)),
                ("Parent origin", text(&finding.parent_origin)),
                ("Classification", text(&finding.classification)),
                ("Position", text(&finding.chr_pos)),
                ("REF / ALT", text(&finding.ref_alt)),
                ("Assembly", ASSEMBLY.to_string()),
                ("SNP Identifier", text(&finding.snp_id)),
                ("Phenotype", text(&finding.phenotype)),
            ],
        }
    }
}

impl PatientReport {
    /// `today` stands in for the report date when the record carries none.
    pub fn from_record(record: &PatientRecord, findings: &[VariantFinding], today: NaiveDate) -> Self {
        let lab = join_present(&[&record.im_lab_number, &record.lab_number], "/");
        Self {
            report_date: display_date(record.report_date.or(Some(today))),
            info: vec![
                ("Lab. #", lab),
                ("Name", text(&record.name)),
                ("HKID", text(&record.hkid)),
                ("Date of Birth", display_date(record.dob)),
                ("Sex", text(&record.sex)),
                ("Age", text(&record.age)),
                ("Ethnicity", text(&record.ethnicity)),
                ("Specimen Collected", display_date(record.specimen_collected)),
                ("Specimen Arrived", display_date(record.specimen_arrived)),
            ],
            genes: findings.iter().map(GeneBlock::from_finding).collect(),
            summary: text(&record.variant_summary),
        }
    }

    /// Render the report to A4 PDF bytes.
    pub fn render_pdf(&self) -> Result<Vec<u8>, ReportError> {
        let (doc, page1, layer1) =
            PdfDocument::new("Patient Information", PAGE_WIDTH, PAGE_HEIGHT, "Layer 1");
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ReportError::Render(format!("PDF font error: {e}")))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ReportError::Render(format!("PDF font error: {e}")))?;
        let mono = doc
            .add_builtin_font(BuiltinFont::Courier)
            .map_err(|e| ReportError::Render(format!("PDF font error: {e}")))?;

        let mut page = PageCursor {
            doc: &doc,
            layer: doc.get_page(page1).get_layer(layer1),
            y: TOP,
        };

        page.text(&format!("REPORT DATE: {}", self.report_date), 14.0, &bold, Mm(10.0));

        for (label, value) in &self.info {
            page.field(label, value, &bold, &font);
        }

        page.skip(Mm(2.0));
        page.text(&"-".repeat(80), 8.0, &mono, Mm(8.0));

        for (index, gene) in self.genes.iter().enumerate() {
            page.text(&format!("Finding {}", index + 1), 11.0, &bold, Mm(6.0));
            for (label, value) in &gene.rows {
                page.field(label, value, &bold, &font);
            }
            page.skip(Mm(4.0));
        }

        page.text("Summary", 11.0, &bold, Mm(6.0));
        let summary = if self.summary.is_empty() {
            "No reportable variant recorded."
        } else {
            self.summary.as_str()
        };
        for line in wrap_text(summary, WRAP_WIDTH) {
            page.text(&line, 10.0, &font, Mm(5.0));
        }

        let mut buf = BufWriter::new(Vec::new());
        doc.save(&mut buf)
            .map_err(|e| ReportError::Render(format!("PDF save error: {e}")))?;
        buf.into_inner()
            .map_err(|e| ReportError::Render(format!("PDF buffer error: {e}")))
    }
}

/// Writes lines top to bottom, starting a new page at the bottom margin.
struct PageCursor<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: Mm,
}

impl PageCursor<'_> {
    fn ensure_room(&mut self, needed: Mm) {
        if self.y - needed < BOTTOM {
            let (page, layer) = self.doc.add_page(PAGE_WIDTH, PAGE_HEIGHT, "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = TOP;
        }
    }

    fn skip(&mut self, by: Mm) {
        self.y -= by;
    }

    fn text(&mut self, line: &str, size: f32, font: &IndirectFontRef, step: Mm) {
        self.ensure_room(step);
        self.layer.use_text(line, size, LEFT, self.y, font);
        self.y -= step;
    }

    /// `label:` in bold with the value wrapped in a second column.
    fn field(&mut self, label: &str, value: &str, bold: &IndirectFontRef, font: &IndirectFontRef) {
        let lines = wrap_text(value, VALUE_WRAP_WIDTH);
        self.ensure_room(Mm(5.0 * lines.len() as f32));
        self.layer.use_text(format!("{label}:"), 9.0, LEFT, self.y, bold);
        for line in lines {
            self.ensure_room(Mm(5.0));
            self.layer.use_text(line, 9.0, VALUE_X, self.y, font);
            self.y -= Mm(5.0);
        }
    }
}
