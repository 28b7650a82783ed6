//! A4 PDF layout for [`ReportDocument`].

use std::io::BufWriter;

use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
};

use crate::document::{ReportDocument, BRAND, DISCLAIMER};
use crate::ReportError;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const TOP: f32 = 280.0;
const BOTTOM: f32 = 20.0;
const LEFT: f32 = 20.0;
const INDENT: f32 = 25.0;
const WRAP_CHARS: usize = 90;

/// Render `doc` to PDF bytes.
pub fn render_pdf(doc: &ReportDocument) -> Result<Vec<u8>, ReportError> {
    let (pdf, page, layer) = PdfDocument::new(
        format!("{BRAND} {}", doc.title),
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Layer 1",
    );
    let regular = pdf
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ReportError::Pdf(format!("font error: {e}")))?;
    let bold = pdf
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ReportError::Pdf(format!("font error: {e}")))?;

    {
        let mut w = PageWriter {
            layer: pdf.get_page(page).get_layer(layer),
            pdf: &pdf,
            y: TOP,
            regular,
            bold,
        };
        write_body(&mut w, doc);
    }

    let mut buf = BufWriter::new(Vec::new());
    pdf.save(&mut buf)
        .map_err(|e| ReportError::Pdf(format!("save error: {e}")))?;
    buf.into_inner()
        .map_err(|e| ReportError::Pdf(format!("buffer error: {e}")))
}

fn write_body(w: &mut PageWriter<'_>, doc: &ReportDocument) {
    w.text(BRAND, 16.0, LEFT, true, 7.0);
    w.text(doc.title.as_str(), 10.0, LEFT, false, 5.0);
    w.text(
        &format!("DATE: {}", doc.generated_at.format("%b %d, %Y")),
        9.0,
        LEFT,
        false,
        5.0,
    );
    if let Some(session) = doc.batch_session_id {
        w.text(&format!("SESSION: {session}"), 9.0, LEFT, false, 5.0);
    }
    w.gap(4.0);

    w.heading("PATIENT & PHYSICIAN DETAILS");
    let p = &doc.patient;
    let d = &doc.physician;
    w.field("Patient Name", &p.display_name());
    w.field("Medical ID", &p.display_medical_id());
    w.field("Age / Gender", &p.display_age_gender());
    w.field("Contact", p.display_contact());
    w.field("Physician", &d.display_name());
    w.field("Hospital", d.display_hospital());
    w.field("Email", &d.email);

    if let Some(summary) = &doc.summary {
        w.heading("ANALYSIS SUMMARY");
        w.field("Total Images", &summary.total_images.to_string());
        w.field(
            "Avg Confidence",
            &format!("{:.1}%", summary.average_confidence_percent),
        );
    }

    if !doc.findings.is_empty() {
        w.heading("DETAILED FINDINGS");
        w.row(&["IMAGE ID", "CLASSIFICATION", "CONFIDENCE"], true);
        for f in &doc.findings {
            w.row(
                &[
                    &f.image_id,
                    &f.class_name,
                    &format!("{:.1}%", f.confidence_percent),
                ],
                false,
            );
        }
    }

    if !doc.history.is_empty() {
        w.heading("DIAGNOSIS HISTORY");
        w.row(&["DATE & TIME", "FINDINGS"], true);
        for entry in &doc.history {
            w.row(&[&entry.label, &entry.findings.join(", ")], false);
        }
    }

    if let Some(conclusion) = &doc.conclusion {
        w.heading("FINAL CONCLUSION");
        w.paragraph(&conclusion.text, true);
    }

    if !doc.clinical_observations.is_empty() {
        w.heading("CLINICAL OBSERVATIONS");
        for note in &doc.clinical_observations {
            w.paragraph(note, false);
            w.gap(2.0);
        }
    }

    w.gap(8.0);
    w.paragraph(&doc.footer, false);
    w.paragraph(DISCLAIMER, false);
}

/// Cursor over the current page; starts a new page when the next line
/// would cross the bottom margin.
struct PageWriter<'a> {
    pdf: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

impl PageWriter<'_> {
    fn ensure(&mut self, height: f32) {
        if self.y - height < BOTTOM {
            let (page, layer) = self.pdf.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.pdf.get_page(page).get_layer(layer);
            self.y = TOP;
        }
    }

    fn text(&mut self, text: &str, size: f32, x: f32, bold: bool, advance: f32) {
        self.ensure(advance);
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.use_text(text, size, Mm(x), Mm(self.y), font);
        self.y -= advance;
    }

    fn gap(&mut self, height: f32) {
        self.y -= height;
    }

    fn heading(&mut self, title: &str) {
        self.gap(4.0);
        self.text(title, 11.0, LEFT, true, 7.0);
    }

    fn field(&mut self, label: &str, value: &str) {
        self.ensure(5.0);
        self.layer
            .use_text(label, 9.0, Mm(INDENT), Mm(self.y), &self.bold);
        self.layer
            .use_text(value, 10.0, Mm(INDENT + 40.0), Mm(self.y), &self.regular);
        self.y -= 5.0;
    }

    fn row(&mut self, cells: &[&str], header: bool) {
        self.ensure(5.0);
        let font = if header { &self.bold } else { &self.regular };
        for (i, cell) in cells.iter().enumerate() {
            let x = INDENT + 55.0 * i as f32;
            self.layer.use_text(*cell, 9.0, Mm(x), Mm(self.y), font);
        }
        self.y -= 5.0;
    }

    fn paragraph(&mut self, text: &str, bold: bool) {
        for line in wrap_text(text, WRAP_CHARS) {
            self.text(&line, 9.0, INDENT, bold, 4.5);
        }
    }
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_respects_width() {
        let lines = wrap_text("alpha beta gamma delta", 11);
        assert_eq!(lines, vec!["alpha beta", "gamma delta"]);
        assert!(wrap_text("   ", 10).is_empty());
    }

    #[test]
    fn long_word_kept_whole() {
        let lines = wrap_text("a supercalifragilistic b", 5);
        assert_eq!(lines, vec!["a", "supercalifragilistic", "b"]);
    }
}
