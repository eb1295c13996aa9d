//! PDF layout engine for the facture document.
//!
//! Renders a fixed single-page A4 layout, top to bottom: branded header
//! bar, patient/invoice metadata block, line-items table, totals band,
//! optional notes, QR/legal footer and a closing copyright bar. Row
//! heights shrink as the line count grows so any invoice fits on one page.

use chrono::{DateTime, NaiveDate, Utc};
use clinic_core::error::AppError;
use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Line, Mm, PdfDocument,
    PdfLayerReference, Point, Rect, Rgb,
};
use rust_decimal::Decimal;
use std::io::BufWriter;

use crate::models::{Invoice, InvoiceLine, InvoiceStatus, Patient, Tenant};

// Page geometry (mm).
const PAGE_W: f32 = 210.0;
const MARGIN_X: f32 = 15.0;
const CONTENT_RIGHT: f32 = PAGE_W - MARGIN_X;

const HEADER_H: f32 = 26.0;
const TABLE_TOP: f32 = 236.0;
const TABLE_HEADER_H: f32 = 8.0;
const TOTALS_H: f32 = 14.0;
const NOTES_H: f32 = 20.0;
const FOOTER_QR_H: f32 = 34.0;
const COPYRIGHT_H: f32 = 10.0;

// Column anchors (mm): description is left-aligned, the numeric columns
// are right-aligned.
const COL_DESCRIPTION_X: f32 = 17.0;
const COL_QTY_RIGHT: f32 = 130.0;
const COL_UNIT_PRICE_RIGHT: f32 = 163.0;
const COL_AMOUNT_RIGHT: f32 = 193.0;

const QR_SIZE_MM: f32 = 28.0;
const QR_DPI: f32 = 300.0;

const PT_PER_MM: f32 = 72.0 / 25.4;
const MM_PER_PT: f32 = 25.4 / 72.0;

// Row height adaptation: floor(remaining/lines) minus a breathing margin,
// capped at 30 pt. This is what keeps large invoices on a single page.
const ROW_MAX_PT: f32 = 30.0;
const ROW_MARGIN_PT: f32 = 4.0;

pub struct RenderContext<'a> {
    pub invoice: &'a Invoice,
    pub lines: &'a [InvoiceLine],
    pub tenant: &'a Tenant,
    pub patient: Option<&'a Patient>,
    pub qr_png: &'a [u8],
    pub generated_at: DateTime<Utc>,
}

/// Per-row height in points for the line table, as a function of the
/// vertical space left on the page and the number of lines to place.
fn row_height_pt(remaining_pt: f32, line_count: usize) -> f32 {
    ((remaining_pt / line_count as f32).floor() - ROW_MARGIN_PT).min(ROW_MAX_PT)
}

/// French money rendering: space-grouped thousands, comma decimals and a
/// fixed currency suffix (e.g. "1 234,56 EUR").
pub fn format_eur(amount: Decimal) -> String {
    let rendered = format!("{:.2}", amount);
    let (negative, digits) = match rendered.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, rendered.as_str()),
    };
    let (int_part, dec_part) = digits.split_once('.').unwrap_or((digits, "00"));

    let mut grouped = String::new();
    let chars: Vec<char> = int_part.chars().collect();
    let mut count = 0;
    for i in (0..chars.len()).rev() {
        if count == 3 {
            grouped.push(' ');
            count = 0;
        }
        grouped.push(chars[i]);
        count += 1;
    }
    let int_with_sep: String = grouped.chars().rev().collect();

    format!(
        "{}{},{} EUR",
        if negative { "-" } else { "" },
        int_with_sep,
        dec_part
    )
}

/// Quantity rendering: decimal comma, trailing zeros trimmed.
fn format_qty(quantity: Decimal) -> String {
    quantity.normalize().to_string().replace('.', ",")
}

/// Percentage rendering for the small-print rate annotations.
fn format_rate(rate: Decimal) -> String {
    format!("{}%", rate.normalize().to_string().replace('.', ","))
}

fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

fn format_datetime(instant: DateTime<Utc>) -> String {
    instant.format("%d/%m/%Y %H:%M").to_string()
}

fn text(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    content: &str,
    font_size: f32,
    x: f32,
    y: f32,
) {
    layer.use_text(content, font_size, Mm(x), Mm(y), font);
}

fn text_right(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    content: &str,
    font_size: f32,
    x_right: f32,
    y: f32,
) {
    // printpdf doesn't expose reliable text metrics; use a pragmatic
    // estimate that matches Helvetica closely enough for numeric columns.
    let width_est = (content.chars().count() as f32) * font_size * 0.18;
    let x = (x_right - width_est).max(0.0);
    text(layer, font, content, font_size, x, y);
}

fn text_centered(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    content: &str,
    font_size: f32,
    y: f32,
) {
    let width_est = (content.chars().count() as f32) * font_size * 0.18;
    let x = ((PAGE_W - width_est) / 2.0).max(0.0);
    text(layer, font, content, font_size, x, y);
}

fn draw_rule(layer: &PdfLayerReference, x1: f32, x2: f32, y: f32, thickness: f32) {
    layer.set_outline_thickness(thickness);
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm(x1), Mm(y)), false),
            (Point::new(Mm(x2), Mm(y)), false),
        ],
        is_closed: false,
    });
}

fn fill_rect(layer: &PdfLayerReference, color: Color, x: f32, y_top: f32, w: f32, h: f32) {
    layer.set_fill_color(color);
    // printpdf uses bottom-left origin; our y coordinates are already in that space.
    let rect = Rect::new(Mm(x), Mm(y_top - h), Mm(x + w), Mm(y_top)).with_mode(PaintMode::Fill);
    layer.add_rect(rect);
}

fn black() -> Color {
    Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None))
}

fn white() -> Color {
    Color::Rgb(Rgb::new(1.0, 1.0, 1.0, None))
}

fn brand_blue() -> Color {
    Color::Rgb(Rgb::new(0.13, 0.32, 0.52, None))
}

fn light_gray() -> Color {
    Color::Rgb(Rgb::new(0.92, 0.92, 0.92, None))
}

fn dim_gray() -> Color {
    Color::Rgb(Rgb::new(0.45, 0.45, 0.45, None))
}

fn truncate_chars(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    let mut out: String = input.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// Simple word-wrap helper for the notes block.
fn wrap_text(input: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in input.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(current.clone());
            current.clear();
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

/// Render the single-page facture and serialize it to a byte buffer.
pub fn render_facture(ctx: &RenderContext<'_>) -> Result<Vec<u8>, AppError> {
    let title = format!("Facture {}", ctx.invoice.number);
    let (doc, page1, layer1) = PdfDocument::new(&title, Mm(210.0), Mm(297.0), "Layer 1");
    let layer = doc.get_page(page1).get_layer(layer1);

    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| AppError::RenderingError(anyhow::anyhow!("PDF font error: {}", e)))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| AppError::RenderingError(anyhow::anyhow!("PDF font error: {}", e)))?;

    // --- Header bar ---
    fill_rect(&layer, brand_blue(), 0.0, 297.0, PAGE_W, HEADER_H);
    layer.set_fill_color(white());
    text(&layer, &bold, &ctx.tenant.name, 15.0, MARGIN_X, 285.0);
    text_right(&layer, &bold, "FACTURE", 20.0, CONTENT_RIGHT, 284.0);
    text_right(
        &layer,
        &font,
        &format!("N° {}", ctx.invoice.number),
        8.0,
        CONTENT_RIGHT,
        277.0,
    );
    text_right(
        &layer,
        &font,
        &format!("générée le {}", format_datetime(ctx.generated_at)),
        8.0,
        CONTENT_RIGHT,
        273.5,
    );
    layer.set_fill_color(black());

    // --- Patient / invoice metadata block ---
    let mut y = 263.0;
    text(&layer, &bold, "Patient", 9.0, MARGIN_X, y);
    let patient_name = ctx
        .patient
        .map(|p| p.full_name())
        .unwrap_or_else(|| "-".to_string());
    text(&layer, &font, &patient_name, 10.0, MARGIN_X, y - 5.0);

    let mut address_y = y - 10.0;
    if let Some(address) = ctx.invoice.billing_address() {
        let mut address_lines = vec![address.line1.clone()];
        if let Some(line2) = address.line2 {
            address_lines.push(line2);
        }
        let locality = match (address.postal_code, address.city) {
            (Some(postal), Some(city)) => Some(format!("{} {}", postal, city)),
            (Some(postal), None) => Some(postal),
            (None, Some(city)) => Some(city),
            (None, None) => None,
        };
        if let Some(locality) = locality {
            address_lines.push(locality);
        }
        if let Some(country) = address.country {
            address_lines.push(country);
        }
        for line in address_lines {
            text(&layer, &font, &line, 8.0, MARGIN_X, address_y);
            address_y -= 4.0;
        }
    }

    let status = InvoiceStatus::from_string(&ctx.invoice.status);
    let meta_rows = [
        ("Date d'émission", format_date(ctx.invoice.issue_date)),
        ("Échéance", format_date(ctx.invoice.due_date)),
        ("Statut", status.label().to_string()),
    ];
    for (label, value) in meta_rows {
        text(&layer, &bold, label, 9.0, 120.0, y);
        text(&layer, &font, &value, 9.0, 155.0, y);
        y -= 5.0;
    }

    // --- Line-items table header ---
    fill_rect(
        &layer,
        light_gray(),
        MARGIN_X,
        TABLE_TOP,
        CONTENT_RIGHT - MARGIN_X,
        TABLE_HEADER_H,
    );
    layer.set_fill_color(black());
    let header_baseline = TABLE_TOP - 5.5;
    text(&layer, &bold, "Description", 8.5, COL_DESCRIPTION_X, header_baseline);
    text_right(&layer, &bold, "Qté", 8.5, COL_QTY_RIGHT, header_baseline);
    text_right(
        &layer,
        &bold,
        "Prix unitaire",
        8.5,
        COL_UNIT_PRICE_RIGHT,
        header_baseline,
    );
    text_right(&layer, &bold, "Montant", 8.5, COL_AMOUNT_RIGHT, header_baseline);

    layer.set_outline_color(black());
    draw_rule(&layer, MARGIN_X, CONTENT_RIGHT, TABLE_TOP - TABLE_HEADER_H, 0.6);

    // --- Line rows, adaptive height so every invoice stays on one page ---
    let notes = ctx
        .invoice
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|notes| !notes.is_empty());
    let notes_h = if notes.is_some() { NOTES_H } else { 0.0 };
    let reserved_bottom = COPYRIGHT_H + FOOTER_QR_H + notes_h + TOTALS_H;
    let available_mm = (TABLE_TOP - TABLE_HEADER_H) - reserved_bottom;

    let line_count = ctx.lines.len().max(1);
    let row_pt = row_height_pt(available_mm * PT_PER_MM, line_count);
    let row_mm = row_pt * MM_PER_PT;
    let body_size = (row_pt * 0.30).clamp(5.0, 9.0);
    let note_size = (body_size - 2.0).max(4.5);

    let mut row_top = TABLE_TOP - TABLE_HEADER_H;
    for line in ctx.lines {
        let baseline = row_top - row_mm * 0.62;
        text(
            &layer,
            &font,
            &truncate_chars(&line.description, 52),
            body_size,
            COL_DESCRIPTION_X,
            baseline,
        );
        text_right(
            &layer,
            &font,
            &format_qty(line.quantity),
            body_size,
            COL_QTY_RIGHT,
            baseline,
        );
        text_right(
            &layer,
            &font,
            &format_eur(line.unit_price),
            body_size,
            COL_UNIT_PRICE_RIGHT,
            baseline,
        );
        text_right(
            &layer,
            &font,
            &format_eur(line.amount),
            body_size,
            COL_AMOUNT_RIGHT,
            baseline,
        );

        // Small-print rate annotations when the line carries a third-party
        // share or tax.
        if !line.third_party_rate.is_zero() || !line.tax_rate.is_zero() {
            let mut parts = Vec::new();
            if !line.third_party_rate.is_zero() {
                parts.push(format!("Tiers payant {}", format_rate(line.third_party_rate)));
            }
            if !line.tax_rate.is_zero() {
                parts.push(format!("TVA {}", format_rate(line.tax_rate)));
            }
            layer.set_fill_color(dim_gray());
            text(
                &layer,
                &font,
                &parts.join(" · "),
                note_size,
                COL_DESCRIPTION_X + 2.0,
                row_top - row_mm * 0.92,
            );
            layer.set_fill_color(black());
        }

        layer.set_outline_color(light_gray());
        draw_rule(&layer, MARGIN_X, CONTENT_RIGHT, row_top - row_mm, 0.2);
        row_top -= row_mm;
    }

    // --- Totals band ---
    let totals_top = COPYRIGHT_H + FOOTER_QR_H + notes_h + TOTALS_H;
    layer.set_outline_color(black());
    draw_rule(&layer, MARGIN_X, CONTENT_RIGHT, totals_top, 0.8);
    let totals_baseline = totals_top - 8.0;
    text(&layer, &bold, "TOTAL", 11.0, 140.0, totals_baseline);
    text_right(
        &layer,
        &bold,
        &format_eur(ctx.invoice.total),
        11.0,
        COL_AMOUNT_RIGHT,
        totals_baseline,
    );

    // --- Notes block ---
    if let Some(notes) = notes {
        let notes_top = COPYRIGHT_H + FOOTER_QR_H + NOTES_H;
        text(&layer, &bold, "Notes", 9.0, MARGIN_X, notes_top - 4.0);
        let mut note_y = notes_top - 8.5;
        for line in wrap_text(notes, 100).into_iter().take(3) {
            text(&layer, &font, &line, 8.0, MARGIN_X, note_y);
            note_y -= 3.8;
        }
    }

    // --- QR + legal footer ---
    let footer_top = COPYRIGHT_H + FOOTER_QR_H;
    layer.set_outline_color(light_gray());
    draw_rule(&layer, MARGIN_X, CONTENT_RIGHT, footer_top, 0.3);

    let qr_img = printpdf::image_crate::load_from_memory(ctx.qr_png)
        .map_err(|e| AppError::RenderingError(anyhow::anyhow!("QR image decode failed: {}", e)))?;
    let natural_w_mm = (qr_img.width() as f32 / QR_DPI) * 25.4;
    let scale = QR_SIZE_MM / natural_w_mm.max(1.0);
    let qr_bottom = COPYRIGHT_H + 2.5;
    let image = Image::from_dynamic_image(&qr_img);
    image.add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(MARGIN_X)),
            translate_y: Some(Mm(qr_bottom)),
            rotate: None,
            scale_x: Some(scale),
            scale_y: Some(scale),
            dpi: Some(QR_DPI),
        },
    );

    let legal_x = MARGIN_X + QR_SIZE_MM + 6.0;
    layer.set_fill_color(black());
    text(&layer, &bold, &ctx.tenant.name, 8.0, legal_x, footer_top - 6.0);
    layer.set_fill_color(dim_gray());
    let legal_lines = [
        "Document authentifié par code QR : scannez-le pour vérifier".to_string(),
        "le numéro, le montant et la date de génération de cette facture.".to_string(),
        format!(
            "Facture n° {} · générée le {}",
            ctx.invoice.number,
            format_datetime(ctx.generated_at)
        ),
    ];
    let mut legal_y = footer_top - 11.0;
    for line in legal_lines {
        text(&layer, &font, &line, 7.0, legal_x, legal_y);
        legal_y -= 3.6;
    }

    // --- Copyright bar ---
    let year = ctx.generated_at.format("%Y");
    text_centered(
        &layer,
        &font,
        &format!("© {} {} · Tous droits réservés", year, ctx.tenant.name),
        7.0,
        5.5,
    );
    layer.set_fill_color(black());

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| AppError::RenderingError(anyhow::anyhow!("PDF save error: {}", e)))?;
    buf.into_inner()
        .map_err(|e| AppError::RenderingError(anyhow::anyhow!("PDF buffer error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::compute_line_amounts;
    use crate::services::qr::{encode_png, QrPayload};
    use uuid::Uuid;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn test_invoice(line_count: usize) -> (Invoice, Vec<InvoiceLine>, Tenant) {
        let tenant_id = Uuid::new_v4();
        let invoice_id = Uuid::new_v4();
        let lines: Vec<InvoiceLine> = (0..line_count)
            .map(|i| {
                let amounts = compute_line_amounts(dec("1"), dec("25"), dec("10"), dec("20"));
                InvoiceLine {
                    line_id: Uuid::new_v4(),
                    invoice_id,
                    tenant_id,
                    description: format!("Consultation de suivi {}", i + 1),
                    quantity: dec("1"),
                    unit_price: dec("25"),
                    third_party_rate: dec("10"),
                    tax_rate: dec("20"),
                    amount: amounts.amount,
                    created_utc: Utc::now(),
                }
            })
            .collect();
        let total = lines.iter().map(|l| l.amount).sum();
        let invoice = Invoice {
            invoice_id,
            tenant_id,
            number: "F-20260115093000-a1b2c3".to_string(),
            status: "sent".to_string(),
            issue_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2026, 2, 14).unwrap(),
            total,
            notes: Some("Règlement par virement sous 30 jours.".to_string()),
            billing_line1: Some("12 rue des Lilas".to_string()),
            billing_line2: None,
            billing_city: Some("Lyon".to_string()),
            billing_postal_code: Some("69003".to_string()),
            billing_country: Some("France".to_string()),
            patient_id: None,
            encounter_id: None,
            pdf_path: None,
            qr_path: None,
            created_utc: Utc::now(),
        };
        let tenant = Tenant {
            tenant_id,
            name: "Cabinet Santé Plus".to_string(),
            created_utc: Utc::now(),
        };
        (invoice, lines, tenant)
    }

    fn render(line_count: usize) -> Vec<u8> {
        let (invoice, lines, tenant) = test_invoice(line_count);
        let generated_at = Utc::now();
        let qr_png = encode_png(&QrPayload::for_invoice(&invoice, generated_at)).unwrap();
        render_facture(&RenderContext {
            invoice: &invoice,
            lines: &lines,
            tenant: &tenant,
            patient: None,
            qr_png: &qr_png,
            generated_at,
        })
        .unwrap()
    }

    #[test]
    fn row_height_caps_at_thirty_points() {
        assert_eq!(row_height_pt(600.0, 10), 30.0);
    }

    #[test]
    fn row_height_shrinks_with_line_count() {
        // floor(600/40) - 4 = 11
        assert_eq!(row_height_pt(600.0, 40), 11.0);
        // floor(500/7) - 4 = 67, capped at 30
        assert_eq!(row_height_pt(500.0, 7), 30.0);
    }

    #[test]
    fn format_eur_groups_thousands_with_spaces() {
        assert_eq!(format_eur(dec("1234567.5")), "1 234 567,50 EUR");
        assert_eq!(format_eur(dec("264")), "264,00 EUR");
        assert_eq!(format_eur(Decimal::ZERO), "0,00 EUR");
        assert_eq!(format_eur(dec("-1250.75")), "-1 250,75 EUR");
    }

    #[test]
    fn format_qty_uses_decimal_comma_and_trims_zeros() {
        assert_eq!(format_qty(dec("3")), "3");
        assert_eq!(format_qty(dec("1.50")), "1,5");
    }

    #[test]
    fn renders_a_pdf_document() {
        let bytes = render(3);
        assert_eq!(&bytes[..5], b"%PDF-");
        assert!(bytes.len() > 1000);
    }

    #[test]
    fn large_invoices_still_render_on_one_page() {
        let bytes = render(60);
        assert_eq!(&bytes[..5], b"%PDF-");
    }

    #[test]
    fn wrap_text_respects_max_width() {
        let lines = wrap_text("un deux trois quatre cinq six", 12);
        assert!(lines.iter().all(|l| l.len() <= 12));
        assert_eq!(lines.join(" "), "un deux trois quatre cinq six");
    }
}
