// render.rs
// Document rendering: template markup fetch, tera binding, line-item pages, QR data URL.

use anyhow::{Context as _, Result, bail};
use base64::{Engine, engine::general_purpose::STANDARD};
use image::{ImageFormat, Luma};
use mongodb::bson::{DateTime, oid::ObjectId};
use qrcode::QrCode;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use serde_json::{Value, json};
use std::{io::Cursor, path::Path};
use tera::{Context, Tera};

use crate::billing::payment::describe;
use crate::config::AppConfig;
use crate::models::{Currency, Invoice, Quotation, Receipt, Template, TemplateKind};
use crate::state::{AppState, get_template};

pub const ITEMS_PER_PAGE: usize = 10;

const PDF_STYLES: &str = r#"<style media="print">
  @page { size: A4; margin: 12mm; }
  body { -webkit-print-color-adjust: exact; print-color-adjust: exact; }
  .page { page-break-after: always; }
  .page:last-child { page-break-after: auto; }
</style>"#;

const PDF_SCRIPT: &str = r#"<script>window.addEventListener("load", function () { window.print(); });</script>"#;

/// Public link a client opens to view a document.
pub fn document_link(config: &AppConfig, kind: TemplateKind, id: &ObjectId) -> String {
    let segment = match kind {
        TemplateKind::Quote => "quotations",
        TemplateKind::Invoice => "invoices",
        TemplateKind::Receipt => "receipts",
    };
    format!(
        "{}/{}/view/{}",
        config.frontend_url.trim_end_matches('/'),
        segment,
        id.to_hex()
    )
}

/// `KSH 1,234.50`
pub fn format_money(amount: Decimal, currency: Currency) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if negative { "-" } else { "" };
    format!("{} {sign}{grouped}.{cents}", currency.as_str())
}

pub fn format_date(date: &DateTime) -> String {
    date.to_chrono().format("%d %b %Y").to_string()
}

/// Split items into pages of ten; each page knows whether it is the last one.
pub fn paginate_items<T: Serialize>(items: &[T]) -> Vec<Value> {
    let chunks: Vec<&[T]> = if items.is_empty() {
        vec![items]
    } else {
        items.chunks(ITEMS_PER_PAGE).collect()
    };
    let pages = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            json!({
                "page_number": i + 1,
                "total_pages": pages,
                "items": chunk,
                "is_last_page": i + 1 == pages,
            })
        })
        .collect()
}

/// PNG QR code of `text`, as a `data:` URL.
pub fn qr_data_url(text: &str) -> Result<String> {
    let code = QrCode::new(text.as_bytes()).context("failed to build qr")?;
    let img = code.render::<Luma<u8>>().min_dimensions(160, 160).build();
    let mut cursor = Cursor::new(Vec::<u8>::new());
    image::DynamicImage::ImageLuma8(img).write_to(&mut cursor, ImageFormat::Png)?;
    Ok(format!(
        "data:image/png;base64,{}",
        STANDARD.encode(cursor.into_inner())
    ))
}

/// Print styles (and optionally an auto-print script) go right before `</head>`.
pub fn inject_pdf_styles(html: &str, include_script: bool) -> String {
    let mut extra = PDF_STYLES.to_string();
    if include_script {
        extra.push_str(PDF_SCRIPT);
    }
    match html.find("</head>") {
        Some(pos) => format!("{}{}{}", &html[..pos], extra, &html[pos..]),
        None => format!("{extra}{html}"),
    }
}

/// Markup for a template: remote URLs are fetched, anything else is read from the templates dir.
pub async fn load_markup(state: &AppState, template: &Template) -> Result<String> {
    if template.file.starts_with("http://") || template.file.starts_with("https://") {
        let response = state.http.get(&template.file).send().await?;
        if !response.status().is_success() {
            bail!("template fetch returned {}", response.status());
        }
        return Ok(response.text().await?);
    }
    let name = Path::new(&template.file)
        .file_name()
        .context("template file name is empty")?;
    let path = Path::new(&state.config.templates_dir).join(name);
    tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read template {}", path.display()))
}

pub fn render_markup(markup: &str, context: &Value) -> Result<String> {
    let ctx = Context::from_value(context.clone())?;
    Ok(Tera::one_off(markup, &ctx, true)?)
}

fn payment_context(details: &crate::models::PaymentDetails) -> Value {
    let (method, line) = describe(details);
    json!({ "method": method, "details": line, "raw": details })
}

pub fn quotation_context(quotation: &Quotation, qr: &str, link: &str) -> Value {
    let c = quotation.currency;
    json!({
        "kind": "quotation",
        "document": quotation,
        "number": quotation.quote_number,
        "title": quotation.name,
        "client": quotation.client_snapshot,
        "creator": quotation.creator_snapshot,
        "pages": paginate_items(&quotation.line_items),
        "date": format_date(&quotation.created_at),
        "valid_until": format_date(&quotation.valid_until),
        "subtotal": format_money(quotation.subtotal, c),
        "tax": format_money(quotation.tax, c),
        "discount": format_money(quotation.discount, c),
        "total": format_money(quotation.total, c),
        "qr_code": qr,
        "link": link,
        "meta": {
            "title": format!("Quotation #{}", quotation.quote_number),
            "file_name": format!("quotation-{}.pdf", quotation.quote_number),
        },
    })
}

pub fn invoice_context(invoice: &Invoice, qr: &str, link: &str) -> Value {
    let c = invoice.currency;
    json!({
        "kind": "invoice",
        "document": invoice,
        "number": invoice.invoice_number,
        "title": invoice.name,
        "client": invoice.client_snapshot,
        "creator": invoice.creator_snapshot,
        "pages": paginate_items(&invoice.line_items),
        "date": format_date(&invoice.created_at),
        "due_date": format_date(&invoice.due_date),
        "subtotal": format_money(invoice.subtotal, c),
        "tax": format_money(invoice.tax, c),
        "discount": format_money(invoice.discount, c),
        "total": format_money(invoice.total, c),
        "amount_paid": format_money(invoice.payment.amount_paid, c),
        "balance_due": format_money(invoice.outstanding(), c),
        "status": invoice.status.as_str(),
        "payment": payment_context(&invoice.payment.details),
        "qr_code": qr,
        "link": link,
        "meta": {
            "title": format!("Invoice #{}", invoice.invoice_number),
            "file_name": format!("invoice-{}.pdf", invoice.invoice_number),
        },
    })
}

pub fn receipt_context(receipt: &Receipt, qr: &str, link: &str) -> Value {
    let c = receipt.currency;
    json!({
        "kind": "receipt",
        "document": receipt,
        "number": receipt.receipt_number,
        "title": format!("Receipt {}", receipt.receipt_number),
        "client": receipt.client_snapshot,
        "creator": receipt.creator_snapshot,
        "pages": paginate_items(&receipt.items),
        "date": format_date(&receipt.created_at),
        "subtotal": format_money(receipt.subtotal, c),
        "tax": format_money(receipt.tax, c),
        "discount": format_money(receipt.discount, c),
        "total": format_money(receipt.total, c),
        "amount_paid": format_money(receipt.payment.amount_paid, c),
        "payment": payment_context(&receipt.payment.details),
        "invoice_snapshot": receipt.invoice_snapshot,
        "qr_code": qr,
        "link": link,
        "meta": {
            "title": format!("Receipt {}", receipt.receipt_number),
            "file_name": format!("{}.pdf", receipt.receipt_number),
        },
    })
}

/// A stored document that can be rendered through its template.
#[derive(Clone, Copy)]
pub enum DocumentRef<'a> {
    Quotation(&'a Quotation),
    Invoice(&'a Invoice),
    Receipt(&'a Receipt),
}

impl DocumentRef<'_> {
    pub fn kind(&self) -> TemplateKind {
        match self {
            DocumentRef::Quotation(_) => TemplateKind::Quote,
            DocumentRef::Invoice(_) => TemplateKind::Invoice,
            DocumentRef::Receipt(_) => TemplateKind::Receipt,
        }
    }

    fn parts(&self) -> (Option<ObjectId>, ObjectId) {
        match self {
            DocumentRef::Quotation(q) => (q.id, q.template),
            DocumentRef::Invoice(i) => (i.id, i.template),
            DocumentRef::Receipt(r) => (r.id, r.template),
        }
    }
}

/// Full HTML for a document, bound to the template it was created with.
pub async fn render_document(state: &AppState, document: DocumentRef<'_>) -> Result<String> {
    let (id, template_id) = document.parts();
    let id = id.context("document has no id")?;
    let template = get_template(state, &template_id).await?;
    let markup = load_markup(state, &template).await?;
    let link = document_link(&state.config, document.kind(), &id);
    let qr = qr_data_url(&link)?;
    let context = match document {
        DocumentRef::Quotation(q) => quotation_context(q, &qr, &link),
        DocumentRef::Invoice(i) => invoice_context(i, &qr, &link),
        DocumentRef::Receipt(r) => receipt_context(r, &qr, &link),
    };
    render_markup(&markup, &context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn money_is_grouped_by_thousands() {
        assert_eq!(format_money(dec!(1234.5), Currency::KSH), "KSH 1,234.50");
        assert_eq!(format_money(dec!(999), Currency::USD), "USD 999.00");
        assert_eq!(format_money(dec!(1000000), Currency::EUR), "EUR 1,000,000.00");
        assert_eq!(format_money(dec!(-12.345), Currency::TSH), "TSH -12.35");
    }

    #[test]
    fn items_are_split_in_pages_of_ten() {
        let items: Vec<u32> = (0..23).collect();
        let pages = paginate_items(&items);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0]["items"].as_array().map(Vec::len), Some(10));
        assert_eq!(pages[2]["items"].as_array().map(Vec::len), Some(3));
        assert_eq!(pages[2]["is_last_page"], json!(true));
        assert_eq!(pages[0]["is_last_page"], json!(false));
    }

    #[test]
    fn empty_documents_still_get_one_page() {
        let pages = paginate_items::<u32>(&[]);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0]["is_last_page"], json!(true));
    }

    #[test]
    fn styles_land_before_head_close() {
        let html = "<html><head><title>x</title></head><body></body></html>";
        let out = inject_pdf_styles(html, true);
        let styles = out.find("@page").unwrap();
        let head_close = out.find("</head>").unwrap();
        assert!(styles < head_close);
        assert!(out.contains("window.print()"));
        assert!(!inject_pdf_styles(html, false).contains("window.print()"));
    }

    #[test]
    fn qr_is_a_png_data_url() {
        let url = qr_data_url("http://localhost:3000/invoices/view/abc").unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn tera_binds_context() {
        let html = render_markup(
            "<h1>{{ title }}</h1>{% for page in pages %}{{ page.page_number }}{% endfor %}",
            &json!({ "title": "Invoice #00001", "pages": paginate_items(&[1, 2, 3]) }),
        )
        .unwrap();
        assert_eq!(html, "<h1>Invoice #00001</h1>1");
    }
}
