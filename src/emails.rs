// emails.rs
// Built-in email bodies (askama) for sending quotations, invoices and receipts to clients.

use anyhow::Result;
use askama::Template;

use crate::mailer::OutgoingEmail;
use crate::models::{Invoice, Quotation, Receipt, TemplateKind};
use crate::render::{document_link, format_date, format_money};
use crate::state::AppState;

#[derive(Template)]
#[template(path = "emails/document.html")]
struct DocumentEmail<'a> {
    subject: &'a str,
    recipient: &'a str,
    sender: &'a str,
    kind_label: &'a str,
    number: &'a str,
    amount: String,
    detail: Option<String>,
    link: String,
}

fn sender_name(company: &str, name: &str) -> String {
    if company.trim().is_empty() {
        name.to_string()
    } else {
        company.to_string()
    }
}

pub fn quotation_email(state: &AppState, quotation: &Quotation) -> Result<OutgoingEmail> {
    let sender = sender_name(
        &quotation.creator_snapshot.company_name,
        &quotation.creator_snapshot.name,
    );
    let subject = format!("Quotation #{} from {}", quotation.quote_number, sender);
    let link = match quotation.id {
        Some(id) => document_link(&state.config, TemplateKind::Quote, &id),
        None => state.config.frontend_url.clone(),
    };
    let html = DocumentEmail {
        subject: &subject,
        recipient: &quotation.client_snapshot.contact_name,
        sender: &sender,
        kind_label: "quotation",
        number: &quotation.quote_number,
        amount: format_money(quotation.total, quotation.currency),
        detail: Some(format!("Valid until {}", format_date(&quotation.valid_until))),
        link,
    }
    .render()?;
    Ok(OutgoingEmail {
        to: quotation.client_snapshot.contact_email.clone(),
        subject,
        html,
    })
}

pub fn invoice_email(state: &AppState, invoice: &Invoice) -> Result<OutgoingEmail> {
    let sender = sender_name(
        &invoice.creator_snapshot.company_name,
        &invoice.creator_snapshot.name,
    );
    let subject = format!("Invoice #{} from {}", invoice.invoice_number, sender);
    let link = match invoice.id {
        Some(id) => document_link(&state.config, TemplateKind::Invoice, &id),
        None => state.config.frontend_url.clone(),
    };
    let html = DocumentEmail {
        subject: &subject,
        recipient: &invoice.client_snapshot.contact_name,
        sender: &sender,
        kind_label: "invoice",
        number: &invoice.invoice_number,
        amount: format_money(invoice.total, invoice.currency),
        detail: Some(format!(
            "Balance due {} by {}",
            format_money(invoice.outstanding(), invoice.currency),
            format_date(&invoice.due_date)
        )),
        link,
    }
    .render()?;
    Ok(OutgoingEmail {
        to: invoice.client_snapshot.contact_email.clone(),
        subject,
        html,
    })
}

pub fn receipt_email(state: &AppState, receipt: &Receipt) -> Result<OutgoingEmail> {
    let sender = sender_name(
        &receipt.creator_snapshot.company_name,
        &receipt.creator_snapshot.name,
    );
    let subject = format!("Receipt {} from {}", receipt.receipt_number, sender);
    let link = match receipt.id {
        Some(id) => document_link(&state.config, TemplateKind::Receipt, &id),
        None => state.config.frontend_url.clone(),
    };
    let detail = receipt.invoice_snapshot.as_ref().map(|snapshot| {
        format!(
            "Payment towards invoice #{}; remaining balance {}",
            snapshot.invoice_number,
            format_money(snapshot.balance_due, receipt.currency)
        )
    });
    let html = DocumentEmail {
        subject: &subject,
        recipient: &receipt.client_snapshot.contact_name,
        sender: &sender,
        kind_label: "receipt",
        number: &receipt.receipt_number,
        amount: format_money(receipt.payment.amount_paid, receipt.currency),
        detail,
        link,
    }
    .render()?;
    Ok(OutgoingEmail {
        to: receipt.client_snapshot.contact_email.clone(),
        subject,
        html,
    })
}

/// Render and hand the message to the configured mailer.
pub async fn deliver(state: &AppState, email: Result<OutgoingEmail>) -> Result<()> {
    state.mailer.send(email?).await
}
