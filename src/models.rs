// models.rs
// Domain models for both seed data (users.json) and MongoDB collections.

use mongodb::bson::{DateTime, oid::ObjectId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Currencies a document can be issued in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Currency {
    KSH,
    TSH,
    USH,
    USD,
    EUR,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::KSH => "KSH",
            Currency::TSH => "TSH",
            Currency::USH => "USH",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
        }
    }
}

/// Which document type a template renders.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Quote,
    Invoice,
    Receipt,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::Quote => "quote",
            TemplateKind::Invoice => "invoice",
            TemplateKind::Receipt => "receipt",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "quote" | "quotation" | "quotations" => Some(TemplateKind::Quote),
            "invoice" | "invoices" => Some(TemplateKind::Invoice),
            "receipt" | "receipts" => Some(TemplateKind::Receipt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuotationStatus {
    Draft,
    Sent,
    Viewed,
    Accepted,
    Rejected,
}

impl QuotationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotationStatus::Draft => "draft",
            QuotationStatus::Sent => "sent",
            QuotationStatus::Viewed => "viewed",
            QuotationStatus::Accepted => "accepted",
            QuotationStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Viewed,
    Pending,
    Partial,
    Paid,
    Overdue,
    Canceled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Viewed => "viewed",
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Partial => "partial",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Canceled => "canceled",
        }
    }
}

/// Status of the payment sub-document of an invoice or receipt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Partial,
    Paid,
    Overdue,
    Canceled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Overdue => "overdue",
            PaymentStatus::Canceled => "canceled",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ItemCategory {
    #[default]
    Service,
    Product,
    Other,
}

/// Invoice and receipt line item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub category: ItemCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_name: Option<String>,
    #[serde(default)]
    pub discount: Decimal,
}

impl LineItem {
    pub fn line_total(&self) -> Decimal {
        self.quantity * self.unit_price
    }
}

/// Quotation line item; tax is opt-in per item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuoteLineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub category: ItemCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_name: Option<String>,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub apply_tax: bool,
}

impl QuoteLineItem {
    pub fn line_total(&self) -> Decimal {
        self.quantity * self.unit_price
    }
}

impl From<QuoteLineItem> for LineItem {
    fn from(item: QuoteLineItem) -> Self {
        LineItem {
            description: item.description,
            quantity: item.quantity,
            unit_price: item.unit_price,
            category: item.category,
            other_name: item.other_name,
            discount: item.discount,
        }
    }
}

/// Client details frozen into a document at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClientSnapshot {
    pub name: String,
    pub address: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub contact_email: String,
}

/// Creator (business) details frozen into a document at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CreatorSnapshot {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default)]
    pub terms: String,
}

/// How an M-Pesa payment reaches the business.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MpesaChannel {
    Paybill {
        till_number: String,
    },
    SendMoney {
        phone_number: String,
        #[serde(default)]
        is_new_number: bool,
    },
}

/// Payment method with the fields each method requires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentDetails {
    Mpesa {
        channel: MpesaChannel,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transaction_id: Option<String>,
    },
    Bank {
        bank_name: String,
        account_number: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transaction_reference: Option<String>,
    },
    Cash {
        received_by: String,
    },
}

impl PaymentDetails {
    pub fn method_str(&self) -> &'static str {
        match self {
            PaymentDetails::Mpesa { .. } => "mpesa",
            PaymentDetails::Bank { .. } => "bank",
            PaymentDetails::Cash { .. } => "cash",
        }
    }
}

/// Payment sub-document of an invoice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoicePayment {
    pub details: PaymentDetails,
    #[serde(default)]
    pub status: PaymentStatus,
    #[serde(default)]
    pub amount_paid: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_paid: Option<DateTime>,
}

/// One entry of an invoice's append-only payment ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentHistoryEntry {
    pub date: DateTime,
    pub amount: Decimal,
    pub previous_amount: Decimal,
    pub details: PaymentDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_by: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_number: Option<String>,
}

/// Progress of the invoice created when a quotation is accepted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConversionState {
    Pending,
    Failed,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversion {
    pub state: ConversionState,
    #[serde(default)]
    pub attempts: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentDetails>,
}

/// User definition as stored in users.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedUser {
    pub email: String,
    #[serde(default)]
    pub secret: String,
    pub name: String,
    #[serde(default)]
    pub company_name: String,
}

/// Account document; also holds the per-user document counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub secret: String,
    pub name: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default)]
    pub quote_terms: String,
    #[serde(default)]
    pub invoice_terms: String,
    #[serde(default)]
    pub last_quote_number: i64,
    #[serde(default)]
    pub last_invoice_number: i64,
    #[serde(default)]
    pub last_receipt_number: i64,
}

impl User {
    /// Creator snapshot using the given terms text.
    pub fn snapshot(&self, terms: &str) -> CreatorSnapshot {
        CreatorSnapshot {
            name: self.name.clone(),
            email: self.email.clone(),
            company_name: self.company_name.clone(),
            position: self.position.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
            logo: self.logo.clone(),
            terms: terms.to_string(),
        }
    }
}

/// Session document stored in MongoDB linking a token to a user and expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub token: String,
    pub user_email: String,
    pub expires_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub address: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub contact_email: String,
    pub creator: ObjectId,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime>,
    pub created_at: DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

impl Client {
    pub fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot {
            name: self.name.clone(),
            address: self.address.clone(),
            contact_name: self.contact_name.clone(),
            contact_phone: self.contact_phone.clone(),
            contact_email: self.contact_email.clone(),
        }
    }
}

/// Uploaded HTML template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Remote URL or a file name inside the templates directory.
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_image: Option<String>,
    pub kind: TemplateKind,
    pub created_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quotation {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub quote_number: String,
    pub name: String,
    #[serde(default)]
    pub project_description: String,
    #[serde(default)]
    pub notes: String,
    pub client: ObjectId,
    pub creator: ObjectId,
    pub template: ObjectId,
    pub currency: Currency,
    pub valid_until: DateTime,
    pub line_items: Vec<QuoteLineItem>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    pub total: Decimal,
    pub status: QuotationStatus,
    pub client_snapshot: ClientSnapshot,
    pub creator_snapshot: CreatorSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion: Option<Conversion>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime>,
    pub created_at: DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub invoice_number: String,
    pub name: String,
    #[serde(default)]
    pub project_description: String,
    #[serde(default)]
    pub notes: String,
    pub client: ObjectId,
    pub creator: ObjectId,
    pub template: ObjectId,
    pub currency: Currency,
    pub due_date: DateTime,
    pub line_items: Vec<LineItem>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    pub total: Decimal,
    pub payment: InvoicePayment,
    #[serde(default)]
    pub payment_history: Vec<PaymentHistoryEntry>,
    pub status: InvoiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quotation: Option<ObjectId>,
    pub client_snapshot: ClientSnapshot,
    pub creator_snapshot: CreatorSnapshot,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime>,
    pub created_at: DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

impl Invoice {
    pub fn outstanding(&self) -> Decimal {
        (self.total - self.payment.amount_paid).max(Decimal::ZERO)
    }
}

/// Point-in-time view of the invoice a receipt pays against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceSnapshot {
    pub invoice_number: String,
    pub invoice_date: DateTime,
    pub invoice_total: Decimal,
    pub previously_paid: Decimal,
    pub balance_due: Decimal,
}

/// Payment sub-document of a receipt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptPayment {
    pub details: PaymentDetails,
    pub status: PaymentStatus,
    pub amount_paid: Decimal,
    pub date_paid: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub receipt_number: String,
    pub client: ObjectId,
    pub creator: ObjectId,
    pub template: ObjectId,
    pub currency: Currency,
    pub items: Vec<LineItem>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    pub total: Decimal,
    pub payment: ReceiptPayment,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_snapshot: Option<InvoiceSnapshot>,
    pub client_snapshot: ClientSnapshot,
    pub creator_snapshot: CreatorSnapshot,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime>,
    pub created_at: DateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user: ObjectId,
    pub title: String,
    pub body: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub read_at: Option<DateTime>,
    pub created_at: DateTime,
}

/// Audit record of a user action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLog {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user: ObjectId,
    pub action: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub user_agent: String,
    pub created_at: DateTime,
}
