//! Deterministic HTML rendering of an invoice.
//!
//! The markup carries no clock values, no status and no environment-specific
//! paths, so the same invoice always yields the same bytes. Numbers use fixed
//! formats: money with 2 decimals, quantity with up to 3, rates with up to 4.

use async_trait::async_trait;
use rust_decimal::Decimal;

use invoicedesk_invoicing::{Invoice, InvoiceLine, VatType};
use invoicedesk_parties::Company;

use super::{DocumentRenderer, RenderError};

const STYLE: &str = "@page { size: A4; margin: 20mm; } \
body { font-family: sans-serif; } \
table { width: 100%; border-collapse: collapse; margin-top: 12px; } \
th, td { border: 1px solid #444; padding: 6px; font-size: 12px; } \
.num { text-align: right; } \
.party { width: 48%; display: inline-block; vertical-align: top; } \
.totals { margin-top: 16px; width: 40%; float: right; } .totals td { border: none; } \
.notes { margin-top: 20px; } .legal { font-size: 11px; margin-top: 12px; }";

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlInvoiceRenderer;

impl HtmlInvoiceRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render_html(
        &self,
        company: &Company,
        invoice: &Invoice,
        lines: &[InvoiceLine],
        language: &str,
    ) -> String {
        let details = company.details();
        let customer = invoice.customer_snapshot();
        let totals = invoice.totals();
        let mut out = String::with_capacity(4096);

        out.push_str(&format!(
            "<!DOCTYPE html><html lang=\"{}\"><head><meta charset=\"utf-8\"/>",
            escape(language)
        ));
        out.push_str(&format!(
            "<title>Invoice {}</title><style>{STYLE}</style></head><body>",
            escape(invoice.invoice_number())
        ));

        out.push_str(&format!("<h2>{}</h2>", escape(&details.name)));

        out.push_str("<div>");
        out.push_str("<div class=\"party\"><h3>Supplier</h3>");
        push_div(&mut out, &details.name);
        push_div(&mut out, &details.address);
        push_div(
            &mut out,
            &format!("{} | {}", details.country_code, details.vat_number),
        );
        if let Some(eik) = &details.eik {
            push_div(&mut out, &format!("EIK {eik}"));
        }
        push_div(
            &mut out,
            &format!("{} / {}", details.bank_iban, details.bank_bic),
        );
        out.push_str("</div>");

        out.push_str("<div class=\"party\"><h3>Customer</h3>");
        push_div(&mut out, &customer.name);
        push_div(&mut out, customer.address.as_deref().unwrap_or_default());
        push_div(&mut out, customer.vat_number.as_deref().unwrap_or_default());
        out.push_str("</div></div>");

        out.push_str("<div class=\"meta\">");
        push_div(
            &mut out,
            &format!("Invoice number: {}", invoice.invoice_number()),
        );
        push_div(
            &mut out,
            &format!("Issue date: {}", invoice.issue_date().format("%Y-%m-%d")),
        );
        push_div(&mut out, &format!("Currency: {}", invoice.currency()));
        out.push_str("</div>");

        out.push_str(
            "<table><thead><tr><th>Description</th><th>Qty</th><th>Unit price</th>\
             <th>Tax rate</th><th>VAT type</th><th>Total</th></tr></thead><tbody>",
        );
        for line in lines {
            out.push_str(&format!(
                "<tr><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td>\
                 <td class=\"num\">{}</td><td>{}</td><td class=\"num\">{}</td></tr>",
                escape(&line.description),
                trimmed(line.qty),
                money(line.unit_price),
                trimmed(line.tax_rate),
                vat_label(line.vat_type),
                money(line.line_total),
            ));
        }
        out.push_str("</tbody></table>");

        out.push_str(&format!(
            "<table class=\"totals\">\
             <tr><td>Subtotal</td><td class=\"num\">{}</td></tr>\
             <tr><td>VAT</td><td class=\"num\">{}</td></tr>\
             <tr><td>Total</td><td class=\"num\">{} {}</td></tr></table>\
             <div style=\"clear:both;\"></div>",
            money(totals.sub_total),
            money(totals.tax_total),
            money(totals.total),
            escape(invoice.currency()),
        ));

        if let Some(notes) = invoice.notes() {
            out.push_str(&format!(
                "<div class=\"notes\"><strong>Notes</strong><div>{}</div></div>",
                escape(notes)
            ));
        }

        let summary = vat_summary(lines);
        if !summary.is_empty() {
            out.push_str("<div class=\"legal\"><strong>VAT summary</strong><ul>");
            for (vat_type, amount) in &summary {
                out.push_str(&format!(
                    "<li>{}: {}</li>",
                    vat_label(*vat_type),
                    money(*amount)
                ));
            }
            out.push_str("</ul></div>");
        }

        let legal: Vec<&str> = summary
            .iter()
            .filter_map(|(vat_type, _)| legal_text(*vat_type))
            .collect();
        if !legal.is_empty() {
            out.push_str("<div class=\"legal\">");
            for text in legal {
                push_div(&mut out, text);
            }
            out.push_str("</div>");
        }

        out.push_str("</body></html>");
        out
    }
}

#[async_trait]
impl DocumentRenderer for HtmlInvoiceRenderer {
    async fn render(
        &self,
        company: &Company,
        invoice: &Invoice,
        lines: &[InvoiceLine],
        language: &str,
    ) -> Result<Vec<u8>, RenderError> {
        if lines.iter().any(|l| l.company_id != company.id_typed()) {
            return Err(RenderError::Failed(
                "line belongs to another company".to_string(),
            ));
        }
        Ok(self.render_html(company, invoice, lines, language).into_bytes())
    }
}

/// Sum of line totals per VAT type, in declaration order, present types only.
fn vat_summary(lines: &[InvoiceLine]) -> Vec<(VatType, Decimal)> {
    VatType::ALL
        .into_iter()
        .filter_map(|vat_type| {
            let mut matching = lines.iter().filter(|l| l.vat_type == vat_type).peekable();
            matching.peek()?;
            Some((vat_type, matching.map(|l| l.line_total).sum()))
        })
        .collect()
}

fn vat_label(vat_type: VatType) -> &'static str {
    match vat_type {
        VatType::Domestic => "Domestic",
        VatType::IntraEuReverseCharge => "Intra-EU reverse charge",
        VatType::ExportOutsideEu => "Export outside the EU",
        VatType::VatExempt => "VAT exempt",
    }
}

fn legal_text(vat_type: VatType) -> Option<&'static str> {
    match vat_type {
        VatType::Domestic => None,
        VatType::IntraEuReverseCharge => Some(
            "Reverse charge: VAT is to be accounted for by the recipient \
             (Art. 196 of Directive 2006/112/EC).",
        ),
        VatType::ExportOutsideEu => {
            Some("Export of goods outside the EU, exempt under Art. 146 of Directive 2006/112/EC.")
        }
        VatType::VatExempt => Some("VAT exempt supply."),
    }
}

fn push_div(out: &mut String, text: &str) {
    out.push_str("<div>");
    out.push_str(&escape(text));
    out.push_str("</div>");
}

fn money(value: Decimal) -> String {
    format!("{value:.2}")
}

/// Without trailing zeros, keeping at least the integer part.
fn trimmed(value: Decimal) -> String {
    value.normalize().to_string()
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
