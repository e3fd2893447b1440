use chrono::{DateTime, Utc};
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point, Rgb,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::instrument;

use crate::entities::{order, order_item};
use crate::errors::ServiceError;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 15.0;

/// Vertical budget (measured from the top of the page) past which an item
/// row forces a page break.
const ROW_BREAK_Y: f32 = 270.0;
/// The summary block needs more room; break earlier if it would not fit.
const SUMMARY_BREAK_Y: f32 = 240.0;

/// Formats a major-unit amount with a fixed currency prefix and western
/// thousands grouping. Whole amounts drop the decimal part: `Rs. 1,499`,
/// fractional keep two places: `Rs. 1,499.50`.
pub fn format_inr(amount: Decimal) -> String {
    let negative = amount.is_sign_negative();
    // Quantize first so sub-paisa inputs cannot push the cents past 99.
    let abs = amount.abs().round_dp(2);
    let whole = abs.trunc();
    let fract = abs - whole;

    let digits = whole.to_i128().unwrap_or(0).to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if negative { "-" } else { "" };
    if fract.is_zero() {
        format!("Rs. {}{}", sign, grouped)
    } else {
        let cents = (fract * Decimal::from(100)).round().to_i64().unwrap_or(0);
        format!("Rs. {}{}.{:02}", sign, grouped, cents)
    }
}

/// dd/mm/yyyy, matching the storefront's locale.
pub fn format_date(ts: DateTime<Utc>) -> String {
    ts.format("%d/%m/%Y").to_string()
}

/// Short, human-facing invoice number derived from the order id.
pub fn invoice_number(order_id: &uuid::Uuid) -> String {
    let simple = order_id.simple().to_string();
    format!("INV-{}", &simple[..8].to_uppercase())
}

struct PageCursor<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    /// Distance from the top of the page in millimetres.
    y: f32,
    page_no: u32,
}

impl<'a> PageCursor<'a> {
    /// printpdf's origin is the bottom-left corner; layout math here runs
    /// top-down, so convert at the drawing boundary.
    fn from_top(y: f32) -> Mm {
        Mm(PAGE_HEIGHT_MM - y)
    }

    fn text(&self, s: &str, size: f32, x: f32, font: &IndirectFontRef) {
        self.layer.use_text(s, size, Mm(x), Self::from_top(self.y), font);
    }

    fn text_at(&self, s: &str, size: f32, x: f32, y: f32, font: &IndirectFontRef) {
        self.layer.use_text(s, size, Mm(x), Self::from_top(y), font);
    }

    fn hline(&self, y: f32) {
        let line = Line {
            points: vec![
                (Point::new(Mm(MARGIN_MM), Self::from_top(y)), false),
                (
                    Point::new(Mm(PAGE_WIDTH_MM - MARGIN_MM), Self::from_top(y)),
                    false,
                ),
            ],
            is_closed: false,
        };
        self.layer.add_line(line);
    }

    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(
            Mm(PAGE_WIDTH_MM),
            Mm(PAGE_HEIGHT_MM),
            format!("Page {}", self.page_no + 1),
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.page_no += 1;
        self.y = 0.0;
    }
}

/// Renders a paginated invoice PDF for an order. Layout is deterministic
/// given the same order and items; no network access.
pub struct InvoiceRenderer;

impl InvoiceRenderer {
    #[instrument(skip(order, items), fields(order_id = %order.id))]
    pub fn render(
        order: &order::Model,
        items: &[order_item::Model],
    ) -> Result<Vec<u8>, ServiceError> {
        let (doc, page1, layer1) = PdfDocument::new(
            "Invoice",
            Mm(PAGE_WIDTH_MM),
            Mm(PAGE_HEIGHT_MM),
            "Page 1",
        );
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ServiceError::InternalError(format!("invoice font: {}", e)))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ServiceError::InternalError(format!("invoice font: {}", e)))?;

        let mut cursor = PageCursor {
            doc: &doc,
            layer: doc.get_page(page1).get_layer(layer1),
            y: 0.0,
            page_no: 1,
        };

        Self::draw_header(&mut cursor, order, &font, &bold);

        // Customer block
        cursor.y = 62.0;
        cursor.text("Billed To", 11.0, MARGIN_MM, &bold);
        cursor.y += 6.0;
        cursor.text(&order.customer_name, 10.0, MARGIN_MM, &font);
        cursor.y += 5.0;
        cursor.text(&order.customer_email, 10.0, MARGIN_MM, &font);
        cursor.y += 5.0;
        cursor.text(&order.customer_phone, 10.0, MARGIN_MM, &font);
        cursor.y += 5.0;
        for (i, chunk) in wrap_address(&order.shipping_address, 60).into_iter().enumerate() {
            if i > 0 {
                cursor.y += 5.0;
            }
            cursor.text(&chunk, 10.0, MARGIN_MM, &font);
        }

        // Item table
        cursor.y += 12.0;
        Self::draw_table_header(&mut cursor, &bold);

        for item in items {
            if cursor.y > ROW_BREAK_Y {
                cursor.new_page();
                Self::draw_header(&mut cursor, order, &font, &bold);
                cursor.y = 62.0;
                Self::draw_table_header(&mut cursor, &bold);
            }
            cursor.text(&truncate(&item.product_name, 42), 10.0, MARGIN_MM, &font);
            cursor.text(&item.quantity.to_string(), 10.0, 120.0, &font);
            cursor.text(&format_inr(item.product_price), 10.0, 140.0, &font);
            cursor.text(&format_inr(item.line_total()), 10.0, 170.0, &font);
            cursor.y += 7.0;
        }

        // Summary block: subtotal equals the order total (shipping free,
        // tax included in listed prices).
        if cursor.y > SUMMARY_BREAK_Y {
            cursor.new_page();
            Self::draw_header(&mut cursor, order, &font, &bold);
            cursor.y = 62.0;
        }
        cursor.y += 4.0;
        cursor.hline(cursor.y);
        cursor.y += 8.0;

        let total = format_inr(order.total_amount);
        cursor.text("Subtotal", 10.0, 130.0, &font);
        cursor.text(&total, 10.0, 170.0, &font);
        cursor.y += 6.0;
        cursor.text("Shipping", 10.0, 130.0, &font);
        cursor.text("Free", 10.0, 170.0, &font);
        cursor.y += 6.0;
        cursor.text("Tax", 10.0, 130.0, &font);
        cursor.text("Included", 10.0, 170.0, &font);
        cursor.y += 8.0;
        cursor.text("Grand Total", 11.0, 130.0, &bold);
        cursor.text(&total, 11.0, 170.0, &bold);

        // Payment metadata
        cursor.y += 14.0;
        cursor.text("Payment Details", 11.0, MARGIN_MM, &bold);
        cursor.y += 6.0;
        cursor.text(
            &format!("Status: {}", order.payment_status),
            10.0,
            MARGIN_MM,
            &font,
        );
        if let Some(method) = &order.payment_method {
            cursor.y += 5.0;
            cursor.text(&format!("Method: {}", method), 10.0, MARGIN_MM, &font);
        }
        if let Some(payment_id) = &order.provider_payment_id {
            cursor.y += 5.0;
            cursor.text(
                &format!("Payment ID: {}", payment_id),
                10.0,
                MARGIN_MM,
                &font,
            );
        }

        doc.save_to_bytes()
            .map_err(|e| ServiceError::InternalError(format!("invoice serialization: {}", e)))
    }

    /// Page header band, redrawn at the top of every page.
    fn draw_header(
        cursor: &mut PageCursor<'_>,
        order: &order::Model,
        font: &IndirectFontRef,
        bold: &IndirectFontRef,
    ) {
        cursor.layer.set_fill_color(Color::Rgb(Rgb::new(0.1, 0.1, 0.1, None)));
        cursor.layer.set_outline_color(Color::Rgb(Rgb::new(0.6, 0.6, 0.6, None)));
        cursor.layer.set_outline_thickness(0.4);

        cursor.text_at("INVOICE", 20.0, MARGIN_MM, 22.0, bold);
        cursor.text_at(
            &invoice_number(&order.id),
            10.0,
            150.0,
            18.0,
            font,
        );
        cursor.text_at(
            &format!("Date: {}", format_date(order.created_at)),
            10.0,
            150.0,
            24.0,
            font,
        );
        cursor.text_at(
            &format!("Order: {}", order.id),
            8.0,
            150.0,
            30.0,
            font,
        );
        cursor.hline(36.0);
    }

    fn draw_table_header(cursor: &mut PageCursor<'_>, bold: &IndirectFontRef) {
        cursor.text("Item", 10.0, MARGIN_MM, bold);
        cursor.text("Qty", 10.0, 120.0, bold);
        cursor.text("Price", 10.0, 140.0, bold);
        cursor.text("Total", 10.0, 170.0, bold);
        cursor.y += 3.0;
        cursor.hline(cursor.y);
        cursor.y += 6.0;
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

fn wrap_address(address: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in address.split_whitespace() {
        if !current.is_empty() && current.chars().count() + word.chars().count() + 1 > width {
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
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
