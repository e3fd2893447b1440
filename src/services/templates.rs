//! HTML bodies for the transactional customer emails. Each builder returns
//! `(subject, html)`.

use rust_decimal::Decimal;

use crate::entities::{order, order_item};
use crate::services::invoices::{format_date, format_inr};

fn layout(title: &str, body: &str, site_url: &str) -> String {
    format!(
        r#"<div style="font-family:Arial,Helvetica,sans-serif;max-width:600px;margin:0 auto;padding:24px;color:#222">
<h2 style="color:#1a1a2e">{title}</h2>
{body}
<hr style="border:none;border-top:1px solid #eee;margin:24px 0"/>
<p style="font-size:12px;color:#888">This is an automated message. Visit <a href="{site_url}">{site_url}</a> for your account and orders.</p>
</div>"#
    )
}

fn items_table(items: &[order_item::Model]) -> String {
    let mut rows = String::new();
    for item in items {
        rows.push_str(&format!(
            r#"<tr><td style="padding:6px 8px;border-bottom:1px solid #eee">{}</td><td style="padding:6px 8px;border-bottom:1px solid #eee;text-align:center">{}</td><td style="padding:6px 8px;border-bottom:1px solid #eee;text-align:right">{}</td></tr>"#,
            item.product_name,
            item.quantity,
            format_inr(item.line_total()),
        ));
    }
    format!(
        r#"<table style="width:100%;border-collapse:collapse;margin:16px 0">
<tr><th style="text-align:left;padding:6px 8px;border-bottom:2px solid #ddd">Item</th><th style="padding:6px 8px;border-bottom:2px solid #ddd">Qty</th><th style="text-align:right;padding:6px 8px;border-bottom:2px solid #ddd">Total</th></tr>
{rows}</table>"#
    )
}

pub fn order_confirmation(
    order: &order::Model,
    items: &[order_item::Model],
    site_url: &str,
) -> (String, String) {
    let subject = format!("Order confirmed: {}", format_inr(order.total_amount));
    let body = format!(
        r#"<p>Hi {name},</p>
<p>Thank you for your purchase! Your payment was received on {date} and your order is confirmed.</p>
{table}
<p style="font-size:16px"><strong>Total paid: {total}</strong> (shipping free, taxes included)</p>
<p>Shipping to:<br/>{address}</p>
<p>We will email you again when your order ships.</p>"#,
        name = order.customer_name,
        date = format_date(order.created_at),
        table = items_table(items),
        total = format_inr(order.total_amount),
        address = order.shipping_address,
    );
    (subject.clone(), layout(&subject, &body, site_url))
}

pub fn contact_acknowledgement(name: &str, site_url: &str) -> (String, String) {
    let subject = "We received your message".to_string();
    let body = format!(
        r#"<p>Hi {name},</p>
<p>Thanks for reaching out. Your message has been received and our team will get back to you within one business day.</p>"#
    );
    (subject.clone(), layout(&subject, &body, site_url))
}

pub fn return_acknowledgement(
    order: &order::Model,
    refund_estimate: Decimal,
    site_url: &str,
) -> (String, String) {
    let subject = "Return request received".to_string();
    let body = format!(
        r#"<p>Hi {name},</p>
<p>We have received your return request for order <strong>{order_id}</strong>.</p>
<p>Estimated refund: <strong>{refund}</strong>. Once the return is picked up and inspected, the refund will be issued to your original payment method.</p>"#,
        name = order.customer_name,
        order_id = order.id,
        refund = format_inr(refund_estimate),
    );
    (subject.clone(), layout(&subject, &body, site_url))
}

pub fn signup_welcome(name: &str, site_url: &str) -> (String, String) {
    let subject = "Welcome aboard!".to_string();
    let body = format!(
        r#"<p>Hi {name},</p>
<p>Your account is ready. Browse the catalog, save your address for faster checkout, and track your orders any time.</p>
<p><a href="{site_url}" style="display:inline-block;padding:10px 18px;background:#1a1a2e;color:#fff;text-decoration:none;border-radius:4px">Start shopping</a></p>"#
    );
    (subject.clone(), layout(&subject, &body, site_url))
}

pub fn status_update(order: &order::Model, new_status: &str, site_url: &str) -> (String, String) {
    let (subject, detail) = match new_status {
        "shipped" => (
            "Your order has shipped".to_string(),
            match (&order.courier_name, &order.awb_code) {
                (Some(courier), Some(awb)) => format!(
                    "<p>Your order is on its way via <strong>{}</strong>. Tracking number: <strong>{}</strong>.</p>",
                    courier, awb
                ),
                _ => "<p>Your order is on its way.</p>".to_string(),
            },
        ),
        "delivered" => (
            "Your order was delivered".to_string(),
            "<p>Your order has been delivered. We hope you love it!</p>".to_string(),
        ),
        "cancelled" => (
            "Your order was cancelled".to_string(),
            "<p>Your order has been cancelled. If you already paid, the refund will reach your original payment method within 5-7 business days.</p>".to_string(),
        ),
        other => (
            format!("Order update: {}", other),
            format!("<p>Your order status is now <strong>{}</strong>.</p>", other),
        ),
    };

    let tracking = order
        .tracking_url
        .as_ref()
        .map(|url| format!(r#"<p><a href="{url}">Track your shipment</a></p>"#))
        .unwrap_or_default();

    let body = format!(
        r#"<p>Hi {name},</p>
{detail}
{tracking}
<p>Order reference: {order_id}</p>"#,
        name = order.customer_name,
        order_id = order.id,
    );
    (subject.clone(), layout(&subject, &body, site_url))
}
