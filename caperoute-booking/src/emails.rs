use caperoute_core::models::{BookingView, Payment};
use caperoute_core::notify::{EmailAttachment, EmailMessage};
use chrono::Utc;

/// Format minor units as rand, e.g. 100000 -> "R1000.00".
pub fn format_amount(cents: i32) -> String {
    format!("R{}.{:02}", cents / 100, (cents % 100).abs())
}

/// Booking confirmation sent after a successful settle. Includes an HTML
/// invoice attachment; dispatch is best-effort and never blocks the
/// reconciliation response.
pub fn confirmation_email(view: &BookingView, payment: &Payment) -> EmailMessage {
    let booking = &view.booking;
    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2 style="color: #091d35;">Booking Confirmation</h2>
  <p>Dear {name},</p>
  <p>Thank you for your booking! Your payment has been successfully processed.</p>
  <div style="background: #f8fafc; padding: 20px; border-radius: 8px; margin: 20px 0;">
    <h3 style="color: #091d35; margin-top: 0;">Booking Details</h3>
    <p><strong>Booking Reference:</strong> {reference}</p>
    <p><strong>Package:</strong> {package}</p>
    <p><strong>Number of People:</strong> {party_size}</p>
    <p><strong>Total Paid:</strong> {amount}</p>
    <p><strong>Status:</strong> <span style="color: #059669; font-weight: bold;">CONFIRMED</span></p>
  </div>
  <div style="background: #fef3c7; padding: 15px; border-radius: 8px; margin: 20px 0;">
    <h4 style="color: #92400e; margin-top: 0;">Important Information</h4>
    <ul style="color: #92400e; margin: 0;">
      <li>Please bring valid ID (passport or driving licence)</li>
      <li>Tour starts at 11:00 AM sharp</li>
      <li>Meeting point details will be sent 24 hours before your tour</li>
    </ul>
  </div>
  <p>If you have any questions, please don't hesitate to contact us.</p>
  <p>We look forward to showing you the beautiful townships of Cape Town!</p>
</div>"#,
        name = view.customer.name,
        reference = booking.booking_ref,
        package = view.package.name,
        party_size = booking.party_size,
        amount = format_amount(payment.amount_cents),
    );

    EmailMessage {
        to: view.customer.email.clone(),
        subject: format!("Booking Confirmed - {}", booking.booking_ref),
        html,
        attachments: vec![invoice_attachment(view, payment)],
    }
}

fn invoice_attachment(view: &BookingView, payment: &Payment) -> EmailAttachment {
    let html = format!(
        r#"<html><body style="font-family: Arial, sans-serif;">
  <h1 style="text-align: center; text-decoration: underline;">Cape Route Tours</h1>
  <h2 style="text-align: center;">INVOICE</h2>
  <p>Invoice #: {payment_id}<br>Date: {date}</p>
  <p>Customer Name: {name}<br>Customer Email: {email}</p>
  <h3 style="text-decoration: underline;">Booking Details</h3>
  <p>Package: {package}<br>Booking Reference: {reference}<br>Amount Paid: {amount}</p>
  <hr>
  <p style="text-align: center;">Thank you for booking with Cape Route Tours!</p>
  <p style="text-align: center; font-size: 10px;">Please bring your passport or driving licence.</p>
</body></html>"#,
        payment_id = payment.id,
        date = Utc::now().format("%Y-%m-%d"),
        name = view.customer.name,
        email = view.customer.email,
        package = view.package.name,
        reference = view.booking.booking_ref,
        amount = format_amount(payment.amount_cents),
    );

    EmailAttachment {
        filename: format!("invoice-{}.html", view.booking.booking_ref),
        content_type: "text/html".to_string(),
        content: html,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_amounts_in_rand() {
        assert_eq!(format_amount(100000), "R1000.00");
        assert_eq!(format_amount(50), "R0.50");
        assert_eq!(format_amount(123456), "R1234.56");
    }
}
