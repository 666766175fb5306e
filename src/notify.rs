//! HTML email digests of newly discovered leads.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{LeadCandidate, Priority};
use chrono::{DateTime, FixedOffset, Utc};
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

pub(crate) const MANUAL_DISCOVERY: &str = "Manual Discovery";
pub(crate) const SCHEDULED_DISCOVERY: &str = "Scheduled Auto-Discovery (Hourly)";

const MALAYSIA_OFFSET_SECS: i32 = 8 * 3600;

pub(crate) fn malaysia_time(now: DateTime<Utc>) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(MALAYSIA_OFFSET_SECS)
        .map_or_else(|| now.fixed_offset(), |tz| now.with_timezone(&tz))
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// 15000 -> "15,000"
fn with_thousands(n: u32) -> String {
    let digits = n.to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub(crate) fn digest_subject(leads: &[LeadCandidate]) -> String {
    let high = leads.iter().filter(|l| l.priority() == Priority::High).count();
    format!("{} High-Priority Diesel Leads Discovered!", high)
}

fn lead_row(lead: &LeadCandidate) -> String {
    let badge = match lead.priority() {
        Priority::High => "#10b981",
        Priority::Medium => "#f59e0b",
        Priority::Low => "#6b7280",
    };
    format!(
        "<tr style=\"border-bottom: 1px solid #e5e7eb;\">\
<td style=\"padding: 12px; font-weight: 600;\">{}</td>\
<td style=\"padding: 12px;\">{}</td>\
<td style=\"padding: 12px;\">{}</td>\
<td style=\"padding: 12px;\">{}L/month</td>\
<td style=\"padding: 12px;\"><span style=\"background-color: {}; color: white; padding: 4px 8px; border-radius: 4px;\">{}/100</span></td>\
<td style=\"padding: 12px;\">{}<br/><small>{}</small></td>\
</tr>",
        escape_html(&lead.company_name),
        escape_html(&lead.industry),
        escape_html(&lead.location),
        with_thousands(lead.estimated_usage),
        badge,
        lead.quality_score,
        escape_html(lead.contact_phone.as_deref().unwrap_or("N/A")),
        escape_html(lead.contact_email.as_deref().unwrap_or("")),
    )
}

fn lead_table(heading: &str, color: &str, leads: &[&LeadCandidate]) -> String {
    if leads.is_empty() {
        return String::new();
    }
    let rows: String = leads.iter().map(|l| lead_row(l)).collect();
    format!(
        "<h2 style=\"color: {color};\">{heading}</h2>\
<table style=\"width: 100%; border-collapse: collapse; margin-bottom: 30px;\">\
<thead><tr style=\"background: #f3f4f6;\">\
<th style=\"padding: 12px; text-align: left;\">Company</th>\
<th style=\"padding: 12px; text-align: left;\">Industry</th>\
<th style=\"padding: 12px; text-align: left;\">Location</th>\
<th style=\"padding: 12px; text-align: left;\">Est. Usage</th>\
<th style=\"padding: 12px; text-align: left;\">Score</th>\
<th style=\"padding: 12px; text-align: left;\">Contact</th>\
</tr></thead><tbody>{rows}</tbody></table>"
    )
}

fn count_box(count: usize, label: &str, background: &str, color: &str) -> String {
    format!(
        "<div style=\"flex: 1; background: {background}; padding: 20px; border-radius: 8px; text-align: center;\">\
<div style=\"font-size: 32px; font-weight: bold; color: {color};\">{count}</div>\
<div style=\"color: {color}; font-size: 14px;\">{label}</div></div>"
    )
}

/// Renders the digest. Low-priority leads are counted in the total but not
/// listed.
pub(crate) fn build_digest_html(
    leads: &[LeadCandidate],
    discovery_type: &str,
    sent_at: DateTime<FixedOffset>,
) -> String {
    let high: Vec<&LeadCandidate> = leads.iter().filter(|l| l.priority() == Priority::High).collect();
    let medium: Vec<&LeadCandidate> = leads
        .iter()
        .filter(|l| l.priority() == Priority::Medium)
        .collect();

    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>New Diesel Leads Discovered</title></head>\
<body style=\"font-family: sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; background-color: #f9fafb;\">\
<div style=\"background: #1e40af; color: white; padding: 30px; border-radius: 12px 12px 0 0;\">\
<h1 style=\"margin: 0; font-size: 24px;\">New High-Priority Diesel Leads Discovered</h1>\
<p style=\"margin: 10px 0 0 0;\">Discovery Type: {discovery}</p></div>\
<div style=\"background: white; padding: 30px; border-radius: 0 0 12px 12px;\">\
<div style=\"display: flex; gap: 20px; margin-bottom: 30px;\">{high_box}{medium_box}{total_box}</div>\
{high_table}{medium_table}\
<p style=\"color: #6b7280; font-size: 12px; margin-top: 30px; text-align: center;\">\
This email was sent automatically by your Diesel Lead Discovery System.<br/>\
Discovered at {time} (Malaysia Time)</p></div></body></html>",
        discovery = escape_html(discovery_type),
        high_box = count_box(high.len(), "High Priority", "#dcfce7", "#166534"),
        medium_box = count_box(medium.len(), "Medium Priority", "#fef3c7", "#92400e"),
        total_box = count_box(leads.len(), "Total Leads", "#e5e7eb", "#374151"),
        high_table = lead_table("High Priority Leads (Score 70+)", "#166534", &high),
        medium_table = lead_table("Medium Priority Leads (Score 50-69)", "#92400e", &medium),
        time = sent_at.format("%d/%m/%Y, %I:%M:%S %p"),
    )
}

/// Sends lead digests over SMTP with STARTTLS.
pub(crate) struct LeadNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl LeadNotifier {
    /// `Ok(None)` when no recipient is configured.
    pub(crate) fn from_config(config: &Config) -> Result<Option<Self>> {
        let Some(recipient) = config.notify_recipient.as_deref() else {
            return Ok(None);
        };
        let username = config
            .secrets
            .smtp_username
            .clone()
            .ok_or(AppError::MissingCredential("SMTP_USERNAME"))?;
        let password = config
            .secrets
            .smtp_password
            .clone()
            .ok_or(AppError::MissingCredential("SMTP_PASSWORD"))?;

        let from: Mailbox = config.smtp_sender.as_deref().unwrap_or(&username).parse()?;
        let to: Mailbox = recipient.parse()?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(Credentials::new(username, password))
            .timeout(Some(config.request_timeout))
            .build();

        Ok(Some(Self {
            transport,
            from,
            to,
        }))
    }

    pub(crate) async fn send_digest(&self, leads: &[LeadCandidate], discovery_type: &str) -> Result<()> {
        let html = build_digest_html(leads, discovery_type, malaysia_time(Utc::now()));
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(digest_subject(leads))
            .header(ContentType::TEXT_HTML)
            .body(html)?;

        self.transport.send(message).await?;
        tracing::info!(target: "notify_task", "Sent digest of {} leads to {}", leads.len(), self.to);
        Ok(())
    }
}

/// Leads scoring at least `threshold`, in input order.
pub(crate) fn notable_leads(leads: &[LeadCandidate], threshold: u8) -> Vec<LeadCandidate> {
    leads
        .iter()
        .filter(|l| l.quality_score >= threshold)
        .cloned()
        .collect()
}

/// Emails the notable leads of a run, if any. Failures are logged only.
pub(crate) async fn notify_if_warranted(
    notifier: Option<&LeadNotifier>,
    leads: &[LeadCandidate],
    threshold: u8,
    discovery_type: &str,
) -> bool {
    let Some(notifier) = notifier else {
        return false;
    };
    let notable = notable_leads(leads, threshold);
    if notable.is_empty() {
        tracing::debug!(target: "notify_task", "No leads at or above {} to notify about", threshold);
        return false;
    }
    match notifier.send_digest(&notable, discovery_type).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(target: "notify_task", "Failed to send lead digest: {}", e);
            false
        }
    }
}
