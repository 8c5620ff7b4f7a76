use anyhow::Context;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use uuid::Uuid;

use crate::config::Config;
use crate::services::{notifications::Mailer, reports::GroupReport};

const APP_NAME: &str = "Task Groups";

pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailService {
    /// Returns None if SMTP is not fully configured.
    pub fn new(config: &Config) -> Option<Self> {
        let host = config.smtp_host.as_deref()?;
        let username = config.smtp_username.clone()?;
        let password = config.smtp_password.clone()?;
        let from_addr = config.smtp_from.as_deref()?;

        let port = config.smtp_port.unwrap_or(465);
        let creds = Credentials::new(username, password);

        let transport = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .ok()?
                .credentials(creds)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .ok()?
                .port(port)
                .credentials(creds)
                .build()
        };

        let from: Mailbox = from_addr.parse().ok()?;

        Some(Self { transport, from })
    }

    // ─── Private helpers ─────────────────────────────────────────────────────

    fn new_message_id(&self) -> String {
        format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain())
    }

    /// Wraps inner HTML content in the common email layout.
    fn wrap_html(title: &str, content: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width,initial-scale=1">
  <title>{title}</title>
</head>
<body style="margin:0;padding:0;background-color:#f1f5f9;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,Helvetica,Arial,sans-serif">
  <table role="presentation" width="100%" cellpadding="0" cellspacing="0" style="background-color:#f1f5f9;padding:40px 16px">
    <tr>
      <td align="center">
        <table role="presentation" width="100%" cellpadding="0" cellspacing="0" style="max-width:560px">
          <tr>
            <td align="center" style="padding-bottom:28px">
              <p style="margin:0;font-size:20px;font-weight:700;color:#0f172a;text-align:center">{APP_NAME}</p>
            </td>
          </tr>
          <tr>
            <td style="background:#ffffff;border-radius:12px;padding:40px;box-shadow:0 1px 3px rgba(0,0,0,0.08),0 8px 24px rgba(0,0,0,0.04)">
              {content}
            </td>
          </tr>
        </table>
      </td>
    </tr>
  </table>
</body>
</html>"#
        )
    }

    async fn send_email(&self, to: Mailbox, subject: &str, text: &str, html: &str) -> anyhow::Result<()> {
        let from = Mailbox::new(Some(APP_NAME.to_string()), self.from.email.clone());
        let email = Message::builder()
            .message_id(Some(self.new_message_id()))
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    ),
            )
            .context("Failed to build email message")?;

        self.transport
            .send(email)
            .await
            .context("Failed to send email")?;

        Ok(())
    }

    // ─── Public methods ───────────────────────────────────────────────────────

    /// Sends a dashboard report. `payload` is the JSON produced by the report
    /// service; anything else is mailed verbatim.
    pub async fn send_dashboard_report(&self, to_email: &str, payload: &str) -> anyhow::Result<()> {
        let to: Mailbox = to_email.parse().context("Invalid recipient address")?;
        let subject = format!("Your {APP_NAME} dashboard");
        let (text, content) = render_report(payload);
        let html = Self::wrap_html(&subject, &content);
        self.send_email(to, &subject, &text, &html).await
    }
}

impl Mailer for EmailService {
    async fn send_report(&self, to: &str, payload: &str) -> anyhow::Result<()> {
        self.send_dashboard_report(to, payload).await
    }
}

/// Plain-text and HTML bodies for a report payload.
fn render_report(payload: &str) -> (String, String) {
    let groups: Vec<GroupReport> = match serde_json::from_str(payload) {
        Ok(g) => g,
        Err(_) => {
            return (
                payload.to_string(),
                format!(
                    r#"<pre style="margin:0;font-size:13px;color:#334155;white-space:pre-wrap">{}</pre>"#,
                    escape_html(payload)
                ),
            )
        }
    };

    if groups.is_empty() {
        let msg = "You are not a member of any group yet.";
        return (
            msg.to_string(),
            format!(r#"<p style="margin:0;font-size:15px;color:#64748b">{msg}</p>"#),
        );
    }

    let mut text = String::from("Here is the current state of your groups.\n");
    let mut html = String::from(
        r#"<h1 style="margin:0 0 8px 0;font-size:22px;font-weight:700;color:#0f172a">Your dashboard</h1>"#,
    );
    for group in &groups {
        let done = group.tasks.iter().filter(|t| t.completed).count();
        text.push_str(&format!(
            "\n{} ({}) - {} members, {}/{} tasks done\n",
            group.name,
            group.role,
            group.members,
            done,
            group.tasks.len()
        ));
        html.push_str(&format!(
            r#"<h2 style="margin:24px 0 4px 0;font-size:17px;color:#0f172a">{}</h2>
<p style="margin:0 0 8px 0;font-size:13px;color:#94a3b8">{} · {} members · {}/{} tasks done</p>
<ul style="margin:0;padding-left:20px;font-size:15px;color:#334155;line-height:1.6">"#,
            escape_html(&group.name),
            group.role,
            group.members,
            done,
            group.tasks.len()
        ));
        for task in &group.tasks {
            let mark = if task.completed { "[x]" } else { "[ ]" };
            let due = task
                .deadline
                .map(|d| format!(" (due {})", d.format("%Y-%m-%d")))
                .unwrap_or_default();
            text.push_str(&format!("  {mark} {}{due}\n", task.name));
            html.push_str(&format!("<li>{mark} {}{due}</li>", escape_html(&task.name)));
        }
        html.push_str("</ul>");
    }
    (text, html)
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
