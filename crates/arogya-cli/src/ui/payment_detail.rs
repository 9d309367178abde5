//! Payment detail pane — right panel, with the audit trail underneath.

use ratatui::{
  Frame,
  layout::{Constraint, Direction, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, Borders, Paragraph},
};

use crate::app::App;

fn field<'a>(label: &'a str, value: String) -> Line<'a> {
  Line::from(vec![
    Span::styled(
      format!("{label:<12}"),
      Style::default().fg(Color::DarkGray),
    ),
    Span::raw(value),
  ])
}

/// Render the selected payment and its audit trail into `area`.
pub fn draw(f: &mut Frame, area: Rect, app: &App) {
  let Some(payment) = &app.selected else { return };

  let rows = Layout::default()
    .direction(Direction::Vertical)
    .constraints([Constraint::Length(11), Constraint::Min(0)])
    .split(area);

  // ── Payment fields ────────────────────────────────────────────────────

  let block = Block::default()
    .title(format!(" Payment {} ", payment.payment_id.display_short()))
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::DarkGray));
  let inner = block.inner(rows[0]);
  f.render_widget(block, rows[0]);

  let status_color = match payment.status.as_str() {
    "verified" => Color::Green,
    "rejected" => Color::Red,
    _ => Color::Yellow,
  };

  let mut lines = vec![
    field("Email", payment.user_email.clone()),
    field("Phone", payment.phone.clone()),
    field(
      "Plan",
      format!("{} (₹{})", payment.plan.display_name(), payment.amount),
    ),
    Line::from(vec![
      Span::styled("Status      ", Style::default().fg(Color::DarkGray)),
      Span::styled(
        payment.status.as_str().to_string(),
        Style::default()
          .fg(status_color)
          .add_modifier(Modifier::BOLD),
      ),
    ]),
    field("Txn", payment.merchant_txn_id.clone()),
    field(
      "Submitted",
      payment.created_at.format("%Y-%m-%d %H:%M UTC").to_string(),
    ),
  ];
  if let Some(proof) = &payment.proof {
    lines.push(field("Proof", proof.as_str().to_string()));
  }
  if let Some(note) = &payment.transaction_note {
    lines.push(field("Note", note.clone()));
  }

  f.render_widget(Paragraph::new(lines), inner);

  // ── Audit trail ───────────────────────────────────────────────────────

  draw_trail(f, rows[1], app);
}

fn draw_trail(f: &mut Frame, area: Rect, app: &App) {
  let block = Block::default()
    .title(format!(" Audit trail ({}) ", app.trail.len()))
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::DarkGray));
  let inner = block.inner(area);
  f.render_widget(block, area);

  let lines: Vec<Line> = app
    .trail
    .iter()
    .skip(app.detail_scroll)
    .map(|event| {
      let actor = event
        .actor
        .map(|a| a.as_str())
        .unwrap_or("-");
      let transition = match (event.old_status, event.new_status) {
        (Some(old), Some(new)) => format!("{} → {}", old.as_str(), new.as_str()),
        (None, Some(new)) => format!("→ {}", new.as_str()),
        _ => String::new(),
      };
      Line::from(vec![
        Span::styled(
          event.recorded_at.format("%m-%d %H:%M ").to_string(),
          Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
          format!("{:<22}", event.kind.as_str()),
          Style::default().fg(Color::Cyan),
        ),
        Span::raw(format!("{actor:<9}")),
        Span::styled(transition, Style::default().fg(Color::DarkGray)),
      ])
    })
    .collect();

  f.render_widget(Paragraph::new(lines), inner);
}
