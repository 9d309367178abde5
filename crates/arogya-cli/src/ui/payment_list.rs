//! Pending-payment queue pane — left panel.

use ratatui::{
  Frame,
  layout::Rect,
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, Borders, List, ListItem, ListState},
};

use crate::app::App;

/// Render the pending queue into `area`.
pub fn draw(f: &mut Frame, area: Rect, app: &App) {
  let filtered = app.filtered_payments();
  let total = app.payments.len();

  // Title with count.
  let title = if app.filter_active || !app.filter.is_empty() {
    format!(" Pending ({}/{}) ", filtered.len(), total)
  } else {
    format!(" Pending ({}) ", total)
  };

  let block = Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::DarkGray));

  // Build list items: email, plan, amount, submitted date.
  let items: Vec<ListItem> = filtered
    .iter()
    .enumerate()
    .map(|(i, payment)| {
      let is_cursor = i == app.list_cursor;

      let style = if is_cursor {
        Style::default()
          .bg(Color::Blue)
          .fg(Color::White)
          .add_modifier(Modifier::BOLD)
      } else {
        Style::default()
      };

      let line = format!(
        "{:<28} {:<8} ₹{:<5} {}",
        payment.user_email,
        payment.plan.as_str(),
        payment.amount,
        payment.created_at.format("%Y-%m-%d"),
      );

      ListItem::new(Line::from(vec![Span::styled(line, style)]))
    })
    .collect();

  let mut inner_area = block.inner(area);
  f.render_widget(block, area);

  // If a filter is active or set, show a filter bar at the bottom.
  if (app.filter_active || !app.filter.is_empty()) && inner_area.height > 2 {
    let filter_area = Rect {
      x:      inner_area.x,
      y:      inner_area.y + inner_area.height - 1,
      width:  inner_area.width,
      height: 1,
    };
    inner_area.height = inner_area.height.saturating_sub(1);

    let filter_text = if app.filter_active {
      format!("/{}_", app.filter)
    } else {
      format!("/{}", app.filter)
    };
    f.render_widget(
      ratatui::widgets::Paragraph::new(filter_text)
        .style(Style::default().fg(Color::Yellow)),
      filter_area,
    );
  }

  // Scrollable list with cursor tracking.
  let mut state = ListState::default();
  state.select(if filtered.is_empty() {
    None
  } else {
    Some(app.list_cursor)
  });

  f.render_stateful_widget(
    List::new(items)
      .highlight_style(
        Style::default()
          .bg(Color::Blue)
          .fg(Color::White)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol(""),
    inner_area,
    &mut state,
  );
}
